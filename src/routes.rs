use actix_web::{delete, get, patch, post, put, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::auth::Caller;
use crate::balance::{compute_balances, GroupBalance};
use crate::error::ApiError;
use crate::exchange::SettlementOrder;
use crate::identity::{resolve_or_fallback, DisplayNames, IdentityResolver};
use crate::schemas::{
    new_id, Expense, ExpenseUpdate, Group, JoinGroup, Member, NewExpense, NewGroup, UserId,
};
use crate::store::{ExpenseStore, GroupStore};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _| ApiError::Validation(err.to_string()).into()),
    )
    .service(
        web::scope("/api")
            .route("", web::get().to(health))
            .service(list_groups)
            .service(create_group)
            .service(join_group)
            .service(get_group)
            .service(add_expense)
            .service(list_group_expenses)
            .service(settle_expense)
            .service(update_expense)
            .service(delete_expense),
    );
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GroupDetail {
    id: String,
    name: String,
    created_by: UserId,
    created_at: DateTime<Utc>,
    #[serde(flatten)]
    balance: GroupBalance,
    user_names: DisplayNames,
    expenses: Vec<Expense>,
}

fn required_text(value: &str, field: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::Validation(format!("Missing required field: {field}")));
    }
    Ok(value.to_string())
}

/// Largest amount a single expense may carry. Keeps group totals and
/// balances in cents well inside `f64` and `i64` range.
const MAX_AMOUNT: f64 = 1_000_000_000_000.0;

fn required_amount(amount: Option<f64>) -> Result<f64, ApiError> {
    match amount {
        Some(amount) if amount.is_finite() && amount > 0.0 && amount <= MAX_AMOUNT => Ok(amount),
        Some(amount) if amount > MAX_AMOUNT => Err(ApiError::Validation(
            "Amount is too large".to_string(),
        )),
        Some(_) => Err(ApiError::Validation(
            "Amount must be a positive number".to_string(),
        )),
        None => Err(ApiError::Validation("Missing required field: amount".to_string())),
    }
}

/// Loads a group the caller belongs to.
async fn member_group(
    groups: &dyn GroupStore,
    group_id: &str,
    caller: &Caller,
) -> Result<Group, ApiError> {
    let group = groups
        .find_group(group_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Group not found".to_string()))?;
    if !group.is_member(&caller.id) {
        return Err(ApiError::Forbidden(
            "You are not a member of this group".to_string(),
        ));
    }
    Ok(group)
}

/// Loads an expense whose group the caller belongs to.
async fn member_expense(
    groups: &dyn GroupStore,
    expenses: &dyn ExpenseStore,
    id: &str,
    caller: &Caller,
) -> Result<Expense, ApiError> {
    let expense = expenses
        .find_expense(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Expense not found".to_string()))?;
    member_group(groups, &expense.group_id, caller).await?;
    Ok(expense)
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "message": "The backend is up and running" }))
}

#[get("/groups")]
async fn list_groups(
    caller: Caller,
    groups: web::Data<dyn GroupStore>,
) -> Result<HttpResponse, ApiError> {
    let found = groups.find_groups_by_member(&caller.id).await?;
    Ok(HttpResponse::Ok().json(found))
}

#[post("/groups")]
async fn create_group(
    caller: Caller,
    groups: web::Data<dyn GroupStore>,
    json: web::Json<NewGroup>,
) -> Result<HttpResponse, ApiError> {
    let group = Group {
        id: new_id(),
        name: required_text(&json.name, "name")?,
        members: vec![Member::new(caller.id.clone())],
        created_by: caller.id,
        created_at: Utc::now(),
    };
    let group = groups.create_group(group).await?;
    tracing::info!(group = %group.id, user = %group.created_by, "group created");
    Ok(HttpResponse::Created().json(group))
}

#[post("/groups/join")]
async fn join_group(
    caller: Caller,
    groups: web::Data<dyn GroupStore>,
    json: web::Json<JoinGroup>,
) -> Result<HttpResponse, ApiError> {
    let group_id = required_text(&json.group_id, "groupId")?;
    let group = groups.add_member(&group_id, caller.id.clone()).await?;
    tracing::info!(group = %group.id, user = %caller.id, "member joined");
    Ok(HttpResponse::Ok().json(json!({
        "msg": "You have joined the group",
        "group": group,
    })))
}

#[get("/groups/{id}")]
async fn get_group(
    caller: Caller,
    groups: web::Data<dyn GroupStore>,
    expenses: web::Data<dyn ExpenseStore>,
    identity: web::Data<dyn IdentityResolver>,
    order: web::Data<SettlementOrder>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let group = member_group(groups.get_ref(), &id, &caller).await?;
    let group_expenses = expenses.find_expenses_by_group(&group.id).await?;

    // Former members may still appear as payers.
    let mut ids = group.member_ids();
    for expense in &group_expenses {
        if !ids.contains(&expense.paid_by) {
            ids.push(expense.paid_by.clone());
        }
    }
    let resolved = resolve_or_fallback(identity.get_ref(), &ids).await;
    let user_names = DisplayNames::new(
        ids.iter()
            .map(|id| (id.clone(), resolved.name_for(id)))
            .collect(),
    );

    let balance = compute_balances(&group.members, &group_expenses, &user_names, **order);

    Ok(HttpResponse::Ok().json(GroupDetail {
        id: group.id,
        name: group.name,
        created_by: group.created_by,
        created_at: group.created_at,
        balance,
        user_names,
        expenses: group_expenses,
    }))
}

#[post("/expenses")]
async fn add_expense(
    caller: Caller,
    groups: web::Data<dyn GroupStore>,
    expenses: web::Data<dyn ExpenseStore>,
    json: web::Json<NewExpense>,
) -> Result<HttpResponse, ApiError> {
    let payload = json.into_inner();
    let description = required_text(&payload.description, "description")?;
    let amount = required_amount(payload.amount)?;
    let group_id = required_text(&payload.group_id, "groupId")?;
    let group = member_group(groups.get_ref(), &group_id, &caller).await?;

    let now = Utc::now();
    let expense = Expense {
        id: new_id(),
        description,
        amount,
        paid_by: caller.id,
        group_id: group.id,
        date: payload.date.unwrap_or(now),
        is_settled: false,
        category: payload.category,
        comment: payload.comment.map(|c| c.trim().to_string()).unwrap_or_default(),
        created_at: now,
        updated_at: now,
    };
    let expense = expenses.create_expense(expense).await?;
    tracing::info!(expense = %expense.id, group = %expense.group_id, "expense added");
    Ok(HttpResponse::Created().json(expense))
}

#[get("/expenses/group/{group_id}")]
async fn list_group_expenses(
    caller: Caller,
    groups: web::Data<dyn GroupStore>,
    expenses: web::Data<dyn ExpenseStore>,
    group_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let group = member_group(groups.get_ref(), &group_id, &caller).await?;
    let found = expenses.find_expenses_by_group(&group.id).await?;
    Ok(HttpResponse::Ok().json(found))
}

#[put("/expenses/{id}")]
async fn update_expense(
    caller: Caller,
    groups: web::Data<dyn GroupStore>,
    expenses: web::Data<dyn ExpenseStore>,
    id: web::Path<String>,
    json: web::Json<ExpenseUpdate>,
) -> Result<HttpResponse, ApiError> {
    let payload = json.into_inner();
    let description = required_text(&payload.description, "description")?;
    let amount = required_amount(payload.amount)?;
    let existing = member_expense(groups.get_ref(), expenses.get_ref(), &id, &caller).await?;

    // There is no way back from settled.
    let is_settled = existing.is_settled || payload.is_settled.unwrap_or(false);
    let expense = Expense {
        description,
        amount,
        category: payload.category,
        comment: payload.comment.map(|c| c.trim().to_string()).unwrap_or_default(),
        date: payload.date.unwrap_or(existing.date),
        is_settled,
        updated_at: Utc::now(),
        ..existing
    };
    let expense = expenses.update_expense(expense).await?;
    tracing::info!(expense = %expense.id, user = %caller.id, "expense edited");
    Ok(HttpResponse::Ok().json(expense))
}

#[patch("/expenses/{id}/settle")]
async fn settle_expense(
    caller: Caller,
    groups: web::Data<dyn GroupStore>,
    expenses: web::Data<dyn ExpenseStore>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    member_expense(groups.get_ref(), expenses.get_ref(), &id, &caller).await?;
    let expense = expenses.settle_expense(&id).await?;
    tracing::info!(expense = %expense.id, user = %caller.id, "expense settled");
    Ok(HttpResponse::Ok().json(json!({
        "msg": "Expense marked as settled",
        "expense": expense,
    })))
}

#[delete("/expenses/{id}")]
async fn delete_expense(
    caller: Caller,
    groups: web::Data<dyn GroupStore>,
    expenses: web::Data<dyn ExpenseStore>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    member_expense(groups.get_ref(), expenses.get_ref(), &id, &caller).await?;
    expenses.delete_expense(&id).await?;
    tracing::info!(expense = %id, user = %caller.id, "expense deleted");
    Ok(HttpResponse::Ok().json(json!({ "msg": "Expense deleted" })))
}
