use chrono::{DateTime, Utc};
use futures::{future::BoxFuture, TryStreamExt};
use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
    Client, Collection, Database,
};
use serde::{Deserialize, Serialize};

use crate::schemas::{Category, Expense, Group, Member, UserId};
use crate::settings::MongoDb;
use crate::store::{ExpenseStore, GroupStore, StoreError, StoreResult};

/// Stored form of a [`Group`]. Timestamps are BSON dates so that MongoDB
/// sorts them chronologically.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct GroupDocument {
    id: String,
    name: String,
    members: Vec<Member>,
    created_by: UserId,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    created_at: DateTime<Utc>,
}

impl From<Group> for GroupDocument {
    fn from(group: Group) -> Self {
        GroupDocument {
            id: group.id,
            name: group.name,
            members: group.members,
            created_by: group.created_by,
            created_at: group.created_at,
        }
    }
}

impl From<GroupDocument> for Group {
    fn from(document: GroupDocument) -> Self {
        Group {
            id: document.id,
            name: document.name,
            members: document.members,
            created_by: document.created_by,
            created_at: document.created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExpenseDocument {
    id: String,
    description: String,
    amount: f64,
    paid_by: UserId,
    group_id: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    date: DateTime<Utc>,
    #[serde(default)]
    is_settled: bool,
    #[serde(default)]
    category: Category,
    #[serde(default)]
    comment: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    updated_at: DateTime<Utc>,
}

impl From<Expense> for ExpenseDocument {
    fn from(expense: Expense) -> Self {
        ExpenseDocument {
            id: expense.id,
            description: expense.description,
            amount: expense.amount,
            paid_by: expense.paid_by,
            group_id: expense.group_id,
            date: expense.date,
            is_settled: expense.is_settled,
            category: expense.category,
            comment: expense.comment,
            created_at: expense.created_at,
            updated_at: expense.updated_at,
        }
    }
}

impl From<ExpenseDocument> for Expense {
    fn from(document: ExpenseDocument) -> Self {
        Expense {
            id: document.id,
            description: document.description,
            amount: document.amount,
            paid_by: document.paid_by,
            group_id: document.group_id,
            date: document.date,
            is_settled: document.is_settled,
            category: document.category,
            comment: document.comment,
            created_at: document.created_at,
            updated_at: document.updated_at,
        }
    }
}

/// Groups and expenses live in two collections and are addressed by their
/// string `id` field.
#[derive(Clone)]
pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    pub async fn connect(settings: &MongoDb) -> StoreResult<Self> {
        let client = Client::with_uri_str(&settings.uri).await?;
        let database = client.database(&settings.name);
        database.run_command(doc! { "ping": 1 }, None).await?;
        tracing::info!(database = %settings.name, "connected to MongoDB");
        Ok(MongoStore { database })
    }

    fn groups(&self) -> Collection<GroupDocument> {
        self.database.collection("Groups")
    }

    fn expenses(&self) -> Collection<ExpenseDocument> {
        self.database.collection("Expenses")
    }
}

fn return_updated() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

impl GroupStore for MongoStore {
    fn create_group(&self, group: Group) -> BoxFuture<'_, StoreResult<Group>> {
        Box::pin(async move {
            self.groups()
                .insert_one(GroupDocument::from(group.clone()), None)
                .await?;
            Ok(group)
        })
    }

    fn find_group<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StoreResult<Option<Group>>> {
        Box::pin(async move {
            let found = self.groups().find_one(doc! { "id": id }, None).await?;
            Ok(found.map(Group::from))
        })
    }

    fn find_groups_by_member<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Vec<Group>>> {
        Box::pin(async move {
            let options = FindOptions::builder()
                .sort(doc! { "createdAt": -1 })
                .build();
            let cursor = self
                .groups()
                .find(doc! { "members.userId": user_id }, options)
                .await?;
            let groups: Vec<GroupDocument> = cursor.try_collect().await?;
            Ok(groups.into_iter().map(Group::from).collect())
        })
    }

    fn add_member<'a>(
        &'a self,
        group_id: &'a str,
        user_id: UserId,
    ) -> BoxFuture<'a, StoreResult<Group>> {
        Box::pin(async move {
            let member = bson::to_bson(&Member::new(user_id.clone()))?;
            let updated = self
                .groups()
                .find_one_and_update(
                    doc! { "id": group_id, "members.userId": { "$ne": user_id.as_str() } },
                    doc! { "$push": { "members": member } },
                    return_updated(),
                )
                .await?;
            match updated {
                Some(group) => Ok(group.into()),
                None => match self.find_group(group_id).await? {
                    Some(_) => Err(StoreError::AlreadyMember),
                    None => Err(StoreError::NotFound("Group")),
                },
            }
        })
    }
}

impl ExpenseStore for MongoStore {
    fn create_expense(&self, expense: Expense) -> BoxFuture<'_, StoreResult<Expense>> {
        Box::pin(async move {
            self.expenses()
                .insert_one(ExpenseDocument::from(expense.clone()), None)
                .await?;
            Ok(expense)
        })
    }

    fn find_expense<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StoreResult<Option<Expense>>> {
        Box::pin(async move {
            let found = self.expenses().find_one(doc! { "id": id }, None).await?;
            Ok(found.map(Expense::from))
        })
    }

    fn find_expenses_by_group<'a>(
        &'a self,
        group_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Vec<Expense>>> {
        Box::pin(async move {
            let options = FindOptions::builder()
                .sort(doc! { "date": -1, "createdAt": -1 })
                .build();
            let cursor = self
                .expenses()
                .find(doc! { "groupId": group_id }, options)
                .await?;
            let expenses: Vec<ExpenseDocument> = cursor.try_collect().await?;
            Ok(expenses.into_iter().map(Expense::from).collect())
        })
    }

    fn update_expense(&self, expense: Expense) -> BoxFuture<'_, StoreResult<Expense>> {
        Box::pin(async move {
            let document = ExpenseDocument::from(expense.clone());
            let result = self
                .expenses()
                .replace_one(doc! { "id": expense.id.as_str() }, document, None)
                .await?;
            if result.matched_count == 0 {
                return Err(StoreError::NotFound("Expense"));
            }
            Ok(expense)
        })
    }

    fn delete_expense<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let result = self.expenses().delete_one(doc! { "id": id }, None).await?;
            if result.deleted_count == 0 {
                return Err(StoreError::NotFound("Expense"));
            }
            Ok(())
        })
    }

    fn settle_expense<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StoreResult<Expense>> {
        Box::pin(async move {
            let now = bson::DateTime::from_chrono(Utc::now());
            self.expenses()
                .find_one_and_update(
                    doc! { "id": id },
                    doc! { "$set": { "isSettled": true, "updatedAt": now } },
                    return_updated(),
                )
                .await?
                .map(Expense::from)
                .ok_or(StoreError::NotFound("Expense"))
        })
    }
}
