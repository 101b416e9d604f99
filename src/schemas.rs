use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier handed out by the identity provider.
pub type UserId = String;

pub fn new_id() -> String {
    bson::oid::ObjectId::new().to_hex()
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub user_id: UserId,
}

impl Member {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Member {
            user_id: user_id.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    /// Insertion order; a user appears at most once.
    pub members: Vec<Member>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|member| member.user_id == user_id)
    }

    pub fn member_ids(&self) -> Vec<UserId> {
        self.members
            .iter()
            .map(|member| member.user_id.clone())
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Food,
    Transport,
    Housing,
    Entertainment,
    Utilities,
    Shopping,
    #[default]
    Other,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: String,
    pub description: String,
    pub amount: f64,
    pub paid_by: UserId,
    pub group_id: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub is_settled: bool,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewGroup {
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGroup {
    #[serde(default)]
    pub group_id: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpense {
    #[serde(default)]
    pub description: String,
    pub amount: Option<f64>,
    #[serde(default)]
    pub group_id: String,
    #[serde(default)]
    pub category: Category,
    pub comment: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

/// Full replacement of the editable fields of an expense.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseUpdate {
    #[serde(default)]
    pub description: String,
    pub amount: Option<f64>,
    #[serde(default)]
    pub category: Category,
    pub comment: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub is_settled: Option<bool>,
}
