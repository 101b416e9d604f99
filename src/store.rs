//! Persistence seams. Every operation touches a single document, so there is
//! no transaction spanning a group and its expenses.
use futures::future::BoxFuture;
use thiserror::Error;

use crate::schemas::{Expense, Group, UserId};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("user is already a member")]
    AlreadyMember,
    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),
    #[error(transparent)]
    Serialization(#[from] bson::ser::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait GroupStore: Send + Sync {
    fn create_group(&self, group: Group) -> BoxFuture<'_, StoreResult<Group>>;

    fn find_group<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StoreResult<Option<Group>>>;

    /// Groups listing `user_id` as a member, newest first.
    fn find_groups_by_member<'a>(&'a self, user_id: &'a str)
        -> BoxFuture<'a, StoreResult<Vec<Group>>>;

    /// Appends a member and returns the updated group.
    fn add_member<'a>(
        &'a self,
        group_id: &'a str,
        user_id: UserId,
    ) -> BoxFuture<'a, StoreResult<Group>>;
}

pub trait ExpenseStore: Send + Sync {
    fn create_expense(&self, expense: Expense) -> BoxFuture<'_, StoreResult<Expense>>;

    fn find_expense<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StoreResult<Option<Expense>>>;

    /// Expenses of a group, most recent `date` first.
    fn find_expenses_by_group<'a>(
        &'a self,
        group_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Vec<Expense>>>;

    /// Replaces the stored expense with the same id.
    fn update_expense(&self, expense: Expense) -> BoxFuture<'_, StoreResult<Expense>>;

    fn delete_expense<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StoreResult<()>>;

    /// Marks the expense as settled; settling twice is not an error.
    fn settle_expense<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StoreResult<Expense>>;
}
