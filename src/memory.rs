use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use futures::future::{ready, BoxFuture, FutureExt};

use crate::schemas::{Expense, Group, UserId};
use crate::store::{ExpenseStore, GroupStore, StoreError, StoreResult};

/// Process-local store, handy for trying the service out and for tests.
/// Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    groups: Mutex<Vec<Group>>,
    expenses: Mutex<HashMap<String, Expense>>,
}

fn lock<T>(mutex: &Mutex<T>) -> StoreResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|err| StoreError::Unavailable(err.to_string()))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_member_now(&self, group_id: &str, user_id: UserId) -> StoreResult<Group> {
        let mut groups = lock(&self.groups)?;
        let group = groups
            .iter_mut()
            .find(|group| group.id == group_id)
            .ok_or(StoreError::NotFound("Group"))?;
        if group.is_member(&user_id) {
            return Err(StoreError::AlreadyMember);
        }
        group.members.push(crate::schemas::Member { user_id });
        Ok(group.clone())
    }

    fn update_expense_now(&self, expense: Expense) -> StoreResult<Expense> {
        let mut expenses = lock(&self.expenses)?;
        let stored = expenses
            .get_mut(&expense.id)
            .ok_or(StoreError::NotFound("Expense"))?;
        *stored = expense.clone();
        Ok(expense)
    }

    fn settle_expense_now(&self, id: &str) -> StoreResult<Expense> {
        let mut expenses = lock(&self.expenses)?;
        let expense = expenses.get_mut(id).ok_or(StoreError::NotFound("Expense"))?;
        if !expense.is_settled {
            expense.is_settled = true;
            expense.updated_at = chrono::Utc::now();
        }
        Ok(expense.clone())
    }
}

impl GroupStore for MemoryStore {
    fn create_group(&self, group: Group) -> BoxFuture<'_, StoreResult<Group>> {
        let created = lock(&self.groups).map(|mut groups| {
            groups.push(group.clone());
            group
        });
        ready(created).boxed()
    }

    fn find_group<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StoreResult<Option<Group>>> {
        let found = lock(&self.groups)
            .map(|groups| groups.iter().find(|group| group.id == id).cloned());
        ready(found).boxed()
    }

    fn find_groups_by_member<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Vec<Group>>> {
        let found = lock(&self.groups).map(|groups| {
            let mut found: Vec<Group> = groups
                .iter()
                .filter(|group| group.is_member(user_id))
                .cloned()
                .collect();
            found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            found
        });
        ready(found).boxed()
    }

    fn add_member<'a>(
        &'a self,
        group_id: &'a str,
        user_id: UserId,
    ) -> BoxFuture<'a, StoreResult<Group>> {
        ready(self.add_member_now(group_id, user_id)).boxed()
    }
}

impl ExpenseStore for MemoryStore {
    fn create_expense(&self, expense: Expense) -> BoxFuture<'_, StoreResult<Expense>> {
        let created = lock(&self.expenses).map(|mut expenses| {
            expenses.insert(expense.id.clone(), expense.clone());
            expense
        });
        ready(created).boxed()
    }

    fn find_expense<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StoreResult<Option<Expense>>> {
        let found = lock(&self.expenses).map(|expenses| expenses.get(id).cloned());
        ready(found).boxed()
    }

    fn find_expenses_by_group<'a>(
        &'a self,
        group_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Vec<Expense>>> {
        let found = lock(&self.expenses).map(|expenses| {
            let mut found: Vec<Expense> = expenses
                .values()
                .filter(|expense| expense.group_id == group_id)
                .cloned()
                .collect();
            found.sort_by(|a, b| {
                b.date
                    .cmp(&a.date)
                    .then_with(|| b.created_at.cmp(&a.created_at))
            });
            found
        });
        ready(found).boxed()
    }

    fn update_expense(&self, expense: Expense) -> BoxFuture<'_, StoreResult<Expense>> {
        ready(self.update_expense_now(expense)).boxed()
    }

    fn delete_expense<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        let deleted = lock(&self.expenses).and_then(|mut expenses| {
            expenses
                .remove(id)
                .map(|_| ())
                .ok_or(StoreError::NotFound("Expense"))
        });
        ready(deleted).boxed()
    }

    fn settle_expense<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StoreResult<Expense>> {
        ready(self.settle_expense_now(id)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::tests::expense;
    use crate::schemas::Member;
    use chrono::{Duration, Utc};

    fn group(id: &str, members: &[&str], age_days: i64) -> Group {
        Group {
            id: id.to_string(),
            name: format!("group {id}"),
            members: members.iter().map(|m| Member::new(*m)).collect(),
            created_by: members[0].to_string(),
            created_at: Utc::now() - Duration::days(age_days),
        }
    }

    #[actix_web::test]
    async fn groups_by_member_are_newest_first() {
        let store = MemoryStore::new();
        store.create_group(group("old", &["ana", "bo"], 10)).await.unwrap();
        store.create_group(group("new", &["ana"], 1)).await.unwrap();
        store.create_group(group("other", &["bo"], 0)).await.unwrap();

        let ids: Vec<String> = store
            .find_groups_by_member("ana")
            .await
            .unwrap()
            .into_iter()
            .map(|group| group.id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[actix_web::test]
    async fn joining_twice_is_rejected() {
        let store = MemoryStore::new();
        store.create_group(group("g", &["ana"], 0)).await.unwrap();

        let joined = store.add_member("g", "bo".to_string()).await.unwrap();
        assert_eq!(joined.member_ids(), vec!["ana", "bo"]);

        let again = store.add_member("g", "bo".to_string()).await;
        assert!(matches!(again, Err(StoreError::AlreadyMember)));

        let missing = store.add_member("nope", "bo".to_string()).await;
        assert!(matches!(missing, Err(StoreError::NotFound("Group"))));
    }

    #[actix_web::test]
    async fn expenses_lifecycle() {
        let store = MemoryStore::new();
        let mut older = expense("ana", 10.0, false);
        older.date = Utc::now() - Duration::days(3);
        let newer = expense("bo", 20.0, false);
        store.create_expense(older.clone()).await.unwrap();
        store.create_expense(newer.clone()).await.unwrap();

        let listed = store.find_expenses_by_group("group").await.unwrap();
        assert_eq!(listed[0].id, newer.id);
        assert_eq!(listed[1].id, older.id);

        let settled = store.settle_expense(&older.id).await.unwrap();
        assert!(settled.is_settled);
        assert!(store.settle_expense(&older.id).await.unwrap().is_settled);

        let mut edited = newer.clone();
        edited.amount = 25.0;
        store.update_expense(edited).await.unwrap();
        let found = store.find_expense(&newer.id).await.unwrap().unwrap();
        assert_eq!(found.amount, 25.0);

        store.delete_expense(&newer.id).await.unwrap();
        assert!(store.find_expense(&newer.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete_expense(&newer.id).await,
            Err(StoreError::NotFound("Expense"))
        ));
    }
}
