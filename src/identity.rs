//! Display names for the opaque user ids handed out by the identity provider.
//!
//! Resolution is best effort: [`resolve_or_fallback`] swallows provider
//! failures and every id without a resolved name gets a stable placeholder
//! (see [`fallback_name`]).
use std::collections::HashMap;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schemas::UserId;
use crate::settings::Identity;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("identity provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("identity provider answered {0}")]
    Status(reqwest::StatusCode),
}

pub trait IdentityResolver: Send + Sync {
    fn resolve_display_names<'a>(
        &'a self,
        ids: &'a [UserId],
    ) -> BoxFuture<'a, Result<HashMap<UserId, String>, IdentityError>>;
}

/// Resolved names, falling back to [`fallback_name`] for anything missing.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DisplayNames(HashMap<UserId, String>);

impl DisplayNames {
    pub fn new(names: HashMap<UserId, String>) -> Self {
        DisplayNames(names)
    }

    pub fn name_for(&self, user_id: &str) -> String {
        self.0
            .get(user_id)
            .filter(|name| !name.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| fallback_name(user_id))
    }
}

/// `User` followed by the last four characters of the id.
pub fn fallback_name(user_id: &str) -> String {
    let skip = user_id.chars().count().saturating_sub(4);
    let suffix: String = user_id.chars().skip(skip).collect();
    format!("User {suffix}")
}

pub async fn resolve_or_fallback(resolver: &dyn IdentityResolver, ids: &[UserId]) -> DisplayNames {
    if ids.is_empty() {
        return DisplayNames::default();
    }
    match resolver.resolve_display_names(ids).await {
        Ok(names) => DisplayNames::new(names),
        Err(err) => {
            tracing::warn!("falling back to placeholder names: {err}");
            DisplayNames::default()
        }
    }
}

/// Used when no identity provider is configured.
pub struct NoopResolver;

impl IdentityResolver for NoopResolver {
    fn resolve_display_names<'a>(
        &'a self,
        _ids: &'a [UserId],
    ) -> BoxFuture<'a, Result<HashMap<UserId, String>, IdentityError>> {
        Box::pin(async { Ok(HashMap::new()) })
    }
}

#[derive(Deserialize, Debug, Clone)]
struct ProviderEmail {
    email_address: String,
}

#[derive(Deserialize, Debug, Clone)]
struct ProviderUser {
    id: String,
    first_name: Option<String>,
    last_name: Option<String>,
    username: Option<String>,
    #[serde(default)]
    email_addresses: Vec<ProviderEmail>,
}

impl ProviderUser {
    // Full name, first name, username, email local part, placeholder.
    fn display_name(&self) -> String {
        let non_empty = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let full_name = match (non_empty(&self.first_name), non_empty(&self.last_name)) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (first, _) => first,
        };
        full_name
            .or_else(|| non_empty(&self.username))
            .or_else(|| {
                self.email_addresses
                    .first()
                    .and_then(|email| email.email_address.split('@').next())
                    .filter(|local| !local.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| fallback_name(&self.id))
    }
}

/// Looks users up through the provider's backend user-list endpoint.
pub struct ProviderResolver {
    client: reqwest::Client,
    api_url: String,
    secret_key: String,
}

impl ProviderResolver {
    pub fn new(settings: &Identity) -> Self {
        ProviderResolver {
            client: reqwest::Client::new(),
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            secret_key: settings.secret_key.clone(),
        }
    }
}

impl IdentityResolver for ProviderResolver {
    fn resolve_display_names<'a>(
        &'a self,
        ids: &'a [UserId],
    ) -> BoxFuture<'a, Result<HashMap<UserId, String>, IdentityError>> {
        Box::pin(async move {
            let query: Vec<(&str, &str)> = ids.iter().map(|id| ("user_id", id.as_str())).collect();
            let response = self
                .client
                .get(format!("{}/users", self.api_url))
                .bearer_auth(&self.secret_key)
                .query(&query)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(IdentityError::Status(response.status()));
            }
            let users: Vec<ProviderUser> = response.json().await?;
            tracing::debug!("resolved {} of {} display names", users.len(), ids.len());

            Ok(users
                .into_iter()
                .map(|user| {
                    let name = user.display_name();
                    (user.id, name)
                })
                .collect())
        })
    }
}
