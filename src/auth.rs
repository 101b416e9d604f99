use crate::error::ApiError;
use crate::schemas::UserId;
use crate::settings::Auth;
use actix_web::{dev::Payload, http::header::HeaderValue, web, FromRequest, HttpRequest};
use chrono::Utc;
use futures::future::{ready, Ready};
use hmac::{digest::InvalidLength, Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::num::ParseIntError;

type HmacSha256 = Hmac<Sha256>;

/// The authenticated user making the request.
#[derive(Clone, Debug, PartialEq)]
pub struct Caller {
    pub id: UserId,
}

/// Login assertion signed by the identity provider and forwarded by the
/// client in the `Authorization` header.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct IdentityAssertion {
    pub id: String,
    pub auth_date: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub hash: String,
}

impl FromRequest for Caller {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(request: &HttpRequest, _: &mut Payload) -> Self::Future {
        let caller = match request.app_data::<web::Data<Auth>>() {
            Some(settings) => check_authorization(request, settings).ok_or(ApiError::Unauthorized),
            None => {
                tracing::error!("auth settings are not registered");
                Err(ApiError::Unauthorized)
            }
        };
        ready(caller)
    }
}

pub fn check_authorization(request: &HttpRequest, settings: &Auth) -> Option<Caller> {
    let authorization = request
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .map(HeaderValue::to_str)?
        .ok()?;
    let assertion: IdentityAssertion = match serde_json::from_str(authorization) {
        Ok(json) => json,
        Err(err) => {
            tracing::debug!("malformed authorization header: {err}");
            return None;
        }
    };
    verify_assertion(&assertion, settings, Utc::now().timestamp())
}

pub fn verify_assertion(
    assertion: &IdentityAssertion,
    settings: &Auth,
    now: i64,
) -> Option<Caller> {
    let hash = assertion
        .hash
        .chars()
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|n| u8::from_str_radix(&String::from_iter(n), 16))
        .collect::<Result<Vec<u8>, ParseIntError>>()
        .ok()?;

    if keyed_mac(assertion, &settings.signing_secret)
        .ok()?
        .verify_slice(&hash)
        .is_err()
    {
        tracing::debug!(user = %assertion.id, "assertion signature mismatch");
        return None;
    }

    let auth_date: i64 = assertion.auth_date.parse().ok()?;
    if settings.max_age_secs > 0 && now - auth_date > settings.max_age_secs as i64 {
        tracing::debug!(user = %assertion.id, "assertion expired");
        return None;
    }

    Some(Caller {
        id: assertion.id.clone(),
    })
}

fn keyed_mac(
    assertion: &IdentityAssertion,
    signing_secret: &str,
) -> Result<HmacSha256, InvalidLength> {
    let check_string = vec![
        ("auth_date", Some(assertion.auth_date.as_str())),
        ("first_name", assertion.first_name.as_deref()),
        ("id", Some(assertion.id.as_str())),
        ("last_name", assertion.last_name.as_deref()),
        ("username", assertion.username.as_deref()),
    ]
    .into_iter()
    .filter_map(|pair| pair.1.map(|val| format!("{}={}", pair.0, val)))
    .collect::<Vec<_>>()
    .join("\n");

    let mut sha256_hasher = Sha256::new();
    sha256_hasher.update(signing_secret.as_bytes());
    let secret_hash = sha256_hasher.finalize();

    let mut hmac_hasher = HmacSha256::new_from_slice(&secret_hash)?;
    hmac_hasher.update(check_string.as_bytes());
    Ok(hmac_hasher)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    pub(crate) const SECRET: &str = "provider-signing-secret";

    pub(crate) fn settings() -> Auth {
        Auth {
            signing_secret: SECRET.to_string(),
            max_age_secs: 3600,
        }
    }

    pub(crate) fn sign_assertion(assertion: &IdentityAssertion, signing_secret: &str) -> String {
        keyed_mac(assertion, signing_secret)
            .unwrap()
            .finalize()
            .into_bytes()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect()
    }

    pub(crate) fn assertion_for(user_id: &str, auth_date: i64) -> IdentityAssertion {
        let mut assertion = IdentityAssertion {
            id: user_id.to_string(),
            auth_date: auth_date.to_string(),
            first_name: Some("Ana".to_string()),
            last_name: None,
            username: Some(format!("{user_id}_name")),
            hash: String::new(),
        };
        assertion.hash = sign_assertion(&assertion, SECRET);
        assertion
    }

    /// Header value a signed-in client would send.
    pub(crate) fn authorization_for(user_id: &str) -> String {
        serde_json::to_string(&assertion_for(user_id, Utc::now().timestamp())).unwrap()
    }

    #[test]
    fn valid_assertion_identifies_caller() {
        let now = 1_700_000_000;
        let caller = verify_assertion(&assertion_for("user_1", now - 10), &settings(), now);

        assert_eq!(
            caller,
            Some(Caller {
                id: "user_1".to_string()
            })
        );
    }

    #[test]
    fn tampered_assertion_is_rejected() {
        let now = 1_700_000_000;
        let mut assertion = assertion_for("user_1", now);
        assertion.id = "user_2".to_string();

        assert_eq!(verify_assertion(&assertion, &settings(), now), None);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = 1_700_000_000;
        let mut assertion = assertion_for("user_1", now);
        assertion.hash = sign_assertion(&assertion, "someone-else");

        assert_eq!(verify_assertion(&assertion, &settings(), now), None);
    }

    #[test]
    fn non_hex_hash_is_rejected() {
        let now = 1_700_000_000;
        let mut assertion = assertion_for("user_1", now);
        assertion.hash = "zz".repeat(32);

        assert_eq!(verify_assertion(&assertion, &settings(), now), None);
    }

    #[test]
    fn stale_assertion_is_rejected_unless_age_is_unchecked() {
        let now = 1_700_000_000;
        let assertion = assertion_for("user_1", now - 7200);

        assert_eq!(verify_assertion(&assertion, &settings(), now), None);

        let unlimited = Auth {
            max_age_secs: 0,
            ..settings()
        };
        assert!(verify_assertion(&assertion, &unlimited, now).is_some());
    }

    #[test]
    fn header_is_required() {
        let request = TestRequest::default().to_http_request();
        assert_eq!(check_authorization(&request, &settings()), None);

        let request = TestRequest::default()
            .insert_header((actix_web::http::header::AUTHORIZATION, "Bearer nope"))
            .to_http_request();
        assert_eq!(check_authorization(&request, &settings()), None);
    }

    #[test]
    fn header_with_signed_assertion_is_accepted() {
        let request = TestRequest::default()
            .insert_header((
                actix_web::http::header::AUTHORIZATION,
                authorization_for("user_9"),
            ))
            .to_http_request();

        assert_eq!(
            check_authorization(&request, &settings()).map(|caller| caller.id),
            Some("user_9".to_string())
        );
    }
}
