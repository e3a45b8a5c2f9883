use std::fmt;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Driver,
    Dispatcher,
    Admin,
}

impl Role {
    /// Accepts both the bare role name and the `ROLE_`-prefixed form, in any case.
    pub fn parse(raw: &str) -> Option<Self> {
        let upper = raw.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix("ROLE_").unwrap_or(&upper);
        match bare {
            "DRIVER" => Some(Self::Driver),
            "DISPATCHER" => Some(Self::Dispatcher),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Driver => "DRIVER",
            Self::Dispatcher => "DISPATCHER",
            Self::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DRIVER_ONLY: &[Role] = &[Role::Driver];
pub const DISPATCH_ROLES: &[Role] = &[Role::Dispatcher, Role::Admin];
pub const ANY_ROLE: &[Role] = &[Role::Driver, Role::Dispatcher, Role::Admin];

/// Verified caller identity bound to a connection or request. Handlers receive
/// it by value alongside each message; nothing downstream re-reads the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthRejected {
    #[error("missing credential")]
    MissingToken,

    #[error("invalid credential: {0}")]
    InvalidToken(String),

    #[error("credential expired")]
    Expired,

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("role {0} is not allowed on this channel")]
    RoleNotAllowed(Role),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: String,
    exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<String>,
}

#[derive(Clone)]
pub struct SessionAuthenticator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SessionAuthenticator {
    pub fn new(secret: &str, issuer: Option<&str>, leeway_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway_secs;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.jwt_secret,
            config.jwt_issuer.as_deref(),
            config.jwt_leeway_secs,
        )
    }

    /// Verifies `credential` and checks the caller's role against `allowed`.
    /// Fails closed: there is no anonymous or partially verified identity.
    pub fn authenticate(
        &self,
        credential: Option<&str>,
        allowed: &[Role],
    ) -> Result<SessionIdentity, AuthRejected> {
        let token = credential
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthRejected::MissingToken)?;

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthRejected::Expired,
                _ => AuthRejected::InvalidToken(err.to_string()),
            })?;

        let claims = data.claims;
        if claims.sub.trim().is_empty() {
            return Err(AuthRejected::InvalidToken("empty subject".to_string()));
        }

        let role = Role::parse(&claims.role).ok_or(AuthRejected::UnknownRole(claims.role))?;
        if !allowed.contains(&role) {
            return Err(AuthRejected::RoleNotAllowed(role));
        }

        Ok(SessionIdentity {
            user_id: claims.sub,
            role,
        })
    }
}

/// Pulls the credential from an `Authorization: Bearer` header, falling back to
/// the `token` query parameter used by browser WebSocket clients.
pub fn credential_from_request<'a>(
    headers: &'a HeaderMap,
    query_token: Option<&'a str>,
) -> Option<&'a str> {
    let from_header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token);

    from_header.or(query_token)
}

/// The auth scheme name is case-insensitive (RFC 9110).
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Mints an HS256 credential. Production tokens come from the identity
/// service; this exists for tests and local tooling.
pub fn issue_token(
    secret: &str,
    subject: &str,
    role: &str,
    issuer: Option<&str>,
    ttl_secs: i64,
) -> Result<String, AuthRejected> {
    let exp = (Utc::now().timestamp() + ttl_secs).max(0) as u64;
    let claims = Claims {
        sub: subject.to_string(),
        role: role.to_string(),
        exp,
        iss: issuer.map(str::to_string),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|err| AuthRejected::InvalidToken(err.to_string()))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderMap;

    use super::*;

    const SECRET: &str = "unit-test-secret";

    fn authenticator() -> SessionAuthenticator {
        SessionAuthenticator::new(SECRET, None, 0)
    }

    #[test]
    fn accepts_driver_token_on_driver_channel() {
        let token = issue_token(SECRET, "D1", "DRIVER", None, 600).unwrap();
        let identity = authenticator()
            .authenticate(Some(&token), DRIVER_ONLY)
            .unwrap();

        assert_eq!(identity.user_id, "D1");
        assert_eq!(identity.role, Role::Driver);
    }

    #[test]
    fn accepts_prefixed_role_names() {
        let token = issue_token(SECRET, "D1", "role_driver", None, 600).unwrap();
        assert!(authenticator().authenticate(Some(&token), DRIVER_ONLY).is_ok());
        assert_eq!(Role::parse("ROLE_DISPATCHER"), Some(Role::Dispatcher));
        assert_eq!(Role::parse("Admin"), Some(Role::Admin));
        assert_eq!(Role::parse("courier"), None);
    }

    #[test]
    fn rejects_missing_and_blank_tokens() {
        assert_eq!(
            authenticator().authenticate(None, DRIVER_ONLY),
            Err(AuthRejected::MissingToken)
        );
        assert_eq!(
            authenticator().authenticate(Some("  "), DRIVER_ONLY),
            Err(AuthRejected::MissingToken)
        );
    }

    #[test]
    fn rejects_wrong_role() {
        let token = issue_token(SECRET, "U7", "DISPATCHER", None, 600).unwrap();
        assert_eq!(
            authenticator().authenticate(Some(&token), DRIVER_ONLY),
            Err(AuthRejected::RoleNotAllowed(Role::Dispatcher))
        );
    }

    #[test]
    fn rejects_unknown_role() {
        let token = issue_token(SECRET, "U7", "GUEST", None, 600).unwrap();
        assert_eq!(
            authenticator().authenticate(Some(&token), ANY_ROLE),
            Err(AuthRejected::UnknownRole("GUEST".to_string()))
        );
    }

    #[test]
    fn rejects_expired_token() {
        let token = issue_token(SECRET, "D1", "DRIVER", None, -3600).unwrap();
        assert_eq!(
            authenticator().authenticate(Some(&token), DRIVER_ONLY),
            Err(AuthRejected::Expired)
        );
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let token = issue_token("someone-else", "D1", "DRIVER", None, 600).unwrap();
        assert!(matches!(
            authenticator().authenticate(Some(&token), DRIVER_ONLY),
            Err(AuthRejected::InvalidToken(_))
        ));
    }

    #[test]
    fn rejects_malformed_token() {
        assert!(matches!(
            authenticator().authenticate(Some("not.a.jwt"), DRIVER_ONLY),
            Err(AuthRejected::InvalidToken(_))
        ));
    }

    #[test]
    fn enforces_issuer_when_configured() {
        let strict = SessionAuthenticator::new(SECRET, Some("fleet-auth"), 0);
        let good = issue_token(SECRET, "D1", "DRIVER", Some("fleet-auth"), 600).unwrap();
        let bad = issue_token(SECRET, "D1", "DRIVER", Some("elsewhere"), 600).unwrap();

        assert!(strict.authenticate(Some(&good), DRIVER_ONLY).is_ok());
        assert!(strict.authenticate(Some(&bad), DRIVER_ONLY).is_err());
    }

    #[test]
    fn header_credential_takes_precedence_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer from-header".parse().unwrap());

        assert_eq!(
            credential_from_request(&headers, Some("from-query")),
            Some("from-header")
        );
        assert_eq!(
            credential_from_request(&HeaderMap::new(), Some("from-query")),
            Some("from-query")
        );
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        for value in ["bearer abc", "BEARER abc", "Bearer   abc"] {
            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, value.parse().unwrap());
            assert_eq!(credential_from_request(&headers, None), Some("abc"), "{value}");
        }

        let mut basic = HeaderMap::new();
        basic.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(credential_from_request(&basic, Some("q")), Some("q"));
    }
}
