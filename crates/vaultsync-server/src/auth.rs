use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use constant_time_eq::constant_time_eq;

use crate::{error::ApiError, AppState};

/// Static credentials read once at startup. With neither scheme configured
/// the gate is open.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// `Authorization: Bearer <token>`. Takes precedence over basic auth
    /// when both are configured.
    pub api_token: Option<String>,
    /// `Authorization: Basic base64(user:password)`.
    pub basic: Option<(String, String)>,
}

impl AuthConfig {
    pub fn is_open(&self) -> bool {
        self.api_token.is_none() && self.basic.is_none()
    }
}

/// Which scheme a rejected request should be challenged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Challenge {
    Bearer,
    Basic,
}

impl Challenge {
    pub fn header_value(&self) -> &'static str {
        match self {
            Challenge::Bearer => r#"Bearer realm="vaultsync""#,
            Challenge::Basic => r#"Basic realm="vaultsync""#,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Challenge::Bearer => "Unauthorized: invalid bearer token",
            Challenge::Basic => "Unauthorized: invalid credentials",
        }
    }
}

/// Check an `Authorization` header value against the configured credentials.
pub fn check(auth: &AuthConfig, header: Option<&str>) -> Result<(), Challenge> {
    if let Some(expected) = &auth.api_token {
        let presented = header.and_then(|h| h.strip_prefix("Bearer "));
        return match presented {
            Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => Ok(()),
            _ => Err(Challenge::Bearer),
        };
    }

    if let Some((user, password)) = &auth.basic {
        let presented = header
            .and_then(|h| h.strip_prefix("Basic "))
            .and_then(|b64| BASE64.decode(b64).ok())
            .and_then(|bytes| String::from_utf8(bytes).ok());
        return match presented.as_deref().and_then(|s| s.split_once(':')) {
            Some((u, p))
                if constant_time_eq(u.as_bytes(), user.as_bytes())
                    && constant_time_eq(p.as_bytes(), password.as_bytes()) =>
            {
                Ok(())
            }
            _ => Err(Challenge::Basic),
        };
    }

    Ok(())
}

/// Axum middleware wrapping the mutating routes (upload, download, clear).
pub async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match check(&state.auth, header) {
        Ok(()) => next.run(request).await,
        Err(challenge) => ApiError::Unauthorized(challenge).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_auth() -> AuthConfig {
        AuthConfig {
            api_token: Some("sekrit".into()),
            basic: None,
        }
    }

    fn basic_auth() -> AuthConfig {
        AuthConfig {
            api_token: None,
            basic: Some(("alice".into(), "pw".into())),
        }
    }

    #[test]
    fn open_when_nothing_configured() {
        assert_eq!(check(&AuthConfig::default(), None), Ok(()));
        assert_eq!(check(&AuthConfig::default(), Some("Bearer junk")), Ok(()));
    }

    #[test]
    fn bearer_exact_match_required() {
        assert_eq!(check(&token_auth(), Some("Bearer sekrit")), Ok(()));
        assert_eq!(
            check(&token_auth(), Some("Bearer wrong")),
            Err(Challenge::Bearer)
        );
        assert_eq!(check(&token_auth(), None), Err(Challenge::Bearer));
        // Scheme mismatch counts as missing credentials.
        assert_eq!(
            check(&token_auth(), Some("Basic c2Vrcml0")),
            Err(Challenge::Bearer)
        );
    }

    #[test]
    fn basic_credentials_checked() {
        let header = format!("Basic {}", BASE64.encode("alice:pw"));
        assert_eq!(check(&basic_auth(), Some(&header)), Ok(()));

        let bad = format!("Basic {}", BASE64.encode("alice:nope"));
        assert_eq!(check(&basic_auth(), Some(&bad)), Err(Challenge::Basic));
        assert_eq!(check(&basic_auth(), None), Err(Challenge::Basic));
        assert_eq!(
            check(&basic_auth(), Some("Basic not-base64!!")),
            Err(Challenge::Basic)
        );
    }

    #[test]
    fn bearer_takes_precedence_over_basic() {
        let both = AuthConfig {
            api_token: Some("tok".into()),
            basic: Some(("alice".into(), "pw".into())),
        };
        // Valid basic credentials do not satisfy a bearer-configured gate.
        let basic_header = format!("Basic {}", BASE64.encode("alice:pw"));
        assert_eq!(check(&both, Some(&basic_header)), Err(Challenge::Bearer));
        assert_eq!(check(&both, Some("Bearer tok")), Ok(()));
    }
}
