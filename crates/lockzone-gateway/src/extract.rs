//! Request extractors and policy gates.

use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use lockzone_core::{Id, Principal};
use lockzone_guard::UserStore;
use lockzone_token::{Claims, TokenType};

use crate::state::AuthState;

/// Rejection for authentication and authorization failures.
///
/// Authentication problems answer 401, authorization problems 403; the
/// split mirrors the two failure channels of the core.
#[derive(Debug, thiserror::Error)]
pub enum AuthRejection {
    /// No token on the request.
    #[error("Missing authentication token")]
    MissingToken,

    /// Token malformed, expired, revoked, or unknown subject.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Authenticated, but not allowed.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

/// Error response body for auth failures.
#[derive(Debug, Serialize)]
struct AuthErrorBody {
    error: String,
    code: &'static str,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::MissingToken => (StatusCode::UNAUTHORIZED, "missing_token"),
            Self::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token"),
            Self::PermissionDenied(_) => (StatusCode::FORBIDDEN, "permission_denied"),
        };

        let body = AuthErrorBody {
            error: self.to_string(),
            code,
        };

        (status, Json(body)).into_response()
    }
}

/// Extract the token from an `Authorization` header value.
///
/// Expects the `Bearer <token>` form.
#[must_use]
pub fn extract_bearer(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
}

/// Pull a token off request parts.
///
/// The `Authorization` header wins; a `token` query parameter is the
/// fallback for clients that cannot set headers.
#[must_use]
pub fn token_from_parts(parts: &Parts) -> Option<String> {
    if let Some(header) = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        return extract_bearer(header).map(ToString::to_string);
    }

    parts
        .uri
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|token| !token.is_empty())
        .map(ToString::to_string)
}

/// Extractor for authenticated requests.
///
/// Use in handler parameters to require a valid, unrevoked token bound
/// to an active principal.
#[derive(Debug, Clone)]
pub struct RequireAuth {
    /// The authenticated principal.
    pub principal: Principal,
    /// The validated token claims.
    pub claims: Claims,
}

impl RequireAuth {
    /// The authenticated principal's identifier.
    #[must_use]
    pub fn id(&self) -> &Id {
        &self.principal.id
    }

    /// Role query against the principal.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.principal.has_role(role)
    }

    /// Permission query against the principal.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.principal.has_permission(permission)
    }

    /// Continue only if the principal holds the role.
    ///
    /// # Errors
    ///
    /// Returns [`AuthRejection::PermissionDenied`] otherwise.
    pub fn require_role(&self, role: &str) -> Result<(), AuthRejection> {
        if self.has_role(role) {
            Ok(())
        } else {
            Err(AuthRejection::PermissionDenied(format!(
                "{role} role required"
            )))
        }
    }

    /// Continue only if the principal holds the permission.
    ///
    /// # Errors
    ///
    /// Returns [`AuthRejection::PermissionDenied`] otherwise.
    pub fn require_permission(&self, permission: &str) -> Result<(), AuthRejection> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(AuthRejection::PermissionDenied(format!(
                "{permission} permission required"
            )))
        }
    }
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
    Arc<AuthState>: FromRef<S>,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = Arc::<AuthState>::from_ref(state);
        extract_auth(parts, &auth_state)
    }
}

fn extract_auth(parts: &Parts, state: &AuthState) -> Result<RequireAuth, AuthRejection> {
    if !state.config.enabled {
        return Ok(disabled_auth());
    }

    let token = token_from_parts(parts).ok_or(AuthRejection::MissingToken)?;

    let claims = state
        .codec()
        .decode(&token)
        .ok_or(AuthRejection::InvalidToken)?;

    let jti = claims.jti.as_deref().ok_or(AuthRejection::InvalidToken)?;
    if state.revocations().has(jti) {
        tracing::warn!(jti = %jti, "Revoked token presented to gateway");
        return Err(AuthRejection::InvalidToken);
    }

    let principal = state
        .store()
        .retrieve_by_id(&Id::from_subject(&claims.sub))
        .ok_or(AuthRejection::InvalidToken)?;

    if !principal.active {
        return Err(AuthRejection::PermissionDenied(
            "Account disabled".to_string(),
        ));
    }

    Ok(RequireAuth { principal, claims })
}

/// Stand-in identity when authentication is disabled by configuration.
fn disabled_auth() -> RequireAuth {
    RequireAuth {
        principal: Principal::new("system").with_permission("*"),
        claims: Claims {
            sub: "system".to_string(),
            iat: 0,
            exp: i64::MAX,
            iss: None,
            token_type: TokenType::Access,
            jti: None,
            custom: serde_json::Map::new(),
        },
    }
}

/// Extractor for optional authentication.
///
/// `None` when no valid auth is present; never rejects.
#[derive(Debug, Clone)]
pub struct OptionalAuth(pub Option<RequireAuth>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
    Arc<AuthState>: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuth(
            RequireAuth::from_request_parts(parts, state).await.ok(),
        ))
    }
}

/// Extractor that additionally requires the `admin` role.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub RequireAuth);

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
    Arc<AuthState>: FromRef<S>,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = RequireAuth::from_request_parts(parts, state).await?;
        auth.require_role("admin")?;
        Ok(RequireAdmin(auth))
    }
}
