use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::services::quota::Plan;
use crate::state::AppState;
use crate::utils::jwt::{self, Claims};

/// Authenticated user taken from the verified bearer token.
///
/// The token refresh middleware stores the verified [`Claims`] in the request
/// extensions; when it did not run, the header is verified here instead.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub username: String,
    /// `None` when the token carries no plan or one this service does not know.
    pub plan: Option<Plan>,
    pub role: Option<String>,
}

impl AuthUser {
    /// Returns `Ok(())` if the caller is `owner`, `Err(PermissionDenied(message))` otherwise.
    pub fn require_owner(&self, owner: &str, message: &str) -> Result<(), AppError> {
        if self.username == owner {
            Ok(())
        } else {
            Err(AppError::PermissionDenied(message.to_string()))
        }
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        let payload = claims.payload;
        Self {
            plan: payload.plan.as_deref().and_then(Plan::parse),
            username: payload.username,
            role: payload.role,
        }
    }
}

/// Verify the `Authorization: Bearer <token>` header.
pub fn bearer_claims(parts: &Parts, secret: &str) -> Result<Claims, AppError> {
    let auth_header = parts
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::TokenMissing)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::TokenInvalid)?;

    jwt::verify(token, secret).map_err(|_| AppError::TokenInvalid)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(claims) = parts.extensions.get::<Claims>() {
            return Ok(claims.clone().into());
        }
        Ok(bearer_claims(parts, &state.config.auth.jwt_secret)?.into())
    }
}
