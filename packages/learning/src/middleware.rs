use axum::{
    extract::{Request, State},
    http::{HeaderValue, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::error::AppError;
use crate::extractors::auth::bearer_claims;
use crate::state::AppState;
use crate::utils::jwt;

/// Routes reachable without a token.
pub const PUBLIC_PATHS: [&str; 2] = ["/v1/classes/check", "/v1/materials/check"];

/// Verify the bearer token and hand a freshly signed one back on the response.
///
/// Requests without a valid token are rejected with 401 before reaching the
/// handler. The verified claims are stored in the request extensions for
/// [`crate::extractors::auth::AuthUser`].
pub async fn refresh_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let (mut parts, body) = request.into_parts();
    let claims = bearer_claims(&parts, &state.config.auth.jwt_secret)?;
    let fresh = jwt::sign(
        &claims.payload,
        &state.config.auth.jwt_secret,
        state.config.auth.token_ttl_secs,
    )
    .map_err(|e| AppError::Internal(format!("Failed to sign token: {e}")))?;
    parts.extensions.insert(claims);

    let mut response = next.run(Request::from_parts(parts, body)).await;
    match HeaderValue::from_str(&format!("Bearer {fresh}")) {
        Ok(value) => {
            response.headers_mut().insert(AUTHORIZATION, value);
        }
        Err(e) => warn!(error = %e, "Refreshed token is not a valid header value"),
    }
    Ok(response)
}
