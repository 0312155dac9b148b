use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Identity carried inside the token, as issued by the users service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    pub username: String,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// JWT Claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub payload: TokenPayload,
    pub iat: i64,
    pub exp: i64,
}

/// Sign a token for `payload`, valid for `ttl_secs` from now.
pub fn sign(payload: &TokenPayload, secret: &str, ttl_secs: u64) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX / 2);
    let claims = Claims {
        payload: payload.clone(),
        iat: now,
        exp: now.saturating_add(ttl),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verify and decode a token.
pub fn verify(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}
