//! Access/refresh token issuance and the refresh-token rotation ledger.
//!
//! Access tokens are stateless: signature and expiry are the whole story.
//! Refresh tokens additionally carry a `jti` that must match a row in
//! `token_blacklist`; rotation moves the row to a new `jti` with a single
//! conditional UPDATE, so a given refresh token is usable exactly once.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    config::Config,
    error::{AppError, Result},
};

pub const TOKEN_TYPE_ACCESS: &str = "access";
pub const TOKEN_TYPE_REFRESH: &str = "refresh";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User email
    pub sub: String,
    /// User id
    pub id: String,
    pub role: String,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    pub exp: usize,
}

pub struct RefreshToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

pub fn issue_access_token(config: &Config, user_id: &str, email: &str, role: &str) -> Result<String> {
    let expires_at = Utc::now() + Duration::minutes(config.access_token_minutes);
    let claims = Claims {
        sub: email.to_string(),
        id: user_id.to_string(),
        role: role.to_string(),
        token_type: TOKEN_TYPE_ACCESS.to_string(),
        jti: None,
        exp: expires_at.timestamp() as usize,
    };
    sign(config, &claims)
}

pub fn issue_refresh_token(
    config: &Config,
    user_id: &str,
    email: &str,
    role: &str,
) -> Result<RefreshToken> {
    let expires_at = Utc::now() + Duration::days(config.refresh_token_days);
    let jti = Uuid::new_v4().to_string();
    let claims = Claims {
        sub: email.to_string(),
        id: user_id.to_string(),
        role: role.to_string(),
        token_type: TOKEN_TYPE_REFRESH.to_string(),
        jti: Some(jti.clone()),
        exp: expires_at.timestamp() as usize,
    };
    Ok(RefreshToken {
        token: sign(config, &claims)?,
        jti,
        expires_at,
    })
}

fn sign(config: &Config, claims: &Claims) -> Result<String> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|_| AppError::Internal("Failed to create token".to_string()))
}

/// Verifies signature and expiry. Callers wanting a specific kind check
/// `token_type` (or use [`verify_refresh`]).
pub fn verify_token(config: &Config, token: &str) -> Result<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized)
}

/// Verifies a refresh token and returns its claims with the `jti`
/// guaranteed present.
pub fn verify_refresh(config: &Config, token: &str) -> Result<(Claims, String)> {
    let claims = verify_token(config, token)?;
    if claims.token_type != TOKEN_TYPE_REFRESH {
        return Err(AppError::Unauthorized);
    }
    match claims.jti.clone() {
        Some(jti) => Ok((claims, jti)),
        None => Err(AppError::Unauthorized),
    }
}

/// Records a freshly issued session in the rotation ledger.
pub async fn record_session(
    pool: &SqlitePool,
    jti: &str,
    user_id: &str,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("INSERT INTO token_blacklist (id, jti, user_id, expires_at) VALUES (?, ?, ?, ?)")
        .bind(Uuid::new_v4().to_string())
        .bind(jti)
        .bind(user_id)
        .bind(expires_at.to_rfc3339())
        .execute(pool)
        .await?;
    Ok(())
}

/// Moves the ledger row from `old_jti` to `new_jti` in one conditional
/// UPDATE. Returns false when no row matched, i.e. the presented token
/// was never issued, already rotated past, or logged out. Two concurrent
/// rotations of the same jti cannot both succeed: the first UPDATE moves
/// the row, the second matches nothing.
pub async fn rotate_session(
    pool: &SqlitePool,
    old_jti: &str,
    new_jti: &str,
    new_expires_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query("UPDATE token_blacklist SET jti = ?, expires_at = ? WHERE jti = ?")
        .bind(new_jti)
        .bind(new_expires_at.to_rfc3339())
        .bind(old_jti)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Removes the ledger row for `jti`. Idempotent: revoking an absent
/// session succeeds.
pub async fn revoke_session(pool: &SqlitePool, jti: &str) -> Result<()> {
    sqlx::query("DELETE FROM token_blacklist WHERE jti = ?")
        .bind(jti)
        .execute(pool)
        .await?;
    Ok(())
}
