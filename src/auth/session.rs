/// Token issuance and rotation.
///
/// The single place that mints an access/refresh pair: persists the refresh
/// token's ledger row and primes the session cache with the access token.
/// Login, signup, and refresh all go through here so the side effects stay
/// in lockstep.
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::jwt::{generate_access_token, generate_refresh_token};
use crate::auth::refresh_token::{rotate_refresh_token, save_refresh_token};
use crate::configuration::JwtSettings;
use crate::error::AppError;
use crate::models::UserRole;
use crate::session_cache::SessionCache;

/// A freshly minted token pair.
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Mint a token pair for a user: new access + refresh JWTs, a ledger row
/// for the refresh token, and a session-cache entry for the access token.
pub async fn issue_tokens(
    pool: &PgPool,
    cache: &SessionCache,
    jwt_config: &JwtSettings,
    user_id: Uuid,
    role: UserRole,
    profile_id: Option<Uuid>,
) -> Result<IssuedTokens, AppError> {
    let access_token = generate_access_token(user_id, role, profile_id, jwt_config)?;
    let (refresh_token, token_id) = generate_refresh_token(user_id, jwt_config)?;

    save_refresh_token(
        pool,
        token_id,
        user_id,
        &refresh_token,
        jwt_config.refresh_token_expiry,
    )
    .await?;

    cache.store(user_id, &access_token, jwt_config.access_token_expiry);

    Ok(IssuedTokens {
        access_token,
        refresh_token,
    })
}

/// Mint a replacement pair for a redeemed refresh token. The old ledger row
/// is revoked and the new one inserted atomically; the caller has already
/// checked the old token's signature and ledger state.
pub async fn rotate_tokens(
    pool: &PgPool,
    cache: &SessionCache,
    jwt_config: &JwtSettings,
    old_refresh_token: &str,
    user_id: Uuid,
    role: UserRole,
    profile_id: Option<Uuid>,
) -> Result<IssuedTokens, AppError> {
    let access_token = generate_access_token(user_id, role, profile_id, jwt_config)?;
    let (refresh_token, token_id) = generate_refresh_token(user_id, jwt_config)?;

    rotate_refresh_token(
        pool,
        old_refresh_token,
        token_id,
        user_id,
        &refresh_token,
        jwt_config.refresh_token_expiry,
    )
    .await?;

    cache.store(user_id, &access_token, jwt_config.access_token_expiry);

    Ok(IssuedTokens {
        access_token,
        refresh_token,
    })
}
