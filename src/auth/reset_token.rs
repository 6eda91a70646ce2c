/// Password reset tokens.
///
/// Single-use, one-hour tokens. Consuming one updates the password hash,
/// marks the token used, and revokes every refresh token the user holds —
/// all in one transaction, so a partial failure changes nothing.
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AuthError};

const RESET_TOKEN_LENGTH: usize = 64;
const RESET_TOKEN_EXPIRY_HOURS: i64 = 1;

/// Generate a cryptographically random reset token.
pub fn generate_reset_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RESET_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Issue a reset token for a user and persist it.
pub async fn create_password_reset(pool: &PgPool, user_id: Uuid) -> Result<String, AppError> {
    let token = generate_reset_token();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO password_resets (id, user_id, token, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(&token)
    .bind(now + Duration::hours(RESET_TOKEN_EXPIRY_HOURS))
    .bind(now)
    .execute(pool)
    .await?;

    Ok(token)
}

/// Redeem a reset token against a pre-hashed replacement password.
///
/// Rejects tokens that are unknown, already used, or expired. On success
/// the password update, the used_at stamp, and the revocation of all of the
/// user's refresh tokens commit together. Returns the affected user's ID so
/// the caller can evict cached session state.
pub async fn consume_password_reset(
    pool: &PgPool,
    token: &str,
    new_password_hash: &str,
) -> Result<Uuid, AppError> {
    let row = sqlx::query_as::<_, (Uuid, Uuid, DateTime<Utc>, Option<DateTime<Utc>>)>(
        r#"
        SELECT id, user_id, expires_at, used_at
        FROM password_resets
        WHERE token = $1
        "#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    let (reset_id, user_id, expires_at, used_at) = match row {
        None => {
            tracing::warn!("Unknown password reset token presented");
            return Err(AppError::Auth(AuthError::ResetTokenInvalid));
        }
        Some(row) => row,
    };

    if used_at.is_some() {
        tracing::warn!(user_id = %user_id, "Attempt to reuse a consumed reset token");
        return Err(AppError::Auth(AuthError::ResetTokenInvalid));
    }

    let now = Utc::now();
    if expires_at < now {
        tracing::info!(user_id = %user_id, "Expired reset token presented");
        return Err(AppError::Auth(AuthError::ResetTokenInvalid));
    }

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE users
        SET password_hash = $1, updated_at = $2
        WHERE id = $3
        "#,
    )
    .bind(new_password_hash)
    .bind(now)
    .bind(user_id)
    .execute(&mut tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE password_resets
        SET used_at = $1
        WHERE id = $2
        "#,
    )
    .bind(now)
    .bind(reset_id)
    .execute(&mut tx)
    .await?;

    // Credential change invalidates every open session.
    sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked_at = $1
        WHERE user_id = $2 AND revoked_at IS NULL
        "#,
    )
    .bind(now)
    .bind(user_id)
    .execute(&mut tx)
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %user_id, "Password reset completed, all sessions revoked");
    Ok(user_id)
}
