/// Refresh token ledger.
///
/// Every issued refresh token has a row keyed by its jti, storing a SHA-256
/// digest of the token string (never the plaintext), the expiry, and a
/// nullable revocation timestamp. Presenting a token that is absent,
/// revoked, or past its expiry fails closed. Rotation revokes the old row
/// and inserts its replacement inside one transaction, so a crash cannot
/// leave a token revoked without a successor on the way to the client.
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AuthError};

/// Hash a refresh token for storage and lookup.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Persist a newly issued refresh token.
pub async fn save_refresh_token(
    pool: &PgPool,
    token_id: Uuid,
    user_id: Uuid,
    token: &str,
    expiry_seconds: i64,
) -> Result<(), AppError> {
    let token_hash = hash_token(token);
    let expires_at = Utc::now() + Duration::seconds(expiry_seconds);

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(token_id)
    .bind(user_id)
    .bind(token_hash)
    .bind(expires_at)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Look up a presented refresh token in the ledger and check its state.
///
/// Returns the owning user's ID. Fails closed: a token that is unknown,
/// revoked, or expired is rejected with Unauthorized.
pub async fn check_stored_token(pool: &PgPool, token: &str) -> Result<Uuid, AppError> {
    let token_hash = hash_token(token);

    let result = sqlx::query_as::<_, (Uuid, DateTime<Utc>, Option<DateTime<Utc>>)>(
        r#"
        SELECT user_id, expires_at, revoked_at
        FROM refresh_tokens
        WHERE token_hash = $1
        "#,
    )
    .bind(&token_hash)
    .fetch_optional(pool)
    .await?;

    match result {
        None => {
            tracing::warn!("Refresh token not found in ledger");
            Err(AppError::Auth(AuthError::TokenInvalid))
        }
        Some((user_id, expires_at, revoked_at)) => {
            if revoked_at.is_some() {
                tracing::warn!(user_id = %user_id, "Attempt to use revoked refresh token");
                return Err(AppError::Auth(AuthError::TokenInvalid));
            }

            if expires_at < Utc::now() {
                tracing::info!(user_id = %user_id, "Refresh token expired");
                return Err(AppError::Auth(AuthError::TokenExpired));
            }

            Ok(user_id)
        }
    }
}

/// Rotate a refresh token: revoke the old row and persist the replacement
/// in a single transaction.
pub async fn rotate_refresh_token(
    pool: &PgPool,
    old_token: &str,
    new_token_id: Uuid,
    user_id: Uuid,
    new_token: &str,
    expiry_seconds: i64,
) -> Result<(), AppError> {
    let old_hash = hash_token(old_token);
    let new_hash = hash_token(new_token);
    let expires_at = Utc::now() + Duration::seconds(expiry_seconds);
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked_at = $1
        WHERE token_hash = $2 AND revoked_at IS NULL
        "#,
    )
    .bind(now)
    .bind(&old_hash)
    .execute(&mut tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(new_token_id)
    .bind(user_id)
    .bind(&new_hash)
    .bind(expires_at)
    .bind(now)
    .execute(&mut tx)
    .await?;

    tx.commit().await?;

    Ok(())
}

/// Revoke a single refresh token, e.g. on logout. Revoking a token that is
/// already revoked or unknown is a no-op.
pub async fn revoke_refresh_token(pool: &PgPool, token: &str) -> Result<(), AppError> {
    let token_hash = hash_token(token);

    sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked_at = $1
        WHERE token_hash = $2 AND revoked_at IS NULL
        "#,
    )
    .bind(Utc::now())
    .bind(token_hash)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_hashing() {
        let token = "some.refresh.token";
        let hash1 = hash_token(token);
        let hash2 = hash_token(token);

        // Same token should produce same hash
        assert_eq!(hash1, hash2);
        // Hash should not equal plaintext
        assert_ne!(token, hash1);
        // Hash should be 64 chars (SHA-256 hex)
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_tokens_different_hashes() {
        assert_ne!(hash_token("token-one"), hash_token("token-two"));
    }
}
