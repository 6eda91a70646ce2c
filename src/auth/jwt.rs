/// JWT encoding and validation for both token kinds.
///
/// Every decode failure, whatever the underlying jsonwebtoken error kind,
/// is reported as an invalid token; callers translate that to a uniform 401.
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::{AccessClaims, RefreshClaims};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};
use crate::models::UserRole;

/// Generate a new access token for a user.
pub fn generate_access_token(
    user_id: Uuid,
    role: UserRole,
    profile_id: Option<Uuid>,
    config: &JwtSettings,
) -> Result<String, AppError> {
    let claims = AccessClaims::new(
        user_id,
        role,
        profile_id,
        config.access_token_expiry,
        config.issuer.clone(),
    );

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

/// Generate a new refresh token. The returned token ID keys the ledger row
/// the caller persists alongside.
pub fn generate_refresh_token(user_id: Uuid, config: &JwtSettings) -> Result<(String, Uuid), AppError> {
    let token_id = Uuid::new_v4();
    let claims = RefreshClaims::new(
        user_id,
        token_id,
        config.refresh_token_expiry,
        config.issuer.clone(),
    );

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

    Ok((token, token_id))
}

/// Validate and extract claims from an access token.
pub fn validate_access_token(token: &str, config: &JwtSettings) -> Result<AccessClaims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);

    decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::warn!("Access token validation error: {}", e);
        AppError::Auth(AuthError::TokenInvalid)
    })
}

/// Validate the signature and lifetime of a refresh token. Ledger state
/// (revocation, server-side expiry) is checked separately against storage.
pub fn validate_refresh_token(token: &str, config: &JwtSettings) -> Result<RefreshClaims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);

    decode::<RefreshClaims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::warn!("Refresh token validation error: {}", e);
        AppError::Auth(AuthError::TokenInvalid)
    })
}
