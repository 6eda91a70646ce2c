/// Email verification routes. Both require an authenticated caller.
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;

use crate::auth::{code_expired, cooldown_active, generate_verification_code, AccessClaims};
use crate::configuration::Settings;
use crate::email_client::EmailClient;
use crate::error::{AppError, AuthError, DatabaseError};
use crate::models::User;

#[derive(Deserialize)]
pub struct VerifyConfirmBody {
    pub code: String,
}

async fn fetch_user(pool: &PgPool, claims: &AccessClaims) -> Result<User, AppError> {
    let user_id = claims.user_id()?;

    sqlx::query_as::<_, User>(
        "SELECT id, email, username, password_hash, role, is_active, email_verified, \
         verification_code, verification_sent_at, created_at FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::Database(DatabaseError::NotFound(
        "User not found".to_string(),
    )))
}

/// POST /auth/verify-email/request
///
/// Stores a fresh 6-character code and emails it. The sent-at timestamp
/// anchors both the resend cooldown and the code's expiry.
///
/// # Errors
/// - 403: a code was sent within the cooldown window
/// - 409: email already verified
pub async fn request_verification(
    claims: web::ReqData<AccessClaims>,
    pool: web::Data<PgPool>,
    email_client: web::Data<EmailClient>,
    settings: web::Data<Settings>,
) -> Result<HttpResponse, AppError> {
    let user = fetch_user(pool.get_ref(), &claims).await?;

    if user.email_verified {
        return Err(AppError::Auth(AuthError::AlreadyVerified));
    }

    if cooldown_active(
        user.verification_sent_at,
        settings.verification.code_cooldown_seconds,
    ) {
        return Err(AppError::Auth(AuthError::ResendCooldown));
    }

    let code = generate_verification_code();
    let now = Utc::now();

    sqlx::query(
        r#"
        UPDATE users
        SET verification_code = $1, verification_sent_at = $2, updated_at = $2
        WHERE id = $3
        "#,
    )
    .bind(&code)
    .bind(now)
    .bind(user.id)
    .execute(pool.get_ref())
    .await?;

    let body = format!(
        "<p>Your Panelhub verification code is: <strong>{}</strong></p>\
         <p>It expires in {} hours.</p>",
        code, settings.verification.code_expiry_hours
    );
    if let Err(e) = email_client
        .send_email(&user.email, "Verify your Panelhub email", &body)
        .await
    {
        tracing::warn!(user_id = %user.id, error = %e, "Failed to send verification email");
    }

    tracing::info!(user_id = %user.id, "Verification code issued");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Verification code sent"
    })))
}

/// POST /auth/verify-email/confirm
///
/// Checks the submitted code against the stored one and the expiry window.
/// A configured bypass code, when present, is accepted for any account;
/// the shipped configuration leaves it unset.
///
/// # Errors
/// - 401: wrong or expired code
/// - 409: email already verified
pub async fn confirm_verification(
    claims: web::ReqData<AccessClaims>,
    form: web::Json<VerifyConfirmBody>,
    pool: web::Data<PgPool>,
    settings: web::Data<Settings>,
) -> Result<HttpResponse, AppError> {
    let user = fetch_user(pool.get_ref(), &claims).await?;

    if user.email_verified {
        return Err(AppError::Auth(AuthError::AlreadyVerified));
    }

    let bypassed = settings
        .verification
        .bypass_code
        .as_deref()
        .is_some_and(|bypass| bypass == form.code);

    if !bypassed {
        let stored_code = user
            .verification_code
            .as_deref()
            .ok_or(AppError::Auth(AuthError::VerificationCodeInvalid))?;
        let sent_at = user
            .verification_sent_at
            .ok_or(AppError::Auth(AuthError::VerificationCodeInvalid))?;

        if form.code != stored_code {
            tracing::warn!(user_id = %user.id, "Wrong verification code submitted");
            return Err(AppError::Auth(AuthError::VerificationCodeInvalid));
        }

        if code_expired(sent_at, settings.verification.code_expiry_hours) {
            tracing::info!(user_id = %user.id, "Expired verification code submitted");
            return Err(AppError::Auth(AuthError::VerificationCodeExpired));
        }
    }

    sqlx::query(
        r#"
        UPDATE users
        SET email_verified = TRUE, verification_code = NULL,
            verification_sent_at = NULL, updated_at = $1
        WHERE id = $2
        "#,
    )
    .bind(Utc::now())
    .bind(user.id)
    .execute(pool.get_ref())
    .await?;

    tracing::info!(user_id = %user.id, "Email verified");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Email verified"
    })))
}
