/// Password reset routes.
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{consume_password_reset, create_password_reset, hash_password};
use crate::email_client::EmailClient;
use crate::error::AppError;
use crate::session_cache::SessionCache;
use crate::validators::is_valid_email;

#[derive(Deserialize)]
pub struct ResetRequestBody {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetConfirmBody {
    pub token: String,
    pub password: String,
}

/// POST /auth/password-reset/request
///
/// Responds 200 whether or not the address has an account, so the endpoint
/// cannot be used to enumerate users. A relay failure is logged but not
/// surfaced for the same reason.
pub async fn request_password_reset(
    form: web::Json<ResetRequestBody>,
    pool: web::Data<PgPool>,
    email_client: web::Data<EmailClient>,
) -> Result<HttpResponse, AppError> {
    let email = is_valid_email(&form.email)?;

    let user_id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(pool.get_ref())
        .await?;

    if let Some(user_id) = user_id {
        let token = create_password_reset(pool.get_ref(), user_id).await?;

        let body = format!(
            "<p>A password reset was requested for your Panelhub account.</p>\
             <p>Your reset token is: <strong>{}</strong></p>\
             <p>It expires in one hour. If you did not request this, ignore this message.</p>",
            token
        );
        if let Err(e) = email_client
            .send_email(&email, "Reset your Panelhub password", &body)
            .await
        {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to send reset email");
        }

        tracing::info!(user_id = %user_id, "Password reset requested");
    } else {
        tracing::info!("Password reset requested for unknown email");
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "If the account exists, a reset email has been sent"
    })))
}

/// POST /auth/password-reset/confirm
///
/// Redeems a reset token. On success the password changes, the token is
/// spent, and every refresh token the user holds is revoked in the same
/// transaction; the session-cache entry goes with them.
///
/// # Errors
/// - 400: new password fails the strength rules
/// - 401: unknown, used, or expired token
pub async fn confirm_password_reset(
    form: web::Json<ResetConfirmBody>,
    pool: web::Data<PgPool>,
    cache: web::Data<SessionCache>,
) -> Result<HttpResponse, AppError> {
    let password_hash = hash_password(&form.password)?;

    let user_id = consume_password_reset(pool.get_ref(), &form.token, &password_hash).await?;
    cache.invalidate(user_id);

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Password has been reset"
    })))
}
