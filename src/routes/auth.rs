/// Authentication routes: signup, login, refresh, logout, current user.
use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{
    check_stored_token, hash_password, issue_tokens, revoke_refresh_token, rotate_tokens,
    validate_refresh_token, verify_password, AccessClaims,
};
use crate::configuration::Settings;
use crate::error::{AppError, AuthError, DatabaseError};
use crate::models::{User, UserRole, UserView};
use crate::session_cache::SessionCache;
use crate::validators::{is_valid_email, is_valid_username};

pub const REFRESH_COOKIE: &str = "refresh_token";

#[derive(Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Refresh token may arrive in the body when no cookie is present.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: UserView,
    pub access_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
}

/// The rotated refresh token travels only in an httpOnly cookie; the JSON
/// body carries the access token alone.
fn refresh_cookie(token: String, max_age_seconds: i64, secure: bool) -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE, token)
        .path("/auth")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .max_age(CookieDuration::seconds(max_age_seconds))
        .finish()
}

fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(REFRESH_COOKIE, "")
        .path("/auth")
        .http_only(true)
        .finish();
    cookie.make_removal();
    cookie
}

const USER_COLUMNS: &str = "id, email, username, password_hash, role, is_active, \
     email_verified, verification_code, verification_sent_at, created_at";

async fn fetch_profile_id(pool: &PgPool, user_id: Uuid) -> Result<Option<Uuid>, AppError> {
    let profile_id =
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    Ok(profile_id)
}

/// POST /auth/signup
///
/// Creates the user, their profile, and default reader preferences in one
/// transaction. Uniqueness of email and username is decided by the database
/// constraints alone; a violation surfaces as 409 Conflict.
///
/// # Errors
/// - 400: invalid email/username/password
/// - 409: email or username already taken
pub async fn signup(
    form: web::Json<SignupRequest>,
    pool: web::Data<PgPool>,
    cache: web::Data<SessionCache>,
    settings: web::Data<Settings>,
) -> Result<HttpResponse, AppError> {
    let email = is_valid_email(&form.email)?;
    let username = is_valid_username(&form.username)?;
    let password_hash = hash_password(&form.password)?;

    let user_id = Uuid::new_v4();
    let profile_id = Uuid::new_v4();
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO users (id, email, username, password_hash, role, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(user_id)
    .bind(&email)
    .bind(&username)
    .bind(&password_hash)
    .bind(UserRole::User.as_str())
    .bind(now)
    .bind(now)
    .execute(&mut tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO profiles (id, user_id, display_name, created_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(profile_id)
    .bind(user_id)
    .bind(&username)
    .bind(now)
    .execute(&mut tx)
    .await?;

    sqlx::query("INSERT INTO preferences (user_id) VALUES ($1)")
        .bind(user_id)
        .execute(&mut tx)
        .await?;

    tx.commit().await?;

    let tokens = issue_tokens(
        pool.get_ref(),
        cache.get_ref(),
        &settings.jwt,
        user_id,
        UserRole::User,
        Some(profile_id),
    )
    .await?;

    tracing::info!(user_id = %user_id, "User registered");

    let user = UserView {
        id: user_id.to_string(),
        email,
        username,
        role: UserRole::User.as_str().to_string(),
        email_verified: false,
        created_at: now.to_rfc3339(),
    };

    Ok(HttpResponse::Created()
        .cookie(refresh_cookie(
            tokens.refresh_token,
            settings.jwt.refresh_token_expiry,
            settings.application.cookie_secure,
        ))
        .json(AuthResponse {
            user,
            access_token: tokens.access_token,
        }))
}

/// POST /auth/login
///
/// Unknown email and wrong password produce the same response, so callers
/// cannot probe which addresses hold accounts.
///
/// # Errors
/// - 400: invalid email format
/// - 401: bad credentials
/// - 403: account disabled
pub async fn login(
    form: web::Json<LoginRequest>,
    pool: web::Data<PgPool>,
    cache: web::Data<SessionCache>,
    settings: web::Data<Settings>,
) -> Result<HttpResponse, AppError> {
    let email = is_valid_email(&form.email)?;

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE email = $1",
        USER_COLUMNS
    ))
    .bind(&email)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or(AppError::Auth(AuthError::InvalidCredentials))?;

    if !user.is_active {
        return Err(AppError::Auth(AuthError::AccountDisabled));
    }

    if !verify_password(&form.password, &user.password_hash)? {
        return Err(AppError::Auth(AuthError::InvalidCredentials));
    }

    let role = user.role()?;
    let profile_id = fetch_profile_id(pool.get_ref(), user.id).await?;

    let tokens = issue_tokens(
        pool.get_ref(),
        cache.get_ref(),
        &settings.jwt,
        user.id,
        role,
        profile_id,
    )
    .await?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(HttpResponse::Ok()
        .cookie(refresh_cookie(
            tokens.refresh_token,
            settings.jwt.refresh_token_expiry,
            settings.application.cookie_secure,
        ))
        .json(AuthResponse {
            user: UserView::from(&user),
            access_token: tokens.access_token,
        }))
}

/// POST /auth/refresh
///
/// Single-use rotation: the presented token's ledger row is revoked and a
/// replacement issued atomically, so redeeming the same token twice fails
/// the second time.
///
/// # Errors
/// - 401: missing, invalid, revoked, or expired refresh token
/// - 403: account disabled
pub async fn refresh(
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    pool: web::Data<PgPool>,
    cache: web::Data<SessionCache>,
    settings: web::Data<Settings>,
) -> Result<HttpResponse, AppError> {
    let token = req
        .cookie(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| body.as_ref().and_then(|b| b.refresh_token.clone()))
        .ok_or(AppError::Auth(AuthError::MissingToken))?;

    // Signature and lifetime first, then the ledger's word on revocation.
    let claims = validate_refresh_token(&token, &settings.jwt)?;
    let user_id = check_stored_token(pool.get_ref(), &token).await?;

    if claims.user_id()? != user_id {
        tracing::warn!(user_id = %user_id, "Refresh token subject does not match ledger");
        return Err(AppError::Auth(AuthError::TokenInvalid));
    }

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE id = $1",
        USER_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or(AppError::Auth(AuthError::TokenInvalid))?;

    if !user.is_active {
        return Err(AppError::Auth(AuthError::AccountDisabled));
    }

    let role = user.role()?;
    let profile_id = fetch_profile_id(pool.get_ref(), user.id).await?;

    let tokens = rotate_tokens(
        pool.get_ref(),
        cache.get_ref(),
        &settings.jwt,
        &token,
        user.id,
        role,
        profile_id,
    )
    .await?;

    tracing::info!(user_id = %user.id, "Refresh token rotated");

    Ok(HttpResponse::Ok()
        .cookie(refresh_cookie(
            tokens.refresh_token,
            settings.jwt.refresh_token_expiry,
            settings.application.cookie_secure,
        ))
        .json(RefreshResponse {
            access_token: tokens.access_token,
        }))
}

/// POST /auth/logout
///
/// Revokes the presented refresh token (if any) and clears the cookie.
/// Always 204; logging out twice is not an error.
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<PgPool>,
    cache: web::Data<SessionCache>,
    settings: web::Data<Settings>,
) -> Result<HttpResponse, AppError> {
    if let Some(cookie) = req.cookie(REFRESH_COOKIE) {
        let token = cookie.value().to_string();

        if let Ok(claims) = validate_refresh_token(&token, &settings.jwt) {
            if let Ok(user_id) = claims.user_id() {
                cache.invalidate(user_id);
                tracing::info!(user_id = %user_id, "User logged out");
            }
        }

        revoke_refresh_token(pool.get_ref(), &token).await?;
    }

    Ok(HttpResponse::NoContent().cookie(removal_cookie()).finish())
}

/// GET /auth/me
///
/// Claims are injected by the bearer-token middleware.
pub async fn current_user(
    claims: web::ReqData<AccessClaims>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE id = $1",
        USER_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or(AppError::Database(DatabaseError::NotFound(
        "User not found".to_string(),
    )))?;

    if !user.is_active {
        return Err(AppError::Auth(AuthError::AccountDisabled));
    }

    Ok(HttpResponse::Ok().json(UserView::from(&user)))
}
