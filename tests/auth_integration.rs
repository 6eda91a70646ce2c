use panelhub::configuration::{get_configuration, DatabaseSettings};
use panelhub::startup::run;
use serde_json::{json, Value};
use sqlx::{Connection, Executor, PgConnection, PgPool, Row};
use std::net::TcpListener;

pub struct TestApp {
    pub address: String,
    pub db_pool: PgPool,
}

async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = uuid::Uuid::new_v4().to_string();
    let connection_pool = configure_database(&configuration.database).await;

    let server =
        run(listener, connection_pool.clone(), configuration).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        db_pool: connection_pool,
    }
}

pub async fn configure_database(config: &DatabaseSettings) -> PgPool {
    // Create database
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");
    // Migrate database
    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

/// Pull the refresh token out of a response's Set-Cookie headers.
fn extract_refresh_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("refresh_token="))
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim_start_matches("refresh_token=").to_string())
}

async fn signup(app: &TestApp, client: &reqwest::Client, email: &str, username: &str, password: &str) -> reqwest::Response {
    client
        .post(&format!("{}/auth/signup", &app.address))
        .json(&json!({
            "email": email,
            "username": username,
            "password": password
        }))
        .send()
        .await
        .expect("Failed to execute request.")
}

// --- Signup Tests ---

#[tokio::test]
async fn signup_returns_201_with_a_token_pair() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = signup(&app, &client, "alice@example.com", "alice", "SecurePass123").await;

    assert_eq!(201, response.status().as_u16());
    let refresh_token = extract_refresh_cookie(&response);
    assert!(refresh_token.is_some(), "No refresh cookie on signup");

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body.get("accessToken").is_some());
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["role"], "USER");
    assert_eq!(body["user"]["emailVerified"], false);

    // User, profile, and preferences were all created.
    let user = sqlx::query("SELECT id, email, username FROM users WHERE email = 'alice@example.com'")
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to fetch created user");
    let user_id = user.get::<uuid::Uuid, _>("id");
    assert_eq!(user.get::<String, _>("username"), "alice");

    let profile_count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&app.db_pool)
            .await
            .unwrap();
    assert_eq!(profile_count, 1);

    let prefs_count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM preferences WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&app.db_pool)
            .await
            .unwrap();
    assert_eq!(prefs_count, 1);
}

#[tokio::test]
async fn signup_returns_400_for_invalid_email() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let invalid_emails = vec!["notanemail", "user@", "@example.com", "user@@example.com"];

    for invalid_email in invalid_emails {
        let response = signup(&app, &client, invalid_email, "someuser", "SecurePass123").await;
        assert_eq!(
            400,
            response.status().as_u16(),
            "Should reject invalid email: {}",
            invalid_email
        );
    }
}

#[tokio::test]
async fn signup_returns_400_for_weak_password() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let long_password = "a".repeat(129);
    let weak_passwords = vec![
        ("Short1", "password too short"),
        ("nouppercase123", "no uppercase"),
        ("NOLOWERCASE123", "no lowercase"),
        ("NoDigitsHere", "no digits"),
        (long_password.as_str(), "password too long"),
    ];

    for (weak_password, reason) in weak_passwords {
        let response = signup(&app, &client, "test@example.com", "someuser", weak_password).await;
        assert_eq!(
            400,
            response.status().as_u16(),
            "Should reject weak password: {}",
            reason
        );
    }
}

#[tokio::test]
async fn signup_returns_400_for_invalid_username() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    for invalid_username in ["ab", "has spaces", "exclaim!", &"a".repeat(33)] {
        let response = signup(&app, &client, "test@example.com", invalid_username, "SecurePass123").await;
        assert_eq!(
            400,
            response.status().as_u16(),
            "Should reject invalid username: {}",
            invalid_username
        );
    }
}

#[tokio::test]
async fn signup_returns_409_for_duplicate_email() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response1 = signup(&app, &client, "alice@example.com", "alice", "SecurePass123").await;
    assert_eq!(201, response1.status().as_u16());

    let response2 = signup(&app, &client, "alice@example.com", "alice2", "SecurePass123").await;
    assert_eq!(409, response2.status().as_u16());

    let body: Value = response2.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], "DUPLICATE_ENTRY");
}

#[tokio::test]
async fn signup_returns_409_for_duplicate_username() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response1 = signup(&app, &client, "alice@example.com", "alice", "SecurePass123").await;
    assert_eq!(201, response1.status().as_u16());

    let response2 = signup(&app, &client, "other@example.com", "alice", "SecurePass123").await;
    assert_eq!(409, response2.status().as_u16());
}

// --- Login Tests ---

#[tokio::test]
async fn login_succeeds_after_signup() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    signup(&app, &client, "a@x.com", "alice", "Passw0rdOk").await;

    let response = client
        .post(&format!("{}/auth/login", &app.address))
        .json(&json!({"email": "a@x.com", "password": "Passw0rdOk"}))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
    assert!(extract_refresh_cookie(&response).is_some());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body.get("accessToken").is_some());
    assert_eq!(body["user"]["email"], "a@x.com");
}

#[tokio::test]
async fn login_returns_401_for_wrong_password() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    signup(&app, &client, "a@x.com", "alice", "Passw0rdOk").await;

    let response = client
        .post(&format!("{}/auth/login", &app.address))
        .json(&json!({"email": "a@x.com", "password": "WrongPass1"}))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn login_returns_401_for_unknown_email() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(&format!("{}/auth/login", &app.address))
        .json(&json!({"email": "nobody@example.com", "password": "SecurePass123"}))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn login_returns_403_for_disabled_account() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    signup(&app, &client, "banned@example.com", "banned", "SecurePass123").await;

    sqlx::query("UPDATE users SET is_active = FALSE, banned_at = NOW() WHERE email = $1")
        .bind("banned@example.com")
        .execute(&app.db_pool)
        .await
        .unwrap();

    let response = client
        .post(&format!("{}/auth/login", &app.address))
        .json(&json!({"email": "banned@example.com", "password": "SecurePass123"}))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(403, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], "ACCOUNT_DISABLED");
}

// --- Refresh Rotation Tests ---

#[tokio::test]
async fn refresh_rotates_the_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = signup(&app, &client, "alice@example.com", "alice", "SecurePass123").await;
    let old_token = extract_refresh_cookie(&response).expect("No refresh cookie");

    let response = client
        .post(&format!("{}/auth/refresh", &app.address))
        .header("Cookie", format!("refresh_token={}", old_token))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
    let new_token = extract_refresh_cookie(&response).expect("No rotated cookie");
    assert_ne!(old_token, new_token, "Refresh token should be rotated");

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body.get("accessToken").is_some());
}

#[tokio::test]
async fn refresh_with_same_token_twice_returns_401() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = signup(&app, &client, "alice@example.com", "alice", "SecurePass123").await;
    let token = extract_refresh_cookie(&response).expect("No refresh cookie");

    let first = client
        .post(&format!("{}/auth/refresh", &app.address))
        .header("Cookie", format!("refresh_token={}", token))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, first.status().as_u16());

    // The same token again: revoked by the rotation above.
    let second = client
        .post(&format!("{}/auth/refresh", &app.address))
        .header("Cookie", format!("refresh_token={}", token))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, second.status().as_u16());
}

#[tokio::test]
async fn refresh_accepts_token_in_body() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = signup(&app, &client, "alice@example.com", "alice", "SecurePass123").await;
    let token = extract_refresh_cookie(&response).expect("No refresh cookie");

    let response = client
        .post(&format!("{}/auth/refresh", &app.address))
        .json(&json!({ "refreshToken": token }))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
}

#[tokio::test]
async fn refresh_returns_401_without_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(&format!("{}/auth/refresh", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn refresh_returns_401_for_garbage_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(&format!("{}/auth/refresh", &app.address))
        .header("Cookie", "refresh_token=definitely.not.valid")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn refresh_returns_401_after_all_sessions_revoked() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = signup(&app, &client, "alice@example.com", "alice", "SecurePass123").await;
    let token = extract_refresh_cookie(&response).expect("No refresh cookie");

    sqlx::query("UPDATE refresh_tokens SET revoked_at = NOW()")
        .execute(&app.db_pool)
        .await
        .unwrap();

    let response = client
        .post(&format!("{}/auth/refresh", &app.address))
        .header("Cookie", format!("refresh_token={}", token))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}

// --- Logout Tests ---

#[tokio::test]
async fn logout_returns_204_and_revokes_the_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = signup(&app, &client, "alice@example.com", "alice", "SecurePass123").await;
    let token = extract_refresh_cookie(&response).expect("No refresh cookie");

    let response = client
        .post(&format!("{}/auth/logout", &app.address))
        .header("Cookie", format!("refresh_token={}", token))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(204, response.status().as_u16());

    // The revoked token cannot be redeemed.
    let response = client
        .post(&format!("{}/auth/refresh", &app.address))
        .header("Cookie", format!("refresh_token={}", token))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn logout_without_a_cookie_still_returns_204() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(&format!("{}/auth/logout", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(204, response.status().as_u16());
}

// --- Protected Route Tests ---

#[tokio::test]
async fn me_returns_current_user_with_valid_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = signup(&app, &client, "alice@example.com", "alice", "SecurePass123").await;
    let body: Value = response.json().await.expect("Failed to parse response");
    let access_token = body["accessToken"].as_str().expect("No access token");

    let response = client
        .get(&format!("{}/auth/me", &app.address))
        .header("Authorization", format!("Bearer {}", access_token))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["username"], "alice");
}

#[tokio::test]
async fn protected_routes_return_401_without_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(&format!("{}/auth/me", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], "MISSING_TOKEN");
}

#[tokio::test]
async fn protected_routes_return_401_with_invalid_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(&format!("{}/auth/me", &app.address))
        .header("Authorization", "Bearer invalid.token.here")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn protected_routes_reject_malformed_authorization_header() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let malformed_headers = vec![
        "Bearer",             // missing token
        "Basic dXNlcjpwYXNz", // not Bearer
        "BearerToken",        // missing space
        "",                   // empty
    ];

    for header in malformed_headers {
        let response = client
            .get(&format!("{}/auth/me", &app.address))
            .header("Authorization", header)
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(
            401,
            response.status().as_u16(),
            "Should reject malformed header: {}",
            header
        );
    }
}
