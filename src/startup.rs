use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use sqlx::PgPool;
use std::net::TcpListener;

use crate::configuration::Settings;
use crate::email_client::{EmailClient, SenderAddress};
use crate::middleware::{JwtMiddleware, RequestLogger};
use crate::routes::{
    confirm_password_reset, confirm_verification, current_user, health_check, login, logout,
    refresh, request_password_reset, request_verification, signup,
};
use crate::session_cache::SessionCache;

pub fn run(
    listener: TcpListener,
    connection: PgPool,
    settings: Settings,
) -> Result<Server, std::io::Error> {
    let sender = SenderAddress::parse(settings.email.sender.clone())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let email_client = EmailClient::new(
        settings.email.base_url.clone(),
        sender,
        reqwest::Client::new(),
    );

    // All shared state is built here and handed to the app; nothing lives
    // in module-level statics.
    let connection = web::Data::new(connection);
    let session_cache = web::Data::new(SessionCache::new());
    let email_client = web::Data::new(email_client);
    let jwt_config = settings.jwt.clone();
    let settings = web::Data::new(settings);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(RequestLogger)
            // Shared state
            .app_data(connection.clone())
            .app_data(session_cache.clone())
            .app_data(email_client.clone())
            .app_data(settings.clone())
            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/auth/signup", web::post().to(signup))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            .route("/auth/logout", web::post().to(logout))
            .route(
                "/auth/password-reset/request",
                web::post().to(request_password_reset),
            )
            .route(
                "/auth/password-reset/confirm",
                web::post().to(confirm_password_reset),
            )
            // Protected routes (require a bearer access token)
            .service(
                web::scope("/auth")
                    .wrap(JwtMiddleware::new(jwt_config.clone()))
                    .route("/verify-email/request", web::post().to(request_verification))
                    .route("/verify-email/confirm", web::post().to(confirm_verification))
                    .route("/me", web::get().to(current_user)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
