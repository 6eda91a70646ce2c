pub mod auth;
pub mod configuration;
pub mod email_client;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod session_cache;
pub mod startup;
pub mod telemetry;
pub mod validators;
