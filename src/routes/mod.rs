mod auth;
mod health_check;
mod password_reset;
mod verify_email;

pub use auth::{current_user, login, logout, refresh, signup, REFRESH_COOKIE};
pub use health_check::health_check;
pub use password_reset::{confirm_password_reset, request_password_reset};
pub use verify_email::{confirm_verification, request_verification};
