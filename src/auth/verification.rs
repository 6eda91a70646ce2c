/// Email verification codes.
///
/// The code and its sent-at timestamp live directly on the user row; the
/// timestamp anchors both the resend cooldown and the 24-hour expiry
/// window.
use chrono::{DateTime, Duration, Utc};
use rand::{thread_rng, Rng};

const CODE_LENGTH: usize = 6;
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a 6-character verification code from uppercase letters and
/// digits.
pub fn generate_verification_code() -> String {
    let mut rng = thread_rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

/// Whether a resend is still blocked by the cooldown window.
pub fn cooldown_active(sent_at: Option<DateTime<Utc>>, cooldown_seconds: i64) -> bool {
    match sent_at {
        Some(sent_at) => Utc::now() < sent_at + Duration::seconds(cooldown_seconds),
        None => false,
    }
}

/// Whether a stored code has outlived its expiry window.
pub fn code_expired(sent_at: DateTime<Utc>, expiry_hours: i64) -> bool {
    Utc::now() > sent_at + Duration::hours(expiry_hours)
}
