/// In-memory cache of the most recently issued access token per user.
///
/// Best-effort accelerator only: access tokens are self-verifying JWTs, so
/// a missing or wiped cache never affects authorization. Entries carry a
/// TTL equal to the access-token lifetime and are dropped lazily on read;
/// `purge_expired` sweeps the rest.
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct CachedSession {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct SessionCache {
    sessions: DashMap<Uuid, CachedSession>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Record the latest access token for a user with the given TTL.
    pub fn store(&self, user_id: Uuid, access_token: &str, ttl_seconds: i64) {
        let entry = CachedSession {
            access_token: access_token.to_string(),
            expires_at: Utc::now() + Duration::seconds(ttl_seconds),
        };
        self.sessions.insert(user_id, entry);
    }

    /// Fetch the cached token for a user, dropping it if it has lapsed.
    pub fn get(&self, user_id: Uuid) -> Option<String> {
        let expired = match self.sessions.get(&user_id) {
            Some(entry) if entry.expires_at > Utc::now() => {
                return Some(entry.access_token.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.sessions.remove(&user_id);
        }
        None
    }

    /// Evict a user's entry, e.g. on logout or password reset.
    pub fn invalidate(&self, user_id: Uuid) {
        self.sessions.remove(&user_id);
    }

    /// Drop every lapsed entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let expired_keys: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().expires_at <= now)
            .map(|entry| *entry.key())
            .collect();

        let mut purged = 0;
        for key in expired_keys {
            if self.sessions.remove(&key).is_some() {
                purged += 1;
            }
        }
        purged
    }
}
