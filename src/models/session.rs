use bincode::{Decode, Encode};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The decoded contents of a session cookie.
///
/// This is only a claim. It proves nothing until the matching session row is
/// found and judged fresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct SessionClaim {
    /// The principal the cookie claims to belong to.
    #[bincode(with_serde)]
    pub principal_id: Uuid,
    /// The auth token issued at login.
    pub token: String,
}

/// Server-side proof that a (principal, token) pair was issued by a login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// The principal this session belongs to.
    pub principal_id: Uuid,
    /// SHA-256 digest of the auth token, hex encoded.
    pub token_digest: String,
    /// When the session was created.
    pub originated_at: DateTime<Utc>,
    /// When the session was last used.
    pub last_seen_at: DateTime<Utc>,
    /// Remote address of the login request.
    pub remote_addr: String,
    /// User agent of the login request.
    pub user_agent: String,
}

/// Which of the two clocks ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Older than the absolute lifetime.
    Absolute,
    /// Unused for longer than the idle lifetime.
    Idle,
}

impl SessionRecord {
    /// Applies the two-clock expiry policy at `now`.
    ///
    /// Returns `None` while the session is fresh.
    pub fn expiry(
        &self,
        now: DateTime<Utc>,
        absolute_ttl: Duration,
        idle_ttl: Duration,
    ) -> Option<Expiry> {
        if now - self.originated_at > absolute_ttl {
            Some(Expiry::Absolute)
        } else if now - self.last_seen_at > idle_ttl {
            Some(Expiry::Idle)
        } else {
            None
        }
    }
}
