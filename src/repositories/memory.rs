//! In-memory backends.
//!
//! Suitable for development, tests and single-instance deployments. Everything
//! is lost when the process restarts.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::login_log::LoginAttemptLog;
use super::session::{MAX_TOKEN_ATTEMPTS, SessionStore, token_digest};
use super::user::PrincipalDirectory;
use crate::crypto::token;
use crate::error::{AppError, Result};
use crate::models::login_attempt::{LoginAttempt, LoginOutcome};
use crate::models::session::SessionRecord;
use crate::models::user::Principal;

fn poisoned() -> AppError {
    AppError::Internal("Lock poisoned".to_string())
}

/// In-memory session store keyed by token digest.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl MemorySessionStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of sessions currently stored.
    pub fn len(&self) -> usize {
        self.sessions.read().map(|guard| guard.len()).unwrap_or(0)
    }

    /// Returns true if there are no sessions stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrites both timestamps of an existing session.
    ///
    /// Returns false when no such session exists.
    pub fn set_timestamps(
        &self,
        principal_id: Uuid,
        token: &str,
        originated_at: DateTime<Utc>,
        last_seen_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;
        match sessions.get_mut(&token_digest(token)) {
            Some(record) if record.principal_id == principal_id => {
                record.originated_at = originated_at;
                record.last_seen_at = last_seen_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn lookup(&self, principal_id: Uuid, token: &str) -> Result<Option<SessionRecord>> {
        let sessions = self.sessions.read().map_err(|_| poisoned())?;
        Ok(sessions
            .get(&token_digest(token))
            .filter(|record| record.principal_id == principal_id)
            .cloned())
    }

    async fn touch(&self, principal_id: Uuid, token: &str) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;
        if let Some(record) = sessions.get_mut(&token_digest(token)) {
            if record.principal_id == principal_id {
                record.last_seen_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn create(
        &self,
        principal_id: Uuid,
        remote_addr: &str,
        user_agent: &str,
    ) -> Result<String> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;

        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let token = token::generate_auth_token();
            let digest = token_digest(&token);
            if let Entry::Vacant(slot) = sessions.entry(digest.clone()) {
                let now = Utc::now();
                slot.insert(SessionRecord {
                    principal_id,
                    token_digest: digest,
                    originated_at: now,
                    last_seen_at: now,
                    remote_addr: remote_addr.to_owned(),
                    user_agent: user_agent.to_owned(),
                });
                return Ok(token);
            }
            tracing::warn!("⚠️  Session token collision, regenerating");
        }

        Err(AppError::Internal(
            "Could not allocate a unique session token".to_string(),
        ))
    }

    async fn delete(&self, principal_id: Uuid, token: &str) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;
        let digest = token_digest(token);
        if sessions
            .get(&digest)
            .is_some_and(|record| record.principal_id == principal_id)
        {
            sessions.remove(&digest);
        }
        Ok(())
    }

    async fn delete_all_for_principal(&self, principal_id: Uuid) -> Result<u64> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;
        let before = sessions.len();
        sessions.retain(|_, record| record.principal_id != principal_id);
        Ok((before - sessions.len()) as u64)
    }

    async fn prune_expired(
        &self,
        originated_before: DateTime<Utc>,
        last_seen_before: DateTime<Utc>,
    ) -> Result<u64> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;
        let before = sessions.len();
        sessions.retain(|_, record| {
            record.originated_at >= originated_before && record.last_seen_at >= last_seen_before
        });
        Ok((before - sessions.len()) as u64)
    }
}

/// In-memory principal directory.
#[derive(Clone, Default)]
pub struct MemoryPrincipalDirectory {
    principals: Arc<RwLock<Vec<Principal>>>,
}

impl MemoryPrincipalDirectory {
    /// Creates a new, empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a principal with an already-hashed password and returns its id.
    pub fn insert(&self, identifier: &str, password_hash: &str) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.principals
            .write()
            .map_err(|_| poisoned())?
            .push(Principal::new(id, identifier, password_hash));
        Ok(id)
    }

    /// Removes a principal, as deactivating an account would.
    pub fn remove(&self, id: Uuid) -> Result<()> {
        self.principals
            .write()
            .map_err(|_| poisoned())?
            .retain(|principal| principal.id != id);
        Ok(())
    }
}

#[async_trait]
impl PrincipalDirectory for MemoryPrincipalDirectory {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Principal>> {
        let principals = self.principals.read().map_err(|_| poisoned())?;
        Ok(principals
            .iter()
            .find(|principal| principal.identifier == identifier)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>> {
        let principals = self.principals.read().map_err(|_| poisoned())?;
        Ok(principals.iter().find(|principal| principal.id == id).cloned())
    }
}

/// In-memory login log.
#[derive(Clone, Default)]
pub struct MemoryLoginAttemptLog {
    attempts: Arc<Mutex<Vec<LoginAttempt>>>,
}

impl MemoryLoginAttemptLog {
    /// Creates a new, empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every attempt logged so far, oldest first.
    pub fn entries(&self) -> Vec<LoginAttempt> {
        self.attempts
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LoginAttemptLog for MemoryLoginAttemptLog {
    async fn append(&self, identifier: &str, outcome: LoginOutcome) -> Result<()> {
        self.attempts.lock().map_err(|_| poisoned())?.push(LoginAttempt {
            identifier: identifier.to_owned(),
            outcome,
            attempted_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn create_then_lookup() {
        let store = MemorySessionStore::new();
        let principal = Uuid::new_v4();

        let token = store.create(principal, "10.0.0.1", "curl/8").await.unwrap();
        let record = store.lookup(principal, &token).await.unwrap().unwrap();

        assert_eq!(record.principal_id, principal);
        assert_eq!(record.originated_at, record.last_seen_at);
        assert_eq!(record.remote_addr, "10.0.0.1");
        assert_eq!(record.user_agent, "curl/8");
        assert_ne!(record.token_digest, token);
    }

    #[tokio::test]
    async fn lookup_requires_the_matching_principal() {
        let store = MemorySessionStore::new();
        let token = store.create(Uuid::new_v4(), "ip", "ua").await.unwrap();
        assert!(store.lookup(Uuid::new_v4(), &token).await.unwrap().is_none());
        assert!(store.lookup(Uuid::new_v4(), "unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn touch_moves_last_seen_only() {
        let store = MemorySessionStore::new();
        let principal = Uuid::new_v4();
        let token = store.create(principal, "ip", "ua").await.unwrap();

        let past = Utc::now() - Duration::days(2);
        store.set_timestamps(principal, &token, past, past).unwrap();

        store.touch(principal, &token).await.unwrap();

        let record = store.lookup(principal, &token).await.unwrap().unwrap();
        assert_eq!(record.originated_at, past);
        assert!(record.last_seen_at > past);
    }

    #[tokio::test]
    async fn delete_only_removes_own_session() {
        let store = MemorySessionStore::new();
        let principal = Uuid::new_v4();
        let token = store.create(principal, "ip", "ua").await.unwrap();

        store.delete(Uuid::new_v4(), &token).await.unwrap();
        assert_eq!(store.len(), 1);

        store.delete(principal, &token).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn delete_all_and_prune() {
        let store = MemorySessionStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        store.create(alice, "ip", "ua").await.unwrap();
        store.create(alice, "ip", "ua").await.unwrap();
        let stale = store.create(bob, "ip", "ua").await.unwrap();
        store.create(bob, "ip", "ua").await.unwrap();

        assert_eq!(store.delete_all_for_principal(alice).await.unwrap(), 2);
        assert_eq!(store.len(), 2);

        let long_ago = Utc::now() - Duration::days(40);
        store.set_timestamps(bob, &stale, long_ago, long_ago).unwrap();
        let cutoff = Utc::now() - Duration::days(30);
        assert_eq!(store.prune_expired(cutoff, cutoff).await.unwrap(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn tokens_are_unique_per_session() {
        let store = MemorySessionStore::new();
        let principal = Uuid::new_v4();
        let a = store.create(principal, "ip", "ua").await.unwrap();
        let b = store.create(principal, "ip", "ua").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn login_log_appends_in_order() {
        let log = MemoryLoginAttemptLog::new();
        log.append("alice", LoginOutcome::BadPassword).await.unwrap();
        log.append("alice", LoginOutcome::Success).await.unwrap();

        let outcomes: Vec<_> = log.entries().into_iter().map(|a| a.outcome).collect();
        assert_eq!(outcomes, vec![LoginOutcome::BadPassword, LoginOutcome::Success]);
    }
}
