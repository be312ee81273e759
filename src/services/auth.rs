use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::config::Config;
use crate::crypto::password::{CredentialHasher, Verification};
use crate::error::{AppError, Result};
use crate::models::login_attempt::LoginOutcome;
use crate::models::session::{Expiry, SessionClaim};
use crate::models::user::Principal;
use crate::repositories::login_log::LoginAttemptLog;
use crate::repositories::session::SessionStore;
use crate::repositories::user::PrincipalDirectory;

/// Plaintext hashed once at startup so unknown identifiers cost one verify too.
const DUMMY_PASSWORD: &str = "timing-equaliser-not-a-real-password";

/// Why a request ended up without a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnonymousReason {
    /// No usable claim was presented.
    NoClaim,
    /// The claim names no live session row.
    SessionNotFound,
    /// The session row exists but one of its clocks ran out.
    SessionExpired(Expiry),
    /// The session is live but its principal no longer exists.
    PrincipalGone,
}

impl AnonymousReason {
    /// Whether the presented cookie should be cleared from the client.
    pub fn clears_cookie(&self) -> bool {
        !matches!(self, AnonymousReason::NoClaim)
    }
}

/// Outcome of verifying one request.
#[derive(Debug, Clone)]
pub enum Verdict {
    /// The claim matched a fresh session; the principal is authorized.
    Authenticated(Principal),
    /// Proceed anonymously.
    Unauthenticated(AnonymousReason),
}

/// A successful login: what the caller encodes into the cookie.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    /// The principal that logged in.
    pub principal_id: Uuid,
    /// The new auth token.
    pub token: String,
}

impl IssuedSession {
    /// The claim to hand to the cookie codec.
    pub fn claim(&self) -> SessionClaim {
        SessionClaim {
            principal_id: self.principal_id,
            token: self.token.clone(),
        }
    }
}

/// Expiry and write-coalescing policy applied to sessions.
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    /// Cap measured from origination.
    pub absolute_ttl: chrono::Duration,
    /// Cap measured from last-seen.
    pub idle_ttl: chrono::Duration,
    /// Last-seen values younger than this are not rewritten.
    pub touch_interval: chrono::Duration,
    /// Deadline for each store call.
    pub store_timeout: Duration,
}

impl SessionPolicy {
    /// Builds the policy from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            absolute_ttl: config.absolute_ttl,
            idle_ttl: config.idle_ttl,
            touch_interval: config.touch_interval,
            store_timeout: config.store_timeout,
        }
    }
}

/// Orchestrates login and per-request session verification.
#[derive(Clone)]
pub struct Authenticator {
    sessions: Arc<dyn SessionStore>,
    principals: Arc<dyn PrincipalDirectory>,
    attempts: Arc<dyn LoginAttemptLog>,
    hasher: CredentialHasher,
    policy: SessionPolicy,
    dummy_hash: Arc<str>,
}

impl Authenticator {
    /// Creates a new `Authenticator`.
    ///
    /// Hashes a throwaway password once with the configured cost, which also
    /// proves the hashing primitive works before the server accepts traffic.
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        principals: Arc<dyn PrincipalDirectory>,
        attempts: Arc<dyn LoginAttemptLog>,
        hasher: CredentialHasher,
        policy: SessionPolicy,
    ) -> Result<Self> {
        let dummy_hash = hasher.hash(DUMMY_PASSWORD)?;
        Ok(Self {
            sessions,
            principals,
            attempts,
            hasher,
            policy,
            dummy_hash: Arc::from(dummy_hash),
        })
    }

    /// Runs a store call under the configured deadline.
    ///
    /// A timeout is a server fault, never "no session".
    async fn with_deadline<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.policy.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AppError::StoreTimeout(
                self.policy.store_timeout.as_millis() as u64,
            )),
        }
    }

    async fn record_attempt(&self, identifier: &str, outcome: LoginOutcome) {
        match outcome {
            LoginOutcome::Success => tracing::info!("✅ Login succeeded for: {}", identifier),
            _ => tracing::warn!("❌ Login failed for: {} ({})", identifier, outcome),
        }
        if let Err(e) = self.attempts.append(identifier, outcome).await {
            tracing::error!(
                "❌ Failed to record login attempt for {} ({}): {}",
                identifier,
                outcome,
                e
            );
        }
    }

    async fn check_password(&self, password: &str, hash: Arc<str>) -> Result<Verification> {
        let hasher = self.hasher.clone();
        let password = zeroize::Zeroizing::new(password.to_owned());
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| AppError::Hashing(format!("Verification task failed: {}", e)))
    }

    /// Checks credentials and issues a new session.
    ///
    /// Unknown identifiers and wrong passwords both return
    /// [`AppError::InvalidCredentials`]; only the login log tells them apart.
    ///
    /// # Arguments
    ///
    /// * `identifier` - The submitted login identifier.
    /// * `password` - The submitted plaintext password.
    /// * `remote_addr` - Address of the client, stored on the session row.
    /// * `user_agent` - User agent of the client, stored on the session row.
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
        remote_addr: &str,
        user_agent: &str,
    ) -> Result<IssuedSession> {
        tracing::debug!("🔐 Authenticating principal: {}", identifier);

        let principal = self
            .with_deadline(self.principals.find_by_identifier(identifier))
            .await?;

        let Some(principal) = principal else {
            // Pay for one verification anyway so response time does not
            // reveal whether the identifier exists.
            let _ = self.check_password(password, Arc::clone(&self.dummy_hash)).await;
            self.record_attempt(identifier, LoginOutcome::BadIdentifier).await;
            return Err(AppError::InvalidCredentials);
        };

        match self
            .check_password(password, Arc::from(principal.password_hash.as_str()))
            .await?
        {
            Verification::Match => {}
            Verification::Mismatch => {
                self.record_attempt(identifier, LoginOutcome::BadPassword).await;
                return Err(AppError::InvalidCredentials);
            }
            Verification::Malformed => {
                return Err(AppError::Hashing(format!(
                    "Stored hash for principal {} is malformed",
                    principal.id
                )));
            }
        }

        let token = self
            .with_deadline(self.sessions.create(principal.id, remote_addr, user_agent))
            .await?;

        self.record_attempt(identifier, LoginOutcome::Success).await;

        Ok(IssuedSession {
            principal_id: principal.id,
            token,
        })
    }

    /// Verifies a decoded cookie claim against the session store.
    ///
    /// Missing, unknown and expired sessions are `Ok(Unauthenticated)`. Store
    /// failures are `Err` and must be answered as server faults.
    pub async fn verify(&self, claim: Option<&SessionClaim>) -> Result<Verdict> {
        let Some(claim) = claim else {
            return Ok(Verdict::Unauthenticated(AnonymousReason::NoClaim));
        };

        let record = self
            .with_deadline(self.sessions.lookup(claim.principal_id, &claim.token))
            .await?;

        let Some(record) = record else {
            tracing::debug!("No session row for principal: {}", claim.principal_id);
            return Ok(Verdict::Unauthenticated(AnonymousReason::SessionNotFound));
        };

        let now = Utc::now();
        if let Some(expiry) = record.expiry(now, self.policy.absolute_ttl, self.policy.idle_ttl) {
            tracing::info!(
                "⌛ Session expired ({:?}) for principal: {}",
                expiry,
                claim.principal_id
            );
            return Ok(Verdict::Unauthenticated(AnonymousReason::SessionExpired(expiry)));
        }

        let principal = self
            .with_deadline(self.principals.find_by_id(claim.principal_id))
            .await?;
        let Some(mut principal) = principal else {
            tracing::warn!("Session refers to missing principal: {}", claim.principal_id);
            return Ok(Verdict::Unauthenticated(AnonymousReason::PrincipalGone));
        };

        if now - record.last_seen_at >= self.policy.touch_interval {
            if let Err(e) = self
                .with_deadline(self.sessions.touch(claim.principal_id, &claim.token))
                .await
            {
                tracing::warn!("Failed to update session last-seen: {}", e);
            }
        }

        principal.authorized = true;
        tracing::debug!("✅ Principal authenticated: {}", principal.id);
        Ok(Verdict::Authenticated(principal))
    }

    /// Ends one session.
    pub async fn logout(&self, claim: &SessionClaim) -> Result<()> {
        self.with_deadline(self.sessions.delete(claim.principal_id, &claim.token))
            .await?;
        tracing::info!("👋 Session ended for principal: {}", claim.principal_id);
        Ok(())
    }

    /// Ends every session of a principal, including the caller's.
    pub async fn logout_everywhere(&self, principal_id: Uuid) -> Result<u64> {
        let removed = self
            .with_deadline(self.sessions.delete_all_for_principal(principal_id))
            .await?;
        tracing::info!(
            "👋 Revoked {} session(s) for principal: {}",
            removed,
            principal_id
        );
        Ok(removed)
    }

    /// Removes session rows that can no longer pass verification.
    pub async fn prune_expired_sessions(&self) -> Result<u64> {
        let now = Utc::now();
        self.with_deadline(self.sessions.prune_expired(
            now - self.policy.absolute_ttl,
            now - self.policy.idle_ttl,
        ))
        .await
    }
}
