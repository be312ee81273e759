//! Background maintenance loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::crypto::keyring::KeyRing;
use crate::services::auth::Authenticator;

/// Rotates the key ring every `every`. A zero interval disables rotation.
pub fn spawn_key_rotation(keys: KeyRing, every: Duration) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        tracing::info!("Scheduled key rotation disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        loop {
            tokio::time::sleep(every).await;
            keys.rotate();
        }
    }))
}

/// Deletes sessions past either expiry clock every `every`. A zero interval
/// disables the sweep; expired rows are still refused at read time.
pub fn spawn_session_pruning(auth: Arc<Authenticator>, every: Duration) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        tracing::info!("Session pruning disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        loop {
            tokio::time::sleep(every).await;
            tracing::debug!("🧹 Pruning expired sessions...");
            match auth.prune_expired_sessions().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!("✅ Pruned {} expired session(s)", removed),
                Err(e) => tracing::error!("❌ Session pruning failed: {}", e),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_intervals_spawn_nothing() {
        assert!(spawn_key_rotation(KeyRing::new(), Duration::ZERO).is_none());
    }

    #[tokio::test]
    async fn rotation_loop_advances_generations() {
        let keys = KeyRing::new();
        let start = keys.current().id;

        let handle = spawn_key_rotation(keys.clone(), Duration::from_millis(10)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        let set = keys.snapshot();
        assert!(set.current().id > start);
        assert_eq!(set.previous().id + 1, set.current().id);
    }
}
