//! Two-generation store of cookie keys.
//!
//! The ring is an immutable [`KeySet`] published behind an `Arc`. Readers clone
//! the `Arc` and work from that snapshot; [`KeyRing::rotate`] builds a whole new
//! set and swaps the pointer, so an authentication key is never observed next
//! to an encryption key from another generation.

use std::sync::{Arc, RwLock};

use crate::crypto::aes::{self, SecureKey};

/// One {authentication key, encryption key} pair.
#[derive(Clone, Debug)]
pub struct KeyGeneration {
    /// Monotonic generation number, for logs only.
    pub id: u64,
    /// HMAC-SHA256 key that signs cookie bodies.
    pub auth_key: SecureKey,
    /// AES-256-GCM key that encrypts cookie claims.
    pub enc_key: SecureKey,
}

impl KeyGeneration {
    /// Generates a fresh pair from the OS CSPRNG.
    pub fn generate(id: u64) -> Self {
        Self {
            id,
            auth_key: aes::generate_key(),
            enc_key: aes::generate_key(),
        }
    }
}

/// An immutable snapshot holding exactly two generations.
#[derive(Clone, Debug)]
pub struct KeySet {
    current: KeyGeneration,
    previous: KeyGeneration,
}

impl KeySet {
    /// The generation new cookies are encoded under.
    pub fn current(&self) -> &KeyGeneration {
        &self.current
    }

    /// The generation retired by the last rotation.
    pub fn previous(&self) -> &KeyGeneration {
        &self.previous
    }

    /// Generations in the order decode should try them.
    pub fn generations(&self) -> [&KeyGeneration; 2] {
        [&self.current, &self.previous]
    }

    fn rotated(&self) -> Self {
        Self {
            current: KeyGeneration::generate(self.current.id + 1),
            previous: self.current.clone(),
        }
    }
}

/// Shared, rotatable holder of the current and previous key generations.
#[derive(Clone)]
pub struct KeyRing {
    keys: Arc<RwLock<Arc<KeySet>>>,
}

impl KeyRing {
    /// Creates a ring with two freshly generated generations.
    pub fn new() -> Self {
        let set = KeySet {
            current: KeyGeneration::generate(1),
            previous: KeyGeneration::generate(0),
        };
        Self::from_key_set(set)
    }

    fn from_key_set(set: KeySet) -> Self {
        Self {
            keys: Arc::new(RwLock::new(Arc::new(set))),
        }
    }

    /// Takes a consistent snapshot of both generations.
    pub fn snapshot(&self) -> Arc<KeySet> {
        match self.keys.read() {
            Ok(guard) => Arc::clone(&guard),
            // The lock only ever guards a pointer swap, so a poisoned guard
            // still holds a complete key set.
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Returns a copy of the current generation.
    pub fn current(&self) -> KeyGeneration {
        self.snapshot().current().clone()
    }

    /// Returns a copy of the previous generation.
    pub fn previous(&self) -> KeyGeneration {
        self.snapshot().previous().clone()
    }

    /// Rotates keys: previous := current, current := newly generated.
    ///
    /// Cookies issued under the old current generation keep decoding until
    /// the next rotation discards it.
    pub fn rotate(&self) {
        let mut guard = match self.keys.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let next = Arc::new(guard.rotated());
        *guard = next;
        tracing::info!(
            "🔑 Cookie keys rotated - current generation: {}",
            guard.current().id
        );
    }
}

impl Default for KeyRing {
    fn default() -> Self {
        Self::new()
    }
}
