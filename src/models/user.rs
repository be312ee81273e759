use serde::Serialize;
use uuid::Uuid;

/// Represents a principal, limited to the fields authentication needs.
#[derive(Clone, Serialize)]
pub struct Principal {
    /// The unique identifier for the principal.
    pub id: Uuid,
    /// The login identifier (username or email).
    pub identifier: String,
    /// The principal's hashed password.
    #[serde(skip)]
    pub password_hash: String,
    /// Set only on principals attached to a request after session verification.
    /// Never persisted.
    pub authorized: bool,
}

impl Principal {
    /// Creates a principal as loaded from storage, not yet authorized.
    pub fn new(id: Uuid, identifier: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id,
            identifier: identifier.into(),
            password_hash: password_hash.into(),
            authorized: false,
        }
    }
}

impl std::fmt::Debug for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("identifier", &self.identifier)
            .field("password_hash", &"[REDACTED]")
            .field("authorized", &self.authorized)
            .finish()
    }
}
