use chrono::{DateTime, Utc};

/// How a login attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoginOutcome {
    /// No principal has the submitted identifier.
    BadIdentifier,
    /// The identifier exists but the password did not verify.
    BadPassword,
    /// A session was issued.
    Success,
}

impl LoginOutcome {
    /// The name stored in the `login_status` lookup table.
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginOutcome::BadIdentifier => "bad_identifier",
            LoginOutcome::BadPassword => "bad_password",
            LoginOutcome::Success => "success",
        }
    }
}

impl std::fmt::Display for LoginOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only row of the login log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAttempt {
    /// The identifier that was submitted.
    pub identifier: String,
    /// The classified outcome.
    pub outcome: LoginOutcome,
    /// When the attempt was made.
    pub attempted_at: DateTime<Utc>,
}
