//! Cookie-based session authentication for axum services.
//!
//! A login issues a random token stored server-side; the browser receives it
//! inside a signed and encrypted cookie. Every request is verified against the
//! session store and the current principal is attached to request extensions.

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;
pub mod tasks;

pub mod crypto {
    pub mod aes;
    pub mod cookie;
    pub mod keyring;
    pub mod password;
    pub mod token;
}

pub mod models {
    pub mod login_attempt;
    pub mod session;
    pub mod user;
}

pub mod repositories {
    pub mod login_log;
    pub mod memory;
    pub mod session;
    pub mod user;
}

pub mod services {
    pub mod auth;
}

pub mod handlers {
    pub mod auth;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod headers;
    pub mod rate_limit;
}

pub mod validation {
    pub mod auth;
}
