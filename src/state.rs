use redis::aio::ConnectionManager;
use std::sync::Arc;

use crate::config::Config;
use crate::crypto::cookie::CookieCodec;
use crate::crypto::keyring::KeyRing;
use crate::crypto::password::CredentialHasher;
use crate::error::Result;
use crate::repositories::login_log::{LoginAttemptLog, PgLoginAttemptLog};
use crate::repositories::memory::{
    MemoryLoginAttemptLog, MemoryPrincipalDirectory, MemorySessionStore,
};
use crate::repositories::session::{PgSessionStore, SessionStore};
use crate::repositories::user::{PgPrincipalDirectory, PrincipalDirectory};
use crate::services::auth::{Authenticator, SessionPolicy};

/// The three collaborators the authenticator talks to.
pub struct Stores {
    pub sessions: Arc<dyn SessionStore>,
    pub principals: Arc<dyn PrincipalDirectory>,
    pub attempts: Arc<dyn LoginAttemptLog>,
}

impl Stores {
    /// PostgreSQL-backed stores sharing one pool.
    pub async fn postgres(config: &Config, database_url: &str) -> Result<Self> {
        let pool = crate::db::create_pool(database_url, config.store_timeout)?;
        crate::db::check_connection(&pool).await?;
        tracing::info!("✅ PostgreSQL pool initialized");

        Ok(Self {
            sessions: Arc::new(PgSessionStore::new(pool.clone())),
            principals: Arc::new(PgPrincipalDirectory::new(pool.clone())),
            attempts: Arc::new(PgLoginAttemptLog::new(pool)),
        })
    }

    /// In-memory stores, seeded with the configured development principals.
    pub fn memory(config: &Config, hasher: &CredentialHasher) -> Result<Self> {
        let principals = MemoryPrincipalDirectory::new();
        for (identifier, password) in &config.dev_principals.0 {
            principals.insert(identifier, &hasher.hash(password)?)?;
            tracing::info!("👤 Seeded development principal: {}", identifier);
        }

        Ok(Self {
            sessions: Arc::new(MemorySessionStore::new()),
            principals: Arc::new(principals),
            attempts: Arc::new(MemoryLoginAttemptLog::new()),
        })
    }
}

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// Shared key ring, rotated in the background.
    pub keys: KeyRing,
    /// Session cookie codec reading from `keys`.
    pub codec: CookieCodec,
    /// Login and session verification.
    pub auth: Arc<Authenticator>,
    /// The Redis connection manager. `None` disables login rate limiting.
    pub redis: Option<ConnectionManager>,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// Uses PostgreSQL when a database URL is configured and in-memory stores
    /// otherwise.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let stores = match config.database_url.as_deref() {
            Some(url) => Stores::postgres(config, url).await?,
            None => {
                tracing::warn!("⚠️  DATABASE_URL not set, sessions are kept in memory");
                Stores::memory(config, &CredentialHasher::from_config(config)?)?
            }
        };

        let redis = match config.redis_url.as_deref() {
            Some(url) => {
                let redis_client = redis::Client::open(url)?;
                let manager = ConnectionManager::new(redis_client).await?;
                tracing::info!("✅ Redis Connection Manager initialized");
                Some(manager)
            }
            None => {
                tracing::warn!("⚠️  REDIS_URL not set, login rate limiting disabled");
                None
            }
        };

        let mut state = Self::with_stores(config, stores)?;
        state.redis = redis;
        Ok(state)
    }

    /// Builds the state around the given stores, without Redis.
    pub fn with_stores(config: &Config, stores: Stores) -> Result<Self> {
        let keys = KeyRing::new();
        let codec = CookieCodec::new(keys.clone(), config.cookie_name.clone(), config.absolute_ttl);

        let auth = Authenticator::new(
            stores.sessions,
            stores.principals,
            stores.attempts,
            CredentialHasher::from_config(config)?,
            SessionPolicy::from_config(config),
        )?;
        tracing::info!("✅ Authenticator initialized");

        Ok(AppState {
            config: config.clone(),
            keys,
            codec,
            auth: Arc::new(auth),
            redis: None,
        })
    }
}
