use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Principals seeded into the in-memory directory, as `(identifier, password)`.
///
/// Development only. Passwords are hashed before they reach the directory and
/// never appear in `Debug` output.
#[derive(Clone, Default)]
pub struct DevPrincipals(pub Vec<(String, String)>);

impl std::fmt::Debug for DevPrincipals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(|(identifier, _)| identifier))
            .finish()
    }
}

impl FromStr for DevPrincipals {
    type Err = anyhow::Error;

    /// Parses `name:password` pairs separated by commas.
    fn from_str(raw: &str) -> Result<Self> {
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                entry
                    .split_once(':')
                    .filter(|(identifier, password)| !identifier.is_empty() && !password.is_empty())
                    .map(|(identifier, password)| (identifier.to_string(), password.to_string()))
                    .ok_or_else(|| anyhow::anyhow!("Expected identifier:password, got {:?}", entry))
            })
            .collect::<Result<Vec<_>>>()
            .map(DevPrincipals)
    }
}

/// The application's configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// The URL of the PostgreSQL database. `None` selects the in-memory stores.
    pub database_url: Option<String>,
    /// The URL of the Redis server. `None` disables login rate limiting.
    pub redis_url: Option<String>,
    /// Name of the session cookie.
    pub cookie_name: String,
    /// Whether the session cookie carries the `Secure` attribute.
    pub cookie_secure: bool,
    /// Maximum lifetime of a session, counted from origination.
    pub absolute_ttl: chrono::Duration,
    /// Maximum inactivity before a session lapses, counted from last-seen.
    pub idle_ttl: chrono::Duration,
    /// Last-seen updates younger than this are not written again.
    pub touch_interval: chrono::Duration,
    /// How often the key ring rotates. Zero disables scheduled rotation.
    pub key_rotation_interval: Duration,
    /// Deadline applied to every session store call.
    pub store_timeout: Duration,
    /// Argon2 memory cost in KiB.
    pub hash_memory_kib: u32,
    /// Argon2 iteration count.
    pub hash_iterations: u32,
    /// Argon2 lane count.
    pub hash_parallelism: u32,
    /// Where page guards redirect anonymous requests.
    pub login_path: String,
    /// Failed login attempts allowed per address inside one window.
    pub login_max_attempts: u32,
    /// Length of the login rate limiting window.
    pub login_window: Duration,
    /// How often expired sessions are swept. Zero disables the sweep.
    pub prune_interval: Duration,
    /// Seed principals for the in-memory directory. Ignored with a database.
    pub dev_principals: DevPrincipals,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            database_url: None,
            redis_url: None,
            cookie_name: "session".to_string(),
            cookie_secure: false,
            absolute_ttl: chrono::Duration::days(30),
            idle_ttl: chrono::Duration::days(7),
            touch_interval: chrono::Duration::seconds(60),
            key_rotation_interval: Duration::from_secs(24 * 3600),
            store_timeout: Duration::from_millis(2000),
            hash_memory_kib: 19 * 1024,
            hash_iterations: 2,
            hash_parallelism: 1,
            login_path: "/login".to_string(),
            login_max_attempts: 5,
            login_window: Duration::from_secs(900),
            prune_interval: Duration::from_secs(3600),
            dev_principals: DevPrincipals::default(),
        }
    }
}

/// Reads `key` and parses it, falling back to `default` when unset.
fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// Every key is optional; unset keys keep the values from [`Config::default`].
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let absolute_days: i64 = parse_var("SESSION_ABSOLUTE_TTL_DAYS", 30)?;
        let idle_days: i64 = parse_var("SESSION_IDLE_TTL_DAYS", 7)?;
        if absolute_days <= 0 || idle_days <= 0 {
            anyhow::bail!("Session TTLs must be positive numbers of days");
        }

        let touch_secs: i64 = parse_var("SESSION_TOUCH_INTERVAL_SECS", 60)?;
        let rotation_hours: u64 = parse_var("KEY_ROTATION_INTERVAL_HOURS", 24)?;
        let store_timeout_ms: u64 = parse_var("STORE_TIMEOUT_MS", 2000)?;
        let login_window_secs: u64 = parse_var("LOGIN_WINDOW_SECS", 900)?;
        let prune_secs: u64 = parse_var("SESSION_PRUNE_INTERVAL_SECS", 3600)?;

        let hash_memory_kib = parse_var("HASH_MEMORY_KIB", defaults.hash_memory_kib)?;
        let hash_iterations = parse_var("HASH_ITERATIONS", defaults.hash_iterations)?;
        let hash_parallelism = parse_var("HASH_PARALLELISM", defaults.hash_parallelism)?;
        argon2::Params::new(hash_memory_kib, hash_iterations, hash_parallelism, None)
            .map_err(|e| anyhow::anyhow!("Invalid hash cost parameters: {}", e))?;

        Ok(Self {
            bind_addr: parse_var("BIND_ADDR", defaults.bind_addr)?,
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            cookie_name: env::var("SESSION_COOKIE_NAME").unwrap_or(defaults.cookie_name),
            cookie_secure: parse_var("COOKIE_SECURE", defaults.cookie_secure)?,
            absolute_ttl: chrono::Duration::days(absolute_days),
            idle_ttl: chrono::Duration::days(idle_days),
            touch_interval: chrono::Duration::seconds(touch_secs.max(0)),
            key_rotation_interval: Duration::from_secs(rotation_hours * 3600),
            store_timeout: Duration::from_millis(store_timeout_ms),
            hash_memory_kib,
            hash_iterations,
            hash_parallelism,
            login_path: env::var("LOGIN_PATH").unwrap_or(defaults.login_path),
            login_max_attempts: parse_var("LOGIN_MAX_ATTEMPTS", defaults.login_max_attempts)?,
            login_window: Duration::from_secs(login_window_secs),
            prune_interval: Duration::from_secs(prune_secs),
            dev_principals: match env::var("DEV_PRINCIPALS") {
                Ok(raw) => raw.parse().context("Invalid DEV_PRINCIPALS")?,
                Err(_) => DevPrincipals::default(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_policy() {
        let config = Config::default();
        assert_eq!(config.absolute_ttl, chrono::Duration::days(30));
        assert_eq!(config.idle_ttl, chrono::Duration::days(7));
        assert_eq!(config.cookie_name, "session");
        assert!(config.database_url.is_none());
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn dev_principals_parse_and_redact() {
        let parsed: DevPrincipals = "alice:wonderland, bob:builder".parse().unwrap();
        assert_eq!(parsed.0.len(), 2);
        assert_eq!(parsed.0[1], ("bob".to_string(), "builder".to_string()));

        let debug = format!("{:?}", parsed);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("wonderland"));

        assert!("alice".parse::<DevPrincipals>().is_err());
        assert!(":pw".parse::<DevPrincipals>().is_err());
        assert!("".parse::<DevPrincipals>().unwrap().0.is_empty());
    }

    #[test]
    fn parse_var_falls_back_when_unset() {
        let value: u32 = parse_var("SESSIONGUARD_TEST_SURELY_UNSET_KEY", 42).unwrap();
        assert_eq!(value, 42);
    }
}
