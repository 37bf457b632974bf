//! Configuration for pools and logical databases.
//!
//! Connection strings arrive from the surrounding configuration loader in the
//! form `name=url` with pool options carried as URL query parameters, e.g.
//! `reports=sqlite:reports.db?max_connections=3&acquire_timeout=10`. Pool
//! options are extracted and stripped before the string reaches the driver.

use crate::error::{DbError, DbResult};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Default connection cap. The embedded engine tolerates only a handful of
/// simultaneous connections.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 2;

/// Default acquire deadline in seconds.
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Pool construction parameters for one logical database.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Driver connection string (opaque to the pool).
    pub connection_string: String,
    /// Hard cap on simultaneously existing connections.
    pub max_connections: u32,
    /// How long an acquire may wait at capacity before failing.
    pub acquire_timeout: Duration,
}

impl PoolConfig {
    /// Create a configuration with default capacity and deadline.
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        }
    }

    /// Set the connection cap.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the acquire deadline.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> DbResult<()> {
        if self.max_connections == 0 {
            return Err(DbError::invalid_input(
                "max_connections must be greater than 0",
            ));
        }
        if self.connection_string.is_empty() {
            return Err(DbError::invalid_input("connection string cannot be empty"));
        }
        Ok(())
    }
}

/// A parsed logical-database entry.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Logical name. From the `name=url` prefix, or derived from the database
    /// file stem, or "default".
    pub id: String,
    /// Connection URL with pool options stripped (sensitive - not logged).
    pub connection_string: String,
    /// Connection cap parsed from the URL, if present.
    pub max_connections: Option<u32>,
    /// Acquire deadline in seconds parsed from the URL, if present.
    pub acquire_timeout_secs: Option<u64>,
}

impl DatabaseConfig {
    /// Option keys extracted from URL query parameters.
    const POOL_OPTION_KEYS: &'static [&'static str] = &["max_connections", "acquire_timeout"];

    /// Parse a logical-database entry.
    ///
    /// # Format
    ///
    /// - `connection_string` - name derived from the database file stem
    /// - `name=connection_string` - explicit logical name
    /// - `...?max_connections=3&acquire_timeout=10` - pool options
    pub fn parse(s: &str) -> DbResult<Self> {
        // Split name=url format (only if '=' before '://')
        let scheme_pos = s.find("://").unwrap_or(s.len());
        let (explicit_name, url_str) = match s[..scheme_pos].find('=') {
            Some(idx) => (Some(&s[..idx]), &s[idx + 1..]),
            None => (None, s),
        };

        if let Some(name) = explicit_name {
            if name.trim().is_empty() {
                return Err(DbError::invalid_input("Logical database name is empty"));
            }
        }

        let mut url = Url::parse(url_str)
            .map_err(|e| DbError::invalid_input(format!("Invalid connection URL: {e}")))?;
        let mut opts = Self::extract_options(&mut url, Self::POOL_OPTION_KEYS);

        let max_connections = match opts.remove("max_connections") {
            Some(v) => Some(v.parse::<u32>().map_err(|_| {
                DbError::invalid_input(format!("Invalid max_connections value: {v}"))
            })?),
            None => None,
        };
        if max_connections == Some(0) {
            return Err(DbError::invalid_input(
                "max_connections must be greater than 0",
            ));
        }

        let acquire_timeout_secs = match opts.remove("acquire_timeout") {
            Some(v) => Some(v.parse::<u64>().map_err(|_| {
                DbError::invalid_input(format!("Invalid acquire_timeout value: {v}"))
            })?),
            None => None,
        };

        let id = explicit_name
            .map(|n| n.trim().to_string())
            .or_else(|| Self::db_name(&url))
            .unwrap_or_else(|| "default".to_string());

        Ok(Self {
            id,
            connection_string: url.to_string(),
            max_connections,
            acquire_timeout_secs,
        })
    }

    /// Build the pool configuration for this entry.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            connection_string: self.connection_string.clone(),
            max_connections: self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
            acquire_timeout: Duration::from_secs(
                self.acquire_timeout_secs
                    .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            ),
        }
    }

    /// Extract pool options from URL query params, keeping others for the
    /// driver. Uses proper URL encoding to preserve remaining params.
    fn extract_options(url: &mut Url, keys: &[&str]) -> HashMap<String, String> {
        let mut opts = HashMap::new();
        let remaining: Vec<(String, String)> = url
            .query_pairs()
            .filter_map(|(k, v)| {
                let key_lower = k.to_ascii_lowercase();
                if keys.contains(&key_lower.as_str()) {
                    opts.insert(key_lower, v.into_owned());
                    None
                } else {
                    Some((k.into_owned(), v.into_owned()))
                }
            })
            .collect();

        if remaining.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(remaining);
        }
        opts
    }

    fn db_name(url: &Url) -> Option<String> {
        url.path()
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(|s| s.trim_end_matches(".sqlite").trim_end_matches(".db"))
            .filter(|s| !s.is_empty())
            .map(String::from)
    }
}
