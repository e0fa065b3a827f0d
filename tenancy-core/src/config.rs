//! # Tenancy configuration
//!
//! Configuration is a plain string key/value store, the same shape as
//! Feathers' `app.set()` / `app.get()`. Typed views such as
//! [`RoutingConfig`] are read out of an immutable [`TenancyConfigSnapshot`].
//!
//! ```rust
//! use tenancy_core::config::{RoutingConfig, RoutingMode, TenancyConfig};
//!
//! let mut config = TenancyConfig::new();
//! config.set("routing.mode", "path");
//! config.set("routing.base_domain", "example.org");
//!
//! let routing = RoutingConfig::from_snapshot(&config.snapshot()).unwrap();
//! assert_eq!(routing.mode, RoutingMode::Path);
//! ```
//!
//! Environment overrides use a prefix and double underscores as separators:
//! `TENANCY__ROUTING__MODE=path` becomes `routing.mode = "path"`.

use std::collections::HashMap;
use std::str::FromStr;

use crate::errors::{TenancyError, TenancyResult};
use crate::tenant::normalize_host;

pub const ROUTING_MODE: &str = "routing.mode";
pub const ROUTING_BASE_DOMAIN: &str = "routing.base_domain";
pub const ROUTING_ROOT_PATH: &str = "routing.root_path";
pub const ROOT_ACCESS: &str = "root.access";
pub const TENANTS_DELETION: &str = "tenants.deletion";
pub const ADMIN_ACCESS: &str = "admin.access";
pub const ROUTING_REDIRECT_ALIASES: &str = "routing.redirect_aliases";

#[derive(Debug, Default, Clone)]
pub struct TenancyConfig {
    values: HashMap<String, String>,
}

impl TenancyConfig {
    /// Create an empty config store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Get a configuration value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Copy every `PREFIX__A__B=value` variable into `a.b = value`.
    pub fn load_env(&mut self, prefix: &str) {
        self.load_vars(prefix, std::env::vars());
    }

    fn load_vars<I>(&mut self, prefix: &str, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let prefix = format!("{}__", prefix.trim_end_matches('_'));
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(&prefix) {
                let normalized = stripped.to_lowercase().replace("__", ".");
                self.set(normalized, value);
            }
        }
    }

    pub fn snapshot(&self) -> TenancyConfigSnapshot {
        TenancyConfigSnapshot::new(self.values.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TenancyConfigSnapshot {
    map: HashMap<String, String>,
}

impl TenancyConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse::<usize>().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.parse::<bool>().ok())
    }
}

/// How an inbound request is matched to a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutingMode {
    /// Match the Host header against tenant domains and aliases.
    #[default]
    Host,
    /// Match the first path segment against tenant path keys.
    Path,
}

impl FromStr for RoutingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" => Ok(RoutingMode::Host),
            "path" => Ok(RoutingMode::Path),
            other => Err(TenancyError::validation(
                "Invalid tenancy configuration",
                serde_json::json!({ ROUTING_MODE: [format!("unknown routing mode '{other}'")] }),
            )
            .into_anyhow()),
        }
    }
}

/// Deployment-level routing configuration consumed by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    pub mode: RoutingMode,
    /// The deployment's own domain; in host mode it serves the root site.
    pub base_domain: String,
    /// Leading path segment reserved for the root site in path mode.
    pub root_path: String,
    /// In host mode, send requests arriving on any host other than the
    /// tenant's public domain there with a redirect.
    pub redirect_aliases: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            mode: RoutingMode::Host,
            base_domain: "localhost".to_string(),
            root_path: "root".to_string(),
            redirect_aliases: false,
        }
    }
}

impl RoutingConfig {
    pub fn host(base_domain: impl Into<String>) -> Self {
        Self {
            mode: RoutingMode::Host,
            base_domain: normalize_host(&base_domain.into()),
            ..Self::default()
        }
    }

    pub fn path(root_path: impl Into<String>) -> Self {
        Self {
            mode: RoutingMode::Path,
            root_path: root_path.into().trim_matches('/').to_string(),
            ..Self::default()
        }
    }

    pub fn from_snapshot(config: &TenancyConfigSnapshot) -> TenancyResult<Self> {
        let defaults = Self::default();
        let mode = match config.get(ROUTING_MODE) {
            Some(raw) => raw.parse()?,
            None => defaults.mode,
        };
        let base_domain = config
            .get(ROUTING_BASE_DOMAIN)
            .map(normalize_host)
            .unwrap_or(defaults.base_domain);
        let root_path = config
            .get(ROUTING_ROOT_PATH)
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or(defaults.root_path);
        let redirect_aliases = match config.get(ROUTING_REDIRECT_ALIASES) {
            Some(raw) => raw.trim().parse::<bool>().map_err(|_| {
                TenancyError::validation(
                    "Invalid tenancy configuration",
                    serde_json::json!({ ROUTING_REDIRECT_ALIASES: [format!("expected true or false, got '{raw}'")] }),
                )
            })?,
            None => defaults.redirect_aliases,
        };

        Ok(Self {
            mode,
            base_domain,
            root_path,
            redirect_aliases,
        })
    }
}
