use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_WORKERS: usize = 4;
pub const DEFAULT_QUERY_WORKERS: usize = 5;
pub const DEFAULT_SETUP_WORKERS: usize = 3;
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_APPLY_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
    pub json: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn flag_is_enabled(&self, key: &str) -> bool {
        self.var(key).is_some_and(|value| {
            let lowered = value.trim().to_ascii_lowercase();
            matches!(lowered.as_str(), "1" | "true" | "yes" | "on")
        })
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Positive integer value of `key`; anything else reads as unset.
    pub(crate) fn positive(&self, key: &str) -> Option<usize> {
        self.var(key)
            .and_then(|raw| raw.parse::<usize>().ok())
            .filter(|value| *value > 0)
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub parallel: bool,
    /// Set only when `DEVBOX_MAX_WORKERS` was given explicitly.
    pub max_workers: Option<usize>,
    pub query_workers: usize,
    pub setup_workers: usize,
    pub query_timeout: Duration,
    pub apply_timeout: Duration,
}

impl PoolConfig {
    /// Width of the pool that runs read-only collection commands.
    #[must_use]
    pub fn query_width(&self) -> usize {
        if !self.parallel {
            return 1;
        }
        match self.max_workers {
            Some(max) => self.query_workers.min(max),
            None => self.query_workers,
        }
    }

    /// Width of the pool that runs per-manager reconcile groups.
    #[must_use]
    pub fn setup_width(&self) -> usize {
        if !self.parallel {
            return 1;
        }
        self.setup_workers
            .min(self.max_workers.unwrap_or(DEFAULT_MAX_WORKERS))
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            max_workers: None,
            query_workers: DEFAULT_QUERY_WORKERS,
            setup_workers: DEFAULT_SETUP_WORKERS,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            apply_timeout: DEFAULT_APPLY_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) pool: PoolConfig,
    pub(crate) backend: Option<String>,
    pub(crate) home: Option<PathBuf>,
}

impl Config {
    /// Builds a configuration snapshot from the current process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot) -> Self {
        let defaults = PoolConfig::default();
        let pool = PoolConfig {
            parallel: !snapshot.flag_is_enabled("DEVBOX_DISABLE_PARALLEL"),
            max_workers: snapshot.positive("DEVBOX_MAX_WORKERS"),
            query_workers: snapshot
                .positive("DEVBOX_QUERY_WORKERS")
                .unwrap_or(defaults.query_workers),
            setup_workers: snapshot
                .positive("DEVBOX_SETUP_WORKERS")
                .unwrap_or(defaults.setup_workers),
            query_timeout: snapshot
                .positive("DEVBOX_QUERY_TIMEOUT_SECS")
                .map_or(defaults.query_timeout, secs),
            apply_timeout: snapshot
                .positive("DEVBOX_APPLY_TIMEOUT_SECS")
                .map_or(defaults.apply_timeout, secs),
        };
        Self {
            pool,
            backend: snapshot.var("DEVBOX_CONTAINER_BACKEND").map(ToOwned::to_owned),
            home: snapshot
                .var("DEVBOX_HOME")
                .map(PathBuf::from)
                .or_else(devbox_domain::default_home),
        }
    }

    #[must_use]
    pub fn pool(&self) -> &PoolConfig {
        &self.pool
    }

    #[must_use]
    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    #[must_use]
    pub fn home(&self) -> Option<&PathBuf> {
        self.home.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn testing(home: PathBuf) -> Self {
        Self {
            pool: PoolConfig::default(),
            backend: None,
            home: Some(home),
        }
    }
}

fn secs(value: usize) -> Duration {
    Duration::from_secs(u64::try_from(value).unwrap_or(u64::MAX))
}
