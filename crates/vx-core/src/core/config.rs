//! Configuration resolved once per invocation from the process environment.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Result};
use dirs_next::home_dir;

/// Overrides the base directory environments live under.
pub const ENVS_DIR_ENV: &str = "VX_ENVS_DIR";
/// Overrides the interpreter used to create new environments.
pub const PYTHON_ENV: &str = "VX_PYTHON";
/// Wall-clock limit, in seconds, on environment-creation and install
/// subprocesses. Unset or 0 means no limit, matching the source behavior.
pub const SETUP_TIMEOUT_ENV: &str = "VX_SETUP_TIMEOUT_SECS";

const ENVS_SUBDIR: &str = "envs";
const APP_DIR: &str = ".vx";

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

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
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

#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) envs_root: PathBuf,
    pub(crate) python_override: Option<String>,
    pub(crate) setup_timeout: Option<Duration>,
}

impl Config {
    /// Builds a configuration snapshot from the current process environment.
    ///
    /// # Errors
    /// Returns an error when no home directory can be resolved and no
    /// explicit base directory is set.
    pub fn from_env() -> Result<Self> {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot) -> Result<Self> {
        let envs_root = match snapshot.var(ENVS_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => home_dir()
                .ok_or_else(|| anyhow!("home directory not found; set {ENVS_DIR_ENV}"))?
                .join(APP_DIR)
                .join(ENVS_SUBDIR),
        };
        let setup_timeout = snapshot
            .var(SETUP_TIMEOUT_ENV)
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        Ok(Self {
            envs_root,
            python_override: snapshot.var(PYTHON_ENV).map(ToOwned::to_owned),
            setup_timeout,
        })
    }

    #[must_use]
    pub fn envs_root(&self) -> &Path {
        &self.envs_root
    }

    #[must_use]
    pub fn python_override(&self) -> Option<&str> {
        self.python_override.as_deref()
    }

    #[must_use]
    pub fn setup_timeout(&self) -> Option<Duration> {
        self.setup_timeout
    }
}
