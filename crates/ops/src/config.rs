// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime configuration: the on-disk TOML shape this binary loads at
//! startup, plus the environment-variable overrides [`crate::env`]
//! resolves on top of it.
//!
//! Unknown top-level keys are rejected (`#[serde(deny_unknown_fields)]`) so
//! a typo in an operator's config file fails fast rather than silently
//! no-op'ing. Each [`AgentConfig`]'s plugin-scoped `extra` map is left
//! untouched by contrast — a newer plugin's config keys must survive an
//! older core version reading the same file.

use std::path::{Path, PathBuf};

use mimolo_core::{AgentConfig, AgentLabel, MonitorSettings, TrustRoots};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("io error persisting config: {0}")]
    Write(#[source] std::io::Error),
    #[error("duplicate agent label in config: {0}")]
    DuplicateLabel(AgentLabel),
}

/// The on-disk runtime config. Paths are resolved relative to the config
/// file's own directory if given as relative paths; `data_dir` is the root
/// every other directory defaults under when left unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    pub data_dir: PathBuf,
    #[serde(default)]
    pub ipc_path: Option<PathBuf>,
    #[serde(default)]
    pub ops_log_path: Option<PathBuf>,
    #[serde(default)]
    pub journal_dir: Option<PathBuf>,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub monitor: MonitorSettings,
    /// Directories under which an agent `executable` must resolve. The
    /// installed-plugins agents directory (`<data_dir>/operations/plugins/agents`)
    /// is always implicitly trusted in addition to these.
    #[serde(default)]
    pub trust_roots: Vec<PathBuf>,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

impl RuntimeConfig {
    /// Loads and validates a config file. Duplicate `label`s across
    /// `agents` are rejected here rather than left to surface as a silent
    /// last-write-wins at registration time.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        let config: RuntimeConfig = toml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.label.clone()) {
                return Err(ConfigError::DuplicateLabel(agent.label.clone()));
            }
        }
        Ok(())
    }

    /// Atomically replaces `path` with this config's current contents:
    /// write-temp-then-rename, the same durability discipline as the
    /// segment cache (C6.2).
    pub fn persist(&self, path: &Path) -> Result<(), ConfigError> {
        let body = toml::to_string_pretty(self)?;
        let tmp_path = path.with_extension("toml.tmp");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Write)?;
        }
        std::fs::write(&tmp_path, body).map_err(ConfigError::Write)?;
        std::fs::rename(&tmp_path, path).map_err(ConfigError::Write)?;
        Ok(())
    }

    pub fn journal_dir(&self) -> PathBuf {
        self.journal_dir.clone().unwrap_or_else(|| self.data_dir.join("operations/journal"))
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| self.data_dir.join("operations/cache"))
    }

    pub fn stderr_log_dir(&self) -> PathBuf {
        self.data_dir.join("operations/logs/agents")
    }

    pub fn plugin_store_dir(&self) -> PathBuf {
        self.data_dir.join("operations/plugins/agents")
    }

    /// The effective trust-root allowlist: the configured roots plus the
    /// installed-plugins directory, which is always trusted per §6.
    pub fn trust_roots(&self) -> TrustRoots {
        let mut roots = self.trust_roots.clone();
        roots.push(self.plugin_store_dir());
        TrustRoots::new(roots)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
