// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin store (§11 supplement): the filesystem-is-ground-truth registry
//! of installed agent plugins at
//! `<data_dir>/operations/plugins/agents/<plugin_id>/<version>/`.
//!
//! There is no in-memory registry kept across calls — every command here
//! re-scans the tree, per the rule that the filesystem is authoritative and
//! any cache of it is rebuilt, never trusted standalone.

use std::path::{Path, PathBuf};

use mimolo_core::{AgentCapabilities, PluginId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginStoreError {
    #[error("archive path does not exist: {0}")]
    NotFound(PathBuf),
    #[error("missing or unreadable plugin.toml at {0}")]
    InvalidManifest(PathBuf),
    #[error("entrypoint {entrypoint} declared in manifest does not exist under {archive}")]
    MissingEntrypoint { archive: PathBuf, entrypoint: String },
    #[error("plugin {plugin_id} version {version} is already installed")]
    AlreadyInstalled { plugin_id: PluginId, version: String },
    #[error("upgrade version {new} is not newer than installed version {installed}")]
    NotNewer { new: String, installed: String },
    #[error("manifest version {0} is not valid semver")]
    BadVersion(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// `plugin.toml` at the root of an installed (or candidate) plugin archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub plugin_id: PluginId,
    pub version: String,
    #[serde(default)]
    pub capabilities: AgentCapabilities,
    pub entrypoint: String,
    #[serde(default)]
    pub content_modes: Vec<String>,
}

/// One entry in `list_installed_plugins` / `list_agent_templates`: a parsed
/// manifest plus the directory it was read from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstalledPlugin {
    pub manifest: PluginManifest,
    pub install_dir: PathBuf,
}

fn parse_semver(version: &str) -> Result<(u64, u64, u64), PluginStoreError> {
    let mut parts = version.split('.');
    let major = parts.next().and_then(|p| p.parse().ok());
    let minor = parts.next().and_then(|p| p.parse().ok());
    let patch = parts.next().and_then(|p| p.parse().ok());
    match (major, minor, patch) {
        (Some(maj), Some(min), Some(pat)) if parts.next().is_none() => Ok((maj, min, pat)),
        _ => Err(PluginStoreError::BadVersion(version.to_string())),
    }
}

fn read_manifest(archive_dir: &Path) -> Result<PluginManifest, PluginStoreError> {
    let manifest_path = archive_dir.join("plugin.toml");
    let text = std::fs::read_to_string(&manifest_path).map_err(|_| PluginStoreError::InvalidManifest(manifest_path.clone()))?;
    let manifest: PluginManifest = toml::from_str(&text).map_err(|_| PluginStoreError::InvalidManifest(manifest_path.clone()))?;

    parse_semver(&manifest.version)?;

    if !archive_dir.join(&manifest.entrypoint).exists() {
        return Err(PluginStoreError::MissingEntrypoint {
            archive: archive_dir.to_path_buf(),
            entrypoint: manifest.entrypoint.clone(),
        });
    }

    Ok(manifest)
}

/// Validates `archive_path`'s manifest without installing anything.
pub fn inspect_archive(archive_path: &Path) -> Result<PluginManifest, PluginStoreError> {
    if !archive_path.exists() {
        return Err(PluginStoreError::NotFound(archive_path.to_path_buf()));
    }
    read_manifest(archive_path)
}

/// Scans `<store_dir>/<plugin_id>/<version>/plugin.toml` for every
/// installed plugin. Directories that fail to parse are skipped rather
/// than failing the whole scan — one corrupt install must not hide the
/// rest of the store.
pub fn list_installed(store_dir: &Path) -> Result<Vec<InstalledPlugin>, PluginStoreError> {
    let mut installed = Vec::new();
    let Ok(plugin_dirs) = std::fs::read_dir(store_dir) else {
        return Ok(installed);
    };

    for plugin_entry in plugin_dirs.flatten() {
        if !plugin_entry.path().is_dir() {
            continue;
        }
        let Ok(version_dirs) = std::fs::read_dir(plugin_entry.path()) else {
            continue;
        };
        for version_entry in version_dirs.flatten() {
            let install_dir = version_entry.path();
            if !install_dir.is_dir() {
                continue;
            }
            if let Ok(manifest) = read_manifest(&install_dir) {
                installed.push(InstalledPlugin { manifest, install_dir });
            }
        }
    }

    Ok(installed)
}

fn versions_for(store_dir: &Path, plugin_id: &PluginId) -> Result<Vec<String>, PluginStoreError> {
    let plugin_dir = store_dir.join(plugin_id.as_str());
    let Ok(entries) = std::fs::read_dir(&plugin_dir) else {
        return Ok(Vec::new());
    };
    Ok(entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let dst_path = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &dst_path)?;
        } else {
            std::fs::copy(entry.path(), &dst_path)?;
        }
    }
    Ok(())
}

/// Validates the manifest, then materializes the archive into
/// `<store_dir>/<plugin_id>/<version>/`. Fails with `AlreadyInstalled`
/// unless that exact version directory is absent.
pub fn install(store_dir: &Path, archive_path: &Path) -> Result<InstalledPlugin, PluginStoreError> {
    let manifest = inspect_archive(archive_path)?;
    let install_dir = store_dir.join(manifest.plugin_id.as_str()).join(&manifest.version);

    if install_dir.exists() {
        return Err(PluginStoreError::AlreadyInstalled {
            plugin_id: manifest.plugin_id.clone(),
            version: manifest.version.clone(),
        });
    }

    copy_dir_recursive(archive_path, &install_dir)?;
    Ok(InstalledPlugin { manifest, install_dir })
}

/// Like [`install`], but requires `version` to be strictly semver-greater
/// than every version currently on disk for that `plugin_id`. The bridge
/// protocol carries no `force` override (see DESIGN.md) — this check is
/// never bypassed.
pub fn upgrade(store_dir: &Path, archive_path: &Path) -> Result<InstalledPlugin, PluginStoreError> {
    let manifest = inspect_archive(archive_path)?;
    let candidate = parse_semver(&manifest.version)?;

    for existing in versions_for(store_dir, &manifest.plugin_id)? {
        let existing_tuple = parse_semver(&existing)?;
        if candidate <= existing_tuple {
            return Err(PluginStoreError::NotNewer {
                new: manifest.version.clone(),
                installed: existing,
            });
        }
    }

    let install_dir = store_dir.join(manifest.plugin_id.as_str()).join(&manifest.version);
    copy_dir_recursive(archive_path, &install_dir)?;
    Ok(InstalledPlugin { manifest, install_dir })
}

#[cfg(test)]
#[path = "plugin_store_tests.rs"]
mod tests;
