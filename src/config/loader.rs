// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Workflow configuration loading.
//!
//! Handles locating and parsing workflow files (YAML or JSON) and expanding
//! `~` in configured paths.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::WorkflowConfig;

/// Workflow file names to search for (in order).
pub const CONFIG_FILES: &[&str] = &[".troupe.yaml", ".troupe.yml", "troupe.yaml"];

/// Global config directory name under the home directory.
pub const GLOBAL_CONFIG_DIR: &str = ".troupe";

/// Get the global config directory path.
pub fn get_global_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR))
}

/// Load a workflow file (YAML or JSON, by extension).
pub fn load_workflow_file(path: &Path) -> Result<WorkflowConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match extension.to_lowercase().as_str() {
        "json" => serde_json::from_str(&content).map_err(ConfigError::from),
        _ => serde_yaml::from_str(&content).map_err(ConfigError::from),
    }
}

/// Load the workflow config for a directory, falling back to defaults.
///
/// Searches `dir` for the known file names in order; a missing file is not
/// an error, only a malformed one is.
pub fn load_workflow_config(dir: &Path) -> Result<WorkflowConfig, ConfigError> {
    for filename in CONFIG_FILES {
        let path = dir.join(filename);
        if path.exists() {
            return load_workflow_file(&path);
        }
    }
    Ok(WorkflowConfig::default())
}

/// Find the workflow root by searching for config files.
///
/// Walks up the directory tree from `start` until it finds a directory
/// containing a workflow file or reaches the filesystem root.
pub fn find_workflow_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        for filename in CONFIG_FILES {
            if current.join(filename).exists() {
                return Some(current);
            }
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return None,
        }
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
