// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Workflow configuration.
//!
//! A workflow file (YAML, or JSON when loaded explicitly) declares the
//! agents of a session, the tool-approval policy, and the checkpoint
//! backend. The loader merges the file over built-in defaults; every field
//! is optional.

mod loader;
mod types;

pub use loader::{
    expand_path, find_workflow_root, get_global_config_dir, load_workflow_config,
    load_workflow_file, CONFIG_FILES, GLOBAL_CONFIG_DIR,
};
pub use types::{
    AgentDefinition, ApprovalPolicyConfig, CapabilityToggles, CheckpointBackend,
    CheckpointConfig, WorkflowConfig,
};
