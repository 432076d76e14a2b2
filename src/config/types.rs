// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Workflow configuration types.
//!
//! A workflow file declares the agents of a session, the tool-approval
//! policy, and the checkpoint backend. All fields are optional in the file;
//! missing values fall back to the built-in defaults.

use serde::{Deserialize, Serialize};

/// Top-level workflow configuration, usually loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConfig {
    /// Default session id when the caller does not supply one.
    #[serde(default = "default_session_id")]
    pub session_id: String,

    /// Agents in registration order; the first is the entry point.
    #[serde(default)]
    pub agents: Vec<AgentDefinition>,

    #[serde(default)]
    pub approval: ApprovalPolicyConfig,

    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    /// Delegation pushes beyond this depth are refused back to the sender.
    #[serde(default = "default_max_delegation_depth")]
    pub max_delegation_depth: usize,
}

fn default_session_id() -> String {
    "default".to_string()
}

fn default_max_delegation_depth() -> usize {
    8
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            session_id: default_session_id(),
            agents: Vec::new(),
            approval: ApprovalPolicyConfig::default(),
            checkpoint: CheckpointConfig::default(),
            max_delegation_depth: default_max_delegation_depth(),
        }
    }
}

/// One agent in the workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    pub name: String,
    /// Shown to peers in their helper roster.
    pub description: String,
    /// Behavioral instructions for the system prompt.
    #[serde(default)]
    pub constitution: String,
    /// Peer names this agent may address; absent = all registered peers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitelist: Option<Vec<String>>,
    #[serde(default)]
    pub capabilities: CapabilityToggles,
}

/// Which built-in capabilities an agent carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityToggles {
    /// Render the helper roster and expose the destination attribute.
    #[serde(default = "default_true")]
    pub helpers: bool,
    /// Attach the shared-file workspace.
    #[serde(default)]
    pub workspace: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CapabilityToggles {
    fn default() -> Self {
        Self {
            helpers: true,
            workspace: false,
        }
    }
}

/// Tool-approval policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalPolicyConfig {
    /// Auto-approve tool batches after surfacing the approval event.
    #[serde(default)]
    pub continuous: bool,
    /// Regex patterns; a matching pending call still surfaces for manual
    /// approval even in continuous mode. Invalid patterns are logged and
    /// skipped at policy construction.
    #[serde(default)]
    pub deny_patterns: Vec<String>,
}

/// Checkpoint persistence backend selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointConfig {
    #[serde(default)]
    pub backend: CheckpointBackend,
    /// SQLite database path; `~` expands to the home directory. Absent =
    /// the default location under the home directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    #[default]
    Memory,
    Sqlite,
}
