// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agent capabilities.
//!
//! A capability is a pluggable extension of an agent: it can contribute
//! response attributes, system-prompt content, per-turn message content with
//! retention tags, tools, and slash-style commands, and it gets to observe
//! every parsed response. The state machine runs every hook at fixed points
//! in the turn; hook failures are logged and skipped, never fatal.

mod context;
mod peers;
mod workspace;

pub use context::{AssembledMessage, ContextAssembler};
pub use peers::{PeerDirectory, PeerInfo};
pub use workspace::{
    InMemoryWorkspace, Workspace, WorkspaceCapability, SHARED_FILES_ATTRIBUTE,
};

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    AttributeDescriptor, ContentBlock, IncomingMessage, ResponseEnvelope, SharedFile,
    ToolDefinition,
};

/// The input a turn is about to process, as seen by capability hooks.
#[derive(Debug, Clone)]
pub enum NextMessage {
    /// A message from the user or a peer agent.
    User(IncomingMessage),
    /// A tool result being folded back into the conversation.
    ToolResponse {
        call_id: String,
        name: String,
        content: String,
    },
}

/// How long capability-contributed message content stays in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Shown on the current turn only; never stored.
    None,
    /// Stored with no expiry.
    Forever,
    /// Stored, expiring after the given number of retention-tracked turns.
    Turns(u32),
}

impl Persistence {
    /// The retention horizon entry for stored blocks.
    /// `None` = never expire. Display-only content has no entry at all.
    pub fn horizon(&self) -> Option<u32> {
        match self {
            Self::None | Self::Forever => None,
            Self::Turns(n) => Some(*n),
        }
    }

    pub fn is_stored(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// One chunk of content a capability adds to the next message.
#[derive(Debug, Clone)]
pub struct AdditionalContent {
    pub persistence: Persistence,
    /// Whether the content is shown to the model on the current turn.
    pub display_on_current_message: bool,
    pub content: Vec<ContentBlock>,
}

impl AdditionalContent {
    /// Content for the current turn only.
    pub fn display(content: Vec<ContentBlock>) -> Self {
        Self {
            persistence: Persistence::None,
            display_on_current_message: true,
            content,
        }
    }

    /// Content stored in history with the given persistence.
    pub fn persistent(persistence: Persistence, content: Vec<ContentBlock>) -> Self {
        Self {
            persistence,
            display_on_current_message: true,
            content,
        }
    }
}

/// A user-invocable command a capability exposes through the outer layer.
#[derive(Debug, Clone)]
pub struct AgentCommand {
    pub name: String,
    pub description: String,
}

impl AgentCommand {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A pluggable agent extension.
///
/// Every hook has a no-op default so capabilities implement only what they
/// need.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Display name; `None` renders the contribution under a plain divider.
    fn name(&self) -> Option<&str> {
        None
    }

    /// One-time setup before the first turn.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Called before each turn; a capability may refresh internal state.
    async fn ready_to_proceed(&self, _next: &NextMessage) -> Result<()> {
        Ok(())
    }

    /// Response attributes this capability declares for the coming turn.
    async fn attributes(&self, _next: &NextMessage) -> Result<Vec<AttributeDescriptor>> {
        Ok(Vec::new())
    }

    /// Content merged into the system prompt.
    async fn system_content(&self) -> Result<Vec<ContentBlock>> {
        Ok(Vec::new())
    }

    /// Content merged into the next message, split display/persistent.
    async fn additional_message_content(
        &self,
        _next: &NextMessage,
    ) -> Result<Vec<AdditionalContent>> {
        Ok(Vec::new())
    }

    /// Files this capability attaches to the turn's envelope, resolved from
    /// the parsed response attributes.
    async fn shared_files(&self, _envelope: &ResponseEnvelope) -> Result<Vec<SharedFile>> {
        Ok(Vec::new())
    }

    /// Observe the parsed response of the turn.
    async fn read_response(&self, _envelope: &ResponseEnvelope) -> Result<()> {
        Ok(())
    }

    /// Tools this capability contributes to the agent's catalog.
    fn tools(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    /// Commands this capability exposes.
    fn commands(&self) -> Vec<AgentCommand> {
        Vec::new()
    }

    /// Execute one of this capability's commands. May return content to
    /// feed into the conversation as the next message.
    async fn handle_command(&self, _command: &str) -> Result<Option<IncomingMessage>> {
        Ok(None)
    }

    /// Discard all internal state (conversation reset).
    async fn reset(&self) -> Result<()> {
        Ok(())
    }
}

/// Arc-wrapped capability for shared ownership.
pub type SharedCapability = Arc<dyn Capability>;
