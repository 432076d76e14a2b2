// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agent configuration, events, and turn outcomes.

use serde::{Deserialize, Serialize};

use crate::types::{AttributeDescriptor, ResponseEnvelope, SuspensionPoint, ToolCall};

/// Text substituted for an empty model response with no tool calls.
pub const SYNTHETIC_COMPLETION_TEXT: &str = "I have completed my task.";

/// Preamble injected when a human denies pending tool calls with feedback.
pub const FEEDBACK_PREAMBLE: &str =
    "I have cancelled the execution of the tool calls and instead I am giving you the following feedback:";

/// Model-facing note after approved tool calls have run.
pub const TOOL_RESULT_PREAMBLE: &str =
    "The tool calls have finished running. Review their results and continue with your task.";

/// Static definition of one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique agent name; also the routing destination peers use.
    pub name: String,
    /// One-line description shown in peer rosters.
    pub description: String,
    /// Behavioral instructions prepended to every system prompt.
    pub constitution: String,
    /// Response attributes the agent itself declares, before capabilities
    /// add theirs.
    #[serde(default)]
    pub attributes: Vec<AttributeDescriptor>,
    /// Cap on assistant turns per thread before the machine refuses to
    /// continue.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_max_iterations() -> u32 {
    50
}

impl AgentConfig {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        constitution: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            constitution: constitution.into(),
            attributes: Vec::new(),
            max_iterations: default_max_iterations(),
        }
    }

    pub fn with_attributes(mut self, attributes: Vec<AttributeDescriptor>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// The identity line opening the system prompt.
    pub fn identity(&self) -> String {
        format!("You are {}. {}", self.name, self.description)
    }
}

/// Progress events streamed while a turn is being driven.
///
/// Events flow over an unbounded channel; channel close is the
/// stream-complete signal.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A chunk of user-visible response text, post-marker.
    TextChunk { agent: String, text: String },
    /// The model proposed tool calls and the machine suspended for approval.
    ToolApprovalRequested { agent: String, calls: Vec<ToolCall> },
    /// Echo of one executed tool result.
    ToolResult {
        agent: String,
        call_id: String,
        name: String,
        content: String,
        is_error: bool,
    },
    /// The agent handed its turn to a delegate.
    Delegated {
        agent: String,
        delegate: String,
        text: String,
    },
    /// The turn finished with a terminal response.
    TurnCompleted { agent: String, text: String },
}

impl AgentEvent {
    /// The agent the event belongs to.
    pub fn agent(&self) -> &str {
        match self {
            Self::TextChunk { agent, .. }
            | Self::ToolApprovalRequested { agent, .. }
            | Self::ToolResult { agent, .. }
            | Self::Delegated { agent, .. }
            | Self::TurnCompleted { agent, .. } => agent,
        }
    }
}

/// How one drive of the state machine ended.
#[derive(Debug)]
pub enum TurnOutcome {
    /// Terminal response; the envelope carries attributes and user text.
    Completed(ResponseEnvelope),
    /// Parked at a suspension point awaiting a resume payload.
    Suspended(SuspensionPoint),
}

impl TurnOutcome {
    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Suspended(_))
    }

    /// The envelope of a completed turn, if any.
    pub fn envelope(&self) -> Option<&ResponseEnvelope> {
        match self {
            Self::Completed(envelope) => Some(envelope),
            Self::Suspended(_) => None,
        }
    }
}
