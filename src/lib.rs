// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! troupe - a runtime for multi-agent conversational workflows.
//!
//! A set of named agents, each backed by a language model, that call tools,
//! pause for human approval, delegate sub-tasks to peer agents, and resume
//! exactly where they left off after a process restart. The coordination
//! layer is the point: a per-agent suspend/resume state machine, a
//! structured response-field protocol over free text, and a call-stack
//! orchestrator with a deterministic replay order.
//!
//! # Architecture
//!
//! - [`types`] - Core types (Message, SuspensionPoint, ResponseEnvelope,
//!   the ModelClient seam)
//! - [`error`] - Per-domain error enums and result alias
//! - [`mapper`] - Response field extraction and streaming marker gating
//! - [`retention`] - Message retention pruning
//! - [`checkpoint`] - Append-log persistence, thread folding, hydration
//!   projections; memory and SQLite backends
//! - [`capability`] - Pluggable agent extensions (helper roster, workspace)
//! - [`agent`] - The per-agent suspend/resume state machine
//! - [`orchestrate`] - Agent registry, call-stack routing, hydration replay
//! - [`tools`] - Tool handler trait and registry
//! - [`config`] - Workflow configuration loading
//! - [`telemetry`] - Tracing and metrics infrastructure
//! - [`cli`] - The `troupe` binary's subcommands
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use troupe::agent::{AgentConfig, AgentOptions, AgentStateMachine};
//! use troupe::checkpoint::MemoryCheckpointStore;
//! use troupe::orchestrate::{AgentRegistry, ApprovalPolicy, ConversationOrchestrator};
//! use troupe::types::IncomingMessage;
//!
//! let store = Arc::new(MemoryCheckpointStore::new());
//! let assistant = Arc::new(AgentStateMachine::new(AgentOptions {
//!     config: AgentConfig::new("Assistant", "General assistant", "Be concise."),
//!     model,
//!     tools,
//!     capabilities: vec![],
//!     store: store.clone(),
//!     session_id: "demo".into(),
//! }));
//!
//! let mut builder = AgentRegistry::builder();
//! builder.register(assistant);
//! let mut orchestrator = ConversationOrchestrator::new(
//!     Arc::new(builder.build()),
//!     store,
//!     "demo",
//!     ApprovalPolicy::manual(),
//! )?;
//!
//! let outcome = orchestrator
//!     .handle_message(IncomingMessage::text("Hello"))
//!     .await?;
//! ```

pub mod agent;
pub mod capability;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod error;
pub mod mapper;
pub mod orchestrate;
pub mod retention;
pub mod telemetry;
pub mod tools;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{AgentError, CheckpointError, ConfigError, ModelError, Result, ToolError};
pub use types::{
    AttributeDescriptor, ContentBlock, IncomingMessage, Message, ModelClient, ModelResponse,
    ResponseEnvelope, ResumePayload, Role, SharedModelClient, StopReason, StreamEvent,
    SuspensionPoint, TokenUsage, ToolCall, ToolDefinition,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
