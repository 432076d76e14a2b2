// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Multi-agent orchestration.
//!
//! One conversation is driven by one [`ConversationOrchestrator`]: it holds
//! the current-agent pointer and a call stack of delegating agents, drives
//! the current agent's state machine, and routes terminal responses between
//! agents.
//!
//! # Architecture
//!
//! - **AgentRegistry**: read-only set of agents, built once and shared
//!   across sessions; registration order is the reset order and the first
//!   agent is the conversation entry point.
//!
//! - **ConversationOrchestrator**: per-session routing. A terminal response
//!   naming a destination pushes the sender and switches agents; one with
//!   no destination pops the stack, resuming the caller with a delegate
//!   reply or completing the conversation.
//!
//! - **ApprovalPolicy**: manual mode surfaces every tool batch to the
//!   caller; continuous mode auto-approves after emitting the approval
//!   event, except for calls matching a deny pattern.
//!
//! - **hydrate**: deterministic replay ordering across all agents'
//!   checkpoint threads, re-deriving stack and current agent after a
//!   restart.
//!
//! # Usage
//!
//! ```rust,ignore
//! use troupe::orchestrate::{AgentRegistry, ApprovalPolicy, ConversationOrchestrator};
//!
//! let mut builder = AgentRegistry::builder();
//! builder.register(assistant);
//! builder.register_with_whitelist(researcher, vec![]);
//!
//! let mut orchestrator = ConversationOrchestrator::new(
//!     Arc::new(builder.build()),
//!     store,
//!     "session-1",
//!     ApprovalPolicy::manual(),
//! )?;
//!
//! match orchestrator.handle_message(IncomingMessage::text("Hello")).await? {
//!     ConversationOutcome::Complete { text, .. } => println!("{text}"),
//!     ConversationOutcome::AwaitingApproval { calls, .. } => { /* ask the human */ }
//! }
//! ```

pub mod hydrate;
pub mod orchestrator;
pub mod registry;

pub use hydrate::{hydrate_conversation, order_events, HydratedConversation};
pub use orchestrator::{
    unknown_agent_text, ApprovalPolicy, ConversationOrchestrator, ConversationOutcome,
    OrchestrationFrame, DELEGATION_LIMIT_TEXT,
};
pub use registry::{AgentRegistry, AgentRegistryBuilder};
