// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Suspend/resume persistence for agent conversations.
//!
//! Each (session, agent) pair owns one thread of checkpoints, keyed by
//! `"{sessionId}#{agentName}"`. A checkpoint is an append-log delta: messages
//! appended, messages re-issued under the same id, ids tombstoned, plus the
//! suspension point and extracted response attributes at that moment. The
//! current [`ThreadState`] is the left fold of the log.
//!
//! The log is also the replay source: [`derive_hydration_events`] projects a
//! thread into ordered, read-only [`HydrationEvent`]s for cross-agent
//! conversation reconstruction.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryCheckpointStore;
pub use sqlite::SqliteCheckpointStore;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use crate::error::CheckpointError;

use crate::types::{Message, Role, SuspensionPoint, FORWARDED_MESSAGE_PREFIX};

/// Separator between session id and agent name in a thread key.
pub const THREAD_KEY_SEPARATOR: char = '#';

/// Build the storage key for one agent's conversation thread.
pub fn thread_key(session_id: &str, agent_name: &str) -> String {
    format!("{session_id}{THREAD_KEY_SEPARATOR}{agent_name}")
}

/// Split a thread key back into (session id, agent name).
pub fn split_thread_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(THREAD_KEY_SEPARATOR)
}

// ============================================================================
// Checkpoint Records
// ============================================================================

/// One append-log entry against a conversation thread.
///
/// Every field is optional-in-effect: an empty delta is legal but pointless.
/// `suspension: Some(SuspensionPoint::None)` records that a suspension was
/// resolved; `suspension: None` leaves the previous point untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointDelta {
    /// Messages appended to the history.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub appended: Vec<Message>,
    /// Messages re-issued under an existing id (retention pruning).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replaced: Vec<Message>,
    /// Ids of messages tombstoned from the history.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_ids: Vec<String>,
    /// New suspension point, if this delta changes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspension: Option<SuspensionPoint>,
    /// Response attributes extracted during this turn.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

impl CheckpointDelta {
    /// Delta appending a single message.
    pub fn append(message: Message) -> Self {
        Self {
            appended: vec![message],
            ..Self::default()
        }
    }

    /// Delta appending several messages.
    pub fn append_all(messages: Vec<Message>) -> Self {
        Self {
            appended: messages,
            ..Self::default()
        }
    }

    /// Delta recording only a suspension change.
    pub fn suspend(point: SuspensionPoint) -> Self {
        Self {
            suspension: Some(point),
            ..Self::default()
        }
    }

    pub fn with_suspension(mut self, point: SuspensionPoint) -> Self {
        self.suspension = Some(point);
        self
    }

    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_replaced(mut self, replaced: Vec<Message>) -> Self {
        self.replaced = replaced;
        self
    }

    pub fn with_removed_ids(mut self, removed_ids: Vec<String>) -> Self {
        self.removed_ids = removed_ids;
        self
    }

    /// Whether this delta changes nothing.
    pub fn is_empty(&self) -> bool {
        self.appended.is_empty()
            && self.replaced.is_empty()
            && self.removed_ids.is_empty()
            && self.suspension.is_none()
            && self.attributes.is_empty()
    }
}

/// A committed delta with store-assigned identity and position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Store-assigned checkpoint id.
    pub id: String,
    /// Monotonic position within the thread, from 0.
    pub sequence: u64,
    /// RFC 3339 write timestamp.
    pub created_at: String,
    pub delta: CheckpointDelta,
}

impl CheckpointRecord {
    /// Stamp a delta with a fresh id and the current time.
    pub fn new(sequence: u64, delta: CheckpointDelta) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sequence,
            created_at: chrono::Utc::now().to_rfc3339(),
            delta,
        }
    }
}

// ============================================================================
// Thread State
// ============================================================================

/// The materialized state of one conversation thread.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadState {
    /// Full message history after replacements and tombstones.
    pub messages: Vec<Message>,
    /// The active suspension point, if any.
    #[serde(default)]
    pub suspension: SuspensionPoint,
    /// Last-written value per response attribute.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// Id of the newest checkpoint folded in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checkpoint_id: Option<String>,
}

impl ThreadState {
    /// Fold an ascending record sequence into the current state.
    pub fn from_records(records: &[CheckpointRecord]) -> Self {
        let mut state = Self::default();
        for record in records {
            state.apply(record);
        }
        state
    }

    fn apply(&mut self, record: &CheckpointRecord) {
        let delta = &record.delta;

        self.messages.extend(delta.appended.iter().cloned());

        for replacement in &delta.replaced {
            if let Some(slot) = self.messages.iter_mut().find(|m| m.id == replacement.id) {
                *slot = replacement.clone();
            }
        }

        if !delta.removed_ids.is_empty() {
            self.messages.retain(|m| !delta.removed_ids.contains(&m.id));
        }

        if let Some(point) = &delta.suspension {
            self.suspension = point.clone();
        }

        self.attributes
            .extend(delta.attributes.iter().map(|(k, v)| (k.clone(), v.clone())));

        self.last_checkpoint_id = Some(record.id.clone());
    }

    /// Whether the thread is parked at a suspension point.
    pub fn is_suspended(&self) -> bool {
        self.suspension.is_suspended()
    }
}

/// One row of a store listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread_key: String,
    /// Number of checkpoints committed against the thread.
    pub checkpoints: u64,
    /// RFC 3339 timestamp of the newest checkpoint.
    pub last_write: String,
}

impl ThreadSummary {
    pub fn session_id(&self) -> Option<&str> {
        split_thread_key(&self.thread_key).map(|(session, _)| session)
    }

    pub fn agent_name(&self) -> Option<&str> {
        split_thread_key(&self.thread_key).map(|(_, agent)| agent)
    }
}

// ============================================================================
// Hydration Events
// ============================================================================

/// Response attribute that names a delegation destination.
pub const DESTINATION_AGENT_ATTRIBUTE: &str = "destinationAgent";

/// What a hydration event represents in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HydrationEventKind {
    UserMessage,
    ToolRequest,
    ToolResponse,
    AgentHandoff,
    FinalResponse,
}

/// A read-only projection of one conversation step, used for replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HydrationEvent {
    pub kind: HydrationEventKind,
    /// The step's text content (message text or forwarded delegation text).
    pub text: String,
    /// Write timestamp as recorded; parsed leniently during ordering.
    pub timestamp: String,
    pub checkpoint_id: String,
    /// Agent whose thread produced the event.
    pub agent: String,
    /// Enumeration position within the thread.
    pub sequence: u64,
    /// Response attributes in effect at the checkpoint.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub response_attributes: HashMap<String, String>,
}

/// Project a thread's record log into hydration events.
///
/// Appended messages are enumerated ascending with seen-id dedup (a message
/// re-issued by pruning does not repeat). Hidden notes and forwarded peer
/// messages never become user-message events. A delegate-reply suspension
/// becomes an agent-handoff event, absorbing the terminal response it
/// forwarded.
pub fn derive_hydration_events(agent: &str, records: &[CheckpointRecord]) -> Vec<HydrationEvent> {
    let mut events: Vec<HydrationEvent> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut sequence: u64 = 0;

    for record in records {
        for message in &record.delta.appended {
            if !seen.insert(message.id.clone()) {
                continue;
            }

            let kind = match message.role {
                Role::User => {
                    if message.is_hidden() || message.text().starts_with(FORWARDED_MESSAGE_PREFIX)
                    {
                        continue;
                    }
                    HydrationEventKind::UserMessage
                }
                Role::Assistant if message.has_tool_calls() => HydrationEventKind::ToolRequest,
                Role::Assistant => HydrationEventKind::FinalResponse,
                Role::ToolResult => HydrationEventKind::ToolResponse,
            };

            events.push(HydrationEvent {
                kind,
                text: message.text(),
                timestamp: record.created_at.clone(),
                checkpoint_id: record.id.clone(),
                agent: agent.to_string(),
                sequence,
                response_attributes: record.delta.attributes.clone(),
            });
            sequence += 1;
        }

        if let Some(SuspensionPoint::AwaitingDelegateReply {
            delegate,
            forwarded_text,
        }) = &record.delta.suspension
        {
            // The handoff subsumes the terminal response it forwards. The
            // stored message is raw model output; compare its user-visible
            // projection.
            let mut attributes = match events.last() {
                Some(prev)
                    if prev.kind == HydrationEventKind::FinalResponse
                        && crate::mapper::user_visible_text(&prev.text) == *forwarded_text =>
                {
                    let absorbed = events.pop().map(|e| e.response_attributes);
                    absorbed.unwrap_or_default()
                }
                _ => record.delta.attributes.clone(),
            };
            attributes.insert(DESTINATION_AGENT_ATTRIBUTE.to_string(), delegate.clone());

            events.push(HydrationEvent {
                kind: HydrationEventKind::AgentHandoff,
                text: forwarded_text.clone(),
                timestamp: record.created_at.clone(),
                checkpoint_id: record.id.clone(),
                agent: agent.to_string(),
                sequence,
                response_attributes: attributes,
            });
            sequence += 1;
        }
    }

    events
}

// ============================================================================
// Store Trait
// ============================================================================

/// Storage backend for conversation checkpoints.
///
/// Backends persist the append log verbatim; folding and projection live in
/// this module so every backend reconstructs identically.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Materialize a thread's current state, or `None` for an unknown key.
    async fn get(&self, thread_key: &str) -> Result<Option<ThreadState>, CheckpointError>;

    /// Commit a delta, assigning checkpoint id and sequence.
    async fn put(
        &self,
        thread_key: &str,
        delta: CheckpointDelta,
    ) -> Result<CheckpointRecord, CheckpointError>;

    /// Drop a thread and all its checkpoints. Returns whether it existed.
    async fn delete_thread(&self, thread_key: &str) -> Result<bool, CheckpointError>;

    /// List threads, optionally restricted to one session id.
    async fn list(&self, session_id: Option<&str>) -> Result<Vec<ThreadSummary>, CheckpointError>;

    /// Project a thread into ordered hydration events.
    async fn read_hydration_events(
        &self,
        thread_key: &str,
    ) -> Result<Vec<HydrationEvent>, CheckpointError>;
}

/// Arc-wrapped store for shared ownership across agents.
pub type SharedCheckpointStore = Arc<dyn CheckpointStore>;
