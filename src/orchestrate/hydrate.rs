// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Conversation hydration: a deterministic, total replay order across every
//! agent's independent checkpoint thread.
//!
//! Each agent persists its own append log, so no global order exists on
//! disk. Hydration merges all threads' projected events and sorts them with
//! a comparator that always yields the same total order for the same event
//! set, regardless of input order. Replaying that order re-derives the call
//! stack and current agent exactly as live routing would have, which is how
//! a restarted process picks a conversation back up.

use std::cmp::Ordering;

use chrono::DateTime;

use super::orchestrator::OrchestrationFrame;
use crate::checkpoint::{
    thread_key, CheckpointError, CheckpointStore, HydrationEvent, HydrationEventKind,
    DESTINATION_AGENT_ATTRIBUTE,
};

/// The reconstructed state of one conversation.
#[derive(Debug)]
pub struct HydratedConversation {
    /// All events in replay order.
    pub events: Vec<HydrationEvent>,
    /// The delegation stack as of the last event.
    pub stack: Vec<OrchestrationFrame>,
    /// The agent that would act next; `None` when the conversation is
    /// complete or never started.
    pub current_agent: Option<String>,
}

/// Collect, order, and replay a session's history across the given agents.
pub async fn hydrate_conversation(
    store: &dyn CheckpointStore,
    session_id: &str,
    agents: &[&str],
) -> Result<HydratedConversation, CheckpointError> {
    let mut events = Vec::new();
    for agent in agents {
        let key = thread_key(session_id, agent);
        events.extend(store.read_hydration_events(&key).await?);
    }
    Ok(replay(order_events(events)))
}

/// Sort events into the canonical replay order.
///
/// Key priority: parsed timestamp ascending (only when both sides parse and
/// differ), checkpoint id, agent name, enumeration sequence. The final
/// tie-break guarantees a total order even with identical timestamps.
pub fn order_events(mut events: Vec<HydrationEvent>) -> Vec<HydrationEvent> {
    events.sort_by(compare_events);
    events
}

fn compare_events(a: &HydrationEvent, b: &HydrationEvent) -> Ordering {
    let parsed_a = DateTime::parse_from_rfc3339(&a.timestamp).ok();
    let parsed_b = DateTime::parse_from_rfc3339(&b.timestamp).ok();
    if let (Some(ta), Some(tb)) = (parsed_a, parsed_b) {
        if ta != tb {
            return ta.cmp(&tb);
        }
    }
    a.checkpoint_id
        .cmp(&b.checkpoint_id)
        .then_with(|| a.agent.cmp(&b.agent))
        .then_with(|| a.sequence.cmp(&b.sequence))
}

/// Walk ordered events re-deriving stack and current agent.
fn replay(events: Vec<HydrationEvent>) -> HydratedConversation {
    let mut stack: Vec<OrchestrationFrame> = Vec::new();
    let mut current: Option<String> = None;

    for event in &events {
        match event.kind {
            HydrationEventKind::UserMessage
            | HydrationEventKind::ToolRequest
            | HydrationEventKind::ToolResponse => {
                current = Some(event.agent.clone());
            }
            HydrationEventKind::AgentHandoff => {
                stack.push(OrchestrationFrame {
                    agent: event.agent.clone(),
                });
                current = event
                    .response_attributes
                    .get(DESTINATION_AGENT_ATTRIBUTE)
                    .cloned();
            }
            HydrationEventKind::FinalResponse => {
                current = stack.pop().map(|frame| frame.agent);
            }
        }
    }

    HydratedConversation {
        events,
        stack,
        current_agent: current,
    }
}
