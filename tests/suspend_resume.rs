// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Suspension and resume contracts on the single-agent state machine:
//! payload shapes, feedback injection, cancellation, and checkpoint
//! durability across machine restarts.

mod common;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Duration;

use troupe::agent::{AgentEvent, FEEDBACK_PREAMBLE};
use troupe::checkpoint::{MemoryCheckpointStore, SharedCheckpointStore};
use troupe::{AgentError, IncomingMessage, ResumePayload, Role, SuspensionPoint};

use common::{make_machine, terminal, weather_call};

const PEERS: &[(&str, &str)] = &[("Assistant", "General assistant")];

#[tokio::test]
async fn continue_resume_executes_tools_and_finishes() {
    let store: SharedCheckpointStore = Arc::new(MemoryCheckpointStore::new());
    let machine = make_machine(
        "Assistant",
        PEERS,
        store,
        "s1",
        vec![weather_call("call-1"), terminal("Sunny.")],
    );
    let mut events = machine.take_event_receiver().unwrap();

    let outcome = machine
        .handle_message(IncomingMessage::text("Weather?"))
        .await
        .unwrap();
    assert!(outcome.is_suspended());

    let outcome = machine.resume(ResumePayload::Continue).await.unwrap();
    assert_eq!(outcome.envelope().unwrap().user_text, "Sunny.");
    drop(machine);

    // The tool result was echoed as an event.
    let mut saw_tool_result = false;
    while let Some(event) = events.recv().await {
        if let AgentEvent::ToolResult { name, content, is_error, .. } = event {
            assert_eq!(name, "getWeather");
            assert_eq!(content, "sunny, 24C");
            assert!(!is_error);
            saw_tool_result = true;
        }
    }
    assert!(saw_tool_result);
}

#[tokio::test]
async fn feedback_resume_skips_tools_and_injects_text() {
    let store: SharedCheckpointStore = Arc::new(MemoryCheckpointStore::new());
    let machine = make_machine(
        "Assistant",
        PEERS,
        store,
        "s1",
        vec![weather_call("call-1"), terminal("Changed course.")],
    );

    machine
        .handle_message(IncomingMessage::text("Weather?"))
        .await
        .unwrap();
    let outcome = machine
        .resume(ResumePayload::Feedback {
            content: "skip the lookup".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(outcome.envelope().unwrap().user_text, "Changed course.");

    let state = machine.state().await.unwrap();
    assert!(!state.messages.iter().any(|m| m.role == Role::ToolResult));
    let feedback = state
        .messages
        .iter()
        .find(|m| m.text().starts_with(FEEDBACK_PREAMBLE))
        .expect("feedback message committed");
    assert!(feedback.text().contains("skip the lookup"));
}

#[tokio::test]
async fn wrong_resume_shape_fails_without_committing() {
    let store: SharedCheckpointStore = Arc::new(MemoryCheckpointStore::new());
    let machine = make_machine(
        "Assistant",
        PEERS,
        store,
        "s1",
        vec![weather_call("call-1")],
    );

    machine
        .handle_message(IncomingMessage::text("Weather?"))
        .await
        .unwrap();
    let before = machine.state().await.unwrap();

    let error = machine
        .resume(ResumePayload::DelegateReply {
            content: IncomingMessage::text("nope"),
        })
        .await
        .unwrap_err();
    assert!(error
        .downcast_ref::<AgentError>()
        .is_some_and(|e| matches!(e, AgentError::ResumeShapeMismatch { .. })));

    let after = machine.state().await.unwrap();
    assert_eq!(before.messages.len(), after.messages.len());
    assert!(matches!(
        after.suspension,
        SuspensionPoint::AwaitingToolApproval { .. }
    ));
}

#[tokio::test]
async fn suspension_survives_machine_restart() {
    let store: SharedCheckpointStore = Arc::new(MemoryCheckpointStore::new());
    let machine = make_machine(
        "Assistant",
        PEERS,
        store.clone(),
        "s1",
        vec![weather_call("call-1")],
    );
    machine
        .handle_message(IncomingMessage::text("Weather?"))
        .await
        .unwrap();
    drop(machine);

    // A fresh machine over the same store resumes the pending approval.
    let machine = make_machine("Assistant", PEERS, store, "s1", vec![terminal("Sunny.")]);
    let state = machine.state().await.unwrap();
    assert!(state.is_suspended());

    let outcome = machine.resume(ResumePayload::Continue).await.unwrap();
    assert_eq!(outcome.envelope().unwrap().user_text, "Sunny.");
}

#[tokio::test]
async fn cancellation_leaves_last_committed_checkpoint() {
    struct SlowModel;

    #[async_trait::async_trait]
    impl troupe::ModelClient for SlowModel {
        async fn invoke(
            &self,
            _messages: &[troupe::Message],
            _tools: Option<&[troupe::ToolDefinition]>,
            _system_prompt: Option<&str>,
        ) -> Result<troupe::ModelResponse, troupe::ModelError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(troupe::ModelResponse::empty())
        }

        async fn stream_invoke(
            &self,
            messages: &[troupe::Message],
            tools: Option<&[troupe::ToolDefinition]>,
            system_prompt: Option<&str>,
            _on_event: Box<dyn Fn(troupe::StreamEvent) + Send + Sync>,
        ) -> Result<troupe::ModelResponse, troupe::ModelError> {
            self.invoke(messages, tools, system_prompt).await
        }

        fn supports_tool_use(&self) -> bool {
            false
        }

        fn name(&self) -> &str {
            "slow"
        }

        fn model(&self) -> &str {
            "slow-1"
        }
    }

    let store: SharedCheckpointStore = Arc::new(MemoryCheckpointStore::new());
    let machine = Arc::new(troupe::agent::AgentStateMachine::new(
        troupe::agent::AgentOptions {
            config: troupe::agent::AgentConfig::new("Assistant", "test", "none"),
            model: Arc::new(SlowModel),
            tools: Arc::new(troupe::tools::ToolRegistry::new()),
            capabilities: vec![],
            store: store.clone(),
            session_id: "s1".to_string(),
        },
    ));

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = tx.send(true);
    });

    let error = machine
        .handle_message_with_cancel(IncomingMessage::text("hi"), rx)
        .await
        .unwrap_err();
    assert!(error
        .downcast_ref::<AgentError>()
        .is_some_and(|e| matches!(e, AgentError::Cancelled)));

    // Only the user message commit landed; no suspension, safely retryable.
    let state = machine.state().await.unwrap();
    assert_eq!(state.messages.len(), 1);
    assert_eq!(state.messages[0].role, Role::User);
    assert!(!state.is_suspended());
}

#[tokio::test]
async fn new_message_while_suspended_is_rejected() {
    let store: SharedCheckpointStore = Arc::new(MemoryCheckpointStore::new());
    let machine = make_machine(
        "Assistant",
        PEERS,
        store,
        "s1",
        vec![weather_call("call-1")],
    );

    machine
        .handle_message(IncomingMessage::text("Weather?"))
        .await
        .unwrap();
    let error = machine
        .handle_message(IncomingMessage::text("Something else"))
        .await
        .unwrap_err();
    assert!(error
        .downcast_ref::<AgentError>()
        .is_some_and(|e| matches!(e, AgentError::InvalidState(_))));
}
