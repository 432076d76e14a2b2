// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end routing through the conversation orchestrator: plain
//! completion, tool approval, delegation push/pop, and refused
//! destinations.

mod common;

use std::sync::Arc;

use troupe::checkpoint::{MemoryCheckpointStore, SharedCheckpointStore};
use troupe::orchestrate::{
    AgentRegistry, ApprovalPolicy, ConversationOrchestrator, ConversationOutcome,
};
use troupe::{IncomingMessage, ResumePayload, Role};

use common::{delegation, make_machine, terminal, weather_call};

const PEERS: &[(&str, &str)] = &[
    ("Assistant", "General assistant"),
    ("Researcher1", "Research helper"),
];

fn build(
    store: SharedCheckpointStore,
    agents: Vec<Arc<troupe::agent::AgentStateMachine>>,
    policy: ApprovalPolicy,
) -> ConversationOrchestrator {
    let mut builder = AgentRegistry::builder();
    for agent in agents {
        builder.register(agent);
    }
    ConversationOrchestrator::new(Arc::new(builder.build()), store, "s1", policy).unwrap()
}

#[tokio::test]
async fn plain_response_returns_text_with_empty_stack() {
    let store: SharedCheckpointStore = Arc::new(MemoryCheckpointStore::new());
    let assistant = make_machine("Assistant", PEERS, store.clone(), "s1", vec![terminal("Hi!")]);
    let mut orchestrator = build(store, vec![assistant], ApprovalPolicy::manual());

    let outcome = orchestrator
        .handle_message(IncomingMessage::text("Hello"))
        .await
        .unwrap();

    match outcome {
        ConversationOutcome::Complete { agent, text } => {
            assert_eq!(agent, "Assistant");
            assert_eq!(text, "Hi!");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(orchestrator.delegation_depth(), 0);
}

#[tokio::test]
async fn tool_request_surfaces_and_continue_runs_to_terminal() {
    let store: SharedCheckpointStore = Arc::new(MemoryCheckpointStore::new());
    let assistant = make_machine(
        "Assistant",
        PEERS,
        store.clone(),
        "s1",
        vec![weather_call("call-1"), terminal("Sunny in Lima.")],
    );
    let mut orchestrator = build(store, vec![assistant], ApprovalPolicy::manual());

    let outcome = orchestrator
        .handle_message(IncomingMessage::text("Weather in Lima?"))
        .await
        .unwrap();
    match &outcome {
        ConversationOutcome::AwaitingApproval { agent, calls } => {
            assert_eq!(agent, "Assistant");
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].name, "getWeather");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let outcome = orchestrator.resume(ResumePayload::Continue).await.unwrap();
    match outcome {
        ConversationOutcome::Complete { text, .. } => assert_eq!(text, "Sunny in Lima."),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn delegation_pushes_forwards_and_pops_back() {
    let store: SharedCheckpointStore = Arc::new(MemoryCheckpointStore::new());
    let assistant = make_machine(
        "Assistant",
        PEERS,
        store.clone(),
        "s1",
        vec![
            delegation("Researcher1", "Find the population of Lima."),
            terminal("Lima has about 10 million people."),
        ],
    );
    let researcher = make_machine(
        "Researcher1",
        PEERS,
        store.clone(),
        "s1",
        vec![terminal("Around 10 million.")],
    );
    let mut orchestrator = build(
        store,
        vec![assistant.clone(), researcher.clone()],
        ApprovalPolicy::manual(),
    );

    let outcome = orchestrator
        .handle_message(IncomingMessage::text("How big is Lima?"))
        .await
        .unwrap();

    match outcome {
        ConversationOutcome::Complete { agent, text } => {
            assert_eq!(agent, "Assistant");
            assert_eq!(text, "Lima has about 10 million people.");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(orchestrator.delegation_depth(), 0);
    assert_eq!(orchestrator.current_agent(), "Assistant");

    // The researcher's first message carries the sender prefix.
    let state = researcher.state().await.unwrap();
    assert!(state.messages[0]
        .text()
        .starts_with("This message is from Assistant:\n"));

    // The assistant got the reply back with the researcher's prefix.
    let state = assistant.state().await.unwrap();
    assert!(state
        .messages
        .iter()
        .any(|m| m.text().starts_with("This message is from Researcher1:\n")));
}

#[tokio::test]
async fn unknown_destination_refused_and_stack_untouched() {
    let store: SharedCheckpointStore = Arc::new(MemoryCheckpointStore::new());
    let assistant = make_machine(
        "Assistant",
        PEERS,
        store.clone(),
        "s1",
        vec![
            delegation("Ghost", "Please take over."),
            terminal("I will handle it myself."),
        ],
    );
    let assistant_ref = assistant.clone();
    let mut orchestrator = build(store, vec![assistant], ApprovalPolicy::manual());

    let outcome = orchestrator
        .handle_message(IncomingMessage::text("Go"))
        .await
        .unwrap();

    match outcome {
        ConversationOutcome::Complete { agent, text } => {
            assert_eq!(agent, "Assistant");
            assert_eq!(text, "I will handle it myself.");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(orchestrator.delegation_depth(), 0);
    assert_eq!(orchestrator.current_agent(), "Assistant");

    let state = assistant_ref.state().await.unwrap();
    assert!(state
        .messages
        .iter()
        .any(|m| m.role == Role::User && m.text() == "Agent Ghost does not exist."));
}

#[tokio::test]
async fn whitelist_violation_refused_like_unknown_agent() {
    let store: SharedCheckpointStore = Arc::new(MemoryCheckpointStore::new());
    let assistant = make_machine(
        "Assistant",
        PEERS,
        store.clone(),
        "s1",
        vec![
            delegation("Researcher1", "Look this up."),
            terminal("Doing it alone."),
        ],
    );
    let assistant_ref = assistant.clone();
    let researcher = make_machine("Researcher1", PEERS, store.clone(), "s1", vec![]);

    let mut builder = AgentRegistry::builder();
    builder.register_with_whitelist(assistant, vec![]);
    builder.register(researcher.clone());
    let mut orchestrator = ConversationOrchestrator::new(
        Arc::new(builder.build()),
        store,
        "s1",
        ApprovalPolicy::manual(),
    )
    .unwrap();

    let outcome = orchestrator
        .handle_message(IncomingMessage::text("Go"))
        .await
        .unwrap();
    assert!(outcome.is_complete());

    // Refusal text names the agent; the researcher never ran.
    let state = assistant_ref.state().await.unwrap();
    assert!(state
        .messages
        .iter()
        .any(|m| m.text() == "Agent Researcher1 does not exist."));
    assert!(researcher.state().await.unwrap().messages.is_empty());
}

#[tokio::test]
async fn continuous_mode_runs_tool_batches_to_terminal() {
    let store: SharedCheckpointStore = Arc::new(MemoryCheckpointStore::new());
    let assistant = make_machine(
        "Assistant",
        PEERS,
        store.clone(),
        "s1",
        vec![
            weather_call("call-1"),
            weather_call("call-2"),
            terminal("Two lookups done."),
        ],
    );
    let mut orchestrator = build(store, vec![assistant], ApprovalPolicy::continuous(&[]));

    let outcome = orchestrator
        .handle_message(IncomingMessage::text("Compare the weather twice"))
        .await
        .unwrap();
    match outcome {
        ConversationOutcome::Complete { text, .. } => assert_eq!(text, "Two lookups done."),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn continuous_mode_deny_pattern_still_waits_for_human() {
    let store: SharedCheckpointStore = Arc::new(MemoryCheckpointStore::new());
    let assistant = make_machine(
        "Assistant",
        PEERS,
        store.clone(),
        "s1",
        vec![weather_call("call-1")],
    );
    let mut orchestrator = build(
        store,
        vec![assistant],
        ApprovalPolicy::continuous(&["getWeather".to_string()]),
    );

    let outcome = orchestrator
        .handle_message(IncomingMessage::text("Weather?"))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ConversationOutcome::AwaitingApproval { .. }
    ));
}

#[tokio::test]
async fn nested_delegation_unwinds_in_order() {
    let peers: &[(&str, &str)] = &[
        ("Assistant", "General assistant"),
        ("Researcher1", "Research helper"),
        ("Researcher2", "Second researcher"),
    ];
    let store: SharedCheckpointStore = Arc::new(MemoryCheckpointStore::new());
    let assistant = make_machine(
        "Assistant",
        peers,
        store.clone(),
        "s1",
        vec![
            delegation("Researcher1", "Start the chain."),
            terminal("Chain finished."),
        ],
    );
    let researcher1 = make_machine(
        "Researcher1",
        peers,
        store.clone(),
        "s1",
        vec![
            delegation("Researcher2", "Go one deeper."),
            terminal("Relaying the answer up."),
        ],
    );
    let researcher2 = make_machine(
        "Researcher2",
        peers,
        store.clone(),
        "s1",
        vec![terminal("Bottom of the chain.")],
    );
    let mut orchestrator = build(
        store,
        vec![assistant, researcher1, researcher2],
        ApprovalPolicy::manual(),
    );

    let outcome = orchestrator
        .handle_message(IncomingMessage::text("Go"))
        .await
        .unwrap();
    match outcome {
        ConversationOutcome::Complete { agent, text } => {
            assert_eq!(agent, "Assistant");
            assert_eq!(text, "Chain finished.");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(orchestrator.delegation_depth(), 0);
    assert_eq!(orchestrator.current_agent(), "Assistant");
}
