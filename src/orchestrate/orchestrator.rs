// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Call-stack orchestrator for one conversation.
//!
//! The orchestrator owns the current-agent pointer and a call stack of
//! delegating agents. It drives the current agent's state machine and
//! routes every terminal response:
//!
//! - A response naming a destination agent (other than the caller on top
//!   of the stack) pushes the sender and switches to the destination.
//! - A response with no destination pops the stack; an empty stack means
//!   the conversation turn is complete.
//!
//! Routing failures never abort the conversation. An unknown destination,
//! a destination outside the sender's whitelist, or a push past the
//! delegation depth limit all fold back into the sender's conversation as
//! synthesized text, and the sender stays current.

use std::sync::Arc;

use regex::Regex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::registry::AgentRegistry;
use crate::agent::{AgentConfig, AgentEvent, AgentOptions, AgentStateMachine, TurnOutcome};
use crate::capability::{
    InMemoryWorkspace, PeerDirectory, PeerInfo, SharedCapability, WorkspaceCapability,
};
use crate::checkpoint::{SharedCheckpointStore, DESTINATION_AGENT_ATTRIBUTE};
use crate::config::{AgentDefinition, WorkflowConfig};
use crate::error::{AgentError, Result};
use crate::tools::ToolRegistry;
use crate::types::{
    IncomingMessage, ResponseEnvelope, ResumePayload, SharedModelClient, SuspensionPoint,
    ToolCall, FORWARDED_MESSAGE_PREFIX,
};

/// Synthesized reply when a named destination cannot be addressed.
pub fn unknown_agent_text(name: &str) -> String {
    format!("Agent {name} does not exist.")
}

/// Synthesized reply when a push would exceed the delegation depth limit.
pub const DELEGATION_LIMIT_TEXT: &str =
    "Delegation limit reached, handle the task yourself.";

const DEFAULT_MAX_DELEGATION_DEPTH: usize = 8;

/// One entry in the delegation call stack: the agent that handed off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestrationFrame {
    pub agent: String,
}

/// How continuous mode decides whether a tool batch still needs a human.
pub struct ApprovalPolicy {
    continuous: bool,
    deny_patterns: Vec<Regex>,
}

impl ApprovalPolicy {
    /// Every tool batch waits for a human decision.
    pub fn manual() -> Self {
        Self {
            continuous: false,
            deny_patterns: Vec::new(),
        }
    }

    /// Auto-approve batches, except calls matching a deny pattern.
    /// Invalid patterns are logged and skipped.
    pub fn continuous(deny_patterns: &[String]) -> Self {
        let deny_patterns = deny_patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(error) => {
                    warn!(%pattern, %error, "invalid deny pattern, skipping");
                    None
                }
            })
            .collect();
        Self {
            continuous: true,
            deny_patterns,
        }
    }

    pub fn is_continuous(&self) -> bool {
        self.continuous
    }

    /// Whether this batch must surface for manual approval.
    pub fn requires_manual(&self, calls: &[ToolCall]) -> bool {
        if !self.continuous {
            return true;
        }
        calls.iter().any(|call| {
            let subject = format!("{} {}", call.name, call.input);
            self.deny_patterns
                .iter()
                .any(|pattern| pattern.is_match(&subject))
        })
    }
}

/// The terminal result of driving one conversation turn.
#[derive(Debug)]
pub enum ConversationOutcome {
    /// The stack unwound to empty; the final text goes to the outer caller.
    Complete { agent: String, text: String },
    /// The current agent is waiting for a human tool-approval decision.
    AwaitingApproval { agent: String, calls: Vec<ToolCall> },
}

impl ConversationOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }
}

/// Drives the agents of one session. One instance per conversation; the
/// registry may be shared read-only across sessions.
pub struct ConversationOrchestrator {
    registry: Arc<AgentRegistry>,
    store: SharedCheckpointStore,
    session_id: String,
    policy: ApprovalPolicy,
    max_delegation_depth: usize,
    stack: Vec<OrchestrationFrame>,
    current: String,
    events: mpsc::UnboundedSender<AgentEvent>,
    event_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<AgentEvent>>>,
}

impl std::fmt::Debug for ConversationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationOrchestrator")
            .field("session_id", &self.session_id)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl ConversationOrchestrator {
    /// Construct with the first registered agent as the entry point.
    ///
    /// Takes each machine's event receiver and forwards everything onto
    /// one merged channel; closing happens when the orchestrator drops.
    pub fn new(
        registry: Arc<AgentRegistry>,
        store: SharedCheckpointStore,
        session_id: impl Into<String>,
        policy: ApprovalPolicy,
    ) -> Result<Self> {
        let current = registry
            .first()
            .map(|machine| machine.name().to_string())
            .ok_or_else(|| AgentError::InvalidState("registry holds no agents".to_string()))?;

        let (events, event_rx) = mpsc::unbounded_channel();
        for machine in registry.machines() {
            match machine.take_event_receiver() {
                Some(mut receiver) => {
                    let forward = events.clone();
                    tokio::spawn(async move {
                        while let Some(event) = receiver.recv().await {
                            if forward.send(event).is_err() {
                                break;
                            }
                        }
                    });
                }
                None => warn!(
                    agent = machine.name(),
                    "event receiver already taken, events will not be forwarded"
                ),
            }
        }

        Ok(Self {
            registry,
            store,
            session_id: session_id.into(),
            policy,
            max_delegation_depth: DEFAULT_MAX_DELEGATION_DEPTH,
            stack: Vec::new(),
            current,
            events,
            event_rx: std::sync::Mutex::new(Some(event_rx)),
        })
    }

    /// Build the registry and orchestrator straight from a workflow config.
    ///
    /// Each agent definition becomes a state machine with the capabilities
    /// its toggles name; `model_for` supplies the model client per agent.
    /// Fails when the config declares no agents.
    pub fn from_config(
        config: &WorkflowConfig,
        store: SharedCheckpointStore,
        tools: Arc<ToolRegistry>,
        model_for: &dyn Fn(&AgentDefinition) -> SharedModelClient,
    ) -> Result<Self> {
        let roster: Vec<PeerInfo> = config
            .agents
            .iter()
            .map(|agent| PeerInfo::new(&agent.name, &agent.description))
            .collect();

        let mut builder = AgentRegistry::builder();
        for definition in &config.agents {
            let mut capabilities: Vec<SharedCapability> = Vec::new();
            if definition.capabilities.helpers {
                let mut directory = PeerDirectory::new(&definition.name, roster.clone());
                if let Some(whitelist) = &definition.whitelist {
                    directory = directory.with_whitelist(whitelist.clone());
                }
                capabilities.push(Arc::new(directory));
            }
            if definition.capabilities.workspace {
                capabilities.push(Arc::new(WorkspaceCapability::new(Arc::new(
                    InMemoryWorkspace::new(),
                ))));
            }

            let machine = Arc::new(AgentStateMachine::new(AgentOptions {
                config: AgentConfig::new(
                    &definition.name,
                    &definition.description,
                    &definition.constitution,
                ),
                model: model_for(definition),
                tools: tools.clone(),
                capabilities,
                store: store.clone(),
                session_id: config.session_id.clone(),
            }));
            match &definition.whitelist {
                Some(whitelist) => builder.register_with_whitelist(machine, whitelist.clone()),
                None => builder.register(machine),
            };
        }

        let policy = if config.approval.continuous {
            ApprovalPolicy::continuous(&config.approval.deny_patterns)
        } else {
            ApprovalPolicy::manual()
        };

        Ok(Self::new(
            Arc::new(builder.build()),
            store,
            config.session_id.clone(),
            policy,
        )?
        .with_max_delegation_depth(config.max_delegation_depth))
    }

    pub fn with_max_delegation_depth(mut self, depth: usize) -> Self {
        self.max_delegation_depth = depth;
        self
    }

    pub fn current_agent(&self) -> &str {
        &self.current
    }

    pub fn delegation_depth(&self) -> usize {
        self.stack.len()
    }

    /// Take the merged progress-event receiver. Can only be taken once.
    pub fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<AgentEvent>> {
        self.event_rx.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Run every agent's capability init hooks.
    pub async fn init(&self) -> Result<()> {
        for machine in self.registry.machines() {
            machine.init().await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Driving
    // ------------------------------------------------------------------

    /// Drive a user message through the current agent and route until the
    /// conversation completes or waits for approval.
    pub async fn handle_message(&mut self, incoming: IncomingMessage) -> Result<ConversationOutcome> {
        let machine = self.current_machine()?;
        let outcome = machine.handle_message(incoming).await?;
        self.route(outcome).await
    }

    /// Dispatch a capability command on the current agent. Commands that
    /// yield content feed it into the conversation like a user message;
    /// others return `None`.
    pub async fn handle_command(&mut self, command: &str) -> Result<Option<ConversationOutcome>> {
        let machine = self.current_machine()?;
        match machine.run_command(command).await? {
            Some(incoming) => Ok(Some(self.handle_message(incoming).await?)),
            None => Ok(None),
        }
    }

    /// Resume the current agent's suspension and route the result.
    pub async fn resume(&mut self, payload: ResumePayload) -> Result<ConversationOutcome> {
        let machine = self.current_machine()?;
        let outcome = machine.resume(payload).await?;
        self.route(outcome).await
    }

    /// Reset every registered agent in registration order. Not atomic:
    /// a failure is recorded and later agents still reset.
    pub async fn reset(&mut self) -> Result<()> {
        let mut failed = Vec::new();
        for machine in self.registry.machines() {
            if let Err(error) = machine.reset().await {
                warn!(agent = machine.name(), %error, "agent reset failed");
                failed.push(format!("{}: {error}", machine.name()));
            }
        }
        self.stack.clear();
        if let Some(first) = self.registry.first() {
            self.current = first.name().to_string();
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(AgentError::InvalidState(format!(
                "reset incomplete for {}",
                failed.join("; ")
            ))
            .into())
        }
    }

    /// Rebuild stack and current agent from checkpoint history.
    pub async fn restore(&mut self) -> Result<()> {
        let hydrated = self.hydrate_conversation().await?;
        self.stack = hydrated.stack;
        if let Some(agent) = hydrated.current_agent {
            self.current = agent;
        }
        Ok(())
    }

    /// The globally ordered replay of this session's history.
    pub async fn hydrate_conversation(&self) -> Result<super::HydratedConversation> {
        super::hydrate::hydrate_conversation(
            self.store.as_ref(),
            &self.session_id,
            &self.registry.names(),
        )
        .await
        .map_err(|error| AgentError::from(error).into())
    }

    // ------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------

    async fn route(&mut self, mut outcome: TurnOutcome) -> Result<ConversationOutcome> {
        loop {
            match outcome {
                TurnOutcome::Suspended(SuspensionPoint::AwaitingToolApproval {
                    pending_calls,
                }) => {
                    if !self.policy.requires_manual(&pending_calls) {
                        debug!(
                            agent = %self.current,
                            calls = pending_calls.len(),
                            "continuous mode, auto-approving tool batch"
                        );
                        let machine = self.current_machine()?;
                        outcome = machine.resume(ResumePayload::Continue).await?;
                        continue;
                    }
                    return Ok(ConversationOutcome::AwaitingApproval {
                        agent: self.current.clone(),
                        calls: pending_calls,
                    });
                }
                TurnOutcome::Suspended(point) => {
                    return Err(AgentError::InvalidState(format!(
                        "{} suspended at an unroutable point ({})",
                        self.current,
                        point.expected_resume()
                    ))
                    .into());
                }
                TurnOutcome::Completed(envelope) => {
                    outcome = match self.route_terminal(envelope).await? {
                        Routed::Next(next) => next,
                        Routed::Done(done) => return Ok(done),
                    };
                }
            }
        }
    }

    async fn route_terminal(&mut self, envelope: ResponseEnvelope) -> Result<Routed> {
        let sender = self.current.clone();
        let text = envelope.user_text.clone();
        let destination = envelope
            .attribute(DESTINATION_AGENT_ATTRIBUTE)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        let stack_top = self.stack.last().map(|frame| frame.agent.clone());

        match destination {
            Some(destination) if Some(&destination) != stack_top.as_ref() => {
                if !self.registry.allows(&sender, &destination) {
                    debug!(%sender, %destination, "destination refused");
                    let machine = self.current_machine()?;
                    let outcome = machine
                        .handle_message(IncomingMessage::text(unknown_agent_text(&destination)))
                        .await?;
                    return Ok(Routed::Next(outcome));
                }
                if self.stack.len() >= self.max_delegation_depth {
                    debug!(%sender, depth = self.stack.len(), "delegation depth exceeded");
                    let machine = self.current_machine()?;
                    let outcome = machine
                        .handle_message(IncomingMessage::text(DELEGATION_LIMIT_TEXT))
                        .await?;
                    return Ok(Routed::Next(outcome));
                }

                let sender_machine = self.current_machine()?;
                sender_machine.suspend_for_delegate(&destination, &text).await?;
                self.stack.push(OrchestrationFrame {
                    agent: sender.clone(),
                });
                self.current = destination.clone();
                debug!(%sender, %destination, depth = self.stack.len(), "delegating");

                let machine = self.current_machine()?;
                let outcome = machine
                    .handle_message(IncomingMessage::text(forward_text(&sender, &text)))
                    .await?;
                Ok(Routed::Next(outcome))
            }
            _ => match self.stack.pop() {
                None => Ok(Routed::Done(ConversationOutcome::Complete {
                    agent: sender,
                    text,
                })),
                Some(frame) => {
                    self.current = frame.agent;
                    debug!(
                        from = %sender,
                        to = %self.current,
                        depth = self.stack.len(),
                        "returning to caller"
                    );
                    let machine = self.current_machine()?;
                    let outcome = machine
                        .resume(ResumePayload::DelegateReply {
                            content: IncomingMessage::text(forward_text(&sender, &text)),
                        })
                        .await?;
                    Ok(Routed::Next(outcome))
                }
            },
        }
    }

    fn current_machine(&self) -> Result<Arc<crate::agent::AgentStateMachine>> {
        self.registry
            .get(&self.current)
            .cloned()
            .ok_or_else(|| {
                AgentError::InvalidState(format!("current agent {} not registered", self.current))
                    .into()
            })
    }
}

enum Routed {
    Next(TurnOutcome),
    Done(ConversationOutcome),
}

fn forward_text(sender: &str, text: &str) -> String {
    format!("{FORWARDED_MESSAGE_PREFIX}{sender}:\n{text}")
}
