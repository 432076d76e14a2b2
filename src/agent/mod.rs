// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Single-agent conversation state machine.
//!
//! One machine drives one (session, agent) thread: build the turn input,
//! invoke the model through the marker gate, classify the response, and
//! either finish the turn or park at a suspension point. Every observable
//! step is committed to the checkpoint store before the machine yields, so
//! a process restart resumes exactly where the last commit left off.
//!
//! Suspension points and their resume payloads:
//!
//! - `AwaitingToolApproval` -> `Continue` (execute the pending calls) or
//!   `Feedback` (discard them, inject human feedback instead).
//! - `AwaitingDelegateReply` -> `DelegateReply` (fold the peer's answer in
//!   as the next input).
//!
//! A payload of the wrong shape fails fast with
//! [`AgentError::ResumeShapeMismatch`]; nothing is committed.

mod types;

pub use types::{
    AgentConfig, AgentEvent, TurnOutcome, FEEDBACK_PREAMBLE, SYNTHETIC_COMPLETION_TEXT,
    TOOL_RESULT_PREAMBLE,
};

use std::sync::{Arc, Mutex as StdMutex};
#[cfg(feature = "telemetry")]
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::capability::{ContextAssembler, NextMessage, SharedCapability};
use crate::checkpoint::{CheckpointDelta, SharedCheckpointStore, ThreadState};
use crate::error::{AgentError, Result};
use crate::mapper::{MarkerGate, ResponseFieldMapper};
use crate::retention;
use crate::tools::{truncate_output, ToolRegistry, HISTORY_NOTE_MAX_LINES};
use crate::types::{
    IncomingMessage, Message, ModelResponse, ResponseEnvelope, ResumePayload, Role,
    SharedModelClient, StreamEvent, SuspensionPoint, ToolCall, ToolDefinition,
};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

/// Everything needed to construct a state machine.
pub struct AgentOptions {
    pub config: AgentConfig,
    pub model: SharedModelClient,
    pub tools: Arc<ToolRegistry>,
    pub capabilities: Vec<SharedCapability>,
    pub store: SharedCheckpointStore,
    pub session_id: String,
}

/// The per-agent suspend/resume state machine.
pub struct AgentStateMachine {
    config: AgentConfig,
    model: SharedModelClient,
    tools: Arc<ToolRegistry>,
    assembler: ContextAssembler,
    store: SharedCheckpointStore,
    thread_key: String,
    events: mpsc::UnboundedSender<AgentEvent>,
    event_rx: StdMutex<Option<mpsc::UnboundedReceiver<AgentEvent>>>,
}

impl AgentStateMachine {
    pub fn new(options: AgentOptions) -> Self {
        let thread_key = crate::checkpoint::thread_key(&options.session_id, &options.config.name);
        let (events, event_rx) = mpsc::unbounded_channel();
        Self {
            config: options.config,
            model: options.model,
            tools: options.tools,
            assembler: ContextAssembler::new(options.capabilities),
            store: options.store,
            thread_key,
            events,
            event_rx: StdMutex::new(Some(event_rx)),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn thread_key(&self) -> &str {
        &self.thread_key
    }

    /// Take the progress-event receiver. Can only be taken once; events
    /// sent with no live receiver are dropped.
    pub fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<AgentEvent>> {
        self.event_rx.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Run every capability's one-time init hook.
    pub async fn init(&self) -> Result<()> {
        self.assembler.init().await
    }

    /// The thread's current persisted state.
    pub async fn state(&self) -> Result<ThreadState> {
        Ok(self
            .store
            .get(&self.thread_key)
            .await
            .map_err(AgentError::from)?
            .unwrap_or_default())
    }

    // ------------------------------------------------------------------
    // Drive entry points
    // ------------------------------------------------------------------

    /// Start a turn with a fresh incoming message.
    pub async fn handle_message(&self, incoming: IncomingMessage) -> Result<TurnOutcome> {
        self.handle_message_internal(incoming, None).await
    }

    /// Start a turn with a cancellation signal.
    ///
    /// Cancelling mid-call aborts before the next commit; the last
    /// committed checkpoint is left untouched.
    pub async fn handle_message_with_cancel(
        &self,
        incoming: IncomingMessage,
        cancel: watch::Receiver<bool>,
    ) -> Result<TurnOutcome> {
        self.handle_message_internal(incoming, Some(cancel)).await
    }

    async fn handle_message_internal(
        &self,
        incoming: IncomingMessage,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<TurnOutcome> {
        let state = self.state().await?;
        if state.is_suspended() {
            return Err(AgentError::InvalidState(format!(
                "{} is suspended ({}); resume it instead of sending a new message",
                self.config.name,
                state.suspension.expected_resume()
            ))
            .into());
        }
        self.process_incoming(incoming, cancel).await
    }

    /// Resume a suspended turn. The payload shape must match the active
    /// suspension point.
    pub async fn resume(&self, payload: ResumePayload) -> Result<TurnOutcome> {
        self.resume_internal(payload, None).await
    }

    pub async fn resume_with_cancel(
        &self,
        payload: ResumePayload,
        cancel: watch::Receiver<bool>,
    ) -> Result<TurnOutcome> {
        self.resume_internal(payload, Some(cancel)).await
    }

    async fn resume_internal(
        &self,
        payload: ResumePayload,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<TurnOutcome> {
        let state = self.state().await?;
        match (state.suspension, payload) {
            (SuspensionPoint::None, payload) => Err(AgentError::NotSuspended(format!(
                "{} has nothing to resume with {}",
                self.config.name,
                payload.kind()
            ))
            .into()),
            (
                SuspensionPoint::AwaitingToolApproval { pending_calls },
                ResumePayload::Continue,
            ) => self.execute_approved_tools(pending_calls, cancel).await,
            (
                SuspensionPoint::AwaitingToolApproval { .. },
                ResumePayload::Feedback { content },
            ) => self.inject_feedback(content, cancel).await,
            (
                SuspensionPoint::AwaitingDelegateReply { .. },
                ResumePayload::DelegateReply { content },
            ) => self.process_incoming(content, cancel).await,
            (point, payload) => Err(AgentError::ResumeShapeMismatch {
                expected: point.expected_resume(),
                got: payload.kind(),
            }
            .into()),
        }
    }

    /// Park the thread awaiting a delegate's reply. Called by the
    /// orchestrator after a terminal response named a destination.
    pub async fn suspend_for_delegate(&self, delegate: &str, forwarded_text: &str) -> Result<()> {
        self.commit(CheckpointDelta::suspend(
            SuspensionPoint::AwaitingDelegateReply {
                delegate: delegate.to_string(),
                forwarded_text: forwarded_text.to_string(),
            },
        ))
        .await?;
        let _ = self.events.send(AgentEvent::Delegated {
            agent: self.config.name.clone(),
            delegate: delegate.to_string(),
            text: forwarded_text.to_string(),
        });
        Ok(())
    }

    /// Dispatch a capability command by name.
    pub async fn run_command(&self, command: &str) -> Result<Option<IncomingMessage>> {
        self.assembler.run_command(command).await
    }

    /// Drop the thread's history and reset every capability.
    pub async fn reset(&self) -> Result<()> {
        self.store
            .delete_thread(&self.thread_key)
            .await
            .map_err(AgentError::from)?;
        self.assembler.reset().await
    }

    // ------------------------------------------------------------------
    // Turn pipeline
    // ------------------------------------------------------------------

    async fn process_incoming(
        &self,
        incoming: IncomingMessage,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<TurnOutcome> {
        let next = NextMessage::User(incoming.clone());
        self.assembler.ready_to_proceed(&next).await;

        let assembled = self
            .assembler
            .assemble_message(&next, incoming.content.clone())
            .await;
        let persistent = assembled
            .persistent
            .with_shared_files(incoming.shared_files.clone());
        let persistent_id = persistent.id.clone();

        // The display rendering feeds the model; the persistent one, with
        // retention tags, is what history keeps.
        let display = Message::with_blocks(Role::User, assembled.display);
        self.commit(
            CheckpointDelta::append(persistent).with_suspension(SuspensionPoint::None),
        )
        .await?;

        // Expired context is dropped before the model sees this turn; the
        // just-committed rendering is swapped for its display twin.
        let mut history = self.prune_history().await?;
        history.retain(|m| m.id != persistent_id);
        history.push(display);
        self.invoke_and_classify(history, &next, cancel).await
    }

    async fn execute_approved_tools(
        &self,
        pending_calls: Vec<ToolCall>,
        mut cancel: Option<watch::Receiver<bool>>,
    ) -> Result<TurnOutcome> {
        let mut result_messages = Vec::with_capacity(pending_calls.len() + 1);
        let mut summary_lines = Vec::with_capacity(pending_calls.len());
        let mut last_next = None;

        for call in &pending_calls {
            let dispatch = if let Some(rx) = cancel.as_mut() {
                if *rx.borrow() {
                    return Err(AgentError::Cancelled.into());
                }
                tokio::select! {
                    result = self.tools.dispatch(&call.name, call.input.clone()) => result,
                    _ = cancelled(rx) => return Err(AgentError::Cancelled.into()),
                }
            } else {
                self.tools.dispatch(&call.name, call.input.clone()).await
            };

            // Unknown tools fold into error content like any other failure.
            let (content, is_error) = match dispatch {
                Ok(result) => (result.output.content().to_string(), result.is_error),
                Err(error) => (error.to_string(), true),
            };

            let _ = self.events.send(AgentEvent::ToolResult {
                agent: self.config.name.clone(),
                call_id: call.id.clone(),
                name: call.name.clone(),
                content: content.clone(),
                is_error,
            });

            summary_lines.push(format!(
                "{}: {}",
                call.name,
                truncate_output(&content, HISTORY_NOTE_MAX_LINES)
            ));
            result_messages.push(Message::tool_result(&call.id, &call.name, content));

            last_next = Some(NextMessage::ToolResponse {
                call_id: call.id.clone(),
                name: call.name.clone(),
                content: result_messages
                    .last()
                    .map(Message::text)
                    .unwrap_or_default(),
            });
        }

        // Persistent note keeps a compact tool record in history without
        // ever rendering to a user.
        result_messages.push(Message::hidden_note(format!(
            "Tool results:\n{}",
            summary_lines.join("\n")
        )));

        self.commit(
            CheckpointDelta::append_all(result_messages)
                .with_suspension(SuspensionPoint::None),
        )
        .await?;

        let next = last_next.unwrap_or_else(|| NextMessage::User(IncomingMessage::default()));
        self.assembler.ready_to_proceed(&next).await;

        let mut history = self.prune_history().await?;
        // Model-facing nudge for this turn only; not committed.
        history.push(Message::user(TOOL_RESULT_PREAMBLE));
        self.invoke_and_classify(history, &next, cancel).await
    }

    async fn inject_feedback(
        &self,
        content: String,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<TurnOutcome> {
        let feedback = Message::user(format!("{FEEDBACK_PREAMBLE}\n{content}"));
        let next = NextMessage::User(IncomingMessage::text(feedback.text()));
        self.commit(
            CheckpointDelta::append(feedback).with_suspension(SuspensionPoint::None),
        )
        .await?;
        self.assembler.ready_to_proceed(&next).await;

        let history = self.prune_history().await?;
        self.invoke_and_classify(history, &next, cancel).await
    }

    /// Invoke the model once and either finish the turn or suspend.
    async fn invoke_and_classify(
        &self,
        history: Vec<Message>,
        next: &NextMessage,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<TurnOutcome> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let assistant_turns = history.iter().filter(|m| m.role == Role::Assistant).count();
        if assistant_turns as u32 >= self.config.max_iterations {
            return Err(AgentError::MaxIterationsExceeded(self.config.max_iterations).into());
        }

        let mut attributes = self.config.attributes.clone();
        attributes.extend(self.assembler.collect_attributes(next).await);
        let mapper = ResponseFieldMapper::new(attributes)?;

        let system = self
            .assembler
            .system_prompt(
                &self.config.identity(),
                &self.config.constitution,
                &mapper.render_instructions(),
            )
            .await;

        let mut tool_definitions = self.tools.definitions();
        tool_definitions.extend(self.assembler.tools());
        let tools = if tool_definitions.is_empty() || !self.model.supports_tool_use() {
            None
        } else {
            Some(tool_definitions.as_slice())
        };

        let response = self.stream_model(&history, tools, &system, cancel).await?;

        #[cfg(feature = "telemetry")]
        if let Some(usage) = &response.usage {
            GLOBAL_METRICS.record_tokens(u64::from(usage.input_tokens), u64::from(usage.output_tokens));
        }

        if response.has_tool_calls() {
            let point = SuspensionPoint::AwaitingToolApproval {
                pending_calls: response.tool_calls.clone(),
            };

            let blocks = if response.content.is_empty() {
                Vec::new()
            } else {
                vec![crate::types::ContentBlock::text(&response.content)]
            };
            let proposal = Message::with_blocks(Role::Assistant, blocks)
                .with_tool_calls(response.tool_calls.clone());
            self.commit(CheckpointDelta::append(proposal).with_suspension(point.clone()))
                .await?;

            debug!(
                agent = %self.config.name,
                calls = response.tool_calls.len(),
                "suspending for tool approval"
            );
            let _ = self.events.send(AgentEvent::ToolApprovalRequested {
                agent: self.config.name.clone(),
                calls: response.tool_calls,
            });
            return Ok(TurnOutcome::Suspended(point));
        }

        let raw = if response.content.trim().is_empty() {
            SYNTHETIC_COMPLETION_TEXT.to_string()
        } else {
            response.content
        };

        let mut envelope = ResponseEnvelope {
            attributes: mapper.parse(&raw),
            user_text: crate::mapper::user_visible_text(&raw),
            tool_calls: Vec::new(),
            shared_files: Vec::new(),
        };
        envelope.shared_files = self.assembler.collect_shared_files(&envelope).await;
        self.assembler.read_response(&envelope).await;

        self.commit(
            CheckpointDelta::append(Message::assistant(&raw))
                .with_suspension(SuspensionPoint::None)
                .with_attributes(envelope.attributes.clone()),
        )
        .await?;

        let _ = self.events.send(AgentEvent::TurnCompleted {
            agent: self.config.name.clone(),
            text: envelope.user_text.clone(),
        });

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("agent.turn", start.elapsed());

        Ok(TurnOutcome::Completed(envelope))
    }

    async fn stream_model(
        &self,
        history: &[Message],
        tools: Option<&[ToolDefinition]>,
        system: &str,
        mut cancel: Option<watch::Receiver<bool>>,
    ) -> Result<ModelResponse> {
        let gate = Arc::new(StdMutex::new(MarkerGate::new()));
        let gate_in_callback = gate.clone();
        let sender = self.events.clone();
        let agent = self.config.name.clone();

        let on_event: Box<dyn Fn(StreamEvent) + Send + Sync> = Box::new(move |event| {
            if let StreamEvent::TextDelta(delta) = event {
                let chunk = gate_in_callback
                    .lock()
                    .ok()
                    .and_then(|mut gate| gate.push_delta(&delta));
                if let Some(text) = chunk {
                    let _ = sender.send(AgentEvent::TextChunk {
                        agent: agent.clone(),
                        text,
                    });
                }
            }
        });

        let response = if let Some(rx) = cancel.as_mut() {
            if *rx.borrow() {
                return Err(AgentError::Cancelled.into());
            }
            tokio::select! {
                result = self.model.stream_invoke(history, tools, Some(system), on_event) => {
                    result.map_err(AgentError::from)?
                }
                _ = cancelled(rx) => return Err(AgentError::Cancelled.into()),
            }
        } else {
            self.model
                .stream_invoke(history, tools, Some(system), on_event)
                .await
                .map_err(AgentError::from)?
        };

        // A markerless response is entirely user-visible; surface it now.
        if let Ok(mut gate) = gate.lock() {
            if let Some(text) = gate.finalize_and_drain() {
                let _ = self.events.send(AgentEvent::TextChunk {
                    agent: self.config.name.clone(),
                    text,
                });
            }
        }

        Ok(response)
    }

    /// Drop expired retention-tracked content from the committed history,
    /// returning the pruned message list the next model call should see.
    async fn prune_history(&self) -> Result<Vec<Message>> {
        let state = self.state().await?;
        let outcome = retention::prune(&state.messages);
        if outcome.is_noop() {
            return Ok(state.messages);
        }
        self.commit(
            CheckpointDelta::default()
                .with_replaced(outcome.updated.clone())
                .with_removed_ids(outcome.removed_ids.clone()),
        )
        .await?;
        Ok(outcome.apply(state.messages))
    }

    async fn commit(&self, delta: CheckpointDelta) -> Result<()> {
        self.store
            .put(&self.thread_key, delta)
            .await
            .map_err(AgentError::from)?;
        Ok(())
    }
}

/// Resolves when the cancellation flag flips to true; pends forever if the
/// channel closes without it.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
