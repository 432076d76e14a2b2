// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared fixtures for integration tests: a scripted model client and
//! agent construction helpers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use troupe::agent::{AgentConfig, AgentOptions, AgentStateMachine};
use troupe::capability::{PeerDirectory, PeerInfo, SharedCapability};
use troupe::checkpoint::SharedCheckpointStore;
use troupe::tools::{ToolHandler, ToolOutput, ToolRegistryBuilder};
use troupe::{
    Message, ModelClient, ModelError, ModelResponse, StopReason, StreamEvent, ToolCall,
    ToolDefinition, ToolError,
};

/// Model client that plays back a fixed script of responses, streaming
/// each one in small chunks.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<ModelResponse>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn invoke(
        &self,
        _messages: &[Message],
        _tools: Option<&[ToolDefinition]>,
        _system_prompt: Option<&str>,
    ) -> Result<ModelResponse, ModelError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ModelError::api_message("script exhausted"))
    }

    async fn stream_invoke(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        system_prompt: Option<&str>,
        on_event: Box<dyn Fn(StreamEvent) + Send + Sync>,
    ) -> Result<ModelResponse, ModelError> {
        let response = self.invoke(messages, tools, system_prompt).await?;
        for chunk in response.content.as_bytes().chunks(11) {
            on_event(StreamEvent::TextDelta(
                String::from_utf8_lossy(chunk).to_string(),
            ));
        }
        on_event(StreamEvent::Done(StopReason::EndTurn));
        Ok(response)
    }

    fn supports_tool_use(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }
}

/// Tool that answers every call with a fixed weather report.
pub struct WeatherTool;

#[async_trait]
impl ToolHandler for WeatherTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("getWeather", "Look up current weather")
    }

    async fn execute(&self, _input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::success("sunny, 24C"))
    }
}

/// A terminal response carrying only user-visible text.
pub fn terminal(text: &str) -> ModelResponse {
    ModelResponse::text(format!("MESSAGE TO SEND:\n{text}"))
}

/// A terminal response that also names a delegation destination.
pub fn delegation(destination: &str, text: &str) -> ModelResponse {
    ModelResponse::text(format!(
        "- Helper Name: {destination}\nMESSAGE TO SEND:\n{text}"
    ))
}

/// A response requesting one getWeather tool call.
pub fn weather_call(id: &str) -> ModelResponse {
    let mut response = ModelResponse::text("");
    response.tool_calls = vec![ToolCall {
        id: id.to_string(),
        name: "getWeather".to_string(),
        input: serde_json::json!({"city": "Lima"}),
    }];
    response.stop_reason = StopReason::ToolUse;
    response
}

/// Build a machine named `name` with a helper roster covering `peers`.
pub fn make_machine(
    name: &str,
    peers: &[(&str, &str)],
    store: SharedCheckpointStore,
    session_id: &str,
    responses: Vec<ModelResponse>,
) -> Arc<AgentStateMachine> {
    let roster: Vec<PeerInfo> = peers
        .iter()
        .map(|(peer, description)| PeerInfo::new(*peer, *description))
        .collect();
    let capabilities: Vec<SharedCapability> = vec![Arc::new(PeerDirectory::new(name, roster))];

    let mut builder = ToolRegistryBuilder::new();
    builder.register(WeatherTool);

    Arc::new(AgentStateMachine::new(AgentOptions {
        config: AgentConfig::new(name, "test agent", "Be helpful."),
        model: Arc::new(ScriptedModel::new(responses)),
        tools: Arc::new(builder.build()),
        capabilities,
        store,
        session_id: session_id.to_string(),
    }))
}
