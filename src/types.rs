// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Core types for the troupe runtime.
//!
//! This module defines the fundamental data structures used throughout the runtime,
//! including messages, tool definitions, model responses, suspension points, and
//! the model client abstraction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Message Types
// ============================================================================

/// Role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    #[serde(rename = "tool-result")]
    ToolResult,
}

/// Supported image media types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageMediaType {
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/gif")]
    Gif,
    #[serde(rename = "image/webp")]
    Webp,
}

/// A block of content within a message: text or an image reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        media_type: ImageMediaType,
        /// Base64 payload or a URL, depending on how the block was produced.
        data: String,
    },
}

impl ContentBlock {
    /// Create a text content block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create an image content block.
    pub fn image(media_type: ImageMediaType, data: impl Into<String>) -> Self {
        Self::Image {
            media_type,
            data: data.into(),
        }
    }

    /// Get the text content if this is a text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image { .. } => None,
        }
    }
}

/// A file an agent chose to share alongside a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedFile {
    pub name: String,
    pub url: String,
}

/// Id prefix for messages that are persisted for the model's benefit but
/// never rendered to a user (e.g. tool summaries kept in history).
pub const HIDDEN_MESSAGE_PREFIX: &str = "do-not-render-";

/// Text prefix on messages forwarded between agents. Hydration skips these
/// when enumerating user-message events.
pub const FORWARDED_MESSAGE_PREFIX: &str = "This message is from ";

/// One turn of conversation content.
///
/// Messages are mutated only by appending, by replacing the block list with a
/// filtered one under the same id (retention pruning), or by tombstoning the
/// whole message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Stable identifier; survives retention pruning.
    pub id: String,
    pub role: Role,
    /// Ordered content blocks.
    pub content: Vec<ContentBlock>,
    /// Files shared alongside this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_files: Vec<SharedFile>,
    /// Per-block retention horizon, parallel to `content`.
    /// `None` entry = never expire; `None` list = no retention tracking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<Vec<Option<u32>>>,
    /// Tool calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For tool-result messages: the call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For tool-result messages: the tool that produced the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    fn base(role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
            shared_files: Vec::new(),
            retention: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    /// Create a user message with text content.
    pub fn user(text: impl Into<String>) -> Self {
        Self::base(Role::User, vec![ContentBlock::text(text)])
    }

    /// Create an assistant message with text content.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::base(Role::Assistant, vec![ContentBlock::text(text)])
    }

    /// Create a message with content blocks.
    pub fn with_blocks(role: Role, blocks: Vec<ContentBlock>) -> Self {
        Self::base(role, blocks)
    }

    /// Create a tool-result message answering one tool call.
    pub fn tool_result(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::base(Role::ToolResult, vec![ContentBlock::text(content)]);
        msg.tool_call_id = Some(call_id.into());
        msg.tool_name = Some(tool_name.into());
        msg
    }

    /// Create a persistent note that is kept in history but never rendered.
    pub fn hidden_note(text: impl Into<String>) -> Self {
        let mut msg = Self::base(Role::User, vec![ContentBlock::text(text)]);
        msg.id = format!("{}{}", HIDDEN_MESSAGE_PREFIX, uuid::Uuid::new_v4());
        msg
    }

    /// Override the generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Attach a per-block retention list (parallel to `content`).
    pub fn with_retention(mut self, retention: Vec<Option<u32>>) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Attach shared files.
    pub fn with_shared_files(mut self, files: Vec<SharedFile>) -> Self {
        self.shared_files = files;
        self
    }

    /// Attach tool calls (assistant messages).
    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = calls;
        self
    }

    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    /// Whether this message requests tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Whether this message is a hidden history note.
    pub fn is_hidden(&self) -> bool {
        self.id.starts_with(HIDDEN_MESSAGE_PREFIX)
    }
}

/// Content arriving from outside an agent: the user or a peer agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_files: Vec<SharedFile>,
}

impl IncomingMessage {
    /// Create an incoming message with a single text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            shared_files: Vec::new(),
        }
    }

    /// Concatenated text of all text blocks.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

// ============================================================================
// Tool Definitions
// ============================================================================

/// JSON Schema for tool input parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub schema_type: String, // Always "object"
    pub properties: HashMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl InputSchema {
    /// Create a new input schema with object type.
    pub fn new() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: HashMap::new(),
            required: None,
        }
    }

    /// Add a property to the schema.
    pub fn with_property(mut self, name: impl Into<String>, schema: serde_json::Value) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Mark properties as required.
    pub fn with_required(mut self, required: Vec<String>) -> Self {
        self.required = Some(required);
        self
    }
}

impl Default for InputSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// Definition of a tool that can be called by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: InputSchema::new(),
        }
    }

    /// Set the input schema for this tool.
    pub fn with_schema(mut self, schema: InputSchema) -> Self {
        self.input_schema = schema;
        self
    }
}

/// A call to a tool requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

// ============================================================================
// Response Field Protocol
// ============================================================================

/// Static declaration of one named output field an agent's response carries.
///
/// Supplied by the agent definition and by each active capability; rendered
/// into the instruction block and used to extract values from free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    /// Display name used as the field header in the response text.
    pub name: String,
    /// Semantic type shown to the model (e.g. "string", "boolean").
    pub attribute_type: String,
    /// Key under which the extracted value is stored.
    pub variable_name: String,
    /// Human description rendered into the instruction block.
    pub description: String,
    #[serde(default)]
    pub required: bool,
    /// Optional worked example rendered into the instruction block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

impl AttributeDescriptor {
    pub fn new(
        name: impl Into<String>,
        attribute_type: impl Into<String>,
        variable_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            attribute_type: attribute_type.into(),
            variable_name: variable_name.into(),
            description: description.into(),
            required: false,
            example: None,
        }
    }

    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = Some(example.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// The parsed result of one assistant turn.
///
/// Created once per model invocation and folded into state-machine outputs;
/// never persisted as its own entity.
#[derive(Debug, Clone, Default)]
pub struct ResponseEnvelope {
    /// Extracted control fields, keyed by variable name. Absent = not found.
    pub attributes: HashMap<String, String>,
    /// The user-visible trailing text.
    pub user_text: String,
    /// Tool calls requested by the response.
    pub tool_calls: Vec<ToolCall>,
    /// Files the agent chose to share.
    pub shared_files: Vec<SharedFile>,
}

impl ResponseEnvelope {
    /// Look up an extracted attribute by variable name.
    pub fn attribute(&self, variable_name: &str) -> Option<&str> {
        self.attributes.get(variable_name).map(String::as_str)
    }

    /// Whether the response requests tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// ============================================================================
// Suspension & Resume
// ============================================================================

/// Why a single-agent state machine is currently paused.
///
/// At most one suspension point is active per (sessionId, agentName); it is
/// fully determined by the last unresolved checkpoint record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SuspensionPoint {
    /// Running or finished; nothing to resume.
    None,
    /// Suspended awaiting a human decision on proposed tool calls.
    AwaitingToolApproval { pending_calls: Vec<ToolCall> },
    /// Suspended awaiting a reply from a delegate agent.
    AwaitingDelegateReply {
        delegate: String,
        forwarded_text: String,
    },
}

impl SuspensionPoint {
    /// Whether the machine is suspended.
    pub fn is_suspended(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// The resume payload kind this suspension expects, for error messages.
    pub fn expected_resume(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::AwaitingToolApproval { .. } => "continue or feedback",
            Self::AwaitingDelegateReply { .. } => "delegateReply",
        }
    }
}

impl Default for SuspensionPoint {
    fn default() -> Self {
        Self::None
    }
}

/// Payload supplied when resuming a suspended state machine.
///
/// The shape must match the current suspension point; a mismatch is a
/// contract violation and fails fast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "resume", rename_all = "camelCase")]
pub enum ResumePayload {
    /// Approve pending tool calls and execute them.
    Continue,
    /// Discard pending tool calls and inject human feedback instead.
    Feedback { content: String },
    /// Fold a delegate agent's reply in as the next input.
    DelegateReply { content: IncomingMessage },
}

impl ResumePayload {
    /// The payload kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Feedback { .. } => "feedback",
            Self::DelegateReply { .. } => "delegateReply",
        }
    }
}

// ============================================================================
// Token Usage & Model Response
// ============================================================================

/// Token usage information from a model response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the input/prompt
    pub input_tokens: u32,
    /// Number of tokens in the output/completion
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Get total tokens (input + output).
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Reason why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
}

/// Response from a model invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Main text content of the response
    pub content: String,
    /// Tool calls made by the model
    pub tool_calls: Vec<ToolCall>,
    /// Reason for stopping generation
    pub stop_reason: StopReason,
    /// Token usage information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl ModelResponse {
    /// Create an empty response (end of turn, no content).
    pub fn empty() -> Self {
        Self {
            content: String::new(),
            tool_calls: Vec::new(),
            stop_reason: StopReason::EndTurn,
            usage: None,
        }
    }

    /// Create a text response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            stop_reason: StopReason::EndTurn,
            usage: None,
        }
    }

    /// Check if this response contains tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// ============================================================================
// Streaming Types
// ============================================================================

/// Events emitted during streaming responses.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A chunk of text content.
    TextDelta(String),

    /// Start of a tool use block.
    ToolUseStart { id: String, name: String },

    /// A chunk of tool input JSON.
    ToolInputDelta(String),

    /// End of a tool use block.
    ToolUseEnd,

    /// Token usage information (sent at end of stream).
    Usage(TokenUsage),

    /// Stream completed with stop reason.
    Done(StopReason),

    /// An error occurred during streaming.
    Error(String),
}

impl StreamEvent {
    /// Check if this is a text delta event.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::TextDelta(_))
    }

    /// Check if this is a done event.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// Get the text content if this is a text delta.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::TextDelta(s) => Some(s),
            _ => None,
        }
    }
}

// ============================================================================
// Model Client Trait
// ============================================================================

use crate::error::ModelError;
use async_trait::async_trait;

/// The opaque model capability: given a message history and a tool catalog,
/// produce a response that may contain tool calls.
///
/// Implementations own vendor specifics, retry policy, and wire formats;
/// the state machine only sees text plus a tool-call list.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send a completion request to the model.
    ///
    /// # Arguments
    /// * `messages` - Conversation history
    /// * `tools` - Optional tool definitions for function calling
    /// * `system_prompt` - Optional system prompt (instruction block included)
    ///
    /// # Returns
    /// Model response with content and any tool calls
    async fn invoke(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        system_prompt: Option<&str>,
    ) -> Result<ModelResponse, ModelError>;

    /// Send a streaming completion request.
    ///
    /// # Arguments
    /// * `messages` - Conversation history
    /// * `tools` - Optional tool definitions
    /// * `system_prompt` - Optional system prompt
    /// * `on_event` - Callback for each stream event
    ///
    /// # Returns
    /// Final model response after stream completes
    async fn stream_invoke(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        system_prompt: Option<&str>,
        on_event: Box<dyn Fn(StreamEvent) + Send + Sync>,
    ) -> Result<ModelResponse, ModelError>;

    /// Check if this client supports tool use / function calling.
    fn supports_tool_use(&self) -> bool;

    /// Get the name of this client for display purposes.
    fn name(&self) -> &str;

    /// Get the current model being used.
    fn model(&self) -> &str;
}

/// Arc-wrapped model client for shared ownership.
pub type SharedModelClient = std::sync::Arc<dyn ModelClient>;
