// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Context assembly across an agent's capabilities.
//!
//! The assembler is the single place the state machine touches capability
//! hooks. It merges system-prompt contributions under per-capability
//! headers, and splits per-turn message contributions into display content
//! (current turn only) and persistent content carrying retention tags.
//!
//! Hook failures are logged and skipped; a broken capability degrades its
//! own contribution, never the turn.

use tracing::warn;

use crate::error::Result;
use crate::types::{AttributeDescriptor, ContentBlock, Message, Role, ToolDefinition};

use super::{AgentCommand, NextMessage, Persistence, SharedCapability};

/// Divider used for contributions from nameless capabilities.
pub const NAMELESS_DIVIDER: &str = "----------------------";

fn system_header(name: &str) -> String {
    format!("### PLUGIN: {name} ###")
}

fn message_header(name: &str) -> String {
    format!("\n### PLUGIN {name} CONTEXT ###")
}

/// The merged next-message content for one turn.
#[derive(Debug, Clone)]
pub struct AssembledMessage {
    /// Everything the model sees on this turn.
    pub display: Vec<ContentBlock>,
    /// The message committed to history, with per-block retention horizons.
    pub persistent: Message,
}

/// Runs capability hooks and merges their output.
pub struct ContextAssembler {
    capabilities: Vec<SharedCapability>,
}

impl ContextAssembler {
    pub fn new(capabilities: Vec<SharedCapability>) -> Self {
        Self { capabilities }
    }

    pub fn capabilities(&self) -> &[SharedCapability] {
        &self.capabilities
    }

    fn label(capability: &SharedCapability) -> &str {
        capability.name().unwrap_or("<unnamed>")
    }

    /// Run every `init` hook.
    pub async fn init(&self) -> Result<()> {
        for capability in &self.capabilities {
            if let Err(error) = capability.init().await {
                warn!(capability = Self::label(capability), %error, "capability init failed");
            }
        }
        Ok(())
    }

    /// Run every `ready_to_proceed` hook.
    pub async fn ready_to_proceed(&self, next: &NextMessage) {
        for capability in &self.capabilities {
            if let Err(error) = capability.ready_to_proceed(next).await {
                warn!(
                    capability = Self::label(capability),
                    %error,
                    "ready_to_proceed hook failed, skipping"
                );
            }
        }
    }

    /// Collect attribute declarations from every capability.
    pub async fn collect_attributes(&self, next: &NextMessage) -> Vec<AttributeDescriptor> {
        let mut attributes = Vec::new();
        for capability in &self.capabilities {
            match capability.attributes(next).await {
                Ok(mut declared) => attributes.append(&mut declared),
                Err(error) => warn!(
                    capability = Self::label(capability),
                    %error,
                    "attributes hook failed, skipping"
                ),
            }
        }
        attributes
    }

    /// Build the full system prompt: identity, constitution, response
    /// instructions, then each capability's contribution under its header.
    pub async fn system_prompt(
        &self,
        identity: &str,
        constitution: &str,
        instructions: &str,
    ) -> String {
        let mut sections = vec![identity.to_string(), constitution.to_string(), instructions.to_string()];

        for capability in &self.capabilities {
            let content = match capability.system_content().await {
                Ok(content) => content,
                Err(error) => {
                    warn!(
                        capability = Self::label(capability),
                        %error,
                        "system_content hook failed, skipping"
                    );
                    continue;
                }
            };
            let text = blocks_text(&content);
            let tools = capability.tools();
            if text.is_empty() && tools.is_empty() {
                continue;
            }

            let mut section = match capability.name() {
                Some(name) => system_header(name),
                None => NAMELESS_DIVIDER.to_string(),
            };
            if !text.is_empty() {
                section.push('\n');
                section.push_str(&text);
            }
            if !tools.is_empty() {
                section.push_str("\nTools available:");
                for tool in &tools {
                    section.push_str(&format!("\n- {}: {}", tool.name, tool.description));
                }
            }
            sections.push(section);
        }

        sections.retain(|s| !s.is_empty());
        sections.join("\n\n")
    }

    /// Merge capability message content around the turn's base content.
    ///
    /// Capability context precedes the base content. Display output carries
    /// everything shown this turn; the persistent message carries only the
    /// base content (retention `None`, never expires) and the stored
    /// capability parts, each block tagged with its horizon. A capability's
    /// context header is tagged `None` if any of its stored parts never
    /// expire, else with the largest horizon among them; the spacing block
    /// after each stored part inherits that part's horizon.
    pub async fn assemble_message(
        &self,
        next: &NextMessage,
        base: Vec<ContentBlock>,
    ) -> AssembledMessage {
        let mut display: Vec<ContentBlock> = Vec::new();
        let mut persistent_blocks: Vec<ContentBlock> = Vec::new();
        let mut retention: Vec<Option<u32>> = Vec::new();

        for capability in &self.capabilities {
            let additions = match capability.additional_message_content(next).await {
                Ok(additions) => additions,
                Err(error) => {
                    warn!(
                        capability = Self::label(capability),
                        %error,
                        "additional_message_content hook failed, skipping"
                    );
                    continue;
                }
            };
            if additions.is_empty() {
                continue;
            }

            let header = match capability.name() {
                Some(name) => message_header(name),
                None => format!("\n{NAMELESS_DIVIDER}"),
            };

            let displayed: Vec<&super::AdditionalContent> = additions
                .iter()
                .filter(|a| a.display_on_current_message)
                .collect();
            if !displayed.is_empty() {
                display.push(ContentBlock::text(header.clone()));
                for addition in &displayed {
                    display.extend(addition.content.iter().cloned());
                }
            }

            let stored: Vec<&super::AdditionalContent> = additions
                .iter()
                .filter(|a| a.persistence.is_stored())
                .collect();
            if stored.is_empty() {
                continue;
            }

            // Header horizon: forever if any stored part is forever, else
            // the largest numeric horizon.
            let header_horizon = if stored
                .iter()
                .any(|a| a.persistence == Persistence::Forever)
            {
                None
            } else {
                stored.iter().filter_map(|a| a.persistence.horizon()).max()
            };

            persistent_blocks.push(ContentBlock::text(header));
            retention.push(header_horizon);
            for addition in &stored {
                let horizon = addition.persistence.horizon();
                for block in &addition.content {
                    persistent_blocks.push(block.clone());
                    retention.push(horizon);
                }
                persistent_blocks.push(ContentBlock::text("\n"));
                retention.push(horizon);
            }
        }

        display.extend(base.iter().cloned());
        for block in base {
            persistent_blocks.push(block);
            retention.push(None);
        }

        let persistent = Message::with_blocks(Role::User, persistent_blocks).with_retention(retention);
        AssembledMessage {
            display,
            persistent,
        }
    }

    /// Collect envelope file attachments from every capability.
    pub async fn collect_shared_files(
        &self,
        envelope: &crate::types::ResponseEnvelope,
    ) -> Vec<crate::types::SharedFile> {
        let mut files = Vec::new();
        for capability in &self.capabilities {
            match capability.shared_files(envelope).await {
                Ok(mut contributed) => files.append(&mut contributed),
                Err(error) => warn!(
                    capability = Self::label(capability),
                    %error,
                    "shared_files hook failed, skipping"
                ),
            }
        }
        files
    }

    /// Run every `read_response` hook on the parsed envelope.
    pub async fn read_response(&self, envelope: &crate::types::ResponseEnvelope) {
        for capability in &self.capabilities {
            if let Err(error) = capability.read_response(envelope).await {
                warn!(
                    capability = Self::label(capability),
                    %error,
                    "read_response hook failed, skipping"
                );
            }
        }
    }

    /// Tools contributed by all capabilities.
    pub fn tools(&self) -> Vec<ToolDefinition> {
        self.capabilities.iter().flat_map(|c| c.tools()).collect()
    }

    /// Commands contributed by all capabilities.
    pub fn commands(&self) -> Vec<AgentCommand> {
        self.capabilities.iter().flat_map(|c| c.commands()).collect()
    }

    /// Dispatch a command to the capability that declares it.
    ///
    /// Returns `Ok(None)` when no capability knows the command.
    pub async fn run_command(
        &self,
        command: &str,
    ) -> Result<Option<crate::types::IncomingMessage>> {
        for capability in &self.capabilities {
            if capability.commands().iter().any(|c| c.name == command) {
                return capability.handle_command(command).await;
            }
        }
        Ok(None)
    }

    /// Reset every capability. The first failure is returned after all
    /// capabilities have been attempted.
    pub async fn reset(&self) -> Result<()> {
        let mut first_error = None;
        for capability in &self.capabilities {
            if let Err(error) = capability.reset().await {
                warn!(capability = Self::label(capability), %error, "capability reset failed");
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn blocks_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(ContentBlock::as_text)
        .collect::<Vec<_>>()
        .join("\n")
}
