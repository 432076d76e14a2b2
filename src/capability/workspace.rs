// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared-file workspace.
//!
//! A minimal list/load seam for files agents exchange alongside messages.
//! The capability wrapper surfaces the current file list to the model each
//! turn (display only, never stored) and clears the workspace on reset.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AttributeDescriptor, ContentBlock, ResponseEnvelope, SharedFile};

use super::{AdditionalContent, Capability, NextMessage};

/// Variable name of the attribute listing files to attach to the reply.
pub const SHARED_FILES_ATTRIBUTE: &str = "sharedFiles";

/// Storage seam for files shared within a conversation.
#[async_trait]
pub trait Workspace: Send + Sync {
    /// Files currently present, sorted by name.
    async fn list_files(&self) -> Result<Vec<SharedFile>>;

    /// Load a file's content by name.
    async fn load_file(&self, name: &str) -> Result<Option<String>>;

    /// Store or overwrite a file.
    async fn store_file(&self, name: &str, content: String) -> Result<()>;

    /// Drop every file.
    async fn clear(&self) -> Result<()>;
}

/// Workspace kept in process memory.
#[derive(Default)]
pub struct InMemoryWorkspace {
    files: Mutex<BTreeMap<String, String>>,
}

impl InMemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.files
            .lock()
            .map_err(|_| anyhow::anyhow!("workspace file map poisoned"))
    }
}

#[async_trait]
impl Workspace for InMemoryWorkspace {
    async fn list_files(&self) -> Result<Vec<SharedFile>> {
        let files = self.lock()?;
        Ok(files
            .keys()
            .map(|name| SharedFile {
                name: name.clone(),
                url: format!("memory://{name}"),
            })
            .collect())
    }

    async fn load_file(&self, name: &str) -> Result<Option<String>> {
        let files = self.lock()?;
        Ok(files.get(name).cloned())
    }

    async fn store_file(&self, name: &str, content: String) -> Result<()> {
        let mut files = self.lock()?;
        files.insert(name.to_string(), content);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut files = self.lock()?;
        files.clear();
        Ok(())
    }
}

/// Capability surfacing the workspace file list each turn.
pub struct WorkspaceCapability {
    workspace: Arc<dyn Workspace>,
}

impl WorkspaceCapability {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        Self { workspace }
    }

    pub fn workspace(&self) -> &Arc<dyn Workspace> {
        &self.workspace
    }
}

#[async_trait]
impl Capability for WorkspaceCapability {
    fn name(&self) -> Option<&str> {
        Some("workspace")
    }

    async fn attributes(&self, _next: &NextMessage) -> Result<Vec<AttributeDescriptor>> {
        let files = self.workspace.list_files().await?;
        if files.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![AttributeDescriptor::new(
            "Shared Files",
            "string",
            SHARED_FILES_ATTRIBUTE,
            "A comma-separated list of workspace file names to attach to your \
             reply. Only include this parameter when sending files to the user.",
        )])
    }

    async fn additional_message_content(
        &self,
        _next: &NextMessage,
    ) -> Result<Vec<AdditionalContent>> {
        let files = self.workspace.list_files().await?;
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let listing = files
            .iter()
            .map(|file| format!("- {}", file.name))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(vec![AdditionalContent::display(vec![ContentBlock::text(
            format!("You have the following files in your workspace:\n{listing}"),
        )])])
    }

    async fn shared_files(&self, envelope: &ResponseEnvelope) -> Result<Vec<SharedFile>> {
        let Some(requested) = envelope.attribute(SHARED_FILES_ATTRIBUTE) else {
            return Ok(Vec::new());
        };

        let available = self.workspace.list_files().await?;
        Ok(requested
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .filter_map(|name| available.iter().find(|file| file.name == name))
            .cloned()
            .collect())
    }

    async fn reset(&self) -> Result<()> {
        self.workspace.clear().await
    }
}
