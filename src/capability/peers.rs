// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Peer directory capability.
//!
//! Gives an agent its view of the other agents in the workflow: renders the
//! helper roster into the system prompt, declares the `destinationAgent`
//! response attribute, and answers whitelist queries for the orchestrator.
//! An agent with no visible peers contributes nothing.

use async_trait::async_trait;

use crate::checkpoint::DESTINATION_AGENT_ATTRIBUTE;
use crate::error::Result;
use crate::types::{AttributeDescriptor, ContentBlock};

use super::{Capability, NextMessage};

/// A peer agent as seen from another agent.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub name: String,
    pub description: String,
}

impl PeerInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Capability exposing an agent's visible peers.
pub struct PeerDirectory {
    self_name: String,
    peers: Vec<PeerInfo>,
    /// Allowed peer names; `None` = every registered peer is visible.
    whitelist: Option<Vec<String>>,
}

impl PeerDirectory {
    pub fn new(self_name: impl Into<String>, peers: Vec<PeerInfo>) -> Self {
        Self {
            self_name: self_name.into(),
            peers,
            whitelist: None,
        }
    }

    pub fn with_whitelist(mut self, whitelist: Vec<String>) -> Self {
        self.whitelist = Some(whitelist);
        self
    }

    /// Peers this agent may address: everyone registered, minus itself,
    /// restricted to the whitelist when one is set.
    pub fn visible_peers(&self) -> Vec<&PeerInfo> {
        self.peers
            .iter()
            .filter(|peer| peer.name != self.self_name)
            .filter(|peer| match &self.whitelist {
                Some(allowed) => allowed.contains(&peer.name),
                None => true,
            })
            .collect()
    }

    /// Whether this agent may delegate to `name`. Outside the visible set
    /// is indistinguishable from nonexistent.
    pub fn allows(&self, name: &str) -> bool {
        self.visible_peers().iter().any(|peer| peer.name == name)
    }
}

#[async_trait]
impl Capability for PeerDirectory {
    fn name(&self) -> Option<&str> {
        Some("helpers")
    }

    async fn attributes(&self, _next: &NextMessage) -> Result<Vec<AttributeDescriptor>> {
        if self.visible_peers().is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![AttributeDescriptor::new(
            "Helper Name",
            "string",
            DESTINATION_AGENT_ATTRIBUTE,
            "Set this parameter to the name of the helper you want to send a message. \
             Only set it if you want to send a message to a helper, else do not set it.",
        )])
    }

    async fn system_content(&self) -> Result<Vec<ContentBlock>> {
        let peers = self.visible_peers();
        if peers.is_empty() {
            return Ok(Vec::new());
        }

        let roster = peers
            .iter()
            .map(|peer| format!("{}: {}", peer.name, peer.description))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(vec![ContentBlock::text(format!(
            "You have the following helpers that can be used to assist you in your task:\n{roster}"
        ))])
    }
}
