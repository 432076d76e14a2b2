// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Read-only agent registry.
//!
//! Built once, passed into the orchestrator at construction. Registration
//! order is preserved and meaningful: the first agent is the conversation
//! entry point, and reset walks agents in this order.

use std::sync::Arc;

use crate::agent::AgentStateMachine;

struct Registration {
    machine: Arc<AgentStateMachine>,
    /// Peer names this agent may address; `None` = all registered peers.
    whitelist: Option<Vec<String>>,
}

/// The set of agents participating in one workflow.
pub struct AgentRegistry {
    entries: Vec<Registration>,
}

impl AgentRegistry {
    pub fn builder() -> AgentRegistryBuilder {
        AgentRegistryBuilder {
            entries: Vec::new(),
        }
    }

    /// Look up an agent by name.
    pub fn get(&self, name: &str) -> Option<&Arc<AgentStateMachine>> {
        self.entries
            .iter()
            .find(|entry| entry.machine.name() == name)
            .map(|entry| &entry.machine)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Whether `sender` may address `destination`. A destination outside
    /// the sender's whitelist is indistinguishable from a nonexistent one.
    pub fn allows(&self, sender: &str, destination: &str) -> bool {
        if !self.contains(destination) || sender == destination {
            return false;
        }
        match self
            .entries
            .iter()
            .find(|entry| entry.machine.name() == sender)
        {
            Some(entry) => match &entry.whitelist {
                Some(whitelist) => whitelist.iter().any(|name| name == destination),
                None => true,
            },
            None => false,
        }
    }

    /// The entry-point agent: first registered.
    pub fn first(&self) -> Option<&Arc<AgentStateMachine>> {
        self.entries.first().map(|entry| &entry.machine)
    }

    /// Agent names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|entry| entry.machine.name())
            .collect()
    }

    /// Machines in registration order.
    pub fn machines(&self) -> impl Iterator<Item = &Arc<AgentStateMachine>> {
        self.entries.iter().map(|entry| &entry.machine)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builder for [`AgentRegistry`].
pub struct AgentRegistryBuilder {
    entries: Vec<Registration>,
}

impl AgentRegistryBuilder {
    /// Register an agent that may address every other registered agent.
    pub fn register(&mut self, machine: Arc<AgentStateMachine>) -> &mut Self {
        self.entries.push(Registration {
            machine,
            whitelist: None,
        });
        self
    }

    /// Register an agent restricted to the given peer names.
    pub fn register_with_whitelist(
        &mut self,
        machine: Arc<AgentStateMachine>,
        whitelist: Vec<String>,
    ) -> &mut Self {
        self.entries.push(Registration {
            machine,
            whitelist: Some(whitelist),
        });
        self
    }

    pub fn build(self) -> AgentRegistry {
        AgentRegistry {
            entries: self.entries,
        }
    }
}
