//! # Agent registry
//!
//! The registry holds the closed set of [`AgentDefinition`]s and resolves
//! handoff edges. The handoff graph is an arena: definitions live in a `Vec`
//! and a name → index table answers lookups, so agents that hand off to each
//! other in a cycle never hold references to one another.
//!
//! The registry is written during setup only (`define`, `attach_tools`, both
//! `&mut self`) and then frozen with [`AgentRegistry::into_shared`]. Sessions
//! read the frozen `Arc<AgentRegistry>` without locking.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agent::AgentDefinition;
use crate::error::{AgentsError, Result};
use crate::gateway::ToolGateway;
use crate::model::handoff_tool_name;

/// Index of an agent in the registry arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgentId(usize);

/// Closed set of agent definitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "RegistrySnapshot", try_from = "RegistrySnapshot")]
pub struct AgentRegistry {
    agents: Vec<AgentDefinition>,
    index: HashMap<String, AgentId>,
    root: Option<AgentId>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition. The first definition becomes the root unless
    /// [`AgentRegistry::set_root`] says otherwise. Targets may name agents
    /// that are defined later. Names that differ only in case or punctuation
    /// are rejected, since they would be advertised under one handoff tool.
    pub fn define(&mut self, agent: AgentDefinition) -> Result<&AgentDefinition> {
        if self.index.contains_key(&agent.name) {
            return Err(AgentsError::DuplicateName { name: agent.name });
        }
        if agent.can_hand_off_to(&agent.name) {
            return Err(AgentsError::InvalidHandoff {
                from: agent.name.clone(),
                to: agent.name,
            });
        }
        let tool_name = handoff_tool_name(&agent.name);
        if let Some(existing) = self
            .agents
            .iter()
            .find(|a| handoff_tool_name(&a.name) == tool_name)
        {
            return Err(AgentsError::HandoffToolCollision {
                name: agent.name,
                existing: existing.name.clone(),
                tool_name,
            });
        }

        let id = AgentId(self.agents.len());
        debug!(agent = %agent.name, handoffs = ?agent.handoff_targets, "Defining agent");
        self.index.insert(agent.name.clone(), id);
        self.agents.push(agent);
        if self.root.is_none() {
            self.root = Some(id);
        }
        Ok(&self.agents[id.0])
    }

    pub fn set_root(&mut self, name: &str) -> Result<()> {
        self.root = Some(self.id_of(name)?);
        Ok(())
    }

    /// Binds a subset of the gateway's tools to one agent.
    pub fn attach_tools<S: AsRef<str>>(
        &mut self,
        agent_name: &str,
        gateway: &dyn ToolGateway,
        tool_names: &[S],
    ) -> Result<()> {
        let id = self.id_of(agent_name)?;
        let available = gateway.specs();
        for name in tool_names {
            if !available.iter().any(|s| s.name == name.as_ref()) {
                return Err(AgentsError::UnknownTool {
                    name: name.as_ref().to_string(),
                });
            }
        }
        let names: Vec<String> = tool_names.iter().map(|n| n.as_ref().to_string()).collect();
        info!(agent = %agent_name, tools = ?names, "Attaching tools");
        self.agents[id.0].bind_tools(names);
        Ok(())
    }

    /// Binds every tool the gateway offers.
    pub fn attach_all_tools(&mut self, agent_name: &str, gateway: &dyn ToolGateway) -> Result<()> {
        let names: Vec<String> = gateway.specs().into_iter().map(|s| s.name).collect();
        self.attach_tools(agent_name, gateway, names.as_slice())
    }

    /// Looks up `to_agent` as a handoff target of `from_agent`.
    pub fn resolve_handoff(&self, from_agent: &str, to_agent: &str) -> Result<&AgentDefinition> {
        let invalid = || AgentsError::InvalidHandoff {
            from: from_agent.to_string(),
            to: to_agent.to_string(),
        };
        let from = self.get(from_agent).ok_or_else(invalid)?;
        if !from.can_hand_off_to(to_agent) {
            return Err(invalid());
        }
        self.get(to_agent).ok_or_else(invalid)
    }

    /// Every handoff target must name a defined agent and a root must exist.
    pub fn validate(&self) -> Result<()> {
        if self.root.is_none() {
            return Err(AgentsError::ConfigError {
                message: "registry has no agents".to_string(),
            });
        }
        for agent in &self.agents {
            for target in &agent.handoff_targets {
                if !self.index.contains_key(target) {
                    return Err(AgentsError::InvalidHandoff {
                        from: agent.name.clone(),
                        to: target.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Validates and freezes the registry for read-only sharing.
    pub fn into_shared(self) -> Result<Arc<AgentRegistry>> {
        self.validate()?;
        Ok(Arc::new(self))
    }

    pub fn get(&self, name: &str) -> Option<&AgentDefinition> {
        self.index.get(name).map(|id| &self.agents[id.0])
    }

    pub fn agent(&self, id: AgentId) -> &AgentDefinition {
        &self.agents[id.0]
    }

    pub fn id_of(&self, name: &str) -> Result<AgentId> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| AgentsError::UnknownAgent {
                name: name.to_string(),
            })
    }

    pub fn root_id(&self) -> Result<AgentId> {
        self.root.ok_or_else(|| AgentsError::ConfigError {
            message: "registry has no agents".to_string(),
        })
    }

    pub fn root(&self) -> Result<&AgentDefinition> {
        Ok(self.agent(self.root_id()?))
    }

    pub fn agents(&self) -> &[AgentDefinition] {
        &self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Agents reachable from `from` through at most `max_steps` handoff edges,
    /// `from` included.
    pub fn reachable_within(&self, from: &str, max_steps: usize) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        if self.index.contains_key(from) {
            seen.insert(from.to_string());
            queue.push_back((from.to_string(), 0usize));
        }
        while let Some((name, depth)) = queue.pop_front() {
            if depth == max_steps {
                continue;
            }
            if let Some(agent) = self.get(&name) {
                for target in &agent.handoff_targets {
                    if self.index.contains_key(target) && seen.insert(target.clone()) {
                        queue.push_back((target.clone(), depth + 1));
                    }
                }
            }
        }
        seen
    }
}

/// Serialized form of a registry: the root name plus the definitions in
/// arena order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub root: Option<String>,
    pub agents: Vec<AgentDefinition>,
}

impl From<AgentRegistry> for RegistrySnapshot {
    fn from(registry: AgentRegistry) -> Self {
        let root = registry.root.map(|id| registry.agents[id.0].name.clone());
        Self {
            root,
            agents: registry.agents,
        }
    }
}

impl TryFrom<RegistrySnapshot> for AgentRegistry {
    type Error = AgentsError;

    fn try_from(snapshot: RegistrySnapshot) -> Result<Self> {
        let mut registry = AgentRegistry::new();
        for agent in snapshot.agents {
            registry.define(agent)?;
        }
        if let Some(root) = snapshot.root {
            registry.set_root(&root)?;
        }
        Ok(registry)
    }
}
