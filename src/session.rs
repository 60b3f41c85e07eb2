//! # Sessions
//!
//! A [`Session`] is one conversation: the agent that currently owns it and
//! the event log. Turns run on a working copy of the log; the session commits
//! the log after every turn and switches the active agent only when the turn
//! succeeds. Dropping a turn future mid-flight leaves the session as it was.
//!
//! [`SessionManager`] owns sessions by id. Each session sits behind its own
//! async mutex, so independent sessions run turns concurrently while a second
//! turn on a busy session fails fast with [`AgentsError::SessionBusy`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agent::AgentDefinition;
use crate::error::{AgentsError, Result};
use crate::items::EventLog;
use crate::registry::{AgentId, AgentRegistry};
use crate::runner::{Runner, TurnOutcome};

/// One conversation.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    registry: Arc<AgentRegistry>,
    active: AgentId,
    log: EventLog,
    created_at: DateTime<Utc>,
    turns: usize,
}

impl Session {
    /// Starts at the registry's root agent with an empty log.
    pub fn new(id: impl Into<String>, registry: Arc<AgentRegistry>) -> Result<Self> {
        let active = registry.root_id()?;
        Ok(Self {
            id: id.into(),
            registry,
            active,
            log: EventLog::new(),
            created_at: Utc::now(),
            turns: 0,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn current_agent(&self) -> &AgentDefinition {
        self.registry.agent(self.active)
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Completed turns.
    pub fn turns(&self) -> usize {
        self.turns
    }

    /// Runs one turn. The log is committed whatever the outcome; the active
    /// agent only changes on success.
    pub async fn append_user_turn(&mut self, runner: &Runner, input: &str) -> Result<TurnOutcome> {
        let mut working = self.log.clone();
        let active = self.current_agent().name.clone();
        let result = runner.run(&active, &mut working, input).await;
        self.log = working;

        let outcome = result?;
        self.active = self.registry.id_of(&outcome.active_agent)?;
        self.turns += 1;
        debug!(session = %self.id, agent = %outcome.active_agent, events = self.log.len(), "Turn committed");
        Ok(outcome)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            active_agent: self.current_agent().name.clone(),
            log: self.log.clone(),
            created_at: self.created_at,
            turns: self.turns,
        }
    }

    /// Rebuilds a session, checking the agent name and the log.
    pub fn restore(snapshot: SessionSnapshot, registry: Arc<AgentRegistry>) -> Result<Self> {
        let active = registry.id_of(&snapshot.active_agent)?;
        snapshot.log.validate()?;
        Ok(Self {
            id: snapshot.session_id,
            registry,
            active,
            log: snapshot.log,
            created_at: snapshot.created_at,
            turns: snapshot.turns,
        })
    }
}

/// Serializable state of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub active_agent: String,
    pub log: EventLog,
    pub created_at: DateTime<Utc>,
    /// Completed turns; absent in older snapshots.
    #[serde(default)]
    pub turns: usize,
}

type SharedSession = Arc<tokio::sync::Mutex<Session>>;

/// Sessions by id.
#[derive(Debug)]
pub struct SessionManager {
    registry: Arc<AgentRegistry>,
    sessions: Mutex<HashMap<String, SharedSession>>,
}

impl SessionManager {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the session for `id`, creating it on first use.
    pub fn get_or_create(&self, id: &str) -> Result<SharedSession> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(session) = sessions.get(id) {
            return Ok(session.clone());
        }
        let session = Arc::new(tokio::sync::Mutex::new(Session::new(
            id,
            self.registry.clone(),
        )?));
        info!(session = %id, "Session created");
        sessions.insert(id.to_string(), session.clone());
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Option<SharedSession> {
        self.sessions
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(id)
            .cloned()
    }

    /// Tears down a session. Returns whether it existed.
    pub fn end(&self, id: &str) -> bool {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(id)
            .is_some();
        if removed {
            info!(session = %id, "Session ended");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs a turn on session `id`, failing with `SessionBusy` if another
    /// turn is in flight there.
    pub async fn append_user_turn(
        &self,
        id: &str,
        runner: &Runner,
        input: &str,
    ) -> Result<TurnOutcome> {
        let session = self.get_or_create(id)?;
        let mut guard = session
            .try_lock()
            .map_err(|_| AgentsError::SessionBusy {
                session_id: id.to_string(),
            })?;
        guard.append_user_turn(runner, input).await
    }
}
