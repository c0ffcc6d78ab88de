//! In-memory registry of agent channels and deployment status, generalized
//! from a node-registry/WebSocket-handshake pattern: `agents[name] ->
//! channel`, `deployments[id] -> status`.

use std::collections::HashMap;

use cache_protocol::{AgentRegistered, Deployment};
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};

/// A message pushed to an agent's open WebSocket connection.
#[derive(Debug, Clone)]
pub enum AgentMessage {
    Registered(AgentRegistered),
    Deployment(Deployment),
}

impl AgentMessage {
    pub fn to_json(&self) -> String {
        match self {
            AgentMessage::Registered(m) => serde_json::to_string(m),
            AgentMessage::Deployment(m) => serde_json::to_string(m),
        }
        .expect("protocol messages always serialize")
    }
}

pub type AgentSink = mpsc::Sender<AgentMessage>;

/// A live agent session: its outbound sink plus the means to tell its
/// `handle_agent` task to stop when a newer connection displaces it.
struct AgentSession {
    sink: AgentSink,
    evict: oneshot::Sender<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentStatus {
    InProgress,
    Succeeded,
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::InProgress => "InProgress",
            DeploymentStatus::Succeeded => "Succeeded",
            DeploymentStatus::Failed => "Failed",
        }
    }

    fn is_terminal(&self) -> bool {
        !matches!(self, DeploymentStatus::InProgress)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("agent {0} is not connected")]
    AgentNotConnected(String),
}

/// Owns the `AgentSession` and `Deployment` maps exclusively (per the
/// ownership model: no other component reaches into these).
#[derive(Default)]
pub struct Coordinator {
    agents: RwLock<HashMap<String, AgentSession>>,
    deployments: RwLock<HashMap<String, DeploymentStatus>>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent's outbound sink, replacing any existing session
    /// under the same name. If a prior session exists, its `evict` signal
    /// fires immediately so its own `handle_agent` loop breaks and closes
    /// its socket, rather than relying on the displaced `Sender`'s refcount
    /// (the old task keeps its own clone of that sender alive, so dropping
    /// the one returned here would never reach zero). Returns a receiver
    /// the caller must race in its own select loop to learn when it, in
    /// turn, gets displaced.
    pub fn register_agent(&self, name: &str, sink: AgentSink) -> oneshot::Receiver<()> {
        let (evict_tx, evict_rx) = oneshot::channel();
        let session = AgentSession {
            sink,
            evict: evict_tx,
        };
        if let Some(prev) = self.agents.write().insert(name.to_string(), session) {
            tracing::info!(agent = %name, "agent session replaced, evicting prior channel");
            let _ = prev.evict.send(());
        }
        evict_rx
    }

    /// Remove the agent's entry, but only if `sink` is still the one on
    /// file — an evicted session must not delete the session that
    /// replaced it when it finishes tearing itself down.
    pub fn remove_agent_if_current(&self, name: &str, sink: &AgentSink) {
        let mut agents = self.agents.write();
        if agents
            .get(name)
            .is_some_and(|session| session.sink.same_channel(sink))
        {
            agents.remove(name);
        }
    }

    pub fn get_sink(&self, name: &str) -> Option<AgentSink> {
        self.agents.read().get(name).map(|session| session.sink.clone())
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.agents.read().contains_key(name)
    }

    /// Issue a deployment: marks `deployments[deploy_id] = InProgress` and
    /// pushes a `Deployment` message on the agent's channel.
    pub async fn start_deployment(
        &self,
        agent_name: &str,
        agent_id: &str,
        store_path: &str,
        deploy_id: &str,
    ) -> Result<(), CoordinatorError> {
        let sink = self
            .get_sink(agent_name)
            .ok_or_else(|| CoordinatorError::AgentNotConnected(agent_name.to_string()))?;

        self.deployments
            .write()
            .insert(deploy_id.to_string(), DeploymentStatus::InProgress);

        let message = AgentMessage::Deployment(Deployment::new(agent_id, deploy_id, store_path));
        if sink.send(message).await.is_err() {
            tracing::warn!(agent = %agent_name, deploy_id, "agent channel closed before deployment could be sent");
        }
        Ok(())
    }

    /// Record an inbound `DeploymentFinished` event. Monotonic: a terminal
    /// status is never overwritten.
    pub fn report_finished(&self, deploy_id: &str, succeeded: bool) {
        let mut deployments = self.deployments.write();
        let entry = deployments
            .entry(deploy_id.to_string())
            .or_insert(DeploymentStatus::InProgress);
        if entry.is_terminal() {
            return;
        }
        *entry = if succeeded {
            DeploymentStatus::Succeeded
        } else {
            DeploymentStatus::Failed
        };
    }

    pub fn deployment_status(&self, deploy_id: &str) -> Option<DeploymentStatus> {
        self.deployments.read().get(deploy_id).copied()
    }
}
