//! Wire protocol for the three bidirectional channel kinds the management
//! endpoint exposes to deployment agents: agent registration (`/ws`),
//! deployment completion reporting (`/ws-deployment`), and deployment log
//! streaming (`/api/v1/deploy/log/`).
//!
//! The JSON shapes mirror the original tool's hand-built dictionaries
//! exactly (field names, the constant all-zero envelope `id`, and the
//! `method`/`command.tag` duplication) since agents on the wire depend on
//! this exact structure.

use serde::{Deserialize, Serialize};

/// Every outbound envelope uses this placeholder UUID as its own `id` --
/// carried over from the original, which never varies it.
pub const ZERO_UUID: &str = "00000000-0000-0000-0000-000000000000";

/// `cache` sub-object embedded in `AgentRegistered`, describing the agent's
/// effective cache (via its workspace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheDescriptor {
    #[serde(rename = "cacheName")]
    pub cache_name: String,
    #[serde(rename = "isPublic")]
    pub is_public: bool,
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

/// Outbound: pushed once, immediately after an agent's registration is
/// accepted.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRegistered {
    pub agent: String,
    pub command: AgentRegisteredCommand,
    pub id: String,
    pub method: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentRegisteredCommand {
    pub contents: AgentRegisteredContents,
    pub tag: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentRegisteredContents {
    pub cache: CacheDescriptor,
    pub id: String,
}

impl AgentRegistered {
    pub fn new(agent_id: &str, cache: CacheDescriptor) -> Self {
        Self {
            agent: agent_id.to_string(),
            command: AgentRegisteredCommand {
                contents: AgentRegisteredContents {
                    cache,
                    id: agent_id.to_string(),
                },
                tag: "AgentRegistered",
            },
            id: ZERO_UUID.to_string(),
            method: "AgentRegistered",
        }
    }
}

/// Outbound: issued by `start_deployment` to order an agent to activate a
/// store path.
#[derive(Debug, Clone, Serialize)]
pub struct Deployment {
    pub agent: String,
    pub command: DeploymentCommand,
    pub id: String,
    pub method: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentCommand {
    pub contents: DeploymentContents,
    pub tag: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentContents {
    pub id: String,
    pub index: u32,
    #[serde(rename = "rollbackScript")]
    pub rollback_script: Option<String>,
    #[serde(rename = "storePath")]
    pub store_path: String,
}

impl Deployment {
    pub fn new(agent_id: &str, deploy_id: &str, store_path: &str) -> Self {
        Self {
            agent: agent_id.to_string(),
            command: DeploymentCommand {
                contents: DeploymentContents {
                    id: deploy_id.to_string(),
                    index: 0,
                    rollback_script: None,
                    store_path: store_path.to_string(),
                },
                tag: "Deployment",
            },
            id: ZERO_UUID.to_string(),
            method: "Deployment",
        }
    }
}

/// Inbound: an agent reporting that a deployment finished.
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentFinished {
    pub method: String,
    pub command: DeploymentFinishedCommand,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentFinishedCommand {
    pub id: String,
    #[serde(rename = "hasSucceeded")]
    pub has_succeeded: bool,
}

pub const DEPLOYMENT_FINISHED_METHOD: &str = "DeploymentFinished";

/// Inbound on the deployment-log channel: one JSON object per log line.
#[derive(Debug, Clone, Deserialize)]
pub struct LogLine {
    pub line: String,
}

pub const LOG_LINE_SUCCESS: &str = "Successfully activated the deployment.";
pub const LOG_LINE_FAILURE_SUBSTR: &str = "Failed to activate the deployment.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_registered_shape() {
        let msg = AgentRegistered::new(
            "agent-1",
            CacheDescriptor {
                cache_name: "c1".into(),
                is_public: true,
                public_key: "c1.host-1:abcd".into(),
            },
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["method"], "AgentRegistered");
        assert_eq!(json["command"]["tag"], "AgentRegistered");
        assert_eq!(json["command"]["contents"]["id"], "agent-1");
        assert_eq!(json["command"]["contents"]["cache"]["cacheName"], "c1");
        assert_eq!(json["id"], ZERO_UUID);
    }

    #[test]
    fn deployment_shape() {
        let msg = Deployment::new("agent-1", "dep-1", "/nix/store/x-y");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["method"], "Deployment");
        assert_eq!(json["command"]["contents"]["storePath"], "/nix/store/x-y");
        assert_eq!(json["command"]["contents"]["index"], 0);
        assert!(json["command"]["contents"]["rollbackScript"].is_null());
    }

    #[test]
    fn deployment_finished_parses() {
        let raw = r#"{"method":"DeploymentFinished","command":{"id":"dep-1","hasSucceeded":true}}"#;
        let parsed: DeploymentFinished = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.method, DEPLOYMENT_FINISHED_METHOD);
        assert_eq!(parsed.command.id, "dep-1");
        assert!(parsed.command.has_succeeded);
    }

    #[test]
    fn log_line_parses() {
        let raw = r#"{"line":"Successfully activated the deployment."}"#;
        let parsed: LogLine = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.line, LOG_LINE_SUCCESS);
    }
}
