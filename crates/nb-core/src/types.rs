//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a node in the registry
///
/// By convention this is `<machine name>-<daemon port>`, generated by the
/// node itself when it self-registers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    /// Create a new node ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A registered node: a remote machine running the agent daemon
///
/// Nodes create this record themselves and POST it to the orchestrator once
/// their daemon is reachable; the provisioning flow only ever observes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    /// Registry key, unique per node
    pub id: NodeId,
    /// Short machine name
    pub name: String,
    /// Base URL at which the daemon is reachable
    pub url: String,
    /// RFC 3339 timestamp of daemon start
    pub started_at: String,
    /// Operating system reported by the daemon
    pub os: String,
    /// CPU architecture reported by the daemon
    pub arch: String,
    /// Version of the daemon binary
    pub daemon_version: String,
    /// Provisioned resource name, when the node knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_name: Option<String>,
}

/// Result of provisioning a machine: the resource name at the backend and
/// the registry id the node registered under
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provisioned {
    pub name: String,
    pub node_id: NodeId,
}

/// Summary of an external compute resource as reported by a backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSummary {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        let id = NodeId::new("nimbus-abc123-8080");
        assert_eq!(format!("{}", id), "nimbus-abc123-8080");
        assert_eq!(id.as_str(), "nimbus-abc123-8080");
    }

    #[test]
    fn test_node_record_wire_format_is_camel_case() {
        let record = NodeRecord {
            id: NodeId::new("host-8080"),
            name: "host".to_string(),
            url: "http://10.0.0.5:8080".to_string(),
            started_at: "2026-02-16T00:00:00Z".to_string(),
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
            daemon_version: "0.1.0".to_string(),
            machine_name: None,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["daemonVersion"], "0.1.0");
        assert_eq!(json["startedAt"], "2026-02-16T00:00:00Z");
        assert!(json.get("machineName").is_none());
    }

    #[test]
    fn test_provisioned_serializes_node_id() {
        let p = Provisioned {
            name: "nimbus-demo".to_string(),
            node_id: NodeId::new("nimbus-demo-8080"),
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["nodeId"], "nimbus-demo-8080");
    }
}
