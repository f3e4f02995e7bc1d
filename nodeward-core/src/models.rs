//! Records fetched from the node agents and the cluster directory.
//!
//! Every record carries the identity of the node (and where relevant the
//! service or workload) it describes, so evaluators can always attribute a
//! degraded judgement.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A cluster node as resolved by the node directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    pub name: String,
    /// Internal address used to target the node's agent
    pub address: String,
    pub roles: BTreeSet<String>,
}

impl NodeRef {
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// One service on one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub host_node: String,
    pub service_id: String,
    pub state: String,
    /// `None` when the service has no health check or has not reported yet
    pub healthy: Option<bool>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub health_message: String,
}

/// Status of one consensus-store member (one per control-plane node)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusMemberStatus {
    pub host_node: String,
    pub member_id: u64,
    /// Leader as seen by this member; `0` means not yet observed
    pub leader_id: u64,
    pub db_size_bytes: i64,
    pub db_size_in_use_bytes: i64,
    pub raft_index: u64,
    pub raft_term: u64,
    pub is_learner: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// An alarm raised by a consensus-store member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusAlarm {
    pub host_node: String,
    pub member_id: u64,
    pub alarm_kind: String,
}

/// The readiness condition of a workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyCondition {
    pub met: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

/// A scheduled unit of work (pod) on a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadRecord {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    /// Kinds of the objects owning this workload (`ReplicaSet`, `Node`, ...)
    #[serde(default)]
    pub owner_kinds: Vec<String>,
    /// `None` when the workload has not reported a readiness condition yet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<ReadyCondition>,
    /// Raw status object as returned by the cluster API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<serde_json::Value>,
}

/// Tri-state status of a node condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    /// Map the cluster API's string form; anything unrecognised is `Unknown`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "True" => Self::True,
            "False" => Self::False,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCondition {
    pub kind: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConditionSet {
    pub node_name: String,
    pub conditions: Vec<NodeCondition>,
}

/// A node together with its reported conditions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDetail {
    #[serde(flatten)]
    pub node: NodeRef,
    pub conditions: Vec<NodeCondition>,
}

impl NodeDetail {
    #[must_use]
    pub fn condition_set(&self) -> NodeConditionSet {
        NodeConditionSet {
            node_name: self.node.name.clone(),
            conditions: self.conditions.clone(),
        }
    }
}

/// A container image present on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub node: String,
    pub name: String,
    pub digest: String,
    /// Human readable size (`83 MB`)
    pub size: String,
    pub size_bytes: i64,
    /// RFC 3339 creation time, empty when unknown
    pub created_at: String,
}

/// Result of comparing a node's clock with a time server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRecord {
    pub node: String,
    pub server: String,
    pub local_time: String,
    pub remote_time: String,
}

/// A typed resource read from one node's agent state
///
/// `spec` is the resource's YAML spec as JSON, so its shape is whatever the
/// agent reports for that resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResource {
    pub node: String,
    pub namespace: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub version: String,
    pub spec: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_status_parse() {
        assert_eq!(ConditionStatus::parse("True"), ConditionStatus::True);
        assert_eq!(ConditionStatus::parse("False"), ConditionStatus::False);
        assert_eq!(ConditionStatus::parse("Unknown"), ConditionStatus::Unknown);
        assert_eq!(ConditionStatus::parse("maybe"), ConditionStatus::Unknown);
    }

    #[test]
    fn test_node_detail_serializes_flat() {
        let detail = NodeDetail {
            node: NodeRef {
                name: "cp-1".to_string(),
                address: "10.0.0.2".to_string(),
                roles: ["control-plane".to_string()].into_iter().collect(),
            },
            conditions: vec![NodeCondition {
                kind: "Ready".to_string(),
                status: ConditionStatus::True,
                reason: "KubeletReady".to_string(),
                message: "kubelet is posting ready status".to_string(),
            }],
        };

        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["name"], "cp-1");
        assert_eq!(json["address"], "10.0.0.2");
        assert_eq!(json["roles"][0], "control-plane");
        assert_eq!(json["conditions"][0]["status"], "True");
        assert!(detail.node.has_role("control-plane"));
    }
}
