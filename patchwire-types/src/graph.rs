//! Graph records: nodes, edges, groups, and the snapshot they form.
//!
//! These are the persisted shapes. Ports are never stored; they are derived
//! from node + registry layout on demand, so the only port-shaped type here
//! is the reference an edge endpoint carries and the key the model indexes
//! ports by.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::geometry::{GridPoint, PortDirection, Rotation};
use crate::{EdgeId, GroupId, NodeId};

/// A node as stored in the model and in the project file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: NodeId,
    /// Registry type key, kebab-case.
    #[serde(rename = "type")]
    pub node_type: String,
    pub pos: GridPoint,
    #[serde(default)]
    pub rotation: Rotation,
    /// Snapshot override for the node's single `param`; the registry default
    /// applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<u8>,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Set on group-instance nodes; links to the group definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_ref: Option<GroupId>,
}

/// A directed edge endpoint: a node plus a slot index into its output
/// (for `from`) or input (for `to`) port list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub node: NodeId,
    pub slot: usize,
}

impl PortRef {
    pub fn new(node: NodeId, slot: usize) -> Self {
        Self { node, slot }
    }
}

/// An edge as stored in the model and in the project file.
/// Direction is always output -> input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRecord {
    pub id: EdgeId,
    pub from: PortRef,
    pub to: PortRef,
    /// Manual corners, in order from `from` to `to`. Hard routing
    /// constraints on integer grid intersections.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corners: Vec<GridPoint>,
}

/// Maps one external slot of a group node to an internal port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPortMap {
    pub node: NodeId,
    pub slot: usize,
}

/// A user-defined subgraph exposed through mapped ports.
/// The internal sub-snapshot may not itself contain group nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDefinition {
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
    /// External signal inputs, in slot order.
    #[serde(default)]
    pub inputs: Vec<GroupPortMap>,
    /// External outputs, in slot order.
    #[serde(default)]
    pub outputs: Vec<GroupPortMap>,
    /// External control inputs, appended after signal inputs in slot order.
    #[serde(default)]
    pub controls: Vec<GroupPortMap>,
}

/// Ordered clone of the model's contents. Array order is insertion order and
/// is preserved through persistence; edge order doubles as the scheduling
/// tie-break order within a tick.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<GroupId, GroupDefinition>,
}

impl GraphSnapshot {
    pub fn node(&self, id: &NodeId) -> Option<&NodeRecord> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&EdgeRecord> {
        self.edges.iter().find(|e| &e.id == id)
    }
}

/// Identity of a derived port: `(node, direction, slot)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortKey {
    pub node: NodeId,
    pub direction: PortDirection,
    pub slot: usize,
}

impl PortKey {
    pub fn new(node: NodeId, direction: PortDirection, slot: usize) -> Self {
        Self {
            node,
            direction,
            slot,
        }
    }
}

/// Role an edge plays in the runtime, derived at build time from the port
/// roles at both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeRole {
    Signal,
    Control,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> NodeRecord {
        NodeRecord {
            id: NodeId::new(id),
            node_type: "pulse".into(),
            pos: GridPoint::new(2, 3),
            rotation: Rotation::R0,
            param: None,
            name: None,
            group_ref: None,
        }
    }

    #[test]
    fn node_record_json_shape() {
        let json = serde_json::to_value(node("n1")).unwrap();
        assert_eq!(json["id"], "n1");
        assert_eq!(json["type"], "pulse");
        assert_eq!(json["pos"]["x"], 2);
        assert_eq!(json["rotation"], 0);
        // absent optionals are omitted entirely
        assert!(json.get("param").is_none());
        assert!(json.get("groupRef").is_none());
    }

    #[test]
    fn edge_record_roundtrip() {
        let edge = EdgeRecord {
            id: EdgeId::new("e1"),
            from: PortRef::new(NodeId::new("a"), 0),
            to: PortRef::new(NodeId::new("b"), 1),
            corners: vec![GridPoint::new(4, 4)],
        };
        let json = serde_json::to_string(&edge).unwrap();
        let back: EdgeRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, edge);
    }

    #[test]
    fn snapshot_lookup() {
        let snap = GraphSnapshot {
            nodes: vec![node("n1"), node("n2")],
            edges: vec![],
            groups: BTreeMap::new(),
        };
        assert!(snap.node(&NodeId::new("n2")).is_some());
        assert!(snap.node(&NodeId::new("zz")).is_none());
    }
}
