//! Derived lookup indices over the model's records.
//!
//! Rebuilt inside every committed transaction, so consumers always see a
//! consistent view; there is no lazy path.

use std::collections::HashMap;

use patchwire_types::{EdgeId, GraphSnapshot, NodeId, PortDirection, PortKey};

/// Always-current indices over nodes and edges.
#[derive(Debug, Clone, Default)]
pub struct GraphIndexes {
    /// Node id -> position in the node array.
    pub node_by_id: HashMap<NodeId, usize>,
    /// Edge id -> position in the edge array.
    pub edge_by_id: HashMap<EdgeId, usize>,
    /// Directed port -> the single edge occupying it.
    pub port_to_edge: HashMap<PortKey, EdgeId>,
    /// Node id -> incident edges, preserving edge insertion order.
    pub edges_by_node: HashMap<NodeId, Vec<EdgeId>>,
}

impl GraphIndexes {
    pub fn rebuild(snapshot: &GraphSnapshot) -> Self {
        let mut idx = GraphIndexes::default();
        for (i, node) in snapshot.nodes.iter().enumerate() {
            idx.node_by_id.insert(node.id.clone(), i);
            idx.edges_by_node.entry(node.id.clone()).or_default();
        }
        for (i, edge) in snapshot.edges.iter().enumerate() {
            idx.edge_by_id.insert(edge.id.clone(), i);
            idx.port_to_edge.insert(
                PortKey::new(edge.from.node.clone(), PortDirection::Output, edge.from.slot),
                edge.id.clone(),
            );
            idx.port_to_edge.insert(
                PortKey::new(edge.to.node.clone(), PortDirection::Input, edge.to.slot),
                edge.id.clone(),
            );
            idx.edges_by_node
                .entry(edge.from.node.clone())
                .or_default()
                .push(edge.id.clone());
            if edge.to.node != edge.from.node {
                idx.edges_by_node
                    .entry(edge.to.node.clone())
                    .or_default()
                    .push(edge.id.clone());
            }
        }
        idx
    }

    /// The edge occupying a directed port, if any.
    pub fn edge_at_port(&self, key: &PortKey) -> Option<&EdgeId> {
        self.port_to_edge.get(key)
    }

    /// Edges incident to a node, in edge insertion order.
    pub fn edges_of(&self, node: &NodeId) -> &[EdgeId] {
        self.edges_by_node
            .get(node)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}
