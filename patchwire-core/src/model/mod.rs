//! Authoritative graph state with transactional edits.
//!
//! `GraphModel` is the single writer. Edits arrive as op batches and apply
//! all-or-nothing: every op is validated and applied against a scratch copy
//! first, and the copy replaces the live state only when the whole batch
//! succeeds. Indices are rebuilt inside the same commit, and the committed
//! batch is appended to the op log for subscribers.

mod indices;
mod oplog;
mod validate;

pub use indices::GraphIndexes;
pub use oplog::{OpBatch, OpLogReader, OpLogWriter};

use patchwire_types::{ApplyResult, GraphOp, GraphSnapshot, NodeRecord};

use crate::registry::{NodeLayout, Registry};

/// The canonical topology/geometry store.
#[derive(Default)]
pub struct GraphModel {
    state: GraphSnapshot,
    indexes: GraphIndexes,
    op_log: OpLogWriter,
}

impl GraphModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the model to a loaded snapshot (project load). Indices are
    /// rebuilt; the op log is notified with an empty batch so subscribers
    /// know to re-pull.
    pub fn reset(&mut self, snapshot: GraphSnapshot) {
        self.state = snapshot;
        self.indexes = GraphIndexes::rebuild(&self.state);
        self.op_log.append(Vec::new());
    }

    /// Apply a batch of ops. All-or-nothing: on any validation failure the
    /// model is untouched and every failing op is reported.
    pub fn apply_ops(&mut self, registry: &Registry, ops: &[GraphOp]) -> ApplyResult {
        if ops.is_empty() {
            return ApplyResult::committed(false);
        }

        let mut working = self.state.clone();
        let mut errors = Vec::new();
        for (index, op) in ops.iter().enumerate() {
            if let Err(e) = validate::apply_op(&mut working, registry, index, op) {
                log::warn!(
                    target: "model",
                    "op {} ({}) rejected: {} {}",
                    e.index,
                    e.op,
                    e.code.as_str(),
                    e.message
                );
                errors.push(e);
                // Later ops may fail only because this one did not apply;
                // stop at the first structural failure.
                break;
            }
        }

        if !errors.is_empty() {
            return ApplyResult::rejected(errors);
        }

        self.state = working;
        self.indexes = GraphIndexes::rebuild(&self.state);
        self.op_log.append(ops.to_vec());
        ApplyResult::committed(true)
    }

    /// Ordered clone of the current state.
    pub fn snapshot(&self) -> GraphSnapshot {
        self.state.clone()
    }

    /// Borrow the current state without cloning.
    pub fn state(&self) -> &GraphSnapshot {
        &self.state
    }

    /// Always-consistent indices over the current state.
    pub fn indices(&self) -> &GraphIndexes {
        &self.indexes
    }

    /// Subscribe to committed op batches.
    pub fn subscribe(&mut self) -> OpLogReader {
        self.op_log.subscribe()
    }

    /// Retained history of committed batches.
    pub fn op_history(&self) -> &[std::sync::Arc<OpBatch>] {
        self.op_log.history()
    }

    /// Derive the port layout of a node in the current state.
    pub fn node_layout(
        &self,
        registry: &Registry,
        node: &NodeRecord,
    ) -> Result<NodeLayout, String> {
        validate::layout_of(&self.state, registry, node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchwire_types::{
        EdgeId, EdgeRecord, GridPoint, GroupDefinition, GroupId, ModelErrorCode, NodeId,
        PortRef, Rotation,
    };

    fn registry() -> Registry {
        Registry::with_builtins().unwrap()
    }

    fn add_node(id: &str, node_type: &str, x: i64, y: i64) -> GraphOp {
        GraphOp::AddNode(NodeRecord {
            id: NodeId::new(id),
            node_type: node_type.into(),
            pos: GridPoint::new(x, y),
            rotation: Rotation::R0,
            param: None,
            name: None,
            group_ref: None,
        })
    }

    fn add_edge(id: &str, from: (&str, usize), to: (&str, usize)) -> GraphOp {
        GraphOp::AddEdge(EdgeRecord {
            id: EdgeId::new(id),
            from: PortRef::new(NodeId::new(from.0), from.1),
            to: PortRef::new(NodeId::new(to.0), to.1),
            corners: vec![],
        })
    }

    #[test]
    fn batch_commits_in_order() {
        let reg = registry();
        let mut model = GraphModel::new();
        let result = model.apply_ops(
            &reg,
            &[
                add_node("p", "pulse", 0, 0),
                add_node("o", "output", 6, 0),
                add_edge("e", ("p", 0), ("o", 0)),
            ],
        );
        assert!(result.ok);
        assert!(result.changed);
        assert_eq!(model.state().nodes.len(), 2);
        assert_eq!(model.state().edges.len(), 1);
        assert_eq!(model.indices().edges_of(&NodeId::new("p")), &[EdgeId::new("e")]);
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let reg = registry();
        let mut model = GraphModel::new();
        let result = model.apply_ops(
            &reg,
            &[
                add_node("p", "pulse", 0, 0),
                add_node("p", "pulse", 1, 1), // duplicate id
            ],
        );
        assert!(!result.ok);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].index, 1);
        assert_eq!(result.errors[0].code, ModelErrorCode::DuplicateId);
        // nothing applied
        assert!(model.state().nodes.is_empty());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let reg = registry();
        let mut model = GraphModel::new();
        let result = model.apply_ops(&reg, &[add_node("x", "warble", 0, 0)]);
        assert_eq!(result.errors[0].code, ModelErrorCode::UnknownNodeType);
    }

    #[test]
    fn port_exclusivity_is_enforced() {
        let reg = registry();
        let mut model = GraphModel::new();
        assert!(model
            .apply_ops(
                &reg,
                &[
                    add_node("p", "pulse", 0, 0),
                    add_node("a", "output", 6, 0),
                    add_node("b", "output", 6, 4),
                    add_edge("e1", ("p", 0), ("a", 0)),
                ],
            )
            .ok);
        let result = model.apply_ops(&reg, &[add_edge("e2", ("p", 0), ("b", 0))]);
        assert_eq!(result.errors[0].code, ModelErrorCode::PortAlreadyConnected);
    }

    #[test]
    fn sink_cannot_be_a_source() {
        let reg = registry();
        let mut model = GraphModel::new();
        let result = model.apply_ops(
            &reg,
            &[
                add_node("a", "output", 0, 0),
                add_node("b", "output", 6, 0),
                add_edge("e", ("a", 0), ("b", 0)),
            ],
        );
        assert_eq!(
            result.errors[0].code,
            ModelErrorCode::EdgeDirectionInvalid
        );
    }

    #[test]
    fn remove_node_cascades_edges() {
        let reg = registry();
        let mut model = GraphModel::new();
        model.apply_ops(
            &reg,
            &[
                add_node("p", "pulse", 0, 0),
                add_node("o", "output", 6, 0),
                add_edge("e", ("p", 0), ("o", 0)),
            ],
        );
        let result = model.apply_ops(&reg, &[GraphOp::RemoveNode { id: NodeId::new("p") }]);
        assert!(result.ok);
        assert!(model.state().edges.is_empty());
        assert!(model.indices().port_to_edge.is_empty());
        assert!(model.indices().edges_of(&NodeId::new("o")).is_empty());
    }

    #[test]
    fn rotation_validation() {
        let reg = registry();
        let mut model = GraphModel::new();
        model.apply_ops(&reg, &[add_node("p", "pulse", 0, 0)]);
        let bad = model.apply_ops(
            &reg,
            &[GraphOp::RotateNode {
                id: NodeId::new("p"),
                rotation: 45,
            }],
        );
        assert_eq!(bad.errors[0].code, ModelErrorCode::InvalidRotation);
        let good = model.apply_ops(
            &reg,
            &[GraphOp::RotateNode {
                id: NodeId::new("p"),
                rotation: 270,
            }],
        );
        assert!(good.ok);
        assert_eq!(model.state().nodes[0].rotation, Rotation::R270);
    }

    #[test]
    fn corners_validate_indices() {
        let reg = registry();
        let mut model = GraphModel::new();
        model.apply_ops(
            &reg,
            &[
                add_node("p", "pulse", 0, 0),
                add_node("o", "output", 6, 0),
                add_edge("e", ("p", 0), ("o", 0)),
            ],
        );
        let bad = model.apply_ops(
            &reg,
            &[GraphOp::AddCorner {
                edge: EdgeId::new("e"),
                index: 3,
                pos: GridPoint::new(3, 3),
            }],
        );
        assert_eq!(bad.errors[0].code, ModelErrorCode::CornerIndexInvalid);
        let good = model.apply_ops(
            &reg,
            &[
                GraphOp::AddCorner {
                    edge: EdgeId::new("e"),
                    index: 0,
                    pos: GridPoint::new(3, 3),
                },
                GraphOp::MoveCorner {
                    edge: EdgeId::new("e"),
                    index: 0,
                    pos: GridPoint::new(3, 2),
                },
            ],
        );
        assert!(good.ok);
        assert_eq!(model.state().edges[0].corners, vec![GridPoint::new(3, 2)]);
    }

    #[test]
    fn group_lifecycle() {
        let reg = registry();
        let mut model = GraphModel::new();
        let gid = GroupId::new("g1");
        assert!(model
            .apply_ops(
                &reg,
                &[GraphOp::AddGroup {
                    id: gid.clone(),
                    def: GroupDefinition::default(),
                }],
            )
            .ok);

        // Group node referencing the definition.
        let mut rec = NodeRecord {
            id: NodeId::new("gn"),
            node_type: "group".into(),
            pos: GridPoint::new(0, 0),
            rotation: Rotation::R0,
            param: None,
            name: None,
            group_ref: Some(gid.clone()),
        };
        assert!(model.apply_ops(&reg, &[GraphOp::AddNode(rec.clone())]).ok);

        // Removing a referenced group is rejected.
        let blocked = model.apply_ops(&reg, &[GraphOp::RemoveGroup { id: gid.clone() }]);
        assert_eq!(blocked.errors[0].code, ModelErrorCode::GroupRefInvalid);

        // A group node without a ref is rejected outright.
        rec.id = NodeId::new("gn2");
        rec.group_ref = None;
        let bad = model.apply_ops(&reg, &[GraphOp::AddNode(rec)]);
        assert_eq!(bad.errors[0].code, ModelErrorCode::GroupRefInvalid);

        // Remove instance, then the group goes away cleanly.
        assert!(model
            .apply_ops(&reg, &[GraphOp::RemoveNode { id: NodeId::new("gn") }])
            .ok);
        assert!(model.apply_ops(&reg, &[GraphOp::RemoveGroup { id: gid }]).ok);
    }

    #[test]
    fn op_log_sees_committed_batches_only() {
        let reg = registry();
        let mut model = GraphModel::new();
        let reader = model.subscribe();

        model.apply_ops(&reg, &[add_node("p", "pulse", 0, 0)]);
        model.apply_ops(&reg, &[add_node("p", "pulse", 0, 0)]); // rejected duplicate

        let batches = reader.drain();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].ops.len(), 1);
    }
}
