//! Per-op validation and application against a working snapshot.
//!
//! Each op is checked and applied sequentially on a scratch copy of the
//! model, so later ops in a batch can reference entities earlier ops
//! created. A failure anywhere rejects the whole batch.

use patchwire_types::{
    EdgeRecord, GraphOp, GraphSnapshot, GroupDefinition, ModelErrorCode, NodeId, NodeRecord,
    OpError, Rotation, STEP_MAX, STEP_MIN,
};

use crate::registry::{NodeLayout, Registry, GROUP_TYPE};

fn err(
    index: usize,
    op: &GraphOp,
    entity: Option<String>,
    code: ModelErrorCode,
    message: impl Into<String>,
) -> OpError {
    OpError {
        index,
        op: op.kind(),
        entity,
        code,
        message: message.into(),
    }
}

/// Derive the layout of a node in the working snapshot.
pub(super) fn layout_of(
    working: &GraphSnapshot,
    registry: &Registry,
    node: &NodeRecord,
) -> Result<NodeLayout, String> {
    let def = registry
        .get(&node.node_type)
        .ok_or_else(|| format!("unknown node type '{}'", node.node_type))?;
    let group = node
        .group_ref
        .as_ref()
        .and_then(|gid| working.groups.get(gid));
    def.node_layout(group)
}

fn require_node<'a>(
    working: &'a GraphSnapshot,
    id: &NodeId,
    index: usize,
    op: &GraphOp,
) -> Result<&'a NodeRecord, OpError> {
    working.node(id).ok_or_else(|| {
        err(
            index,
            op,
            Some(id.to_string()),
            ModelErrorCode::UnknownEntity,
            format!("node '{}' does not exist", id),
        )
    })
}

fn node_mut<'a>(
    working: &'a mut GraphSnapshot,
    id: &NodeId,
    index: usize,
    op: &GraphOp,
) -> Result<&'a mut NodeRecord, OpError> {
    let message = format!("node '{}' does not exist", id);
    working.nodes.iter_mut().find(|n| n.id == *id).ok_or_else(|| {
        err(
            index,
            op,
            Some(id.to_string()),
            ModelErrorCode::UnknownEntity,
            message,
        )
    })
}

fn validate_group_def(
    def: &GroupDefinition,
    registry: &Registry,
    index: usize,
    op: &GraphOp,
) -> Result<(), OpError> {
    for node in &def.nodes {
        if node.node_type == GROUP_TYPE {
            return Err(err(
                index,
                op,
                Some(node.id.to_string()),
                ModelErrorCode::GroupRefInvalid,
                "group definitions may not nest group nodes",
            ));
        }
        if !registry.contains(&node.node_type) {
            return Err(err(
                index,
                op,
                Some(node.id.to_string()),
                ModelErrorCode::UnknownNodeType,
                format!("unknown node type '{}' inside group", node.node_type),
            ));
        }
    }
    Ok(())
}

/// Validate and apply one op to the working snapshot.
pub(super) fn apply_op(
    working: &mut GraphSnapshot,
    registry: &Registry,
    index: usize,
    op: &GraphOp,
) -> Result<(), OpError> {
    match op {
        GraphOp::AddNode(node) => {
            if working.node(&node.id).is_some() {
                return Err(err(
                    index,
                    op,
                    Some(node.id.to_string()),
                    ModelErrorCode::DuplicateId,
                    format!("node id '{}' already exists", node.id),
                ));
            }
            if !registry.contains(&node.node_type) {
                return Err(err(
                    index,
                    op,
                    Some(node.id.to_string()),
                    ModelErrorCode::UnknownNodeType,
                    format!("unknown node type '{}'", node.node_type),
                ));
            }
            if let Some(gid) = &node.group_ref {
                if !working.groups.contains_key(gid) {
                    return Err(err(
                        index,
                        op,
                        Some(node.id.to_string()),
                        ModelErrorCode::GroupRefInvalid,
                        format!("group '{}' does not exist", gid),
                    ));
                }
            } else if node.node_type == GROUP_TYPE {
                return Err(err(
                    index,
                    op,
                    Some(node.id.to_string()),
                    ModelErrorCode::GroupRefInvalid,
                    "group nodes must carry a groupRef",
                ));
            }
            if let Some(p) = node.param {
                if !(STEP_MIN..=STEP_MAX).contains(&p) {
                    return Err(err(
                        index,
                        op,
                        Some(node.id.to_string()),
                        ModelErrorCode::InvalidParam,
                        format!("param {} outside 1..=8", p),
                    ));
                }
            }
            working.nodes.push(node.clone());
            Ok(())
        }

        GraphOp::RemoveNode { id } => {
            require_node(working, id, index, op)?;
            // Cascade: incident edges go first.
            working
                .edges
                .retain(|e| e.from.node != *id && e.to.node != *id);
            working.nodes.retain(|n| n.id != *id);
            Ok(())
        }

        GraphOp::MoveNode { id, pos } => {
            let node = node_mut(working, id, index, op)?;
            node.pos = *pos;
            Ok(())
        }

        GraphOp::RotateNode { id, rotation } => {
            let rot = Rotation::try_from(*rotation).map_err(|e| {
                err(
                    index,
                    op,
                    Some(id.to_string()),
                    ModelErrorCode::InvalidRotation,
                    e,
                )
            })?;
            let node = node_mut(working, id, index, op)?;
            node.rotation = rot;
            Ok(())
        }

        GraphOp::SetParam { id, param } => {
            if !(STEP_MIN..=STEP_MAX).contains(param) {
                return Err(err(
                    index,
                    op,
                    Some(id.to_string()),
                    ModelErrorCode::InvalidParam,
                    format!("param {} outside 1..=8", param),
                ));
            }
            let node = node_mut(working, id, index, op)?;
            node.param = Some(*param);
            Ok(())
        }

        GraphOp::RenameNode { id, name } => {
            let node = node_mut(working, id, index, op)?;
            node.name = name.clone();
            Ok(())
        }

        GraphOp::AddEdge(edge) => {
            validate_new_edge(working, registry, edge, index, op)?;
            working.edges.push(edge.clone());
            Ok(())
        }

        GraphOp::RemoveEdge { id } => {
            if working.edge(id).is_none() {
                return Err(err(
                    index,
                    op,
                    Some(id.to_string()),
                    ModelErrorCode::UnknownEntity,
                    format!("edge '{}' does not exist", id),
                ));
            }
            working.edges.retain(|e| e.id != *id);
            Ok(())
        }

        GraphOp::AddCorner { edge, index: at, pos } => {
            let record = require_edge_mut(working, edge, index, op)?;
            if *at > record.corners.len() {
                return Err(err(
                    index,
                    op,
                    Some(edge.to_string()),
                    ModelErrorCode::CornerIndexInvalid,
                    format!("corner index {} out of range", at),
                ));
            }
            record.corners.insert(*at, *pos);
            Ok(())
        }

        GraphOp::MoveCorner { edge, index: at, pos } => {
            let record = require_edge_mut(working, edge, index, op)?;
            match record.corners.get_mut(*at) {
                Some(corner) => {
                    *corner = *pos;
                    Ok(())
                }
                None => Err(err(
                    index,
                    op,
                    Some(edge.to_string()),
                    ModelErrorCode::CornerIndexInvalid,
                    format!("corner index {} out of range", at),
                )),
            }
        }

        GraphOp::RemoveCorner { edge, index: at } => {
            let record = require_edge_mut(working, edge, index, op)?;
            if *at >= record.corners.len() {
                return Err(err(
                    index,
                    op,
                    Some(edge.to_string()),
                    ModelErrorCode::CornerIndexInvalid,
                    format!("corner index {} out of range", at),
                ));
            }
            record.corners.remove(*at);
            Ok(())
        }

        GraphOp::AddGroup { id, def } => {
            if working.groups.contains_key(id) {
                return Err(err(
                    index,
                    op,
                    Some(id.to_string()),
                    ModelErrorCode::DuplicateId,
                    format!("group id '{}' already exists", id),
                ));
            }
            validate_group_def(def, registry, index, op)?;
            working.groups.insert(id.clone(), def.clone());
            Ok(())
        }

        GraphOp::RemoveGroup { id } => {
            if !working.groups.contains_key(id) {
                return Err(err(
                    index,
                    op,
                    Some(id.to_string()),
                    ModelErrorCode::UnknownEntity,
                    format!("group '{}' does not exist", id),
                ));
            }
            if let Some(user) = working
                .nodes
                .iter()
                .find(|n| n.group_ref.as_ref() == Some(id))
            {
                return Err(err(
                    index,
                    op,
                    Some(id.to_string()),
                    ModelErrorCode::GroupRefInvalid,
                    format!("group '{}' is still referenced by node '{}'", id, user.id),
                ));
            }
            working.groups.remove(id);
            Ok(())
        }
    }
}

fn require_edge_mut<'a>(
    working: &'a mut GraphSnapshot,
    id: &patchwire_types::EdgeId,
    index: usize,
    op: &GraphOp,
) -> Result<&'a mut EdgeRecord, OpError> {
    let message = format!("edge '{}' does not exist", id);
    working.edges.iter_mut().find(|e| e.id == *id).ok_or_else(|| {
        err(
            index,
            op,
            Some(id.to_string()),
            ModelErrorCode::UnknownEntity,
            message,
        )
    })
}

fn validate_new_edge(
    working: &GraphSnapshot,
    registry: &Registry,
    edge: &EdgeRecord,
    index: usize,
    op: &GraphOp,
) -> Result<(), OpError> {
    if working.edge(&edge.id).is_some() {
        return Err(err(
            index,
            op,
            Some(edge.id.to_string()),
            ModelErrorCode::DuplicateId,
            format!("edge id '{}' already exists", edge.id),
        ));
    }

    let from_node = working.node(&edge.from.node).ok_or_else(|| {
        err(
            index,
            op,
            Some(edge.id.to_string()),
            ModelErrorCode::EdgeDanglingEndpoint,
            format!("source node '{}' does not exist", edge.from.node),
        )
    })?;
    let to_node = working.node(&edge.to.node).ok_or_else(|| {
        err(
            index,
            op,
            Some(edge.id.to_string()),
            ModelErrorCode::EdgeDanglingEndpoint,
            format!("target node '{}' does not exist", edge.to.node),
        )
    })?;

    let from_layout = layout_of(working, registry, from_node).map_err(|e| {
        err(
            index,
            op,
            Some(edge.id.to_string()),
            ModelErrorCode::PortInvalid,
            e,
        )
    })?;
    let to_layout = layout_of(working, registry, to_node).map_err(|e| {
        err(
            index,
            op,
            Some(edge.id.to_string()),
            ModelErrorCode::PortInvalid,
            e,
        )
    })?;

    // A sink used as a source (or vice versa) is a direction error; a slot
    // beyond the port list is a range error.
    if from_layout.outputs.is_empty() {
        return Err(err(
            index,
            op,
            Some(edge.id.to_string()),
            ModelErrorCode::EdgeDirectionInvalid,
            format!("node '{}' has no outputs", edge.from.node),
        ));
    }
    if to_layout.inputs.is_empty() {
        return Err(err(
            index,
            op,
            Some(edge.id.to_string()),
            ModelErrorCode::EdgeDirectionInvalid,
            format!("node '{}' has no inputs", edge.to.node),
        ));
    }
    if edge.from.slot >= from_layout.outputs.len() {
        return Err(err(
            index,
            op,
            Some(edge.id.to_string()),
            ModelErrorCode::PortInvalid,
            format!(
                "output slot {} out of range for '{}'",
                edge.from.slot, edge.from.node
            ),
        ));
    }
    if edge.to.slot >= to_layout.inputs.len() {
        return Err(err(
            index,
            op,
            Some(edge.id.to_string()),
            ModelErrorCode::PortInvalid,
            format!(
                "input slot {} out of range for '{}'",
                edge.to.slot, edge.to.node
            ),
        ));
    }

    // One edge per directed port.
    for other in &working.edges {
        if other.from == edge.from {
            return Err(err(
                index,
                op,
                Some(edge.id.to_string()),
                ModelErrorCode::PortAlreadyConnected,
                format!(
                    "output {}:{} already feeds edge '{}'",
                    edge.from.node, edge.from.slot, other.id
                ),
            ));
        }
        if other.to == edge.to {
            return Err(err(
                index,
                op,
                Some(edge.id.to_string()),
                ModelErrorCode::PortAlreadyConnected,
                format!(
                    "input {}:{} already fed by edge '{}'",
                    edge.to.node, edge.to.slot, other.id
                ),
            ));
        }
    }

    Ok(())
}
