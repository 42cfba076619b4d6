//! Group flattening.
//!
//! Group-instance nodes disappear at build time: their internal nodes and
//! edges are inlined into the main arrays under namespaced ids, and every
//! external edge touching a group port is rewired to the mapped internal
//! port. The runtime only ever sees the flattened graph; `GroupMeta` stays
//! around for diagnostics and the editor.

use std::collections::BTreeMap;

use patchwire_types::{
    EdgeId, EdgeRecord, GraphSnapshot, GroupDefinition, GroupId, NodeId, NodeRecord, PortRef,
};

use super::{BuildError, BuildErrorCode};
use crate::registry::GROUP_TYPE;

/// Diagnostic record of one flattened group instance.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMeta {
    pub group: GroupId,
    /// Namespaced ids of the inlined internal nodes.
    pub node_ids: Vec<NodeId>,
    /// Internal ports the external signal inputs map to, in slot order.
    pub external_inputs: Vec<PortRef>,
    /// Internal ports the external outputs map to, in slot order.
    pub external_outputs: Vec<PortRef>,
    /// Internal ports the external controls map to, in slot order.
    pub controls: Vec<PortRef>,
}

/// A snapshot with all group instances inlined, plus per-instance metadata
/// and the mapping from namespaced internal edge ids back to their group.
#[derive(Debug, Default)]
pub struct Flattened {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
    /// Instance node id -> meta.
    pub groups: BTreeMap<NodeId, GroupMeta>,
    /// Namespaced internal edge id -> (group id, original internal edge id).
    pub internal_edges: BTreeMap<EdgeId, (GroupId, EdgeId)>,
}

fn ns_node(instance: &NodeId, internal: &NodeId) -> NodeId {
    NodeId::new(format!("{}/{}", instance, internal))
}

fn ns_edge(instance: &NodeId, internal: &EdgeId) -> EdgeId {
    EdgeId::new(format!("{}/{}", instance, internal))
}

fn mapping_error(node: &NodeId, message: impl Into<String>) -> BuildError {
    BuildError {
        code: BuildErrorCode::GroupMappingInvalid,
        entity: node.to_string(),
        message: message.into(),
    }
}

/// Inline every group instance. Collects mapping errors instead of
/// stopping; callers decide whether the whole build fails.
pub fn flatten(snapshot: &GraphSnapshot, errors: &mut Vec<BuildError>) -> Flattened {
    let mut out = Flattened::default();

    // Pass 1: copy plain nodes, inline group internals.
    for node in &snapshot.nodes {
        if node.node_type != GROUP_TYPE {
            out.nodes.push(node.clone());
            continue;
        }
        let resolved = node
            .group_ref
            .clone()
            .and_then(|gid| snapshot.groups.get(&gid).map(|def| (gid, def)));
        let Some((gid, def)) = resolved else {
            errors.push(mapping_error(
                &node.id,
                "group node without a resolvable group definition",
            ));
            continue;
        };
        inline_instance(node, gid, def, &mut out, errors);
    }

    // Pass 2: copy top-level edges, rewiring group endpoints.
    for edge in &snapshot.edges {
        match rewire_edge(edge, snapshot) {
            Ok(rewired) => out.edges.push(rewired),
            Err(e) => errors.push(e),
        }
    }

    out
}

fn inline_instance(
    instance: &NodeRecord,
    gid: GroupId,
    def: &GroupDefinition,
    out: &mut Flattened,
    errors: &mut Vec<BuildError>,
) {
    let mut meta = GroupMeta {
        group: gid.clone(),
        node_ids: Vec::with_capacity(def.nodes.len()),
        external_inputs: Vec::with_capacity(def.inputs.len()),
        external_outputs: Vec::with_capacity(def.outputs.len()),
        controls: Vec::with_capacity(def.controls.len()),
    };

    for internal in &def.nodes {
        if internal.node_type == GROUP_TYPE {
            errors.push(mapping_error(
                &instance.id,
                format!("group '{}' nests group node '{}'", gid, internal.id),
            ));
            continue;
        }
        let mut copy = internal.clone();
        copy.id = ns_node(&instance.id, &internal.id);
        meta.node_ids.push(copy.id.clone());
        out.nodes.push(copy);
    }

    for internal in &def.edges {
        let id = ns_edge(&instance.id, &internal.id);
        out.internal_edges
            .insert(id.clone(), (gid.clone(), internal.id.clone()));
        out.edges.push(EdgeRecord {
            id,
            from: PortRef::new(ns_node(&instance.id, &internal.from.node), internal.from.slot),
            to: PortRef::new(ns_node(&instance.id, &internal.to.node), internal.to.slot),
            corners: internal.corners.clone(),
        });
    }

    for m in &def.inputs {
        meta.external_inputs
            .push(PortRef::new(ns_node(&instance.id, &m.node), m.slot));
    }
    for m in &def.outputs {
        meta.external_outputs
            .push(PortRef::new(ns_node(&instance.id, &m.node), m.slot));
    }
    for m in &def.controls {
        meta.controls
            .push(PortRef::new(ns_node(&instance.id, &m.node), m.slot));
    }

    out.groups.insert(instance.id.clone(), meta);
}

/// Rewire one top-level edge endpoint-by-endpoint.
fn rewire_edge(edge: &EdgeRecord, snapshot: &GraphSnapshot) -> Result<EdgeRecord, BuildError> {
    let mut rewired = edge.clone();

    if let Some((instance, def)) = group_instance(&edge.from.node, snapshot) {
        let slot = edge.from.slot;
        let m = def.outputs.get(slot).ok_or_else(|| {
            mapping_error(
                &instance.id,
                format!("edge '{}' leaves unmapped group output slot {}", edge.id, slot),
            )
        })?;
        rewired.from = PortRef::new(ns_node(&instance.id, &m.node), m.slot);
    }

    if let Some((instance, def)) = group_instance(&edge.to.node, snapshot) {
        let slot = edge.to.slot;
        let m = if slot < def.inputs.len() {
            &def.inputs[slot]
        } else if slot < def.inputs.len() + def.controls.len() {
            &def.controls[slot - def.inputs.len()]
        } else {
            return Err(mapping_error(
                &instance.id,
                format!("edge '{}' enters unmapped group input slot {}", edge.id, slot),
            ));
        };
        rewired.to = PortRef::new(ns_node(&instance.id, &m.node), m.slot);
    }

    Ok(rewired)
}

fn group_instance<'a>(
    node_id: &NodeId,
    snapshot: &'a GraphSnapshot,
) -> Option<(&'a NodeRecord, &'a GroupDefinition)> {
    let node = snapshot.node(node_id)?;
    if node.node_type != GROUP_TYPE {
        return None;
    }
    let def = node.group_ref.as_ref()?;
    snapshot.groups.get(def).map(|d| (node, d))
}
