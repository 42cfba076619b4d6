//! Build & compile: fuse snapshot + registry + delays into a runtime-ready
//! graph.
//!
//! Build is pure and non-fatal: it never mutates the editor graph, collects
//! every error instead of failing fast, and produces either a complete
//! `CompiledGraph` or none at all. Callers keep their last valid graph when
//! a build fails.

mod flatten;

pub use flatten::{Flattened, GroupMeta};

use std::collections::{BTreeMap, HashMap};

use patchwire_types::{
    clamp_step, EdgeId, EdgeRole, GraphSnapshot, GroupId, NodeId, PortDirection, PortKey,
    PortRef,
};

use crate::registry::{NodeState, PortRole, Registry};
use crate::routing::{route_edges, route_groups, RouteCache, RoutingConfig, RoutingResult};

/// Stable build error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildErrorCode {
    UnknownNodeType,
    PortSlotInvalid,
    SameDirection,
    RoleMismatch,
    PortAlreadyConnected,
    MissingDelay,
    GroupMappingInvalid,
}

impl BuildErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildErrorCode::UnknownNodeType => "BUILD_UNKNOWN_NODE_TYPE",
            BuildErrorCode::PortSlotInvalid => "BUILD_PORT_SLOT_INVALID",
            BuildErrorCode::SameDirection => "BUILD_SAME_DIRECTION",
            BuildErrorCode::RoleMismatch => "BUILD_ROLE_MISMATCH",
            BuildErrorCode::PortAlreadyConnected => "BUILD_PORT_ALREADY_CONNECTED",
            BuildErrorCode::MissingDelay => "BUILD_MISSING_DELAY",
            BuildErrorCode::GroupMappingInvalid => "BUILD_GROUP_MAPPING_INVALID",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildError {
    pub code: BuildErrorCode,
    /// Node or edge id the error refers to.
    pub entity: String,
    pub message: String,
}

/// A node ready for the runtime: merged param, initial state, resolved
/// counts.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledNode {
    pub id: NodeId,
    pub type_key: String,
    /// Snapshot override or registry default, clamped to 1..=8.
    pub param: u8,
    pub state: NodeState,
    /// Input slots below this index carry signal pulses, at or above it
    /// control pulses.
    pub signal_inputs: usize,
    pub inputs: usize,
    pub outputs: usize,
}

/// An edge ready for the runtime: resolved role and base delay.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledEdge {
    pub id: EdgeId,
    pub from: PortRef,
    pub to: PortRef,
    pub role: EdgeRole,
    /// Base delay in ticks; non-negative. The runtime applies its own
    /// positive floor after speed division.
    pub delay: f64,
}

/// Immutable build output. Arrays are in insertion order; edge order is the
/// scheduling tie-break order within a tick.
#[derive(Debug, Clone, Default)]
pub struct CompiledGraph {
    pub nodes: Vec<CompiledNode>,
    pub edges: Vec<CompiledEdge>,
    /// Positional indices.
    pub node_index: HashMap<NodeId, usize>,
    pub edge_index: HashMap<EdgeId, usize>,
    /// Incident edges per node, edge insertion order.
    pub edges_by_node: HashMap<NodeId, Vec<EdgeId>>,
    /// The single edge on each directed port.
    pub edge_by_directed_port: HashMap<PortKey, EdgeId>,
    /// Flattened-group metadata, for diagnostics only.
    pub groups: BTreeMap<NodeId, GroupMeta>,
}

impl CompiledGraph {
    pub fn node(&self, id: &NodeId) -> Option<&CompiledNode> {
        self.node_index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&CompiledEdge> {
        self.edge_index.get(id).map(|&i| &self.edges[i])
    }

    /// The edge leaving `(node, output_slot)`, if connected.
    pub fn edge_from(&self, node: &NodeId, slot: usize) -> Option<&CompiledEdge> {
        self.edge_by_directed_port
            .get(&PortKey::new(node.clone(), PortDirection::Output, slot))
            .and_then(|id| self.edge(id))
    }

    /// Rebuild positional and adjacency indices after a splice. Used by the
    /// runtime's live patching.
    pub fn reindex(&mut self) {
        self.node_index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        self.edge_index = self
            .edges
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
        self.edges_by_node.clear();
        self.edge_by_directed_port.clear();
        for node in &self.nodes {
            self.edges_by_node.entry(node.id.clone()).or_default();
        }
        for edge in &self.edges {
            self.edge_by_directed_port.insert(
                PortKey::new(edge.from.node.clone(), PortDirection::Output, edge.from.slot),
                edge.id.clone(),
            );
            self.edge_by_directed_port.insert(
                PortKey::new(edge.to.node.clone(), PortDirection::Input, edge.to.slot),
                edge.id.clone(),
            );
            self.edges_by_node
                .entry(edge.from.node.clone())
                .or_default()
                .push(edge.id.clone());
            if edge.to.node != edge.from.node {
                self.edges_by_node
                    .entry(edge.to.node.clone())
                    .or_default()
                    .push(edge.id.clone());
            }
        }
    }
}

/// Incremental change set for the live runtime, produced by diffing two
/// compiled graphs or assembled directly by the editor layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphPatch {
    pub removed_nodes: Vec<NodeId>,
    pub removed_edges: Vec<EdgeId>,
    pub added_nodes: Vec<CompiledNode>,
    pub added_edges: Vec<CompiledEdge>,
    pub updated_params: Vec<(NodeId, u8)>,
    /// `(edge, new base delay)` for in-place geometry changes.
    pub updated_edges: Vec<(EdgeId, f64)>,
}

/// Build output: a graph or the reasons there is none.
#[derive(Debug, Default)]
pub struct BuildResult {
    pub ok: bool,
    pub graph: Option<CompiledGraph>,
    pub errors: Vec<BuildError>,
    pub warnings: Vec<String>,
}

/// Cross-validate and compile. `delays` keys top-level edges; group
/// internal edges resolve through `group_delays` under their group id and
/// original (un-namespaced) edge id.
pub fn build(
    snapshot: &GraphSnapshot,
    registry: &Registry,
    delays: &BTreeMap<EdgeId, f64>,
    group_delays: &BTreeMap<GroupId, BTreeMap<EdgeId, f64>>,
) -> BuildResult {
    let mut errors: Vec<BuildError> = Vec::new();
    let flat = flatten::flatten(snapshot, &mut errors);

    let mut graph = CompiledGraph::default();
    let mut layouts: HashMap<NodeId, crate::registry::NodeLayout> = HashMap::new();

    for record in &flat.nodes {
        let Some(def) = registry.get(&record.node_type) else {
            errors.push(BuildError {
                code: BuildErrorCode::UnknownNodeType,
                entity: record.id.to_string(),
                message: format!("unknown node type '{}'", record.node_type),
            });
            continue;
        };
        let layout = match def.node_layout(None) {
            Ok(l) => l,
            Err(e) => {
                errors.push(BuildError {
                    code: BuildErrorCode::PortSlotInvalid,
                    entity: record.id.to_string(),
                    message: e,
                });
                continue;
            }
        };
        let node = CompiledNode {
            id: record.id.clone(),
            type_key: record.node_type.clone(),
            param: clamp_step(record.param.unwrap_or(def.default_param)),
            state: def.init_state.map(|f| f()).unwrap_or_default(),
            signal_inputs: layout.signal_inputs(),
            inputs: layout.inputs.len(),
            outputs: layout.outputs.len(),
        };
        layouts.insert(node.id.clone(), layout);
        graph.nodes.push(node);
    }

    for record in &flat.edges {
        let internal = flat.internal_edges.get(&record.id);
        let edge_err = |code: BuildErrorCode, message: String| BuildError {
            code,
            entity: record.id.to_string(),
            message,
        };

        let (Some(from_layout), Some(to_layout)) =
            (layouts.get(&record.from.node), layouts.get(&record.to.node))
        else {
            errors.push(edge_err(
                if internal.is_some() {
                    BuildErrorCode::GroupMappingInvalid
                } else {
                    BuildErrorCode::PortSlotInvalid
                },
                "edge endpoint node did not compile".to_string(),
            ));
            continue;
        };

        if from_layout.outputs.is_empty() || to_layout.inputs.is_empty() {
            errors.push(edge_err(
                BuildErrorCode::SameDirection,
                "edge endpoints are not an output/input pair".to_string(),
            ));
            continue;
        }
        let Some(from_port) = from_layout.outputs.get(record.from.slot) else {
            errors.push(edge_err(
                BuildErrorCode::PortSlotInvalid,
                format!("output slot {} out of range", record.from.slot),
            ));
            continue;
        };
        let Some(to_port) = to_layout.inputs.get(record.to.slot) else {
            errors.push(edge_err(
                BuildErrorCode::PortSlotInvalid,
                format!("input slot {} out of range", record.to.slot),
            ));
            continue;
        };

        // The input port decides the edge's role; a control-role output
        // feeding a signal input is the one true disagreement.
        let role = match (from_port.role, to_port.role) {
            (PortRole::Control, PortRole::Signal) => {
                errors.push(edge_err(
                    BuildErrorCode::RoleMismatch,
                    "control output feeding a signal input".to_string(),
                ));
                continue;
            }
            (_, PortRole::Control) => EdgeRole::Control,
            (_, PortRole::Signal) => EdgeRole::Signal,
        };

        let delay = match internal {
            Some((gid, orig)) => group_delays.get(gid).and_then(|m| m.get(orig)),
            None => delays.get(&record.id),
        };
        let Some(&delay) = delay else {
            errors.push(edge_err(
                BuildErrorCode::MissingDelay,
                "no routed delay for edge".to_string(),
            ));
            continue;
        };

        let from_key = PortKey::new(
            record.from.node.clone(),
            PortDirection::Output,
            record.from.slot,
        );
        let to_key = PortKey::new(record.to.node.clone(), PortDirection::Input, record.to.slot);
        if graph.edge_by_directed_port.contains_key(&from_key)
            || graph.edge_by_directed_port.contains_key(&to_key)
        {
            errors.push(edge_err(
                BuildErrorCode::PortAlreadyConnected,
                "directed port already occupied".to_string(),
            ));
            continue;
        }
        graph.edge_by_directed_port.insert(from_key, record.id.clone());
        graph.edge_by_directed_port.insert(to_key, record.id.clone());

        graph.edges.push(CompiledEdge {
            id: record.id.clone(),
            from: record.from.clone(),
            to: record.to.clone(),
            role,
            delay: delay.max(0.0),
        });
    }

    if !errors.is_empty() {
        for e in &errors {
            log::warn!(target: "build", "{}: {} {}", e.entity, e.code.as_str(), e.message);
        }
        return BuildResult {
            ok: false,
            graph: None,
            errors,
            warnings: Vec::new(),
        };
    }

    graph.groups = flat.groups;
    graph.reindex();
    BuildResult {
        ok: true,
        graph: Some(graph),
        errors,
        warnings: Vec::new(),
    }
}

/// Convenience composition: route the snapshot (and its groups), then
/// build. Routing failures surface as missing delays on the affected edges.
pub fn compile_snapshot(
    snapshot: &GraphSnapshot,
    registry: &Registry,
    config: &RoutingConfig,
    cache: &mut RouteCache,
) -> (BuildResult, RoutingResult) {
    let routing = route_edges(snapshot, registry, config, cache, None);
    let group_routing = route_groups(snapshot, registry, config);
    let group_delays: BTreeMap<GroupId, BTreeMap<EdgeId, f64>> = group_routing
        .iter()
        .map(|(gid, r)| (gid.clone(), r.delays()))
        .collect();
    let result = build(snapshot, registry, &routing.delays(), &group_delays);
    (result, routing)
}
