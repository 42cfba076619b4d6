//! Routing & delay: the pure geometric compiler.
//!
//! Turns `(snapshot, registry, config)` into orthogonal polylines and
//! per-edge delays in ticks. Failures are per-edge: a failed edge reports a
//! `ROUTE_*` error and produces no geometry or delay, never a silent
//! fallback. Identical inputs produce byte-identical outputs.

mod anchor;
mod cache;
mod ortho;

pub use anchor::{port_anchor, Anchor};
pub use cache::{route_key, RouteCache};
pub use ortho::{polyline_length, route_constraints, svg_path, BendPreference};

use std::collections::{BTreeMap, HashSet};

use patchwire_types::{
    EdgeId, EdgeRecord, GraphSnapshot, GridPoint, NodeRecord, PortDirection,
};

use crate::registry::Registry;

/// Geometry knobs. `ticks_per_grid` converts polyline length to delay.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingConfig {
    pub ticks_per_grid: f64,
    pub bend_preference: BendPreference,
    /// Nominal stub length in grid units; clamped per port when the
    /// neighbouring constraint is closer.
    pub stub_length: i64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            ticks_per_grid: 1.0,
            bend_preference: BendPreference::HorizontalFirst,
            stub_length: 1,
        }
    }
}

/// Routed geometry and derived delay for one edge.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRoute {
    /// Grid-integer polyline from output anchor to input anchor.
    pub points: Vec<GridPoint>,
    /// Pure-geometry path data; joins are a rendering concern.
    pub svg_path_d: String,
    /// Manhattan length in grid units.
    pub total_length: f64,
    /// `total_length * ticks_per_grid`. May be zero; the runtime enforces
    /// its own positive floor.
    pub delay_ticks: f64,
}

/// Stable per-edge routing failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteErrorCode {
    MissingNode,
    MissingEdge,
    InvalidPort,
    AnchorFail,
    InternalError,
}

impl RouteErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteErrorCode::MissingNode => "ROUTE_MISSING_NODE",
            RouteErrorCode::MissingEdge => "ROUTE_MISSING_EDGE",
            RouteErrorCode::InvalidPort => "ROUTE_INVALID_PORT",
            RouteErrorCode::AnchorFail => "ROUTE_ANCHOR_FAIL",
            RouteErrorCode::InternalError => "ROUTE_INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteError {
    pub edge: EdgeId,
    pub code: RouteErrorCode,
    pub message: String,
}

/// Batch routing output. `routes` holds every edge that routed; `errors`
/// the ones that did not.
#[derive(Debug, Default)]
pub struct RoutingResult {
    pub routes: BTreeMap<EdgeId, EdgeRoute>,
    pub errors: Vec<RouteError>,
}

impl RoutingResult {
    /// Per-edge base delays for the build step.
    pub fn delays(&self) -> BTreeMap<EdgeId, f64> {
        self.routes
            .iter()
            .map(|(id, r)| (id.clone(), r.delay_ticks))
            .collect()
    }
}

fn route_error(edge: &EdgeId, code: RouteErrorCode, message: impl Into<String>) -> RouteError {
    let e = RouteError {
        edge: edge.clone(),
        code,
        message: message.into(),
    };
    log::warn!(target: "routing", "edge '{}': {} {}", e.edge, e.code.as_str(), e.message);
    e
}

/// Route a single edge against a snapshot.
pub fn route_edge(
    snapshot: &GraphSnapshot,
    registry: &Registry,
    config: &RoutingConfig,
    edge: &EdgeRecord,
) -> Result<EdgeRoute, RouteError> {
    let from_node = snapshot.node(&edge.from.node).ok_or_else(|| {
        route_error(
            &edge.id,
            RouteErrorCode::MissingNode,
            format!("source node '{}' not in snapshot", edge.from.node),
        )
    })?;
    let to_node = snapshot.node(&edge.to.node).ok_or_else(|| {
        route_error(
            &edge.id,
            RouteErrorCode::MissingNode,
            format!("target node '{}' not in snapshot", edge.to.node),
        )
    })?;

    let from_anchor = resolve_anchor(snapshot, registry, from_node, PortDirection::Output, edge)?;
    let to_anchor = resolve_anchor(snapshot, registry, to_node, PortDirection::Input, edge)?;

    let mut constraints: Vec<GridPoint> = Vec::with_capacity(edge.corners.len() + 4);
    constraints.push(from_anchor.pos);
    let first_target = edge.corners.first().copied().unwrap_or(to_anchor.pos);
    constraints.push(stub_point(
        from_anchor,
        first_target,
        config.stub_length,
    ));
    constraints.extend(edge.corners.iter().copied());
    let last_source = edge.corners.last().copied().unwrap_or(from_anchor.pos);
    constraints.push(stub_point(to_anchor, last_source, config.stub_length));
    constraints.push(to_anchor.pos);

    let points = route_constraints(&constraints, config.bend_preference);
    if points.len() < 2 && from_anchor.pos != to_anchor.pos {
        return Err(route_error(
            &edge.id,
            RouteErrorCode::InternalError,
            "router produced a degenerate polyline",
        ));
    }

    let total_length = polyline_length(&points) as f64;
    Ok(EdgeRoute {
        svg_path_d: svg_path(&points),
        total_length,
        delay_ticks: total_length * config.ticks_per_grid,
        points,
    })
}

fn resolve_anchor(
    snapshot: &GraphSnapshot,
    registry: &Registry,
    node: &NodeRecord,
    direction: PortDirection,
    edge: &EdgeRecord,
) -> Result<Anchor, RouteError> {
    let def = registry.get(&node.node_type).ok_or_else(|| {
        route_error(
            &edge.id,
            RouteErrorCode::MissingNode,
            format!("node '{}' has unknown type '{}'", node.id, node.node_type),
        )
    })?;
    let group = node
        .group_ref
        .as_ref()
        .and_then(|gid| snapshot.groups.get(gid));
    let layout = def.node_layout(group).map_err(|e| {
        route_error(&edge.id, RouteErrorCode::AnchorFail, e)
    })?;
    let slot = match direction {
        PortDirection::Output => edge.from.slot,
        PortDirection::Input => edge.to.slot,
    };
    port_anchor(node, &layout, direction, slot).ok_or_else(|| {
        route_error(
            &edge.id,
            RouteErrorCode::InvalidPort,
            format!(
                "{:?} slot {} out of range for node '{}'",
                direction, slot, node.id
            ),
        )
    })
}

/// Stub constraint for one anchor: a point `stub_length` out along the port
/// normal, clamped to the distance available toward the neighbouring
/// constraint on that axis. Zero-length stubs collapse onto the anchor.
fn stub_point(anchor: Anchor, toward: GridPoint, stub_length: i64) -> GridPoint {
    let (nx, ny) = anchor.normal;
    let available = (toward.x - anchor.pos.x) * nx + (toward.y - anchor.pos.y) * ny;
    let len = stub_length.min(available.max(0));
    GridPoint::new(anchor.pos.x + nx * len, anchor.pos.y + ny * len)
}

/// Batch entry point: route every edge in the snapshot, reusing cached
/// geometry where inputs are unchanged. When `changed` is given, edges
/// outside the set reuse their cache entry without rehashing; the caller is
/// responsible for including every edge incident to a moved or re-laid-out
/// node (the model indices provide exactly that set).
pub fn route_edges(
    snapshot: &GraphSnapshot,
    registry: &Registry,
    config: &RoutingConfig,
    route_cache: &mut RouteCache,
    changed: Option<&HashSet<EdgeId>>,
) -> RoutingResult {
    let live: HashSet<&EdgeId> = snapshot.edges.iter().map(|e| &e.id).collect();
    route_cache.retain_edges(|id| live.contains(id));

    let mut result = RoutingResult::default();
    for edge in &snapshot.edges {
        if let Some(changed) = changed {
            if !changed.contains(&edge.id) {
                if let Some(route) = route_cache.get_unchecked(&edge.id) {
                    result.routes.insert(edge.id.clone(), route.clone());
                    continue;
                }
            }
        }

        let key = match (snapshot.node(&edge.from.node), snapshot.node(&edge.to.node)) {
            (Some(f), Some(t)) => Some(route_key(edge, f, t, config)),
            _ => None,
        };
        if let Some(key) = key {
            if let Some(route) = route_cache.get(&edge.id, key) {
                result.routes.insert(edge.id.clone(), route.clone());
                continue;
            }
        }

        match route_edge(snapshot, registry, config, edge) {
            Ok(route) => {
                if let Some(key) = key {
                    route_cache.insert(edge.id.clone(), key, route.clone());
                }
                result.routes.insert(edge.id.clone(), route);
            }
            Err(e) => result.errors.push(e),
        }
    }
    result
}

/// Route the internal edges of every group definition in the snapshot.
/// Group internals have their own geometry; their delays are derived the
/// same way as top-level cables. Results are keyed by group id.
pub fn route_groups(
    snapshot: &GraphSnapshot,
    registry: &Registry,
    config: &RoutingConfig,
) -> BTreeMap<patchwire_types::GroupId, RoutingResult> {
    let mut out = BTreeMap::new();
    for (gid, def) in &snapshot.groups {
        let inner = GraphSnapshot {
            nodes: def.nodes.clone(),
            edges: def.edges.clone(),
            groups: BTreeMap::new(),
        };
        let mut result = RoutingResult::default();
        for edge in &inner.edges {
            match route_edge(&inner, registry, config, edge) {
                Ok(route) => {
                    result.routes.insert(edge.id.clone(), route);
                }
                Err(e) => result.errors.push(e),
            }
        }
        out.insert(gid.clone(), result);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchwire_types::{NodeId, PortRef, Rotation};

    fn node(id: &str, node_type: &str, x: i64, y: i64) -> NodeRecord {
        NodeRecord {
            id: NodeId::new(id),
            node_type: node_type.into(),
            pos: GridPoint::new(x, y),
            rotation: Rotation::R0,
            param: None,
            name: None,
            group_ref: None,
        }
    }

    fn simple_snapshot() -> GraphSnapshot {
        GraphSnapshot {
            nodes: vec![node("p", "pulse", 0, 0), node("o", "output", 5, 0)],
            edges: vec![EdgeRecord {
                id: EdgeId::new("e"),
                from: PortRef::new(NodeId::new("p"), 0),
                to: PortRef::new(NodeId::new("o"), 0),
                corners: vec![],
            }],
            groups: Default::default(),
        }
    }

    #[test]
    fn straight_cable_length_and_delay() {
        let reg = Registry::with_builtins().unwrap();
        let snap = simple_snapshot();
        let cfg = RoutingConfig::default();
        let route = route_edge(&snap, &reg, &cfg, &snap.edges[0]).unwrap();
        // pulse output anchor (2,1) -> output input anchor (5,1): length 3.
        assert_eq!(route.points.first().unwrap(), &GridPoint::new(2, 1));
        assert_eq!(route.points.last().unwrap(), &GridPoint::new(5, 1));
        assert_eq!(route.total_length, 3.0);
        assert_eq!(route.delay_ticks, 3.0);
    }

    #[test]
    fn total_length_matches_manhattan_sum() {
        let reg = Registry::with_builtins().unwrap();
        let mut snap = simple_snapshot();
        snap.nodes[1].pos = GridPoint::new(7, 4);
        snap.edges[0].corners = vec![GridPoint::new(4, 6)];
        let cfg = RoutingConfig::default();
        let route = route_edge(&snap, &reg, &cfg, &snap.edges[0]).unwrap();
        let sum: u64 = route
            .points
            .windows(2)
            .map(|w| w[0].manhattan(&w[1]))
            .sum();
        assert_eq!(route.total_length, sum as f64);
        // the manual corner is on the polyline
        assert!(route.points.contains(&GridPoint::new(4, 6)));
    }

    #[test]
    fn routing_is_deterministic() {
        let reg = Registry::with_builtins().unwrap();
        let snap = simple_snapshot();
        let cfg = RoutingConfig::default();
        let a = route_edge(&snap, &reg, &cfg, &snap.edges[0]).unwrap();
        let b = route_edge(&snap, &reg, &cfg, &snap.edges[0]).unwrap();
        assert_eq!(a.points, b.points);
        assert_eq!(a.svg_path_d, b.svg_path_d);
        assert_eq!(a.total_length, b.total_length);
    }

    #[test]
    fn missing_endpoint_is_per_edge_error() {
        let reg = Registry::with_builtins().unwrap();
        let mut snap = simple_snapshot();
        snap.nodes.remove(1);
        let cfg = RoutingConfig::default();
        let mut cache = RouteCache::new();
        let result = route_edges(&snap, &reg, &cfg, &mut cache, None);
        assert!(result.routes.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, RouteErrorCode::MissingNode);
        // no delay entry for the failed edge
        assert!(result.delays().is_empty());
    }

    #[test]
    fn invalid_slot_is_reported() {
        let reg = Registry::with_builtins().unwrap();
        let mut snap = simple_snapshot();
        snap.edges[0].from.slot = 4;
        let cfg = RoutingConfig::default();
        let err = route_edge(&snap, &reg, &cfg, &snap.edges[0]).unwrap_err();
        assert_eq!(err.code, RouteErrorCode::InvalidPort);
    }

    #[test]
    fn cache_reuses_until_inputs_change() {
        let reg = Registry::with_builtins().unwrap();
        let mut snap = simple_snapshot();
        let cfg = RoutingConfig::default();
        let mut cache = RouteCache::new();

        let first = route_edges(&snap, &reg, &cfg, &mut cache, None);
        assert_eq!(cache.len(), 1);
        let r1 = first.routes[&EdgeId::new("e")].clone();

        // unchanged inputs -> identical output
        let second = route_edges(&snap, &reg, &cfg, &mut cache, None);
        assert_eq!(second.routes[&EdgeId::new("e")], r1);

        // node move -> key mismatch -> new geometry
        snap.nodes[1].pos = GridPoint::new(9, 0);
        let third = route_edges(&snap, &reg, &cfg, &mut cache, None);
        assert_ne!(third.routes[&EdgeId::new("e")].total_length, r1.total_length);
    }

    #[test]
    fn changed_set_limits_recomputation() {
        let reg = Registry::with_builtins().unwrap();
        let mut snap = simple_snapshot();
        let cfg = RoutingConfig::default();
        let mut cache = RouteCache::new();
        route_edges(&snap, &reg, &cfg, &mut cache, None);

        // Move a node but mark nothing changed: the stale cache entry is
        // trusted, which is exactly the caller's contract to uphold.
        snap.nodes[1].pos = GridPoint::new(9, 0);
        let stale = route_edges(&snap, &reg, &cfg, &mut cache, Some(&HashSet::new()));
        assert_eq!(stale.routes[&EdgeId::new("e")].total_length, 3.0);

        // Marking it changed recomputes.
        let mut changed = HashSet::new();
        changed.insert(EdgeId::new("e"));
        let fresh = route_edges(&snap, &reg, &cfg, &mut cache, Some(&changed));
        assert!(fresh.routes[&EdgeId::new("e")].total_length > 3.0);
    }

    #[test]
    fn dropped_edges_leave_the_cache() {
        let reg = Registry::with_builtins().unwrap();
        let mut snap = simple_snapshot();
        let cfg = RoutingConfig::default();
        let mut cache = RouteCache::new();
        route_edges(&snap, &reg, &cfg, &mut cache, None);
        assert_eq!(cache.len(), 1);
        snap.edges.clear();
        route_edges(&snap, &reg, &cfg, &mut cache, None);
        assert!(cache.is_empty());
    }
}
