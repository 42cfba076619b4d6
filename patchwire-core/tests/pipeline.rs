//! Editor-side pipeline: ops through the model, routing, build, and
//! persistence working together.

use std::collections::HashSet;

use patchwire_core::build::compile_snapshot;
use patchwire_core::model::GraphModel;
use patchwire_core::persistence::{parse_project, serialize_project, ProjectFile};
use patchwire_core::registry::Registry;
use patchwire_core::routing::{route_edges, RouteCache, RoutingConfig};
use patchwire_types::{
    EdgeId, EdgeRecord, GraphOp, GridPoint, NodeId, NodeRecord, PortRef, Rotation,
};

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

fn edge(id: &str, from: (&str, usize), to: (&str, usize)) -> EdgeRecord {
    EdgeRecord {
        id: EdgeId::new(id),
        from: PortRef::new(NodeId::new(from.0), from.1),
        to: PortRef::new(NodeId::new(to.0), to.1),
        corners: vec![],
    }
}

fn patched_model(reg: &Registry) -> GraphModel {
    let mut model = GraphModel::new();
    let result = model.apply_ops(
        reg,
        &[
            GraphOp::AddNode(node("p", "pulse", 0, 0)),
            GraphOp::AddNode(node("v", "speed", 5, 3)),
            GraphOp::AddNode(node("o", "output", 12, 3)),
            GraphOp::AddEdge(edge("e1", ("p", 0), ("v", 0))),
            GraphOp::AddEdge(edge("e2", ("v", 0), ("o", 0))),
        ],
    );
    assert!(result.ok, "{:?}", result.errors);
    model
}

#[test]
fn routing_output_is_byte_identical_across_runs() {
    let reg = Registry::with_builtins().unwrap();
    let model = patched_model(&reg);
    let snap = model.snapshot();
    let cfg = RoutingConfig::default();

    let mut cache_a = RouteCache::new();
    let mut cache_b = RouteCache::new();
    let a = route_edges(&snap, &reg, &cfg, &mut cache_a, None);
    let b = route_edges(&snap, &reg, &cfg, &mut cache_b, None);

    assert!(a.errors.is_empty());
    for (id, route) in &a.routes {
        let other = &b.routes[id];
        assert_eq!(route.points, other.points);
        assert_eq!(route.svg_path_d, other.svg_path_d);
        assert_eq!(route.total_length, other.total_length);
        assert_eq!(route.delay_ticks, other.delay_ticks);
        // length really is the Manhattan sum over the polyline
        let sum: u64 = route
            .points
            .windows(2)
            .map(|w| w[0].manhattan(&w[1]))
            .sum();
        assert_eq!(route.total_length, sum as f64);
    }
}

#[test]
fn node_move_invalidates_incident_edges_via_indices() {
    let reg = Registry::with_builtins().unwrap();
    let mut model = patched_model(&reg);
    let cfg = RoutingConfig::default();
    let mut cache = RouteCache::new();

    let before = route_edges(&model.snapshot(), &reg, &cfg, &mut cache, None);
    let e1_before = before.routes[&EdgeId::new("e1")].clone();
    let e2_before = before.routes[&EdgeId::new("e2")].clone();

    // Move the middle node; its incident edge set comes from the model's
    // indices and becomes the changed set for incremental routing.
    let moved = NodeId::new("v");
    let changed: HashSet<EdgeId> = model.indices().edges_of(&moved).iter().cloned().collect();
    assert_eq!(changed.len(), 2);
    assert!(model
        .apply_ops(
            &reg,
            &[GraphOp::MoveNode {
                id: moved,
                pos: GridPoint::new(5, 8),
            }],
        )
        .ok);

    let after = route_edges(&model.snapshot(), &reg, &cfg, &mut cache, Some(&changed));
    assert_ne!(after.routes[&EdgeId::new("e1")].points, e1_before.points);
    assert_ne!(after.routes[&EdgeId::new("e2")].points, e2_before.points);
}

#[test]
fn compile_snapshot_wires_delays_through() {
    let reg = Registry::with_builtins().unwrap();
    let model = patched_model(&reg);
    let mut cache = RouteCache::new();
    let (built, routing) = compile_snapshot(
        &model.snapshot(),
        &reg,
        &RoutingConfig::default(),
        &mut cache,
    );
    assert!(built.ok, "{:?}", built.errors);
    let graph = built.graph.unwrap();
    for edge in &graph.edges {
        assert_eq!(edge.delay, routing.routes[&edge.id].delay_ticks);
        assert!(edge.delay > 0.0);
    }
}

#[test]
fn project_roundtrip_through_the_model() {
    let reg = Registry::with_builtins().unwrap();
    let model = patched_model(&reg);
    let project = ProjectFile::new(model.snapshot());

    let json = serialize_project(&project).unwrap();
    let loaded = parse_project(&json);
    assert!(loaded.ok, "{:?}", loaded.errors);
    let back = loaded.project.unwrap();
    assert_eq!(back, project);

    // a reloaded snapshot compiles to the same graph
    let mut model2 = GraphModel::new();
    model2.reset(back.graph);
    let cfg = RoutingConfig::default();
    let mut cache_a = RouteCache::new();
    let mut cache_b = RouteCache::new();
    let (a, _) = compile_snapshot(&model.snapshot(), &reg, &cfg, &mut cache_a);
    let (b, _) = compile_snapshot(&model2.snapshot(), &reg, &cfg, &mut cache_b);
    let (ga, gb) = (a.graph.unwrap(), b.graph.unwrap());
    assert_eq!(ga.nodes, gb.nodes);
    assert_eq!(ga.edges, gb.edges);
}
