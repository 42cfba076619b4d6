//! Bridge scenarios: windowing, watermark dedup, drops, and the full
//! model-to-host pipeline.

use std::collections::BTreeMap;

use patchwire_audio::bridge::{AudioBridge, ClockWindow, HostSink, WireEvent};
use patchwire_audio::engine::EventEngine;
use patchwire_core::build::{build, compile_snapshot};
use patchwire_core::config::{AudioSettings, RuntimeSettings};
use patchwire_core::model::GraphModel;
use patchwire_core::persistence::SampleSlot;
use patchwire_core::registry::Registry;
use patchwire_core::routing::{RouteCache, RoutingConfig};
use patchwire_types::{
    EdgeId, EdgeRecord, GraphOp, GraphSnapshot, GridPoint, NodeId, NodeRecord, PortRef,
    Rotation, Transport,
};

struct CaptureSink {
    events: Vec<WireEvent>,
}

impl CaptureSink {
    fn new() -> Self {
        Self { events: Vec::new() }
    }
}

impl HostSink for CaptureSink {
    fn evaluate(&mut self, events: &[WireEvent]) {
        self.events.extend_from_slice(events);
    }
}

fn node(id: &str, node_type: &str, param: Option<u8>) -> NodeRecord {
    NodeRecord {
        id: NodeId::new(id),
        node_type: node_type.into(),
        pos: GridPoint::new(0, 0),
        rotation: Rotation::R0,
        param,
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

fn samples() -> Vec<Option<SampleSlot>> {
    vec![Some(SampleSlot {
        s: "bd".into(),
        n: 0,
    })]
}

fn engine_with(nodes: Vec<NodeRecord>, edges: Vec<(EdgeRecord, f64)>, reg: &Registry) -> EventEngine {
    let mut delays = BTreeMap::new();
    let mut edge_records = Vec::new();
    for (e, d) in edges {
        delays.insert(e.id.clone(), d);
        edge_records.push(e);
    }
    let snap = GraphSnapshot {
        nodes,
        edges: edge_records,
        groups: Default::default(),
    };
    let result = build(&snap, reg, &delays, &BTreeMap::new());
    assert!(result.ok, "{:?}", result.errors);
    let mut engine = EventEngine::new(RuntimeSettings::default());
    engine.set_graph(result.graph.unwrap());
    engine.reset_pulses();
    engine
}

#[test]
fn overlapping_windows_emit_each_event_exactly_once() {
    let reg = Registry::with_builtins().unwrap();
    let mut engine = engine_with(
        vec![node("p", "pulse", Some(1)), node("o", "output", None)],
        vec![(edge("e", ("p", 0), ("o", 0)), 0.8)],
        &reg,
    );
    let mut bridge = AudioBridge::new(
        Transport::new(120.0),
        AudioSettings::default(),
        samples(),
        &reg,
    );
    let mut sink = CaptureSink::new();

    // Two overlapping clock windows, 50 ms apart.
    bridge.on_tick(
        &ClockWindow {
            t0: 0.0,
            t1: 0.1,
            latency: 0.0,
        },
        &mut engine,
        &reg,
        &mut sink,
    );
    bridge.on_tick(
        &ClockWindow {
            t0: 0.05,
            t1: 0.15,
            latency: 0.0,
        },
        &mut engine,
        &reg,
        &mut sink,
    );

    assert!(!sink.events.is_empty());
    // strictly ascending times, hence no duplicates
    for pair in sink.events.windows(2) {
        assert!(pair[0].time < pair[1].time);
    }
    let mut seen = std::collections::BTreeSet::new();
    for e in &sink.events {
        assert!(seen.insert(e.time.to_bits()), "event at {} emitted twice", e.time);
    }
}

#[test]
fn wire_records_carry_sample_and_mapped_params() {
    let reg = Registry::with_builtins().unwrap();
    // pulse -> lpf(param 2) -> output: the lpf node stamps its mapped key.
    let mut engine = engine_with(
        vec![
            node("p", "pulse", Some(1)),
            node("f", "lpf", Some(2)),
            node("o", "output", None),
        ],
        vec![
            (edge("e1", ("p", 0), ("f", 0)), 0.5),
            (edge("e2", ("f", 0), ("o", 0)), 0.5),
        ],
        &reg,
    );
    let mut bridge = AudioBridge::new(
        Transport::new(120.0),
        AudioSettings::default(),
        samples(),
        &reg,
    );
    let mut sink = CaptureSink::new();
    bridge.on_tick(
        &ClockWindow {
            t0: 0.0,
            t1: 0.1,
            latency: 0.0,
        },
        &mut engine,
        &reg,
        &mut sink,
    );

    assert!(!sink.events.is_empty());
    let e = &sink.events[0];
    assert_eq!(e.s, "bd");
    assert_eq!(e.n, 0);
    // lpfTable[2 - 1] = 6400; the other keys fall back to registry
    // defaults (param 4 -> table index 3)
    assert_eq!(e.lpf, Some(6400.0));
    assert_eq!(e.end, Some(0.625));
    assert_eq!(e.crush, Some(10.0));
    assert_eq!(e.hpf, Some(800.0));
}

#[test]
fn missing_sample_slot_drops_with_warning() {
    let reg = Registry::with_builtins().unwrap();
    let mut engine = engine_with(
        vec![node("p", "pulse", Some(1)), node("o", "output", None)],
        vec![(edge("e", ("p", 0), ("o", 0)), 0.8)],
        &reg,
    );
    // empty sample table: every trigger drops
    let mut bridge = AudioBridge::new(
        Transport::new(120.0),
        AudioSettings::default(),
        Vec::new(),
        &reg,
    );
    let mut sink = CaptureSink::new();
    bridge.on_tick(
        &ClockWindow {
            t0: 0.0,
            t1: 0.1,
            latency: 0.0,
        },
        &mut engine,
        &reg,
        &mut sink,
    );
    assert!(sink.events.is_empty());
    let warnings = bridge.take_warnings();
    assert!(warnings
        .iter()
        .any(|(code, n)| *code == "AUDIO_MISSING_SAMPLE" && *n > 0));
}

#[test]
fn event_cap_drops_excess_with_warning() {
    let reg = Registry::with_builtins().unwrap();
    // split fans one pulse into six simultaneous triggers
    let mut nodes = vec![node("p", "pulse", Some(1)), node("s", "split", None)];
    let mut edges = vec![(edge("e", ("p", 0), ("s", 0)), 0.3)];
    for slot in 0..6 {
        let id = format!("o{}", slot);
        nodes.push(node(&id, "output", None));
        edges.push((edge(&format!("eo{}", slot), ("s", slot), (&id, 0)), 0.2));
    }
    let mut engine = engine_with(nodes, edges, &reg);
    let mut bridge = AudioBridge::new(
        Transport::new(120.0),
        AudioSettings {
            max_events: 2,
            max_voices: 2,
            ..AudioSettings::default()
        },
        samples(),
        &reg,
    );
    let mut sink = CaptureSink::new();
    // window ticks [8.48, 9.28): six triggers land together at 8.5
    bridge.on_tick(
        &ClockWindow {
            t0: 0.9,
            t1: 1.0,
            latency: 0.0,
        },
        &mut engine,
        &reg,
        &mut sink,
    );
    assert_eq!(sink.events.len(), 2);
    let warnings = bridge.take_warnings();
    assert!(warnings
        .iter()
        .any(|(code, n)| *code == "AUDIO_EVENT_OVERFLOW" && *n == 4));
}

#[test]
fn transport_change_resets_the_watermark() {
    let reg = Registry::with_builtins().unwrap();
    let mut bridge = AudioBridge::new(
        Transport::new(120.0),
        AudioSettings::default(),
        samples(),
        &reg,
    );
    let mut engine = engine_with(
        vec![node("p", "pulse", Some(1)), node("o", "output", None)],
        vec![(edge("e", ("p", 0), ("o", 0)), 0.8)],
        &reg,
    );
    let mut sink = CaptureSink::new();
    bridge.on_tick(
        &ClockWindow {
            t0: 0.0,
            t1: 0.1,
            latency: 0.0,
        },
        &mut engine,
        &reg,
        &mut sink,
    );
    let emitted = sink.events.len();
    assert!(emitted > 0);

    bridge.set_bpm(90.0);
    assert!((bridge.transport().bpm - 90.0).abs() < f64::EPSILON);
    // the next window maps ticks at 6/sec instead of 8/sec and the old
    // watermark no longer suppresses anything
    bridge.on_tick(
        &ClockWindow {
            t0: 0.1,
            t1: 0.5,
            latency: 0.0,
        },
        &mut engine,
        &reg,
        &mut sink,
    );
    assert_eq!(sink.events.len(), emitted + 1);
    let last = sink.events.last().unwrap();
    // tick 3.8 under the new mapping: 3.8 / 6 ticks-per-second
    assert!((last.time - 3.8 / 6.0).abs() < 1e-9);
}

#[test]
fn full_pipeline_from_ops_to_host_records() {
    let reg = Registry::with_builtins().unwrap();
    let mut model = GraphModel::new();
    let result = model.apply_ops(
        &reg,
        &[
            GraphOp::AddNode(node("p", "pulse", None)),
            GraphOp::AddNode({
                let mut o = node("o", "output", None);
                o.pos = GridPoint::new(6, 0);
                o
            }),
            GraphOp::AddEdge(edge("e", ("p", 0), ("o", 0))),
        ],
    );
    assert!(result.ok);

    let snap = model.snapshot();
    let mut cache = RouteCache::new();
    let (built, routing) = compile_snapshot(&snap, &reg, &RoutingConfig::default(), &mut cache);
    assert!(built.ok, "{:?}", built.errors);
    // pulse output anchor (2,1) to output input anchor (6,1): 4 grid units
    assert_eq!(routing.routes[&EdgeId::new("e")].total_length, 4.0);

    let mut engine = EventEngine::new(RuntimeSettings::default());
    engine.set_graph(built.graph.unwrap());
    engine.reset_pulses();

    let mut bridge = AudioBridge::new(
        Transport::new(120.0),
        AudioSettings::default(),
        samples(),
        &reg,
    );
    let mut sink = CaptureSink::new();
    // contiguous 100 ms windows covering the first ten ticks
    for k in 1..=12 {
        bridge.on_tick(
            &ClockWindow {
                t0: (k - 1) as f64 * 0.1,
                t1: k as f64 * 0.1,
                latency: 0.0,
            },
            &mut engine,
            &reg,
            &mut sink,
        );
    }

    // period-4 pulse through a 4-tick cable: triggers at ticks 4 and 8,
    // i.e. 0.5 s and 1.0 s at 120 bpm with 4 ticks per beat
    let times: Vec<f64> = sink.events.iter().map(|e| e.time).collect();
    assert_eq!(times, vec![0.5, 1.0]);
    assert!(sink.events.iter().all(|e| e.s == "bd"));
}
