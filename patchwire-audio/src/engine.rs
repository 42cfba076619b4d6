//! The event runtime: tick-accurate simulation over a compiled graph.
//!
//! Control-first semantics: within one (node, tick) bucket every
//! control-role event runs before any signal-role event, so signals always
//! see freshly written params. Fan-out happens along the single edge on
//! each emitted output slot, delayed by `max(edge.delay / speed,
//! min_delay_ticks)`. Sources re-arm themselves through self-scheduled
//! events that travel no cable.

use std::collections::HashMap;

use patchwire_core::build::{CompiledGraph, GraphPatch};
use patchwire_core::config::RuntimeSettings;
use patchwire_core::registry::{
    node_id_hash, BehaviorCtx, NodeRng, NodeState, Registry, OUTPUT_TYPE, PULSE_TYPE,
};
use patchwire_types::{
    clamp_step, EdgeRole, NodeId, OutputEvent, Pulse, RuntimeEvent, ThumbState,
};

use crate::scheduler::{ScheduledEvent, TickScheduler};
use crate::telemetry::WarningAggregator;

const WARN_MISSING_NODE: &str = "RUNTIME_MISSING_NODE";
const WARN_MISSING_EDGE: &str = "RUNTIME_MISSING_EDGE";
const WARN_MISSING_TYPE: &str = "RUNTIME_MISSING_TYPE";
const WARN_QUEUE_OVERFLOW: &str = "RUNTIME_QUEUE_OVERFLOW";
const WARN_LATE_EVENT: &str = "RUNTIME_LATE_EVENT";

/// Stateful, single-threaded event simulator.
pub struct EventEngine {
    graph: CompiledGraph,
    /// Live params; seeded from the compiled graph, overwritten by control
    /// pulses and patches.
    params: HashMap<NodeId, u8>,
    states: HashMap<NodeId, NodeState>,
    rngs: HashMap<NodeId, NodeRng>,
    scheduler: TickScheduler,
    cursor: f64,
    settings: RuntimeSettings,
    warnings: WarningAggregator,
}

impl EventEngine {
    pub fn new(settings: RuntimeSettings) -> Self {
        Self {
            graph: CompiledGraph::default(),
            params: HashMap::new(),
            states: HashMap::new(),
            rngs: HashMap::new(),
            scheduler: TickScheduler::new(),
            cursor: 0.0,
            settings,
            warnings: WarningAggregator::new(),
        }
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    pub fn in_flight(&self) -> usize {
        self.scheduler.len()
    }

    /// Drain the current warning window: `(code, count)` pairs.
    pub fn take_warnings(&mut self) -> Vec<(&'static str, u64)> {
        self.warnings.take_summary()
    }

    /// Emit one summary log line per warning code and reset the window.
    /// The audio bridge calls this once per clock window.
    pub fn flush_warnings(&mut self) {
        self.warnings.flush_log("runtime");
    }

    /// Replace the graph wholesale. Clears the scheduler; does not re-seed
    /// pulse sources.
    pub fn set_graph(&mut self, graph: CompiledGraph) {
        self.scheduler.clear();
        self.params.clear();
        self.states.clear();
        self.rngs.clear();
        self.graph = graph;
        let nodes: Vec<_> = self.graph.nodes.clone();
        for node in &nodes {
            self.init_node(node.id.clone(), node.param, node.state.clone());
        }
    }

    fn init_node(&mut self, id: NodeId, param: u8, state: NodeState) {
        self.rngs.insert(
            id.clone(),
            NodeRng::new(self.settings.seed, node_id_hash(id.as_str())),
        );
        self.params.insert(id.clone(), param);
        self.states.insert(id, state);
    }

    /// Clear the scheduler and seed a fresh firing for every `pulse` node
    /// at the current cursor. Node params and states are untouched.
    pub fn reset_pulses(&mut self) {
        self.scheduler.clear();
        let cursor = self.cursor;
        let pulses: Vec<NodeId> = self
            .graph
            .nodes
            .iter()
            .filter(|n| n.type_key == PULSE_TYPE)
            .map(|n| n.id.clone())
            .collect();
        for id in pulses {
            self.enqueue_guarded(RuntimeEvent {
                tick: cursor,
                node: id,
                edge: None,
                role: EdgeRole::Signal,
                pulse: Pulse::new(1, 1),
                emit_time: cursor,
            });
        }
    }

    /// Run the simulation up to `t1` and return the output-node triggers
    /// that landed in `[t0, t1)`, sorted by tick, stable within a tick.
    pub fn query_window(&mut self, registry: &Registry, t0: f64, t1: f64) -> Vec<OutputEvent> {
        let mut outputs = Vec::new();
        loop {
            let Some(t) = self.scheduler.peek_min_tick() else {
                break;
            };
            if t >= t1 {
                break;
            }
            let batch = self.scheduler.pop_until(t);
            self.process_batch(registry, t, batch, t0, &mut outputs);
        }
        self.cursor = self.cursor.max(t1);
        outputs
    }

    /// One (tick) batch: bucket by node preserving enqueue order, then
    /// control events before signal events per node.
    fn process_batch(
        &mut self,
        registry: &Registry,
        tick: f64,
        batch: Vec<ScheduledEvent>,
        window_start: f64,
        outputs: &mut Vec<OutputEvent>,
    ) {
        let mut order: Vec<NodeId> = Vec::new();
        let mut buckets: HashMap<NodeId, Vec<ScheduledEvent>> = HashMap::new();
        for e in batch {
            let id = e.event.node.clone();
            if !buckets.contains_key(&id) {
                order.push(id.clone());
            }
            buckets.entry(id).or_default().push(e);
        }

        for id in order {
            let events = buckets.remove(&id).unwrap_or_default();
            for e in events.iter().filter(|e| e.event.role == EdgeRole::Control) {
                self.deliver_control(registry, &e.event);
            }
            for e in events.iter().filter(|e| e.event.role == EdgeRole::Signal) {
                self.deliver_signal(registry, tick, &e.event, window_start, outputs);
            }
        }
    }

    /// Input slot the event arrives on: the edge's input slot, or 0 for a
    /// self-scheduled firing.
    fn input_slot(&mut self, event: &RuntimeEvent) -> Option<usize> {
        match &event.edge {
            None => Some(0),
            Some(eid) => match self.graph.edge(eid) {
                Some(e) => Some(e.to.slot),
                None => {
                    self.warnings.record(WARN_MISSING_EDGE);
                    None
                }
            },
        }
    }

    fn deliver_control(&mut self, registry: &Registry, event: &RuntimeEvent) {
        let Some(node) = self.graph.node(&event.node) else {
            self.warnings.record(WARN_MISSING_NODE);
            return;
        };
        let type_key = node.type_key.clone();
        let fallback_param = node.param;
        let Some(def) = registry.get(&type_key) else {
            self.warnings.record(WARN_MISSING_TYPE);
            return;
        };
        let Some(on_control) = def.on_control else {
            // Nodes without a control behavior just absorb the pulse.
            return;
        };
        let Some(slot) = self.input_slot(event) else {
            return;
        };

        let param = *self.params.get(&event.node).unwrap_or(&fallback_param);
        let state = self.states.get(&event.node).cloned().unwrap_or_default();
        let pulse = event.pulse.clamped();
        let seed = self.settings.seed;
        let rng = self
            .rngs
            .entry(event.node.clone())
            .or_insert_with(|| NodeRng::new(seed, node_id_hash(event.node.as_str())));

        let mut ctx = BehaviorCtx {
            tick: event.tick,
            input_slot: slot,
            param,
            state: &state,
            rng,
            pulse: &pulse,
            param_target: def.param_map.as_ref().map(|m| m.target),
        };
        let outcome = on_control(&mut ctx);
        if let Some(p) = outcome.param {
            self.params.insert(event.node.clone(), clamp_step(p));
        }
        if let Some(s) = outcome.state {
            self.states.insert(event.node.clone(), s);
        }
    }

    fn deliver_signal(
        &mut self,
        registry: &Registry,
        tick: f64,
        event: &RuntimeEvent,
        window_start: f64,
        outputs: &mut Vec<OutputEvent>,
    ) {
        let Some(node) = self.graph.node(&event.node) else {
            self.warnings.record(WARN_MISSING_NODE);
            return;
        };
        let type_key = node.type_key.clone();
        let fallback_param = node.param;

        if type_key == OUTPUT_TYPE {
            if tick < window_start {
                self.warnings.record(WARN_LATE_EVENT);
                return;
            }
            let pulse = event.pulse.clamped();
            outputs.push(OutputEvent {
                tick,
                node: event.node.clone(),
                value: pulse.value,
                params: pulse.params,
            });
            return;
        }

        let Some(def) = registry.get(&type_key) else {
            self.warnings.record(WARN_MISSING_TYPE);
            return;
        };
        let Some(on_signal) = def.on_signal else {
            self.warnings.record(WARN_MISSING_TYPE);
            return;
        };
        let Some(slot) = self.input_slot(event) else {
            return;
        };

        let param = *self.params.get(&event.node).unwrap_or(&fallback_param);
        let state = self.states.get(&event.node).cloned().unwrap_or_default();
        let pulse = event.pulse.clamped();
        let seed = self.settings.seed;
        let rng = self
            .rngs
            .entry(event.node.clone())
            .or_insert_with(|| NodeRng::new(seed, node_id_hash(event.node.as_str())));

        let mut ctx = BehaviorCtx {
            tick,
            input_slot: slot,
            param,
            state: &state,
            rng,
            pulse: &pulse,
            param_target: def.param_map.as_ref().map(|m| m.target),
        };
        let outcome = on_signal(&mut ctx);

        if let Some(s) = outcome.state {
            self.states.insert(event.node.clone(), s);
        }
        if let Some(period) = outcome.reschedule_self {
            let next = tick + period.max(self.settings.min_delay_ticks);
            self.enqueue_guarded(RuntimeEvent {
                tick: next,
                node: event.node.clone(),
                edge: None,
                role: EdgeRole::Signal,
                pulse: Pulse::new(1, 1),
                emit_time: tick,
            });
        }

        for out in outcome.outputs {
            let speed = clamp_step(out.speed.unwrap_or(pulse.speed));
            let next_pulse = Pulse {
                value: out.value,
                speed,
                params: out.params.or_else(|| pulse.params.clone()),
            }
            .clamped();

            // One edge per directed port: the fan-out target, if cabled.
            let Some(edge) = self.graph.edge_from(&event.node, out.slot) else {
                continue;
            };
            let (edge_id, to, role, delay) = (
                edge.id.clone(),
                edge.to.node.clone(),
                edge.role,
                edge.delay,
            );
            let effective = (delay / speed as f64).max(self.settings.min_delay_ticks);
            self.enqueue_guarded(RuntimeEvent {
                tick: tick + effective,
                node: to,
                edge: Some(edge_id),
                role,
                pulse: next_pulse.clone(),
                emit_time: tick,
            });
        }
    }

    /// Enqueue under the capacity policy: the soft cap warns, the hard cap
    /// drops new events and never shifts existing ones.
    fn enqueue_guarded(&mut self, event: RuntimeEvent) {
        if let Some(hard) = self.settings.queue_hard_cap {
            if self.scheduler.len() >= hard {
                self.warnings.record(WARN_QUEUE_OVERFLOW);
                return;
            }
        }
        if self.scheduler.len() >= self.settings.queue_soft_cap {
            self.warnings.record(WARN_QUEUE_OVERFLOW);
        }
        self.scheduler.enqueue(event);
    }

    /// Splice a patch into the live graph. `window_end` is the upper bound
    /// of the audio lookahead window: in-flight events due before it keep
    /// their timing even when their edge's delay changed.
    pub fn apply_patch(&mut self, patch: &GraphPatch, window_end: f64) {
        for eid in &patch.removed_edges {
            self.scheduler.remove_by_edge(eid);
            self.graph.edges.retain(|e| e.id != *eid);
        }
        for nid in &patch.removed_nodes {
            self.scheduler.remove_by_node(nid);
            self.graph.nodes.retain(|n| n.id != *nid);
            self.params.remove(nid);
            self.states.remove(nid);
            self.rngs.remove(nid);
        }
        for node in &patch.added_nodes {
            if self.graph.node(&node.id).is_none() {
                self.init_node(node.id.clone(), node.param, node.state.clone());
                self.graph.nodes.push(node.clone());
            }
        }
        for edge in &patch.added_edges {
            if self.graph.edge(&edge.id).is_none() {
                self.graph.edges.push(edge.clone());
            }
        }
        self.graph.reindex();

        for (nid, param) in &patch.updated_params {
            let clamped = clamp_step(*param);
            self.params.insert(nid.clone(), clamped);
            if let Some(&i) = self.graph.node_index.get(nid) {
                self.graph.nodes[i].param = clamped;
            }
        }

        for (eid, new_delay) in &patch.updated_edges {
            if let Some(&i) = self.graph.edge_index.get(eid) {
                self.graph.edges[i].delay = new_delay.max(0.0);
            } else {
                self.warnings.record(WARN_MISSING_EDGE);
                continue;
            }
            for mut entry in self.scheduler.take_edge(eid) {
                let current = entry.event.tick;
                if current < window_end {
                    // Already inside the audible window: keep as-is.
                    self.scheduler.restore(entry);
                    continue;
                }
                let speed = clamp_step(entry.event.pulse.speed) as f64;
                let retimed = entry.event.emit_time
                    + (new_delay / speed).max(self.settings.min_delay_ticks);
                if retimed < window_end {
                    // Moving into the window could double-fire against the
                    // bridge watermark: keep as-is.
                    self.scheduler.restore(entry);
                    continue;
                }
                entry.event.tick = retimed;
                self.scheduler.restore(entry);
            }
        }
    }

    /// Project every in-flight cable event to a thumb position at `now`.
    pub fn get_thumb_state(&self, now: f64) -> Vec<ThumbState> {
        let mut entries: Vec<&ScheduledEvent> = self
            .scheduler
            .iter()
            .filter(|e| e.event.edge.is_some())
            .collect();
        entries.sort_by(|a, b| {
            a.event
                .tick
                .total_cmp(&b.event.tick)
                .then(a.seq.cmp(&b.seq))
        });
        entries
            .into_iter()
            .filter_map(|e| {
                let edge = e.event.edge.clone()?;
                let effective = e.event.tick - e.event.emit_time;
                let progress = if effective > 0.0 {
                    ((now - e.event.emit_time) / effective).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                Some(ThumbState {
                    edge,
                    progress,
                    speed: e.event.pulse.speed,
                    emit_tick: Some(e.event.emit_time),
                })
            })
            .collect()
    }
}
