//! Node behavior contract and the builtin behavior functions.
//!
//! Behaviors are synchronous and pure: they read the context, consume the
//! per-node RNG when they declare randomness, and describe every effect in
//! the returned outcome. The runtime owns node state and applies returned
//! updates after the call.

use patchwire_types::{clamp_step, Pulse, PulseParams};

/// Per-node runtime state. Most builtin nodes are stateless; `Counter`
/// backs step-cycling behaviors.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NodeState {
    #[default]
    Empty,
    Counter(u64),
}

/// Deterministic per-node generator: a 64-bit LCG seeded from the global
/// seed XOR a stable hash of the node id. Identical seed and graph replay
/// to identical streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRng {
    state: u64,
}

impl NodeRng {
    pub fn new(global_seed: u64, node_hash: u64) -> Self {
        Self {
            state: global_seed ^ node_hash,
        }
    }

    fn next(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state >> 33
    }

    /// Uniform value in the 1..=8 step range.
    pub fn next_step(&mut self) -> u8 {
        (self.next() % 8) as u8 + 1
    }
}

/// Stable 64-bit hash of a node id (FNV-1a).
pub fn node_id_hash(id: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in id.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

/// Everything a behavior may read.
pub struct BehaviorCtx<'a> {
    pub tick: f64,
    /// Input slot the pulse arrived on. Zero for self-scheduled source
    /// firings.
    pub input_slot: usize,
    /// The node's current merged param.
    pub param: u8,
    pub state: &'a NodeState,
    pub rng: &'a mut NodeRng,
    pub pulse: &'a Pulse,
    /// Effect key from the type's param map, when it has one.
    pub param_target: Option<&'a str>,
}

/// One pulse leaving an output slot. `speed`/`params` of `None` inherit
/// from the incoming pulse.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPulse {
    pub slot: usize,
    pub value: u8,
    pub speed: Option<u8>,
    pub params: Option<PulseParams>,
}

/// Result of `on_control`. Fields left `None` change nothing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControlOutcome {
    pub param: Option<u8>,
    pub state: Option<NodeState>,
}

/// Result of `on_signal`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignalOutcome {
    pub outputs: Vec<OutputPulse>,
    pub state: Option<NodeState>,
    /// Source nodes re-arm themselves: schedule another self-firing this
    /// many ticks from now.
    pub reschedule_self: Option<f64>,
}

pub type InitStateFn = fn() -> NodeState;
pub type OnControlFn = fn(&mut BehaviorCtx) -> ControlOutcome;
pub type OnSignalFn = fn(&mut BehaviorCtx) -> SignalOutcome;

fn emit(slot: usize, value: u8) -> OutputPulse {
    OutputPulse {
        slot,
        value,
        speed: None,
        params: None,
    }
}

/// Default control behavior: the pulse value becomes the node's param.
pub fn control_set_param(ctx: &mut BehaviorCtx) -> ControlOutcome {
    ControlOutcome {
        param: Some(clamp_step(ctx.pulse.value)),
        state: None,
    }
}

/// `pulse`: fires value 1 / speed 1 on its output every `param` ticks.
/// An incoming signal pulse re-syncs the phase (fires now, re-arms).
pub fn pulse_signal(ctx: &mut BehaviorCtx) -> SignalOutcome {
    SignalOutcome {
        outputs: vec![OutputPulse {
            slot: 0,
            value: 1,
            speed: Some(1),
            params: None,
        }],
        state: None,
        reschedule_self: Some(clamp_step(ctx.param) as f64),
    }
}

/// `random`: replaces the pulse value with a uniform 1..=8 draw.
pub fn random_signal(ctx: &mut BehaviorCtx) -> SignalOutcome {
    SignalOutcome {
        outputs: vec![emit(0, ctx.rng.next_step())],
        ..Default::default()
    }
}

/// `speed`: passes the value through, stamping speed = param.
pub fn speed_signal(ctx: &mut BehaviorCtx) -> SignalOutcome {
    SignalOutcome {
        outputs: vec![OutputPulse {
            slot: 0,
            value: ctx.pulse.value,
            speed: Some(clamp_step(ctx.param)),
            params: None,
        }],
        ..Default::default()
    }
}

/// `set`: replaces the pulse value with the node's param.
pub fn set_signal(ctx: &mut BehaviorCtx) -> SignalOutcome {
    SignalOutcome {
        outputs: vec![emit(0, clamp_step(ctx.param))],
        ..Default::default()
    }
}

/// `split`: fans the pulse out to all six outputs.
pub fn split_signal(ctx: &mut BehaviorCtx) -> SignalOutcome {
    SignalOutcome {
        outputs: (0..6).map(|slot| emit(slot, ctx.pulse.value)).collect(),
        ..Default::default()
    }
}

/// `seq`: each incoming pulse advances to the next of the first
/// `min(param, 6)` outputs.
pub fn seq_signal(ctx: &mut BehaviorCtx) -> SignalOutcome {
    let steps = (clamp_step(ctx.param) as u64).min(6);
    let count = match ctx.state {
        NodeState::Counter(n) => *n,
        NodeState::Empty => 0,
    };
    let slot = (count % steps) as usize;
    SignalOutcome {
        outputs: vec![emit(slot, ctx.pulse.value)],
        state: Some(NodeState::Counter(count.wrapping_add(1))),
        reschedule_self: None,
    }
}

pub fn seq_init() -> NodeState {
    NodeState::Counter(0)
}

/// `merge`: forwards any input to the single output.
pub fn merge_signal(ctx: &mut BehaviorCtx) -> SignalOutcome {
    SignalOutcome {
        outputs: vec![emit(0, ctx.pulse.value)],
        ..Default::default()
    }
}

/// Param-map nodes (`decay`, `crush`, `lpf`, `hpf`): pass the pulse through
/// with the node's effect key stamped into the params overlay.
pub fn stamp_param_signal(ctx: &mut BehaviorCtx) -> SignalOutcome {
    let mut params = ctx.pulse.params.clone().unwrap_or_default();
    if let Some(target) = ctx.param_target {
        params.insert(target.to_string(), clamp_step(ctx.param));
    }
    SignalOutcome {
        outputs: vec![OutputPulse {
            slot: 0,
            value: ctx.pulse.value,
            speed: None,
            params: Some(params),
        }],
        ..Default::default()
    }
}
