//! Event types that flow through the runtime and out of it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::graph::EdgeRole;
use crate::{clamp_step, EdgeId, NodeId};

/// Per-event effect-parameter overlay carried on a pulse, keyed by effect
/// name (`"lpf"`, `"crush"`, ...). Values live in the 1..=8 step range like
/// everything else.
pub type PulseParams = BTreeMap<String, u8>;

/// The payload travelling along a cable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pulse {
    pub value: u8,
    pub speed: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<PulseParams>,
}

impl Pulse {
    pub fn new(value: u8, speed: u8) -> Self {
        Self {
            value,
            speed,
            params: None,
        }
    }

    /// Copy with every numeric field forced into 1..=8.
    pub fn clamped(&self) -> Pulse {
        Pulse {
            value: clamp_step(self.value),
            speed: clamp_step(self.speed),
            params: self.params.as_ref().map(|p| {
                p.iter()
                    .map(|(k, v)| (k.clone(), clamp_step(*v)))
                    .collect()
            }),
        }
    }
}

/// An in-flight scheduled event: a pulse due at `tick` on the input end of
/// `edge`. `emit_time` is the tick the pulse left its source node; it is
/// what reschedules anchor to when edge geometry changes underneath an
/// event.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeEvent {
    pub tick: f64,
    /// Target node (the edge's `to` endpoint, or the firing node itself
    /// for self-scheduled source events).
    pub node: NodeId,
    /// `None` for self-scheduled source firings, which travel no cable.
    pub edge: Option<EdgeId>,
    pub role: EdgeRole,
    pub pulse: Pulse,
    pub emit_time: f64,
}

/// A trigger that reached an output node, ready for the audio bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputEvent {
    pub tick: f64,
    pub node: NodeId,
    pub value: u8,
    pub params: Option<PulseParams>,
}

/// UI projection of one in-flight pulse as a thumb sliding along its cable.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbState {
    pub edge: EdgeId,
    /// Position along the cable, 0 at the source port, 1 at the target.
    pub progress: f64,
    pub speed: u8,
    pub emit_tick: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulse_clamping_covers_params() {
        let mut params = PulseParams::new();
        params.insert("lpf".into(), 0);
        params.insert("crush".into(), 42);
        let p = Pulse {
            value: 0,
            speed: 99,
            params: Some(params),
        };
        let c = p.clamped();
        assert_eq!(c.value, 1);
        assert_eq!(c.speed, 8);
        let cp = c.params.unwrap();
        assert_eq!(cp["lpf"], 1);
        assert_eq!(cp["crush"], 8);
    }
}
