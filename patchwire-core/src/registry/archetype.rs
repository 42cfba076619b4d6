//! Port-placement archetypes.
//!
//! An archetype fixes where a node's ports sit on its body at rotation 0.
//! Slot ordering comes from the archetype alone and never changes under
//! rotation; rotation only moves the geometry.

use patchwire_types::{GroupDefinition, PortDirection, Side};

/// Named port-placement template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Archetype {
    /// One signal input (left), one output (right).
    SingleIo,
    /// One signal input + one control input (left), one output (right).
    SingleIoControl,
    /// One signal input (left), no outputs. Terminal nodes.
    SingleIn,
    /// One signal input (left), six outputs in the fixed 6-way order.
    MultiOut6,
    /// As `MultiOut6` with an additional control input on the left.
    MultiOut6Control,
    /// Six signal inputs in the fixed 6-way order, one output (left).
    MultiIn6,
    /// Layout projected from a group definition.
    Custom,
}

impl Archetype {
    pub fn key(self) -> &'static str {
        match self {
            Archetype::SingleIo => "single-io",
            Archetype::SingleIoControl => "single-io-control",
            Archetype::SingleIn => "single-in",
            Archetype::MultiOut6 => "multi-out-6",
            Archetype::MultiOut6Control => "multi-out-6-control",
            Archetype::MultiIn6 => "multi-in-6",
            Archetype::Custom => "custom",
        }
    }

    pub fn from_key(key: &str) -> Option<Archetype> {
        match key {
            "single-io" => Some(Archetype::SingleIo),
            "single-io-control" => Some(Archetype::SingleIoControl),
            "single-in" => Some(Archetype::SingleIn),
            "multi-out-6" => Some(Archetype::MultiOut6),
            "multi-out-6-control" => Some(Archetype::MultiOut6Control),
            "multi-in-6" => Some(Archetype::MultiIn6),
            "custom" => Some(Archetype::Custom),
            _ => None,
        }
    }

    /// Port counts this archetype demands: `(inputs, outputs, controls)`.
    /// `Custom` has no fixed counts.
    pub fn expected_counts(self) -> Option<(usize, usize, usize)> {
        match self {
            Archetype::SingleIo => Some((1, 1, 0)),
            Archetype::SingleIoControl => Some((1, 1, 1)),
            Archetype::SingleIn => Some((1, 0, 0)),
            Archetype::MultiOut6 => Some((1, 6, 0)),
            Archetype::MultiOut6Control => Some((1, 6, 1)),
            Archetype::MultiIn6 => Some((6, 1, 0)),
            Archetype::Custom => None,
        }
    }

    pub fn allows_controls(self) -> bool {
        matches!(
            self,
            Archetype::SingleIoControl | Archetype::MultiOut6Control | Archetype::Custom
        )
    }
}

/// The role a port plays, independent of direction: control inputs mutate
/// params; everything else carries signal pulses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortRole {
    Signal,
    Control,
}

/// One derived port: its slot index is its position in the containing list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSpec {
    pub direction: PortDirection,
    pub role: PortRole,
    /// Side of the node body at rotation 0.
    pub side: Side,
    /// 1-based position along that side (anchors land at 1..=N).
    pub offset: i64,
}

/// Complete derived port layout for a node. Input slot order is
/// `[signal ports..., control ports...]`; output slots are archetype order.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeLayout {
    pub inputs: Vec<PortSpec>,
    pub outputs: Vec<PortSpec>,
    /// Body side length `L`; anchors sit at 0 and `L` on the port axes.
    pub side_len: i64,
}

impl NodeLayout {
    pub fn port(&self, direction: PortDirection, slot: usize) -> Option<&PortSpec> {
        match direction {
            PortDirection::Input => self.inputs.get(slot),
            PortDirection::Output => self.outputs.get(slot),
        }
    }

    /// Number of signal inputs; control inputs occupy slots from here up.
    pub fn signal_inputs(&self) -> usize {
        self.inputs
            .iter()
            .filter(|p| p.role == PortRole::Signal)
            .count()
    }
}

/// The globally fixed 6-way placement order: top-left, top-right, right-top,
/// right-bottom, bottom-right, bottom-left. Defined at rotation 0.
const SIX_WAY: [(Side, i64); 6] = [
    (Side::Top, 1),
    (Side::Top, 2),
    (Side::Right, 1),
    (Side::Right, 2),
    (Side::Bottom, 2),
    (Side::Bottom, 1),
];

fn left_ports(count: usize, role_split: usize) -> Vec<PortSpec> {
    (0..count)
        .map(|i| PortSpec {
            direction: PortDirection::Input,
            role: if i < role_split {
                PortRole::Signal
            } else {
                PortRole::Control
            },
            side: Side::Left,
            offset: i as i64 + 1,
        })
        .collect()
}

fn right_ports(count: usize) -> Vec<PortSpec> {
    (0..count)
        .map(|i| PortSpec {
            direction: PortDirection::Output,
            role: PortRole::Signal,
            side: Side::Right,
            offset: i as i64 + 1,
        })
        .collect()
}

fn six_way_ports(direction: PortDirection) -> Vec<PortSpec> {
    SIX_WAY
        .iter()
        .map(|&(side, offset)| PortSpec {
            direction,
            role: PortRole::Signal,
            side,
            offset,
        })
        .collect()
}

/// Derive the layout for a fixed archetype. `Custom` must go through
/// [`custom_layout`] instead.
pub fn archetype_layout(archetype: Archetype) -> Option<NodeLayout> {
    let (inputs, outputs) = match archetype {
        Archetype::SingleIo => (left_ports(1, 1), right_ports(1)),
        Archetype::SingleIoControl => (left_ports(2, 1), right_ports(1)),
        Archetype::SingleIn => (left_ports(1, 1), Vec::new()),
        Archetype::MultiOut6 => (left_ports(1, 1), six_way_ports(PortDirection::Output)),
        Archetype::MultiOut6Control => (left_ports(2, 1), six_way_ports(PortDirection::Output)),
        Archetype::MultiIn6 => (
            six_way_ports(PortDirection::Input),
            // The six fixed positions take top/right/bottom; the single
            // output gets the remaining side.
            vec![PortSpec {
                direction: PortDirection::Output,
                role: PortRole::Signal,
                side: Side::Left,
                offset: 1,
            }],
        ),
        Archetype::Custom => return None,
    };
    Some(finish_layout(inputs, outputs))
}

/// Derive the layout of a group-instance node from its definition:
/// signal inputs then controls down the left edge, outputs down the right.
pub fn custom_layout(def: &GroupDefinition) -> NodeLayout {
    let inputs = left_ports(def.inputs.len() + def.controls.len(), def.inputs.len());
    let outputs = (0..def.outputs.len())
        .map(|i| PortSpec {
            direction: PortDirection::Output,
            role: PortRole::Signal,
            side: Side::Right,
            offset: i as i64 + 1,
        })
        .collect();
    finish_layout(inputs, outputs)
}

fn finish_layout(inputs: Vec<PortSpec>, outputs: Vec<PortSpec>) -> NodeLayout {
    let mut per_side = [0i64; 4];
    for p in inputs.iter().chain(outputs.iter()) {
        let idx = match p.side {
            Side::Left => 0,
            Side::Right => 1,
            Side::Top => 2,
            Side::Bottom => 3,
        };
        per_side[idx] = per_side[idx].max(p.offset);
    }
    let side_len = per_side.iter().copied().max().unwrap_or(0) + 1;
    NodeLayout {
        inputs,
        outputs,
        side_len,
    }
}
