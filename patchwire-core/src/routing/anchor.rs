//! Port anchor derivation.
//!
//! Anchors are derived in unrotated node-local space from the registry
//! layout, then rotated about the node center in 90-degree steps and
//! translated to world grid coordinates. Slot indices never change under
//! rotation; only the geometry moves.

use patchwire_types::{GridPoint, NodeRecord, PortDirection, Rotation, Side};

use crate::registry::{NodeLayout, PortSpec};

/// A world-space port anchor plus its outward normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub pos: GridPoint,
    /// Outward unit normal after rotation.
    pub normal: (i64, i64),
}

/// Unrotated node-local anchor for a port spec. The body is an `L x L`
/// square with anchors on its boundary grid intersections.
fn local_anchor(spec: &PortSpec, side_len: i64) -> (i64, i64) {
    match spec.side {
        Side::Left => (0, spec.offset),
        Side::Right => (side_len, spec.offset),
        Side::Top => (spec.offset, 0),
        Side::Bottom => (spec.offset, side_len),
    }
}

/// Rotate a local point clockwise about the body center in quarter turns.
/// Works in doubled coordinates so odd side lengths stay on the grid.
fn rotate_local(point: (i64, i64), side_len: i64, rotation: Rotation) -> (i64, i64) {
    let c = side_len; // doubled center coordinate
    let (mut x2, mut y2) = (point.0 * 2, point.1 * 2);
    for _ in 0..rotation.quarter_turns() {
        let (vx, vy) = (x2 - c, y2 - c);
        // Clockwise quarter turn with y pointing down: (x, y) -> (-y, x).
        x2 = c - vy;
        y2 = c + vx;
    }
    (x2 / 2, y2 / 2)
}

fn rotate_vector(v: (i64, i64), rotation: Rotation) -> (i64, i64) {
    let (mut x, mut y) = v;
    for _ in 0..rotation.quarter_turns() {
        let (px, py) = (x, y);
        x = -py;
        y = px;
    }
    (x, y)
}

/// Derive the world anchor of a port.
pub fn port_anchor(
    node: &NodeRecord,
    layout: &NodeLayout,
    direction: PortDirection,
    slot: usize,
) -> Option<Anchor> {
    let spec = layout.port(direction, slot)?;
    let local = local_anchor(spec, layout.side_len);
    let (lx, ly) = rotate_local(local, layout.side_len, node.rotation);
    let normal = rotate_vector(spec.side.normal(), node.rotation);
    Some(Anchor {
        pos: GridPoint::new(node.pos.x + lx, node.pos.y + ly),
        normal,
    })
}
