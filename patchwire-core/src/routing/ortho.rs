//! Orthogonal segment routing between hard constraint points.
//!
//! No obstacle avoidance: between consecutive constraints the router emits a
//! straight segment or an L with one bend, choosing the bend axis from the
//! dominant delta (ties go to the configured preference) and flipping to the
//! other L when the first segment would immediately reverse the incoming
//! direction. Manual corners are visited in order, always.

use patchwire_types::GridPoint;

/// Which L-path to prefer when both deltas are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BendPreference {
    #[default]
    HorizontalFirst,
    VerticalFirst,
}

fn dir(from: &GridPoint, to: &GridPoint) -> (i64, i64) {
    ((to.x - from.x).signum(), (to.y - from.y).signum())
}

fn reverses(a: (i64, i64), b: (i64, i64)) -> bool {
    a != (0, 0) && b != (0, 0) && a.0 == -b.0 && a.1 == -b.1
}

/// Append the route from the current endpoint to `target`, bending at most
/// once. `incoming` is the direction of the last emitted segment.
fn route_leg(
    points: &mut Vec<GridPoint>,
    target: GridPoint,
    incoming: &mut (i64, i64),
    pref: BendPreference,
) {
    let Some(&from) = points.last() else {
        return;
    };
    if from == target {
        return;
    }

    if from.x == target.x || from.y == target.y {
        // Aligned: a straight segment. A reversal here is forced by the
        // constraints themselves.
        *incoming = dir(&from, &target);
        points.push(target);
        return;
    }

    let horizontal_first = preferred_axis(&from, &target, *incoming, pref);
    let corner = if horizontal_first {
        GridPoint::new(target.x, from.y)
    } else {
        GridPoint::new(from.x, target.y)
    };

    *incoming = dir(&from, &corner);
    points.push(corner);
    *incoming = dir(&corner, &target);
    points.push(target);
}

/// Decide whether the leg bends horizontal-first, honouring the no-reversal
/// rule over the magnitude heuristic.
fn preferred_axis(
    from: &GridPoint,
    target: &GridPoint,
    incoming: (i64, i64),
    pref: BendPreference,
) -> bool {
    let dx = (target.x - from.x).abs();
    let dy = (target.y - from.y).abs();
    let mut horizontal_first = if dx != dy {
        dx > dy
    } else {
        pref == BendPreference::HorizontalFirst
    };

    let h_start = ((target.x - from.x).signum(), 0);
    let v_start = (0, (target.y - from.y).signum());
    if horizontal_first && reverses(incoming, h_start) && !reverses(incoming, v_start) {
        horizontal_first = false;
    } else if !horizontal_first && reverses(incoming, v_start) && !reverses(incoming, h_start) {
        horizontal_first = true;
    }
    horizontal_first
}

/// Route through an ordered list of hard constraints. Emits the full
/// polyline including both endpoints, with zero-length segments collapsed.
/// Collinear joints (stub ends, aligned manual corners) stay in the point
/// list; they carry no extra bends or length.
pub fn route_constraints(
    constraints: &[GridPoint],
    default_pref: BendPreference,
) -> Vec<GridPoint> {
    let mut points: Vec<GridPoint> = Vec::with_capacity(constraints.len() * 2);
    let mut incoming = (0, 0);

    for (i, c) in constraints.iter().enumerate() {
        if i == 0 {
            points.push(*c);
            continue;
        }
        route_leg(&mut points, *c, &mut incoming, default_pref);
    }

    collapse(points)
}

/// Drop zero-length segments (consecutive duplicate points).
fn collapse(points: Vec<GridPoint>) -> Vec<GridPoint> {
    let mut out: Vec<GridPoint> = Vec::with_capacity(points.len());
    for p in points {
        if out.last() == Some(&p) {
            continue;
        }
        out.push(p);
    }
    out
}

/// Manhattan length of a polyline.
pub fn polyline_length(points: &[GridPoint]) -> u64 {
    points
        .windows(2)
        .map(|w| w[0].manhattan(&w[1]))
        .sum()
}

/// Pure-geometry SVG path data for a polyline.
pub fn svg_path(points: &[GridPoint]) -> String {
    let mut d = String::new();
    for (i, p) in points.iter().enumerate() {
        if i == 0 {
            d.push_str(&format!("M {} {}", p.x, p.y));
        } else {
            d.push_str(&format!(" L {} {}", p.x, p.y));
        }
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: i64, y: i64) -> GridPoint {
        GridPoint::new(x, y)
    }

    #[test]
    fn aligned_is_straight() {
        let pts = route_constraints(&[p(0, 0), p(5, 0)], BendPreference::HorizontalFirst);
        assert_eq!(pts, vec![p(0, 0), p(5, 0)]);
        assert_eq!(polyline_length(&pts), 5);
    }

    #[test]
    fn dominant_delta_picks_first_axis() {
        // |dx| > |dy| -> horizontal first
        let pts = route_constraints(&[p(0, 0), p(5, 2)], BendPreference::HorizontalFirst);
        assert_eq!(pts, vec![p(0, 0), p(5, 0), p(5, 2)]);
        // |dy| > |dx| -> vertical first
        let pts = route_constraints(&[p(0, 0), p(2, 5)], BendPreference::HorizontalFirst);
        assert_eq!(pts, vec![p(0, 0), p(0, 5), p(2, 5)]);
    }

    #[test]
    fn equal_delta_uses_preference() {
        let h = route_constraints(&[p(0, 0), p(3, 3)], BendPreference::HorizontalFirst);
        assert_eq!(h, vec![p(0, 0), p(3, 0), p(3, 3)]);
        let v = route_constraints(&[p(0, 0), p(3, 3)], BendPreference::VerticalFirst);
        assert_eq!(v, vec![p(0, 0), p(0, 3), p(3, 3)]);
    }

    #[test]
    fn avoids_immediate_reversal() {
        // Incoming direction is +x after the first leg; the second target
        // lies up-left, so a horizontal-first bend would reverse. The
        // router must go vertical first.
        let pts = route_constraints(
            &[p(0, 0), p(4, 0), p(1, -3)],
            BendPreference::HorizontalFirst,
        );
        assert_eq!(pts, vec![p(0, 0), p(4, 0), p(4, -3), p(1, -3)]);
    }

    #[test]
    fn corners_are_hard_constraints_in_order() {
        let pts = route_constraints(
            &[p(0, 0), p(2, 2), p(0, 4)],
            BendPreference::HorizontalFirst,
        );
        // Both corners visited, in order.
        let i = pts.iter().position(|q| *q == p(2, 2)).unwrap();
        let j = pts.iter().position(|q| *q == p(0, 4)).unwrap();
        assert!(i < j);
    }

    #[test]
    fn collapse_drops_zero_length_segments_only() {
        let pts = route_constraints(
            &[p(0, 0), p(0, 0), p(2, 0), p(5, 0)],
            BendPreference::HorizontalFirst,
        );
        // duplicate start collapses; the collinear joint stays
        assert_eq!(pts, vec![p(0, 0), p(2, 0), p(5, 0)]);
        assert_eq!(polyline_length(&pts), 5);
    }

    #[test]
    fn collapse_keeps_backtracks() {
        // A manual corner that forces a reversal must not be merged away:
        // the length includes the doubled-back distance.
        let pts = route_constraints(
            &[p(0, 0), p(5, 0), p(2, 0)],
            BendPreference::HorizontalFirst,
        );
        assert_eq!(pts, vec![p(0, 0), p(5, 0), p(2, 0)]);
        assert_eq!(polyline_length(&pts), 8);
    }

    #[test]
    fn svg_path_shape() {
        let pts = vec![p(0, 0), p(3, 0), p(3, 2)];
        assert_eq!(svg_path(&pts), "M 0 0 L 3 0 L 3 2");
    }
}
