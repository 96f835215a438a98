//! Planar boolean combination of flattened outlines.
//!
//! Works on polygon rings produced by flattening bezier outlines:
//! every segment is split at its intersections with every other
//! segment, each resulting piece is classified by sampling the combined
//! winding predicate just left and just right of its midpoint, boundary
//! pieces are kept oriented interior-on-the-left, and the survivors are
//! chained back into closed rings. Degenerate (zero-area) results are
//! valid and come out as an empty ring set.

use crate::model::BoolOp;
use kurbo::{BezPath, PathEl, Point, Vec2};
use std::collections::HashMap;

/// A closed polygon ring (first point not repeated at the end).
pub(crate) type Ring = Vec<Point>;

/// All rings contributed by one child of a boolean group.
#[derive(Debug, Clone, Default)]
pub(crate) struct PolySet {
    pub rings: Vec<Ring>,
}

/// Flattening tolerance for curve → polyline conversion.
pub(crate) const FLATTEN_TOLERANCE: f64 = 0.05;

/// Flatten a path into closed rings. Open subpaths are closed implicitly.
pub(crate) fn flatten(path: &BezPath) -> PolySet {
    let mut rings = Vec::new();
    let mut current: Ring = Vec::new();
    kurbo::flatten(path.elements().iter().copied(), FLATTEN_TOLERANCE, |el| match el {
        PathEl::MoveTo(p) => {
            push_ring(&mut rings, std::mem::take(&mut current));
            current.push(p);
        }
        PathEl::LineTo(p) => current.push(p),
        PathEl::ClosePath => push_ring(&mut rings, std::mem::take(&mut current)),
        // flatten() only emits move/line/close
        _ => {}
    });
    push_ring(&mut rings, current);
    PolySet { rings }
}

fn push_ring(rings: &mut Vec<Ring>, mut ring: Ring) {
    if let (Some(&first), Some(&last)) = (ring.first(), ring.last())
        && ring.len() > 1
        && (last - first).hypot() < 1e-12
    {
        ring.pop();
    }
    if ring.len() >= 3 {
        rings.push(ring);
    }
}

// ─── Combination ─────────────────────────────────────────────────────────

/// Boolean-combine the children's ring sets under `op`, z-order first.
pub(crate) fn combine(children: &[PolySet], op: BoolOp) -> Vec<Ring> {
    if children.is_empty() {
        return Vec::new();
    }

    // Pool every segment, remembering which child it came from.
    let mut segs: Vec<(Point, Point, usize)> = Vec::new();
    for (child, set) in children.iter().enumerate() {
        for ring in &set.rings {
            for i in 0..ring.len() {
                let a = ring[i];
                let b = ring[(i + 1) % ring.len()];
                if (b - a).hypot() > 1e-12 {
                    segs.push((a, b, child));
                }
            }
        }
    }
    if segs.is_empty() {
        return Vec::new();
    }

    let diag = pool_diagonal(&segs);
    let sample_eps = diag * 1e-6 + 1e-9;
    let snap = diag * 1e-9 + 1e-12;

    // Split each segment at every crossing with every other segment.
    let mut pieces: Vec<(Point, Point)> = Vec::new();
    for (i, &(a, b, _)) in segs.iter().enumerate() {
        let mut ts = vec![0.0, 1.0];
        for (j, &(c, d, _)) in segs.iter().enumerate() {
            if i != j {
                split_params(a, b, c, d, &mut ts);
            }
        }
        ts.sort_by(f64::total_cmp);
        ts.dedup_by(|x, y| (*x - *y).abs() < 1e-9);
        for w in ts.windows(2) {
            let pa = lerp(a, b, w[0]);
            let pb = lerp(a, b, w[1]);
            if (pb - pa).hypot() > snap {
                pieces.push((pa, pb));
            }
        }
    }

    // Classify every piece by the combined predicate on each side.
    let mut kept: Vec<(Point, Point)> = Vec::new();
    let mut seen: HashMap<(i64, i64, i64, i64), ()> = HashMap::new();
    let mut inside = vec![false; children.len()];
    for &(a, b) in &pieces {
        let mid = lerp(a, b, 0.5);
        let dir = (b - a) / (b - a).hypot();
        let left = Vec2::new(-dir.y, dir.x);
        let sample_l = mid + left * sample_eps;
        let sample_r = mid - left * sample_eps;

        for (c, set) in children.iter().enumerate() {
            inside[c] = winding(set, sample_l) != 0;
        }
        let pred_l = op_predicate(op, &inside);
        for (c, set) in children.iter().enumerate() {
            inside[c] = winding(set, sample_r) != 0;
        }
        let pred_r = op_predicate(op, &inside);

        if pred_l == pred_r {
            continue; // not a boundary of the result
        }
        let (start, end) = if pred_l { (a, b) } else { (b, a) };
        // Coincident edges of different children produce identical
        // pieces — keep one.
        let key = (
            quant(start.x, snap),
            quant(start.y, snap),
            quant(end.x, snap),
            quant(end.y, snap),
        );
        if seen.insert(key, ()).is_none() {
            kept.push((start, end));
        }
    }

    chain(kept, snap)
}

/// Is a point covered by the result, given per-child coverage.
fn op_predicate(op: BoolOp, inside: &[bool]) -> bool {
    match op {
        BoolOp::Add => inside.iter().any(|&b| b),
        BoolOp::Subtract => inside[0] && !inside[1..].iter().any(|&b| b),
        BoolOp::Intersect => inside.iter().all(|&b| b),
        BoolOp::ExcludeOverlap => inside.iter().filter(|&&b| b).count() % 2 == 1,
    }
}

/// Push the parameters (along a→b) where c→d crosses or overlaps it.
fn split_params(a: Point, b: Point, c: Point, d: Point, ts: &mut Vec<f64>) {
    let r = b - a;
    let s = d - c;
    let denom = r.cross(s);
    let qp = c - a;
    if denom.abs() > 1e-12 {
        let t = qp.cross(s) / denom;
        let u = qp.cross(r) / denom;
        if (-1e-9..=1.0 + 1e-9).contains(&t) && (-1e-9..=1.0 + 1e-9).contains(&u) {
            ts.push(t.clamp(0.0, 1.0));
        }
    } else if qp.cross(r).abs() < 1e-9 {
        // Collinear: split at the other segment's endpoint projections.
        let len2 = r.hypot2();
        if len2 > 1e-24 {
            for p in [c, d] {
                let t = (p - a).dot(r) / len2;
                if (0.0..=1.0).contains(&t) {
                    ts.push(t);
                }
            }
        }
    }
}

/// Nonzero winding number of a point against a child's rings.
fn winding(set: &PolySet, p: Point) -> i32 {
    let mut w = 0;
    for ring in &set.rings {
        for i in 0..ring.len() {
            let a = ring[i];
            let b = ring[(i + 1) % ring.len()];
            if a.y <= p.y {
                if b.y > p.y && cross3(a, b, p) > 0.0 {
                    w += 1;
                }
            } else if b.y <= p.y && cross3(a, b, p) < 0.0 {
                w -= 1;
            }
        }
    }
    w
}

fn cross3(a: Point, b: Point, p: Point) -> f64 {
    (b.x - a.x) * (p.y - a.y) - (p.x - a.x) * (b.y - a.y)
}

/// Chain kept boundary pieces into closed rings by endpoint matching.
fn chain(pieces: Vec<(Point, Point)>, snap: f64) -> Vec<Ring> {
    let mut by_start: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (i, &(start, _)) in pieces.iter().enumerate() {
        by_start
            .entry((quant(start.x, snap), quant(start.y, snap)))
            .or_default()
            .push(i);
    }

    let mut used = vec![false; pieces.len()];
    let mut rings = Vec::new();

    for seed in 0..pieces.len() {
        if used[seed] {
            continue;
        }
        used[seed] = true;
        let (start, mut cursor) = pieces[seed];
        let start_key = (quant(start.x, snap), quant(start.y, snap));
        let mut ring: Ring = vec![start];

        loop {
            let key = (quant(cursor.x, snap), quant(cursor.y, snap));
            if key == start_key {
                break; // closed
            }
            let next = by_start
                .get(&key)
                .and_then(|cands| cands.iter().copied().find(|&i| !used[i]));
            match next {
                Some(i) => {
                    used[i] = true;
                    ring.push(cursor);
                    cursor = pieces[i].1;
                }
                None => {
                    ring.clear(); // open chain — numeric orphan, drop it
                    break;
                }
            }
        }
        if ring.len() >= 3 {
            rings.push(ring);
        }
    }
    rings
}

fn quant(v: f64, snap: f64) -> i64 {
    (v / snap).round() as i64
}

fn lerp(a: Point, b: Point, t: f64) -> Point {
    Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t)
}

fn pool_diagonal(segs: &[(Point, Point, usize)]) -> f64 {
    let mut min = Point::new(f64::MAX, f64::MAX);
    let mut max = Point::new(f64::MIN, f64::MIN);
    for &(a, b, _) in segs {
        for p in [a, b] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
    }
    (max - min).hypot().max(1.0)
}

// ─── Ring queries ────────────────────────────────────────────────────────

/// Net signed area of a ring set. Outer rings come out of `combine`
/// counter-clockwise (positive), holes clockwise (negative), so the sum
/// is the covered area.
pub(crate) fn rings_area(rings: &[Ring]) -> f64 {
    let mut total = 0.0;
    for ring in rings {
        let mut acc = 0.0;
        for i in 0..ring.len() {
            let a = ring[i];
            let b = ring[(i + 1) % ring.len()];
            acc += a.x * b.y - b.x * a.y;
        }
        total += acc / 2.0;
    }
    total.max(0.0)
}

pub(crate) fn rings_to_path(rings: &[Ring]) -> BezPath {
    let mut path = BezPath::new();
    for ring in rings {
        if let Some((&first, rest)) = ring.split_first() {
            path.move_to(first);
            for &p in rest {
                path.line_to(p);
            }
            path.close_path();
        }
    }
    path
}
