//! Ramer–Douglas–Peucker simplification of polygon rings.

/// `[lon, lat]` position.
pub type Point = [f64; 2];

/// Smallest valid closed ring: three corners plus the closing point.
pub const MIN_RING_POINTS: usize = 4;

/// Simplify a closed ring. A tolerance of zero or less, or a result that
/// would no longer be a valid ring, returns the ring unchanged.
pub fn simplify_ring(ring: &[Point], tolerance: f64) -> Vec<Point> {
    if tolerance <= 0.0 || ring.len() <= MIN_RING_POINTS {
        return ring.to_vec();
    }

    let last = ring.len() - 1;
    let mut keep = vec![false; ring.len()];
    keep[0] = true;
    keep[last] = true;

    let mut stack = vec![(0usize, last)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }

        let (mut farthest, mut max_dist) = (start, 0.0);
        for i in start + 1..end {
            let d = segment_distance(ring[i], ring[start], ring[end]);
            if d > max_dist {
                farthest = i;
                max_dist = d;
            }
        }

        if max_dist > tolerance {
            keep[farthest] = true;
            stack.push((start, farthest));
            stack.push((farthest, end));
        }
    }

    let simplified: Vec<Point> = ring
        .iter()
        .zip(&keep)
        .filter(|(_, &k)| k)
        .map(|(p, _)| *p)
        .collect();

    if simplified.len() < MIN_RING_POINTS {
        ring.to_vec()
    } else {
        simplified
    }
}

/// Euclidean distance from `p` to the segment `a`-`b`.
fn segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return (p[0] - a[0]).hypot(p[1] - a[1]);
    }
    let t = (((p[0] - a[0]) * dx + (p[1] - a[1]) * dy) / len_sq).clamp(0.0, 1.0);
    let (cx, cy) = (a[0] + t * dx, a[1] + t * dy);
    (p[0] - cx).hypot(p[1] - cy)
}
