//! Geometry kernel - circle/rectangle/segment intersection primitives
//!
//! Stateless math shared by every other game module. Walls are axis-aligned
//! rectangles; entities and projectiles are circles.

use super::arena::Wall;

/// Squared distance between two points
pub fn dist_sq(x0: f32, y0: f32, x1: f32, y1: f32) -> f32 {
    let dx = x1 - x0;
    let dy = y1 - y0;
    dx * dx + dy * dy
}

/// Distance between two points
pub fn dist(x0: f32, y0: f32, x1: f32, y1: f32) -> f32 {
    dist_sq(x0, y0, x1, y1).sqrt()
}

/// Normalize an angle into [-π, π)
pub fn wrap_angle(angle: f32) -> f32 {
    let a = (angle + std::f32::consts::PI).rem_euclid(std::f32::consts::TAU);
    a - std::f32::consts::PI
}

/// Is the point inside the rectangle (inclusive)?
pub fn point_in_rect(px: f32, py: f32, wall: &Wall) -> bool {
    px >= wall.x && px <= wall.x + wall.width && py >= wall.y && py <= wall.y + wall.height
}

/// Closest point on a rectangle to a circle center
pub fn closest_point_on_rect(cx: f32, cy: f32, wall: &Wall) -> (f32, f32) {
    (
        cx.clamp(wall.x, wall.x + wall.width),
        cy.clamp(wall.y, wall.y + wall.height),
    )
}

/// Does a circle overlap a rectangle?
pub fn circle_overlaps_rect(cx: f32, cy: f32, radius: f32, wall: &Wall) -> bool {
    let (px, py) = closest_point_on_rect(cx, cy, wall);
    dist_sq(cx, cy, px, py) < radius * radius
}

/// Does a circle overlap any wall in the set?
pub fn circle_overlaps_any(cx: f32, cy: f32, radius: f32, walls: &[Wall]) -> bool {
    walls.iter().any(|w| circle_overlaps_rect(cx, cy, radius, w))
}

/// Does the segment (x0,y0)->(x1,y1) intersect the rectangle?
/// Liang-Barsky clip; endpoints inside the rectangle count as intersecting.
pub fn segment_intersects_rect(x0: f32, y0: f32, x1: f32, y1: f32, wall: &Wall) -> bool {
    let dx = x1 - x0;
    let dy = y1 - y0;

    let p = [-dx, dx, -dy, dy];
    let q = [
        x0 - wall.x,
        wall.x + wall.width - x0,
        y0 - wall.y,
        wall.y + wall.height - y0,
    ];

    let mut t0 = 0.0f32;
    let mut t1 = 1.0f32;

    for i in 0..4 {
        if p[i].abs() < f32::EPSILON {
            if q[i] < 0.0 {
                return false;
            }
        } else {
            let r = q[i] / p[i];
            if p[i] < 0.0 {
                if r > t1 {
                    return false;
                }
                if r > t0 {
                    t0 = r;
                }
            } else {
                if r < t0 {
                    return false;
                }
                if r < t1 {
                    t1 = r;
                }
            }
        }
    }

    true
}

/// Is the straight line between two points free of walls?
pub fn line_of_sight(x0: f32, y0: f32, x1: f32, y1: f32, walls: &[Wall]) -> bool {
    !walls
        .iter()
        .any(|w| segment_intersects_rect(x0, y0, x1, y1, w))
}

/// Push a circle out of a wall along the penetration normal.
/// Returns the corrected center, or `None` if there is no overlap.
pub fn push_circle_out_of_rect(cx: f32, cy: f32, radius: f32, wall: &Wall) -> Option<(f32, f32)> {
    if point_in_rect(cx, cy, wall) {
        // Center inside the wall: exit through the nearest face.
        let left = cx - wall.x;
        let right = wall.x + wall.width - cx;
        let top = cy - wall.y;
        let bottom = wall.y + wall.height - cy;
        let min = left.min(right).min(top).min(bottom);

        return Some(if min == left {
            (wall.x - radius, cy)
        } else if min == right {
            (wall.x + wall.width + radius, cy)
        } else if min == top {
            (cx, wall.y - radius)
        } else {
            (cx, wall.y + wall.height + radius)
        });
    }

    let (px, py) = closest_point_on_rect(cx, cy, wall);
    let d_sq = dist_sq(cx, cy, px, py);
    if d_sq >= radius * radius {
        return None;
    }

    let d = d_sq.sqrt().max(1e-4);
    let nx = (cx - px) / d;
    let ny = (cy - py) / d;
    Some((px + nx * radius, py + ny * radius))
}

/// Resolve a circle against every wall in the set
pub fn push_circle_out_of_walls(cx: f32, cy: f32, radius: f32, walls: &[Wall]) -> (f32, f32) {
    let mut x = cx;
    let mut y = cy;
    for wall in walls {
        if let Some((nx, ny)) = push_circle_out_of_rect(x, y, radius, wall) {
            x = nx;
            y = ny;
        }
    }
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall() -> Wall {
        Wall {
            x: 100.0,
            y: 100.0,
            width: 200.0,
            height: 40.0,
        }
    }

    #[test]
    fn circle_rect_overlap() {
        let w = wall();
        assert!(circle_overlaps_rect(90.0, 110.0, 15.0, &w));
        assert!(!circle_overlaps_rect(80.0, 110.0, 15.0, &w));
        // Corner case: diagonal distance matters, not axis distance
        assert!(circle_overlaps_rect(92.0, 92.0, 12.0, &w));
        assert!(!circle_overlaps_rect(88.0, 88.0, 12.0, &w));
    }

    #[test]
    fn segment_rect_intersection() {
        let w = wall();
        // Crosses the wall horizontally
        assert!(segment_intersects_rect(50.0, 120.0, 350.0, 120.0, &w));
        // Passes above it
        assert!(!segment_intersects_rect(50.0, 50.0, 350.0, 50.0, &w));
        // Endpoint inside
        assert!(segment_intersects_rect(150.0, 120.0, 400.0, 400.0, &w));
        // Degenerate segment outside
        assert!(!segment_intersects_rect(10.0, 10.0, 10.0, 10.0, &w));
    }

    #[test]
    fn line_of_sight_through_gap() {
        let walls = vec![wall()];
        assert!(!line_of_sight(50.0, 120.0, 350.0, 120.0, &walls));
        assert!(line_of_sight(50.0, 300.0, 350.0, 300.0, &walls));
    }

    #[test]
    fn push_out_restores_clearance() {
        let w = wall();
        let (nx, ny) = push_circle_out_of_rect(95.0, 120.0, 15.0, &w).unwrap();
        assert!(!circle_overlaps_rect(nx, ny, 14.9, &w));

        // Center inside the wall exits through nearest face
        let (nx, ny) = push_circle_out_of_rect(110.0, 120.0, 15.0, &w).unwrap();
        assert!(!point_in_rect(nx, ny, &w));
    }

    #[test]
    fn wrap_angle_range() {
        assert!((wrap_angle(3.0 * std::f32::consts::PI).abs() - std::f32::consts::PI).abs() < 1e-4);
        assert!(wrap_angle(-7.0).abs() <= std::f32::consts::PI);
    }
}
