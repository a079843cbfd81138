//! Arena generation - playfield constants and random wall layout
//!
//! The playfield is a fixed 900x600 rectangle. Each match generates a fresh
//! set of 8-12 axis-aligned rectangular walls. Placement uses a coarse
//! occupancy grid with one cell of padding so walls never touch each other;
//! if a wall cannot be placed within its attempt budget it is skipped, so a
//! layout may end up with fewer walls than requested. Attempts are bounded,
//! generation never loops forever.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Playfield dimensions
pub const ARENA_WIDTH: f32 = 900.0;
pub const ARENA_HEIGHT: f32 = 600.0;

/// Entity body radius
pub const PLAYER_RADIUS: f32 = 20.0;

/// Maximum entity health
pub const MAX_HEALTH: f32 = 100.0;

/// Wall count range per layout
const MIN_WALLS: usize = 8;
const MAX_WALLS: usize = 12;

/// Wall dimension ranges (long side / short side)
const WALL_LENGTH_MIN: f32 = 60.0;
const WALL_LENGTH_MAX: f32 = 260.0;
const WALL_THICKNESS_MIN: f32 = 20.0;
const WALL_THICKNESS_MAX: f32 = 42.0;

/// Keep walls off the playfield border so spawn clearance stays possible
const EDGE_MARGIN: f32 = 50.0;

/// Occupancy grid cell size for overlap rejection
const OCCUPANCY_CELL: f32 = 30.0;

/// Placement attempts per wall before giving up on it
const ATTEMPTS_PER_WALL: usize = 25;

/// Axis-aligned rectangular wall. Immutable once generated; the whole set is
/// replaced on each new match, bumping the layout version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Generate a random wall layout for a new match
pub fn generate_walls(rng: &mut ChaCha8Rng) -> Vec<Wall> {
    let cols = (ARENA_WIDTH / OCCUPANCY_CELL) as usize;
    let rows = (ARENA_HEIGHT / OCCUPANCY_CELL) as usize;
    let mut occupied = vec![false; cols * rows];

    let target = rng.gen_range(MIN_WALLS..=MAX_WALLS);
    let mut walls = Vec::with_capacity(target);

    for _ in 0..target {
        let mut placed = false;

        for _ in 0..ATTEMPTS_PER_WALL {
            let length = rng.gen_range(WALL_LENGTH_MIN..WALL_LENGTH_MAX);
            let thickness = rng.gen_range(WALL_THICKNESS_MIN..WALL_THICKNESS_MAX);
            let (width, height) = if rng.gen_bool(0.5) {
                (length, thickness)
            } else {
                (thickness, length)
            };

            if width > ARENA_WIDTH - 2.0 * EDGE_MARGIN || height > ARENA_HEIGHT - 2.0 * EDGE_MARGIN
            {
                continue;
            }

            let x = rng.gen_range(EDGE_MARGIN..(ARENA_WIDTH - EDGE_MARGIN - width));
            let y = rng.gen_range(EDGE_MARGIN..(ARENA_HEIGHT - EDGE_MARGIN - height));
            let wall = Wall {
                x,
                y,
                width,
                height,
            };

            if footprint_free(&wall, &occupied, cols, rows) {
                mark_footprint(&wall, &mut occupied, cols, rows);
                walls.push(wall);
                placed = true;
                break;
            }
        }

        if !placed {
            debug!("wall placement attempts exhausted, accepting shorter layout");
        }
    }

    walls
}

/// Grid cells a wall covers, padded by one cell on every side
fn footprint(wall: &Wall, cols: usize, rows: usize) -> (usize, usize, usize, usize) {
    let c0 = ((wall.x / OCCUPANCY_CELL) as isize - 1).max(0) as usize;
    let r0 = ((wall.y / OCCUPANCY_CELL) as isize - 1).max(0) as usize;
    let c1 = ((((wall.x + wall.width) / OCCUPANCY_CELL) as usize) + 1).min(cols - 1);
    let r1 = ((((wall.y + wall.height) / OCCUPANCY_CELL) as usize) + 1).min(rows - 1);
    (c0, r0, c1, r1)
}

fn footprint_free(wall: &Wall, occupied: &[bool], cols: usize, rows: usize) -> bool {
    let (c0, r0, c1, r1) = footprint(wall, cols, rows);
    for r in r0..=r1 {
        for c in c0..=c1 {
            if occupied[r * cols + c] {
                return false;
            }
        }
    }
    true
}

fn mark_footprint(wall: &Wall, occupied: &mut [bool], cols: usize, rows: usize) {
    let (c0, r0, c1, r1) = footprint(wall, cols, rows);
    for r in r0..=r1 {
        for c in c0..=c1 {
            occupied[r * cols + c] = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::geometry;
    use rand::SeedableRng;

    #[test]
    fn walls_stay_in_bounds() {
        for seed in 0..20 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            for wall in generate_walls(&mut rng) {
                assert!(wall.x >= 0.0 && wall.y >= 0.0);
                assert!(wall.x + wall.width <= ARENA_WIDTH);
                assert!(wall.y + wall.height <= ARENA_HEIGHT);
            }
        }
    }

    #[test]
    fn walls_do_not_overlap() {
        for seed in 0..20 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let walls = generate_walls(&mut rng);
            for (i, a) in walls.iter().enumerate() {
                for b in walls.iter().skip(i + 1) {
                    let overlap = a.x < b.x + b.width
                        && b.x < a.x + a.width
                        && a.y < b.y + b.height
                        && b.y < a.y + a.height;
                    assert!(!overlap, "walls {a:?} and {b:?} overlap");
                }
            }
        }
    }

    #[test]
    fn layout_leaves_walkable_space() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let walls = generate_walls(&mut rng);
        // At least one spot on the playfield must have full clearance
        let mut found = false;
        let mut y = PLAYER_RADIUS;
        while y < ARENA_HEIGHT - PLAYER_RADIUS && !found {
            let mut x = PLAYER_RADIUS;
            while x < ARENA_WIDTH - PLAYER_RADIUS && !found {
                if !geometry::circle_overlaps_any(x, y, PLAYER_RADIUS, &walls) {
                    found = true;
                }
                x += 20.0;
            }
            y += 20.0;
        }
        assert!(found);
    }
}
