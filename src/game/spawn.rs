//! Spawn placement with fairness constraints
//!
//! A spawn candidate must clear every wall, keep a minimum distance to every
//! other alive entity, and have no open sightline to any of them (no
//! cross-map sniping the instant a match starts). Sampling is bounded; when
//! the budget runs out the best-scoring candidate seen so far is used, and
//! as an absolute last resort the playfield center.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::warn;

use super::arena::{Wall, ARENA_HEIGHT, ARENA_WIDTH, PLAYER_RADIUS};
use super::geometry;

/// Minimum distance between freshly placed entities
pub const MIN_SPAWN_SPACING: f32 = 150.0;

/// Extra wall clearance beyond the body radius
const SPAWN_WALL_MARGIN: f32 = 10.0;

/// Full-constraint sampling budget
const SPAWN_ATTEMPTS: usize = 1500;

/// Clearance-only fallback budget
const FALLBACK_ATTEMPTS: usize = 500;

/// Positions of entities already placed (alive only)
#[derive(Debug, Clone, Copy)]
pub struct SpawnNeighbor {
    pub x: f32,
    pub y: f32,
}

/// Pick a spawn point for a new entity.
///
/// Never loops unbounded: after `SPAWN_ATTEMPTS` full-constraint samples the
/// best partial candidate wins (more occluded sightlines first, then larger
/// minimum distance), after `FALLBACK_ATTEMPTS` clearance-only samples the
/// playfield center is returned.
pub fn place(walls: &[Wall], others: &[SpawnNeighbor], rng: &mut ChaCha8Rng) -> (f32, f32) {
    let mut best: Option<(f32, f32)> = None;
    // (occluded sightlines, min distance) - lexicographic score
    let mut best_score = (0usize, f32::NEG_INFINITY);

    for _ in 0..SPAWN_ATTEMPTS {
        let x = rng.gen_range(2.0 * PLAYER_RADIUS..ARENA_WIDTH - 2.0 * PLAYER_RADIUS);
        let y = rng.gen_range(2.0 * PLAYER_RADIUS..ARENA_HEIGHT - 2.0 * PLAYER_RADIUS);

        if geometry::circle_overlaps_any(x, y, PLAYER_RADIUS + SPAWN_WALL_MARGIN, walls) {
            continue;
        }

        let min_dist = others
            .iter()
            .map(|n| geometry::dist(x, y, n.x, n.y))
            .fold(f32::INFINITY, f32::min);

        let occluded = others
            .iter()
            .filter(|n| !geometry::line_of_sight(x, y, n.x, n.y, walls))
            .count();

        if min_dist >= MIN_SPAWN_SPACING && occluded == others.len() {
            return (x, y);
        }

        let score = (occluded, min_dist);
        if score.0 > best_score.0 || (score.0 == best_score.0 && score.1 > best_score.1) {
            best_score = score;
            best = Some((x, y));
        }
    }

    if let Some(pos) = best {
        warn!(
            occluded = best_score.0,
            min_dist = best_score.1,
            "spawn budget exhausted, using best partial candidate"
        );
        return pos;
    }

    // Nothing with wall clearance found yet: relax everything except clearance.
    for _ in 0..FALLBACK_ATTEMPTS {
        let x = rng.gen_range(PLAYER_RADIUS..ARENA_WIDTH - PLAYER_RADIUS);
        let y = rng.gen_range(PLAYER_RADIUS..ARENA_HEIGHT - PLAYER_RADIUS);
        if !geometry::circle_overlaps_any(x, y, PLAYER_RADIUS, walls) {
            warn!("spawn fairness fully relaxed, using clearance-only position");
            return (x, y);
        }
    }

    warn!("spawn placement exhausted all budgets, using playfield center");
    (ARENA_WIDTH / 2.0, ARENA_HEIGHT / 2.0)
}
