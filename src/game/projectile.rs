//! Projectile simulation
//!
//! Every in-flight shot is tracked server-side and integrated by elapsed
//! wall-clock time, not frame count. A shot dies on wall impact, leaving the
//! playfield, or exceeding its lifetime; none of those emit damage. The set
//! also answers threat queries for bot dodging: closed-form time-to-impact of
//! a moving point against the bot's body circle.

use std::collections::HashSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::arena::{Wall, ARENA_HEIGHT, ARENA_WIDTH};
use super::geometry;

/// Maximum projectile lifetime in milliseconds
pub const PROJECTILE_LIFETIME_MS: u64 = 4_000;

/// Per-frame weapon speeds scale to per-second rates by the nominal client
/// frame rate.
pub const FRAME_RATE_SCALE: f32 = 60.0;

/// In-flight projectile. `id` is monotonic and unique within a match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Projectile {
    pub id: u64,
    pub owner: Uuid,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub radius: f32,
    /// Scalar speed in units per second
    pub speed: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub spawned_at: u64,
    #[serde(skip)]
    pub last_update: u64,
}

/// A projectile on course to intersect a queried body circle
#[derive(Debug, Clone, Copy)]
pub struct Threat {
    pub projectile_id: u64,
    /// Seconds until predicted impact
    pub time_to_impact: f32,
    pub impact_x: f32,
    pub impact_y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub x: f32,
    pub y: f32,
}

/// Result of a threat query
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreatQuery {
    /// Closest approaching threat, if any
    pub threat: Option<Threat>,
    /// Approaching projectiles rejected because a wall occludes them
    pub occluded: u32,
}

/// All live projectiles for the current match
#[derive(Default)]
pub struct ProjectileSet {
    live: Vec<Projectile>,
    next_id: u64,
    /// Bullet ids already consumed by hit resolution (idempotent damage)
    spent: HashSet<u64>,
}

impl ProjectileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validated shot. Speed is per-frame (weapon table units) and
    /// is scaled to a per-second rate here.
    pub fn spawn(
        &mut self,
        owner: Uuid,
        x: f32,
        y: f32,
        angle: f32,
        speed_per_frame: f32,
        radius: f32,
        now: u64,
    ) -> Projectile {
        self.next_id += 1;
        let speed = speed_per_frame * FRAME_RATE_SCALE;
        let projectile = Projectile {
            id: self.next_id,
            owner,
            x,
            y,
            angle,
            radius,
            speed,
            vel_x: angle.cos() * speed,
            vel_y: angle.sin() * speed,
            spawned_at: now,
            last_update: now,
        };
        self.live.push(projectile.clone());
        projectile
    }

    /// Advance every projectile by elapsed wall-clock time and cull the dead.
    /// Wall impact uses both the endpoint circle test and a sampled sweep of
    /// the traveled segment so fast shots cannot tunnel through thin walls.
    pub fn advance(&mut self, now: u64, walls: &[Wall]) {
        self.live.retain_mut(|p| {
            if now.saturating_sub(p.spawned_at) > PROJECTILE_LIFETIME_MS {
                return false;
            }

            let dt = now.saturating_sub(p.last_update) as f32 / 1000.0;
            p.last_update = now;
            let prev_x = p.x;
            let prev_y = p.y;
            p.x += p.vel_x * dt;
            p.y += p.vel_y * dt;

            if p.x < -p.radius
                || p.x > ARENA_WIDTH + p.radius
                || p.y < -p.radius
                || p.y > ARENA_HEIGHT + p.radius
            {
                return false;
            }

            !swept_hits_wall(prev_x, prev_y, p.x, p.y, p.radius, walls)
        });
    }

    /// Consume a bullet id for hit resolution. Returns `false` when the id
    /// was already processed; each id applies damage at most once.
    pub fn consume(&mut self, bullet_id: u64) -> bool {
        if !self.spent.insert(bullet_id) {
            return false;
        }
        self.live.retain(|p| p.id != bullet_id);
        true
    }

    /// Owner of a still-live bullet
    pub fn owner_of(&self, bullet_id: u64) -> Option<Uuid> {
        self.live.iter().find(|p| p.id == bullet_id).map(|p| p.owner)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Projectile> {
        self.live.iter()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn clear(&mut self) {
        self.live.clear();
        self.spent.clear();
    }

    /// Find the closest enemy projectile whose swept path comes within
    /// `body_radius + projectile radius` of `(x, y)` inside the lookahead
    /// window. Approaches occluded by a wall are rejected but counted, which
    /// feeds the bots' peek trigger.
    pub fn closest_threat(
        &self,
        x: f32,
        y: f32,
        body_radius: f32,
        exclude_owner: Uuid,
        walls: &[Wall],
        lookahead_secs: f32,
    ) -> ThreatQuery {
        let mut query = ThreatQuery::default();
        let mut best_time = f32::INFINITY;

        for p in &self.live {
            if p.owner == exclude_owner {
                continue;
            }

            let Some(t) = time_to_impact(p, x, y, body_radius + p.radius) else {
                continue;
            };
            if t > lookahead_secs {
                continue;
            }

            if !geometry::line_of_sight(p.x, p.y, x, y, walls) {
                query.occluded += 1;
                continue;
            }

            if t < best_time {
                best_time = t;
                query.threat = Some(Threat {
                    projectile_id: p.id,
                    time_to_impact: t,
                    impact_x: p.x + p.vel_x * t,
                    impact_y: p.y + p.vel_y * t,
                    vel_x: p.vel_x,
                    vel_y: p.vel_y,
                    x: p.x,
                    y: p.y,
                });
            }
        }

        query
    }
}

/// Smallest non-negative time at which the projectile's center comes within
/// `radius` of the fixed point, solving |p + v t| = radius for t.
fn time_to_impact(p: &Projectile, x: f32, y: f32, radius: f32) -> Option<f32> {
    let rel_x = p.x - x;
    let rel_y = p.y - y;

    // Already inside the combined radius
    if rel_x * rel_x + rel_y * rel_y <= radius * radius {
        return Some(0.0);
    }

    let a = p.vel_x * p.vel_x + p.vel_y * p.vel_y;
    if a < f32::EPSILON {
        return None;
    }

    let b = 2.0 * (rel_x * p.vel_x + rel_y * p.vel_y);
    if b >= 0.0 {
        return None; // moving away
    }

    let c = rel_x * rel_x + rel_y * rel_y - radius * radius;
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }

    let t = (-b - disc.sqrt()) / (2.0 * a);
    (t >= 0.0).then_some(t)
}

/// Sampled sweep from the previous to the new position at sub-radius step
/// size, plus the endpoint circle check.
fn swept_hits_wall(x0: f32, y0: f32, x1: f32, y1: f32, radius: f32, walls: &[Wall]) -> bool {
    if geometry::circle_overlaps_any(x1, y1, radius, walls) {
        return true;
    }

    let length = geometry::dist(x0, y0, x1, y1);
    let step = (radius * 0.5).max(1.0);
    let steps = (length / step).ceil() as usize;

    for i in 1..steps {
        let t = i as f32 / steps as f32;
        let x = x0 + (x1 - x0) * t;
        let y = y0 + (y1 - y0) * t;
        if geometry::circle_overlaps_any(x, y, radius, walls) {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn integrates_by_elapsed_time() {
        let mut set = ProjectileSet::new();
        let p = set.spawn(owner(), 100.0, 300.0, 0.0, 10.0, 5.0, 1_000);
        assert_eq!(p.id, 1);

        set.advance(1_100, &[]); // 100ms at 600 units/s
        let p = set.iter().next().unwrap();
        assert!((p.x - 160.0).abs() < 0.5);
        assert!((p.y - 300.0).abs() < 0.5);
    }

    #[test]
    fn expires_on_lifetime_and_bounds() {
        let mut set = ProjectileSet::new();
        set.spawn(owner(), 100.0, 300.0, 0.0, 1.0, 5.0, 0);
        set.advance(PROJECTILE_LIFETIME_MS + 1, &[]);
        assert!(set.is_empty());

        set.spawn(owner(), 890.0, 300.0, 0.0, 20.0, 5.0, 0);
        set.advance(200, &[]); // exits the playfield to the right
        assert!(set.is_empty());
    }

    #[test]
    fn thin_wall_stops_fast_projectile() {
        // 24 units/frame = 1440/s crosses a 20-wide wall within one tick;
        // the sampled sweep must still catch the impact.
        let walls = vec![Wall {
            x: 400.0,
            y: 0.0,
            width: 20.0,
            height: 600.0,
        }];
        let mut set = ProjectileSet::new();
        set.spawn(owner(), 300.0, 300.0, 0.0, 24.0, 4.0, 0);
        set.advance(100, &walls); // travels 144 units, through the wall band
        assert!(set.is_empty());
    }

    #[test]
    fn consume_is_idempotent() {
        let mut set = ProjectileSet::new();
        let p = set.spawn(owner(), 100.0, 100.0, 0.0, 10.0, 5.0, 0);
        assert!(set.consume(p.id));
        assert!(!set.consume(p.id));
        assert!(set.is_empty());
    }

    #[test]
    fn threat_query_finds_approaching_shot() {
        let shooter = owner();
        let mut set = ProjectileSet::new();
        // Heading straight at (500, 300) from the left
        set.spawn(shooter, 200.0, 300.0, 0.0, 12.0, 10.0, 0);

        let q = set.closest_threat(500.0, 300.0, 20.0, Uuid::new_v4(), &[], 1.5);
        let threat = q.threat.expect("threat expected");
        assert!(threat.time_to_impact > 0.0 && threat.time_to_impact < 0.5);
        assert!((threat.impact_y - 300.0).abs() < 1.0);

        // The bot's own shot is never a threat to itself
        let own = set.closest_threat(500.0, 300.0, 20.0, shooter, &[], 1.5);
        assert!(own.threat.is_none());
    }

    #[test]
    fn receding_shot_is_not_a_threat() {
        let mut set = ProjectileSet::new();
        set.spawn(owner(), 200.0, 300.0, std::f32::consts::PI, 12.0, 10.0, 0);
        let q = set.closest_threat(500.0, 300.0, 20.0, Uuid::new_v4(), &[], 1.5);
        assert!(q.threat.is_none());
        assert_eq!(q.occluded, 0);
    }

    #[test]
    fn occluded_threat_is_counted_not_returned() {
        let walls = vec![Wall {
            x: 340.0,
            y: 250.0,
            width: 30.0,
            height: 100.0,
        }];
        let mut set = ProjectileSet::new();
        set.spawn(owner(), 200.0, 300.0, 0.0, 12.0, 10.0, 0);

        let q = set.closest_threat(500.0, 300.0, 20.0, Uuid::new_v4(), &walls, 1.5);
        assert!(q.threat.is_none());
        assert_eq!(q.occluded, 1);
    }
}
