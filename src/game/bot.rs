//! Bot intelligence - perception, tactical state machine, lead-aim ballistics
//!
//! Every tick each bot recomputes its decision from scratch as a pure
//! transition function over its `BotMemory` side table. The output is a
//! movement direction, an aim angle and a fire flag; the match applies
//! movement, wall resolution and shot validation.

use std::collections::{HashSet, VecDeque};

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use crate::store::weapons::WeaponStats;

use super::arena::{Wall, ARENA_HEIGHT, ARENA_WIDTH, PLAYER_RADIUS};
use super::geometry;
use super::nav::{self, NavCache};
use super::projectile::{ProjectileSet, Threat, FRAME_RATE_SCALE};

/// Preferred engagement band: close beyond the far edge, back off inside the
/// near edge, orbit in between.
const DESIRED_RANGE_NEAR: f32 = 180.0;
const DESIRED_RANGE_FAR: f32 = 320.0;

/// Maximum range at which a bot will fire
pub const MAX_ENGAGE_RANGE: f32 = 600.0;

/// Lead-aim intercept horizon (seconds) and aim noise (radians)
const MAX_LEAD_TIME: f32 = 1.5;
const AIM_JITTER: f32 = 0.06;

/// Threat lookahead window for dodging (seconds)
const DODGE_LOOKAHEAD: f32 = 0.9;
/// How long one dodge commitment lasts
const DODGE_MS: u64 = 400;
/// Lateral distance used to score dodge candidates
const DODGE_STEP: f32 = 40.0;

/// Occluded-threat encounters before a peek resolution triggers
const PEEK_TRIGGER: u32 = 3;
const PEEK_MS: u64 = 800;

/// Path considered stale after traveling this far from where it was computed
const PATH_STALE_DIST: f32 = PLAYER_RADIUS * 2.5;
/// Waypoint reached threshold
const WAYPOINT_REACHED: f32 = 12.0;
/// Cooldown after a failed path search
const PATH_RETRY_MS: u64 = 700;

/// Stuck detection: sampling window and minimum net displacement
const STUCK_WINDOW_MS: u64 = 1_000;
const STUCK_MIN_TRAVEL: f32 = 8.0;

/// Periodic pause: roll interval, probability, duration
const PAUSE_ROLL_MS: u64 = 2_500;
const PAUSE_PROBABILITY: f64 = 0.15;
const PAUSE_MS: u64 = 350;

/// Strafe direction flip cooldown
const STRAFE_FLIP_MS: u64 = 900;

/// Named tactical movement modes.
///
/// Transition triggers, in priority order:
/// - `Dodge`: an approaching enemy projectile will pass within body range
///   inside the lookahead window (one commitment per distinct projectile).
/// - `Charge` / `Fallback`: peek resolution after repeated occluded-threat
///   encounters; a coin flip commits to pushing through or backing off.
/// - `PathFollow`: no line of sight to the target; A* path active.
/// - `Chase` / `Retreat` / `Strafe`: line of sight held, selected by the
///   distance band around the desired range.
/// - `Pause`: periodic randomized stop, only out of the banded modes.
/// - `Idle`: no alive human target exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TacticalMode {
    #[default]
    Idle,
    Chase,
    Retreat,
    Strafe,
    Dodge,
    Charge,
    Fallback,
    PathFollow,
    Pause,
}

/// Committed dodge against one specific projectile
#[derive(Debug, Clone)]
pub struct DodgePlan {
    pub projectile_id: u64,
    pub dir: (f32, f32),
    pub until: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeekKind {
    Charge,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct PeekPlan {
    pub kind: PeekKind,
    pub until: u64,
}

/// Active smoothed path being followed
#[derive(Debug, Clone)]
pub struct ActivePath {
    pub points: Vec<(f32, f32)>,
    pub next: usize,
    /// Bot position when the path was computed (staleness check)
    pub computed_at: (f32, f32),
}

/// Per-bot ephemeral memory, kept in a side table keyed by bot id and pruned
/// when the bot or its target leaves the entity set.
#[derive(Debug, Default)]
pub struct BotMemory {
    pub target_id: Option<Uuid>,
    pub last_target_pos: Option<(f32, f32)>,
    pub last_target_at: u64,
    pub target_vel: (f32, f32),

    pub mode: TacticalMode,
    pub strafe_dir: f32,
    pub strafe_flip_at: u64,

    pub dodge: Option<DodgePlan>,
    pub occluded_hits: u32,
    pub peek: Option<PeekPlan>,

    pub path: Option<ActivePath>,
    pub path_retry_at: u64,
    pub stuck_samples: VecDeque<(u64, f32, f32)>,

    pub paused_until: u64,
    pub next_pause_roll: u64,
    pub fire_ready_at: u64,
}

impl BotMemory {
    pub fn new() -> Self {
        Self {
            strafe_dir: 1.0,
            ..Self::default()
        }
    }
}

/// What a bot can see of a potential target
#[derive(Debug, Clone, Copy)]
pub struct TargetView {
    pub id: Uuid,
    pub x: f32,
    pub y: f32,
    /// Bot-allied targets are never fired upon
    pub allied: bool,
}

/// Decision output applied by the match
#[derive(Debug, Clone, Copy, Default)]
pub struct BotCommand {
    /// Normalized movement direction (zero when holding still)
    pub move_x: f32,
    pub move_y: f32,
    pub aim: f32,
    pub fire: bool,
}

/// Everything a bot consults while deciding
pub struct BotWorld<'a> {
    pub walls: &'a [Wall],
    pub layout_version: u64,
    pub nav: &'a mut NavCache,
    pub projectiles: &'a ProjectileSet,
    pub targets: &'a [TargetView],
    pub now: u64,
}

/// Run one decision tick for a bot
pub fn decide(
    bot_id: Uuid,
    x: f32,
    y: f32,
    weapon: &WeaponStats,
    world: &mut BotWorld,
    memory: &mut BotMemory,
    rng: &mut ChaCha8Rng,
) -> BotCommand {
    let now = world.now;

    // Prune memory that references a target no longer in the entity set
    if let Some(tid) = memory.target_id {
        if !world.targets.iter().any(|t| t.id == tid) {
            memory.target_id = None;
            memory.last_target_pos = None;
            memory.target_vel = (0.0, 0.0);
            memory.path = None;
        }
    }

    let Some(target) = nearest_target(x, y, world.targets) else {
        memory.mode = TacticalMode::Idle;
        return BotCommand::default();
    };

    update_target_memory(memory, &target, now);
    let target_vel = memory.target_vel;

    let bullet_speed = weapon.bullet_speed * FRAME_RATE_SCALE;
    let aim = lead_aim(x, y, target.x, target.y, target_vel, bullet_speed, rng);

    let dist = geometry::dist(x, y, target.x, target.y);
    let has_los = geometry::line_of_sight(x, y, target.x, target.y, world.walls);

    let fire = !target.allied
        && has_los
        && dist <= MAX_ENGAGE_RANGE
        && now >= memory.fire_ready_at;
    if fire {
        memory.fire_ready_at = now + weapon.cooldown_ms;
    }

    // Threat scan feeds both dodging and the peek trigger
    let query = world
        .projectiles
        .closest_threat(x, y, PLAYER_RADIUS, bot_id, world.walls, DODGE_LOOKAHEAD);

    memory.occluded_hits += query.occluded;
    if memory.peek.is_none() && memory.occluded_hits >= PEEK_TRIGGER {
        memory.occluded_hits = 0;
        memory.peek = Some(PeekPlan {
            kind: if rng.gen_bool(0.5) {
                PeekKind::Charge
            } else {
                PeekKind::Fallback
            },
            until: now + PEEK_MS,
        });
    }
    if memory.peek.as_ref().map(|p| now >= p.until).unwrap_or(false) {
        memory.peek = None;
    }
    if memory.dodge.as_ref().map(|d| now >= d.until).unwrap_or(false) {
        memory.dodge = None;
    }

    // Movement mode selection, highest priority first
    let (move_x, move_y) = if let Some(threat) = query.threat {
        memory.mode = TacticalMode::Dodge;
        dodge_direction(x, y, &threat, memory, now)
    } else if let Some(peek) = memory.peek.clone() {
        match peek.kind {
            PeekKind::Charge => {
                memory.mode = TacticalMode::Charge;
                direction(x, y, target.x, target.y)
            }
            PeekKind::Fallback => {
                memory.mode = TacticalMode::Fallback;
                let (ax, ay) = direction(target.x, target.y, x, y);
                let (sx, sy) = perpendicular(ax, ay, memory.strafe_dir);
                normalize(ax + sx * 0.5, ay + sy * 0.5)
            }
        }
    } else if !has_los {
        memory.mode = TacticalMode::PathFollow;
        follow_path(bot_id, x, y, (target.x, target.y), world, memory)
    } else {
        banded_movement(x, y, &target, dist, memory, rng, now)
    };

    track_stuck(memory, x, y, world.walls, now);

    BotCommand {
        move_x,
        move_y,
        aim,
        fire,
    }
}

/// Nearest alive human target
fn nearest_target(x: f32, y: f32, targets: &[TargetView]) -> Option<TargetView> {
    targets
        .iter()
        .copied()
        .min_by(|a, b| {
            geometry::dist_sq(x, y, a.x, a.y)
                .partial_cmp(&geometry::dist_sq(x, y, b.x, b.y))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

/// Finite-difference velocity estimate over the memory window
fn update_target_memory(memory: &mut BotMemory, target: &TargetView, now: u64) {
    if memory.target_id == Some(target.id) {
        if let Some((lx, ly)) = memory.last_target_pos {
            let dt = now.saturating_sub(memory.last_target_at).max(1) as f32 / 1000.0;
            memory.target_vel = ((target.x - lx) / dt, (target.y - ly) / dt);
        }
    } else {
        memory.target_id = Some(target.id);
        memory.target_vel = (0.0, 0.0);
        memory.path = None;
    }
    memory.last_target_pos = Some((target.x, target.y));
    memory.last_target_at = now;
}

/// Solve the intercept time |target + v·t - shooter| = bullet_speed·t and aim
/// at the extrapolated point, with bounded random inaccuracy.
pub fn lead_aim(
    x: f32,
    y: f32,
    tx: f32,
    ty: f32,
    (vx, vy): (f32, f32),
    bullet_speed: f32,
    rng: &mut ChaCha8Rng,
) -> f32 {
    let dx = tx - x;
    let dy = ty - y;

    let a = vx * vx + vy * vy - bullet_speed * bullet_speed;
    let b = 2.0 * (dx * vx + dy * vy);
    let c = dx * dx + dy * dy;

    let t = if a.abs() < 1e-3 {
        // Target speed ~= bullet speed: degenerate to the linear case
        if b.abs() < 1e-3 {
            0.0
        } else {
            (-c / b).max(0.0)
        }
    } else {
        let disc = b * b - 4.0 * a * c;
        if disc < 0.0 {
            0.0
        } else {
            let sqrt = disc.sqrt();
            let t1 = (-b - sqrt) / (2.0 * a);
            let t2 = (-b + sqrt) / (2.0 * a);
            smallest_positive(t1, t2).unwrap_or(0.0)
        }
    }
    .min(MAX_LEAD_TIME);

    let aim_x = tx + vx * t;
    let aim_y = ty + vy * t;
    let jitter = rng.gen_range(-AIM_JITTER..AIM_JITTER);
    (aim_y - y).atan2(aim_x - x) + jitter
}

fn smallest_positive(t1: f32, t2: f32) -> Option<f32> {
    match (t1 > 0.0, t2 > 0.0) {
        (true, true) => Some(t1.min(t2)),
        (true, false) => Some(t1),
        (false, true) => Some(t2),
        (false, false) => None,
    }
}

/// Perpendicular evasion, committed once per distinct threatening projectile.
/// The sign is chosen to maximize distance from the threat's swept path and
/// its predicted impact point.
fn dodge_direction(
    x: f32,
    y: f32,
    threat: &Threat,
    memory: &mut BotMemory,
    now: u64,
) -> (f32, f32) {
    if let Some(plan) = &memory.dodge {
        if plan.projectile_id == threat.projectile_id {
            return plan.dir;
        }
    }

    let (vx, vy) = normalize(threat.vel_x, threat.vel_y);
    let candidates = [(-vy, vx), (vy, -vx)];

    let score = |(px, py): (f32, f32)| {
        let cx = x + px * DODGE_STEP;
        let cy = y + py * DODGE_STEP;
        point_line_distance(cx, cy, threat.x, threat.y, vx, vy)
            + geometry::dist(cx, cy, threat.impact_x, threat.impact_y)
    };

    let dir = if score(candidates[0]) >= score(candidates[1]) {
        candidates[0]
    } else {
        candidates[1]
    };

    memory.dodge = Some(DodgePlan {
        projectile_id: threat.projectile_id,
        dir,
        until: now + DODGE_MS,
    });
    dir
}

/// Distance from a point to the infinite line through (ox, oy) along (dx, dy)
fn point_line_distance(px: f32, py: f32, ox: f32, oy: f32, dx: f32, dy: f32) -> f32 {
    ((px - ox) * dy - (py - oy) * dx).abs()
}

/// Distance-banded chase / retreat / orbit-strafe with the periodic pause
fn banded_movement(
    x: f32,
    y: f32,
    target: &TargetView,
    dist: f32,
    memory: &mut BotMemory,
    rng: &mut ChaCha8Rng,
    now: u64,
) -> (f32, f32) {
    if now >= memory.next_pause_roll {
        memory.next_pause_roll = now + PAUSE_ROLL_MS;
        if rng.gen_bool(PAUSE_PROBABILITY) {
            memory.paused_until = now + PAUSE_MS;
        }
    }
    if now < memory.paused_until {
        memory.mode = TacticalMode::Pause;
        return (0.0, 0.0);
    }

    let (tx, ty) = direction(x, y, target.x, target.y);

    if dist > DESIRED_RANGE_FAR {
        memory.mode = TacticalMode::Chase;
        (tx, ty)
    } else if dist < DESIRED_RANGE_NEAR {
        memory.mode = TacticalMode::Retreat;
        let (sx, sy) = perpendicular(tx, ty, memory.strafe_dir);
        normalize(-tx + sx * 0.3, -ty + sy * 0.3)
    } else {
        memory.mode = TacticalMode::Strafe;
        if now >= memory.strafe_flip_at {
            memory.strafe_flip_at = now + STRAFE_FLIP_MS;
            if rng.gen_bool(0.35) {
                memory.strafe_dir = -memory.strafe_dir;
            }
        }
        perpendicular(tx, ty, memory.strafe_dir)
    }
}

/// Path following toward an out-of-sight target, with staleness and retry
/// bookkeeping
fn follow_path(
    bot_id: Uuid,
    x: f32,
    y: f32,
    goal: (f32, f32),
    world: &mut BotWorld,
    memory: &mut BotMemory,
) -> (f32, f32) {
    let now = world.now;

    let stale = memory
        .path
        .as_ref()
        .map(|p| geometry::dist(x, y, p.computed_at.0, p.computed_at.1) > PATH_STALE_DIST)
        .unwrap_or(false);
    if stale {
        memory.path = None;
    }

    if memory.path.is_none() && now >= memory.path_retry_at {
        let grid = world.nav.grid(world.walls, world.layout_version);
        let blocked = projectile_cells(world.projectiles, bot_id);

        match nav::find_path(grid, (x, y), goal, &blocked) {
            Some(points) => {
                memory.path = Some(ActivePath {
                    points,
                    next: 1,
                    computed_at: (x, y),
                });
            }
            None => {
                memory.path_retry_at = now + PATH_RETRY_MS;
            }
        }
    }

    let Some(path) = &mut memory.path else {
        // No route available: edge toward the target and retry later
        return direction(x, y, goal.0, goal.1);
    };

    while path.next < path.points.len()
        && geometry::dist(x, y, path.points[path.next].0, path.points[path.next].1)
            < WAYPOINT_REACHED
    {
        path.next += 1;
    }

    if path.next >= path.points.len() {
        memory.path = None;
        return direction(x, y, goal.0, goal.1);
    }

    let (wx, wy) = path.points[path.next];
    direction(x, y, wx, wy)
}

/// Cells temporarily blocked by live enemy projectiles (the cell under each
/// projectile plus its 8 neighbors)
fn projectile_cells(projectiles: &ProjectileSet, bot_id: Uuid) -> HashSet<(i32, i32)> {
    let mut blocked = HashSet::new();
    for p in projectiles.iter() {
        if p.owner == bot_id {
            continue;
        }
        let (c, r) = nav::cell_of(p.x, p.y);
        for dr in -1..=1 {
            for dc in -1..=1 {
                blocked.insert((c + dc, r + dr));
            }
        }
    }
    blocked
}

/// Little-net-movement-while-touching-a-wall detector; fires a forced path
/// recomputation.
fn track_stuck(memory: &mut BotMemory, x: f32, y: f32, walls: &[Wall], now: u64) {
    memory.stuck_samples.push_back((now, x, y));
    while memory
        .stuck_samples
        .front()
        .map(|(t, _, _)| now.saturating_sub(*t) > STUCK_WINDOW_MS)
        .unwrap_or(false)
    {
        memory.stuck_samples.pop_front();
    }

    let Some(&(first_t, fx, fy)) = memory.stuck_samples.front() else {
        return;
    };
    if now.saturating_sub(first_t) < STUCK_WINDOW_MS * 9 / 10 {
        return;
    }

    let touching = geometry::circle_overlaps_any(x, y, PLAYER_RADIUS + 1.0, walls)
        || x <= PLAYER_RADIUS + 1.0
        || y <= PLAYER_RADIUS + 1.0
        || x >= ARENA_WIDTH - PLAYER_RADIUS - 1.0
        || y >= ARENA_HEIGHT - PLAYER_RADIUS - 1.0;

    if touching && geometry::dist(x, y, fx, fy) < STUCK_MIN_TRAVEL {
        memory.path = None;
        memory.path_retry_at = now; // recompute immediately
        memory.stuck_samples.clear();
    }
}

fn direction(from_x: f32, from_y: f32, to_x: f32, to_y: f32) -> (f32, f32) {
    normalize(to_x - from_x, to_y - from_y)
}

fn normalize(dx: f32, dy: f32) -> (f32, f32) {
    let len = (dx * dx + dy * dy).sqrt();
    if len < 1e-4 {
        (0.0, 0.0)
    } else {
        (dx / len, dy / len)
    }
}

fn perpendicular(dx: f32, dy: f32, sign: f32) -> (f32, f32) {
    (-dy * sign, dx * sign)
}
