//! Combat resolution - shot validation, damage rules, bot-ally exemptions
//!
//! Hit registration is client-reported by design (the original trust model is
//! preserved): the server re-validates target presence/liveness, bullet-id
//! idempotency and the bot-ally rules, but not the geometry of the claimed
//! hit itself. That leaves a known exploit surface where a client can claim
//! hits that never geometrically occurred.

use uuid::Uuid;

use crate::store::weapons::WeaponStats;

use super::arena::Wall;
use super::geometry;
use super::Entity;

/// Coins credited to the shooter's account per elimination
pub const KILL_REWARD: i64 = 10;

/// Cosmetic key bots (and unskinned humans) carry
pub const DEFAULT_SKIN: &str = "default";

/// Display-name prefix synthetic bots use
pub const BOT_NAME_PREFIX: &str = "Bot ";

/// Client-supplied shot overrides may not exceed the table values by more
/// than this factor (keeps modified clients from firing railguns).
const SHOT_OVERRIDE_CAP: f32 = 1.25;

/// Is this entity exempt from bot-inflicted damage? True for actual bots and
/// for humans masquerading as bots (bot-style name with default cosmetics).
pub fn is_bot_allied(entity: &Entity) -> bool {
    entity.is_bot
        || (entity.display_name.starts_with(BOT_NAME_PREFIX) && entity.skin == DEFAULT_SKIN)
}

/// Should this elimination credit the shooter's account? Anti-farming: no
/// credit for self-account kills or for bot-allied shooters farming bots.
pub fn elimination_credits(shooter: &Entity, victim: &Entity) -> bool {
    if shooter.username.is_some() && shooter.username == victim.username {
        return false;
    }
    if is_bot_allied(shooter) && victim.is_bot {
        return false;
    }
    shooter.username.is_some()
}

/// Reject a shot whose straight path from the shooter to the muzzle point is
/// already wall-occluded (prevents firing through walls).
pub fn muzzle_blocked(
    shooter_x: f32,
    shooter_y: f32,
    muzzle_x: f32,
    muzzle_y: f32,
    walls: &[Wall],
) -> bool {
    !geometry::line_of_sight(shooter_x, shooter_y, muzzle_x, muzzle_y, walls)
}

/// Normalize client-supplied shot parameters against the weapon table
pub fn clamp_shot_params(
    stats: &WeaponStats,
    speed: Option<f32>,
    radius: Option<f32>,
) -> (f32, f32) {
    let speed = speed
        .filter(|s| s.is_finite() && *s > 0.0)
        .unwrap_or(stats.bullet_speed)
        .min(stats.bullet_speed * SHOT_OVERRIDE_CAP);
    let radius = radius
        .filter(|r| r.is_finite() && *r > 0.0)
        .unwrap_or(stats.bullet_radius)
        .min(stats.bullet_radius * SHOT_OVERRIDE_CAP);
    (speed, radius)
}

/// Apply damage to health, returns (new_health, killed). Health clamps at 0.
pub fn apply_damage(current_health: f32, damage: f32) -> (f32, bool) {
    let new_health = (current_health - damage).max(0.0);
    (new_health, new_health <= 0.0)
}

/// Why a reported hit was dropped (for tracing)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitRejection {
    TargetAbsent,
    TargetDead,
    DuplicateBullet,
    BotAlliedTarget,
}

/// Bot-ally damage rule: a bot (or bot-allied shooter) never damages a
/// bot-allied target. Human-vs-human and human-vs-bot always resolve.
pub fn hit_allowed(shooter: Option<&Entity>, target: &Entity) -> Result<(), HitRejection> {
    if let Some(shooter) = shooter {
        if is_bot_allied(shooter) && is_bot_allied(target) {
            return Err(HitRejection::BotAlliedTarget);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::weapons::weapon_stats;

    fn entity(name: &str, skin: &str, is_bot: bool, username: Option<&str>) -> Entity {
        Entity {
            id: Uuid::new_v4(),
            username: username.map(str::to_string),
            display_name: name.to_string(),
            color: "#ff0000".to_string(),
            weapon: "pistol".to_string(),
            skin: skin.to_string(),
            x: 0.0,
            y: 0.0,
            angle: 0.0,
            health: 100.0,
            alive: true,
            is_bot,
        }
    }

    #[test]
    fn bot_ally_detection() {
        assert!(is_bot_allied(&entity("Bot Vector", DEFAULT_SKIN, true, None)));
        // Masquerade: bot-style name plus default cosmetics
        assert!(is_bot_allied(&entity("Bot Hunter", DEFAULT_SKIN, false, Some("alice"))));
        // Custom skin breaks the masquerade
        assert!(!is_bot_allied(&entity("Bot Hunter", "gold", false, Some("alice"))));
        assert!(!is_bot_allied(&entity("alice", DEFAULT_SKIN, false, Some("alice"))));
    }

    #[test]
    fn bots_never_damage_allies() {
        let bot = entity("Bot Ace", DEFAULT_SKIN, true, None);
        let other_bot = entity("Bot Orbit", DEFAULT_SKIN, true, None);
        let human = entity("alice", "gold", false, Some("alice"));

        assert_eq!(
            hit_allowed(Some(&bot), &other_bot),
            Err(HitRejection::BotAlliedTarget)
        );
        assert!(hit_allowed(Some(&bot), &human).is_ok());
        assert!(hit_allowed(Some(&human), &other_bot).is_ok());
        assert!(hit_allowed(None, &other_bot).is_ok());
    }

    #[test]
    fn self_account_kill_credits_nothing() {
        let a = entity("alice", "gold", false, Some("alice"));
        let alt = entity("alice_alt", DEFAULT_SKIN, false, Some("alice"));
        let b = entity("bob", DEFAULT_SKIN, false, Some("bob"));
        let bot = entity("Bot Ace", DEFAULT_SKIN, true, None);

        assert!(!elimination_credits(&a, &alt));
        assert!(elimination_credits(&a, &b));
        assert!(elimination_credits(&a, &bot));
        // Masquerading human farming a bot earns nothing
        let masked = entity("Bot Sly", DEFAULT_SKIN, false, Some("carol"));
        assert!(!elimination_credits(&masked, &bot));
        // Bots have no account to credit
        assert!(!elimination_credits(&bot, &b));
    }

    #[test]
    fn shot_params_are_clamped() {
        let stats = weapon_stats("pistol");
        let (speed, radius) = clamp_shot_params(&stats, Some(500.0), Some(90.0));
        assert!(speed <= stats.bullet_speed * SHOT_OVERRIDE_CAP);
        assert!(radius <= stats.bullet_radius * SHOT_OVERRIDE_CAP);

        let (speed, radius) = clamp_shot_params(&stats, None, Some(f32::NAN));
        assert_eq!(speed, stats.bullet_speed);
        assert_eq!(radius, stats.bullet_radius);
    }

    #[test]
    fn damage_clamps_at_zero() {
        assert_eq!(apply_damage(15.0, 20.0), (0.0, true));
        assert_eq!(apply_damage(100.0, 20.0), (80.0, false));
    }

    #[test]
    fn muzzle_occlusion() {
        let wall = Wall {
            x: 100.0,
            y: 0.0,
            width: 20.0,
            height: 600.0,
        };
        assert!(muzzle_blocked(50.0, 300.0, 150.0, 300.0, &[wall.clone()]));
        assert!(!muzzle_blocked(50.0, 300.0, 76.0, 300.0, &[wall]));
    }
}
