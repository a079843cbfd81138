//! Static weapon stat table
//!
//! Read-only external resource consumed by the simulation core. Speeds are in
//! per-frame units (the projectile simulator scales them to per-second
//! rates). Unknown weapon keys fall back to the lowest-tier weapon.

/// Stats for one weapon key
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeaponStats {
    pub damage: f32,
    /// Per-frame bullet speed
    pub bullet_speed: f32,
    pub bullet_radius: f32,
    /// Muzzle offset from the entity center
    pub weapon_length: f32,
    pub cooldown_ms: u64,
}

/// Lowest-tier weapon, used when a key is unknown
pub const DEFAULT_WEAPON: &str = "pistol";

/// Is this key present in the table?
pub fn known_weapon(key: &str) -> bool {
    matches!(key, "pistol" | "smg" | "shotgun" | "sniper")
}

/// Look up a weapon by key, falling back to the default
pub fn weapon_stats(key: &str) -> WeaponStats {
    match key {
        "smg" => WeaponStats {
            damage: 8.0,
            bullet_speed: 14.0,
            bullet_radius: 4.0,
            weapon_length: 24.0,
            cooldown_ms: 140,
        },
        "shotgun" => WeaponStats {
            damage: 12.0,
            bullet_speed: 10.0,
            bullet_radius: 7.0,
            weapon_length: 22.0,
            cooldown_ms: 900,
        },
        "sniper" => WeaponStats {
            damage: 55.0,
            bullet_speed: 24.0,
            bullet_radius: 4.0,
            weapon_length: 34.0,
            cooldown_ms: 1300,
        },
        // "pistol" and anything unrecognized
        _ => WeaponStats {
            damage: 20.0,
            bullet_speed: 12.0,
            bullet_radius: 5.0,
            weapon_length: 26.0,
            cooldown_ms: 400,
        },
    }
}
