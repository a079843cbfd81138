//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::arena::Wall;
use crate::game::projectile::Projectile;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Join the waiting roster
    Join {
        display_name: String,
        /// Weapon key from the static weapon table
        weapon: String,
    },

    /// Request the match to start from the lobby
    StartGame {
        /// Fill the roster with bots when short on humans
        enable_bots: Option<bool>,
    },

    /// Client-authoritative position/aim update for the sender's entity
    PlayerUpdate { x: f32, y: f32, angle: f32 },

    /// Fire a shot from the given muzzle point
    Shoot {
        x: f32,
        y: f32,
        angle: f32,
        /// Optional per-frame speed override, clamped against the weapon table
        speed: Option<f32>,
        radius: Option<f32>,
    },

    /// Client-reported hit claim (trust boundary: the server re-validates
    /// presence, liveness and bullet idempotency only, not the hit geometry)
    PlayerHit {
        target_id: Uuid,
        shooter_id: Option<Uuid>,
        bullet_id: Option<u64>,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Current lobby roster
    UpdateWaitingList { roster: Vec<RosterEntry> },

    /// Match is starting: initial entities and the generated wall layout
    GameStarting {
        players: Vec<EntitySnapshot>,
        walls: Vec<Wall>,
    },

    /// Per-tick consistent state snapshot
    GameState { players: Vec<EntitySnapshot> },

    /// A validated shot entered the simulation
    NewBullet { bullet: Projectile },

    /// Entity was eliminated
    PlayerKilled { id: Uuid },

    /// Entity disconnected or was removed
    PlayerLeft { id: Uuid },

    /// Win condition met; a delayed reset follows
    GameOver { winner: Option<WinnerInfo> },

    /// Match state was cleared back to the lobby
    ResetGame,

    /// Persistent balance changed for one player (routed by entity id)
    CoinsUpdated { id: Uuid, coins: i64 },

    /// Authentication or policy failure
    AuthError { message: String },
}

/// Lobby roster entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: Uuid,
    pub display_name: String,
    pub weapon: String,
}

/// Entity state as broadcast to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: Uuid,
    pub display_name: String,
    pub color: String,
    pub weapon: String,
    pub skin: String,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub health: f32,
    pub alive: bool,
    pub is_bot: bool,
}

/// Winner of a resolved match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinnerInfo {
    pub id: Uuid,
    pub display_name: String,
}
