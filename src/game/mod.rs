//! Authoritative match simulation
//!
//! The match core is a synchronous state machine (`GameMatch`) driven by
//! explicit timestamps, wrapped by an actor task that owns it exclusively and
//! drains a command channel at the top of every fixed 50ms tick. Everything
//! under this module is runtime-free and unit-testable without tokio.

pub mod arena;
pub mod bot;
pub mod combat;
pub mod geometry;
pub mod r#match;
pub mod nav;
pub mod projectile;
pub mod spawn;

pub use r#match::{GameHandle, GameMatch, GameServer, MatchPhase};

use uuid::Uuid;

use crate::ws::protocol::{ClientMsg, EntitySnapshot};

/// One player or bot inside the simulation
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: Uuid,
    /// Account name; `None` for bots
    pub username: Option<String>,
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

impl Entity {
    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            id: self.id,
            display_name: self.display_name.clone(),
            color: self.color.clone(),
            weapon: self.weapon.clone(),
            skin: self.skin.clone(),
            x: self.x,
            y: self.y,
            angle: self.angle,
            health: self.health,
            alive: self.alive,
            is_bot: self.is_bot,
        }
    }
}

/// Identity resolved at connect time, before the entity joins the roster
#[derive(Debug, Clone)]
pub struct JoinProfile {
    pub username: Option<String>,
    pub display_name: String,
    pub weapon: String,
    pub skin: String,
}

/// Commands flowing from connection tasks into the match actor
#[derive(Debug)]
pub enum GameCommand {
    /// A connection authenticated and wants an entity
    Join {
        conn_id: Uuid,
        profile: JoinProfile,
    },
    /// A protocol message from a live connection
    Client { conn_id: Uuid, msg: ClientMsg },
    /// The connection closed
    Disconnect { conn_id: Uuid },
}

/// A pending account credit produced by hit resolution, applied
/// asynchronously by the actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinCredit {
    pub entity_id: Uuid,
    pub username: String,
    pub amount: i64,
}
