//! Match lifecycle and the actor that owns it
//!
//! `GameMatch` is the whole simulation as a synchronous state machine: feed
//! it commands and ticks with explicit timestamps, read messages out of its
//! outbox. The `GameServer` actor wraps one `GameMatch` behind an mpsc
//! channel and drives it at a fixed 50ms cadence; connection tasks never
//! touch match state directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::store::weapons::{weapon_stats, DEFAULT_WEAPON};
use crate::store::AccountStore;
use crate::util::time::{unix_millis, TICK_MS};
use crate::ws::protocol::{ClientMsg, RosterEntry, ServerMsg, WinnerInfo};

use super::arena::{self, Wall, ARENA_HEIGHT, ARENA_WIDTH, MAX_HEALTH, PLAYER_RADIUS};
use super::bot::{self, BotMemory, BotWorld, TargetView};
use super::combat::{self, HitRejection, DEFAULT_SKIN, KILL_REWARD};
use super::nav::NavCache;
use super::projectile::ProjectileSet;
use super::spawn;
use super::{CoinCredit, Entity, GameCommand, JoinProfile};

/// Humans required to start without bot fill
const MIN_HUMANS: usize = 2;

/// Total combatants when bots fill a short roster
const BOT_FILL_TOTAL: usize = 4;

/// Server-side bot movement speed, units per second
const BOT_MOVE_SPEED: f32 = 210.0;

/// Delay between the win condition and the lobby reset
pub const RESET_DELAY_MS: u64 = 5_000;

/// Largest dt one tick will integrate (protects against clock jumps)
const MAX_TICK_SECS: f32 = 0.25;

const BOT_NAMES: [&str; 8] = [
    "Vector", "Orbit", "Helix", "Quill", "Rook", "Sable", "Talon", "Wren",
];

const ENTITY_COLORS: [&str; 8] = [
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6", "#bcf60c",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Lobby,
    Active,
}

/// Lobby membership: a connection with a reserved entity id and profile.
/// Survives match resets; only disconnects remove it.
struct RosterSlot {
    conn_id: Uuid,
    entity_id: Uuid,
    profile: JoinProfile,
}

pub struct GameMatch {
    phase: MatchPhase,
    roster: Vec<RosterSlot>,
    entities: HashMap<Uuid, Entity>,
    /// Stable iteration order for snapshots
    entity_order: Vec<Uuid>,
    walls: Vec<Wall>,
    layout_version: u64,
    projectiles: ProjectileSet,
    nav: NavCache,
    bot_memories: HashMap<Uuid, BotMemory>,
    /// Deadline for the post-game lobby reset, set once per game over
    pending_reset: Option<u64>,
    rng: ChaCha8Rng,
    last_tick: u64,
    outbox: Vec<ServerMsg>,
    credits: Vec<CoinCredit>,
}

impl GameMatch {
    pub fn new(seed: u64) -> Self {
        Self {
            phase: MatchPhase::Lobby,
            roster: Vec::new(),
            entities: HashMap::new(),
            entity_order: Vec::new(),
            walls: Vec::new(),
            layout_version: 0,
            projectiles: ProjectileSet::new(),
            nav: NavCache::new(),
            bot_memories: HashMap::new(),
            pending_reset: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
            last_tick: 0,
            outbox: Vec::new(),
            credits: Vec::new(),
        }
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn human_count(&self) -> usize {
        self.roster.len()
    }

    /// Messages produced since the last drain, in emission order
    pub fn drain_outbox(&mut self) -> Vec<ServerMsg> {
        std::mem::take(&mut self.outbox)
    }

    /// Account credits produced since the last drain
    pub fn drain_credits(&mut self) -> Vec<CoinCredit> {
        std::mem::take(&mut self.credits)
    }

    pub fn handle_command(&mut self, cmd: GameCommand, now: u64) {
        match cmd {
            GameCommand::Join { conn_id, profile } => self.on_join(conn_id, profile),
            GameCommand::Disconnect { conn_id } => self.on_disconnect(conn_id, now),
            GameCommand::Client { conn_id, msg } => match msg {
                ClientMsg::Join {
                    display_name,
                    weapon,
                } => self.on_rejoin(conn_id, display_name, weapon),
                ClientMsg::StartGame { enable_bots } => {
                    self.on_start_game(enable_bots.unwrap_or(false), now)
                }
                ClientMsg::PlayerUpdate { x, y, angle } => self.on_player_update(conn_id, x, y, angle),
                ClientMsg::Shoot {
                    x,
                    y,
                    angle,
                    speed,
                    radius,
                } => self.on_shoot(conn_id, x, y, angle, speed, radius, now),
                ClientMsg::PlayerHit {
                    target_id,
                    shooter_id,
                    bullet_id,
                } => self.on_player_hit(conn_id, target_id, shooter_id, bullet_id, now),
            },
        }
    }

    /// One fixed simulation step
    pub fn tick(&mut self, now: u64) {
        if let Some(deadline) = self.pending_reset {
            if now >= deadline {
                self.reset_to_lobby();
            }
        }

        if self.phase == MatchPhase::Active {
            let dt = (now.saturating_sub(self.last_tick) as f32 / 1000.0).min(MAX_TICK_SECS);
            self.projectiles.advance(now, &self.walls);
            self.run_bots(now, dt);
            self.outbox.push(ServerMsg::GameState {
                players: self.snapshot(),
            });
        }

        self.last_tick = now;
    }

    fn on_join(&mut self, conn_id: Uuid, profile: JoinProfile) {
        if self.roster.iter().any(|s| s.conn_id == conn_id) {
            debug!(%conn_id, "duplicate join ignored");
            return;
        }

        let entity_id = Uuid::new_v4();
        info!(%conn_id, %entity_id, display_name = %profile.display_name, "player joined roster");
        self.roster.push(RosterSlot {
            conn_id,
            entity_id,
            profile,
        });
        self.broadcast_roster();
    }

    /// A joined connection re-sent its profile (weapon/name change in lobby)
    fn on_rejoin(&mut self, conn_id: Uuid, display_name: String, weapon: String) {
        let Some(slot) = self.roster.iter_mut().find(|s| s.conn_id == conn_id) else {
            debug!(%conn_id, "profile update from unjoined connection");
            return;
        };
        if self.phase == MatchPhase::Active {
            return; // loadout is locked while a match runs
        }
        slot.profile.display_name = display_name;
        slot.profile.weapon = weapon;
        self.broadcast_roster();
    }

    fn on_disconnect(&mut self, conn_id: Uuid, now: u64) {
        let Some(pos) = self.roster.iter().position(|s| s.conn_id == conn_id) else {
            return;
        };
        let slot = self.roster.remove(pos);
        info!(conn_id = %slot.conn_id, entity_id = %slot.entity_id, "player left");

        if self.entities.remove(&slot.entity_id).is_some() {
            self.entity_order.retain(|id| *id != slot.entity_id);
            self.bot_memories.remove(&slot.entity_id);
            self.outbox.push(ServerMsg::PlayerLeft { id: slot.entity_id });
            self.check_win(now);
        }
        self.broadcast_roster();
    }

    fn on_start_game(&mut self, enable_bots: bool, now: u64) {
        if self.phase != MatchPhase::Lobby {
            debug!("start request ignored: match already running");
            return;
        }

        let humans = self.roster.len();
        if humans == 0 {
            return;
        }
        if humans < MIN_HUMANS && !enable_bots {
            debug!(humans, "start request ignored: not enough players");
            return;
        }

        let walls = arena::generate_walls(&mut self.rng);
        self.walls = walls;
        self.layout_version += 1;
        self.nav.invalidate();
        self.projectiles.clear();

        // Humans first, then bot fill, each spawn constrained against those
        // already placed.
        let mut placed: Vec<spawn::SpawnNeighbor> = Vec::new();
        let mut color_idx = 0usize;

        for i in 0..self.roster.len() {
            let (x, y) = spawn::place(&self.walls, &placed, &mut self.rng);
            placed.push(spawn::SpawnNeighbor { x, y });

            let slot = &self.roster[i];
            let entity = Entity {
                id: slot.entity_id,
                username: slot.profile.username.clone(),
                display_name: slot.profile.display_name.clone(),
                color: ENTITY_COLORS[color_idx % ENTITY_COLORS.len()].to_string(),
                weapon: slot.profile.weapon.clone(),
                skin: slot.profile.skin.clone(),
                x,
                y,
                angle: 0.0,
                health: MAX_HEALTH,
                alive: true,
                is_bot: false,
            };
            color_idx += 1;
            self.entity_order.push(entity.id);
            self.entities.insert(entity.id, entity);
        }

        if enable_bots {
            let fill = BOT_FILL_TOTAL.saturating_sub(humans);
            for i in 0..fill {
                let (x, y) = spawn::place(&self.walls, &placed, &mut self.rng);
                placed.push(spawn::SpawnNeighbor { x, y });

                let id = Uuid::new_v4();
                let name = BOT_NAMES[self.rng.gen_range(0..BOT_NAMES.len())];
                let entity = Entity {
                    id,
                    username: None,
                    display_name: format!("{}{}", combat::BOT_NAME_PREFIX, name),
                    color: ENTITY_COLORS[(color_idx + i) % ENTITY_COLORS.len()].to_string(),
                    weapon: DEFAULT_WEAPON.to_string(),
                    skin: DEFAULT_SKIN.to_string(),
                    x,
                    y,
                    angle: 0.0,
                    health: MAX_HEALTH,
                    alive: true,
                    is_bot: true,
                };
                self.entity_order.push(id);
                self.entities.insert(id, entity);
                self.bot_memories.insert(id, BotMemory::new());
            }
        }

        self.phase = MatchPhase::Active;
        self.pending_reset = None;
        self.last_tick = now;
        info!(
            humans,
            total = self.entities.len(),
            walls = self.walls.len(),
            "match started"
        );
        self.outbox.push(ServerMsg::GameStarting {
            players: self.snapshot(),
            walls: self.walls.clone(),
        });
    }

    /// Client-authoritative movement: accept the reported pose, reject only
    /// non-finite values and clamp to the playfield.
    fn on_player_update(&mut self, conn_id: Uuid, x: f32, y: f32, angle: f32) {
        if self.phase != MatchPhase::Active {
            return;
        }
        let Some(entity_id) = self.entity_for_conn(conn_id) else {
            return;
        };
        if !x.is_finite() || !y.is_finite() || !angle.is_finite() {
            warn!(%entity_id, "dropped non-finite position update");
            return;
        }
        let Some(entity) = self.entities.get_mut(&entity_id) else {
            return;
        };
        if !entity.alive {
            return;
        }
        entity.x = x.clamp(PLAYER_RADIUS, ARENA_WIDTH - PLAYER_RADIUS);
        entity.y = y.clamp(PLAYER_RADIUS, ARENA_HEIGHT - PLAYER_RADIUS);
        entity.angle = super::geometry::wrap_angle(angle);
    }

    #[allow(clippy::too_many_arguments)]
    fn on_shoot(
        &mut self,
        conn_id: Uuid,
        x: f32,
        y: f32,
        angle: f32,
        speed: Option<f32>,
        radius: Option<f32>,
        now: u64,
    ) {
        if self.phase != MatchPhase::Active {
            return;
        }
        let Some(entity_id) = self.entity_for_conn(conn_id) else {
            return;
        };
        let Some(entity) = self.entities.get(&entity_id) else {
            return;
        };
        if !entity.alive || !x.is_finite() || !y.is_finite() || !angle.is_finite() {
            return;
        }

        let stats = weapon_stats(&entity.weapon);
        let (speed, radius) = combat::clamp_shot_params(&stats, speed, radius);

        if combat::muzzle_blocked(entity.x, entity.y, x, y, &self.walls) {
            debug!(%entity_id, "shot rejected: muzzle path occluded");
            return;
        }

        let bullet = self.projectiles.spawn(entity_id, x, y, angle, speed, radius, now);
        self.outbox.push(ServerMsg::NewBullet { bullet });
    }

    /// Resolve a client-reported hit claim. Validation covers presence,
    /// liveness, bullet idempotency and the bot-ally rules; the claimed hit
    /// geometry itself is trusted.
    fn on_player_hit(
        &mut self,
        conn_id: Uuid,
        target_id: Uuid,
        shooter_id: Option<Uuid>,
        bullet_id: Option<u64>,
        now: u64,
    ) {
        if self.phase != MatchPhase::Active {
            return;
        }
        if self.entity_for_conn(conn_id).is_none() {
            return;
        }

        match self.resolve_hit(target_id, shooter_id, bullet_id, now) {
            Ok(()) => {}
            Err(rejection) => debug!(%target_id, ?rejection, "hit claim dropped"),
        }
    }

    fn resolve_hit(
        &mut self,
        target_id: Uuid,
        shooter_id: Option<Uuid>,
        bullet_id: Option<u64>,
        now: u64,
    ) -> Result<(), HitRejection> {
        let target = self
            .entities
            .get(&target_id)
            .ok_or(HitRejection::TargetAbsent)?;
        if !target.alive {
            return Err(HitRejection::TargetDead);
        }

        // Derive the shooter from the bullet before consuming it, then burn
        // the id so a replayed claim cannot apply damage twice.
        let shooter_id = shooter_id.or_else(|| bullet_id.and_then(|b| self.projectiles.owner_of(b)));
        if let Some(bullet_id) = bullet_id {
            if !self.projectiles.consume(bullet_id) {
                return Err(HitRejection::DuplicateBullet);
            }
        }

        let shooter = shooter_id.and_then(|id| self.entities.get(&id));
        let target = self
            .entities
            .get(&target_id)
            .ok_or(HitRejection::TargetAbsent)?;
        combat::hit_allowed(shooter, target)?;

        let damage = weapon_stats(
            shooter.map(|s| s.weapon.as_str()).unwrap_or(DEFAULT_WEAPON),
        )
        .damage;
        let shooter_snapshot = shooter.cloned();

        let Some(target) = self.entities.get_mut(&target_id) else {
            return Err(HitRejection::TargetAbsent);
        };
        let (health, killed) = combat::apply_damage(target.health, damage);
        target.health = health;

        if killed {
            target.alive = false;
            let victim = target.clone();
            info!(
                victim = %victim.display_name,
                shooter = shooter_snapshot.as_ref().map(|s| s.display_name.as_str()).unwrap_or("?"),
                "elimination"
            );
            self.outbox.push(ServerMsg::PlayerKilled { id: target_id });

            if let Some(shooter) = shooter_snapshot {
                if combat::elimination_credits(&shooter, &victim) {
                    if let Some(username) = shooter.username {
                        self.credits.push(CoinCredit {
                            entity_id: shooter.id,
                            username,
                            amount: KILL_REWARD,
                        });
                    }
                }
            }

            self.check_win(now);
        }

        Ok(())
    }

    /// Win condition: one or zero combatants alive, or no humans left alive.
    /// Fires at most once per match; the reset deadline is never re-armed.
    fn check_win(&mut self, now: u64) {
        if self.phase != MatchPhase::Active || self.pending_reset.is_some() {
            return;
        }

        let alive: Vec<&Entity> = self.entities.values().filter(|e| e.alive).collect();
        let humans_alive = alive.iter().filter(|e| !e.is_bot).count();

        if alive.len() > 1 && humans_alive > 0 {
            return;
        }

        let winner = if alive.len() == 1 {
            Some(WinnerInfo {
                id: alive[0].id,
                display_name: alive[0].display_name.clone(),
            })
        } else {
            None
        };

        info!(
            winner = winner.as_ref().map(|w| w.display_name.as_str()).unwrap_or("none"),
            "game over"
        );
        self.outbox.push(ServerMsg::GameOver { winner });
        self.pending_reset = Some(now + RESET_DELAY_MS);
    }

    /// Clear all match-scoped state back to the lobby. Roster membership
    /// survives; everything the arena produced does not.
    fn reset_to_lobby(&mut self) {
        info!("resetting to lobby");
        self.phase = MatchPhase::Lobby;
        self.entities.clear();
        self.entity_order.clear();
        self.walls.clear();
        self.projectiles.clear();
        self.bot_memories.clear();
        self.nav.invalidate();
        self.pending_reset = None;
        self.outbox.push(ServerMsg::ResetGame);
        self.broadcast_roster();
    }

    fn run_bots(&mut self, now: u64, dt: f32) {
        let bot_ids: Vec<Uuid> = self
            .entity_order
            .iter()
            .filter(|id| self.entities.get(id).map(|e| e.is_bot && e.alive).unwrap_or(false))
            .copied()
            .collect();

        // Bots only hunt humans; allied flag covers masquerading humans
        let targets: Vec<TargetView> = self
            .entities
            .values()
            .filter(|e| e.alive && !e.is_bot)
            .map(|e| TargetView {
                id: e.id,
                x: e.x,
                y: e.y,
                allied: combat::is_bot_allied(e),
            })
            .collect();

        for bot_id in bot_ids {
            let Some((x, y, weapon)) = self
                .entities
                .get(&bot_id)
                .map(|e| (e.x, e.y, e.weapon.clone()))
            else {
                continue;
            };
            let stats = weapon_stats(&weapon);

            let mut memory = self.bot_memories.remove(&bot_id).unwrap_or_default();
            let cmd = {
                let mut world = BotWorld {
                    walls: &self.walls,
                    layout_version: self.layout_version,
                    nav: &mut self.nav,
                    projectiles: &self.projectiles,
                    targets: &targets,
                    now,
                };
                bot::decide(bot_id, x, y, &stats, &mut world, &mut memory, &mut self.rng)
            };
            self.bot_memories.insert(bot_id, memory);

            self.apply_bot_command(bot_id, &stats, cmd, dt, now);
        }
    }

    fn apply_bot_command(
        &mut self,
        bot_id: Uuid,
        stats: &crate::store::weapons::WeaponStats,
        cmd: bot::BotCommand,
        dt: f32,
        now: u64,
    ) {
        let Some(entity) = self.entities.get_mut(&bot_id) else {
            return;
        };

        entity.angle = cmd.aim;
        let mut x = entity.x + cmd.move_x * BOT_MOVE_SPEED * dt;
        let mut y = entity.y + cmd.move_y * BOT_MOVE_SPEED * dt;

        x = x.clamp(PLAYER_RADIUS, ARENA_WIDTH - PLAYER_RADIUS);
        y = y.clamp(PLAYER_RADIUS, ARENA_HEIGHT - PLAYER_RADIUS);
        let (x, y) = super::geometry::push_circle_out_of_walls(x, y, PLAYER_RADIUS, &self.walls);
        entity.x = x.clamp(PLAYER_RADIUS, ARENA_WIDTH - PLAYER_RADIUS);
        entity.y = y.clamp(PLAYER_RADIUS, ARENA_HEIGHT - PLAYER_RADIUS);

        if cmd.fire {
            let muzzle_len = PLAYER_RADIUS + stats.weapon_length;
            let mx = entity.x + cmd.aim.cos() * muzzle_len;
            let my = entity.y + cmd.aim.sin() * muzzle_len;
            let (ex, ey) = (entity.x, entity.y);

            if !combat::muzzle_blocked(ex, ey, mx, my, &self.walls) {
                let bullet = self.projectiles.spawn(
                    bot_id,
                    mx,
                    my,
                    cmd.aim,
                    stats.bullet_speed,
                    stats.bullet_radius,
                    now,
                );
                self.outbox.push(ServerMsg::NewBullet { bullet });
            }
        }
    }

    fn entity_for_conn(&self, conn_id: Uuid) -> Option<Uuid> {
        self.roster
            .iter()
            .find(|s| s.conn_id == conn_id)
            .map(|s| s.entity_id)
    }

    fn snapshot(&self) -> Vec<crate::ws::protocol::EntitySnapshot> {
        self.entity_order
            .iter()
            .filter_map(|id| self.entities.get(id))
            .map(Entity::snapshot)
            .collect()
    }

    fn broadcast_roster(&mut self) {
        let roster = self
            .roster
            .iter()
            .map(|s| RosterEntry {
                id: s.entity_id,
                display_name: s.profile.display_name.clone(),
                weapon: s.profile.weapon.clone(),
            })
            .collect();
        self.outbox.push(ServerMsg::UpdateWaitingList { roster });
    }
}

/// Shared handle for connection tasks
#[derive(Clone)]
pub struct GameHandle {
    pub commands: mpsc::Sender<GameCommand>,
    pub events: broadcast::Sender<ServerMsg>,
    player_count: Arc<AtomicUsize>,
    match_active: Arc<AtomicBool>,
}

impl GameHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.events.subscribe()
    }

    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn phase(&self) -> &'static str {
        if self.match_active.load(Ordering::Relaxed) {
            "active"
        } else {
            "lobby"
        }
    }
}

/// The actor task owning one match
pub struct GameServer {
    game: GameMatch,
    commands: mpsc::Receiver<GameCommand>,
    events: broadcast::Sender<ServerMsg>,
    accounts: Option<AccountStore>,
    player_count: Arc<AtomicUsize>,
    match_active: Arc<AtomicBool>,
}

impl GameServer {
    pub fn spawn(seed: u64, accounts: Option<AccountStore>) -> GameHandle {
        let (commands_tx, commands_rx) = mpsc::channel(256);
        let (events_tx, _) = broadcast::channel(512);
        let player_count = Arc::new(AtomicUsize::new(0));
        let match_active = Arc::new(AtomicBool::new(false));

        let server = GameServer {
            game: GameMatch::new(seed),
            commands: commands_rx,
            events: events_tx.clone(),
            accounts,
            player_count: player_count.clone(),
            match_active: match_active.clone(),
        };
        tokio::spawn(server.run());

        GameHandle {
            commands: commands_tx,
            events: events_tx,
            player_count,
            match_active,
        }
    }

    async fn run(mut self) {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(TICK_MS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let now = unix_millis();

            // Drain every pending command before stepping the simulation
            loop {
                match self.commands.try_recv() {
                    Ok(cmd) => self.game.handle_command(cmd, now),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        info!("command channel closed, stopping match actor");
                        return;
                    }
                }
            }

            self.game.tick(now);
            self.player_count
                .store(self.game.human_count(), Ordering::Relaxed);
            self.match_active
                .store(self.game.phase() == MatchPhase::Active, Ordering::Relaxed);

            for msg in self.game.drain_outbox() {
                // Send fails only when no client is subscribed
                let _ = self.events.send(msg);
            }

            for credit in self.game.drain_credits() {
                self.apply_credit(credit);
            }
        }
    }

    /// Fire-and-forget account credit; failures are logged, match state is
    /// never rolled back.
    fn apply_credit(&self, credit: CoinCredit) {
        let Some(accounts) = self.accounts.clone() else {
            debug!(username = %credit.username, "account store disabled, credit skipped");
            return;
        };
        let events = self.events.clone();
        tokio::spawn(async move {
            match accounts.credit_coins(&credit.username, credit.amount).await {
                Ok(coins) => {
                    let _ = events.send(ServerMsg::CoinsUpdated {
                        id: credit.entity_id,
                        coins,
                    });
                }
                Err(err) => {
                    error!(username = %credit.username, %err, "coin credit failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(game: &mut GameMatch, name: &str, username: Option<&str>, now: u64) -> Uuid {
        let conn_id = Uuid::new_v4();
        game.handle_command(
            GameCommand::Join {
                conn_id,
                profile: JoinProfile {
                    username: username.map(str::to_string),
                    display_name: name.to_string(),
                    weapon: "pistol".to_string(),
                    skin: "gold".to_string(),
                },
            },
            now,
        );
        conn_id
    }

    fn start(game: &mut GameMatch, conn: Uuid, bots: bool, now: u64) {
        game.handle_command(
            GameCommand::Client {
                conn_id: conn,
                msg: ClientMsg::StartGame {
                    enable_bots: Some(bots),
                },
            },
            now,
        );
    }

    fn entity_of(game: &GameMatch, conn: Uuid) -> Uuid {
        game.entity_for_conn(conn).expect("entity for connection")
    }

    fn two_player_match(now: u64) -> (GameMatch, Uuid, Uuid) {
        let mut game = GameMatch::new(7);
        let a = join(&mut game, "alice", Some("alice"), now);
        let b = join(&mut game, "bob", Some("bob"), now);
        start(&mut game, a, false, now);
        assert_eq!(game.phase(), MatchPhase::Active);
        game.drain_outbox();
        (game, a, b)
    }

    #[test]
    fn solo_start_requires_bots() {
        let mut game = GameMatch::new(1);
        let a = join(&mut game, "alice", Some("alice"), 0);

        start(&mut game, a, false, 0);
        assert_eq!(game.phase(), MatchPhase::Lobby);

        start(&mut game, a, true, 0);
        assert_eq!(game.phase(), MatchPhase::Active);
        // Bot fill tops the match up to four combatants
        assert_eq!(game.entities.len(), BOT_FILL_TOTAL);
        assert_eq!(game.entities.values().filter(|e| e.is_bot).count(), 3);
        assert!(!game.walls.is_empty());
    }

    #[test]
    fn start_broadcasts_layout_and_spawns_apart() {
        let mut game = GameMatch::new(2);
        let a = join(&mut game, "alice", Some("alice"), 0);
        join(&mut game, "bob", Some("bob"), 0);
        game.drain_outbox();
        start(&mut game, a, false, 0);

        let msgs = game.drain_outbox();
        assert!(msgs.iter().any(|m| matches!(
            m,
            ServerMsg::GameStarting { players, walls }
                if players.len() == 2 && !walls.is_empty()
        )));
    }

    #[test]
    fn duplicate_start_is_ignored() {
        let (mut game, a, _) = two_player_match(0);
        let version = game.layout_version;
        start(&mut game, a, false, 100);
        assert_eq!(game.layout_version, version);
    }

    #[test]
    fn update_clamps_to_playfield_and_drops_nan() {
        let (mut game, a, _) = two_player_match(0);
        let id = entity_of(&game, a);

        game.handle_command(
            GameCommand::Client {
                conn_id: a,
                msg: ClientMsg::PlayerUpdate {
                    x: -500.0,
                    y: 10_000.0,
                    angle: 0.5,
                },
            },
            50,
        );
        let e = &game.entities[&id];
        assert_eq!(e.x, PLAYER_RADIUS);
        assert_eq!(e.y, ARENA_HEIGHT - PLAYER_RADIUS);

        game.handle_command(
            GameCommand::Client {
                conn_id: a,
                msg: ClientMsg::PlayerUpdate {
                    x: f32::NAN,
                    y: 100.0,
                    angle: 0.0,
                },
            },
            100,
        );
        assert_eq!(game.entities[&id].x, PLAYER_RADIUS); // unchanged
    }

    #[test]
    fn hit_applies_weapon_damage_once_per_bullet() {
        let (mut game, a, b) = two_player_match(0);
        let shooter = entity_of(&game, a);
        let target = entity_of(&game, b);

        let bullet = game.projectiles.spawn(shooter, 100.0, 100.0, 0.0, 12.0, 5.0, 0);

        for _ in 0..3 {
            game.handle_command(
                GameCommand::Client {
                    conn_id: a,
                    msg: ClientMsg::PlayerHit {
                        target_id: target,
                        shooter_id: None,
                        bullet_id: Some(bullet.id),
                    },
                },
                100,
            );
        }

        // Pistol does 20; replays of the same bullet id are inert
        assert_eq!(game.entities[&target].health, 80.0);
    }

    #[test]
    fn shooter_derived_from_bullet_owner() {
        let (mut game, a, b) = two_player_match(0);
        let shooter = entity_of(&game, a);
        let target = entity_of(&game, b);

        for _ in 0..5 {
            let bullet_n = game.projectiles.spawn(shooter, 100.0, 100.0, 0.0, 12.0, 5.0, 0);
            game.handle_command(
                GameCommand::Client {
                    conn_id: b,
                    msg: ClientMsg::PlayerHit {
                        target_id: target,
                        shooter_id: None,
                        bullet_id: Some(bullet_n.id),
                    },
                },
                100,
            );
        }

        // Five pistol hits kill; the last elimination credits alice's account
        assert!(!game.entities[&target].alive);
        let credits = game.drain_credits();
        assert_eq!(credits.len(), 1);
        assert_eq!(credits[0].username, "alice");
        assert_eq!(credits[0].amount, KILL_REWARD);
    }

    #[test]
    fn elimination_triggers_game_over_and_delayed_reset() {
        let (mut game, a, b) = two_player_match(0);
        let target = entity_of(&game, b);

        for _ in 0..5 {
            game.handle_command(
                GameCommand::Client {
                    conn_id: a,
                    msg: ClientMsg::PlayerHit {
                        target_id: target,
                        shooter_id: Some(entity_of(&game, a)),
                        bullet_id: None,
                    },
                },
                1_000,
            );
        }

        let msgs = game.drain_outbox();
        assert!(msgs.iter().any(|m| matches!(m, ServerMsg::PlayerKilled { id } if *id == target)));
        assert!(msgs.iter().any(|m| matches!(
            m,
            ServerMsg::GameOver { winner: Some(w) } if w.display_name == "alice"
        )));

        // Not yet: the reset waits out its delay
        game.tick(1_000 + RESET_DELAY_MS - 1);
        assert_eq!(game.phase(), MatchPhase::Active);

        game.tick(1_000 + RESET_DELAY_MS);
        assert_eq!(game.phase(), MatchPhase::Lobby);
        assert!(game.entities.is_empty());
        assert!(game.walls.is_empty());
        assert!(game.projectiles.is_empty());
        // Roster survives the reset
        assert_eq!(game.human_count(), 2);
        let msgs = game.drain_outbox();
        assert!(msgs.iter().any(|m| matches!(m, ServerMsg::ResetGame)));
    }

    #[test]
    fn hits_on_dead_or_absent_targets_are_dropped() {
        let (mut game, a, b) = two_player_match(0);
        let target = entity_of(&game, b);

        // Absent target
        assert_eq!(
            game.resolve_hit(Uuid::new_v4(), None, None, 0),
            Err(HitRejection::TargetAbsent)
        );

        // Kill, then hit the corpse
        for _ in 0..5 {
            let _ = game.resolve_hit(target, Some(entity_of(&game, a)), None, 0);
        }
        assert!(!game.entities[&target].alive);
        assert_eq!(
            game.resolve_hit(target, Some(entity_of(&game, a)), None, 0),
            Err(HitRejection::TargetDead)
        );
    }

    #[test]
    fn bots_never_eliminate_each_other() {
        let mut game = GameMatch::new(3);
        let a = join(&mut game, "alice", Some("alice"), 0);
        start(&mut game, a, true, 0);

        let bots: Vec<Uuid> = game
            .entities
            .values()
            .filter(|e| e.is_bot)
            .map(|e| e.id)
            .collect();
        assert_eq!(
            game.resolve_hit(bots[0], Some(bots[1]), None, 0),
            Err(HitRejection::BotAlliedTarget)
        );
        assert_eq!(game.entities[&bots[0]].health, MAX_HEALTH);
    }

    #[test]
    fn disconnect_mid_match_forfeits() {
        let (mut game, _a, b) = two_player_match(0);
        game.handle_command(GameCommand::Disconnect { conn_id: b }, 500);

        let msgs = game.drain_outbox();
        assert!(msgs.iter().any(|m| matches!(m, ServerMsg::PlayerLeft { .. })));
        assert!(msgs.iter().any(|m| matches!(
            m,
            ServerMsg::GameOver { winner: Some(w) } if w.display_name == "alice"
        )));
        assert_eq!(game.human_count(), 1);
    }

    #[test]
    fn state_is_idempotent_without_input() {
        let (mut game, a, _) = two_player_match(0);
        let id = entity_of(&game, a);
        let before = game.entities[&id].clone();

        // No bots, no inputs: ticking must not move anyone
        for ms in 1..10 {
            game.tick(ms * 50);
        }
        let after = &game.entities[&id];
        assert_eq!(before.x, after.x);
        assert_eq!(before.y, after.y);
        assert_eq!(before.health, after.health);

        // Every tick still broadcasts a snapshot
        let snapshots = game
            .drain_outbox()
            .iter()
            .filter(|m| matches!(m, ServerMsg::GameState { .. }))
            .count();
        assert_eq!(snapshots, 9);
    }

    #[test]
    fn bots_advance_and_stay_in_bounds() {
        let mut game = GameMatch::new(11);
        let a = join(&mut game, "alice", Some("alice"), 0);
        start(&mut game, a, true, 0);

        for i in 1..=40 {
            game.tick(i * 50);
        }
        for e in game.entities.values() {
            assert!(e.x >= PLAYER_RADIUS && e.x <= ARENA_WIDTH - PLAYER_RADIUS);
            assert!(e.y >= PLAYER_RADIUS && e.y <= ARENA_HEIGHT - PLAYER_RADIUS);
            assert!(
                !super::super::geometry::circle_overlaps_any(e.x, e.y, PLAYER_RADIUS - 1.0, &game.walls),
                "entity embedded in a wall"
            );
        }
    }

    #[test]
    fn shot_through_wall_is_rejected() {
        let (mut game, a, _) = two_player_match(0);
        let id = entity_of(&game, a);

        // Put a wall directly in front of the shooter and fire into it
        game.walls = vec![Wall {
            x: 0.0,
            y: 0.0,
            width: ARENA_WIDTH,
            height: ARENA_HEIGHT,
        }];
        let (x, y) = (game.entities[&id].x, game.entities[&id].y);
        game.handle_command(
            GameCommand::Client {
                conn_id: a,
                msg: ClientMsg::Shoot {
                    x: x + 100.0,
                    y,
                    angle: 0.0,
                    speed: None,
                    radius: None,
                },
            },
            100,
        );
        assert!(game.projectiles.is_empty());
        assert!(!game
            .drain_outbox()
            .iter()
            .any(|m| matches!(m, ServerMsg::NewBullet { .. })));
    }

    #[test]
    fn lobby_commands_are_inert_while_active() {
        let (mut game, a, _) = two_player_match(0);
        let id = entity_of(&game, a);

        // Loadout locked mid-match
        game.handle_command(
            GameCommand::Client {
                conn_id: a,
                msg: ClientMsg::Join {
                    display_name: "renamed".to_string(),
                    weapon: "sniper".to_string(),
                },
            },
            100,
        );
        assert_eq!(game.entities[&id].weapon, "pistol");
    }
}
