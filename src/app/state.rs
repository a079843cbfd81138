//! Application state shared across routes

use std::sync::Arc;

use rand::RngCore;

use crate::config::Config;
use crate::game::{GameHandle, GameServer};
use crate::store::AccountStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub accounts: Option<AccountStore>,
    pub game: GameHandle,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let accounts = config
            .accounts_enabled()
            .then(|| AccountStore::new(&config));

        let seed = config
            .match_seed
            .unwrap_or_else(|| rand::thread_rng().next_u64());
        let game = GameServer::spawn(seed, accounts.clone());

        Self {
            config,
            accounts,
            game,
        }
    }
}
