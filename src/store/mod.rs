//! External data collaborators: account service and weapon stat table

pub mod accounts;
pub mod weapons;

pub use accounts::{Account, AccountError, AccountStore};
pub use weapons::{weapon_stats, WeaponStats, DEFAULT_WEAPON};
