//! Account service REST client
//!
//! The account store is an external collaborator: the game core only looks up
//! accounts at connect time, credits kill rewards, and reads the equipped
//! cosmetic for a weapon. Writes are fire-and-forget from the match actor;
//! failures are logged and never roll back in-memory match state.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Persistent account row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub coins: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Equipped loadout row (one per username + weapon)
#[derive(Debug, Clone, Deserialize)]
struct LoadoutRow {
    skin: String,
}

#[derive(Debug, Clone, Serialize)]
struct CoinsUpdate {
    coins: i64,
}

/// Account service client
#[derive(Clone)]
pub struct AccountStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AccountStore {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.accounts_url.clone(),
            api_key: config.accounts_api_key.clone(),
        }
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn get_one<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
    ) -> Result<Option<T>, AccountError> {
        let url = format!("{}?{}", self.rest_url(table), query);

        let response = self
            .client
            .get(&url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(AccountError::Request)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AccountError::Api { status, body });
        }

        let mut rows: Vec<T> = response.json().await.map_err(AccountError::Parse)?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }

    async fn patch<T: Serialize>(
        &self,
        table: &str,
        query: &str,
        data: &T,
    ) -> Result<(), AccountError> {
        let url = format!("{}?{}", self.rest_url(table), query);

        let response = self
            .client
            .patch(&url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(data)
            .send()
            .await
            .map_err(AccountError::Request)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AccountError::Api { status, body });
        }

        Ok(())
    }

    /// Look up an account by username
    pub async fn lookup_account(&self, username: &str) -> Result<Option<Account>, AccountError> {
        let query = format!("username=eq.{}", username);
        self.get_one("accounts", &query).await
    }

    /// Credit coins to an account, returning the new balance
    pub async fn credit_coins(&self, username: &str, amount: i64) -> Result<i64, AccountError> {
        let account = self
            .lookup_account(username)
            .await?
            .ok_or(AccountError::NoSuchAccount)?;

        let coins = account.coins + amount;
        let query = format!("username=eq.{}", username);
        self.patch("accounts", &query, &CoinsUpdate { coins }).await?;
        Ok(coins)
    }

    /// Equipped cosmetic for a weapon, if any
    pub async fn get_equipped_skin(
        &self,
        username: &str,
        weapon: &str,
    ) -> Result<Option<String>, AccountError> {
        let query = format!("username=eq.{}&weapon=eq.{}", username, weapon);
        let row: Option<LoadoutRow> = self.get_one("loadouts", &query).await?;
        Ok(row.map(|r| r.skin))
    }
}

/// Account service errors
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),

    #[error("Account does not exist")]
    NoSuchAccount,
}
