use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use evlog::meta;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::model;
use crate::error::VoteError;
use crate::runtime::get_logger;

pub const USERS_KEY: &str = "electnxt-users";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voter {
    pub id: String,
    pub name: String,
    pub wallet: String,
    /// Holds the soulbound voter ID.
    #[serde(rename = "hasNFT", default)]
    pub has_nft: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub registered_at: DateTime<Utc>,
}

impl Voter {
    /// `0x1234abcd...`, as shown in activity logs.
    pub fn short_wallet(&self) -> String {
        format!("{}...", self.wallet.chars().take(10).collect::<String>())
    }
}

pub fn generate_wallet() -> String {
    let bytes: [u8; 20] = rand::thread_rng().gen();
    format!("0x{}", hex::encode(bytes))
}

pub struct VoterRegistry {
    conn: SqlitePool,
    voters: DashMap<String, Voter>,
}

impl VoterRegistry {
    pub async fn load(conn: SqlitePool) -> anyhow::Result<Self> {
        let stored = match model::get_json::<Vec<Voter>>(&conn, USERS_KEY).await {
            Ok(v) => v.unwrap_or_default(),
            Err(e) => {
                get_logger().error("Failed to parse stored voters; starting empty.", meta! {
                    "Key" => USERS_KEY,
                    "Error" => e,
                });
                Vec::new()
            }
        };

        let voters = DashMap::new();
        for voter in stored {
            voters.insert(voter.id.clone(), voter);
        }

        Ok(Self {
            conn,
            voters,
        })
    }

    async fn persist(&self) -> anyhow::Result<()> {
        let mut all = self.voters.iter().map(|v| v.value().clone()).collect::<Vec<_>>();
        all.sort_by(|a, b| a.registered_at.cmp(&b.registered_at).then_with(|| a.id.cmp(&b.id)));
        model::put_json(&self.conn, USERS_KEY, &all).await
    }

    pub fn get(&self, id: &str) -> Option<Voter> {
        self.voters.get(id).map(|v| v.value().clone())
    }

    /// Registers a voter; registering again returns the existing record unchanged.
    pub async fn register(&self, id: &str, name: &str, now: DateTime<Utc>) -> anyhow::Result<(Voter, bool)> {
        let voter = match self.voters.entry(id.to_owned()) {
            Entry::Occupied(existing) => return Ok((existing.get().clone(), false)),
            Entry::Vacant(slot) => {
                let voter = Voter {
                    id: id.to_owned(),
                    name: name.to_owned(),
                    wallet: generate_wallet(),
                    has_nft: false,
                    registered_at: now,
                };
                slot.insert(voter.clone());
                voter
            }
        };

        if let Err(e) = self.persist().await {
            self.voters.remove(id);
            return Err(e);
        }

        get_logger().info("Voter registered.", meta! {
            "VoterID" => voter.id,
            "Wallet" => voter.wallet,
        });

        Ok((voter, true))
    }

    /// Issues the voter ID. Minting twice is a no-op.
    pub async fn mint(&self, id: &str) -> Result<Voter, VoteError> {
        let voter = {
            let mut voter = match self.voters.get_mut(id) {
                None => return Err(VoteError::UnknownVoter),
                Some(v) => v,
            };
            if voter.has_nft {
                return Ok(voter.value().clone());
            }
            voter.has_nft = true;
            voter.value().clone()
        };

        if let Err(e) = self.persist().await {
            if let Some(mut voter) = self.voters.get_mut(id) {
                voter.has_nft = false;
            }
            return Err(e.into());
        }

        Ok(voter)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::dbclient::DBClient;

    use super::*;

    #[tokio::test]
    async fn register_is_idempotent() {
        let db = DBClient::in_memory().await.unwrap();
        let registry = VoterRegistry::load(db.conn().clone()).await.unwrap();

        let (a, created) = registry.register("42", "Ravi", Utc::now()).await.unwrap();
        assert!(created);
        assert!(!a.has_nft);
        assert!(a.wallet.starts_with("0x"));
        assert_eq!(a.wallet.len(), 42);

        let (b, created) = registry.register("42", "Someone else", Utc::now()).await.unwrap();
        assert!(!created);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn mint_requires_registration_and_persists() {
        let db = DBClient::in_memory().await.unwrap();
        let registry = VoterRegistry::load(db.conn().clone()).await.unwrap();

        assert!(matches!(registry.mint("7").await, Err(VoteError::UnknownVoter)));

        registry.register("7", "Mei", Utc::now()).await.unwrap();
        assert!(registry.mint("7").await.unwrap().has_nft);

        let reloaded = VoterRegistry::load(db.conn().clone()).await.unwrap();
        assert!(reloaded.get("7").unwrap().has_nft);
    }

    #[tokio::test]
    async fn failed_writes_leave_no_trace() {
        let db = DBClient::in_memory().await.unwrap();
        let registry = VoterRegistry::load(db.conn().clone()).await.unwrap();
        registry.register("7", "Mei", Utc::now()).await.unwrap();

        sqlx::query("DROP TABLE kv").execute(db.conn()).await.unwrap();
        assert!(registry.register("8", "Tomas", Utc::now()).await.is_err());
        assert!(registry.get("8").is_none());
        assert!(matches!(registry.mint("7").await, Err(VoteError::Storage(_))));
        assert!(!registry.get("7").unwrap().has_nft);

        model::migrate(db.conn()).await.unwrap();
        let (_, created) = registry.register("8", "Tomas", Utc::now()).await.unwrap();
        assert!(created);
        assert!(registry.mint("7").await.unwrap().has_nft);

        let reloaded = VoterRegistry::load(db.conn().clone()).await.unwrap();
        assert!(reloaded.get("7").unwrap().has_nft);
        assert!(reloaded.get("8").is_some());
    }

    #[test]
    fn short_wallet_truncates() {
        let voter = Voter {
            id: "1".to_owned(),
            name: "n".to_owned(),
            wallet: "0x1234567890abcdef".to_owned(),
            has_nft: false,
            registered_at: Utc::now(),
        };
        assert_eq!(voter.short_wallet(), "0x12345678...");

        let odd = Voter { wallet: "0xéééééééééé".to_owned(), ..voter };
        assert_eq!(odd.short_wallet(), "0xéééééééé...");
    }
}
