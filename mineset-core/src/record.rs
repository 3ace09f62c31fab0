//! Persisted shape of a registry entry.
//!
//! One record per miner; the store file is a JSON array of them. Field names are
//! part of the on-disk format and must not change.

use chrono::DateTime;
use mineset_remote::SpecificationPayload;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::model::{Miner, MinerStatus, MiningSpecification, PublicKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinerRecord {
    pub uuid: String,
    pub mining_specification: SpecificationPayload,
    pub uri: String,
    pub size: i64,
    pub public_key_for_signing_deadlines_base58: String,
    /// Decimal text, arbitrary precision
    pub balance: String,
    pub has_plot_ready: bool,
    pub is_on: bool,
    /// Epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<i64>,
}

impl MinerRecord {
    pub fn new(miner: &Miner, status: &MinerStatus) -> Self {
        Self {
            uuid: miner.id().to_string(),
            mining_specification: SpecificationPayload::from(miner.specification()),
            uri: miner.uri().to_string(),
            size: miner.size() as i64,
            public_key_for_signing_deadlines_base58: miner.public_key().to_base58().to_string(),
            balance: status.balance.to_string(),
            has_plot_ready: status.has_plot_ready,
            is_on: status.is_on,
            last_updated: status.last_updated.map(|t| t.timestamp_millis()),
        }
    }

    /// Validate and convert back into the in-memory pair
    pub fn into_entry(self) -> Result<(Miner, MinerStatus), String> {
        let id = Uuid::parse_str(&self.uuid).map_err(|e| format!("invalid uuid {}: {}", self.uuid, e))?;
        let specification = MiningSpecification::try_from(self.mining_specification).map_err(|e| e.to_string())?;
        let public_key =
            PublicKey::from_base58(&self.public_key_for_signing_deadlines_base58).map_err(|e| e.to_string())?;
        let miner = Miner::with_id(id, specification, &self.uri, self.size, public_key).map_err(|e| e.to_string())?;

        let balance = self
            .balance
            .parse::<BigUint>()
            .map_err(|_| format!("invalid balance {}", self.balance))?;

        let last_updated = match self.last_updated {
            Some(ms) => Some(DateTime::from_timestamp_millis(ms).ok_or_else(|| format!("invalid timestamp {}", ms))?),
            None => None,
        };

        Ok((
            miner,
            MinerStatus {
                balance,
                has_plot_ready: self.has_plot_ready,
                is_on: self.is_on,
                last_updated,
            },
        ))
    }
}

/// Parse a single raw record, reporting why it is unusable
pub fn parse_record(value: Value) -> Result<(Miner, MinerStatus), String> {
    let record: MinerRecord = serde_json::from_value(value).map_err(|e| e.to_string())?;
    record.into_entry()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{now_millis, test_support::miner};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_record_round_trip() {
        let miner = miner("octopus", 500);
        let status = MinerStatus {
            balance: "340282366920938463463374607431768211457".parse().unwrap(),
            has_plot_ready: true,
            is_on: false,
            last_updated: Some(now_millis()),
        };

        let value = serde_json::to_value(MinerRecord::new(&miner, &status)).unwrap();
        let (restored, restored_status) = parse_record(value).unwrap();

        assert_eq!(restored, miner);
        assert_eq!(restored.specification(), miner.specification());
        assert_eq!(restored.uri(), miner.uri());
        assert_eq!(restored.size(), 500);
        assert_eq!(restored.public_key(), miner.public_key());
        assert_eq!(restored_status, status);
    }

    #[test]
    fn test_field_names() {
        let record = MinerRecord::new(&miner("octopus", 3), &MinerStatus::new(true));
        let value = serde_json::to_value(&record).unwrap();

        for field in [
            "uuid",
            "miningSpecification",
            "uri",
            "size",
            "publicKeyForSigningDeadlinesBase58",
            "balance",
            "hasPlotReady",
            "isOn",
        ] {
            assert!(value.get(field).is_some(), "missing {}", field);
        }
        assert!(value.get("lastUpdated").is_none());
        assert!(value["miningSpecification"].get("publicKeyForSigningBlocksBase58").is_some());
        assert_eq!(value["balance"], json!("0"));
    }

    #[test]
    fn test_rejects_bad_records() {
        let good = serde_json::to_value(MinerRecord::new(&miner("octopus", 3), &MinerStatus::default())).unwrap();

        let mut bad_size = good.clone();
        bad_size["size"] = json!(0);
        assert!(parse_record(bad_size).is_err());

        let mut bad_balance = good.clone();
        bad_balance["balance"] = json!("-5");
        assert!(parse_record(bad_balance).is_err());

        let mut bad_uuid = good.clone();
        bad_uuid["uuid"] = json!("not-a-uuid");
        assert!(parse_record(bad_uuid).is_err());

        let mut bad_key = good.clone();
        bad_key["publicKeyForSigningDeadlinesBase58"] = json!("0OIl");
        assert!(parse_record(bad_key).is_err());

        assert!(parse_record(json!({"uuid": "x"})).is_err());
        assert!(parse_record(good).is_ok());
    }
}
