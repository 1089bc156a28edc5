//! Append-only activity trail.
//!
//! Every committed state mutation appends one entry naming the entity, the
//! action, the actor and the inputs that drove it. Entries are written after
//! the record commit and the workflow never reads them back to make
//! decisions, the read side exists for audit and tests.

use super::clock::TimeStamp;
use super::error::WorkflowError;
use chrono::Utc;
use std::sync::Arc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct MetaItem {
    #[n(0)]
    pub key: String,
    #[n(1)]
    pub value: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    #[n(0)]
    pub entity_id: String,
    #[n(1)]
    pub action: String,
    #[n(2)]
    pub actor: String,
    #[n(3)]
    pub recorded_at: TimeStamp<Utc>,
    #[n(4)]
    pub metadata: Vec<MetaItem>,
}

impl ActivityEntry {
    pub fn new(
        entity_id: impl Into<String>,
        action: &str,
        actor: &str,
        recorded_at: TimeStamp<Utc>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            action: action.to_string(),
            actor: actor.to_string(),
            recorded_at,
            metadata: Vec::new(),
        }
    }
    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.push(MetaItem {
            key: key.to_string(),
            value: value.into(),
        });
        self
    }
    /// Returns the entry's content digest together with its cbor encoding.
    pub fn build(&self) -> anyhow::Result<(String, Vec<u8>)> {
        let cbor = minicbor::to_vec(self)?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }
}

pub struct ActivityLog {
    db: Arc<sled::Db>,
}

impl ActivityLog {
    pub fn new(db: Arc<sled::Db>) -> Self {
        Self { db }
    }

    /// Append one entry. Keys carry a zero-padded monotonic sequence so that
    /// lexicographic key order is append order, plus a digest fragment that
    /// makes the stored content tamper-evident.
    pub fn append(&self, entry: &ActivityEntry) -> Result<(), WorkflowError> {
        let (digest, cbor) = entry.build()?;
        let seq = self.db.generate_id()?;
        let key = format!("log_{seq:020}_{}", &digest[..12]);
        self.db.insert(key.as_bytes(), cbor)?;
        Ok(())
    }

    /// Every entry recorded for one entity, oldest first.
    pub fn entries_for(&self, entity_id: &str) -> Result<Vec<ActivityEntry>, WorkflowError> {
        let mut entries = Vec::new();
        for item in self.db.scan_prefix(b"log_") {
            let (_, bytes) = item?;
            let entry: ActivityEntry =
                minicbor::decode(&bytes).map_err(|err| WorkflowError::Codec(err.to_string()))?;
            if entry.entity_id == entity_id {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}
