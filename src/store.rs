//! Record persistence with per-record compare-and-swap commits.
//!
//! Bookings and claims share the default sled tree, namespaced by the bech32
//! prefix of their ids. Every mutation is a read-modify-write: the caller
//! loads a record together with the exact bytes read, mutates a copy, and
//! commits against those bytes. A concurrent writer makes the swap fail and
//! surfaces as a conflict the caller retries after re-reading, so two
//! transitions on the same record can never interleave.

use super::booking::BookingRecord;
use super::claim::ClaimRecord;
use super::clock::TimeStamp;
use super::error::WorkflowError;
use chrono::Utc;
use sled::IVec;
use std::sync::Arc;

// bech32 places a '1' separator after the human-readable prefix, so every
// claim id starts with this and a prefix scan finds exactly the claims.
const CLAIM_KEY_PREFIX: &str = "claim_1";

pub struct RecordStore {
    db: Arc<sled::Db>,
}

impl RecordStore {
    pub fn new(db: Arc<sled::Db>) -> Self {
        Self { db }
    }

    fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, WorkflowError> {
        minicbor::to_vec(value).map_err(|err| WorkflowError::Codec(err.to_string()))
    }

    fn decode<'b, T: minicbor::Decode<'b, ()>>(bytes: &'b [u8]) -> Result<T, WorkflowError> {
        minicbor::decode(bytes).map_err(|err| WorkflowError::Codec(err.to_string()))
    }

    /// Insert a fresh record. Swapping against absence means a duplicate id
    /// shows up as a conflict instead of silently overwriting.
    fn insert_new(&self, id: &str, bytes: Vec<u8>) -> Result<(), WorkflowError> {
        self.db
            .compare_and_swap(id.as_bytes(), None::<&[u8]>, Some(bytes))?
            .map_err(|_| WorkflowError::Conflict { id: id.to_string() })
    }

    /// Swap the previously read bytes for the new encoding. Fails with a
    /// conflict when the stored record changed under the writer.
    fn swap(&self, id: &str, prior: &IVec, bytes: Vec<u8>) -> Result<(), WorkflowError> {
        self.db
            .compare_and_swap(id.as_bytes(), Some(prior), Some(bytes))?
            .map_err(|_| WorkflowError::Conflict { id: id.to_string() })
    }

    pub fn insert_booking(&self, record: &BookingRecord) -> Result<(), WorkflowError> {
        self.insert_new(&record.id, Self::encode(record)?)
    }

    /// Load a booking together with the bytes it was decoded from, which the
    /// commit later swaps against.
    pub fn load_booking(&self, id: &str) -> Result<(BookingRecord, IVec), WorkflowError> {
        let bytes = self.db.get(id.as_bytes())?.ok_or(WorkflowError::NotFound {
            entity: "booking",
            id: id.to_string(),
        })?;
        let record = Self::decode(&bytes)?;
        Ok((record, bytes))
    }

    pub fn commit_booking(
        &self,
        record: &mut BookingRecord,
        prior: &IVec,
        now: TimeStamp<Utc>,
    ) -> Result<(), WorkflowError> {
        record.updated_at = now;
        record.version += 1;
        let id = record.id.clone();
        self.swap(&id, prior, Self::encode(record)?)
    }

    pub fn insert_claim(&self, record: &ClaimRecord) -> Result<(), WorkflowError> {
        self.insert_new(&record.id, Self::encode(record)?)
    }

    pub fn load_claim(&self, id: &str) -> Result<(ClaimRecord, IVec), WorkflowError> {
        let bytes = self.db.get(id.as_bytes())?.ok_or(WorkflowError::NotFound {
            entity: "claim",
            id: id.to_string(),
        })?;
        let record = Self::decode(&bytes)?;
        Ok((record, bytes))
    }

    pub fn commit_claim(
        &self,
        record: &mut ClaimRecord,
        prior: &IVec,
        now: TimeStamp<Utc>,
    ) -> Result<(), WorkflowError> {
        record.updated_at = now;
        record.version += 1;
        let id = record.id.clone();
        self.swap(&id, prior, Self::encode(record)?)
    }

    pub fn all_claims(&self) -> Result<Vec<ClaimRecord>, WorkflowError> {
        let mut claims = Vec::new();
        for entry in self.db.scan_prefix(CLAIM_KEY_PREFIX.as_bytes()) {
            let (_, bytes) = entry?;
            claims.push(Self::decode(&bytes)?);
        }
        Ok(claims)
    }

    pub fn claims_for_booking(&self, booking_id: &str) -> Result<Vec<ClaimRecord>, WorkflowError> {
        let mut claims = self.all_claims()?;
        claims.retain(|claim| claim.booking_id == booking_id);
        Ok(claims)
    }
}
