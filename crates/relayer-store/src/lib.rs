// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Relayer Store Module 🕸️
//!
//! A module for managing the storage of the relayer.
//!
//! ## Overview
//!
//! The relayer store keeps the metadata of every accepted scan report, the
//! relay state of its on-chain transaction, and the encrypted payloads
//! uploaded by scanners.
//!
use std::fmt::Debug;

use ethers::types::{Address, TxHash};
use serde::{Deserialize, Serialize};
use trackless_relayer_types::Eid;
use trackless_relayer_utils::Result;

/// A module for managing in-memory storage of the relayer.
pub mod mem;
/// A module for setting up and managing a [Sled](https://sled.rs)-based database.
#[cfg(feature = "sled")]
pub mod sled;

/// A store that uses [`sled`](https://sled.rs) as the backend.
#[cfg(feature = "sled")]
pub use self::sled::SledStore;
/// A store that uses in memory data structures as the backend.
pub use mem::InMemoryStore;

/// Prefix of every content id handed out by the blob store.
pub const CONTENT_ID_PREFIX: &str = "QmTrackless_";

/// Reason recorded for relays interrupted by a restart.
pub const INTERRUPTED_REASON: &str = "relay interrupted by a relayer restart";

/// A report that passed validation and is about to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReport {
    /// The reported tracker.
    pub eid: Eid,
    /// The scanner that saw the tracker.
    pub scanner: Address,
    /// Content id of the encrypted location payload.
    pub content_id: String,
    /// Timestamp of the latest chain block when the report was accepted.
    pub submitted_at: u64,
}

/// A stored scan report. Never mutated and never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Monotonic id, in submission order.
    pub id: u64,
    /// The reported tracker.
    pub eid: Eid,
    /// The scanner that saw the tracker.
    pub scanner: Address,
    /// Content id of the encrypted location payload.
    pub content_id: String,
    /// Timestamp of the latest chain block when the report was accepted.
    pub submitted_at: u64,
}

impl Report {
    /// Builds the stored form of `report` under `id`.
    pub fn from_new(id: u64, report: NewReport) -> Self {
        Self {
            id,
            eid: report.eid,
            scanner: report.scanner,
            content_id: report.content_id,
            submitted_at: report.submitted_at,
        }
    }
}

/// The state of the relay transaction of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RelayState {
    /// The report is stored and its relay is in flight.
    Pending,
    /// The relay transaction was broadcast.
    Relayed {
        /// Hash of the broadcast transaction.
        tx_hash: TxHash,
    },
    /// The relay failed, the report may be relayed again.
    Failed {
        /// Why the relay failed, safe to show to clients.
        reason: String,
    },
}

impl RelayState {
    /// Whether the relay of this report can be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// ReportStore is a simple trait for storing and retrieving scan reports and
/// the relay state of each of them.
pub trait ReportStore: Clone + Send + Sync + Debug {
    /// Whether a report for `(eid, scanner)` exists.
    fn report_exists(&self, eid: &Eid, scanner: &Address) -> Result<bool>;
    /// The report for `(eid, scanner)`, if any.
    fn find_report(
        &self,
        eid: &Eid,
        scanner: &Address,
    ) -> Result<Option<Report>>;
    /// Stores `report` with the relay state [`RelayState::Pending`].
    ///
    /// The uniqueness check on `(eid, scanner)` and the insert are one atomic
    /// step. Fails with `Error::DuplicateReport` when the pair exists.
    fn insert_report(&self, report: NewReport) -> Result<Report>;
    /// All reports for `eid`, in submission order.
    fn reports_by_eid(&self, eid: &Eid) -> Result<Vec<Report>>;
    /// The report with the given id.
    fn get_report(&self, id: u64) -> Result<Option<Report>>;
    /// The relay state of the report with the given id.
    fn relay_state(&self, id: u64) -> Result<Option<RelayState>>;
    /// Overwrites the relay state of the report with the given id.
    fn set_relay_state(&self, id: u64, state: RelayState) -> Result<()>;
    /// Atomically moves a `Failed` relay back to `Pending`.
    ///
    /// Returns `false` when the relay is not `Failed`, for example because a
    /// concurrent retry claimed it first.
    fn claim_relay(&self, id: u64) -> Result<bool>;
    /// Marks every `Pending` relay as `Failed`, returning how many were
    /// changed. Only meant to run at startup, before serving requests.
    fn recover_interrupted(&self) -> Result<usize>;
}

/// BlobStore is a content addressed store for the encrypted payloads.
pub trait BlobStore: Clone + Send + Sync + Debug {
    /// Stores `payload`, returning its content id. Storing the same payload
    /// twice returns the same id.
    fn put_blob(&self, payload: &[u8]) -> Result<String>;
    /// The payload stored under `content_id`.
    fn get_blob(&self, content_id: &str) -> Result<Option<Vec<u8>>>;
}

/// Content id of `payload`, the keccak256 of its bytes.
pub fn content_id_of(payload: &[u8]) -> String {
    let hash = ethers::utils::keccak256(payload);
    format!("{CONTENT_ID_PREFIX}{}", hex::encode(hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_state_is_tagged_by_status() {
        let state = RelayState::Failed {
            reason: String::from("boom"),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json, serde_json::json!({"status": "failed", "reason": "boom"}));
        assert!(state.is_retryable());
        assert!(!RelayState::Pending.is_retryable());
    }

    #[test]
    fn content_id_is_stable() {
        let a = content_id_of(b"U2FsdGVkX1+encrypted");
        let b = content_id_of(b"U2FsdGVkX1+encrypted");
        let c = content_id_of(b"U2FsdGVkX1+other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with(CONTENT_ID_PREFIX));
        assert_eq!(a.len(), CONTENT_ID_PREFIX.len() + 64);
    }
}
