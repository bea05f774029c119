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

use std::path::Path;
use std::sync::Arc;

use ethers::types::Address;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use trackless_relayer_types::address::checksummed;
use trackless_relayer_types::Eid;
use trackless_relayer_utils::Error;

use super::{
    content_id_of, BlobStore, NewReport, RelayState, Report, ReportStore,
    INTERRUPTED_REASON,
};

/// `eid || scanner` -> report id.
const PAIRS_TREE: &str = "report_pairs";
/// report id -> report.
const REPORTS_TREE: &str = "reports";
/// `eid || report id` -> (), ordered by report id within an eid.
const EID_INDEX_TREE: &str = "reports_by_eid";
/// report id -> relay state.
const RELAY_STATES_TREE: &str = "relay_states";
/// content id -> encrypted payload.
const BLOBS_TREE: &str = "blobs";

/// SledStore is a store that keeps reports and payloads in a [Sled](https://sled.rs)-based database.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
    // keeps the directory of a temporary store alive.
    _tmp_dir: Option<Arc<tempfile::TempDir>>,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish()
    }
}

impl SledStore {
    /// Create a new SledStore.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .temporary(cfg!(test))
            .mode(sled::Mode::HighThroughput)
            .open()?;
        Ok(Self { db, _tmp_dir: None })
    }

    /// Creates a temporary SledStore, removed when the last clone is dropped.
    pub fn temporary() -> crate::Result<Self> {
        let dir = tempfile::tempdir()?;
        let mut store = Self::open(dir.path())?;
        store._tmp_dir = Some(Arc::new(dir));
        Ok(store)
    }

    /// Gets the total amount of data stored on disk
    pub fn get_data_stored_size(&self) -> u64 {
        self.db.size_on_disk().unwrap_or_default()
    }
}

fn pair_key(eid: &Eid, scanner: &Address) -> [u8; 52] {
    let mut key = [0u8; 52];
    key[..32].copy_from_slice(eid.as_bytes());
    key[32..].copy_from_slice(scanner.as_bytes());
    key
}

fn eid_index_key(eid: &Eid, id: u64) -> [u8; 40] {
    let mut key = [0u8; 40];
    key[..32].copy_from_slice(eid.as_bytes());
    key[32..].copy_from_slice(&id.to_be_bytes());
    key
}

fn decode_id(bytes: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

impl ReportStore for SledStore {
    #[tracing::instrument(skip(self))]
    fn report_exists(
        &self,
        eid: &Eid,
        scanner: &Address,
    ) -> crate::Result<bool> {
        let tree = self.db.open_tree(PAIRS_TREE)?;
        Ok(tree.contains_key(pair_key(eid, scanner))?)
    }

    #[tracing::instrument(skip(self))]
    fn find_report(
        &self,
        eid: &Eid,
        scanner: &Address,
    ) -> crate::Result<Option<Report>> {
        let tree = self.db.open_tree(PAIRS_TREE)?;
        match tree.get(pair_key(eid, scanner))?.and_then(|v| decode_id(&v)) {
            Some(id) => self.get_report(id),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    fn insert_report(&self, report: NewReport) -> crate::Result<Report> {
        let pairs = self.db.open_tree(PAIRS_TREE)?;
        let reports = self.db.open_tree(REPORTS_TREE)?;
        let eid_index = self.db.open_tree(EID_INDEX_TREE)?;
        let relay_states = self.db.open_tree(RELAY_STATES_TREE)?;

        // ids are never reused, a rejected duplicate only leaves a gap.
        let id = self.db.generate_id()? + 1;
        let pair = pair_key(&report.eid, &report.scanner);
        let index = eid_index_key(&report.eid, id);
        let stored = Report::from_new(id, report);
        let report_bytes = serde_json::to_vec(&stored)?;
        let state_bytes = serde_json::to_vec(&RelayState::Pending)?;

        let result = (&pairs, &reports, &eid_index, &relay_states).transaction(
            |(pairs, reports, eid_index, relay_states)| {
                if pairs.get(pair)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        Error::DuplicateReport {
                            eid: stored.eid.to_string(),
                            scanner: checksummed(&stored.scanner),
                        },
                    ));
                }
                pairs.insert(&pair[..], &id.to_be_bytes()[..])?;
                reports.insert(&id.to_be_bytes()[..], report_bytes.as_slice())?;
                eid_index.insert(&index[..], sled::IVec::default())?;
                relay_states
                    .insert(&id.to_be_bytes()[..], state_bytes.as_slice())?;
                Ok(())
            },
        );
        match result {
            Ok(()) => {
                self.db.flush()?;
                tracing::trace!(id, "report stored");
                Ok(stored)
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip(self))]
    fn reports_by_eid(&self, eid: &Eid) -> crate::Result<Vec<Report>> {
        let eid_index = self.db.open_tree(EID_INDEX_TREE)?;
        let mut reports = Vec::new();
        for entry in eid_index.scan_prefix(eid.as_bytes()) {
            let (key, _) = entry?;
            let Some(id) = decode_id(&key[32..]) else {
                tracing::warn!("Skipping malformed eid index entry");
                continue;
            };
            match self.get_report(id)? {
                Some(report) => reports.push(report),
                None => return Err(Error::ReportNotFound(id)),
            }
        }
        Ok(reports)
    }

    #[tracing::instrument(skip(self))]
    fn get_report(&self, id: u64) -> crate::Result<Option<Report>> {
        let tree = self.db.open_tree(REPORTS_TREE)?;
        match tree.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    fn relay_state(&self, id: u64) -> crate::Result<Option<RelayState>> {
        let tree = self.db.open_tree(RELAY_STATES_TREE)?;
        match tree.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    fn set_relay_state(&self, id: u64, state: RelayState) -> crate::Result<()> {
        let tree = self.db.open_tree(RELAY_STATES_TREE)?;
        if !tree.contains_key(id.to_be_bytes())? {
            return Err(Error::ReportNotFound(id));
        }
        tree.insert(id.to_be_bytes(), serde_json::to_vec(&state)?)?;
        self.db.flush()?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn claim_relay(&self, id: u64) -> crate::Result<bool> {
        let tree = self.db.open_tree(RELAY_STATES_TREE)?;
        let current = tree
            .get(id.to_be_bytes())?
            .ok_or(Error::ReportNotFound(id))?;
        let state: RelayState = serde_json::from_slice(&current)?;
        if !state.is_retryable() {
            return Ok(false);
        }
        let pending = serde_json::to_vec(&RelayState::Pending)?;
        // the swap only succeeds if nobody touched the state since we read it.
        let swapped = tree
            .compare_and_swap(id.to_be_bytes(), Some(current), Some(pending))?
            .is_ok();
        if swapped {
            self.db.flush()?;
        }
        Ok(swapped)
    }

    #[tracing::instrument(skip(self))]
    fn recover_interrupted(&self) -> crate::Result<usize> {
        let tree = self.db.open_tree(RELAY_STATES_TREE)?;
        let failed = serde_json::to_vec(&RelayState::Failed {
            reason: String::from(INTERRUPTED_REASON),
        })?;
        let mut recovered = 0;
        for entry in tree.iter() {
            let (key, value) = entry?;
            let state: RelayState = serde_json::from_slice(&value)?;
            if state == RelayState::Pending {
                tree.insert(key, failed.as_slice())?;
                recovered += 1;
            }
        }
        self.db.flush()?;
        Ok(recovered)
    }
}

impl BlobStore for SledStore {
    #[tracing::instrument(skip_all, fields(len = payload.len()))]
    fn put_blob(&self, payload: &[u8]) -> crate::Result<String> {
        let tree = self.db.open_tree(BLOBS_TREE)?;
        let content_id = content_id_of(payload);
        // same id means same bytes, keep whichever landed first.
        let _ = tree.compare_and_swap(
            content_id.as_bytes(),
            None as Option<&[u8]>,
            Some(payload),
        )?;
        self.db.flush()?;
        Ok(content_id)
    }

    #[tracing::instrument(skip(self))]
    fn get_blob(&self, content_id: &str) -> crate::Result<Option<Vec<u8>>> {
        let tree = self.db.open_tree(BLOBS_TREE)?;
        Ok(tree.get(content_id.as_bytes())?.map(|v| v.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_report(eid: u8, scanner: u8) -> NewReport {
        NewReport {
            eid: Eid::new([eid; 32]),
            scanner: Address::repeat_byte(scanner),
            content_id: format!("QmTrackless_{eid}_{scanner}"),
            submitted_at: 1_700_000_000,
        }
    }

    #[test]
    fn insert_and_list_reports_should_work() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SledStore::open(tmp.path()).unwrap();
        let eid = Eid::new([1; 32]);
        assert!(store.reports_by_eid(&eid).unwrap().is_empty());

        let first = store.insert_report(new_report(1, 0xbb)).unwrap();
        let second = store.insert_report(new_report(1, 0xcc)).unwrap();
        store.insert_report(new_report(2, 0xbb)).unwrap();
        assert!(first.id < second.id);

        let reports = store.reports_by_eid(&eid).unwrap();
        assert_eq!(reports, vec![first.clone(), second]);
        assert!(store
            .report_exists(&eid, &Address::repeat_byte(0xbb))
            .unwrap());
        assert_eq!(
            store
                .find_report(&eid, &Address::repeat_byte(0xbb))
                .unwrap(),
            Some(first)
        );
    }

    #[test]
    fn duplicate_pair_should_be_rejected() {
        let store = SledStore::temporary().unwrap();
        store.insert_report(new_report(1, 0xbb)).unwrap();
        let err = store.insert_report(new_report(1, 0xbb)).unwrap_err();
        assert!(matches!(err, Error::DuplicateReport { .. }));
        assert_eq!(store.reports_by_eid(&Eid::new([1; 32])).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_inserts_of_same_pair_store_one_report() {
        let store = SledStore::temporary().unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::task::spawn_blocking(move || {
                    store.insert_report(new_report(7, 0xbb))
                })
            })
            .collect();
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let dup = results
            .iter()
            .filter(|r| matches!(r, Err(Error::DuplicateReport { .. })))
            .count();
        assert_eq!(ok, 1);
        assert_eq!(dup, 7);
        assert_eq!(store.reports_by_eid(&Eid::new([7; 32])).unwrap().len(), 1);
    }

    #[test]
    fn relay_state_should_be_claimable_once_failed() {
        let store = SledStore::temporary().unwrap();
        let report = store.insert_report(new_report(1, 0xbb)).unwrap();
        assert_eq!(
            store.relay_state(report.id).unwrap(),
            Some(RelayState::Pending)
        );
        assert!(!store.claim_relay(report.id).unwrap());

        store
            .set_relay_state(
                report.id,
                RelayState::Failed {
                    reason: String::from("broadcast"),
                },
            )
            .unwrap();
        assert!(store.claim_relay(report.id).unwrap());
        assert!(!store.claim_relay(report.id).unwrap());
        assert!(store
            .set_relay_state(99, RelayState::Pending)
            .is_err());
    }

    #[test]
    fn interrupted_relays_should_be_recovered() {
        let store = SledStore::temporary().unwrap();
        let pending = store.insert_report(new_report(1, 0xbb)).unwrap();
        let relayed = store.insert_report(new_report(1, 0xcc)).unwrap();
        let tx_hash = ethers::types::TxHash::repeat_byte(0x11);
        store
            .set_relay_state(relayed.id, RelayState::Relayed { tx_hash })
            .unwrap();

        assert_eq!(store.recover_interrupted().unwrap(), 1);
        assert_eq!(
            store.relay_state(pending.id).unwrap(),
            Some(RelayState::Failed {
                reason: String::from(INTERRUPTED_REASON)
            })
        );
        assert_eq!(
            store.relay_state(relayed.id).unwrap(),
            Some(RelayState::Relayed { tx_hash })
        );
    }

    #[test]
    fn blobs_should_be_content_addressed() {
        let store = SledStore::temporary().unwrap();
        let id = store.put_blob(b"U2FsdGVkX1+encrypted gps").unwrap();
        assert_eq!(id, store.put_blob(b"U2FsdGVkX1+encrypted gps").unwrap());
        assert_eq!(
            store.get_blob(&id).unwrap(),
            Some(b"U2FsdGVkX1+encrypted gps".to_vec())
        );
        assert_eq!(store.get_blob("QmTrackless_unknown").unwrap(), None);
    }
}
