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

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use ethers::types::Address;
use parking_lot::RwLock;
use trackless_relayer_types::address::checksummed;
use trackless_relayer_types::Eid;
use trackless_relayer_utils::Error;

use super::{
    content_id_of, BlobStore, NewReport, RelayState, Report, ReportStore,
    INTERRUPTED_REASON,
};

#[derive(Default)]
struct Reports {
    next_id: u64,
    by_pair: HashMap<(Eid, Address), u64>,
    by_id: BTreeMap<u64, Report>,
    relay_states: HashMap<u64, RelayState>,
}

/// InMemoryStore is a store that keeps reports and payloads in memory.
///
/// Every report write holds the same write lock, which makes the duplicate
/// check and the insert a single step.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    reports: Arc<RwLock<Reports>>,
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish()
    }
}

impl ReportStore for InMemoryStore {
    #[tracing::instrument(skip(self))]
    fn report_exists(
        &self,
        eid: &Eid,
        scanner: &Address,
    ) -> crate::Result<bool> {
        let guard = self.reports.read();
        Ok(guard.by_pair.contains_key(&(*eid, *scanner)))
    }

    #[tracing::instrument(skip(self))]
    fn find_report(
        &self,
        eid: &Eid,
        scanner: &Address,
    ) -> crate::Result<Option<Report>> {
        let guard = self.reports.read();
        let report = guard
            .by_pair
            .get(&(*eid, *scanner))
            .and_then(|id| guard.by_id.get(id))
            .cloned();
        Ok(report)
    }

    #[tracing::instrument(skip(self))]
    fn insert_report(&self, report: NewReport) -> crate::Result<Report> {
        let mut guard = self.reports.write();
        let pair = (report.eid, report.scanner);
        if guard.by_pair.contains_key(&pair) {
            return Err(Error::DuplicateReport {
                eid: report.eid.to_string(),
                scanner: checksummed(&report.scanner),
            });
        }
        guard.next_id += 1;
        let id = guard.next_id;
        let stored = Report::from_new(id, report);
        guard.by_pair.insert(pair, id);
        guard.by_id.insert(id, stored.clone());
        guard.relay_states.insert(id, RelayState::Pending);
        Ok(stored)
    }

    #[tracing::instrument(skip(self))]
    fn reports_by_eid(&self, eid: &Eid) -> crate::Result<Vec<Report>> {
        let guard = self.reports.read();
        let reports = guard
            .by_id
            .values()
            .filter(|r| r.eid == *eid)
            .cloned()
            .collect();
        Ok(reports)
    }

    #[tracing::instrument(skip(self))]
    fn get_report(&self, id: u64) -> crate::Result<Option<Report>> {
        Ok(self.reports.read().by_id.get(&id).cloned())
    }

    #[tracing::instrument(skip(self))]
    fn relay_state(&self, id: u64) -> crate::Result<Option<RelayState>> {
        Ok(self.reports.read().relay_states.get(&id).cloned())
    }

    #[tracing::instrument(skip(self))]
    fn set_relay_state(&self, id: u64, state: RelayState) -> crate::Result<()> {
        let mut guard = self.reports.write();
        if !guard.by_id.contains_key(&id) {
            return Err(Error::ReportNotFound(id));
        }
        guard.relay_states.insert(id, state);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn claim_relay(&self, id: u64) -> crate::Result<bool> {
        let mut guard = self.reports.write();
        match guard.relay_states.get_mut(&id) {
            Some(state) if state.is_retryable() => {
                *state = RelayState::Pending;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(Error::ReportNotFound(id)),
        }
    }

    #[tracing::instrument(skip(self))]
    fn recover_interrupted(&self) -> crate::Result<usize> {
        let mut guard = self.reports.write();
        let mut recovered = 0;
        for state in guard.relay_states.values_mut() {
            if *state == RelayState::Pending {
                *state = RelayState::Failed {
                    reason: String::from(INTERRUPTED_REASON),
                };
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}

impl BlobStore for InMemoryStore {
    #[tracing::instrument(skip_all, fields(len = payload.len()))]
    fn put_blob(&self, payload: &[u8]) -> crate::Result<String> {
        let content_id = content_id_of(payload);
        self.blobs
            .write()
            .entry(content_id.clone())
            .or_insert_with(|| payload.to_vec());
        Ok(content_id)
    }

    #[tracing::instrument(skip(self))]
    fn get_blob(&self, content_id: &str) -> crate::Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(content_id).cloned())
    }
}
