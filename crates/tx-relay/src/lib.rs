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

#![warn(missing_docs)]
//! # Trackless Transaction Relay 📡
//!
//! Accepts scan reports, validates them against the registry contract,
//! stores them and relays them on chain with the relay credential.

use std::sync::Arc;

use ethers::types::{Address, TxHash};
use trackless_chain_gateway::{ChainGateway, RelayCredential};
use trackless_relayer_store::{
    BlobStore, NewReport, RelayState, Report, ReportStore,
};
use trackless_relayer_types::Eid;
use trackless_relayer_utils::metric::Metrics;
use trackless_relayer_utils::{probe, ScanReportError};

/// Relays stored reports under the credential lock.
pub mod submitter;
/// The checks run before a report is stored.
pub mod validation;

pub use submitter::RelaySubmitter;
use validation::{ReportDisposition, ScanSubmission};

/// The outcome of a relayed scan report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReceipt {
    /// Id of the stored report.
    pub report_id: u64,
    /// Hash of the `submitReport` transaction.
    pub tx_hash: TxHash,
    /// Content id of the encrypted location payload.
    pub content_id: String,
}

/// A stored report with the state of its relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportStatus {
    /// The stored report.
    pub report: Report,
    /// Where its relay stands.
    pub relay: RelayState,
}

/// Scan report relay service.
///
/// Owns the pipeline from a raw scan report to a broadcast transaction:
/// validate, persist, relay. Reads never retry, a failed relay leaves the
/// report stored with a [`RelayState::Failed`] state that a later
/// submission of the same pair, or [`Self::resubmit_report`], picks up.
pub struct ScanReportRelay<S> {
    store: S,
    gateway: Arc<dyn ChainGateway>,
    submitter: RelaySubmitter,
    metrics: Arc<Metrics>,
    min_payload_len: usize,
}

impl<S> std::fmt::Debug for ScanReportRelay<S>
where
    S: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanReportRelay")
            .field("store", &self.store)
            .field("submitter", &self.submitter)
            .field("min_payload_len", &self.min_payload_len)
            .finish()
    }
}

impl<S> ScanReportRelay<S>
where
    S: ReportStore + BlobStore,
{
    /// Creates the relay service.
    ///
    /// `min_payload_len` is the shortest encrypted payload, in characters,
    /// the blob store accepts.
    pub fn new(
        store: S,
        gateway: Arc<dyn ChainGateway>,
        credential: RelayCredential,
        metrics: Arc<Metrics>,
        min_payload_len: usize,
    ) -> Self {
        let submitter = RelaySubmitter::new(gateway.clone(), credential);
        Self {
            store,
            gateway,
            submitter,
            metrics,
            min_payload_len,
        }
    }

    /// The chain gateway the relay reads from and writes to.
    pub fn gateway(&self) -> &Arc<dyn ChainGateway> {
        &self.gateway
    }

    /// The relay account address.
    pub fn relayer_address(&self) -> Address {
        self.submitter.relayer_address()
    }

    /// Validates, stores and relays a scan report.
    ///
    /// The checks run in a fixed order and stop at the first failure: format,
    /// registration, lost mode, self report, duplicate. Nothing is stored
    /// unless every check passes.
    ///
    /// When the pair was reported before and that relay failed, the stored
    /// report is relayed again as it is. Stored reports are never rewritten,
    /// so a different `content_id` in the retry is ignored and the receipt
    /// carries the stored one.
    #[tracing::instrument(skip(self, content_id))]
    pub async fn submit_scan_report(
        &self,
        eid: &str,
        content_id: &str,
        scanner: &str,
    ) -> Result<ScanReceipt, ScanReportError> {
        self.metrics.reports_received.inc();
        let result = self.try_submit(eid, content_id, scanner).await;
        if let Err(e) = &result {
            self.record_rejection(e);
        }
        result
    }

    async fn try_submit(
        &self,
        eid: &str,
        content_id: &str,
        scanner: &str,
    ) -> Result<ScanReceipt, ScanReportError> {
        let submission = ScanSubmission::parse(eid, content_id, scanner)?;
        self.check_chain(&submission.eid, submission.scanner).await?;

        let existing = match self
            .store
            .find_report(&submission.eid, &submission.scanner)?
        {
            Some(report) => {
                let state = self.store.relay_state(report.id)?;
                Some((report, state))
            }
            None => None,
        };
        let report = match validation::ensure_not_reported(existing)? {
            ReportDisposition::Fresh => self.persist(submission).await?,
            ReportDisposition::Retry(report) => self.claim(report)?,
        };
        self.relay(report).await
    }

    /// Registration, lost mode and self report checks.
    async fn check_chain(
        &self,
        eid: &Eid,
        scanner: Address,
    ) -> Result<(), ScanReportError> {
        let owner = validation::ensure_registered(
            self.gateway.owner_of(eid).await?,
        )?;
        validation::ensure_lost(self.gateway.is_lost(eid).await?)?;
        validation::ensure_not_owner(owner, scanner)
    }

    async fn persist(
        &self,
        submission: ScanSubmission,
    ) -> Result<Report, ScanReportError> {
        let submitted_at = self.gateway.latest_block_timestamp().await?;
        let report = self.store.insert_report(NewReport {
            eid: submission.eid,
            scanner: submission.scanner,
            content_id: submission.content_id,
            submitted_at,
        })?;
        self.metrics.reports_persisted.inc();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::ReportStore,
            report_id = report.id,
            eid = %report.eid,
            stored = true,
        );
        Ok(report)
    }

    /// Takes over the relay of a report whose previous relay failed.
    fn claim(&self, report: Report) -> Result<Report, ScanReportError> {
        if !self.store.claim_relay(report.id)? {
            // someone else claimed it between the read and now.
            return Err(ScanReportError::DuplicateReport);
        }
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Retry,
            report_id = report.id,
            claimed = true,
        );
        Ok(report)
    }

    async fn relay(
        &self,
        report: Report,
    ) -> Result<ScanReceipt, ScanReportError> {
        match self.submitter.relay(&report).await {
            Ok(tx_hash) => {
                self.metrics.reports_relayed.inc();
                let state = RelayState::Relayed { tx_hash };
                if let Err(e) = self.store.set_relay_state(report.id, state) {
                    // the transaction is out, the receipt is still valid.
                    tracing::error!(
                        report_id = report.id,
                        ?tx_hash,
                        error = %e,
                        "failed to record relayed state",
                    );
                }
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::RelayTx,
                    report_id = report.id,
                    relayed = true,
                    ?tx_hash,
                );
                Ok(ScanReceipt {
                    report_id: report.id,
                    tx_hash,
                    content_id: report.content_id,
                })
            }
            Err(e) => {
                self.metrics.relay_failures.inc();
                let state = RelayState::Failed {
                    reason: e.to_string(),
                };
                if let Err(store_err) =
                    self.store.set_relay_state(report.id, state)
                {
                    tracing::error!(
                        report_id = report.id,
                        error = %store_err,
                        "failed to record failed relay",
                    );
                }
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::RelayTx,
                    report_id = report.id,
                    errored = true,
                    error = ?e,
                );
                Err(e)
            }
        }
    }

    fn record_rejection(&self, e: &ScanReportError) {
        let kind = e.kind();
        self.metrics.report_rejected(kind);
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Validation,
            rejected = %kind,
        );
    }

    /// Every stored report of `eid`, oldest first.
    #[tracing::instrument(skip(self))]
    pub fn list_reports(
        &self,
        eid: &str,
    ) -> Result<Vec<Report>, ScanReportError> {
        let eid = validation::parse_eid(eid)?;
        Ok(self.store.reports_by_eid(&eid)?)
    }

    /// A stored report with the state of its relay.
    #[tracing::instrument(skip(self))]
    pub fn report_status(
        &self,
        report_id: u64,
    ) -> Result<ReportStatus, ScanReportError> {
        let report = self
            .store
            .get_report(report_id)?
            .ok_or(ScanReportError::ReportNotFound)?;
        let relay = self
            .store
            .relay_state(report_id)?
            .ok_or(ScanReportError::ReportNotFound)?;
        Ok(ReportStatus { report, relay })
    }

    /// Relays a stored report again after its relay failed.
    ///
    /// The chain checks run again since the tracker may have been found or
    /// transferred in the meantime. Reports that are relayed or in flight are
    /// rejected with [`ScanReportError::DuplicateReport`].
    #[tracing::instrument(skip(self))]
    pub async fn resubmit_report(
        &self,
        report_id: u64,
    ) -> Result<ScanReceipt, ScanReportError> {
        let result = self.try_resubmit(report_id).await;
        if let Err(e) = &result {
            self.record_rejection(e);
        }
        result
    }

    async fn try_resubmit(
        &self,
        report_id: u64,
    ) -> Result<ScanReceipt, ScanReportError> {
        let ReportStatus { report, relay } = self.report_status(report_id)?;
        if !relay.is_retryable() {
            return Err(ScanReportError::DuplicateReport);
        }
        self.check_chain(&report.eid, report.scanner).await?;
        let report = self.claim(report)?;
        self.relay(report).await
    }

    /// Marks relays left in flight by a previous run as failed, so they can
    /// be resubmitted. Must run before any report is accepted.
    pub fn recover_interrupted(&self) -> Result<usize, ScanReportError> {
        let recovered = self.store.recover_interrupted()?;
        if recovered > 0 {
            tracing::warn!(recovered, "marked interrupted relays as failed");
        }
        Ok(recovered)
    }

    /// Stores an encrypted payload, returning its content id.
    #[tracing::instrument(skip_all)]
    pub fn put_blob(&self, payload: &str) -> Result<String, ScanReportError> {
        if payload.chars().count() < self.min_payload_len {
            return Err(ScanReportError::InvalidPayload {
                min_len: self.min_payload_len,
            });
        }
        let content_id = self.store.put_blob(payload.as_bytes())?;
        self.metrics.blobs_stored.inc();
        tracing::debug!(%content_id, "stored encrypted payload");
        Ok(content_id)
    }

    /// The encrypted payload stored under `content_id`.
    #[tracing::instrument(skip(self))]
    pub fn get_blob(
        &self,
        content_id: &str,
    ) -> Result<Vec<u8>, ScanReportError> {
        self.store
            .get_blob(content_id)?
            .ok_or(ScanReportError::BlobNotFound)
    }
}
