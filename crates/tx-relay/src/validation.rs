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

//! The checks a scan report must pass before it is stored.
//!
//! Each check is a plain function over values already read from the chain or
//! the store, so the pipeline is the sequence of calls in
//! [`ScanReportRelay::submit_scan_report`](crate::ScanReportRelay::submit_scan_report).

use ethers::types::Address;
use trackless_relayer_store::{RelayState, Report};
use trackless_relayer_types::{address::parse_scanner_address, Eid};
use trackless_relayer_utils::ScanReportError;

/// A scan report whose fields are well formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSubmission {
    /// The reported tracker.
    pub eid: Eid,
    /// The scanner that saw the tracker.
    pub scanner: Address,
    /// Content id of the encrypted location payload.
    pub content_id: String,
}

impl ScanSubmission {
    /// Parses the raw request fields, without any I/O.
    pub fn parse(
        eid: &str,
        content_id: &str,
        scanner: &str,
    ) -> Result<Self, ScanReportError> {
        let eid = parse_eid(eid)?;
        let scanner = parse_scanner_address(scanner)
            .map_err(|_| ScanReportError::InvalidAddress)?;
        Ok(Self {
            eid,
            scanner,
            content_id: content_id.to_owned(),
        })
    }
}

/// What to do with a submission whose pair may already be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportDisposition {
    /// No report exists for the pair, a new one is stored.
    Fresh,
    /// The pair was stored but its relay failed, the stored report is
    /// relayed again.
    Retry(Report),
}

/// Parses a hex encoded EID.
pub fn parse_eid(eid: &str) -> Result<Eid, ScanReportError> {
    eid.parse().map_err(|_| ScanReportError::InvalidEid)
}

/// The tracker must have an owner.
pub fn ensure_registered(
    owner: Option<Address>,
) -> Result<Address, ScanReportError> {
    match owner {
        Some(owner) if !owner.is_zero() => Ok(owner),
        _ => Err(ScanReportError::TrackerNotRegistered),
    }
}

/// The tracker must be in lost mode.
pub fn ensure_lost(lost: bool) -> Result<(), ScanReportError> {
    if lost {
        Ok(())
    } else {
        Err(ScanReportError::TrackerNotLost)
    }
}

/// Owners can not report their own trackers. Addresses compare by value, so
/// the hex case a client used does not matter.
pub fn ensure_not_owner(
    owner: Address,
    scanner: Address,
) -> Result<(), ScanReportError> {
    if owner == scanner {
        Err(ScanReportError::SelfReportRejected)
    } else {
        Ok(())
    }
}

/// A pair is reported once, unless its relay failed.
pub fn ensure_not_reported(
    existing: Option<(Report, Option<RelayState>)>,
) -> Result<ReportDisposition, ScanReportError> {
    match existing {
        None => Ok(ReportDisposition::Fresh),
        Some((report, Some(state))) if state.is_retryable() => {
            Ok(ReportDisposition::Retry(report))
        }
        Some(_) => Err(ScanReportError::DuplicateReport),
    }
}
