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

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use trackless_relayer_context::RelayerContext;
use trackless_relayer_store::{RelayState, Report};
use trackless_relayer_types::address::checksummed;
use trackless_relayer_utils::HandlerError;
use trackless_tx_relay::{ReportStatus, ScanReceipt};

/// Body of a scan report submission.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanReportRequest {
    /// Hex encoded EID, 64 characters without `0x`.
    pub eid: String,
    /// Content id of the uploaded encrypted location.
    pub ipfs_cid: String,
    /// Temporary address of the scanner.
    pub scanner_addr: String,
}

/// Scan report submission response
#[derive(Debug, Serialize)]
pub struct ScanReportResponse {
    status: &'static str,
    report_id: u64,
    tx_hash: String,
    ipfs_cid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    explorer_url: Option<String>,
}

impl ScanReportResponse {
    fn new(ctx: &RelayerContext, receipt: ScanReceipt) -> Self {
        let tx_hash = format!("{:#x}", receipt.tx_hash);
        let explorer_url = ctx
            .config
            .chain
            .explorer_tx_url(&tx_hash)
            .map(|url| url.to_string());
        Self {
            status: "success",
            report_id: receipt.report_id,
            tx_hash,
            ipfs_cid: receipt.content_id,
            explorer_url,
        }
    }
}

/// One entry of the reports of a tracker.
#[derive(Debug, Serialize)]
pub struct ReportSummary {
    ipfs_cid: String,
    timestamp: u64,
    scanner: String,
}

impl From<Report> for ReportSummary {
    fn from(report: Report) -> Self {
        Self {
            ipfs_cid: report.content_id,
            timestamp: report.submitted_at,
            scanner: checksummed(&report.scanner),
        }
    }
}

/// A stored report and the state of its relay transaction.
#[derive(Debug, Serialize)]
pub struct ReportStatusResponse {
    report_id: u64,
    eid: String,
    ipfs_cid: String,
    timestamp: u64,
    scanner: String,
    relay: RelayState,
}

impl From<ReportStatus> for ReportStatusResponse {
    fn from(ReportStatus { report, relay }: ReportStatus) -> Self {
        Self {
            report_id: report.id,
            eid: report.eid.to_string(),
            ipfs_cid: report.content_id,
            timestamp: report.submitted_at,
            scanner: checksummed(&report.scanner),
            relay,
        }
    }
}

/// Handles a scan report: validates it against the registry, stores it and
/// relays it on chain.
///
/// Returns a Result with the `ScanReportResponse` on success
pub async fn handle_submit_scan_report(
    State(ctx): State<Arc<RelayerContext>>,
    request: Result<Json<ScanReportRequest>, JsonRejection>,
) -> Result<Json<ScanReportResponse>, HandlerError> {
    let Json(request) = request?;
    let receipt = ctx
        .relay()
        .submit_scan_report(
            &request.eid,
            &request.ipfs_cid,
            &request.scanner_addr,
        )
        .await?;
    tracing::info!(
        report_id = receipt.report_id,
        tx_hash = ?receipt.tx_hash,
        "scan report relayed"
    );
    Ok(Json(ScanReportResponse::new(&ctx, receipt)))
}

/// Handles the listing of every report of a tracker, oldest first.
///
/// # Arguments
///
/// * `eid` - Hex encoded EID of the tracker.
pub async fn handle_list_reports(
    State(ctx): State<Arc<RelayerContext>>,
    Path(eid): Path<String>,
) -> Result<Json<Vec<ReportSummary>>, HandlerError> {
    let reports = ctx.relay().list_reports(&eid)?;
    Ok(Json(reports.into_iter().map(ReportSummary::from).collect()))
}

/// Handles the status lookup of a single report.
pub async fn handle_report_status(
    State(ctx): State<Arc<RelayerContext>>,
    report_id: Result<Path<u64>, PathRejection>,
) -> Result<Json<ReportStatusResponse>, HandlerError> {
    let Path(report_id) = report_id?;
    let status = ctx.relay().report_status(report_id)?;
    Ok(Json(status.into()))
}

/// Handles a new relay attempt of a report whose relay failed.
pub async fn handle_resubmit_report(
    State(ctx): State<Arc<RelayerContext>>,
    report_id: Result<Path<u64>, PathRejection>,
) -> Result<Json<ScanReportResponse>, HandlerError> {
    let Path(report_id) = report_id?;
    let receipt = ctx.relay().resubmit_report(report_id).await?;
    Ok(Json(ScanReportResponse::new(&ctx, receipt)))
}
