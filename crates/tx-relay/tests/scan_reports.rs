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

use std::collections::HashSet;
use std::sync::Arc;

use ethers::types::Address;
use trackless_chain_gateway::{MockedChainGateway, RelayCredential};
use trackless_relayer_store::{
    InMemoryStore, NewReport, RelayState, ReportStore,
};
use trackless_relayer_types::private_key::PrivateKey;
use trackless_relayer_types::Eid;
use trackless_relayer_utils::metric::Metrics;
use trackless_relayer_utils::ErrorKind;
use trackless_tx_relay::ScanReportRelay;

const EID: &str =
    "a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90";
const OWNER: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const SCANNER: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
const CID: &str = "QmTrackless_5f2c9e";
// first default hardhat account.
const RELAY_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

struct Harness {
    relay: Arc<ScanReportRelay<InMemoryStore>>,
    gateway: Arc<MockedChainGateway>,
    store: InMemoryStore,
    metrics: Arc<Metrics>,
}

fn harness() -> Harness {
    let gateway = Arc::new(MockedChainGateway::default());
    let store = InMemoryStore::default();
    let metrics = Arc::new(Metrics::new().unwrap());
    let key: PrivateKey = RELAY_KEY.parse().unwrap();
    let credential = RelayCredential::from_private_key(&key, 31337).unwrap();
    let relay = ScanReportRelay::new(
        store.clone(),
        gateway.clone(),
        credential,
        metrics.clone(),
        20,
    );
    Harness {
        relay: Arc::new(relay),
        gateway,
        store,
        metrics,
    }
}

fn eid() -> Eid {
    EID.parse().unwrap()
}

fn address(s: &str) -> Address {
    s.parse().unwrap()
}

/// Registers the tracker to `OWNER` and puts it in lost mode.
fn lost_tracker(h: &Harness) {
    h.gateway.register_tracker(eid(), address(OWNER));
    h.gateway.set_lost(&eid(), true);
}

#[tokio::test]
async fn malformed_eid_touches_nothing() {
    let h = harness();
    lost_tracker(&h);
    let malformed = vec![
        String::new(),
        String::from("abc"),
        EID[1..].to_string(),
        format!("{EID}00"),
        format!("0x{EID}"),
        EID.replace('a', "g"),
    ];
    for bad in malformed {
        let err = h
            .relay
            .submit_scan_report(&bad, CID, SCANNER)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEid, "{bad:?}");
    }
    assert_eq!(h.gateway.chain_reads(), 0);
    assert!(h.store.reports_by_eid(&eid()).unwrap().is_empty());
}

#[tokio::test]
async fn malformed_scanner_is_rejected_before_the_chain() {
    let h = harness();
    lost_tracker(&h);
    let err = h
        .relay
        .submit_scan_report(EID, CID, "0xnot-an-address")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAddress);
    assert_eq!(h.gateway.chain_reads(), 0);
}

#[tokio::test]
async fn unregistered_tracker() {
    let h = harness();
    let err = h
        .relay
        .submit_scan_report(EID, CID, SCANNER)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TrackerNotRegistered);
}

#[tokio::test]
async fn tracker_not_lost() {
    let h = harness();
    h.gateway.register_tracker(eid(), address(OWNER));
    let err = h
        .relay
        .submit_scan_report(EID, CID, SCANNER)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TrackerNotLost);
    assert!(h.store.reports_by_eid(&eid()).unwrap().is_empty());
}

#[tokio::test]
async fn owner_cannot_report_own_tracker() {
    let h = harness();
    lost_tracker(&h);
    let owner = OWNER.to_uppercase().replace("0X", "0x");
    let err = h
        .relay
        .submit_scan_report(EID, CID, &owner)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SelfReportRejected);
    assert!(h.gateway.submissions().is_empty());
}

#[tokio::test]
async fn unavailable_node_is_reported_as_such() {
    let h = harness();
    lost_tracker(&h);
    h.gateway.set_unavailable(true);
    let err = h
        .relay
        .submit_scan_report(EID, CID, SCANNER)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChainUnavailable);
    assert!(h.store.reports_by_eid(&eid()).unwrap().is_empty());
}

#[tokio::test]
async fn end_to_end_report_is_listed() {
    let h = harness();
    lost_tracker(&h);
    h.gateway.set_block_timestamp(1_717_171_717);
    let receipt = h
        .relay
        .submit_scan_report(EID, CID, SCANNER)
        .await
        .unwrap();
    assert_eq!(receipt.content_id, CID);
    assert_eq!(receipt.report_id, 1);

    let submissions = h.gateway.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].tx_hash, receipt.tx_hash);
    assert_eq!(submissions[0].scanner, address(SCANNER));

    let reports = h.relay.list_reports(EID).unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].content_id, CID);
    assert_eq!(reports[0].submitted_at, 1_717_171_717);
    assert_eq!(reports[0].scanner, address(SCANNER));

    let status = h.relay.report_status(receipt.report_id).unwrap();
    assert_eq!(
        status.relay,
        RelayState::Relayed {
            tx_hash: receipt.tx_hash
        }
    );
    assert_eq!(h.metrics.reports_relayed.get() as u64, 1);
}

#[tokio::test]
async fn listing_an_unknown_tracker_is_empty() {
    let h = harness();
    assert!(h.relay.list_reports(EID).unwrap().is_empty());
    let err = h.relay.list_reports("nope").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidEid);
}

#[tokio::test]
async fn same_pair_is_reported_once() {
    let h = harness();
    lost_tracker(&h);
    h.relay.submit_scan_report(EID, CID, SCANNER).await.unwrap();
    let err = h
        .relay
        .submit_scan_report(EID, "QmTrackless_other", SCANNER)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateReport);
    assert_eq!(h.store.reports_by_eid(&eid()).unwrap().len(), 1);
    assert_eq!(h.gateway.submissions().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_same_pair_stores_one_report() {
    let h = harness();
    lost_tracker(&h);
    let tasks = (0..8).map(|_| {
        let relay = h.relay.clone();
        tokio::spawn(async move {
            relay.submit_scan_report(EID, CID, SCANNER).await
        })
    });
    let results = futures::future::join_all(tasks).await;
    let mut ok = 0;
    for result in results {
        match result.unwrap() {
            Ok(_) => ok += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::DuplicateReport),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(h.store.reports_by_eid(&eid()).unwrap().len(), 1);
    assert_eq!(h.gateway.submissions().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_scanners_relay_without_nonce_collisions() {
    let h = harness();
    lost_tracker(&h);
    let scanners: Vec<String> = (1..=6u8)
        .map(|i| format!("{:#x}", Address::repeat_byte(0x10 + i)))
        .collect();
    let tasks = scanners.iter().cloned().map(|scanner| {
        let relay = h.relay.clone();
        tokio::spawn(async move {
            relay.submit_scan_report(EID, CID, &scanner).await
        })
    });
    let receipts: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    let hashes: HashSet<_> = receipts.iter().map(|r| r.tx_hash).collect();
    assert_eq!(hashes.len(), scanners.len());
    let mut nonces: Vec<_> =
        h.gateway.submissions().iter().map(|s| s.nonce).collect();
    nonces.sort_unstable();
    assert_eq!(nonces, (0..scanners.len() as u64).collect::<Vec<_>>());
    assert_eq!(h.store.reports_by_eid(&eid()).unwrap().len(), scanners.len());
}

#[tokio::test]
async fn failed_relay_is_kept_and_retried_without_a_second_row() {
    let h = harness();
    lost_tracker(&h);
    h.gateway.set_reject_submissions(true);
    let err = h
        .relay
        .submit_scan_report(EID, CID, SCANNER)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RelaySubmissionFailed);

    let reports = h.store.reports_by_eid(&eid()).unwrap();
    assert_eq!(reports.len(), 1);
    let status = h.relay.report_status(reports[0].id).unwrap();
    assert!(matches!(status.relay, RelayState::Failed { .. }));

    h.gateway.set_reject_submissions(false);
    let receipt = h
        .relay
        .submit_scan_report(EID, "QmTrackless_another_upload", SCANNER)
        .await
        .unwrap();
    assert_eq!(receipt.report_id, reports[0].id);
    assert_eq!(receipt.content_id, CID);
    assert_eq!(h.store.reports_by_eid(&eid()).unwrap().len(), 1);
    assert_eq!(h.gateway.submissions().len(), 1);
    assert_eq!(h.gateway.submissions()[0].content_id, CID);
    assert_eq!(h.metrics.relay_failures.get() as u64, 1);
}

#[tokio::test]
async fn resubmit_relays_a_failed_report() {
    let h = harness();
    lost_tracker(&h);
    h.gateway.set_reject_submissions(true);
    let _ = h.relay.submit_scan_report(EID, CID, SCANNER).await;
    let id = h.store.reports_by_eid(&eid()).unwrap()[0].id;

    h.gateway.set_reject_submissions(false);
    let receipt = h.relay.resubmit_report(id).await.unwrap();
    assert_eq!(receipt.report_id, id);
    assert!(matches!(
        h.relay.report_status(id).unwrap().relay,
        RelayState::Relayed { .. }
    ));

    // already relayed.
    let err = h.relay.resubmit_report(id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateReport);
    let err = h.relay.resubmit_report(id + 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReportNotFound);
}

#[tokio::test]
async fn resubmit_runs_the_chain_checks_again() {
    let h = harness();
    lost_tracker(&h);
    h.gateway.set_reject_submissions(true);
    let _ = h.relay.submit_scan_report(EID, CID, SCANNER).await;
    let id = h.store.reports_by_eid(&eid()).unwrap()[0].id;

    h.gateway.set_reject_submissions(false);
    h.gateway.set_lost(&eid(), false);
    let err = h.relay.resubmit_report(id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TrackerNotLost);
    assert!(h.gateway.submissions().is_empty());
}

#[tokio::test]
async fn interrupted_relays_become_retryable() {
    let h = harness();
    let report = h
        .store
        .insert_report(NewReport {
            eid: eid(),
            scanner: address(SCANNER),
            content_id: CID.to_string(),
            submitted_at: 1,
        })
        .unwrap();
    assert_eq!(h.relay.recover_interrupted().unwrap(), 1);
    assert!(matches!(
        h.relay.report_status(report.id).unwrap().relay,
        RelayState::Failed { .. }
    ));
    assert_eq!(h.relay.recover_interrupted().unwrap(), 0);
}

#[tokio::test]
async fn blobs_are_content_addressed() {
    let h = harness();
    let payload = "BASE64ENCRYPTEDPAYLOAD==";
    let cid = h.relay.put_blob(payload).unwrap();
    assert!(cid.starts_with("QmTrackless_"));
    assert_eq!(h.relay.put_blob(payload).unwrap(), cid);
    assert_eq!(h.relay.get_blob(&cid).unwrap(), payload.as_bytes());

    let err = h.relay.put_blob("too short").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPayload);
    let err = h.relay.get_blob("QmTrackless_missing").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BlobNotFound);
}

#[tokio::test]
async fn rejections_are_counted_by_kind() {
    let h = harness();
    let _ = h.relay.submit_scan_report("bad", CID, SCANNER).await;
    let _ = h.relay.submit_scan_report(EID, CID, SCANNER).await;
    let rejected = |kind: &str| {
        h.metrics.reports_rejected.with_label_values(&[kind]).get() as u64
    };
    assert_eq!(rejected("InvalidEID"), 1);
    assert_eq!(rejected("TrackerNotRegistered"), 1);
    assert_eq!(h.metrics.reports_received.get() as u64, 2);
}
