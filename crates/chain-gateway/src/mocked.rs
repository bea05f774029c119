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

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use ethers::types::{Address, TxHash};
use ethers::utils::keccak256;
use parking_lot::RwLock;
use trackless_relayer_types::Eid;
use trackless_relayer_utils::{RelayStage, ScanReportError};

use crate::{ChainGateway, RelayCredential};

/// Block timestamp reported until [`MockedChainGateway::set_block_timestamp`]
/// is called.
pub const DEFAULT_BLOCK_TIMESTAMP: u64 = 1_700_000_000;

/// A relay transaction accepted by the [`MockedChainGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockedSubmission {
    /// The reported tracker.
    pub eid: Eid,
    /// The scanner the report was relayed for.
    pub scanner: Address,
    /// Content id carried by the transaction.
    pub content_id: String,
    /// The relay account.
    pub from: Address,
    /// Nonce the transaction was signed with.
    pub nonce: u64,
    /// Hash handed back to the caller.
    pub tx_hash: TxHash,
}

#[derive(Debug, Default)]
struct ChainState {
    /// eid -> (owner, lost)
    trackers: HashMap<Eid, (Address, bool)>,
    nonces: HashMap<Address, u64>,
    block_timestamp: u64,
    submissions: Vec<MockedSubmission>,
}

/// A Mocked Chain Gateway
///
/// Keeps the registry contract in memory. It behaves like a node that rejects
/// a transaction whose nonce was already used, so unsynchronized relays from
/// one account show up as broadcast failures.
#[derive(Debug)]
pub struct MockedChainGateway {
    chain_id: u64,
    contract_address: Address,
    state: RwLock<ChainState>,
    unavailable: AtomicBool,
    reject_submissions: AtomicBool,
    chain_reads: AtomicUsize,
    /// milliseconds
    submit_timeout: AtomicU64,
    /// milliseconds
    submit_delay: AtomicU64,
}

impl Default for MockedChainGateway {
    fn default() -> Self {
        Self::new(31337, Address::repeat_byte(0x42))
    }
}

impl MockedChainGateway {
    /// Creates an empty chain with the given id and registry address.
    #[must_use]
    pub fn new(chain_id: u64, contract_address: Address) -> Self {
        let state = ChainState {
            block_timestamp: DEFAULT_BLOCK_TIMESTAMP,
            ..Default::default()
        };
        Self {
            chain_id,
            contract_address,
            state: RwLock::new(state),
            unavailable: AtomicBool::new(false),
            reject_submissions: AtomicBool::new(false),
            chain_reads: AtomicUsize::new(0),
            submit_timeout: AtomicU64::new(30_000),
            submit_delay: AtomicU64::new(0),
        }
    }

    /// Registers `eid` to `owner`, not lost.
    pub fn register_tracker(&self, eid: Eid, owner: Address) {
        self.state.write().trackers.insert(eid, (owner, false));
    }

    /// Sets the lost flag of a registered tracker.
    pub fn set_lost(&self, eid: &Eid, lost: bool) {
        if let Some(tracker) = self.state.write().trackers.get_mut(eid) {
            tracker.1 = lost;
        }
    }

    /// Sets the timestamp of the latest block.
    pub fn set_block_timestamp(&self, timestamp: u64) {
        self.state.write().block_timestamp = timestamp;
    }

    /// Makes every call fail as if the node was down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes the node reject every broadcast.
    pub fn set_reject_submissions(&self, reject: bool) {
        self.reject_submissions.store(reject, Ordering::SeqCst);
    }

    /// Sets the relay deadline reported to submitters.
    pub fn set_submit_timeout(&self, timeout: Duration) {
        self.submit_timeout
            .store(timeout.as_millis() as u64, Ordering::SeqCst);
    }

    /// Makes every broadcast take at least `delay`.
    pub fn set_submit_delay(&self, delay: Duration) {
        self.submit_delay
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// How many contract reads and block reads were served.
    pub fn chain_reads(&self) -> usize {
        self.chain_reads.load(Ordering::SeqCst)
    }

    /// Every accepted relay transaction, in broadcast order.
    pub fn submissions(&self) -> Vec<MockedSubmission> {
        self.state.read().submissions.clone()
    }

    fn begin_read(&self, call: &'static str) -> Result<(), ScanReportError> {
        self.chain_reads.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ScanReportError::chain_unavailable(
                call,
                "connection refused",
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChainGateway for MockedChainGateway {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn contract_address(&self) -> Address {
        self.contract_address
    }

    fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout.load(Ordering::SeqCst))
    }

    async fn node_chain_id(&self) -> Result<u64, ScanReportError> {
        self.begin_read("eth_chainId")?;
        Ok(self.chain_id)
    }

    async fn owner_of(
        &self,
        eid: &Eid,
    ) -> Result<Option<Address>, ScanReportError> {
        self.begin_read("trackerToOwner")?;
        Ok(self.state.read().trackers.get(eid).map(|(owner, _)| *owner))
    }

    async fn is_lost(&self, eid: &Eid) -> Result<bool, ScanReportError> {
        self.begin_read("isLost")?;
        let state = self.state.read();
        Ok(state.trackers.get(eid).map_or(false, |(_, lost)| *lost))
    }

    async fn latest_block_timestamp(&self) -> Result<u64, ScanReportError> {
        self.begin_read("eth_getBlockByNumber")?;
        Ok(self.state.read().block_timestamp)
    }

    async fn submit_report(
        &self,
        eid: &Eid,
        scanner: Address,
        content_id: &str,
        credential: &RelayCredential,
    ) -> Result<TxHash, ScanReportError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ScanReportError::relay_failed(
                RelayStage::Nonce,
                "connection refused",
            ));
        }
        let from = credential.address();
        let nonce = self.state.read().nonces.get(&from).copied().unwrap_or(0);
        let delay = self.submit_delay.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        // let other tasks run between the nonce read and the broadcast.
        tokio::task::yield_now().await;
        let mut state = self.state.write();
        if self.reject_submissions.load(Ordering::SeqCst) {
            return Err(ScanReportError::relay_failed(
                RelayStage::Broadcast,
                "transaction rejected by the node",
            ));
        }
        let current = state.nonces.entry(from).or_insert(0);
        if *current != nonce {
            return Err(ScanReportError::relay_failed(
                RelayStage::Broadcast,
                "nonce too low",
            ));
        }
        *current += 1;
        let mut preimage = from.as_bytes().to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        let tx_hash = TxHash::from(keccak256(preimage));
        state.submissions.push(MockedSubmission {
            eid: *eid,
            scanner,
            content_id: content_id.to_owned(),
            from,
            nonce,
            tx_hash,
        });
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::signers::LocalWallet;

    fn credential() -> RelayCredential {
        let wallet: LocalWallet =
            "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
                .parse()
                .unwrap();
        RelayCredential::from(wallet)
    }

    #[tokio::test]
    async fn registry_views() {
        let gateway = MockedChainGateway::default();
        let eid = Eid::new([3; 32]);
        let owner = Address::repeat_byte(0x11);
        assert_eq!(gateway.owner_of(&eid).await.unwrap(), None);
        gateway.register_tracker(eid, owner);
        assert_eq!(gateway.owner_of(&eid).await.unwrap(), Some(owner));
        assert!(!gateway.is_lost(&eid).await.unwrap());
        gateway.set_lost(&eid, true);
        assert!(gateway.is_lost(&eid).await.unwrap());
        assert_eq!(gateway.chain_reads(), 4);
    }

    #[tokio::test]
    async fn sequential_submissions_use_increasing_nonces() {
        let gateway = MockedChainGateway::default();
        let credential = credential();
        let eid = Eid::new([3; 32]);
        let first = gateway
            .submit_report(&eid, Address::repeat_byte(1), "a", &credential)
            .await
            .unwrap();
        let second = gateway
            .submit_report(&eid, Address::repeat_byte(2), "b", &credential)
            .await
            .unwrap();
        assert_ne!(first, second);
        let nonces: Vec<_> =
            gateway.submissions().iter().map(|s| s.nonce).collect();
        assert_eq!(nonces, vec![0, 1]);
    }

    #[tokio::test]
    async fn unsynchronized_submissions_collide() {
        let gateway = MockedChainGateway::default();
        let credential = credential();
        let eid = Eid::new([3; 32]);
        let (a, b) = tokio::join!(
            gateway.submit_report(
                &eid,
                Address::repeat_byte(1),
                "a",
                &credential
            ),
            gateway.submit_report(
                &eid,
                Address::repeat_byte(2),
                "b",
                &credential
            ),
        );
        assert!(a.is_ok() != b.is_ok());
        assert_eq!(gateway.submissions().len(), 1);
    }

    #[tokio::test]
    async fn unavailable_node() {
        let gateway = MockedChainGateway::default();
        gateway.set_unavailable(true);
        let err = gateway.node_chain_id().await.unwrap_err();
        assert_eq!(
            err.kind(),
            trackless_relayer_utils::ErrorKind::ChainUnavailable
        );
    }
}
