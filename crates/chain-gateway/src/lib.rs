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
//! # Chain Gateway 🕸️
//!
//! Typed access to the Trackless registry contract: the `trackerToOwner`
//! and `isLost` views, chain facts, and the relayed `submitReport`
//! transaction.
//!
//! Every call is bounded by a timeout and never retried here, callers decide
//! what a failure means.

use std::time::Duration;

use ethers::types::{Address, TxHash};
use trackless_relayer_types::Eid;
use trackless_relayer_utils::ScanReportError;

/// The relay signing identity.
pub mod credential;
/// Gateway backed by an ethers provider.
pub mod evm;
/// In memory gateway, for tests and local development.
pub mod mocked;

pub use credential::RelayCredential;
pub use evm::EvmChainGateway;
pub use mocked::MockedChainGateway;

#[allow(missing_docs)]
mod bindings {
    ethers::contract::abigen!(
        TracklessCore,
        r#"[
            function trackerToOwner(bytes32 eid) external view returns (address)
            function isLost(bytes32 eid) external view returns (bool)
            function submitReport(bytes32 eid, address scanner, string ipfsCid) external
        ]"#,
    );
}

pub use bindings::{
    IsLostCall, SubmitReportCall, TrackerToOwnerCall, TracklessCore,
};

/// The operations the relayer needs from the chain.
#[async_trait::async_trait]
pub trait ChainGateway: Send + Sync {
    /// The chain id relay transactions are signed for.
    fn chain_id(&self) -> u64;
    /// Address of the registry contract.
    fn contract_address(&self) -> Address;
    /// Deadline of one relay, from waiting for the credential to the
    /// broadcast.
    fn submit_timeout(&self) -> Duration;
    /// The chain id reported by the node, used to probe connectivity.
    async fn node_chain_id(&self) -> Result<u64, ScanReportError>;
    /// The owner of `eid`, `None` when the tracker is not registered.
    async fn owner_of(
        &self,
        eid: &Eid,
    ) -> Result<Option<Address>, ScanReportError>;
    /// Whether the owner of `eid` enabled lost mode.
    async fn is_lost(&self, eid: &Eid) -> Result<bool, ScanReportError>;
    /// Timestamp of the latest block, in seconds.
    async fn latest_block_timestamp(&self) -> Result<u64, ScanReportError>;
    /// Builds, signs with `credential` and broadcasts a `submitReport`
    /// transaction, returning its hash.
    ///
    /// Callers must serialize calls that share a credential, the nonce is
    /// read fresh on every call.
    async fn submit_report(
        &self,
        eid: &Eid,
        scanner: Address,
        content_id: &str,
        credential: &RelayCredential,
    ) -> Result<TxHash, ScanReportError>;
}
