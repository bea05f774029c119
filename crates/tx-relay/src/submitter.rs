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

use ethers::types::{Address, TxHash};
use tokio::sync::Mutex;
use trackless_chain_gateway::{ChainGateway, RelayCredential};
use trackless_relayer_store::Report;
use trackless_relayer_utils::{RelayStage, ScanReportError};

/// Relays stored reports with the single relay credential.
///
/// The credential lock is held from the nonce read to the broadcast, so two
/// relays never sign with the same nonce. Waiting for the lock counts
/// against the gateway's submit deadline.
pub struct RelaySubmitter {
    gateway: Arc<dyn ChainGateway>,
    relayer: Address,
    credential: Mutex<RelayCredential>,
}

impl std::fmt::Debug for RelaySubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaySubmitter")
            .field("relayer", &self.relayer)
            .finish()
    }
}

impl RelaySubmitter {
    /// Creates a submitter relaying through `gateway`.
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        credential: RelayCredential,
    ) -> Self {
        Self {
            gateway,
            relayer: credential.address(),
            credential: Mutex::new(credential),
        }
    }

    /// The relay account address.
    pub fn relayer_address(&self) -> Address {
        self.relayer
    }

    /// Sends the `submitReport` transaction of `report`.
    #[tracing::instrument(skip(self, report), fields(report_id = report.id))]
    pub async fn relay(
        &self,
        report: &Report,
    ) -> Result<TxHash, ScanReportError> {
        let deadline = self.gateway.submit_timeout();
        let credential =
            tokio::time::timeout(deadline, self.credential.lock())
                .await
                .map_err(|elapsed| {
                    tracing::warn!("relay credential busy past the deadline");
                    ScanReportError::relay_failed(RelayStage::Timeout, elapsed)
                })?;
        self.gateway
            .submit_report(
                &report.eid,
                report.scanner,
                &report.content_id,
                &credential,
            )
            .await
    }
}
