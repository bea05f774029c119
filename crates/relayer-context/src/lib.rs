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
//! # Relayer Context Module 🕸️
//!
//! A module for managing the context of the relayer.
use std::convert::TryFrom;
use std::sync::Arc;
use std::time::Duration;

use ethers::providers::{Http, Provider};
use ethers::types::U256;
use tokio::sync::broadcast;

use trackless_chain_gateway::{ChainGateway, EvmChainGateway, RelayCredential};
use trackless_relayer_config::chain::ChainConfig;
use trackless_relayer_config::TracklessRelayerConfig;
use trackless_relayer_store::SledStore;
use trackless_relayer_utils::metric::Metrics;
use trackless_tx_relay::ScanReportRelay;

/// RelayerContext contains Relayer's configuration and shutdown signal.
#[derive(Clone)]
pub struct RelayerContext {
    /// The configuration of the relayer.
    pub config: TracklessRelayerConfig,
    /// Broadcasts a shutdown signal to all active connections.
    ///
    /// The initial `shutdown` trigger is provided by the `run` caller. The
    /// server is responsible for gracefully shutting down active connections.
    /// When a connection task is spawned, it is passed a broadcast receiver
    /// handle. When a graceful shutdown is initiated, a `()` value is sent via
    /// the broadcast::Sender. Each active connection receives it, reaches a
    /// safe terminal state, and completes the task.
    notify_shutdown: broadcast::Sender<()>,
    /// Represents the metrics for the relayer
    pub metrics: Arc<Metrics>,
    store: SledStore,
    /// The scan report pipeline, shared by every request.
    relay: Arc<ScanReportRelay<SledStore>>,
}

impl std::fmt::Debug for RelayerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayerContext")
            .field("config", &self.config)
            .field("relay", &self.relay)
            .finish()
    }
}

impl RelayerContext {
    /// Creates a new RelayerContext talking to the configured node.
    pub fn new(
        config: TracklessRelayerConfig,
        store: SledStore,
    ) -> trackless_relayer_utils::Result<Self> {
        let gateway = evm_gateway(&config.chain)?;
        Self::with_gateway(config, store, gateway)
    }

    /// Creates a new RelayerContext on top of an existing chain gateway.
    pub fn with_gateway(
        config: TracklessRelayerConfig,
        store: SledStore,
        gateway: Arc<dyn ChainGateway>,
    ) -> trackless_relayer_utils::Result<Self> {
        let (notify_shutdown, _) = broadcast::channel(2);
        let metrics = Arc::new(Metrics::new()?);
        let private_key = config
            .chain
            .private_key
            .as_ref()
            .ok_or(trackless_relayer_utils::Error::MissingSecrets)?;
        let credential = RelayCredential::from_private_key(
            private_key,
            config.chain.chain_id,
        )?;
        tracing::debug!(
            relayer = ?credential.address(),
            "relay credential loaded"
        );
        let relay = ScanReportRelay::new(
            store.clone(),
            gateway,
            credential,
            metrics.clone(),
            config.blob_store.min_payload_len,
        );
        Ok(Self {
            config,
            notify_shutdown,
            metrics,
            store,
            relay: Arc::new(relay),
        })
    }

    /// Returns a broadcast receiver handle for the shutdown signal.
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown::new(self.notify_shutdown.subscribe())
    }

    /// Sends a shutdown signal to all subscribed tasks/connections.
    pub fn shutdown(&self) {
        let _ = self.notify_shutdown.send(());
    }

    /// Returns [Sled](https://sled.rs)-based database store
    pub fn store(&self) -> &SledStore {
        &self.store
    }

    /// The scan report pipeline.
    pub fn relay(&self) -> &Arc<ScanReportRelay<SledStore>> {
        &self.relay
    }

    /// The chain gateway used for validation and relaying.
    pub fn gateway(&self) -> &Arc<dyn ChainGateway> {
        self.relay.gateway()
    }
}

/// Returns a new `EthereumProvider` for the configured chain.
pub fn evm_provider(
    chain: &ChainConfig,
) -> trackless_relayer_utils::Result<Provider<Http>> {
    let provider = Provider::try_from(chain.http_endpoint.as_url().as_str())?
        .interval(Duration::from_millis(500u64));
    Ok(provider)
}

/// Builds the ethers backed gateway of the configured chain.
pub fn evm_gateway(
    chain: &ChainConfig,
) -> trackless_relayer_utils::Result<Arc<dyn ChainGateway>> {
    let provider = evm_provider(chain)?;
    let gas_price = if chain.tx.use_node_gas_price {
        None
    } else {
        Some(U256::from(chain.tx.gas_price_gwei) * U256::exp10(9))
    };
    let gateway = EvmChainGateway::builder()
        .client(Arc::new(provider))
        .contract_address(chain.contract_address)
        .chain_id(chain.chain_id)
        .read_timeout(chain.read_timeout())
        .submit_timeout(chain.submit_timeout())
        .gas_limit(chain.tx.gas_limit)
        .gas_price(gas_price)
        .build();
    Ok(Arc::new(gateway))
}

/// Listens for the server shutdown signal.
///
/// Shutdown is signalled using a `broadcast::Receiver`. Only a single value is
/// ever sent. Once a value has been sent via the broadcast channel, the server
/// should shutdown.
///
/// The `Shutdown` struct listens for the signal and tracks that the signal has
/// been received. Callers may query for whether the shutdown signal has been
/// received or not.
#[derive(Debug)]
pub struct Shutdown {
    /// `true` if the shutdown signal has been received
    shutdown: bool,

    /// The receive half of the channel used to listen for shutdown.
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Create a new `Shutdown` backed by the given `broadcast::Receiver`.
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    /// Whether the shutdown signal was received.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Receive the shutdown notice, waiting if necessary.
    pub async fn recv(&mut self) {
        // If the shutdown signal has already been received, then return
        // immediately.
        if self.shutdown {
            return;
        }

        // Cannot receive a "lag error" as only one value is ever sent.
        let _ = self.notify.recv().await;

        // Remember that the signal has been received.
        self.shutdown = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackless_chain_gateway::MockedChainGateway;

    fn config(private_key: Option<&str>) -> TracklessRelayerConfig {
        let mut chain = serde_json::json!({
            "http-endpoint": "http://127.0.0.1:8545",
            "contract-address": "0x5FbDB2315678afecb367f032d93F642f64180aa3",
        });
        if let Some(key) = private_key {
            chain["private-key"] = serde_json::Value::from(key);
        }
        serde_json::from_value(serde_json::json!({ "chain": chain })).unwrap()
    }

    const KEY: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[tokio::test]
    async fn shutdown_reaches_every_subscriber() {
        let ctx = RelayerContext::with_gateway(
            config(Some(KEY)),
            SledStore::temporary().unwrap(),
            Arc::new(MockedChainGateway::default()),
        )
        .unwrap();
        let mut first = ctx.shutdown_signal();
        let mut second = ctx.shutdown_signal();
        ctx.shutdown();
        first.recv().await;
        second.recv().await;
        assert!(first.is_shutdown() && second.is_shutdown());
        // a second recv returns right away.
        first.recv().await;
    }

    #[test]
    fn relay_key_is_required() {
        let err = RelayerContext::with_gateway(
            config(None),
            SledStore::temporary().unwrap(),
            Arc::new(MockedChainGateway::default()),
        )
        .unwrap_err();
        assert!(matches!(err, trackless_relayer_utils::Error::MissingSecrets));
    }

    #[test]
    fn builds_the_evm_gateway_from_config() {
        let config = config(Some(KEY));
        let gateway = evm_gateway(&config.chain).unwrap();
        assert_eq!(gateway.chain_id(), 31337);
        assert_eq!(gateway.contract_address(), config.chain.contract_address);
    }
}
