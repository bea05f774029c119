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

use std::time::Duration;

use ethers::types::Address;
use serde::{Deserialize, Serialize};
use trackless_relayer_types::deserialize_env_or_str;
use trackless_relayer_types::private_key::PrivateKey;
use trackless_relayer_types::rpc_url::RpcUrl;

use crate::defaults;

/// ChainConfig is the configuration of the chain hosting the registry
/// contract, and of the account relaying reports to it.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainConfig {
    /// String that groups configuration for this chain on a human-readable name.
    #[serde(default = "defaults::chain_name")]
    pub name: String,
    /// Http(s) Endpoint for quick Req/Res
    #[serde(skip_serializing)]
    pub http_endpoint: RpcUrl,
    /// Block Explorer for this chain.
    ///
    /// Optional, and only used for printing links to relayed transactions.
    #[serde(skip_serializing, default)]
    pub explorer: Option<url::Url>,
    /// chain specific id (output of chainId opcode on EVM networks)
    #[serde(default = "defaults::chain_id")]
    pub chain_id: u64,
    /// Address of the registry contract.
    ///
    /// Either the address itself or `$NAME` of an env var holding it.
    #[serde(deserialize_with = "deserialize_env_or_str")]
    pub contract_address: Address,
    /// The Private Key of the relay account on this network
    /// the format is:
    /// 1. if it starts with '$' then it would be considered as an Enviroment variable
    ///    of a hex-encoded private key.
    ///    Example: $OWNER_PRIVATE_KEY
    ///
    /// 2. otherwise a raw 32 bytes hex encoded private key, with or without
    ///    the `0x` prefix.
    #[serde(skip_serializing, default)]
    pub private_key: Option<PrivateKey>,
    /// Relay transaction settings.
    #[serde(default)]
    pub tx: RelayTxConfig,
    /// Timeout of view calls and block reads, in milliseconds.
    #[serde(default = "defaults::read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Timeout of nonce read, signing and broadcast, in milliseconds.
    #[serde(default = "defaults::submit_timeout_ms")]
    pub submit_timeout_ms: u64,
}

impl ChainConfig {
    /// Timeout of view calls and block reads.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Timeout of a whole relay submission.
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    /// Link to a transaction on the configured explorer, if any.
    pub fn explorer_tx_url(&self, tx_hash: &str) -> Option<url::Url> {
        self.explorer
            .as_ref()
            .and_then(|base| base.join(&format!("tx/{tx_hash}")).ok())
    }
}

/// Gas settings of the `submitReport` transactions.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RelayTxConfig {
    /// Gas limit of every relay transaction.
    #[serde(default = "defaults::gas_limit")]
    pub gas_limit: u64,
    /// Legacy gas price, in gwei.
    #[serde(default = "defaults::gas_price_gwei")]
    pub gas_price_gwei: u64,
    /// Ask the node for the gas price instead of using `gas-price-gwei`.
    #[serde(default)]
    pub use_node_gas_price: bool,
}

impl Default for RelayTxConfig {
    fn default() -> Self {
        Self {
            gas_limit: defaults::gas_limit(),
            gas_price_gwei: defaults::gas_price_gwei(),
            use_node_gas_price: false,
        }
    }
}
