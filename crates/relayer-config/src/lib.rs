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

//! # Relayer Configuration Module 🕸️
//!
//! A module for configuring the relayer.
//!
//! ## Overview
//!
//! Possible configuration include:
//! * `port`: The port the relayer will listen on. Defaults to 8000
//! * `chain`: The chain the registry contract lives on, the contract address
//! and the relay account. See [config/config.toml](../../config/config.toml) for an example.
//! * `cors`: Origins allowed to call the HTTP API.
//! * `blob-store`: Limits of the local encrypted payload store.
//! * `startup`: How long to wait for the chain node when starting.

/// Chain configuration
pub mod chain;
/// CLI configuration
#[cfg(feature = "cli")]
pub mod cli;
/// Default values of the configuration.
pub mod defaults;
/// Utils for processing configuration
pub mod utils;

use std::time::Duration;

use chain::ChainConfig;
use serde::{Deserialize, Serialize};

/// TracklessRelayerConfig is the configuration for the trackless relayer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TracklessRelayerConfig {
    /// HTTP Server Port number
    ///
    /// default to 8000
    #[serde(default = "defaults::port", skip_serializing)]
    pub port: u16,
    /// The chain hosting the registry contract.
    pub chain: ChainConfig,
    /// Cross origin settings of the HTTP API.
    #[serde(default)]
    pub cors: CorsConfig,
    /// Local encrypted payload store settings.
    #[serde(default)]
    pub blob_store: BlobStoreConfig,
    /// Startup probe settings.
    #[serde(default)]
    pub startup: StartupConfig,
}

impl TracklessRelayerConfig {
    /// Makes sure that the config is valid, by going
    /// through the whole config and doing some basic checks.
    pub fn verify(&self) -> trackless_relayer_utils::Result<()> {
        if self.chain.private_key.is_none() {
            return Err(trackless_relayer_utils::Error::MissingSecrets);
        }
        if self.chain.contract_address.is_zero() {
            return Err(trackless_relayer_utils::Error::Generic(
                "chain.contract-address must not be the zero address",
            ));
        }
        if self.cors.allowed_origins.is_empty() {
            tracing::warn!(
                "No CORS origin configured, browsers will not reach the API"
            );
        }
        Ok(())
    }
}

/// Cross origin settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CorsConfig {
    /// Origins allowed to call the API, `*` allows any origin.
    #[serde(default = "defaults::allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: defaults::allowed_origins(),
        }
    }
}

impl CorsConfig {
    /// Whether any origin is allowed.
    pub fn allows_any(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

/// Local encrypted payload store settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BlobStoreConfig {
    /// Shortest accepted payload, in characters.
    #[serde(default = "defaults::min_payload_len")]
    pub min_payload_len: usize,
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            min_payload_len: defaults::min_payload_len(),
        }
    }
}

/// How the relayer waits for its chain node at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StartupConfig {
    /// Delay between two probes, in milliseconds.
    #[serde(default = "defaults::probe_interval_ms")]
    pub probe_interval_ms: u64,
    /// Probes retried before the relayer gives up.
    #[serde(default = "defaults::probe_max_retries")]
    pub probe_max_retries: usize,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: defaults::probe_interval_ms(),
            probe_max_retries: defaults::probe_max_retries(),
        }
    }
}

impl StartupConfig {
    /// Delay between two probes.
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}
