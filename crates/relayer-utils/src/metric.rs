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

use prometheus::core::{AtomicF64, GenericCounter, GenericGauge};
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_gauge_with_registry, CounterVec, Encoder, Registry, TextEncoder,
};

use crate::ErrorKind;

/// A struct definition for collecting metrics in the relayer.
///
/// Every instance owns its registry, so several relayer contexts can live in
/// the same process.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    /// Scan reports received over the API.
    pub reports_received: GenericCounter<AtomicF64>,
    /// Scan reports rejected, labelled by error kind.
    pub reports_rejected: CounterVec,
    /// Reports that passed validation and were persisted.
    pub reports_persisted: GenericCounter<AtomicF64>,
    /// Reports whose relay transaction was broadcast.
    pub reports_relayed: GenericCounter<AtomicF64>,
    /// Relay transactions that failed to sign or broadcast.
    pub relay_failures: GenericCounter<AtomicF64>,
    /// Encrypted payloads stored in the local blob store.
    pub blobs_stored: GenericCounter<AtomicF64>,
    /// Total amount of data stored metric
    pub total_amount_of_data_stored: GenericGauge<AtomicF64>,
}

impl Metrics {
    /// Instantiates the various metrics and their counters, also creates a registry for the counters and
    /// registers the counters
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("trackless".into()), None)?;

        let reports_received = register_counter_with_registry!(
            "reports_received",
            "The total number of scan reports received",
            registry
        )?;

        let reports_rejected = register_counter_vec_with_registry!(
            "reports_rejected",
            "The total number of scan reports rejected, by error kind",
            &["kind"],
            registry
        )?;

        let reports_persisted = register_counter_with_registry!(
            "reports_persisted",
            "The total number of scan reports persisted",
            registry
        )?;

        let reports_relayed = register_counter_with_registry!(
            "reports_relayed",
            "The total number of relay transactions broadcast",
            registry
        )?;

        let relay_failures = register_counter_with_registry!(
            "relay_failures",
            "How many relay transactions failed to sign or broadcast",
            registry
        )?;

        let blobs_stored = register_counter_with_registry!(
            "blobs_stored",
            "The total number of encrypted payloads uploaded",
            registry
        )?;

        let total_amount_of_data_stored = register_gauge_with_registry!(
            "total_amount_of_data_stored",
            "The Total number of data stored",
            registry
        )?;

        Ok(Self {
            registry,
            reports_received,
            reports_rejected,
            reports_persisted,
            reports_relayed,
            relay_failures,
            blobs_stored,
            total_amount_of_data_stored,
        })
    }

    /// Counts a rejected report under its error kind.
    pub fn report_rejected(&self, kind: ErrorKind) {
        self.reports_rejected
            .with_label_values(&[&kind.to_string()])
            .inc();
    }

    /// Gathers the whole relayer metrics in the prometheus text format.
    pub fn gather_metrics(&self) -> Result<String, GatherMetricsError> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatherMetricsError {
    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),
    #[error(transparent)]
    FromUtf8Error(#[from] std::string::FromUtf8Error),
}
