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

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use trackless_relayer_context::RelayerContext;
use trackless_relayer_types::address::checksummed;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    web3_connected: bool,
    contract: String,
    relayer: String,
}

/// Handles the health check.
///
/// Always answers, `web3_connected` tells whether the chain node answered
/// with the configured chain id.
pub async fn handle_health(
    State(ctx): State<Arc<RelayerContext>>,
) -> Json<HealthResponse> {
    let gateway = ctx.gateway();
    let web3_connected = match gateway.node_chain_id().await {
        Ok(chain_id) if chain_id == gateway.chain_id() => true,
        Ok(chain_id) => {
            tracing::warn!(
                expected = gateway.chain_id(),
                got = chain_id,
                "node is on another chain"
            );
            false
        }
        Err(e) => {
            tracing::warn!(error = %e, "health check could not reach the node");
            false
        }
    };
    Json(HealthResponse {
        status: if web3_connected { "ok" } else { "degraded" },
        web3_connected,
        contract: checksummed(&gateway.contract_address()),
        relayer: checksummed(&ctx.relay().relayer_address()),
    })
}
