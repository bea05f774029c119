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

//! # Relayer Service Module 📡
//!
//! Builds the HTTP API of the relayer and runs it until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use trackless_relayer_config::CorsConfig;
use trackless_relayer_context::RelayerContext;
use trackless_relayer_handlers::handle_health;
use trackless_relayer_handlers::routes::{ipfs, metric, reports};
use trackless_relayer_utils::probe;
use trackless_relayer_utils::retry::ConstantWithMaxRetryCount;

/// Builds the router of the relayer API.
///
/// # Arguments
///
/// * `ctx` - RelayContext reference that holds the configuration and the
///   scan report pipeline
pub fn build_router(ctx: Arc<RelayerContext>) -> Router {
    let api = Router::new()
        .route("/scan", post(reports::handle_submit_scan_report))
        .route("/reports/:eid", get(reports::handle_list_reports))
        .route("/report/:report_id", get(reports::handle_report_status))
        .route(
            "/report/:report_id/resubmit",
            post(reports::handle_resubmit_report),
        )
        .route("/ipfs/upload", post(ipfs::handle_upload))
        .route("/ipfs/:cid", get(ipfs::handle_fetch));

    Router::new()
        .nest("/api", api)
        .route("/health", get(handle_health))
        .route("/metrics", get(metric::handle_metric_info))
        .layer(cors_layer(&ctx.config.cors))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);
    if config.allows_any() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

/// Sets up the HTTP server of the relayer and serves it until the context
/// shutdown signal fires.
///
/// # Arguments
///
/// * `ctx` - RelayContext reference that holds the configuration and database
pub async fn build_web_services(ctx: RelayerContext) -> crate::Result<()> {
    let socket_addr = SocketAddr::new([0, 0, 0, 0].into(), ctx.config.port);
    let mut shutdown = ctx.shutdown_signal();
    let app = build_router(Arc::new(ctx));

    tracing::info!("Starting the server on {}", socket_addr);
    axum::Server::bind(&socket_addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move { shutdown.recv().await })
        .await?;
    Ok(())
}

/// Waits for the chain node to answer with the configured chain id.
///
/// Probes with a constant interval and gives up after the configured number
/// of retries. Talking to a node on another chain is never retried.
pub async fn probe_chain(ctx: &RelayerContext) -> crate::Result<u64> {
    let startup = &ctx.config.startup;
    let policy = ConstantWithMaxRetryCount::new(
        startup.probe_interval(),
        startup.probe_max_retries,
    );
    let gateway = ctx.gateway().clone();
    let expected = gateway.chain_id();
    let chain_id = backoff::future::retry(policy, || {
        let gateway = gateway.clone();
        async move {
            gateway.node_chain_id().await.map_err(|e| {
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Retry,
                    probe = "chain_id",
                    error = %e,
                );
                tracing::warn!(error = %e, "chain node not reachable yet");
                backoff::Error::transient(e)
            })
        }
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "giving up on the chain node");
        crate::Error::Generic("chain node is unreachable")
    })?;

    let chain = &ctx.config.chain.name;
    if chain_id != expected {
        tracing::error!(%chain, expected, got = chain_id, "chain id mismatch");
        return Err(crate::Error::Generic(
            "chain node reports another chain id than configured",
        ));
    }
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Chain,
        %chain,
        chain_id,
        contract = ?gateway.contract_address(),
        ready = true,
    );
    Ok(chain_id)
}
