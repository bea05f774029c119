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

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use derive_more::Display;
use serde::Serialize;

/// Metrics functionality
pub mod metric;
/// A module used for debugging relayer lifecycle, validation and relay state.
pub mod probe;
/// Retry functionality
pub mod retry;

/// A boxed error used as the `source` of errors that cross the chain boundary.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An enum of all possible infrastructure errors that could be encountered
/// during the execution of the Trackless Relayer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Error in the underlying Http server.
    #[error(transparent)]
    Axum(#[from] axum::Error),
    /// HTTP Error
    #[error(transparent)]
    Hyper(#[from] hyper::Error),
    /// Error in Http Provider (ethers client).
    #[error(transparent)]
    EthersProvider(#[from] ethers::providers::ProviderError),
    /// Ether wallet errors.
    #[error(transparent)]
    EtherWalletError(#[from] ethers::signers::WalletError),
    /// Sled database error.
    #[error(transparent)]
    Sled(#[from] sled::Error),
    /// Prometheus registration error.
    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// Missing Secrets in the config, the relay private key.
    #[error("Missing required private-key in the config")]
    MissingSecrets,
    /// A report for the same (eid, scanner) pair is already stored.
    #[error("Report already exists for eid {} from scanner {}", eid, scanner)]
    DuplicateReport {
        /// Hex encoded tracker identifier.
        eid: String,
        /// Checksummed scanner address.
        scanner: String,
    },
    /// A stored record references a report that does not exist.
    #[error("Report {} not found in the store", _0)]
    ReportNotFound(u64),
}

/// A type alias for the result for trackless relayer, that uses the `Error` enum.
pub type Result<T> = std::result::Result<T, Error>;

/// The stage of the relay transaction at which a submission failed.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum RelayStage {
    /// Reading the relay account nonce.
    #[display(fmt = "nonce")]
    Nonce,
    /// Reading the gas price from the node.
    #[display(fmt = "gas price")]
    GasPrice,
    /// Signing the transaction with the relay credential.
    #[display(fmt = "sign")]
    Sign,
    /// Broadcasting the raw transaction.
    #[display(fmt = "broadcast")]
    Broadcast,
    /// The whole submission exceeded its deadline.
    #[display(fmt = "timeout")]
    Timeout,
}

/// Scan report errors, the user visible outcome of a submission.
///
/// The `Display` of every variant is safe to hand back to clients. Raw chain
/// payloads stay in the `source` chain, which only reaches the logs.
#[derive(Debug, thiserror::Error)]
pub enum ScanReportError {
    /// EID is not exactly 64 hex characters.
    #[error("eid must be exactly 64 hexadecimal characters")]
    InvalidEid,
    /// Scanner address is malformed or fails its checksum.
    #[error("scanner address is not a valid chain address")]
    InvalidAddress,
    /// The tracker has no owner on chain.
    #[error("tracker is not registered")]
    TrackerNotRegistered,
    /// The tracker owner has not enabled lost mode.
    #[error("tracker is not in lost mode")]
    TrackerNotLost,
    /// The scanner is the tracker owner.
    #[error("the owner of a tracker cannot report it")]
    SelfReportRejected,
    /// This scanner already reported this tracker.
    #[error("a report for this tracker from this scanner already exists")]
    DuplicateReport,
    /// A chain read failed or timed out.
    #[error("chain node unavailable while calling {call}")]
    ChainUnavailable {
        /// The chain call that failed.
        call: &'static str,
        /// Underlying provider error.
        #[source]
        source: BoxedError,
    },
    /// Signing or broadcasting the relay transaction failed.
    #[error("relay transaction failed at the {stage} stage")]
    RelaySubmissionFailed {
        /// Where the submission failed.
        stage: RelayStage,
        /// Underlying provider or wallet error.
        #[source]
        source: BoxedError,
    },
    /// No blob stored under the requested content id.
    #[error("no encrypted payload stored under this content id")]
    BlobNotFound,
    /// Uploaded payload is too short to be an encrypted report.
    #[error("payload must be at least {min_len} characters long")]
    InvalidPayload {
        /// The configured minimum payload length.
        min_len: usize,
    },
    /// No report with the requested id.
    #[error("report not found")]
    ReportNotFound,
    /// The report store failed.
    #[error("report store unavailable")]
    StoreUnavailable(#[source] Error),
}

impl ScanReportError {
    /// Returns the stable kind tag of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidEid => ErrorKind::InvalidEid,
            Self::InvalidAddress => ErrorKind::InvalidAddress,
            Self::TrackerNotRegistered => ErrorKind::TrackerNotRegistered,
            Self::TrackerNotLost => ErrorKind::TrackerNotLost,
            Self::SelfReportRejected => ErrorKind::SelfReportRejected,
            Self::DuplicateReport => ErrorKind::DuplicateReport,
            Self::ChainUnavailable { .. } => ErrorKind::ChainUnavailable,
            Self::RelaySubmissionFailed { .. } => {
                ErrorKind::RelaySubmissionFailed
            }
            Self::BlobNotFound => ErrorKind::BlobNotFound,
            Self::InvalidPayload { .. } => ErrorKind::InvalidPayload,
            Self::ReportNotFound => ErrorKind::ReportNotFound,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
        }
    }

    /// Helper for wrapping a failed chain read.
    pub fn chain_unavailable<E>(call: &'static str, source: E) -> Self
    where
        E: Into<BoxedError>,
    {
        Self::ChainUnavailable {
            call,
            source: source.into(),
        }
    }

    /// Helper for wrapping a failed relay submission.
    pub fn relay_failed<E>(stage: RelayStage, source: E) -> Self
    where
        E: Into<BoxedError>,
    {
        Self::RelaySubmissionFailed {
            stage,
            source: source.into(),
        }
    }
}

impl From<Error> for ScanReportError {
    fn from(error: Error) -> Self {
        match error {
            Error::DuplicateReport { .. } => Self::DuplicateReport,
            Error::ReportNotFound(_) => Self::ReportNotFound,
            other => Self::StoreUnavailable(other),
        }
    }
}

/// Stable, client facing error kind tags.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    #[display(fmt = "InvalidEID")]
    #[serde(rename = "InvalidEID")]
    InvalidEid,
    #[display(fmt = "InvalidAddress")]
    InvalidAddress,
    #[display(fmt = "TrackerNotRegistered")]
    TrackerNotRegistered,
    #[display(fmt = "TrackerNotLost")]
    TrackerNotLost,
    #[display(fmt = "SelfReportRejected")]
    SelfReportRejected,
    #[display(fmt = "DuplicateReport")]
    DuplicateReport,
    #[display(fmt = "ChainUnavailable")]
    ChainUnavailable,
    #[display(fmt = "RelaySubmissionFailed")]
    RelaySubmissionFailed,
    #[display(fmt = "BlobNotFound")]
    BlobNotFound,
    #[display(fmt = "InvalidPayload")]
    InvalidPayload,
    #[display(fmt = "ReportNotFound")]
    ReportNotFound,
    #[display(fmt = "StoreUnavailable")]
    StoreUnavailable,
    #[display(fmt = "InvalidRequest")]
    InvalidRequest,
    #[display(fmt = "Internal")]
    Internal,
}

impl ErrorKind {
    /// The HTTP status code used when this kind reaches a client.
    pub fn status_code(self) -> StatusCode {
        match self {
            Self::InvalidEid
            | Self::InvalidAddress
            | Self::TrackerNotRegistered
            | Self::TrackerNotLost
            | Self::SelfReportRejected
            | Self::InvalidPayload
            | Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::DuplicateReport => StatusCode::CONFLICT,
            Self::BlobNotFound | Self::ReportNotFound => StatusCode::NOT_FOUND,
            Self::ChainUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::RelaySubmissionFailed => StatusCode::BAD_GATEWAY,
            Self::StoreUnavailable | Self::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether the error was caused by the client input, and retrying the
    /// same request can never succeed.
    pub fn is_client_error(self) -> bool {
        self.status_code().is_client_error()
    }
}

impl From<Error> for HandlerError {
    fn from(value: Error) -> Self {
        tracing::error!(error = %value, "internal relayer error");
        HandlerError(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Internal,
            String::from("internal relayer error"),
        )
    }
}

impl From<JsonRejection> for HandlerError {
    fn from(rejection: JsonRejection) -> Self {
        HandlerError(
            rejection.status(),
            ErrorKind::InvalidRequest,
            rejection.body_text(),
        )
    }
}

impl From<PathRejection> for HandlerError {
    fn from(rejection: PathRejection) -> Self {
        HandlerError(
            StatusCode::BAD_REQUEST,
            ErrorKind::InvalidRequest,
            rejection.body_text(),
        )
    }
}

impl From<ScanReportError> for HandlerError {
    fn from(value: ScanReportError) -> Self {
        let kind = value.kind();
        if let Some(source) = std::error::Error::source(&value) {
            tracing::warn!(%kind, error = %value, cause = %source, "request failed");
        }
        HandlerError(kind.status_code(), kind, value.to_string())
    }
}

/// Error type for HTTP handlers
#[derive(Debug)]
pub struct HandlerError(
    /// HTTP status code for response
    pub StatusCode,
    /// Stable error kind tag
    pub ErrorKind,
    /// Response message
    pub String,
);

/// JSON body of every failed request.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    kind: ErrorKind,
    detail: String,
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            kind: self.1,
            detail: self.2,
        };
        (self.0, Json(body)).into_response()
    }
}
