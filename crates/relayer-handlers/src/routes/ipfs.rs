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

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use trackless_relayer_context::RelayerContext;
use trackless_relayer_utils::HandlerError;

/// Attached to every payload handed out, the relayer never sees plaintext.
pub const END_TO_END_NOTE: &str =
    "This payload is end-to-end encrypted. Only the tracker owner can decrypt it.";

/// Body of an encrypted payload upload.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadRequest {
    /// The encrypted location, as produced by the scanner app.
    pub payload: String,
}

/// Encrypted payload upload response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    cid: String,
}

/// A stored encrypted payload.
#[derive(Debug, Serialize)]
pub struct EncryptedPayloadResponse {
    cid: String,
    encrypted_payload: String,
    note: &'static str,
}

/// Handles an encrypted payload upload.
///
/// Returns the content id of the payload, the same payload always gets the
/// same id.
pub async fn handle_upload(
    State(ctx): State<Arc<RelayerContext>>,
    request: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<UploadResponse>, HandlerError> {
    let Json(request) = request?;
    let cid = ctx.relay().put_blob(&request.payload)?;
    Ok(Json(UploadResponse { cid }))
}

/// Handles the retrieval of an encrypted payload by content id.
pub async fn handle_fetch(
    State(ctx): State<Arc<RelayerContext>>,
    Path(cid): Path<String>,
) -> Result<Json<EncryptedPayloadResponse>, HandlerError> {
    let payload = ctx.relay().get_blob(&cid)?;
    Ok(Json(EncryptedPayloadResponse {
        cid,
        encrypted_payload: String::from_utf8_lossy(&payload).into_owned(),
        note: END_TO_END_NOTE,
    }))
}
