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

//! Types shared by the Trackless relayer crates.

/// Scanner address parsing with EIP-55 checksum validation.
pub mod address;
/// Tracker identifier (EID).
pub mod eid;
/// Private key of the relay account.
pub mod private_key;
/// RPC endpoint url.
pub mod rpc_url;

pub use address::{parse_scanner_address, AddressParseError};
pub use eid::{Eid, EidParseError};

/// Reads `value` from the environment when it is written as `$NAME`,
/// otherwise returns it unchanged.
pub fn resolve_env_indirection(value: &str) -> Result<String, String> {
    match value.strip_prefix('$') {
        Some(var) => {
            tracing::trace!("Reading {} from env", var);
            std::env::var(var).map_err(|e| {
                format!("error while loading this env {var}: {e}")
            })
        }
        None => Ok(value.to_string()),
    }
}

/// `serde(deserialize_with)` helper for any `FromStr` value that may be
/// given directly or through a `$NAME` env var.
pub fn deserialize_env_or_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = <String as serde::Deserialize>::deserialize(deserializer)?;
    let value =
        resolve_env_indirection(&raw).map_err(serde::de::Error::custom)?;
    value.trim().parse::<T>().map_err(|e| {
        serde::de::Error::custom(format!("invalid value {value:?}: {e}"))
    })
}
