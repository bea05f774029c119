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

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Length of an EID in bytes.
pub const EID_LEN: usize = 32;

/// The anonymized identifier broadcast by a tracker.
///
/// Externally it is always 64 hex characters without a `0x` prefix, in
/// either case. It maps 1:1 to the `bytes32` key of the registry contract.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Eid([u8; EID_LEN]);

/// Errors while parsing an [`Eid`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EidParseError {
    /// Not exactly 64 characters.
    #[error("expected 64 hex characters, got {0}")]
    InvalidLength(usize),
    /// A character outside `[0-9a-fA-F]`.
    #[error("eid contains non hex characters")]
    InvalidHex,
}

impl Eid {
    /// Wraps raw bytes.
    pub const fn new(bytes: [u8; EID_LEN]) -> Self {
        Self(bytes)
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8; EID_LEN] {
        &self.0
    }

    /// The raw bytes, by value.
    pub fn to_fixed_bytes(self) -> [u8; EID_LEN] {
        self.0
    }
}

impl From<[u8; EID_LEN]> for Eid {
    fn from(bytes: [u8; EID_LEN]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Eid {
    type Err = EidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // `len` counts bytes, so multi byte chars can never sneak past it.
        if s.len() != EID_LEN * 2 {
            return Err(EidParseError::InvalidLength(s.len()));
        }
        let mut bytes = [0u8; EID_LEN];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|_| EidParseError::InvalidHex)?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Display for Eid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl std::fmt::Debug for Eid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Eid({self})")
    }
}

impl Serialize for Eid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Eid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
