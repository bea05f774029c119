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

use ethereum_types::Secret;
use serde::Deserialize;

use crate::resolve_env_indirection;

/// The private key of the relay account.
///
/// Never printed: `Debug` hides the value and parse errors only mention the
/// length of the input.
#[derive(Clone)]
pub struct PrivateKey(Secret);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey").finish()
    }
}

impl From<Secret> for PrivateKey {
    fn from(secret: Secret) -> Self {
        PrivateKey(secret)
    }
}

impl std::ops::Deref for PrivateKey {
    type Target = Secret;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromStr for PrivateKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let hex = value.trim();
        let digits = hex.strip_prefix("0x").unwrap_or(hex);
        if digits.len() != 64 {
            return Err(format!(
                "expected a 64 hex chars key (optionally 0x prefixed) but found {} chars",
                digits.len()
            ));
        }
        Secret::from_str(digits)
            .map(Self)
            .map_err(|_| String::from("private key is not valid hex"))
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PrivateKeyVistor;
        impl<'de> serde::de::Visitor<'de> for PrivateKeyVistor {
            type Value = PrivateKey;

            fn expecting(
                &self,
                formatter: &mut std::fmt::Formatter,
            ) -> std::fmt::Result {
                formatter.write_str(
                    "hex string or an env var containing a hex string in it",
                )
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let resolved = resolve_env_indirection(value)
                    .map_err(serde::de::Error::custom)?;
                resolved.parse().map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_str(PrivateKeyVistor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // first default hardhat account.
    const HARDHAT_KEY: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn parses_with_and_without_prefix() {
        let a: PrivateKey = HARDHAT_KEY.parse().unwrap();
        let b: PrivateKey = HARDHAT_KEY[2..].parse().unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_eq!(format!("{a:?}"), "PrivateKey");
    }

    #[test]
    fn errors_do_not_echo_the_key() {
        let truncated = &HARDHAT_KEY[..40];
        let err = truncated.parse::<PrivateKey>().unwrap_err();
        assert!(!err.contains(&truncated[2..]));
    }

    #[test]
    fn reads_key_from_env() {
        std::env::set_var("TRACKLESS_TEST_PRIVATE_KEY", HARDHAT_KEY);
        let key: PrivateKey =
            serde_json::from_str("\"$TRACKLESS_TEST_PRIVATE_KEY\"").unwrap();
        assert_eq!(key.as_bytes()[0], 0xac);
    }
}
