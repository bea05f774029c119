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

use std::path::{Path, PathBuf};

use config::{Config, File};

use crate::TracklessRelayerConfig;

/// A helper function that will search for all config files in the given directory and return them as a vec
/// of the paths.
///
/// Supported file extensions are:
/// - `.toml`.
/// - `.json`.
pub fn search_config_files<P: AsRef<Path>>(
    base_dir: P,
) -> trackless_relayer_utils::Result<Vec<PathBuf>> {
    // A pattern that covers all toml or json files in the config directory and subdirectories.
    let toml_pattern = format!("{}/**/*.toml", base_dir.as_ref().display());
    let json_pattern = format!("{}/**/*.json", base_dir.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let toml_files = glob::glob(&toml_pattern)?;
    let json_files = glob::glob(&json_pattern)?;
    toml_files
        .chain(json_files)
        .map(|v| v.map_err(trackless_relayer_utils::Error::from))
        .collect()
}

/// Try to parse the [`TracklessRelayerConfig`] from the given config file(s).
///
/// Values from the environment prefixed with `TRACKLESS_` override the files,
/// nested keys are separated with `__` (for example `TRACKLESS_PORT=9000`).
pub fn parse_from_files(
    files: &[PathBuf],
) -> trackless_relayer_utils::Result<TracklessRelayerConfig> {
    let mut builder = Config::builder();
    for config_file in files {
        tracing::trace!("Loading config file: {}", config_file.display());
        let ext = config_file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        builder = builder
            .add_source(File::from(config_file.as_path()).format(format));
    }

    let builder = builder.add_source(
        config::Environment::with_prefix("TRACKLESS")
            .prefix_separator("_")
            .separator("__"),
    );
    let cfg = builder.build()?;
    let config: Result<
        TracklessRelayerConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Load the configuration files and
///
/// Returns `Ok(TracklessRelayerConfig)` on success, or `Err(Error)` on failure.
///
/// it is the same as using the [`search_config_files`] and [`parse_from_files`] functions combined.
pub fn load<P: AsRef<Path>>(
    path: P,
) -> trackless_relayer_utils::Result<TracklessRelayerConfig> {
    parse_from_files(&search_config_files(path)?)
}

/// The postloading_process exists to validate configuration and standardize
/// the format of the configuration
pub fn postloading_process(
    mut config: TracklessRelayerConfig,
) -> trackless_relayer_utils::Result<TracklessRelayerConfig> {
    tracing::trace!("Checking configration sanity ...");
    config.chain.name = config.chain.name.to_lowercase();
    // origins are compared byte for byte by the CORS layer.
    for origin in config.cors.allowed_origins.iter_mut() {
        let trimmed = origin.trim().trim_end_matches('/');
        *origin = trimmed.to_string();
    }
    config.cors.allowed_origins.retain(|o| !o.is_empty());
    config.verify()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HARDHAT_KEY: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn write_config(dir: &Path, contents: &str) {
        std::fs::write(dir.join("config.toml"), contents).unwrap();
    }

    #[test]
    fn loads_config_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            &format!(
                r#"
[chain]
name = "Hardhat"
http-endpoint = "http://127.0.0.1:8545"
contract-address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
private-key = "{HARDHAT_KEY}"

[cors]
allowed-origins = ["http://localhost:5173/"]
"#
            ),
        );
        let config = load(dir.path()).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.chain.name, "hardhat");
        assert_eq!(config.chain.chain_id, 31337);
        assert_eq!(config.chain.tx.gas_limit, 500_000);
        assert_eq!(config.chain.tx.gas_price_gwei, 1);
        assert_eq!(config.blob_store.min_payload_len, 20);
        assert_eq!(config.cors.allowed_origins, ["http://localhost:5173"]);
    }

    #[test]
    fn bundled_sample_config_loads() {
        std::env::set_var("WEB3_PROVIDER_URL", "http://127.0.0.1:8545");
        std::env::set_var(
            "CONTRACT_ADDRESS",
            "0x5FbDB2315678afecb367f032d93F642f64180aa3",
        );
        std::env::set_var("OWNER_PRIVATE_KEY", HARDHAT_KEY);
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config");
        let config = load(dir).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.chain.name, "hardhat");
        assert_eq!(config.startup.probe_max_retries, 15);
        assert!(config.chain.private_key.is_some());
    }

    #[test]
    fn reads_secrets_from_env() {
        std::env::set_var("TRACKLESS_CFG_TEST_CONTRACT", "0x5FbDB2315678afecb367f032d93F642f64180aa3");
        std::env::set_var("TRACKLESS_CFG_TEST_KEY", HARDHAT_KEY);
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
[chain]
http-endpoint = "http://127.0.0.1:8545"
contract-address = "$TRACKLESS_CFG_TEST_CONTRACT"
private-key = "$TRACKLESS_CFG_TEST_KEY"
"#,
        );
        let config = load(dir.path()).unwrap();
        assert!(config.chain.private_key.is_some());
        assert!(!config.chain.contract_address.is_zero());
    }

    #[test]
    fn missing_private_key_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
[chain]
http-endpoint = "http://127.0.0.1:8545"
contract-address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
"#,
        );
        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, trackless_relayer_utils::Error::MissingSecrets));
    }

    #[test]
    fn missing_contract_address_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            &format!(
                r#"
[chain]
http-endpoint = "http://127.0.0.1:8545"
private-key = "{HARDHAT_KEY}"
"#
            ),
        );
        let err = load(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            trackless_relayer_utils::Error::ParseConfig(_)
        ));
    }
}
