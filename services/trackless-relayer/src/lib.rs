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

#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Trackless Relayer Crate 📡
//!
//! The trusted relay of the Trackless lost item network.
//!
//! ## Overview
//!
//! Trackers broadcast an anonymized identifier (EID). Phones that see a lost
//! tracker encrypt their location for the owner, upload the ciphertext and
//! report the sighting to the relayer. The relayer checks the report against
//! the registry contract, stores it once per scanner, and submits it on chain
//! with its own account, so scanners never pay gas and the registry only
//! accepts reports that went through these checks.
//!
//! The relayer never sees a plaintext location.
//!
//! # Features
//!
//! * `integration-tests`: Logs as JSON, easy to parse from tests. By default,
//!   this is disabled.

/// Router, server and startup probe of the relayer.
pub mod service;

pub use trackless_relayer_utils::{Error, Result};
