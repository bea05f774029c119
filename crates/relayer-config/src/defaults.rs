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

/// The HTTP port is set to `8000` by default.
pub const fn port() -> u16 {
    8000
}
/// Local hardhat network.
pub fn chain_name() -> String {
    String::from("hardhat")
}
/// The chain id of a local hardhat node.
pub const fn chain_id() -> u64 {
    31337
}
/// Gas limit of every `submitReport` transaction.
pub const fn gas_limit() -> u64 {
    500_000
}
/// Legacy gas price of every `submitReport` transaction, in gwei.
pub const fn gas_price_gwei() -> u64 {
    1
}
/// View calls and block reads give up after 10 seconds.
pub const fn read_timeout_ms() -> u64 {
    10_000
}
/// Nonce read, signing and broadcast give up after 30 seconds.
pub const fn submit_timeout_ms() -> u64 {
    30_000
}
/// The frontend dev server.
pub fn allowed_origins() -> Vec<String> {
    vec![String::from("http://localhost:5173")]
}
/// Shortest accepted encrypted payload.
pub const fn min_payload_len() -> usize {
    20
}
/// Wait one second between startup chain probes.
pub const fn probe_interval_ms() -> u64 {
    1_000
}
/// Give up on the chain node after 5 failed startup probes.
pub const fn probe_max_retries() -> usize {
    5
}
