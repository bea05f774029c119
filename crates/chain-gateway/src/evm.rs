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

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ethers::abi::AbiEncode;
use ethers::providers::Middleware;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockNumber, TransactionRequest, TxHash, U256};
use typed_builder::TypedBuilder;
use trackless_relayer_types::Eid;
use trackless_relayer_utils::{RelayStage, ScanReportError};

use crate::{ChainGateway, RelayCredential, SubmitReportCall, TracklessCore};

/// A [`ChainGateway`] talking to a node through an ethers [`Middleware`],
/// usually a `Provider<Http>`.
#[derive(TypedBuilder)]
pub struct EvmChainGateway<M> {
    /// The node client.
    client: Arc<M>,
    /// Address of the registry contract.
    contract_address: Address,
    /// Chain id relay transactions are signed for.
    chain_id: u64,
    /// Bound on every view call and block read.
    #[builder(default = Duration::from_secs(10))]
    read_timeout: Duration,
    /// Bound on nonce read, signing and broadcast together.
    #[builder(default = Duration::from_secs(30))]
    submit_timeout: Duration,
    /// Gas limit of relay transactions.
    #[builder(default = U256::from(500_000u64), setter(into))]
    gas_limit: U256,
    /// Legacy gas price of relay transactions, `None` asks the node.
    #[builder(default)]
    gas_price: Option<U256>,
}

impl<M> std::fmt::Debug for EvmChainGateway<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmChainGateway")
            .field("contract_address", &self.contract_address)
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

impl<M> EvmChainGateway<M>
where
    M: Middleware + 'static,
{
    fn contract(&self) -> TracklessCore<M> {
        TracklessCore::new(self.contract_address, self.client.clone())
    }

    /// Runs a chain read under the read timeout.
    async fn read<T, E, F>(
        &self,
        call: &'static str,
        fut: F,
    ) -> Result<T, ScanReportError>
    where
        F: Future<Output = Result<T, E>> + Send,
        E: std::fmt::Display,
    {
        match tokio::time::timeout(self.read_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::warn!(call, error = %e, "chain read failed");
                Err(ScanReportError::chain_unavailable(call, e.to_string()))
            }
            Err(elapsed) => {
                tracing::warn!(call, "chain read timed out");
                Err(ScanReportError::chain_unavailable(call, elapsed))
            }
        }
    }

    async fn sign_and_broadcast(
        &self,
        eid: &Eid,
        scanner: Address,
        content_id: &str,
        credential: &RelayCredential,
    ) -> Result<TxHash, ScanReportError> {
        let from = credential.address();
        let nonce = self
            .client
            .get_transaction_count(from, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| {
                ScanReportError::relay_failed(RelayStage::Nonce, e.to_string())
            })?;
        let gas_price = match self.gas_price {
            Some(price) => price,
            None => self.client.get_gas_price().await.map_err(|e| {
                ScanReportError::relay_failed(
                    RelayStage::GasPrice,
                    e.to_string(),
                )
            })?,
        };
        let data = SubmitReportCall {
            eid: eid.to_fixed_bytes(),
            scanner,
            ipfs_cid: content_id.to_string(),
        }
        .encode();
        let tx: TypedTransaction = TransactionRequest::new()
            .from(from)
            .to(self.contract_address)
            .data(data)
            .nonce(nonce)
            .gas(self.gas_limit)
            .gas_price(gas_price)
            .chain_id(self.chain_id)
            .into();
        let signature = credential.sign(&tx).await.map_err(|e| {
            ScanReportError::relay_failed(RelayStage::Sign, e.to_string())
        })?;
        let raw = tx.rlp_signed(&signature);
        let pending =
            self.client.send_raw_transaction(raw).await.map_err(|e| {
                tracing::event!(
                    target: trackless_relayer_utils::probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %trackless_relayer_utils::probe::Kind::RelayTx,
                    chain_id = %self.chain_id,
                    %nonce,
                    errored = true,
                    error = %e,
                );
                ScanReportError::relay_failed(
                    RelayStage::Broadcast,
                    e.to_string(),
                )
            })?;
        let tx_hash = *pending;
        tracing::event!(
            target: trackless_relayer_utils::probe::TARGET,
            tracing::Level::DEBUG,
            kind = %trackless_relayer_utils::probe::Kind::RelayTx,
            chain_id = %self.chain_id,
            %nonce,
            pending = true,
            %tx_hash,
        );
        Ok(tx_hash)
    }
}

/// Narrows a quantity read from the node, rejecting values past `u64`.
fn fit_u64(call: &'static str, value: U256) -> Result<u64, ScanReportError> {
    u64::try_from(value).map_err(|_| {
        tracing::warn!(call, %value, "node returned an out of range quantity");
        ScanReportError::chain_unavailable(
            call,
            "node returned an out of range quantity",
        )
    })
}

#[async_trait::async_trait]
impl<M> ChainGateway for EvmChainGateway<M>
where
    M: Middleware + 'static,
{
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn contract_address(&self) -> Address {
        self.contract_address
    }

    fn submit_timeout(&self) -> Duration {
        self.submit_timeout
    }

    #[tracing::instrument(skip(self))]
    async fn node_chain_id(&self) -> Result<u64, ScanReportError> {
        let chain_id =
            self.read("eth_chainId", self.client.get_chainid()).await?;
        fit_u64("eth_chainId", chain_id)
    }

    #[tracing::instrument(skip(self))]
    async fn owner_of(
        &self,
        eid: &Eid,
    ) -> Result<Option<Address>, ScanReportError> {
        let contract = self.contract();
        let call = contract.tracker_to_owner(eid.to_fixed_bytes());
        let owner = self.read("trackerToOwner", call.call()).await?;
        Ok((!owner.is_zero()).then_some(owner))
    }

    #[tracing::instrument(skip(self))]
    async fn is_lost(&self, eid: &Eid) -> Result<bool, ScanReportError> {
        let contract = self.contract();
        let call = contract.is_lost(eid.to_fixed_bytes());
        self.read("isLost", call.call()).await
    }

    #[tracing::instrument(skip(self))]
    async fn latest_block_timestamp(&self) -> Result<u64, ScanReportError> {
        let latest = self.client.get_block(BlockNumber::Latest);
        let block = self.read("eth_getBlockByNumber", latest).await?;
        let block = block.ok_or_else(|| {
            ScanReportError::chain_unavailable(
                "eth_getBlockByNumber",
                "node returned no latest block",
            )
        })?;
        fit_u64("eth_getBlockByNumber", block.timestamp)
    }

    #[tracing::instrument(skip(self, credential), fields(relayer = ?credential.address()))]
    async fn submit_report(
        &self,
        eid: &Eid,
        scanner: Address,
        content_id: &str,
        credential: &RelayCredential,
    ) -> Result<TxHash, ScanReportError> {
        let submission =
            self.sign_and_broadcast(eid, scanner, content_id, credential);
        match tokio::time::timeout(self.submit_timeout, submission).await {
            Ok(result) => result,
            Err(elapsed) => {
                tracing::warn!("relay submission timed out");
                Err(ScanReportError::relay_failed(RelayStage::Timeout, elapsed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{AbiDecode, Token};
    use ethers::providers::{JsonRpcClient, MockError, MockProvider, Provider};
    use ethers::signers::{LocalWallet, Signer};
    use ethers::types::Bytes;
    use serde::de::DeserializeOwned;
    use serde::Serialize;
    use tracing_test::traced_test;
    use trackless_relayer_utils::ErrorKind;

    /// A node that accepts every request and never answers.
    #[derive(Debug)]
    struct SilentNode;

    #[async_trait::async_trait]
    impl JsonRpcClient for SilentNode {
        type Error = MockError;

        async fn request<T, R>(
            &self,
            _method: &str,
            _params: T,
        ) -> Result<R, Self::Error>
        where
            T: std::fmt::Debug + Serialize + Send + Sync,
            R: DeserializeOwned + Send,
        {
            std::future::pending().await
        }
    }

    fn credential() -> RelayCredential {
        let wallet: LocalWallet =
            "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
                .parse()
                .unwrap();
        RelayCredential::from(wallet.with_chain_id(31337u64))
    }

    fn gateway(
        read_timeout: Duration,
    ) -> (EvmChainGateway<Provider<MockProvider>>, MockProvider) {
        let (provider, mock) = Provider::mocked();
        let gateway = EvmChainGateway::builder()
            .client(Arc::new(provider))
            .contract_address(Address::repeat_byte(0x42))
            .chain_id(31337)
            .read_timeout(read_timeout)
            .gas_price(Some(U256::exp10(9)))
            .build();
        (gateway, mock)
    }

    fn abi_word(token: Token) -> Bytes {
        Bytes::from(ethers::abi::encode(&[token]))
    }

    #[tokio::test]
    async fn owner_of_decodes_the_owner() {
        let (gateway, mock) = gateway(Duration::from_secs(1));
        let owner = Address::repeat_byte(0xaa);
        mock.push::<Bytes, _>(abi_word(Token::Address(owner))).unwrap();
        let result = gateway.owner_of(&Eid::new([1; 32])).await.unwrap();
        assert_eq!(result, Some(owner));
    }

    #[tokio::test]
    async fn zero_owner_means_unregistered() {
        let (gateway, mock) = gateway(Duration::from_secs(1));
        mock.push::<Bytes, _>(abi_word(Token::Address(Address::zero()))).unwrap();
        let result = gateway.owner_of(&Eid::new([1; 32])).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn is_lost_decodes_the_flag() {
        let (gateway, mock) = gateway(Duration::from_secs(1));
        mock.push::<Bytes, _>(abi_word(Token::Bool(true))).unwrap();
        assert!(gateway.is_lost(&Eid::new([1; 32])).await.unwrap());
    }

    #[tokio::test]
    async fn empty_mock_is_chain_unavailable() {
        let (gateway, _mock) = gateway(Duration::from_secs(1));
        let err = gateway.is_lost(&Eid::new([1; 32])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChainUnavailable);
        assert_eq!(
            err.to_string(),
            "chain node unavailable while calling isLost"
        );
    }

    #[tokio::test]
    async fn node_chain_id_is_read_from_the_node() {
        let (gateway, mock) = gateway(Duration::from_secs(1));
        mock.push(U256::from(31337u64)).unwrap();
        assert_eq!(gateway.node_chain_id().await.unwrap(), 31337);
        assert_eq!(gateway.chain_id(), 31337);
    }

    #[test]
    fn submit_report_calldata_round_trips() {
        let call = SubmitReportCall {
            eid: [7u8; 32],
            scanner: Address::repeat_byte(0xbb),
            ipfs_cid: String::from("QmTrackless_abc"),
        };
        let encoded = call.clone().encode();
        // 4 bytes selector of submitReport(bytes32,address,string)
        assert_eq!(
            &encoded[..4],
            &ethers::utils::id("submitReport(bytes32,address,string)")[..]
        );
        let decoded = SubmitReportCall::decode(&encoded).unwrap();
        assert_eq!(decoded, call);
    }

    #[tokio::test]
    #[traced_test]
    async fn submit_report_broadcasts_the_signed_transaction() {
        let (gateway, mock) = gateway(Duration::from_secs(1));
        let tx_hash = TxHash::repeat_byte(0x77);
        // answers are served last pushed first: nonce, then the broadcast.
        mock.push(tx_hash).unwrap();
        mock.push(U256::from(5u64)).unwrap();
        let result = gateway
            .submit_report(
                &Eid::new([1; 32]),
                Address::repeat_byte(0xbb),
                "QmTrackless_abc",
                &credential(),
            )
            .await
            .unwrap();
        assert_eq!(result, tx_hash);
    }

    #[tokio::test]
    async fn failed_broadcast_names_its_stage() {
        let (gateway, mock) = gateway(Duration::from_secs(1));
        // only the nonce is answered.
        mock.push(U256::from(5u64)).unwrap();
        let err = gateway
            .submit_report(
                &Eid::new([1; 32]),
                Address::repeat_byte(0xbb),
                "QmTrackless_abc",
                &credential(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RelaySubmissionFailed);
        assert_eq!(
            err.to_string(),
            "relay transaction failed at the broadcast stage"
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn silent_node_hits_both_deadlines() {
        let gateway = EvmChainGateway::builder()
            .client(Arc::new(Provider::new(SilentNode)))
            .contract_address(Address::repeat_byte(0x42))
            .chain_id(31337)
            .read_timeout(Duration::from_millis(100))
            .submit_timeout(Duration::from_millis(100))
            .gas_price(Some(U256::exp10(9)))
            .build();

        let err = gateway.is_lost(&Eid::new([1; 32])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChainUnavailable);
        assert!(logs_contain("chain read timed out"));

        let err = gateway
            .submit_report(
                &Eid::new([1; 32]),
                Address::repeat_byte(0xbb),
                "QmTrackless_abc",
                &credential(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RelaySubmissionFailed);
        assert_eq!(
            err.to_string(),
            "relay transaction failed at the timeout stage"
        );
        assert!(logs_contain("relay submission timed out"));
        assert_eq!(gateway.submit_timeout(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn out_of_range_quantities_are_rejected() {
        let (gateway, mock) = gateway(Duration::from_secs(1));
        mock.push(U256::MAX).unwrap();
        let err = gateway.node_chain_id().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChainUnavailable);
        assert_eq!(
            err.to_string(),
            "chain node unavailable while calling eth_chainId"
        );
    }
}
