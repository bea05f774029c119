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

use ethers::signers::{LocalWallet, Signer, WalletError};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Signature};
use trackless_relayer_types::private_key::PrivateKey;

/// The process wide signing identity used to relay reports.
///
/// Relaying with one credential from several tasks at once must be
/// serialized by the caller, see `RelaySubmitter`.
#[derive(Clone)]
pub struct RelayCredential {
    wallet: LocalWallet,
}

impl std::fmt::Debug for RelayCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayCredential")
            .field("address", &self.wallet.address())
            .finish()
    }
}

impl RelayCredential {
    /// Builds the credential from the configured key, for `chain_id`.
    pub fn from_private_key(
        key: &PrivateKey,
        chain_id: u64,
    ) -> trackless_relayer_utils::Result<Self> {
        let wallet = LocalWallet::from_bytes(key.as_bytes())?;
        Ok(Self::from(wallet.with_chain_id(chain_id)))
    }

    /// The relay account address.
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Signs `tx` with the relay key.
    pub async fn sign(
        &self,
        tx: &TypedTransaction,
    ) -> Result<Signature, WalletError> {
        self.wallet.sign_transaction(tx).await
    }
}

impl From<LocalWallet> for RelayCredential {
    fn from(wallet: LocalWallet) -> Self {
        Self { wallet }
    }
}
