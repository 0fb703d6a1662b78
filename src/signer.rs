//! Transaction signing
//!
//! The relay engine never touches key material; it hands a
//! [`RelayTransaction`] to a [`TransactionSigner`] and gets back the raw bytes
//! to broadcast.

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use tracing::info;

use crate::error::RelayError;
use crate::types::RelayTransaction;

/// Signs relay transactions for submission
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Account whose nonce sequence the relay uses
    fn address(&self) -> Address;

    /// Produce a signed, broadcastable payload for `chain_id`
    async fn sign(&self, tx: &RelayTransaction, chain_id: u64) -> Result<Bytes, RelayError>;
}

/// Local private-key signer producing legacy (gas price) transactions
pub struct LocalSigner {
    address: Address,
    wallet: EthereumWallet,
}

impl LocalSigner {
    /// Create from a hex private key, with or without `0x`
    pub fn from_private_key(private_key: &str) -> Result<Self, RelayError> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|e| RelayError::config(format!("Invalid private key: {}", e)))?;
        let address = signer.address();

        info!(address = %address, "Relay signer initialized");

        Ok(Self {
            address,
            wallet: EthereumWallet::from(signer),
        })
    }
}

#[async_trait]
impl TransactionSigner for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, tx: &RelayTransaction, chain_id: u64) -> Result<Bytes, RelayError> {
        let request = TransactionRequest::default()
            .with_from(self.address)
            .with_to(tx.to)
            .with_nonce(tx.nonce)
            .with_gas_limit(tx.gas_limit)
            .with_gas_price(tx.gas_price)
            .with_chain_id(chain_id)
            .with_input(tx.input.clone());

        let envelope = request
            .build(&self.wallet)
            .await
            .map_err(|e| RelayError::Submission {
                nonce: tx.nonce,
                reason: format!("signing failed: {}", e),
            })?;

        Ok(Bytes::from(envelope.encoded_2718()))
    }
}
