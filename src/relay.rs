//! Event relay engine
//!
//! Mirrors a decoded batch onto the target chain: one transaction per event,
//! in source order, with consecutive nonces starting at the signer's current
//! transaction count. A submission that fails is reported and its nonce is
//! still consumed; later events keep the nonces they were assigned.

use std::sync::Arc;

use alloy::primitives::{Address, TxHash};
use alloy::rpc::types::Log;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::chain::ChainClient;
use crate::error::RelayError;
use crate::events::decode_batch;
use crate::metrics;
use crate::retry::{call_with_retry, RetryConfig};
use crate::signer::TransactionSigner;
use crate::types::{RelayFunction, RelayTransaction, TransferEvent, TransferKind};

const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Gas parameters for mirror transactions on one chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasSettings {
    pub gas_limit: u64,
    /// Legacy gas price in wei
    pub gas_price: u128,
}

impl GasSettings {
    pub fn from_gwei(gas_limit: u64, gas_price_gwei: u64) -> Self {
        Self {
            gas_limit,
            gas_price: gas_price_gwei as u128 * WEI_PER_GWEI,
        }
    }
}

/// The chain and contract mirror calls are sent to
pub struct RelayTarget {
    pub client: Arc<dyn ChainClient>,
    pub contract: Address,
    pub function: RelayFunction,
    pub gas: GasSettings,
}

/// Hands out consecutive nonces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceCounter {
    next: u64,
}

impl NonceCounter {
    pub fn new(start: u64) -> Self {
        Self { next: start }
    }

    /// Take the next nonce
    pub fn take(&mut self) -> u64 {
        let nonce = self.next;
        self.next += 1;
        nonce
    }

    pub fn peek(&self) -> u64 {
        self.next
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmittedRelay {
    pub nonce: u64,
    pub tx_hash: TxHash,
    pub source_block: u64,
    pub log_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRelay {
    pub nonce: u64,
    pub source_block: u64,
    pub log_index: u64,
    pub error: String,
}

/// Outcome of relaying one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayReport {
    pub submitted: Vec<SubmittedRelay>,
    pub failed: Vec<FailedRelay>,
}

impl RelayReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.submitted.len() + self.failed.len()
    }
}

/// Builds, signs and submits mirror transactions for one direction
pub struct RelayEngine<'a> {
    target: &'a RelayTarget,
    signer: &'a dyn TransactionSigner,
    retry: RetryConfig,
    dry_run: bool,
}

impl<'a> RelayEngine<'a> {
    pub fn new(target: &'a RelayTarget, signer: &'a dyn TransactionSigner) -> Self {
        Self {
            target,
            signer,
            retry: RetryConfig::default(),
            dry_run: false,
        }
    }

    /// Retry policy for the nonce lookup
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Log what would be sent instead of signing and submitting it
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Decode the whole batch up front so a bad log aborts before anything is sent
    pub fn prepare(
        &self,
        kind: TransferKind,
        logs: &[Log],
    ) -> Result<Vec<TransferEvent>, RelayError> {
        let events = decode_batch(kind, logs)?;
        debug!(kind = %kind, count = events.len(), "Decoded batch");
        Ok(events)
    }

    /// Mirror transaction for `event` at `nonce`
    pub fn build_transaction(&self, event: &TransferEvent, nonce: u64) -> RelayTransaction {
        let args = event.relay_args();
        RelayTransaction {
            target_chain: self.target.client.name().to_string(),
            chain_id: self.target.client.chain_id(),
            to: self.target.contract,
            function: self.target.function,
            args,
            input: self.target.function.encode(&args),
            nonce,
            gas_limit: self.target.gas.gas_limit,
            gas_price: self.target.gas.gas_price,
        }
    }

    /// Submit one transaction per event, in order
    ///
    /// Only the nonce lookup can fail the whole batch. Individual submission
    /// failures are collected in the report.
    pub async fn relay(&self, events: &[TransferEvent]) -> Result<RelayReport, RelayError> {
        let mut report = RelayReport::default();
        if events.is_empty() {
            return Ok(report);
        }

        let client = self.target.client.as_ref();
        let chain = client.name();
        let address = self.signer.address();
        let start = call_with_retry(
            client.classifier(),
            &self.retry,
            "get_transaction_count",
            move || client.get_transaction_count(address),
        )
        .await?;
        let mut nonces = NonceCounter::new(start);

        debug!(chain = %chain, start_nonce = start, count = events.len(), "Relaying batch");

        for event in events {
            let nonce = nonces.take();
            let tx = self.build_transaction(event, nonce);
            let position = event.position();

            info!(
                chain = %chain,
                nonce,
                source_block = position.block,
                "{} {} {} → {}",
                event_label(event.kind()),
                tx.args.amount,
                tx.args.token,
                tx.args.recipient
            );

            if self.dry_run {
                continue;
            }

            match self.submit(&tx).await {
                Ok(tx_hash) => {
                    info!(
                        chain = %chain,
                        nonce,
                        tx_hash = %tx_hash,
                        function = %tx.function,
                        "Submitted relay transaction"
                    );
                    metrics::record_relay_submitted(chain, true);
                    report.submitted.push(SubmittedRelay {
                        nonce,
                        tx_hash,
                        source_block: position.block,
                        log_index: position.log_index,
                    });
                }
                Err(e) => {
                    error!(
                        chain = %chain,
                        nonce,
                        source_block = position.block,
                        log_index = position.log_index,
                        error = %e,
                        "Failed to submit relay transaction"
                    );
                    metrics::record_relay_submitted(chain, false);
                    report.failed.push(FailedRelay {
                        nonce,
                        source_block: position.block,
                        log_index: position.log_index,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    async fn submit(&self, tx: &RelayTransaction) -> Result<TxHash, RelayError> {
        let raw = self.signer.sign(tx, tx.chain_id).await?;
        self.target
            .client
            .submit_signed_transaction(raw)
            .await
            .map_err(|e| RelayError::Submission {
                nonce: tx.nonce,
                reason: e.to_string(),
            })
    }
}

fn event_label(kind: TransferKind) -> &'static str {
    match kind {
        TransferKind::Deposit => "Deposit",
        TransferKind::Unwrap => "Unwrap",
    }
}
