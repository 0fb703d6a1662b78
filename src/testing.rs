//! In-memory chain and signer doubles for unit tests

use std::collections::VecDeque;
use std::sync::Mutex;

use alloy::primitives::{keccak256, Address, Bytes, TxHash, B256, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use async_trait::async_trait;

use crate::chain::{ChainClient, DefaultErrorClassifier, ErrorClassifier};
use crate::contracts::{DestinationBridge, SourceBridge};
use crate::error::{RelayError, RpcError};
use crate::signer::TransactionSigner;
use crate::types::RelayTransaction;

fn tx_hash_for(block: u64, log_index: u64) -> TxHash {
    B256::from(U256::from((block << 16) | log_index).to_be_bytes::<32>())
}

/// A mined `Deposit` log
pub fn deposit_log(
    bridge: Address,
    token: Address,
    recipient: Address,
    amount: U256,
    block: u64,
    log_index: u64,
) -> Log {
    let data = SourceBridge::Deposit {
        token,
        recipient,
        amount,
    }
    .encode_log_data();

    Log {
        inner: alloy::primitives::Log {
            address: bridge,
            data,
        },
        block_number: Some(block),
        log_index: Some(log_index),
        transaction_hash: Some(tx_hash_for(block, log_index)),
        ..Default::default()
    }
}

/// A mined `Unwrap` log
#[allow(clippy::too_many_arguments)]
pub fn unwrap_log(
    bridge: Address,
    underlying_token: Address,
    wrapped_token: Address,
    frm: Address,
    to: Address,
    amount: U256,
    block: u64,
    log_index: u64,
) -> Log {
    let data = DestinationBridge::Unwrap {
        underlying_token,
        wrapped_token,
        frm,
        to,
        amount,
    }
    .encode_log_data();

    Log {
        inner: alloy::primitives::Log {
            address: bridge,
            data,
        },
        block_number: Some(block),
        log_index: Some(log_index),
        transaction_hash: Some(tx_hash_for(block, log_index)),
        ..Default::default()
    }
}

#[derive(Default)]
struct MockState {
    head: u64,
    head_failures: VecDeque<String>,
    head_requests: u32,
    logs: Vec<Log>,
    range_limit: Option<(u64, String)>,
    scripted_failures: VecDeque<String>,
    log_requests: Vec<(u64, u64, bool)>,
    nonce: u64,
    nonce_failures: VecDeque<String>,
    nonce_requests: u32,
    failing_submissions: Vec<usize>,
    submission_attempts: usize,
    submissions: Vec<Bytes>,
}

/// Scriptable [`ChainClient`]
pub struct MockChainClient {
    name: String,
    chain_id: u64,
    classifier: DefaultErrorClassifier,
    state: Mutex<MockState>,
}

impl MockChainClient {
    pub fn new(name: &str, chain_id: u64) -> Self {
        Self {
            name: name.to_string(),
            chain_id,
            classifier: DefaultErrorClassifier::default(),
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn push_log(&self, log: Log) {
        self.state.lock().unwrap().logs.push(log);
    }

    pub fn set_head(&self, head: u64) {
        self.state.lock().unwrap().head = head;
    }

    pub fn set_nonce(&self, nonce: u64) {
        self.state.lock().unwrap().nonce = nonce;
    }

    /// Reject every window wider than `max_blocks` with `message`
    pub fn set_range_limit(&self, max_blocks: u64, message: &str) {
        self.state.lock().unwrap().range_limit = Some((max_blocks, message.to_string()));
    }

    /// Fail the next `count` log requests with `message`, whatever their size
    pub fn fail_next_log_requests(&self, count: usize, message: &str) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..count {
            state.scripted_failures.push_back(message.to_string());
        }
    }

    /// Fail the next `count` head lookups with a transport error
    pub fn fail_next_head_requests(&self, count: usize, message: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .head_failures
            .extend(std::iter::repeat(message.to_string()).take(count));
    }

    /// Fail the next `count` nonce lookups with a transport error
    pub fn fail_next_nonce_requests(&self, count: usize, message: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .nonce_failures
            .extend(std::iter::repeat(message.to_string()).take(count));
    }

    /// Reject the submission with this 0-based ordinal
    pub fn fail_submission_at(&self, index: usize) {
        self.state.lock().unwrap().failing_submissions.push(index);
    }

    /// Every log request made, including failed ones
    pub fn log_requests(&self) -> Vec<(u64, u64)> {
        self.state
            .lock()
            .unwrap()
            .log_requests
            .iter()
            .map(|(from, to, _)| (*from, *to))
            .collect()
    }

    pub fn successful_log_requests(&self) -> Vec<(u64, u64)> {
        self.state
            .lock()
            .unwrap()
            .log_requests
            .iter()
            .filter(|(_, _, ok)| *ok)
            .map(|(from, to, _)| (*from, *to))
            .collect()
    }

    pub fn head_requests(&self) -> u32 {
        self.state.lock().unwrap().head_requests
    }

    pub fn nonce_requests(&self) -> u32 {
        self.state.lock().unwrap().nonce_requests
    }

    /// Raw transactions accepted by the mock
    pub fn submissions(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().submissions.clone()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn classifier(&self) -> &dyn ErrorClassifier {
        &self.classifier
    }

    async fn get_head_block(&self) -> Result<u64, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.head_requests += 1;
        match state.head_failures.pop_front() {
            Some(message) => Err(RpcError::transport(message)),
            None => Ok(state.head),
        }
    }

    async fn get_logs(
        &self,
        contract: Address,
        event: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, RpcError> {
        let mut state = self.state.lock().unwrap();

        if let Some(message) = state.scripted_failures.pop_front() {
            state.log_requests.push((from_block, to_block, false));
            return Err(RpcError::new(-32000, message));
        }

        if let Some((max_blocks, message)) = state.range_limit.clone() {
            if to_block - from_block + 1 > max_blocks {
                state.log_requests.push((from_block, to_block, false));
                return Err(RpcError::new(-32005, message));
            }
        }

        state.log_requests.push((from_block, to_block, true));
        let mut logs: Vec<Log> = state
            .logs
            .iter()
            .filter(|log| {
                let block = log.block_number.unwrap_or_default();
                log.address() == contract
                    && log.topics().first() == Some(&event)
                    && block >= from_block
                    && block <= to_block
            })
            .cloned()
            .collect();
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs)
    }

    async fn get_transaction_count(&self, _address: Address) -> Result<u64, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.nonce_requests += 1;
        match state.nonce_failures.pop_front() {
            Some(message) => Err(RpcError::transport(message)),
            None => Ok(state.nonce),
        }
    }

    async fn submit_signed_transaction(&self, raw: Bytes) -> Result<TxHash, RpcError> {
        let mut state = self.state.lock().unwrap();
        let index = state.submission_attempts;
        state.submission_attempts += 1;

        if state.failing_submissions.contains(&index) {
            return Err(RpcError::new(-32000, "replacement transaction underpriced"));
        }

        state.submissions.push(raw.clone());
        Ok(keccak256(&raw))
    }
}

/// [`TransactionSigner`] that records what it was asked to sign
pub struct MockSigner {
    address: Address,
    signed: Mutex<Vec<RelayTransaction>>,
}

impl MockSigner {
    pub fn new() -> Self {
        Self {
            address: Address::repeat_byte(0x5e),
            signed: Mutex::new(Vec::new()),
        }
    }

    pub fn signed(&self) -> Vec<RelayTransaction> {
        self.signed.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionSigner for MockSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, tx: &RelayTransaction, chain_id: u64) -> Result<Bytes, RelayError> {
        self.signed.lock().unwrap().push(tx.clone());
        let mut raw = chain_id.to_be_bytes().to_vec();
        raw.extend_from_slice(&tx.nonce.to_be_bytes());
        raw.extend_from_slice(&tx.input);
        Ok(Bytes::from(raw))
    }
}
