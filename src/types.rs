//! Common types for cross-chain relaying

use std::fmt;

use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use serde::{Deserialize, Serialize};

use crate::contracts::{DestinationBridge, SourceBridge};

/// Inclusive block range `[from, to]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    /// Number of blocks covered; zero when `from > to`
    pub fn len(&self) -> u64 {
        if self.from > self.to {
            0
        } else {
            self.to - self.from + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

// ============================================================================
// Events
// ============================================================================

/// Which bridge event a direction scans for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferKind {
    /// `Deposit` on the source chain, mirrored by `wrap` on the destination
    Deposit,
    /// `Unwrap` on the destination chain, mirrored by `withdraw` on the source
    Unwrap,
}

impl TransferKind {
    /// Topic0 of the event
    pub fn signature(&self) -> B256 {
        use alloy::sol_types::SolEvent;
        match self {
            TransferKind::Deposit => SourceBridge::Deposit::SIGNATURE_HASH,
            TransferKind::Unwrap => DestinationBridge::Unwrap::SIGNATURE_HASH,
        }
    }

    /// Function called on the opposite chain
    pub fn mirror(&self) -> RelayFunction {
        match self {
            TransferKind::Deposit => RelayFunction::Wrap,
            TransferKind::Unwrap => RelayFunction::Withdraw,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferKind::Deposit => "deposit",
            TransferKind::Unwrap => "unwrap",
        }
    }
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a log on its chain, used for ordering checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogPosition {
    pub block: u64,
    pub log_index: u64,
}

/// `Deposit(address indexed token, address indexed recipient, uint256 amount)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositEvent {
    pub token: Address,
    pub recipient: Address,
    pub amount: U256,
    pub source_block: u64,
    pub log_index: u64,
    pub tx_hash: Option<TxHash>,
}

/// `Unwrap(address indexed underlying_token, address indexed wrapped_token,
///         address frm, address indexed to, uint256 amount)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnwrapEvent {
    pub underlying_token: Address,
    pub wrapped_token: Address,
    pub sender: Address,
    pub recipient: Address,
    pub amount: U256,
    pub source_block: u64,
    pub log_index: u64,
    pub tx_hash: Option<TxHash>,
}

/// A decoded bridge event awaiting relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferEvent {
    Deposit(DepositEvent),
    Unwrap(UnwrapEvent),
}

impl TransferEvent {
    pub fn kind(&self) -> TransferKind {
        match self {
            TransferEvent::Deposit(_) => TransferKind::Deposit,
            TransferEvent::Unwrap(_) => TransferKind::Unwrap,
        }
    }

    pub fn position(&self) -> LogPosition {
        match self {
            TransferEvent::Deposit(e) => LogPosition {
                block: e.source_block,
                log_index: e.log_index,
            },
            TransferEvent::Unwrap(e) => LogPosition {
                block: e.source_block,
                log_index: e.log_index,
            },
        }
    }

    pub fn source_block(&self) -> u64 {
        self.position().block
    }

    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            TransferEvent::Deposit(e) => e.tx_hash,
            TransferEvent::Unwrap(e) => e.tx_hash,
        }
    }

    /// Arguments for the mirrored call on the opposite chain
    pub fn relay_args(&self) -> RelayArgs {
        match self {
            TransferEvent::Deposit(e) => RelayArgs {
                token: e.token,
                recipient: e.recipient,
                amount: e.amount,
            },
            TransferEvent::Unwrap(e) => RelayArgs {
                token: e.underlying_token,
                recipient: e.recipient,
                amount: e.amount,
            },
        }
    }
}

// ============================================================================
// Outbound transactions
// ============================================================================

/// Mirror function invoked on the target chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelayFunction {
    Wrap,
    Withdraw,
}

impl RelayFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayFunction::Wrap => "wrap",
            RelayFunction::Withdraw => "withdraw",
        }
    }

    /// ABI-encode the call for this function
    pub fn encode(&self, args: &RelayArgs) -> Bytes {
        use alloy::sol_types::SolCall;
        let data = match self {
            RelayFunction::Wrap => DestinationBridge::wrapCall {
                underlying_token: args.token,
                recipient: args.recipient,
                amount: args.amount,
            }
            .abi_encode(),
            RelayFunction::Withdraw => SourceBridge::withdrawCall {
                token: args.token,
                recipient: args.recipient,
                amount: args.amount,
            }
            .abi_encode(),
        };
        Bytes::from(data)
    }
}

impl fmt::Display for RelayFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(token, recipient, amount)` shared by `wrap` and `withdraw`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayArgs {
    pub token: Address,
    pub recipient: Address,
    pub amount: U256,
}

/// A transaction mirroring one event, built once and submitted once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayTransaction {
    /// Cursor/display name of the target chain
    pub target_chain: String,
    pub chain_id: u64,
    pub to: Address,
    pub function: RelayFunction,
    pub args: RelayArgs,
    pub input: Bytes,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u128,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_range_len() {
        assert_eq!(BlockRange::new(96, 100).len(), 5);
        assert_eq!(BlockRange::new(5, 5).len(), 1);
        assert!(BlockRange::new(101, 100).is_empty());
    }

    #[test]
    fn test_log_position_ordering() {
        let a = LogPosition { block: 10, log_index: 3 };
        let b = LogPosition { block: 10, log_index: 4 };
        let c = LogPosition { block: 11, log_index: 0 };
        assert!(a < b && b < c);
    }

    #[test]
    fn test_mirror_functions() {
        assert_eq!(TransferKind::Deposit.mirror(), RelayFunction::Wrap);
        assert_eq!(TransferKind::Unwrap.mirror(), RelayFunction::Withdraw);
    }

    #[test]
    fn test_encode_uses_function_selector() {
        use alloy::sol_types::SolCall;

        let args = RelayArgs {
            token: Address::repeat_byte(0x11),
            recipient: Address::repeat_byte(0x22),
            amount: U256::from(1_000u64),
        };
        let wrap = RelayFunction::Wrap.encode(&args);
        let withdraw = RelayFunction::Withdraw.encode(&args);

        assert_eq!(&wrap[..4], DestinationBridge::wrapCall::SELECTOR.as_slice());
        assert_eq!(&withdraw[..4], SourceBridge::withdrawCall::SELECTOR.as_slice());
        // selector + three 32-byte words
        assert_eq!(wrap.len(), 4 + 96);
    }

    #[test]
    fn test_unwrap_relays_underlying_token() {
        let event = TransferEvent::Unwrap(UnwrapEvent {
            underlying_token: Address::repeat_byte(0x01),
            wrapped_token: Address::repeat_byte(0x02),
            sender: Address::repeat_byte(0x03),
            recipient: Address::repeat_byte(0x04),
            amount: U256::from(7u64),
            source_block: 12,
            log_index: 1,
            tx_hash: None,
        });
        let args = event.relay_args();
        assert_eq!(args.token, Address::repeat_byte(0x01));
        assert_eq!(args.recipient, Address::repeat_byte(0x04));
        assert_eq!(event.kind().mirror(), RelayFunction::Withdraw);
    }
}
