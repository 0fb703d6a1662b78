//! Bridge event decoding
//!
//! Turns raw logs into [`TransferEvent`] variants using the sol!-generated
//! schemas. A log whose shape does not match its schema exactly is rejected;
//! the relay engine treats that as fatal for the run.

use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;

use crate::contracts::{DestinationBridge, SourceBridge};
use crate::error::RelayError;
use crate::types::{DepositEvent, LogPosition, TransferEvent, TransferKind, UnwrapEvent};

/// Indexed topics (including topic0) per event
fn expected_topics(kind: TransferKind) -> usize {
    match kind {
        TransferKind::Deposit => 3,
        TransferKind::Unwrap => 4,
    }
}

/// Length of the non-indexed data section per event
fn expected_data_len(kind: TransferKind) -> usize {
    match kind {
        // amount
        TransferKind::Deposit => 32,
        // frm, amount
        TransferKind::Unwrap => 64,
    }
}

/// Block/log-index position of a raw log
pub fn log_position(log: &Log) -> Result<LogPosition, RelayError> {
    let block = log.block_number.ok_or_else(|| RelayError::Decode {
        block: 0,
        log_index: log.log_index.unwrap_or_default(),
        reason: "missing block number (pending log)".to_string(),
    })?;
    let log_index = log.log_index.ok_or_else(|| RelayError::Decode {
        block,
        log_index: 0,
        reason: "missing log index".to_string(),
    })?;
    Ok(LogPosition { block, log_index })
}

/// Decode a raw log as the given event kind
pub fn decode_transfer_event(kind: TransferKind, log: &Log) -> Result<TransferEvent, RelayError> {
    let position = log_position(log)?;
    let reject = |reason: String| RelayError::Decode {
        block: position.block,
        log_index: position.log_index,
        reason,
    };

    let topics = log.topics();
    if topics.len() != expected_topics(kind) {
        return Err(reject(format!(
            "{} log has {} topics, expected {}",
            kind,
            topics.len(),
            expected_topics(kind)
        )));
    }
    if topics[0] != kind.signature() {
        return Err(reject(format!(
            "topic0 {} is not the {} signature",
            topics[0], kind
        )));
    }

    let data_len = log.data().data.len();
    if data_len != expected_data_len(kind) {
        return Err(reject(format!(
            "{} log carries {} data bytes, expected {}",
            kind,
            data_len,
            expected_data_len(kind)
        )));
    }

    let event = match kind {
        TransferKind::Deposit => {
            let decoded = SourceBridge::Deposit::decode_log_data(log.data(), true)
                .map_err(|e| reject(e.to_string()))?;
            TransferEvent::Deposit(DepositEvent {
                token: decoded.token,
                recipient: decoded.recipient,
                amount: decoded.amount,
                source_block: position.block,
                log_index: position.log_index,
                tx_hash: log.transaction_hash,
            })
        }
        TransferKind::Unwrap => {
            let decoded = DestinationBridge::Unwrap::decode_log_data(log.data(), true)
                .map_err(|e| reject(e.to_string()))?;
            TransferEvent::Unwrap(UnwrapEvent {
                underlying_token: decoded.underlying_token,
                wrapped_token: decoded.wrapped_token,
                sender: decoded.frm,
                recipient: decoded.to,
                amount: decoded.amount,
                source_block: position.block,
                log_index: position.log_index,
                tx_hash: log.transaction_hash,
            })
        }
    };

    Ok(event)
}

/// Decode a batch, enforcing strictly ascending (block, log index) order
pub fn decode_batch(kind: TransferKind, logs: &[Log]) -> Result<Vec<TransferEvent>, RelayError> {
    let mut events = Vec::with_capacity(logs.len());
    let mut prev: Option<LogPosition> = None;

    for log in logs {
        let event = decode_transfer_event(kind, log)?;
        let position = event.position();
        if let Some(prev) = prev {
            if position <= prev {
                return Err(RelayError::OutOfOrder {
                    block: position.block,
                    log_index: position.log_index,
                    prev_block: prev.block,
                    prev_log_index: prev.log_index,
                });
            }
        }
        prev = Some(position);
        events.push(event);
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{deposit_log, unwrap_log};
    use alloy::primitives::{Address, Bytes, LogData, U256};

    #[test]
    fn test_decode_deposit() {
        let log = deposit_log(
            Address::repeat_byte(0xaa),
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x02),
            U256::from(500u64),
            42,
            3,
        );

        let event = decode_transfer_event(TransferKind::Deposit, &log).unwrap();
        match event {
            TransferEvent::Deposit(d) => {
                assert_eq!(d.token, Address::repeat_byte(0x01));
                assert_eq!(d.recipient, Address::repeat_byte(0x02));
                assert_eq!(d.amount, U256::from(500u64));
                assert_eq!(d.source_block, 42);
                assert_eq!(d.log_index, 3);
            }
            other => panic!("expected deposit, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_unwrap() {
        let log = unwrap_log(
            Address::repeat_byte(0xbb),
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x02),
            Address::repeat_byte(0x03),
            Address::repeat_byte(0x04),
            U256::from(9u64),
            77,
            0,
        );

        let event = decode_transfer_event(TransferKind::Unwrap, &log).unwrap();
        match event {
            TransferEvent::Unwrap(u) => {
                assert_eq!(u.underlying_token, Address::repeat_byte(0x01));
                assert_eq!(u.wrapped_token, Address::repeat_byte(0x02));
                assert_eq!(u.sender, Address::repeat_byte(0x03));
                assert_eq!(u.recipient, Address::repeat_byte(0x04));
                assert_eq!(u.amount, U256::from(9u64));
            }
            other => panic!("expected unwrap, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_wrong_kind() {
        let log = deposit_log(
            Address::repeat_byte(0xaa),
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x02),
            U256::from(1u64),
            1,
            0,
        );
        let err = decode_transfer_event(TransferKind::Unwrap, &log).unwrap_err();
        assert!(matches!(err, RelayError::Decode { block: 1, .. }));
    }

    #[test]
    fn test_rejects_truncated_data() {
        let mut log = deposit_log(
            Address::repeat_byte(0xaa),
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x02),
            U256::from(1u64),
            5,
            2,
        );
        let topics = log.topics().to_vec();
        log.inner.data = LogData::new_unchecked(topics, Bytes::from(vec![0u8; 16]));

        let err = decode_transfer_event(TransferKind::Deposit, &log).unwrap_err();
        assert!(err.to_string().contains("16 data bytes"));
    }

    #[test]
    fn test_rejects_pending_log() {
        let mut log = deposit_log(
            Address::repeat_byte(0xaa),
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x02),
            U256::from(1u64),
            5,
            2,
        );
        log.block_number = None;
        assert!(decode_transfer_event(TransferKind::Deposit, &log).is_err());
    }

    #[test]
    fn test_batch_rejects_out_of_order() {
        let token = Address::repeat_byte(0x01);
        let to = Address::repeat_byte(0x02);
        let bridge = Address::repeat_byte(0xaa);
        let logs = vec![
            deposit_log(bridge, token, to, U256::from(1u64), 10, 1),
            deposit_log(bridge, token, to, U256::from(2u64), 9, 0),
        ];

        let err = decode_batch(TransferKind::Deposit, &logs).unwrap_err();
        assert!(matches!(
            err,
            RelayError::OutOfOrder {
                block: 9,
                prev_block: 10,
                ..
            }
        ));
    }

    #[test]
    fn test_batch_keeps_order() {
        let token = Address::repeat_byte(0x01);
        let to = Address::repeat_byte(0x02);
        let bridge = Address::repeat_byte(0xaa);
        let logs = vec![
            deposit_log(bridge, token, to, U256::from(1u64), 10, 0),
            deposit_log(bridge, token, to, U256::from(2u64), 10, 1),
            deposit_log(bridge, token, to, U256::from(3u64), 11, 0),
        ];

        let events = decode_batch(TransferKind::Deposit, &logs).unwrap();
        let blocks: Vec<u64> = events.iter().map(|e| e.source_block()).collect();
        assert_eq!(blocks, vec![10, 10, 11]);
    }
}
