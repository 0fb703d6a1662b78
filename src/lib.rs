//! Wrap Relayer - Library interface
//!
//! Scans the source chain for `Deposit` events and mirrors each one as a
//! `wrap` call on the destination chain, and scans the destination chain for
//! `Unwrap` events and mirrors each one as a `withdraw` call on the source.
//! Progress per chain is kept in a small cursor file so runs are resumable.

pub mod chain;
pub mod config;
pub mod contracts;
pub mod cursor;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod metrics;
pub mod orchestrator;
pub mod relay;
pub mod retry;
pub mod server;
pub mod signer;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use chain::{ChainClient, DefaultErrorClassifier, ErrorClass, ErrorClassifier, EvmChainClient};
pub use cursor::{CursorStore, FileCursorStore, MemoryCursorStore, ScanCursor};
pub use error::{RelayError, RpcError};
pub use fetcher::{ChunkedLogFetcher, ExhaustedWindowPolicy, FetchConfig, FetchStats, LogFetch};
pub use orchestrator::{compute_range, RelayDirection, RunReport, RunState, ScanOrchestrator};
pub use relay::{GasSettings, NonceCounter, RelayEngine, RelayReport, RelayTarget};
pub use signer::{LocalSigner, TransactionSigner};
pub use types::{BlockRange, RelayFunction, TransferEvent, TransferKind};
