//! Chain connectivity
//!
//! [`ChainClient`] is the only way the engine talks to a chain. Each client
//! also carries the [`ErrorClassifier`] for its provider, since rate-limit and
//! range-limit errors look different on every RPC vendor.

use alloy::primitives::{Address, Bytes, TxHash, B256};
use alloy::rpc::types::Log;
use async_trait::async_trait;

use crate::error::RpcError;

pub mod evm;

pub use evm::EvmChainClient;

/// Capability to read from and submit to one chain
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Cursor key / display name of this chain
    fn name(&self) -> &str;

    /// Native chain id used for signing
    fn chain_id(&self) -> u64;

    /// Classifier for errors returned by this client
    fn classifier(&self) -> &dyn ErrorClassifier;

    async fn get_head_block(&self) -> Result<u64, RpcError>;

    /// Logs emitted by `contract` with topic0 `event` in `[from_block, to_block]`
    async fn get_logs(
        &self,
        contract: Address,
        event: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, RpcError>;

    async fn get_transaction_count(&self, address: Address) -> Result<u64, RpcError>;

    async fn submit_signed_transaction(&self, raw: Bytes) -> Result<TxHash, RpcError>;
}

// ============================================================================
// Error classification
// ============================================================================

/// How the engine should react to an RPC error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Provider rejected the request as too large or too frequent.
    /// `max_range` is the block range the provider advertised, if any.
    RateLimited { max_range: Option<u64> },
    /// Network/timeout failure - retry with backoff
    Transient,
    /// Anything else - abort
    Fatal,
}

/// Provider-specific error classification
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &RpcError) -> ErrorClass;
}

/// Classifier covering the common public EVM providers
///
/// Codes and substrings are configurable so a deployment can adapt to its
/// provider without code changes.
#[derive(Debug, Clone)]
pub struct DefaultErrorClassifier {
    pub rate_limit_codes: Vec<i64>,
    pub rate_limit_patterns: Vec<String>,
    pub transient_patterns: Vec<String>,
}

impl Default for DefaultErrorClassifier {
    fn default() -> Self {
        Self {
            // -32005: limit exceeded (geth/infura), 429: HTTP too many requests
            rate_limit_codes: vec![-32005, 429],
            rate_limit_patterns: [
                "limit exceeded",
                "rate limit",
                "too many requests",
                "query returned more than",
                "block range",
                "range too large",
                "response size exceeded",
                "exceed maximum block range",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            transient_patterns: [
                "timeout",
                "timed out",
                "connection",
                "network",
                "502",
                "503",
                "504",
                "temporarily unavailable",
                "header not found",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl DefaultErrorClassifier {
    /// Default classifier plus extra rate-limit substrings
    pub fn with_extra_patterns(patterns: &[String]) -> Self {
        let mut classifier = Self::default();
        classifier.rate_limit_patterns.extend(
            patterns
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty()),
        );
        classifier
    }
}

impl ErrorClassifier for DefaultErrorClassifier {
    fn classify(&self, error: &RpcError) -> ErrorClass {
        let message = error.message.to_lowercase();

        let rate_limited = self.rate_limit_codes.contains(&error.code)
            || self
                .rate_limit_patterns
                .iter()
                .any(|p| message.contains(p.as_str()));
        if rate_limited {
            return ErrorClass::RateLimited {
                max_range: advertised_max_range(&message),
            };
        }

        if self
            .transient_patterns
            .iter()
            .any(|p| message.contains(p.as_str()))
        {
            return ErrorClass::Transient;
        }

        ErrorClass::Fatal
    }
}

/// Extract the block range a provider advertises, e.g.
/// "block range limit exceeded (max 100)" or "exceed maximum block range: 5000".
///
/// The number has to come after the word "range" and must not be a count of
/// results or logs, so "max 10000 results for this block range" yields nothing.
pub fn advertised_max_range(message: &str) -> Option<u64> {
    let message = message.to_lowercase();
    let rest = &message[message.find("range")? + "range".len()..];
    let start = rest.find(|c: char| c.is_ascii_digit())?;
    let digits: String = rest[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    let unit = rest[start + digits.len()..].trim_start();
    if unit.starts_with("result") || unit.starts_with("log") {
        return None;
    }
    digits.parse().ok().filter(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit_code() {
        let classifier = DefaultErrorClassifier::default();
        let class = classifier.classify(&RpcError::new(-32005, "query limit"));
        assert_eq!(class, ErrorClass::RateLimited { max_range: None });
    }

    #[test]
    fn test_classify_rate_limit_message() {
        let classifier = DefaultErrorClassifier::default();
        let class = classifier.classify(&RpcError::new(-32000, "Limit Exceeded"));
        assert!(matches!(class, ErrorClass::RateLimited { .. }));
    }

    #[test]
    fn test_classify_transient() {
        let classifier = DefaultErrorClassifier::default();
        let class = classifier.classify(&RpcError::transport("connection reset by peer"));
        assert_eq!(class, ErrorClass::Transient);
    }

    #[test]
    fn test_classify_fatal() {
        let classifier = DefaultErrorClassifier::default();
        let class = classifier.classify(&RpcError::new(-32602, "invalid argument 0"));
        assert_eq!(class, ErrorClass::Fatal);
    }

    #[test]
    fn test_extra_patterns() {
        let classifier = DefaultErrorClassifier::with_extra_patterns(&[
            " Slow Down ".to_string(),
            "".to_string(),
        ]);
        let class = classifier.classify(&RpcError::new(-32000, "please slow down"));
        assert!(matches!(class, ErrorClass::RateLimited { .. }));
    }

    #[test]
    fn test_advertised_max_range() {
        assert_eq!(
            advertised_max_range("block range limit exceeded (max 100)"),
            Some(100)
        );
        assert_eq!(
            advertised_max_range("exceed maximum block range: 5000"),
            Some(5000)
        );
        assert_eq!(advertised_max_range("limit exceeded"), None);
        assert_eq!(
            advertised_max_range("query returned more than 10000 results"),
            None
        );
    }

    #[test]
    fn test_result_caps_are_not_block_ranges() {
        assert_eq!(
            advertised_max_range("max 10000 results for this block range"),
            None
        );
        assert_eq!(
            advertised_max_range("block range query returned more than 10000 logs"),
            None
        );
        assert_eq!(
            advertised_max_range("Block range is too wide, max is 2048"),
            Some(2048)
        );
    }

    #[test]
    fn test_result_cap_shrinks_by_halving() {
        let classifier = DefaultErrorClassifier::default();
        let class =
            classifier.classify(&RpcError::new(-32005, "max 10000 results for this block range"));
        assert_eq!(class, ErrorClass::RateLimited { max_range: None });
    }
}
