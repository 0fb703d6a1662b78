//! EVM chain client over an alloy HTTP provider

use std::sync::Arc;

use alloy::primitives::{Address, Bytes, TxHash, B256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{Filter, Log};
use alloy::transports::http::{Client, Http};
use alloy::transports::{RpcError as TransportRpcError, TransportErrorKind};
use async_trait::async_trait;
use eyre::{Result, WrapErr};
use tracing::{debug, info};

use super::{ChainClient, ErrorClassifier};
use crate::error::RpcError;

/// [`ChainClient`] backed by a JSON-RPC endpoint
pub struct EvmChainClient {
    name: String,
    chain_id: u64,
    provider: RootProvider<Http<Client>>,
    classifier: Arc<dyn ErrorClassifier>,
}

impl EvmChainClient {
    /// Create a client for `rpc_url`
    pub fn new(
        name: &str,
        rpc_url: &str,
        chain_id: u64,
        classifier: Arc<dyn ErrorClassifier>,
    ) -> Result<Self> {
        let url = rpc_url
            .parse()
            .wrap_err_with(|| format!("Invalid RPC URL for {}", name))?;
        let provider = ProviderBuilder::new().on_http(url);

        info!(chain = %name, chain_id, "Created EVM chain client");

        Ok(Self {
            name: name.to_string(),
            chain_id,
            provider,
            classifier,
        })
    }
}

/// Flatten alloy's transport error into the engine's tagged form
///
/// Non-2xx HTTP responses keep their status as the code, so a bare 429 from a
/// provider is still recognised as a rate limit.
fn to_rpc_error(err: TransportRpcError<TransportErrorKind>) -> RpcError {
    match err {
        TransportRpcError::ErrorResp(payload) => {
            RpcError::new(payload.code, payload.message.to_string())
        }
        TransportRpcError::Transport(TransportErrorKind::HttpError(http)) => {
            let message = if http.body.trim().is_empty() {
                format!("HTTP status {}", http.status)
            } else {
                format!("HTTP status {}: {}", http.status, http.body)
            };
            RpcError::new(i64::from(http.status), message)
        }
        other => RpcError::transport(other.to_string()),
    }
}

#[async_trait]
impl ChainClient for EvmChainClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn classifier(&self) -> &dyn ErrorClassifier {
        self.classifier.as_ref()
    }

    async fn get_head_block(&self) -> Result<u64, RpcError> {
        self.provider.get_block_number().await.map_err(to_rpc_error)
    }

    async fn get_logs(
        &self,
        contract: Address,
        event: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, RpcError> {
        let filter = Filter::new()
            .address(contract)
            .event_signature(event)
            .from_block(from_block)
            .to_block(to_block);

        let logs = self.provider.get_logs(&filter).await.map_err(to_rpc_error)?;
        debug!(
            chain = %self.name,
            from_block,
            to_block,
            count = logs.len(),
            "Fetched logs"
        );
        Ok(logs)
    }

    async fn get_transaction_count(&self, address: Address) -> Result<u64, RpcError> {
        self.provider
            .get_transaction_count(address)
            .await
            .map_err(to_rpc_error)
    }

    async fn submit_signed_transaction(&self, raw: Bytes) -> Result<TxHash, RpcError> {
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(to_rpc_error)?;
        Ok(*pending.tx_hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{DefaultErrorClassifier, ErrorClass};

    #[test]
    fn test_create_client() {
        let client = EvmChainClient::new(
            "source",
            "http://localhost:8545",
            43113,
            Arc::new(DefaultErrorClassifier::default()),
        )
        .unwrap();
        assert_eq!(client.name(), "source");
        assert_eq!(client.chain_id(), 43113);
    }

    #[test]
    fn test_invalid_url_fails() {
        let result = EvmChainClient::new(
            "source",
            "not a url",
            1,
            Arc::new(DefaultErrorClassifier::default()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_transport_error_mapping() {
        let err = to_rpc_error(TransportErrorKind::custom_str("connection refused"));
        assert_eq!(err.code, 0);
        assert!(err.message.contains("connection refused"));
    }

    #[test]
    fn test_http_429_is_rate_limited_whatever_the_body() {
        let classifier = DefaultErrorClassifier::default();
        for body in ["", "error code: 1015", "Too Many Requests"] {
            let err = to_rpc_error(TransportErrorKind::http_error(429, body.to_string()));
            assert_eq!(err.code, 429);
            assert!(
                matches!(classifier.classify(&err), ErrorClass::RateLimited { .. }),
                "body {:?} classified as {:?}",
                body,
                classifier.classify(&err)
            );
        }
    }

    #[test]
    fn test_http_503_is_transient() {
        let classifier = DefaultErrorClassifier::default();
        let err = to_rpc_error(TransportErrorKind::http_error(503, String::new()));
        assert_eq!(err.code, 503);
        assert_eq!(err.message, "HTTP status 503");
        assert_eq!(classifier.classify(&err), ErrorClass::Transient);
    }
}
