//! Chunked log fetching under provider range limits
//!
//! A block range is walked in windows of `step` blocks. When the provider
//! rejects a window as too large (as decided by the client's
//! [`ErrorClassifier`](crate::chain::ErrorClassifier)), the same window is
//! retried with backoff and then shrunk. The step never grows back within a
//! fetch, so the walk cannot oscillate around an undocumented provider limit.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, B256};
use alloy::rpc::types::Log;
use tracing::{debug, warn};

use crate::chain::{ChainClient, ErrorClass};
use crate::error::{RelayError, RpcError};
use crate::metrics;
use crate::retry::{BackoffBudget, RetryConfig};
use crate::types::BlockRange;

/// What to do when a window still fails at the minimum step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExhaustedWindowPolicy {
    /// Abort the fetch (and the run). Nothing is dropped.
    #[default]
    Fail,
    /// Skip the window and keep going. Events in the skipped blocks are
    /// never relayed; every skip is logged and reported.
    Skip,
}

impl FromStr for ExhaustedWindowPolicy {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail" => Ok(ExhaustedWindowPolicy::Fail),
            "skip" => Ok(ExhaustedWindowPolicy::Skip),
            other => Err(RelayError::config(format!(
                "unknown exhausted window policy '{}', expected 'fail' or 'skip'",
                other
            ))),
        }
    }
}

impl fmt::Display for ExhaustedWindowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExhaustedWindowPolicy::Fail => f.write_str("fail"),
            ExhaustedWindowPolicy::Skip => f.write_str("skip"),
        }
    }
}

/// Fetcher tuning
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    /// Window size to start with
    pub initial_step: u64,
    /// Smallest window the fetcher will shrink to
    pub min_step: u64,
    pub retry: RetryConfig,
    pub exhausted_policy: ExhaustedWindowPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            initial_step: 250,
            min_step: 1,
            retry: RetryConfig::default(),
            exhausted_policy: ExhaustedWindowPolicy::Fail,
        }
    }
}

impl FetchConfig {
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.min_step == 0 {
            return Err(RelayError::config("fetch min_step must be at least 1"));
        }
        if self.initial_step < self.min_step {
            return Err(RelayError::config(format!(
                "fetch initial_step ({}) must be >= min_step ({})",
                self.initial_step, self.min_step
            )));
        }
        Ok(())
    }
}

/// Counters describing one fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Successful window requests
    pub windows: u64,
    /// Times the step was reduced
    pub shrinks: u32,
    /// Retries of a window after rate-limit or transient errors
    pub retries: u32,
    /// Windows dropped under [`ExhaustedWindowPolicy::Skip`]
    pub skipped: Vec<BlockRange>,
    /// Step in effect when the fetch ended
    pub final_step: u64,
}

/// Builds [`LogFetch`] sessions
#[derive(Debug, Clone)]
pub struct ChunkedLogFetcher {
    config: FetchConfig,
}

impl ChunkedLogFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, RelayError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Start a fetch of `range` for one (contract, event) pair
    pub fn fetch<'a>(
        &'a self,
        client: &'a dyn ChainClient,
        contract: Address,
        event: B256,
        range: BlockRange,
    ) -> LogFetch<'a> {
        LogFetch {
            client,
            config: &self.config,
            contract,
            event,
            cursor: range.from,
            to_block: range.to,
            step: self.config.initial_step,
            done: range.is_empty(),
            budget: BackoffBudget::default(),
            stats: FetchStats {
                final_step: self.config.initial_step,
                ..FetchStats::default()
            },
        }
    }

    /// Drain a whole fetch into memory
    pub async fn fetch_all(
        &self,
        client: &dyn ChainClient,
        contract: Address,
        event: B256,
        range: BlockRange,
    ) -> Result<(Vec<Log>, FetchStats), RelayError> {
        let mut fetch = self.fetch(client, contract, event, range);
        let mut logs = Vec::new();
        while let Some(window) = fetch.next_window().await? {
            logs.extend(window);
        }
        Ok((logs, fetch.into_stats()))
    }
}

/// One in-progress fetch
///
/// Yields logs window by window in block order. Once it returns `None` or an
/// error it stays finished; a new fetch must be started to read again.
pub struct LogFetch<'a> {
    client: &'a dyn ChainClient,
    config: &'a FetchConfig,
    contract: Address,
    event: B256,
    cursor: u64,
    to_block: u64,
    step: u64,
    done: bool,
    budget: BackoffBudget,
    stats: FetchStats,
}

impl<'a> LogFetch<'a> {
    pub fn into_stats(self) -> FetchStats {
        self.stats
    }

    /// Logs of the next window, `None` once the range is exhausted
    pub async fn next_window(&mut self) -> Result<Option<Vec<Log>>, RelayError> {
        if self.done || self.cursor > self.to_block {
            self.done = true;
            return Ok(None);
        }

        let mut attempt = 0u32;
        loop {
            let window_end = self
                .cursor
                .saturating_add(self.step - 1)
                .min(self.to_block);

            let err = match self
                .client
                .get_logs(self.contract, self.event, self.cursor, window_end)
                .await
            {
                Ok(logs) => {
                    debug!(
                        chain = %self.client.name(),
                        from_block = self.cursor,
                        to_block = window_end,
                        step = self.step,
                        count = logs.len(),
                        "Fetched log window"
                    );
                    metrics::WINDOWS_FETCHED
                        .with_label_values(&[self.client.name()])
                        .inc();
                    self.stats.windows += 1;
                    self.advance_past(window_end);
                    return Ok(Some(logs));
                }
                Err(err) => err,
            };

            match self.client.classifier().classify(&err) {
                ErrorClass::Fatal => {
                    self.done = true;
                    return Err(RelayError::Rpc(err));
                }
                ErrorClass::Transient => {
                    if self.wait_before_retry(attempt, &err).await {
                        attempt += 1;
                        continue;
                    }
                    self.done = true;
                    return Err(RelayError::TransientRpc {
                        attempts: attempt + 1,
                        source: err,
                    });
                }
                ErrorClass::RateLimited { max_range } => {
                    metrics::RATE_LIMITED
                        .with_label_values(&[self.client.name()])
                        .inc();
                    if self.wait_before_retry(attempt, &err).await {
                        attempt += 1;
                        continue;
                    }
                    attempt = 0;

                    if self.step > self.config.min_step {
                        self.shrink(max_range);
                        continue;
                    }

                    let range = BlockRange::new(self.cursor, window_end);
                    return self.exhausted(range, err);
                }
            }
        }
    }

    fn advance_past(&mut self, window_end: u64) {
        if window_end >= self.to_block {
            self.done = true;
        } else {
            self.cursor = window_end + 1;
        }
    }

    /// Sleep before retrying the same window; false when retries or the
    /// total backoff budget are used up
    async fn wait_before_retry(&mut self, attempt: u32, err: &RpcError) -> bool {
        if !self.config.retry.should_retry(attempt) {
            return false;
        }
        let Some(wait) = self.budget.reserve(&self.config.retry, attempt) else {
            warn!(
                chain = %self.client.name(),
                spent = ?self.budget.spent(),
                "Backoff budget exhausted"
            );
            return false;
        };

        self.stats.retries += 1;
        debug!(
            chain = %self.client.name(),
            from_block = self.cursor,
            attempt = attempt + 1,
            ?wait,
            error = %err,
            "Retrying log window"
        );
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        true
    }

    fn shrink(&mut self, max_range: Option<u64>) {
        let target = match max_range {
            Some(advertised) if advertised < self.step => advertised,
            _ => self.step / 2,
        };
        let new_step = target.max(self.config.min_step);

        warn!(
            chain = %self.client.name(),
            from_block = self.cursor,
            old_step = self.step,
            new_step,
            "Provider limit hit, shrinking log window"
        );
        metrics::WINDOW_SHRINKS
            .with_label_values(&[self.client.name()])
            .inc();

        self.step = new_step;
        self.stats.shrinks += 1;
        self.stats.final_step = new_step;
    }

    fn exhausted(
        &mut self,
        range: BlockRange,
        err: RpcError,
    ) -> Result<Option<Vec<Log>>, RelayError> {
        match self.config.exhausted_policy {
            ExhaustedWindowPolicy::Fail => {
                self.done = true;
                Err(RelayError::WindowExhausted { range, source: err })
            }
            ExhaustedWindowPolicy::Skip => {
                warn!(
                    chain = %self.client.name(),
                    from_block = range.from,
                    to_block = range.to,
                    error = %err,
                    "SKIPPING blocks still rate limited at minimum step; \
                     events in this range will NOT be relayed"
                );
                metrics::BLOCKS_SKIPPED
                    .with_label_values(&[self.client.name()])
                    .inc_by(range.len() as f64);
                self.stats.skipped.push(range);
                self.advance_past(range.to);
                Ok(Some(Vec::new()))
            }
        }
    }
}
