//! Scan orchestration
//!
//! One run of one direction: read the cursor and head, compute the block
//! range, fetch every log in it, relay the decoded events and only then move
//! the cursor to the end of the range. Any aborting error leaves the cursor
//! where it was, so the next run rescans the same blocks.

use std::fmt;
use std::sync::Arc;

use alloy::primitives::Address;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::chain::ChainClient;
use crate::cursor::CursorStore;
use crate::error::RelayError;
use crate::fetcher::{ChunkedLogFetcher, FetchStats};
use crate::metrics;
use crate::relay::{RelayEngine, RelayReport, RelayTarget};
use crate::retry::call_with_retry;
use crate::signer::TransactionSigner;
use crate::types::{BlockRange, TransferKind};

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    RangeComputed,
    /// Nothing new since the cursor; terminal
    UpToDate,
    Fetching,
    Relaying,
    /// Terminal success
    CursorAdvanced,
    /// Terminal failure, cursor unchanged
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::RangeComputed => "range_computed",
            RunState::UpToDate => "up_to_date",
            RunState::Fetching => "fetching",
            RunState::Relaying => "relaying",
            RunState::CursorAdvanced => "cursor_advanced",
            RunState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// One scan-and-relay pipeline: events of `kind` on the scanned chain become
/// calls on the target chain
pub struct RelayDirection {
    /// Display name, e.g. `source->destination`
    pub label: String,
    pub kind: TransferKind,
    /// Chain scanned for events; its name is the cursor key
    pub scan_client: Arc<dyn ChainClient>,
    pub scan_contract: Address,
    pub target: RelayTarget,
}

impl RelayDirection {
    pub fn cursor_key(&self) -> &str {
        self.scan_client.name()
    }
}

/// Summary of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub direction: String,
    /// `UpToDate` or `CursorAdvanced`
    pub state: RunState,
    pub range: Option<BlockRange>,
    pub events: usize,
    pub fetch: FetchStats,
    pub relay: RelayReport,
}

impl RunReport {
    /// No failed submissions and no skipped windows
    pub fn is_clean(&self) -> bool {
        self.relay.is_clean() && self.fetch.skipped.is_empty()
    }

    fn outcome(&self) -> &'static str {
        match self.state {
            RunState::UpToDate => "up_to_date",
            _ if self.is_clean() => "completed",
            _ => "completed_with_failures",
        }
    }
}

/// Range to scan given the last scanned block and the current head
///
/// `from = max(cursor + 1, head - lookback + 1)`, `to = head`. Returns `None`
/// when there is nothing to scan.
pub fn compute_range(
    last_scanned: Option<u64>,
    head: u64,
    lookback: Option<u64>,
) -> Option<BlockRange> {
    let resume = last_scanned.map_or(0, |block| block.saturating_add(1));
    let floor = lookback.map_or(0, |window| head.saturating_add(1).saturating_sub(window));
    let from = resume.max(floor);

    if from > head {
        None
    } else {
        Some(BlockRange::new(from, head))
    }
}

struct RunTracker<'a> {
    direction: &'a str,
    state: RunState,
}

impl<'a> RunTracker<'a> {
    fn new(direction: &'a str) -> Self {
        Self {
            direction,
            state: RunState::Idle,
        }
    }

    fn enter(&mut self, next: RunState) {
        debug!(
            direction = %self.direction,
            from = %self.state,
            to = %next,
            "Run state transition"
        );
        self.state = next;
    }
}

/// Drives runs for any number of directions over a shared cursor store
pub struct ScanOrchestrator {
    cursor_store: Arc<dyn CursorStore>,
    fetcher: ChunkedLogFetcher,
    signer: Arc<dyn TransactionSigner>,
    lookback: Option<u64>,
    confirmations: u64,
    dry_run: bool,
}

impl ScanOrchestrator {
    pub fn new(
        cursor_store: Arc<dyn CursorStore>,
        fetcher: ChunkedLogFetcher,
        signer: Arc<dyn TransactionSigner>,
    ) -> Self {
        Self {
            cursor_store,
            fetcher,
            signer,
            lookback: None,
            confirmations: 0,
            dry_run: false,
        }
    }

    /// Rescan at most this many blocks below head; `None` or `Some(0)` disables
    pub fn with_lookback(mut self, lookback: Option<u64>) -> Self {
        self.lookback = lookback.filter(|blocks| *blocks > 0);
        self
    }

    /// Treat `head - confirmations` as the chain head
    pub fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run one direction to completion
    pub async fn run(&self, direction: &RelayDirection) -> Result<RunReport, RelayError> {
        let mut tracker = RunTracker::new(&direction.label);

        match self.execute(direction, &mut tracker).await {
            Ok(report) => {
                metrics::record_run(&direction.label, report.outcome());
                Ok(report)
            }
            Err(e) => {
                let failed_in = tracker.state;
                tracker.enter(RunState::Aborted);
                error!(
                    direction = %direction.label,
                    state = %failed_in,
                    kind = e.kind(),
                    error = %e,
                    "Run aborted, cursor unchanged"
                );
                metrics::record_run(&direction.label, "aborted");
                Err(e)
            }
        }
    }

    /// Run several directions concurrently; results are in input order
    pub async fn run_all(
        &self,
        directions: &[RelayDirection],
    ) -> Vec<Result<RunReport, RelayError>> {
        join_all(directions.iter().map(|direction| self.run(direction))).await
    }

    async fn execute(
        &self,
        direction: &RelayDirection,
        tracker: &mut RunTracker<'_>,
    ) -> Result<RunReport, RelayError> {
        let chain = direction.cursor_key();

        let cursor = self.cursor_store.load().await?;
        let last_scanned = cursor.get(chain);
        let scan_client = direction.scan_client.as_ref();
        let head = call_with_retry(
            scan_client.classifier(),
            &self.fetcher.config().retry,
            "get_head_block",
            move || scan_client.get_head_block(),
        )
        .await?
        .saturating_sub(self.confirmations);

        let range = compute_range(last_scanned, head, self.lookback);
        tracker.enter(RunState::RangeComputed);

        let Some(range) = range else {
            info!(
                direction = %direction.label,
                chain = %chain,
                head,
                last_scanned = ?last_scanned,
                "Up to date"
            );
            tracker.enter(RunState::UpToDate);
            return Ok(RunReport {
                direction: direction.label.clone(),
                state: RunState::UpToDate,
                range: None,
                events: 0,
                fetch: FetchStats::default(),
                relay: RelayReport::default(),
            });
        };

        info!(
            direction = %direction.label,
            chain = %chain,
            from_block = range.from,
            to_block = range.to,
            "Scanning block range"
        );

        tracker.enter(RunState::Fetching);
        let (logs, fetch) = self
            .fetcher
            .fetch_all(
                direction.scan_client.as_ref(),
                direction.scan_contract,
                direction.kind.signature(),
                range,
            )
            .await?;

        tracker.enter(RunState::Relaying);
        let engine = RelayEngine::new(&direction.target, self.signer.as_ref())
            .with_retry(self.fetcher.config().retry.clone())
            .dry_run(self.dry_run);
        let events = engine.prepare(direction.kind, &logs)?;
        if !events.is_empty() {
            metrics::EVENTS_DETECTED
                .with_label_values(&[chain, direction.kind.as_str()])
                .inc_by(events.len() as f64);
        }
        let relay = engine.relay(&events).await?;

        self.cursor_store.advance(chain, range.to).await?;
        metrics::record_scanned_block(chain, range.to);
        tracker.enter(RunState::CursorAdvanced);

        if !fetch.skipped.is_empty() {
            warn!(
                direction = %direction.label,
                skipped = ?fetch.skipped,
                "Run completed with skipped block windows"
            );
        }
        info!(
            direction = %direction.label,
            chain = %chain,
            to_block = range.to,
            events = events.len(),
            submitted = relay.submitted.len(),
            failed = relay.failed.len(),
            windows = fetch.windows,
            "Run complete"
        );

        Ok(RunReport {
            direction: direction.label.clone(),
            state: RunState::CursorAdvanced,
            range: Some(range),
            events: events.len(),
            fetch,
            relay,
        })
    }
}
