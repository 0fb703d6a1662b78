//! Wrap Relayer
//!
//! Runs one scan-and-relay pass per selected direction and exits. With
//! `--watch`, repeats on an interval until SIGINT/SIGTERM, always finishing the
//! pass in progress first.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use eyre::WrapErr;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use wrap_relayer::config::{ChainConfig, Config};
use wrap_relayer::server::{self, RelayerStats, SharedStats};
use wrap_relayer::{
    ChainClient, ChunkedLogFetcher, CursorStore, DefaultErrorClassifier, EvmChainClient,
    FileCursorStore, GasSettings, LocalSigner, MemoryCursorStore, RelayDirection, RelayTarget,
    ScanOrchestrator, TransferKind,
};

/// Which directions to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Selection {
    /// Deposits on the source chain become `wrap` calls on the destination
    Source,
    /// Unwraps on the destination chain become `withdraw` calls on the source
    Destination,
    /// Both directions concurrently
    All,
}

#[derive(Debug, Parser)]
#[command(name = "wrap-relayer", version, about = "Cross-chain Deposit/Unwrap relayer")]
struct Cli {
    #[arg(value_enum, default_value_t = Selection::All)]
    chain: Selection,

    /// Keep running, one pass every POLL_INTERVAL_MS
    #[arg(long)]
    watch: bool,

    /// Log mirror transactions without sending them or writing the cursor file
    #[arg(long)]
    dry_run: bool,

    /// Path to a .env file
    #[arg(long, default_value = ".env")]
    env_file: String,
}

fn main() -> ExitCode {
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error handler: {e}");
    }

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(async_main(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = ?e, "Relayer failed");
            eprintln!("{e:?}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every run was clean
async fn async_main(cli: Cli) -> eyre::Result<bool> {
    init_logging();

    info!(chain = ?cli.chain, watch = cli.watch, dry_run = cli.dry_run, "Starting Wrap Relayer");

    let config = Config::load_from_file(&cli.env_file)?;
    info!(
        source = %config.source.name,
        source_rpc = %config.source.rpc_url,
        destination = %config.destination.name,
        destination_rpc = %config.destination.rpc_url,
        cursor = %config.cursor_path.display(),
        "Configuration loaded"
    );

    let classifier = Arc::new(DefaultErrorClassifier::with_extra_patterns(
        &config.rate_limit_patterns,
    ));
    let source: Arc<dyn ChainClient> = Arc::new(chain_client(&config.source, classifier.clone())?);
    let destination: Arc<dyn ChainClient> =
        Arc::new(chain_client(&config.destination, classifier)?);

    let directions = build_directions(&config, cli.chain, source, destination);

    let file_store = FileCursorStore::new(&config.cursor_path);
    let cursor_store: Arc<dyn CursorStore> = if cli.dry_run {
        let seeded = file_store
            .load()
            .await
            .wrap_err("Failed to read cursor file")?;
        info!(cursor = ?seeded, "Dry run: cursor changes stay in memory");
        Arc::new(MemoryCursorStore::seeded(seeded))
    } else {
        Arc::new(file_store)
    };

    let signer = Arc::new(LocalSigner::from_private_key(&config.private_key)?);
    let fetcher = ChunkedLogFetcher::new(config.fetch.clone())?;
    let orchestrator = ScanOrchestrator::new(cursor_store, fetcher, signer)
        .with_lookback(config.lookback)
        .with_confirmations(config.confirmations)
        .dry_run(cli.dry_run);

    let stats: SharedStats = Arc::new(RwLock::new(RelayerStats::default()));

    if !cli.watch {
        return Ok(run_pass(&orchestrator, &directions, &stats).await);
    }

    if let Some(port) = config.metrics_port {
        let stats = stats.clone();
        tokio::spawn(async move {
            if let Err(e) = server::start_server(port, stats).await {
                error!(error = %e, "Health server stopped");
            }
        });
    }

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut all_clean = true;
    loop {
        all_clean &= run_pass(&orchestrator, &directions, &stats).await;

        tokio::select! {
            _ = tokio::time::sleep(config.poll_interval) => {}
            _ = shutdown_rx.changed() => break,
        }
    }

    info!("Wrap Relayer stopped");
    Ok(all_clean)
}

fn chain_client(
    chain: &ChainConfig,
    classifier: Arc<DefaultErrorClassifier>,
) -> eyre::Result<EvmChainClient> {
    EvmChainClient::new(&chain.name, &chain.rpc_url, chain.chain_id, classifier)
}

fn build_directions(
    config: &Config,
    selection: Selection,
    source: Arc<dyn ChainClient>,
    destination: Arc<dyn ChainClient>,
) -> Vec<RelayDirection> {
    let deposits = || {
        direction(
            TransferKind::Deposit,
            source.clone(),
            config.source.bridge_address,
            destination.clone(),
            config.destination.bridge_address,
            config.wrap_gas,
        )
    };
    let unwraps = || {
        direction(
            TransferKind::Unwrap,
            destination.clone(),
            config.destination.bridge_address,
            source.clone(),
            config.source.bridge_address,
            config.withdraw_gas,
        )
    };

    match selection {
        Selection::Source => vec![deposits()],
        Selection::Destination => vec![unwraps()],
        Selection::All => vec![deposits(), unwraps()],
    }
}

fn direction(
    kind: TransferKind,
    scan_client: Arc<dyn ChainClient>,
    scan_contract: alloy::primitives::Address,
    target_client: Arc<dyn ChainClient>,
    target_contract: alloy::primitives::Address,
    gas: GasSettings,
) -> RelayDirection {
    RelayDirection {
        label: format!("{}->{}", scan_client.name(), target_client.name()),
        kind,
        scan_client,
        scan_contract,
        target: RelayTarget {
            client: target_client,
            contract: target_contract,
            function: kind.mirror(),
            gas,
        },
    }
}

/// One pass over every direction; true when all runs were clean
async fn run_pass(
    orchestrator: &ScanOrchestrator,
    directions: &[RelayDirection],
    stats: &SharedStats,
) -> bool {
    let results = orchestrator.run_all(directions).await;

    let mut clean = true;
    let mut stats = stats.write().await;
    for (direction, result) in directions.iter().zip(&results) {
        stats.record(direction.cursor_key(), result);
        match result {
            Ok(report) if report.is_clean() => {}
            Ok(report) => {
                clean = false;
                warn!(
                    direction = %report.direction,
                    failed = report.relay.failed.len(),
                    skipped = report.fetch.skipped.len(),
                    "Run finished with failures"
                );
            }
            // Already logged by the orchestrator
            Err(_) => clean = false,
        }
    }
    clean
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,wrap_relayer=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, finishing current pass");
        }
        _ = terminate => {
            info!("Received SIGTERM, finishing current pass");
        }
    }
}
