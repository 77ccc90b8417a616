//! Consolidation engine daemon entry point.
//!
//! Loads the connection file, resolves settings, wires three log
//! sinks plus SIGINT/SIGTERM-driven cancellation, then loops
//! indefinitely: wait for the allowed sync window, run one
//! consolidation cycle across every branch, sleep, repeat.

use clap::Parser;
use dbsync::config::connections::{load_connections, partition_target};
use dbsync::config::{in_allowed_sync_window, parse_hhmm, SyncSettings};
use dbsync::engine::cycle::run_cycle;
use dbsync::engine::shutdown::install_signal_handlers;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dbsync", about = "Incremental multi-branch SQL Server consolidation engine")]
struct Cli {
    /// Path to the connection file.
    #[arg(long, env = "DBSYNC_CONNECTION_FILE", default_value = "connection_strings.txt")]
    connection_file: PathBuf,

    /// Directory log files are written into.
    #[arg(long, env = "DBSYNC_LOG_DIR", default_value = "log")]
    log_dir: PathBuf,

    /// Path to the JSON table catalog (tables_to_sync, sync_methods, batch_size_map).
    #[arg(long, env = "DBSYNC_CONFIG_FILE", default_value = "dbsync.json")]
    config_file: PathBuf,

    /// Run exactly one consolidation cycle and exit, instead of looping forever.
    #[arg(long)]
    once: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guards = match init_logging(&cli.log_dir) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("failed to initialize logging in {:?}: {e}", cli.log_dir);
            return ExitCode::from(dbsync::Error::Io(e).exit_code());
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal startup error");
            ExitCode::from(e.exit_code())
        }
    }
}

/// Non-blocking file sinks for the general, success-only, and
/// error-only log streams, plus a console layer. The returned guards
/// must stay alive for the process lifetime to flush buffered writes.
fn init_logging(
    log_dir: &std::path::Path,
) -> std::io::Result<(tracing_appender::non_blocking::WorkerGuard, tracing_appender::non_blocking::WorkerGuard, tracing_appender::non_blocking::WorkerGuard)> {
    std::fs::create_dir_all(log_dir)?;

    let (general_writer, general_guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, "sync.log"));
    let (success_writer, success_guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, "success.log"));
    let (error_writer, error_guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, "errors.log"));

    let env_filter = || {
        if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new("info")
        }
    };

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_writer(general_writer).with_ansi(false).with_filter(env_filter()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(success_writer)
                .with_ansi(false)
                .with_filter(tracing_subscriber::filter::Targets::new().with_target("success", tracing::Level::TRACE)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(error_writer)
                .with_ansi(false)
                .with_filter(tracing_subscriber::filter::LevelFilter::ERROR),
        )
        .init();

    Ok((general_guard, success_guard, error_guard))
}

async fn run(cli: Cli) -> dbsync::Result<()> {
    let cancel = CancellationToken::new();
    install_signal_handlers(cancel.clone());

    let settings = Arc::new(SyncSettings::default().merge_file(&cli.config_file)?.from_env());
    if settings.tables_to_sync.is_empty() {
        tracing::warn!(path = %cli.config_file.display(), "table catalog is empty; each cycle will have nothing to sync");
    }
    let allowed_start = parse_hhmm(&settings.allowed_start_time)?;
    let allowed_end = parse_hhmm(&settings.allowed_end_time)?;

    loop {
        if cancel.is_cancelled() {
            tracing::info!("shutdown requested; exiting main loop");
            return Ok(());
        }

        let configs = load_connections(&cli.connection_file)?;
        let (target_cfg, sources) = partition_target(&cli.connection_file, configs)?;

        let now = chrono::Local::now().naive_local().time();
        if !in_allowed_sync_window(allowed_start, allowed_end, now) {
            tracing::info!(
                start = settings.allowed_start_time,
                end = settings.allowed_end_time,
                "outside allowed sync window; waiting"
            );
            if sleep_or_cancel(settings.allowed_window_check_interval, &cancel).await {
                return Ok(());
            }
            continue;
        }

        let outcomes = run_cycle(&target_cfg, &sources, Arc::clone(&settings), cancel.clone()).await;
        tracing::info!(branches = outcomes.len(), "cycle complete");

        if cli.once {
            return Ok(());
        }

        tracing::info!(seconds = settings.run_interval.as_secs(), "waiting before next cycle");
        if sleep_or_cancel(settings.run_interval, &cancel).await {
            return Ok(());
        }
    }
}

/// Sleep for `duration`, waking early on cancellation. Returns `true`
/// if cancellation fired during the sleep.
async fn sleep_or_cancel(duration: std::time::Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => false,
        () = cancel.cancelled() => true,
    }
}
