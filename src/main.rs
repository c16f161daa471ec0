use std::path::Path;
use std::sync::Arc;

use delivery_sync::auth::bootstrap_sessions;
use delivery_sync::config::TrackerConfig;
use delivery_sync::progress::{CancelFlag, ConsoleReporter, Reporter, spawn_cancel_listener};
use delivery_sync::router::CarrierRouter;
use delivery_sync::runner::SyncRunner;
use delivery_sync::scheduler::RowScheduler;
use delivery_sync::throttle::RateLimiter;
use tracing_appender::non_blocking::WorkerGuard;

/// Log to stderr, or to a daily file under `log_dir` so the progress bar
/// stays readable. The returned guard flushes the file writer on drop.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "delivery-sync.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    let mut config = TrackerConfig::from_env()?;
    if let Some(dir) = std::env::args().nth(1) {
        config.work_dir = dir.into();
    }

    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("📦 delivery-sync v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Directory: {}", config.work_dir.display());
    eprintln!("   Concurrency: {}", config.concurrency);
    eprintln!("   Press Ctrl-C (or type q + Enter) to stop early.\n");

    let sessions = bootstrap_sessions(&config).await;
    let limiter = Arc::new(RateLimiter::new(config.throttle_interval));
    let router = CarrierRouter::from_config(&config, limiter);
    eprintln!(
        "   Carriers: {} adapter(s), sessions for {}",
        router.adapter_count(),
        sessions
            .families()
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let scheduler = RowScheduler::new(Arc::new(router), Arc::new(sessions), config.concurrency);
    let runner = SyncRunner::new(scheduler);

    let cancel = CancelFlag::new();
    let _cancel_listener = spawn_cancel_listener(cancel.clone());
    let reporter = ConsoleReporter::new(cancel);

    let report = runner
        .run_dir(&config.work_dir, &config.extension, &reporter)
        .await?;
    if report.batches.is_empty() && !reporter.is_cancelled() {
        eprintln!("No .{} files found in {}", config.extension, config.work_dir.display());
        return Ok(());
    }

    eprintln!(
        "\nFinished {} file(s) in {:.1}s: {} row(s) updated, {} file(s) failed.",
        report.batches.len(),
        report.elapsed.as_secs_f64(),
        report.total_updated(),
        report.failed_batches()
    );

    Ok(())
}
