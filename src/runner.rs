//! Batch runner: one ledger document per batch.
//!
//! A batch that cannot be opened, lacks required columns, or fails to save
//! is reported and skipped; the next batch still runs.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::discovery::discover_batches;
use crate::error::{Error, Result};
use crate::progress::Reporter;
use crate::scheduler::{BatchSummary, RowScheduler};
use crate::sheet::LedgerDocument;

/// Result of one batch.
#[derive(Debug)]
pub struct BatchReport {
    pub path: PathBuf,
    pub outcome: std::result::Result<BatchSummary, Error>,
}

/// Result of a whole run.
#[derive(Debug)]
pub struct RunReport {
    pub batches: Vec<BatchReport>,
    pub elapsed: Duration,
}

impl RunReport {
    /// Rows updated across all successful batches.
    pub fn total_updated(&self) -> usize {
        self.batches
            .iter()
            .filter_map(|b| b.outcome.as_ref().ok())
            .map(|s| s.updated)
            .sum()
    }

    pub fn failed_batches(&self) -> usize {
        self.batches.iter().filter(|b| b.outcome.is_err()).count()
    }
}

/// Drives the scheduler over ledger documents.
pub struct SyncRunner {
    scheduler: RowScheduler,
}

impl SyncRunner {
    pub fn new(scheduler: RowScheduler) -> Self {
        Self { scheduler }
    }

    /// Load, resolve and save one document.
    pub async fn process_batch(&self, path: &Path, reporter: &dyn Reporter) -> Result<BatchSummary> {
        let mut document = LedgerDocument::open(path)?;
        let summary = self.scheduler.run(document.rows_mut(), reporter).await;
        document.save()?;
        Ok(summary)
    }

    /// Discover the ledgers in `dir` and process them. Fails only when the
    /// directory itself cannot be read.
    pub async fn run_dir(&self, dir: &Path, extension: &str, reporter: &dyn Reporter) -> Result<RunReport> {
        let batches = discover_batches(dir, extension)?;
        info!(dir = %dir.display(), batches = batches.len(), "Discovered ledgers");
        Ok(self.run_all(&batches, reporter).await)
    }

    /// Process every batch in order. Stops starting new batches once the
    /// reporter signals cancellation.
    pub async fn run_all(&self, paths: &[PathBuf], reporter: &dyn Reporter) -> RunReport {
        let started = Instant::now();
        let mut batches = Vec::with_capacity(paths.len());

        for path in paths {
            if reporter.is_cancelled() {
                info!(file = %path.display(), "Cancelled; skipping remaining batches");
                break;
            }

            eprintln!("\nProcessing: {}", path.display());
            let span = info_span!("batch", run_id = %Uuid::new_v4(), file = %path.display());
            let outcome = self.process_batch(path, reporter).instrument(span).await;
            eprintln!();

            match &outcome {
                Ok(summary) => {
                    eprintln!(
                        "Done. Updated '{}' with {} new delivery dates.",
                        path.display(),
                        summary.updated
                    );
                    if summary.failed > 0 {
                        eprintln!("   {} lookup(s) failed; see ERROR entries in the sheet.", summary.failed);
                    }
                    if summary.cancelled {
                        eprintln!("   Cancelled after {} of {} lookups.", summary.completed, summary.eligible);
                    }
                    info!(file = %path.display(), ?summary, "Batch complete");
                }
                Err(e) => {
                    eprintln!("Error processing {}: {e}", path.display());
                    error!(file = %path.display(), error = %e, "Batch failed");
                }
            }

            batches.push(BatchReport {
                path: path.clone(),
                outcome,
            });
        }

        RunReport {
            batches,
            elapsed: started.elapsed(),
        }
    }
}
