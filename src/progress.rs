//! Progress reporting and cooperative cancellation.
//!
//! The scheduler calls [`Reporter::on_progress`] after every completed lookup
//! and polls [`Reporter::is_cancelled`] before each submission and each
//! completion wait. Cancellation never interrupts a lookup mid-flight.

use std::io::{BufRead, IsTerminal, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

/// Width of the console progress bar, in cells.
const BAR_WIDTH: usize = 40;

/// Observer of batch progress and source of the cancel signal.
pub trait Reporter: Send + Sync {
    /// Called after each completed lookup; `completed` never decreases.
    fn on_progress(&self, completed: usize, total: usize);

    /// Whether remaining work should be abandoned.
    fn is_cancelled(&self) -> bool;
}

/// Shared cancel signal. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reporter that renders nothing.
#[derive(Debug, Clone, Default)]
pub struct NullReporter {
    cancel: CancelFlag,
}

impl NullReporter {
    pub fn new(cancel: CancelFlag) -> Self {
        Self { cancel }
    }
}

impl Reporter for NullReporter {
    fn on_progress(&self, _completed: usize, _total: usize) {}

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Renders `Progress: |████----| 42.0% (n/total)` on stderr.
#[derive(Debug, Clone)]
pub struct ConsoleReporter {
    cancel: CancelFlag,
}

impl ConsoleReporter {
    pub fn new(cancel: CancelFlag) -> Self {
        Self { cancel }
    }
}

impl Reporter for ConsoleReporter {
    fn on_progress(&self, completed: usize, total: usize) {
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r{}", render_bar(completed, total, BAR_WIDTH));
        let _ = stderr.flush();
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Format a progress line. An empty batch renders as complete.
pub fn render_bar(completed: usize, total: usize, width: usize) -> String {
    let (filled, percent) = if total == 0 {
        (width, 100.0)
    } else {
        let completed = completed.min(total);
        (
            width * completed / total,
            100.0 * completed as f64 / total as f64,
        )
    };
    format!(
        "Progress: |{}{}| {percent:.1}% ({completed}/{total})",
        "█".repeat(filled),
        "-".repeat(width - filled),
    )
}

/// Raise `flag` on Ctrl-C, or when `q` is entered on an interactive stdin.
pub fn spawn_cancel_listener(flag: CancelFlag) -> tokio::task::JoinHandle<()> {
    if std::io::stdin().is_terminal() {
        let stdin_flag = flag.clone();
        // Plain thread: a blocking stdin read would otherwise hold up runtime shutdown.
        let spawned = std::thread::Builder::new()
            .name("cancel-key".into())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    match line {
                        Ok(line) if line.trim().eq_ignore_ascii_case("q") => {
                            info!("Cancel requested from keyboard");
                            stdin_flag.cancel();
                            return;
                        }
                        Ok(_) => {}
                        Err(_) => return,
                    }
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "Could not start keyboard cancel listener");
        }
    }

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Cancel requested by Ctrl-C");
                flag.cancel();
            }
            Err(e) => warn!(error = %e, "Could not listen for Ctrl-C"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_tracks_completion() {
        assert_eq!(render_bar(0, 4, 8), "Progress: |--------| 0.0% (0/4)");
        assert_eq!(render_bar(1, 4, 8), "Progress: |██------| 25.0% (1/4)");
        assert_eq!(render_bar(4, 4, 8), "Progress: |████████| 100.0% (4/4)");
    }

    #[test]
    fn empty_batch_renders_complete() {
        assert_eq!(render_bar(0, 0, 4), "Progress: |████| 100.0% (0/0)");
    }

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let reporter = NullReporter::new(flag.clone());
        assert!(!reporter.is_cancelled());
        flag.cancel();
        assert!(reporter.is_cancelled());
    }
}
