//! Row task scheduler.
//!
//! Fans out one lookup per eligible row, at most `concurrency` in flight,
//! and applies outcomes in completion order. Tasks only return
//! `(position, outcome)`; the collector alone writes rows, and each position
//! is submitted once, so rows need no locking.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::auth::{CarrierSession, SessionSet};
use crate::carriers::{Carrier, CarrierFamily, DeliveryOutcome};
use crate::ledger::{ShipmentRow, diagnostic};
use crate::progress::Reporter;
use crate::router::{CarrierRouter, Route};

/// How often a completion wait re-checks the cancel signal.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Counters for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total_rows: usize,
    /// Rows a lookup was scheduled for.
    pub eligible: usize,
    /// Lookups observed as finished.
    pub completed: usize,
    /// Rows whose delivery field was written (`delivered + failed`).
    pub updated: usize,
    pub delivered: usize,
    pub failed: usize,
    pub not_delivered: usize,
    /// Already filled, or missing carrier or tracking id.
    pub skipped: usize,
    /// No adapter or no session for the carrier.
    pub unsupported: usize,
    pub cancelled: bool,
}

/// One scheduled lookup.
struct Lookup {
    position: usize,
    carrier: Arc<dyn Carrier>,
    session: Arc<CarrierSession>,
    tracking_id: String,
}

impl Lookup {
    /// Run the adapter, converting a panic into an error outcome.
    async fn run(self) -> (usize, CarrierFamily, DeliveryOutcome) {
        let family = self.carrier.family();
        let outcome = AssertUnwindSafe(self.carrier.resolve(&self.session, &self.tracking_id))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                DeliveryOutcome::Error(format!("adapter panicked: {reason}"))
            });
        (self.position, family, outcome)
    }
}

/// Schedules lookups for a batch of rows.
pub struct RowScheduler {
    router: Arc<CarrierRouter>,
    sessions: Arc<SessionSet>,
    concurrency: usize,
}

impl RowScheduler {
    pub fn new(router: Arc<CarrierRouter>, sessions: Arc<SessionSet>, concurrency: usize) -> Self {
        Self {
            router,
            sessions,
            concurrency: concurrency.max(1),
        }
    }

    /// Decide which rows need a lookup.
    fn plan(&self, rows: &[ShipmentRow], summary: &mut BatchSummary) -> VecDeque<Lookup> {
        let mut queue = VecDeque::new();

        for (position, row) in rows.iter().enumerate() {
            if !row.is_pending() {
                summary.skipped += 1;
                continue;
            }

            let carrier = match self.router.route(&row.carrier_code) {
                Route::Adapter(carrier) => carrier,
                Route::Unsupported => {
                    debug!(row = row.index, carrier = %row.carrier_code, "No adapter for carrier");
                    summary.unsupported += 1;
                    continue;
                }
            };

            let Some(session) = self.sessions.get(carrier.family()) else {
                debug!(row = row.index, family = %carrier.family(), "No session for carrier family");
                summary.unsupported += 1;
                continue;
            };

            queue.push_back(Lookup {
                position,
                carrier,
                session,
                tracking_id: row.tracking_id.clone(),
            });
        }

        queue
    }

    /// Resolve every eligible row and write outcomes back.
    ///
    /// Stops submitting and waiting once `reporter` reports cancellation;
    /// lookups still in flight are abandoned and their rows left untouched.
    pub async fn run(&self, rows: &mut [ShipmentRow], reporter: &dyn Reporter) -> BatchSummary {
        let mut summary = BatchSummary {
            total_rows: rows.len(),
            ..BatchSummary::default()
        };

        let mut queue = self.plan(rows, &mut summary);
        let total = queue.len();
        summary.eligible = total;
        info!(
            rows = rows.len(),
            eligible = total,
            concurrency = self.concurrency,
            "Starting lookups"
        );

        let mut in_flight = JoinSet::new();

        loop {
            while in_flight.len() < self.concurrency && !queue.is_empty() {
                if reporter.is_cancelled() {
                    break;
                }
                if let Some(lookup) = queue.pop_front() {
                    in_flight.spawn(lookup.run());
                }
            }

            if reporter.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            if in_flight.is_empty() {
                break;
            }

            let joined = tokio::select! {
                joined = in_flight.join_next() => joined,
                _ = tokio::time::sleep(CANCEL_POLL_INTERVAL) => continue,
            };

            match joined {
                Some(Ok((position, family, outcome))) => {
                    apply(&mut rows[position], family, outcome, &mut summary);
                }
                Some(Err(e)) => {
                    // Panics are caught inside the task; this is an abort.
                    warn!(error = %e, "Lookup task did not complete");
                }
                None => break,
            }

            summary.completed += 1;
            reporter.on_progress(summary.completed, total);
        }

        if summary.cancelled {
            warn!(
                abandoned = in_flight.len() + queue.len(),
                completed = summary.completed,
                "Batch cancelled"
            );
            in_flight.abort_all();
        }

        info!(
            updated = summary.updated,
            delivered = summary.delivered,
            failed = summary.failed,
            "Lookups finished"
        );
        summary
    }
}

/// Write one outcome into its row.
fn apply(row: &mut ShipmentRow, family: CarrierFamily, outcome: DeliveryOutcome, summary: &mut BatchSummary) {
    match outcome {
        DeliveryOutcome::Delivered(date) => {
            debug!(row = row.index, %date, "Delivered");
            row.delivered_date = date;
            summary.delivered += 1;
            summary.updated += 1;
        }
        DeliveryOutcome::Error(message) => {
            warn!(row = row.index, tracking_id = %row.tracking_id, %family, error = %message, "Lookup failed");
            row.delivered_date = diagnostic(family.as_str(), &message);
            summary.failed += 1;
            summary.updated += 1;
        }
        DeliveryOutcome::NotYetDelivered => summary.not_delivered += 1,
        DeliveryOutcome::Unsupported => summary.unsupported += 1,
    }
}
