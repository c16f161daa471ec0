//! delivery-sync: fills missing delivery dates in shipment ledgers from
//! carrier tracking APIs.

pub mod auth;
pub mod carriers;
pub mod config;
pub mod discovery;
pub mod error;
pub mod ledger;
pub mod progress;
pub mod router;
pub mod runner;
pub mod scheduler;
pub mod sheet;
pub mod throttle;
