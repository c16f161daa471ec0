//! Shipment ledger rows.

use serde::{Deserialize, Serialize};

/// Prefix written into the delivery field when a lookup failed.
pub const ERROR_PREFIX: &str = "ERROR";

/// A single ledger row awaiting (or holding) a delivery date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentRow {
    /// Stable 0-based position assigned at load time.
    pub index: usize,
    /// Short uppercase carrier code, e.g. `FEP`.
    pub carrier_code: String,
    /// Carrier-specific tracking identifier (PRO number).
    pub tracking_id: String,
    /// `YYYY-MM-DD`, a diagnostic string, or empty while pending.
    pub delivered_date: String,
}

impl ShipmentRow {
    pub fn new(index: usize, carrier_code: &str, tracking_id: &str) -> Self {
        Self {
            index,
            carrier_code: carrier_code.trim().to_uppercase(),
            tracking_id: tracking_id.trim().to_string(),
            delivered_date: String::new(),
        }
    }

    /// Builder: pre-fill the delivery field.
    pub fn with_delivered(mut self, value: &str) -> Self {
        self.delivered_date = value.to_string();
        self
    }

    /// Whether the row still needs a lookup. Any non-empty delivery value,
    /// whitespace included, marks the row as filled.
    pub fn is_pending(&self) -> bool {
        self.delivered_date.is_empty()
            && !self.carrier_code.is_empty()
            && !self.tracking_id.is_empty()
    }

    /// Whether the delivery field holds a lookup diagnostic rather than a date.
    pub fn has_error(&self) -> bool {
        self.delivered_date.starts_with(ERROR_PREFIX)
    }
}

/// Format the row-visible diagnostic for a failed lookup.
pub fn diagnostic(family: &str, message: &str) -> String {
    format!("{ERROR_PREFIX} {family}: {message}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_normalizes_codes() {
        let row = ShipmentRow::new(0, "  fep ", " 123 ");
        assert_eq!(row.carrier_code, "FEP");
        assert_eq!(row.tracking_id, "123");
        assert!(row.is_pending());
    }

    #[test]
    fn filled_or_incomplete_rows_are_not_pending() {
        assert!(!ShipmentRow::new(0, "FEP", "1").with_delivered("2024-01-01").is_pending());
        assert!(!ShipmentRow::new(1, "", "1").is_pending());
        assert!(!ShipmentRow::new(2, "FEP", "").is_pending());
    }

    #[test]
    fn whitespace_delivery_value_is_filled() {
        assert!(!ShipmentRow::new(0, "FEP", "1").with_delivered(" ").is_pending());
    }

    #[test]
    fn diagnostics_are_distinguishable_from_dates() {
        let row = ShipmentRow::new(0, "DUE", "9").with_delivered(&diagnostic("pyle", "HTTP 500"));
        assert_eq!(row.delivered_date, "ERROR pyle: HTTP 500");
        assert!(row.has_error());
        assert!(!ShipmentRow::new(1, "DUE", "9").with_delivered("2024-05-01").has_error());
    }
}
