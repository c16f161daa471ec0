//! Ledger documents (`.xlsx`).
//!
//! The first worksheet's header row names the columns. Required, matched
//! case-insensitively after trimming:
//! - `Carrier`
//! - `PRO #` or `PRO Number`
//! - `Delivered Date`
//!
//! A document missing any of them is rejected before rows are read.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use umya_spreadsheet::Spreadsheet;

use crate::error::SheetError;
use crate::ledger::ShipmentRow;

const CARRIER_HEADERS: &[&str] = &["carrier"];
const TRACKING_HEADERS: &[&str] = &["pro #", "pro number"];
const DELIVERED_HEADERS: &[&str] = &["delivered date"];

/// Header row number.
const HEADER_ROW: u32 = 1;

/// 1-based column numbers of the required fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub carrier: u32,
    pub tracking: u32,
    pub delivered: u32,
}

impl ColumnMap {
    /// Locate required columns in a header row. On failure, returns the
    /// display names of the missing columns.
    pub fn from_headers<S: AsRef<str>>(headers: &[S]) -> Result<Self, Vec<&'static str>> {
        let find = |aliases: &[&str]| {
            headers
                .iter()
                .position(|h| {
                    let h = h.as_ref().trim().to_lowercase();
                    aliases.contains(&h.as_str())
                })
                .map(|i| i as u32 + 1)
        };

        let carrier = find(CARRIER_HEADERS);
        let tracking = find(TRACKING_HEADERS);
        let delivered = find(DELIVERED_HEADERS);

        match (carrier, tracking, delivered) {
            (Some(carrier), Some(tracking), Some(delivered)) => Ok(Self {
                carrier,
                tracking,
                delivered,
            }),
            _ => {
                let mut missing = Vec::new();
                if carrier.is_none() {
                    missing.push("Carrier");
                }
                if tracking.is_none() {
                    missing.push("PRO # / PRO Number");
                }
                if delivered.is_none() {
                    missing.push("Delivered Date");
                }
                Err(missing)
            }
        }
    }
}

/// An opened ledger document and the rows read from it.
pub struct LedgerDocument {
    path: PathBuf,
    book: Spreadsheet,
    columns: ColumnMap,
    rows: Vec<ShipmentRow>,
    /// Delivery values as loaded, to write back only what changed.
    loaded: Vec<String>,
}

impl LedgerDocument {
    /// Open a workbook and read its rows.
    pub fn open(path: &Path) -> Result<Self, SheetError> {
        let book = umya_spreadsheet::reader::xlsx::read(path).map_err(|e| SheetError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let sheet = book
            .get_sheet(&0)
            .ok_or_else(|| SheetError::NoWorksheet(path.to_path_buf()))?;

        let headers: Vec<String> = (1..=sheet.get_highest_column())
            .map(|col| sheet.get_value((col, HEADER_ROW)))
            .collect();

        let columns = ColumnMap::from_headers(&headers).map_err(|missing| {
            SheetError::MissingColumns {
                path: path.to_path_buf(),
                missing: missing.join(", "),
            }
        })?;

        let rows: Vec<ShipmentRow> = (HEADER_ROW + 1..=sheet.get_highest_row())
            .enumerate()
            .map(|(index, row)| {
                ShipmentRow::new(
                    index,
                    &sheet.get_value((columns.carrier, row)),
                    &sheet.get_value((columns.tracking, row)),
                )
                .with_delivered(&sheet.get_value((columns.delivered, row)))
            })
            .collect();

        let loaded = rows.iter().map(|r| r.delivered_date.clone()).collect();
        info!(file = %path.display(), rows = rows.len(), "Loaded ledger");

        Ok(Self {
            path: path.to_path_buf(),
            book,
            columns,
            rows,
            loaded,
        })
    }

    pub fn columns(&self) -> ColumnMap {
        self.columns
    }

    pub fn rows(&self) -> &[ShipmentRow] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [ShipmentRow] {
        &mut self.rows
    }

    /// Write changed delivery values back into the workbook and save it.
    /// Returns the number of cells written.
    pub fn save(&mut self) -> Result<usize, SheetError> {
        let sheet = self
            .book
            .get_sheet_mut(&0)
            .ok_or_else(|| SheetError::NoWorksheet(self.path.clone()))?;

        let mut written = 0;
        for (row, loaded) in self.rows.iter().zip(self.loaded.iter_mut()) {
            if row.delivered_date == *loaded {
                continue;
            }
            let sheet_row = HEADER_ROW + 1 + row.index as u32;
            sheet
                .get_cell_mut((self.columns.delivered, sheet_row))
                .set_value(row.delivered_date.clone());
            *loaded = row.delivered_date.clone();
            written += 1;
        }

        umya_spreadsheet::writer::xlsx::write(&self.book, &self.path).map_err(|e| {
            SheetError::Save {
                path: self.path.clone(),
                reason: e.to_string(),
            }
        })?;

        debug!(file = %self.path.display(), written, "Saved ledger");
        Ok(written)
    }
}
