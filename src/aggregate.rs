//! Column totals and day-over-day deltas.

use crate::error::{PipelineError, Result};
use crate::table::CsvTable;

/// What [`sum`] does with a cell that is not a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strictness {
    /// Fail on the first non-numeric cell.
    #[default]
    Strict,
    /// Skip non-numeric cells.
    Permissive,
}

/// Parses a count cell. Blank is `Some(0.0)`: the feeds leave a cell empty
/// when nothing was reported for that day.
pub fn parse_count(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(0.0);
    }
    parse_number(raw)
}

/// Parses a numeric cell, accepting thousands separators. Blank is not a number.
pub fn parse_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let cleaned;
    let raw = if raw.contains(',') {
        cleaned = raw.replace(',', "");
        cleaned.as_str()
    } else {
        raw
    };
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Sums one column.
pub fn sum(table: &CsvTable, column: usize, strictness: Strictness) -> Result<f64> {
    table.check_column(column)?;
    let mut total = 0.0;
    for row in table.rows() {
        let raw = row.get(column).unwrap_or_default();
        match parse_count(raw) {
            Some(v) => total += v,
            None if strictness == Strictness::Permissive => continue,
            None => {
                return Err(PipelineError::NonNumericCell {
                    column: table.column_name(column),
                    row: row.source(),
                    value: raw.to_string(),
                });
            }
        }
    }
    Ok(total)
}

/// `sum(today) - sum(yesterday)` over the same column of two pulls.
pub fn day_over_day(
    today: &CsvTable,
    yesterday: &CsvTable,
    column: usize,
    strictness: Strictness,
) -> Result<f64> {
    Ok(sum(today, column, strictness)? - sum(yesterday, column, strictness)?)
}
