//! Row selection by region name or calendar date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::date::DateNormalizer;
use crate::error::{PipelineError, Result};
use crate::table::CsvTable;

/// How a region needle is compared against a cell.
///
/// The county feeds are matched by substring (`"Alleg"` finds
/// `"Allegheny County"`), the statewide row by exact name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Contains,
    Exact,
}

impl MatchMode {
    pub fn matches(self, cell: &str, needle: &str) -> bool {
        match self {
            MatchMode::Contains => cell.contains(needle),
            MatchMode::Exact => cell == needle,
        }
    }
}

/// Keeps the rows whose cell at `column` matches `needle`. Case-sensitive.
pub fn filter(table: &CsvTable, column: usize, needle: &str, mode: MatchMode) -> Result<CsvTable> {
    retain(table, column, |cell| mode.matches(cell, needle))
}

/// Drops the rows whose cell at `column` matches `needle`.
pub fn exclude(table: &CsvTable, column: usize, needle: &str, mode: MatchMode) -> Result<CsvTable> {
    retain(table, column, |cell| !mode.matches(cell, needle))
}

/// Drops the rows whose cell at `column` is blank.
pub fn filter_present(table: &CsvTable, column: usize) -> Result<CsvTable> {
    retain(table, column, |cell| !cell.trim().is_empty())
}

/// Keeps the rows dated `date`, comparing normalized tokens so that
/// `1/5/2022` and `2022-01-05` are the same day.
pub fn filter_date(
    table: &CsvTable,
    column: usize,
    date: NaiveDate,
    normalizer: &dyn DateNormalizer,
) -> Result<CsvTable> {
    table.check_column(column)?;
    let mut keep = Vec::new();
    for row in table.rows() {
        let raw = row.get(column).unwrap_or_default();
        let day = normalizer
            .to_date(raw)
            .ok_or_else(|| PipelineError::UnsortableKey {
                column: table.column_name(column),
                row: row.source(),
                value: raw.to_string(),
            })?;
        if day == date {
            keep.push(row.index());
        }
    }
    Ok(table.pick_rows(keep))
}

fn retain<P>(table: &CsvTable, column: usize, mut keep: P) -> Result<CsvTable>
where
    P: FnMut(&str) -> bool,
{
    table.check_column(column)?;
    let rows = table
        .rows()
        .filter(|row| keep(row.get(column).unwrap_or_default()))
        .map(|row| row.index())
        .collect::<Vec<_>>();
    Ok(table.pick_rows(rows))
}
