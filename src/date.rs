//! Date token normalization.
//!
//! The feeds mix `MM/DD/YYYY`, `YYYY-MM-DD` and ISO date-times. Everything
//! downstream compares the canonical `YYYY-MM-DD` form, which sorts lexically
//! in calendar order.

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{PipelineError, Result};
use crate::table::CsvTable;

pub const CANONICAL_FORMAT: &str = "%Y-%m-%d";

/// Rewrites a raw date token into its canonical form.
pub trait DateNormalizer {
    /// Returns `None` when the token is not a date this normalizer knows.
    fn normalize(&self, raw: &str) -> Option<String>;

    fn to_date(&self, raw: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.normalize(raw)?, CANONICAL_FORMAT).ok()
    }
}

/// Tries a list of `chrono` formats in order, first as plain dates and then as
/// date-times (keeping only the date part).
#[derive(Debug, Clone)]
pub struct FormatNormalizer {
    formats: Vec<String>,
}

impl FormatNormalizer {
    pub fn new(formats: Vec<String>) -> Self {
        Self { formats }
    }
}

impl Default for FormatNormalizer {
    fn default() -> Self {
        Self::new(default_formats())
    }
}

pub fn default_formats() -> Vec<String> {
    ["%m/%d/%Y", "%Y-%m-%d", "%Y-%m-%dT%H:%M:%S%.f", "%Y/%m/%d"]
        .iter()
        .map(|f| f.to_string())
        .collect()
}

impl DateNormalizer for FormatNormalizer {
    fn normalize(&self, raw: &str) -> Option<String> {
        let raw = raw.trim();
        self.formats
            .iter()
            .find_map(|f| {
                NaiveDate::parse_from_str(raw, f)
                    .ok()
                    .or_else(|| NaiveDateTime::parse_from_str(raw, f).ok().map(|dt| dt.date()))
            })
            .map(|d| d.format(CANONICAL_FORMAT).to_string())
    }
}

/// Returns a copy of `table` with every cell of `column` in canonical form.
///
/// A token the normalizer cannot read is an [`PipelineError::UnsortableKey`],
/// since the column is about to be used as a sort or join key.
pub fn normalize_column(
    table: &CsvTable,
    column: usize,
    normalizer: &dyn DateNormalizer,
) -> Result<CsvTable> {
    let name = table.column_name(column);
    table.map_column(column, |source, raw| {
        normalizer
            .normalize(raw)
            .ok_or_else(|| PipelineError::UnsortableKey {
                column: name.clone(),
                row: source,
                value: raw.to_string(),
            })
    })
}

/// Latest calendar date found in `column`, or `None` for an empty table.
pub fn latest_date(
    table: &CsvTable,
    column: usize,
    normalizer: &dyn DateNormalizer,
) -> Result<Option<NaiveDate>> {
    table.check_column(column)?;
    let mut latest = None;
    for row in table.rows() {
        let raw = row.get(column).unwrap_or_default();
        let date = normalizer
            .to_date(raw)
            .ok_or_else(|| PipelineError::UnsortableKey {
                column: table.column_name(column),
                row: row.source(),
                value: raw.to_string(),
            })?;
        latest = latest.max(Some(date));
    }
    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::table;

    #[test]
    fn test_normalize_us_format() {
        let n = FormatNormalizer::default();
        assert_eq!(n.normalize("9/1/2021").as_deref(), Some("2021-09-01"));
        assert_eq!(n.normalize("10/01/2021").as_deref(), Some("2021-10-01"));
    }

    #[test]
    fn test_normalize_canonical_and_datetime() {
        let n = FormatNormalizer::default();
        assert_eq!(n.normalize("2021-09-01").as_deref(), Some("2021-09-01"));
        assert_eq!(
            n.normalize("2021-09-01T00:00:00.000").as_deref(),
            Some("2021-09-01")
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        let n = FormatNormalizer::default();
        assert_eq!(n.normalize("yesterday"), None);
        assert_eq!(n.normalize(""), None);
    }

    #[test]
    fn test_normalize_column_reports_row() {
        let n = FormatNormalizer::default();
        let t = table(&["d"], &[&["soon"], &["9/1/2021"], &["soon"]]);
        // only the last row survives, but the error names its feed position
        let err = normalize_column(&t.tail(1), 0, &n).unwrap_err();
        assert_eq!(
            err,
            PipelineError::UnsortableKey {
                column: "d".to_string(),
                row: 2,
                value: "soon".to_string()
            }
        );
    }

    #[test]
    fn test_latest_date() {
        let n = FormatNormalizer::default();
        let t = table(&["d"], &[&["9/1/2021"], &["10/1/2021"], &["2/1/2021"]]);
        assert_eq!(
            latest_date(&t, 0, &n).unwrap(),
            NaiveDate::from_ymd_opt(2021, 10, 1)
        );
        assert_eq!(latest_date(&table(&["d"], &[]), 0, &n).unwrap(), None);
    }
}
