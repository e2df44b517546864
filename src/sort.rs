//! Stable row sorting on a single key column.

use std::cmp::Ordering;

use crate::aggregate::parse_number;
use crate::date::DateNormalizer;
use crate::error::{PipelineError, Result};
use crate::table::CsvTable;

/// Turns a raw cell into a comparable key.
#[derive(Clone, Copy)]
pub enum KeyTransform<'a> {
    Lexical,
    Numeric,
    /// Compare canonical `YYYY-MM-DD` tokens, never the raw literal.
    Date(&'a dyn DateNormalizer),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, PartialEq, PartialOrd)]
enum Key {
    Number(f64),
    Text(String),
}

impl KeyTransform<'_> {
    fn key(&self, raw: &str) -> Option<Key> {
        match self {
            KeyTransform::Lexical => Some(Key::Text(raw.to_string())),
            KeyTransform::Numeric => parse_number(raw).map(Key::Number),
            KeyTransform::Date(normalizer) => normalizer.normalize(raw).map(Key::Text),
        }
    }
}

impl Key {
    fn compare(&self, other: &Key) -> Ordering {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) => a.total_cmp(b),
            (Key::Text(a), Key::Text(b)) => a.cmp(b),
            // one transform yields one key kind
            _ => Ordering::Equal,
        }
    }
}

/// Sorts rows by `column`. Rows with equal keys keep their source order, in
/// either direction.
///
/// # Errors
///
/// [`PipelineError::UnsortableKey`] for the first cell the transform rejects.
pub fn sort_by(
    table: &CsvTable,
    column: usize,
    transform: KeyTransform<'_>,
    order: Order,
) -> Result<CsvTable> {
    table.check_column(column)?;

    let mut keyed = Vec::with_capacity(table.len());
    for row in table.rows() {
        let raw = row.get(column).unwrap_or_default();
        let key = transform
            .key(raw)
            .ok_or_else(|| PipelineError::UnsortableKey {
                column: table.column_name(column),
                row: row.source(),
                value: raw.to_string(),
            })?;
        keyed.push((key, row.index()));
    }

    // slice::sort_by is stable; reversing the comparator keeps ties in place.
    keyed.sort_by(|(a, _), (b, _)| match order {
        Order::Ascending => a.compare(b),
        Order::Descending => b.compare(a),
    });

    Ok(table.pick_rows(keyed.into_iter().map(|(_, i)| i)))
}
