//! Column projection by header name.

use crate::error::Result;
use crate::table::CsvTable;

/// Returns a new table with the named columns, in the order given.
///
/// Row count and order are unchanged. Each pipeline projects a different set
/// of columns out of the same feed tables.
pub fn project(table: &CsvTable, names: &[&str]) -> Result<CsvTable> {
    let indices = table.columns(names)?;
    table.select(&indices)
}
