//! In-memory CSV tables shared by every pipeline stage.
//!
//! A [`CsvTable`] is a header plus rows of string cells. Stages never mutate a
//! table; each one borrows its input and returns a new table.

use csv::{ReaderBuilder, WriterBuilder};
use std::collections::HashMap;
use std::ops::Range;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    /// Position of each row in the feed it was first parsed from. Carried
    /// through every derived table so cell errors point back at the feed.
    sources: Vec<usize>,
}

/// Tables compare by content; where the rows came from does not matter.
impl PartialEq for CsvTable {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.rows == other.rows
    }
}

impl Eq for CsvTable {}

/// Borrowed view of one table row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    index: usize,
    source: usize,
    cells: &'a [String],
}

impl<'a> Row<'a> {
    /// Position of the row within its table.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Position of the row in the source feed.
    pub fn source(&self) -> usize {
        self.source
    }

    pub fn get(&self, column: usize) -> Option<&'a str> {
        self.cells.get(column).map(String::as_str)
    }

    pub fn cells(&self) -> &'a [String] {
        self.cells
    }
}

impl CsvTable {
    /// Builds a table, checking that every row is as wide as the header.
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != header.len())
        {
            return Err(PipelineError::MalformedCsv {
                record: i as u64 + 1,
                reason: format!("expected {} cells, found {}", header.len(), row.len()),
            });
        }
        let sources = (0..rows.len()).collect();
        Ok(Self {
            header,
            rows,
            sources,
        })
    }

    /// Parses CSV bytes whose first record is the header.
    ///
    /// # Errors
    ///
    /// [`PipelineError::EmptyInput`] if there is no header row, and
    /// [`PipelineError::MalformedCsv`] if a record's width differs from the
    /// header's or the bytes are not valid CSV.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);

        let header: Vec<String> = rdr
            .headers()
            .map_err(|e| malformed(0, &e))?
            .iter()
            .map(str::to_string)
            .collect();
        if header.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                malformed(line, &e)
            })?;
            if record.len() != header.len() {
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                return Err(PipelineError::MalformedCsv {
                    record: line,
                    reason: format!("expected {} cells, found {}", header.len(), record.len()),
                });
            }
            rows.push(record.iter().map(str::to_string).collect());
        }

        let sources = (0..rows.len()).collect();
        Ok(Self {
            header,
            rows,
            sources,
        })
    }

    /// Serializes the table back to CSV, header first.
    pub fn to_csv_bytes(&self) -> std::result::Result<Vec<u8>, csv::Error> {
        let mut writer = WriterBuilder::new().from_writer(Vec::new());
        writer.write_record(&self.header)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.into_inner().map_err(|e| e.into_error().into())
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn width(&self) -> usize {
        self.header.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        self.rows.get(index).map(|cells| Row {
            index,
            source: self.sources[index],
            cells,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows
            .iter()
            .zip(&self.sources)
            .enumerate()
            .map(|(index, (cells, &source))| Row {
                index,
                source,
                cells,
            })
    }

    /// Header name of `index`, or an empty string when out of range.
    pub fn column_name(&self, index: usize) -> String {
        self.header.get(index).cloned().unwrap_or_default()
    }

    /// Looks up a column index by header name.
    pub fn column(&self, name: &str) -> Result<usize> {
        self.header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| PipelineError::UnknownColumn {
                name: name.to_string(),
            })
    }

    pub fn columns(&self, names: &[&str]) -> Result<Vec<usize>> {
        names.iter().map(|n| self.column(n)).collect()
    }

    pub fn check_column(&self, index: usize) -> Result<()> {
        if index < self.width() {
            Ok(())
        } else {
            Err(PipelineError::ColumnOutOfRange {
                index,
                width: self.width(),
            })
        }
    }

    /// Returns a new table holding only `indices`, in that order. A column may
    /// appear more than once.
    pub fn select(&self, indices: &[usize]) -> Result<CsvTable> {
        for &i in indices {
            self.check_column(i)?;
        }
        let header = indices.iter().map(|&i| self.header[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(CsvTable {
            header,
            rows,
            sources: self.sources.clone(),
        })
    }

    /// Same rows under new column names.
    pub fn rename(&self, names: &[&str]) -> Result<CsvTable> {
        if names.len() != self.width() {
            return Err(PipelineError::ColumnOutOfRange {
                index: names.len(),
                width: self.width(),
            });
        }
        Ok(CsvTable {
            header: names.iter().map(|n| n.to_string()).collect(),
            rows: self.rows.clone(),
            sources: self.sources.clone(),
        })
    }

    pub fn head(&self, n: usize) -> CsvTable {
        self.slice(0..n.min(self.len()))
    }

    pub fn tail(&self, n: usize) -> CsvTable {
        self.slice(self.len().saturating_sub(n)..self.len())
    }

    fn slice(&self, range: Range<usize>) -> CsvTable {
        CsvTable {
            header: self.header.clone(),
            rows: self.rows[range.clone()].to_vec(),
            sources: self.sources[range].to_vec(),
        }
    }

    /// New table with the same header and the rows at `indices`, in order.
    pub(crate) fn pick_rows(&self, indices: impl IntoIterator<Item = usize>) -> CsvTable {
        let (rows, sources) = indices
            .into_iter()
            .map(|i| (self.rows[i].clone(), self.sources[i]))
            .unzip();
        CsvTable {
            header: self.header.clone(),
            rows,
            sources,
        }
    }

    /// New table with the same header and one column rewritten cell by cell.
    /// `f` gets each row's source position and its cell.
    pub(crate) fn map_column<F>(&self, column: usize, mut f: F) -> Result<CsvTable>
    where
        F: FnMut(usize, &str) -> Result<String>,
    {
        self.check_column(column)?;
        let mut rows = self.rows.clone();
        for (row, &source) in rows.iter_mut().zip(&self.sources) {
            row[column] = f(source, &row[column])?;
        }
        Ok(CsvTable {
            header: self.header.clone(),
            rows,
            sources: self.sources.clone(),
        })
    }

    /// Left join: every row of `self` keeps its place, extended with the
    /// `right_columns` of the last `right` row whose key columns equal this
    /// row's key columns. Unmatched rows get blank cells.
    pub fn left_join(
        &self,
        left_keys: &[usize],
        right: &CsvTable,
        right_keys: &[usize],
        right_columns: &[usize],
    ) -> Result<CsvTable> {
        for &i in left_keys {
            self.check_column(i)?;
        }
        for &i in right_keys.iter().chain(right_columns) {
            right.check_column(i)?;
        }

        let mut lookup: HashMap<Vec<&str>, usize> = HashMap::new();
        for (i, row) in right.rows.iter().enumerate() {
            let key = right_keys.iter().map(|&k| row[k].as_str()).collect();
            lookup.insert(key, i);
        }

        let mut header = self.header.clone();
        header.extend(right_columns.iter().map(|&i| right.header[i].clone()));

        let rows = self
            .rows
            .iter()
            .map(|row| {
                let key: Vec<&str> = left_keys.iter().map(|&k| row[k].as_str()).collect();
                let mut out = row.clone();
                match lookup.get(&key) {
                    Some(&r) => out.extend(right_columns.iter().map(|&c| right.rows[r][c].clone())),
                    None => out.extend(right_columns.iter().map(|_| String::new())),
                }
                out
            })
            .collect();

        Ok(CsvTable {
            header,
            rows,
            sources: self.sources.clone(),
        })
    }
}

fn malformed(record: u64, err: &csv::Error) -> PipelineError {
    PipelineError::MalformedCsv {
        record,
        reason: err.to_string(),
    }
}

#[cfg(test)]
pub(crate) fn table(header: &[&str], rows: &[&[&str]]) -> CsvTable {
    CsvTable::new(
        header.iter().map(|s| s.to_string()).collect(),
        rows.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect(),
    )
    .unwrap()
}
