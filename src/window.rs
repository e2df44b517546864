//! Trailing 7-day averages of vaccine doses over overlapping windows.
//!
//! The input series is most-recent-first. Window `offset` skips `offset` rows
//! from the recent end and averages the next `width` rows. The default
//! walks offsets 19 down to 7, so 13 windows, each one day newer than the last.

use serde::{Deserialize, Serialize};

use crate::aggregate::parse_count;
use crate::error::{PipelineError, Result};
use crate::table::CsvTable;

/// One day of the vaccination feed for a single county.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VaxDayRecord {
    pub date: String,
    pub first_dose: f64,
    pub second_dose: f64,
    pub booster: f64,
}

impl VaxDayRecord {
    /// Reads records from a table whose columns are, in order,
    /// date, first dose, second dose, booster.
    pub fn from_table(table: &CsvTable) -> Result<Vec<VaxDayRecord>> {
        for c in 0..4 {
            table.check_column(c)?;
        }
        table
            .rows()
            .map(|row| {
                let count = |column: usize| {
                    let raw = row.get(column).unwrap_or_default();
                    parse_count(raw).ok_or_else(|| PipelineError::NonNumericCell {
                        column: table.column_name(column),
                        row: row.source(),
                        value: raw.to_string(),
                    })
                };
                Ok(VaxDayRecord {
                    date: row.get(0).unwrap_or_default().to_string(),
                    first_dose: count(1)?,
                    second_dose: count(2)?,
                    booster: count(3)?,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub width: usize,
    pub max_offset: usize,
    pub min_offset: usize,
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            width: 7,
            max_offset: 19,
            min_offset: 7,
        }
    }
}

impl WindowSpec {
    pub fn window_count(&self) -> usize {
        (self.min_offset..=self.max_offset).count()
    }

    /// Shortest series every window can be computed from.
    pub fn required_rows(&self) -> usize {
        self.max_offset + self.width
    }
}

/// The averages of one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowAverage {
    pub offset: usize,
    pub avg_doses: f64,
    pub avg_boosters: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Idle,
    Windowing(usize),
    Emitted,
}

pub struct RollingWindowAverager<'a> {
    spec: WindowSpec,
    series: &'a [VaxDayRecord],
    state: WindowState,
}

impl<'a> RollingWindowAverager<'a> {
    pub fn new(spec: WindowSpec, series: &'a [VaxDayRecord]) -> Self {
        Self {
            spec,
            series,
            state: WindowState::Idle,
        }
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    /// Computes the next window, or `None` once every window was emitted.
    pub fn step(&mut self) -> Result<Option<WindowAverage>> {
        let offset = match self.state {
            WindowState::Idle if self.spec.min_offset > self.spec.max_offset => {
                self.state = WindowState::Emitted;
                return Ok(None);
            }
            WindowState::Idle => self.spec.max_offset,
            WindowState::Windowing(prev) if prev > self.spec.min_offset => prev - 1,
            WindowState::Windowing(_) => {
                self.state = WindowState::Emitted;
                return Ok(None);
            }
            WindowState::Emitted => return Ok(None),
        };
        self.state = WindowState::Windowing(offset);
        average_window(self.series, offset, self.spec.width).map(Some)
    }

    /// Runs every window, oldest-computed first.
    pub fn run(mut self) -> Result<Vec<WindowAverage>> {
        let mut out = Vec::with_capacity(self.spec.window_count());
        while let Some(avg) = self.step()? {
            out.push(avg);
        }
        Ok(out)
    }
}

fn average_window(series: &[VaxDayRecord], offset: usize, width: usize) -> Result<WindowAverage> {
    let window: Vec<&VaxDayRecord> = series.iter().skip(offset).take(width).collect();
    if width == 0 || window.len() < width {
        return Err(PipelineError::InsufficientWindowData {
            offset,
            available: window.len(),
            width,
        });
    }
    let n = width as f64;
    let doses: f64 = window.iter().map(|r| r.first_dose + r.second_dose).sum();
    let boosters: f64 = window.iter().map(|r| r.booster).sum();
    Ok(WindowAverage {
        offset,
        avg_doses: doses / n,
        avg_boosters: boosters / n,
    })
}

/// Averages every window of `spec` over a most-recent-first series.
pub fn rolling_averages(spec: WindowSpec, series: &[VaxDayRecord]) -> Result<Vec<WindowAverage>> {
    RollingWindowAverager::new(spec, series).run()
}
