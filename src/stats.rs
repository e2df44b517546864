//! Headline numbers for one region's case trend series.

use serde::{Deserialize, Serialize};

use crate::aggregate::{Strictness, parse_number, sum};
use crate::error::Result;
use crate::table::CsvTable;

/// Community transmission level from weekly new cases per 100k residents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransmissionLevel {
    Low,
    Moderate,
    Substantial,
    High,
}

impl TransmissionLevel {
    pub fn from_weekly_per_100k(cases: f64) -> Self {
        match cases {
            x if x < 10.0 => TransmissionLevel::Low,
            x if x < 50.0 => TransmissionLevel::Moderate,
            x if x < 100.0 => TransmissionLevel::Substantial,
            _ => TransmissionLevel::High,
        }
    }
}

/// Latest value of a metric and its change from the previous reported day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricChange {
    pub latest: f64,
    pub change: f64,
}

/// ICU size of a region and how many of its beds are free in a normal week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcuCapacity {
    pub beds: u32,
    pub normally_free: u32,
}

impl IcuCapacity {
    /// Percentage of ICU beds in use if non-COVID demand is at its usual
    /// level. Can exceed 100.
    pub fn percent_full(&self, covid_icu: f64) -> Option<f64> {
        if self.beds == 0 {
            return None;
        }
        let beds = f64::from(self.beds);
        Some((beds - f64::from(self.normally_free) + covid_icu) * 100.0 / beds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendStats {
    pub hospitalized: Option<MetricChange>,
    pub icu: Option<MetricChange>,
    pub icu_percent_full: Option<f64>,
    /// 7-day average of new cases, ending the day before the latest row.
    pub avg_new_cases_7d: Option<f64>,
    /// The same average one day earlier.
    pub prev_avg_new_cases_7d: Option<f64>,
    pub transmission: Option<TransmissionLevel>,
}

impl TrendStats {
    /// Computes stats over a date-ascending series.
    ///
    /// The latest row is left out of the case average because its count is
    /// usually still incomplete.
    pub fn from_series(
        series: &CsvTable,
        new_cases: usize,
        hospitalized: usize,
        icu: usize,
        population: Option<u64>,
        icu_capacity: Option<IcuCapacity>,
    ) -> Result<Self> {
        let avg_new_cases_7d = trailing_average(series, new_cases, 1)?;
        let prev_avg_new_cases_7d = trailing_average(series, new_cases, 2)?;

        let highest = match (avg_new_cases_7d, prev_avg_new_cases_7d) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let transmission = highest.zip(population).and_then(|(avg, pop)| {
            (pop > 0).then(|| TransmissionLevel::from_weekly_per_100k(avg * 7.0 / (pop as f64 / 100_000.0)))
        });

        let icu = latest_change(series, icu)?;
        let icu_percent_full = icu
            .zip(icu_capacity)
            .and_then(|(icu, capacity)| capacity.percent_full(icu.latest));

        Ok(Self {
            hospitalized: latest_change(series, hospitalized)?,
            icu,
            icu_percent_full,
            avg_new_cases_7d,
            prev_avg_new_cases_7d,
            transmission,
        })
    }
}

/// Mean of the 7 rows ending `skip_latest` rows before the end, or `None`
/// when the series is too short.
pub(crate) fn trailing_average(series: &CsvTable, column: usize, skip_latest: usize) -> Result<Option<f64>> {
    if series.len() < 7 + skip_latest {
        return Ok(None);
    }
    let window = series.head(series.len() - skip_latest).tail(7);
    Ok(Some(sum(&window, column, Strictness::Strict)? / 7.0))
}

/// Change of the last row from the row before it, looking one row further
/// back when the previous day was not reported.
fn latest_change(series: &CsvTable, column: usize) -> Result<Option<MetricChange>> {
    series.check_column(column)?;
    let value = |i: usize| series.row(i).and_then(|r| r.get(column)).and_then(parse_number);

    let Some(last) = series.len().checked_sub(1) else {
        return Ok(None);
    };
    let Some(latest) = value(last) else {
        return Ok(None);
    };
    let previous = last
        .checked_sub(1)
        .and_then(value)
        .or_else(|| last.checked_sub(2).and_then(value));

    Ok(previous.map(|prev| MetricChange {
        latest,
        change: latest - prev,
    }))
}
