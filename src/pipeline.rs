//! The named pipelines.
//!
//! Each pipeline is a pure function of the tables it is handed: the same
//! inputs always give the same outputs. Fetching, archiving and writing
//! results belong to the orchestrator.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

use crate::aggregate::{Strictness, day_over_day, parse_count, parse_number, sum};
use crate::config::{AgeReportConfig, ColumnsConfig, RegionConfig, TestColumns, TestDumpColumns};
use crate::date::{DateNormalizer, latest_date, normalize_column};
use crate::error::{InStage, PipelineError, Stage, StageError};
use crate::filter::{MatchMode, exclude, filter, filter_date, filter_present};
use crate::project::project;
use crate::sort::{KeyTransform, Order, sort_by};
use crate::stats::{TrendStats, trailing_average};
use crate::table::CsvTable;
use crate::window::{VaxDayRecord, WindowAverage, WindowSpec, rolling_averages};

/// Column layout of a case trend series.
pub const SERIES_COLUMNS: [&str; 5] = ["region", "date", "new_cases", "hospitalized", "icu"];
const SERIES_NEW_CASES: usize = 2;
const SERIES_HOSPITALIZED: usize = 3;
const SERIES_ICU: usize = 4;

/// Column layout of the ICU ranking.
pub const ICU_COLUMNS: [&str; 4] = ["region", "date", "icu", "icu_beds_available"];
const ICU_COUNT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineName {
    CaseTrendByCounty,
    CaseTrendByState,
    IcuWorstCounties,
    RisingJurisdictions,
    HospitalCensus,
    VaccinationRollingAverage,
    TestVolumeDelta,
    AgeCaseTrend,
    WeekdayShare,
}

impl fmt::Display for PipelineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineName::CaseTrendByCounty => "case_trend_by_county",
            PipelineName::CaseTrendByState => "case_trend_by_state",
            PipelineName::IcuWorstCounties => "icu_worst_counties",
            PipelineName::RisingJurisdictions => "rising_jurisdictions",
            PipelineName::HospitalCensus => "hospital_census",
            PipelineName::VaccinationRollingAverage => "vaccination_rolling_average",
            PipelineName::TestVolumeDelta => "test_volume_delta",
            PipelineName::AgeCaseTrend => "age_case_trend",
            PipelineName::WeekdayShare => "weekday_share",
        };
        f.write_str(name)
    }
}

/// Result of a case trend pipeline for one region.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseTrend {
    /// Change in the region's total case count since the previous pull.
    pub new_cases: f64,
    /// Date-ascending [`SERIES_COLUMNS`] table, ready to plot.
    pub series: CsvTable,
    pub stats: TrendStats,
}

/// Filters one region out of a feed and projects the named columns.
fn region_rows(
    table: &CsvTable,
    region_column: &str,
    region: &RegionConfig,
    columns: &[&str],
) -> Result<CsvTable, StageError> {
    let col = table.column(region_column).in_stage(Stage::Filter)?;
    let rows = filter(table, col, &region.needle, region.mode).in_stage(Stage::Filter)?;
    project(&rows, columns).in_stage(Stage::Project)
}

/// Hospital rows of one region with each day's new cases joined in from the
/// already projected `[region, date, new_cases]` case rows.
fn joined_series(
    case_rows: &CsvTable,
    hospitals: &CsvTable,
    region: &RegionConfig,
    columns: &ColumnsConfig,
    normalizer: &dyn DateNormalizer,
) -> Result<CsvTable, StageError> {
    let hc = &columns.hospitals;
    let hospital_cols = [
        hc.region.as_str(),
        hc.date.as_str(),
        hc.hospitalized.as_str(),
        hc.icu.as_str(),
    ];
    let hosp = region_rows(hospitals, &hc.region, region, &hospital_cols)?;
    let hosp = normalize_column(&hosp, 1, normalizer).in_stage(Stage::Normalize)?;
    let cases = normalize_column(case_rows, 1, normalizer).in_stage(Stage::Normalize)?;

    // [region, date, hospitalized, icu, new_cases]
    let joined = hosp.left_join(&[0, 1], &cases, &[0, 1], &[2]).in_stage(Stage::Join)?;
    let series = joined
        .select(&[0, 1, 4, 2, 3])
        .and_then(|t| t.rename(&SERIES_COLUMNS))
        .in_stage(Stage::Project)?;
    sort_by(&series, 1, KeyTransform::Date(normalizer), Order::Ascending).in_stage(Stage::Sort)
}

/// Date-ascending [`SERIES_COLUMNS`] table for one region.
///
/// The series is built from the hospital feed, with each day's new cases
/// joined in from the case feed by region and date. When the case feed
/// repeats a (region, date) pair, the later row is used.
pub fn region_series(
    cases: &CsvTable,
    hospitals: &CsvTable,
    region: &RegionConfig,
    columns: &ColumnsConfig,
    normalizer: &dyn DateNormalizer,
) -> Result<CsvTable, StageError> {
    let cc = &columns.cases;
    let case_cols = [cc.region.as_str(), cc.date.as_str(), cc.new_cases.as_str()];
    let rows = region_rows(cases, &cc.region, region, &case_cols)?;
    joined_series(&rows, hospitals, region, columns, normalizer)
}

/// Day-over-day case count and plot-ready trend series for one region.
///
/// See [`region_series`] for how the series is assembled.
pub fn case_trend(
    cases_today: &CsvTable,
    cases_yesterday: &CsvTable,
    hospitals: &CsvTable,
    region: &RegionConfig,
    columns: &ColumnsConfig,
    normalizer: &dyn DateNormalizer,
) -> Result<CaseTrend, StageError> {
    let cc = &columns.cases;
    let case_cols = [cc.region.as_str(), cc.date.as_str(), cc.new_cases.as_str()];

    let today = region_rows(cases_today, &cc.region, region, &case_cols)?;
    let yesterday = region_rows(cases_yesterday, &cc.region, region, &case_cols)?;
    let new_cases = day_over_day(&today, &yesterday, 2, Strictness::Strict).in_stage(Stage::Aggregate)?;

    let series = joined_series(&today, hospitals, region, columns, normalizer)?;
    let stats = TrendStats::from_series(
        &series,
        SERIES_NEW_CASES,
        SERIES_HOSPITALIZED,
        SERIES_ICU,
        region.population,
        region.icu_capacity,
    )
    .in_stage(Stage::Aggregate)?;

    Ok(CaseTrend {
        new_cases,
        series,
        stats,
    })
}

/// Counties with the most COVID ICU patients on the latest reported day.
///
/// The statewide row is left out; counties that did not report an ICU count
/// that day cannot be ranked and are dropped.
pub fn icu_worst_counties(
    hospitals: &CsvTable,
    state: &RegionConfig,
    top_n: usize,
    columns: &ColumnsConfig,
    normalizer: &dyn DateNormalizer,
) -> Result<CsvTable, StageError> {
    let hc = &columns.hospitals;
    let region_col = hospitals.column(&hc.region).in_stage(Stage::Filter)?;
    let date_col = hospitals.column(&hc.date).in_stage(Stage::Filter)?;
    let icu_col = hospitals.column(&hc.icu).in_stage(Stage::Filter)?;

    let latest = latest_date(hospitals, date_col, normalizer).in_stage(Stage::Filter)?;
    let today = match latest {
        Some(day) => filter_date(hospitals, date_col, day, normalizer).in_stage(Stage::Filter)?,
        None => hospitals.head(0),
    };
    let counties = exclude(&today, region_col, &state.needle, state.mode).in_stage(Stage::Filter)?;
    let reported = filter_present(&counties, icu_col).in_stage(Stage::Filter)?;

    let ranked = project(
        &reported,
        &[
            hc.region.as_str(),
            hc.date.as_str(),
            hc.icu.as_str(),
            hc.icu_available.as_str(),
        ],
    )
    .and_then(|t| t.rename(&ICU_COLUMNS))
    .in_stage(Stage::Project)?;
    let ranked = sort_by(&ranked, ICU_COUNT, KeyTransform::Numeric, Order::Descending).in_stage(Stage::Sort)?;

    Ok(ranked.head(top_n))
}

/// Trailing 7-day dose and booster averages for one county.
pub fn vaccination_rolling_average(
    vaccinations: &CsvTable,
    county: &RegionConfig,
    columns: &ColumnsConfig,
    window: WindowSpec,
    normalizer: &dyn DateNormalizer,
) -> Result<Vec<WindowAverage>, StageError> {
    let vc = &columns.vaccinations;
    let region_col = vaccinations.column(&vc.region).in_stage(Stage::Filter)?;
    let rows = filter(vaccinations, region_col, &county.needle, county.mode).in_stage(Stage::Filter)?;

    let projected = project(
        &rows,
        &[
            vc.date.as_str(),
            vc.first_dose.as_str(),
            vc.second_dose.as_str(),
            vc.booster.as_str(),
        ],
    )
    .in_stage(Stage::Project)?;
    let projected = normalize_column(&projected, 0, normalizer).in_stage(Stage::Normalize)?;

    // most recent day first
    let recent_first =
        sort_by(&projected, 0, KeyTransform::Date(normalizer), Order::Descending).in_stage(Stage::Sort)?;
    let records = VaxDayRecord::from_table(&recent_first).in_stage(Stage::Window)?;

    rolling_averages(window, &records).in_stage(Stage::Window)
}

/// Change in the statewide total of new PCR tests between two pulls.
pub fn test_volume_delta(
    today: &CsvTable,
    yesterday: &CsvTable,
    columns: &TestColumns,
) -> Result<f64, StageError> {
    let today = project(today, &[columns.new_tests.as_str()]).in_stage(Stage::Project)?;
    let yesterday = project(yesterday, &[columns.new_tests.as_str()]).in_stage(Stage::Project)?;
    day_over_day(&today, &yesterday, 0, Strictness::Strict).in_stage(Stage::Aggregate)
}

/// A jurisdiction whose 7-day case average is higher than a week earlier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RisingJurisdiction {
    pub region: String,
    pub avg_7d: f64,
    pub avg_7d_week_ago: f64,
    pub avg_7d_two_weeks_ago: Option<f64>,
}

/// Every jurisdiction in the hospital feed whose 7-day new case average
/// rose over the past week, in feed order.
///
/// Averages leave out the latest day, as in [`TrendStats`]. Jurisdictions
/// with less than 15 days of history cannot be compared and are skipped.
pub fn rising_jurisdictions(
    cases: &CsvTable,
    hospitals: &CsvTable,
    columns: &ColumnsConfig,
    normalizer: &dyn DateNormalizer,
) -> Result<Vec<RisingJurisdiction>, StageError> {
    let region_col = hospitals.column(&columns.hospitals.region).in_stage(Stage::Filter)?;

    let mut seen = HashSet::new();
    let mut rising = Vec::new();
    for row in hospitals.rows() {
        let name = row.get(region_col).unwrap_or_default();
        if !seen.insert(name) {
            continue;
        }
        let region = RegionConfig::new(name, name, MatchMode::Exact);
        let series = region_series(cases, hospitals, &region, columns, normalizer)?;

        let average = |skip: usize| trailing_average(&series, SERIES_NEW_CASES, skip).in_stage(Stage::Aggregate);
        let (Some(now), Some(week_ago)) = (average(1)?, average(8)?) else {
            continue;
        };
        if now > week_ago {
            rising.push(RisingJurisdiction {
                region: name.to_string(),
                avg_7d: now,
                avg_7d_week_ago: week_ago,
                avg_7d_two_weeks_ago: average(15)?,
            });
        }
    }
    Ok(rising)
}

/// Statewide medical/surgical beds in use on the latest reported day, and
/// on the reports one and two weeks before it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BedCensus {
    pub date: String,
    pub in_use: f64,
    pub in_use_week_ago: Option<f64>,
    pub in_use_two_weeks_ago: Option<f64>,
}

/// Med/surg bed census for the statewide row of the hospital feed.
///
/// Days missing either bed count are dropped first, so "a week ago" is the
/// seventh reported day back.
pub fn hospital_census(
    hospitals: &CsvTable,
    state: &RegionConfig,
    columns: &ColumnsConfig,
    normalizer: &dyn DateNormalizer,
) -> Result<BedCensus, StageError> {
    let hc = &columns.hospitals;
    let cols = [
        hc.region.as_str(),
        hc.date.as_str(),
        hc.med_surg_available.as_str(),
        hc.med_surg_total.as_str(),
    ];
    let rows = region_rows(hospitals, &hc.region, state, &cols)?;
    let rows = filter_present(&rows, 2)
        .and_then(|t| filter_present(&t, 3))
        .in_stage(Stage::Filter)?;
    let rows = normalize_column(&rows, 1, normalizer).in_stage(Stage::Normalize)?;
    let rows = sort_by(&rows, 1, KeyTransform::Date(normalizer), Order::Ascending).in_stage(Stage::Sort)?;

    let Some(last) = rows.len().checked_sub(1) else {
        return Err(StageError {
            stage: Stage::Aggregate,
            source: PipelineError::InsufficientWindowData {
                offset: 0,
                available: 0,
                width: 1,
            },
        });
    };
    let in_use = |back: usize| -> Result<Option<f64>, StageError> {
        let Some(row) = last.checked_sub(back).and_then(|i| rows.row(i)) else {
            return Ok(None);
        };
        let cell = |column: usize| {
            let raw = row.get(column).unwrap_or_default();
            parse_number(raw).ok_or_else(|| PipelineError::NonNumericCell {
                column: rows.column_name(column),
                row: row.source(),
                value: raw.to_string(),
            })
        };
        let used = cell(3).and_then(|total| cell(2).map(|available| total - available));
        used.map(Some).in_stage(Stage::Aggregate)
    };

    Ok(BedCensus {
        date: rows.row(last).and_then(|r| r.get(1)).unwrap_or_default().to_string(),
        in_use: in_use(0)?.unwrap_or_default(),
        in_use_week_ago: in_use(7)?,
        in_use_two_weeks_ago: in_use(14)?,
    })
}

/// Trailing 7-day average of daily cases per age bucket, from the county's
/// per-test dump.
///
/// Only rows whose status is one of `report.case_statuses` and whose report
/// date is on or after `report.since` count. Each output row is labelled
/// with the last day of its window; columns are `date`, the configured
/// buckets and then the unknown bucket.
pub fn age_case_trend(
    tests: &CsvTable,
    report: &AgeReportConfig,
    columns: &TestDumpColumns,
    normalizer: &dyn DateNormalizer,
) -> Result<CsvTable, StageError> {
    let cols = [
        columns.report_date.as_str(),
        columns.case_status.as_str(),
        columns.age_bucket.as_str(),
    ];
    tests.columns(&cols).in_stage(Stage::Filter)?;
    let rows = project(tests, &cols).in_stage(Stage::Project)?;

    let mut cases: Vec<(NaiveDate, usize)> = Vec::new();
    for row in rows.rows() {
        let status = row.get(1).unwrap_or_default().trim();
        if !report.case_statuses.iter().any(|s| s == status) {
            continue;
        }
        let raw = row.get(0).unwrap_or_default();
        let date = normalizer
            .to_date(raw)
            .ok_or_else(|| PipelineError::UnsortableKey {
                column: rows.column_name(0),
                row: row.source(),
                value: raw.to_string(),
            })
            .in_stage(Stage::Normalize)?;
        if date < report.since {
            continue;
        }
        let bucket = row.get(2).unwrap_or_default().trim();
        let index = report
            .buckets
            .iter()
            .position(|b| b.eq_ignore_ascii_case(bucket))
            .unwrap_or(report.buckets.len());
        cases.push((date, index));
    }

    let first = cases.iter().map(|(d, _)| *d).min();
    let last = cases.iter().map(|(d, _)| *d).max();
    let days = first
        .zip(last)
        .map(|(first, last)| (last - first).num_days() as usize + 1)
        .unwrap_or_default();
    if days < 7 {
        return Err(StageError {
            stage: Stage::Window,
            source: PipelineError::InsufficientWindowData {
                offset: 0,
                available: days,
                width: 7,
            },
        });
    }
    let first = first.unwrap_or_default();

    // per-day counts, one column per bucket plus unknown
    let width = report.buckets.len() + 1;
    let mut counts = vec![vec![0u32; width]; days];
    for (date, bucket) in cases {
        counts[(date - first).num_days() as usize][bucket] += 1;
    }

    let mut header = vec!["date".to_string()];
    header.extend(report.buckets.iter().cloned());
    header.push(report.unknown_bucket.clone());

    let rows = counts
        .windows(7)
        .enumerate()
        .map(|(i, window)| {
            let day = first + chrono::Days::new((i + 6) as u64);
            let mut row = vec![day.format("%Y-%m-%d").to_string()];
            row.extend((0..width).map(|b| {
                let total: u32 = window.iter().map(|d| d[b]).sum();
                format!("{:.1}", f64::from(total) / 7.0)
            }));
            row
        })
        .collect();
    CsvTable::new(header, rows).in_stage(Stage::Aggregate)
}

/// Average share of a week's cases reported on one weekday.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeekdayShare {
    pub weekday: Weekday,
    pub share: f64,
}

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// How a region's weekly new cases split across the days of the week,
/// averaged over the last `weeks` 7-day blocks of a [`SERIES_COLUMNS`]
/// series, leaving out the latest day.
///
/// Weeks with no cases at all are skipped. Shares come back Monday first.
pub fn weekday_share(
    series: &CsvTable,
    weeks: usize,
    normalizer: &dyn DateNormalizer,
) -> Result<Vec<WeekdayShare>, StageError> {
    let span = weeks * 7;
    let available = series.len().saturating_sub(1);
    if weeks == 0 || available < span {
        return Err(StageError {
            stage: Stage::Window,
            source: PipelineError::InsufficientWindowData {
                offset: 1,
                available,
                width: span,
            },
        });
    }
    let history = series.head(available).tail(span);

    let mut shares = [0.0; 7];
    let mut counted = 0;
    for week in 0..weeks {
        let block = history.pick_rows(week * 7..week * 7 + 7);
        let total = sum(&block, SERIES_NEW_CASES, Strictness::Strict).in_stage(Stage::Aggregate)?;
        if total <= 0.0 {
            continue;
        }
        counted += 1;
        for row in block.rows() {
            let raw = row.get(1).unwrap_or_default();
            let date = normalizer
                .to_date(raw)
                .ok_or_else(|| PipelineError::UnsortableKey {
                    column: block.column_name(1),
                    row: row.source(),
                    value: raw.to_string(),
                })
                .in_stage(Stage::Normalize)?;
            let cases = row.get(SERIES_NEW_CASES).and_then(parse_count).unwrap_or_default();
            shares[date.weekday().num_days_from_monday() as usize] += cases / total;
        }
    }

    Ok(WEEKDAYS
        .iter()
        .zip(shares)
        .map(|(&weekday, share)| WeekdayShare {
            weekday,
            share: if counted > 0 { share / counted as f64 } else { 0.0 },
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::FormatNormalizer;
    use crate::error::PipelineError;
    use crate::filter::MatchMode;
    use crate::table::table;

    fn county() -> RegionConfig {
        RegionConfig::new("Allegheny County", "Alleg", MatchMode::Contains)
    }

    fn state() -> RegionConfig {
        RegionConfig::new("Pennsylvania", "Pennsylvania", MatchMode::Exact)
    }

    fn day(i: usize) -> chrono::NaiveDate {
        chrono::NaiveDate::from_ymd_opt(2022, 1, 1).unwrap() + chrono::Days::new(i as u64)
    }

    fn owned(header: &[&str], rows: Vec<Vec<String>>) -> CsvTable {
        CsvTable::new(header.iter().map(|s| s.to_string()).collect(), rows).unwrap()
    }

    fn cases(rows: &[&[&str]]) -> CsvTable {
        table(&["Jurisdiction", "Date", "New Cases"], rows)
    }

    fn hospitals(rows: &[&[&str]]) -> CsvTable {
        table(
            &[
                "County",
                "Date of data",
                "COVID-19 Patients Hospitalized",
                "COVID-ICU",
                "Adult ICU Beds Available",
            ],
            rows,
        )
    }

    #[test]
    fn test_case_trend_delta_and_series() {
        let n = FormatNormalizer::default();
        let today = cases(&[
            &["Allegheny", "01/02/2022", "30"],
            &["Beaver", "01/02/2022", "4"],
            &["Allegheny", "01/01/2022", "20"],
            &["Allegheny", "12/31/2021", "10"],
        ]);
        let yesterday = cases(&[
            &["Allegheny", "01/01/2022", "20"],
            &["Allegheny", "12/31/2021", "10"],
        ]);
        let hosp = hospitals(&[
            &["Allegheny", "01/02/2022", "300", "40", "5"],
            &["Allegheny", "12/31/2021", "280", "35", "8"],
            &["Allegheny", "01/01/2022", "290", "38", "6"],
        ]);

        let trend = case_trend(&today, &yesterday, &hosp, &county(), &ColumnsConfig::default(), &n).unwrap();
        assert_eq!(trend.new_cases, 30.0);
        assert_eq!(trend.series.header(), SERIES_COLUMNS);
        let rows: Vec<_> = trend.series.rows().map(|r| r.cells().to_vec()).collect();
        assert_eq!(rows[0], ["Allegheny", "2021-12-31", "10", "280", "35"]);
        assert_eq!(rows[2], ["Allegheny", "2022-01-02", "30", "300", "40"]);
        assert_eq!(trend.stats.icu.unwrap().change, 2.0);
    }

    #[test]
    fn test_case_trend_keeps_last_duplicate_case_row() {
        let n = FormatNormalizer::default();
        let today = cases(&[
            &["Allegheny", "01/02/2022", "5"],
            &["Allegheny", "01/02/2022", "30"],
        ]);
        let hosp = hospitals(&[&["Allegheny", "01/02/2022", "300", "40", "5"]]);

        let trend =
            case_trend(&today, &cases(&[]), &hosp, &county(), &ColumnsConfig::default(), &n).unwrap();
        assert_eq!(trend.series.row(0).unwrap().get(SERIES_NEW_CASES), Some("30"));
    }

    #[test]
    fn test_case_trend_icu_percent_full() {
        let n = FormatNormalizer::default();
        let region = RegionConfig {
            icu_capacity: Some(crate::stats::IcuCapacity {
                beds: 560,
                normally_free: 180,
            }),
            ..county()
        };
        let hosp = hospitals(&[
            &["Allegheny", "01/01/2022", "290", "38", "6"],
            &["Allegheny", "01/02/2022", "300", "40", "5"],
        ]);
        let trend = case_trend(&cases(&[]), &cases(&[]), &hosp, &region, &ColumnsConfig::default(), &n)
            .unwrap();
        assert_eq!(trend.stats.icu_percent_full, Some(75.0));
    }

    #[test]
    fn test_case_trend_unknown_column_reports_stage() {
        let n = FormatNormalizer::default();
        let bad = table(&["Region", "Date", "New Cases"], &[]);
        let err = case_trend(&bad, &bad, &hospitals(&[]), &county(), &ColumnsConfig::default(), &n)
            .unwrap_err();
        assert_eq!(err.stage, Stage::Filter);
        assert!(matches!(err.source, PipelineError::UnknownColumn { .. }));
    }

    #[test]
    fn test_icu_worst_counties_ranks_latest_day() {
        let n = FormatNormalizer::default();
        let hosp = hospitals(&[
            &["Allegheny", "01/02/2022", "300", "40", "5"],
            &["Beaver", "01/02/2022", "30", "9", "1"],
            &["Pennsylvania", "01/02/2022", "5000", "900", "100"],
            &["Butler", "01/02/2022", "20", "", "2"],
            &["Erie", "01/02/2022", "50", "12", "3"],
            &["Beaver", "01/01/2022", "30", "99", "1"],
        ]);
        let ranked = icu_worst_counties(&hosp, &state(), 2, &ColumnsConfig::default(), &n).unwrap();
        assert_eq!(ranked.header(), ICU_COLUMNS);
        let names: Vec<_> = ranked.rows().map(|r| r.get(0).unwrap()).collect();
        assert_eq!(names, ["Allegheny", "Erie"]);
    }

    #[test]
    fn test_icu_worst_counties_empty_feed() {
        let n = FormatNormalizer::default();
        let ranked = icu_worst_counties(&hospitals(&[]), &state(), 15, &ColumnsConfig::default(), &n).unwrap();
        assert!(ranked.is_empty());
        assert_eq!(ranked.width(), 4);
    }

    fn vax_feed(days: usize) -> CsvTable {
        let start = chrono::NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        let mut rows = Vec::new();
        for i in 0..days {
            let date = (start + chrono::Duration::days(i as i64)).format("%m/%d/%Y").to_string();
            rows.push(vec![date.clone(), "Allegheny".to_string(), "4".to_string(), "6".to_string(), "2".to_string()]);
            rows.push(vec![date, "Beaver".to_string(), "100".to_string(), "100".to_string(), "100".to_string()]);
        }
        CsvTable::new(
            ["Date", "County", "Partially Covered", "Fully Covered", "Additional Dose 1"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rows,
        )
        .unwrap()
    }

    #[test]
    fn test_vaccination_rolling_average() {
        let n = FormatNormalizer::default();
        let averages = vaccination_rolling_average(
            &vax_feed(26),
            &county(),
            &ColumnsConfig::default(),
            WindowSpec::default(),
            &n,
        )
        .unwrap();
        assert_eq!(averages.len(), 13);
        assert!(averages.iter().all(|a| a.avg_doses == 10.0 && a.avg_boosters == 2.0));
    }

    #[test]
    fn test_vaccination_rolling_average_needs_history() {
        let n = FormatNormalizer::default();
        let err = vaccination_rolling_average(
            &vax_feed(20),
            &county(),
            &ColumnsConfig::default(),
            WindowSpec::default(),
            &n,
        )
        .unwrap_err();
        assert_eq!(err.stage, Stage::Window);
        assert!(matches!(err.source, PipelineError::InsufficientWindowData { offset: 19, .. }));
    }

    #[test]
    fn test_test_volume_delta() {
        let cols = TestColumns::default();
        let today = table(&["Date", "New PCR Tests"], &[&["01/01/2022", "100"], &["01/02/2022", "150"]]);
        let yesterday = table(&["Date", "New PCR Tests"], &[&["01/01/2022", "100"]]);
        assert_eq!(test_volume_delta(&today, &yesterday, &cols).unwrap(), 150.0);
    }

    /// Sixteen days of hospital and case rows; `count(region, day)` gives the
    /// new cases reported for that day.
    fn jurisdiction_feeds(regions: &[&str], days: usize, count: impl Fn(&str, usize) -> usize) -> (CsvTable, CsvTable) {
        let mut case_rows = Vec::new();
        let mut hospital_rows = Vec::new();
        for i in 0..days {
            let date = day(i).format("%m/%d/%Y").to_string();
            for region in regions {
                let r = region.to_string();
                case_rows.push(vec![r.clone(), date.clone(), count(region, i).to_string()]);
                hospital_rows.push(vec![r, date.clone(), "10".to_string(), "2".to_string(), "1".to_string()]);
            }
        }
        (
            owned(&["Jurisdiction", "Date", "New Cases"], case_rows),
            owned(
                &[
                    "County",
                    "Date of data",
                    "COVID-19 Patients Hospitalized",
                    "COVID-ICU",
                    "Adult ICU Beds Available",
                ],
                hospital_rows,
            ),
        )
    }

    #[test]
    fn test_rising_jurisdictions() {
        let n = FormatNormalizer::default();
        let (case_feed, hosp) = jurisdiction_feeds(&["Beaver", "Erie"], 16, |region, i| match region {
            "Beaver" => i + 1,
            _ => 5,
        });

        let rising = rising_jurisdictions(&case_feed, &hosp, &ColumnsConfig::default(), &n).unwrap();
        assert_eq!(
            rising,
            [RisingJurisdiction {
                region: "Beaver".to_string(),
                avg_7d: 12.0,
                avg_7d_week_ago: 5.0,
                avg_7d_two_weeks_ago: None,
            }]
        );
    }

    #[test]
    fn test_rising_jurisdictions_skips_short_history() {
        let n = FormatNormalizer::default();
        let (case_feed, hosp) = jurisdiction_feeds(&["Beaver"], 10, |_, i| i * 100);
        let rising = rising_jurisdictions(&case_feed, &hosp, &ColumnsConfig::default(), &n).unwrap();
        assert!(rising.is_empty());
    }

    fn census_feed(rows: Vec<Vec<String>>) -> CsvTable {
        owned(
            &[
                "County",
                "Date of data",
                "Medical/Surgical Beds Available",
                "Medical/Surgical Beds Total",
            ],
            rows,
        )
    }

    #[test]
    fn test_hospital_census() {
        let n = FormatNormalizer::default();
        let mut rows = Vec::new();
        // newest first, to check the census sorts by date
        for i in (0..15).rev() {
            let date = day(i).format("%m/%d/%Y").to_string();
            let available = (900 - i).to_string();
            rows.push(vec!["Pennsylvania".to_string(), date.clone(), available, "1000".to_string()]);
            rows.push(vec!["Beaver".to_string(), date, "1".to_string(), "2".to_string()]);
        }
        // a later day without a bed count does not count as the latest report
        rows.push(vec!["Pennsylvania".to_string(), day(15).format("%m/%d/%Y").to_string(), String::new(), "1000".to_string()]);

        let census = hospital_census(&census_feed(rows), &state(), &ColumnsConfig::default(), &n).unwrap();
        assert_eq!(
            census,
            BedCensus {
                date: "2022-01-15".to_string(),
                in_use: 114.0,
                in_use_week_ago: Some(107.0),
                in_use_two_weeks_ago: Some(100.0),
            }
        );
    }

    #[test]
    fn test_hospital_census_without_state_rows() {
        let n = FormatNormalizer::default();
        let rows = vec![vec!["Beaver".to_string(), "01/01/2022".to_string(), "1".to_string(), "2".to_string()]];
        let err = hospital_census(&census_feed(rows), &state(), &ColumnsConfig::default(), &n).unwrap_err();
        assert_eq!(err.stage, Stage::Aggregate);
        assert!(matches!(err.source, PipelineError::InsufficientWindowData { available: 0, .. }));
    }

    fn test_dump(rows: &[&[&str]]) -> CsvTable {
        table(&["report_date", "case_status", "age_bucket"], rows)
    }

    #[test]
    fn test_age_case_trend() {
        let n = FormatNormalizer::default();
        let mut rows: Vec<Vec<String>> = (0..8)
            .map(|i| vec![day(i).format("%Y-%m-%d").to_string(), "Confirmed".to_string(), "20 to 29".to_string()])
            .collect();
        let extra = [
            ["2022-01-08", "Probable", "70+"],
            ["2022-01-08", "Negative", "70+"],
            ["2022-01-08", "Confirmed", "Not reported"],
            ["2020-12-31", "Confirmed", "70+"],
        ];
        rows.extend(extra.iter().map(|r| r.iter().map(|c| c.to_string()).collect()));
        let dump = owned(&["report_date", "case_status", "age_bucket"], rows);

        let trend = age_case_trend(&dump, &AgeReportConfig::default(), &TestDumpColumns::default(), &n).unwrap();
        assert_eq!(trend.width(), 10);
        assert_eq!(trend.header()[0], "date");
        assert_eq!(trend.header()[9], "unknown");
        assert_eq!(trend.len(), 2);

        let last = trend.row(1).unwrap();
        assert_eq!(last.get(0), Some("2022-01-08"));
        assert_eq!(last.get(3), Some("1.0"));
        assert_eq!(last.get(8), Some("0.1"));
        assert_eq!(last.get(9), Some("0.1"));
        assert_eq!(trend.row(0).unwrap().get(0), Some("2022-01-07"));
    }

    #[test]
    fn test_age_case_trend_needs_a_week() {
        let n = FormatNormalizer::default();
        let dump = test_dump(&[
            &["2022-01-01", "Confirmed", "0 to 9"],
            &["2022-01-03", "Confirmed", "0 to 9"],
        ]);
        let err = age_case_trend(&dump, &AgeReportConfig::default(), &TestDumpColumns::default(), &n).unwrap_err();
        assert_eq!(err.stage, Stage::Window);
        assert!(matches!(err.source, PipelineError::InsufficientWindowData { available: 3, .. }));
    }

    #[test]
    fn test_age_case_trend_bad_date_points_at_feed_row() {
        let n = FormatNormalizer::default();
        let dump = test_dump(&[
            &["2022-01-01", "Negative", "0 to 9"],
            &["soon", "Confirmed", "0 to 9"],
        ]);
        let err = age_case_trend(&dump, &AgeReportConfig::default(), &TestDumpColumns::default(), &n).unwrap_err();
        assert_eq!(
            err.source,
            PipelineError::UnsortableKey {
                column: "report_date".to_string(),
                row: 1,
                value: "soon".to_string(),
            }
        );
    }

    /// A [`SERIES_COLUMNS`] table starting on Monday 2021-12-27.
    fn weekly_series(counts: &[usize]) -> CsvTable {
        let start = chrono::NaiveDate::from_ymd_opt(2021, 12, 27).unwrap();
        let rows = counts
            .iter()
            .enumerate()
            .map(|(i, c)| {
                vec![
                    "Pennsylvania".to_string(),
                    (start + chrono::Days::new(i as u64)).to_string(),
                    c.to_string(),
                    "1".to_string(),
                    "1".to_string(),
                ]
            })
            .collect();
        owned(&SERIES_COLUMNS, rows)
    }

    #[test]
    fn test_weekday_share() {
        let n = FormatNormalizer::default();
        let mut counts = vec![0; 7];
        counts.extend([7, 0, 0, 0, 0, 0, 0]);
        counts.extend([1; 7]);
        counts.push(500);

        let shares = weekday_share(&weekly_series(&counts), 3, &n).unwrap();
        assert_eq!(shares.len(), 7);
        assert_eq!(shares[0].weekday, Weekday::Mon);
        assert_eq!(shares[6].weekday, Weekday::Sun);
        // the all-zero week is skipped, the latest day is left out
        assert!((shares[0].share - 4.0 / 7.0).abs() < 1e-9);
        assert!((shares[1].share - 1.0 / 14.0).abs() < 1e-9);
        let total: f64 = shares.iter().map(|s| s.share).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weekday_share_needs_history() {
        let n = FormatNormalizer::default();
        let err = weekday_share(&weekly_series(&[1; 14]), 2, &n).unwrap_err();
        assert_eq!(err.stage, Stage::Window);
        assert_eq!(
            err.source,
            PipelineError::InsufficientWindowData {
                offset: 1,
                available: 13,
                width: 14,
            }
        );
    }

    #[test]
    fn test_pipeline_names() {
        assert_eq!(PipelineName::CaseTrendByCounty.to_string(), "case_trend_by_county");
        assert_eq!(PipelineName::IcuWorstCounties.to_string(), "icu_worst_counties");
        assert_eq!(PipelineName::WeekdayShare.to_string(), "weekday_share");
    }
}
