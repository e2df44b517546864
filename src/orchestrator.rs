//! Runs one day's batch: fetch every feed, archive it, rotate yesterday's
//! snapshot in, then run each named pipeline in turn.
//!
//! A failing pipeline is recorded and the run moves on to the next one, so a
//! short vaccination history never costs the case numbers. Archive and output
//! write failures stop the run.

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::archive::{ArchiveStore, SnapshotArchiver, SnapshotRing};
use crate::config::{FeedConfig, FeedKind, PipelineConfig, RegionConfig, RegionLevel};
use crate::date::FormatNormalizer;
use crate::error::{InStage, PipelineError, Stage, StageError};
use crate::fetch::FeedSource;
use crate::output::{append_averages, write_json, write_records, write_table};
use crate::pipeline::{
    BedCensus, CaseTrend, PipelineName, RisingJurisdiction, WeekdayShare, age_case_trend,
    case_trend, hospital_census, icu_worst_counties, region_series, rising_jurisdictions,
    test_volume_delta, vaccination_rolling_average, weekday_share,
};
use crate::stats::TrendStats;
use crate::table::CsvTable;
use crate::window::WindowAverage;

/// Feeds whose day-over-day delta needs the previous pull.
const DELTA_FEEDS: [FeedKind; 2] = [FeedKind::Cases, FeedKind::PcrTests];

#[derive(Debug, Clone, Error)]
#[error("pipeline {pipeline} failed: {error}")]
pub struct PipelineFailure {
    pub pipeline: PipelineName,
    #[source]
    pub error: StageError,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub pipeline: PipelineName,
    /// Set for pipelines that run once per region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub ok: bool,
    pub stage: Option<String>,
    pub error: Option<String>,
}

/// Case trend headline for one configured region.
#[derive(Debug, Clone, Serialize)]
pub struct RegionTrend {
    pub region: String,
    pub level: RegionLevel,
    pub new_cases: f64,
    pub stats: TrendStats,
}

/// Everything one run produced, written out as `report.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_date: NaiveDate,
    pub trends: Vec<RegionTrend>,
    pub rising_jurisdictions: Vec<RisingJurisdiction>,
    pub icu_worst_counties: Option<usize>,
    pub bed_census: Option<BedCensus>,
    pub vaccination_county: String,
    pub vaccination_averages: Vec<WindowAverage>,
    pub new_pcr_tests: Option<f64>,
    /// Days in the age bucket case trend.
    pub age_case_days: Option<usize>,
    pub weekday_share: Vec<WeekdayShare>,
    pub pipelines: Vec<PipelineStatus>,
    #[serde(skip)]
    pub failures: Vec<PipelineFailure>,
}

impl RunReport {
    fn new(run_date: NaiveDate, config: &PipelineConfig) -> Self {
        Self {
            run_date,
            trends: Vec::new(),
            rising_jurisdictions: Vec::new(),
            icu_worst_counties: None,
            bed_census: None,
            vaccination_county: config.county.name.clone(),
            vaccination_averages: Vec::new(),
            new_pcr_tests: None,
            age_case_days: None,
            weekday_share: Vec::new(),
            pipelines: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// The trend for the region with this display name.
    pub fn trend(&self, region: &str) -> Option<&RegionTrend> {
        self.trends.iter().find(|t| t.region == region)
    }

    fn record<T>(&mut self, pipeline: PipelineName, result: Result<T, StageError>) -> Option<T> {
        self.record_for(pipeline, None, result)
    }

    /// Logs and records the outcome of one pipeline.
    fn record_for<T>(
        &mut self,
        pipeline: PipelineName,
        region: Option<&str>,
        result: Result<T, StageError>,
    ) -> Option<T> {
        let region = region.map(str::to_string);
        match result {
            Ok(value) => {
                info!(%pipeline, ?region, "Pipeline completed");
                self.pipelines.push(PipelineStatus {
                    pipeline,
                    region,
                    ok: true,
                    stage: None,
                    error: None,
                });
                Some(value)
            }
            Err(e) => {
                error!(%pipeline, ?region, stage = %e.stage, error = %e.source, "Pipeline failed");
                self.pipelines.push(PipelineStatus {
                    pipeline,
                    region,
                    ok: false,
                    stage: Some(e.stage.to_string()),
                    error: Some(e.source.to_string()),
                });
                self.failures.push(PipelineFailure { pipeline, error: e });
                None
            }
        }
    }
}

/// Today's parsed feeds plus the previous pull of the delta feeds.
#[derive(Debug, Default)]
pub struct FeedInputs {
    rings: HashMap<FeedKind, SnapshotRing>,
    failed: HashMap<FeedKind, StageError>,
    previous_failed: HashMap<FeedKind, StageError>,
}

impl FeedInputs {
    pub fn today(&self, kind: FeedKind) -> Result<&CsvTable, StageError> {
        if let Some(e) = self.failed.get(&kind) {
            return Err(e.clone());
        }
        self.rings
            .get(&kind)
            .and_then(SnapshotRing::current)
            .ok_or_else(|| not_fetched(kind))
    }

    pub fn yesterday(&self, kind: FeedKind) -> Result<&CsvTable, StageError> {
        if let Some(e) = self.previous_failed.get(&kind) {
            return Err(e.clone());
        }
        self.today(kind)?;
        self.rings
            .get(&kind)
            .and_then(SnapshotRing::previous)
            .ok_or_else(|| not_fetched(kind))
    }
}

fn not_fetched(kind: FeedKind) -> StageError {
    StageError {
        stage: Stage::Fetch,
        source: PipelineError::Network {
            url: format!("{kind:?}"),
            reason: "feed was not fetched".to_string(),
        },
    }
}

pub struct Orchestrator<'a, S, A> {
    config: &'a PipelineConfig,
    source: S,
    archiver: SnapshotArchiver<A>,
    normalizer: FormatNormalizer,
}

impl<'a, S: FeedSource, A: ArchiveStore> Orchestrator<'a, S, A> {
    pub fn new(config: &'a PipelineConfig, source: S, store: A) -> Self {
        Self {
            config,
            source,
            archiver: SnapshotArchiver::new(store),
            normalizer: FormatNormalizer::new(config.date_formats.clone()),
        }
    }

    /// Runs the whole batch for `run_date` and writes `report.json`.
    pub async fn run(&mut self, run_date: NaiveDate) -> Result<RunReport> {
        self.config.validate()?;
        let inputs = self.ingest(run_date).await?;
        let report = self.run_pipelines(&inputs, run_date)?;
        write_json(&self.output_path("report.json"), &report)?;
        Ok(report)
    }

    /// Fetches and parses every feed, loads the previous snapshot of each
    /// delta feed, then archives today's copy.
    #[tracing::instrument(skip(self))]
    pub async fn ingest(&mut self, run_date: NaiveDate) -> Result<FeedInputs> {
        let config = self.config;
        let previous_date = run_date
            .checked_sub_days(Days::new(u64::from(config.lookback_days)))
            .context("lookback reaches before the supported date range")?;

        let mut inputs = FeedInputs::default();
        for (kind, feed) in config.feeds.all() {
            let table = match self.pull(feed).await {
                Ok(table) => table,
                Err(e) => {
                    warn!(tag = %feed.tag, stage = %e.stage, error = %e.source, "Feed unavailable");
                    inputs.failed.insert(kind, e);
                    continue;
                }
            };

            // previous snapshot first, so it can never be today's own copy
            let mut ring = SnapshotRing::default();
            if DELTA_FEEDS.contains(&kind) {
                match self.previous_snapshot(feed, previous_date)? {
                    Ok(previous) => {
                        ring.rotate(previous);
                    }
                    Err(e) => {
                        warn!(tag = %feed.tag, %previous_date, error = %e.source, "No usable previous snapshot");
                        inputs.previous_failed.insert(kind, e);
                    }
                }
            }

            self.archiver.archive(&feed.tag, run_date, &table)?;
            ring.rotate(table);
            inputs.rings.insert(kind, ring);
        }
        Ok(inputs)
    }

    #[tracing::instrument(skip(self, feed), fields(tag = %feed.tag))]
    async fn pull(&self, feed: &FeedConfig) -> Result<CsvTable, StageError> {
        let bytes = self.source.fetch(&feed.url).await.in_stage(Stage::Fetch)?;
        let table = CsvTable::parse(&bytes).in_stage(Stage::Parse)?;
        info!(rows = table.len(), columns = table.width(), "Feed parsed");
        Ok(table)
    }

    fn previous_snapshot(
        &self,
        feed: &FeedConfig,
        stamp: NaiveDate,
    ) -> Result<Result<CsvTable, StageError>> {
        let Some(bytes) = self.archiver.load(&feed.tag, stamp)? else {
            return Ok(Err(StageError {
                stage: Stage::Rotate,
                source: PipelineError::MissingSnapshot {
                    tag: feed.tag.clone(),
                    stamp: stamp.to_string(),
                },
            }));
        };
        Ok(CsvTable::parse(&bytes).in_stage(Stage::Rotate))
    }

    /// Runs every named pipeline in order, writing each one's output as soon
    /// as it completes.
    pub fn run_pipelines(&self, inputs: &FeedInputs, run_date: NaiveDate) -> Result<RunReport> {
        let config = self.config;
        let mut report = RunReport::new(run_date, config);

        for region in &config.regions {
            let pipeline = match region.level {
                RegionLevel::County => PipelineName::CaseTrendByCounty,
                RegionLevel::State => PipelineName::CaseTrendByState,
            };
            let trend = self.trend_for(inputs, region);
            if let Some(trend) = report.record_for(pipeline, Some(&region.name), trend) {
                write_table(&self.trend_path(region), &trend.series)?;
                info!(region = %region.name, new_cases = trend.new_cases, "Case delta");
                report.trends.push(RegionTrend {
                    region: region.name.clone(),
                    level: region.level,
                    new_cases: trend.new_cases,
                    stats: trend.stats,
                });
            }
        }

        let rising = inputs.today(FeedKind::Cases).and_then(|cases| {
            let hospitals = inputs.today(FeedKind::Hospitals)?;
            rising_jurisdictions(cases, hospitals, &config.columns, &self.normalizer)
        });
        if let Some(rising) = report.record(PipelineName::RisingJurisdictions, rising) {
            write_records(&self.output_path("rising_jurisdictions.csv"), &rising)?;
            report.rising_jurisdictions = rising;
        }

        let icu = inputs.today(FeedKind::Hospitals).and_then(|hospitals| {
            icu_worst_counties(
                hospitals,
                &config.state,
                config.icu_top_n,
                &config.columns,
                &self.normalizer,
            )
        });
        if let Some(ranked) = report.record(PipelineName::IcuWorstCounties, icu) {
            write_table(&self.output_path("icu_worst_counties.csv"), &ranked)?;
            report.icu_worst_counties = Some(ranked.len());
        }

        let census = inputs.today(FeedKind::Hospitals).and_then(|hospitals| {
            hospital_census(hospitals, &config.state, &config.columns, &self.normalizer)
        });
        if let Some(census) = report.record(PipelineName::HospitalCensus, census) {
            info!(date = %census.date, in_use = census.in_use, "Med/surg census");
            report.bed_census = Some(census);
        }

        let vax = inputs.today(FeedKind::Vaccinations).and_then(|vaccinations| {
            vaccination_rolling_average(
                vaccinations,
                &config.county,
                &config.columns,
                config.window,
                &self.normalizer,
            )
        });
        if let Some(averages) = report.record(PipelineName::VaccinationRollingAverage, vax) {
            append_averages(
                &self.output_path("vaccination_rolling_average.csv"),
                run_date,
                &averages,
            )?;
            report.vaccination_averages = averages;
        }

        let tests = inputs.today(FeedKind::PcrTests).and_then(|today| {
            let yesterday = inputs.yesterday(FeedKind::PcrTests)?;
            test_volume_delta(today, yesterday, &config.columns.pcr_tests)
        });
        if let Some(delta) = report.record(PipelineName::TestVolumeDelta, tests) {
            info!(new_pcr_tests = delta, "PCR test delta");
            report.new_pcr_tests = Some(delta);
        }

        let ages = inputs.today(FeedKind::CountyTests).and_then(|tests| {
            age_case_trend(
                tests,
                &config.age_report,
                &config.columns.county_tests,
                &self.normalizer,
            )
        });
        if let Some(ages) = report.record(PipelineName::AgeCaseTrend, ages) {
            write_table(&self.output_path("age_cases_7d.csv"), &ages)?;
            report.age_case_days = Some(ages.len());
        }

        let weekdays = inputs.today(FeedKind::Cases).and_then(|cases| {
            let hospitals = inputs.today(FeedKind::Hospitals)?;
            let series = region_series(
                cases,
                hospitals,
                &config.state,
                &config.columns,
                &self.normalizer,
            )?;
            weekday_share(&series, config.weekday_weeks, &self.normalizer)
        });
        if let Some(shares) = report.record(PipelineName::WeekdayShare, weekdays) {
            report.weekday_share = shares;
        }

        Ok(report)
    }

    fn trend_for(&self, inputs: &FeedInputs, region: &RegionConfig) -> Result<CaseTrend, StageError> {
        let today = inputs.today(FeedKind::Cases)?;
        let yesterday = inputs.yesterday(FeedKind::Cases)?;
        let hospitals = inputs.today(FeedKind::Hospitals)?;
        case_trend(
            today,
            yesterday,
            hospitals,
            region,
            &self.config.columns,
            &self.normalizer,
        )
    }

    fn trend_path(&self, region: &RegionConfig) -> PathBuf {
        self.output_path(&format!("case_trend_{}.csv", region.slug()))
    }

    fn output_path(&self, name: &str) -> PathBuf {
        self.config.output_dir.join(name)
    }
}
