//! Run configuration.
//!
//! Loaded from a JSON file when one is given, otherwise the built-in defaults
//! for the Pennsylvania feeds. Any field left out of the file keeps its default.
//! `ARCHIVE_DIR` and `OUTPUT_DIR` override the directories.

use anyhow::{Context, Result, ensure};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::date::default_formats;
use crate::filter::MatchMode;
use crate::stats::IcuCapacity;
use crate::window::WindowSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub archive_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Gzip archived snapshots.
    pub gzip_archive: bool,
    /// How far back the comparison snapshot for day-over-day deltas is.
    pub lookback_days: u32,
    /// Per-request HTTP timeout.
    pub http_timeout_secs: u64,
    pub icu_top_n: usize,
    pub window: WindowSpec,
    /// Weeks of statewide history behind the weekday case share.
    pub weekday_weeks: usize,
    pub date_formats: Vec<String>,
    /// Regions that each get a case trend.
    pub regions: Vec<RegionConfig>,
    /// County for the vaccination averages.
    pub county: RegionConfig,
    /// Statewide row: left out of the ICU ranking, source of the bed census
    /// and the weekday share.
    pub state: RegionConfig,
    pub age_report: AgeReportConfig,
    pub feeds: FeedsConfig,
    pub columns: ColumnsConfig,
}

fn allegheny() -> RegionConfig {
    RegionConfig {
        population: Some(1_213_570),
        icu_capacity: Some(IcuCapacity {
            beds: 560,
            normally_free: 180,
        }),
        ..RegionConfig::new("Allegheny County", "Allegheny", MatchMode::Contains)
    }
}

fn pennsylvania() -> RegionConfig {
    RegionConfig {
        level: RegionLevel::State,
        population: Some(12_964_056),
        icu_capacity: Some(IcuCapacity {
            beds: 4200,
            normally_free: 1040,
        }),
        ..RegionConfig::new("Pennsylvania", "Pennsylvania", MatchMode::Exact)
    }
}

fn philadelphia() -> RegionConfig {
    RegionConfig {
        population: Some(1_585_480),
        icu_capacity: Some(IcuCapacity {
            beds: 560,
            normally_free: 180,
        }),
        ..RegionConfig::new("Philadelphia County", "Philadelphia", MatchMode::Exact)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            archive_dir: PathBuf::from("pa_data"),
            output_dir: PathBuf::from("output"),
            gzip_archive: false,
            lookback_days: 1,
            http_timeout_secs: 60,
            icu_top_n: 15,
            window: WindowSpec::default(),
            weekday_weeks: 16,
            date_formats: default_formats(),
            regions: vec![allegheny(), pennsylvania(), philadelphia()],
            county: allegheny(),
            state: pennsylvania(),
            age_report: AgeReportConfig::default(),
            feeds: FeedsConfig::default(),
            columns: ColumnsConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config '{}'", path.display()))
    }

    /// Loads `path` if given, else the defaults, then applies env overrides
    /// and validates the result.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would make a run silently meaningless.
    pub fn validate(&self) -> Result<()> {
        // a zero lookback compares today's pull with itself
        ensure!(self.lookback_days >= 1, "lookback_days must be at least 1");
        ensure!(self.window.width >= 1, "window width must be at least 1");
        ensure!(
            self.window.min_offset <= self.window.max_offset,
            "window min_offset must not exceed max_offset"
        );
        ensure!(self.weekday_weeks >= 1, "weekday_weeks must be at least 1");
        Ok(())
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("ARCHIVE_DIR") {
            self.archive_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        self
    }
}

/// Whether a region is a county or the whole state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionLevel {
    #[default]
    County,
    State,
}

/// A region to report on and how to find its rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Display name, also used for output file names.
    pub name: String,
    pub needle: String,
    #[serde(default)]
    pub mode: MatchMode,
    #[serde(default)]
    pub level: RegionLevel,
    #[serde(default)]
    pub population: Option<u64>,
    #[serde(default)]
    pub icu_capacity: Option<IcuCapacity>,
}

impl RegionConfig {
    /// A county-level region with no population or ICU capacity.
    pub fn new(name: &str, needle: &str, mode: MatchMode) -> Self {
        Self {
            name: name.to_string(),
            needle: needle.to_string(),
            mode,
            level: RegionLevel::County,
            population: None,
            icu_capacity: None,
        }
    }

    /// File-name-safe form of the display name.
    pub fn slug(&self) -> String {
        self.name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Archive tag, e.g. `daily` for `daily_20220105.csv`.
    pub tag: String,
    /// `http(s)://` URL or local path.
    pub url: String,
}

impl FeedConfig {
    fn new(tag: &str, url: &str) -> Self {
        Self {
            tag: tag.to_string(),
            url: url.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedsConfig {
    pub cases: FeedConfig,
    pub hospitals: FeedConfig,
    pub vaccinations: FeedConfig,
    pub pcr_tests: FeedConfig,
    /// Per-test dump for the vaccination county; feeds the age case trend.
    pub county_tests: FeedConfig,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            cases: FeedConfig::new(
                "daily",
                "https://data.pa.gov/api/views/j72v-r42c/rows.csv?accessType=DOWNLOAD",
            ),
            hospitals: FeedConfig::new(
                "today",
                "https://data.pa.gov/api/views/kayn-sjhx/rows.csv?accessType=DOWNLOAD",
            ),
            vaccinations: FeedConfig::new(
                "vax",
                "https://data.pa.gov/api/views/bicw-3gwi/rows.csv?accessType=DOWNLOAD",
            ),
            pcr_tests: FeedConfig::new(
                "pcr_test_counts",
                "https://data.pa.gov/api/views/8rz6-pbrp/rows.csv?accessType=DOWNLOAD",
            ),
            county_tests: FeedConfig::new(
                "testday",
                "https://data.wprdc.org/datastore/dump/4051a85a-bf92-45fc-adc6-b31eb8efaad4",
            ),
        }
    }
}

impl FeedsConfig {
    pub fn all(&self) -> [(FeedKind, &FeedConfig); 5] {
        [
            (FeedKind::Cases, &self.cases),
            (FeedKind::Hospitals, &self.hospitals),
            (FeedKind::Vaccinations, &self.vaccinations),
            (FeedKind::PcrTests, &self.pcr_tests),
            (FeedKind::CountyTests, &self.county_tests),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Cases,
    Hospitals,
    Vaccinations,
    PcrTests,
    CountyTests,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnsConfig {
    pub cases: CaseColumns,
    pub hospitals: HospitalColumns,
    pub vaccinations: VaxColumns,
    pub pcr_tests: TestColumns,
    pub county_tests: TestDumpColumns,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseColumns {
    pub region: String,
    pub date: String,
    pub new_cases: String,
}

impl Default for CaseColumns {
    fn default() -> Self {
        Self {
            region: "Jurisdiction".to_string(),
            date: "Date".to_string(),
            new_cases: "New Cases".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HospitalColumns {
    pub region: String,
    pub date: String,
    pub hospitalized: String,
    pub icu: String,
    pub icu_available: String,
    pub med_surg_available: String,
    pub med_surg_total: String,
}

impl Default for HospitalColumns {
    fn default() -> Self {
        Self {
            region: "County".to_string(),
            date: "Date of data".to_string(),
            hospitalized: "COVID-19 Patients Hospitalized".to_string(),
            icu: "COVID-ICU".to_string(),
            icu_available: "Adult ICU Beds Available".to_string(),
            med_surg_available: "Medical/Surgical Beds Available".to_string(),
            med_surg_total: "Medical/Surgical Beds Total".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaxColumns {
    pub region: String,
    pub date: String,
    pub first_dose: String,
    pub second_dose: String,
    pub booster: String,
}

impl Default for VaxColumns {
    fn default() -> Self {
        Self {
            region: "County".to_string(),
            date: "Date".to_string(),
            first_dose: "Partially Covered".to_string(),
            second_dose: "Fully Covered".to_string(),
            booster: "Additional Dose 1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestColumns {
    pub new_tests: String,
}

impl Default for TestColumns {
    fn default() -> Self {
        Self {
            new_tests: "New PCR Tests".to_string(),
        }
    }
}

/// Columns of the per-test county dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestDumpColumns {
    pub report_date: String,
    pub case_status: String,
    pub age_bucket: String,
}

impl Default for TestDumpColumns {
    fn default() -> Self {
        Self {
            report_date: "report_date".to_string(),
            case_status: "case_status".to_string(),
            age_bucket: "age_bucket".to_string(),
        }
    }
}

/// Which rows of the county test dump count as cases, and how to bucket them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgeReportConfig {
    /// Reports before this date are ignored.
    pub since: NaiveDate,
    pub case_statuses: Vec<String>,
    /// Output column order. Matched case-insensitively; anything else lands
    /// in `unknown_bucket`.
    pub buckets: Vec<String>,
    pub unknown_bucket: String,
}

impl Default for AgeReportConfig {
    fn default() -> Self {
        let buckets = [
            "0 to 9", "10 to 19", "20 to 29", "30 to 39", "40 to 49", "50 to 59", "60 to 69",
            "70+",
        ];
        Self {
            since: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap_or_default(),
            case_statuses: vec!["Probable".to_string(), "Confirmed".to_string()],
            buckets: buckets.iter().map(|b| b.to_string()).collect(),
            unknown_bucket: "unknown".to_string(),
        }
    }
}
