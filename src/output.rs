//! Writing pipeline results to disk.
//!
//! Trend, ranking and record tables are rewritten on every run; the rolling
//! average log is append-only.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::{debug, info};

use crate::table::CsvTable;
use crate::window::WindowAverage;

/// Writes `table` as a CSV file, replacing any previous contents.
pub fn write_table(path: &Path, table: &CsvTable) -> Result<()> {
    ensure_parent(path)?;
    let bytes = table.to_csv_bytes()?;
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), rows = table.len(), "Table written");
    Ok(())
}

/// One row of the rolling average log.
#[derive(Debug, Serialize)]
struct AverageLogRow {
    run_date: NaiveDate,
    offset: usize,
    avg_doses: f64,
    avg_boosters: f64,
}

/// Appends one run's window averages to the log at `path`.
///
/// Creates the file with headers if it does not already exist. Existing rows
/// are never touched, so re-running a day appends a second block for it.
pub fn append_averages(path: &Path, run_date: NaiveDate, averages: &[WindowAverage]) -> Result<()> {
    ensure_parent(path)?;
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending window averages");

    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    for avg in averages {
        writer.serialize(AverageLogRow {
            run_date,
            offset: avg.offset,
            avg_doses: avg.avg_doses,
            avg_boosters: avg.avg_boosters,
        })?;
    }
    writer.flush()?;

    Ok(())
}

/// Writes serializable records as a CSV file with a header row, replacing any
/// previous contents. An empty slice still gets a file, without a header.
pub fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = records.len(), "Records written");
    Ok(())
}

/// Writes `value` as pretty-printed JSON.
pub fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    ensure_parent(path)?;
    let body = serde_json::to_string_pretty(value)?;
    std::fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::table;
    use std::env;
    use std::fs;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    fn averages() -> Vec<WindowAverage> {
        vec![
            WindowAverage {
                offset: 8,
                avg_doses: 10.0,
                avg_boosters: 2.0,
            },
            WindowAverage {
                offset: 7,
                avg_doses: 11.0,
                avg_boosters: 2.5,
            },
        ]
    }

    #[derive(Serialize)]
    struct Rising {
        region: &'static str,
        avg_7d: f64,
        two_weeks_ago: Option<f64>,
    }

    #[test]
    fn test_write_records() {
        let path = temp_path("covid_pipeline_test_records.csv");
        let records = [
            Rising {
                region: "Beaver",
                avg_7d: 12.5,
                two_weeks_ago: None,
            },
            Rising {
                region: "Erie",
                avg_7d: 3.0,
                two_weeks_ago: Some(1.0),
            },
        ];

        write_records(&path, &records).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines, ["region,avg_7d,two_weeks_ago", "Beaver,12.5,", "Erie,3.0,1.0"]);

        // rewritten, not appended
        write_records(&path, &records[..1]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_averages_writes_header_once() {
        let path = temp_path("covid_pipeline_test_averages.csv");
        let _ = fs::remove_file(&path);
        let day = NaiveDate::from_ymd_opt(2022, 1, 5).unwrap();

        append_averages(&path, day, &averages()).unwrap();
        append_averages(&path, day, &averages()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.contains("run_date")).count();
        assert_eq!(header_count, 1);
        // 1 header + 2 runs of 2 rows
        assert_eq!(content.lines().count(), 5);
        assert!(content.contains("2022-01-05,7,11.0,2.5"));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_table_replaces_contents() {
        let path = temp_path("covid_pipeline_test_output/trend.csv");
        let _ = fs::remove_file(&path);

        write_table(&path, &table(&["a"], &[&["1"], &["2"]])).unwrap();
        write_table(&path, &table(&["a"], &[&["3"]])).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "a\n3\n");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_json() {
        let path = temp_path("covid_pipeline_test_report.json");
        write_json(&path, &averages()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value[1]["offset"], 7);
        fs::remove_file(&path).unwrap();
    }
}
