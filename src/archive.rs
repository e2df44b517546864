//! Dated snapshot archive and the today/yesterday rotation ring.
//!
//! Each feed pull is written once per run as `{tag}_{YYYYMMDD}.csv` (or
//! `.csv.gz`). The next day's run reads that copy back as its "yesterday".

use chrono::NaiveDate;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

use crate::table::CsvTable;

const STAMP_FORMAT: &str = "%Y%m%d";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to write snapshot {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read snapshot {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize snapshot '{tag}': {source}")]
    Serialize {
        tag: String,
        #[source]
        source: csv::Error,
    },
}

/// Where dated snapshots live.
pub trait ArchiveStore {
    /// Stores `bytes` for `(tag, stamp)` and returns where they went.
    fn put(&self, tag: &str, stamp: NaiveDate, bytes: &[u8]) -> Result<PathBuf, ArchiveError>;

    /// Reads the copy for `(tag, stamp)`, or `None` if there is none.
    fn get(&self, tag: &str, stamp: NaiveDate) -> Result<Option<Vec<u8>>, ArchiveError>;
}

/// A directory of dated CSV files, optionally gzip-compressed.
#[derive(Debug, Clone)]
pub struct FsArchiveStore {
    root: PathBuf,
    gzip: bool,
}

impl FsArchiveStore {
    pub fn new(root: impl Into<PathBuf>, gzip: bool) -> Self {
        Self {
            root: root.into(),
            gzip,
        }
    }

    pub fn path_for(&self, tag: &str, stamp: NaiveDate, gzip: bool) -> PathBuf {
        let ext = if gzip { "csv.gz" } else { "csv" };
        self.root
            .join(format!("{}_{}.{}", tag, stamp.format(STAMP_FORMAT), ext))
    }
}

impl ArchiveStore for FsArchiveStore {
    fn put(&self, tag: &str, stamp: NaiveDate, bytes: &[u8]) -> Result<PathBuf, ArchiveError> {
        let path = self.path_for(tag, stamp, self.gzip);
        let write_err = |source: std::io::Error| ArchiveError::Write {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.root).map_err(write_err)?;
        let body = if self.gzip {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(bytes).map_err(write_err)?;
            encoder.finish().map_err(write_err)?
        } else {
            bytes.to_vec()
        };
        std::fs::write(&path, body).map_err(write_err)?;
        Ok(path)
    }

    fn get(&self, tag: &str, stamp: NaiveDate) -> Result<Option<Vec<u8>>, ArchiveError> {
        // Prefer the configured encoding but accept either, so toggling gzip
        // does not orphan the previous day's copy.
        for gzip in [self.gzip, !self.gzip] {
            let path = self.path_for(tag, stamp, gzip);
            if !path.exists() {
                continue;
            }
            let read_err = |source: std::io::Error| ArchiveError::Read {
                path: path.clone(),
                source,
            };
            let raw = std::fs::read(&path).map_err(read_err)?;
            if !gzip {
                return Ok(Some(raw));
            }
            let mut out = Vec::new();
            GzDecoder::new(raw.as_slice())
                .read_to_end(&mut out)
                .map_err(read_err)?;
            return Ok(Some(out));
        }
        Ok(None)
    }
}

/// Writes each `(tag, stamp)` snapshot at most once per run.
pub struct SnapshotArchiver<A> {
    store: A,
    written: HashSet<(String, NaiveDate)>,
}

impl<A: ArchiveStore> SnapshotArchiver<A> {
    pub fn new(store: A) -> Self {
        Self {
            store,
            written: HashSet::new(),
        }
    }

    /// Archives a dated copy of `table`. Repeating a `(tag, stamp)` already
    /// written in this run does nothing.
    pub fn archive(&mut self, tag: &str, stamp: NaiveDate, table: &CsvTable) -> Result<(), ArchiveError> {
        let key = (tag.to_string(), stamp);
        if self.written.contains(&key) {
            debug!(tag, %stamp, "Snapshot already archived this run");
            return Ok(());
        }
        let bytes = table.to_csv_bytes().map_err(|source| ArchiveError::Serialize {
            tag: tag.to_string(),
            source,
        })?;
        let path = self.store.put(tag, stamp, &bytes)?;
        info!(tag, %stamp, path = %path.display(), rows = table.len(), "Snapshot archived");
        self.written.insert(key);
        Ok(())
    }

    pub fn load(&self, tag: &str, stamp: NaiveDate) -> Result<Option<Vec<u8>>, ArchiveError> {
        self.store.get(tag, stamp)
    }
}

/// Two generations of one feed: the current pull and the one before it.
#[derive(Debug, Default)]
pub struct SnapshotRing {
    current: Option<CsvTable>,
    previous: Option<CsvTable>,
}

impl SnapshotRing {
    /// Makes `current` the new "today". The old "today" becomes "yesterday"
    /// and the old "yesterday" is dropped. Returns the new "yesterday".
    pub fn rotate(&mut self, current: CsvTable) -> Option<&CsvTable> {
        self.previous = self.current.replace(current);
        self.previous.as_ref()
    }

    pub fn current(&self) -> Option<&CsvTable> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&CsvTable> {
        self.previous.as_ref()
    }
}
