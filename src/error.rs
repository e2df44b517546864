//! Error taxonomy for the table stages and named pipelines.

use std::fmt;
use thiserror::Error;

/// A failure inside one pipeline. Nothing here is recovered locally; the
/// orchestrator records it against the owning pipeline and moves on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("malformed CSV at record {record}: {reason}")]
    MalformedCsv { record: u64, reason: String },

    #[error("input contained no header row")]
    EmptyInput,

    #[error("unknown column '{name}'")]
    UnknownColumn { name: String },

    #[error("column index {index} out of range for a table with {width} columns")]
    ColumnOutOfRange { index: usize, width: usize },

    /// `row` is the row's position in the source feed, not in the stage's table.
    #[error("unsortable key '{value}' in column '{column}', feed row {row}")]
    UnsortableKey {
        column: String,
        row: usize,
        value: String,
    },

    #[error("non-numeric cell '{value}' in column '{column}', feed row {row}")]
    NonNumericCell {
        column: String,
        row: usize,
        value: String,
    },

    #[error("window at offset {offset} needs {width} rows but only {available} are available")]
    InsufficientWindowData {
        offset: usize,
        available: usize,
        width: usize,
    },

    #[error("no previous snapshot for feed '{tag}' dated {stamp}")]
    MissingSnapshot { tag: String, stamp: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// The pipeline step that produced a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Parse,
    Rotate,
    Filter,
    Normalize,
    Project,
    Join,
    Sort,
    Aggregate,
    Window,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Parse => "parse",
            Stage::Rotate => "rotate",
            Stage::Filter => "filter",
            Stage::Normalize => "normalize",
            Stage::Project => "project",
            Stage::Join => "join",
            Stage::Sort => "sort",
            Stage::Aggregate => "aggregate",
            Stage::Window => "window",
        };
        f.write_str(name)
    }
}

/// A [`PipelineError`] tagged with the stage it came out of.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: PipelineError,
}

/// Attaches a [`Stage`] to a stage result so failures report where they happened.
pub trait InStage<T> {
    fn in_stage(self, stage: Stage) -> std::result::Result<T, StageError>;
}

impl<T> InStage<T> for Result<T> {
    fn in_stage(self, stage: Stage) -> std::result::Result<T, StageError> {
        self.map_err(|source| StageError { stage, source })
    }
}
