//! Stage reporting for the cleaning pipeline.
//!
//! Every stage that touches a [`MeasurementCollection`](crate::MeasurementCollection)
//! produces a [`StageReport`]. Reports are kept in the collection's history and
//! handed to an optional [`StageObserver`].
//!
//! # Example
//!
//! ```rust,ignore
//! use warp_processing::Pipeline;
//!
//! let result = Pipeline::builder()
//!     .data_source(source)
//!     .on_stage(|report| {
//!         println!("[{}] {}", report.stage.display_name(), report.message);
//!     })
//!     .build()?
//!     .run("HD 10700")?;
//! ```

use serde::{Deserialize, Serialize};

/// Stages of the cleaning pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleaningStage {
    /// Rows fetched from the data source
    Load,
    /// Secular-acceleration correction of the RVs
    SecularCorrection,
    /// Metadata columns dropped
    ColumnFilter,
    /// Rejected DRS versions removed
    PipelineFilter,
    /// Failed quality control removed
    QcFilter,
    /// Uncertainties above the ceiling removed
    RvErrFilter,
    /// Non-positive uncertainties removed
    NegativeRvErrFilter,
    /// Per-instrument weighted mean subtracted
    MeanAdjustment,
    /// Iterative MAD clipping
    MadClip,
    /// Rows collapsed into nightly bins
    NightlyBinning,
    /// Caller-defined removal
    Custom,
}

impl CleaningStage {
    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Load => "Loading",
            Self::SecularCorrection => "Secular Correction",
            Self::ColumnFilter => "Filtering Columns",
            Self::PipelineFilter => "Filtering Pipelines",
            Self::QcFilter => "Quality Control",
            Self::RvErrFilter => "Filtering Uncertainties",
            Self::NegativeRvErrFilter => "Filtering Negative Uncertainties",
            Self::MeanAdjustment => "Adjusting Means",
            Self::MadClip => "MAD Clipping",
            Self::NightlyBinning => "Nightly Binning",
            Self::Custom => "Custom Removal",
        }
    }
}

/// What one stage did to the working set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: CleaningStage,
    pub rows_before: usize,
    pub rows_after: usize,
    /// Human-readable description of the change
    pub message: String,
}

impl StageReport {
    pub fn new(
        stage: CleaningStage,
        rows_before: usize,
        rows_after: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            rows_before,
            rows_after,
            message: message.into(),
        }
    }

    /// Rows that left the working set during the stage.
    pub fn rows_removed(&self) -> usize {
        self.rows_before.saturating_sub(self.rows_after)
    }
}

/// Trait for receiving stage reports.
///
/// Implementations must be `Send + Sync` so that a pipeline carrying an
/// observer can run on a worker thread.
pub trait StageObserver: Send + Sync {
    /// Called once per stage, after the stage finished.
    fn report(&self, report: &StageReport);
}

/// Wrapper that implements [`StageObserver`] using a closure.
pub struct ClosureStageObserver<F>
where
    F: Fn(&StageReport) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureStageObserver<F>
where
    F: Fn(&StageReport) + Send + Sync,
{
    /// Creates a new closure-based observer.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> StageObserver for ClosureStageObserver<F>
where
    F: Fn(&StageReport) + Send + Sync,
{
    fn report(&self, report: &StageReport) {
        (self.callback)(report);
    }
}

static_assertions::assert_impl_all!(StageReport: Send, Sync);
static_assertions::assert_obj_safe!(StageObserver);
