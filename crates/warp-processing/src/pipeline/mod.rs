//! Pipeline module.
//!
//! This module provides the cleaning pipeline that folds the stages of a
//! [`MeasurementCollection`](crate::MeasurementCollection) in their fixed order.

mod builder;

pub use builder::{Pipeline, PipelineBuilder, PipelineResult, PipelineSummary};
