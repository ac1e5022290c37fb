//! Radial-Velocity Cleaning Pipeline Library
//!
//! An outlier-robust, auditable cleaning pipeline for multi-instrument stellar
//! radial-velocity (RV) time series, built with Rust and Polars.
//!
//! # Overview
//!
//! The library turns the raw RV rows of one star into a series ready for a
//! periodogram or an orbital fit:
//!
//! - **Secular Correction**: Removes the perspective drift caused by proper motion
//! - **Filtering**: DRS version policy, quality control, uncertainty ceilings
//! - **Mean Adjustment**: Subtracts each instrument's weighted mean
//! - **MAD Clipping**: Iterative, per-instrument robust outlier rejection
//! - **Nightly Binning**: Weighted per-night, per-instrument aggregation
//! - **Removal Ledger**: Every removed row is kept with a reason code
//! - **Planet Search**: Periodogram grid and FAP-driven planet-count policy
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use warp_processing::{CsvDataSource, MadClipConfig, Pipeline, PipelineConfig, StaticAstrometry};
//! use std::sync::Arc;
//!
//! let config = PipelineConfig::builder()
//!     .max_rv_err(20.0)
//!     .mad_clip(MadClipConfig::default())
//!     .bin_nightly(true)
//!     .build()?;
//!
//! let result = Pipeline::builder()
//!     .config(config)
//!     .data_source(Arc::new(CsvDataSource::new("hd10700.csv")))
//!     .primary_astrometry(Arc::new(StaticAstrometry::new("gaia", Some(solution))))
//!     .on_stage(|report| println!("{}: {}", report.stage.display_name(), report.message))
//!     .build()?
//!     .run("HD 10700")?;
//!
//! for stats in result.collection.instrument_statistics()? {
//!     println!("{}: rms {:.2} m/s", stats.instrument, stats.rms);
//! }
//! let removed = result.collection.ledger().to_frame()?;
//! ```
//!
//! # Collaborators
//!
//! Archives and catalogs are reached through the traits of [`sources`]:
//! [`DataSource`], [`IdentityResolver`] and [`AstrometryProvider`]. Network
//! clients live outside this crate; the offline implementations shipped here
//! read CSV files or serve fixed values.
//!
//! # Stage by Stage
//!
//! [`MeasurementCollection`] exposes every stage as a method, for callers that
//! need a different order or extra removals:
//!
//! ```rust,ignore
//! let mut collection = MeasurementCollection::load(&source, "HD 10700", id, None)?;
//! collection.filter_qc()?;
//! collection.filter_rv_err(30.0)?;
//! collection.filter_negative_rv_err()?;
//! collection.adjust_means()?;
//! collection.remove_where(&my_mask, RemovalReason::Custom("manual".into()))?;
//! ```

pub mod binning;
pub mod collection;
pub mod columns;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod policy;
pub mod progress;
pub mod search;
pub mod secular;
pub mod sources;
pub mod stats;
pub mod utils;

// Re-exports for convenient access
pub use binning::NightlyBinner;
pub use collection::{LedgerEntry, MeasurementCollection, RemovalLedger, RemovalReason};
pub use config::{
    ConfigValidationError, InstrumentTables, MadClipConfig, PipelineConfig, PipelineConfigBuilder,
};
pub use error::{Result, ResultExt, RvError};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineResult, PipelineSummary};
pub use policy::PipelineVersionPolicy;
pub use progress::{ClosureStageObserver, CleaningStage, StageObserver, StageReport};
pub use search::{
    AngularGrid, DEFAULT_GRID_SAMPLES, Detection, KeplerianModel, Periodogram, PeriodogramResult,
    PlanetSearch, SearchOutcome, StopReason, compute_periodogram, frequency_grid,
};
pub use secular::{SecularCorrector, SecularOutcome, first_accepted, is_reliable, secular_acceleration};
pub use sources::{
    AstrometricSolution, AstrometryProvider, AstrometrySource, CandidateResolver, CatalogDirectory,
    CsvDataSource, DataSource, FrameDataSource, IdentityResolver, StaticAstrometry,
};
pub use stats::{InstrumentStats, instrument_statistics, mad_clip_mask, weighted_mean};
