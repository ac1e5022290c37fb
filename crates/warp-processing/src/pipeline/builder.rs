//! Main cleaning pipeline.
//!
//! This module provides the core `Pipeline` struct and builder for
//! orchestrating the cleaning of one target's RV series.

use crate::binning::NightlyBinner;
use crate::collection::MeasurementCollection;
use crate::config::{MadClipConfig, PipelineConfig};
use crate::error::{Result, RvError};
use crate::policy::PipelineVersionPolicy;
use crate::progress::{ClosureStageObserver, StageObserver, StageReport};
use crate::secular::SecularCorrector;
use crate::sources::{AstrometryProvider, DataSource, IdentityResolver};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// The cleaning pipeline.
///
/// Use [`Pipeline::builder()`] to create a new pipeline.
///
/// # Example
///
/// ```rust,ignore
/// use warp_processing::{CsvDataSource, Pipeline, PipelineConfig};
/// use std::sync::Arc;
///
/// let result = Pipeline::builder()
///     .data_source(Arc::new(CsvDataSource::new("hd10700.csv")))
///     .config(PipelineConfig::builder().max_rv_err(20.0).build()?)
///     .on_stage(|report| println!("{}: {}", report.stage.display_name(), report.message))
///     .build()?
///     .run("HD 10700")?;
///
/// println!("{} rows kept", result.summary.rows_retained);
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    data_source: Arc<dyn DataSource>,
    identity_resolver: Option<Arc<dyn IdentityResolver>>,
    corrector: SecularCorrector,
    policy: PipelineVersionPolicy,
    binner: NightlyBinner,
    observer: Option<Arc<dyn StageObserver>>,
}

// Ensure Pipeline is Send (can be moved to another thread)
static_assertions::assert_impl_all!(Pipeline: Send);

/// What a pipeline run did, in numbers.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub rows_loaded: usize,
    pub rows_retained: usize,
    pub rows_removed: usize,
    /// Removed rows per reason code.
    pub removed_by_reason: BTreeMap<String, usize>,
    /// Secular drift applied, m/s/yr.
    pub secular_drift: Option<f64>,
    /// Weighted-mean offsets subtracted, per instrument (last adjustment).
    pub offsets: Vec<(String, f64)>,
    pub means_adjusted: bool,
    pub binned: bool,
    /// One line per stage.
    pub processing_steps: Vec<String>,
    pub duration_ms: u64,
}

/// Result of [`Pipeline::run`].
#[derive(Debug)]
pub struct PipelineResult {
    pub collection: MeasurementCollection,
    pub summary: PipelineSummary,
}

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load and clean the measurements of `display_name`.
    ///
    /// # Errors
    ///
    /// Identity resolution and data-source failures propagate, as do
    /// numeric failures of a stage. A missing astrometric solution does not.
    pub fn run(&self, display_name: &str) -> Result<PipelineResult> {
        match self.run_internal(display_name) {
            Ok(result) => {
                info!(
                    "Pipeline finished for {}: {} rows kept, {} removed",
                    display_name, result.summary.rows_retained, result.summary.rows_removed
                );
                Ok(result)
            }
            Err(e) => {
                error!("Pipeline error for {}: {}", display_name, e);
                Err(e)
            }
        }
    }

    fn run_internal(&self, display_name: &str) -> Result<PipelineResult> {
        let start_time = Instant::now();
        info!("Starting cleaning pipeline for {}...", display_name);

        let identity = match &self.identity_resolver {
            Some(resolver) => resolver.resolve(display_name)?,
            None => display_name.to_string(),
        };

        // Step 1: Load
        let mut collection = MeasurementCollection::load(
            self.data_source.as_ref(),
            display_name,
            identity,
            self.config.instruments.as_deref(),
        )?;
        if let Some(observer) = &self.observer {
            collection = collection.with_observer(observer.clone());
        }
        let rows_loaded = collection.len();

        // Step 2: Secular correction
        let secular_drift = if self.config.do_secular_corr {
            info!("Step 2: Applying secular acceleration correction...");
            collection.apply_secular_correction(&self.corrector, self.config.reference_epoch)?
        } else {
            info!("Step 2: Skipping secular correction (disabled)");
            None
        };

        // Steps 3-7: column and row filters
        collection.filter_columns(&self.config.tables.ignored_columns)?;
        collection.filter_pipelines(&self.policy)?;
        if self.config.keep_failed_qc {
            info!("Keeping rows that failed quality control");
        } else {
            collection.filter_qc()?;
        }
        collection.filter_rv_err(self.config.max_rv_err)?;
        collection.filter_negative_rv_err()?;

        // Step 8: Mean adjustment
        let mut offsets = Vec::new();
        if self.config.adjust_means {
            offsets = collection.adjust_means()?;
        }

        // Step 9: MAD clipping
        if let Some(clip) = &self.config.mad_clip {
            let readjust = clip.readjust_means && self.config.adjust_means;
            let clip = MadClipConfig {
                readjust_means: false,
                ..clip.clone()
            };
            if collection.mad_clip(&clip)? > 0 && readjust {
                offsets = collection.adjust_means()?;
            }
        }

        // Step 10: Nightly binning
        if self.config.bin_nightly {
            if collection.is_empty() {
                warn!("No rows left to bin for {}", display_name);
            } else {
                collection.bin_nightly(&self.binner)?;
            }
        }

        let summary = self.summarize(&collection, rows_loaded, secular_drift, offsets, start_time);
        Ok(PipelineResult {
            collection,
            summary,
        })
    }

    fn summarize(
        &self,
        collection: &MeasurementCollection,
        rows_loaded: usize,
        secular_drift: Option<f64>,
        offsets: Vec<(String, f64)>,
        start_time: Instant,
    ) -> PipelineSummary {
        let mut removed_by_reason = BTreeMap::new();
        for reason in collection.ledger().reasons() {
            *removed_by_reason.entry(reason).or_insert(0) += 1;
        }

        PipelineSummary {
            rows_loaded,
            rows_retained: collection.len(),
            rows_removed: collection.ledger().len(),
            removed_by_reason,
            secular_drift,
            offsets,
            means_adjusted: collection.means_adjusted(),
            binned: collection.is_binned(),
            processing_steps: collection
                .history()
                .iter()
                .map(|r| format!("{}: {}", r.stage.display_name(), r.message))
                .collect(),
            duration_ms: start_time.elapsed().as_millis() as u64,
        }
    }
}

/// Builder for creating a [`Pipeline`] with custom configuration.
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    data_source: Option<Arc<dyn DataSource>>,
    identity_resolver: Option<Arc<dyn IdentityResolver>>,
    primary_astrometry: Option<Arc<dyn AstrometryProvider>>,
    secondary_astrometry: Option<Arc<dyn AstrometryProvider>>,
    observer: Option<Arc<dyn StageObserver>>,
}

// Ensure PipelineBuilder is Send (can be moved to another thread during construction)
static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the source of raw measurement rows. Required.
    pub fn data_source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.data_source = Some(source);
        self
    }

    /// Set the resolver mapping display names to archive identifiers.
    ///
    /// Without one, the display name is used as the identifier.
    pub fn identity_resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.identity_resolver = Some(resolver);
        self
    }

    /// Set the primary astrometry provider (quality-checked).
    pub fn primary_astrometry(mut self, provider: Arc<dyn AstrometryProvider>) -> Self {
        self.primary_astrometry = Some(provider);
        self
    }

    /// Set the fallback astrometry provider.
    pub fn secondary_astrometry(mut self, provider: Arc<dyn AstrometryProvider>) -> Self {
        self.secondary_astrometry = Some(provider);
        self
    }

    /// Set a stage observer.
    pub fn observer(mut self, observer: Arc<dyn StageObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Set a stage callback closure.
    ///
    /// This is a convenience method for simple reporting.
    /// For more complex scenarios, use [`observer`](Self::observer).
    pub fn on_stage<F>(mut self, callback: F) -> Self
    where
        F: Fn(&StageReport) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(ClosureStageObserver::new(callback)));
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if the configuration is invalid or no data source was set.
    pub fn build(self) -> Result<Pipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let data_source = self
            .data_source
            .ok_or_else(|| RvError::InvalidConfig("a data source is required".to_string()))?;

        Ok(Pipeline {
            policy: PipelineVersionPolicy::new(config.tables.accepted_pipelines.clone()),
            binner: NightlyBinner::new(config.tables.bin_excluded_columns.clone()),
            corrector: SecularCorrector::new(self.primary_astrometry, self.secondary_astrometry),
            config,
            data_source,
            identity_resolver: self.identity_resolver,
            observer: self.observer,
        })
    }
}
