//! Configuration types for the RV cleaning pipeline.
//!
//! The per-instrument tables (accepted DRS versions, ignored metadata columns,
//! binning exclusions, default jitters) live in [`InstrumentTables`] and are
//! handed to the components that need them instead of living as globals.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameters of the iterative MAD clipping stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MadClipConfig {
    /// Modified z-score above which a point is rejected.
    /// Default: 5.0
    pub threshold: f64,

    /// Maximum number of clipping iterations per group.
    /// Default: 3
    pub iterations: usize,

    /// Re-run the mean adjustment after clipping removed points.
    /// Default: true
    pub readjust_means: bool,

    /// Column used to group points. `None` groups by instrument.
    /// Default: None
    pub group_column: Option<String>,
}

impl Default for MadClipConfig {
    fn default() -> Self {
        Self {
            threshold: 5.0,
            iterations: 3,
            readjust_means: true,
            group_column: None,
        }
    }
}

/// Fixed per-instrument reference tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentTables {
    /// Accepted DRS version substring, keyed by instrument name.
    pub accepted_pipelines: BTreeMap<String, String>,

    /// Columns whose name contains any of these substrings are dropped after load.
    pub ignored_columns: Vec<String>,

    /// Columns whose name contains any of these substrings are not carried into nightly bins.
    pub bin_excluded_columns: Vec<String>,

    /// Default instrumental jitter in m/s, keyed by instrument name.
    pub instrument_jitter: BTreeMap<String, f64>,

    /// Jitter used for instruments missing from `instrument_jitter`.
    pub default_jitter: f64,
}

impl Default for InstrumentTables {
    fn default() -> Self {
        let accepted_pipelines = [
            ("CORALIE98", "3.3"),
            ("CORALIE07", "3.4"),
            ("CORALIE14", "3.8"),
            ("CORALIE24", "3.8"),
            ("HARPS03", "3.3.6"),
            ("HARPS15", "3.3.6"),
            ("NIRPS", "3.3.12"),
            ("ESPRESSO19", "3.3.10"),
            ("ESPRESSO18", "3.3.10"),
        ]
        .into_iter()
        .map(|(ins, ver)| (ins.to_string(), ver.to_string()))
        .collect();

        let ignored_columns = [
            "pub_bibcode",
            "pub_ref",
            "db_spectrum",
            "spectro_analysis",
            "ins_adc",
            "photocenter",
            "spectro_cal_thfile",
            "clim_seeing",
            "spectro_ccf_mask_in_sof",
            "ins_opti",
            "th_ar",
            "ins1_adc",
            "ins2_adc",
            "ins3_adc",
            "ins4_adc",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let bin_excluded_columns = ["flux", "texp", "drift", "berv", "airmass", "continuum"]
            .into_iter()
            .map(String::from)
            .collect();

        let instrument_jitter = [
            ("CORALIE98", 5.0),
            ("CORALIE07", 8.0),
            ("CORALIE14", 3.0),
            ("CORAVEL", 150.0),
            ("HARPS03", 0.75),
            ("HARPS15", 0.75),
            ("HARPN", 0.75),
            ("HIRES", 2.5),
            ("CHIRON", 8.0),
            ("FEROS", 8.0),
        ]
        .into_iter()
        .map(|(ins, jit)| (ins.to_string(), jit))
        .collect();

        Self {
            accepted_pipelines,
            ignored_columns,
            bin_excluded_columns,
            instrument_jitter,
            default_jitter: 0.1,
        }
    }
}

impl InstrumentTables {
    /// Default jitter for an instrument, falling back to `default_jitter`.
    pub fn jitter_for(&self, instrument: &str) -> f64 {
        self.instrument_jitter
            .get(instrument)
            .copied()
            .unwrap_or(self.default_jitter)
    }
}

/// Configuration for the cleaning pipeline.
///
/// Use [`PipelineConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use warp_processing::config::{MadClipConfig, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .max_rv_err(20.0)
///     .mad_clip(MadClipConfig::default())
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rows with an RV uncertainty above this ceiling (m/s) are removed.
    /// Default: 30.0
    pub max_rv_err: f64,

    /// Subtract each instrument's weighted mean RV.
    /// Default: true
    pub adjust_means: bool,

    /// Correct the RVs for secular acceleration after load.
    /// Default: true
    pub do_secular_corr: bool,

    /// Keep rows whose DRS quality-control flag failed.
    /// Default: false
    pub keep_failed_qc: bool,

    /// MAD clipping parameters; `None` disables the stage.
    /// Default: None
    pub mad_clip: Option<MadClipConfig>,

    /// Replace the retained rows with nightly bins at the end.
    /// Default: false
    pub bin_nightly: bool,

    /// Restrict the fetch to instruments whose name contains one of these.
    /// Default: None (all instruments)
    pub instruments: Option<Vec<String>>,

    /// Skip instruments whose name contains "NDRS" when fetching.
    ///
    /// This is a data-source setting: it is read when a source is built from
    /// the configuration (see [`CsvDataSource::from_config`](crate::CsvDataSource::from_config)).
    /// `Pipeline` uses the data source it is given as is.
    /// Default: true
    pub skip_ndrs: bool,

    /// Reference epoch (reduced BJD) for the secular correction.
    /// If None, the epoch of the astrometric source is used.
    /// Default: None
    pub reference_epoch: Option<f64>,

    /// Per-instrument reference tables.
    pub tables: InstrumentTables,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_rv_err: 30.0,
            adjust_means: true,
            do_secular_corr: true,
            keep_failed_qc: false,
            mad_clip: None,
            bin_nightly: false,
            instruments: None,
            skip_ndrs: true,
            reference_epoch: None,
            tables: InstrumentTables::default(),
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(self.max_rv_err > 0.0) {
            return Err(ConfigValidationError::InvalidCeiling(self.max_rv_err));
        }

        if let Some(clip) = &self.mad_clip {
            if !(clip.threshold > 0.0) {
                return Err(ConfigValidationError::InvalidMadThreshold(clip.threshold));
            }
            if clip.iterations == 0 {
                return Err(ConfigValidationError::InvalidIterations(clip.iterations));
            }
        }

        if let Some(epoch) = self.reference_epoch
            && !epoch.is_finite()
        {
            return Err(ConfigValidationError::InvalidReferenceEpoch(epoch));
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid RV uncertainty ceiling: {0} (must be > 0)")]
    InvalidCeiling(f64),

    #[error("Invalid MAD threshold: {0} (must be > 0)")]
    InvalidMadThreshold(f64),

    #[error("Invalid MAD iterations: {0} (must be at least 1)")]
    InvalidIterations(usize),

    #[error("Invalid reference epoch: {0}")]
    InvalidReferenceEpoch(f64),
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    max_rv_err: Option<f64>,
    adjust_means: Option<bool>,
    do_secular_corr: Option<bool>,
    keep_failed_qc: Option<bool>,
    mad_clip: Option<MadClipConfig>,
    bin_nightly: Option<bool>,
    instruments: Option<Vec<String>>,
    skip_ndrs: Option<bool>,
    reference_epoch: Option<f64>,
    tables: Option<InstrumentTables>,
}

impl PipelineConfigBuilder {
    /// Set the RV uncertainty ceiling in m/s.
    pub fn max_rv_err(mut self, ceiling: f64) -> Self {
        self.max_rv_err = Some(ceiling);
        self
    }

    /// Enable or disable the per-instrument mean adjustment.
    pub fn adjust_means(mut self, adjust: bool) -> Self {
        self.adjust_means = Some(adjust);
        self
    }

    /// Enable or disable the secular-acceleration correction.
    pub fn do_secular_corr(mut self, correct: bool) -> Self {
        self.do_secular_corr = Some(correct);
        self
    }

    /// Keep rows that failed the DRS quality control.
    pub fn keep_failed_qc(mut self, keep: bool) -> Self {
        self.keep_failed_qc = Some(keep);
        self
    }

    /// Enable MAD clipping with the given parameters.
    pub fn mad_clip(mut self, clip: MadClipConfig) -> Self {
        self.mad_clip = Some(clip);
        self
    }

    /// Enable or disable nightly binning.
    pub fn bin_nightly(mut self, bin: bool) -> Self {
        self.bin_nightly = Some(bin);
        self
    }

    /// Restrict the fetch to the given instruments.
    pub fn instruments<I, S>(mut self, instruments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instruments = Some(instruments.into_iter().map(Into::into).collect());
        self
    }

    /// Skip or keep "NDRS" instruments at fetch time.
    pub fn skip_ndrs(mut self, skip: bool) -> Self {
        self.skip_ndrs = Some(skip);
        self
    }

    /// Set an explicit reference epoch for the secular correction.
    pub fn reference_epoch(mut self, epoch: f64) -> Self {
        self.reference_epoch = Some(epoch);
        self
    }

    /// Replace the per-instrument reference tables.
    pub fn tables(mut self, tables: InstrumentTables) -> Self {
        self.tables = Some(tables);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let config = PipelineConfig {
            max_rv_err: self.max_rv_err.unwrap_or(30.0),
            adjust_means: self.adjust_means.unwrap_or(true),
            do_secular_corr: self.do_secular_corr.unwrap_or(true),
            keep_failed_qc: self.keep_failed_qc.unwrap_or(false),
            mad_clip: self.mad_clip,
            bin_nightly: self.bin_nightly.unwrap_or(false),
            instruments: self.instruments,
            skip_ndrs: self.skip_ndrs.unwrap_or(true),
            reference_epoch: self.reference_epoch,
            tables: self.tables.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}
