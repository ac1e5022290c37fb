//! The measurement collection of one target.
//!
//! A [`MeasurementCollection`] owns the working table of RV rows and the
//! [`RemovalLedger`] of everything taken out of it. Every stage either removes
//! rows (and records them with a reason) or rewrites column values. Nightly
//! binning replaces the rows and ends per-row filtering.

pub mod ledger;

pub use ledger::{LedgerEntry, RemovalLedger, RemovalReason};

use crate::binning::NightlyBinner;
use crate::columns;
use crate::config::{InstrumentTables, MadClipConfig};
use crate::error::{Result, ResultExt, RvError};
use crate::policy::PipelineVersionPolicy;
use crate::progress::{CleaningStage, StageObserver, StageReport};
use crate::search::{
    KeplerianModel, Periodogram, PeriodogramResult, PlanetSearch, SearchOutcome, compute_periodogram,
};
use crate::secular::SecularCorrector;
use crate::sources::DataSource;
use crate::stats::{InstrumentStats, instrument_statistics, mad_clip_mask, weighted_mean};
use crate::utils::{bool_values, column_names, f64_values, has_column, str_values, unique_in_order};
use polars::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// RV rows of one target, with removal provenance.
pub struct MeasurementCollection {
    name: String,
    identity: String,
    data: DataFrame,
    ledger: RemovalLedger,
    means_adjusted: bool,
    binned: bool,
    history: Vec<StageReport>,
    observer: Option<Arc<dyn StageObserver>>,
}

impl fmt::Debug for MeasurementCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeasurementCollection")
            .field("name", &self.name)
            .field("identity", &self.identity)
            .field("rows", &self.data.height())
            .field("removed", &self.ledger.len())
            .field("means_adjusted", &self.means_adjusted)
            .field("binned", &self.binned)
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(MeasurementCollection: Send);

impl MeasurementCollection {
    /// Wrap an already fetched table.
    ///
    /// `name` is the display name used for catalog lookups, `identity` the
    /// archive identifier. The rows are sorted by timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`RvError::ColumnNotFound`] when a required column is missing.
    pub fn from_frame(
        name: impl Into<String>,
        identity: impl Into<String>,
        data: DataFrame,
    ) -> Result<Self> {
        for required in columns::REQUIRED {
            if !has_column(&data, required) {
                return Err(RvError::ColumnNotFound(required.to_string()));
            }
        }
        let data = data.sort([columns::TIMESTAMP], SortMultipleOptions::default())?;

        Ok(Self {
            name: name.into(),
            identity: identity.into(),
            data,
            ledger: RemovalLedger::new(),
            means_adjusted: false,
            binned: false,
            history: Vec::new(),
            observer: None,
        })
    }

    /// Fetch the rows of `identity` from `source`.
    pub fn load(
        source: &dyn DataSource,
        name: impl Into<String>,
        identity: impl Into<String>,
        instruments: Option<&[String]>,
    ) -> Result<Self> {
        let name = name.into();
        let identity = identity.into();
        info!("Loading data for {} from {}", name, source.name());

        let data = source
            .fetch(&identity, instruments)
            .context(format!("fetching {} from {}", name, source.name()))?;
        if data.height() == 0 {
            return Err(RvError::NotFound(format!("no data found for {}", name)));
        }

        let mut collection = Self::from_frame(name, identity, data)?;
        collection.log_instrument_counts()?;
        let n = collection.len();
        collection.notify(StageReport::new(
            CleaningStage::Load,
            0,
            n,
            format!("Loaded {n} rows"),
        ));
        Ok(collection)
    }

    /// Deliver stage reports to `observer`. Reports already in the history are replayed.
    pub fn with_observer(mut self, observer: Arc<dyn StageObserver>) -> Self {
        for report in &self.history {
            observer.report(report);
        }
        self.observer = Some(observer);
        self
    }

    fn log_instrument_counts(&self) -> Result<()> {
        let instruments = str_values(&self.data, columns::INSTRUMENT)?;
        let qc = if has_column(&self.data, columns::QC) {
            Some(bool_values(&self.data, columns::QC)?)
        } else {
            None
        };

        for ins in unique_in_order(&instruments) {
            let rows: Vec<usize> = (0..instruments.len()).filter(|&i| instruments[i] == ins).collect();
            let bad_qc = qc
                .as_ref()
                .map_or(0, |flags| rows.iter().filter(|&&i| !flags[i]).count());
            info!(
                "Retrieved {} points, including {} for which the QC failed, for instrument {}",
                rows.len(),
                bad_qc,
                ins
            );
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The retained rows.
    pub fn data(&self) -> &DataFrame {
        &self.data
    }

    pub fn ledger(&self) -> &RemovalLedger {
        &self.ledger
    }

    pub fn means_adjusted(&self) -> bool {
        self.means_adjusted
    }

    pub fn is_binned(&self) -> bool {
        self.binned
    }

    /// Reports of every stage run on this collection, in order.
    pub fn history(&self) -> &[StageReport] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.data.height()
    }

    pub fn is_empty(&self) -> bool {
        self.data.height() == 0
    }

    /// Instrument names in order of first appearance.
    pub fn instruments(&self) -> Result<Vec<String>> {
        Ok(unique_in_order(&str_values(&self.data, columns::INSTRUMENT)?))
    }

    fn notify(&mut self, report: StageReport) {
        if let Some(observer) = &self.observer {
            observer.report(&report);
        }
        self.history.push(report);
    }

    fn replace_column(&mut self, name: &str, values: Vec<f64>) -> Result<()> {
        self.data.replace(name, Series::new(name.into(), values))?;
        Ok(())
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Move the rows where `condition` is true into the ledger under `reason`.
    ///
    /// Returns the number of rows removed. Removing nothing is a no-op apart
    /// from a diagnostic.
    ///
    /// # Errors
    ///
    /// [`RvError::LengthMismatch`] when `condition` does not have one entry
    /// per retained row, [`RvError::AlreadyBinned`] after nightly binning.
    pub fn remove_where(&mut self, condition: &[bool], reason: RemovalReason) -> Result<usize> {
        if self.binned {
            return Err(RvError::AlreadyBinned);
        }
        let before = self.data.height();
        if condition.len() != before {
            return Err(RvError::LengthMismatch {
                expected: before,
                actual: condition.len(),
            });
        }

        let stage = stage_for(&reason);
        let removed = condition.iter().filter(|c| **c).count();
        if removed == 0 {
            debug!("No rows removed for {}", reason);
            self.notify(StageReport::new(stage, before, before, format!("No rows removed for {reason}")));
            return Ok(0);
        }

        let drop_mask = BooleanChunked::from_slice("mask".into(), condition);
        let keep: Vec<bool> = condition.iter().map(|c| !c).collect();
        let keep_mask = BooleanChunked::from_slice("mask".into(), &keep);

        let dropped = self.data.filter(&drop_mask)?;
        let retained = self.data.filter(&keep_mask)?;
        self.ledger.record(dropped, reason.clone());
        self.data = retained;

        info!("Removed {} of {} rows ({})", removed, before, reason);
        self.notify(StageReport::new(
            stage,
            before,
            self.data.height(),
            format!("Removed {removed} rows ({reason})"),
        ));
        Ok(removed)
    }

    // =========================================================================
    // Stages
    // =========================================================================

    /// Correct the RVs for secular acceleration.
    ///
    /// Returns the drift applied (m/s/yr), or `None` when no astrometry was usable
    /// and the RVs were left unchanged.
    pub fn apply_secular_correction(
        &mut self,
        corrector: &SecularCorrector,
        reference_epoch: Option<f64>,
    ) -> Result<Option<f64>> {
        let n = self.data.height();
        let timestamps = f64_values(&self.data, columns::TIMESTAMP)?;
        let rv = f64_values(&self.data, columns::RV)?;

        let outcome = corrector.apply(&self.name, &timestamps, &rv, reference_epoch);
        let Some((solution, drift, epoch)) = outcome.applied else {
            self.notify(StageReport::new(
                CleaningStage::SecularCorrection,
                n,
                n,
                "No astrometry available; RVs left uncorrected",
            ));
            return Ok(None);
        };

        self.replace_column(columns::RV, outcome.corrected)?;
        self.notify(StageReport::new(
            CleaningStage::SecularCorrection,
            n,
            n,
            format!(
                "Applied {:.4} m/s/yr secular drift ({:?}, epoch {})",
                drift, solution.source, epoch
            ),
        ));
        Ok(Some(drift))
    }

    /// Drop the columns whose name contains one of `ignored`.
    ///
    /// Required columns are never dropped. Returns the dropped names.
    pub fn filter_columns(&mut self, ignored: &[String]) -> Result<Vec<String>> {
        let (dropped, kept): (Vec<String>, Vec<String>) =
            column_names(&self.data).into_iter().partition(|name| {
                !columns::REQUIRED.contains(&name.as_str())
                    && ignored.iter().any(|pattern| name.contains(pattern.as_str()))
            });

        let n = self.data.height();
        if dropped.is_empty() {
            debug!("No ignored columns present");
        } else {
            self.data = self.data.select(kept)?;
            info!("Dropped {} metadata columns", dropped.len());
        }
        self.notify(StageReport::new(
            CleaningStage::ColumnFilter,
            n,
            n,
            format!("Dropped {} columns", dropped.len()),
        ));
        Ok(dropped)
    }

    /// Remove rows produced by DRS versions the policy rejects.
    pub fn filter_pipelines(&mut self, policy: &PipelineVersionPolicy) -> Result<usize> {
        if !has_column(&self.data, columns::DRS_VERSION) {
            debug!("No {} column; skipping pipeline filter", columns::DRS_VERSION);
            return self.remove_where(&vec![false; self.data.height()], RemovalReason::PipelineFiltered);
        }

        let instruments = str_values(&self.data, columns::INSTRUMENT)?;
        let versions = str_values(&self.data, columns::DRS_VERSION)?;

        let mut accepted: HashMap<String, Vec<String>> = HashMap::new();
        for ins in unique_in_order(&instruments) {
            let observed: Vec<String> = unique_in_order(
                &instruments
                    .iter()
                    .zip(&versions)
                    .filter(|(i, _)| **i == ins)
                    .map(|(_, v)| v.clone())
                    .collect::<Vec<_>>(),
            );
            let kept = policy.get_latest_pipeline(&ins, &observed);
            accepted.insert(ins, kept);
        }

        let condition: Vec<bool> = instruments
            .iter()
            .zip(&versions)
            .map(|(ins, ver)| accepted.get(ins).is_some_and(|ok| !ok.contains(ver)))
            .collect();
        self.remove_where(&condition, RemovalReason::PipelineFiltered)
    }

    /// Remove rows whose DRS quality-control flag failed. A missing flag counts as failed.
    pub fn filter_qc(&mut self) -> Result<usize> {
        if !has_column(&self.data, columns::QC) {
            debug!("No {} column; skipping QC filter", columns::QC);
            return self.remove_where(&vec![false; self.data.height()], RemovalReason::DrsQc);
        }
        let condition: Vec<bool> = bool_values(&self.data, columns::QC)?
            .into_iter()
            .map(|passed| !passed)
            .collect();
        self.remove_where(&condition, RemovalReason::DrsQc)
    }

    /// Remove rows whose RV uncertainty exceeds `ceiling`.
    pub fn filter_rv_err(&mut self, ceiling: f64) -> Result<usize> {
        let condition: Vec<bool> = f64_values(&self.data, columns::RV_ERR)?
            .into_iter()
            .map(|err| err > ceiling)
            .collect();
        self.remove_where(&condition, RemovalReason::RvErrAbove(ceiling))
    }

    /// Remove rows whose RV uncertainty is not strictly positive (NaN included).
    pub fn filter_negative_rv_err(&mut self) -> Result<usize> {
        let condition: Vec<bool> = f64_values(&self.data, columns::RV_ERR)?
            .into_iter()
            .map(|err| !(err > 0.0))
            .collect();
        self.remove_where(&condition, RemovalReason::NegativeRvErr)
    }

    /// Subtract each instrument's weighted mean RV.
    ///
    /// Returns the subtracted offsets in order of first appearance.
    pub fn adjust_means(&mut self) -> Result<Vec<(String, f64)>> {
        let instruments = str_values(&self.data, columns::INSTRUMENT)?;
        let mut rv = f64_values(&self.data, columns::RV)?;
        let rv_err = f64_values(&self.data, columns::RV_ERR)?;

        let mut offsets = Vec::new();
        for ins in unique_in_order(&instruments) {
            let rows: Vec<usize> = (0..rv.len()).filter(|&i| instruments[i] == ins).collect();
            let values: Vec<f64> = rows.iter().map(|&i| rv[i]).collect();
            let errors: Vec<f64> = rows.iter().map(|&i| rv_err[i]).collect();
            let (mean, _) = weighted_mean(&values, &errors).context(format!("adjusting mean of {ins}"))?;

            for &i in &rows {
                rv[i] -= mean;
            }
            debug!("{}: subtracted weighted mean {:.3} m/s", ins, mean);
            offsets.push((ins, mean));
        }

        self.replace_column(columns::RV, rv)?;
        self.means_adjusted = true;

        let n = self.data.height();
        self.notify(StageReport::new(
            CleaningStage::MeanAdjustment,
            n,
            n,
            format!("Adjusted means of {} instruments", offsets.len()),
        ));
        Ok(offsets)
    }

    /// Remove MAD outliers, grouped by instrument unless `config.group_column` is set.
    ///
    /// When rows were removed and `config.readjust_means` is true, the means are
    /// adjusted again.
    pub fn mad_clip(&mut self, config: &MadClipConfig) -> Result<usize> {
        let group_column = config.group_column.as_deref().unwrap_or(columns::INSTRUMENT);
        let groups = str_values(&self.data, group_column)?;
        let rv = f64_values(&self.data, columns::RV)?;

        info!(
            "MAD clipping grouped by {} (threshold {})",
            group_column, config.threshold
        );
        let mask = mad_clip_mask(&rv, Some(&groups), config.threshold, config.iterations)?;
        let condition: Vec<bool> = mask.iter().map(|keep| !keep).collect();

        let removed = self.remove_where(&condition, RemovalReason::MadClip(config.threshold))?;
        if removed > 0 && config.readjust_means {
            self.adjust_means()?;
        }
        Ok(removed)
    }

    /// Replace the rows with nightly bins. Terminal for per-row filtering.
    pub fn bin_nightly(&mut self, binner: &NightlyBinner) -> Result<()> {
        if self.binned {
            return Err(RvError::AlreadyBinned);
        }
        let before = self.data.height();
        self.data = binner.bin_by_night(&self.data)?;
        self.binned = true;

        let after = self.data.height();
        self.notify(StageReport::new(
            CleaningStage::NightlyBinning,
            before,
            after,
            format!("Binned {before} rows into {after} nights"),
        ));
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Per-instrument statistics of the current rows.
    pub fn instrument_statistics(&self) -> Result<Vec<InstrumentStats>> {
        instrument_statistics(&self.data)
    }

    /// Periodogram of the RVs over the default frequency grid.
    pub fn periodogram(&self, engine: &dyn Periodogram, samples: usize) -> Result<PeriodogramResult> {
        if !self.means_adjusted {
            warn!("Computing a periodogram of {} before the instrument means were adjusted", self.name);
        }
        let t = f64_values(&self.data, columns::TIMESTAMP)?;
        let rv = f64_values(&self.data, columns::RV)?;
        let rv_err = f64_values(&self.data, columns::RV_ERR)?;
        compute_periodogram(engine, &t, &rv, Some(&rv_err), samples)
    }

    /// Run `search` on the current rows with `model`.
    pub fn search_planets(
        &self,
        search: &PlanetSearch,
        model: &mut dyn KeplerianModel,
        tables: &InstrumentTables,
    ) -> Result<SearchOutcome> {
        let t = f64_values(&self.data, columns::TIMESTAMP)?;
        let rv = f64_values(&self.data, columns::RV)?;
        let instruments = str_values(&self.data, columns::INSTRUMENT)?;
        search.run(model, &t, &rv, &instruments, tables)
    }
}

fn stage_for(reason: &RemovalReason) -> CleaningStage {
    match reason {
        RemovalReason::PipelineFiltered => CleaningStage::PipelineFilter,
        RemovalReason::DrsQc => CleaningStage::QcFilter,
        RemovalReason::RvErrAbove(_) => CleaningStage::RvErrFilter,
        RemovalReason::NegativeRvErr => CleaningStage::NegativeRvErrFilter,
        RemovalReason::MadClip(_) => CleaningStage::MadClip,
        RemovalReason::Custom(_) => CleaningStage::Custom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::fakes::{PeakEngine, ScriptedModel};
    use crate::search::{DEFAULT_GRID_SAMPLES, StopReason};
    use crate::sources::{AstrometricSolution, AstrometrySource, StaticAstrometry};

    fn sample() -> DataFrame {
        df![
            columns::INSTRUMENT => ["HARPS03", "HARPS03", "CORALIE14", "CORALIE14", "HARPS03"],
            columns::TIMESTAMP => [57003.5, 57000.5, 57001.5, 57002.5, 57004.5],
            columns::RV => [12.0, 10.0, 100.0, 104.0, 11.0],
            columns::RV_ERR => [1.0, 1.0, 2.0, 2.0, 1.0],
            columns::QC => [true, true, true, false, true],
            columns::DRS_VERSION => ["3.3.6", "3.3.6", "3.8.1", "3.4", "3.0"],
            "pub_bibcode" => ["a", "b", "c", "d", "e"],
        ]
        .unwrap()
    }

    fn collection() -> MeasurementCollection {
        MeasurementCollection::from_frame("HD 1", "dace-1", sample()).unwrap()
    }

    // ==================== construction tests ====================

    #[test]
    fn test_from_frame_sorts_by_timestamp() {
        let c = collection();
        let t = f64_values(c.data(), columns::TIMESTAMP).unwrap();
        assert_eq!(t, vec![57000.5, 57001.5, 57002.5, 57003.5, 57004.5]);
        assert_eq!(c.instruments().unwrap(), vec!["HARPS03", "CORALIE14"]);
    }

    #[test]
    fn test_from_frame_requires_columns() {
        let df = df![columns::INSTRUMENT => ["HARPS03"], columns::RV => [1.0]].unwrap();
        let err = MeasurementCollection::from_frame("x", "x", df).unwrap_err();
        assert!(matches!(err, RvError::ColumnNotFound(_)));
    }

    // ==================== removal tests ====================

    #[test]
    fn test_remove_where_length_mismatch() {
        let mut c = collection();
        let err = c.remove_where(&[true, false], RemovalReason::DrsQc).unwrap_err();
        assert!(matches!(err, RvError::LengthMismatch { expected: 5, actual: 2 }));
        assert_eq!(c.len(), 5);
    }

    #[test]
    fn test_remove_where_nothing_is_noop() {
        let mut c = collection();
        assert_eq!(c.remove_where(&[false; 5], RemovalReason::DrsQc).unwrap(), 0);
        assert!(c.ledger().is_empty());
        assert_eq!(c.len(), 5);
    }

    #[test]
    fn test_remove_where_keeps_ledger_invariant() {
        let mut c = collection();
        let before = c.len();
        let removed = c
            .remove_where(&[true, false, true, false, false], RemovalReason::Custom("manual".into()))
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(before, c.len() + c.ledger().len());
        assert_eq!(c.ledger().reasons(), vec!["manual", "manual"]);
    }

    #[test]
    fn test_filter_columns() {
        let mut c = collection();
        let dropped = c.filter_columns(&InstrumentTables::default().ignored_columns).unwrap();
        assert_eq!(dropped, vec!["pub_bibcode"]);
        assert!(!has_column(c.data(), "pub_bibcode"));
    }

    #[test]
    fn test_filter_pipelines() {
        let mut c = collection();
        let policy = PipelineVersionPolicy::new(InstrumentTables::default().accepted_pipelines);
        // HARPS03 3.0 and CORALIE14 3.4 are rejected
        assert_eq!(c.filter_pipelines(&policy).unwrap(), 2);
        assert_eq!(c.ledger().count_for(&RemovalReason::PipelineFiltered), 2);
    }

    #[test]
    fn test_filter_qc() {
        let mut c = collection();
        assert_eq!(c.filter_qc().unwrap(), 1);
        assert_eq!(c.ledger().reasons(), vec!["drs_qc"]);
    }

    #[test]
    fn test_filter_rv_err_and_negative() {
        let df = df![
            columns::INSTRUMENT => ["A", "A", "A", "A"],
            columns::TIMESTAMP => [1.0, 2.0, 3.0, 4.0],
            columns::RV => [1.0, 2.0, 3.0, 4.0],
            columns::RV_ERR => [Some(1.0), Some(50.0), Some(0.0), None],
        ]
        .unwrap();
        let mut c = MeasurementCollection::from_frame("x", "x", df).unwrap();

        assert_eq!(c.filter_rv_err(30.0).unwrap(), 1);
        assert_eq!(c.filter_negative_rv_err().unwrap(), 2);
        assert_eq!(c.len(), 1);
        assert_eq!(c.ledger().reasons(), vec!["rv_err_gt_30", "negative_rv_err", "negative_rv_err"]);
    }

    // ==================== transform tests ====================

    #[test]
    fn test_adjust_means_returns_offsets() {
        let mut c = collection();
        let offsets = c.adjust_means().unwrap();
        assert_eq!(offsets[0], ("HARPS03".to_string(), 11.0));
        assert_eq!(offsets[1], ("CORALIE14".to_string(), 102.0));
        assert!(c.means_adjusted());

        let again = c.adjust_means().unwrap();
        assert!(again.iter().all(|(_, m)| m.abs() < 1e-12));
    }

    #[test]
    fn test_mad_clip_removes_outlier_and_readjusts() {
        let df = df![
            columns::INSTRUMENT => ["A"; 6],
            columns::TIMESTAMP => [1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            columns::RV => [0.0, 1.0, -1.0, 0.5, -0.5, 100.0],
            columns::RV_ERR => [1.0; 6],
        ]
        .unwrap();
        let mut c = MeasurementCollection::from_frame("x", "x", df).unwrap();

        let removed = c.mad_clip(&MadClipConfig::default()).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(c.ledger().reasons(), vec!["rv_mad_clip_5sigma"]);
        assert!(c.means_adjusted());
    }

    #[test]
    fn test_mad_clip_without_outliers_does_not_readjust() {
        let df = df![
            columns::INSTRUMENT => ["A"; 5],
            columns::TIMESTAMP => [1.0, 2.0, 3.0, 4.0, 5.0],
            columns::RV => [10.0, 11.0, 9.0, 10.5, 9.5],
            columns::RV_ERR => [1.0; 5],
        ]
        .unwrap();
        let mut c = MeasurementCollection::from_frame("x", "x", df).unwrap();

        let config = MadClipConfig {
            readjust_means: true,
            ..MadClipConfig::default()
        };
        assert_eq!(c.mad_clip(&config).unwrap(), 0);
        assert!(!c.means_adjusted());
        assert!(c.ledger().is_empty());
        assert!(
            c.history()
                .iter()
                .all(|r| r.stage != CleaningStage::MeanAdjustment)
        );
        // values untouched
        assert_eq!(
            f64_values(c.data(), columns::RV).unwrap(),
            vec![10.0, 11.0, 9.0, 10.5, 9.5]
        );
    }

    #[test]
    fn test_bin_nightly_is_terminal() {
        let mut c = collection();
        c.bin_nightly(&NightlyBinner::default()).unwrap();
        assert!(c.is_binned());
        assert_eq!(c.len(), 5);

        let n = c.len();
        assert!(matches!(
            c.remove_where(&vec![false; n], RemovalReason::DrsQc),
            Err(RvError::AlreadyBinned)
        ));
        assert!(matches!(c.bin_nightly(&NightlyBinner::default()), Err(RvError::AlreadyBinned)));
    }

    #[test]
    fn test_secular_correction_rewrites_rv() {
        let mut c = collection();
        let solution = AstrometricSolution {
            parallax: 100.0,
            parallax_error: Some(0.1),
            pmra: 1000.0,
            pmdec: 0.0,
            quality: Some(1.0),
            source: AstrometrySource::Gaia,
        };
        let corrector = SecularCorrector::new(
            Some(Arc::new(StaticAstrometry::new("gaia", Some(solution)))),
            None,
        );

        let drift = c.apply_secular_correction(&corrector, Some(57000.5)).unwrap().unwrap();
        assert!(drift > 0.0);
        let rv = f64_values(c.data(), columns::RV).unwrap();
        // the first row sits at the reference epoch
        assert_eq!(rv[0], 10.0);
        assert!(rv[1] < 100.0);
    }

    #[test]
    fn test_history_records_stages() {
        let mut c = collection();
        c.filter_qc().unwrap();
        c.adjust_means().unwrap();
        let stages: Vec<CleaningStage> = c.history().iter().map(|r| r.stage).collect();
        assert_eq!(stages, vec![CleaningStage::QcFilter, CleaningStage::MeanAdjustment]);
        assert_eq!(c.history()[0].rows_removed(), 1);
    }

    // ==================== query tests ====================

    fn regular_series() -> MeasurementCollection {
        let n = 200;
        let df = df![
            columns::INSTRUMENT => vec!["HARPS03"; n],
            columns::TIMESTAMP => (0..n).map(|i| 57_000.0 + i as f64 * 5.0).collect::<Vec<_>>(),
            columns::RV => vec![0.0; n],
            columns::RV_ERR => vec![1.0; n],
        ]
        .unwrap();
        MeasurementCollection::from_frame("x", "x", df).unwrap()
    }

    #[test]
    fn test_periodogram_on_unadjusted_collection() {
        let c = regular_series();
        let engine = PeakEngine { peak_frequency: 0.05 };

        let result = c.periodogram(&engine, DEFAULT_GRID_SAMPLES).unwrap();

        assert!(!c.means_adjusted());
        assert_eq!(result.frequencies.len(), DEFAULT_GRID_SAMPLES);
        assert!((result.best_period - 20.0).abs() < 0.1);
        assert!(result.fap < 0.1);
    }

    #[test]
    fn test_search_planets_uses_collection_rows() {
        let c = regular_series();
        let mut model = ScriptedModel {
            peaks: vec![(50.0, 0.9), (13.0, 0.1)],
            ..Default::default()
        };

        let outcome = c
            .search_planets(&PlanetSearch::new(), &mut model, &InstrumentTables::default())
            .unwrap();

        assert_eq!(model.calls[0], "jitter HARPS03 0.75");
        assert_eq!(outcome.detections.len(), 1);
        assert!((outcome.detections[0].period - 50.0).abs() < 0.1);
        assert!(matches!(outcome.stop, StopReason::NotSignificant { .. }));
    }
}
