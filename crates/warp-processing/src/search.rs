//! Periodogram invocation and planet-count selection.
//!
//! The periodogram engine and the Keplerian model are external libraries; they
//! are reached through [`Periodogram`] and [`KeplerianModel`]. This module owns
//! the policy around them: which frequencies to scan, which peak to pick and
//! when to stop adding planets.

use crate::config::InstrumentTables;
use crate::error::{Result, RvError};
use crate::stats::median;
use crate::utils::unique_in_order;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, info};

/// Default number of frequencies of a periodogram grid.
pub const DEFAULT_GRID_SAMPLES: usize = 10_000;

/// Linear frequency grid (1/day) for a periodogram of the times `t`.
///
/// Defaults: `min_freq = 1 / baseline` and
/// `max_freq = max(0.5 / median spacing, 1.0)`.
pub fn frequency_grid(
    t: &[f64],
    min_freq: Option<f64>,
    max_freq: Option<f64>,
    samples: usize,
) -> Result<Vec<f64>> {
    if samples == 0 {
        return Err(RvError::InsufficientData(
            "frequency grid needs at least one sample".to_string(),
        ));
    }

    let mut sorted: Vec<f64> = t.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let (Some(first), Some(last)) = (sorted.first(), sorted.last()) else {
        return Err(RvError::InsufficientData("no valid timestamps".to_string()));
    };
    let baseline = last - first;

    let min_freq = match min_freq {
        Some(f) => f,
        None if baseline > 0.0 => 1.0 / baseline,
        None => {
            return Err(RvError::InsufficientData(
                "time baseline is zero; cannot derive a minimum frequency".to_string(),
            ));
        }
    };
    let max_freq = max_freq.unwrap_or_else(|| {
        let spacing: Vec<f64> = sorted.windows(2).map(|w| w[1] - w[0]).collect();
        match median(&spacing) {
            Some(dt) if dt > 0.0 => (0.5 / dt).max(1.0),
            _ => 1.0,
        }
    });

    if samples == 1 {
        return Ok(vec![min_freq]);
    }
    let step = (max_freq - min_freq) / (samples - 1) as f64;
    Ok((0..samples).map(|i| min_freq + step * i as f64).collect())
}

/// Generalised Lomb-Scargle engine.
pub trait Periodogram {
    /// Normalised power at each frequency (1/day).
    fn power(&self, t: &[f64], y: &[f64], yerr: Option<&[f64]>, frequencies: &[f64])
        -> Result<Vec<f64>>;

    /// False-alarm probability of a peak of height `power`.
    fn false_alarm_probability(
        &self,
        power: f64,
        t: &[f64],
        y: &[f64],
        yerr: Option<&[f64]>,
        max_frequency: f64,
    ) -> Result<f64>;
}

/// Periodogram of a series and its highest peak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodogramResult {
    pub frequencies: Vec<f64>,
    pub power: Vec<f64>,
    /// Period (days) of the highest peak.
    pub best_period: f64,
    /// False-alarm probability of the highest peak.
    pub fap: f64,
}

/// Run `engine` over the default frequency grid of `t`.
pub fn compute_periodogram(
    engine: &dyn Periodogram,
    t: &[f64],
    y: &[f64],
    yerr: Option<&[f64]>,
    samples: usize,
) -> Result<PeriodogramResult> {
    let frequencies = frequency_grid(t, None, None, samples)?;
    let power = engine.power(t, y, yerr, &frequencies)?;
    if power.len() != frequencies.len() {
        return Err(RvError::LengthMismatch {
            expected: frequencies.len(),
            actual: power.len(),
        });
    }

    let (best, best_power) = argmax(&power, |_| true)
        .ok_or_else(|| RvError::InsufficientData("periodogram has no finite power".to_string()))?;
    let max_frequency = frequencies.last().copied().unwrap_or(f64::NAN);
    let fap = engine.false_alarm_probability(best_power, t, y, yerr, max_frequency)?;

    Ok(PeriodogramResult {
        best_period: 1.0 / frequencies[best],
        fap,
        frequencies,
        power,
    })
}

/// Index and value of the largest finite element among those passing `keep`.
fn argmax(values: &[f64], keep: impl Fn(usize) -> bool) -> Option<(usize, f64)> {
    values
        .iter()
        .enumerate()
        .filter(|(i, v)| keep(*i) && v.is_finite())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, v)| (i, *v))
}

/// Keplerian RV model with correlated-noise terms.
pub trait KeplerianModel {
    /// Add a jitter term for the rows of `instrument`.
    fn add_instrument_jitter(&mut self, instrument: &str, sigma: f64) -> Result<()>;

    /// Add a global (stellar) jitter term.
    fn add_stellar_jitter(&mut self, sigma: f64) -> Result<()>;

    /// Add a constant offset for the rows of `instrument`.
    fn add_offset(&mut self, instrument: &str, initial: f64) -> Result<()>;

    /// Add a polynomial drift term `t^power`.
    fn add_drift(&mut self, power: u32) -> Result<()>;

    /// Adjust all free parameters.
    fn fit(&mut self) -> Result<()>;

    /// Residual periodogram over `n` angular frequencies `nu0 + k * dnu`.
    fn periodogram(&self, nu0: f64, dnu: f64, n: usize) -> Result<(Vec<f64>, Vec<f64>)>;

    /// False-alarm probability of a residual peak.
    fn fap(&self, power: f64, nu_max: f64) -> Result<f64>;

    /// Add a Keplerian with initial period `period` (days).
    fn add_keplerian_from_period(&mut self, period: f64) -> Result<()>;
}

static_assertions::assert_obj_safe!(Periodogram, KeplerianModel);

/// Angular frequency grid (rad/day) scanned for new planets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngularGrid {
    pub nu0: f64,
    pub dnu: f64,
    pub n: usize,
}

impl AngularGrid {
    /// Periods from 1 day to 1.5 times the baseline, 50 000 frequencies.
    pub fn for_baseline(baseline: f64) -> Result<Self> {
        if !(baseline > 0.0) {
            return Err(RvError::InsufficientData(format!(
                "time baseline must be positive, got {baseline}"
            )));
        }
        let p_max = 1.5 * baseline;
        let p_min = 1.0;
        let n = 50_000;
        let nu0 = 2.0 * PI / p_max;
        let dnu = (2.0 * PI / p_min - nu0) / (n - 1) as f64;
        Ok(Self { nu0, dnu, n })
    }
}

/// A planet added by the search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub period: f64,
    /// `None` for seeded periods.
    pub power: Option<f64>,
    pub fap: Option<f64>,
}

/// Why the search stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The highest remaining peak was not significant.
    NotSignificant { period: f64, fap: f64 },
    /// The requested number of planets was reached.
    MaxPlanets,
    /// No frequency of the grid maps to a period above the minimum.
    NoCandidatePeak,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub detections: Vec<Detection>,
    pub stop: StopReason,
}

/// Iterative planet search: add the strongest significant peak, refit, repeat.
#[derive(Debug, Clone)]
pub struct PlanetSearch {
    max_planets: usize,
    drift_terms: u32,
    stellar_jitter: f64,
    fap_threshold: f64,
    min_peak_period: f64,
    seed_periods: Vec<f64>,
}

impl Default for PlanetSearch {
    fn default() -> Self {
        Self {
            max_planets: 3,
            drift_terms: 1,
            stellar_jitter: 0.0,
            fap_threshold: 1e-3,
            min_peak_period: 2.0,
            seed_periods: Vec::new(),
        }
    }
}

impl PlanetSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_planets(mut self, n: usize) -> Self {
        self.max_planets = n;
        self
    }

    pub fn drift_terms(mut self, n: u32) -> Self {
        self.drift_terms = n;
        self
    }

    pub fn stellar_jitter(mut self, sigma: f64) -> Self {
        self.stellar_jitter = sigma;
        self
    }

    pub fn fap_threshold(mut self, threshold: f64) -> Self {
        self.fap_threshold = threshold;
        self
    }

    /// Periods (days) added before the blind search.
    pub fn seed_periods(mut self, periods: Vec<f64>) -> Self {
        self.seed_periods = periods;
        self
    }

    /// Set up the noise model and offsets, then search for planets.
    ///
    /// `t`, `rv` and `instruments` are row-aligned.
    pub fn run(
        &self,
        model: &mut dyn KeplerianModel,
        t: &[f64],
        rv: &[f64],
        instruments: &[String],
        tables: &InstrumentTables,
    ) -> Result<SearchOutcome> {
        if t.len() != rv.len() || t.len() != instruments.len() {
            return Err(RvError::LengthMismatch {
                expected: t.len(),
                actual: rv.len().min(instruments.len()),
            });
        }

        let names = unique_in_order(instruments);
        for ins in &names {
            model.add_instrument_jitter(ins, tables.jitter_for(ins))?;
        }
        model.add_stellar_jitter(self.stellar_jitter)?;
        for ins in &names {
            let values: Vec<f64> = rv
                .iter()
                .zip(instruments)
                .filter(|(_, i)| *i == ins)
                .map(|(v, _)| *v)
                .collect();
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            model.add_offset(ins, mean)?;
        }
        model.fit()?;
        for power in 1..=self.drift_terms {
            model.add_drift(power)?;
        }
        model.fit()?;

        let (t_min, t_max) = t
            .iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        let grid = AngularGrid::for_baseline(t_max - t_min)?;

        let mut detections = Vec::new();
        for &period in &self.seed_periods {
            model.add_keplerian_from_period(period)?;
            model.fit()?;
            info!("Added seeded planet at P = {:.3} d", period);
            detections.push(Detection {
                period,
                power: None,
                fap: None,
            });
        }

        let blind = self.max_planets.saturating_sub(self.seed_periods.len());
        for _ in 0..blind {
            let (nu, power) = model.periodogram(grid.nu0, grid.dnu, grid.n)?;
            let periods: Vec<f64> = nu.iter().map(|f| 2.0 * PI / f).collect();
            let Some((k, peak)) = argmax(&power, |i| periods.get(i).is_some_and(|p| *p > self.min_peak_period))
            else {
                return Ok(SearchOutcome {
                    detections,
                    stop: StopReason::NoCandidatePeak,
                });
            };

            let nu_max = nu.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let fap = model.fap(peak, nu_max)?;
            debug!("Highest peak at P = {:.3} d, FAP = {:.3e}", periods[k], fap);

            if fap > self.fap_threshold {
                info!(
                    "Stopping search: peak at P = {:.3} d has FAP {:.3e} > {:.1e}",
                    periods[k], fap, self.fap_threshold
                );
                return Ok(SearchOutcome {
                    detections,
                    stop: StopReason::NotSignificant {
                        period: periods[k],
                        fap,
                    },
                });
            }

            model.add_keplerian_from_period(periods[k])?;
            model.fit()?;
            info!("Added planet at P = {:.3} d (FAP {:.3e})", periods[k], fap);
            detections.push(Detection {
                period: periods[k],
                power: Some(peak),
                fap: Some(fap),
            });
        }

        Ok(SearchOutcome {
            detections,
            stop: StopReason::MaxPlanets,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::{PeakEngine, ScriptedModel};
    use super::*;

    fn times() -> Vec<f64> {
        (0..200).map(|i| 57_000.0 + i as f64 * 5.0).collect()
    }

    // ==================== frequency grid tests ====================

    #[test]
    fn test_frequency_grid_defaults() {
        let t = vec![0.0, 1.0, 2.0, 4.0];
        let grid = frequency_grid(&t, None, None, 5).unwrap();
        assert_eq!(grid.len(), 5);
        assert_eq!(grid[0], 0.25);
        // median spacing is 1 day, so 0.5/dt = 0.5 is raised to 1.0
        assert_eq!(grid[4], 1.0);
    }

    #[test]
    fn test_frequency_grid_dense_sampling() {
        let t = vec![0.0, 0.1, 0.2, 0.3, 10.0];
        let grid = frequency_grid(&t, None, None, 3).unwrap();
        assert!((grid[2] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_frequency_grid_explicit_bounds() {
        let grid = frequency_grid(&[0.0, 1.0], Some(0.1), Some(0.3), 3).unwrap();
        assert_eq!(grid.len(), 3);
        assert!((grid[1] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_frequency_grid_zero_baseline() {
        assert!(matches!(
            frequency_grid(&[5.0, 5.0], None, None, 10),
            Err(RvError::InsufficientData(_))
        ));
    }

    // ==================== periodogram tests ====================

    #[test]
    fn test_compute_periodogram_finds_peak() {
        let t = times();
        let y = vec![0.0; t.len()];
        let engine = PeakEngine { peak_frequency: 0.05 };
        let result = compute_periodogram(&engine, &t, &y, None, DEFAULT_GRID_SAMPLES).unwrap();

        assert_eq!(result.power.len(), DEFAULT_GRID_SAMPLES);
        assert!((result.best_period - 20.0).abs() < 0.1);
        assert!(result.fap < 0.1);
    }

    // ==================== planet search tests ====================

    #[test]
    fn test_angular_grid() {
        let grid = AngularGrid::for_baseline(100.0).unwrap();
        assert_eq!(grid.n, 50_000);
        assert!((grid.nu0 - 2.0 * PI / 150.0).abs() < 1e-12);
        let last = grid.nu0 + grid.dnu * (grid.n - 1) as f64;
        assert!((last - 2.0 * PI).abs() < 1e-9);
        assert!(AngularGrid::for_baseline(0.0).is_err());
    }

    #[test]
    fn test_search_stops_at_insignificant_peak() {
        let t = times();
        let rv = vec![1.0; t.len()];
        let instruments = vec!["HARPS03".to_string(); t.len()];
        let mut model = ScriptedModel {
            peaks: vec![(50.0, 0.9), (13.0, 0.1)],
            ..Default::default()
        };

        let outcome = PlanetSearch::new()
            .run(&mut model, &t, &rv, &instruments, &InstrumentTables::default())
            .unwrap();

        assert_eq!(outcome.detections.len(), 1);
        assert!((outcome.detections[0].period - 50.0).abs() < 0.1);
        assert!(matches!(outcome.stop, StopReason::NotSignificant { .. }));
    }

    #[test]
    fn test_search_seeds_and_max_planets() {
        let t = times();
        let rv = vec![1.0; t.len()];
        let instruments = vec!["HARPS03".to_string(); t.len()];
        let mut model = ScriptedModel {
            peaks: vec![(0.0, 0.0), (30.0, 0.9), (40.0, 0.9)],
            ..Default::default()
        };

        let outcome = PlanetSearch::new()
            .max_planets(2)
            .seed_periods(vec![365.0])
            .run(&mut model, &t, &rv, &instruments, &InstrumentTables::default())
            .unwrap();

        assert_eq!(outcome.stop, StopReason::MaxPlanets);
        assert_eq!(model.planets.len(), 2);
        assert_eq!(model.planets[0], 365.0);
        assert!(outcome.detections[0].fap.is_none());
        assert!((model.planets[1] - 30.0).abs() < 0.1);
    }

    #[test]
    fn test_search_sets_up_noise_model() {
        let t = vec![0.0, 10.0, 20.0, 30.0];
        let rv = vec![1.0, 3.0, 10.0, 20.0];
        let instruments: Vec<String> = ["CORALIE14", "CORALIE14", "SOPHIE", "SOPHIE"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut model = ScriptedModel::default();

        PlanetSearch::new()
            .max_planets(0)
            .run(&mut model, &t, &rv, &instruments, &InstrumentTables::default())
            .unwrap();

        assert_eq!(
            model.calls,
            vec![
                "jitter CORALIE14 3",
                "jitter SOPHIE 0.1",
                "stellar 0",
                "offset CORALIE14 2",
                "offset SOPHIE 15",
                "fit",
                "drift 1",
                "fit",
            ]
        );
    }
}
