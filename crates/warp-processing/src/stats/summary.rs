//! Per-instrument summary statistics of the retained rows.

use crate::columns;
use crate::error::Result;
use crate::stats::robust::{mad, median, rms, weighted_mean, weighted_rms};
use crate::utils::{f64_values, str_values, unique_in_order};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Summary of one instrument's RV series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentStats {
    pub instrument: String,
    pub n_points: usize,
    pub mean: f64,
    pub weighted_mean: f64,
    pub weighted_mean_err: f64,
    /// RMS scatter around the arithmetic mean.
    pub rms: f64,
    /// Inverse-variance weighted RMS scatter around the weighted mean.
    pub weighted_rms: f64,
    /// Median absolute deviation around the median.
    pub mad: f64,
    pub median_rv_err: f64,
}

/// Compute [`InstrumentStats`] for every instrument in `df`, in order of first appearance.
///
/// Nothing is cached: the statistics always reflect the rows passed in.
pub fn instrument_statistics(df: &DataFrame) -> Result<Vec<InstrumentStats>> {
    let instruments = str_values(df, columns::INSTRUMENT)?;
    let rv = f64_values(df, columns::RV)?;
    let rv_err = f64_values(df, columns::RV_ERR)?;

    let mut stats = Vec::new();
    for instrument in unique_in_order(&instruments) {
        let (values, errors): (Vec<f64>, Vec<f64>) = instruments
            .iter()
            .zip(rv.iter().zip(&rv_err))
            .filter(|(ins, _)| **ins == instrument)
            .map(|(_, (v, e))| (*v, *e))
            .unzip();

        let n_points = values.len();
        let mean = values.iter().sum::<f64>() / n_points as f64;
        let (w_mean, w_err) = weighted_mean(&values, &errors)?;
        let center = median(&values).unwrap_or(f64::NAN);

        stats.push(InstrumentStats {
            instrument,
            n_points,
            mean,
            weighted_mean: w_mean,
            weighted_mean_err: w_err,
            rms: rms(&values).unwrap_or(f64::NAN),
            weighted_rms: weighted_rms(&values, &errors)?,
            mad: mad(&values, center).unwrap_or(f64::NAN),
            median_rv_err: median(&errors).unwrap_or(f64::NAN),
        });
    }

    Ok(stats)
}
