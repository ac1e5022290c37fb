//! Nightly binning of RV measurements.
//!
//! Rows sharing the same group key (by default night and instrument) are
//! collapsed into one row. Columns with an `<col>_err` partner are combined
//! by inverse-variance weighted mean, the timestamp is weighted by the RV
//! uncertainty, and the remaining numeric columns are averaged.

use crate::columns;
use crate::error::Result;
use crate::stats::weighted_mean;
use crate::utils::{column_names, f64_values, has_column, is_numeric_dtype, night_label, str_values};
use polars::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info};

/// How a column is aggregated inside a bin.
#[derive(Debug, Clone, PartialEq)]
enum Aggregation {
    /// Weighted mean using the named uncertainty column.
    Weighted { err: String },
    /// Timestamp, weighted by the RV uncertainty when available.
    Timestamp,
    /// Arithmetic mean of the finite values.
    Mean,
}

/// Collapses rows into per-night, per-instrument weighted summaries.
#[derive(Debug, Clone)]
pub struct NightlyBinner {
    group_keys: Vec<String>,
    exclude: Vec<String>,
}

impl Default for NightlyBinner {
    fn default() -> Self {
        Self {
            group_keys: vec![columns::NIGHT.to_string(), columns::INSTRUMENT.to_string()],
            exclude: Vec::new(),
        }
    }
}

impl NightlyBinner {
    /// Binner with the default `[date_night, ins_name]` keys.
    ///
    /// Columns whose name contains one of `exclude` are dropped from the output.
    pub fn new(exclude: Vec<String>) -> Self {
        Self {
            exclude,
            ..Self::default()
        }
    }

    /// Replace the grouping keys.
    pub fn with_group_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.exclude.iter().any(|pattern| name.contains(pattern.as_str()))
    }

    /// Aggregate `df` into one row per distinct group key.
    ///
    /// Groups appear in the order of their first row. The output holds the key
    /// columns, the aggregated numeric columns in their original order, and an
    /// `n_binned` count.
    pub fn bin_by_night(&self, df: &DataFrame) -> Result<DataFrame> {
        let df = self.with_night_column(df)?;

        // group membership, ordered by first appearance
        let key_values: Vec<Vec<String>> = self
            .group_keys
            .iter()
            .map(|k| str_values(&df, k))
            .collect::<Result<_>>()?;

        let mut index: HashMap<Vec<String>, usize> = HashMap::new();
        let mut groups: Vec<(Vec<String>, Vec<usize>)> = Vec::new();
        for row in 0..df.height() {
            let key: Vec<String> = key_values.iter().map(|col| col[row].clone()).collect();
            let slot = *index.entry(key.clone()).or_insert_with(|| {
                groups.push((key, Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(row);
        }

        let plan = self.plan(&df);
        let has_rv_err = has_column(&df, columns::RV_ERR);
        let rv_err = if has_rv_err {
            f64_values(&df, columns::RV_ERR)?
        } else {
            Vec::new()
        };

        let mut aggregated: HashMap<String, Vec<f64>> = HashMap::new();
        for (name, aggregation) in &plan {
            let values = f64_values(&df, name)?;
            match aggregation {
                Aggregation::Weighted { err } => {
                    let errors = f64_values(&df, err)?;
                    let (means, uncertainties): (Vec<f64>, Vec<f64>) = groups
                        .iter()
                        .map(|(key, rows)| weighted_group(name, key, rows, &values, &errors))
                        .unzip();
                    aggregated.insert(name.clone(), means);
                    aggregated.insert(err.clone(), uncertainties);
                }
                Aggregation::Timestamp => {
                    let means = groups
                        .iter()
                        .map(|(_, rows)| {
                            if has_rv_err {
                                timestamp_group(rows, &values, &rv_err)
                            } else {
                                plain_mean(rows, &values)
                            }
                        })
                        .collect();
                    aggregated.insert(name.clone(), means);
                }
                Aggregation::Mean => {
                    let means = groups.iter().map(|(_, rows)| plain_mean(rows, &values)).collect();
                    aggregated.insert(name.clone(), means);
                }
            }
        }

        let mut out: Vec<Column> = Vec::new();
        for (k, key) in self.group_keys.iter().enumerate() {
            let values: Vec<String> = groups.iter().map(|(g, _)| g[k].clone()).collect();
            out.push(Series::new(key.as_str().into(), values).into_column());
        }
        for name in column_names(&df) {
            if let Some(values) = aggregated.remove(&name) {
                out.push(Series::new(name.as_str().into(), values).into_column());
            }
        }
        let counts: Vec<u32> = groups.iter().map(|(_, rows)| rows.len() as u32).collect();
        out.push(Series::new(columns::N_BINNED.into(), counts).into_column());

        let binned = DataFrame::new(out)?;
        info!("Binned {} rows into {} nightly points", df.height(), binned.height());
        Ok(binned)
    }

    /// Add `date_night` from the timestamp when it is a key and missing.
    fn with_night_column(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut df = df.clone();
        if self.group_keys.iter().any(|k| k == columns::NIGHT) && !has_column(&df, columns::NIGHT) {
            let nights: Vec<Option<String>> = f64_values(&df, columns::TIMESTAMP)?
                .into_iter()
                .map(night_label)
                .collect();
            df.with_column(Series::new(columns::NIGHT.into(), nights))?;
            debug!("Derived {} from {}", columns::NIGHT, columns::TIMESTAMP);
        }
        Ok(df)
    }

    /// Decide how each kept column is aggregated.
    fn plan(&self, df: &DataFrame) -> Vec<(String, Aggregation)> {
        let numeric = |name: &str| {
            df.column(name)
                .map(|c| is_numeric_dtype(c.dtype()))
                .unwrap_or(false)
        };
        let usable = |name: &str| {
            !self.group_keys.iter().any(|k| k == name)
                && name != columns::N_BINNED
                && !self.is_excluded(name)
                && numeric(name)
        };

        let names = column_names(df);
        let mut plan = Vec::new();
        for name in &names {
            if !usable(name) {
                continue;
            }
            // uncertainty columns travel with their value column
            if let Some(base) = name.strip_suffix(columns::ERR_SUFFIX)
                && usable(base)
            {
                continue;
            }

            let err = columns::err_column(name);
            let aggregation = if name == columns::TIMESTAMP {
                Aggregation::Timestamp
            } else if names.contains(&err) && usable(&err) {
                Aggregation::Weighted { err }
            } else {
                Aggregation::Mean
            };
            plan.push((name.clone(), aggregation));
        }
        plan
    }
}

fn weighted_group(name: &str, key: &[String], rows: &[usize], values: &[f64], errors: &[f64]) -> (f64, f64) {
    let (v, e): (Vec<f64>, Vec<f64>) = rows
        .iter()
        .map(|&i| (values[i], errors[i]))
        .filter(|(v, e)| v.is_finite() && e.is_finite() && *e > 0.0)
        .unzip();

    match weighted_mean(&v, &e) {
        Ok(result) => result,
        Err(_) => {
            debug!("No valid {} values in bin {:?}", name, key);
            (f64::NAN, f64::NAN)
        }
    }
}

fn timestamp_group(rows: &[usize], times: &[f64], rv_err: &[f64]) -> f64 {
    let (t, e): (Vec<f64>, Vec<f64>) = rows
        .iter()
        .map(|&i| (times[i], rv_err[i]))
        .filter(|(t, e)| t.is_finite() && e.is_finite() && *e > 0.0)
        .unzip();

    match weighted_mean(&t, &e) {
        Ok((mean, _)) => mean,
        Err(_) => plain_mean(rows, times),
    }
}

fn plain_mean(rows: &[usize], values: &[f64]) -> f64 {
    let finite: Vec<f64> = rows
        .iter()
        .map(|&i| values[i])
        .filter(|v| v.is_finite())
        .collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    finite.iter().sum::<f64>() / finite.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        df![
            columns::INSTRUMENT => ["HARPS03", "HARPS03", "CORALIE14", "HARPS03"],
            columns::TIMESTAMP => [57000.6, 57000.7, 57000.65, 57001.6],
            columns::RV => [10.0, 12.0, 5.0, 7.0],
            columns::RV_ERR => [1.0, 2.0, 3.0, 1.0],
            "spectro_ccf_fwhm" => [7.0, 7.2, 8.0, 7.1],
            "spectro_ccf_fwhm_err" => [0.1, 0.1, 0.2, 0.1],
            "spectro_cal_berv" => [1.0, 2.0, 3.0, 4.0],
            "spectro_ccf_mask" => ["G2", "G2", "K5", "G2"],
            "ins_exptime" => [900.0, 600.0, 1200.0, 900.0],
        ]
        .unwrap()
    }

    fn binner() -> NightlyBinner {
        NightlyBinner::new(vec!["berv".to_string()])
    }

    #[test]
    fn test_bin_weighted_mean_and_uncertainty() {
        let binned = binner().bin_by_night(&sample()).unwrap();
        assert_eq!(binned.height(), 3);

        let rv = f64_values(&binned, columns::RV).unwrap();
        let rv_err = f64_values(&binned, columns::RV_ERR).unwrap();
        assert!((rv[0] - 10.4).abs() < 1e-12);
        assert!((rv_err[0] - (1.0f64 / 1.25).sqrt()).abs() < 1e-12);
        assert_eq!(rv[1], 5.0);
        assert_eq!(rv_err[1], 3.0);
    }

    #[test]
    fn test_bin_groups_in_first_appearance_order() {
        let binned = binner().bin_by_night(&sample()).unwrap();
        let instruments = str_values(&binned, columns::INSTRUMENT).unwrap();
        assert_eq!(instruments, vec!["HARPS03", "CORALIE14", "HARPS03"]);

        let nights = str_values(&binned, columns::NIGHT).unwrap();
        assert_eq!(nights[0], nights[1]);
        assert_ne!(nights[0], nights[2]);

        let counts = f64_values(&binned, columns::N_BINNED).unwrap();
        assert_eq!(counts, vec![2.0, 1.0, 1.0]);
    }

    #[test]
    fn test_bin_timestamp_weighted_by_rv_err() {
        let binned = binner().bin_by_night(&sample()).unwrap();
        let t = f64_values(&binned, columns::TIMESTAMP).unwrap();
        let expected = (57000.6 * 1.0 + 57000.7 * 0.25) / 1.25;
        assert!((t[0] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_bin_drops_excluded_and_text_columns() {
        let binned = binner().bin_by_night(&sample()).unwrap();
        let names = column_names(&binned);
        assert!(!names.contains(&"spectro_cal_berv".to_string()));
        assert!(!names.contains(&"spectro_ccf_mask".to_string()));

        // plain numeric column is averaged
        let texp = f64_values(&binned, "ins_exptime").unwrap();
        assert_eq!(texp[0], 750.0);
    }

    #[test]
    fn test_bin_column_order() {
        let binned = binner().bin_by_night(&sample()).unwrap();
        assert_eq!(
            column_names(&binned),
            vec![
                columns::NIGHT,
                columns::INSTRUMENT,
                columns::TIMESTAMP,
                columns::RV,
                columns::RV_ERR,
                "spectro_ccf_fwhm",
                "spectro_ccf_fwhm_err",
                "ins_exptime",
                columns::N_BINNED,
            ]
        );
    }

    #[test]
    fn test_bin_without_rv_err_uses_plain_mean_for_time() {
        let df = df![
            columns::INSTRUMENT => ["HARPS03", "HARPS03"],
            columns::TIMESTAMP => [57000.6, 57000.8],
            columns::RV => [1.0, 3.0],
        ]
        .unwrap();
        let binned = NightlyBinner::default().bin_by_night(&df).unwrap();
        let t = f64_values(&binned, columns::TIMESTAMP).unwrap();
        assert!((t[0] - 57000.7).abs() < 1e-9);
        assert_eq!(f64_values(&binned, columns::RV).unwrap(), vec![2.0]);
    }

    #[test]
    fn test_bin_all_invalid_errors_gives_nan() {
        let df = df![
            columns::INSTRUMENT => ["HARPS03", "HARPS03"],
            columns::TIMESTAMP => [57000.6, 57000.8],
            columns::RV => [1.0, 3.0],
            columns::RV_ERR => [0.0, -1.0],
        ]
        .unwrap();
        let binned = NightlyBinner::default().bin_by_night(&df).unwrap();
        assert!(f64_values(&binned, columns::RV).unwrap()[0].is_nan());
        // the timestamp falls back to the plain mean
        assert!((f64_values(&binned, columns::TIMESTAMP).unwrap()[0] - 57000.7).abs() < 1e-9);
    }

    #[test]
    fn test_bin_custom_keys() {
        let binned = binner()
            .with_group_keys([columns::INSTRUMENT])
            .bin_by_night(&sample())
            .unwrap();
        assert_eq!(binned.height(), 2);
        assert!(!has_column(&binned, columns::NIGHT));
    }
}
