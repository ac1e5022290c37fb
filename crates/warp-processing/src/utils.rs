//! Shared helpers for reading typed values out of the measurement table.

use crate::error::{Result, RvError};
use chrono::{NaiveDate, TimeDelta};
use polars::prelude::*;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Check whether `df` has a column called `name`.
pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

/// Column names of `df` as owned strings.
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column> {
    df.column(name)
        .map_err(|_| RvError::ColumnNotFound(name.to_string()))
}

// =============================================================================
// Column Extraction
// =============================================================================

/// Read a numeric column as `f64`, nulls become NaN.
pub fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let cast = column(df, name)?.cast(&DataType::Float64)?;
    Ok(cast
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

/// Read a column as strings, nulls become empty strings.
pub fn str_values(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let cast = column(df, name)?.cast(&DataType::String)?;
    Ok(cast
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}

/// Read a flag column. Booleans are taken as-is, numbers are true when non-zero,
/// and nulls are false.
pub fn bool_values(df: &DataFrame, name: &str) -> Result<Vec<bool>> {
    let col = column(df, name)?;
    if matches!(col.dtype(), DataType::Boolean) {
        return Ok(col.bool()?.into_iter().map(|v| v.unwrap_or(false)).collect());
    }
    Ok(f64_values(df, name)?
        .into_iter()
        .map(|v| v.is_finite() && v != 0.0)
        .collect())
}

/// Distinct values in order of first appearance.
pub fn unique_in_order<T: Clone + PartialEq>(values: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::new();
    for v in values {
        if !out.contains(v) {
            out.push(v.clone());
        }
    }
    out
}

// =============================================================================
// Time Utilities
// =============================================================================

/// Calendar date of the evening an observation belongs to.
///
/// Reduced JD days start at noon UTC, so `floor(rjd)` is constant over one
/// night at the observatories in the archive. Day `n` starts at noon of
/// 1970-01-01 + (n - 40587) days.
pub fn night_label(rjd: f64) -> Option<String> {
    if !rjd.is_finite() {
        return None;
    }
    let day = rjd.floor() as i64 - 40_587;
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    let date = epoch.checked_add_signed(TimeDelta::try_days(day)?)?;
    Some(date.format("%Y-%m-%d").to_string())
}
