//! Weighted means and iterative MAD clipping.

use crate::error::{Result, RvError};
use std::collections::HashMap;
use tracing::debug;

/// Scale factor turning `(x - median) / MAD` into a modified z-score.
pub const MODIFIED_Z_SCALE: f64 = 0.6745;

/// Label of the implicit group used when no grouping is given.
const ALL_GROUP: &str = "__all__";

/// Inverse-variance weighted mean and its uncertainty.
///
/// Returns `(Σ(vᵢ/σᵢ²)/Σ(1/σᵢ²), sqrt(1/Σ(1/σᵢ²)))`. Fails with
/// [`RvError::ZeroWeight`] when the weights sum to zero or to something
/// undefined (empty input, infinite or NaN errors).
pub fn weighted_mean(values: &[f64], errors: &[f64]) -> Result<(f64, f64)> {
    if values.len() != errors.len() {
        return Err(RvError::LengthMismatch {
            expected: values.len(),
            actual: errors.len(),
        });
    }

    let mut weight_sum = 0.0;
    let mut weighted_sum = 0.0;
    for (v, e) in values.iter().zip(errors) {
        let w = 1.0 / (e * e);
        weight_sum += w;
        weighted_sum += v * w;
    }

    if !(weight_sum > 0.0) || !weight_sum.is_finite() {
        return Err(RvError::ZeroWeight);
    }

    Ok((weighted_sum / weight_sum, (1.0 / weight_sum).sqrt()))
}

/// Median of the finite values, `None` if there are none.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

/// Median absolute deviation around `center`.
pub fn mad(values: &[f64], center: f64) -> Option<f64> {
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// Root-mean-square deviation around the arithmetic mean.
pub fn rms(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    Some((values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt())
}

/// Root-mean-square deviation around the weighted mean, inverse-variance weighted.
pub fn weighted_rms(values: &[f64], errors: &[f64]) -> Result<f64> {
    let (mean, _) = weighted_mean(values, errors)?;
    let mut weight_sum = 0.0;
    let mut sum = 0.0;
    for (v, e) in values.iter().zip(errors) {
        let w = 1.0 / (e * e);
        weight_sum += w;
        sum += w * (v - mean).powi(2);
    }
    Ok((sum / weight_sum).sqrt())
}

/// Boolean mask of the points kept by iterative MAD clipping.
///
/// Each distinct group label is clipped on its own; without `groups` all
/// values form one group. Per group, up to `n_iter` passes compute the median
/// and MAD of the currently retained values and reject points whose modified
/// z-score `0.6745 * (x - median) / MAD` is not below `threshold`. Rejections
/// accumulate across passes. A group stops early when its MAD is exactly zero
/// or when a pass rejects nothing new.
///
/// The result has the length and order of `values`; `true` means retained.
pub fn mad_clip_mask(
    values: &[f64],
    groups: Option<&[String]>,
    threshold: f64,
    n_iter: usize,
) -> Result<Vec<bool>> {
    if let Some(groups) = groups
        && groups.len() != values.len()
    {
        return Err(RvError::LengthMismatch {
            expected: values.len(),
            actual: groups.len(),
        });
    }

    let mut members: HashMap<&str, Vec<usize>> = HashMap::new();
    for i in 0..values.len() {
        let label = groups.map_or(ALL_GROUP, |g| g[i].as_str());
        members.entry(label).or_default().push(i);
    }

    let mut mask = vec![true; values.len()];
    for (label, idx) in &members {
        let subvals: Vec<f64> = idx.iter().map(|&i| values[i]).collect();
        let submask = clip_group(&subvals, threshold, n_iter, label);
        for (&i, keep) in idx.iter().zip(submask) {
            mask[i] = keep;
        }
    }

    Ok(mask)
}

fn clip_group(values: &[f64], threshold: f64, n_iter: usize, label: &str) -> Vec<bool> {
    let mut submask = vec![true; values.len()];

    for iteration in 0..n_iter {
        let retained: Vec<f64> = values
            .iter()
            .zip(&submask)
            .filter(|(_, keep)| **keep)
            .map(|(v, _)| *v)
            .collect();

        let Some(center) = median(&retained) else {
            break;
        };
        let Some(spread) = mad(&retained, center) else {
            break;
        };
        if spread == 0.0 {
            debug!("MAD = 0 for group {} at iteration {}, stopping", label, iteration + 1);
            break;
        }

        let next: Vec<bool> = values
            .iter()
            .zip(&submask)
            .map(|(v, keep)| *keep && (MODIFIED_Z_SCALE * (v - center) / spread).abs() < threshold)
            .collect();

        let rejected = submask.iter().zip(&next).filter(|(a, b)| **a && !**b).count();
        debug!(
            "MAD clipping group {} iteration {}: rejected {} points",
            label,
            iteration + 1,
            rejected
        );

        if rejected == 0 {
            break;
        }
        submask = next;
    }

    submask
}
