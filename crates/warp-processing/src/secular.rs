//! Secular-acceleration correction.
//!
//! A star's transverse motion makes its radial velocity drift linearly in
//! time (the perspective effect). The drift depends only on proper motion and
//! distance, so it is removed before any per-instrument statistics.

use crate::error::{Result, RvError};
use crate::sources::{AstrometricSolution, AstrometryProvider};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// km/s per (arcsec/yr at 1 pc): converts `pm / parallax` to a tangential velocity.
pub const TANGENTIAL_VELOCITY_FACTOR: f64 = 4.74047;
/// One parsec in metres.
pub const PARSEC_M: f64 = 3.085_677_581_491_367e16;
/// Days in a Julian year.
pub const DAYS_PER_YEAR: f64 = 365.25;
/// Seconds in a Julian year.
pub const SECONDS_PER_YEAR: f64 = DAYS_PER_YEAR * 86_400.0;

/// Maximum Gaia RUWE for a solution to be trusted.
pub const MAX_QUALITY: f64 = 1.4;
/// Minimum parallax signal-to-noise for a solution to be trusted.
pub const MIN_PARALLAX_SNR: f64 = 3.0;

/// Secular acceleration in m/s/yr.
///
/// `pmra` and `pmdec` are in mas/yr, `parallax` in mas.
///
/// # Errors
///
/// Returns [`RvError::InvalidParallax`] when `parallax` is not strictly positive.
pub fn secular_acceleration(pmra: f64, pmdec: f64, parallax: f64) -> Result<f64> {
    if !(parallax > 0.0) || !parallax.is_finite() {
        return Err(RvError::InvalidParallax(parallax));
    }

    let pm = pmra.hypot(pmdec);
    let distance_pc = 1000.0 / parallax;
    let vt_ms = TANGENTIAL_VELOCITY_FACTOR * (pm / parallax) * 1000.0;

    let accel_ms2 = vt_ms * vt_ms / (distance_pc * PARSEC_M);
    Ok(accel_ms2 * SECONDS_PER_YEAR)
}

/// Acceptance rule for the primary catalog.
///
/// The parallax must be positive with a signal-to-noise of at least 3, and the
/// reliability indicator, when present, must be below 1.4.
pub fn is_reliable(solution: &AstrometricSolution) -> bool {
    solution.parallax > 0.0
        && solution.parallax_snr() >= MIN_PARALLAX_SNR
        && solution.quality.is_none_or(|q| q < MAX_QUALITY)
}

/// First usable answer of an ordered list of lookups.
///
/// Each lookup's error or `None` moves on to the next one; `None` is returned
/// when all of them came back empty.
pub fn first_accepted<T>(lookups: impl IntoIterator<Item = (String, Result<Option<T>>)>) -> Option<T> {
    for (name, result) in lookups {
        match result {
            Ok(Some(value)) => return Some(value),
            Ok(None) => debug!("{} returned no usable result", name),
            Err(e) => warn!("{} lookup failed: {}", name, e),
        }
    }
    None
}

/// Applies the secular correction using a primary and an optional secondary catalog.
pub struct SecularCorrector {
    primary: Option<Arc<dyn AstrometryProvider>>,
    secondary: Option<Arc<dyn AstrometryProvider>>,
}

/// Outcome of [`SecularCorrector::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct SecularOutcome {
    pub corrected: Vec<f64>,
    /// `(solution, drift m/s/yr, reference epoch)` when a correction was applied.
    pub applied: Option<(AstrometricSolution, f64, f64)>,
}

impl SecularCorrector {
    pub fn new(
        primary: Option<Arc<dyn AstrometryProvider>>,
        secondary: Option<Arc<dyn AstrometryProvider>>,
    ) -> Self {
        Self { primary, secondary }
    }

    /// Resolve the astrometric solution of `target`, primary first.
    pub fn resolve(&self, target: &str) -> Option<AstrometricSolution> {
        let primary = self.primary.iter().map(|p| {
            let result = p.lookup(target).map(|found| {
                found.filter(|s| {
                    let ok = is_reliable(s);
                    if !ok {
                        warn!(
                            "{} solution for {} rejected (parallax {:.3} mas, snr {:.1}, quality {:?})",
                            p.name(),
                            target,
                            s.parallax,
                            s.parallax_snr(),
                            s.quality
                        );
                    }
                    ok
                })
            });
            (p.name().to_string(), result)
        });
        let secondary = self
            .secondary
            .iter()
            .map(|p| (p.name().to_string(), p.lookup(target)));

        first_accepted(primary.chain(secondary))
    }

    /// Subtract the secular drift from `rv`.
    ///
    /// `timestamps` are reduced BJD. When no `reference_epoch` is given the
    /// catalog's own epoch is used. Never fails: when no catalog gives a usable
    /// solution, or the solution is non-physical, `rv` comes back unchanged.
    pub fn apply(
        &self,
        target: &str,
        timestamps: &[f64],
        rv: &[f64],
        reference_epoch: Option<f64>,
    ) -> SecularOutcome {
        let unchanged = || SecularOutcome {
            corrected: rv.to_vec(),
            applied: None,
        };

        if timestamps.len() != rv.len() {
            warn!(
                "Secular correction skipped: {} timestamps for {} velocities",
                timestamps.len(),
                rv.len()
            );
            return unchanged();
        }

        let Some(solution) = self.resolve(target) else {
            warn!(
                "Could not retrieve astrometric data for {}; RVs left uncorrected",
                target
            );
            return unchanged();
        };

        let drift = match secular_acceleration(solution.pmra, solution.pmdec, solution.parallax) {
            Ok(drift) => drift,
            Err(e) => {
                warn!("Secular correction skipped for {}: {}", target, e);
                return unchanged();
            }
        };

        let epoch = reference_epoch.unwrap_or_else(|| solution.source.default_epoch());
        let corrected = timestamps
            .iter()
            .zip(rv)
            .map(|(t, v)| v - drift * (t - epoch) / DAYS_PER_YEAR)
            .collect();

        info!(
            "Secular acceleration of {}: {:.4} m/s/yr ({:?}, reference epoch {})",
            target, drift, solution.source, epoch
        );

        SecularOutcome {
            corrected,
            applied: Some((solution, drift, epoch)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{AstrometrySource, StaticAstrometry};

    struct Failing;

    impl AstrometryProvider for Failing {
        fn lookup(&self, _display_name: &str) -> Result<Option<AstrometricSolution>> {
            Err(RvError::Provider("service unavailable".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn barnard(source: AstrometrySource) -> AstrometricSolution {
        AstrometricSolution {
            parallax: 546.976,
            parallax_error: Some(0.04),
            pmra: -801.551,
            pmdec: 10362.394,
            quality: Some(1.05),
            source,
        }
    }

    fn provider(solution: Option<AstrometricSolution>) -> Option<Arc<dyn AstrometryProvider>> {
        Some(Arc::new(StaticAstrometry::new("static", solution)))
    }

    // ==================== secular_acceleration tests ====================

    #[test]
    fn test_secular_acceleration_barnards_star() {
        // Barnard's star is the textbook case at about 4.5 m/s/yr
        let s = barnard(AstrometrySource::Gaia);
        let drift = secular_acceleration(s.pmra, s.pmdec, s.parallax).unwrap();
        assert!((drift - 4.5).abs() < 0.1, "got {drift}");
    }

    #[test]
    fn test_secular_acceleration_zero_proper_motion() {
        assert_eq!(secular_acceleration(0.0, 0.0, 10.0).unwrap(), 0.0);
    }

    #[test]
    fn test_secular_acceleration_rejects_non_positive_parallax() {
        assert!(matches!(
            secular_acceleration(100.0, 100.0, 0.0),
            Err(RvError::InvalidParallax(_))
        ));
        assert!(matches!(
            secular_acceleration(100.0, 100.0, -2.0),
            Err(RvError::InvalidParallax(_))
        ));
    }

    // ==================== acceptance policy tests ====================

    #[test]
    fn test_is_reliable() {
        let good = barnard(AstrometrySource::Gaia);
        assert!(is_reliable(&good));

        let high_ruwe = AstrometricSolution {
            quality: Some(1.4),
            ..good.clone()
        };
        assert!(!is_reliable(&high_ruwe));

        let no_ruwe = AstrometricSolution {
            quality: None,
            ..good.clone()
        };
        assert!(is_reliable(&no_ruwe));

        let noisy = AstrometricSolution {
            parallax_error: Some(good.parallax),
            ..good
        };
        assert!(!is_reliable(&noisy));
    }

    // ==================== SecularCorrector tests ====================

    #[test]
    fn test_apply_uses_primary_epoch() {
        let corrector = SecularCorrector::new(provider(Some(barnard(AstrometrySource::Gaia))), None);
        let outcome = corrector.apply("Barnard", &[57_389.0, 57_389.0 + 365.25], &[0.0, 0.0], None);

        let (_, drift, epoch) = outcome.applied.clone().unwrap();
        assert_eq!(epoch, 57_389.0);
        assert_eq!(outcome.corrected[0], 0.0);
        assert!((outcome.corrected[1] + drift).abs() < 1e-9);
    }

    #[test]
    fn test_apply_falls_back_when_primary_rejected() {
        let rejected = AstrometricSolution {
            quality: Some(2.5),
            ..barnard(AstrometrySource::Gaia)
        };
        let corrector = SecularCorrector::new(
            provider(Some(rejected)),
            provider(Some(barnard(AstrometrySource::Simbad))),
        );
        let outcome = corrector.apply("Barnard", &[55_500.0], &[1.0], None);
        let (solution, _, epoch) = outcome.applied.unwrap();
        assert_eq!(solution.source, AstrometrySource::Simbad);
        assert_eq!(epoch, 55_500.0);
    }

    #[test]
    fn test_apply_falls_back_when_primary_fails() {
        let corrector = SecularCorrector::new(
            Some(Arc::new(Failing)),
            provider(Some(barnard(AstrometrySource::Simbad))),
        );
        assert!(corrector.resolve("Barnard").is_some());
    }

    #[test]
    fn test_apply_explicit_reference_epoch() {
        let corrector = SecularCorrector::new(provider(Some(barnard(AstrometrySource::Gaia))), None);
        let outcome = corrector.apply("Barnard", &[50_000.0], &[3.0], Some(50_000.0));
        assert_eq!(outcome.corrected, vec![3.0]);
        assert_eq!(outcome.applied.unwrap().2, 50_000.0);
    }

    #[test]
    fn test_apply_unchanged_when_all_providers_fail() {
        let corrector = SecularCorrector::new(Some(Arc::new(Failing)), provider(None));
        let rv = vec![1.0, 2.0, 3.0];
        let outcome = corrector.apply("nobody", &[1.0, 2.0, 3.0], &rv, None);
        assert_eq!(outcome.corrected, rv);
        assert!(outcome.applied.is_none());
    }

    #[test]
    fn test_apply_unchanged_on_non_physical_secondary() {
        let bad = AstrometricSolution {
            parallax: -3.0,
            ..barnard(AstrometrySource::Simbad)
        };
        let corrector = SecularCorrector::new(None, provider(Some(bad)));
        let outcome = corrector.apply("star", &[57_000.0], &[5.0], None);
        assert_eq!(outcome.corrected, vec![5.0]);
        assert!(outcome.applied.is_none());
    }
}
