use super::AstrometryProvider;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Catalog an astrometric solution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AstrometrySource {
    /// Gaia DR3 cone search (primary).
    Gaia,
    /// SIMBAD basic data (secondary).
    Simbad,
}

impl AstrometrySource {
    /// Reference epoch (reduced BJD) of the catalog's astrometry.
    pub fn default_epoch(&self) -> f64 {
        match self {
            Self::Gaia => 57_389.0,
            Self::Simbad => 55_500.0,
        }
    }
}

/// Parallax and proper motion of a target, in mas and mas/yr.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstrometricSolution {
    pub parallax: f64,
    #[serde(default)]
    pub parallax_error: Option<f64>,
    pub pmra: f64,
    pub pmdec: f64,
    /// Per-source reliability indicator (Gaia RUWE).
    #[serde(default)]
    pub quality: Option<f64>,
    pub source: AstrometrySource,
}

impl AstrometricSolution {
    /// Parallax signal-to-noise, zero when the parallax error is unknown or zero.
    pub fn parallax_snr(&self) -> f64 {
        match self.parallax_error {
            Some(err) if err > 0.0 => self.parallax / err,
            _ => 0.0,
        }
    }
}

/// Provider returning a fixed solution regardless of the target name.
#[derive(Debug, Clone)]
pub struct StaticAstrometry {
    name: String,
    solution: Option<AstrometricSolution>,
}

impl StaticAstrometry {
    pub fn new(name: impl Into<String>, solution: Option<AstrometricSolution>) -> Self {
        Self {
            name: name.into(),
            solution,
        }
    }
}

impl AstrometryProvider for StaticAstrometry {
    fn lookup(&self, _display_name: &str) -> Result<Option<AstrometricSolution>> {
        Ok(self.solution.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
