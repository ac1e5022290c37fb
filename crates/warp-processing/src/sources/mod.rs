//! External collaborators of the pipeline.
//!
//! The core never talks to an archive or a catalog directly. It consumes three
//! traits instead:
//!
//! - [`DataSource`] returns the raw measurement rows of a target
//! - [`IdentityResolver`] maps a display name to the archive identifier
//! - [`AstrometryProvider`] returns parallax and proper motion for a target
//!
//! Concrete implementations shipped here work offline: [`CsvDataSource`] and
//! [`FrameDataSource`] serve rows from a file or an in-memory table,
//! [`CandidateResolver`] walks candidate names against a [`CatalogDirectory`],
//! and [`StaticAstrometry`] returns a fixed solution.
//!
//! # Adding a New Source
//!
//! Implement the trait on your client type and hand it to
//! [`Pipeline::builder()`](crate::Pipeline::builder). Calls are blocking; retry
//! and timeout policy belong to the implementation.

mod astrometry;
mod resolver;
mod table;

pub use astrometry::{AstrometricSolution, AstrometrySource, StaticAstrometry};
pub use resolver::{CandidateResolver, CatalogDirectory, candidate_names};
pub use table::{CsvDataSource, FrameDataSource, select_rows};

use crate::error::Result;
use polars::prelude::DataFrame;

/// Supplier of raw measurement rows.
pub trait DataSource: Send + Sync {
    /// Fetch every row of `identity`, optionally restricted to instruments whose
    /// name contains one of `instruments`.
    ///
    /// # Errors
    ///
    /// Returns [`RvError::NotFound`](crate::RvError::NotFound) if no row matches.
    fn fetch(&self, identity: &str, instruments: Option<&[String]>) -> Result<DataFrame>;

    /// Get the source name for logging.
    fn name(&self) -> &str;
}

/// Maps a display name ("HD 10700", "tau Ceti") to the archive identifier.
pub trait IdentityResolver: Send + Sync {
    /// Resolve `display_name`.
    ///
    /// # Errors
    ///
    /// Returns [`RvError::NotFound`](crate::RvError::NotFound) when no
    /// candidate name resolves.
    fn resolve(&self, display_name: &str) -> Result<String>;
}

/// Supplier of astrometric parameters.
pub trait AstrometryProvider: Send + Sync {
    /// Look up the astrometric solution of `display_name`.
    ///
    /// `Ok(None)` means the catalog answered but has no usable entry.
    fn lookup(&self, display_name: &str) -> Result<Option<AstrometricSolution>>;

    /// Get the provider name for logging.
    fn name(&self) -> &str;
}

static_assertions::assert_obj_safe!(DataSource, IdentityResolver, AstrometryProvider);
