//! Robust statistics used by the cleaning stages.

pub mod robust;
pub mod summary;

pub use robust::{mad, mad_clip_mask, median, rms, weighted_mean, weighted_rms};
pub use summary::{InstrumentStats, instrument_statistics};
