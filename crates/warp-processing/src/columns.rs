//! Column names of the measurement table.
//!
//! Rows are kept in a polars `DataFrame`; these constants are the only place
//! where the archive's column naming is spelled out.

/// Instrument name.
pub const INSTRUMENT: &str = "ins_name";
/// Observation time, reduced barycentric Julian date (BJD - 2 400 000).
pub const TIMESTAMP: &str = "obj_date_bjd";
/// Radial velocity, m/s.
pub const RV: &str = "spectro_ccf_rv";
/// Radial-velocity uncertainty, m/s.
pub const RV_ERR: &str = "spectro_ccf_rv_err";
/// DRS quality-control flag.
pub const QC: &str = "spectro_drs_qc";
/// DRS (pipeline) version string.
pub const DRS_VERSION: &str = "spectro_drs_ver";
/// Bisector span.
pub const BISPAN: &str = "spectro_ccf_bispan";
/// CCF full width at half maximum.
pub const FWHM: &str = "spectro_ccf_fwhm";
/// CCF contrast.
pub const CONTRAST: &str = "spectro_ccf_contrast";
/// Observing night label (`YYYY-MM-DD`).
pub const NIGHT: &str = "date_night";
/// Archive identifier of the target.
pub const TARGET_ID: &str = "obj_id_daceid";
/// Number of rows merged into a nightly bin.
pub const N_BINNED: &str = "n_binned";
/// Reason code column of the removal ledger.
pub const REASON: &str = "reason";
/// Name given in the ledger to a measurement column that was already called `reason`.
pub const SHADOWED_REASON: &str = "reason_input";

/// Suffix of uncertainty columns.
pub const ERR_SUFFIX: &str = "_err";

/// Columns a measurement table must carry to enter the pipeline.
pub const REQUIRED: [&str; 4] = [INSTRUMENT, TIMESTAMP, RV, RV_ERR];

/// Columns read as text from files, whatever their values look like.
///
/// DRS versions such as `3.10` would otherwise be parsed as numbers.
pub const TEXT: [&str; 4] = [INSTRUMENT, DRS_VERSION, TARGET_ID, NIGHT];

/// Name of the uncertainty column paired with `column`.
pub fn err_column(column: &str) -> String {
    format!("{column}{ERR_SUFFIX}")
}
