//! Append-only record of removed measurements.

use crate::columns;
use crate::error::Result;
use polars::prelude::*;
use serde::{Serialize, Serializer};
use std::fmt;

/// Why a batch of rows left the working set.
#[derive(Debug, Clone, PartialEq)]
pub enum RemovalReason {
    /// DRS version rejected by the pipeline-version policy.
    PipelineFiltered,
    /// Failed DRS quality control.
    DrsQc,
    /// RV uncertainty above the configured ceiling.
    RvErrAbove(f64),
    /// RV uncertainty not strictly positive.
    NegativeRvErr,
    /// Rejected by MAD clipping at the given threshold.
    MadClip(f64),
    /// Caller-defined removal.
    Custom(String),
}

impl RemovalReason {
    /// Reason code as stored in the ledger's `reason` column.
    pub fn code(&self) -> String {
        match self {
            Self::PipelineFiltered => "pipeline_filtered".to_string(),
            Self::DrsQc => "drs_qc".to_string(),
            Self::RvErrAbove(ceiling) => format!("rv_err_gt_{ceiling}"),
            Self::NegativeRvErr => "negative_rv_err".to_string(),
            Self::MadClip(threshold) => format!("rv_mad_clip_{threshold}sigma"),
            Self::Custom(code) => code.clone(),
        }
    }
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

impl Serialize for RemovalReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.code())
    }
}

/// Rows removed together by one stage.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    /// The removed rows with their values at removal time.
    pub rows: DataFrame,
    pub reason: RemovalReason,
}

/// Append-only ledger of removed rows.
#[derive(Debug, Clone, Default)]
pub struct RemovalLedger {
    entries: Vec<LedgerEntry>,
}

impl RemovalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `rows` under `reason`. Empty batches are not recorded.
    pub(crate) fn record(&mut self, rows: DataFrame, reason: RemovalReason) {
        if rows.height() == 0 {
            return;
        }
        self.entries.push(LedgerEntry { rows, reason });
    }

    /// Total number of removed rows.
    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.rows.height()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Reason code of every removed row, in removal order.
    pub fn reasons(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|e| std::iter::repeat_n(e.reason.code(), e.rows.height()))
            .collect()
    }

    /// Number of rows removed under `reason`.
    pub fn count_for(&self, reason: &RemovalReason) -> usize {
        self.entries
            .iter()
            .filter(|e| &e.reason == reason)
            .map(|e| e.rows.height())
            .sum()
    }

    /// All removed rows as one table with a `reason` column.
    ///
    /// Batches with different columns are aligned on the union of their
    /// columns; a column missing from a batch is filled with nulls. A removed
    /// column already named `reason` is exported as `reason_input`.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let mut schema: Vec<(PlSmallStr, DataType)> = Vec::new();
        for entry in &self.entries {
            for col in entry.rows.get_columns() {
                if !schema.iter().any(|(name, _)| name == col.name()) {
                    schema.push((col.name().clone(), col.dtype().clone()));
                }
            }
        }

        let mut out: Option<DataFrame> = None;
        for entry in &self.entries {
            let height = entry.rows.height();
            let mut cols: Vec<Column> = Vec::with_capacity(schema.len() + 1);
            for (name, dtype) in &schema {
                let export_name = if name.as_str() == columns::REASON {
                    PlSmallStr::from(columns::SHADOWED_REASON)
                } else {
                    name.clone()
                };
                let col = match entry.rows.column(name.as_str()) {
                    Ok(col) => col.cast(dtype)?.with_name(export_name),
                    Err(_) => Series::full_null(export_name, height, dtype).into_column(),
                };
                cols.push(col);
            }
            let reasons = vec![entry.reason.code(); height];
            cols.push(Series::new(columns::REASON.into(), reasons).into_column());

            let batch = DataFrame::new(cols)?;
            match out.as_mut() {
                Some(df) => {
                    df.vstack_mut(&batch)?;
                }
                None => out = Some(batch),
            }
        }

        match out {
            Some(df) => Ok(df),
            None => Ok(DataFrame::new(vec![
                Series::new(columns::REASON.into(), Vec::<String>::new()).into_column(),
            ])?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes() {
        assert_eq!(RemovalReason::RvErrAbove(30.0).code(), "rv_err_gt_30");
        assert_eq!(RemovalReason::RvErrAbove(12.5).code(), "rv_err_gt_12.5");
        assert_eq!(RemovalReason::MadClip(5.0).code(), "rv_mad_clip_5sigma");
        assert_eq!(RemovalReason::DrsQc.to_string(), "drs_qc");
        assert_eq!(
            serde_json::to_string(&RemovalReason::NegativeRvErr).unwrap(),
            "\"negative_rv_err\""
        );
    }

    #[test]
    fn test_record_skips_empty_batches() {
        let mut ledger = RemovalLedger::new();
        let empty = df!["a" => Vec::<f64>::new()].unwrap();
        ledger.record(empty, RemovalReason::DrsQc);
        assert!(ledger.is_empty());
        assert!(ledger.entries().is_empty());
    }

    #[test]
    fn test_counts_and_reasons() {
        let mut ledger = RemovalLedger::new();
        ledger.record(df!["a" => [1.0, 2.0]].unwrap(), RemovalReason::DrsQc);
        ledger.record(df!["a" => [3.0]].unwrap(), RemovalReason::NegativeRvErr);

        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.count_for(&RemovalReason::DrsQc), 2);
        assert_eq!(ledger.reasons(), vec!["drs_qc", "drs_qc", "negative_rv_err"]);
    }

    #[test]
    fn test_to_frame_aligns_columns() {
        let mut ledger = RemovalLedger::new();
        ledger.record(df!["a" => [1.0], "b" => ["x"]].unwrap(), RemovalReason::DrsQc);
        ledger.record(df!["a" => [2.0]].unwrap(), RemovalReason::NegativeRvErr);

        let frame = ledger.to_frame().unwrap();
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.width(), 3);
        assert_eq!(frame.column("b").unwrap().null_count(), 1);
        let reasons: Vec<Option<&str>> = frame.column(columns::REASON).unwrap().str().unwrap().into_iter().collect();
        assert_eq!(reasons, vec![Some("drs_qc"), Some("negative_rv_err")]);
    }

    #[test]
    fn test_to_frame_empty_ledger() {
        let frame = RemovalLedger::new().to_frame().unwrap();
        assert_eq!(frame.height(), 0);
        assert_eq!(frame.width(), 1);
    }

    #[test]
    fn test_to_frame_keeps_existing_reason_column() {
        let mut ledger = RemovalLedger::new();
        let rows = df![
            columns::RV => [1.0, 2.0],
            columns::REASON => ["cosmic ray", "moon"],
        ]
        .unwrap();
        ledger.record(rows, RemovalReason::DrsQc);

        let frame = ledger.to_frame().unwrap();
        assert_eq!(frame.height(), 2);
        let reasons: Vec<Option<&str>> = frame.column(columns::REASON).unwrap().str().unwrap().into_iter().collect();
        assert_eq!(reasons, vec![Some("drs_qc"), Some("drs_qc")]);
        let original: Vec<Option<&str>> = frame
            .column(columns::SHADOWED_REASON)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(original, vec![Some("cosmic ray"), Some("moon")]);
    }
}
