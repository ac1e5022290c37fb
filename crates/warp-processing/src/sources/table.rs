use super::DataSource;
use crate::columns;
use crate::config::PipelineConfig;
use crate::error::{Result, ResultExt, RvError};
use crate::utils::{has_column, str_values};
use polars::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Marker of instruments reduced by the legacy "NDRS" pipeline.
const NDRS_MARKER: &str = "NDRS";

/// Keep the rows of `df` that belong to `identity` and to the requested instruments.
///
/// When the table has no target-id column every row is taken to belong to
/// `identity`. Instrument matching is by substring, like the archive's
/// `contains` filter. Returns [`RvError::NotFound`] when nothing is left.
pub fn select_rows(
    df: &DataFrame,
    identity: &str,
    instruments: Option<&[String]>,
    skip_ndrs: bool,
) -> Result<DataFrame> {
    let target_ids = if has_column(df, columns::TARGET_ID) {
        Some(str_values(df, columns::TARGET_ID)?)
    } else {
        None
    };
    let names = str_values(df, columns::INSTRUMENT)?;

    let keep: Vec<bool> = names
        .iter()
        .enumerate()
        .map(|(i, ins)| {
            let target_ok = target_ids.as_ref().is_none_or(|ids| ids[i] == identity);
            let instrument_ok =
                instruments.is_none_or(|wanted| wanted.iter().any(|w| ins.contains(w.as_str())));
            let ndrs_ok = !(skip_ndrs && ins.contains(NDRS_MARKER));
            target_ok && instrument_ok && ndrs_ok
        })
        .collect();

    let mask = BooleanChunked::from_slice("mask".into(), &keep);
    let selected = df.filter(&mask)?;

    if selected.height() == 0 {
        return Err(RvError::NotFound(format!(
            "no measurements for target '{}'",
            identity
        )));
    }

    debug!(
        "Selected {} of {} rows for target '{}'",
        selected.height(),
        df.height(),
        identity
    );
    Ok(selected)
}

/// Data source reading a CSV export of the archive.
#[derive(Debug, Clone)]
pub struct CsvDataSource {
    path: PathBuf,
    skip_ndrs: bool,
}

impl CsvDataSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            skip_ndrs: true,
        }
    }

    /// Source for `path` honoring the fetch settings of `config`.
    pub fn from_config(path: impl Into<PathBuf>, config: &PipelineConfig) -> Self {
        Self::new(path).skip_ndrs(config.skip_ndrs)
    }

    /// Keep or drop "NDRS" instruments (dropped by default).
    pub fn skip_ndrs(mut self, skip: bool) -> Self {
        self.skip_ndrs = skip;
        self
    }

    /// String dtypes for the text columns present in the file header.
    fn text_overrides(&self) -> Result<Option<SchemaRef>> {
        let mut header = String::new();
        BufReader::new(File::open(&self.path)?).read_line(&mut header)?;
        let present: Vec<&str> = header
            .trim_end()
            .split(',')
            .map(|name| name.trim().trim_matches('"'))
            .collect();

        let mut schema = Schema::default();
        for name in columns::TEXT.iter().filter(|name| present.contains(*name)) {
            schema.with_column((*name).into(), DataType::String);
        }
        if schema.is_empty() {
            return Ok(None);
        }
        Ok(Some(Arc::new(schema)))
    }

    fn read(&self) -> Result<DataFrame> {
        let df = CsvReadOptions::default()
            .with_infer_schema_length(Some(1000))
            .with_schema_overwrite(self.text_overrides()?)
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(self.path.clone()))?
            .finish()
            .context(format!("reading {}", self.path.display()))?;
        info!("Read {} rows from {}", df.height(), self.path.display());
        Ok(df)
    }
}

impl DataSource for CsvDataSource {
    fn fetch(&self, identity: &str, instruments: Option<&[String]>) -> Result<DataFrame> {
        let df = self.read()?;
        select_rows(&df, identity, instruments, self.skip_ndrs)
    }

    fn name(&self) -> &str {
        "csv"
    }
}

/// Data source serving rows from an in-memory table.
#[derive(Debug, Clone)]
pub struct FrameDataSource {
    frame: DataFrame,
    skip_ndrs: bool,
}

impl FrameDataSource {
    pub fn new(frame: DataFrame) -> Self {
        Self {
            frame,
            skip_ndrs: true,
        }
    }

    /// Keep or drop "NDRS" instruments (dropped by default).
    pub fn skip_ndrs(mut self, skip: bool) -> Self {
        self.skip_ndrs = skip;
        self
    }
}

impl DataSource for FrameDataSource {
    fn fetch(&self, identity: &str, instruments: Option<&[String]>) -> Result<DataFrame> {
        select_rows(&self.frame, identity, instruments, self.skip_ndrs)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
