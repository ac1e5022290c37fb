//! CLI entry point for the RV cleaning pipeline.

use anyhow::{Result, anyhow};
use clap::Parser;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use warp_processing::{
    AstrometricSolution, AstrometrySource, CsvDataSource, InstrumentStats, MadClipConfig,
    Pipeline, PipelineConfig, PipelineResult, StaticAstrometry,
};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Outlier-robust cleaning of stellar radial-velocity time series",
    long_about = "Cleans the RV measurements of one star exported from the archive as CSV.\n\n\
                  EXAMPLES:\n  \
                  # Default cleaning, no astrometry (secular correction skipped)\n  \
                  warp -i hd10700.csv -t \"HD 10700\"\n\n  \
                  # With astrometry, MAD clipping and nightly bins\n  \
                  warp -i hd10700.csv -t \"HD 10700\" --parallax 273.8 --pmra -1729.7 \\\n      \
                  --pmdec 855.5 --mad-clip 5 --bin\n\n  \
                  # Configuration from JSON\n  \
                  warp -i hd10700.csv -t \"HD 10700\" --config warp.json"
)]
struct Args {
    /// Path to the CSV export of the measurements
    #[arg(short, long)]
    input: PathBuf,

    /// Target name (also the archive id when the CSV carries obj_id_daceid)
    #[arg(short, long)]
    target: String,

    /// Output directory for the retained rows and the removal ledger
    #[arg(short, long, default_value = "./outputs")]
    output: PathBuf,

    /// JSON configuration file; command-line switches override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// RV uncertainty ceiling in m/s
    #[arg(long)]
    max_rv_err: Option<f64>,

    /// Restrict to instruments whose name contains one of these (comma separated)
    #[arg(long, value_delimiter = ',')]
    instruments: Option<Vec<String>>,

    /// Keep rows that failed the DRS quality control
    #[arg(long)]
    keep_failed_qc: bool,

    /// Do not subtract the per-instrument weighted means
    #[arg(long)]
    no_adjust_means: bool,

    /// Enable MAD clipping with this threshold
    #[arg(long)]
    mad_clip: Option<f64>,

    /// Bin the retained rows per night and instrument
    #[arg(long)]
    bin: bool,

    /// Parallax in mas, enables the secular correction
    #[arg(long, requires_all = ["pmra", "pmdec"])]
    parallax: Option<f64>,

    /// Parallax uncertainty in mas
    #[arg(long)]
    parallax_error: Option<f64>,

    /// Proper motion in right ascension, mas/yr
    #[arg(long, allow_hyphen_values = true)]
    pmra: Option<f64>,

    /// Proper motion in declination, mas/yr
    #[arg(long, allow_hyphen_values = true)]
    pmdec: Option<f64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show warnings and final result)
    #[arg(short, long)]
    quiet: bool,

    /// Output the summary as JSON on stdout
    #[arg(long)]
    json: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is disabled so stdout only holds JSON.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.quiet, args.json);

    if !args.input.exists() {
        return Err(anyhow!("Input file not found: {}", args.input.display()));
    }
    if !args.output.exists() {
        std::fs::create_dir_all(&args.output)?;
        info!("Created output directory: {}", args.output.display());
    }

    let config = build_config(&args)?;
    let pipeline = build_pipeline(&args, config)?;

    let result = pipeline.run(&args.target).map_err(|e| {
        error!("Pipeline failed: {}", e);
        anyhow!("Pipeline failed: {}", e)
    })?;

    handle_pipeline_output(result, &args)
}

/// Merge the JSON configuration (if any) with the command-line switches.
fn build_config(args: &Args) -> Result<PipelineConfig> {
    let base = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str::<PipelineConfig>(&text)
                .map_err(|e| anyhow!("Invalid configuration {}: {}", path.display(), e))?
        }
        None => PipelineConfig::default(),
    };

    let mut builder = PipelineConfig::builder()
        .tables(base.tables.clone())
        .max_rv_err(args.max_rv_err.unwrap_or(base.max_rv_err))
        .adjust_means(base.adjust_means && !args.no_adjust_means)
        .do_secular_corr(base.do_secular_corr && args.parallax.is_some())
        .keep_failed_qc(base.keep_failed_qc || args.keep_failed_qc)
        .bin_nightly(base.bin_nightly || args.bin)
        .skip_ndrs(base.skip_ndrs);

    if let Some(epoch) = base.reference_epoch {
        builder = builder.reference_epoch(epoch);
    }
    if let Some(instruments) = args.instruments.clone().or(base.instruments) {
        builder = builder.instruments(instruments);
    }
    match (args.mad_clip, base.mad_clip) {
        (Some(threshold), base_clip) => {
            builder = builder.mad_clip(MadClipConfig {
                threshold,
                ..base_clip.unwrap_or_default()
            });
        }
        (None, Some(clip)) => builder = builder.mad_clip(clip),
        (None, None) => {}
    }

    Ok(builder.build()?)
}

fn build_pipeline(args: &Args, config: PipelineConfig) -> Result<Pipeline> {
    let source = CsvDataSource::from_config(&args.input, &config);
    let mut builder = Pipeline::builder()
        .config(config)
        .data_source(Arc::new(source));

    if let (Some(parallax), Some(pmra), Some(pmdec)) = (args.parallax, args.pmra, args.pmdec) {
        let solution = AstrometricSolution {
            parallax,
            parallax_error: args.parallax_error,
            pmra,
            pmdec,
            quality: None,
            source: AstrometrySource::Simbad,
        };
        // user-supplied values are not quality-checked
        builder = builder.secondary_astrometry(Arc::new(StaticAstrometry::new(
            "command line",
            Some(solution),
        )));
    }

    if !args.quiet {
        builder = builder.on_stage(|report| {
            info!(
                "[{}] {} ({} -> {} rows)",
                report.stage.display_name(),
                report.message,
                report.rows_before,
                report.rows_after
            );
        });
    }

    Ok(builder.build()?)
}

fn handle_pipeline_output(result: PipelineResult, args: &Args) -> Result<()> {
    let stem = file_stem(&args.input);

    let mut retained = result.collection.data().clone();
    let retained_path = args.output.join(format!("{stem}_cleaned.csv"));
    write_csv(&mut retained, &retained_path)?;

    let mut removed = result.collection.ledger().to_frame()?;
    let ledger_path = args.output.join(format!("{stem}_removed.csv"));
    write_csv(&mut removed, &ledger_path)?;

    let stats = result.collection.instrument_statistics()?;

    if args.json {
        let report = serde_json::json!({
            "target": result.collection.name(),
            "identity": result.collection.identity(),
            "summary": result.summary,
            "instruments": stats,
            "retained_file": retained_path,
            "removed_file": ledger_path,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_human_readable_summary(&result, &stats, &retained_path, &ledger_path);
    Ok(())
}

fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(df)?;
    info!("Wrote {} rows to {}", df.height(), path.display());
    Ok(())
}

/// Extract the file stem (name without extension) from a path.
fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string()
}

/// Print a human-readable summary of the cleaning results.
///
/// This is the default output when `--json` is not given.
fn print_human_readable_summary(
    result: &PipelineResult,
    stats: &[InstrumentStats],
    retained_path: &Path,
    ledger_path: &Path,
) {
    let summary = &result.summary;

    println!();
    println!("{}", "=".repeat(80));
    println!("CLEANING COMPLETE: {}", result.collection.name());
    println!("{}", "=".repeat(80));
    println!();

    println!(
        "Rows: {} -> {} ({} removed) in {}ms",
        summary.rows_loaded, summary.rows_retained, summary.rows_removed, summary.duration_ms
    );
    match summary.secular_drift {
        Some(drift) => println!("Secular drift: {:.4} m/s/yr", drift),
        None => println!("Secular drift: not applied"),
    }
    println!();

    if !summary.removed_by_reason.is_empty() {
        println!("Removed:");
        for (reason, count) in &summary.removed_by_reason {
            println!("  {:<24} {}", reason, count);
        }
        println!();
    }

    println!(
        "{:<14} {:>6} {:>12} {:>12} {:>10} {:>10}",
        "Instrument", "N", "wmean", "wmean err", "rms", "MAD"
    );
    println!("{}", "-".repeat(70));
    for s in stats {
        println!(
            "{:<14} {:>6} {:>12.3} {:>12.3} {:>10.3} {:>10.3}",
            s.instrument, s.n_points, s.weighted_mean, s.weighted_mean_err, s.rms, s.mad
        );
    }
    println!();

    println!("Retained rows: {}", retained_path.display());
    println!("Removed rows:  {}", ledger_path.display());
    println!("{}", "=".repeat(80));
}
