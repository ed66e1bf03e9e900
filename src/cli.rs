use std::{ffi::OsString, path::PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    PipelineConfig, cohort, columnar, filter_and_count, merge,
    report::{build_report, write_report},
    verify::{self, VerifyOptions},
};

/// Exit status when the command line does not parse.
pub const EXIT_USAGE: u8 = 1;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Filter gVCF files to high-quality heterozygous calls and summarise cohorts",
    long_about = None
)]
struct Cli {
    /// Logging verbosity (e.g. error, warn, info, debug)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Filter one compressed gVCF and print its progressive counts
    Filter {
        /// Input gVCF (gzip or plain text)
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        /// Gzip-compressed output path
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
    },
    /// Check that every sample in each cohort sheet has exactly one input file
    Verify {
        #[arg(long, default_value = "input")]
        input_root: PathBuf,
        #[arg(long, default_value = "output")]
        output_root: PathBuf,
        /// Remove the output root before writing
        #[arg(long)]
        clean: bool,
    },
    /// Filter every sample of every cohort and write per-cohort tables
    Run {
        #[arg(long, default_value = "input")]
        input_root: PathBuf,
        #[arg(long, default_value = "output")]
        output_root: PathBuf,
    },
    /// Join file_check.tsv with the [OK] lines collected in log.txt
    Merge {
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
    },
    /// Convert per-cohort progressive count tables to Parquet
    Parquet {
        #[arg(long, default_value = "output")]
        tsv_dir: PathBuf,
        #[arg(long, default_value = "parquet")]
        parquet_dir: PathBuf,
    },
    /// Summarise the Parquet files per cohort
    Report {
        #[arg(long, default_value = "parquet")]
        parquet_dir: PathBuf,
        /// JSON report path; the .txt rendering and plot SVGs land next to it
        #[arg(long, default_value = "report/cohort_summary.json")]
        output: PathBuf,
    },
}

/// Parse the process arguments and run; returns the process exit status.
pub fn run() -> Result<u8> {
    run_from(std::env::args_os())
}

pub fn run_from<I, T>(args: I) -> Result<u8>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            err.print()?;
            // --help and --version are not failures
            return Ok(if err.use_stderr() { EXIT_USAGE } else { 0 });
        }
    };
    init_logging(&cli.log_level)?;
    execute(cli.command)
}

fn execute(command: Command) -> Result<u8> {
    match command {
        Command::Filter { input, output } => Ok(run_filter(&input, &output)),
        Command::Verify {
            input_root,
            output_root,
            clean,
        } => {
            let summary = verify::verify_inputs(&VerifyOptions {
                input_root,
                output_root,
                clean,
            })?;
            println!("Wrote line count stats to {}", summary.file_check.display());
            println!("Wrote gz index to {}", summary.gz_index.display());
            Ok(0)
        }
        Command::Run {
            input_root,
            output_root,
        } => {
            let summary = cohort::run_pipeline(&PipelineConfig {
                input_root,
                output_root,
            })?;
            for outcome in &summary.cohorts {
                println!(
                    "{}: {} samples -> {}",
                    outcome.name,
                    outcome.rows.len(),
                    outcome.table.display()
                );
            }
            println!(
                "Processed {} samples; skipped {}.",
                summary.processed(),
                summary.skipped.len()
            );
            Ok(0)
        }
        Command::Merge { output_dir } => {
            let summary = merge::merge_progressive_counts(&output_dir)?;
            println!("Merged table written to: {}", summary.merged.display());
            for path in &summary.per_cohort {
                println!("Wrote {}", path.display());
            }
            Ok(0)
        }
        Command::Parquet {
            tsv_dir,
            parquet_dir,
        } => {
            for path in columnar::convert_all(&tsv_dir, &parquet_dir)? {
                println!("Wrote {}", path.display());
            }
            Ok(0)
        }
        Command::Report {
            parquet_dir,
            output,
        } => {
            let report = build_report(&parquet_dir)?;
            let files = write_report(&report, &output)?;
            println!("Report written to: {} and {}", files.json.display(), files.text.display());
            for plot in &files.plots {
                println!("Wrote {}", plot.display());
            }
            Ok(0)
        }
    }
}

/// The per-file command: the `[OK]` line goes to stderr so a batch driver can
/// collect it into `log.txt`.
fn run_filter(input: &std::path::Path, output: &std::path::Path) -> u8 {
    match filter_and_count(input, output) {
        Ok(counts) => {
            eprintln!(
                "{}",
                counts.summary_line(&cohort::file_name(input), &cohort::file_name(output))
            );
            0
        }
        Err(err) => {
            eprintln!("[ERROR] {err}");
            err.exit_code()
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
    Ok(())
}
