//! DICOM Mirror CLI
//!
//! Command-line interface for converting a manifest of DICOM folders
//! into a mirrored PNG tree and for recounting an existing tree.

use clap::{Args, Parser, Subcommand};
use dicom_mirror::{
    batch::{count_only, ConversionJob},
    config::FileConfig,
    report::CountReport,
    transform::WindowSelection,
};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "dicom-mirror", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert every manifest entry, then write the count report
    Run(RunArgs),
    /// Only write the count report for an existing output tree
    Count(CountArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Manifest CSV listing source folders
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Root the manifest folders live under
    #[arg(long)]
    base_root: Option<PathBuf>,

    #[command(flatten)]
    output: OutputArgs,

    /// Provenance log path
    #[arg(long)]
    log: Option<PathBuf>,

    /// Filename token selecting source files (repeatable)
    #[arg(long = "token")]
    tokens: Vec<String>,

    /// Concurrent file conversions
    #[arg(long)]
    workers: Option<usize>,

    /// Multi-valued window element: first, last, ignore or an index
    #[arg(long, value_parser = parse_window_selection)]
    window_selection: Option<WindowSelection>,

    /// Write run metrics in Prometheus text format
    #[arg(long)]
    metrics_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct CountArgs {
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Debug, Args)]
struct OutputArgs {
    /// Root of the mirrored output tree
    #[arg(long)]
    output_root: Option<PathBuf>,

    /// Count report path
    #[arg(long)]
    report: Option<PathBuf>,
}

impl OutputArgs {
    fn apply(self, config: &mut FileConfig) {
        if let Some(root) = self.output_root {
            config.paths.output_root = root;
        }
        if let Some(report) = self.report {
            config.paths.report_path = Some(report);
        }
    }
}

impl RunArgs {
    fn apply(self, config: &mut FileConfig) {
        if let Some(manifest) = self.manifest {
            config.paths.manifest = manifest;
        }
        if let Some(base_root) = self.base_root {
            config.paths.base_root = base_root;
        }
        self.output.apply(config);
        if let Some(log) = self.log {
            config.paths.log_path = Some(log);
        }
        if !self.tokens.is_empty() {
            config.selection.filter_tokens = self.tokens;
        }
        if let Some(workers) = self.workers {
            config.run.workers = workers;
        }
        if let Some(selection) = self.window_selection {
            config.transform.window_selection = selection;
        }
        if let Some(path) = self.metrics_file {
            config.run.metrics_file = Some(path);
        }
    }
}

fn parse_window_selection(value: &str) -> Result<WindowSelection, String> {
    match value {
        "first" => Ok(WindowSelection::First),
        "last" => Ok(WindowSelection::Last),
        "ignore" => Ok(WindowSelection::Ignore),
        other => other
            .parse::<usize>()
            .map(WindowSelection::Index)
            .map_err(|_| format!("expected first, last, ignore or an index, got {other:?}")),
    }
}

fn print_counts(counts: &CountReport) {
    print!("{}", counts.render());
    println!("total: {}", counts.total());
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    info!("DICOM Mirror v{}", dicom_mirror::VERSION);

    let mut config = match &cli.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => FileConfig::default(),
    };

    match cli.command {
        Command::Run(args) => {
            args.apply(&mut config);
            match ConversionJob::new(config).run() {
                Ok(output) => {
                    println!("{}", output.summary);
                    print_counts(&output.counts);
                    if output.summary.failed > 0 || output.summary.log_errors > 0 {
                        warn!(
                            failed = output.summary.failed,
                            log_errors = output.summary.log_errors,
                            "Run finished with failures; see the provenance log"
                        );
                    }
                }
                Err(e) => {
                    eprintln!("Run aborted: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Command::Count(args) => {
            args.output.apply(&mut config);
            match count_only(&config) {
                Ok(counts) => print_counts(&counts),
                Err(e) => {
                    eprintln!("Count failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}
