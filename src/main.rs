//! CLI entry point for the nearest-neighbor benchmark.
//!
//! Provides commands for single runs, experiment matrices, configuration
//! management and kernel capability reporting.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::{
    Args, Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use tracing::{Level, info, warn};

use nnbench::config::{CONFIG_DIR, DatasetSettings, ExperimentSettings, RunSettings, Settings, UnsupportedPolicy};
use nnbench::display::{create_kernel_table, create_progress_bar, create_run_table, with_spinner};
use nnbench::engine::BenchmarkEngine;
use nnbench::error::{BenchError, BenchResult};
use nnbench::io::ExitCode;
use nnbench::report::{JsonLinesSink, MemorySink, ResultSink, RunReport, components};
use nnbench::vector::{
    Alignment, EncodingKind, KernelVariant, MetricKind, Recall, ScanResult, SyntheticDataset,
    VectorError,
};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Nearest-neighbor search benchmark
#[derive(Parser)]
#[command(
    name = "nnbench",
    version = env!("CARGO_PKG_VERSION"),
    about = "Benchmark brute-force nearest-neighbor kernels and sketch filters",
    long_about = "Scan synthetic vector sets with scalar and SIMD distance kernels, \
                  optionally pre-filtered by SimHash sketches, and record timing, \
                  selectivity and recall.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the `[run]` settings section
#[derive(Args, Debug, Default)]
struct RunArgs {
    #[arg(long, value_enum)]
    metric: Option<MetricKind>,

    #[arg(long, value_enum)]
    encoding: Option<EncodingKind>,

    #[arg(long, value_enum)]
    alignment: Option<Alignment>,

    #[arg(long, value_enum)]
    kernel: Option<KernelVariant>,

    /// Enable the sketch pre-filter
    #[arg(long)]
    filter: bool,

    /// Target recall of the sketch filter, in (0, 1)
    #[arg(long)]
    recall: Option<f32>,

    /// Seed for the sketch hash vectors
    #[arg(long)]
    seed: Option<u64>,

    /// Scan queries in parallel
    #[arg(long)]
    parallel: bool,

    #[arg(long)]
    threads: Option<usize>,

    #[arg(long, value_enum)]
    on_unsupported: Option<UnsupportedPolicy>,
}

impl RunArgs {
    fn apply(&self, run: &mut RunSettings) -> BenchResult<()> {
        if let Some(metric) = self.metric {
            run.metric = metric;
        }
        if let Some(encoding) = self.encoding {
            run.encoding = encoding;
        }
        if let Some(alignment) = self.alignment {
            run.alignment = alignment;
        }
        if let Some(kernel) = self.kernel {
            run.kernel = kernel;
        }
        if let Some(recall) = self.recall {
            run.recall = Recall::new(recall)?;
        }
        if let Some(seed) = self.seed {
            run.seed = seed;
        }
        if let Some(threads) = self.threads {
            run.threads = threads;
        }
        if let Some(policy) = self.on_unsupported {
            run.on_unsupported = policy;
        }
        run.filter |= self.filter;
        run.parallel |= self.parallel;
        Ok(())
    }
}

/// Overrides for the `[dataset]` settings section
#[derive(Args, Debug, Default)]
struct DatasetArgs {
    /// Number of data vectors
    #[arg(long)]
    data_count: Option<usize>,

    /// Number of query vectors
    #[arg(long)]
    query_count: Option<usize>,

    /// Dimensionality of every vector
    #[arg(long)]
    dimension: Option<usize>,

    /// Seed of the synthetic dataset
    #[arg(long)]
    dataset_seed: Option<u64>,
}

impl DatasetArgs {
    fn apply(&self, dataset: &mut DatasetSettings) {
        if let Some(count) = self.data_count {
            dataset.data_count = count;
        }
        if let Some(count) = self.query_count {
            dataset.query_count = count;
        }
        if let Some(dimension) = self.dimension {
            dataset.dimension = dimension;
        }
        if let Some(seed) = self.dataset_seed {
            dataset.seed = seed;
        }
    }
}

/// Where finished runs are recorded
#[derive(Args, Debug, Default)]
struct OutputArgs {
    /// JSON lines file for run records (overrides output.results_path)
    #[arg(long)]
    results: Option<PathBuf>,

    /// Do not record runs to a file
    #[arg(long, conflicts_with = "results")]
    no_record: bool,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Run a single configured benchmark
    #[command(about = "Run one benchmark with the configured metric, storage, kernel and filter")]
    Run {
        #[command(flatten)]
        run: RunArgs,

        #[command(flatten)]
        dataset: DatasetArgs,

        #[command(flatten)]
        output: OutputArgs,

        /// Also run the exact baseline and report recall against it
        #[arg(long)]
        baseline: bool,
    },

    /// Run experiment matrices
    #[command(about = "Run every combination of the configured experiments")]
    Matrix {
        /// Experiments to run (all configured experiments when empty)
        #[arg(num_args = 0..)]
        experiments: Vec<String>,

        #[command(flatten)]
        dataset: DatasetArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show current configuration
    #[command(about = "Display active settings as TOML")]
    Config,

    /// Initialize project
    #[command(about = "Set up .nnbench directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// List kernel variants
    #[command(about = "Show kernel variants and whether this machine supports them")]
    Kernels,
}

fn init_logging(cli: &Cli, settings: &Settings) {
    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        settings.logging.level.parse().unwrap_or(Level::INFO)
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_settings(cli: &Cli) -> BenchResult<Settings> {
    match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
}

fn open_sink(settings: &Settings, output: &OutputArgs) -> BenchResult<Box<dyn ResultSink>> {
    if output.no_record {
        return Ok(Box::new(MemorySink::new()));
    }
    match output.results.as_ref().or(settings.output.results_path.as_ref()) {
        Some(path) => Ok(Box::new(JsonLinesSink::open(path)?)),
        None => Ok(Box::new(MemorySink::new())),
    }
}

fn generate_dataset(settings: &DatasetSettings) -> BenchResult<SyntheticDataset> {
    let dataset = with_spinner("Generating synthetic dataset", || {
        SyntheticDataset::generate(
            settings.data_count,
            settings.query_count,
            settings.dimension,
            settings.noise,
            settings.seed,
        )
    })?;
    Ok(dataset)
}

fn engine_for(settings: &Settings, run: RunSettings) -> BenchmarkEngine {
    BenchmarkEngine::new(run).with_normalization_tolerance(settings.sketch.normalization_tolerance)
}

fn run_single(settings: &Settings, output: &OutputArgs, baseline: bool) -> anyhow::Result<()> {
    let dataset = generate_dataset(&settings.dataset)?;
    let engine = engine_for(settings, settings.run.clone());
    let name = settings.dataset.name.as_str();

    let reports = if baseline {
        let (baseline, report) =
            engine.run_with_baseline(&dataset.data, &dataset.queries, name)?;
        vec![baseline, report]
    } else {
        vec![engine.run(&dataset.data, &dataset.queries, name)?]
    };

    let mut sink = open_sink(settings, output)?;
    for report in &reports {
        sink.record(report).context("Failed to record run")?;
    }

    if settings.output.print_table {
        println!("{}", create_run_table(&reports));
    }
    Ok(())
}

fn run_matrix(settings: &Settings, names: &[String], output: &OutputArgs) -> anyhow::Result<()> {
    let experiments: Vec<&ExperimentSettings> = if names.is_empty() {
        settings.experiments.iter().collect()
    } else {
        names
            .iter()
            .map(|name| settings.experiment(name))
            .collect::<BenchResult<_>>()?
    };

    let runs: Vec<(&str, RunSettings)> = experiments
        .iter()
        .flat_map(|experiment| {
            experiment
                .expand(&settings.run)
                .into_iter()
                .map(move |run| (experiment.name.as_str(), run))
        })
        .collect();
    info!(experiments = experiments.len(), runs = runs.len(), "Expanded experiment matrix");

    let dataset = generate_dataset(&settings.dataset)?;
    let name = settings.dataset.name.as_str();
    let mut sink = open_sink(settings, output)?;
    let mut baselines: HashMap<MetricKind, ScanResult> = HashMap::new();
    let mut reports: Vec<RunReport> = Vec::with_capacity(runs.len());
    let mut skipped = 0usize;

    let pb = create_progress_bar(runs.len() as u64, "Running experiments");
    for (experiment, run) in runs {
        pb.set_message(format!(
            "{experiment}: {}",
            components(run.filter, run.storage_format(), run.kernel)
        ));

        if !baselines.contains_key(&run.metric) {
            let engine = engine_for(settings, run.clone());
            let baseline = engine_for(settings, engine.baseline_settings())
                .run(&dataset.data, &dataset.queries, name)?;
            baselines.insert(run.metric, baseline.result);
        }

        match engine_for(settings, run).run(&dataset.data, &dataset.queries, name) {
            Ok(mut report) => {
                report.recall = baselines
                    .get(&report.metadata.metric)
                    .and_then(|baseline| report.result.recall_against(baseline));
                sink.record(&report)?;
                reports.push(report);
            }
            Err(BenchError::Vector(e @ VectorError::UnsupportedInstructionSet { .. })) => {
                pb.suspend(|| warn!(experiment, "Skipping run: {e}"));
                skipped += 1;
            }
            Err(e) => {
                pb.abandon();
                return Err(e.into());
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    if settings.output.print_table {
        println!("{}", create_run_table(&reports));
    }
    if skipped > 0 {
        eprintln!("Skipped {skipped} run(s) whose kernel variant is not supported on this machine");
    }
    Ok(())
}

fn execute(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Init { force } = &cli.command {
        init_logging(&cli, &Settings::default());
        let path = Settings::init_config_file(".", *force)?;
        println!("Created configuration file at: {}", path.display());
        println!("Edit this file to customize your settings.");
        return Ok(());
    }

    let mut settings = load_settings(&cli).with_context(|| {
        let path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));
        format!("Could not load settings from {}", path.display())
    })?;
    init_logging(&cli, &settings);

    match &cli.command {
        Commands::Run {
            run,
            dataset,
            output,
            baseline,
        } => {
            run.apply(&mut settings.run)?;
            dataset.apply(&mut settings.dataset);
            run_single(&settings, output, *baseline)
        }

        Commands::Matrix {
            experiments,
            dataset,
            output,
        } => {
            dataset.apply(&mut settings.dataset);
            run_matrix(&settings, experiments, output)
        }

        Commands::Config => {
            println!("Current Configuration:");
            println!("{}", "=".repeat(50));
            println!("{}", settings.to_toml()?);
            Ok(())
        }

        Commands::Kernels => {
            println!("{}", create_kernel_table());
            Ok(())
        }

        Commands::Init { .. } => Ok(()),
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(error) = execute(cli) {
        let message = format!("{error:#}");
        let code = match error.downcast_ref::<BenchError>() {
            Some(bench) => {
                eprintln!("{}", bench.render_report(&message));
                ExitCode::from_error(bench)
            }
            None => {
                eprintln!("Error: {message}");
                ExitCode::GeneralError
            }
        };
        std::process::exit(code.into());
    }
}
