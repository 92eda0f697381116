use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use normatile_core::config::{
    config_path, data_dir, initialize_data_dir, resolve_relative_to, AppConfig, TilingConfig,
};
use normatile_core::dataset::DatasetLayout;
use normatile_core::logging::{
    self, FileSinkPlan, LoggingInitOptions, DEFAULT_LOG_FILTER,
};
use normatile_core::onnx::{InferenceBackend, OnnxPredictor};
use normatile_core::pipeline::{BuildRequest, NormalMapBuilder};

#[derive(Parser)]
#[command(name = "normatile", about = "RGB → normal map tiling and stitching pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        global = true,
        help = "Increase log verbosity (-v: debug, -vv: trace)"
    )]
    verbose: u8,

    #[arg(
        long = "log-filter",
        value_name = "FILTER",
        global = true,
        help = "Explicit tracing filter (overrides RUST_LOG and -v)"
    )]
    log_filter: Option<String>,

    #[arg(long, global = true, help = "Data directory (config, logs)")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Tile the raw RGB/normal image pairs into the training set.
    Prepare(PrepareArgs),
    /// Move a fraction of the training tiles into the testing set.
    Split(SplitArgs),
    /// Generate a full normal map for a random source image.
    Generate(GenerateArgs),
}

#[derive(Args)]
struct PrepareArgs {
    #[arg(long, help = "Override the configured window size")]
    window_size: Option<usize>,
    #[arg(long, help = "Override the configured window step")]
    step: Option<usize>,
    #[arg(long, help = "Keep previously exported tiles instead of erasing them")]
    keep_existing: bool,
}

#[derive(Args)]
struct SplitArgs {
    #[arg(long, help = "Override the configured testing fraction")]
    fraction: Option<f64>,
}

#[derive(Args)]
struct GenerateArgs {
    #[arg(long, help = "Override the configured ONNX model path")]
    model: Option<PathBuf>,
    #[arg(long, help = "Inference backend: cpu (default) or cuda")]
    backend: Option<String>,
    #[arg(long, help = "Override the configured window size")]
    window_size: Option<usize>,
    #[arg(long, help = "Override the configured shift")]
    shift: Option<usize>,
    #[arg(long, help = "Seed the source-image selection for reproducible runs")]
    seed: Option<u64>,
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    let resolved_data_dir = data_dir(cli.data_dir.as_deref());

    init_logging(
        Some(resolved_data_dir.as_path()),
        cli.verbose,
        cli.log_filter.as_deref(),
    );

    if let Err(e) = initialize_data_dir(&resolved_data_dir) {
        warn!(error = %e, "Failed to initialize data directory");
    }

    let cfg_path = config_path(&resolved_data_dir);
    let config = match AppConfig::load_from_path(&cfg_path) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load config file, using defaults");
            AppConfig::default()
        }
    };

    info!(
        pid = std::process::id(),
        data_dir = %resolved_data_dir.display(),
        config_path = %cfg_path.display(),
        "Runtime startup metadata"
    );

    match cli.command {
        Commands::Prepare(args) => run_prepare(&config, &resolved_data_dir, args),
        Commands::Split(args) => run_split(&config, &resolved_data_dir, args),
        Commands::Generate(args) => run_generate(&config, &resolved_data_dir, args),
    }
}

fn init_logging(data_dir: Option<&Path>, verbose: u8, cli_log_filter: Option<&str>) {
    let options = LoggingInitOptions {
        data_dir: data_dir.map(Path::to_path_buf),
        verbose,
        cli_log_filter: cli_log_filter.map(ToString::to_string),
        rust_log_env: std::env::var("RUST_LOG").ok(),
        ..Default::default()
    };

    let filter = logging::select_log_filter(&options);
    let env_filter = parse_env_filter_with_fallback(&filter);

    match logging::build_file_sink_plan(&options) {
        FileSinkPlan::Ready(ready) => {
            let file_filter = parse_env_filter_with_fallback(&filter);
            let subscriber = tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_filter(env_filter),
                )
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(ready.appender)
                        .with_filter(file_filter),
                );

            if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!(
                    "Failed to initialize tracing subscriber: {error}. Continuing without structured tracing."
                );
            }
        }
        FileSinkPlan::Fallback(fallback) => {
            let subscriber = tracing_subscriber::registry().with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_filter(env_filter),
            );

            if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!(
                    "Failed to initialize tracing subscriber: {error}. Continuing without structured tracing."
                );
                return;
            }

            warn!(
                reason = %fallback.reason,
                "Persistent file logging unavailable; continuing with console-only logging"
            );
        }
    }
}

fn parse_env_filter_with_fallback(filter: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_new(filter).unwrap_or_else(|error| {
        eprintln!(
            "Invalid log filter '{filter}': {error}. Falling back to '{DEFAULT_LOG_FILTER}'."
        );
        tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)
    })
}

fn layout_from_config(config: &AppConfig, data_dir: &Path) -> DatasetLayout {
    DatasetLayout::new(
        resolve_relative_to(data_dir, &config.paths.rgb_dir),
        resolve_relative_to(data_dir, &config.paths.normal_dir),
        resolve_relative_to(data_dir, &config.paths.dataset_dir),
    )
}

fn effective_tiling(config: &AppConfig, window_size: Option<usize>, shift: Option<usize>) -> Result<TilingConfig> {
    let mut tiling = config.tiling.clone();
    if let Some(w) = window_size {
        tiling.window_size = w;
    }
    if let Some(s) = shift {
        tiling.shift = s;
    }
    tiling.validate().context("invalid tiling parameters")?;
    Ok(tiling)
}

fn run_prepare(config: &AppConfig, data_dir: &Path, args: PrepareArgs) -> Result<()> {
    let tiling = effective_tiling(config, args.window_size, args.step)?;
    let layout = layout_from_config(config, data_dir);

    layout
        .process_images(tiling.window_size, tiling.shift, !args.keep_existing)
        .context("dataset preparation failed")?;
    Ok(())
}

fn run_split(config: &AppConfig, data_dir: &Path, args: SplitArgs) -> Result<()> {
    let fraction = args.fraction.unwrap_or(config.dataset.testing_fraction);
    if !(0.0..=1.0).contains(&fraction) {
        anyhow::bail!("testing fraction {fraction} must be within 0.0..=1.0");
    }

    let layout = layout_from_config(config, data_dir);
    let moved = layout
        .create_testing_set(fraction)
        .context("testing split failed")?;
    info!(moved, "split complete");
    Ok(())
}

fn run_generate(config: &AppConfig, data_dir: &Path, args: GenerateArgs) -> Result<()> {
    let tiling = effective_tiling(config, args.window_size, args.shift)?;
    let layout = layout_from_config(config, data_dir);

    let model_path = args
        .model
        .unwrap_or_else(|| config.paths.model_path.clone());
    let model_path = resolve_relative_to(data_dir, &model_path);
    let backend = args
        .backend
        .as_deref()
        .map(InferenceBackend::from_str_lossy)
        .unwrap_or_default();

    info!(model = %model_path.display(), %backend, "loading predictor");
    let mut predictor = OnnxPredictor::load(&model_path, backend)
        .with_context(|| format!("failed to load model {}", model_path.display()))?;

    let request = BuildRequest {
        rgb_dir: layout.rgb_dir.clone(),
        normal_dir: layout.normal_dir.clone(),
        work_dir: layout.result_dir(tiling.window_size),
        window_size: tiling.window_size,
        shift: tiling.shift,
        max_dimension: tiling.max_dimension,
    };

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut builder = NormalMapBuilder::new(request, &mut predictor);
    let built = builder.generate(&mut rng).context("generation failed")?;
    info!(path = %built.display(), "wrote generated normal map");
    Ok(())
}
