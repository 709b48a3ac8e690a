//! correlator-qa CLI

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use correlator_qa::prelude::*;
use serde::de::DeserializeOwned;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "correlator-qa")]
#[command(about = "QA jobs for the energy-energy correlator analysis")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the momentum-dependent DCA width and apply the n-sigma cut
    SigmaDca {
        /// JSON configuration; unset keys keep their defaults
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Input file holding the track QA tuple
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Name of the tuple to read
        #[arg(long)]
        tuple: Option<String>,

        /// Output file for histograms and fitted curves
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory for PNG summaries
        #[arg(long)]
        plots: Option<PathBuf>,

        /// Number of widths kept around zero
        #[arg(long)]
        n_cut: Option<f64>,
    },

    /// Histogram jets and lambdas from a lambda-jet tree
    LambdaJets {
        /// JSON configuration; unset keys keep their defaults
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        input: Option<PathBuf>,

        #[arg(long)]
        tree: Option<String>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replay JSON-lines events through the QA plugins
    Run {
        /// JSON job configuration; unset keys keep their defaults
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// One JSON event per line
        #[arg(short, long)]
        events: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print every default configuration as JSON
    Defaults,
}

fn load_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(path) => {
            load_json(path).with_context(|| format!("failed to load config {}", path.display()))
        }
        None => Ok(T::default()),
    }
}

fn cmd_sigma_dca(
    config: Option<&Path>,
    input: Option<PathBuf>,
    tuple: Option<String>,
    output: Option<PathBuf>,
    plots: Option<PathBuf>,
    n_cut: Option<f64>,
) -> Result<()> {
    let mut config: SigmaDcaConfig = load_or_default(config)?;
    if let Some(input) = input {
        config.input = input;
    }
    if let Some(tuple) = tuple {
        config.tuple = tuple;
    }
    if let Some(output) = output {
        config.output = output;
    }
    if plots.is_some() {
        config.plot_dir = plots;
    }
    if let Some(n_cut) = n_cut {
        config.n_cut = n_cut;
    }
    run_sigma_dca(&config)
        .with_context(|| format!("sigma-dca calculation on {} failed", config.input.display()))
}

fn cmd_lambda_jets(
    config: Option<&Path>,
    input: Option<PathBuf>,
    tree: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut config: LambdaJetConfig = load_or_default(config)?;
    if let Some(input) = input {
        config.input = input;
    }
    if let Some(tree) = tree {
        config.tree = tree;
    }
    if let Some(output) = output {
        config.output = output;
    }
    let input = config.input.clone();
    run_lambda_jets(config)
        .with_context(|| format!("reading lambda jets from {} failed", input.display()))?;
    Ok(())
}

fn cmd_run(config: Option<&Path>, events: &Path, output: &Path) -> Result<()> {
    let job: JobConfig = load_or_default(config)?;
    let mut maker = CorrelatorQaMaker::new(&job.out_file);
    maker.set_global_debug(job.debug);
    maker.set_global_verbosity(job.verbosity);
    maker.set_global_out_file(output);
    if let Some(config) = job.track_pairs {
        maker.init_plugin(config, "TrackPairs")?;
    }
    if let Some(config) = job.cst_pairs {
        maker.init_plugin(config, "CstPairs")?;
    }
    if let Some(config) = job.track_qa {
        maker.init_plugin(config, TrackQaTuple::DEFAULT_NAME)?;
    }
    if let Some(config) = job.clust_qa {
        maker.init_plugin(config, ClustQaTree::DEFAULT_NAME)?;
    }
    maker.init()?;

    let file = File::open(events).with_context(|| format!("failed to open {}", events.display()))?;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read event {index}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: Event =
            serde_json::from_str(&line).with_context(|| format!("failed to parse event {index}"))?;
        maker.process_event(&event)?;
    }
    maker.end()?;
    info!("wrote {}", output.display());
    Ok(())
}

fn cmd_defaults() -> Result<()> {
    let defaults = serde_json::json!({
        "run": JobConfig::default(),
        "sigma_dca": SigmaDcaConfig::default(),
        "lambda_jets": LambdaJetConfig::default(),
    });
    println!("{}", serde_json::to_string_pretty(&defaults)?);
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(cli.log_level).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::SigmaDca {
            config,
            input,
            tuple,
            output,
            plots,
            n_cut,
        } => cmd_sigma_dca(config.as_deref(), input, tuple, output, plots, n_cut),
        Commands::LambdaJets {
            config,
            input,
            tree,
            output,
        } => cmd_lambda_jets(config.as_deref(), input, tree, output),
        Commands::Run {
            config,
            events,
            output,
        } => cmd_run(config.as_deref(), &events, &output),
        Commands::Defaults => cmd_defaults(),
    };
    if let Err(err) = result {
        error!("{err:#}");
        std::process::exit(1);
    }
}
