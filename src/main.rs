use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use drl_portfolio::constants::{feed, files, train};
use drl_portfolio::data::load_matrix;
use drl_portfolio::{DrlPortfolio, Feed, Objective, PolicyConfig};

#[derive(Parser)]
#[command(name = "drl_portfolio")]
#[command(about = "Portfolio policy training and evaluation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DataArgs {
    /// CSV of per-timestep features, one row per timestep
    #[arg(short, long)]
    features: PathBuf,

    /// CSV of per-timestep gross asset returns, aligned with the features
    #[arg(short, long)]
    returns: PathBuf,

    /// JSON policy config; feature and asset counts are taken from the data
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = feed::FEE)]
    fee: f64,

    #[arg(short, long, default_value_t = feed::TEMPERATURE)]
    temperature: f64,

    #[arg(long, default_value_t = feed::RISK_FREE)]
    risk_free: f64,
}

#[derive(Subcommand)]
enum Commands {
    Train {
        #[command(flatten)]
        data: DataArgs,

        #[arg(long, value_enum)]
        objective: Option<Objective>,

        #[arg(short, long, default_value_t = train::STEPS)]
        steps: usize,

        #[arg(short, long, default_value_t = feed::KEEP_PROB)]
        keep_prob: f64,

        /// Resume from this checkpoint directory
        #[arg(short, long)]
        weights: Option<PathBuf>,

        #[arg(long, default_value = files::CHECKPOINT_DIR)]
        save: PathBuf,

        #[arg(long)]
        seed: Option<i64>,
    },
    Trade {
        #[command(flatten)]
        data: DataArgs,

        #[arg(short, long, default_value = files::CHECKPOINT_DIR)]
        weights: PathBuf,

        #[arg(short, long, default_value_t = 1.0)]
        keep_prob: f64,
    },
}

fn load_inputs(data: &DataArgs) -> Result<(PolicyConfig, Feed)> {
    let features = load_matrix(&data.features)
        .with_context(|| format!("failed to load features from {:?}", data.features))?;
    let returns = load_matrix(&data.returns)
        .with_context(|| format!("failed to load returns from {:?}", data.returns))?;

    let mut config = match &data.config {
        Some(path) => PolicyConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {path:?}"))?,
        None => PolicyConfig::default(),
    };
    config.feature_number = features.ncols();
    config.asset_number = returns.ncols();

    let feed = Feed::new(&features, &returns)?
        .with_fee(data.fee)
        .with_temperature(data.temperature)
        .with_risk_free(data.risk_free);

    Ok((config, feed))
}

fn run_train(
    data: &DataArgs,
    objective: Option<Objective>,
    steps: usize,
    keep_prob: f64,
    weights: Option<&Path>,
    save: &Path,
    seed: Option<i64>,
) -> Result<()> {
    if let Some(seed) = seed {
        tch::manual_seed(seed);
    }

    let (mut config, feed) = load_inputs(data)?;
    if let Some(objective) = objective {
        config.objective = objective;
    }
    let feed = feed.with_keep_prob(keep_prob);

    let mut model = DrlPortfolio::new(config)?;
    match weights {
        Some(path) => {
            println!("Loading weights from: {}", path.display());
            model.load(path)?;
        }
        None => println!("Starting training from scratch"),
    }

    println!(
        "trajectory: {} steps, objective: {}",
        feed.steps(),
        model.objective()
    );

    for step in 0..steps {
        let stats = model.train(&feed)?;
        if step % train::LOG_EVERY == 0 || step + 1 == steps {
            info!(
                step,
                objective = stats.objective,
                cum_log_reward = stats.cum_log_reward,
                cum_reward = stats.cum_reward,
                "training"
            );
        }
    }

    let file = model.save(save)?;
    println!("Saved model weights: {}", file.display());
    Ok(())
}

fn run_trade(data: &DataArgs, weights: &Path, keep_prob: f64) -> Result<()> {
    let (config, feed) = load_inputs(data)?;
    let feed = feed.with_keep_prob(keep_prob);

    let model = DrlPortfolio::from_checkpoint(config, weights)
        .with_context(|| format!("failed to restore model from {weights:?}"))?;
    let outcome = model.trade(&feed)?;

    println!("cumulative reward:     {:.6}", outcome.cum_reward);
    println!("cumulative log reward: {:.6}", outcome.cum_log_reward);
    println!("mean log reward:       {:.6}", outcome.mean_log_reward);
    println!("sharpe:                {:.6}", outcome.sharpe);
    println!("sortino:               {:.6}", outcome.sortino);

    let latest: Vec<String> = outcome
        .latest_action()
        .iter()
        .map(|w| format!("{w:.4}"))
        .collect();
    println!("latest action: [{}]", latest.join(", "));
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("drl_portfolio=info")),
        )
        .init();

    println!("{}", "Start".green());

    let cli = Cli::parse();
    match &cli.command {
        Commands::Train {
            data,
            objective,
            steps,
            keep_prob,
            weights,
            save,
            seed,
        } => run_train(
            data,
            *objective,
            *steps,
            *keep_prob,
            weights.as_deref(),
            save,
            *seed,
        )?,
        Commands::Trade {
            data,
            weights,
            keep_prob,
        } => run_trade(data, weights, *keep_prob)?,
    }

    println!("{}", "End".green());
    Ok(())
}
