//! databounty CLI - configure and run marketplace simulations.
//!
//! Wires a classifier, an incentive mechanism, and an agent roster into the
//! simulator and writes the run artifact when the run completes.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use databounty::{
    Classifier, IncentiveMechanism, MarketConfig, PredictionMarket, Stakeable, Trainer,
    SECONDS_PER_DAY,
};
use databounty_sim::{
    Agent, Dataset, MarketRunOpts, NearestCentroid, Perceptron, SimOpts, Simulator,
};

mod config;

use config::ScenarioConfig;

#[derive(Parser)]
#[command(name = "databounty")]
#[command(about = "Simulate a collaborative machine-learning marketplace", long_about = None)]
#[command(version)]
struct Cli {
    /// RNG seed for the driver
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Scenario file (TOML) overriding the built-in agent roster
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where to write the run artifact
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Classifier to train (perceptron, centroid)
    #[arg(short, long, default_value = "perceptron")]
    model: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the deposit/refund/report mechanism
    Stakeable {
        /// Weight of the time-decayed deposit cost
        #[arg(long, default_value_t = 1)]
        cost_weight: u64,

        /// Seconds a submitter waits before a refund attempt
        #[arg(long, default_value_t = SECONDS_PER_DAY)]
        refund_wait: u64,

        /// Seconds until anyone can take a deposit's remainder
        #[arg(long, default_value_t = 9 * SECONDS_PER_DAY)]
        takeover_wait: u64,
    },

    /// Run the commit-reveal prediction market
    Market {
        /// Bounty funding the market, in reward rounds
        #[arg(long, default_value_t = 100_000.0)]
        bounty: f64,

        /// Address funding the bounty
        #[arg(long, default_value = "initializer")]
        bounty_provider: String,

        /// Number of committed test-set pieces
        #[arg(long, default_value_t = 10)]
        test_pieces: usize,

        /// Minimum market length in seconds
        #[arg(long, default_value_t = 1_000)]
        min_length_s: u64,

        /// Contribution target; defaults to all remaining training data
        #[arg(long)]
        min_contributions: Option<usize>,

        /// Let contributions stake more than the minimum
        #[arg(long)]
        allow_greater_deposit: bool,

        /// Score per contributor instead of per contribution
        #[arg(long)]
        group_contributions: bool,

        /// Reset the model at every reward-loop restart
        #[arg(long)]
        reset_model: bool,

        /// RNG seed for the market's challenge index
        #[arg(long, default_value_t = 1)]
        market_seed: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let scenario = match &cli.config {
        Some(path) => ScenarioConfig::load(path)?,
        None => ScenarioConfig::default_roster(),
    };
    log::debug!(
        "running with seed {} and {} agents",
        cli.seed,
        scenario.agents.len()
    );
    let out = cli.out.clone().unwrap_or_else(default_artifact_path);

    match cli.model.as_str() {
        "perceptron" => run(Perceptron::new(), &cli, scenario, &out),
        "centroid" => run(NearestCentroid::new(), &cli, scenario, &out),
        other => anyhow::bail!("unknown model '{other}', expected perceptron or centroid"),
    }
}

fn run<M: Classifier>(model: M, cli: &Cli, scenario: ScenarioConfig, out: &Path) -> Result<()> {
    let dataset = Dataset::synthetic(
        scenario.run.train_size,
        scenario.run.test_size,
        scenario.run.num_features,
        cli.seed,
    );
    let opts = SimOpts {
        baseline_accuracy: scenario.run.baseline_accuracy,
        init_train_data_portion: scenario.run.init_train_data_portion,
    };

    match &cli.command {
        Commands::Stakeable {
            cost_weight,
            refund_wait,
            takeover_wait,
        } => {
            anyhow::ensure!(
                *takeover_wait > *refund_wait + 7 * SECONDS_PER_DAY,
                "takeover-wait must exceed refund-wait by at least seven days"
            );
            let im = Stakeable::with_params(0, *cost_weight, *refund_wait, *takeover_wait);
            let mut sim = Simulator::new(Trainer::new(model, im), cli.seed);
            let artifact = sim.simulate(&scenario.agents, &dataset, &opts)?;
            artifact.save(out)?;
            print_summary(&sim, &scenario.agents, out);
        }
        Commands::Market {
            bounty,
            bounty_provider,
            test_pieces,
            min_length_s,
            min_contributions,
            allow_greater_deposit,
            group_contributions,
            reset_model,
            market_seed,
        } => {
            let market_config = MarketConfig {
                allow_greater_deposit: *allow_greater_deposit,
                group_contributions: *group_contributions,
                reset_model_during_reward_phase: *reset_model,
                ..MarketConfig::default()
            };
            let market = PredictionMarket::new(market_config, *market_seed);
            let mut sim = Simulator::new(Trainer::new(model, market), cli.seed);
            let init_len =
                (dataset.x_train.len() as f64 * opts.init_train_data_portion) as usize;
            let market_opts = MarketRunOpts {
                bounty_provider: bounty_provider.clone(),
                total_bounty: *bounty,
                num_test_pieces: *test_pieces,
                min_length_s: *min_length_s,
                min_num_contributions: min_contributions
                    .unwrap_or(dataset.x_train.len() - init_len),
            };
            let artifact = sim.simulate_market(&scenario.agents, &dataset, &opts, &market_opts)?;
            artifact.save(out)?;
            print_summary(&sim, &scenario.agents, out);
        }
    }
    Ok(())
}

fn print_summary<M, I: IncentiveMechanism>(
    sim: &Simulator<M, I>,
    agents: &[Agent],
    out: &Path,
) {
    println!("{}", "final balances".bold());
    for agent in agents {
        let balance = sim.trainer.ledger.get(&agent.address).unwrap_or(0.0);
        let line = format!(
            "{:<12} {:>12.2}  (started with {:.2})",
            agent.address, balance, agent.start_balance
        );
        let line = if agent.calls_model {
            line.blue()
        } else if agent.good {
            line.green()
        } else {
            line.red()
        };
        println!("  {line}");
    }
    println!(
        "{} {}",
        "run artifact written to".bold(),
        out.display().to_string().cyan()
    );
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from(format!("saved_runs/{}.json", chrono::Utc::now().timestamp()))
}
