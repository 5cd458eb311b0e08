//! GCM experiment CLI
//!
//! Runs the demonstration population model across a range of arrival
//! intervals.

use clap::Parser;
use gcm_sim::demo::{
    arrival_interval_dimension, census_plugin, population_plugin, CensusReport, PopulationPluginData,
};
use gcm_sim::{Experiment, ExperimentConfig, ExperimentError, ExperimentReport};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// GCM discrete-event simulation experiment runner
#[derive(Parser, Debug)]
#[command(name = "gcm-sim")]
#[command(about = "Run replicated GCM simulation experiments", long_about = None)]
struct Args {
    /// Experiment configuration file (JSON); flags override its values
    #[arg(short, long)]
    config: Option<String>,

    /// Base seed for every scenario
    #[arg(short, long)]
    seed: Option<u64>,

    /// Worker threads
    #[arg(short, long)]
    threads: Option<usize>,

    /// Stop on the first failed replication
    #[arg(long)]
    halt_on_exception: bool,

    /// Simulation time at which every replication halts
    #[arg(long)]
    halt_time: Option<f64>,

    /// Capture a continuity record per replication
    #[arg(long)]
    record_continuity: bool,

    /// Initial population size
    #[arg(long, default_value = "100")]
    initial_population: u64,

    /// Arrival intervals, one scenario each
    #[arg(long, value_delimiter = ',', default_value = "0.5,1,2")]
    intervals: Vec<f64>,

    /// Chance a resident leaves at each arrival
    #[arg(long, default_value = "0.3")]
    departure_probability: f64,

    /// Last arrival time
    #[arg(long, default_value = "50")]
    horizon: f64,

    /// Write the full experiment report to a JSON file
    #[arg(long)]
    report: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

impl Args {
    fn experiment_config(&self) -> Result<ExperimentConfig, ExperimentError> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::from_json_file(path)?,
            None => ExperimentConfig::default(),
        };
        if let Some(seed) = self.seed {
            config.base_seed = seed;
        }
        if let Some(threads) = self.threads {
            config.thread_count = threads;
        }
        if self.halt_on_exception {
            config.halt_on_exception = true;
        }
        if self.halt_time.is_some() {
            config.halt_time = self.halt_time;
        }
        if self.record_continuity {
            config.record_continuity = true;
        }
        config.validate()?;
        Ok(config)
    }
}

type Censuses = Rc<RefCell<BTreeMap<usize, CensusReport>>>;

fn run(args: &Args) -> Result<(ExperimentReport, Censuses), ExperimentError> {
    let config = args.experiment_config()?;
    let data = PopulationPluginData {
        initial_population: args.initial_population,
        arrival_interval: args.intervals.first().copied().unwrap_or(1.0),
        departure_probability: args.departure_probability,
        horizon: args.horizon,
    };

    let censuses: Censuses = Rc::new(RefCell::new(BTreeMap::new()));
    let sink = censuses.clone();
    let report = Experiment::builder()
        .add_plugin(population_plugin(data))
        .add_plugin(census_plugin())
        .add_dimension(arrival_interval_dimension(&args.intervals))
        .config(config)
        .add_output_consumer(move |output| {
            if let Some(census) = output.downcast_ref::<CensusReport>() {
                sink.borrow_mut().insert(output.scenario_id.0, census.clone());
            }
        })
        .build()?
        .execute()?;
    Ok((report, censuses))
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    } else {
        let level = if args.verbose { Level::DEBUG } else { Level::INFO };
        let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }

    if !args.json {
        info!("GCM experiment runner v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let (report, censuses) = match run(&args) {
        Ok(result) => result,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Some(path) = &args.report {
        match report.write_to_file(path) {
            Ok(()) => info!("Wrote experiment report to {}", path),
            Err(e) => error!("Failed to write report: {:?}", e),
        }
    }

    let censuses = censuses.borrow();
    if args.json {
        let summary = serde_json::json!({
            "base_seed": report.base_seed,
            "total": report.scenario_count,
            "succeeded": report.succeeded_count(),
            "failed": report.failed_count(),
            "results": report.replications.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario_id.0,
                    "seed": r.seed,
                    "metadata": r.metadata,
                    "succeeded": r.succeeded(),
                    "failure_reason": r.failure_reason(),
                    "census": censuses.get(&r.scenario_id.0),
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to encode summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        for replication in &report.replications {
            if let Some(census) = censuses.get(&replication.scenario_id.0) {
                info!(
                    "  interval={} | population {} -> {} (+{} / -{})",
                    replication.metadata.join(", "),
                    census.initial_population,
                    census.final_population,
                    census.additions,
                    census.removals
                );
            }
        }
        if report.all_succeeded() {
            info!("✅ All {} replications succeeded!", report.scenario_count);
        } else {
            error!(
                "❌ {}/{} replications failed!",
                report.failed_count(),
                report.scenario_count
            );
        }
    }

    if !report.all_succeeded() {
        std::process::exit(1);
    }
}
