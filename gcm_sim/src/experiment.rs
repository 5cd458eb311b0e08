//! Experiment runner - executes one replication per scenario.
//!
//! Scenarios are the combinations of dimension levels. Worker threads claim
//! scenario ids from a shared counter, build a private simulation for each
//! and report back over a channel. The calling thread is the only one that
//! touches output consumers, so consumers need not be thread safe.

use crate::config::ExperimentConfig;
use crate::dimension::{level_indices, scenario_count, Dimension, DimensionContext};
use crate::error::{ExperimentError, ReplicationError};
use crate::report::{ExperimentReport, ReplicationReport, ReplicationStatus};
use crossbeam::channel::{self, Sender};
use gcm_env::{OutputItem, OutputSink, ScenarioId, SeedSource};
use gcm_nucleus::{Plugin, Simulation, SimulationConfig, SimulationOutcome};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A value released by a replication, tagged with where it came from.
pub struct ScenarioOutput {
    pub scenario_id: ScenarioId,

    /// Metadata values of the scenario's levels
    pub metadata: Arc<Vec<String>>,

    pub item: OutputItem,
}

impl ScenarioOutput {
    /// The released value, if it has type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.item.downcast_ref::<T>()
    }
}

type OutputConsumer = Box<dyn FnMut(&ScenarioOutput)>;

enum WorkerMessage {
    Started {
        scenario_id: ScenarioId,
        metadata: Vec<String>,
    },
    Output {
        scenario_id: ScenarioId,
        item: OutputItem,
    },
    Finished {
        report: ReplicationReport,
        error: Option<ReplicationError>,
    },
}

/// Forwards a replication's output to the experiment thread.
struct ChannelSink {
    scenario_id: ScenarioId,
    tx: Sender<WorkerMessage>,
}

impl OutputSink for ChannelSink {
    fn release(&self, item: OutputItem) {
        // Receiver only goes away once every worker has finished
        let _ = self.tx.send(WorkerMessage::Output {
            scenario_id: self.scenario_id,
            item,
        });
    }
}

/// A set of plugins run across every combination of dimension levels.
pub struct Experiment {
    plugins: Vec<Plugin>,
    dimensions: Vec<Dimension>,
    config: ExperimentConfig,
    consumers: Vec<OutputConsumer>,
}

impl Experiment {
    pub fn builder() -> ExperimentBuilder {
        ExperimentBuilder {
            plugins: Vec::new(),
            dimensions: Vec::new(),
            config: ExperimentConfig::default(),
            consumers: Vec::new(),
        }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn scenario_count(&self) -> usize {
        scenario_count(&self.dimensions)
    }

    /// Runs every scenario.
    ///
    /// Failed replications are recorded in the report. With
    /// `halt_on_exception` the first failure stops further scenarios and is
    /// returned as [`ExperimentError::ReplicationFailed`].
    pub fn execute(&mut self) -> Result<ExperimentReport, ExperimentError> {
        let total = self.scenario_count();
        let threads = self.config.thread_count.clamp(1, total.max(1));
        let seeds = SeedSource::new(self.config.base_seed);
        info!(
            "Starting experiment: {} scenarios on {} threads (base seed={})",
            total, threads, self.config.base_seed
        );

        let plugins = &self.plugins;
        let dimensions = &self.dimensions;
        let config = &self.config;
        let consumers = &mut self.consumers;

        let next_scenario = AtomicUsize::new(0);
        let stop = AtomicBool::new(false);
        let (tx, rx) = channel::unbounded::<WorkerMessage>();

        let collected = crossbeam::thread::scope(|scope| {
            for worker in 0..threads {
                let tx = tx.clone();
                let next_scenario = &next_scenario;
                let stop = &stop;
                let seeds = &seeds;
                scope.spawn(move |_| {
                    debug!("Worker {} started", worker);
                    while !stop.load(Ordering::SeqCst) {
                        let index = next_scenario.fetch_add(1, Ordering::SeqCst);
                        if index >= total {
                            break;
                        }
                        let scenario_id = ScenarioId(index);
                        let (report, error) =
                            run_guarded(plugins, dimensions, config, seeds, scenario_id, &tx);
                        if error.is_some() && config.halt_on_exception {
                            stop.store(true, Ordering::SeqCst);
                        }
                        if tx.send(WorkerMessage::Finished { report, error }).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            let mut metadata: HashMap<ScenarioId, Arc<Vec<String>>> = HashMap::new();
            let mut reports = Vec::new();
            let mut first_failure: Option<(ScenarioId, ReplicationError)> = None;
            for message in rx.iter() {
                match message {
                    WorkerMessage::Started {
                        scenario_id,
                        metadata: values,
                    } => {
                        metadata.insert(scenario_id, Arc::new(values));
                    }
                    WorkerMessage::Output { scenario_id, item } => {
                        let output = ScenarioOutput {
                            scenario_id,
                            metadata: metadata.get(&scenario_id).cloned().unwrap_or_default(),
                            item,
                        };
                        for consumer in consumers.iter_mut() {
                            consumer(&output);
                        }
                    }
                    WorkerMessage::Finished { report, error } => {
                        log_replication(&report);
                        if let Some(error) = error {
                            let keep_first = match &first_failure {
                                Some((id, _)) => *id < report.scenario_id,
                                None => false,
                            };
                            if !keep_first {
                                first_failure = Some((report.scenario_id, error));
                            }
                        }
                        reports.push(report);
                    }
                }
            }
            (reports, first_failure)
        });

        let (mut reports, first_failure) = collected.map_err(|_| ExperimentError::WorkerPanicked)?;
        reports.sort_by_key(|r| r.scenario_id);

        if config.halt_on_exception {
            if let Some((scenario_id, source)) = first_failure {
                let metadata = reports
                    .iter()
                    .find(|r| r.scenario_id == scenario_id)
                    .map(|r| r.metadata.clone())
                    .unwrap_or_default();
                error!("Experiment halted: scenario {} failed", scenario_id);
                return Err(ExperimentError::ReplicationFailed {
                    scenario_id,
                    metadata,
                    source,
                });
            }
        }

        let report = ExperimentReport {
            base_seed: config.base_seed,
            scenario_count: total,
            metadata_columns: dimensions
                .iter()
                .flat_map(|d| d.metadata_columns().iter().cloned())
                .collect(),
            replications: reports,
        };
        info!(
            "Experiment finished: {}/{} replications succeeded",
            report.succeeded_count(),
            total
        );
        Ok(report)
    }
}

fn log_replication(report: &ReplicationReport) {
    match &report.status {
        ReplicationStatus::Succeeded {
            final_time,
            plans_executed,
            ..
        } => info!(
            "✓ {} (seed={}) finished at t={} after {} plans",
            report.scenario_id, report.seed, final_time, plans_executed
        ),
        ReplicationStatus::Failed { reason } => warn!(
            "✗ {} (seed={}) [{}] FAILED: {}",
            report.scenario_id,
            report.seed,
            report.metadata.join(", "),
            reason
        ),
    }
}

/// Runs one replication, turning a panic into a failure.
fn run_guarded(
    plugins: &[Plugin],
    dimensions: &[Dimension],
    config: &ExperimentConfig,
    seeds: &SeedSource,
    scenario_id: ScenarioId,
    tx: &Sender<WorkerMessage>,
) -> (ReplicationReport, Option<ReplicationError>) {
    let seed = seeds.replication_seed(scenario_id);
    let mut metadata = Vec::new();

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        run_replication(plugins, dimensions, config, seed, scenario_id, tx, &mut metadata)
    }))
    .unwrap_or_else(|payload| Err(ReplicationError::Panicked(panic_message(payload.as_ref()))));

    let (status, continuity, error) = match result {
        Ok(outcome) => (
            ReplicationStatus::Succeeded {
                final_time: outcome.final_time,
                plans_executed: outcome.plans_executed,
                halted: outcome.halted,
            },
            outcome.continuity,
            None,
        ),
        Err(error) => (
            ReplicationStatus::Failed {
                reason: error.to_string(),
            },
            None,
            Some(error),
        ),
    };

    let report = ReplicationReport {
        scenario_id,
        seed,
        metadata,
        status,
        continuity,
    };
    (report, error)
}

fn run_replication(
    plugins: &[Plugin],
    dimensions: &[Dimension],
    config: &ExperimentConfig,
    seed: u64,
    scenario_id: ScenarioId,
    tx: &Sender<WorkerMessage>,
    metadata: &mut Vec<String>,
) -> Result<SimulationOutcome, ReplicationError> {
    let mut scenario_plugins = plugins.to_vec();
    {
        let mut ctx = DimensionContext::new(&mut scenario_plugins);
        for (dimension, level) in dimensions.iter().zip(level_indices(dimensions, scenario_id)) {
            metadata.extend(dimension.apply(level, &mut ctx)?);
        }
    }
    let _ = tx.send(WorkerMessage::Started {
        scenario_id,
        metadata: metadata.clone(),
    });

    debug!("Running {} (seed={})", scenario_id, seed);
    let outcome = Simulation::builder()
        .add_plugins(scenario_plugins)
        .config(SimulationConfig {
            seed,
            start_time: 0.0,
            halt_time: config.halt_time,
            record_continuity: config.record_continuity,
        })
        .output_sink(Arc::new(ChannelSink {
            scenario_id,
            tx: tx.clone(),
        }))
        .build()?
        .run()?;
    Ok(outcome)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Builder for [`Experiment`].
pub struct ExperimentBuilder {
    plugins: Vec<Plugin>,
    dimensions: Vec<Dimension>,
    config: ExperimentConfig,
    consumers: Vec<OutputConsumer>,
}

impl ExperimentBuilder {
    pub fn add_plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn add_dimension(mut self, dimension: Dimension) -> Self {
        self.dimensions.push(dimension);
        self
    }

    pub fn config(mut self, config: ExperimentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn thread_count(mut self, threads: usize) -> Self {
        self.config.thread_count = threads;
        self
    }

    pub fn base_seed(mut self, seed: u64) -> Self {
        self.config.base_seed = seed;
        self
    }

    pub fn halt_on_exception(mut self, halt: bool) -> Self {
        self.config.halt_on_exception = halt;
        self
    }

    /// Registers a consumer for every value released by any replication.
    pub fn add_output_consumer<F>(mut self, consumer: F) -> Self
    where
        F: FnMut(&ScenarioOutput) + 'static,
    {
        self.consumers.push(Box::new(consumer));
        self
    }

    pub fn build(self) -> Result<Experiment, ExperimentError> {
        self.config.validate()?;
        if let Some(empty) = self.dimensions.iter().find(|d| d.level_count() == 0) {
            return Err(ExperimentError::InvalidConfig(format!(
                "dimension {} has no levels",
                empty.name()
            )));
        }
        gcm_nucleus::resolve_plugins(&self.plugins)?;

        Ok(Experiment {
            plugins: self.plugins,
            dimensions: self.dimensions,
            config: self.config,
            consumers: self.consumers,
        })
    }
}
