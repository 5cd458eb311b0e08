//! GCM experiment driver
//!
//! Runs one simulation per scenario of an experiment. An experiment is a set
//! of plugins plus dimensions; each dimension contributes levels that edit a
//! scenario's copy of the plugin data. Replications are independent: each has
//! its own engine, seed and output stream, and one failing never disturbs the
//! rest unless the experiment is configured to halt on the first failure.
//!
//! # Usage
//!
//! ```ignore
//! use gcm_sim::demo::{arrival_interval_dimension, census_plugin, population_plugin, CensusReport};
//! use gcm_sim::Experiment;
//!
//! let report = Experiment::builder()
//!     .add_plugin(population_plugin(Default::default()))
//!     .add_plugin(census_plugin())
//!     .add_dimension(arrival_interval_dimension(&[0.5, 1.0, 2.0]))
//!     .thread_count(4)
//!     .add_output_consumer(|output| {
//!         if let Some(census) = output.downcast_ref::<CensusReport>() {
//!             println!("{} {:?}", output.scenario_id, census);
//!         }
//!     })
//!     .build()?
//!     .execute()?;
//! assert!(report.all_succeeded());
//! ```

mod config;
mod dimension;
mod error;
mod experiment;
mod report;
pub mod demo;

pub use config::ExperimentConfig;
pub use dimension::{level_indices, scenario_count, Dimension, DimensionBuilder, DimensionContext, Level};
pub use error::{ExperimentError, ReplicationError};
pub use experiment::{Experiment, ExperimentBuilder, ScenarioOutput};
pub use report::{ExperimentReport, ReplicationReport, ReplicationStatus};
