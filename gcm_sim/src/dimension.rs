//! Experiment dimensions and scenario enumeration.
//!
//! A dimension is an ordered list of levels. Each level edits a scenario's
//! cloned plugin data and returns metadata values describing the edit. An
//! experiment runs one scenario per combination of levels.

use crate::error::ReplicationError;
use gcm_env::ScenarioId;
use gcm_nucleus::{Plugin, PluginData};
use std::any::type_name;
use std::sync::Arc;

/// Edits plugin data for one scenario and returns its metadata values.
pub type Level =
    Arc<dyn Fn(&mut DimensionContext<'_>) -> Result<Vec<String>, ReplicationError> + Send + Sync>;

/// Access to one scenario's plugins while its levels apply.
pub struct DimensionContext<'a> {
    plugins: &'a mut [Plugin],
}

impl<'a> DimensionContext<'a> {
    pub(crate) fn new(plugins: &'a mut [Plugin]) -> Self {
        Self { plugins }
    }

    /// First plugin data of type `T` across all plugins.
    pub fn plugin_data_mut<T: PluginData>(&mut self) -> Result<&mut T, ReplicationError> {
        self.plugins
            .iter_mut()
            .find_map(|plugin| plugin.plugin_data_mut::<T>())
            .ok_or(ReplicationError::MissingPluginData(type_name::<T>()))
    }
}

/// An experiment axis.
#[derive(Clone)]
pub struct Dimension {
    name: String,
    metadata_columns: Vec<String>,
    levels: Vec<Level>,
}

impl Dimension {
    pub fn builder(name: impl Into<String>) -> DimensionBuilder {
        DimensionBuilder {
            dimension: Dimension {
                name: name.into(),
                metadata_columns: Vec::new(),
                levels: Vec::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata_columns(&self) -> &[String] {
        &self.metadata_columns
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub(crate) fn apply(
        &self,
        level: usize,
        ctx: &mut DimensionContext<'_>,
    ) -> Result<Vec<String>, ReplicationError> {
        (self.levels[level])(ctx)
    }
}

impl std::fmt::Debug for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dimension")
            .field("name", &self.name)
            .field("metadata_columns", &self.metadata_columns)
            .field("levels", &self.levels.len())
            .finish()
    }
}

pub struct DimensionBuilder {
    dimension: Dimension,
}

impl DimensionBuilder {
    pub fn add_metadata_column(mut self, column: impl Into<String>) -> Self {
        self.dimension.metadata_columns.push(column.into());
        self
    }

    pub fn add_level<F>(mut self, level: F) -> Self
    where
        F: Fn(&mut DimensionContext<'_>) -> Result<Vec<String>, ReplicationError>
            + Send
            + Sync
            + 'static,
    {
        self.dimension.levels.push(Arc::new(level));
        self
    }

    pub fn build(self) -> Dimension {
        self.dimension
    }
}

/// Number of scenarios: the product of level counts, 1 without dimensions.
pub fn scenario_count(dimensions: &[Dimension]) -> usize {
    dimensions.iter().map(Dimension::level_count).product()
}

/// Level index per dimension for a scenario, first dimension varying fastest.
pub fn level_indices(dimensions: &[Dimension], scenario: ScenarioId) -> Vec<usize> {
    let mut remainder = scenario.0;
    dimensions
        .iter()
        .map(|dimension| {
            let count = dimension.level_count().max(1);
            let index = remainder % count;
            remainder /= count;
            index
        })
        .collect()
}
