//! Plugins and dependency resolution.
//!
//! A plugin bundles configuration data with an initializer that registers data
//! managers, actors and plan converters. Plugins declare the plugins they
//! depend on; initializers run in dependency order so a plugin can rely on its
//! dependencies' data managers being registered.

use crate::context::SimulationContext;
use crate::data_manager::{DataManager, DataManagerHandle};
use gcm_env::{ActorId, NucleusError, PluginId};
use std::any::{type_name, Any};
use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

/// Immutable configuration carried by a plugin.
///
/// Implemented for every `Clone + Send + Sync + Debug` type. Experiments clone
/// plugin data per scenario before applying dimension levels.
pub trait PluginData: Any + Send + Sync + Debug {
    fn clone_data(&self) -> Box<dyn PluginData>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any + Clone + Send + Sync + Debug> PluginData for T {
    fn clone_data(&self) -> Box<dyn PluginData> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Plugin initializer. Shared across experiment worker threads.
pub type PluginInitializer =
    Arc<dyn Fn(&mut PluginContext<'_>) -> Result<(), NucleusError> + Send + Sync>;

/// A deployable unit of data managers, actors and their configuration.
pub struct Plugin {
    id: PluginId,
    dependencies: Vec<PluginId>,
    data: Vec<Box<dyn PluginData>>,
    initializer: Option<PluginInitializer>,
}

impl Plugin {
    pub fn builder(id: PluginId) -> PluginBuilder {
        PluginBuilder {
            id,
            dependencies: Vec::new(),
            data: Vec::new(),
            initializer: None,
        }
    }

    pub fn id(&self) -> PluginId {
        self.id
    }

    pub fn dependencies(&self) -> &[PluginId] {
        &self.dependencies
    }

    /// First plugin data of type `T`.
    pub fn plugin_data<T: PluginData>(&self) -> Option<&T> {
        self.data
            .iter()
            .find_map(|data| data.as_ref().as_any().downcast_ref::<T>())
    }

    /// Mutable access for dimension levels working on a cloned plugin.
    pub fn plugin_data_mut<T: PluginData>(&mut self) -> Option<&mut T> {
        self.data
            .iter_mut()
            .find_map(|data| data.as_mut().as_any_mut().downcast_mut::<T>())
    }

    pub(crate) fn initializer(&self) -> Option<PluginInitializer> {
        self.initializer.clone()
    }
}

impl Clone for Plugin {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            dependencies: self.dependencies.clone(),
            data: self.data.iter().map(|data| data.as_ref().clone_data()).collect(),
            initializer: self.initializer.clone(),
        }
    }
}

impl Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .field("data", &self.data)
            .finish()
    }
}

/// Builder for [`Plugin`].
///
/// `build` consumes the builder, so a builder cannot be reused.
pub struct PluginBuilder {
    id: PluginId,
    dependencies: Vec<PluginId>,
    data: Vec<Box<dyn PluginData>>,
    initializer: Option<PluginInitializer>,
}

impl PluginBuilder {
    pub fn add_dependency(mut self, dependency: PluginId) -> Self {
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    pub fn add_plugin_data<T: PluginData>(mut self, data: T) -> Self {
        self.data.push(Box::new(data));
        self
    }

    pub fn initializer<F>(mut self, initializer: F) -> Self
    where
        F: Fn(&mut PluginContext<'_>) -> Result<(), NucleusError> + Send + Sync + 'static,
    {
        self.initializer = Some(Arc::new(initializer));
        self
    }

    pub fn build(self) -> Plugin {
        Plugin {
            id: self.id,
            dependencies: self.dependencies,
            data: self.data,
            initializer: self.initializer,
        }
    }
}

/// What a plugin initializer can see and do.
pub struct PluginContext<'a> {
    plugin: &'a Plugin,
    ctx: &'a mut SimulationContext,
}

impl<'a> PluginContext<'a> {
    pub(crate) fn new(plugin: &'a Plugin, ctx: &'a mut SimulationContext) -> Self {
        Self { plugin, ctx }
    }

    pub fn plugin_id(&self) -> PluginId {
        self.plugin.id
    }

    /// The plugin's data of type `T`.
    pub fn plugin_data<T: PluginData>(&self) -> Result<&'a T, NucleusError> {
        let plugin: &'a Plugin = self.plugin;
        plugin
            .plugin_data::<T>()
            .ok_or(NucleusError::MissingPluginData {
                plugin: plugin.id,
                data: type_name::<T>(),
            })
    }

    /// Registers a data manager and returns the capability to enter its focus.
    pub fn add_data_manager<T: DataManager>(
        &mut self,
        manager: T,
    ) -> Result<DataManagerHandle<T>, NucleusError> {
        self.ctx.register_data_manager(manager)
    }

    pub fn add_actor<F>(&mut self, name: impl Into<String>, init: F) -> Result<ActorId, NucleusError>
    where
        F: FnOnce(&mut SimulationContext) -> Result<(), NucleusError> + 'static,
    {
        self.ctx.add_actor(name, init)
    }

    /// The simulation context, for plan converters, labelers and close
    /// subscribers.
    pub fn context(&mut self) -> &mut SimulationContext {
        self.ctx
    }
}

/// Orders plugins so that every plugin follows its dependencies.
///
/// Among plugins whose dependencies are satisfied, the one registered first
/// goes first. Returns indices into `plugins`.
pub fn resolve_plugins(plugins: &[Plugin]) -> Result<Vec<usize>, NucleusError> {
    let mut index_of: HashMap<PluginId, usize> = HashMap::new();
    for (index, plugin) in plugins.iter().enumerate() {
        if index_of.insert(plugin.id, index).is_some() {
            return Err(NucleusError::DuplicatePlugin(plugin.id));
        }
    }

    let mut in_degree = vec![0usize; plugins.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); plugins.len()];
    for (index, plugin) in plugins.iter().enumerate() {
        for dependency in &plugin.dependencies {
            let Some(&dep) = index_of.get(dependency) else {
                return Err(NucleusError::UnknownPluginDependency {
                    plugin: plugin.id,
                    dependency: *dependency,
                });
            };
            in_degree[index] += 1;
            dependents[dep].push(index);
        }
    }

    // Kahn's algorithm, ready set ordered by registration index
    let mut ready: BTreeSet<usize> = (0..plugins.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(plugins.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in &dependents[next] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < plugins.len() {
        return Err(NucleusError::CyclicPluginDependency(find_cycle(
            plugins, &index_of, &in_degree,
        )));
    }

    debug!(
        "Plugin order: {:?}",
        order.iter().map(|&i| plugins[i].id.name()).collect::<Vec<_>>()
    );
    Ok(order)
}

/// Walks dependency edges among unresolved plugins until a node repeats.
fn find_cycle(
    plugins: &[Plugin],
    index_of: &HashMap<PluginId, usize>,
    in_degree: &[usize],
) -> Vec<PluginId> {
    let Some(start) = (0..plugins.len()).find(|&i| in_degree[i] > 0) else {
        return Vec::new();
    };

    let mut path: Vec<usize> = Vec::new();
    let mut current = start;
    loop {
        if let Some(position) = path.iter().position(|&i| i == current) {
            let mut cycle: Vec<PluginId> = path[position..].iter().map(|&i| plugins[i].id).collect();
            cycle.push(plugins[current].id);
            return cycle;
        }
        path.push(current);
        let next = plugins[current]
            .dependencies
            .iter()
            .filter_map(|dependency| index_of.get(dependency).copied())
            .find(|&dep| in_degree[dep] > 0);
        match next {
            Some(dep) => current = dep,
            None => return path.iter().map(|&i| plugins[i].id).collect(),
        }
    }
}
