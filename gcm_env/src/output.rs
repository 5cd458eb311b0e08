//! Output sink abstraction.
//!
//! A running simulation hands report values to an [`OutputSink`] without
//! knowing who consumes them. Inside an experiment the sink forwards across
//! threads to the experiment's consumers; a standalone run can collect into a
//! [`VecSink`] or discard with [`NullSink`].

use std::any::Any;
use std::sync::Mutex;

/// A type-erased output value.
pub type OutputItem = Box<dyn Any + Send>;

/// Destination for values released by a simulation.
///
/// Implementations must be `Send + Sync`: experiment sinks are shared by worker
/// threads even though each simulation releases from a single thread.
pub trait OutputSink: Send + Sync {
    /// Accepts one output value.
    fn release(&self, item: OutputItem);
}

/// Discards all output.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn release(&self, _item: OutputItem) {}
}

/// Collects output in release order.
#[derive(Default)]
pub struct VecSink {
    items: Mutex<Vec<OutputItem>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of collected items.
    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns all collected items of type `T`, dropping the rest.
    pub fn take_of<T: Any>(&self) -> Vec<T> {
        let drained: Vec<OutputItem> = match self.items.lock() {
            Ok(mut items) => items.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        drained
            .into_iter()
            .filter_map(|item| item.downcast::<T>().ok().map(|boxed| *boxed))
            .collect()
    }
}

impl OutputSink for VecSink {
    fn release(&self, item: OutputItem) {
        if let Ok(mut items) = self.items.lock() {
            items.push(item);
        }
    }
}
