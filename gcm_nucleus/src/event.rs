//! The event bus.
//!
//! Events are plain values keyed by their Rust type. Each event type gets a
//! channel holding three kinds of subscription:
//!
//! - validators, which see the event with a shared context and may reject it
//! - unlabeled subscribers, which see every event of the type
//! - labeled subscribers, which see only events whose label (computed by a
//!   registered [`EventLabeler`]) equals the key they subscribed with
//!
//! Releasing an event runs every validator first; the first failure aborts
//! the release. Subscribers then run in subscription order. Dispatch is
//! synchronous, so an event released by a subscriber is fully dispatched
//! before the outer dispatch moves on to its next subscriber.

use crate::context::SimulationContext;
use crate::engine::SimulationState;
use gcm_env::{LabelerId, NucleusError, Planner, SubscriptionId};
use std::any::{Any, TypeId};
use std::cell::Cell;
use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;
use std::rc::Rc;

type SubscriberFn<E> = Rc<dyn Fn(&mut SimulationContext, &E) -> Result<(), NucleusError>>;
type ValidatorFn<E> = Rc<dyn Fn(&SimulationContext, &E) -> Result<(), NucleusError>>;
type LabelFn<E, K> = Rc<dyn Fn(&E) -> K>;

/// Handle to a labeler registered for events of type `E` producing keys `K`.
pub struct EventLabeler<E, K> {
    id: LabelerId,
    _marker: PhantomData<fn(&E) -> K>,
}

impl<E, K> EventLabeler<E, K> {
    pub fn id(&self) -> LabelerId {
        self.id
    }
}

impl<E, K> Clone for EventLabeler<E, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E, K> Copy for EventLabeler<E, K> {}

impl<E, K> std::fmt::Debug for EventLabeler<E, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EventLabeler").field(&self.id).finish()
    }
}

struct Entry<F> {
    id: SubscriptionId,
    owner: Planner,
    callback: F,
    /// Cleared on unsubscribe so in-flight dispatch skips the entry
    live: Rc<Cell<bool>>,
}

impl<F: Clone> Clone for Entry<F> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            owner: self.owner,
            callback: self.callback.clone(),
            live: Rc::clone(&self.live),
        }
    }
}

impl<F> Entry<F> {
    fn retire(&self) {
        self.live.set(false);
    }
}

fn remove_entry<F>(entries: &mut Vec<Entry<F>>, id: SubscriptionId) -> bool {
    match entries.iter().position(|entry| entry.id == id) {
        Some(index) => {
            entries.remove(index).retire();
            true
        }
        None => false,
    }
}

fn remove_owned<F>(entries: &mut Vec<Entry<F>>, owner: Planner, removed: &mut Vec<SubscriptionId>) {
    entries.retain(|entry| {
        if entry.owner != owner {
            return true;
        }
        entry.retire();
        removed.push(entry.id);
        false
    });
}

/// A labeler plus the labeled subscriptions bucketed by key.
trait LabelIndex<E> {
    fn id(&self) -> LabelerId;
    fn matching(&self, event: &E, out: &mut Vec<Entry<SubscriberFn<E>>>);
    fn remove(&mut self, id: SubscriptionId) -> bool;
    fn remove_owned_by(&mut self, owner: Planner, removed: &mut Vec<SubscriptionId>);
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct LabelSlot<E, K> {
    id: LabelerId,
    label: LabelFn<E, K>,
    buckets: HashMap<K, Vec<Entry<SubscriberFn<E>>>>,
}

impl<E: 'static, K: Eq + Hash + 'static> LabelIndex<E> for LabelSlot<E, K> {
    fn id(&self) -> LabelerId {
        self.id
    }

    fn matching(&self, event: &E, out: &mut Vec<Entry<SubscriberFn<E>>>) {
        if let Some(bucket) = self.buckets.get(&(self.label)(event)) {
            out.extend(bucket.iter().cloned());
        }
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        self.buckets
            .values_mut()
            .any(|bucket| remove_entry(bucket, id))
    }

    fn remove_owned_by(&mut self, owner: Planner, removed: &mut Vec<SubscriptionId>) {
        for bucket in self.buckets.values_mut() {
            remove_owned(bucket, owner, removed);
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct Channel<E> {
    validators: Vec<Entry<ValidatorFn<E>>>,
    subscribers: Vec<Entry<SubscriberFn<E>>>,
    labels: Vec<Box<dyn LabelIndex<E>>>,
}

impl<E> Default for Channel<E> {
    fn default() -> Self {
        Self {
            validators: Vec::new(),
            subscribers: Vec::new(),
            labels: Vec::new(),
        }
    }
}

impl<E: 'static> Channel<E> {
    /// Validators and matching subscribers, each in subscription order.
    fn snapshot(&self, event: &E) -> (Vec<Entry<ValidatorFn<E>>>, Vec<Entry<SubscriberFn<E>>>) {
        let mut subscribers = self.subscribers.clone();
        for index in &self.labels {
            index.matching(event, &mut subscribers);
        }
        subscribers.sort_by_key(|entry| entry.id.sequence());
        (self.validators.clone(), subscribers)
    }

    fn label_slot<K: Eq + Hash + 'static>(
        &mut self,
        labeler: LabelerId,
    ) -> Option<&mut LabelSlot<E, K>> {
        self.labels
            .iter_mut()
            .find(|index| index.id() == labeler)
            .and_then(|index| index.as_any_mut().downcast_mut::<LabelSlot<E, K>>())
    }
}

/// Type-erased view of a channel for operations that do not know `E`.
trait ErasedChannel {
    fn remove(&mut self, id: SubscriptionId) -> bool;
    fn remove_owned_by(&mut self, owner: Planner, removed: &mut Vec<SubscriptionId>);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<E: 'static> ErasedChannel for Channel<E> {
    fn remove(&mut self, id: SubscriptionId) -> bool {
        remove_entry(&mut self.validators, id)
            || remove_entry(&mut self.subscribers, id)
            || self.labels.iter_mut().any(|index| index.remove(id))
    }

    fn remove_owned_by(&mut self, owner: Planner, removed: &mut Vec<SubscriptionId>) {
        remove_owned(&mut self.validators, owner, removed);
        remove_owned(&mut self.subscribers, owner, removed);
        for index in &mut self.labels {
            index.remove_owned_by(owner, removed);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Subscriptions of one simulation, keyed by event type.
#[derive(Default)]
pub(crate) struct EventBus {
    channels: HashMap<TypeId, Box<dyn ErasedChannel>>,
    /// Event type of every live subscription
    subscriptions: HashMap<SubscriptionId, TypeId>,
    next_subscription: u64,
    next_labeler: usize,
}

impl EventBus {
    fn channel<E: 'static>(&self) -> Option<&Channel<E>> {
        self.channels
            .get(&TypeId::of::<E>())
            .and_then(|channel| channel.as_any().downcast_ref::<Channel<E>>())
    }

    fn channel_mut<E: 'static>(&mut self) -> &mut Channel<E> {
        let channel = self
            .channels
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Channel::<E>::default()) as Box<dyn ErasedChannel>);
        match channel.as_any_mut().downcast_mut::<Channel<E>>() {
            Some(channel) => channel,
            None => unreachable!("channel stored under the TypeId of another event type"),
        }
    }

    fn next_id<E: 'static>(&mut self) -> SubscriptionId {
        let id = SubscriptionId::from_sequence(self.next_subscription);
        self.next_subscription += 1;
        self.subscriptions.insert(id, TypeId::of::<E>());
        id
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        let Some(type_id) = self.subscriptions.remove(&id) else {
            return false;
        };
        self.channels
            .get_mut(&type_id)
            .map(|channel| channel.remove(id))
            .unwrap_or(false)
    }

    /// Drops every subscription owned by `owner`. Returns how many.
    pub(crate) fn remove_owned_by(&mut self, owner: Planner) -> usize {
        let mut removed = Vec::new();
        for channel in self.channels.values_mut() {
            channel.remove_owned_by(owner, &mut removed);
        }
        for id in &removed {
            self.subscriptions.remove(id);
        }
        removed.len()
    }

    pub(crate) fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

const SUBSCRIBE_STATES: &[SimulationState] =
    &[SimulationState::Initializing, SimulationState::Running];

impl SimulationContext {
    /// Subscribes the current focus to every event of type `E`.
    pub fn subscribe<E, F>(&mut self, callback: F) -> Result<SubscriptionId, NucleusError>
    where
        E: 'static,
        F: Fn(&mut SimulationContext, &E) -> Result<(), NucleusError> + 'static,
    {
        self.require_state("subscribe", SUBSCRIBE_STATES)?;
        let owner = self.focus();
        let id = self.events.next_id::<E>();
        self.events.channel_mut::<E>().subscribers.push(Entry {
            id,
            owner,
            callback: Rc::new(callback),
            live: Rc::new(Cell::new(true)),
        });
        Ok(id)
    }

    /// Subscribes a validator for events of type `E`.
    ///
    /// Validators run before any subscriber; an error aborts the release and
    /// is returned to the data manager that released the event.
    pub fn subscribe_validator<E, F>(&mut self, validator: F) -> Result<SubscriptionId, NucleusError>
    where
        E: 'static,
        F: Fn(&SimulationContext, &E) -> Result<(), NucleusError> + 'static,
    {
        self.require_state("subscribe_validator", SUBSCRIBE_STATES)?;
        let owner = self.focus();
        let id = self.events.next_id::<E>();
        self.events.channel_mut::<E>().validators.push(Entry {
            id,
            owner,
            callback: Rc::new(validator),
            live: Rc::new(Cell::new(true)),
        });
        Ok(id)
    }

    /// Registers a function computing a label for events of type `E`.
    pub fn add_event_labeler<E, K, F>(&mut self, label: F) -> EventLabeler<E, K>
    where
        E: 'static,
        K: Eq + Hash + 'static,
        F: Fn(&E) -> K + 'static,
    {
        let id = LabelerId::from_index(self.events.next_labeler);
        self.events.next_labeler += 1;
        self.events.channel_mut::<E>().labels.push(Box::new(LabelSlot {
            id,
            label: Rc::new(label) as LabelFn<E, K>,
            buckets: HashMap::new(),
        }));
        EventLabeler {
            id,
            _marker: PhantomData,
        }
    }

    /// Subscribes to events of type `E` whose label equals `key`.
    pub fn subscribe_labeled<E, K, F>(
        &mut self,
        labeler: EventLabeler<E, K>,
        key: K,
        callback: F,
    ) -> Result<SubscriptionId, NucleusError>
    where
        E: 'static,
        K: Eq + Hash + 'static,
        F: Fn(&mut SimulationContext, &E) -> Result<(), NucleusError> + 'static,
    {
        self.require_state("subscribe_labeled", SUBSCRIBE_STATES)?;
        if self
            .events
            .channel_mut::<E>()
            .label_slot::<K>(labeler.id)
            .is_none()
        {
            return Err(NucleusError::UnknownEventLabeler(labeler.id));
        }

        let owner = self.focus();
        let id = self.events.next_id::<E>();
        let entry = Entry {
            id,
            owner,
            callback: Rc::new(callback) as SubscriberFn<E>,
            live: Rc::new(Cell::new(true)),
        };
        match self.events.channel_mut::<E>().label_slot::<K>(labeler.id) {
            Some(slot) => slot.buckets.entry(key).or_default().push(entry),
            None => return Err(NucleusError::UnknownEventLabeler(labeler.id)),
        }
        Ok(id)
    }

    /// Removes a subscription. Returns false if it was already removed.
    ///
    /// Takes effect immediately: a dispatch in progress skips the callback if
    /// it has not reached it yet.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.remove(id)
    }

    /// Releases an event to its validators and subscribers.
    ///
    /// Only a data manager in focus may release events.
    pub fn release_event<E: 'static>(&mut self, event: E) -> Result<(), NucleusError> {
        let focus = self.focus();
        if !focus.is_data_manager() {
            return Err(NucleusError::IllegalEventRelease(focus));
        }

        let Some(channel) = self.events.channel::<E>() else {
            return Ok(());
        };
        let (validators, subscribers) = channel.snapshot(&event);

        for validator in &validators {
            if validator.live.get() {
                (validator.callback)(self, &event)?;
            }
        }
        for subscriber in &subscribers {
            if !subscriber.live.get() {
                continue;
            }
            let callback = &subscriber.callback;
            self.with_focus(subscriber.owner, |ctx| callback(ctx, &event))?;
        }
        Ok(())
    }

    /// Number of live subscriptions across all event types.
    pub fn subscription_count(&self) -> usize {
        self.events.subscription_count()
    }
}
