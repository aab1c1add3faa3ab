//! Event-sourced aggregates: state rebuilt from a stream and changed only by
//! recording new events.

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::DomainError;

/// A past-tense fact stored as the payload of an event envelope.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Envelope `event_type`, e.g. `"StepCompleted"`.
    fn event_type(&self) -> &'static str;
}

/// State folded from one stream of events.
pub trait Aggregate: Default + Send + Sync + Sized {
    type Event: DomainEvent;

    /// Rejection raised when a command is not allowed in the current state.
    type Error: std::error::Error + Send + Sync + Into<DomainError>;

    /// Stored on every envelope and checked when a stream is replayed.
    fn aggregate_type() -> &'static str;

    /// `None` until the creation event has been applied.
    fn id(&self) -> Option<AggregateId>;

    fn version(&self) -> Version;

    fn set_version(&mut self, version: Version);

    /// Folds one event into the state. Never fails.
    fn apply(&mut self, event: Self::Event);

    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}

/// An aggregate together with the events recorded on it but not yet
/// committed to the store.
///
/// Recording applies the event immediately, so the aggregate always
/// reflects its pending changes. The buffer is drained by [`commit`],
/// which the dispatcher calls only once the events are persisted and
/// published.
///
/// [`commit`]: EventSourced::commit
#[derive(Debug)]
pub struct EventSourced<A: Aggregate> {
    aggregate: A,
    pending: Vec<A::Event>,
}

impl<A: Aggregate> EventSourced<A> {
    /// Wraps an aggregate with an empty pending buffer.
    pub fn new(aggregate: A) -> Self {
        Self {
            aggregate,
            pending: Vec::new(),
        }
    }

    /// Applies an event and buffers it for persistence.
    pub fn record(&mut self, event: A::Event) {
        self.aggregate.apply(event.clone());
        self.pending.push(event);
    }

    /// Records every event in order.
    pub fn record_all(&mut self, events: impl IntoIterator<Item = A::Event>) {
        for event in events {
            self.record(event);
        }
    }

    /// Returns the uncommitted events.
    pub fn pending(&self) -> &[A::Event] {
        &self.pending
    }

    /// Returns true if any events are waiting to be committed.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Returns the buffered events and clears the buffer.
    pub fn commit(&mut self) -> Vec<A::Event> {
        std::mem::take(&mut self.pending)
    }

    /// Returns the wrapped aggregate.
    pub fn aggregate(&self) -> &A {
        &self.aggregate
    }

    /// Sets the version of the wrapped aggregate.
    pub fn set_version(&mut self, version: Version) {
        self.aggregate.set_version(version);
    }

    /// Unwraps the aggregate, discarding anything still pending.
    pub fn into_inner(self) -> A {
        self.aggregate
    }
}
