//! Command handling infrastructure.
//!
//! A [`Command`] names one intention against one aggregate. The
//! [`CommandDispatcher`] is the single entry point through which commands
//! are executed; [`CommandBus`] is the store-backed implementation.

use std::time::Instant;

use async_trait::async_trait;
use common::AggregateId;
use event_store::{AppendOptions, EventEnvelope, EventStore, Version};

use crate::aggregate::{Aggregate, DomainEvent, EventSourced};
use crate::error::DomainError;
use crate::publisher::EventPublisher;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were generated and persisted.
    pub events: Vec<A::Event>,

    /// The new version of the aggregate after the command.
    pub new_version: Version,
}

/// Trait for commands that can be executed against an aggregate.
///
/// Commands may be rejected if the aggregate's current state doesn't allow
/// the action. Deciding is pure: `handle` sees the replayed aggregate and
/// returns the events to record.
pub trait Command: Send + Sync {
    /// The type of aggregate this command targets.
    type Aggregate: Aggregate;

    /// Stable snake_case name, used in logs, metrics and event metadata.
    fn name(&self) -> &'static str;

    /// Returns the ID of the aggregate this command targets.
    fn aggregate_id(&self) -> AggregateId;

    /// Decides which events the command produces.
    fn handle(
        &self,
        aggregate: &Self::Aggregate,
    ) -> Result<Vec<<Self::Aggregate as Aggregate>::Event>, <Self::Aggregate as Aggregate>::Error>;
}

/// Executes named commands against their aggregates.
///
/// Saga bookkeeping and business actions both go through a dispatcher,
/// which makes it the seam for fault injection in tests.
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    /// Executes one command and returns the updated aggregate.
    async fn dispatch<C>(&self, command: C) -> Result<CommandResult<C::Aggregate>, DomainError>
    where
        C: Command + 'static;

    /// Loads an aggregate, returning None if its stream is empty.
    async fn load<A>(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError>
    where
        A: Aggregate + 'static;
}

/// Store-backed dispatcher.
///
/// Loads by replay, decides, appends with optimistic concurrency, publishes,
/// then commits the pending buffer. Publication failures are logged, not
/// returned.
#[derive(Clone)]
pub struct CommandBus<S, P> {
    store: S,
    publisher: P,
}

impl<S, P> CommandBus<S, P>
where
    S: EventStore,
    P: EventPublisher,
{
    /// Creates a new command bus over the given store and publisher.
    pub fn new(store: S, publisher: P) -> Self {
        Self { store, publisher }
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns a reference to the publisher.
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Rebuilds an aggregate from its stream. Empty streams yield the default.
    async fn replay<A: Aggregate>(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let envelopes = self.store.get_events_for_aggregate(aggregate_id).await?;

        let mut aggregate = A::default();
        for envelope in envelopes {
            if envelope.aggregate_type != A::aggregate_type() {
                return Err(DomainError::AggregateTypeMismatch {
                    aggregate_id,
                    expected: A::aggregate_type(),
                    found: envelope.aggregate_type,
                });
            }
            let event: A::Event = serde_json::from_value(envelope.payload)?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    async fn execute<C>(&self, command: &C) -> Result<CommandResult<C::Aggregate>, DomainError>
    where
        C: Command,
    {
        let aggregate_id = command.aggregate_id();
        let aggregate: C::Aggregate = self.replay(aggregate_id).await?;
        let current_version = aggregate.version();

        let events = command
            .handle(&aggregate)
            .map_err(|e| -> DomainError { e.into() })?;

        let mut sourced = EventSourced::new(aggregate);
        sourced.record_all(events);

        if !sourced.has_pending() {
            return Ok(CommandResult {
                aggregate: sourced.into_inner(),
                events: vec![],
                new_version: current_version,
            });
        }

        let envelopes = build_envelopes::<C::Aggregate>(
            aggregate_id,
            current_version,
            sourced.pending(),
            command.name(),
        )?;

        let options = if current_version == Version::initial() {
            AppendOptions::expect_new()
        } else {
            AppendOptions::expect_version(current_version)
        };

        let new_version = self.store.append(envelopes.clone(), options).await?;
        // The append is durable, so the command has succeeded either way.
        if let Err(e) = self.publisher.publish(&envelopes).await {
            metrics::counter!("event_publish_failures_total", "command" => command.name())
                .increment(1);
            tracing::error!(%aggregate_id, error = %e, "events persisted but not published");
        }

        let events = sourced.commit();
        sourced.set_version(new_version);

        Ok(CommandResult {
            aggregate: sourced.into_inner(),
            events,
            new_version,
        })
    }
}

#[async_trait]
impl<S, P> CommandDispatcher for CommandBus<S, P>
where
    S: EventStore,
    P: EventPublisher,
{
    #[tracing::instrument(skip(self, command), fields(command = command.name(), aggregate_id = %command.aggregate_id()))]
    async fn dispatch<C>(&self, command: C) -> Result<CommandResult<C::Aggregate>, DomainError>
    where
        C: Command + 'static,
    {
        let name = command.name();
        let started = Instant::now();
        metrics::counter!("commands_dispatched_total", "command" => name).increment(1);

        let result = self.execute(&command).await;

        metrics::histogram!("command_duration_seconds", "command" => name)
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(outcome) => {
                tracing::debug!(
                    events = outcome.events.len(),
                    version = %outcome.new_version,
                    "command executed"
                );
            }
            Err(e) => {
                metrics::counter!("command_failures_total", "command" => name).increment(1);
                tracing::debug!(error = %e, "command rejected");
            }
        }

        result
    }

    async fn load<A>(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError>
    where
        A: Aggregate + 'static,
    {
        let aggregate: A = self.replay(aggregate_id).await?;
        Ok(aggregate.id().is_some().then_some(aggregate))
    }
}

/// Builds event envelopes from domain events.
fn build_envelopes<A: Aggregate>(
    aggregate_id: AggregateId,
    current_version: Version,
    events: &[A::Event],
    command: &'static str,
) -> Result<Vec<EventEnvelope>, DomainError> {
    let mut envelopes = Vec::with_capacity(events.len());
    let mut version = current_version;

    for event in events {
        version = version.next();
        let envelope = EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type(A::aggregate_type())
            .event_type(event.event_type())
            .version(version)
            .payload(event)?
            .metadata("command", serde_json::json!(command))
            .build()?;
        envelopes.push(envelope);
    }

    Ok(envelopes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::InMemoryEventPublisher;
    use event_store::InMemoryEventStore;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum TallyEvent {
        Opened { id: AggregateId },
        Added { value: i32 },
    }

    impl DomainEvent for TallyEvent {
        fn event_type(&self) -> &'static str {
            match self {
                TallyEvent::Opened { .. } => "TallyOpened",
                TallyEvent::Added { .. } => "TallyAdded",
            }
        }
    }

    #[derive(Debug, Default)]
    struct Tally {
        id: Option<AggregateId>,
        total: i32,
        version: Version,
    }

    #[derive(Debug, thiserror::Error)]
    enum TallyError {
        #[error("tally already opened")]
        AlreadyOpened,
        #[error("tally not opened")]
        NotOpened,
    }

    impl From<TallyError> for DomainError {
        fn from(e: TallyError) -> Self {
            DomainError::rejected(e)
        }
    }

    impl Aggregate for Tally {
        type Event = TallyEvent;
        type Error = TallyError;

        fn aggregate_type() -> &'static str {
            "Tally"
        }

        fn id(&self) -> Option<AggregateId> {
            self.id
        }

        fn version(&self) -> Version {
            self.version
        }

        fn set_version(&mut self, version: Version) {
            self.version = version;
        }

        fn apply(&mut self, event: Self::Event) {
            match event {
                TallyEvent::Opened { id } => self.id = Some(id),
                TallyEvent::Added { value } => self.total += value,
            }
        }
    }

    struct OpenTally(AggregateId);

    impl Command for OpenTally {
        type Aggregate = Tally;

        fn name(&self) -> &'static str {
            "open_tally"
        }

        fn aggregate_id(&self) -> AggregateId {
            self.0
        }

        fn handle(&self, tally: &Tally) -> Result<Vec<TallyEvent>, TallyError> {
            if tally.id.is_some() {
                return Err(TallyError::AlreadyOpened);
            }
            Ok(vec![TallyEvent::Opened { id: self.0 }])
        }
    }

    struct AddToTally(AggregateId, Vec<i32>);

    impl Command for AddToTally {
        type Aggregate = Tally;

        fn name(&self) -> &'static str {
            "add_to_tally"
        }

        fn aggregate_id(&self) -> AggregateId {
            self.0
        }

        fn handle(&self, tally: &Tally) -> Result<Vec<TallyEvent>, TallyError> {
            if tally.id.is_none() {
                return Err(TallyError::NotOpened);
            }
            Ok(self
                .1
                .iter()
                .map(|value| TallyEvent::Added { value: *value })
                .collect())
        }
    }

    struct UnreachableBroker;

    #[async_trait]
    impl EventPublisher for UnreachableBroker {
        async fn publish(&self, _events: &[EventEnvelope]) -> Result<(), DomainError> {
            Err(DomainError::Publication("broker unreachable".to_string()))
        }
    }

    fn bus() -> CommandBus<InMemoryEventStore, InMemoryEventPublisher> {
        CommandBus::new(InMemoryEventStore::new(), InMemoryEventPublisher::new())
    }

    #[tokio::test]
    async fn dispatch_creates_aggregate() {
        let bus = bus();
        let id = AggregateId::new();

        let result = bus.dispatch(OpenTally(id)).await.unwrap();

        assert_eq!(result.events.len(), 1);
        assert_eq!(result.new_version, Version::first());
        assert_eq!(result.aggregate.id(), Some(id));
        assert_eq!(result.aggregate.version(), Version::first());
    }

    #[tokio::test]
    async fn dispatch_updates_and_publishes() {
        let bus = bus();
        let id = AggregateId::new();

        bus.dispatch(OpenTally(id)).await.unwrap();
        let result = bus.dispatch(AddToTally(id, vec![2, 40])).await.unwrap();

        assert_eq!(result.new_version, Version::new(3));
        assert_eq!(result.aggregate.total, 42);
        assert_eq!(
            bus.publisher().event_types().await,
            vec!["TallyOpened", "TallyAdded", "TallyAdded"]
        );
    }

    #[tokio::test]
    async fn envelopes_carry_the_command_name() {
        let bus = bus();
        let id = AggregateId::new();
        bus.dispatch(OpenTally(id)).await.unwrap();

        let stored = bus.store().get_events_for_aggregate(id).await.unwrap();
        assert_eq!(stored[0].aggregate_type, "Tally");
        assert_eq!(
            stored[0].metadata.get("command"),
            Some(&serde_json::json!("open_tally"))
        );
    }

    #[tokio::test]
    async fn publish_failure_does_not_fail_a_persisted_command() {
        let bus = CommandBus::new(InMemoryEventStore::new(), UnreachableBroker);
        let id = AggregateId::new();

        let result = bus.dispatch(OpenTally(id)).await.unwrap();

        assert_eq!(result.new_version, Version::first());
        let tally: Tally = bus.load(id).await.unwrap().unwrap();
        assert_eq!(tally.id(), Some(id));
        assert_eq!(bus.store().event_count().await, 1);
    }

    #[tokio::test]
    async fn rejected_command_persists_nothing() {
        let bus = bus();
        let id = AggregateId::new();

        let err = bus.dispatch(AddToTally(id, vec![1])).await.unwrap_err();

        assert!(matches!(err, DomainError::Rejected(_)));
        assert_eq!(bus.store().event_count().await, 0);
        assert_eq!(bus.publisher().count().await, 0);
    }

    #[tokio::test]
    async fn empty_decision_returns_without_persisting() {
        let bus = bus();
        let id = AggregateId::new();
        bus.dispatch(OpenTally(id)).await.unwrap();

        let result = bus.dispatch(AddToTally(id, vec![])).await.unwrap();

        assert!(result.events.is_empty());
        assert_eq!(result.new_version, Version::first());
        assert_eq!(bus.store().event_count().await, 1);
    }

    #[tokio::test]
    async fn load_returns_none_for_empty_stream() {
        let bus = bus();
        let loaded: Option<Tally> = bus.load(AggregateId::new()).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn load_replays_existing_stream() {
        let bus = bus();
        let id = AggregateId::new();
        bus.dispatch(OpenTally(id)).await.unwrap();
        bus.dispatch(AddToTally(id, vec![5])).await.unwrap();

        let tally: Tally = bus.load(id).await.unwrap().unwrap();
        assert_eq!(tally.total, 5);
        assert_eq!(tally.version(), Version::new(2));
    }

    #[tokio::test]
    async fn replay_rejects_foreign_stream() {
        let bus = bus();
        let id = AggregateId::new();
        let foreign = EventEnvelope::builder()
            .aggregate_id(id)
            .aggregate_type("Other")
            .event_type("OtherCreated")
            .version(Version::first())
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap();
        bus.store()
            .append(vec![foreign], AppendOptions::expect_new())
            .await
            .unwrap();

        let result: Result<Option<Tally>, _> = bus.load(id).await;
        assert!(matches!(
            result,
            Err(DomainError::AggregateTypeMismatch { .. })
        ));
    }
}
