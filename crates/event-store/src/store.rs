use async_trait::async_trait;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Version};

/// Write preconditions for [`EventStore::append`].
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// `None` appends without checking the stream head.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// The stream must not have any events yet.
    pub fn expect_new() -> Self {
        Self::expect_version(Version::initial())
    }

    /// Fails with a conflict when `head` is not the expected version.
    pub(crate) fn check_head(&self, aggregate_id: AggregateId, head: Version) -> Result<()> {
        match self.expected_version {
            Some(expected) if expected != head => {
                Err(EventStoreError::conflict(aggregate_id, expected, head))
            }
            _ => Ok(()),
        }
    }
}

/// Storage for saga and entity streams.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Atomically appends `events` to one stream and returns the new head.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version>;

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>>;

    /// Events of one type across all streams, in append order.
    async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>>;

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;
}

#[async_trait]
pub trait EventStoreExt: EventStore {
    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.get_aggregate_version(aggregate_id).await?.is_some())
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Shape of a batch that passed [`AppendBatch::inspect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AppendBatch {
    pub aggregate_id: AggregateId,
    pub first: Version,
    pub last: Version,
}

impl AppendBatch {
    /// A batch must be non-empty, target a single stream and carry
    /// consecutive versions.
    pub fn inspect(events: &[EventEnvelope]) -> Result<Self> {
        let (head, rest) = events
            .split_first()
            .ok_or_else(|| EventStoreError::InvalidAppend("batch is empty".to_string()))?;

        let mut last = head.version;
        for event in rest {
            if event.aggregate_id != head.aggregate_id
                || event.aggregate_type != head.aggregate_type
            {
                return Err(EventStoreError::InvalidAppend(format!(
                    "event {} belongs to {} {}, batch targets {} {}",
                    event.event_id,
                    event.aggregate_type,
                    event.aggregate_id,
                    head.aggregate_type,
                    head.aggregate_id
                )));
            }
            if event.version != last.next() {
                return Err(EventStoreError::InvalidAppend(format!(
                    "version {} follows {}",
                    event.version, last
                )));
            }
            last = event.version;
        }

        Ok(Self {
            aggregate_id: head.aggregate_id,
            first: head.version,
            last,
        })
    }

    pub fn len(&self) -> u64 {
        (self.last.as_i64() - self.first.as_i64() + 1) as u64
    }
}
