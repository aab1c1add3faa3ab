use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AggregateId, EventStoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Head of a stream. Zero means nothing has been written; each event
/// advances the head by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn initial() -> Self {
        Self(0)
    }

    pub fn first() -> Self {
        Self::initial().next()
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// One recorded fact about a saga, a saga step or an identity entity.
///
/// `payload` is the serialized domain event; `metadata` carries things
/// like the name of the command that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,
    pub event_type: String,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    /// Stream head once this event is applied.
    pub version: Version,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelope {
    pub fn builder() -> EventEnvelopeBuilder {
        EventEnvelopeBuilder::default()
    }
}

/// Assembles an [`EventEnvelope`].
///
/// `event_id` and `timestamp` are generated when left unset; every other
/// field except metadata is mandatory.
#[derive(Debug, Default)]
pub struct EventEnvelopeBuilder {
    event_id: Option<EventId>,
    event_type: Option<String>,
    aggregate_id: Option<AggregateId>,
    aggregate_type: Option<String>,
    version: Option<Version>,
    timestamp: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
    metadata: HashMap<String, serde_json::Value>,
}

fn required<T>(field: Option<T>, name: &'static str) -> Result<T> {
    field.ok_or(EventStoreError::IncompleteEnvelope(name))
}

impl EventEnvelopeBuilder {
    pub fn event_id(self, event_id: EventId) -> Self {
        Self {
            event_id: Some(event_id),
            ..self
        }
    }

    pub fn event_type(self, event_type: impl Into<String>) -> Self {
        Self {
            event_type: Some(event_type.into()),
            ..self
        }
    }

    pub fn aggregate_id(self, aggregate_id: AggregateId) -> Self {
        Self {
            aggregate_id: Some(aggregate_id),
            ..self
        }
    }

    pub fn aggregate_type(self, aggregate_type: impl Into<String>) -> Self {
        Self {
            aggregate_type: Some(aggregate_type.into()),
            ..self
        }
    }

    pub fn version(self, version: Version) -> Self {
        Self {
            version: Some(version),
            ..self
        }
    }

    pub fn timestamp(self, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp: Some(timestamp),
            ..self
        }
    }

    /// Fails when `payload` cannot be represented as JSON.
    pub fn payload<T: Serialize>(self, payload: &T) -> Result<Self> {
        let payload = serde_json::to_value(payload)?;
        Ok(self.payload_raw(payload))
    }

    pub fn payload_raw(self, payload: serde_json::Value) -> Self {
        Self {
            payload: Some(payload),
            ..self
        }
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn build(self) -> Result<EventEnvelope> {
        let event_type = required(self.event_type, "event_type")?;
        let aggregate_id = required(self.aggregate_id, "aggregate_id")?;
        let aggregate_type = required(self.aggregate_type, "aggregate_type")?;
        let version = required(self.version, "version")?;
        let payload = required(self.payload, "payload")?;

        Ok(EventEnvelope {
            event_id: self.event_id.unwrap_or_default(),
            event_type,
            aggregate_id,
            aggregate_type,
            version,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            payload,
            metadata: self.metadata,
        })
    }
}
