//! Organization aggregate.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::command::Command;

use super::{IdentityError, require_non_blank};

const ENTITY: &str = "Organization";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrganizationStatus {
    #[default]
    Active,
    Deleted,
}

/// Events that can occur on an organization aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrganizationEvent {
    OrganizationCreated {
        organization_id: AggregateId,
        name: String,
        owner_id: AggregateId,
        created_at: DateTime<Utc>,
    },
    OrganizationDeleted {
        deleted_at: DateTime<Utc>,
    },
}

impl DomainEvent for OrganizationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrganizationEvent::OrganizationCreated { .. } => "OrganizationCreated",
            OrganizationEvent::OrganizationDeleted { .. } => "OrganizationDeleted",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Organization {
    id: Option<AggregateId>,
    #[serde(default)]
    version: Version,
    name: String,
    owner_id: Option<AggregateId>,
    status: OrganizationStatus,
}

impl Aggregate for Organization {
    type Event = OrganizationEvent;
    type Error = IdentityError;

    fn aggregate_type() -> &'static str {
        ENTITY
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
            OrganizationEvent::OrganizationCreated {
                organization_id,
                name,
                owner_id,
                ..
            } => {
                self.id = Some(organization_id);
                self.name = name;
                self.owner_id = Some(owner_id);
                self.status = OrganizationStatus::Active;
            }
            OrganizationEvent::OrganizationDeleted { .. } => {
                self.status = OrganizationStatus::Deleted;
            }
        }
    }
}

impl Organization {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner_id(&self) -> Option<AggregateId> {
        self.owner_id
    }

    pub fn status(&self) -> OrganizationStatus {
        self.status
    }

    pub fn create(
        &self,
        organization_id: AggregateId,
        name: &str,
        owner_id: AggregateId,
    ) -> Result<Vec<OrganizationEvent>, IdentityError> {
        if self.id.is_some() {
            return Err(IdentityError::AlreadyExists {
                entity: ENTITY,
                id: organization_id,
            });
        }
        require_non_blank("name", name)?;

        Ok(vec![OrganizationEvent::OrganizationCreated {
            organization_id,
            name: name.trim().to_string(),
            owner_id,
            created_at: Utc::now(),
        }])
    }

    pub fn delete(
        &self,
        organization_id: AggregateId,
    ) -> Result<Vec<OrganizationEvent>, IdentityError> {
        if self.id.is_none() {
            return Err(IdentityError::NotFound {
                entity: ENTITY,
                id: organization_id,
            });
        }
        if self.status == OrganizationStatus::Deleted {
            return Err(IdentityError::Inactive {
                entity: ENTITY,
                id: organization_id,
            });
        }

        Ok(vec![OrganizationEvent::OrganizationDeleted {
            deleted_at: Utc::now(),
        }])
    }
}

/// Command to create an organization owned by a user.
#[derive(Debug, Clone)]
pub struct CreateOrganization {
    pub organization_id: AggregateId,
    pub name: String,
    pub owner_id: AggregateId,
}

impl CreateOrganization {
    pub fn new(organization_id: AggregateId, name: impl Into<String>, owner_id: AggregateId) -> Self {
        Self {
            organization_id,
            name: name.into(),
            owner_id,
        }
    }
}

impl Command for CreateOrganization {
    type Aggregate = Organization;

    fn name(&self) -> &'static str {
        "create_organization"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.organization_id
    }

    fn handle(&self, organization: &Organization) -> Result<Vec<OrganizationEvent>, IdentityError> {
        organization.create(self.organization_id, &self.name, self.owner_id)
    }
}

/// Command to delete an organization. Compensates [`CreateOrganization`].
#[derive(Debug, Clone)]
pub struct DeleteOrganization {
    pub organization_id: AggregateId,
}

impl DeleteOrganization {
    pub fn new(organization_id: AggregateId) -> Self {
        Self { organization_id }
    }
}

impl Command for DeleteOrganization {
    type Aggregate = Organization;

    fn name(&self) -> &'static str {
        "delete_organization"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.organization_id
    }

    fn handle(&self, organization: &Organization) -> Result<Vec<OrganizationEvent>, IdentityError> {
        organization.delete(self.organization_id)
    }
}
