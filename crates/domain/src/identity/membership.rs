//! Membership aggregate linking a user to an organization.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::command::Command;

use super::IdentityError;

const ENTITY: &str = "Membership";

/// Role a member holds in an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    #[default]
    Member,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MembershipStatus {
    #[default]
    Active,
    Removed,
}

/// Events that can occur on a membership aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MembershipEvent {
    MembershipAdded {
        membership_id: AggregateId,
        organization_id: AggregateId,
        user_id: AggregateId,
        role: Role,
        added_at: DateTime<Utc>,
    },
    MembershipRemoved {
        removed_at: DateTime<Utc>,
    },
}

impl DomainEvent for MembershipEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MembershipEvent::MembershipAdded { .. } => "MembershipAdded",
            MembershipEvent::MembershipRemoved { .. } => "MembershipRemoved",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Membership {
    id: Option<AggregateId>,
    #[serde(default)]
    version: Version,
    organization_id: Option<AggregateId>,
    user_id: Option<AggregateId>,
    role: Role,
    status: MembershipStatus,
}

impl Aggregate for Membership {
    type Event = MembershipEvent;
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
            MembershipEvent::MembershipAdded {
                membership_id,
                organization_id,
                user_id,
                role,
                ..
            } => {
                self.id = Some(membership_id);
                self.organization_id = Some(organization_id);
                self.user_id = Some(user_id);
                self.role = role;
                self.status = MembershipStatus::Active;
            }
            MembershipEvent::MembershipRemoved { .. } => {
                self.status = MembershipStatus::Removed;
            }
        }
    }
}

impl Membership {
    pub fn organization_id(&self) -> Option<AggregateId> {
        self.organization_id
    }

    pub fn user_id(&self) -> Option<AggregateId> {
        self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn status(&self) -> MembershipStatus {
        self.status
    }

    pub fn add(
        &self,
        membership_id: AggregateId,
        organization_id: AggregateId,
        user_id: AggregateId,
        role: Role,
    ) -> Result<Vec<MembershipEvent>, IdentityError> {
        if self.id.is_some() {
            return Err(IdentityError::AlreadyExists {
                entity: ENTITY,
                id: membership_id,
            });
        }

        Ok(vec![MembershipEvent::MembershipAdded {
            membership_id,
            organization_id,
            user_id,
            role,
            added_at: Utc::now(),
        }])
    }

    pub fn remove(&self, membership_id: AggregateId) -> Result<Vec<MembershipEvent>, IdentityError> {
        if self.id.is_none() {
            return Err(IdentityError::NotFound {
                entity: ENTITY,
                id: membership_id,
            });
        }
        if self.status == MembershipStatus::Removed {
            return Err(IdentityError::Inactive {
                entity: ENTITY,
                id: membership_id,
            });
        }

        Ok(vec![MembershipEvent::MembershipRemoved {
            removed_at: Utc::now(),
        }])
    }
}

/// Command to add a user to an organization.
#[derive(Debug, Clone)]
pub struct AddMembership {
    pub membership_id: AggregateId,
    pub organization_id: AggregateId,
    pub user_id: AggregateId,
    pub role: Role,
}

impl AddMembership {
    pub fn new(
        membership_id: AggregateId,
        organization_id: AggregateId,
        user_id: AggregateId,
        role: Role,
    ) -> Self {
        Self {
            membership_id,
            organization_id,
            user_id,
            role,
        }
    }
}

impl Command for AddMembership {
    type Aggregate = Membership;

    fn name(&self) -> &'static str {
        "add_membership"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.membership_id
    }

    fn handle(&self, membership: &Membership) -> Result<Vec<MembershipEvent>, IdentityError> {
        membership.add(
            self.membership_id,
            self.organization_id,
            self.user_id,
            self.role,
        )
    }
}

/// Command to remove a membership. Compensates [`AddMembership`].
#[derive(Debug, Clone)]
pub struct RemoveMembership {
    pub membership_id: AggregateId,
}

impl RemoveMembership {
    pub fn new(membership_id: AggregateId) -> Self {
        Self { membership_id }
    }
}

impl Command for RemoveMembership {
    type Aggregate = Membership;

    fn name(&self) -> &'static str {
        "remove_membership"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.membership_id
    }

    fn handle(&self, membership: &Membership) -> Result<Vec<MembershipEvent>, IdentityError> {
        membership.remove(self.membership_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_remove_owner() {
        let id = AggregateId::new();
        let org = AggregateId::new();
        let user = AggregateId::new();
        let mut membership = Membership::default();

        membership.apply_events(membership.add(id, org, user, Role::Owner).unwrap());
        assert_eq!(membership.role(), Role::Owner);
        assert_eq!(membership.organization_id(), Some(org));
        assert_eq!(membership.user_id(), Some(user));

        membership.apply_events(membership.remove(id).unwrap());
        assert_eq!(membership.status(), MembershipStatus::Removed);
        assert!(matches!(
            membership.remove(id),
            Err(IdentityError::Inactive { .. })
        ));
    }

    #[test]
    fn role_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Role::Owner).unwrap(), "\"owner\"");
    }
}
