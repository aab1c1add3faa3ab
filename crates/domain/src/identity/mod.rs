//! Identity entities created by the registration workflow.
//!
//! Each entity is its own event-sourced aggregate with a create command and
//! the inverse command a saga uses to compensate it.

mod credential;
mod membership;
mod organization;
mod user;

pub use credential::{
    CreateCredential, Credential, CredentialEvent, CredentialStatus, DeleteCredential,
};
pub use membership::{
    AddMembership, Membership, MembershipEvent, MembershipStatus, RemoveMembership, Role,
};
pub use organization::{
    CreateOrganization, DeleteOrganization, Organization, OrganizationEvent, OrganizationStatus,
};
pub use user::{CreateUser, DeleteUser, User, UserEvent, UserStatus};

use common::AggregateId;
use thiserror::Error;

/// Errors raised by identity entities.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The entity already exists.
    #[error("{entity} {id} already exists")]
    AlreadyExists {
        entity: &'static str,
        id: AggregateId,
    },

    /// The entity was never created.
    #[error("{entity} {id} not found")]
    NotFound {
        entity: &'static str,
        id: AggregateId,
    },

    /// The entity was already deleted, revoked or removed.
    #[error("{entity} {id} is no longer active")]
    Inactive {
        entity: &'static str,
        id: AggregateId,
    },

    /// A field failed validation.
    #[error("Invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

fn require_non_blank(field: &'static str, value: &str) -> Result<(), IdentityError> {
    if value.trim().is_empty() {
        return Err(IdentityError::InvalidField {
            field,
            reason: "must not be blank",
        });
    }
    Ok(())
}
