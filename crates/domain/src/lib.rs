//! Domain layer for the saga workspace.
//!
//! This crate provides:
//! - `Aggregate`/`DomainEvent` traits and the `EventSourced` pending buffer
//! - the `Command` trait and the `CommandDispatcher` every saga action goes through
//! - the `EventPublisher` that receives committed events
//! - the identity entities the registration saga creates and compensates

pub mod aggregate;
pub mod command;
pub mod error;
pub mod identity;
pub mod publisher;

pub use aggregate::{Aggregate, DomainEvent, EventSourced};
pub use command::{Command, CommandBus, CommandDispatcher, CommandResult};
pub use error::DomainError;
pub use identity::{
    AddMembership, CreateCredential, CreateOrganization, CreateUser, Credential, DeleteCredential,
    DeleteOrganization, DeleteUser, IdentityError, Membership, Organization, RemoveMembership, Role,
    User,
};
pub use publisher::{EventPublisher, InMemoryEventPublisher, TracingEventPublisher};
