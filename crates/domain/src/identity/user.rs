//! User aggregate.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::command::Command;

use super::{IdentityError, require_non_blank};

const ENTITY: &str = "User";

/// Lifecycle of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UserStatus {
    #[default]
    Active,
    Deleted,
}

/// Events that can occur on a user aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum UserEvent {
    UserCreated {
        user_id: AggregateId,
        username: String,
        email: String,
        created_at: DateTime<Utc>,
    },
    UserDeleted {
        deleted_at: DateTime<Utc>,
    },
}

impl DomainEvent for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::UserCreated { .. } => "UserCreated",
            UserEvent::UserDeleted { .. } => "UserDeleted",
        }
    }
}

/// A registered user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    id: Option<AggregateId>,
    #[serde(default)]
    version: Version,
    username: String,
    email: String,
    status: UserStatus,
    created_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
}

impl Aggregate for User {
    type Event = UserEvent;
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
            UserEvent::UserCreated {
                user_id,
                username,
                email,
                created_at,
            } => {
                self.id = Some(user_id);
                self.username = username;
                self.email = email;
                self.status = UserStatus::Active;
                self.created_at = Some(created_at);
            }
            UserEvent::UserDeleted { deleted_at } => {
                self.status = UserStatus::Deleted;
                self.deleted_at = Some(deleted_at);
            }
        }
    }
}

impl User {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn status(&self) -> UserStatus {
        self.status
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    /// Creates the user.
    pub fn create(
        &self,
        user_id: AggregateId,
        username: &str,
        email: &str,
    ) -> Result<Vec<UserEvent>, IdentityError> {
        if self.id.is_some() {
            return Err(IdentityError::AlreadyExists {
                entity: ENTITY,
                id: user_id,
            });
        }
        require_non_blank("username", username)?;
        if !email.contains('@') {
            return Err(IdentityError::InvalidField {
                field: "email",
                reason: "must contain '@'",
            });
        }

        Ok(vec![UserEvent::UserCreated {
            user_id,
            username: username.trim().to_string(),
            email: email.trim().to_string(),
            created_at: Utc::now(),
        }])
    }

    /// Deletes the user.
    pub fn delete(&self, user_id: AggregateId) -> Result<Vec<UserEvent>, IdentityError> {
        if self.id.is_none() {
            return Err(IdentityError::NotFound {
                entity: ENTITY,
                id: user_id,
            });
        }
        if self.status == UserStatus::Deleted {
            return Err(IdentityError::Inactive {
                entity: ENTITY,
                id: user_id,
            });
        }

        Ok(vec![UserEvent::UserDeleted {
            deleted_at: Utc::now(),
        }])
    }
}

/// Command to create a user.
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub user_id: AggregateId,
    pub username: String,
    pub email: String,
}

impl CreateUser {
    pub fn new(user_id: AggregateId, username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            email: email.into(),
        }
    }
}

impl Command for CreateUser {
    type Aggregate = User;

    fn name(&self) -> &'static str {
        "create_user"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.user_id
    }

    fn handle(&self, user: &User) -> Result<Vec<UserEvent>, IdentityError> {
        user.create(self.user_id, &self.username, &self.email)
    }
}

/// Command to delete a user. Compensates [`CreateUser`].
#[derive(Debug, Clone)]
pub struct DeleteUser {
    pub user_id: AggregateId,
}

impl DeleteUser {
    pub fn new(user_id: AggregateId) -> Self {
        Self { user_id }
    }
}

impl Command for DeleteUser {
    type Aggregate = User;

    fn name(&self) -> &'static str {
        "delete_user"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.user_id
    }

    fn handle(&self, user: &User) -> Result<Vec<UserEvent>, IdentityError> {
        user.delete(self.user_id)
    }
}
