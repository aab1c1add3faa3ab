//! Credential aggregate.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::command::Command;

use super::{IdentityError, require_non_blank};

const ENTITY: &str = "Credential";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CredentialStatus {
    #[default]
    Active,
    Revoked,
}

/// Events that can occur on a credential aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CredentialEvent {
    CredentialCreated {
        credential_id: AggregateId,
        user_id: AggregateId,
        secret_hash: String,
        created_at: DateTime<Utc>,
    },
    CredentialRevoked {
        revoked_at: DateTime<Utc>,
    },
}

impl DomainEvent for CredentialEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CredentialEvent::CredentialCreated { .. } => "CredentialCreated",
            CredentialEvent::CredentialRevoked { .. } => "CredentialRevoked",
        }
    }
}

/// A login secret owned by a user.
///
/// Only a hash is ever stored; producing it is the caller's concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credential {
    id: Option<AggregateId>,
    #[serde(default)]
    version: Version,
    user_id: Option<AggregateId>,
    secret_hash: String,
    status: CredentialStatus,
    revoked_at: Option<DateTime<Utc>>,
}

impl Aggregate for Credential {
    type Event = CredentialEvent;
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
            CredentialEvent::CredentialCreated {
                credential_id,
                user_id,
                secret_hash,
                ..
            } => {
                self.id = Some(credential_id);
                self.user_id = Some(user_id);
                self.secret_hash = secret_hash;
                self.status = CredentialStatus::Active;
            }
            CredentialEvent::CredentialRevoked { revoked_at } => {
                self.status = CredentialStatus::Revoked;
                self.revoked_at = Some(revoked_at);
            }
        }
    }
}

impl Credential {
    pub fn user_id(&self) -> Option<AggregateId> {
        self.user_id
    }

    pub fn secret_hash(&self) -> &str {
        &self.secret_hash
    }

    pub fn status(&self) -> CredentialStatus {
        self.status
    }

    pub fn revoked_at(&self) -> Option<DateTime<Utc>> {
        self.revoked_at
    }

    pub fn create(
        &self,
        credential_id: AggregateId,
        user_id: AggregateId,
        secret_hash: &str,
    ) -> Result<Vec<CredentialEvent>, IdentityError> {
        if self.id.is_some() {
            return Err(IdentityError::AlreadyExists {
                entity: ENTITY,
                id: credential_id,
            });
        }
        require_non_blank("secret_hash", secret_hash)?;

        Ok(vec![CredentialEvent::CredentialCreated {
            credential_id,
            user_id,
            secret_hash: secret_hash.to_string(),
            created_at: Utc::now(),
        }])
    }

    pub fn revoke(&self, credential_id: AggregateId) -> Result<Vec<CredentialEvent>, IdentityError> {
        if self.id.is_none() {
            return Err(IdentityError::NotFound {
                entity: ENTITY,
                id: credential_id,
            });
        }
        if self.status == CredentialStatus::Revoked {
            return Err(IdentityError::Inactive {
                entity: ENTITY,
                id: credential_id,
            });
        }

        Ok(vec![CredentialEvent::CredentialRevoked {
            revoked_at: Utc::now(),
        }])
    }
}

/// Command to create a credential for a user.
#[derive(Debug, Clone)]
pub struct CreateCredential {
    pub credential_id: AggregateId,
    pub user_id: AggregateId,
    pub secret_hash: String,
}

impl CreateCredential {
    pub fn new(
        credential_id: AggregateId,
        user_id: AggregateId,
        secret_hash: impl Into<String>,
    ) -> Self {
        Self {
            credential_id,
            user_id,
            secret_hash: secret_hash.into(),
        }
    }
}

impl Command for CreateCredential {
    type Aggregate = Credential;

    fn name(&self) -> &'static str {
        "create_credential"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.credential_id
    }

    fn handle(&self, credential: &Credential) -> Result<Vec<CredentialEvent>, IdentityError> {
        credential.create(self.credential_id, self.user_id, &self.secret_hash)
    }
}

/// Command to revoke a credential. Compensates [`CreateCredential`].
#[derive(Debug, Clone)]
pub struct DeleteCredential {
    pub credential_id: AggregateId,
}

impl DeleteCredential {
    pub fn new(credential_id: AggregateId) -> Self {
        Self { credential_id }
    }
}

impl Command for DeleteCredential {
    type Aggregate = Credential;

    fn name(&self) -> &'static str {
        "delete_credential"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.credential_id
    }

    fn handle(&self, credential: &Credential) -> Result<Vec<CredentialEvent>, IdentityError> {
        credential.revoke(self.credential_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_revoke() {
        let id = AggregateId::new();
        let user_id = AggregateId::new();
        let mut credential = Credential::default();

        credential.apply_events(credential.create(id, user_id, "$argon2id$hash").unwrap());
        assert_eq!(credential.user_id(), Some(user_id));
        assert_eq!(credential.secret_hash(), "$argon2id$hash");
        assert_eq!(credential.status(), CredentialStatus::Active);

        credential.apply_events(credential.revoke(id).unwrap());
        assert_eq!(credential.status(), CredentialStatus::Revoked);
        assert!(credential.revoked_at().is_some());
        assert!(matches!(
            credential.revoke(id),
            Err(IdentityError::Inactive { .. })
        ));
    }

    #[test]
    fn blank_secret_is_rejected() {
        let result = Credential::default().create(AggregateId::new(), AggregateId::new(), " ");
        assert!(matches!(
            result,
            Err(IdentityError::InvalidField {
                field: "secret_hash",
                ..
            })
        ));
    }

    #[test]
    fn revoking_unknown_credential_is_not_found() {
        assert!(matches!(
            Credential::default().revoke(AggregateId::new()),
            Err(IdentityError::NotFound { .. })
        ));
    }
}
