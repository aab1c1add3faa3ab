//! Registration saga: user, credential and, optionally, an organization the
//! user owns.

use async_trait::async_trait;
use common::AggregateId;
use domain::{
    AddMembership, Aggregate, CommandDispatcher, CommandResult, CreateCredential,
    CreateOrganization, CreateUser, DeleteCredential, DeleteOrganization, DeleteUser, DomainError,
    RemoveMembership, Role,
};
use serde::{Deserialize, Serialize};

use crate::config::SagaConfig;
use crate::definition::{SagaAction, StepDefinition, Workflow};
use crate::error::SagaError;
use crate::orchestrator::{SagaOrchestrator, SagaReport};

/// The saga type identifier for registration.
pub const SAGA_TYPE: &str = "registration";

/// Step name: Create the user account.
pub const STEP_CREATE_USER: &str = "create_user";

/// Step name: Store the user's credential.
pub const STEP_CREATE_CREDENTIAL: &str = "create_credential";

/// Step name: Create the organization.
pub const STEP_CREATE_ORGANIZATION: &str = "create_organization";

/// Step name: Make the user the organization's owner.
pub const STEP_ADD_MEMBERSHIP: &str = "add_membership";

/// Input to a registration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub username: String,
    pub email: String,
    /// Already-hashed secret. Never written to step payloads.
    pub secret_hash: String,
    #[serde(default)]
    pub organization_name: Option<String>,
}

impl RegistrationRequest {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        secret_hash: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            secret_hash: secret_hash.into(),
            organization_name: None,
        }
    }

    pub fn with_organization(mut self, name: impl Into<String>) -> Self {
        self.organization_name = Some(name.into());
        self
    }

    /// True when an organization name is given and not blank.
    pub fn wants_organization(&self) -> bool {
        self.organization_name
            .as_deref()
            .is_some_and(|name| !name.trim().is_empty())
    }
}

/// Entity ids assigned when a registration is planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationIds {
    pub user_id: AggregateId,
    pub credential_id: AggregateId,
    pub organization_id: AggregateId,
    pub membership_id: AggregateId,
}

impl RegistrationIds {
    pub fn generate() -> Self {
        Self {
            user_id: AggregateId::new(),
            credential_id: AggregateId::new(),
            organization_id: AggregateId::new(),
            membership_id: AggregateId::new(),
        }
    }
}

/// Forward and compensating actions of the registration saga.
#[derive(Debug, Clone)]
pub enum RegistrationAction {
    CreateUser(CreateUser),
    DeleteUser(DeleteUser),
    CreateCredential(CreateCredential),
    DeleteCredential(DeleteCredential),
    CreateOrganization(CreateOrganization),
    DeleteOrganization(DeleteOrganization),
    AddMembership(AddMembership),
    RemoveMembership(RemoveMembership),
}

#[async_trait]
impl SagaAction for RegistrationAction {
    fn name(&self) -> &'static str {
        use domain::Command;

        match self {
            RegistrationAction::CreateUser(c) => c.name(),
            RegistrationAction::DeleteUser(c) => c.name(),
            RegistrationAction::CreateCredential(c) => c.name(),
            RegistrationAction::DeleteCredential(c) => c.name(),
            RegistrationAction::CreateOrganization(c) => c.name(),
            RegistrationAction::DeleteOrganization(c) => c.name(),
            RegistrationAction::AddMembership(c) => c.name(),
            RegistrationAction::RemoveMembership(c) => c.name(),
        }
    }

    async fn perform<D>(&self, dispatcher: &D) -> Result<serde_json::Value, DomainError>
    where
        D: CommandDispatcher,
    {
        let summary = match self {
            RegistrationAction::CreateUser(c) => summarize(dispatcher.dispatch(c.clone()).await?),
            RegistrationAction::DeleteUser(c) => summarize(dispatcher.dispatch(c.clone()).await?),
            RegistrationAction::CreateCredential(c) => {
                summarize(dispatcher.dispatch(c.clone()).await?)
            }
            RegistrationAction::DeleteCredential(c) => {
                summarize(dispatcher.dispatch(c.clone()).await?)
            }
            RegistrationAction::CreateOrganization(c) => {
                summarize(dispatcher.dispatch(c.clone()).await?)
            }
            RegistrationAction::DeleteOrganization(c) => {
                summarize(dispatcher.dispatch(c.clone()).await?)
            }
            RegistrationAction::AddMembership(c) => {
                summarize(dispatcher.dispatch(c.clone()).await?)
            }
            RegistrationAction::RemoveMembership(c) => {
                summarize(dispatcher.dispatch(c.clone()).await?)
            }
        };
        Ok(summary)
    }
}

/// Step result: the entity id and its version, never the entity itself.
fn summarize<A: Aggregate>(result: CommandResult<A>) -> serde_json::Value {
    serde_json::json!({
        "id": result.aggregate.id(),
        "version": result.new_version,
    })
}

/// One planned registration.
#[derive(Debug, Clone)]
pub struct RegistrationWorkflow {
    request: RegistrationRequest,
    ids: RegistrationIds,
}

impl RegistrationWorkflow {
    pub fn new(request: RegistrationRequest) -> Self {
        Self {
            request,
            ids: RegistrationIds::generate(),
        }
    }

    pub fn ids(&self) -> RegistrationIds {
        self.ids
    }

    pub fn request(&self) -> &RegistrationRequest {
        &self.request
    }
}

impl Workflow for RegistrationWorkflow {
    type Action = RegistrationAction;

    fn saga_type(&self) -> &'static str {
        SAGA_TYPE
    }

    fn plan(&self) -> Vec<StepDefinition<RegistrationAction>> {
        let ids = self.ids;
        let request = &self.request;
        let with_organization = request.wants_organization();
        let organization_name = request.organization_name.clone().unwrap_or_default();

        vec![
            StepDefinition::new(
                STEP_CREATE_USER,
                RegistrationAction::CreateUser(CreateUser::new(
                    ids.user_id,
                    request.username.clone(),
                    request.email.clone(),
                )),
            )
            .compensate_with(RegistrationAction::DeleteUser(DeleteUser::new(ids.user_id)))
            .with_payload(serde_json::json!({
                "user_id": ids.user_id,
                "username": request.username,
                "email": request.email,
            })),
            StepDefinition::new(
                STEP_CREATE_CREDENTIAL,
                RegistrationAction::CreateCredential(CreateCredential::new(
                    ids.credential_id,
                    ids.user_id,
                    request.secret_hash.clone(),
                )),
            )
            .compensate_with(RegistrationAction::DeleteCredential(DeleteCredential::new(
                ids.credential_id,
            )))
            .with_payload(serde_json::json!({
                "credential_id": ids.credential_id,
                "user_id": ids.user_id,
            })),
            StepDefinition::new(
                STEP_CREATE_ORGANIZATION,
                RegistrationAction::CreateOrganization(CreateOrganization::new(
                    ids.organization_id,
                    organization_name.clone(),
                    ids.user_id,
                )),
            )
            .compensate_with(RegistrationAction::DeleteOrganization(
                DeleteOrganization::new(ids.organization_id),
            ))
            .with_payload(serde_json::json!({
                "organization_id": ids.organization_id,
                "name": organization_name,
                "owner_id": ids.user_id,
            }))
            .when(with_organization),
            StepDefinition::new(
                STEP_ADD_MEMBERSHIP,
                RegistrationAction::AddMembership(AddMembership::new(
                    ids.membership_id,
                    ids.organization_id,
                    ids.user_id,
                    Role::Owner,
                )),
            )
            .compensate_with(RegistrationAction::RemoveMembership(RemoveMembership::new(
                ids.membership_id,
            )))
            .with_payload(serde_json::json!({
                "membership_id": ids.membership_id,
                "organization_id": ids.organization_id,
                "user_id": ids.user_id,
                "role": Role::Owner,
            }))
            .when(with_organization),
        ]
    }
}

/// Outcome of a successful registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub saga_id: AggregateId,
    pub user_id: AggregateId,
    pub credential_id: AggregateId,
    pub organization_id: Option<AggregateId>,
    pub membership_id: Option<AggregateId>,
    pub report: SagaReport,
}

/// Runs registration sagas.
pub struct RegistrationService<D> {
    orchestrator: SagaOrchestrator<D>,
}

impl<D: CommandDispatcher> RegistrationService<D> {
    pub fn new(dispatcher: D, config: SagaConfig) -> Self {
        Self {
            orchestrator: SagaOrchestrator::new(dispatcher, config),
        }
    }

    pub fn orchestrator(&self) -> &SagaOrchestrator<D> {
        &self.orchestrator
    }

    /// Registers a user, and an owned organization when one is requested.
    ///
    /// On failure every entity created so far has been compensated and the
    /// error is the one raised by the failing step.
    #[tracing::instrument(skip(self, request), fields(username = %request.username))]
    pub async fn register(&self, request: RegistrationRequest) -> Result<Registration, SagaError> {
        let with_organization = request.wants_organization();
        let workflow = RegistrationWorkflow::new(request);
        let ids = workflow.ids();

        let report = self.orchestrator.run(&workflow).await?;
        tracing::info!(saga_id = %report.saga_id, user_id = %ids.user_id, "registration completed");

        Ok(Registration {
            saga_id: report.saga_id,
            user_id: ids.user_id,
            credential_id: ids.credential_id,
            organization_id: with_organization.then_some(ids.organization_id),
            membership_id: with_organization.then_some(ids.membership_id),
            report,
        })
    }
}
