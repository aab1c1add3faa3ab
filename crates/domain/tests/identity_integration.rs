//! Identity entities driven end to end through the command bus.

use common::AggregateId;
use domain::identity::{CredentialStatus, MembershipStatus, UserStatus};
use domain::{
    AddMembership, CommandBus, CommandDispatcher, CreateCredential, CreateOrganization, CreateUser,
    Credential, DeleteCredential, DeleteUser, DomainError, IdentityError, InMemoryEventPublisher,
    Membership, RemoveMembership, Role, User,
};
use event_store::{EventStore, InMemoryEventStore, Version};

fn bus() -> CommandBus<InMemoryEventStore, InMemoryEventPublisher> {
    CommandBus::new(InMemoryEventStore::new(), InMemoryEventPublisher::new())
}

#[tokio::test]
async fn user_with_credential_and_organization() {
    let bus = bus();
    let user_id = AggregateId::new();
    let credential_id = AggregateId::new();
    let organization_id = AggregateId::new();
    let membership_id = AggregateId::new();

    bus.dispatch(CreateUser::new(user_id, "grace", "grace@example.com"))
        .await
        .unwrap();
    bus.dispatch(CreateCredential::new(credential_id, user_id, "hash"))
        .await
        .unwrap();
    bus.dispatch(CreateOrganization::new(organization_id, "Navy", user_id))
        .await
        .unwrap();
    let result = bus
        .dispatch(AddMembership::new(
            membership_id,
            organization_id,
            user_id,
            Role::Owner,
        ))
        .await
        .unwrap();

    assert_eq!(result.new_version, Version::first());
    assert_eq!(result.aggregate.role(), Role::Owner);
    assert_eq!(
        bus.publisher().event_types().await,
        vec![
            "UserCreated",
            "CredentialCreated",
            "OrganizationCreated",
            "MembershipAdded"
        ]
    );

    let user: User = bus.load(user_id).await.unwrap().unwrap();
    assert_eq!(user.username(), "grace");
    assert_eq!(user.status(), UserStatus::Active);
}

#[tokio::test]
async fn compensating_commands_reverse_the_entities() {
    let bus = bus();
    let user_id = AggregateId::new();
    let credential_id = AggregateId::new();
    let membership_id = AggregateId::new();

    bus.dispatch(CreateUser::new(user_id, "linus", "linus@example.com"))
        .await
        .unwrap();
    bus.dispatch(CreateCredential::new(credential_id, user_id, "hash"))
        .await
        .unwrap();
    bus.dispatch(AddMembership::new(
        membership_id,
        AggregateId::new(),
        user_id,
        Role::Member,
    ))
    .await
    .unwrap();

    bus.dispatch(RemoveMembership::new(membership_id))
        .await
        .unwrap();
    bus.dispatch(DeleteCredential::new(credential_id))
        .await
        .unwrap();
    let deleted = bus.dispatch(DeleteUser::new(user_id)).await.unwrap();

    assert_eq!(deleted.aggregate.status(), UserStatus::Deleted);
    assert_eq!(deleted.new_version, Version::new(2));

    let credential: Credential = bus.load(credential_id).await.unwrap().unwrap();
    assert_eq!(credential.status(), CredentialStatus::Revoked);
    let membership: Membership = bus.load(membership_id).await.unwrap().unwrap();
    assert_eq!(membership.status(), MembershipStatus::Removed);

    let stored = bus.store().get_events_for_aggregate(user_id).await.unwrap();
    assert_eq!(
        stored[1].metadata.get("command"),
        Some(&serde_json::json!("delete_user"))
    );
}

#[tokio::test]
async fn duplicate_creation_is_an_identity_error() {
    let bus = bus();
    let user_id = AggregateId::new();
    bus.dispatch(CreateUser::new(user_id, "ken", "ken@example.com"))
        .await
        .unwrap();

    let err = bus
        .dispatch(CreateUser::new(user_id, "ken", "ken@example.com"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DomainError::Identity(IdentityError::AlreadyExists { .. })
    ));
    assert_eq!(bus.store().event_count().await, 1);
}

#[tokio::test]
async fn deleting_unknown_user_is_not_found() {
    let bus = bus();
    let err = bus
        .dispatch(DeleteUser::new(AggregateId::new()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DomainError::Identity(IdentityError::NotFound { .. })
    ));
}

#[tokio::test]
async fn loading_a_user_id_as_credential_is_a_type_mismatch() {
    let bus = bus();
    let user_id = AggregateId::new();
    bus.dispatch(CreateUser::new(user_id, "barbara", "barbara@example.com"))
        .await
        .unwrap();

    let result: Result<Option<Credential>, _> = bus.load(user_id).await;
    assert!(matches!(
        result,
        Err(DomainError::AggregateTypeMismatch { .. })
    ));
}
