use criterion::{Criterion, criterion_group, criterion_main};
use domain::{CommandBus, InMemoryEventPublisher};
use event_store::InMemoryEventStore;
use saga::{RegistrationRequest, RegistrationService, SagaConfig};

fn service() -> RegistrationService<CommandBus<InMemoryEventStore, InMemoryEventPublisher>> {
    RegistrationService::new(
        CommandBus::new(InMemoryEventStore::new(), InMemoryEventPublisher::new()),
        SagaConfig::default(),
    )
}

fn bench_register_user(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("saga/register_user", |b| {
        b.iter(|| {
            rt.block_on(async {
                let request = RegistrationRequest::new("ada", "ada@example.com", "hash");
                service().register(request).await.unwrap();
            });
        });
    });
}

fn bench_register_with_organization(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("saga/register_with_organization", |b| {
        b.iter(|| {
            rt.block_on(async {
                let request = RegistrationRequest::new("ada", "ada@example.com", "hash")
                    .with_organization("Analytical Engines");
                service().register(request).await.unwrap();
            });
        });
    });
}

fn bench_register_with_compensation(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("saga/register_failing_last_step", |b| {
        b.iter(|| {
            rt.block_on(async {
                let dispatcher = saga::RecordingDispatcher::new(CommandBus::new(
                    InMemoryEventStore::new(),
                    InMemoryEventPublisher::new(),
                ));
                dispatcher.fail_on("add_membership", "bench").await;
                let service = RegistrationService::new(dispatcher, SagaConfig::default());
                let request = RegistrationRequest::new("ada", "ada@example.com", "hash")
                    .with_organization("Analytical Engines");
                assert!(service.register(request).await.is_err());
            });
        });
    });
}

criterion_group!(
    benches,
    bench_register_user,
    bench_register_with_organization,
    bench_register_with_compensation
);
criterion_main!(benches);
