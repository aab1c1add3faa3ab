//! Dispatcher wrapper that journals commands and injects faults.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::AggregateId;
use domain::{Aggregate, Command, CommandDispatcher, CommandResult, DomainError};
use thiserror::Error;
use tokio::sync::RwLock;

/// Failure returned in place of a command's real outcome.
#[derive(Debug, Clone, Error)]
#[error("{command} failed: {message}")]
pub struct InjectedFailure {
    pub command: String,
    pub message: String,
}

#[derive(Debug)]
struct Fault {
    /// `None` fails every call.
    remaining: Option<u32>,
    message: String,
}

impl Fault {
    fn trigger(&mut self) -> Option<String> {
        match self.remaining.as_mut() {
            None => Some(self.message.clone()),
            Some(0) => None,
            Some(n) => {
                *n -= 1;
                Some(self.message.clone())
            }
        }
    }
}

#[derive(Debug, Default)]
struct RecordingState {
    journal: Vec<String>,
    faults: HashMap<String, Fault>,
    delays: HashMap<String, Duration>,
    /// Applied after the inner dispatcher returns.
    ack_delays: HashMap<String, Duration>,
}

/// Wraps a dispatcher, recording the name of every command it receives.
///
/// Faults are keyed by command name and checked before the inner
/// dispatcher is called, so a failed command leaves no events behind.
#[derive(Clone)]
pub struct RecordingDispatcher<D> {
    inner: D,
    state: Arc<RwLock<RecordingState>>,
}

impl<D: CommandDispatcher> RecordingDispatcher<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            state: Arc::new(RwLock::new(RecordingState::default())),
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Makes every dispatch of `command` fail.
    pub async fn fail_on(&self, command: &str, message: &str) {
        self.insert_fault(command, None, message).await;
    }

    /// Makes the next `times` dispatches of `command` fail.
    pub async fn fail_times(&self, command: &str, times: u32, message: &str) {
        self.insert_fault(command, Some(times), message).await;
    }

    /// Delays every dispatch of `command` before it runs.
    pub async fn delay_on(&self, command: &str, delay: Duration) {
        self.state
            .write()
            .await
            .delays
            .insert(command.to_string(), delay);
    }

    /// Delays the reply to every dispatch of `command` once the inner
    /// dispatcher has applied it.
    pub async fn delay_reply_on(&self, command: &str, delay: Duration) {
        self.state
            .write()
            .await
            .ack_delays
            .insert(command.to_string(), delay);
    }

    /// Removes every injected fault and delay.
    pub async fn clear_faults(&self) {
        let mut state = self.state.write().await;
        state.faults.clear();
        state.delays.clear();
        state.ack_delays.clear();
    }

    /// Names of every dispatched command, in dispatch order.
    pub async fn journal(&self) -> Vec<String> {
        self.state.read().await.journal.clone()
    }

    /// Journal entries that appear in `names`, in dispatch order.
    pub async fn journal_of(&self, names: &[&str]) -> Vec<String> {
        self.state
            .read()
            .await
            .journal
            .iter()
            .filter(|entry| names.contains(&entry.as_str()))
            .cloned()
            .collect()
    }

    /// Number of times `command` was dispatched.
    pub async fn count(&self, command: &str) -> usize {
        self.state
            .read()
            .await
            .journal
            .iter()
            .filter(|entry| *entry == command)
            .count()
    }

    async fn insert_fault(&self, command: &str, remaining: Option<u32>, message: &str) {
        self.state.write().await.faults.insert(
            command.to_string(),
            Fault {
                remaining,
                message: message.to_string(),
            },
        );
    }
}

#[async_trait]
impl<D: CommandDispatcher> CommandDispatcher for RecordingDispatcher<D> {
    async fn dispatch<C>(&self, command: C) -> Result<CommandResult<C::Aggregate>, DomainError>
    where
        C: Command + 'static,
    {
        let name = command.name();
        let (delay, reply_delay, injected) = {
            let mut state = self.state.write().await;
            state.journal.push(name.to_string());
            let delay = state.delays.get(name).copied();
            let reply_delay = state.ack_delays.get(name).copied();
            let injected = state.faults.get_mut(name).and_then(Fault::trigger);
            (delay, reply_delay, injected)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = injected {
            tracing::debug!(command = name, %message, "injecting command failure");
            return Err(DomainError::rejected(InjectedFailure {
                command: name.to_string(),
                message,
            }));
        }

        let result = self.inner.dispatch(command).await;
        if let Some(delay) = reply_delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn load<A>(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError>
    where
        A: Aggregate + 'static,
    {
        self.inner.load(aggregate_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{CommandBus, CreateUser, DeleteUser, InMemoryEventPublisher, User};
    use event_store::InMemoryEventStore;

    fn recording() -> RecordingDispatcher<CommandBus<InMemoryEventStore, InMemoryEventPublisher>> {
        RecordingDispatcher::new(CommandBus::new(
            InMemoryEventStore::new(),
            InMemoryEventPublisher::new(),
        ))
    }

    #[tokio::test]
    async fn test_journal_records_dispatch_order() {
        let dispatcher = recording();
        let user_id = AggregateId::new();

        dispatcher
            .dispatch(CreateUser::new(user_id, "ada", "ada@example.com"))
            .await
            .unwrap();
        dispatcher.dispatch(DeleteUser::new(user_id)).await.unwrap();

        assert_eq!(dispatcher.journal().await, vec!["create_user", "delete_user"]);
        assert_eq!(dispatcher.count("delete_user").await, 1);
    }

    #[tokio::test]
    async fn test_fail_on_leaves_no_events() {
        let dispatcher = recording();
        dispatcher.fail_on("create_user", "user service down").await;
        let user_id = AggregateId::new();

        let err = dispatcher
            .dispatch(CreateUser::new(user_id, "ada", "ada@example.com"))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Command rejected: create_user failed: user service down"
        );

        let user: Option<User> = dispatcher.load(user_id).await.unwrap();
        assert!(user.is_none());
        assert_eq!(dispatcher.journal().await, vec!["create_user"]);
    }

    #[tokio::test]
    async fn test_delayed_reply_still_applies_command() {
        let dispatcher = recording();
        dispatcher
            .delay_reply_on("create_user", Duration::from_millis(200))
            .await;
        let user_id = AggregateId::new();

        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            dispatcher.dispatch(CreateUser::new(user_id, "ada", "ada@example.com")),
        )
        .await;
        assert!(outcome.is_err());

        let user: Option<User> = dispatcher.load(user_id).await.unwrap();
        assert!(user.is_some());
    }

    #[tokio::test]
    async fn test_fail_times_then_recovers() {
        let dispatcher = recording();
        dispatcher.fail_times("create_user", 1, "flaky").await;
        let user_id = AggregateId::new();

        assert!(
            dispatcher
                .dispatch(CreateUser::new(user_id, "ada", "ada@example.com"))
                .await
                .is_err()
        );
        assert!(
            dispatcher
                .dispatch(CreateUser::new(user_id, "ada", "ada@example.com"))
                .await
                .is_ok()
        );
        assert_eq!(dispatcher.count("create_user").await, 2);
    }
}
