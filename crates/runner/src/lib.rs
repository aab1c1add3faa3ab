//! Command-line runner for registration sagas.

pub mod config;
pub mod error;

use std::io::Write;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use common::AggregateId;
use domain::{CommandBus, EventPublisher};
use event_store::EventStore;
use saga::{RegistrationRequest, RegistrationService, SagaConfig, SagaInstanceEvent};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, LogFormat};
use crate::error::RunnerError;

/// Installs the global tracing subscriber.
///
/// Filter directives come from the configured log level, falling back to
/// `info` when they do not parse.
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[derive(Debug, Parser)]
#[command(name = "saga-runner")]
#[command(about = "Run and inspect registration sagas", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: RunnerCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum RunnerCommand {
    /// Run a registration saga for the JSON request read from stdin
    Register,
    /// Print the persisted report of one saga
    Show { saga_id: AggregateId },
    /// List every saga that was ever created
    List,
}

/// One line of `saga-runner list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SagaSummary {
    pub saga_id: AggregateId,
    pub saga_type: String,
    pub created_at: DateTime<Utc>,
}

/// Executes runner commands against one event store.
pub struct Runner<S, P> {
    store: S,
    service: RegistrationService<CommandBus<S, P>>,
}

impl<S, P> Runner<S, P>
where
    S: EventStore + Clone,
    P: EventPublisher,
{
    pub fn new(store: S, publisher: P, config: SagaConfig) -> Self {
        let bus = CommandBus::new(store.clone(), publisher);
        Self {
            store,
            service: RegistrationService::new(bus, config),
        }
    }

    pub fn service(&self) -> &RegistrationService<CommandBus<S, P>> {
        &self.service
    }

    /// Runs `command`, writing its JSON output to `out`.
    ///
    /// A failed registration still writes the persisted saga report before
    /// the error is returned.
    pub async fn execute<W: Write>(
        &self,
        command: RunnerCommand,
        input: &str,
        out: &mut W,
    ) -> Result<(), RunnerError> {
        match command {
            RunnerCommand::Register => {
                let request: RegistrationRequest =
                    serde_json::from_str(input).map_err(RunnerError::InvalidRequest)?;
                match self.service.register(request).await {
                    Ok(registration) => write_json(out, &registration),
                    Err(err) => {
                        if let Some(saga_id) = err.saga_id()
                            && let Ok(report) = self.service.orchestrator().inspect(saga_id).await
                        {
                            write_json(out, &report)?;
                        }
                        Err(err.into())
                    }
                }
            }
            RunnerCommand::Show { saga_id } => {
                let report = self.service.orchestrator().inspect(saga_id).await?;
                write_json(out, &report)
            }
            RunnerCommand::List => {
                let sagas = self.list().await?;
                write_json(out, &sagas)
            }
        }
    }

    /// Every saga instance in creation order.
    pub async fn list(&self) -> Result<Vec<SagaSummary>, RunnerError> {
        let envelopes = self.store.get_events_by_type("SagaCreated").await?;

        let mut sagas = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            let event: SagaInstanceEvent =
                serde_json::from_value(envelope.payload).map_err(RunnerError::Serialization)?;
            if let SagaInstanceEvent::SagaCreated(data) = event {
                sagas.push(SagaSummary {
                    saga_id: data.saga_id,
                    saga_type: data.saga_type,
                    created_at: data.created_at,
                });
            }
        }
        Ok(sagas)
    }
}

fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<(), RunnerError> {
    serde_json::to_writer_pretty(&mut *out, value).map_err(RunnerError::Serialization)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<RunnerCommand, RunnerError> {
        let cli = Cli::try_parse_from(std::iter::once("saga-runner").chain(args.iter().copied()))?;
        Ok(cli.command)
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse(&["register"]).unwrap(), RunnerCommand::Register);
        assert_eq!(parse(&["list"]).unwrap(), RunnerCommand::List);

        let saga_id = AggregateId::new();
        assert_eq!(
            parse(&["show", &saga_id.to_string()]).unwrap(),
            RunnerCommand::Show { saga_id }
        );
    }

    #[test]
    fn test_parse_rejects_bad_invocations() {
        let invocations: [&[&str]; 5] = [
            &[],
            &["deploy"],
            &["show"],
            &["show", "nope"],
            &["list", "extra"],
        ];
        for bad in invocations {
            let err = parse(bad).unwrap_err();
            assert!(err.is_usage(), "{bad:?} should be a usage error");
            assert_eq!(err.exit_code(), 2, "{bad:?}");
        }
    }

    #[test]
    fn test_help_exits_cleanly() {
        let err = parse(&["--help"]).unwrap_err();
        assert!(err.is_usage());
        assert_eq!(err.exit_code(), 0);
    }
}
