//! Saga runner entry point.

use std::io::Read;
use std::process::ExitCode;

use clap::Parser;
use domain::TracingEventPublisher;
use event_store::{InMemoryEventStore, PostgresEventStore};
use runner::config::Config;
use runner::error::RunnerError;
use runner::{Cli, Runner, RunnerCommand};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> ExitCode {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    runner::init_tracing(&config);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match &err {
                RunnerError::Usage(usage) => {
                    let _ = usage.print();
                }
                other => eprintln!("error: {other}"),
            }
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run(config: Config) -> Result<(), RunnerError> {
    // 2. Parse the command line
    let command = Cli::try_parse()?.command;

    let mut input = String::new();
    if command == RunnerCommand::Register {
        std::io::stdin().read_to_string(&mut input)?;
    }

    // 3. Pick the event store and execute
    let mut stdout = std::io::stdout();
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(url)
                .await?;
            let store = PostgresEventStore::new(pool);
            store.run_migrations().await?;
            tracing::info!(max_connections = config.max_connections, "using postgres event store");

            Runner::new(store, TracingEventPublisher, config.saga)
                .execute(command, &input, &mut stdout)
                .await
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory event store");
            Runner::new(InMemoryEventStore::new(), TracingEventPublisher, config.saga)
                .execute(command, &input, &mut stdout)
                .await
        }
    }
}
