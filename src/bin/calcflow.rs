//! # Calcflow CLI
//!
//! Command-line front end over the SQLite task store selected by configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use calcflow_core::config::ConfigManager;
use calcflow_core::database::{SqliteTaskStore, TaskStore};
use calcflow_core::events::{CalcEvent, EventPublisher};
use calcflow_core::logging::init_structured_logging;
use calcflow_core::models::Actor;
use calcflow_core::Calculator;

#[derive(Parser)]
#[command(name = "calcflow")]
#[command(about = "Evaluate arithmetic expressions on a simulated worker pool")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// TOML configuration file (defaults to CALCFLOW_CONFIG_PATH, then built-in defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a user
    AddUser {
        name: String,
        #[arg(long)]
        admin: bool,
    },

    /// Submit an expression and wait for its result
    Submit {
        #[arg(short, long)]
        user: i64,
        expression: String,
    },

    /// Resume every task left in processing and wait for them
    Resume,

    /// List a user's tasks
    Tasks {
        #[arg(short, long)]
        user: i64,
    },

    /// Show one task with its audit trail
    Task {
        #[arg(short, long)]
        user: i64,
        id: i64,
    },

    /// Show the delay table (admin only)
    Delays {
        #[arg(short, long)]
        user: i64,
    },

    /// Set the delay of one operator (admin only)
    SetDelay {
        #[arg(short, long)]
        user: i64,
        /// plus, minus, multiplication or division
        operator: String,
        seconds: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();
    let cli = Cli::parse();

    let manager = ConfigManager::load(cli.config.as_deref()).context("loading configuration")?;
    let config = manager.config();
    let store = Arc::new(
        SqliteTaskStore::connect(&config.database.url, config.database.max_connections)
            .await
            .context("opening task store")?,
    );

    if let Commands::AddUser { name, admin } = &cli.command {
        let user = store.create_user(name, *admin).await?;
        println!("{}", serde_json::to_string_pretty(&user)?);
        return Ok(());
    }

    let publisher = EventPublisher::new(config.events.channel_capacity);
    let calculator = Calculator::new(config, store.clone(), Arc::new(publisher.clone())).await?;

    let outcome = run_command(&cli.command, &calculator, store.as_ref(), &publisher).await;
    calculator.shutdown().await;
    store.close().await;
    outcome
}

async fn run_command(
    command: &Commands,
    calculator: &Calculator,
    store: &dyn TaskStore,
    publisher: &EventPublisher,
) -> anyhow::Result<()> {
    match command {
        Commands::AddUser { .. } => Ok(()),
        Commands::Submit { user, expression } => {
            let actor = actor(store, *user).await?;
            let mut events = publisher.subscribe_user(actor.user_id, actor.is_admin);
            let ack = calculator.submit(actor.user_id, expression).await?;
            println!("{}", serde_json::to_string(&ack)?);
            let task_id = ack.id;

            let printer = tokio::spawn(async move {
                while let Some(published) = events.recv().await {
                    if let CalcEvent::TaskProgress(progress) = published.event {
                        if progress.task_id != task_id {
                            continue;
                        }
                        println!(
                            "[{}] task {} done={} result={}",
                            progress.last_ping,
                            progress.task_id,
                            progress.is_done,
                            progress.result.as_deref().unwrap_or("-")
                        );
                        if progress.is_done {
                            break;
                        }
                    }
                }
            });
            let outcome = calculator
                .wait_for_task(task_id)
                .await
                .context("task run was not started")?;
            match outcome {
                Ok(result) => {
                    printer.await?;
                    println!("{result}");
                    Ok(())
                }
                Err(e) => {
                    printer.abort();
                    Err(e.into())
                }
            }
        }
        Commands::Resume => {
            let resumed = calculator.recover_interrupted().await?;
            info!(count = resumed.len(), "waiting for resumed tasks");
            for task_id in resumed {
                match calculator.wait_for_task(task_id).await {
                    Some(Ok(result)) => println!("task {task_id}: {result}"),
                    Some(Err(e)) => println!("task {task_id}: {e}"),
                    None => {}
                }
            }
            Ok(())
        }
        Commands::Tasks { user } => {
            let tasks = calculator.list_tasks(&actor(store, *user).await?).await?;
            println!("{}", serde_json::to_string_pretty(&tasks)?);
            Ok(())
        }
        Commands::Task { user, id } => {
            let detail = calculator.get_task(&actor(store, *user).await?, *id).await?;
            println!("{}", serde_json::to_string_pretty(&detail)?);
            Ok(())
        }
        Commands::Delays { user } => {
            let delays = calculator.delays(&actor(store, *user).await?)?;
            println!("{}", serde_json::to_string_pretty(&delays)?);
            Ok(())
        }
        Commands::SetDelay {
            user,
            operator,
            seconds,
        } => {
            let updates = HashMap::from([(operator.clone(), *seconds)]);
            let delays = calculator
                .update_delays(&actor(store, *user).await?, &updates)
                .await?;
            println!("{}", serde_json::to_string_pretty(&delays)?);
            Ok(())
        }
    }
}

async fn actor(store: &dyn TaskStore, user_id: i64) -> anyhow::Result<Actor> {
    let user = store
        .get_user(user_id)
        .await
        .with_context(|| format!("looking up user {user_id}"))?;
    Ok(Actor::from(&user))
}
