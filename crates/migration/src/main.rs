use anyhow::Context;
use clap::{Parser, Subcommand};
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::prelude::*;

use classvibes_migration::Migrator;

/// Schema migrations for the ClassVibes database
#[derive(Parser)]
#[command(name = "classvibes-migration", version)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending migrations
    Up {
        #[arg(long)]
        steps: Option<u32>,
    },
    /// Roll back applied migrations
    Down {
        #[arg(long)]
        steps: Option<u32>,
    },
    /// Roll everything back, then apply again
    Fresh,
    /// List applied and pending migrations
    Status,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let db = connect(&cli.database_url).await?;

    match cli.command {
        Command::Up { steps } => {
            println!("Running migrations up...");
            Migrator::up(&db, steps).await?;
            println!("Completed migrations up.");
        }
        Command::Down { steps } => {
            println!("Running migrations down...");
            Migrator::down(&db, steps).await?;
            println!("Completed migrations down.");
        }
        Command::Fresh => {
            println!("Refreshing database (down then up)...");
            Migrator::down(&db, None).await?;
            Migrator::up(&db, None).await?;
            println!("Database refresh completed.");
        }
        Command::Status => {
            println!("Migration Status:");
            for migration in Migrator::get_applied_migrations(&db).await? {
                println!("{}: Applied", migration.name());
            }
            for migration in Migrator::get_pending_migrations(&db).await? {
                println!("{}: Pending", migration.name());
            }
        }
    }

    Ok(())
}

async fn connect(database_url: &str) -> anyhow::Result<DatabaseConnection> {
    Database::connect(database_url)
        .await
        .context("failed to connect to the database")
}
