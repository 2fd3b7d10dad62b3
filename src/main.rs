use clap::{Parser, Subcommand};

use authlink::{config::AppConfig, db::Database, timestamps, PgAdapter};

/// Operator tooling for the authentication storage schema
#[derive(Parser, Debug)]
#[command(name = "authlink")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending schema migrations
    Migrate,

    /// Delete sessions and verification tokens that have expired
    PurgeExpired,

    /// Validate configuration and database connectivity, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "authlink=debug,sqlx=warn".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();

    // Missing OAuth credentials or database settings stop the process here.
    let config = AppConfig::from_env()?;
    let db = Database::connect(&config).await?;

    let result = run(cli.command, &config, &db).await;
    db.close().await;
    result
}

async fn run(command: Command, config: &AppConfig, db: &Database) -> anyhow::Result<()> {
    match command {
        Command::Migrate => db.migrate().await,
        Command::PurgeExpired => {
            let report = PgAdapter::new(db).purge_expired(timestamps::now()).await?;
            tracing::info!(
                sessions = report.sessions,
                verification_tokens = report.verification_tokens,
                "purge finished"
            );
            Ok(())
        }
        Command::CheckConfig => {
            sqlx::query("SELECT 1").execute(db.pool()).await?;
            for creds in &config.providers {
                tracing::info!(provider = %creds.provider, client_id = %creds.client_id, "provider configured");
            }
            tracing::info!("configuration ok");
            Ok(())
        }
    }
}
