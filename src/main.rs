//! # CMS Main Entry Point
//!
//! Runs the API server by default; `migrate` and `seed-admin` are one-shot
//! maintenance commands against the configured database.

use clap::{Parser, Subcommand};

use cms::{config::ConfigLoader, db, seeds, server::run_server, telemetry};

#[derive(Parser)]
#[command(name = "cms", version, about = "Multi-tenant CMS backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Apply migrations, ensure the admin account and serve the API.
    Serve,
    /// Apply pending database migrations and exit.
    Migrate,
    /// Create or reset the SUPER_ADMIN account from CMS_ADMIN_EMAIL and CMS_ADMIN_PASSWORD.
    SeedAdmin,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Layered env files, then CMS_* variables
    let config = ConfigLoader::new().load()?;
    telemetry::init_tracing(&config)?;
    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted) = config.redacted_json() {
        tracing::debug!(config = %redacted, "Effective configuration");
    }

    let db = db::init_pool(&config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            db::run_migrations(&db).await?;
            seeds::seed_super_admin(&db, &config).await?;
            run_server(config, db).await
        }
        Command::Migrate => db::run_migrations(&db).await,
        Command::SeedAdmin => {
            if seeds::seed_super_admin(&db, &config).await?.is_none() {
                anyhow::bail!("CMS_ADMIN_EMAIL and CMS_ADMIN_PASSWORD must both be set");
            }
            Ok(())
        }
    }
}
