//! Project Database CLI
//!
//! Resolves the database configuration and checks connectivity through a
//! session, the way application code would.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use project_db::{
    config::{DatabaseConfig, SessionConfig},
    context::DbContext,
    db::Base,
    ResultExt,
};

#[derive(Parser)]
#[command(name = "project-db")]
#[command(version, about = "Project database connectivity tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Connection URL (overrides DATABASE_URL)
    #[arg(long, global = true)]
    url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a session and run a SELECT 1 round trip
    Check,

    /// Print the resolved configuration with the password masked
    Config,
}

/// Initialize tracing/logging.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,project_db=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Resolve both configs from the environment. `--url` replaces `DATABASE_URL`
/// but a malformed `DATABASE_*` or `SESSION_*` variable is still an error.
fn load_config(url: Option<String>) -> Result<(DatabaseConfig, SessionConfig)> {
    let mut db_config = DatabaseConfig::from_env().log("loading database config")?;
    if let Some(url) = url {
        db_config.url = url;
    }

    let session_config = SessionConfig::from_env().log("loading session config")?;

    Ok((db_config, session_config))
}

async fn check(db_config: &DatabaseConfig, session_config: &SessionConfig) -> Result<()> {
    let ctx = DbContext::new(db_config, session_config, Base::new())
        .log("building database context")?;

    let mut session = ctx.session();
    session.ping().await.log("session round trip")?;
    session.close().await?;

    tracing::info!(
        url = %ctx.engine.redacted_url(),
        pool_size = ctx.engine.size(),
        idle = ctx.engine.idle(),
        "Database reachable"
    );
    println!("ok");

    ctx.engine.dispose().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let cli = Cli::parse();
    let (db_config, session_config) = load_config(cli.url)?;

    match cli.command {
        Commands::Check => check(&db_config, &session_config).await?,
        Commands::Config => {
            db_config.parsed_url()?;
            let resolved = serde_json::json!({
                "database": db_config.redacted(),
                "session": session_config,
            });
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }
    }

    Ok(())
}
