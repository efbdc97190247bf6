use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

mod app;
mod auth;
mod config;
mod db;
mod error;
mod extract;
mod images;
mod recipes;
mod state;
mod storage;
mod store;
#[cfg(test)]
mod testing;

use crate::config::AppConfig;
use crate::state::AppState;
use crate::store::PgStore;

#[derive(Parser)]
#[command(name = "recipebook", version, about = "Recipe book API server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Block until the database accepts connections
    WaitForDb {
        #[arg(long, default_value_t = 1)]
        interval_secs: u64,
    },
    /// Create an account with staff and superuser flags
    CreateSuperuser {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SUPERUSER_PASSWORD")]
        password: String,
        #[arg(long, default_value = "")]
        name: String,
    },
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "recipebook=debug,axum=info,tower_http=info".to_string());
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
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let config = AppConfig::from_env()?;
            let (host, port) = (config.host.clone(), config.port);
            let state = AppState::init(config).await?;
            app::serve(app::build_app(state), &host, port).await
        }
        Command::WaitForDb { interval_secs } => {
            let url = config::database_url()?;
            db::wait_for_db(&url, Duration::from_secs(interval_secs)).await
        }
        Command::CreateSuperuser {
            email,
            password,
            name,
        } => {
            let store = PgStore::connect(&config::database_url()?).await?;
            store.migrate().await?;
            let user = auth::services::create_superuser(&store, &email, &password, &name)
                .await
                .map_err(|e| anyhow::anyhow!("{e:?}"))
                .context("create superuser")?;
            tracing::info!(user_id = %user.id, email = %user.email, "superuser created");
            println!("Superuser {} created.", user.email);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_to_serve() {
        let cli = Cli::try_parse_from(["recipebook"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn wait_for_db_interval_defaults_to_one_second() {
        let cli = Cli::try_parse_from(["recipebook", "wait-for-db"]).unwrap();
        assert!(matches!(cli.command, Some(Command::WaitForDb { interval_secs: 1 })));
    }

    #[test]
    fn create_superuser_takes_flags() {
        let cli = Cli::try_parse_from([
            "recipebook",
            "create-superuser",
            "--email",
            "admin@example.com",
            "--password",
            "secret123",
        ])
        .unwrap();
        match cli.command {
            Some(Command::CreateSuperuser { email, name, .. }) => {
                assert_eq!(email, "admin@example.com");
                assert_eq!(name, "");
            }
            _ => panic!("expected create-superuser"),
        }
    }
}
