//! Sitecon CLI - Account administration
//!
//! Usage:
//!   sitecon user create --username alice --name Alice --password ...
//!   sitecon user list
//!   sitecon user update <id> --name "Alice B."
//!   sitecon user delete <id>
//!   sitecon auth login --username alice --password ...
//!   sitecon auth refresh <refresh-token>

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sitecon_auth::{AuthState, CreateUserInput, UpdateUserInput};
use sitecon_core::{telemetry, AppConfig, PgUserRepository, RedisRefreshTokenStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "sitecon")]
#[command(about = "Sitecon account administration CLI")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(long, short, env = "SITECON_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage user accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Issue and revoke session tokens
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Register a new user
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        name: String,
        #[arg(long, env = "SITECON_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Show a user by ID
    Get { id: Uuid },
    /// Show a user by username
    Find { username: String },
    /// List all users
    List,
    /// Change selected fields of a user
    Update {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// Delete a user and revoke its session
    Delete { id: Uuid },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Log in and print a token pair
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "SITECON_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Exchange a refresh token for a new pair
    Refresh { token: String },
    /// Revoke a user's refresh token
    Logout { user_id: Uuid },
    /// Print the user an access token belongs to
    Whoami { token: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    telemetry::init_tracing(&config.logging)?;
    config.validate().context("Invalid configuration")?;

    let state = connect(&config).await?;
    let timeout = config.command_timeout();

    tokio::select! {
        result = tokio::time::timeout(timeout, run(&state, cli.command)) => {
            result.map_err(|_| anyhow::anyhow!("Command timed out after {}s", timeout.as_secs()))?
        }
        _ = shutdown_signal() => {
            tracing::warn!("Interrupted, command abandoned");
            anyhow::bail!("Interrupted")
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

async fn connect(config: &AppConfig) -> anyhow::Result<AuthState> {
    let users = PgUserRepository::connect(
        &config.database.postgres_url,
        config.database.postgres_pool_size,
    )
    .await
    .context("Failed to connect to PostgreSQL")?;

    let sessions = RedisRefreshTokenStore::connect(&config.database.redis_url)
        .await
        .context("Failed to connect to Redis")?;

    let state = AuthState::new(config, Arc::new(users), Arc::new(sessions))
        .context("Invalid password hashing parameters")?;
    Ok(state)
}

async fn run(state: &AuthState, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::User { action } => match action {
            UserAction::Create {
                username,
                name,
                password,
            } => {
                let user = state
                    .users
                    .create_user(CreateUserInput::new(username, name, password))
                    .await?;
                print_json(&user)
            }
            UserAction::Get { id } => print_json(&state.users.get_by_id(id).await?),
            UserAction::Find { username } => {
                print_json(&state.users.get_by_username(&username).await?)
            }
            UserAction::List => print_json(&state.users.list_users().await?),
            UserAction::Update {
                id,
                name,
                username,
                password,
            } => {
                let input = UpdateUserInput {
                    name,
                    username,
                    password,
                };
                print_json(&state.users.update_user(id, input).await?)
            }
            UserAction::Delete { id } => {
                state.users.delete_user(id).await?;
                print_json(&serde_json::json!({ "deleted": id }))
            }
        },
        Commands::Auth { action } => match action {
            AuthAction::Login { username, password } => {
                print_json(&state.sessions.login(&username, &password).await?)
            }
            AuthAction::Refresh { token } => print_json(&state.sessions.refresh(&token).await?),
            AuthAction::Logout { user_id } => {
                state.sessions.logout(user_id).await?;
                print_json(&serde_json::json!({ "logged_out": user_id }))
            }
            AuthAction::Whoami { token } => {
                let user_id = state.sessions.authenticate(&token)?;
                print_json(&state.users.get_by_id(user_id).await?)
            }
        },
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_partial_update() {
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "sitecon",
            "user",
            "update",
            &id.to_string(),
            "--username",
            "new",
        ])
        .unwrap();

        match cli.command {
            Commands::User {
                action:
                    UserAction::Update {
                        id: parsed,
                        name,
                        username,
                        password,
                    },
            } => {
                assert_eq!(parsed, id);
                assert_eq!(username.as_deref(), Some("new"));
                assert!(name.is_none());
                assert!(password.is_none());
            }
            _ => panic!("expected user update"),
        }
    }

    #[test]
    fn test_cli_rejects_malformed_id() {
        assert!(Cli::try_parse_from(["sitecon", "user", "get", "not-a-uuid"]).is_err());
    }
}
