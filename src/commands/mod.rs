//! Command dispatch for the `crm` binary.

mod auth;
mod customers;

use std::sync::Arc;

use anyhow::Context;
use crm_auth::{CrmClient, EnvSecretProvider, FileTokenStore, Navigator};
use tracing::debug;

use crate::cli::{Cli, Commands};
use crate::settings::Settings;

/// Tells the user to sign in again once the stored session is gone
#[derive(Debug, Default)]
pub struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, route: &str) {
        debug!("Navigation to {} requested", route);
        eprintln!("Your session has expired. Run `crm login <username>` to sign in again.");
    }
}

/// Resolve configuration, open the token store and restore any saved
/// session before running the command.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings_path = match cli.config {
        Some(path) => path,
        None => Settings::default_path()?,
    };
    let settings = Settings::load(&settings_path).await?;
    let config = settings
        .resolve(|key| std::env::var(key).ok())
        .context("Invalid CRM configuration")?;
    debug!(
        "Using {:?} deployment (auth: {}, api: {})",
        config.deployment, config.auth_url, config.api_url
    );

    let storage_dir = match cli.data_dir {
        Some(dir) => dir,
        None => FileTokenStore::default_storage_dir()?,
    };
    let store = FileTokenStore::new(&storage_dir, Arc::new(EnvSecretProvider::default()))
        .await
        .with_context(|| format!("Failed to open token store in {}", storage_dir.display()))?;

    let client = CrmClient::new(config, Arc::new(store), Arc::new(TerminalNavigator))?;
    if restores_session(&cli.command) {
        client.session().initialize().await;
    }

    match cli.command {
        Commands::Login(args) => auth::login(&client, args).await,
        Commands::Register(args) => auth::register(&client, args).await,
        Commands::Logout => auth::logout(&client).await,
        Commands::Whoami => auth::whoami(&client),
        Commands::Refresh => auth::refresh(&client).await,
        Commands::Customers(command) => customers::run(&client, command).await,
    }
}

/// Logging out only wipes local state, so it never talks to the backend
fn restores_session(command: &Commands) -> bool {
    !matches!(command, Commands::Logout)
}
