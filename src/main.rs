use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;

use tezgate::arbiter::{Collaborators, DAppArbiter};
use tezgate::backend::{DocumentKeyring, DocumentLedger, HttpVault, TezosRpcClient};
use tezgate::bootstrap::{LogFormat, init_tracing, load_env_files};
use tezgate::config::Config;
use tezgate::confirm::{BrowserSurfaceHost, ConfirmationOrchestrator};
use tezgate::gateway::{GatewayState, generate_auth_token, start_server};
use tezgate::network::NetworkRegistry;
use tezgate::session::SessionStore;
use tezgate::storage::{DocumentStorage, FileStorage, MemoryStorage};

#[derive(Debug, Parser)]
#[command(name = "tezgate", version, about = "Tezos dApp connection and approval gateway")]
struct Cli {
    /// Path to a TOML config file (default: ~/.tezgate/config.toml).
    #[arg(long, global = true, env = "TEZGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the gateway (default).
    Serve,
    /// Inspect or revoke granted permissions.
    Sessions {
        #[command(subcommand)]
        action: SessionsCommand,
    },
}

#[derive(Debug, Subcommand)]
enum SessionsCommand {
    /// List origins with a granted permission.
    List {
        /// Print the raw session map as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Revoke the permission of one origin.
    Remove { origin: String },
    /// Revoke every permission.
    Clear {
        /// Skip the confirmation guard.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // Subscriber before config so its logs are kept; .env may set the format.
    load_env_files();
    init_tracing(LogFormat::from_env());
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Sessions { action } => sessions(config, action).await,
    }
}

fn open_storage(config: &Config) -> Arc<dyn DocumentStorage> {
    if config.storage.ephemeral {
        tracing::warn!("Ephemeral storage: sessions are lost on exit");
        Arc::new(MemoryStorage::new())
    } else {
        Arc::new(FileStorage::new(&config.storage.data_dir))
    }
}

fn session_store(storage: Arc<dyn DocumentStorage>) -> Arc<SessionStore> {
    let keyring = Arc::new(DocumentKeyring::new(Arc::clone(&storage)));
    Arc::new(SessionStore::new(storage, keyring))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let storage = open_storage(&config);
    let sessions = session_store(Arc::clone(&storage));

    let rpc = Arc::new(TezosRpcClient::new(config.rpc.timeout));
    let backends = Collaborators {
        vault: Arc::new(HttpVault::new(
            config.vault.url.clone(),
            config.vault.token.clone(),
            config.vault.timeout,
        )),
        rpc: rpc.clone(),
        parser: rpc,
        ledger: Arc::new(DocumentLedger::new(storage)),
    };

    let orchestrator = ConfirmationOrchestrator::new(
        Arc::new(BrowserSurfaceHost),
        config.orchestrator_settings(),
    );
    let arbiter = Arc::new(DAppArbiter::new(
        sessions,
        NetworkRegistry::new(config.networks.clone()),
        orchestrator,
        backends,
    ));

    let auth_token = match &config.gateway.auth_token {
        Some(token) => token.expose_secret().to_string(),
        None => {
            let token = generate_auth_token();
            println!("Gateway token (set TEZGATE_GATEWAY_AUTH_TOKEN to pin it): {token}");
            token
        }
    };

    let addr: SocketAddr = format!("{}:{}", config.gateway.host, config.gateway.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid gateway bind address {}:{}",
                config.gateway.host, config.gateway.port
            )
        })?;

    let state = Arc::new(GatewayState::new(
        arbiter,
        config.gateway.allowed_origins.clone(),
    ));
    let bound = start_server(addr, Arc::clone(&state), auth_token).await?;
    tracing::info!(
        "Approval surfaces open at {}/confirm (gateway {})",
        config.gateway.public_base_url,
        bound
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    state.shutdown().await;
    Ok(())
}

async fn sessions(config: Config, action: SessionsCommand) -> anyhow::Result<()> {
    let store = session_store(open_storage(&config));

    match action {
        SessionsCommand::List { json } => {
            let all = store.get_all().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&all)?);
            } else if all.is_empty() {
                println!("No sessions.");
            } else {
                for (origin, session) in &all {
                    println!("{origin}\t{}\t{}", session.pkh, session.app_meta.name);
                }
            }
        }
        SessionsCommand::Remove { origin } => {
            if store.get(&origin).await?.is_none() {
                anyhow::bail!("no session for {origin}");
            }
            let remaining = store.remove(&origin).await?;
            println!("Removed {origin} ({} remaining).", remaining.len());
        }
        SessionsCommand::Clear { yes } => {
            if !yes {
                anyhow::bail!("refusing to clear all sessions without --yes");
            }
            store.clear().await?;
            println!("All sessions cleared.");
        }
    }
    Ok(())
}
