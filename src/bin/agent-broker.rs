// ABOUTME: agent-broker binary: serves the HTTP API or generates a sealing key
// ABOUTME: Refuses to start without a valid BROKER_ENCRYPTION_KEY
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

//! # Agent Broker
//!
//! ```bash
//! # Generate a sealing key once and keep it safe
//! agent-broker generate-key
//!
//! # Serve with configuration from BROKER_* environment variables
//! BROKER_ENCRYPTION_KEY=... agent-broker serve --port 8088
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use clap::{Parser, Subcommand};
use tracing::info;
use zeroize::Zeroizing;

use agent_broker::config::ServerConfig;
use agent_broker::crypto::generate_encryption_key;
use agent_broker::database::Database;
use agent_broker::logging::init_logging;
use agent_broker::resources::ServerResources;
use agent_broker::server::BrokerServer;

#[derive(Parser)]
#[command(
    name = "agent-broker",
    about = "Multi-tenant broker for AI-provider credentials and shared agents",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// HTTP port override
        #[arg(long)]
        port: Option<u16>,

        /// Database URL override
        #[arg(long)]
        database_url: Option<String>,
    },
    /// Print a fresh base64 sealing key
    GenerateKey,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve {
        port: None,
        database_url: None,
    }) {
        Command::GenerateKey => {
            let key = Zeroizing::new(generate_encryption_key());
            println!("{}", general_purpose::STANDARD.encode(key.as_slice()));
            Ok(())
        }
        Command::Serve { port, database_url } => serve(port, database_url).await,
    }
}

async fn serve(port: Option<u16>, database_url: Option<String>) -> Result<()> {
    let mut config = ServerConfig::from_env().context("Failed to load configuration")?;
    if let Some(port) = port {
        config.http_port = port;
    }
    if let Some(database_url) = database_url {
        config.database_url = database_url;
    }

    init_logging(config.log_format).context("Failed to initialise logging")?;
    info!("Starting agent broker: {:?}", config);

    ensure_database_dir(&config.database_url)?;
    let database = Database::new(&config.database_url)
        .await
        .context("Failed to open database")?;

    let resources =
        ServerResources::from_config(&config, &database).context("Failed to wire services")?;
    BrokerServer::new(resources)
        .run(config.http_port)
        .await
        .context("Server failed")?;
    Ok(())
}

/// File-backed `SQLite` creates the file on demand but not its directory
fn ensure_database_dir(database_url: &str) -> Result<()> {
    let Some(path) = database_url.strip_prefix("sqlite:") else {
        return Ok(());
    };
    let path = path.trim_start_matches("//");
    if path.contains(":memory:") {
        return Ok(());
    }
    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}
