//! collab-client: terminal client for a collaborative editing server.
//!
//! Reads line commands from stdin, applies them to the local document and
//! keeps it in sync with the server over HTTP long-polling.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use collab_client::{ClientConfig, Command, Connection, HttpTransport, WELCOME_TEXT, execute};
use collab_core::{EventBus, ReplaceStep, StatusEvent};

#[derive(Parser, Debug)]
#[command(name = "collab-client")]
#[command(about = "Collaborative text editing client with change tracking")]
struct Args {
    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server base URL (overrides config)
    #[arg(short, long)]
    server: Option<String>,

    /// Document name (overrides config)
    #[arg(short, long)]
    doc: Option<String>,

    /// Client ID in hex (generated if not provided)
    #[arg(long)]
    client_id: Option<String>,

    /// Insert a welcome text and commit it after loading
    #[arg(long)]
    seed: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

fn load_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    if let Some(server) = &args.server {
        config.server = server.clone();
    }
    if let Some(doc) = &args.doc {
        config.doc = doc.clone();
    }
    if let Some(client_id) = &args.client_id {
        config.client_id = Some(client_id.clone());
    }
    config.seed_initial_commit |= args.seed;
    Ok(config)
}

fn log_status(event: &StatusEvent) {
    match event {
        StatusEvent::Success => debug!("Connection ok"),
        StatusEvent::Delay { error } => warn!("Connection slow: {}", error),
        StatusEvent::Failure { error } => error!("Connection failed: {}", error),
        StatusEvent::Users { count } => info!("{} user(s) on this document", count),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,collab_client=debug"
    } else {
        "info,collab_client=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;
    let client_id = config.client_id()?;
    let transport = HttpTransport::new(&config.server, &config.doc)
        .context("Failed to create HTTP client")?;

    info!("Starting collab-client");
    info!("Document: {}", transport.base_url());

    let events = Arc::new(EventBus::new());
    let _status = events.subscribe(log_status);

    let mut connection: Connection<ReplaceStep, _> =
        Connection::start(client_id, config.sync.clone(), transport, Arc::clone(&events));
    if config.seed_initial_commit {
        connection = connection.with_seed(vec![ReplaceStep::insert(0, WELCOME_TEXT)]);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match line.parse::<Command>() {
                            Ok(Command::Quit) => break,
                            Ok(command) => println!("{}", execute(&mut connection, command)),
                            Err(e) => println!("{}", e),
                        }
                    }
                    Ok(None) => {
                        debug!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }

            Some(action) = connection.next_action() => {
                connection.dispatch(action);
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    connection.close();
    info!("collab-client stopped");
    Ok(())
}
