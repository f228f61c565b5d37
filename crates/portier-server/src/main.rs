// ============================================================================
// portier — webhook server for the phone-operated lock
// ============================================================================
// Usage:
//   portier                      Run with configuration from the environment
//   portier --port 8080          Override the PORT environment variable
//   portier --env-file ./prod.env  Load a specific env file before reading
// ============================================================================

mod server;

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use portier_core::{ActuatorClient, CallFlow, Config, RequestAuthenticator};
use server::AppState;

/// Phone-operated lock webhook server
#[derive(Parser)]
#[command(name = "portier", version, about = "IVR webhook server driving the door lock actuator")]
struct Cli {
    /// Listen port, overrides the PORT environment variable
    #[arg(long)]
    port: Option<u16>,

    /// Env file to load instead of the default ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load environment variables before anything reads them
    let env_result = match &cli.env_file {
        Some(path) => dotenvy::from_path(path).map(|_| ()),
        None => dotenvy::dotenv().map(|_| ()),
    };
    if let Err(e) = env_result {
        eprintln!("Warning: could not load env file: {}", e);
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("portier_server=debug".parse().unwrap())
                .add_directive("portier_core=debug".parse().unwrap()),
        )
        .init();

    let mut config = Config::from_env()?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    info!(
        version_tag = %config.version_tag,
        auth_bypass = config.auth_bypass,
        "starting portier"
    );

    let actuator = ActuatorClient::new(&config.actuator_base_url, &config.api_secret)?;
    let flow = CallFlow::new(Arc::new(actuator), &config.version_tag);
    let authenticator = RequestAuthenticator::new(
        &config.auth_token,
        &config.public_url,
        config.auth_bypass,
    );

    let state = AppState {
        flow: Arc::new(flow),
        authenticator: Arc::new(authenticator),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    server::run(addr, state).await
}
