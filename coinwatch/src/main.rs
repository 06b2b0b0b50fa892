use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coinwatch::api::server::{ApiServer, ApiServerConfig};

#[derive(Parser)]
#[command(name = "coinwatch")]
#[command(about = "Cached market-data proxy API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start API server
    Server {
        /// Host to bind to (overrides COINWATCH_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides COINWATCH_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the effective configuration as JSON
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "coinwatch=info,coinwatch_cache=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = ApiServerConfig::from_env()?;

    match cli.command {
        Commands::Server { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }

            let addr = format!("{}:{}", config.host, config.port);
            let server = ApiServer::from_config(config)?;
            println!("Starting API server on {}", addr);
            server.start().await?;
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
