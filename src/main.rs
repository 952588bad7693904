use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use convai_call::{Config, CredentialExchange, HttpCredentialExchange};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "convai-call", about = "Voice calls with a conversational AI character")]
struct Cli {
    /// Config file (extension optional)
    #[arg(long, default_value = "config/convai-call")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Exchange credentials once and print the booked room
    Handshake {
        /// Continuation id from a previous call
        #[arg(long)]
        continuation: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Loaded config: {}", cfg.service.name);
    info!("Signaling: {:?}", cfg.signaling);

    match cli.command {
        Command::Handshake { continuation } => {
            let exchange = HttpCredentialExchange::new(cfg.signaling);
            let credentials = exchange
                .request_session(continuation.as_deref())
                .await
                .context("Credential exchange failed")?;

            println!("room:         {}", credentials.room_name);
            println!("address:      {}", credentials.room_address);
            println!("session:      {}", credentials.session_id);
            println!(
                "continuation: {}",
                credentials.continuation_id.as_deref().unwrap_or("-")
            );
        }
    }

    Ok(())
}
