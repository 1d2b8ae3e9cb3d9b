//! # relay-cli
//!
//! Reference client for sealed-relay.
//!
//! ## Commands
//!
//! - `fetch`: Print the relay's encrypted value
//! - `decrypt`: Register a fresh key pair and decrypt a value through the relay
//! - `demo`: Walk two peers through the full exchange
//!
//! ## Example
//!
//! ```bash
//! # Fetch as Node1 (prompts for the password)
//! relay-cli --username Node1 fetch
//!
//! # Decrypt it as Node2
//! relay-cli --username Node2 decrypt --value <VALUE>
//!
//! # Both at once
//! relay-cli --password secure_pass_node1 demo --peer-password secure_pass_node2
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod client;
mod commands;

use commands::{decrypt, demo, fetch, Peer};

/// Reference client for sealed-relay.
#[derive(Parser, Debug)]
#[command(name = "relay-cli")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Relay WebSocket URL
    #[arg(long, global = true, default_value = "ws://127.0.0.1:8765")]
    url: String,

    /// Username to authenticate as
    #[arg(long, short, global = true, default_value = "Node1")]
    username: String,

    /// Password (will prompt if not provided)
    #[arg(long, short, global = true)]
    password: Option<String>,

    /// RSA modulus size for generated key pairs
    #[arg(long, global = true, default_value = "2048")]
    key_bits: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the relay's encrypted value
    Fetch,

    /// Decrypt an encrypted value through the relay
    Decrypt {
        /// Value returned by `fetch`
        #[arg(long, short)]
        value: String,
    },

    /// Run the two-peer exchange end to end
    Demo {
        /// Second peer's username
        #[arg(long, default_value = "Node2")]
        peer_username: String,

        /// Second peer's password (will prompt if not provided)
        #[arg(long)]
        peer_password: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let peer = Peer {
        url: cli.url.clone(),
        username: cli.username,
        password: cli.password,
    };

    match cli.command {
        Commands::Fetch => {
            fetch::run(&peer).await?;
        }
        Commands::Decrypt { value } => {
            decrypt::run(&peer, &value, cli.key_bits).await?;
        }
        Commands::Demo {
            peer_username,
            peer_password,
        } => {
            let receiver = Peer {
                url: cli.url,
                username: peer_username,
                password: peer_password,
            };
            demo::run(&peer, &receiver, cli.key_bits).await?;
        }
    }

    Ok(())
}
