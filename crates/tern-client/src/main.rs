//! Tern CLI
//!
//! One request per invocation against the server's well-known endpoint.

use anyhow::Result;
use clap::{Parser, Subcommand};

use tern_client::{Client, ClientConfig, LISTING_FILE};

#[derive(Parser)]
#[command(name = "tern-client", version, about = "Stop-and-wait file transfer client")]
struct Cli {
    /// Server host or address (host:port overrides TERN_SERVER_PORT)
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a file into the local directory
    Read {
        file: String,
    },
    /// Upload a file from the local directory
    Write {
        file: String,
    },
    /// Delete a file on the server
    Delete {
        file: String,
    },
    /// Show the server's files and their active readers
    List,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tern_client=info,tern_protocol=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env(&cli.server)?;
    let client = Client::new(&config)?;

    match cli.command {
        Commands::Read { file } => {
            let outcome = client.read(&file)?;
            println!("Received {} ({} bytes)", file, outcome.file_bytes);
        }
        Commands::Write { file } => {
            let outcome = client.write(&file)?;
            println!(
                "Sent {} ({} bytes, {} compressed)",
                file, outcome.file_bytes, outcome.transfer.bytes
            );
        }
        Commands::Delete { file } => {
            client.delete(&file)?;
            println!("Deleted {}", file);
        }
        Commands::List => {
            let listing = client.list()?;
            if listing.is_empty() {
                println!("No files on the server");
            } else {
                print!("{}", listing);
            }
            println!(
                "Listing saved to {}",
                client.store().dir().join(LISTING_FILE).display()
            );
        }
    }

    Ok(())
}
