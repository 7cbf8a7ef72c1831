//! Resolve the configured mail transport, and send mail through it.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use courier::{Courier, find_config_file};
use courier_common::{Message, logging};
use courier_transport::Outcome;
use tokio::io::AsyncReadExt;

#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Send mail through the configured transport", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: $COURIER_CONFIG, ./courier.config.ron,
    /// /etc/courier/courier.config.ron)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration and describe the resolved transport
    Check,
    /// Send a message
    Send {
        /// RFC 5322 message to send (default: stdin)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Envelope sender (default: the message's From header, then
        /// defaultMailFromAddress)
        #[arg(long)]
        from: Option<String>,

        /// Envelope recipient; repeatable (default: the To, Cc and Bcc headers)
        #[arg(long)]
        to: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    let config_path = find_config_file(cli.config.as_deref())?;
    let courier = Courier::from_file(&config_path)?;

    match cli.command {
        Commands::Check => {
            let summary = courier.check()?;
            println!("{}: {summary}", config_path.display());
        }
        Commands::Send { file, from, to } => {
            let data = match file {
                Some(path) => tokio::fs::read(&path).await.map_err(|e| {
                    anyhow::anyhow!("Failed to read message from {}: {e}", path.display())
                })?,
                None => {
                    let mut data = Vec::new();
                    tokio::io::stdin().read_to_end(&mut data).await?;
                    data
                }
            };

            let message = envelope(data, from, to)?;
            match courier.send(message).await? {
                Outcome::Sent { recipients } => println!("Sent to {recipients} recipient(s)"),
                Outcome::Queued(id) => println!("Queued and flushed as {id}"),
            }
        }
    }

    Ok(())
}

/// Build the message, preferring envelope data from the command line over
/// what the headers say.
fn envelope(data: Vec<u8>, from: Option<String>, to: Vec<String>) -> anyhow::Result<Message> {
    if to.is_empty() {
        let parsed = Message::parse(data)?;
        return Ok(match from {
            Some(from) => Message::new(
                Some(from),
                parsed.recipients().to_vec(),
                parsed.data().to_vec(),
            ),
            None => parsed,
        });
    }

    let sender = match from {
        Some(from) => Some(from),
        None => Message::parse(data.clone())
            .ok()
            .and_then(|parsed| parsed.sender().map(str::to_string)),
    };
    Ok(Message::new(sender, to, data))
}
