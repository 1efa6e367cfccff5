//! Mesh listener
//!
//! Opens a connection, subscribes to one device, and prints every
//! authenticated message that device sends us. Optionally fires a
//! greeting message at it after subscribing.
//!
//! Usage: helium-listen --device aa:bb:cc:dd:ee:ff --token <base64>

use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use helium_client::{logging_start, version, Config, Connection, DeviceAddress, InboundMessage, Token};

#[derive(Parser)]
#[command(name = "helium-listen")]
#[command(about = "Subscribe to a mesh device and print its messages")]
#[command(version)]
struct Cli {
    /// Device address to subscribe to (aa:bb:cc:dd:ee:ff)
    #[arg(short, long)]
    device: DeviceAddress,

    /// Device token, base64 (16 bytes decoded)
    #[arg(short, long)]
    token: String,

    /// IPv4 proxy to relay through (a.b.c.d[:port])
    #[arg(short, long)]
    proxy: Option<String>,

    /// Rendezvous endpoint override (e.g. [::1]:2169 for local testing)
    #[arg(short, long)]
    rendezvous: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Message to send to the device after subscribing
    #[arg(short, long)]
    message: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging_start();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(rendezvous) = &cli.rendezvous {
        config.rendezvous = rendezvous.clone();
    }

    let token = Token::from_base64(&cli.token)?;
    let device = cli.device;

    info!("helium-client v{}", version());

    let mut conn = Connection::with_config(config);
    conn.open(cli.proxy.as_deref(), |msg: InboundMessage<'_>| {
        let when = chrono::Local::now().format("%H:%M:%S");
        match std::str::from_utf8(msg.payload) {
            Ok(text) => println!("[{}] {}: {}", when, msg.sender, text),
            Err(_) => println!(
                "[{}] {}: {} bytes: {}",
                when,
                msg.sender,
                msg.payload.len(),
                hex::encode(msg.payload)
            ),
        }
    })
    .await?;

    conn.subscribe(device, token.clone()).await?;
    println!("📡 Subscribed to {}. Press Ctrl+C to stop.", device);

    if let Some(message) = &cli.message {
        conn.send(device, &token, message.as_bytes()).await?;
        println!("📤 Sent {} bytes to {}", message.len(), device);
    }

    tokio::signal::ctrl_c().await?;
    println!();
    conn.close()?;
    println!("✨ Connection closed.");
    Ok(())
}
