//! Device Simulator
//!
//! Stands in for the network side of the mesh on a local port: accepts
//! envelopes from a client, prints subscribe/unsubscribe notices, opens
//! data frames addressed to its device with its token, and echoes a
//! sealed reply. Useful for exercising helium-listen without any real
//! infrastructure:
//!
//!   device-sim --device aa:bb:cc:dd:ee:ff &
//!   helium-listen --device aa:bb:cc:dd:ee:ff \
//!       --token AAAAAAAAAAAAAAAAAAAAAA== \
//!       --rendezvous '[::1]:2169' --message hello

use clap::Parser;
use tokio::net::UdpSocket;

use helium_client::{logging_start, DeviceAddress, Packet, Token, TokenCipher};

#[derive(Parser)]
#[command(name = "device-sim")]
#[command(about = "Simulate the network side of the mesh on a local port")]
#[command(version)]
struct Cli {
    /// Address this simulated device answers as
    #[arg(short, long)]
    device: DeviceAddress,

    /// Device token, base64 (defaults to the all-zero token)
    #[arg(short, long, default_value = "AAAAAAAAAAAAAAAAAAAAAA==")]
    token: String,

    /// Local endpoint to listen on
    #[arg(short, long, default_value = "[::1]:2169")]
    bind: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging_start();

    let token = Token::from_base64(&cli.token)?;
    let cipher = TokenCipher::new(&token);

    let socket = UdpSocket::bind(&cli.bind).await?;
    println!("🛰  Device {} listening on {}", cli.device, socket.local_addr()?);

    let mut buf = vec![0u8; 65535];
    loop {
        let (len, src) = socket.recv_from(&mut buf).await?;

        let packet = match Packet::parse(&buf[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                println!("✗ {} byte datagram from {}: {}", len, src, e);
                continue;
            }
        };

        match packet {
            Packet::Subscribe { device, proof } => {
                if device == cli.device && cipher.open(&proof).is_ok() {
                    println!("➕ {} subscribed to us (proof verified)", src);
                } else {
                    println!("➕ subscribe notice for {} from {}", device, src);
                }
            }
            Packet::Unsubscribe { device, .. } => {
                println!("➖ unsubscribe notice for {} from {}", device, src);
            }
            Packet::Data { device, ciphertext } if device == cli.device => {
                match cipher.open(&ciphertext) {
                    Ok(plaintext) => {
                        println!(
                            "📥 {} bytes from {}: {}",
                            plaintext.len(),
                            src,
                            String::from_utf8_lossy(&plaintext)
                        );

                        let mut reply = b"echo: ".to_vec();
                        reply.extend_from_slice(&plaintext);
                        let sealed = cipher.seal(&reply)?;
                        let datagram = Packet::Data {
                            device: cli.device,
                            ciphertext: sealed,
                        }
                        .encode()?;
                        socket.send_to(&datagram, src).await?;
                        println!("📤 echoed {} bytes", reply.len());
                    }
                    Err(_) => {
                        println!("✗ data frame for us from {} failed authentication", src);
                    }
                }
            }
            Packet::Data { device, .. } => {
                println!("🔀 data frame for {} (not us), would route onward", device);
            }
        }
    }
}
