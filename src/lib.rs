//! Client library for the Helium device mesh.
//!
//! Opens a UDP connection to the mesh (direct over IPv6, or through an
//! IPv4 relay proxy), subscribes to devices by 48-bit address, and
//! exchanges messages sealed under per-device 128-bit tokens. Inbound
//! traffic is parsed, matched against the subscription registry and
//! authenticated before the caller's handler ever sees it; everything
//! that fails those checks is counted and dropped without disturbing
//! the connection.
//!
//! ```no_run
//! use helium_client::{Connection, DeviceAddress, InboundMessage, Token};
//!
//! #[tokio::main]
//! async fn main() -> helium_client::Result<()> {
//!     let mut conn = Connection::new();
//!     conn.open(None, |msg: InboundMessage<'_>| {
//!         println!("{} says: {:?}", msg.sender, msg.payload);
//!     })
//!     .await?;
//!
//!     let device: DeviceAddress = "aa:bb:cc:dd:ee:ff".parse()?;
//!     let token = Token::from_base64("AAAAAAAAAAAAAAAAAAAAAA==")?;
//!     conn.subscribe(device, token.clone()).await?;
//!     conn.send(device, &token, b"hello").await?;
//!     conn.close()?;
//!     Ok(())
//! }
//! ```

pub mod cipher;
pub mod config;
pub mod conn;
pub mod error;
pub mod mac;
pub mod packet;
pub mod proxy;
pub mod registry;
pub mod token;

pub use cipher::TokenCipher;
pub use config::Config;
pub use conn::{Connection, ConnectionStats, InboundMessage, MessageHandler, MessageSender};
pub use error::{HeliumError, Result};
pub use mac::DeviceAddress;
pub use packet::{Packet, MAX_MESSAGE_SIZE};
pub use proxy::Route;
pub use registry::SubscriptionRegistry;
pub use token::Token;

/// Library version string.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Install a process-wide `fmt` subscriber honoring `RUST_LOG`, falling
/// back to `info`. A debugging convenience for binaries and quick
/// embedding; applications with their own subscriber skip this. Calling
/// it when a subscriber is already set does nothing.
pub fn logging_start() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    #[test]
    fn version_matches_manifest() {
        assert_eq!(super::version(), env!("CARGO_PKG_VERSION"));
        assert!(!super::version().is_empty());
    }
}
