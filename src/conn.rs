//! The mesh connection: lifecycle state machine, socket ownership, and
//! inbound dispatch.
//!
//! A connection moves through three states, `Unopened -> Open -> Closed`,
//! and never back: a closed connection stays closed, reconnecting means
//! building a new one. While open it owns one UDP socket and one spawned
//! receive task; `close` (or drop) aborts the task and releases the
//! socket.
//!
//! Inbound traffic is untrusted. The receive task parses, checks the
//! subscription registry, and authenticates before anything reaches the
//! caller's handler; whatever fails is counted, logged and dropped, and
//! the connection keeps running. Errors returned from the public API are
//! always about the caller's own requests, never about the network's
//! behavior.

use std::any::Any;
use std::mem;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cipher::TokenCipher;
use crate::config::Config;
use crate::error::{HeliumError, Result};
use crate::mac::DeviceAddress;
use crate::packet::{Packet, MAX_MESSAGE_SIZE};
use crate::proxy::Route;
use crate::registry::SubscriptionRegistry;
use crate::token::Token;

/// An authenticated inbound message.
///
/// `sender` is trustworthy to the extent the token is: the payload
/// authenticated under the subscription token installed for that
/// address.
#[derive(Debug)]
pub struct InboundMessage<'a> {
    pub sender: DeviceAddress,
    pub payload: &'a [u8],
}

/// Receives authenticated inbound messages.
///
/// Invoked synchronously on the connection's receive task, one message
/// at a time, in arrival order. Any `FnMut(InboundMessage)` closure
/// implements this, so most callers never name the trait.
pub trait MessageHandler: Send + 'static {
    fn on_message(&mut self, message: InboundMessage<'_>);
}

impl<F> MessageHandler for F
where
    F: FnMut(InboundMessage<'_>) + Send + 'static,
{
    fn on_message(&mut self, message: InboundMessage<'_>) {
        self(message)
    }
}

/// Delivery and drop counters for one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Messages that passed every check and reached the handler.
    pub delivered: u64,
    /// Datagrams that failed envelope parsing (including unknown type
    /// tags).
    pub dropped_malformed: u64,
    /// Data frames from addresses with no subscription.
    pub dropped_unsubscribed: u64,
    /// Data frames that failed authentication under the subscribed
    /// token.
    pub dropped_auth_failed: u64,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    dropped_malformed: AtomicU64,
    dropped_unsubscribed: AtomicU64,
    dropped_auth_failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ConnectionStats {
        ConnectionStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            dropped_unsubscribed: self.dropped_unsubscribed.load(Ordering::Relaxed),
            dropped_auth_failed: self.dropped_auth_failed.load(Ordering::Relaxed),
        }
    }
}

enum Lifecycle {
    Unopened,
    Open(OpenState),
    Closed,
}

struct OpenState {
    socket: Arc<UdpSocket>,
    route: Route,
    local_addr: SocketAddr,
    registry: Arc<Mutex<SubscriptionRegistry>>,
    counters: Arc<Counters>,
    recv_task: JoinHandle<()>,
}

/// A client connection to the device mesh.
pub struct Connection {
    config: Config,
    lifecycle: Lifecycle,
    context: Option<Box<dyn Any + Send>>,
}

impl Connection {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Connection {
            config,
            lifecycle: Lifecycle::Unopened,
            context: None,
        }
    }

    /// Open the connection and start delivering inbound messages to
    /// `handler`.
    ///
    /// `proxy_addr` selects the IPv4 relay path (see [`Route`]); `None`
    /// goes straight to the configured IPv6 rendezvous. The route is
    /// fixed for the connection's lifetime.
    pub async fn open<H: MessageHandler>(
        &mut self,
        proxy_addr: Option<&str>,
        handler: H,
    ) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Unopened => {}
            Lifecycle::Open(_) => return Err(HeliumError::AlreadyOpen),
            Lifecycle::Closed => return Err(HeliumError::AlreadyClosed),
        }

        let route = Route::select(proxy_addr, &self.config)?;
        let socket = Arc::new(UdpSocket::bind(route.bind_addr()).await?);
        let local_addr = socket.local_addr()?;

        let registry = Arc::new(Mutex::new(SubscriptionRegistry::new(
            self.config.max_subscriptions,
        )));
        let counters = Arc::new(Counters::default());

        let recv_task = tokio::spawn(recv_loop(
            Arc::clone(&socket),
            Arc::clone(&registry),
            Arc::clone(&counters),
            handler,
        ));

        info!("connection open on {} via {}", local_addr, route);

        self.lifecycle = Lifecycle::Open(OpenState {
            socket,
            route,
            local_addr,
            registry,
            counters,
            recv_task,
        });
        Ok(())
    }

    /// Close the connection: stop the receive task and release the
    /// socket. Terminal; there is no reopen.
    pub fn close(&mut self) -> Result<()> {
        if !matches!(self.lifecycle, Lifecycle::Open(_)) {
            return Err(HeliumError::AlreadyClosed);
        }
        if let Lifecycle::Open(state) = mem::replace(&mut self.lifecycle, Lifecycle::Closed) {
            state.recv_task.abort();
            info!("connection on {} closed", state.local_addr);
        }
        Ok(())
    }

    /// Send `message` to `device`, sealed under `token`.
    ///
    /// Sending needs no subscription: transmit authorization is the
    /// caller-supplied token itself. The message is sealed and framed
    /// before any I/O, so an oversized payload fails without touching
    /// the network.
    pub async fn send(&self, device: DeviceAddress, token: &Token, message: &[u8]) -> Result<()> {
        let state = self.open_state()?;
        let datagram = seal_message(device, token, message)?;
        state.socket.send_to(&datagram, state.route.target).await?;
        debug!("sent {} byte message to {}", message.len(), device);
        Ok(())
    }

    /// Accept inbound traffic from `device`, authenticated by `token`.
    ///
    /// Re-subscribing an address replaces its token. The registry
    /// insert is what grants acceptance; the Subscribe frame sent to
    /// the network afterwards is advisory and best-effort.
    pub async fn subscribe(&self, device: DeviceAddress, token: Token) -> Result<()> {
        let state = self.open_state()?;

        let proof = TokenCipher::new(&token).seal(&[])?;
        lock_registry(&state.registry).subscribe(device, token)?;

        let notice = Packet::Subscribe { device, proof }.encode()?;
        if let Err(e) = state.socket.send_to(&notice, state.route.target).await {
            warn!("subscribe notice for {} not sent: {}", device, e);
        }
        info!("subscribed to {}", device);
        Ok(())
    }

    /// Stop accepting traffic from `device`.
    pub async fn unsubscribe(&self, device: DeviceAddress) -> Result<()> {
        let state = self.open_state()?;

        let removed = lock_registry(&state.registry).unsubscribe(device)?;

        let proof = TokenCipher::new(removed.token()).seal(&[])?;
        let notice = Packet::Unsubscribe { device, proof }.encode()?;
        if let Err(e) = state.socket.send_to(&notice, state.route.target).await {
            warn!("unsubscribe notice for {} not sent: {}", device, e);
        }
        info!("unsubscribed from {}", device);
        Ok(())
    }

    /// A cloneable sending handle for handlers and background tasks.
    /// Every handle dies with the connection: after `close` (or drop)
    /// sends fail with [`HeliumError::NotOpen`].
    pub fn sender(&self) -> Result<MessageSender> {
        let state = self.open_state()?;
        Ok(MessageSender {
            socket: Arc::downgrade(&state.socket),
            target: state.route.target,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.open_state()?.local_addr)
    }

    pub fn is_open(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Open(_))
    }

    /// Counter snapshot; zeros when the connection is not open.
    pub fn stats(&self) -> ConnectionStats {
        match &self.lifecycle {
            Lifecycle::Open(state) => state.counters.snapshot(),
            _ => ConnectionStats::default(),
        }
    }

    /// Attach an arbitrary caller value to the connection. Usable in
    /// any lifecycle state; the engine never looks at it.
    pub fn set_context<T: Send + 'static>(&mut self, value: T) {
        self.context = Some(Box::new(value));
    }

    pub fn context<T: Send + 'static>(&self) -> Option<&T> {
        self.context.as_deref().and_then(|c| c.downcast_ref())
    }

    pub fn context_mut<T: Send + 'static>(&mut self) -> Option<&mut T> {
        self.context.as_deref_mut().and_then(|c| c.downcast_mut())
    }

    fn open_state(&self) -> Result<&OpenState> {
        match &self.lifecycle {
            Lifecycle::Open(state) => Ok(state),
            _ => Err(HeliumError::NotOpen),
        }
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Lifecycle::Open(state) = &self.lifecycle {
            state.recv_task.abort();
        }
    }
}

/// Cloneable sending handle, valid while its connection is open.
#[derive(Clone)]
pub struct MessageSender {
    socket: Weak<UdpSocket>,
    target: SocketAddr,
}

impl MessageSender {
    pub async fn send(&self, device: DeviceAddress, token: &Token, message: &[u8]) -> Result<()> {
        let socket = self.socket.upgrade().ok_or(HeliumError::NotOpen)?;
        let datagram = seal_message(device, token, message)?;
        socket.send_to(&datagram, self.target).await?;
        Ok(())
    }
}

/// Seal and frame one outbound message. All size checking happens here,
/// before any I/O.
fn seal_message(device: DeviceAddress, token: &Token, message: &[u8]) -> Result<Vec<u8>> {
    if message.len() > MAX_MESSAGE_SIZE {
        return Err(HeliumError::PayloadTooLarge {
            size: message.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    let ciphertext = TokenCipher::new(token).seal(message)?;
    Packet::Data { device, ciphertext }.encode()
}

/// A poisoned registry lock means some other access panicked mid-map-op;
/// the map itself is still coherent, so keep serving rather than letting
/// the poison take the whole connection down.
fn lock_registry(registry: &Mutex<SubscriptionRegistry>) -> MutexGuard<'_, SubscriptionRegistry> {
    registry
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn recv_loop<H: MessageHandler>(
    socket: Arc<UdpSocket>,
    registry: Arc<Mutex<SubscriptionRegistry>>,
    counters: Arc<Counters>,
    mut handler: H,
) {
    let mut buf = vec![0u8; 65535];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, src)) => {
                handle_datagram(&buf[..len], src, &registry, &counters, &mut handler);
            }
            Err(e) => {
                // usually ICMP fallout from one of our own sends; the
                // socket itself is still good
                warn!("recv error: {}", e);
            }
        }
    }
}

fn handle_datagram<H: MessageHandler>(
    data: &[u8],
    src: SocketAddr,
    registry: &Mutex<SubscriptionRegistry>,
    counters: &Counters,
    handler: &mut H,
) {
    let packet = match Packet::parse(data) {
        Ok(packet) => packet,
        Err(e) => {
            counters.dropped_malformed.fetch_add(1, Ordering::Relaxed);
            debug!("dropping {} byte datagram from {}: {}", data.len(), src, e);
            return;
        }
    };

    match packet {
        Packet::Data { device, ciphertext } => {
            let opened = match lock_registry(registry).lookup(device) {
                Some(subscription) => subscription.open(&ciphertext),
                None => {
                    counters.dropped_unsubscribed.fetch_add(1, Ordering::Relaxed);
                    debug!("dropping data frame from unsubscribed {}", device);
                    return;
                }
            };

            match opened {
                Ok(plaintext) => {
                    counters.delivered.fetch_add(1, Ordering::Relaxed);
                    handler.on_message(InboundMessage {
                        sender: device,
                        payload: &plaintext,
                    });
                }
                Err(_) => {
                    counters.dropped_auth_failed.fetch_add(1, Ordering::Relaxed);
                    warn!("dropping data frame from {}: authentication failed", device);
                }
            }
        }
        // subscriptions flow client-to-network only
        Packet::Subscribe { device, .. } | Packet::Unsubscribe { device, .. } => {
            debug!("ignoring inbound control frame for {}", device);
        }
    }
}
