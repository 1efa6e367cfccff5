//! Subscription state: which devices this connection accepts traffic
//! from, and under which token.

use std::collections::HashMap;

use tracing::debug;

use crate::cipher::TokenCipher;
use crate::error::{HeliumError, Result};
use crate::mac::DeviceAddress;
use crate::token::Token;

/// One active subscription: the device token plus a cipher ready to
/// open that device's traffic.
#[derive(Clone)]
pub struct Subscription {
    token: Token,
    cipher: TokenCipher,
}

impl Subscription {
    fn new(token: Token) -> Self {
        let cipher = TokenCipher::new(&token);
        Subscription { token, cipher }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Open a sealed payload under this subscription's token.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        self.cipher.open(sealed)
    }
}

/// Device address to subscription map with a capacity limit.
///
/// Inbound data frames are accepted only for addresses present here;
/// traffic from anyone else is dropped before decryption is attempted.
pub struct SubscriptionRegistry {
    entries: HashMap<DeviceAddress, Subscription>,
    limit: usize,
}

impl SubscriptionRegistry {
    pub fn new(limit: usize) -> Self {
        SubscriptionRegistry {
            entries: HashMap::new(),
            limit,
        }
    }

    /// Install or replace the subscription for `device`.
    ///
    /// Replacement is a single map insert: at no point do two entries
    /// for one address exist, and the old token is superseded whole.
    /// Only a genuinely new entry counts against the limit, so
    /// re-subscribing at capacity still succeeds.
    pub fn subscribe(&mut self, device: DeviceAddress, token: Token) -> Result<()> {
        if !self.contains(device) && self.entries.len() >= self.limit {
            return Err(HeliumError::CapacityExceeded { limit: self.limit });
        }
        let replaced = self
            .entries
            .insert(device, Subscription::new(token))
            .is_some();
        if replaced {
            debug!("replaced subscription token for {}", device);
        } else {
            debug!(
                "subscribed {} ({} of {} slots used)",
                device,
                self.entries.len(),
                self.limit
            );
        }
        Ok(())
    }

    /// Remove and return the subscription for `device`. The returned
    /// entry still carries its token, which the caller needs for the
    /// unsubscribe possession proof.
    pub fn unsubscribe(&mut self, device: DeviceAddress) -> Result<Subscription> {
        self.entries
            .remove(&device)
            .ok_or(HeliumError::NotSubscribed(device))
    }

    /// The subscription an inbound frame from `device` is judged by.
    pub fn lookup(&self, device: DeviceAddress) -> Option<&Subscription> {
        self.entries.get(&device)
    }

    pub fn contains(&self, device: DeviceAddress) -> bool {
        self.entries.contains_key(&device)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
