//! Transport route selection: IPv4 proxy relay or direct IPv6.
//!
//! Clients on IPv4-only networks reach the mesh through a relay proxy;
//! everyone else talks straight to the well-known IPv6 rendezvous. The
//! choice is made once, when the connection opens, and never changes
//! afterwards. The envelope format is the same on both paths; the relay
//! forwards envelopes unmodified.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4};

use crate::config::Config;
use crate::error::{HeliumError, Result};

/// Where a connection's traffic goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub target: SocketAddr,
    pub proxied: bool,
}

impl Route {
    /// Resolve the route for a new connection.
    ///
    /// A proxy argument must be a numeric IPv4 address, `a.b.c.d` or
    /// `a.b.c.d:port`; without a port the configured proxy port is
    /// assumed. No proxy argument means the direct path to the
    /// configured rendezvous.
    pub fn select(proxy_addr: Option<&str>, config: &Config) -> Result<Route> {
        match proxy_addr {
            Some(addr) => {
                let target = parse_proxy(addr, config.proxy_port)?;
                Ok(Route {
                    target: SocketAddr::V4(target),
                    proxied: true,
                })
            }
            None => {
                let target: SocketAddr = config.rendezvous.parse().map_err(|_| {
                    HeliumError::Config(format!(
                        "bad rendezvous endpoint {:?}",
                        config.rendezvous
                    ))
                })?;
                Ok(Route {
                    target,
                    proxied: false,
                })
            }
        }
    }

    /// Local wildcard bind address in the target's address family.
    pub fn bind_addr(&self) -> SocketAddr {
        match self.target {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.proxied {
            write!(f, "proxy {}", self.target)
        } else {
            write!(f, "direct {}", self.target)
        }
    }
}

fn parse_proxy(addr: &str, default_port: u16) -> Result<SocketAddrV4> {
    if let Ok(with_port) = addr.parse::<SocketAddrV4>() {
        return Ok(with_port);
    }
    if let Ok(ip) = addr.parse::<Ipv4Addr>() {
        return Ok(SocketAddrV4::new(ip, default_port));
    }
    Err(HeliumError::InvalidProxyAddr(addr.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_RENDEZVOUS;

    #[test]
    fn no_proxy_goes_direct() {
        let route = Route::select(None, &Config::default()).unwrap();
        assert!(!route.proxied);
        assert_eq!(route.target, DEFAULT_RENDEZVOUS.parse().unwrap());
        assert!(route.target.is_ipv6());
        assert_eq!(route.bind_addr(), "[::]:0".parse().unwrap());
    }

    #[test]
    fn rendezvous_override_is_respected() {
        let config = Config {
            rendezvous: "[::1]:4000".to_string(),
            ..Config::default()
        };
        let route = Route::select(None, &config).unwrap();
        assert_eq!(route.target, "[::1]:4000".parse().unwrap());
    }

    #[test]
    fn proxy_with_explicit_port() {
        let route = Route::select(Some("192.0.2.10:7000"), &Config::default()).unwrap();
        assert!(route.proxied);
        assert_eq!(route.target, "192.0.2.10:7000".parse().unwrap());
        assert_eq!(route.bind_addr(), "0.0.0.0:0".parse().unwrap());
    }

    #[test]
    fn proxy_without_port_uses_configured_default() {
        let route = Route::select(Some("192.0.2.10"), &Config::default()).unwrap();
        assert_eq!(route.target, "192.0.2.10:2169".parse().unwrap());

        let config = Config {
            proxy_port: 9100,
            ..Config::default()
        };
        let route = Route::select(Some("192.0.2.10"), &config).unwrap();
        assert_eq!(route.target, "192.0.2.10:9100".parse().unwrap());
    }

    #[test]
    fn rejects_non_ipv4_proxies() {
        for bad in ["relay.example.com", "[fd00::1]:2169", "fd00::1", "300.0.0.1", ""] {
            let err = Route::select(Some(bad), &Config::default()).unwrap_err();
            assert!(
                matches!(err, HeliumError::InvalidProxyAddr(_)),
                "{:?} must be rejected",
                bad
            );
        }
    }

    #[test]
    fn bad_rendezvous_is_a_config_error() {
        let config = Config {
            rendezvous: "not an endpoint".to_string(),
            ..Config::default()
        };
        let err = Route::select(None, &config).unwrap_err();
        assert!(matches!(err, HeliumError::Config(_)));
    }
}
