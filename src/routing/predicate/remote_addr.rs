//! RemoteAddr predicate: the client IP falls within one of several CIDR ranges.
//!
//! For IPv4, a bare address or a `/32` range is inclusive (the address
//! itself matches). Wider ranges exclude their network and broadcast
//! addresses, so `192.168.0.0/24` admits `.1` through `.254`. IPv6 ranges
//! are inclusive.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use super::{RoutePredicate, RoutePredicateFactory};
use crate::error::CompileError;
use crate::filter::exchange::ServerExchange;
use crate::routing::args::{ArgumentHints, BoundArgs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subnet {
    V4 {
        network: u32,
        broadcast: u32,
        inclusive: bool,
    },
    V6 {
        network: u128,
        mask: u128,
    },
}

impl Subnet {
    pub fn parse(source: &str) -> Result<Self, String> {
        let (addr, prefix) = match source.split_once('/') {
            Some((addr, prefix)) => (addr.trim(), Some(prefix.trim())),
            None => (source.trim(), None),
        };
        let addr: IpAddr = addr
            .parse()
            .map_err(|e| format!("invalid address '{}': {}", addr, e))?;

        match addr {
            IpAddr::V4(v4) => {
                let prefix = Self::prefix(prefix, 32)?;
                let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
                let network = u32::from(v4) & mask;
                Ok(Subnet::V4 {
                    network,
                    broadcast: network | !mask,
                    inclusive: prefix == 32,
                })
            }
            IpAddr::V6(v6) => {
                let prefix = Self::prefix(prefix, 128)?;
                let mask = if prefix == 0 { 0 } else { u128::MAX << (128 - prefix) };
                Ok(Subnet::V6 {
                    network: u128::from(v6) & mask,
                    mask,
                })
            }
        }
    }

    fn prefix(raw: Option<&str>, max: u32) -> Result<u32, String> {
        match raw {
            None => Ok(max),
            Some(raw) => {
                let prefix: u32 = raw
                    .parse()
                    .map_err(|_| format!("invalid prefix length '{}'", raw))?;
                if prefix > max {
                    return Err(format!("prefix length {} exceeds {}", prefix, max));
                }
                Ok(prefix)
            }
        }
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        let addr = match addr {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(IpAddr::V6(v6)),
            v4 => v4,
        };

        match (self, addr) {
            (
                Subnet::V4 {
                    network,
                    broadcast,
                    inclusive,
                },
                IpAddr::V4(v4),
            ) => {
                let addr = u32::from(v4);
                if *inclusive {
                    addr >= *network && addr <= *broadcast
                } else {
                    addr > *network && addr < *broadcast
                }
            }
            (Subnet::V6 { network, mask }, IpAddr::V6(v6)) => u128::from(v6) & mask == *network,
            _ => false,
        }
    }
}

impl std::fmt::Display for Subnet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subnet::V4 {
                network, broadcast, ..
            } => write!(f, "{}-{}", Ipv4Addr::from(*network), Ipv4Addr::from(*broadcast)),
            Subnet::V6 { network, mask } => {
                write!(f, "{}/{}", Ipv6Addr::from(*network), mask.count_ones())
            }
        }
    }
}

pub struct RemoteAddrPredicateFactory;

impl ArgumentHints for RemoteAddrPredicateFactory {}

impl RoutePredicateFactory for RemoteAddrPredicateFactory {
    fn name(&self) -> &'static str {
        "RemoteAddr"
    }

    fn apply(&self, args: &BoundArgs) -> Result<Arc<dyn RoutePredicate>, CompileError> {
        if args.is_empty() {
            return Err(CompileError::predicate(
                self.name(),
                "at least one address or CIDR range is required",
            ));
        }
        let sources = args
            .values()
            .map(Subnet::parse)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CompileError::predicate("RemoteAddr", e))?;

        Ok(Arc::new(move |exchange: &mut ServerExchange| {
            match exchange.request().remote_addr() {
                Some(addr) => sources.iter().any(|s| s.contains(addr.ip())),
                None => false,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::exchange::GatewayRequest;
    use axum::http::{HeaderMap, Method};

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_host_inclusive_for_single_address() {
        let exact = Subnet::parse("10.0.0.5").unwrap();
        assert!(exact.contains(ip("10.0.0.5")));
        assert!(!exact.contains(ip("10.0.0.6")));

        let slash32 = Subnet::parse("10.0.0.5/32").unwrap();
        assert_eq!(exact, slash32);
    }

    #[test]
    fn test_range_excludes_network_and_broadcast() {
        let subnet = Subnet::parse("192.168.0.0/24").unwrap();
        assert!(subnet.contains(ip("192.168.0.1")));
        assert!(subnet.contains(ip("192.168.0.254")));
        assert!(!subnet.contains(ip("192.168.0.0")));
        assert!(!subnet.contains(ip("192.168.0.255")));
        assert!(!subnet.contains(ip("192.168.1.1")));
    }

    #[test]
    fn test_ipv4_mapped_and_ipv6() {
        let subnet = Subnet::parse("192.168.0.0/16").unwrap();
        assert!(subnet.contains(ip("::ffff:192.168.3.4")));

        let v6 = Subnet::parse("2001:db8::/32").unwrap();
        assert!(v6.contains(ip("2001:db8::1")));
        assert!(!v6.contains(ip("2001:db9::1")));
        assert!(!v6.contains(ip("192.168.0.1")));
    }

    #[test]
    fn test_invalid_sources_rejected() {
        assert!(Subnet::parse("not-an-ip").is_err());
        assert!(Subnet::parse("10.0.0.0/33").is_err());
        assert!(RemoteAddrPredicateFactory.apply(&BoundArgs::default()).is_err());
    }

    #[test]
    fn test_predicate_uses_remote_address() {
        let predicate = RemoteAddrPredicateFactory
            .apply(&BoundArgs::from([("_genkey_0", "127.0.0.1"), ("_genkey_1", "10.0.0.0/8")]))
            .unwrap();

        let request = GatewayRequest::new(Method::GET, "/".parse().unwrap(), HeaderMap::new());
        let mut local = ServerExchange::new(request.clone().with_remote_addr("127.0.0.1:4000".parse().unwrap()));
        let mut inside = ServerExchange::new(request.clone().with_remote_addr("10.1.2.3:4000".parse().unwrap()));
        let mut outside = ServerExchange::new(request.clone().with_remote_addr("172.16.0.1:4000".parse().unwrap()));
        let mut unknown = ServerExchange::new(request);

        assert!(predicate.test(&mut local));
        assert!(predicate.test(&mut inside));
        assert!(!predicate.test(&mut outside));
        assert!(!predicate.test(&mut unknown));
    }
}
