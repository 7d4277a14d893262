use crate::error::{IpamError, Result};
use ipnet::Ipv4Net;
use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;

/// Reduce any textual address to a bare dotted-quad.
///
/// Trims surrounding whitespace and drops everything from the first `/`
/// onward. The store has historically mixed `a.b.c.d` and `a.b.c.d/p`
/// key forms, so every read path passes keys through this function
/// before comparing or inserting. Empty input yields empty output; the
/// result is not validated as an address.
pub fn normalize(input: &str) -> String {
    let trimmed = input.trim();
    match trimmed.split_once('/') {
        Some((bare, _)) => bare.trim().to_string(),
        None => trimmed.to_string(),
    }
}

/// Normalize and parse a textual address into an `Ipv4Addr`.
pub fn parse_bare(input: &str) -> Result<Ipv4Addr> {
    let bare = normalize(input);
    if bare.is_empty() {
        return Err(IpamError::invalid_input("ip address not provided"));
    }
    bare.parse()
        .map_err(|_| IpamError::invalid_input(format!("invalid ip address '{bare}'")))
}

/// A CIDR network over which allocations are distributed.
///
/// Host bits in the input are masked away on parse, matching the
/// permissive parsing the node agents rely on (`10.0.0.5/24` and
/// `10.0.0.0/24` name the same subnet).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    net: Ipv4Net,
}

impl Subnet {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let net: Ipv4Net = trimmed
            .parse()
            .map_err(|_| IpamError::invalid_input(format!("invalid subnet '{trimmed}'")))?;
        Ok(Self { net: net.trunc() })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.net.network()
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        self.net.broadcast()
    }

    pub fn prefix_len(&self) -> u8 {
        self.net.prefix_len()
    }

    /// The `/<prefix>` suffix appended to allocations for legacy callers.
    pub fn cidr_suffix(&self) -> String {
        format!("/{}", self.net.prefix_len())
    }

    /// Candidate addresses in ascending order.
    ///
    /// For prefixes up to /30 this excludes the network and broadcast
    /// addresses; /31 and /32 yield every address and are fenced off by
    /// the reservation set instead.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> {
        self.net.hosts()
    }

    /// Addresses that must never be allocated: the network address, the
    /// broadcast address, and (when the subnet has a usable host range)
    /// the first host, which is the gateway slot.
    pub fn reserved(&self) -> BTreeSet<Ipv4Addr> {
        let mut reserved = BTreeSet::new();
        reserved.insert(self.net.network());
        reserved.insert(self.net.broadcast());
        if self.net.prefix_len() <= 30 {
            reserved.insert(Ipv4Addr::from(u32::from(self.net.network()) + 1));
        }
        reserved
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.net)
    }
}
