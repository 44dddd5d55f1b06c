//! IPv4 subnet arithmetic used to derive the addresses worth probing.
//!
//! Every calculation here works on the 32-bit big-endian value of an address,
//! so `192.168.0.255 + 1` is `192.168.1.0` as you would expect.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::error::{Error, Result};

const MAX_PREFIX: u8 = 32;

/// An IPv4 address paired with a prefix length.
///
/// The address does not have to be the network address. `192.168.86.31/24`
/// is a perfectly good subnet and behaves exactly like `192.168.86.0/24`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Subnet {
    addr: Ipv4Addr,
    prefix: u8,
}

impl Subnet {
    /// Creates a subnet from an address and a prefix length.
    ///
    /// # Errors
    /// Fails if `addr` cannot be reduced to four bytes or if `prefix` is
    /// greater than 32.
    pub fn new(addr: impl Into<IpAddr>, prefix: u8) -> Result<Self> {
        let addr = to_ipv4(addr.into())?;
        if prefix > MAX_PREFIX {
            return Err(Error::InvalidPrefix(prefix.into()));
        }
        Ok(Self { addr, prefix })
    }

    /// Creates a subnet from an address and a dotted netmask such as
    /// `255.255.255.0`.
    ///
    /// # Errors
    /// Fails on non IPv4 input and on masks whose set bits are not contiguous.
    pub fn from_mask(addr: impl Into<IpAddr>, mask: Ipv4Addr) -> Result<Self> {
        let bits = u32::from(mask);
        if bits.leading_ones() != bits.count_ones() {
            return Err(Error::InvalidMask(mask));
        }
        Self::new(addr, bits.leading_ones() as u8)
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn mask(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.mask_bits())
    }

    /// All host bits cleared.
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.addr) & self.mask_bits())
    }

    /// All host bits set.
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.addr) | !self.mask_bits())
    }

    /// First usable host address, `None` for /31 and /32 which have no room
    /// between the network and broadcast addresses.
    pub fn host_min(&self) -> Option<Ipv4Addr> {
        self.has_hosts()
            .then(|| Ipv4Addr::from(u32::from(self.network()) + 1))
    }

    /// Last usable host address, `None` for /31 and /32.
    pub fn host_max(&self) -> Option<Ipv4Addr> {
        self.has_hosts()
            .then(|| Ipv4Addr::from(u32::from(self.broadcast()) - 1))
    }

    /// Number of addresses [`Subnet::hosts`] yields, without building them.
    pub fn host_count(&self) -> u32 {
        match (self.host_min(), self.host_max()) {
            (Some(min), Some(max)) => u32::from(max) - u32::from(min) + 1,
            _ => 0,
        }
    }

    /// Every usable host address in ascending order, excluding the network
    /// and broadcast addresses.
    ///
    /// The list is built eagerly, a /0 holds almost 2^32 addresses. Check
    /// [`Subnet::host_count`] first when the prefix is not under your control.
    pub fn hosts(&self) -> Vec<Ipv4Addr> {
        match (self.host_min(), self.host_max()) {
            (Some(min), Some(max)) => ascending(min, max),
            _ => Vec::new(),
        }
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & self.mask_bits() == u32::from(self.network())
    }

    fn mask_bits(&self) -> u32 {
        u32::MAX
            .checked_shl(u32::from(MAX_PREFIX - self.prefix))
            .unwrap_or(0)
    }

    fn has_hosts(&self) -> bool {
        self.prefix < MAX_PREFIX - 1
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl FromStr for Subnet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| Error::Opaque(format!("{} is missing a prefix length", s).into()))?;
        let addr = addr.trim().parse::<IpAddr>().map_err(|err| {
            Error::Opaque(format!("invalid address in {}, reason: {}", s, err).into())
        })?;
        let prefix = prefix.trim().parse::<u32>().map_err(|err| {
            Error::Opaque(format!("invalid prefix length in {}, reason: {}", s, err).into())
        })?;
        let prefix = u8::try_from(prefix).map_err(|_| Error::InvalidPrefix(prefix))?;
        Self::new(addr, prefix)
    }
}

/// Every address from `from` to `to`, both included, in ascending order.
///
/// The endpoints are compared numerically. When `from` is greater than `to`
/// the sequence is empty.
///
/// # Errors
/// Fails if either endpoint cannot be reduced to four bytes.
pub fn inclusive_sequence(
    from: impl Into<IpAddr>,
    to: impl Into<IpAddr>,
) -> Result<Vec<Ipv4Addr>> {
    let from = to_ipv4(from.into())?;
    let to = to_ipv4(to.into())?;
    Ok(ascending(from, to))
}

/// Reduces an address to its four byte form. IPv4-mapped IPv6 addresses are
/// accepted, anything else IPv6 is rejected.
pub fn to_ipv4(addr: IpAddr) -> Result<Ipv4Addr> {
    match addr {
        IpAddr::V4(v4) => Ok(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped().ok_or(Error::NotIpv4(addr)),
    }
}

fn ascending(from: Ipv4Addr, to: Ipv4Addr) -> Vec<Ipv4Addr> {
    (u32::from(from)..=u32::from(to)).map(Ipv4Addr::from).collect()
}
