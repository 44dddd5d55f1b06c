use std::io;
use std::net::{IpAddr, Ipv4Addr};

use thiserror::Error as ThisError;

pub type OpaqueError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(ThisError, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("failed to open capture session on {interface}, reason: {source}")]
    Open {
        interface: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to write arp request for {target} on {interface}, reason: {source}")]
    Transmit {
        interface: String,
        target: Ipv4Addr,
        #[source]
        source: io::Error,
    },
    #[error("failed to read frames on {interface}, reason: {source}")]
    Receive {
        interface: String,
        #[source]
        source: io::Error,
    },
    #[error("{0} is not an IPv4 address")]
    NotIpv4(IpAddr),
    #[error("invalid prefix length {0}, expected 0..=32")]
    InvalidPrefix(u32),
    #[error("{0} is not a contiguous netmask")]
    InvalidMask(Ipv4Addr),
    #[error("{0}")]
    Opaque(#[from] OpaqueError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[allow(clippy::enum_variant_names)]
#[derive(ThisError, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InputBuildError {
    #[error("sender MAC address is required")]
    MissingSenderMac,
    #[error("sender IP address is required")]
    MissingSenderIp,
    #[error("target IP address is required")]
    MissingTargetIp,
    #[error("{0} is not an IPv4 address")]
    NotIpv4(IpAddr),
}

#[derive(ThisError, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("retransmit interval must be greater than zero")]
    ZeroRetransmitInterval,
}

impl From<InputBuildError> for Error {
    fn from(err: InputBuildError) -> Self {
        match err {
            InputBuildError::NotIpv4(addr) => Error::NotIpv4(addr),
            other => Error::Opaque(other.into()),
        }
    }
}
