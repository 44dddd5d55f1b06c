//! Discover live IPv4 hosts on the local Ethernet segment by ARP scanning.
//!
//! A scan broadcasts an ARP request for every candidate address of a subnet,
//! listens for replies in a background task, re-probes whoever stayed quiet at
//! a fixed interval and hands back every host that answered once the scan
//! window closes.
//!
//! ## Example
//! ```no_run
//! use arpf::{find_interfaces, ScanConfig, Scanner};
//!
//! # async fn run() -> arpf::error::Result<()> {
//! let scanner = Scanner::new(ScanConfig::default());
//! for local in find_interfaces() {
//!     let candidates = local.subnet.hosts();
//!     let hosts = scanner
//!         .scan(&local.interface, local.subnet.addr().into(), &candidates)
//!         .await?;
//!     for host in hosts {
//!         println!("{}", host);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Raw sockets need `CAP_NET_RAW`, so scanning usually runs as root.

pub mod error;
pub mod interface;
pub mod link;
pub mod range;
pub mod request;
pub mod resolver;
pub mod response;
pub mod scanner;

pub(crate) mod constants;

pub use interface::{find_interfaces, Interface, LocalInterface};
pub use range::{inclusive_sequence, Subnet};
pub use request::{ArpRequest, ArpRequestBuilder};
pub use resolver::{NoResolver, Resolver, SystemResolver};
pub use response::ArpResponse;
pub use scanner::{scan, ScanConfig, ScanConfigBuilder, Scanner};
