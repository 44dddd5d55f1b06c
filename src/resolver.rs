use std::net::{IpAddr, Ipv4Addr};

/// Best-effort reverse name lookup.
///
/// Implementations must not fail: a lookup that errors simply yields no
/// names. Lookups run on tokio's blocking pool, so they are free to block.
pub trait Resolver: Send + Sync {
    fn lookup(&self, ip: Ipv4Addr) -> Vec<String>;
}

/// Resolves through the system resolver (`getnameinfo`).
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn lookup(&self, ip: Ipv4Addr) -> Vec<String> {
        let addr = IpAddr::V4(ip);
        match dns_lookup::lookup_addr(&addr) {
            // getnameinfo hands back the numeric form when nothing is registered
            Ok(name) if name != addr.to_string() => vec![name],
            Ok(_) => Vec::new(),
            Err(err) => {
                log::trace!("reverse lookup for {} failed: {}", ip, err);
                Vec::new()
            }
        }
    }
}

/// Skips name resolution entirely.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoResolver;

impl Resolver for NoResolver {
    fn lookup(&self, _ip: Ipv4Addr) -> Vec<String> {
        Vec::new()
    }
}
