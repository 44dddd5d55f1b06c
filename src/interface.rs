use std::fmt;
use std::net::IpAddr;

use pnet::datalink::{self, NetworkInterface};
use pnet::util::MacAddr;

use crate::range::Subnet;

/// The link a scan runs on.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Interface {
    pub name: String,
    pub mac: MacAddr,
}

impl Interface {
    pub fn new(name: &str, mac: MacAddr) -> Self {
        Self {
            name: name.into(),
            mac,
        }
    }
}

/// An interface that is up, is not a loopback, and carries an IPv4 address.
#[derive(Clone, Debug)]
pub struct LocalInterface {
    pub interface: Interface,
    /// The first IPv4 address configured on the interface.
    pub subnet: Subnet,
    pub mtu: Option<usize>,
    /// Names of the link flags that are set, such as `up` or `broadcast`.
    pub flags: Vec<&'static str>,
}

impl fmt::Display for LocalInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: flags={}", self.interface.name, self.flags.join("|"))?;
        if let Some(mtu) = self.mtu {
            write!(f, " mtu {}", mtu)?;
        }
        writeln!(f)?;
        writeln!(f, "\tether {}", self.interface.mac)?;
        write!(
            f,
            "\tinet {} netmask 0x{:08x} broadcast {}",
            self.subnet.addr(),
            u32::from(self.subnet.mask()),
            self.subnet.broadcast()
        )
    }
}

/// Lists the interfaces worth scanning, in the order the system reports them.
pub fn find_interfaces() -> Vec<LocalInterface> {
    datalink::interfaces()
        .iter()
        .filter_map(local_interface)
        .collect()
}

fn local_interface(iface: &NetworkInterface) -> Option<LocalInterface> {
    if !iface.is_up() || iface.is_loopback() {
        log::trace!("skipping interface {}", iface.name);
        return None;
    }
    let mac = iface.mac.filter(|mac| *mac != MacAddr::zero())?;
    let subnet = iface.ips.iter().find_map(|net| match net.ip() {
        IpAddr::V4(ipv4) => Subnet::new(ipv4, net.prefix()).ok(),
        IpAddr::V6(_) => None,
    })?;
    Some(LocalInterface {
        interface: Interface::new(&iface.name, mac),
        subnet,
        mtu: mtu(iface),
        flags: flag_names(iface),
    })
}

fn flag_names(iface: &NetworkInterface) -> Vec<&'static str> {
    [
        (iface.is_up(), "up"),
        (iface.is_broadcast(), "broadcast"),
        (iface.is_loopback(), "loopback"),
        (iface.is_point_to_point(), "pointtopoint"),
        (iface.is_multicast(), "multicast"),
    ]
    .into_iter()
    .filter_map(|(set, name)| set.then_some(name))
    .collect()
}

#[cfg(target_os = "linux")]
fn mtu(iface: &NetworkInterface) -> Option<usize> {
    std::fs::read_to_string(format!("/sys/class/net/{}/mtu", iface.name))
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[cfg(not(target_os = "linux"))]
fn mtu(_iface: &NetworkInterface) -> Option<usize> {
    None
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use pnet::datalink::NetworkInterface;
    use pnet::ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};
    use pnet::util::MacAddr;

    use crate::interface::{local_interface, Interface, LocalInterface};

    const IFF_UP: u32 = 0x1;
    const IFF_BROADCAST: u32 = 0x2;
    const IFF_LOOPBACK: u32 = 0x8;
    const MAC: MacAddr = MacAddr(0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e);

    fn iface(flags: u32, mac: Option<MacAddr>, ips: Vec<IpNetwork>) -> NetworkInterface {
        NetworkInterface {
            name: "eth7".into(),
            description: String::new(),
            index: 7,
            mac,
            ips,
            flags,
        }
    }

    fn v4(a: u8, b: u8, c: u8, d: u8, prefix: u8) -> IpNetwork {
        IpNetwork::V4(Ipv4Network::new(Ipv4Addr::new(a, b, c, d), prefix).unwrap())
    }

    #[test]
    fn test_picks_first_ipv4() {
        let v6 = IpNetwork::V6(Ipv6Network::new("fe80::1".parse().unwrap(), 64).unwrap());
        let local = local_interface(&iface(
            IFF_UP,
            Some(MAC),
            vec![v6, v4(192, 168, 86, 31, 24), v4(10, 0, 0, 1, 8)],
        ))
        .unwrap();
        assert_eq!(local.interface, Interface::new("eth7", MAC));
        assert_eq!(local.subnet.to_string(), "192.168.86.31/24");
        assert_eq!(local.flags, vec!["up"]);
    }

    #[test]
    fn test_skips_unusable_interfaces() {
        let ips = vec![v4(192, 168, 86, 31, 24)];
        assert!(local_interface(&iface(0, Some(MAC), ips.clone())).is_none());
        assert!(local_interface(&iface(IFF_UP | IFF_LOOPBACK, Some(MAC), ips.clone())).is_none());
        assert!(local_interface(&iface(IFF_UP, None, ips.clone())).is_none());
        assert!(local_interface(&iface(IFF_UP, Some(MacAddr::zero()), ips)).is_none());
        assert!(local_interface(&iface(IFF_UP, Some(MAC), Vec::new())).is_none());
    }

    #[test]
    fn test_flags_come_from_the_interface() {
        let nic = iface(
            IFF_UP | IFF_BROADCAST,
            Some(MacAddr(0xde, 0xad, 0xbe, 0xef, 0x10, 0x20)),
            vec![v4(192, 168, 86, 31, 24)],
        );
        let local = local_interface(&nic).unwrap();
        assert_eq!(local.flags, vec!["up", "broadcast"]);
        let shown = local.to_string();
        assert!(shown.starts_with("eth7: flags=up|broadcast"), "{}", shown);
        assert!(
            shown.ends_with("\tinet 192.168.86.31 netmask 0xffffff00 broadcast 192.168.86.255"),
            "{}",
            shown
        );
    }

    #[test]
    fn test_display() {
        let local = LocalInterface {
            interface: Interface::new("eth7", MacAddr(0xde, 0xad, 0xbe, 0xef, 0x10, 0x20)),
            subnet: "10.1.2.3/20".parse().unwrap(),
            mtu: Some(1500),
            flags: vec!["up", "broadcast", "multicast"],
        };
        assert_eq!(
            local.to_string(),
            "eth7: flags=up|broadcast|multicast mtu 1500\n\tether de:ad:be:ef:10:20\n\tinet 10.1.2.3 netmask 0xfffff000 broadcast 10.1.15.255"
        );
    }
}
