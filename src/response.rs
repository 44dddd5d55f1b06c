use std::fmt;
use std::net::Ipv4Addr;

use pnet::packet::arp::{Arp, ArpHardwareTypes, ArpOperations, ArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::{FromPacket, Packet};
use pnet::util::MacAddr;
use tokio::sync::mpsc;

use crate::constants::MAX_FRAME_LEN;
use crate::error::{Error, Result};
use crate::link::FrameReader;

/// A host that answered one of our requests.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct ArpResponse {
    /// Reverse DNS names, empty when none could be resolved.
    pub names: Vec<String>,
    /// The protocol address the host claimed.
    pub ip: Ipv4Addr,
    /// The hardware address that answered.
    pub mac: MacAddr,
}

impl ArpResponse {
    pub fn new(ip: Ipv4Addr, mac: MacAddr, names: Vec<String>) -> Self {
        Self { names, ip, mac }
    }
}

impl fmt::Display for ArpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) at {}", self.names.join(" "), self.ip, self.mac)
    }
}

/// Reads frames off the link and forwards every ARP reply that did not come
/// from `local_mac`.
pub(super) struct Listener<R> {
    interface_name: String,
    local_mac: MacAddr,
    reader: R,
    replies: mpsc::Sender<Arp>,
}

impl<R: FrameReader> Listener<R> {
    pub(super) fn new(
        interface_name: &str,
        local_mac: MacAddr,
        reader: R,
        replies: mpsc::Sender<Arp>,
    ) -> Self {
        Self {
            interface_name: interface_name.to_string(),
            local_mac,
            reader,
            replies,
        }
    }

    /// Runs until the link fails or the receiving side goes away. Dropping
    /// the listener closes the reply channel.
    pub(super) async fn listen(&mut self) -> Result<()> {
        let mut buf = [0; MAX_FRAME_LEN];
        loop {
            let read_bytes =
                self.reader
                    .read_frame(&mut buf)
                    .await
                    .map_err(|source| Error::Receive {
                        interface: self.interface_name.clone(),
                        source,
                    })?;
            let Some(arp) = parse_arp_packet(&buf[..read_bytes]) else {
                continue;
            };
            if arp.operation != ArpOperations::Reply {
                continue;
            }
            if arp.sender_hw_addr == self.local_mac {
                log::trace!("ignoring own reply for {}", arp.sender_proto_addr);
                continue;
            }
            if self.replies.send(arp).await.is_err() {
                log::debug!("reply receiver dropped on {}", self.interface_name);
                return Ok(());
            }
        }
    }
}

/// Decodes an Ethernet II frame carrying an Ethernet/IPv4 ARP packet.
pub(super) fn parse_arp_packet(bytes: &[u8]) -> Option<Arp> {
    let ethernet_packet = EthernetPacket::new(bytes)?;
    if ethernet_packet.get_ethertype() != EtherTypes::Arp {
        return None;
    }
    let arp = ArpPacket::new(ethernet_packet.payload())?.from_packet();
    (arp.hardware_type == ArpHardwareTypes::Ethernet && arp.protocol_type == EtherTypes::Ipv4)
        .then_some(arp)
}

#[cfg(test)]
pub(crate) fn reply_frame(
    from_mac: MacAddr,
    from_ip: Ipv4Addr,
    to_mac: MacAddr,
    to_ip: Ipv4Addr,
) -> Vec<u8> {
    use crate::constants::{ARP_PACK_LEN, ETH_PACK_LEN, IP_V4_LEN, MAC_ADDR_LEN};
    use pnet::packet::arp::MutableArpPacket;
    use pnet::packet::ethernet::MutableEthernetPacket;

    let mut arp_buf = [0; ARP_PACK_LEN];
    let mut arp_response = MutableArpPacket::new(&mut arp_buf).unwrap();
    arp_response.set_hardware_type(ArpHardwareTypes::Ethernet);
    arp_response.set_protocol_type(EtherTypes::Ipv4);
    arp_response.set_hw_addr_len(MAC_ADDR_LEN);
    arp_response.set_proto_addr_len(IP_V4_LEN);
    arp_response.set_operation(ArpOperations::Reply);
    arp_response.set_sender_proto_addr(from_ip);
    arp_response.set_sender_hw_addr(from_mac);
    arp_response.set_target_proto_addr(to_ip);
    arp_response.set_target_hw_addr(to_mac);

    let mut response_buf = vec![0; ETH_PACK_LEN];
    let mut eth_response = MutableEthernetPacket::new(&mut response_buf).unwrap();
    eth_response.set_ethertype(EtherTypes::Arp);
    eth_response.set_destination(to_mac);
    eth_response.set_source(from_mac);
    eth_response.set_payload(arp_response.packet());
    response_buf
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use pnet::packet::arp::ArpOperations;
    use pnet::util::MacAddr;

    use crate::request::ArpRequestBuilder;
    use crate::response::{parse_arp_packet, reply_frame, ArpResponse};

    const HOST_MAC: MacAddr = MacAddr(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff);
    const LOCAL_MAC: MacAddr = MacAddr(0x02, 0x42, 0xac, 0x11, 0x22, 0x33);

    #[test]
    fn test_display_with_names() {
        let response = ArpResponse::new(
            Ipv4Addr::new(192, 168, 86, 20),
            HOST_MAC,
            vec!["printer.lan.".into(), "printer.".into()],
        );
        assert_eq!(
            response.to_string(),
            "printer.lan. printer. (192.168.86.20) at aa:bb:cc:dd:ee:ff"
        );
    }

    #[test]
    fn test_display_without_names_keeps_leading_space() {
        let response = ArpResponse::new(Ipv4Addr::new(10, 0, 0, 2), HOST_MAC, Vec::new());
        assert_eq!(response.to_string(), " (10.0.0.2) at aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_parse_reply() {
        let frame = reply_frame(
            HOST_MAC,
            Ipv4Addr::new(10, 0, 0, 2),
            LOCAL_MAC,
            Ipv4Addr::new(10, 0, 0, 1),
        );
        let arp = parse_arp_packet(&frame).unwrap();
        assert_eq!(arp.operation, ArpOperations::Reply);
        assert_eq!(arp.sender_hw_addr, HOST_MAC);
        assert_eq!(arp.sender_proto_addr, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(arp.target_proto_addr, Ipv4Addr::new(10, 0, 0, 1));
    }

    #[test]
    fn test_parse_request() {
        let frame = ArpRequestBuilder::new()
            .with_sender_mac(LOCAL_MAC)
            .with_sender_ip(Ipv4Addr::new(10, 0, 0, 1))
            .with_target_ip(Ipv4Addr::new(10, 0, 0, 2))
            .build()
            .unwrap()
            .to_bytes()
            .unwrap();
        let arp = parse_arp_packet(&frame).unwrap();
        assert_eq!(arp.operation, ArpOperations::Request);
    }

    #[test]
    fn test_parse_ignores_other_traffic() {
        let mut frame = reply_frame(
            HOST_MAC,
            Ipv4Addr::new(10, 0, 0, 2),
            LOCAL_MAC,
            Ipv4Addr::new(10, 0, 0, 1),
        );
        assert!(parse_arp_packet(&frame[..20]).is_none());
        // rewrite the ethertype to IPv4
        frame[12..14].copy_from_slice(&[0x08, 0x00]);
        assert!(parse_arp_packet(&frame).is_none());
        assert!(parse_arp_packet(&[]).is_none());
    }
}
