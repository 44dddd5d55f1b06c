use std::net::{IpAddr, Ipv4Addr};

use pnet::{
    packet::{
        arp::{ArpHardwareTypes, ArpOperations, MutableArpPacket},
        ethernet::{EtherTypes, MutableEthernetPacket},
        Packet,
    },
    util::MacAddr,
};

use crate::{
    constants::{ARP_PACK_LEN, ETH_PACK_LEN, IP_V4_LEN, MAC_ADDR_LEN},
    error::{Error, InputBuildError, Result},
};

/// A broadcast ARP request asking who owns `target_ip`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ArpRequest {
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_ip: Ipv4Addr,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct ArpRequestBuilder {
    sender_mac: Option<MacAddr>,
    sender_ip: Option<IpAddr>,
    target_ip: Option<IpAddr>,
}

impl ArpRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sender_mac(mut self, sender_mac: MacAddr) -> Self {
        self.sender_mac = Some(sender_mac);
        self
    }

    pub fn with_sender_ip(mut self, sender_ip: impl Into<IpAddr>) -> Self {
        self.sender_ip = Some(sender_ip.into());
        self
    }

    pub fn with_target_ip(mut self, target_ip: impl Into<IpAddr>) -> Self {
        self.target_ip = Some(target_ip.into());
        self
    }

    /// # Errors
    /// Fails when a field is missing or when either address is not IPv4.
    pub fn build(&self) -> std::result::Result<ArpRequest, InputBuildError> {
        Ok(ArpRequest {
            sender_mac: self.sender_mac.ok_or(InputBuildError::MissingSenderMac)?,
            sender_ip: ipv4(self.sender_ip.ok_or(InputBuildError::MissingSenderIp)?)?,
            target_ip: ipv4(self.target_ip.ok_or(InputBuildError::MissingTargetIp)?)?,
        })
    }
}

fn ipv4(addr: IpAddr) -> std::result::Result<Ipv4Addr, InputBuildError> {
    crate::range::to_ipv4(addr).map_err(|_| InputBuildError::NotIpv4(addr))
}

impl ArpRequest {
    /// Serializes the request into an Ethernet II frame ready to be written
    /// to a raw socket.
    pub fn to_bytes(&self) -> Result<[u8; ETH_PACK_LEN]> {
        let mut eth_buf = [0; ETH_PACK_LEN];
        let mut eth_packet = MutableEthernetPacket::new(&mut eth_buf)
            .ok_or_else(|| Error::Opaque("failed to create Ethernet frame".into()))?;
        eth_packet.set_destination(MacAddr::broadcast());
        eth_packet.set_source(self.sender_mac);
        eth_packet.set_ethertype(EtherTypes::Arp);

        let mut arp_buf = [0; ARP_PACK_LEN];
        let mut arp_packet = MutableArpPacket::new(&mut arp_buf)
            .ok_or_else(|| Error::Opaque("failed to create ARP packet".into()))?;
        arp_packet.set_hardware_type(ArpHardwareTypes::Ethernet);
        arp_packet.set_protocol_type(EtherTypes::Ipv4);
        arp_packet.set_hw_addr_len(MAC_ADDR_LEN);
        arp_packet.set_proto_addr_len(IP_V4_LEN);
        arp_packet.set_operation(ArpOperations::Request);
        arp_packet.set_sender_hw_addr(self.sender_mac);
        arp_packet.set_sender_proto_addr(self.sender_ip);
        arp_packet.set_target_hw_addr(MacAddr::zero());
        arp_packet.set_target_proto_addr(self.target_ip);

        eth_packet.set_payload(arp_packet.packet());
        Ok(eth_buf)
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    use pnet::{
        packet::{
            arp::{ArpHardwareTypes, ArpOperations, ArpPacket},
            ethernet::{EtherTypes, EthernetPacket},
            Packet,
        },
        util::MacAddr,
    };

    use crate::{error::InputBuildError, request::ArpRequestBuilder};

    const MAC: MacAddr = MacAddr(0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e);

    #[test]
    fn test_frame_layout() {
        let frame = ArpRequestBuilder::new()
            .with_sender_mac(MAC)
            .with_sender_ip(Ipv4Addr::new(192, 168, 86, 31))
            .with_target_ip(Ipv4Addr::new(192, 168, 86, 1))
            .build()
            .unwrap()
            .to_bytes()
            .unwrap();

        assert_eq!(frame.len(), 42);
        assert_eq!(&frame[..6], &[0xff; 6]);
        assert_eq!(&frame[6..12], &[0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]);
        assert_eq!(&frame[12..14], &[0x08, 0x06]);
        // htype, ptype, hlen, plen, op
        assert_eq!(&frame[14..22], &[0x00, 0x01, 0x08, 0x00, 6, 4, 0x00, 0x01]);
        assert_eq!(&frame[28..32], &[192, 168, 86, 31]);
        assert_eq!(&frame[32..38], &[0; 6]);
        assert_eq!(&frame[38..42], &[192, 168, 86, 1]);
    }

    #[test]
    fn test_frame_parses_back() {
        let frame = ArpRequestBuilder::new()
            .with_sender_mac(MAC)
            .with_sender_ip(Ipv4Addr::new(10, 0, 0, 1))
            .with_target_ip(Ipv4Addr::new(10, 0, 0, 200))
            .build()
            .unwrap()
            .to_bytes()
            .unwrap();

        let eth = EthernetPacket::new(&frame).unwrap();
        assert_eq!(eth.get_destination(), MacAddr::broadcast());
        assert_eq!(eth.get_source(), MAC);
        assert_eq!(eth.get_ethertype(), EtherTypes::Arp);

        let arp = ArpPacket::new(eth.payload()).unwrap();
        assert_eq!(arp.get_hardware_type(), ArpHardwareTypes::Ethernet);
        assert_eq!(arp.get_protocol_type(), EtherTypes::Ipv4);
        assert_eq!(arp.get_operation(), ArpOperations::Request);
        assert_eq!(arp.get_sender_hw_addr(), MAC);
        assert_eq!(arp.get_target_hw_addr(), MacAddr::zero());
        assert_eq!(arp.get_target_proto_addr(), Ipv4Addr::new(10, 0, 0, 200));
    }

    #[test]
    fn test_ipv6_input_is_rejected() {
        let v6 = IpAddr::V6(Ipv6Addr::LOCALHOST);
        let result = ArpRequestBuilder::new()
            .with_sender_mac(MAC)
            .with_sender_ip(Ipv4Addr::new(10, 0, 0, 1))
            .with_target_ip(v6)
            .build();
        assert_eq!(result, Err(InputBuildError::NotIpv4(v6)));
    }

    #[test]
    fn test_missing_fields() {
        assert_eq!(
            ArpRequestBuilder::new().build(),
            Err(InputBuildError::MissingSenderMac)
        );
        assert_eq!(
            ArpRequestBuilder::new().with_sender_mac(MAC).build(),
            Err(InputBuildError::MissingSenderIp)
        );
        assert_eq!(
            ArpRequestBuilder::new()
                .with_sender_mac(MAC)
                .with_sender_ip(Ipv4Addr::LOCALHOST)
                .build(),
            Err(InputBuildError::MissingTargetIp)
        );
    }
}
