pub(crate) const MAC_ADDR_LEN: u8 = 6;
pub(crate) const IP_V4_LEN: u8 = 4;
pub(crate) const ARP_PACK_LEN: usize = 28;
pub(crate) const ETH_HEADER_LEN: usize = 14;
pub(crate) const ETH_PACK_LEN: usize = ETH_HEADER_LEN + ARP_PACK_LEN;

/// Largest untagged Ethernet II frame the listener reads in one go.
pub(crate) const MAX_FRAME_LEN: usize = 1514;

/// Replies buffered between the listener and the scan loop.
pub(crate) const REPLY_QUEUE_LEN: usize = 256;
