//! Addresses derived from hardware addresses and solicitation targets
//!
//! The three derivations neighbor discovery is built on: the EUI-64
//! link-local address of an interface, the solicited-node multicast group
//! of a target, and the Ethernet mapping of an IPv6 multicast destination.

use crate::ethernet::MacAddr;
use std::net::Ipv6Addr;

/// EUI-64 link-local address for a hardware address.
///
/// `fe80::` with the address split around `ff:fe` and the universal/local
/// bit of the first octet flipped.
pub fn link_local_for(mac: &MacAddr) -> Ipv6Addr {
    let ll = mac.octets();
    let mut octets = [0u8; 16];
    octets[0] = 0xfe;
    octets[1] = 0x80;
    octets[8] = ll[0] ^ 0x02;
    octets[9] = ll[1];
    octets[10] = ll[2];
    octets[11] = 0xff;
    octets[12] = 0xfe;
    octets[13] = ll[3];
    octets[14] = ll[4];
    octets[15] = ll[5];
    Ipv6Addr::from(octets)
}

/// Solicited-node multicast address for a unicast address.
///
/// `ff02::1:ff00:0/104` plus the low 24 bits of the address.
pub fn solicited_node(addr: &Ipv6Addr) -> Ipv6Addr {
    let src = addr.octets();
    let mut octets = [0u8; 16];
    octets[0] = 0xff;
    octets[1] = 0x02;
    octets[11] = 0x01;
    octets[12] = 0xff;
    octets[13] = src[13];
    octets[14] = src[14];
    octets[15] = src[15];
    Ipv6Addr::from(octets)
}

/// Ethernet address for an IPv6 multicast destination.
///
/// `33:33` plus the low 32 bits of the destination address.
pub fn multicast_mac(addr: &Ipv6Addr) -> MacAddr {
    let dst = addr.octets();
    MacAddr::new([0x33, 0x33, dst[12], dst[13], dst[14], dst[15]])
}
