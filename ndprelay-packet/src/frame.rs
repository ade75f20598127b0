//! Frame-level NDP codec
//!
//! Decode of a complete captured frame (Ethernet + IPv6 + optional
//! Hop-by-Hop chain + ICMPv6 NS/NA) into a validated [`NdpMessage`], and
//! the matching encode path used for transmission. The decoder enforces
//! every length relation before touching a field and verifies the ICMPv6
//! checksum before anything acts on the message; all wire data is treated
//! as attacker-controlled.

use crate::checksum;
use crate::ethernet::{EthernetHeader, MacAddr, ETHERTYPE_IPV6};
use crate::ipv6::{self, Ipv6Header, NEXT_HEADER_ICMPV6};
use crate::ndp::{self, NeighborAdvert, NeighborSolicit};
use bytes::{BufMut, BytesMut};
use std::net::Ipv6Addr;

/// Combined Ethernet + IPv6 header size; every NDP frame starts this way.
pub const HEADER_LEN: usize = EthernetHeader::SIZE + Ipv6Header::SIZE;

/// A validated neighbor discovery message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NdpMessage {
    /// Neighbor Solicitation
    Solicit {
        /// IPv6 source; the unspecified address for DAD probes
        source: Ipv6Addr,
        /// IPv6 destination, normally a solicited-node multicast group
        destination: Ipv6Addr,
        /// Address being resolved
        target: Ipv6Addr,
        /// Sender's link-layer address, absent for DAD probes
        source_ll: Option<MacAddr>,
    },
    /// Neighbor Advertisement
    Advert {
        /// Address being advertised
        target: Ipv6Addr,
        /// Router flag
        router: bool,
        /// Solicited flag
        solicited: bool,
        /// Override flag
        override_flag: bool,
    },
}

/// Decode and validate a captured frame.
///
/// Returns `None` for anything that is not a well-formed Ethernet/IPv6
/// NS or NA with a correct checksum. Drops are silent; malformed and
/// foreign traffic is continuous on a shared segment.
pub fn parse(frame: &[u8]) -> Option<NdpMessage> {
    if frame.len() < HEADER_LEN {
        return None;
    }

    let eth = EthernetHeader::parse(frame)?;
    if eth.ethertype != ETHERTYPE_IPV6 {
        return None;
    }

    let ip6 = Ipv6Header::parse(&frame[EthernetHeader::SIZE..])?;
    let payload = &frame[HEADER_LEN..];

    // Declared and captured lengths must agree exactly; padding or
    // truncation would desynchronize every offset below.
    if ip6.payload_length as usize != payload.len() {
        return None;
    }

    let offset = ipv6::icmp6_offset(ip6.next_header, payload)?;
    let icmp6 = &payload[offset..];
    if icmp6.len() < ndp::ICMP6_HEADER_LEN {
        return None;
    }

    if !checksum::verify(&ip6.source, &ip6.destination, icmp6) {
        return None;
    }

    match icmp6[0] {
        ndp::NEIGHBOR_SOLICIT => {
            let ns = NeighborSolicit::parse(icmp6, !ip6.source.is_unspecified())?;
            Some(NdpMessage::Solicit {
                source: ip6.source,
                destination: ip6.destination,
                target: ns.target,
                source_ll: ns.source_ll,
            })
        }
        ndp::NEIGHBOR_ADVERT => {
            let na = NeighborAdvert::parse(icmp6)?;
            Some(NdpMessage::Advert {
                target: na.target,
                router: na.router,
                solicited: na.solicited,
                override_flag: na.override_flag,
            })
        }
        _ => None,
    }
}

/// Assemble a complete outbound frame around an ICMPv6 message.
///
/// `icmp6` is an encoded NS or NA with a zeroed checksum field; the
/// checksum is computed here and patched in. Hop limit is 255 as RFC 4861
/// requires for neighbor discovery.
pub fn build(
    source_ll: MacAddr,
    destination_ll: MacAddr,
    source: Ipv6Addr,
    destination: Ipv6Addr,
    icmp6: &[u8],
) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + icmp6.len());

    EthernetHeader {
        destination: destination_ll,
        source: source_ll,
        ethertype: ETHERTYPE_IPV6,
    }
    .put(&mut buf);

    Ipv6Header {
        source,
        destination,
        payload_length: icmp6.len() as u16,
        next_header: NEXT_HEADER_ICMPV6,
        hop_limit: 255,
    }
    .put(&mut buf);

    buf.put_slice(icmp6);

    let mut frame = buf.to_vec();
    let sum = checksum::icmp6_checksum(&source, &destination, icmp6);
    frame[HEADER_LEN + 2..HEADER_LEN + 4].copy_from_slice(&sum.to_be_bytes());
    frame
}
