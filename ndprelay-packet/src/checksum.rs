//! ICMPv6 checksum calculation over the IPv6 pseudo-header
//!
//! The Internet checksum (RFC 1071) folded over the RFC 8200 pseudo-header.
//! The exact layout and folding must be reproduced bit for bit for
//! interoperability; there is no approximation tolerance.

use crate::ipv6::NEXT_HEADER_ICMPV6;
use std::net::Ipv6Addr;

/// Size of the IPv6 pseudo-header prepended for upper-layer checksums.
pub const PSEUDO_HEADER_LEN: usize = 40;

/// Fold a byte slice into a running 16-bit one's-complement sum.
///
/// Consumes the data as big-endian 16-bit words, folding the carry back in
/// after every addition (a sum above `0xffff` wraps by subtracting
/// `0xffff`). A trailing odd byte counts as a 16-bit word with a zero low
/// byte. Chaining calls is valid as long as every chunk but the last has
/// even length.
pub fn checksum(mut sum: u32, data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(2);

    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
        if sum > 0xffff {
            sum -= 0xffff;
        }
    }

    if let Some(&byte) = chunks.remainder().first() {
        sum += (byte as u32) << 8;
        if sum > 0xffff {
            sum -= 0xffff;
        }
    }

    sum
}

/// Compute the checksum of a complete ICMPv6 message.
///
/// `icmp6` is the full ICMPv6 portion as it appears on the wire, starting
/// at the type byte; the embedded checksum field is treated as zero. The
/// returned value goes into the wire field big-endian. The message must be
/// at least the 8-byte fixed header.
pub fn icmp6_checksum(source: &Ipv6Addr, destination: &Ipv6Addr, icmp6: &[u8]) -> u16 {
    let mut pseudo = [0u8; PSEUDO_HEADER_LEN];
    pseudo[..16].copy_from_slice(&source.octets());
    pseudo[16..32].copy_from_slice(&destination.octets());
    pseudo[32..36].copy_from_slice(&(icmp6.len() as u32).to_be_bytes());
    pseudo[39] = NEXT_HEADER_ICMPV6;

    let mut sum = checksum(0xffff, &pseudo);
    // Type and code, then everything past the checksum field. Skipping the
    // field is equivalent to summing it as zero.
    sum = checksum(sum, &icmp6[..2]);
    sum = checksum(sum, &icmp6[4..]);

    !(sum as u16)
}

/// Validate the checksum embedded in an ICMPv6 message.
///
/// Recomputes the checksum and compares it against the wire field. The
/// caller must have verified `icmp6.len() >= 8` already.
pub fn verify(source: &Ipv6Addr, destination: &Ipv6Addr, icmp6: &[u8]) -> bool {
    icmp6_checksum(source, destination, icmp6) == u16::from_be_bytes([icmp6[2], icmp6[3]])
}
