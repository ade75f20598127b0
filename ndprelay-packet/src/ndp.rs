//! ICMPv6 Neighbor Discovery messages - RFC 4861
//!
//! Neighbor Solicitation and Neighbor Advertisement, the two message kinds
//! an NDP proxy handles, plus the link-layer address options they carry.
//! Both messages share the same fixed shape: 8-byte ICMPv6 header (the
//! second word holds the NA flags), 16-byte target address, options.

use crate::ethernet::MacAddr;
use bytes::{BufMut, BytesMut};
use std::net::Ipv6Addr;

/// ICMPv6 type for Neighbor Solicitation (135).
pub const NEIGHBOR_SOLICIT: u8 = 135;

/// ICMPv6 type for Neighbor Advertisement (136).
pub const NEIGHBOR_ADVERT: u8 = 136;

/// Option type for Source Link-Layer Address (1).
pub const OPT_SOURCE_LINK_ADDR: u8 = 1;

/// Option type for Target Link-Layer Address (2).
pub const OPT_TARGET_LINK_ADDR: u8 = 2;

/// Fixed ICMPv6 header size (type, code, checksum, one data word).
pub const ICMP6_HEADER_LEN: usize = 8;

/// Fixed size of an NS or NA message before options.
pub const MESSAGE_LEN: usize = ICMP6_HEADER_LEN + 16;

/// Size of a link-layer address option (one 8-byte unit).
const LL_ADDR_OPT_LEN: usize = 8;

const FLAG_ROUTER: u32 = 0x8000_0000;
const FLAG_SOLICITED: u32 = 0x4000_0000;
const FLAG_OVERRIDE: u32 = 0x2000_0000;

/// Neighbor Solicitation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborSolicit {
    /// Address being resolved
    pub target: Ipv6Addr,
    /// Source Link-Layer Address option
    pub source_ll: Option<MacAddr>,
}

impl NeighborSolicit {
    /// Parse an NS from a complete ICMPv6 message.
    ///
    /// When `expect_source_ll` is set (the IPv6 source was not the
    /// unspecified address) a Source Link-Layer Address option must follow
    /// the fixed fields with type 1 and length exactly one 8-byte unit;
    /// anything else rejects the message. Duplicate-address-detection
    /// probes (`expect_source_ll` false) carry no link info and any
    /// trailing options are left alone.
    pub fn parse(icmp6: &[u8], expect_source_ll: bool) -> Option<Self> {
        if icmp6.len() < MESSAGE_LEN {
            return None;
        }

        let mut target = [0u8; 16];
        target.copy_from_slice(&icmp6[8..24]);

        let source_ll = if expect_source_ll {
            if icmp6.len() - MESSAGE_LEN < LL_ADDR_OPT_LEN {
                return None;
            }
            let opt = &icmp6[MESSAGE_LEN..];
            if opt[0] != OPT_SOURCE_LINK_ADDR || opt[1] != 1 {
                return None;
            }
            Some(MacAddr::from_slice(&opt[2..8])?)
        } else {
            None
        };

        Some(Self {
            target: Ipv6Addr::from(target),
            source_ll,
        })
    }

    /// Encode to a complete ICMPv6 message with a zeroed checksum field
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(MESSAGE_LEN + LL_ADDR_OPT_LEN);
        buf.put_u8(NEIGHBOR_SOLICIT);
        buf.put_u8(0);
        buf.put_u16(0); // checksum, filled at frame level
        buf.put_u32(0); // reserved
        buf.put_slice(&self.target.octets());

        if let Some(ll) = self.source_ll {
            buf.put_u8(OPT_SOURCE_LINK_ADDR);
            buf.put_u8(1);
            buf.put_slice(ll.as_bytes());
        }

        buf.to_vec()
    }
}

/// Neighbor Advertisement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborAdvert {
    /// Router flag
    pub router: bool,
    /// Solicited flag
    pub solicited: bool,
    /// Override flag
    pub override_flag: bool,
    /// Address being advertised
    pub target: Ipv6Addr,
    /// Target Link-Layer Address option
    pub target_ll: Option<MacAddr>,
}

impl NeighborAdvert {
    /// Parse an NA from a complete ICMPv6 message.
    ///
    /// Only the fixed fields are required; a well-formed Target Link-Layer
    /// Address option is picked up when present, unknown options are
    /// skipped.
    pub fn parse(icmp6: &[u8]) -> Option<Self> {
        if icmp6.len() < MESSAGE_LEN {
            return None;
        }

        let flags = u32::from_be_bytes([icmp6[4], icmp6[5], icmp6[6], icmp6[7]]);
        let mut target = [0u8; 16];
        target.copy_from_slice(&icmp6[8..24]);

        let mut target_ll = None;
        let mut offset = MESSAGE_LEN;
        while icmp6.len() - offset >= 2 {
            let len = 8 * icmp6[offset + 1] as usize;
            if len == 0 || icmp6.len() - offset < len {
                break;
            }
            if icmp6[offset] == OPT_TARGET_LINK_ADDR && len == LL_ADDR_OPT_LEN {
                target_ll = MacAddr::from_slice(&icmp6[offset + 2..offset + 8]);
            }
            offset += len;
        }

        Some(Self {
            router: flags & FLAG_ROUTER != 0,
            solicited: flags & FLAG_SOLICITED != 0,
            override_flag: flags & FLAG_OVERRIDE != 0,
            target: Ipv6Addr::from(target),
            target_ll,
        })
    }

    /// Encode to a complete ICMPv6 message with a zeroed checksum field
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut flags = 0u32;
        if self.router {
            flags |= FLAG_ROUTER;
        }
        if self.solicited {
            flags |= FLAG_SOLICITED;
        }
        if self.override_flag {
            flags |= FLAG_OVERRIDE;
        }

        let mut buf = BytesMut::with_capacity(MESSAGE_LEN + LL_ADDR_OPT_LEN);
        buf.put_u8(NEIGHBOR_ADVERT);
        buf.put_u8(0);
        buf.put_u16(0); // checksum, filled at frame level
        buf.put_u32(flags);
        buf.put_slice(&self.target.octets());

        if let Some(ll) = self.target_ll {
            buf.put_u8(OPT_TARGET_LINK_ADDR);
            buf.put_u8(1);
            buf.put_slice(ll.as_bytes());
        }

        buf.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: MacAddr = MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);

    fn target() -> Ipv6Addr {
        "2001:db8::1".parse().unwrap()
    }

    #[test]
    fn test_ns_roundtrip_with_source_ll() {
        let ns = NeighborSolicit {
            target: target(),
            source_ll: Some(MAC),
        };

        let bytes = ns.to_bytes();
        assert_eq!(bytes.len(), MESSAGE_LEN + 8);
        assert_eq!(bytes[0], NEIGHBOR_SOLICIT);
        assert_eq!(NeighborSolicit::parse(&bytes, true), Some(ns));
    }

    #[test]
    fn test_ns_without_source_ll() {
        let ns = NeighborSolicit {
            target: target(),
            source_ll: None,
        };

        let bytes = ns.to_bytes();
        assert_eq!(bytes.len(), MESSAGE_LEN);
        assert_eq!(NeighborSolicit::parse(&bytes, false), Some(ns));
        // The same bytes fail when an option is required
        assert_eq!(NeighborSolicit::parse(&bytes, true), None);
    }

    #[test]
    fn test_ns_rejects_wrong_option() {
        let ns = NeighborSolicit {
            target: target(),
            source_ll: Some(MAC),
        };

        let mut bytes = ns.to_bytes();
        bytes[MESSAGE_LEN] = OPT_TARGET_LINK_ADDR;
        assert_eq!(NeighborSolicit::parse(&bytes, true), None);

        let mut bytes = ns.to_bytes();
        bytes[MESSAGE_LEN + 1] = 2;
        assert_eq!(NeighborSolicit::parse(&bytes, true), None);
    }

    #[test]
    fn test_ns_truncated() {
        let bytes = NeighborSolicit {
            target: target(),
            source_ll: None,
        }
        .to_bytes();
        assert_eq!(NeighborSolicit::parse(&bytes[..MESSAGE_LEN - 1], false), None);
    }

    #[test]
    fn test_na_roundtrip() {
        let na = NeighborAdvert {
            router: true,
            solicited: true,
            override_flag: false,
            target: target(),
            target_ll: Some(MAC),
        };

        let bytes = na.to_bytes();
        assert_eq!(bytes[0], NEIGHBOR_ADVERT);
        assert_eq!(bytes[4], 0xc0); // router + solicited
        assert_eq!(NeighborAdvert::parse(&bytes), Some(na));
    }

    #[test]
    fn test_na_skips_unknown_options() {
        let na = NeighborAdvert {
            router: false,
            solicited: false,
            override_flag: true,
            target: target(),
            target_ll: None,
        };

        let mut bytes = na.to_bytes();
        // Unknown option (MTU, 1 unit), then a TLLA option
        bytes.extend_from_slice(&[5, 1, 0, 0, 0, 0, 5, 0xdc]);
        bytes.extend_from_slice(&[OPT_TARGET_LINK_ADDR, 1]);
        bytes.extend_from_slice(MAC.as_bytes());

        let parsed = NeighborAdvert::parse(&bytes).unwrap();
        assert_eq!(parsed.target_ll, Some(MAC));
        assert!(parsed.override_flag);
    }

    #[test]
    fn test_na_truncated() {
        let bytes = NeighborAdvert {
            router: false,
            solicited: false,
            override_flag: false,
            target: target(),
            target_ll: None,
        }
        .to_bytes();
        assert_eq!(NeighborAdvert::parse(&bytes[..MESSAGE_LEN - 1]), None);
    }

    #[test]
    fn test_na_zero_length_option_stops_walk() {
        let na = NeighborAdvert {
            router: false,
            solicited: false,
            override_flag: false,
            target: target(),
            target_ll: None,
        };

        let mut bytes = na.to_bytes();
        bytes.extend_from_slice(&[OPT_TARGET_LINK_ADDR, 0, 0, 0, 0, 0, 0, 0]);

        let parsed = NeighborAdvert::parse(&bytes).unwrap();
        assert_eq!(parsed.target_ll, None);
    }
}
