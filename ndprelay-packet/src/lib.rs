//! Wire-format codecs for ndprelay
//!
//! This crate holds the pure, OS-independent half of the packet plane:
//! Internet checksums over the IPv6 pseudo-header, Ethernet and IPv6 header
//! codecs, ICMPv6 neighbor discovery message codecs, and the frame-level
//! decoder that turns a captured buffer into a validated NS/NA message.
//!
//! All decoding operates on byte slices with explicit bounds checks; no
//! struct is ever overlaid on untrusted bytes. Parsers return `Option`,
//! where `None` means the frame is malformed or foreign and must be
//! dropped silently; that is steady-state behavior on a shared link.
//!
//! ## Example
//!
//! ```
//! use std::net::Ipv6Addr;
//! use ndprelay_packet::ethernet::MacAddr;
//! use ndprelay_packet::ndp::NeighborAdvert;
//! use ndprelay_packet::frame::{self, NdpMessage};
//!
//! let our_mac = MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
//! let dst_mac = MacAddr::new([0x33, 0x33, 0x00, 0x00, 0x00, 0x01]);
//! let target: Ipv6Addr = "2001:db8::1".parse().unwrap();
//! let dst: Ipv6Addr = "ff02::1".parse().unwrap();
//!
//! let na = NeighborAdvert {
//!     router: false,
//!     solicited: true,
//!     override_flag: false,
//!     target,
//!     target_ll: Some(our_mac),
//! };
//! let bytes = frame::build(our_mac, dst_mac, target, dst, &na.to_bytes());
//!
//! match frame::parse(&bytes) {
//!     Some(NdpMessage::Advert { target: t, solicited, .. }) => {
//!         assert_eq!(t, target);
//!         assert!(solicited);
//!     }
//!     other => panic!("unexpected: {:?}", other),
//! }
//! ```

pub mod addr;
pub mod checksum;
pub mod ethernet;
pub mod frame;
pub mod ipv6;
pub mod ndp;

// Re-export main types
pub use ethernet::{EthernetHeader, MacAddr, ETHERTYPE_IPV6};
pub use frame::NdpMessage;
pub use ipv6::Ipv6Header;
pub use ndp::{NeighborAdvert, NeighborSolicit};
