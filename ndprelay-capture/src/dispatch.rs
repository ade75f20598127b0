//! Receive-path dispatch
//!
//! Stateless routing of captured frames: validate, then hand neighbor
//! solicitations to the interface's proxy policy and neighbor
//! advertisements to the matching session. Nothing is queued and nothing
//! is retried; invalid or unmatched input is dropped on the spot, which is
//! steady-state behavior for an NDP listener on a shared segment.
//!
//! The drain loops run synchronously inside one readiness callback and
//! read until the handle would block, so a batch is always fully processed
//! before control returns to the event loop.

use crate::iface::Iface;
#[cfg(target_os = "linux")]
use crate::iface::IfaceRegistry;
use ndprelay_packet::frame::{self, NdpMessage};
#[cfg(target_os = "linux")]
use tracing::error;

/// Route one validated frame to the interface's collaborators.
///
/// NS goes to the attached proxy policy, if any. NA is matched against the
/// interface's linked sessions by target address; the scan is linear,
/// which is fine while sessions-per-interface stays small but is the bound
/// to revisit if that ever changes.
pub fn handle_frame(iface: &Iface, bytes: &[u8]) {
    let Some(msg) = frame::parse(bytes) else {
        return;
    };

    match msg {
        NdpMessage::Solicit {
            source,
            destination,
            target,
            source_ll,
        } => {
            let Some(proxy) = iface.proxy.as_ref().and_then(|p| p.upgrade()) else {
                return;
            };
            proxy
                .borrow_mut()
                .handle_solicit(source, destination, target, source_ll);
        }
        NdpMessage::Advert { target, .. } => {
            for session in &iface.sessions {
                let Some(session) = session.upgrade() else {
                    continue;
                };
                let mut session = session.borrow_mut();
                if session.target() == target {
                    session.handle_advert();
                    return;
                }
            }
        }
    }
}

/// Drain the shared capture socket.
///
/// Called when the event loop reports the socket readable. Reads frames
/// until the socket would block, resolving each one's interface from the
/// receive metadata; frames from interfaces this process never opened are
/// dropped.
#[cfg(target_os = "linux")]
pub fn drain(registry: &IfaceRegistry) {
    let Some(io) = registry.shared_io() else {
        return;
    };

    let mut buf = vec![0u8; registry.config().recv_buffer_len];
    loop {
        match io.recv(&mut buf) {
            Ok((len, ifindex)) => {
                if let Some(iface) = registry.get(ifindex) {
                    handle_frame(iface, &buf[..len]);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
            Err(e) => {
                error!("Packet capture error: {}", e);
                return;
            }
        }
    }
}

/// Drain one interface's capture device.
///
/// `bpf` reads return batches: frames packed back to back, each preceded
/// by a header giving capture length and header length, advanced with
/// 32-bit word alignment.
#[cfg(not(target_os = "linux"))]
pub fn drain_iface(iface: &Iface) {
    use tracing::error;

    let Some(device) = iface.device() else {
        return;
    };

    let mut buf = vec![0u8; device.buffer_len()];
    loop {
        let len = match device.read(&mut buf) {
            Ok(len) => len,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
            Err(e) => {
                error!("Packet capture error: {}", e);
                return;
            }
        };

        let mut offset = 0;
        while offset < len {
            if len - offset < std::mem::size_of::<libc::bpf_hdr>() {
                break;
            }
            let hdr: libc::bpf_hdr =
                unsafe { std::ptr::read_unaligned(buf[offset..].as_ptr() as *const _) };
            let hdrlen = hdr.bh_hdrlen as usize;
            let caplen = hdr.bh_caplen as usize;
            if hdrlen + caplen > len - offset {
                break;
            }

            handle_frame(iface, &buf[offset + hdrlen..offset + hdrlen + caplen]);
            offset += word_align(hdrlen + caplen);
        }
    }
}

/// `BPF_WORDALIGN`: round up to the per-frame alignment boundary.
#[cfg(not(target_os = "linux"))]
const fn word_align(len: usize) -> usize {
    (len + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iface::Iface;
    use ndprelay_core::{NeighborSession, ProxyPolicy};
    use ndprelay_packet::ethernet::MacAddr;
    use ndprelay_packet::ndp::{NeighborAdvert, NeighborSolicit};
    use ndprelay_packet::{addr, frame};
    use std::cell::RefCell;
    use std::net::Ipv6Addr;
    use std::rc::{Rc, Weak};

    const IFACE_MAC: MacAddr = MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
    const PEER_MAC: MacAddr = MacAddr::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);

    fn target() -> Ipv6Addr {
        "2001:db8::1".parse().unwrap()
    }

    #[derive(Default)]
    struct RecordingProxy {
        calls: Vec<(Ipv6Addr, Ipv6Addr, Ipv6Addr, Option<MacAddr>)>,
    }

    impl ProxyPolicy for RecordingProxy {
        fn handle_solicit(
            &mut self,
            source: Ipv6Addr,
            destination: Ipv6Addr,
            target: Ipv6Addr,
            source_ll: Option<MacAddr>,
        ) {
            self.calls.push((source, destination, target, source_ll));
        }
    }

    struct FakeSession {
        target: Ipv6Addr,
        adverts: usize,
    }

    impl NeighborSession for FakeSession {
        fn target(&self) -> Ipv6Addr {
            self.target
        }
        fn handle_advert(&mut self) {
            self.adverts += 1;
        }
    }

    fn dad_ns_frame() -> Vec<u8> {
        let ns = NeighborSolicit {
            target: target(),
            source_ll: None,
        };
        let dst = addr::solicited_node(&target());
        frame::build(
            PEER_MAC,
            addr::multicast_mac(&dst),
            Ipv6Addr::UNSPECIFIED,
            dst,
            &ns.to_bytes(),
        )
    }

    fn na_frame(advertised: Ipv6Addr) -> Vec<u8> {
        let na = NeighborAdvert {
            router: false,
            solicited: true,
            override_flag: false,
            target: advertised,
            target_ll: Some(PEER_MAC),
        };
        frame::build(
            PEER_MAC,
            MacAddr::new([0x33, 0x33, 0, 0, 0, 1]),
            advertised,
            "ff02::1".parse().unwrap(),
            &na.to_bytes(),
        )
    }

    #[test]
    fn test_ns_reaches_proxy() {
        let mut iface = Iface::for_tests(2, "eth0", IFACE_MAC);
        let proxy = Rc::new(RefCell::new(RecordingProxy::default()));
        iface.set_proxy(Rc::downgrade(&proxy) as Weak<RefCell<dyn ProxyPolicy>>);

        handle_frame(&iface, &dad_ns_frame());

        let calls = &proxy.borrow().calls;
        assert_eq!(
            calls.as_slice(),
            &[(
                Ipv6Addr::UNSPECIFIED,
                addr::solicited_node(&target()),
                target(),
                None
            )]
        );
    }

    #[test]
    fn test_ns_without_proxy_is_ignored() {
        let iface = Iface::for_tests(2, "eth0", IFACE_MAC);
        handle_frame(&iface, &dad_ns_frame());
    }

    #[test]
    fn test_ns_with_dead_proxy_is_ignored() {
        let mut iface = Iface::for_tests(2, "eth0", IFACE_MAC);
        let proxy = Rc::new(RefCell::new(RecordingProxy::default()));
        iface.set_proxy(Rc::downgrade(&proxy) as Weak<RefCell<dyn ProxyPolicy>>);
        drop(proxy);

        handle_frame(&iface, &dad_ns_frame());
    }

    #[test]
    fn test_na_notifies_matching_session_only() {
        let mut iface = Iface::for_tests(2, "eth0", IFACE_MAC);
        let other = Rc::new(RefCell::new(FakeSession {
            target: "2001:db8::2".parse().unwrap(),
            adverts: 0,
        }));
        let matching = Rc::new(RefCell::new(FakeSession {
            target: target(),
            adverts: 0,
        }));
        iface.link_session(Rc::downgrade(&other) as Weak<RefCell<dyn NeighborSession>>);
        iface.link_session(Rc::downgrade(&matching) as Weak<RefCell<dyn NeighborSession>>);

        handle_frame(&iface, &na_frame(target()));

        assert_eq!(other.borrow().adverts, 0);
        assert_eq!(matching.borrow().adverts, 1);
    }

    #[test]
    fn test_na_skips_dead_sessions() {
        let mut iface = Iface::for_tests(2, "eth0", IFACE_MAC);
        let dead = Rc::new(RefCell::new(FakeSession {
            target: target(),
            adverts: 0,
        }));
        iface.link_session(Rc::downgrade(&dead) as Weak<RefCell<dyn NeighborSession>>);
        drop(dead);

        handle_frame(&iface, &na_frame(target()));
    }

    #[test]
    fn test_na_without_match_is_dropped() {
        let mut iface = Iface::for_tests(2, "eth0", IFACE_MAC);
        let session = Rc::new(RefCell::new(FakeSession {
            target: "2001:db8::2".parse().unwrap(),
            adverts: 0,
        }));
        iface.link_session(Rc::downgrade(&session) as Weak<RefCell<dyn NeighborSession>>);

        handle_frame(&iface, &na_frame(target()));
        assert_eq!(session.borrow().adverts, 0);
    }

    #[test]
    fn test_invalid_frames_never_reach_collaborators() {
        let mut iface = Iface::for_tests(2, "eth0", IFACE_MAC);
        let proxy = Rc::new(RefCell::new(RecordingProxy::default()));
        iface.set_proxy(Rc::downgrade(&proxy) as Weak<RefCell<dyn ProxyPolicy>>);

        let mut corrupt = dad_ns_frame();
        corrupt[18] ^= 0x01; // break the declared payload length
        handle_frame(&iface, &corrupt);
        handle_frame(&iface, &[]);
        handle_frame(&iface, &[0u8; 13]);

        assert!(proxy.borrow().calls.is_empty());
    }
}
