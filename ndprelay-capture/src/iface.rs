//! Interface registry and NS/NA transmission
//!
//! A reference-counted table of open interfaces keyed by kernel interface
//! index. The registry owns every OS-facing side effect of the packet
//! plane: the shared capture socket (Linux), per-interface capture devices
//! (elsewhere), and the promiscuous/all-multicast interface flags, whose
//! pre-daemon values are remembered the first time they are touched so
//! shutdown can put them back.
//!
//! The registry is an owned value passed explicitly to every operation;
//! there is no process-global state, and everything runs on one thread.

use crate::filter;
#[cfg(not(target_os = "linux"))]
use crate::io::BpfDevice;
#[cfg(target_os = "linux")]
use crate::io::PacketSocket;
use crate::io::ifreq_for;
use ndprelay_core::{Error, NeighborSession, ProxyPolicy, Result};
use ndprelay_packet::{addr, frame, MacAddr, NeighborAdvert, NeighborSolicit};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::net::Ipv6Addr;
use std::os::fd::AsRawFd;
use std::rc::{Rc, Weak};
use tracing::{debug, error, info, trace};

/// Configuration for the capture plane
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Scratch buffer length for receiving frames; at least one link MTU
    pub recv_buffer_len: usize,
    /// Kernel buffer length requested for `bpf` devices
    pub bpf_buffer_len: u32,
    /// Enable immediate delivery on `bpf` devices
    pub immediate_mode: bool,
    /// Restore saved interface flags when an interface closes. Switched
    /// off when re-executing into a background process, so the parent does
    /// not undo settings the child still depends on.
    pub restore_flags: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            recv_buffer_len: 2048,
            bpf_buffer_len: 4096,
            immediate_mode: true,
            restore_flags: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum IfaceFlag {
    Promisc,
    AllMulti,
}

impl IfaceFlag {
    fn bit(self) -> libc::c_short {
        match self {
            IfaceFlag::Promisc => libc::IFF_PROMISC as libc::c_short,
            IfaceFlag::AllMulti => libc::IFF_ALLMULTI as libc::c_short,
        }
    }

    fn name(self) -> &'static str {
        match self {
            IfaceFlag::Promisc => "promiscuous",
            IfaceFlag::AllMulti => "all multicast",
        }
    }
}

/// One open network interface
pub struct Iface {
    index: u32,
    name: String,
    lladdr: MacAddr,
    refcount: usize,
    saved_promisc: Option<bool>,
    saved_allmulti: Option<bool>,
    /// The shared capture socket outlives every record; records only
    /// borrow it.
    #[cfg(target_os = "linux")]
    io: Weak<PacketSocket>,
    /// Each record owns its capture device exclusively.
    #[cfg(not(target_os = "linux"))]
    io: Option<BpfDevice>,
    pub(crate) proxy: Option<Weak<RefCell<dyn ProxyPolicy>>>,
    pub(crate) sessions: Vec<Weak<RefCell<dyn NeighborSession>>>,
}

impl Iface {
    fn empty() -> Self {
        Self {
            index: 0,
            name: String::new(),
            lladdr: MacAddr::new([0; 6]),
            refcount: 0,
            saved_promisc: None,
            saved_allmulti: None,
            #[cfg(target_os = "linux")]
            io: Weak::new(),
            #[cfg(not(target_os = "linux"))]
            io: None,
            proxy: None,
            sessions: Vec::new(),
        }
    }

    /// Kernel interface index
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Interface name as the OS reported it at open time
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hardware address captured at open time
    pub fn link_addr(&self) -> MacAddr {
        self.lladdr
    }

    /// Current reference count
    pub fn refcount(&self) -> usize {
        self.refcount
    }

    /// Attach the proxy policy answering solicitations on this interface.
    /// Without one, inbound NS messages are ignored.
    pub fn set_proxy(&mut self, proxy: Weak<RefCell<dyn ProxyPolicy>>) {
        self.proxy = Some(proxy);
    }

    /// Detach the proxy policy.
    pub fn clear_proxy(&mut self) {
        self.proxy = None;
    }

    /// Link an externally-owned session waiting on advertisements from
    /// this interface. Dead links are skipped during dispatch.
    pub fn link_session(&mut self, session: Weak<RefCell<dyn NeighborSession>>) {
        self.sessions.push(session);
    }

    /// Drop session links that no longer point anywhere.
    pub fn prune_sessions(&mut self) {
        self.sessions.retain(|s| s.strong_count() > 0);
    }

    #[cfg(not(target_os = "linux"))]
    pub(crate) fn device(&self) -> Option<&BpfDevice> {
        self.io.as_ref()
    }

    /// Remember the pre-existing flag value; only the first observed value
    /// counts, so restoration always reflects the pre-daemon state.
    fn record_saved(&mut self, flag: IfaceFlag, was: bool) {
        let slot = match flag {
            IfaceFlag::Promisc => &mut self.saved_promisc,
            IfaceFlag::AllMulti => &mut self.saved_allmulti,
        };
        if slot.is_none() {
            *slot = Some(was);
        }
    }

    /// Send a neighbor advertisement from this interface.
    ///
    /// The advertised address doubles as the IPv6 source. The Solicited
    /// flag is set when answering a multicast destination, the Router flag
    /// follows `router`, and the Target Link-Layer option carries this
    /// interface's own address.
    pub fn send_na(
        &self,
        destination: Ipv6Addr,
        destination_ll: MacAddr,
        target: Ipv6Addr,
        router: bool,
    ) -> Result<usize> {
        let na = NeighborAdvert {
            router,
            solicited: destination.is_multicast(),
            override_flag: false,
            target,
            target_ll: Some(self.lladdr),
        };
        let frame = frame::build(self.lladdr, destination_ll, target, destination, &na.to_bytes());

        info!(
            "Write NA tgt={}, dst={} [{} dev {}]",
            target, destination, destination_ll, self.name
        );

        self.transmit(&frame)
    }

    /// Send a neighbor solicitation for `target` from this interface.
    ///
    /// Sourced from the interface's EUI-64 link-local address and sent to
    /// the target's solicited-node multicast group.
    pub fn send_ns(&self, target: Ipv6Addr) -> Result<usize> {
        let source = addr::link_local_for(&self.lladdr);
        let destination = addr::solicited_node(&target);
        let ns = NeighborSolicit {
            target,
            source_ll: Some(self.lladdr),
        };
        let frame = frame::build(
            self.lladdr,
            addr::multicast_mac(&destination),
            source,
            destination,
            &ns.to_bytes(),
        );

        trace!("Write NS iface={}, tgt={}", self.name, target);

        self.transmit(&frame)
    }

    #[cfg(target_os = "linux")]
    fn transmit(&self, frame: &[u8]) -> Result<usize> {
        let io = self
            .io
            .upgrade()
            .ok_or_else(|| Error::capture("capture socket is closed"))?;
        Ok(io.send(self.index, frame)?)
    }

    #[cfg(not(target_os = "linux"))]
    fn transmit(&self, frame: &[u8]) -> Result<usize> {
        let io = self
            .io
            .as_ref()
            .ok_or_else(|| Error::capture("capture device is closed"))?;
        Ok(io.write(frame)?)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(index: u32, name: &str, lladdr: MacAddr) -> Self {
        let mut iface = Self::empty();
        iface.index = index;
        iface.name.push_str(name);
        iface.lladdr = lladdr;
        iface.refcount = 1;
        iface
    }
}

/// Registry of open interfaces, keyed by kernel interface index
pub struct IfaceRegistry {
    config: CaptureConfig,
    ifaces: HashMap<u32, Iface>,
    /// Closed records, kept for reuse
    free: Vec<Iface>,
    #[cfg(target_os = "linux")]
    io: Option<Rc<PacketSocket>>,
}

impl IfaceRegistry {
    /// Create a registry with default configuration
    pub fn new() -> Self {
        Self::with_config(CaptureConfig::default())
    }

    /// Create a registry with custom configuration
    pub fn with_config(config: CaptureConfig) -> Self {
        Self {
            config,
            ifaces: HashMap::new(),
            free: Vec::new(),
            #[cfg(target_os = "linux")]
            io: None,
        }
    }

    /// The active configuration
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Open the process-wide capture socket and install the kernel filter.
    ///
    /// Must be called once before any interface is opened. A filter that
    /// cannot be installed here aborts startup: the shared socket would
    /// otherwise deliver every IPv6 frame on the system to user space.
    pub fn startup(&mut self) -> Result<()> {
        #[cfg(target_os = "linux")]
        {
            let socket = PacketSocket::open().map_err(|e| {
                error!("Failed to open capture socket: {}", e);
                Error::Io(e)
            })?;
            filter::attach_socket(socket.as_raw_fd()).map_err(|e| {
                error!("Failed to configure filter: {}", e);
                e
            })?;
            self.io = Some(Rc::new(socket));
        }
        Ok(())
    }

    /// The shared capture socket, for event-loop readiness and draining.
    #[cfg(target_os = "linux")]
    pub fn shared_io(&self) -> Option<&Rc<PacketSocket>> {
        self.io.as_ref()
    }

    /// Look up an open interface by index
    pub fn get(&self, index: u32) -> Option<&Iface> {
        self.ifaces.get(&index)
    }

    /// Look up an open interface by index, mutably
    pub fn get_mut(&mut self, index: u32) -> Option<&mut Iface> {
        self.ifaces.get_mut(&index)
    }

    /// Open an interface by name, index, or both.
    ///
    /// When both are given they must agree with the OS interface table.
    /// Opening an already-open interface bumps its reference count and
    /// returns the same record. Returns the interface index, the handle
    /// for all further registry calls.
    pub fn open(&mut self, name: Option<&str>, index: Option<u32>) -> Result<u32> {
        let (name, index, lladdr) = resolve(name, index).map_err(|e| {
            error!("{}", e);
            e
        })?;

        if let Some(iface) = self.ifaces.get_mut(&index) {
            iface.refcount += 1;
            return Ok(index);
        }

        #[cfg(target_os = "linux")]
        let io = {
            let shared = self
                .io
                .as_ref()
                .ok_or_else(|| Error::capture("startup() has not been called"))?;
            Rc::downgrade(shared)
        };

        #[cfg(not(target_os = "linux"))]
        let io = {
            let device = BpfDevice::open(&name, self.config.bpf_buffer_len, self.config.immediate_mode)
                .map_err(|e| {
                    error!("Failed to open capture device for {}: {}", name, e);
                    Error::Io(e)
                })?;
            // Losing the filter is survivable; the codec rejects foreign
            // frames either way.
            if let Err(e) = filter::attach_bpf(device.as_raw_fd()) {
                error!("Could not configure filter on {}: {}", name, e);
            }
            Some(device)
        };

        let mut iface = self.free.pop().unwrap_or_else(Iface::empty);
        iface.index = index;
        iface.name.clear();
        iface.name.push_str(&name);
        iface.lladdr = lladdr;
        iface.refcount = 1;
        iface.saved_promisc = None;
        iface.saved_allmulti = None;
        iface.io = io;
        iface.proxy = None;
        iface.sessions.clear();

        info!("New interface {} [{}]", iface.name, iface.lladdr);

        self.ifaces.insert(index, iface);
        Ok(index)
    }

    /// Release one reference to an interface.
    ///
    /// The last reference restores any flags this process changed (unless
    /// restoration is suppressed), releases the capture handle and pools
    /// the record. Restoration is attempted even if earlier operations on
    /// the interface failed.
    pub fn close(&mut self, index: u32) {
        let Some(iface) = self.ifaces.get_mut(&index) else {
            return;
        };

        iface.refcount -= 1;
        if iface.refcount > 0 {
            return;
        }

        let (saved_promisc, saved_allmulti) = (iface.saved_promisc, iface.saved_allmulti);
        if self.config.restore_flags {
            if let Some(was) = saved_promisc {
                let _ = self.set_flag(index, IfaceFlag::Promisc, was);
            }
            if let Some(was) = saved_allmulti {
                let _ = self.set_flag(index, IfaceFlag::AllMulti, was);
            }
        }

        let Some(mut iface) = self.ifaces.remove(&index) else {
            return;
        };
        #[cfg(target_os = "linux")]
        {
            iface.io = Weak::new();
        }
        #[cfg(not(target_os = "linux"))]
        {
            iface.io = None;
        }
        iface.proxy = None;
        iface.sessions.clear();
        self.free.push(iface);
    }

    /// Enable or disable promiscuous mode on an interface.
    pub fn set_promisc(&mut self, index: u32, on: bool) -> Result<()> {
        self.set_flag(index, IfaceFlag::Promisc, on)
    }

    /// Enable or disable all-multicast mode on an interface.
    pub fn set_allmulti(&mut self, index: u32, on: bool) -> Result<()> {
        self.set_flag(index, IfaceFlag::AllMulti, on)
    }

    fn set_flag(&mut self, index: u32, flag: IfaceFlag, on: bool) -> Result<()> {
        let iface = self
            .ifaces
            .get(&index)
            .ok_or_else(|| Error::InterfaceNotFound(format!("index {}", index)))?;
        let name = iface.name.clone();

        debug!(
            "{} {} mode for interface {}",
            if on { "Enabling" } else { "Disabling" },
            flag.name(),
            name
        );

        let result = {
            #[cfg(target_os = "linux")]
            {
                let io = self
                    .io
                    .as_ref()
                    .ok_or_else(|| Error::capture("startup() has not been called"))?;
                change_iface_flags(io.as_raw_fd(), &name, flag.bit(), on)
            }
            #[cfg(not(target_os = "linux"))]
            {
                let socket = ioctl_socket().map_err(Error::Io)?;
                change_iface_flags(socket.as_raw_fd(), &name, flag.bit(), on)
            }
        };

        let was = result.map_err(|e| {
            error!("Failed to set interface flags: {}", e);
            Error::Io(e)
        })?;

        if let Some(iface) = self.ifaces.get_mut(&index) {
            iface.record_saved(flag, was);
        }
        Ok(())
    }

    /// Close every outstanding interface regardless of leaked references,
    /// then release the shared capture socket. Called once at shutdown so
    /// no interface is left promiscuous by accident.
    pub fn cleanup(&mut self) {
        let indices: Vec<u32> = self.ifaces.keys().copied().collect();
        for index in indices {
            if let Some(iface) = self.ifaces.get_mut(&index) {
                iface.refcount = 1;
            }
            self.close(index);
        }

        #[cfg(target_os = "linux")]
        {
            self.io = None;
        }
    }

    #[cfg(test)]
    pub(crate) fn insert_for_tests(&mut self, iface: Iface) {
        self.ifaces.insert(iface.index, iface);
    }

    #[cfg(test)]
    pub(crate) fn pooled(&self) -> usize {
        self.free.len()
    }
}

impl Default for IfaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve an interface through the OS table, cross-checking name against
/// index when both are given.
fn resolve(name: Option<&str>, index: Option<u32>) -> Result<(String, u32, MacAddr)> {
    let interfaces = pnet_datalink::interfaces();

    let found = match (name, index) {
        (None, None) => return Err(Error::InterfaceUnspecified),
        (Some(name), _) => interfaces
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| Error::InterfaceNotFound(name.to_string()))?,
        (None, Some(index)) => interfaces
            .iter()
            .find(|i| i.index == index)
            .ok_or_else(|| Error::InterfaceNotFound(format!("index {}", index)))?,
    };

    if let Some(index) = index {
        if found.index != index {
            return Err(Error::InterfaceMismatch {
                name: found.name.clone(),
                expected: index,
                actual: found.index,
            });
        }
    }

    let mac = found
        .mac
        .ok_or_else(|| Error::NoLinkAddress(found.name.clone()))?;
    Ok((
        found.name.clone(),
        found.index,
        MacAddr::new([mac.0, mac.1, mac.2, mac.3, mac.4, mac.5]),
    ))
}

/// Read-modify-write one interface flag. Returns the pre-existing state;
/// the write is skipped when the flag already matches.
fn change_iface_flags(
    fd: std::os::fd::RawFd,
    name: &str,
    bit: libc::c_short,
    on: bool,
) -> io::Result<bool> {
    let mut req = ifreq_for(name)?;

    if unsafe { libc::ioctl(fd, libc::SIOCGIFFLAGS as libc::c_ulong, &mut req) } < 0 {
        return Err(io::Error::last_os_error());
    }

    let flags = unsafe { req.ifr_ifru.ifru_flags };
    let was = flags & bit != 0;
    if was == on {
        return Ok(was);
    }

    req.ifr_ifru.ifru_flags = if on { flags | bit } else { flags & !bit };

    if unsafe { libc::ioctl(fd, libc::SIOCSIFFLAGS as libc::c_ulong, &req) } < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(was)
}

/// Throwaway socket for interface flag ioctls.
#[cfg(not(target_os = "linux"))]
fn ioctl_socket() -> io::Result<std::os::fd::OwnedFd> {
    use std::os::fd::FromRawFd;

    let fd = unsafe { libc::socket(libc::AF_INET6, libc::SOCK_DGRAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { std::os::fd::OwnedFd::from_raw_fd(fd) })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: MacAddr = MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);

    fn registry_with_iface(index: u32) -> IfaceRegistry {
        let mut registry = IfaceRegistry::new();
        registry.insert_for_tests(Iface::for_tests(index, "test0", MAC));
        registry
    }

    #[test]
    fn test_refcount_two_opens_two_closes() {
        let mut registry = registry_with_iface(7);
        registry.get_mut(7).unwrap().refcount = 2;

        registry.close(7);
        assert_eq!(registry.get(7).unwrap().refcount(), 1);
        assert_eq!(registry.pooled(), 0);

        registry.close(7);
        assert!(registry.get(7).is_none());
        assert_eq!(registry.pooled(), 1);
    }

    #[test]
    fn test_close_unknown_index_is_harmless() {
        let mut registry = IfaceRegistry::new();
        registry.close(42);
        assert_eq!(registry.pooled(), 0);
    }

    #[test]
    fn test_saved_flag_first_value_wins() {
        let mut iface = Iface::for_tests(1, "test0", MAC);

        iface.record_saved(IfaceFlag::Promisc, false);
        iface.record_saved(IfaceFlag::Promisc, true);
        assert_eq!(iface.saved_promisc, Some(false));

        iface.record_saved(IfaceFlag::AllMulti, true);
        iface.record_saved(IfaceFlag::AllMulti, false);
        assert_eq!(iface.saved_allmulti, Some(true));
    }

    #[test]
    fn test_close_without_restore_pools_record() {
        let mut registry = IfaceRegistry::with_config(CaptureConfig {
            restore_flags: false,
            ..CaptureConfig::default()
        });
        let mut iface = Iface::for_tests(3, "test0", MAC);
        iface.saved_promisc = Some(true);
        registry.insert_for_tests(iface);

        registry.close(3);
        assert!(registry.get(3).is_none());
        assert_eq!(registry.pooled(), 1);
    }

    #[test]
    fn test_cleanup_forces_release_of_leaked_records() {
        let mut registry = registry_with_iface(1);
        registry.insert_for_tests(Iface::for_tests(2, "test1", MAC));
        registry.get_mut(1).unwrap().refcount = 5;

        registry.cleanup();
        assert!(registry.get(1).is_none());
        assert!(registry.get(2).is_none());
        assert_eq!(registry.pooled(), 2);
    }

    #[test]
    fn test_send_without_capture_handle_fails() {
        let iface = Iface::for_tests(1, "test0", MAC);
        let dst: Ipv6Addr = "ff02::1".parse().unwrap();
        let target: Ipv6Addr = "2001:db8::1".parse().unwrap();

        assert!(iface
            .send_na(dst, MacAddr::new([0x33, 0x33, 0, 0, 0, 1]), target, false)
            .is_err());
        assert!(iface.send_ns(target).is_err());
    }

    #[test]
    fn test_set_flag_on_unknown_interface() {
        let mut registry = IfaceRegistry::new();
        assert!(matches!(
            registry.set_promisc(9, true),
            Err(Error::InterfaceNotFound(_))
        ));
    }

    #[test]
    fn test_prune_sessions_drops_dead_links() {
        use ndprelay_core::NeighborSession;

        struct Stub;
        impl NeighborSession for Stub {
            fn target(&self) -> Ipv6Addr {
                Ipv6Addr::UNSPECIFIED
            }
            fn handle_advert(&mut self) {}
        }

        let mut iface = Iface::for_tests(1, "test0", MAC);
        let alive: Rc<RefCell<Stub>> = Rc::new(RefCell::new(Stub));
        let dead: Rc<RefCell<Stub>> = Rc::new(RefCell::new(Stub));
        iface.link_session(Rc::downgrade(&alive) as Weak<RefCell<dyn NeighborSession>>);
        iface.link_session(Rc::downgrade(&dead) as Weak<RefCell<dyn NeighborSession>>);
        drop(dead);

        iface.prune_sessions();
        assert_eq!(iface.sessions.len(), 1);
    }
}
