//! Platform link-layer I/O
//!
//! Two backends behind one small contract: non-blocking raw capture and
//! transmit of whole Ethernet frames.
//!
//! On Linux a single process-wide `AF_PACKET` socket bound to the IPv6
//! ethertype serves every interface; the kernel tags each inbound frame
//! with the originating interface index and outbound frames name their
//! interface per send. Everywhere else a cloned `bpf` device is opened per
//! interface, bound to it and switched to immediate delivery.
//!
//! Both backends expose their descriptor via [`AsRawFd`] so an external
//! event loop can watch readiness; neither ever blocks.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

fn last_error() -> io::Error {
    io::Error::last_os_error()
}

/// Build an `ifreq` carrying an interface name.
pub(crate) fn ifreq_for(name: &str) -> io::Result<libc::ifreq> {
    let mut req: libc::ifreq = unsafe { std::mem::zeroed() };
    if name.len() >= req.ifr_name.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "interface name too long",
        ));
    }
    for (dst, src) in req.ifr_name.iter_mut().zip(name.as_bytes()) {
        *dst = *src as libc::c_char;
    }
    Ok(req)
}

/// The shared raw packet socket (Linux).
///
/// Receives IPv6 frames from every interface on the system; the kernel
/// filter cuts that down to NS/NA before anything reaches user space.
#[cfg(target_os = "linux")]
pub struct PacketSocket {
    fd: OwnedFd,
}

#[cfg(target_os = "linux")]
impl PacketSocket {
    /// Open the process-wide capture socket, non-blocking.
    pub fn open() -> io::Result<Self> {
        let protocol = (libc::ETH_P_IPV6 as u16).to_be() as libc::c_int;
        let fd = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                protocol,
            )
        };
        if fd < 0 {
            return Err(last_error());
        }
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// Receive one frame, returning its length and the index of the
    /// interface it arrived on.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, u32)> {
        let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        let mut addr_len = std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;

        let len = unsafe {
            libc::recvfrom(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
                &mut addr as *mut _ as *mut libc::sockaddr,
                &mut addr_len,
            )
        };
        if len < 0 {
            return Err(last_error());
        }
        Ok((len as usize, addr.sll_ifindex as u32))
    }

    /// Transmit a complete frame on the interface with the given index.
    pub fn send(&self, ifindex: u32, frame: &[u8]) -> io::Result<usize> {
        let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as libc::sa_family_t;
        addr.sll_protocol = (libc::ETH_P_IPV6 as u16).to_be();
        addr.sll_ifindex = ifindex as libc::c_int;

        let len = unsafe {
            libc::sendto(
                self.fd.as_raw_fd(),
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
                0,
                &addr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if len < 0 {
            return Err(last_error());
        }
        Ok(len as usize)
    }
}

#[cfg(target_os = "linux")]
impl AsRawFd for PacketSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// A per-interface `bpf` capture device (BSD family).
#[cfg(not(target_os = "linux"))]
pub struct BpfDevice {
    fd: OwnedFd,
    buffer_len: usize,
}

#[cfg(not(target_os = "linux"))]
impl BpfDevice {
    /// Open a cloned `bpf` device bound to `name`.
    ///
    /// Sets the kernel buffer length before binding (it is fixed once the
    /// device is attached to an interface) and enables immediate delivery
    /// so reads see frames as they arrive instead of when the buffer
    /// fills.
    pub fn open(name: &str, buffer_len: u32, immediate: bool) -> io::Result<Self> {
        // A cloning device; each open yields a fresh instance.
        let path = c"/dev/bpf";
        let fd = unsafe {
            libc::open(
                path.as_ptr(),
                libc::O_RDWR | libc::O_NONBLOCK | libc::O_CLOEXEC,
            )
        };
        if fd < 0 {
            return Err(last_error());
        }
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        let mut len = buffer_len;
        if unsafe { libc::ioctl(fd.as_raw_fd(), libc::BIOCSBLEN as libc::c_ulong, &mut len) } < 0 {
            return Err(last_error());
        }

        let req = ifreq_for(name)?;
        if unsafe { libc::ioctl(fd.as_raw_fd(), libc::BIOCSETIF as libc::c_ulong, &req) } < 0 {
            return Err(last_error());
        }

        if immediate {
            let enable: u32 = 1;
            if unsafe {
                libc::ioctl(fd.as_raw_fd(), libc::BIOCIMMEDIATE as libc::c_ulong, &enable)
            } < 0
            {
                return Err(last_error());
            }
        }

        Ok(Self {
            fd,
            buffer_len: len as usize,
        })
    }

    /// Kernel buffer length; reads must supply a buffer at least this big.
    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Read a batch of frames.
    ///
    /// The kernel packs one or more frames back to back, each preceded by
    /// a `bpf_hdr`; [`crate::dispatch`] walks them.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let len = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        if len < 0 {
            return Err(last_error());
        }
        Ok(len as usize)
    }

    /// Transmit a complete frame on the bound interface.
    pub fn write(&self, frame: &[u8]) -> io::Result<usize> {
        let len = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
            )
        };
        if len < 0 {
            return Err(last_error());
        }
        Ok(len as usize)
    }
}

#[cfg(not(target_os = "linux"))]
impl AsRawFd for BpfDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}
