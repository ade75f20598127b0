//! Kernel packet filter keeping only NS/NA frames
//!
//! A nine-instruction classic-BPF program evaluated by the kernel before a
//! packet is copied to user space: keep Ethernet-framed IPv6 whose payload
//! is ICMPv6 of type Neighbor Solicitation or Neighbor Advertisement, drop
//! everything else. Without it, every frame on a busy segment crosses the
//! kernel boundary just to be discarded here.
//!
//! Linux and the BSDs speak structurally similar but ABI-incompatible
//! classic-BPF dialects: the instruction quad is identical, the program
//! wrapper and the attach path are not. The logical program is built once;
//! only the installation differs.

use ndprelay_core::{Error, Result};
use ndprelay_packet::ethernet::{EthernetHeader, ETHERTYPE_IPV6};
use ndprelay_packet::ipv6::{Ipv6Header, NEXT_HEADER_ICMPV6};
use ndprelay_packet::ndp::{NEIGHBOR_ADVERT, NEIGHBOR_SOLICIT};
use std::os::fd::RawFd;

// Classic BPF opcode fields, numerically identical in both dialects.
const BPF_LD: u16 = 0x00;
const BPF_JMP: u16 = 0x05;
const BPF_RET: u16 = 0x06;
const BPF_H: u16 = 0x08;
const BPF_B: u16 = 0x10;
const BPF_ABS: u16 = 0x20;
const BPF_JEQ: u16 = 0x10;
const BPF_K: u16 = 0x00;

/// One classic-BPF instruction.
///
/// The quad layout is shared by Linux's `sock_filter` and BSD's
/// `bpf_insn`; only the program wrappers differ.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterInsn {
    pub code: u16,
    pub jt: u8,
    pub jf: u8,
    pub k: u32,
}

#[cfg(target_os = "linux")]
const _: () = assert!(
    std::mem::size_of::<FilterInsn>() == std::mem::size_of::<libc::sock_filter>()
);

const fn stmt(code: u16, k: u32) -> FilterInsn {
    FilterInsn {
        code,
        jt: 0,
        jf: 0,
        k,
    }
}

const fn jump(code: u16, k: u32, jt: u8, jf: u8) -> FilterInsn {
    FilterInsn { code, jt, jf, k }
}

/// Build the NS/NA keep filter.
///
/// Offsets come from the header layouts in `ndprelay-packet`; if a header
/// shape ever changes, the program follows.
pub fn ndp_filter() -> [FilterInsn; 9] {
    const ETHERTYPE_OFF: u32 = EthernetHeader::ETHERTYPE_OFFSET as u32;
    const NEXT_HEADER_OFF: u32 = (EthernetHeader::SIZE + Ipv6Header::NEXT_HEADER_OFFSET) as u32;
    const ICMP6_TYPE_OFF: u32 = (EthernetHeader::SIZE + Ipv6Header::SIZE) as u32;

    [
        // Load ether_type; drop unless IPv6.
        stmt(BPF_LD | BPF_H | BPF_ABS, ETHERTYPE_OFF),
        jump(BPF_JMP | BPF_JEQ | BPF_K, ETHERTYPE_IPV6 as u32, 0, 5),
        // Load the IPv6 next-header byte; drop unless ICMPv6.
        stmt(BPF_LD | BPF_B | BPF_ABS, NEXT_HEADER_OFF),
        jump(BPF_JMP | BPF_JEQ | BPF_K, NEXT_HEADER_ICMPV6 as u32, 0, 3),
        // Load the ICMPv6 type; keep NS and NA only.
        stmt(BPF_LD | BPF_B | BPF_ABS, ICMP6_TYPE_OFF),
        jump(BPF_JMP | BPF_JEQ | BPF_K, NEIGHBOR_SOLICIT as u32, 2, 0),
        jump(BPF_JMP | BPF_JEQ | BPF_K, NEIGHBOR_ADVERT as u32, 1, 0),
        // Drop.
        stmt(BPF_RET | BPF_K, 0),
        // Keep the whole packet.
        stmt(BPF_RET | BPF_K, u32::MAX),
    ]
}

/// Attach the filter to an `AF_PACKET` socket (Linux socket-filter encoding).
#[cfg(target_os = "linux")]
pub fn attach_socket(fd: RawFd) -> Result<()> {
    let insns = ndp_filter();
    let prog = libc::sock_fprog {
        len: insns.len() as u16,
        filter: insns.as_ptr() as *mut libc::sock_filter,
    };

    let res = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ATTACH_FILTER,
            &prog as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::sock_fprog>() as libc::socklen_t,
        )
    };
    if res < 0 {
        return Err(Error::filter(format!(
            "SO_ATTACH_FILTER: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

/// Attach the filter to a `bpf` device (BSD `bpf_program` encoding).
#[cfg(not(target_os = "linux"))]
pub fn attach_bpf(fd: RawFd) -> Result<()> {
    #[repr(C)]
    struct BpfProgram {
        bf_len: libc::c_uint,
        bf_insns: *mut FilterInsn,
    }

    let mut insns = ndp_filter();
    let prog = BpfProgram {
        bf_len: insns.len() as libc::c_uint,
        bf_insns: insns.as_mut_ptr(),
    };

    let res = unsafe { libc::ioctl(fd, libc::BIOCSETF as libc::c_ulong, &prog) };
    if res < 0 {
        return Err(Error::filter(format!(
            "BIOCSETF: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}
