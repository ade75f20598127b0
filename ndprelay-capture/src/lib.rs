//! Raw NS/NA capture and transmission for ndprelay
//!
//! The OS-facing half of the packet plane: a kernel-side classic-BPF
//! filter that keeps only neighbor discovery frames, platform raw-capture
//! backends (one shared `AF_PACKET` socket on Linux, one `bpf` device per
//! interface elsewhere), a reference-counted interface registry that
//! manages promiscuous/all-multicast flags and restores them on shutdown,
//! and the dispatch/transmit paths tying it to the wire codecs in
//! `ndprelay-packet`.
//!
//! Everything here is single-threaded and non-blocking. An external event
//! loop watches the capture handles (they expose `AsRawFd`) and calls the
//! drain functions on readiness; each call processes every available frame
//! and returns.
//!
//! ## Example
//!
//! ```no_run
//! use ndprelay_capture::IfaceRegistry;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = IfaceRegistry::new();
//!     registry.startup()?;
//!
//!     let index = registry.open(Some("eth0"), None)?;
//!     registry.set_allmulti(index, true)?;
//!
//!     // ... attach a proxy policy, let the event loop call
//!     // dispatch::drain on readiness, send_na/send_ns as needed ...
//!
//!     registry.close(index);
//!     registry.cleanup();
//!     Ok(())
//! }
//! ```

pub mod dispatch;
pub mod filter;
pub mod iface;
pub mod io;

// Re-export main types
pub use iface::{CaptureConfig, Iface, IfaceRegistry};
