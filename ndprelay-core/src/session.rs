//! Neighbor session contract
//!
//! Sessions track one target address each and own their retransmission and
//! keepalive timers. The packet plane only needs two things from a
//! session: the address it is watching, and a way to tell it a matching
//! advertisement arrived.

use std::net::Ipv6Addr;

/// A pending neighbor resolution attached to an interface.
pub trait NeighborSession {
    /// Address the session is resolving.
    fn target(&self) -> Ipv6Addr;

    /// A neighbor advertisement for [`target`](Self::target) arrived on
    /// the session's interface.
    fn handle_advert(&mut self);
}
