//! Proxy policy contract
//!
//! The policy layer decides which target addresses this daemon answers on
//! behalf of and on which interfaces. The packet plane never makes that
//! decision; it hands every validated neighbor solicitation to the policy
//! object attached to the receiving interface and moves on.

use ndprelay_packet::MacAddr;
use std::net::Ipv6Addr;

/// Receiver for validated neighbor solicitations.
///
/// One policy object is attached per proxied interface. The call is
/// synchronous and returns nothing; a policy that decides to answer does
/// so by asking the interface to transmit an advertisement, now or later.
pub trait ProxyPolicy {
    /// A neighbor solicitation arrived on the attached interface.
    ///
    /// `source` is the unspecified address and `source_ll` is `None` when
    /// the sender is performing duplicate address detection.
    fn handle_solicit(
        &mut self,
        source: Ipv6Addr,
        destination: Ipv6Addr,
        target: Ipv6Addr,
        source_ll: Option<MacAddr>,
    );
}
