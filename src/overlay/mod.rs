//! The overlay network: a packet forwarder and a path-vector router
//! running as cooperating threads on each overlay node.

pub mod forwarder;
pub mod packet;
pub mod router;

pub use self::forwarder::Forwarder;
pub use self::router::{NborInfo, Router};

use std::net::Ipv4Addr;

/// Payload is application data for the local node.
pub const PROTO_DATA: u8 = 1;
/// Payload is router-to-router traffic.
pub const PROTO_ROUTER: u8 = 2;

/// A packet traveling through the overlay.
#[derive(Clone, PartialEq, Debug)]
pub struct Packet {
    pub src_adr: Ipv4Addr,
    pub dest_adr: Ipv4Addr,
    pub protocol: u8,
    pub ttl: i32,
    pub payload: String,
}

/// The datagram substrate beneath the forwarder. Links are addressed by
/// index; delivery may lose or reorder packets.
pub trait LinkSubstrate: Send + 'static {
    /// Hand a packet to the substrate for transmission on `link`.
    fn send(&self, p: Packet, link: usize);
    /// Next packet and the link it arrived on, if one is waiting.
    fn receive(&self) -> Option<(Packet, usize)>;
    /// True when a packet is waiting.
    fn incoming(&self) -> bool;
    /// True when the substrate can accept a packet for `link`.
    fn ready(&self, link: usize) -> bool;
}
