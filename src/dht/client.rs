//! One-shot client requests against a ring server.

use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::time::Duration;

use rand;

use crate::dht::packet::{DhtPacket, DhtPayload};
use crate::error::Result;
use crate::{MESSAGE_LENGTH, REQUEST_TIMEOUT};

/// Send one request to `server` and wait for the matching reply.
///
/// The request carries a random tag; replies with any other tag (or
/// packets that are not replies at all) are discarded while waiting.
pub fn request(my_ip: IpAddr, server: SocketAddr, payload: DhtPayload) -> Result<DhtPacket> {
    let socket = UdpSocket::bind(SocketAddr::new(my_ip, 0))?;
    let mut packet = DhtPacket::new(payload);
    packet.tag = rand::random::<u32>();

    let text = packet.to_wire();
    debug!("sending to {}\n{}", server, text);
    socket.send_to(text.as_bytes(), server)?;

    socket.set_read_timeout(Some(Duration::from_millis(REQUEST_TIMEOUT)))?;
    let mut buffer = [0u8; MESSAGE_LENGTH];
    loop {
        let (len, sender) = socket.recv_from(&mut buffer)?;
        let text = String::from_utf8_lossy(&buffer[..len]).into_owned();
        debug!("received from {}\n{}", sender, text);
        let reply = match DhtPacket::parse(&text) {
            Ok(reply) => reply,
            Err(_) => continue,
        };
        if reply.tag == packet.tag && reply.is_reply() {
            return Ok(reply);
        }
    }
}
