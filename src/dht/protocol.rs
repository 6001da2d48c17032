//! Socket IO for a ring node.
//!
//! A reader thread turns datagrams into events on the node's bounded
//! input queue; the processing thread consumes them. `Shutdown` is
//! posted onto the same queue by `DhtNode::stop`, so the leave protocol
//! runs on the processing thread without racing packet handling.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::thread;

use crate::dht::packet::DhtPacket;
use crate::error::ParseError;
use crate::MESSAGE_LENGTH;

pub enum Event {
    /// A datagram that parsed cleanly.
    Packet(DhtPacket, SocketAddr),
    /// A datagram that did not; the node answers with a failure reply.
    Malformed(ParseError, SocketAddr),
    /// Run the leave protocol and exit the processing loop.
    Shutdown,
}

#[derive(Clone)]
pub struct DhtIo {
    socket: Arc<UdpSocket>,
    is_active: Arc<AtomicBool>,
}

impl DhtIo {
    /// Wrap the socket and spawn the reader thread. The reader exits
    /// once `is_active` is cleared and a final datagram (the wake sent
    /// by `stop`) unblocks it, or when the event queue is closed.
    pub fn new(socket: UdpSocket, tx: SyncSender<Event>) -> DhtIo {
        let io = DhtIo {
            socket: Arc::new(socket),
            is_active: Arc::new(AtomicBool::new(true)),
        };
        let reader = io.clone();
        thread::spawn(move || {
            let mut buffer = [0u8; MESSAGE_LENGTH];
            loop {
                let (len, sender) = match reader.socket.recv_from(&mut buffer) {
                    Ok(received) => received,
                    Err(e) => {
                        warn!("dht io: receive failed: {}", e);
                        continue;
                    }
                };
                if !reader.is_active.load(Ordering::Acquire) {
                    break;
                }
                let text = String::from_utf8_lossy(&buffer[..len]).into_owned();
                debug!("received from {}\n{}", sender, text);
                let event = match DhtPacket::parse(&text) {
                    Ok(packet) => Event::Packet(packet, sender),
                    Err(e) => Event::Malformed(e, sender),
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
        });
        io
    }

    pub fn send(&self, packet: &DhtPacket, dest: SocketAddr) {
        let text = packet.to_wire();
        debug!("sending to {}\n{}", dest, text);
        if self.socket.send_to(text.as_bytes(), dest).is_err() {
            warn!("dht io: could not send to {}", dest);
        }
    }

    /// Unblock the reader thread so it can observe the cleared flag.
    pub fn shut_down(&self, my_adr: SocketAddr) {
        self.is_active.store(false, Ordering::Release);
        let _ = self.socket.send_to(b"", my_adr);
    }
}
