//! Shared harness for the integration suites: in-memory substrates,
//! config-file helpers, and one-shot DHT requests.

// each test binary pulls in only part of the harness
#![allow(dead_code)]
#![allow(unused_imports)]

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::process;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand;

use ringnet::dht::client;
use ringnet::dht::packet::{DhtPacket, DhtPayload};
use ringnet::overlay::{LinkSubstrate, Packet};
use ringnet::queue::Queue;
use ringnet::rdt::{RdtPacket, Substrate, ACK, DATA};

pub fn localhost() -> IpAddr {
    "127.0.0.1".parse().unwrap()
}

/// A unique config-file path for this process.
pub fn cfg_path(name: &str) -> String {
    let mut path = env::temp_dir();
    path.push(format!("ringnet-{}-{}.cfg", process::id(), name));
    path.to_str().unwrap().to_string()
}

pub fn get(server: SocketAddr, key: &str) -> DhtPacket {
    client::request(
        localhost(),
        server,
        DhtPayload::Get {
            key: key.to_string(),
        },
    )
    .unwrap()
}

pub fn put(server: SocketAddr, key: &str, value: Option<&str>) -> DhtPacket {
    client::request(
        localhost(),
        server,
        DhtPayload::Put {
            key: key.to_string(),
            value: value.map(|v| v.to_string()),
        },
    )
    .unwrap()
}

/// Poll `cond` until it holds or `timeout_ms` elapses.
pub fn wait_until<F: Fn() -> bool>(cond: F, timeout_ms: u64) -> bool {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    while !cond() {
        if Instant::now() > deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
    true
}

/// One end of an in-memory lossy wire for the transport tests. Packets
/// cross the wire in encoded form; a configurable fraction is dropped.
/// The end also keeps the counters the loss tests assert on.
pub struct LossEnd {
    out: Arc<Queue<Vec<u8>>>,
    inq: Arc<Queue<Vec<u8>>>,
    loss: f64,
    /// data packets offered for transmission, before loss
    pub data_sent: Arc<AtomicUsize>,
    /// runs of four or more identical acks seen arriving
    pub dup_ack_runs: Arc<AtomicUsize>,
    last_ack: AtomicIsize,
    ack_run: AtomicUsize,
}

/// Two connected `LossEnd`s with independent loss in each direction.
pub fn loss_pair(loss: f64) -> (LossEnd, LossEnd) {
    let a_to_b = Arc::new(Queue::new(1000));
    let b_to_a = Arc::new(Queue::new(1000));
    let a = LossEnd {
        out: Arc::clone(&a_to_b),
        inq: Arc::clone(&b_to_a),
        loss: loss,
        data_sent: Arc::new(AtomicUsize::new(0)),
        dup_ack_runs: Arc::new(AtomicUsize::new(0)),
        last_ack: AtomicIsize::new(-1),
        ack_run: AtomicUsize::new(0),
    };
    let b = LossEnd {
        out: b_to_a,
        inq: a_to_b,
        loss: loss,
        data_sent: Arc::new(AtomicUsize::new(0)),
        dup_ack_runs: Arc::new(AtomicUsize::new(0)),
        last_ack: AtomicIsize::new(-1),
        ack_run: AtomicUsize::new(0),
    };
    (a, b)
}

impl Substrate for LossEnd {
    fn send(&self, p: RdtPacket) {
        if p.typ == DATA {
            self.data_sent.fetch_add(1, Ordering::SeqCst);
        }
        let bytes = p.to_bytes();
        if rand::random::<f64>() >= self.loss {
            self.out.try_put(bytes);
        }
    }

    fn receive(&self) -> Option<RdtPacket> {
        let bytes = self.inq.try_take()?;
        let p = RdtPacket::from_bytes(&bytes).ok()?;
        if p.typ == ACK {
            let seq = p.seq_num as isize;
            if self.last_ack.swap(seq, Ordering::SeqCst) == seq {
                let run = self.ack_run.fetch_add(1, Ordering::SeqCst) + 1;
                // one original plus three duplicates
                if run == 3 {
                    self.dup_ack_runs.fetch_add(1, Ordering::SeqCst);
                }
            } else {
                self.ack_run.store(0, Ordering::SeqCst);
            }
        }
        Some(p)
    }

    fn incoming(&self) -> bool {
        !self.inq.is_empty()
    }

    fn ready(&self) -> bool {
        self.out.remaining() > 0
    }
}

/// A fresh mailbox for one overlay node's incoming packets.
pub fn mailbox() -> Arc<Queue<(Packet, usize)>> {
    Arc::new(Queue::new(1000))
}

/// In-memory link substrate for the forwarder tests. `peers[i]` is the
/// mailbox reached over link `i` together with the link index this
/// node has at that peer.
#[derive(Clone)]
pub struct TestLink {
    pub inq: Arc<Queue<(Packet, usize)>>,
    pub peers: Vec<(Arc<Queue<(Packet, usize)>>, usize)>,
}

impl LinkSubstrate for TestLink {
    fn send(&self, p: Packet, link: usize) {
        let peer = &self.peers[link];
        peer.0.try_put((p, peer.1));
    }

    fn receive(&self) -> Option<(Packet, usize)> {
        self.inq.try_take()
    }

    fn incoming(&self) -> bool {
        !self.inq.is_empty()
    }

    fn ready(&self, link: usize) -> bool {
        self.peers[link].0.remaining() > 0
    }
}
