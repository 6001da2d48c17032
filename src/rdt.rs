//! Reliable data transport: go-back-N over a lossy substrate.
//!
//! One worker thread interleaves sending and receiving. Application
//! payloads go out as data packets under a sliding window; the receiver
//! delivers in order and acks cumulatively. A retransmission timer
//! resends the whole window, and four acks in a row for the packet
//! before the window base trigger an early resend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use bincode;
use time::SteadyTime;

use crate::error::Result;
use crate::queue::Queue;
use crate::{MESSAGE_LENGTH, QUEUE_SIZE};

pub const DATA: u8 = 0;
pub const ACK: u8 = 1;

/// A transport packet. Sequence numbers are 15 bits; the sequence
/// space is twice the window size.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct RdtPacket {
    pub typ: u8,
    pub seq_num: u16,
    pub payload: String,
}

impl RdtPacket {
    pub fn data(seq_num: u16, payload: String) -> RdtPacket {
        RdtPacket {
            typ: DATA,
            seq_num: seq_num,
            payload: payload,
        }
    }

    pub fn ack(seq_num: u16) -> RdtPacket {
        RdtPacket {
            typ: ACK,
            seq_num: seq_num,
            payload: String::new(),
        }
    }

    /// Encode for the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self, bincode::Bounded(MESSAGE_LENGTH as u64)).unwrap()
    }

    /// Decode from the wire.
    pub fn from_bytes(bytes: &[u8]) -> Result<RdtPacket> {
        let packet = bincode::deserialize(bytes)?;
        Ok(packet)
    }
}

/// The datagram substrate beneath the transport. Delivery may lose and
/// reorder packets; it must not corrupt them.
pub trait Substrate: Send + 'static {
    fn send(&self, p: RdtPacket);
    fn receive(&self) -> Option<RdtPacket>;
    fn incoming(&self) -> bool;
    fn ready(&self) -> bool;
}

#[derive(Clone)]
pub struct Rdt {
    w_size: usize,
    /// retransmission timeout in nanoseconds
    timeout: i64,
    from_src: Arc<Queue<String>>,
    to_snk: Arc<Queue<String>>,
    quit: Arc<AtomicBool>,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Rdt {
    /// `w_size` is the window size (clamped to 2^14 - 1 so sequence
    /// numbers fit in 15 bits); `timeout` is the retransmission
    /// deadline in seconds.
    pub fn new(w_size: usize, timeout: f64) -> Rdt {
        let w_size = ::std::cmp::min(w_size, (1 << 14) - 1);
        Rdt {
            w_size: w_size,
            timeout: (timeout * 1e9) as i64,
            from_src: Arc::new(Queue::new(QUEUE_SIZE)),
            to_snk: Arc::new(Queue::new(QUEUE_SIZE)),
            quit: Arc::new(AtomicBool::new(false)),
            handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the worker thread on the given substrate.
    pub fn start<S: Substrate>(&self, sub: S) {
        let mut worker = Worker {
            w_size: self.w_size,
            timeout: self.timeout,
            from_src: Arc::clone(&self.from_src),
            to_snk: Arc::clone(&self.to_snk),
            quit: Arc::clone(&self.quit),
            send_buf: vec![None; 2 * self.w_size],
            recv_buf: vec![None; 2 * self.w_size],
            send_base: 0,
            send_seq_num: 0,
            recv_base: 0,
            exp_seq_num: 0,
            last_rcvd: None,
            dup_acks: 0,
        };
        let handle = thread::spawn(move || worker.run(sub));
        *self.handle.lock().unwrap() = Some(handle);
    }

    /// Stop the transport; in-flight packets are flushed first.
    pub fn stop(&self) {
        self.quit.store(true, Ordering::Release);
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// Queue a message for the peer, blocking when the queue is full.
    pub fn send(&self, message: String) {
        self.from_src.put(message);
    }

    /// True when another message can be queued without blocking.
    pub fn ready(&self) -> bool {
        self.from_src.remaining() > 0
    }

    /// Next in-order message from the peer, blocking until one arrives.
    pub fn receive(&self) -> String {
        self.to_snk.take()
    }

    /// True when a message is waiting.
    pub fn incoming(&self) -> bool {
        self.to_snk.len() > 0
    }
}

struct Worker {
    w_size: usize,
    timeout: i64,
    from_src: Arc<Queue<String>>,
    to_snk: Arc<Queue<String>>,
    quit: Arc<AtomicBool>,

    /// sent but not yet acked, indexed by sequence number
    send_buf: Vec<Option<RdtPacket>>,
    /// received but not yet delivered, indexed by sequence number
    recv_buf: Vec<Option<RdtPacket>>,
    send_base: usize,
    send_seq_num: usize,
    recv_base: usize,
    exp_seq_num: usize,
    last_rcvd: Option<usize>,
    dup_acks: u32,
}

impl Worker {
    fn incr(&self, x: usize) -> usize {
        let x = x + 1;
        if x < 2 * self.w_size {
            x
        } else {
            0
        }
    }

    fn decr(&self, x: usize) -> usize {
        if x == 0 {
            2 * self.w_size - 1
        } else {
            x - 1
        }
    }

    /// Clockwise distance from y to x in the sequence space.
    fn diff(&self, x: usize, y: usize) -> usize {
        if x >= y {
            x - y
        } else {
            x + 2 * self.w_size - y
        }
    }

    fn run<S: Substrate>(&mut self, sub: S) {
        let t0 = SteadyTime::now();
        let mut now;
        let mut send_again: i64 = 0;
        // keeps the retransmit timer quiet while the window is empty
        let mut stop_timer = false;
        let mut first_time = false;
        // gates the duplicate-ack resend so one loss triggers it once
        let mut enable_dup_ack = true;

        while !self.quit.load(Ordering::Acquire) || self.send_buf[self.send_base].is_some() {
            now = (SteadyTime::now() - t0).num_nanoseconds().unwrap();

            if self.recv_buf[self.recv_base].is_some() {
                // deliver the next in-order packet to the application
                let p = self.recv_buf[self.recv_base].take().unwrap();
                self.to_snk.put(p.payload);
                self.recv_base = self.incr(self.recv_base);
            } else if sub.incoming() {
                let p = match sub.receive() {
                    Some(p) => p,
                    None => continue,
                };
                if p.typ == DATA {
                    if p.seq_num as usize == self.exp_seq_num {
                        let seq = self.exp_seq_num;
                        self.recv_buf[seq] = Some(p);
                        self.last_rcvd = Some(seq);
                        self.exp_seq_num = self.incr(seq);
                        enable_dup_ack = true;
                        sub.send(RdtPacket::ack(seq as u16));
                    } else if let Some(last) = self.last_rcvd {
                        // out of order: re-ack the last in-order receipt
                        sub.send(RdtPacket::ack(last as u16));
                    }
                } else if p.typ == ACK {
                    let seq = p.seq_num as usize;
                    if seq == self.decr(self.send_base) {
                        self.dup_acks += 1;
                        // one original ack plus three duplicates
                        if self.dup_acks >= 4 && enable_dup_ack {
                            self.resend_window(&sub);
                            send_again = now + self.timeout;
                            self.dup_acks = 0;
                            enable_dup_ack = false;
                        }
                    } else if self.diff(seq, self.send_base) < self.w_size
                        && self.send_buf[seq].is_some()
                    {
                        // cumulative ack: clear through seq
                        self.dup_acks = 0;
                        while self.send_base != self.incr(seq) {
                            self.send_buf[self.send_base] = None;
                            self.send_base = self.incr(self.send_base);
                        }
                        send_again = now + self.timeout;
                        if self.send_buf[self.send_base].is_none() {
                            stop_timer = true;
                        }
                    }
                }
            } else if now >= send_again && self.send_base != self.send_seq_num && !stop_timer {
                self.resend_window(&sub);
                send_again = now + self.timeout;
                enable_dup_ack = true;
            } else if !self.from_src.is_empty()
                && sub.ready()
                && self.diff(self.send_seq_num, self.send_base) < self.w_size
            {
                let payload = match self.from_src.try_take() {
                    Some(payload) => payload,
                    None => continue,
                };
                let p = RdtPacket::data(self.send_seq_num as u16, payload);
                self.send_buf[self.send_seq_num] = Some(p.clone());
                if !first_time {
                    first_time = true;
                    send_again = now + self.timeout;
                }
                self.send_seq_num = self.incr(self.send_seq_num);
                sub.send(p);
                stop_timer = false;
                send_again = now + self.timeout;
            } else {
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    /// Resend every packet currently in the window, stalling 1 ms at a
    /// time while the substrate is not ready.
    fn resend_window<S: Substrate>(&self, sub: &S) {
        let mut seq = self.send_base;
        for _ in 0..self.diff(self.send_seq_num, self.send_base) {
            while !sub.ready() {
                thread::sleep(Duration::from_millis(1));
            }
            if let Some(ref p) = self.send_buf[seq] {
                sub.send(p.clone());
            }
            seq = self.incr(seq);
        }
    }
}
