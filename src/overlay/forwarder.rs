//! The packet forwarder.
//!
//! The forwarder owns the forwarding table and moves packets between
//! the substrate, the local application queues, and the router queues.
//! All handles are clones sharing the same state; the worker thread
//! runs the main loop while application and router threads use the
//! queue-backed accessors.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use time::SteadyTime;

use crate::overlay::{LinkSubstrate, Packet, PROTO_DATA, PROTO_ROUTER};
use crate::prefix::Prefix;
use crate::queue::Queue;
use crate::{INIT_TTL, QUEUE_SIZE};

#[derive(Clone)]
pub struct Forwarder {
    my_ip: Ipv4Addr,
    // single monitor guarding the forwarding table
    fwd_tbl: Arc<Mutex<Vec<(Prefix, usize)>>>,
    from_src: Arc<Queue<Packet>>,
    to_snk: Arc<Queue<Packet>>,
    from_rtr: Arc<Queue<(Packet, usize)>>,
    to_rtr: Arc<Queue<(Packet, usize)>>,
    quit: Arc<AtomicBool>,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
    t0: SteadyTime,
}

impl Forwarder {
    pub fn new(my_ip: Ipv4Addr) -> Forwarder {
        // default route sends everything to link 0 until told otherwise
        let fwd_tbl = vec![(Prefix::default_route(), 0)];
        Forwarder {
            my_ip: my_ip,
            fwd_tbl: Arc::new(Mutex::new(fwd_tbl)),
            from_src: Arc::new(Queue::new(QUEUE_SIZE)),
            to_snk: Arc::new(Queue::new(QUEUE_SIZE)),
            from_rtr: Arc::new(Queue::new(QUEUE_SIZE)),
            to_rtr: Arc::new(Queue::new(QUEUE_SIZE)),
            quit: Arc::new(AtomicBool::new(false)),
            handle: Arc::new(Mutex::new(None)),
            t0: SteadyTime::now(),
        }
    }

    /// Start the worker thread on the given substrate.
    pub fn start<S: LinkSubstrate>(&self, sub: S) {
        let fwdr = self.clone();
        let handle = thread::spawn(move || fwdr.run(sub));
        *self.handle.lock().unwrap() = Some(handle);
    }

    /// Stop and join the worker thread.
    pub fn stop(&self) {
        self.quit.store(true, Ordering::Release);
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// One action per tick, checked in priority order: substrate
    /// arrivals, router output, application output; sleep when idle.
    fn run<S: LinkSubstrate>(&self, sub: S) {
        while !self.quit.load(Ordering::Acquire) {
            if sub.incoming() {
                if let Some((mut p, link)) = sub.receive() {
                    p.ttl -= 1;
                    if p.dest_adr == self.my_ip {
                        // local delivery; a full queue drops the packet
                        if p.protocol == PROTO_DATA {
                            self.to_snk.try_put(p);
                        } else if p.protocol == PROTO_ROUTER {
                            self.to_rtr.try_put((p, link));
                        }
                    } else if p.ttl > 0 {
                        match self.lookup(p.dest_adr) {
                            Some(out_link) => {
                                if sub.ready(out_link) {
                                    sub.send(p, out_link);
                                }
                            }
                            None => debug!("{} - no route for {}", self.my_ip, p.dest_adr),
                        }
                    }
                }
            } else if let Some((_, out_link)) = self.from_rtr.peek() {
                if sub.ready(out_link) {
                    if let Some((p, out_link)) = self.from_rtr.try_take() {
                        sub.send(p, out_link);
                    }
                }
            } else if let Some(p) = self.from_src.peek() {
                match self.lookup(p.dest_adr) {
                    Some(out_link) => {
                        if sub.ready(out_link) {
                            if let Some(p) = self.from_src.try_take() {
                                sub.send(p, out_link);
                            }
                        }
                    }
                    None => {
                        debug!("{} - no route for {}", self.my_ip, p.dest_adr);
                        self.from_src.try_take();
                    }
                }
            } else {
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    /// Add or update the route for a prefix. A prefix already in the
    /// table keeps its position and gets the new link.
    pub fn add_route(&self, nu_prefix: Prefix, nu_lnk: usize) {
        {
            let mut fwd_tbl = self.fwd_tbl.lock().unwrap();
            match fwd_tbl.iter().position(|entry| entry.0 == nu_prefix) {
                Some(index) => fwd_tbl[index].1 = nu_lnk,
                None => fwd_tbl.push((nu_prefix, nu_lnk)),
            }
        }
        self.print_table();
    }

    /// Longest matching prefix wins; ties go to the earlier entry.
    fn lookup(&self, ip: Ipv4Addr) -> Option<usize> {
        let fwd_tbl = self.fwd_tbl.lock().unwrap();
        let mut out_link = None;
        let mut curr_match = -1i32;
        for entry in fwd_tbl.iter() {
            if entry.0.matches(ip) && entry.0.leng as i32 > curr_match {
                out_link = Some(entry.1);
                curr_match = entry.0.leng as i32;
            }
        }
        out_link
    }

    /// The link currently assigned to an exact prefix, if any.
    pub fn get_link(&self, pfx: &Prefix) -> Option<usize> {
        let fwd_tbl = self.fwd_tbl.lock().unwrap();
        fwd_tbl
            .iter()
            .find(|entry| entry.0 == *pfx)
            .map(|entry| entry.1)
    }

    pub fn print_table(&self) {
        let fwd_tbl = self.fwd_tbl.lock().unwrap();
        let now = (SteadyTime::now() - self.t0).num_nanoseconds().unwrap() as f64 / 1e9;
        let mut s = format!("Forwarding table ({:.3})\n", now);
        for entry in fwd_tbl.iter() {
            s += &format!("{} {}\n", entry.0, entry.1);
        }
        debug!("{}", s);
    }

    // application interface

    /// Queue an application payload for another overlay host.
    pub fn send(&self, payload: String, dest_adr: Ipv4Addr) {
        let p = Packet {
            src_adr: self.my_ip,
            dest_adr: dest_adr,
            protocol: PROTO_DATA,
            ttl: INIT_TTL,
            payload: payload,
        };
        self.from_src.put(p);
    }

    /// True when another payload can be queued without blocking.
    pub fn ready(&self) -> bool {
        self.from_src.remaining() > 0
    }

    /// Next payload delivered to this host, with the sender's address.
    pub fn receive(&self) -> (String, Ipv4Addr) {
        let p = self.to_snk.take();
        (p.payload, p.src_adr)
    }

    pub fn incoming(&self) -> bool {
        self.to_snk.len() > 0
    }

    // router interface

    /// Queue a router packet for transmission on a specific link.
    pub fn send_pkt(&self, p: Packet, lnk: usize) {
        self.from_rtr.put((p, lnk));
    }

    /// True when another router packet can be queued without blocking.
    pub fn ready4pkt(&self) -> bool {
        self.from_rtr.remaining() > 0
    }

    /// Next packet addressed to the router, with its arrival link.
    pub fn receive_pkt(&self) -> (Packet, usize) {
        self.to_rtr.take()
    }

    pub fn incoming_pkt(&self) -> bool {
        self.to_rtr.len() > 0
    }

    // hooks for driving the router deterministically in unit tests

    #[cfg(test)]
    pub(crate) fn outgoing_pkt(&self) -> Option<(Packet, usize)> {
        self.from_rtr.try_take()
    }

    #[cfg(test)]
    pub(crate) fn deliver_pkt(&self, p: Packet, lnk: usize) {
        self.to_rtr.put((p, lnk));
    }
}
