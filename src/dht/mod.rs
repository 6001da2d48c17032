//! A node in the distributed hash table.
//!
//! Each node owns a contiguous range of the 31-bit hash space and the
//! (key,value) pairs whose keys hash into it. Requests for keys outside
//! the range are forwarded to the routing-table entry closest to the
//! key's hash; the first server to see a client request records itself
//! as the relay so the reply can skip the intermediate hops on the way
//! back. Nodes join by splitting a predecessor's range and leave by
//! merging their range back into it.

pub mod cache;
pub mod client;
pub mod packet;
pub mod protocol;
pub mod routing;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::mpsc::SyncSender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use time::SteadyTime;

use crate::dht::cache::Cache;
use crate::dht::packet::{DhtPacket, DhtPayload, HashRange, NodeInfo};
use crate::dht::protocol::{DhtIo, Event};
use crate::dht::routing::RouteTable;
use crate::error::{Error, ParseError, Result};
use crate::hash::hashit;
use crate::{MAX_HASH, MESSAGE_LENGTH, QUEUE_SIZE, REQUEST_TIMEOUT};

/// Ring position of this node: its own info, its neighbors, and the
/// hash range it currently owns. Mutated only by the processing thread.
struct RingState {
    my_info: NodeInfo,
    succ_info: NodeInfo,
    pred_info: NodeInfo,
    hash_range: HashRange,
    send_tag: u32,
}

#[derive(Clone)]
pub struct DhtNode {
    my_adr: SocketAddr,
    num_routes: usize,
    cache_on: bool,
    io: DhtIo,
    tx: SyncSender<Event>,
    ring: Arc<Mutex<RingState>>,
    map: Arc<Mutex<HashMap<String, String>>>,
    cache: Arc<Mutex<Cache>>,
    rte_tbl: Arc<Mutex<RouteTable>>,
    leave_done: Arc<AtomicBool>,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl DhtNode {
    /// Bind a socket on `my_ip`, write its address to `cfg_file`, join
    /// the ring through the server named in `pred_file` (when given),
    /// and start processing requests.
    pub fn new(
        my_ip: IpAddr,
        num_routes: usize,
        cfg_file: &str,
        cache_on: bool,
        pred_file: Option<&str>,
    ) -> Result<DhtNode> {
        let socket = UdpSocket::bind(SocketAddr::new(my_ip, 0))?;
        let my_adr = socket.local_addr()?;
        write_cfg(cfg_file, my_adr)?;

        let mut send_tag = 1;
        let (hash_range, succ_info, pred_info) = match pred_file {
            Some(path) => {
                let pred_adr = read_cfg(path)?;
                send_tag += 1;
                join(&socket, pred_adr, send_tag)?
            }
            None => {
                let me = NodeInfo::new(my_adr, 0);
                (HashRange::new(0, MAX_HASH), me, me)
            }
        };
        let my_info = NodeInfo::new(my_adr, hash_range.lo);

        let mut rte_tbl = RouteTable::new(num_routes);
        if succ_info != my_info {
            rte_tbl.add(succ_info, &succ_info);
        }

        let (tx, rx) = sync_channel(QUEUE_SIZE);
        let io = DhtIo::new(socket, tx.clone());
        let node = DhtNode {
            my_adr: my_adr,
            num_routes: num_routes,
            cache_on: cache_on,
            io: io,
            tx: tx,
            ring: Arc::new(Mutex::new(RingState {
                my_info: my_info,
                succ_info: succ_info,
                pred_info: pred_info,
                hash_range: hash_range,
                send_tag: send_tag,
            })),
            map: Arc::new(Mutex::new(HashMap::new())),
            cache: Arc::new(Mutex::new(Cache::new())),
            rte_tbl: Arc::new(Mutex::new(rte_tbl)),
            leave_done: Arc::new(AtomicBool::new(false)),
            handle: Arc::new(Mutex::new(None)),
        };
        node.start_handler(rx);
        info!("{} - serving range {}", my_adr, node.hash_range());
        Ok(node)
    }

    /// Leave the ring gracefully and shut the node down. Calling stop
    /// on an already-stopped node is a no-op.
    pub fn stop(&self) {
        let handle = match self.handle.lock().unwrap().take() {
            Some(handle) => handle,
            None => return,
        };
        if self.tx.send(Event::Shutdown).is_err() {
            warn!("{} - processing thread already gone", self.my_adr);
        }
        let _ = handle.join();
        self.io.shut_down(self.my_adr);
    }

    pub fn local_adr(&self) -> SocketAddr {
        self.my_adr
    }

    pub fn hash_range(&self) -> HashRange {
        self.ring.lock().unwrap().hash_range
    }

    pub fn succ_info(&self) -> NodeInfo {
        self.ring.lock().unwrap().succ_info
    }

    pub fn pred_info(&self) -> NodeInfo {
        self.ring.lock().unwrap().pred_info
    }

    pub fn routes(&self) -> Vec<NodeInfo> {
        self.rte_tbl.lock().unwrap().entries().to_vec()
    }

    /// The value stored locally for `key`, if this node holds it.
    pub fn stored(&self, key: &str) -> Option<String> {
        self.map.lock().unwrap().get(key).cloned()
    }

    /// Whether the relay cache currently holds `key`.
    pub fn cached(&self, key: &str) -> bool {
        self.cache.lock().unwrap().contains(key)
    }

    fn start_handler(&self, rx: Receiver<Event>) {
        let node = self.clone();
        let handle = thread::spawn(move || loop {
            let event = match rx.recv() {
                Ok(event) => event,
                Err(_) => break,
            };
            match event {
                Event::Packet(p, sender) => node.handle_packet(p, sender),
                Event::Malformed(e, sender) => node.reply_failure(e, sender),
                Event::Shutdown => {
                    node.leave(&rx);
                    info!("{} - stopped", node.my_adr);
                    break;
                }
            }
        });
        *self.handle.lock().unwrap() = Some(handle);
    }

    fn reply_failure(&self, e: ParseError, sender: SocketAddr) {
        let mut reply = DhtPacket::new(DhtPayload::Failure { reason: e.reason });
        reply.tag = e.tag;
        reply.ttl = e.ttl;
        self.io.send(&reply, sender);
    }

    fn handle_packet(&self, mut p: DhtPacket, sender: SocketAddr) {
        p.ttl -= 1;
        if p.ttl < 0 {
            return;
        }
        // any packet carrying senderInfo warms up the routing table,
        // except leave, which is removing that very sender
        if let Some(info) = p.sender_info {
            if p.type_name() != "leave" {
                let succ = self.ring.lock().unwrap().succ_info;
                self.rte_tbl.lock().unwrap().add(info, &succ);
            }
        }
        match p.payload.clone() {
            DhtPayload::Get { key } => self.handle_get(p, key, sender),
            DhtPayload::Put { key, value } => self.handle_put(p, key, value, sender),
            DhtPayload::Transfer { key, value } => self.handle_transfer(key, value),
            DhtPayload::Success { .. } | DhtPayload::NoMatch { .. } | DhtPayload::Failure { .. } => {
                self.handle_reply(p)
            }
            DhtPayload::Join => self.handle_join(p, sender),
            DhtPayload::Update {
                hash_range,
                succ_info,
                pred_info,
            } => self.handle_update(hash_range, succ_info, pred_info),
            DhtPayload::Leave => self.handle_leave(p),
        }
    }

    fn handle_get(&self, p: DhtPacket, key: String, sender: SocketAddr) {
        let hash = hashit(&key);
        let range = self.hash_range();
        if range.contains(hash) {
            let value = self.map.lock().unwrap().get(&key).cloned();
            let payload = match value {
                Some(value) => DhtPayload::Success {
                    key: Some(key),
                    value: Some(value),
                    hash_range: None,
                    succ_info: None,
                    pred_info: None,
                },
                None => DhtPayload::NoMatch { key: key },
            };
            self.send_reply(p, payload, sender);
        } else {
            let cached = if self.cache_on {
                self.cache.lock().unwrap().get(&key)
            } else {
                None
            };
            match cached {
                Some(value) => {
                    let payload = DhtPayload::Success {
                        key: Some(key),
                        value: Some(value),
                        hash_range: None,
                        succ_info: None,
                        pred_info: None,
                    };
                    self.send_reply(p, payload, sender);
                }
                None => self.forward(p, hash, sender),
            }
        }
    }

    fn handle_put(&self, p: DhtPacket, key: String, value: Option<String>, sender: SocketAddr) {
        let hash = hashit(&key);
        let range = self.hash_range();
        if range.contains(hash) {
            {
                let mut map = self.map.lock().unwrap();
                match value.clone() {
                    Some(value) => {
                        map.insert(key.clone(), value);
                    }
                    // a put without a value removes the pair
                    None => {
                        map.remove(&key);
                    }
                }
            }
            let payload = DhtPayload::Success {
                key: Some(key),
                value: value,
                hash_range: None,
                succ_info: None,
                pred_info: None,
            };
            self.send_reply(p, payload, sender);
        } else {
            self.forward(p, hash, sender);
        }
    }

    /// Accept a transferred pair only while its hash is ours; a stale
    /// transfer that raced a later ring change is dropped.
    fn handle_transfer(&self, key: String, value: String) {
        let hash = hashit(&key);
        if self.hash_range().contains(hash) {
            self.map.lock().unwrap().insert(key, value);
        }
    }

    /// A reply landing here means this node was the relay for the
    /// request: strip the routing fields, answer the client directly,
    /// and remember the pair if caching is on.
    fn handle_reply(&self, mut p: DhtPacket) {
        let client = match p.client_adr {
            Some(client) => client,
            None => {
                warn!("{} - reply without clientAdr dropped", self.my_adr);
                return;
            }
        };
        if self.cache_on {
            if let DhtPayload::Success {
                key: Some(ref key),
                value: Some(ref value),
                ..
            } = p.payload
            {
                self.cache.lock().unwrap().insert(key.clone(), value.clone());
            }
        }
        p.client_adr = None;
        p.relay_adr = None;
        p.sender_info = None;
        self.io.send(&p, client);
    }

    /// Split our range and hand the top half, our successor, and the
    /// keys that go with it to the joining node.
    fn handle_join(&self, mut p: DhtPacket, sender: SocketAddr) {
        let (new_succ, first_hash) = {
            let mut ring = self.ring.lock().unwrap();
            let low = ring.hash_range.lo;
            let high = ring.hash_range.hi;
            let mid = (high - low) / 2;
            ring.hash_range.hi = low + mid;
            let first_hash = low + mid + 1;

            p.payload = DhtPayload::Success {
                key: None,
                value: None,
                hash_range: Some(HashRange::new(first_hash, high)),
                succ_info: Some(ring.succ_info),
                pred_info: Some(ring.my_info),
            };
            ring.succ_info = NodeInfo::new(sender, first_hash);
            (ring.succ_info, first_hash)
        };
        self.rte_tbl.lock().unwrap().add(new_succ, &new_succ);
        self.io.send(&p, sender);

        let transfer_tag = {
            let mut ring = self.ring.lock().unwrap();
            ring.send_tag += 1;
            ring.send_tag
        };
        let moved: Vec<(String, String)> = {
            let mut map = self.map.lock().unwrap();
            let moved: Vec<(String, String)> = map
                .iter()
                .filter(|entry| hashit(entry.0) >= first_hash)
                .map(|entry| (entry.0.clone(), entry.1.clone()))
                .collect();
            for entry in &moved {
                map.remove(&entry.0);
            }
            moved
        };
        for (key, value) in moved {
            let mut transfer = DhtPacket::new(DhtPayload::Transfer {
                key: key,
                value: value,
            });
            transfer.tag = transfer_tag;
            self.io.send(&transfer, sender);
        }
    }

    fn handle_update(
        &self,
        hash_range: Option<HashRange>,
        succ_info: Option<NodeInfo>,
        pred_info: Option<NodeInfo>,
    ) {
        let new_succ = {
            let mut ring = self.ring.lock().unwrap();
            if let Some(pred) = pred_info {
                ring.pred_info = pred;
            }
            if let Some(succ) = succ_info {
                ring.succ_info = succ;
            }
            if let Some(range) = hash_range {
                ring.hash_range = range;
            }
            ring.succ_info
        };
        if succ_info.is_some() {
            self.rte_tbl.lock().unwrap().add(new_succ, &new_succ);
        }
    }

    fn handle_leave(&self, p: DhtPacket) {
        let sender_info = match p.sender_info {
            Some(info) => info,
            None => return,
        };
        let (my_info, succ) = {
            let ring = self.ring.lock().unwrap();
            (ring.my_info, ring.succ_info)
        };
        if sender_info == my_info {
            // our own leave made it all the way around
            self.leave_done.store(true, Ordering::Release);
            return;
        }
        self.io.send(&p, succ.addr);
        self.rte_tbl.lock().unwrap().remove(&sender_info);
    }

    /// Forward a request toward the owner of `hash`, recording this
    /// node as the relay when the request came straight from a client.
    fn forward(&self, mut p: DhtPacket, hash: u32, sender: SocketAddr) {
        if p.relay_adr.is_none() {
            p.relay_adr = Some(self.my_adr);
            p.client_adr = Some(sender);
        }
        let target = self.rte_tbl.lock().unwrap().forward_target(hash);
        match target {
            Some(route) => self.io.send(&p, route.addr),
            None => warn!("{} - no route toward hash {}", self.my_adr, hash),
        }
    }

    /// Answer a request. Replies travel to the relay when one is
    /// recorded; a reply sent via the relay advertises this node so
    /// routing tables warm up along the way.
    fn send_reply(&self, mut p: DhtPacket, payload: DhtPayload, sender: SocketAddr) {
        let reply_adr = match p.relay_adr {
            Some(relay) => {
                let ring = self.ring.lock().unwrap();
                p.sender_info = Some(NodeInfo::new(self.my_adr, ring.hash_range.lo));
                relay
            }
            None => sender,
        };
        p.payload = payload;
        self.io.send(&p, reply_adr);
    }

    /// The leave protocol: tell the ring we are going, wait for the
    /// leave to circle back, splice predecessor and successor together,
    /// and hand every key to the predecessor. The wait is bounded so a
    /// broken ring cannot wedge shutdown.
    fn leave(&self, rx: &Receiver<Event>) {
        let my_info = {
            let ring = self.ring.lock().unwrap();
            // the initial server owns the bottom of the ring and never leaves
            if ring.hash_range.lo == 0 {
                return;
            }
            ring.my_info
        };

        let tag = {
            let mut ring = self.ring.lock().unwrap();
            ring.send_tag += 1;
            ring.send_tag
        };
        let succ_adr = self.succ_info().addr;
        let mut leave_pkt = DhtPacket::new(DhtPayload::Leave);
        leave_pkt.tag = tag;
        leave_pkt.sender_info = Some(my_info);
        self.io.send(&leave_pkt, succ_adr);

        let deadline = SteadyTime::now() + ::time::Duration::milliseconds(REQUEST_TIMEOUT as i64);
        while !self.leave_done.load(Ordering::Acquire) {
            let remaining = (deadline - SteadyTime::now()).num_milliseconds();
            if remaining <= 0 {
                warn!("{} - leave did not circle back in time", self.my_adr);
                break;
            }
            match rx.recv_timeout(Duration::from_millis(remaining as u64)) {
                Ok(Event::Packet(p, sender)) => self.handle_packet(p, sender),
                Ok(Event::Malformed(e, sender)) => self.reply_failure(e, sender),
                Ok(Event::Shutdown) => {}
                Err(_) => {
                    warn!("{} - leave did not circle back in time", self.my_adr);
                    break;
                }
            }
        }

        // neighbors may have shifted while the leave circled
        let (succ, pred, hi) = {
            let ring = self.ring.lock().unwrap();
            (ring.succ_info, ring.pred_info, ring.hash_range.hi)
        };

        // merge our range into the predecessor and give it our successor
        let mut update = DhtPacket::new(DhtPayload::Update {
            hash_range: Some(HashRange::new(pred.first_hash, hi)),
            succ_info: Some(succ),
            pred_info: None,
        });
        update.tag = tag;
        self.io.send(&update, pred.addr);

        // give the successor its new predecessor
        let mut update = DhtPacket::new(DhtPayload::Update {
            hash_range: None,
            succ_info: None,
            pred_info: Some(pred),
        });
        update.tag = tag;
        self.io.send(&update, succ.addr);

        // every key we owned now belongs to the predecessor
        let moved: Vec<(String, String)> = {
            let mut map = self.map.lock().unwrap();
            map.drain().collect()
        };
        for (key, value) in moved {
            let mut transfer = DhtPacket::new(DhtPayload::Transfer {
                key: key,
                value: value,
            });
            transfer.tag = tag;
            self.io.send(&transfer, pred.addr);
        }

        *self.cache.lock().unwrap() = Cache::new();
        *self.rte_tbl.lock().unwrap() = RouteTable::new(self.num_routes);
    }
}

/// Contact a ring server and ask to join as its successor. Returns the
/// granted hash range, the new successor, and the new predecessor.
fn join(
    socket: &UdpSocket,
    pred_adr: SocketAddr,
    tag: u32,
) -> Result<(HashRange, NodeInfo, NodeInfo)> {
    let mut pkt = DhtPacket::new(DhtPayload::Join);
    pkt.tag = tag;
    let text = pkt.to_wire();
    debug!("sending to {}\n{}", pred_adr, text);
    socket.send_to(text.as_bytes(), pred_adr)?;

    socket.set_read_timeout(Some(Duration::from_millis(REQUEST_TIMEOUT)))?;
    let mut buffer = [0u8; MESSAGE_LENGTH];
    let reply = loop {
        let (len, sender) = match socket.recv_from(&mut buffer) {
            Ok(received) => received,
            Err(_) => return Err(Error::JoinFailed("no reply from predecessor".to_string())),
        };
        // anything not from the contacted server is dropped
        if sender != pred_adr {
            continue;
        }
        let text = String::from_utf8_lossy(&buffer[..len]).into_owned();
        debug!("received from {}\n{}", sender, text);
        match DhtPacket::parse(&text) {
            Ok(p) => break p,
            Err(e) => return Err(Error::JoinFailed(e.reason)),
        }
    };
    socket.set_read_timeout(None)?;

    if reply.type_name() != "success" || reply.tag != tag {
        return Err(Error::JoinFailed(format!(
            "unexpected reply {}",
            reply.to_wire()
        )));
    }
    match (reply.hash_range(), reply.succ_info(), reply.pred_info()) {
        (Some(range), Some(succ), Some(pred)) => Ok((range, succ, pred)),
        _ => Err(Error::JoinFailed("reply missing ring fields".to_string())),
    }
}

/// Write this server's `ip port` line for clients and joiners to find.
pub fn write_cfg(path: &str, adr: SocketAddr) -> Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "{} {}", adr.ip(), adr.port())?;
    Ok(())
}

/// Read an `ip port` line written by `write_cfg`.
pub fn read_cfg(path: &str) -> Result<SocketAddr> {
    let file = File::open(path)?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line)?;
    let mut parts = line.split_whitespace();
    let (ip, port) = match (parts.next(), parts.next()) {
        (Some(ip), Some(port)) => (ip, port),
        _ => return Err(Error::BadConfig(format!("expected \"ip port\" in {}", path))),
    };
    let ip: IpAddr = ip
        .parse()
        .map_err(|_| Error::BadConfig(format!("bad address in {}", path)))?;
    let port: u16 = port
        .parse()
        .map_err(|_| Error::BadConfig(format!("bad port in {}", path)))?;
    Ok(SocketAddr::new(ip, port))
}
