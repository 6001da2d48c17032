//! The path-vector router.
//!
//! One router thread per overlay node. It probes each neighbor link
//! with a hello every second, advertises its own prefixes every ten,
//! and maintains the routing table from the advertisements of others.
//! The forwarding table is derived from the routing table as routes
//! are added or change output link. The router owns its tables; the
//! only seams are the forwarder's queues.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use time::SteadyTime;

use crate::overlay::packet::{LinkFail, PathVec, RouterMsg};
use crate::overlay::{Forwarder, Packet, PROTO_ROUTER};
use crate::prefix::Prefix;
use crate::INIT_TTL;

/// Seconds between hello probes on each link.
const HELLO_INTERVAL: f64 = 1.0;
/// Seconds between advertisements of our own prefixes.
const PV_SEND_INTERVAL: f64 = 10.0;
/// Consecutive unanswered hellos before a link is considered down.
const HELLO_STATE_INIT: u32 = 3;

/// A neighbor in the overlay: its address and the nominal one-way
/// delay used as the link cost until hellos measure a real one.
#[derive(Clone, Copy, Debug)]
pub struct NborInfo {
    pub ip: Ipv4Addr,
    pub delay: f64,
}

/// Liveness and cost state for one neighbor link.
struct LinkInfo {
    peer_ip: Ipv4Addr,
    /// smoothed one-way delay in seconds
    cost: f64,
    got_reply: bool,
    /// three-strike counter; zero means the link is down
    hello_state: u32,
    count: u32,
    total_cost: f64,
    min_cost: f64,
    max_cost: f64,
}

impl LinkInfo {
    fn new(peer_ip: Ipv4Addr, cost: f64) -> LinkInfo {
        LinkInfo {
            peer_ip: peer_ip,
            cost: cost,
            got_reply: true,
            hello_state: HELLO_STATE_INIT,
            count: 0,
            total_cost: 0.0,
            min_cost: 10.0,
            max_cost: 0.0,
        }
    }
}

/// A routing table entry. An invalid route is suppressed but kept for
/// comparison against later advertisements.
#[derive(Clone, PartialEq, Debug)]
struct Route {
    pfx: Prefix,
    timestamp: f64,
    cost: f64,
    /// router IPs along the path, originator last
    path: Vec<Ipv4Addr>,
    out_link: usize,
    valid: bool,
}

pub struct Router {
    my_ip: Ipv4Addr,
    fwdr: Forwarder,
    pfx_list: Vec<Prefix>,
    nbor_list: Vec<NborInfo>,
    lnk_vec: Vec<LinkInfo>,
    rte_tbl: Vec<Route>,
    now: f64,
    en_fa: bool,
}

/// Handle returned by `Router::start`; stops and joins the worker.
pub struct RouterHandle {
    quit: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RouterHandle {
    pub fn stop(mut self) {
        self.quit.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Router {
    pub fn new(
        my_ip: Ipv4Addr,
        fwdr: Forwarder,
        pfx_list: Vec<Prefix>,
        nbor_list: Vec<NborInfo>,
        en_fa: bool,
    ) -> Router {
        let lnk_vec = nbor_list
            .iter()
            .map(|nbor| LinkInfo::new(nbor.ip, nbor.delay))
            .collect();
        Router {
            my_ip: my_ip,
            fwdr: fwdr,
            pfx_list: pfx_list,
            nbor_list: nbor_list,
            lnk_vec: lnk_vec,
            rte_tbl: Vec::new(),
            now: 0.0,
            en_fa: en_fa,
        }
    }

    /// Move the router onto its worker thread.
    pub fn start(mut self) -> RouterHandle {
        let quit = Arc::new(AtomicBool::new(false));
        let quit_flag = Arc::clone(&quit);
        let handle = thread::spawn(move || self.run(&quit_flag));
        RouterHandle {
            quit: quit,
            handle: Some(handle),
        }
    }

    fn run(&mut self, quit: &AtomicBool) {
        let t0 = SteadyTime::now();
        let mut hello_time = 0.0;
        let mut pv_send_time = 0.0;
        while !quit.load(Ordering::Acquire) {
            self.now = seconds_since(t0);
            if self.now > hello_time + HELLO_INTERVAL {
                self.send_hellos();
                hello_time = self.now;
            } else if self.now > pv_send_time + PV_SEND_INTERVAL {
                self.send_path_vecs();
                pv_send_time = self.now;
            } else if self.fwdr.incoming_pkt() {
                self.handle_incoming();
            } else {
                thread::sleep(Duration::from_millis(1));
            }
        }
        self.log_link_stats();
    }

    /// Probe every link. A link that has gone three hellos without a
    /// reply is down: its routes are invalidated and, when enabled, a
    /// failure advertisement goes out. The link keeps being probed so
    /// it can recover.
    pub fn send_hellos(&mut self) {
        for lnk in 0..self.lnk_vec.len() {
            let went_down = {
                let info = &mut self.lnk_vec[lnk];
                if !info.got_reply && info.hello_state > 0 {
                    info.hello_state -= 1;
                    info.hello_state == 0
                } else {
                    false
                }
            };
            if went_down {
                let mut valid_change = false;
                for route in &mut self.rte_tbl {
                    if route.out_link == lnk {
                        route.valid = false;
                        valid_change = true;
                    }
                }
                if valid_change {
                    self.print_table();
                    if self.en_fa {
                        self.send_failure_advert(lnk);
                    }
                }
            }
            self.lnk_vec[lnk].got_reply = false;
            let msg = RouterMsg::Hello {
                timestamp: self.now,
            };
            self.send_to_nbor(&msg, lnk);
        }
    }

    /// Advertise each of our own prefixes to every live neighbor.
    pub fn send_path_vecs(&mut self) {
        for i in 0..self.pfx_list.len() {
            let pfx = self.pfx_list[i];
            for lnk in 0..self.nbor_list.len() {
                let invalid = match self.lookup_route(&pfx) {
                    Some(index) => !self.rte_tbl[index].valid,
                    None => false,
                };
                if self.lnk_vec[lnk].hello_state == 0 || invalid {
                    continue;
                }
                let msg = RouterMsg::Advert(PathVec {
                    pfx: pfx,
                    timestamp: self.now,
                    cost: 0.0,
                    path: vec![self.my_ip],
                });
                self.send_to_nbor(&msg, lnk);
            }
        }
    }

    /// Tell every live neighbor that the link to `failed_lnk` is dead.
    pub fn send_failure_advert(&mut self, failed_lnk: usize) {
        let fail_ip = self.lnk_vec[failed_lnk].peer_ip;
        let msg = RouterMsg::FailAdvert(LinkFail {
            from_ip: self.my_ip,
            to_ip: fail_ip,
            timestamp: self.now,
            path: vec![self.my_ip],
        });
        for lnk in 0..self.nbor_list.len() {
            if self.lnk_vec[lnk].hello_state == 0 {
                continue;
            }
            self.send_to_nbor(&msg, lnk);
        }
    }

    /// Process one packet from the forwarder.
    pub fn handle_incoming(&mut self) {
        let (p, lnk) = self.fwdr.receive_pkt();
        let msg = match RouterMsg::parse(&p.payload) {
            Some(msg) => msg,
            None => return,
        };
        match msg {
            RouterMsg::Hello { timestamp } => {
                // echo it back on the same link
                if self.fwdr.ready4pkt() {
                    let reply = RouterMsg::Hello2u {
                        timestamp: timestamp,
                    };
                    self.send_to_nbor(&reply, lnk);
                }
            }
            RouterMsg::Hello2u { timestamp } => {
                // half the round trip is the link cost sample
                let c = (self.now - timestamp) / 2.0;
                let info = &mut self.lnk_vec[lnk];
                info.cost = 0.9 * info.cost + 0.1 * c;
                info.total_cost += c;
                info.min_cost = info.min_cost.min(c);
                info.max_cost = info.max_cost.max(c);
                info.count += 1;
                info.got_reply = true;
                info.hello_state = HELLO_STATE_INIT;
            }
            RouterMsg::Advert(pv) => self.handle_advert(pv, lnk),
            RouterMsg::FailAdvert(lf) => self.handle_failure_advert(lf, lnk),
        }
    }

    /// Apply an advertisement to the tables, then pass it on with our
    /// stored path to every neighbor except the one it arrived on.
    fn handle_advert(&mut self, pv: PathVec, lnk: usize) {
        // a vector already carrying our address would loop
        if pv.path.contains(&self.my_ip) {
            return;
        }
        let nu = Route {
            pfx: pv.pfx,
            timestamp: pv.timestamp,
            cost: self.lnk_vec[lnk].cost + pv.cost,
            path: pv.path,
            out_link: lnk,
            valid: true,
        };
        let prev_link = self.fwdr.get_link(&nu.pfx);
        match self.lookup_route(&nu.pfx) {
            None => {
                self.rte_tbl.push(nu.clone());
                self.print_table();
                self.fwdr.add_route(nu.pfx, nu.out_link);
            }
            Some(index) => {
                let prev_path = self.rte_tbl[index].path.clone();
                if self.update_route(index, &nu) {
                    if prev_path != nu.path {
                        self.print_table();
                    }
                    if prev_link != Some(nu.out_link) {
                        self.fwdr.add_route(nu.pfx, nu.out_link);
                    }
                }
            }
        }

        let index = match self.lookup_route(&nu.pfx) {
            Some(index) => index,
            None => return,
        };
        let mut path = vec![self.my_ip];
        path.extend_from_slice(&self.rte_tbl[index].path);
        let msg = RouterMsg::Advert(PathVec {
            pfx: nu.pfx,
            timestamp: nu.timestamp,
            cost: nu.cost,
            path: path,
        });
        for i in 0..self.nbor_list.len() {
            if i != lnk {
                self.send_to_nbor(&msg, i);
            }
        }
    }

    /// Invalidate every route whose path crosses the failed link, then
    /// pass the notice on to every neighbor.
    fn handle_failure_advert(&mut self, lf: LinkFail, _lnk: usize) {
        if lf.path.contains(&self.my_ip) {
            return;
        }
        let mut route_change = false;
        for route in &mut self.rte_tbl {
            let idx1 = route.path.iter().position(|ip| *ip == lf.from_ip);
            let idx2 = route.path.iter().position(|ip| *ip == lf.to_ip);
            // the route crosses the link only when the two ends sit
            // next to each other on the path
            if let (Some(idx1), Some(idx2)) = (idx1, idx2) {
                let adjacent = idx1 + 1 == idx2 || idx2 + 1 == idx1;
                if adjacent {
                    route.valid = false;
                    route.timestamp = lf.timestamp;
                    route_change = true;
                }
            }
        }
        if !route_change {
            return;
        }
        self.print_table();
        let mut path = vec![self.my_ip];
        path.extend_from_slice(&lf.path);
        let msg = RouterMsg::FailAdvert(LinkFail {
            from_ip: lf.from_ip,
            to_ip: lf.to_ip,
            timestamp: lf.timestamp,
            path: path,
        });
        for i in 0..self.nbor_list.len() {
            self.send_to_nbor(&msg, i);
        }
    }

    fn lookup_route(&self, pfx: &Prefix) -> Option<usize> {
        self.rte_tbl.iter().position(|route| route.pfx == *pfx)
    }

    /// The update rule, first match wins: a candidate on a downed link
    /// is ignored; an invalid route is revalidated by any valid
    /// candidate with a different path; the same path and link just
    /// refreshes timestamp and cost; otherwise the candidate replaces
    /// the route when it is 10% cheaper, 20 seconds newer, or the
    /// current route's link is down.
    fn update_route(&mut self, index: usize, nu: &Route) -> bool {
        if self.lnk_vec[nu.out_link].hello_state == 0 {
            return false;
        }
        let curr_link_down = self.lnk_vec[self.rte_tbl[index].out_link].hello_state == 0;
        let rte = &mut self.rte_tbl[index];

        if !rte.valid && rte.path != nu.path && nu.valid {
            rte.path = nu.path.clone();
            rte.out_link = nu.out_link;
            rte.timestamp = nu.timestamp;
            rte.cost = nu.cost;
            rte.valid = true;
            return true;
        }
        if rte.path == nu.path && rte.out_link == nu.out_link {
            rte.timestamp = nu.timestamp;
            rte.cost = nu.cost;
            return true;
        }
        if nu.cost < 0.9 * rte.cost || nu.timestamp > rte.timestamp + 20.0 || curr_link_down {
            rte.path = nu.path.clone();
            rte.out_link = nu.out_link;
            rte.timestamp = nu.timestamp;
            rte.cost = nu.cost;
            return true;
        }
        false
    }

    fn send_to_nbor(&self, msg: &RouterMsg, lnk: usize) {
        let p = Packet {
            src_adr: self.my_ip,
            dest_adr: self.lnk_vec[lnk].peer_ip,
            protocol: PROTO_ROUTER,
            ttl: INIT_TTL,
            payload: msg.to_payload(),
        };
        self.fwdr.send_pkt(p, lnk);
    }

    pub fn print_table(&self) {
        let mut s = format!(
            "Routing table ({:.3})\n{:>10} {:>10} {:>8} {:>5} {:>10} \t path\n",
            self.now, "prefix", "timestamp", "cost", "link", "VLD/INVLD"
        );
        for rte in &self.rte_tbl {
            s += &format!(
                "{:>10} {:>10.3} {:>8.3} {:>5}",
                rte.pfx.to_string(),
                rte.timestamp,
                rte.cost,
                rte.out_link
            );
            if rte.valid {
                s += &format!(" {:>10}", "valid");
            } else {
                s += &format!(" {:>10} \t", "invalid");
            }
            for ip in &rte.path {
                s += &format!(" {}", ip);
            }
            if self.lnk_vec[rte.out_link].hello_state == 0 {
                s += "\t ** disabled link";
            }
            s.push('\n');
        }
        debug!("{}", s);
    }

    fn log_link_stats(&self) {
        let mut s = format!(
            "Router link cost statistics\n{:>8} {:>8} {:>8} {:>8} {:>8}\n",
            "peerIp", "count", "avgCost", "minCost", "maxCost"
        );
        for info in &self.lnk_vec {
            if info.count == 0 {
                continue;
            }
            s += &format!(
                "{:>8} {:>8} {:>8.3} {:>8.3} {:>8.3}\n",
                info.peer_ip.to_string(),
                info.count,
                info.total_cost / info.count as f64,
                info.min_cost,
                info.max_cost
            );
        }
        info!("{}", s);
    }
}

fn seconds_since(t0: SteadyTime) -> f64 {
    (SteadyTime::now() - t0).num_nanoseconds().unwrap() as f64 / 1e9
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::{NborInfo, Route, Router};
    use crate::overlay::packet::{LinkFail, PathVec, RouterMsg};
    use crate::overlay::{Forwarder, Packet, PROTO_ROUTER};
    use crate::prefix::Prefix;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn pfx(s: &str) -> Prefix {
        Prefix::parse(s).unwrap()
    }

    fn router(my_ip: &str, pfxes: &[&str], nbors: &[&str], delay: f64, en_fa: bool) -> Router {
        let fwdr = Forwarder::new(ip(my_ip));
        Router::new(
            ip(my_ip),
            fwdr,
            pfxes.iter().map(|s| pfx(s)).collect(),
            nbors
                .iter()
                .map(|s| NborInfo {
                    ip: ip(s),
                    delay: delay,
                })
                .collect(),
            en_fa,
        )
    }

    /// Deliver every router packet queued at `from` into `to` on
    /// `to_lnk`, processing each one.
    fn pump(from: &mut Router, to: &mut Router, to_lnk: usize) -> usize {
        let mut moved = 0;
        while let Some((p, _)) = from.fwdr.outgoing_pkt() {
            to.fwdr.deliver_pkt(p, to_lnk);
            to.handle_incoming();
            moved += 1;
        }
        moved
    }

    fn drain(r: &Router) -> Vec<(RouterMsg, usize)> {
        let mut out = Vec::new();
        while let Some((p, lnk)) = r.fwdr.outgoing_pkt() {
            out.push((RouterMsg::parse(&p.payload).unwrap(), lnk));
        }
        out
    }

    #[test]
    fn test_hello_is_echoed_and_measured() {
        let mut a = router("1.0.0.1", &[], &["1.0.0.2"], 0.01, false);
        let mut b = router("1.0.0.2", &[], &["1.0.0.1"], 0.01, false);

        a.now = 5.0;
        let msg = RouterMsg::Hello { timestamp: a.now };
        a.send_to_nbor(&msg, 0);
        assert_eq!(pump(&mut a, &mut b, 0), 1);

        // the reply comes back 0.02s later; the cost sample is half
        // the round trip, smoothed into the configured delay
        a.now = 5.02;
        assert_eq!(pump(&mut b, &mut a, 0), 1);
        let info = &a.lnk_vec[0];
        assert!(info.got_reply);
        assert_eq!(info.hello_state, 3);
        assert_eq!(info.count, 1);
        assert!((info.cost - 0.01).abs() < 1e-9);
        assert!((info.max_cost - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_advert_installs_route_and_fwd_entry() {
        let mut a = router("1.0.0.1", &["1.0.0.0/24"], &["1.0.1.1"], 0.5, false);
        let mut b = router("1.0.1.1", &[], &["1.0.0.1"], 0.5, false);

        a.now = 1.0;
        a.send_path_vecs();
        pump(&mut a, &mut b, 0);

        let index = b.lookup_route(&pfx("1.0.0.0/24")).unwrap();
        let route = &b.rte_tbl[index];
        assert!(route.valid);
        assert_eq!(route.path, vec![ip("1.0.0.1")]);
        assert_eq!(route.out_link, 0);
        assert!((route.cost - 0.5).abs() < 1e-9);
        assert_eq!(b.fwdr.get_link(&pfx("1.0.0.0/24")), Some(0));
        // only neighbor is the arrival link, so nothing is passed on
        assert!(drain(&b).is_empty());
    }

    #[test]
    fn test_loop_suppression() {
        let mut b = router("1.0.1.1", &[], &["1.0.0.1"], 0.5, false);
        let msg = RouterMsg::Advert(PathVec {
            pfx: pfx("9.0.0.0/8"),
            timestamp: 1.0,
            cost: 0.1,
            path: vec![ip("1.0.0.1"), ip("1.0.1.1")],
        });
        let p = Packet {
            src_adr: ip("1.0.0.1"),
            dest_adr: ip("1.0.1.1"),
            protocol: PROTO_ROUTER,
            ttl: 100,
            payload: msg.to_payload(),
        };
        b.fwdr.deliver_pkt(p, 0);
        b.handle_incoming();
        assert!(b.lookup_route(&pfx("9.0.0.0/8")).is_none());
        assert!(drain(&b).is_empty());
    }

    #[test]
    fn test_convergence_across_chain() {
        // a -- b -- c with link costs 1.0 on both hops
        let mut a = router("1.1.0.1", &["1.1.0.0/16"], &["1.2.0.1"], 1.0, false);
        let mut b = router("1.2.0.1", &[], &["1.1.0.1", "1.3.0.1"], 1.0, false);
        let mut c = router("1.3.0.1", &[], &["1.2.0.1"], 1.0, false);

        a.now = 1.0;
        a.send_path_vecs();

        // hop 1: a's advert reaches b on the link facing a
        let mut queued = Vec::new();
        while let Some((p, _)) = a.fwdr.outgoing_pkt() {
            queued.push(p);
        }
        for p in queued {
            b.fwdr.deliver_pkt(p, 0);
            b.handle_incoming();
        }
        let index = b.lookup_route(&pfx("1.1.0.0/16")).unwrap();
        assert_eq!(b.rte_tbl[index].path, vec![ip("1.1.0.1")]);
        assert!((b.rte_tbl[index].cost - 1.0).abs() < 1e-9);

        // hop 2: b extends the vector and passes it on to c only
        let mut queued = Vec::new();
        while let Some((p, lnk)) = b.fwdr.outgoing_pkt() {
            assert_eq!(lnk, 1);
            queued.push(p);
        }
        for p in queued {
            c.fwdr.deliver_pkt(p, 0);
            c.handle_incoming();
        }

        let index = c.lookup_route(&pfx("1.1.0.0/16")).unwrap();
        let route = &c.rte_tbl[index];
        assert!(route.valid);
        assert_eq!(route.path, vec![ip("1.2.0.1"), ip("1.1.0.1")]);
        assert!((route.cost - 2.0).abs() < 1e-9);
        assert_eq!(c.fwdr.get_link(&pfx("1.1.0.0/16")), Some(0));
    }

    #[test]
    fn test_update_rule_refreshes_same_path() {
        let mut b = router("1.0.1.1", &[], &["1.0.0.1"], 0.5, false);
        let advert = |ts| {
            RouterMsg::Advert(PathVec {
                pfx: pfx("1.0.0.0/24"),
                timestamp: ts,
                cost: 0.0,
                path: vec![ip("1.0.0.1")],
            })
        };
        deliver(&mut b, &advert(1.0), 0);
        deliver(&mut b, &advert(2.0), 0);
        let index = b.lookup_route(&pfx("1.0.0.0/24")).unwrap();
        assert_eq!(b.rte_tbl[index].timestamp, 2.0);
        assert_eq!(b.rte_tbl[index].path, vec![ip("1.0.0.1")]);
    }

    #[test]
    fn test_update_rule_prefers_cheaper_path() {
        let mut r = router("1.9.0.1", &[], &["1.0.0.1", "2.0.0.1"], 0.5, false);
        r.lnk_vec[1].cost = 0.1;
        deliver(
            &mut r,
            &RouterMsg::Advert(PathVec {
                pfx: pfx("9.0.0.0/8"),
                timestamp: 1.0,
                cost: 0.0,
                path: vec![ip("1.0.0.1")],
            }),
            0,
        );
        // same age, different path, much cheaper: replaces the route
        deliver(
            &mut r,
            &RouterMsg::Advert(PathVec {
                pfx: pfx("9.0.0.0/8"),
                timestamp: 1.0,
                cost: 0.0,
                path: vec![ip("2.0.0.1")],
            }),
            1,
        );
        let index = r.lookup_route(&pfx("9.0.0.0/8")).unwrap();
        assert_eq!(r.rte_tbl[index].out_link, 1);
        assert_eq!(r.fwdr.get_link(&pfx("9.0.0.0/8")), Some(1));

        // a merely comparable alternative does not displace it
        deliver(
            &mut r,
            &RouterMsg::Advert(PathVec {
                pfx: pfx("9.0.0.0/8"),
                timestamp: 1.0,
                cost: 0.05,
                path: vec![ip("1.0.0.1")],
            }),
            0,
        );
        let index = r.lookup_route(&pfx("9.0.0.0/8")).unwrap();
        assert_eq!(r.rte_tbl[index].out_link, 1);
    }

    #[test]
    fn test_update_rule_prefers_much_newer_route() {
        let mut r = router("1.9.0.1", &[], &["1.0.0.1", "2.0.0.1"], 0.5, false);
        deliver(
            &mut r,
            &RouterMsg::Advert(PathVec {
                pfx: pfx("9.0.0.0/8"),
                timestamp: 1.0,
                cost: 0.0,
                path: vec![ip("1.0.0.1")],
            }),
            0,
        );
        // same cost but more than 20 seconds newer
        deliver(
            &mut r,
            &RouterMsg::Advert(PathVec {
                pfx: pfx("9.0.0.0/8"),
                timestamp: 22.0,
                cost: 0.0,
                path: vec![ip("2.0.0.1")],
            }),
            1,
        );
        let index = r.lookup_route(&pfx("9.0.0.0/8")).unwrap();
        assert_eq!(r.rte_tbl[index].path, vec![ip("2.0.0.1")]);
        assert_eq!(r.rte_tbl[index].out_link, 1);
    }

    #[test]
    fn test_advert_on_downed_link_is_ignored() {
        let mut r = router("1.9.0.1", &[], &["1.0.0.1"], 0.5, false);
        deliver(
            &mut r,
            &RouterMsg::Advert(PathVec {
                pfx: pfx("9.0.0.0/8"),
                timestamp: 1.0,
                cost: 0.0,
                path: vec![ip("1.0.0.1")],
            }),
            0,
        );
        r.lnk_vec[0].hello_state = 0;
        deliver(
            &mut r,
            &RouterMsg::Advert(PathVec {
                pfx: pfx("9.0.0.0/8"),
                timestamp: 50.0,
                cost: 0.0,
                path: vec![ip("7.0.0.1"), ip("1.0.0.1")],
            }),
            0,
        );
        let index = r.lookup_route(&pfx("9.0.0.0/8")).unwrap();
        assert_eq!(r.rte_tbl[index].timestamp, 1.0);
        assert_eq!(r.rte_tbl[index].path, vec![ip("1.0.0.1")]);
    }

    #[test]
    fn test_three_missed_hellos_take_link_down() {
        let mut r = router("1.9.0.1", &[], &["1.0.0.1", "2.0.0.1"], 0.5, true);
        deliver(
            &mut r,
            &RouterMsg::Advert(PathVec {
                pfx: pfx("9.0.0.0/8"),
                timestamp: 1.0,
                cost: 0.0,
                path: vec![ip("1.0.0.1")],
            }),
            0,
        );
        drain(&r);

        // first round clears got_reply, three more burn the strikes
        r.send_hellos();
        assert_eq!(r.lnk_vec[0].hello_state, 3);
        r.send_hellos();
        assert_eq!(r.lnk_vec[0].hello_state, 2);
        r.send_hellos();
        assert_eq!(r.lnk_vec[0].hello_state, 1);
        r.send_hellos();
        assert_eq!(r.lnk_vec[0].hello_state, 0);

        let index = r.lookup_route(&pfx("9.0.0.0/8")).unwrap();
        assert!(!r.rte_tbl[index].valid);

        // the failure advert went to the surviving neighbor only
        let msgs = drain(&r);
        let fadverts: Vec<&(RouterMsg, usize)> = msgs
            .iter()
            .filter(|m| match m.0 {
                RouterMsg::FailAdvert(_) => true,
                _ => false,
            })
            .collect();
        assert_eq!(fadverts.len(), 1);
        assert_eq!(fadverts[0].1, 1);
        match fadverts[0].0 {
            RouterMsg::FailAdvert(ref lf) => {
                assert_eq!(lf.from_ip, ip("1.9.0.1"));
                assert_eq!(lf.to_ip, ip("1.0.0.1"));
                assert_eq!(lf.path, vec![ip("1.9.0.1")]);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_failure_advert_hits_adjacent_links_only() {
        let mut r = router("1.9.0.1", &[], &["1.0.0.1", "2.0.0.1"], 0.5, false);
        r.rte_tbl.push(Route {
            pfx: pfx("9.0.0.0/8"),
            timestamp: 1.0,
            cost: 1.0,
            path: vec![ip("5.0.0.1"), ip("6.0.0.1")],
            out_link: 0,
            valid: true,
        });
        r.rte_tbl.push(Route {
            pfx: pfx("8.0.0.0/8"),
            timestamp: 1.0,
            cost: 1.0,
            path: vec![ip("5.0.0.1"), ip("7.0.0.1"), ip("6.0.0.1")],
            out_link: 0,
            valid: true,
        });
        deliver(
            &mut r,
            &RouterMsg::FailAdvert(LinkFail {
                from_ip: ip("5.0.0.1"),
                to_ip: ip("6.0.0.1"),
                timestamp: 9.0,
                path: vec![ip("5.0.0.1")],
            }),
            0,
        );
        assert!(!r.rte_tbl[0].valid);
        assert_eq!(r.rte_tbl[0].timestamp, 9.0);
        assert!(r.rte_tbl[1].valid);

        // the notice is extended with our address and re-propagated to
        // every neighbor
        let msgs = drain(&r);
        assert_eq!(msgs.len(), 2);
        match msgs[0].0 {
            RouterMsg::FailAdvert(ref lf) => {
                assert_eq!(lf.path, vec![ip("1.9.0.1"), ip("5.0.0.1")]);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_invalid_route_revalidated_by_new_path() {
        let mut r = router("1.9.0.1", &[], &["1.0.0.1", "2.0.0.1"], 0.5, false);
        r.rte_tbl.push(Route {
            pfx: pfx("9.0.0.0/8"),
            timestamp: 1.0,
            cost: 1.0,
            path: vec![ip("1.0.0.1")],
            out_link: 0,
            valid: false,
        });
        deliver(
            &mut r,
            &RouterMsg::Advert(PathVec {
                pfx: pfx("9.0.0.0/8"),
                timestamp: 2.0,
                cost: 0.0,
                path: vec![ip("2.0.0.1")],
            }),
            1,
        );
        let route = &r.rte_tbl[0];
        assert!(route.valid);
        assert_eq!(route.out_link, 1);
        assert_eq!(route.path, vec![ip("2.0.0.1")]);
    }

    fn deliver(r: &mut Router, msg: &RouterMsg, lnk: usize) {
        let p = Packet {
            src_adr: ip("0.0.0.0"),
            dest_adr: r.my_ip,
            protocol: PROTO_ROUTER,
            ttl: 100,
            payload: msg.to_payload(),
        };
        r.fwdr.deliver_pkt(p, lnk);
        r.handle_incoming();
    }
}
