//! Forwarder and router behavior over in-memory links.

extern crate rand;
extern crate ringnet;

mod common;

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::TestLink;
use ringnet::overlay::{Forwarder, LinkSubstrate, NborInfo, Packet, Router};
use ringnet::prefix::Prefix;

fn ip(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

/// A link substrate that counts what it transmits.
#[derive(Clone)]
struct CountingLink {
    inner: TestLink,
    sent: Arc<AtomicUsize>,
}

impl LinkSubstrate for CountingLink {
    fn send(&self, p: Packet, link: usize) {
        self.sent.fetch_add(1, Ordering::SeqCst);
        self.inner.send(p, link);
    }

    fn receive(&self) -> Option<(Packet, usize)> {
        self.inner.receive()
    }

    fn incoming(&self) -> bool {
        self.inner.incoming()
    }

    fn ready(&self, link: usize) -> bool {
        self.inner.ready(link)
    }
}

#[test]
fn forwards_between_neighbors() {
    let mail_x = common::mailbox();
    let mail_y = common::mailbox();
    let sub_x = TestLink {
        inq: mail_x.clone(),
        peers: vec![(mail_y.clone(), 0)],
    };
    let sub_y = TestLink {
        inq: mail_y.clone(),
        peers: vec![(mail_x.clone(), 0)],
    };

    let x = Forwarder::new(ip("1.0.0.1"));
    let y = Forwarder::new(ip("1.0.0.2"));
    x.start(sub_x);
    y.start(sub_y);

    x.send("over the wire".to_string(), ip("1.0.0.2"));
    let (payload, from) = y.receive();
    assert_eq!(payload, "over the wire");
    assert_eq!(from, ip("1.0.0.1"));

    x.stop();
    y.stop();
}

#[test]
fn middle_hop_forwards_by_longest_prefix() {
    // x -- y -- z: x routes everything at y; y needs a host route for z
    let mail_x = common::mailbox();
    let mail_y = common::mailbox();
    let mail_z = common::mailbox();
    let sub_x = TestLink {
        inq: mail_x.clone(),
        peers: vec![(mail_y.clone(), 0)],
    };
    let sub_y = TestLink {
        inq: mail_y.clone(),
        peers: vec![(mail_x.clone(), 0), (mail_z.clone(), 0)],
    };
    let sub_z = TestLink {
        inq: mail_z.clone(),
        peers: vec![(mail_y.clone(), 1)],
    };

    let x = Forwarder::new(ip("1.0.0.1"));
    let y = Forwarder::new(ip("1.0.0.2"));
    let z = Forwarder::new(ip("1.0.0.3"));
    y.add_route(Prefix::parse("1.0.0.3/32").unwrap(), 1);

    x.start(sub_x);
    y.start(sub_y);
    z.start(sub_z);

    x.send("through the middle".to_string(), ip("1.0.0.3"));
    let (payload, from) = z.receive();
    assert_eq!(payload, "through the middle");
    assert_eq!(from, ip("1.0.0.1"));

    x.stop();
    y.stop();
    z.stop();
}

#[test]
fn router_threads_exchange_hellos() {
    let mail_x = common::mailbox();
    let mail_y = common::mailbox();
    let sent_x = Arc::new(AtomicUsize::new(0));
    let sent_y = Arc::new(AtomicUsize::new(0));
    let sub_x = CountingLink {
        inner: TestLink {
            inq: mail_x.clone(),
            peers: vec![(mail_y.clone(), 0)],
        },
        sent: sent_x.clone(),
    };
    let sub_y = CountingLink {
        inner: TestLink {
            inq: mail_y.clone(),
            peers: vec![(mail_x.clone(), 0)],
        },
        sent: sent_y.clone(),
    };

    let fwdr_x = Forwarder::new(ip("1.0.0.1"));
    let fwdr_y = Forwarder::new(ip("1.0.0.2"));
    let rtr_x = Router::new(
        ip("1.0.0.1"),
        fwdr_x.clone(),
        vec![Prefix::parse("1.0.0.0/24").unwrap()],
        vec![NborInfo {
            ip: ip("1.0.0.2"),
            delay: 0.001,
        }],
        false,
    );
    let rtr_y = Router::new(
        ip("1.0.0.2"),
        fwdr_y.clone(),
        vec![],
        vec![NborInfo {
            ip: ip("1.0.0.1"),
            delay: 0.001,
        }],
        false,
    );

    fwdr_x.start(sub_x);
    fwdr_y.start(sub_y);
    let rtr_x = rtr_x.start();
    let rtr_y = rtr_y.start();

    // a couple of hello rounds fire at the one-second mark
    thread::sleep(Duration::from_millis(2500));

    rtr_x.stop();
    rtr_y.stop();
    fwdr_x.stop();
    fwdr_y.stop();

    // each side sent hellos and answered the peer's with hello2u
    assert!(sent_x.load(Ordering::SeqCst) >= 2);
    assert!(sent_y.load(Ordering::SeqCst) >= 2);
}
