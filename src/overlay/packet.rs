//! Wire format for router-to-router messages.
//!
//! Router payloads are ASCII text opened by the magic line `RPv0`.
//! Parsing is total; a payload that does not parse is silently dropped
//! by the router, so `parse` returns an Option rather than an error.

use std::net::Ipv4Addr;

use crate::prefix::Prefix;

/// Required first line of every router payload.
pub const MAGIC: &'static str = "RPv0";

/// An advertised route: the prefix, when it was generated, the path
/// cost, and the router IPs along the path ending at the originator.
#[derive(Clone, PartialEq, Debug)]
pub struct PathVec {
    pub pfx: Prefix,
    pub timestamp: f64,
    pub cost: f64,
    pub path: Vec<Ipv4Addr>,
}

/// A link-failure notice: the two ends of the dead link, when it was
/// noticed, and the routers the notice has visited.
#[derive(Clone, PartialEq, Debug)]
pub struct LinkFail {
    pub from_ip: Ipv4Addr,
    pub to_ip: Ipv4Addr,
    pub timestamp: f64,
    pub path: Vec<Ipv4Addr>,
}

#[derive(Clone, PartialEq, Debug)]
pub enum RouterMsg {
    Hello { timestamp: f64 },
    Hello2u { timestamp: f64 },
    Advert(PathVec),
    FailAdvert(LinkFail),
}

impl RouterMsg {
    pub fn parse(payload: &str) -> Option<RouterMsg> {
        let mut lines = payload.lines();
        if lines.next()? != MAGIC {
            return None;
        }
        let (keyword, typ) = split_field(lines.next()?)?;
        if keyword != "type" {
            return None;
        }
        let body = lines.next()?;
        match typ {
            "hello" | "hello2u" => {
                let (keyword, rest) = split_field(body)?;
                if keyword != "timestamp" {
                    return None;
                }
                let timestamp: f64 = rest.parse().ok()?;
                if typ == "hello" {
                    Some(RouterMsg::Hello {
                        timestamp: timestamp,
                    })
                } else {
                    Some(RouterMsg::Hello2u {
                        timestamp: timestamp,
                    })
                }
            }
            "advert" => {
                let (keyword, rest) = split_field(body)?;
                if keyword != "pathvec" {
                    return None;
                }
                let info: Vec<&str> = rest.split_whitespace().collect();
                if info.len() < 4 {
                    return None;
                }
                let mut path = Vec::new();
                for ip in &info[3..] {
                    path.push(ip.parse().ok()?);
                }
                Some(RouterMsg::Advert(PathVec {
                    pfx: Prefix::parse(info[0])?,
                    timestamp: info[1].parse().ok()?,
                    cost: info[2].parse().ok()?,
                    path: path,
                }))
            }
            "fadvert" => {
                let (keyword, rest) = split_field(body)?;
                if keyword != "linkfail" {
                    return None;
                }
                let info: Vec<&str> = rest.split_whitespace().collect();
                if info.len() < 4 {
                    return None;
                }
                let mut path = Vec::new();
                for ip in &info[3..] {
                    path.push(ip.parse().ok()?);
                }
                Some(RouterMsg::FailAdvert(LinkFail {
                    from_ip: info[0].parse().ok()?,
                    to_ip: info[1].parse().ok()?,
                    timestamp: info[2].parse().ok()?,
                    path: path,
                }))
            }
            _ => None,
        }
    }

    pub fn to_payload(&self) -> String {
        match *self {
            RouterMsg::Hello { timestamp } => {
                format!("{}\ntype: hello\ntimestamp: {:.4}\n", MAGIC, timestamp)
            }
            RouterMsg::Hello2u { timestamp } => {
                format!("{}\ntype: hello2u\ntimestamp: {:.4}\n", MAGIC, timestamp)
            }
            RouterMsg::Advert(ref pv) => {
                let mut s = format!(
                    "{}\ntype: advert\npathvec: {} {:.3} {:.4}",
                    MAGIC, pv.pfx, pv.timestamp, pv.cost
                );
                for ip in &pv.path {
                    s.push_str(&format!(" {}", ip));
                }
                s.push('\n');
                s
            }
            RouterMsg::FailAdvert(ref lf) => {
                let mut s = format!(
                    "{}\ntype: fadvert\nlinkfail: {} {} {:.3}",
                    MAGIC, lf.from_ip, lf.to_ip, lf.timestamp
                );
                for ip in &lf.path {
                    s.push_str(&format!(" {}", ip));
                }
                s.push('\n');
                s
            }
        }
    }
}

/// Split a `keyword: value` line, trimming the value.
fn split_field(line: &str) -> Option<(&str, &str)> {
    let mut halves = line.splitn(2, ':');
    let keyword = halves.next()?.trim();
    let rest = halves.next()?.trim();
    Some((keyword, rest))
}
