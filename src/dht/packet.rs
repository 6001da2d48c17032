//! Wire format for ring packets.
//!
//! Packets are ASCII text, one `keyword:value` field per line, opened by
//! a fixed magic line. Parsing is total: any datagram either becomes a
//! `DhtPacket` or a `ParseError` whose reason is echoed back to the
//! sender in a `failure` reply.

use std::fmt;
use std::net::SocketAddr;

use crate::error::ParseError;
use crate::{INIT_TTL, MAX_HASH};

/// Required first line of every ring packet.
pub const MAGIC: &'static str = "CSE473 DHTPv0.1";

/// A server's address together with the first hash it is responsible for.
/// The first hash doubles as the server's identifier in routing tables.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct NodeInfo {
    pub addr: SocketAddr,
    pub first_hash: u32,
}

impl NodeInfo {
    pub fn new(addr: SocketAddr, first_hash: u32) -> NodeInfo {
        NodeInfo {
            addr: addr,
            first_hash: first_hash,
        }
    }

    fn parse(s: &str) -> Option<NodeInfo> {
        let mut parts = s.rsplitn(2, ':');
        let first_hash: u32 = parts.next()?.parse().ok()?;
        let addr: SocketAddr = parts.next()?.parse().ok()?;
        if first_hash > MAX_HASH {
            return None;
        }
        Some(NodeInfo::new(addr, first_hash))
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.first_hash)
    }
}

/// The closed interval of hash values a server is responsible for.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct HashRange {
    pub lo: u32,
    pub hi: u32,
}

impl HashRange {
    pub fn new(lo: u32, hi: u32) -> HashRange {
        HashRange { lo: lo, hi: hi }
    }

    pub fn contains(&self, hash: u32) -> bool {
        self.lo <= hash && hash <= self.hi
    }

    fn parse(s: &str) -> Option<HashRange> {
        let mut parts = s.split(':');
        let lo: u32 = parts.next()?.parse().ok()?;
        let hi: u32 = parts.next()?.parse().ok()?;
        if lo > MAX_HASH || hi > MAX_HASH || parts.next().is_some() {
            return None;
        }
        Some(HashRange::new(lo, hi))
    }
}

impl fmt::Display for HashRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.lo, self.hi)
    }
}

/// The fields that vary by packet kind. Every kind carries only what it
/// means; the shared envelope fields live on `DhtPacket`.
#[derive(Clone, PartialEq, Debug)]
pub enum DhtPayload {
    Get {
        key: String,
    },
    /// A put without a value removes the key.
    Put {
        key: String,
        value: Option<String>,
    },
    /// Reply to get/put/join; join replies carry the ring fields.
    Success {
        key: Option<String>,
        value: Option<String>,
        hash_range: Option<HashRange>,
        succ_info: Option<NodeInfo>,
        pred_info: Option<NodeInfo>,
    },
    NoMatch {
        key: String,
    },
    Failure {
        reason: String,
    },
    Join,
    Leave,
    Transfer {
        key: String,
        value: String,
    },
    Update {
        hash_range: Option<HashRange>,
        succ_info: Option<NodeInfo>,
        pred_info: Option<NodeInfo>,
    },
}

/// A parsed ring packet: the kind-specific payload plus the envelope
/// fields any kind may carry.
#[derive(Clone, PartialEq, Debug)]
pub struct DhtPacket {
    pub payload: DhtPayload,
    pub tag: u32,
    pub ttl: i32,
    /// Address of the requesting client, stamped by the relay.
    pub client_adr: Option<SocketAddr>,
    /// Address of the first server to see the request.
    pub relay_adr: Option<SocketAddr>,
    /// Routing information about the sending server.
    pub sender_info: Option<NodeInfo>,
}

impl DhtPacket {
    pub fn new(payload: DhtPayload) -> DhtPacket {
        DhtPacket {
            payload: payload,
            tag: 0,
            ttl: INIT_TTL,
            client_adr: None,
            relay_adr: None,
            sender_info: None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.payload {
            DhtPayload::Get { .. } => "get",
            DhtPayload::Put { .. } => "put",
            DhtPayload::Success { .. } => "success",
            DhtPayload::NoMatch { .. } => "no match",
            DhtPayload::Failure { .. } => "failure",
            DhtPayload::Join => "join",
            DhtPayload::Leave => "leave",
            DhtPayload::Transfer { .. } => "transfer",
            DhtPayload::Update { .. } => "update",
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self.payload {
            DhtPayload::Get { ref key }
            | DhtPayload::Put { ref key, .. }
            | DhtPayload::NoMatch { ref key }
            | DhtPayload::Transfer { ref key, .. } => Some(key),
            DhtPayload::Success { ref key, .. } => key.as_ref().map(|k| k.as_str()),
            _ => None,
        }
    }

    fn value(&self) -> Option<&str> {
        match self.payload {
            DhtPayload::Put { ref value, .. } | DhtPayload::Success { ref value, .. } => {
                value.as_ref().map(|v| v.as_str())
            }
            DhtPayload::Transfer { ref value, .. } => Some(value),
            _ => None,
        }
    }

    fn reason(&self) -> Option<&str> {
        match self.payload {
            DhtPayload::Failure { ref reason } => Some(reason),
            _ => None,
        }
    }

    pub fn hash_range(&self) -> Option<HashRange> {
        match self.payload {
            DhtPayload::Success { ref hash_range, .. }
            | DhtPayload::Update { ref hash_range, .. } => *hash_range,
            _ => None,
        }
    }

    pub fn succ_info(&self) -> Option<NodeInfo> {
        match self.payload {
            DhtPayload::Success { ref succ_info, .. }
            | DhtPayload::Update { ref succ_info, .. } => *succ_info,
            _ => None,
        }
    }

    pub fn pred_info(&self) -> Option<NodeInfo> {
        match self.payload {
            DhtPayload::Success { ref pred_info, .. }
            | DhtPayload::Update { ref pred_info, .. } => *pred_info,
            _ => None,
        }
    }

    /// True for the three packet kinds that answer a request.
    pub fn is_reply(&self) -> bool {
        match self.payload {
            DhtPayload::Success { .. } | DhtPayload::NoMatch { .. } | DhtPayload::Failure { .. } => {
                true
            }
            _ => false,
        }
    }

    /// Parse the text of a datagram.
    pub fn parse(text: &str) -> Result<DhtPacket, ParseError> {
        let mut lines = text.lines();
        match lines.next() {
            Some(first) if first == MAGIC => {}
            _ => return Err(ParseError::new("missing magic string")),
        }

        let mut typ: Option<String> = None;
        let mut key: Option<String> = None;
        let mut value: Option<String> = None;
        let mut reason: Option<String> = None;
        let mut tag: Option<u32> = None;
        let mut ttl: Option<i32> = None;
        let mut client_adr: Option<SocketAddr> = None;
        let mut relay_adr: Option<SocketAddr> = None;
        let mut sender_info: Option<NodeInfo> = None;
        let mut succ_info: Option<NodeInfo> = None;
        let mut pred_info: Option<NodeInfo> = None;
        let mut hash_range: Option<HashRange> = None;
        // first bad line wins; the scan continues so tag and ttl can be
        // salvaged for the failure reply
        let mut bad: Option<String> = None;

        for line in lines {
            if line.is_empty() {
                continue;
            }
            let mut halves = line.splitn(2, ':');
            let keyword = halves.next().unwrap();
            let rest = match halves.next() {
                Some(rest) => rest,
                None => {
                    if bad.is_none() {
                        bad = Some(format!("no separator on line \"{}\"", line));
                    }
                    continue;
                }
            };
            let mut fail = |msg: String| {
                if bad.is_none() {
                    bad = Some(msg);
                }
            };
            match keyword {
                "type" => typ = Some(rest.to_string()),
                "key" => key = Some(rest.to_string()),
                "value" => value = Some(rest.to_string()),
                "reason" => reason = Some(rest.to_string()),
                "tag" => match rest.parse() {
                    Ok(t) => tag = Some(t),
                    Err(_) => fail(format!("bad tag \"{}\"", rest)),
                },
                "ttl" => match rest.parse() {
                    Ok(t) => ttl = Some(t),
                    Err(_) => fail(format!("bad ttl \"{}\"", rest)),
                },
                "clientAdr" => match rest.parse() {
                    Ok(a) => client_adr = Some(a),
                    Err(_) => fail(format!("bad clientAdr \"{}\"", rest)),
                },
                "relayAdr" => match rest.parse() {
                    Ok(a) => relay_adr = Some(a),
                    Err(_) => fail(format!("bad relayAdr \"{}\"", rest)),
                },
                "senderInfo" => match NodeInfo::parse(rest) {
                    Some(info) => sender_info = Some(info),
                    None => fail(format!("bad senderInfo \"{}\"", rest)),
                },
                "succInfo" => match NodeInfo::parse(rest) {
                    Some(info) => succ_info = Some(info),
                    None => fail(format!("bad succInfo \"{}\"", rest)),
                },
                "predInfo" => match NodeInfo::parse(rest) {
                    Some(info) => pred_info = Some(info),
                    None => fail(format!("bad predInfo \"{}\"", rest)),
                },
                "hashRange" => match HashRange::parse(rest) {
                    Some(range) => hash_range = Some(range),
                    None => fail(format!("bad hashRange \"{}\"", rest)),
                },
                other => fail(format!("unknown keyword \"{}\"", other)),
            }
        }

        let tag = tag.unwrap_or(0);
        let ttl = ttl.unwrap_or(INIT_TTL);
        let err = |reason: String| ParseError {
            reason: reason,
            tag: tag,
            ttl: ttl,
        };
        if let Some(reason) = bad {
            return Err(err(reason));
        }

        let typ = match typ {
            Some(typ) => typ,
            None => return Err(err("missing type field".to_string())),
        };
        let require_key = |key: Option<String>| match key {
            Some(ref k) if k.is_empty() => Err(err("empty key".to_string())),
            Some(k) => Ok(k),
            None => Err(err(format!("{} packet without key", typ))),
        };
        let payload = match typ.as_str() {
            "get" => DhtPayload::Get {
                key: require_key(key)?,
            },
            "put" => DhtPayload::Put {
                key: require_key(key)?,
                value: value,
            },
            "success" => DhtPayload::Success {
                key: key,
                value: value,
                hash_range: hash_range,
                succ_info: succ_info,
                pred_info: pred_info,
            },
            "no match" => DhtPayload::NoMatch {
                key: require_key(key)?,
            },
            "failure" => DhtPayload::Failure {
                reason: reason.unwrap_or_else(|| "unspecified".to_string()),
            },
            "join" => DhtPayload::Join,
            "leave" => {
                if sender_info.is_none() {
                    return Err(err("leave packet without senderInfo".to_string()));
                }
                DhtPayload::Leave
            }
            "transfer" => {
                let key = require_key(key)?;
                match value {
                    Some(value) => DhtPayload::Transfer {
                        key: key,
                        value: value,
                    },
                    None => return Err(err("transfer packet without value".to_string())),
                }
            }
            "update" => DhtPayload::Update {
                hash_range: hash_range,
                succ_info: succ_info,
                pred_info: pred_info,
            },
            other => return Err(err(format!("unknown type \"{}\"", other))),
        };

        Ok(DhtPacket {
            payload: payload,
            tag: tag,
            ttl: ttl,
            client_adr: client_adr,
            relay_adr: relay_adr,
            sender_info: sender_info,
        })
    }

    /// Render the packet in wire form.
    pub fn to_wire(&self) -> String {
        let mut s = String::new();
        s.push_str(MAGIC);
        s.push('\n');
        s.push_str(&format!("type:{}\n", self.type_name()));
        if let Some(key) = self.key() {
            s.push_str(&format!("key:{}\n", key));
        }
        if let Some(value) = self.value() {
            s.push_str(&format!("value:{}\n", value));
        }
        s.push_str(&format!("tag:{}\n", self.tag));
        s.push_str(&format!("ttl:{}\n", self.ttl));
        if let Some(adr) = self.client_adr {
            s.push_str(&format!("clientAdr:{}\n", adr));
        }
        if let Some(adr) = self.relay_adr {
            s.push_str(&format!("relayAdr:{}\n", adr));
        }
        if let Some(info) = self.sender_info {
            s.push_str(&format!("senderInfo:{}\n", info));
        }
        if let Some(info) = self.succ_info() {
            s.push_str(&format!("succInfo:{}\n", info));
        }
        if let Some(info) = self.pred_info() {
            s.push_str(&format!("predInfo:{}\n", info));
        }
        if let Some(range) = self.hash_range() {
            s.push_str(&format!("hashRange:{}\n", range));
        }
        if let Some(reason) = self.reason() {
            s.push_str(&format!("reason:{}\n", reason));
        }
        s
    }
}
