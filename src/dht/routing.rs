//! The node's routing table: an ordered, bounded list of
//! (address, firstHash) entries learned from packets passing through.

use crate::dht::packet::NodeInfo;
use crate::hash::distance;

#[derive(Clone, Debug)]
pub struct RouteTable {
    routes: Vec<NodeInfo>,
    num_routes: usize,
}

impl RouteTable {
    pub fn new(num_routes: usize) -> RouteTable {
        RouteTable {
            routes: Vec::new(),
            num_routes: num_routes,
        }
    }

    /// Add an entry, evicting the oldest non-successor entry when the
    /// table would exceed its bound. Entries already present are left
    /// untouched. The logged change flag deliberately treats an insert
    /// that stays within capacity as a change, and an eviction as a
    /// change only when the evicted entry differs from the new one.
    pub fn add(&mut self, new_route: NodeInfo, succ: &NodeInfo) {
        if self.routes.contains(&new_route) {
            return;
        }
        self.routes.push(new_route);

        let is_changed;
        if self.routes.len() <= self.num_routes {
            is_changed = true;
        } else {
            match self.routes.iter().position(|route| route != succ) {
                Some(index) => {
                    let evicted = self.routes.remove(index);
                    is_changed = evicted != new_route;
                }
                None => is_changed = false,
            }
        }
        if is_changed {
            debug!("rteTbl={:?}", self.routes);
        }
    }

    /// Remove an entry if present.
    pub fn remove(&mut self, route: &NodeInfo) {
        let before = self.routes.len();
        self.routes.retain(|entry| entry != route);
        if self.routes.len() != before {
            debug!("rteTbl={:?}", self.routes);
        }
    }

    /// Pick the server closest to `hash`: the entry whose firstHash
    /// minimizes the clockwise distance to the hash. Ties go to the
    /// earliest entry.
    pub fn forward_target(&self, hash: u32) -> Option<NodeInfo> {
        let mut selected: Option<NodeInfo> = None;
        let mut closest = 0;
        for route in &self.routes {
            let diff = distance(hash, route.first_hash);
            if selected.is_none() || diff < closest {
                selected = Some(*route);
                closest = diff;
            }
        }
        selected
    }

    pub fn contains(&self, route: &NodeInfo) -> bool {
        self.routes.contains(route)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn entries(&self) -> &[NodeInfo] {
        self.routes.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::RouteTable;
    use crate::dht::packet::NodeInfo;
    use crate::MAX_HASH;

    fn info(port: u16, first_hash: u32) -> NodeInfo {
        NodeInfo::new(format!("127.0.0.1:{}", port).parse().unwrap(), first_hash)
    }

    #[test]
    fn test_bound_never_exceeded() {
        let succ = info(1, 100);
        let mut tbl = RouteTable::new(3);
        tbl.add(succ, &succ);
        for port in 2..10 {
            tbl.add(info(port, port as u32 * 100), &succ);
            assert!(tbl.len() <= 3);
        }
        assert!(tbl.contains(&succ));
    }

    #[test]
    fn test_successor_survives_eviction() {
        let succ = info(1, 100);
        let mut tbl = RouteTable::new(2);
        tbl.add(succ, &succ);
        tbl.add(info(2, 200), &succ);
        tbl.add(info(3, 300), &succ);
        tbl.add(info(4, 400), &succ);
        assert_eq!(tbl.len(), 2);
        assert!(tbl.contains(&succ));
        // oldest non-successor goes first
        assert!(!tbl.contains(&info(2, 200)));
        assert!(tbl.contains(&info(4, 400)));
    }

    #[test]
    fn test_duplicates_not_added() {
        let succ = info(1, 100);
        let mut tbl = RouteTable::new(3);
        tbl.add(succ, &succ);
        tbl.add(succ, &succ);
        tbl.add(info(1, 100), &succ);
        assert_eq!(tbl.len(), 1);
    }

    #[test]
    fn test_remove() {
        let succ = info(1, 100);
        let mut tbl = RouteTable::new(3);
        tbl.add(succ, &succ);
        tbl.add(info(2, 200), &succ);
        tbl.remove(&info(2, 200));
        assert_eq!(tbl.len(), 1);
        tbl.remove(&info(9, 900));
        assert_eq!(tbl.len(), 1);
    }

    #[test]
    fn test_forward_target_picks_closest_clockwise() {
        let succ = info(1, 1000);
        let mut tbl = RouteTable::new(4);
        tbl.add(succ, &succ);
        tbl.add(info(2, 5000), &succ);
        tbl.add(info(3, 9000), &succ);

        // 6000 is clockwise-closest to the 5000 entry
        assert_eq!(tbl.forward_target(6000), Some(info(2, 5000)));
        // 500 wraps all the way around to the highest firstHash
        assert_eq!(tbl.forward_target(500), Some(info(3, 9000)));
        assert_eq!(tbl.forward_target(1000), Some(info(1, 1000)));
    }

    #[test]
    fn test_forward_target_wraparound_distance() {
        let succ = info(1, MAX_HASH - 10);
        let mut tbl = RouteTable::new(2);
        tbl.add(succ, &succ);
        tbl.add(info(2, 5), &succ);
        // 2 is clockwise from MAX_HASH - 10 by 13, but from 5 it is
        // nearly a full circle away
        assert_eq!(tbl.forward_target(2), Some(succ));
    }

    #[test]
    fn test_empty_table_has_no_target() {
        let tbl = RouteTable::new(2);
        assert_eq!(tbl.forward_target(42), None);
    }
}
