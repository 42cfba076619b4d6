//! Input-keyed route cache.
//!
//! Each entry remembers the hash of everything its route was derived from:
//! endpoint node positions, rotations, layout identity, manual corners, and
//! the routing config. A key mismatch forces recomputation; matching keys
//! reuse the stored geometry byte-for-byte.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use patchwire_types::{EdgeId, EdgeRecord, NodeRecord};

use super::{EdgeRoute, RoutingConfig};

#[derive(Debug, Clone)]
struct CacheEntry {
    key: u64,
    route: EdgeRoute,
}

/// Per-edge route memo.
#[derive(Debug, Default)]
pub struct RouteCache {
    entries: HashMap<EdgeId, CacheEntry>,
}

impl RouteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored route for an edge if its inputs hash to `key`.
    pub fn get(&self, edge: &EdgeId, key: u64) -> Option<&EdgeRoute> {
        self.entries
            .get(edge)
            .filter(|e| e.key == key)
            .map(|e| &e.route)
    }

    /// Stored route regardless of key. Used for edges the caller asserts
    /// unchanged.
    pub fn get_unchecked(&self, edge: &EdgeId) -> Option<&EdgeRoute> {
        self.entries.get(edge).map(|e| &e.route)
    }

    pub fn insert(&mut self, edge: EdgeId, key: u64, route: EdgeRoute) {
        self.entries.insert(edge, CacheEntry { key, route });
    }

    /// Drop entries for edges that no longer exist.
    pub fn retain_edges<F: Fn(&EdgeId) -> bool>(&mut self, keep: F) {
        self.entries.retain(|id, _| keep(id));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Hash of every routing input for one edge.
pub fn route_key(
    edge: &EdgeRecord,
    from_node: &NodeRecord,
    to_node: &NodeRecord,
    config: &RoutingConfig,
) -> u64 {
    let mut h = DefaultHasher::new();
    edge.from.slot.hash(&mut h);
    edge.to.slot.hash(&mut h);
    hash_node(&mut h, from_node);
    hash_node(&mut h, to_node);
    for c in &edge.corners {
        c.x.hash(&mut h);
        c.y.hash(&mut h);
    }
    config.ticks_per_grid.to_bits().hash(&mut h);
    config.stub_length.hash(&mut h);
    (config.bend_preference as u8).hash(&mut h);
    h.finish()
}

fn hash_node(h: &mut DefaultHasher, node: &NodeRecord) {
    node.pos.x.hash(h);
    node.pos.y.hash(h);
    node.rotation.quarter_turns().hash(h);
    // Layout identity: derived from the type and, for group nodes, the
    // definition the instance references.
    node.node_type.hash(h);
    if let Some(g) = &node.group_ref {
        g.as_str().hash(h);
    }
}
