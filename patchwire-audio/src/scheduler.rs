//! Tick-indexed event scheduler.
//!
//! A flat ring of integer-tick slots serves the dense near future with
//! O(1) amortized enqueue/pop; delays beyond the ring horizon spill to a
//! long-tail heap. Events at the same tick pop in enqueue order (stable
//! FIFO via sequence numbers).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use patchwire_types::{EdgeId, NodeId, RuntimeEvent};

/// Integer-tick slots covered by the ring. Delays beyond this horizon use
/// the heap.
const RING_SLOTS: usize = 256;

/// An event plus its FIFO sequence number.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub event: RuntimeEvent,
    pub(crate) seq: u64,
}

struct HeapEntry(ScheduledEvent);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert for min-first by (tick, seq).
        other
            .0
            .event
            .tick
            .total_cmp(&self.0.event.tick)
            .then(other.0.seq.cmp(&self.0.seq))
    }
}

/// Ring-plus-heap scheduler.
pub struct TickScheduler {
    ring: Vec<Vec<ScheduledEvent>>,
    /// Integer tick of the earliest ring slot still reachable.
    base: u64,
    heap: BinaryHeap<HeapEntry>,
    len: usize,
    next_seq: u64,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self {
            ring: (0..RING_SLOTS).map(|_| Vec::new()).collect(),
            base: 0,
            heap: BinaryHeap::new(),
            len: 0,
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn slot_of(&self, tick: f64) -> Option<usize> {
        let floor = tick.max(0.0).floor() as u64;
        let floor = floor.max(self.base);
        if floor < self.base + RING_SLOTS as u64 {
            Some((floor % RING_SLOTS as u64) as usize)
        } else {
            None
        }
    }

    /// Schedule an event. Never fails; capacity policy lives with the
    /// caller.
    pub fn enqueue(&mut self, event: RuntimeEvent) {
        let entry = ScheduledEvent {
            event,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.push_entry(entry);
    }

    /// Re-insert an event that was previously popped out for mutation,
    /// keeping its original sequence number so FIFO order within a tick is
    /// preserved.
    pub(crate) fn restore(&mut self, entry: ScheduledEvent) {
        self.push_entry(entry);
    }

    fn push_entry(&mut self, entry: ScheduledEvent) {
        self.len += 1;
        match self.slot_of(entry.event.tick) {
            Some(slot) => self.ring[slot].push(entry),
            None => self.heap.push(HeapEntry(entry)),
        }
    }

    /// Smallest scheduled tick, if any.
    pub fn peek_min_tick(&self) -> Option<f64> {
        let mut min: Option<f64> = self.heap.peek().map(|e| e.0.event.tick);
        for offset in 0..RING_SLOTS as u64 {
            let slot = ((self.base + offset) % RING_SLOTS as u64) as usize;
            for e in &self.ring[slot] {
                if min.map_or(true, |m| e.event.tick < m) {
                    min = Some(e.event.tick);
                }
            }
            // Slots are floor-indexed: once a non-empty slot has been
            // scanned, later slots cannot hold a smaller tick than its
            // floor, but the found minimum may still beat the heap.
            if !self.ring[slot].is_empty() {
                break;
            }
        }
        min
    }

    /// Pop every event with `tick <= until`, sorted by `(tick, seq)`.
    pub fn pop_until(&mut self, until: f64) -> Vec<ScheduledEvent> {
        let mut popped: Vec<ScheduledEvent> = Vec::new();

        let end_floor = until.max(0.0).floor() as u64;
        // Always scan at least the base slot: events scheduled into the
        // past clamp there and must stay reachable.
        let scan_end = end_floor.max(self.base).min(self.base + RING_SLOTS as u64 - 1);
        for floor in self.base..=scan_end {
            let slot = (floor % RING_SLOTS as u64) as usize;
            let mut keep = Vec::new();
            for e in self.ring[slot].drain(..) {
                if e.event.tick <= until {
                    popped.push(e);
                } else {
                    keep.push(e);
                }
            }
            self.ring[slot] = keep;
        }

        while self
            .heap
            .peek()
            .map_or(false, |top| top.0.event.tick <= until)
        {
            if let Some(HeapEntry(e)) = self.heap.pop() {
                popped.push(e);
            }
        }

        popped.sort_by(|a, b| {
            a.event
                .tick
                .total_cmp(&b.event.tick)
                .then(a.seq.cmp(&b.seq))
        });
        self.len -= popped.len();

        // Advance the ring window; drained slots become the far horizon.
        if end_floor > self.base {
            self.base = end_floor.min(self.base + RING_SLOTS as u64 - 1);
        }
        popped
    }

    /// Drop every in-flight event targeting a node. Returns the number
    /// removed.
    pub fn remove_by_node(&mut self, node: &NodeId) -> usize {
        self.remove_where(|e| e.event.node == *node)
    }

    /// Drop every in-flight event travelling an edge. Returns the number
    /// removed.
    pub fn remove_by_edge(&mut self, edge: &EdgeId) -> usize {
        self.remove_where(|e| e.event.edge.as_ref() == Some(edge))
    }

    /// Remove and return every in-flight event travelling an edge, for
    /// rescheduling.
    pub(crate) fn take_edge(&mut self, edge: &EdgeId) -> Vec<ScheduledEvent> {
        let mut taken = Vec::new();
        for slot in &mut self.ring {
            let mut keep = Vec::new();
            for e in slot.drain(..) {
                if e.event.edge.as_ref() == Some(edge) {
                    taken.push(e);
                } else {
                    keep.push(e);
                }
            }
            *slot = keep;
        }
        let mut heap_keep = Vec::new();
        for HeapEntry(e) in self.heap.drain() {
            if e.event.edge.as_ref() == Some(edge) {
                taken.push(e);
            } else {
                heap_keep.push(HeapEntry(e));
            }
        }
        self.heap = heap_keep.into_iter().collect();
        self.len -= taken.len();
        taken.sort_by(|a, b| a.seq.cmp(&b.seq));
        taken
    }

    fn remove_where<F: Fn(&ScheduledEvent) -> bool>(&mut self, pred: F) -> usize {
        let before = self.len;
        for slot in &mut self.ring {
            slot.retain(|e| !pred(e));
        }
        let mut heap_keep = Vec::new();
        for HeapEntry(e) in self.heap.drain() {
            if !pred(&e) {
                heap_keep.push(HeapEntry(e));
            }
        }
        self.heap = heap_keep.into_iter().collect();
        self.len = self.ring.iter().map(Vec::len).sum::<usize>() + self.heap.len();
        before - self.len
    }

    pub fn clear(&mut self) {
        for slot in &mut self.ring {
            slot.clear();
        }
        self.heap.clear();
        self.len = 0;
    }

    /// Visit every in-flight event, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &ScheduledEvent> {
        self.ring
            .iter()
            .flat_map(|s| s.iter())
            .chain(self.heap.iter().map(|h| &h.0))
    }
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new()
    }
}
