//! Op log: retained, cursor-readable record of committed transactions.
//!
//! The model appends one entry per committed batch; downstream layers pull
//! snapshots when they see new entries. Readers are crossbeam receivers, so
//! subscription works across threads without locks on the model.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use patchwire_types::GraphOp;

/// One committed transaction.
#[derive(Debug)]
pub struct OpBatch {
    /// Monotonically increasing commit number.
    pub seq: u64,
    pub ops: Vec<GraphOp>,
}

const DEFAULT_HISTORY_CAPACITY: usize = 4096;

/// Model-side writer: appends committed batches and retains history.
pub struct OpLogWriter {
    txs: Vec<Sender<Arc<OpBatch>>>,
    history: Vec<Arc<OpBatch>>,
    next_seq: u64,
    history_capacity: usize,
}

impl OpLogWriter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(history_capacity: usize) -> Self {
        Self {
            txs: Vec::new(),
            history: Vec::new(),
            next_seq: 0,
            history_capacity,
        }
    }

    /// Create a new reader subscribed to everything committed from now on.
    pub fn subscribe(&mut self) -> OpLogReader {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.txs.push(tx);
        OpLogReader { rx }
    }

    /// Append a committed batch, fanning it out to subscribers.
    pub fn append(&mut self, ops: Vec<GraphOp>) {
        let entry = Arc::new(OpBatch {
            seq: self.next_seq,
            ops,
        });
        self.next_seq += 1;

        // Fire-and-forget: dropped readers just fall off the list.
        self.txs
            .retain(|tx| tx.send(Arc::clone(&entry)).is_ok());

        self.history.push(entry);
        if self.history.len() > self.history_capacity {
            let excess = self.history.len() - self.history_capacity;
            self.history.drain(..excess);
        }
    }

    pub fn history(&self) -> &[Arc<OpBatch>] {
        &self.history
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }
}

impl Default for OpLogWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscriber handle: drains committed batches without blocking.
pub struct OpLogReader {
    rx: Receiver<Arc<OpBatch>>,
}

impl OpLogReader {
    /// Drain all batches committed since the last drain.
    pub fn drain(&self) -> Vec<Arc<OpBatch>> {
        let mut entries = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(entry) => entries.push(entry),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchwire_types::NodeId;

    fn some_ops() -> Vec<GraphOp> {
        vec![GraphOp::RemoveNode {
            id: NodeId::new("n"),
        }]
    }

    #[test]
    fn append_and_drain() {
        let mut writer = OpLogWriter::new();
        let reader = writer.subscribe();

        writer.append(some_ops());
        writer.append(some_ops());

        let entries = reader.drain();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seq, 0);
        assert_eq!(entries[1].seq, 1);
        assert!(reader.drain().is_empty());
    }

    #[test]
    fn late_subscriber_misses_earlier_batches() {
        let mut writer = OpLogWriter::new();
        writer.append(some_ops());
        let reader = writer.subscribe();
        writer.append(some_ops());

        let entries = reader.drain();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].seq, 1);
        // history still has both
        assert_eq!(writer.history().len(), 2);
    }

    #[test]
    fn history_trims_at_capacity() {
        let mut writer = OpLogWriter::with_capacity(3);
        for _ in 0..5 {
            writer.append(some_ops());
        }
        assert_eq!(writer.history().len(), 3);
        assert_eq!(writer.history()[0].seq, 2);
    }

    #[test]
    fn dropped_reader_is_pruned() {
        let mut writer = OpLogWriter::new();
        let reader = writer.subscribe();
        drop(reader);
        writer.append(some_ops());
        writer.append(some_ops());
        assert_eq!(writer.next_seq(), 2);
    }
}
