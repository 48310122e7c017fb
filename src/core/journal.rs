//! Operation journal
//!
//! An unbounded multi-producer, single-consumer queue of operation records
//! waiting to be appended to the durable store. Request handlers push without
//! blocking; the flusher is the only consumer and drains in FIFO order.
//!
//! When a durable append fails, the flusher hands the batch back with
//! [`OperationJournal::requeue_front`] so the next tick retries it ahead of
//! newer records and the durable log keeps creation order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::types::OperationRecord;

#[derive(Debug)]
struct JournalConsumer {
    receiver: UnboundedReceiver<OperationRecord>,
    /// Records returned after a failed append; drained before the channel
    requeued: VecDeque<OperationRecord>,
}

#[derive(Debug)]
pub struct OperationJournal {
    sender: UnboundedSender<OperationRecord>,
    consumer: Mutex<JournalConsumer>,
    pending: AtomicUsize,
}

impl OperationJournal {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            consumer: Mutex::new(JournalConsumer {
                receiver,
                requeued: VecDeque::new(),
            }),
            pending: AtomicUsize::new(0),
        }
    }

    /// Enqueue a record. Never blocks.
    pub fn push(&self, record: OperationRecord) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        // the receiver lives in `self`, so the channel cannot be closed here
        let _ = self.sender.send(record);
    }

    /// Dequeue up to `max` records, stopping early once `budget` has elapsed
    ///
    /// Records not taken stay queued for the next call.
    pub fn drain(&self, max: usize, budget: Duration) -> Vec<OperationRecord> {
        let started = Instant::now();
        let mut consumer = self
            .consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut batch = Vec::new();
        while batch.len() < max && started.elapsed() < budget {
            let next = match consumer.requeued.pop_front() {
                Some(record) => Some(record),
                None => consumer.receiver.try_recv().ok(),
            };
            match next {
                Some(record) => batch.push(record),
                None => break,
            }
        }

        self.pending.fetch_sub(batch.len(), Ordering::AcqRel);
        batch
    }

    /// Everything currently queued
    pub fn drain_all(&self) -> Vec<OperationRecord> {
        self.drain(usize::MAX, Duration::MAX)
    }

    /// Put a batch back at the head of the queue, preserving its order
    pub fn requeue_front(&self, batch: Vec<OperationRecord>) {
        let mut consumer = self
            .consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.pending.fetch_add(batch.len(), Ordering::AcqRel);
        for record in batch.into_iter().rev() {
            consumer.requeued.push_front(record);
        }
    }

    /// Records waiting to be persisted
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OperationJournal {
    fn default() -> Self {
        Self::new()
    }
}
