//! Sample queue between the acquisition loop and a sink
//!
//! Unbounded crossbeam channel of whole [`Batch`]es. The producer never
//! blocks; the consumer blocks with a timeout so it can re-check the stop
//! flag between pops.

use crate::sample::Batch;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

/// Result of a consumer pop
#[derive(Debug)]
pub enum Pop {
    Batch(Batch),
    /// Nothing arrived within the timeout
    Timeout,
    /// Every producer is gone and the queue is empty
    Disconnected,
}

/// Create a connected producer/consumer pair
pub fn sample_queue() -> (BatchProducer, BatchConsumer) {
    let (tx, rx) = unbounded();
    (BatchProducer { tx }, BatchConsumer { rx })
}

/// Sending half, held by the acquisition loop
#[derive(Clone)]
pub struct BatchProducer {
    tx: Sender<Batch>,
}

impl BatchProducer {
    /// Enqueue one batch without blocking
    ///
    /// Returns false when the consumer has been dropped; the batch is lost.
    pub fn push(&self, batch: Batch) -> bool {
        self.tx.send(batch).is_ok()
    }

    /// Batches currently waiting
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

/// Receiving half, held by the sink
pub struct BatchConsumer {
    rx: Receiver<Batch>,
}

impl BatchConsumer {
    /// Block up to `timeout` for the next batch
    pub fn pop(&self, timeout: Duration) -> Pop {
        match self.rx.recv_timeout(timeout) {
            Ok(batch) => Pop::Batch(batch),
            Err(RecvTimeoutError::Timeout) => Pop::Timeout,
            Err(RecvTimeoutError::Disconnected) => Pop::Disconnected,
        }
    }

    /// Take the next batch if one is already queued
    pub fn try_pop(&self) -> Option<Batch> {
        match self.rx.try_recv() {
            Ok(batch) => Some(batch),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Append every queued batch to `into`, in arrival order, without blocking
    ///
    /// Returns the number of batches taken.
    pub fn drain_into(&self, into: &mut Batch) -> usize {
        let mut taken = 0;
        while let Some(batch) = self.try_pop() {
            into.extend(batch);
            taken += 1;
        }
        taken
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{MeasurementPoint, Vector3};
    use std::time::Instant;

    fn batch(sensor_id: i32, n: usize) -> Batch {
        (0..n)
            .map(|i| MeasurementPoint::new(sensor_id, Vector3::new(i as f64, 0.0, 0.0), Vector3::default()))
            .collect()
    }

    #[test]
    fn test_pop_preserves_push_order() {
        let (producer, consumer) = sample_queue();
        assert!(producer.push(batch(1, 2)));
        assert!(producer.push(batch(2, 1)));
        assert_eq!(producer.len(), 2);

        match consumer.pop(Duration::from_millis(10)) {
            Pop::Batch(b) => assert_eq!(b, batch(1, 2)),
            other => panic!("expected batch, got {:?}", other),
        }
        match consumer.pop(Duration::from_millis(10)) {
            Pop::Batch(b) => assert_eq!(b[0].sensor_id, 2),
            other => panic!("expected batch, got {:?}", other),
        }
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_pop_times_out_when_empty() {
        let (_producer, consumer) = sample_queue();
        let start = Instant::now();

        assert!(matches!(consumer.pop(Duration::from_millis(50)), Pop::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_pop_reports_disconnect_after_queue_drains() {
        let (producer, consumer) = sample_queue();
        producer.push(batch(1, 1));
        drop(producer);

        assert!(matches!(consumer.pop(Duration::from_millis(10)), Pop::Batch(_)));
        assert!(matches!(consumer.pop(Duration::from_millis(10)), Pop::Disconnected));
    }

    #[test]
    fn test_drain_into_concatenates_in_order() {
        let (producer, consumer) = sample_queue();
        producer.push(batch(1, 2));
        producer.push(batch(2, 3));

        let mut combined = Vec::new();
        assert_eq!(consumer.drain_into(&mut combined), 2);

        let ids: Vec<i32> = combined.iter().map(|p| p.sensor_id).collect();
        assert_eq!(ids, vec![1, 1, 2, 2, 2]);
        assert_eq!(consumer.try_pop(), None);
    }

    #[test]
    fn test_push_after_consumer_dropped() {
        let (producer, consumer) = sample_queue();
        drop(consumer);
        assert!(!producer.push(batch(1, 1)));
    }
}
