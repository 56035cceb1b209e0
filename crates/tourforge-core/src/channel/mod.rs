//! Durable, at-least-once message channel between coordinator and workers.
//!
//! A [`Broker`] owns named queues. Fetching leases messages to a consumer
//! until they are acked; a nack with requeue, a lease timeout or a consumer
//! going away puts them back, and the next delivery is flagged
//! `redelivered`.

pub mod memory;

use crate::error::{TourError, TourResult};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use memory::MemoryBroker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Identifies this delivery (not the message) for ack/nack.
    pub tag: u64,
    pub redelivered: bool,
    pub payload: String,
}

pub trait Broker: Send + Sync + 'static {
    fn publish(&self, queue: &str, payload: String) -> impl Future<Output = TourResult<()>> + Send;

    /// Leases up to `max` ready messages, waiting at most `wait` for the
    /// first one.
    fn fetch(
        &self,
        queue: &str,
        consumer_id: &str,
        max: usize,
        wait: Duration,
    ) -> impl Future<Output = TourResult<Vec<Delivery>>> + Send;

    fn ack(&self, queue: &str, tag: u64) -> impl Future<Output = TourResult<()>> + Send;

    fn nack(&self, queue: &str, tag: u64, requeue: bool) -> impl Future<Output = TourResult<()>> + Send;

    /// Drops every ready message of `queue` and returns how many were removed.
    fn purge(&self, queue: &str) -> impl Future<Output = TourResult<u64>> + Send;

    fn register_consumer(&self, consumer_id: &str) -> impl Future<Output = TourResult<()>> + Send;

    fn live_consumers(&self) -> impl Future<Output = TourResult<Vec<String>>> + Send;
}

/// A delivery together with the queue it came from.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub queue: String,
    pub delivery: Delivery,
}

/// Reads from several queues in priority order and never holds more than
/// `prefetch` unacknowledged deliveries.
pub struct Consumer<B: Broker> {
    broker: Arc<B>,
    id: String,
    queues: Vec<String>,
    prefetch: usize,
    wait: Duration,
    unacked: HashMap<u64, String>,
    buffer: VecDeque<Inbound>,
}

impl<B: Broker> Consumer<B> {
    pub fn new(broker: Arc<B>, id: impl Into<String>, queues: Vec<String>, prefetch: usize, wait: Duration) -> Self {
        Self {
            broker,
            id: id.into(),
            queues,
            prefetch: prefetch.max(1),
            wait,
            unacked: HashMap::new(),
            buffer: VecDeque::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn broker(&self) -> &Arc<B> {
        &self.broker
    }

    pub fn unacked(&self) -> usize {
        self.unacked.len()
    }

    async fn fill(&mut self, room: usize, wait: Duration) -> TourResult<bool> {
        for queue in &self.queues {
            let got = self.broker.fetch(queue, &self.id, room, wait).await?;
            if got.is_empty() {
                continue;
            }
            for delivery in got {
                self.unacked.insert(delivery.tag, queue.clone());
                self.buffer.push_back(Inbound {
                    queue: queue.clone(),
                    delivery,
                });
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Next delivery, or `None` if nothing arrived within the wait window.
    pub async fn next(&mut self) -> TourResult<Option<Inbound>> {
        if let Some(inbound) = self.buffer.pop_front() {
            return Ok(Some(inbound));
        }

        let room = self.prefetch.saturating_sub(self.unacked.len());
        if room == 0 {
            return Err(TourError::Channel(format!(
                "consumer {} holds {} unacked deliveries (prefetch {})",
                self.id,
                self.unacked.len(),
                self.prefetch
            )));
        }

        if !self.fill(room, Duration::ZERO).await? && !self.queues.is_empty() {
            let slice = self.wait / self.queues.len() as u32;
            self.fill(room, slice).await?;
        }

        Ok(self.buffer.pop_front())
    }

    pub async fn ack(&mut self, inbound: &Inbound) -> TourResult<()> {
        self.unacked.remove(&inbound.delivery.tag);
        self.broker.ack(&inbound.queue, inbound.delivery.tag).await
    }

    pub async fn nack(&mut self, inbound: &Inbound, requeue: bool) -> TourResult<()> {
        self.unacked.remove(&inbound.delivery.tag);
        self.broker.nack(&inbound.queue, inbound.delivery.tag, requeue).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_direct_queue_has_priority() {
        let broker = Arc::new(MemoryBroker::default());
        broker.publish("shared", "s1".into()).await.unwrap();
        broker.publish("direct", "d1".into()).await.unwrap();

        let mut c = Consumer::new(
            broker.clone(),
            "w",
            vec!["direct".into(), "shared".into()],
            4,
            Duration::from_millis(10),
        );
        let first = c.next().await.unwrap().unwrap();
        assert_eq!(first.delivery.payload, "d1");
        c.ack(&first).await.unwrap();

        let second = c.next().await.unwrap().unwrap();
        assert_eq!(second.delivery.payload, "s1");
    }

    #[tokio::test]
    async fn test_prefetch_window_is_enforced() {
        let broker = Arc::new(MemoryBroker::default());
        for i in 0..5 {
            broker.publish("q", format!("m{}", i)).await.unwrap();
        }
        let mut c = Consumer::new(broker.clone(), "w", vec!["q".into()], 2, Duration::from_millis(10));

        let a = c.next().await.unwrap().unwrap();
        let b = c.next().await.unwrap().unwrap();
        assert_eq!(c.unacked(), 2);
        assert_eq!(broker.ready_len("q"), 3);
        assert!(c.next().await.is_err());

        c.ack(&a).await.unwrap();
        c.ack(&b).await.unwrap();
        let next = c.next().await.unwrap().unwrap();
        assert_eq!(next.delivery.payload, "m2");
    }

    #[tokio::test]
    async fn test_requeued_delivery_frees_window() {
        let broker = Arc::new(MemoryBroker::default());
        broker.publish("q", "m".into()).await.unwrap();
        let mut c = Consumer::new(broker.clone(), "w", vec!["q".into()], 1, Duration::from_millis(10));

        let first = c.next().await.unwrap().unwrap();
        assert_eq!(c.unacked(), 1);
        c.nack(&first, true).await.unwrap();
        assert_eq!(c.unacked(), 0);

        let again = c.next().await.unwrap().unwrap();
        assert!(again.delivery.redelivered);
        assert_eq!(again.delivery.payload, "m");
    }

    #[tokio::test]
    async fn test_idle_returns_none() {
        let broker = Arc::new(MemoryBroker::default());
        let mut c = Consumer::new(broker, "w", vec!["q".into()], 1, Duration::from_millis(5));
        assert!(c.next().await.unwrap().is_none());
    }
}
