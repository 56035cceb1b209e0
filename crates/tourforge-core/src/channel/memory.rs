use super::{Broker, Delivery};
use crate::error::{TourError, TourResult};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug)]
struct Message {
    payload: String,
    deliveries: u32,
}

#[derive(Debug)]
struct Lease {
    message: Message,
    consumer: String,
    until: Instant,
}

#[derive(Debug, Default)]
struct Queue {
    ready: VecDeque<Message>,
    leased: HashMap<u64, Lease>,
}

impl Queue {
    fn reclaim_expired(&mut self, now: Instant) {
        let expired: Vec<u64> = self
            .leased
            .iter()
            .filter(|(_, l)| l.until <= now)
            .map(|(&tag, _)| tag)
            .collect();
        for tag in expired {
            if let Some(lease) = self.leased.remove(&tag) {
                self.ready.push_front(lease.message);
            }
        }
    }
}

#[derive(Debug, Default)]
struct State {
    queues: HashMap<String, Queue>,
    consumers: HashMap<String, Instant>,
    next_tag: u64,
}

/// In-process broker with the same lease semantics as the durable one.
pub struct MemoryBroker {
    state: Mutex<State>,
    notify: Notify,
    lease: Duration,
    consumer_ttl: Duration,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(Duration::from_secs(300), Duration::from_secs(60))
    }
}

impl MemoryBroker {
    pub fn new(lease: Duration, consumer_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            lease,
            consumer_ttl,
        }
    }

    fn lock(&self) -> TourResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| TourError::Channel("memory broker state poisoned".into()))
    }

    pub fn ready_len(&self, queue: &str) -> usize {
        self.lock()
            .map(|s| s.queues.get(queue).map_or(0, |q| q.ready.len()))
            .unwrap_or(0)
    }

    pub fn unacked_len(&self, queue: &str) -> usize {
        self.lock()
            .map(|s| s.queues.get(queue).map_or(0, |q| q.leased.len()))
            .unwrap_or(0)
    }

    /// Drops a consumer as if its process died: its leases become ready
    /// again and it stops counting as live.
    pub fn release_consumer(&self, consumer_id: &str) -> TourResult<usize> {
        let released = {
            let mut state = self.lock()?;
            state.consumers.remove(consumer_id);
            let mut released = 0;
            for queue in state.queues.values_mut() {
                let tags: Vec<u64> = queue
                    .leased
                    .iter()
                    .filter(|(_, l)| l.consumer == consumer_id)
                    .map(|(&t, _)| t)
                    .collect();
                for tag in tags {
                    if let Some(lease) = queue.leased.remove(&tag) {
                        queue.ready.push_front(lease.message);
                        released += 1;
                    }
                }
            }
            released
        };
        self.notify.notify_waiters();
        Ok(released)
    }

    fn take(&self, queue: &str, consumer_id: &str, max: usize) -> TourResult<Vec<Delivery>> {
        let now = Instant::now();
        let mut state = self.lock()?;
        state.consumers.insert(consumer_id.to_string(), now);

        let State { queues, next_tag, .. } = &mut *state;
        let q = queues.entry(queue.to_string()).or_default();
        q.reclaim_expired(now);

        let mut out = Vec::new();
        while out.len() < max {
            let Some(mut message) = q.ready.pop_front() else {
                break;
            };
            *next_tag += 1;
            let tag = *next_tag;
            let redelivered = message.deliveries > 0;
            message.deliveries += 1;

            out.push(Delivery {
                tag,
                redelivered,
                payload: message.payload.clone(),
            });
            q.leased.insert(
                tag,
                Lease {
                    message,
                    consumer: consumer_id.to_string(),
                    until: now + self.lease,
                },
            );
        }
        Ok(out)
    }
}

impl Broker for MemoryBroker {
    async fn publish(&self, queue: &str, payload: String) -> TourResult<()> {
        {
            let mut state = self.lock()?;
            state
                .queues
                .entry(queue.to_string())
                .or_default()
                .ready
                .push_back(Message { payload, deliveries: 0 });
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn fetch(&self, queue: &str, consumer_id: &str, max: usize, wait: Duration) -> TourResult<Vec<Delivery>> {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let got = self.take(queue, consumer_id, max)?;
            if !got.is_empty() || max == 0 {
                return Ok(got);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(got);
            }
            let _ = tokio::time::timeout(deadline - now, notified).await;
        }
    }

    async fn ack(&self, queue: &str, tag: u64) -> TourResult<()> {
        let mut state = self.lock()?;
        state
            .queues
            .get_mut(queue)
            .and_then(|q| q.leased.remove(&tag))
            .map(|_| ())
            .ok_or_else(|| TourError::Channel(format!("unknown delivery tag {} on {}", tag, queue)))
    }

    async fn nack(&self, queue: &str, tag: u64, requeue: bool) -> TourResult<()> {
        {
            let mut state = self.lock()?;
            let q = state
                .queues
                .get_mut(queue)
                .ok_or_else(|| TourError::Channel(format!("unknown queue {}", queue)))?;
            let lease = q
                .leased
                .remove(&tag)
                .ok_or_else(|| TourError::Channel(format!("unknown delivery tag {} on {}", tag, queue)))?;
            if requeue {
                q.ready.push_front(lease.message);
            }
        }
        if requeue {
            self.notify.notify_waiters();
        }
        Ok(())
    }

    async fn purge(&self, queue: &str) -> TourResult<u64> {
        let mut state = self.lock()?;
        Ok(state
            .queues
            .get_mut(queue)
            .map_or(0, |q| q.ready.drain(..).count() as u64))
    }

    async fn register_consumer(&self, consumer_id: &str) -> TourResult<()> {
        self.lock()?
            .consumers
            .insert(consumer_id.to_string(), Instant::now());
        Ok(())
    }

    async fn live_consumers(&self) -> TourResult<Vec<String>> {
        let now = Instant::now();
        let state = self.lock()?;
        let mut live: Vec<String> = state
            .consumers
            .iter()
            .filter(|(_, &seen)| now.duration_since(seen) <= self.consumer_ttl)
            .map(|(id, _)| id.clone())
            .collect();
        live.sort();
        Ok(live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_nack_requeue_marks_redelivered() {
        let b = MemoryBroker::default();
        b.publish("q", "hello".into()).await.unwrap();

        let first = b.fetch("q", "c1", 1, Duration::ZERO).await.unwrap();
        assert!(!first[0].redelivered);
        b.nack("q", first[0].tag, true).await.unwrap();

        let again = b.fetch("q", "c1", 1, Duration::ZERO).await.unwrap();
        assert_eq!(again[0].payload, "hello");
        assert!(again[0].redelivered);
        assert_ne!(again[0].tag, first[0].tag);
    }

    #[tokio::test]
    async fn test_nack_without_requeue_drops() {
        let b = MemoryBroker::default();
        b.publish("q", "poison".into()).await.unwrap();
        let d = b.fetch("q", "c1", 1, Duration::ZERO).await.unwrap();
        b.nack("q", d[0].tag, false).await.unwrap();
        assert_eq!(b.ready_len("q"), 0);
        assert_eq!(b.unacked_len("q"), 0);
    }

    #[tokio::test]
    async fn test_crashed_consumer_leases_return() {
        let b = MemoryBroker::default();
        b.publish("q", "task".into()).await.unwrap();
        let _ = b.fetch("q", "doomed", 1, Duration::ZERO).await.unwrap();
        assert_eq!(b.ready_len("q"), 0);

        assert_eq!(b.release_consumer("doomed").unwrap(), 1);
        let d = b.fetch("q", "survivor", 1, Duration::ZERO).await.unwrap();
        assert!(d[0].redelivered);
        assert_eq!(b.live_consumers().await.unwrap(), vec!["survivor".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_expiry_redelivers() {
        let b = MemoryBroker::new(Duration::from_secs(5), Duration::from_secs(60));
        b.publish("q", "slow".into()).await.unwrap();
        let d = b.fetch("q", "c1", 1, Duration::ZERO).await.unwrap();
        assert_eq!(d.len(), 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        let again = b.fetch("q", "c2", 1, Duration::ZERO).await.unwrap();
        assert!(again[0].redelivered);
        assert!(b.ack("q", d[0].tag).await.is_err());
    }

    #[tokio::test]
    async fn test_waiting_fetch_wakes_on_publish() {
        let b = Arc::new(MemoryBroker::default());
        let reader = {
            let b = b.clone();
            tokio::spawn(async move { b.fetch("q", "c1", 1, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        b.publish("q", "late".into()).await.unwrap();

        let got = reader.await.unwrap().unwrap();
        assert_eq!(got[0].payload, "late");
    }

    #[tokio::test]
    async fn test_purge_counts_ready() {
        let b = MemoryBroker::default();
        for _ in 0..3 {
            b.publish("q", "x".into()).await.unwrap();
        }
        assert_eq!(b.purge("q").await.unwrap(), 3);
        assert_eq!(b.purge("missing").await.unwrap(), 0);
    }
}
