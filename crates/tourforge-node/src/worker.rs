use std::sync::{Arc, Mutex};
use std::time::Duration;
use tourforge_core::agent::WorkerAgent;
use tourforge_core::channel::{Broker, Consumer};
use tourforge_core::config::Config;
use tourforge_core::error::{TourError, TourResult};
use tourforge_core::protocol::{task_queue_for, ResultMessage, TaskMessage, RESULT_QUEUE, TASK_QUEUE};
use tracing::{debug, error, info, warn};

/// What one turn of the worker loop did.
#[derive(Debug)]
pub enum Step {
    /// Nothing arrived within the fetch window.
    Idle,
    /// A task was solved, its result published and the task acked.
    Solved(ResultMessage),
    /// The payload was not a task and was dropped.
    Rejected,
}

/// Consume, solve, publish, ack. The direct queue is read before the shared
/// one so genetic continuations are never starved by bruteforce chunks.
pub struct Worker<B: Broker> {
    consumer: Consumer<B>,
    agent: Arc<Mutex<WorkerAgent>>,
}

impl<B: Broker> Worker<B> {
    pub fn new(broker: Arc<B>, node_id: &str, config: &Config) -> Self {
        let queues = vec![task_queue_for(node_id), TASK_QUEUE.to_string()];
        let consumer = Consumer::new(
            broker,
            node_id,
            queues,
            config.channel.prefetch,
            config.channel.fetch_wait(),
        );
        let agent = WorkerAgent::new(node_id, config.bruteforce.clone(), config.genetic.clone());
        Self {
            consumer,
            agent: Arc::new(Mutex::new(agent)),
        }
    }

    pub fn id(&self) -> &str {
        self.consumer.id()
    }

    pub async fn step(&mut self) -> TourResult<Step> {
        let Some(inbound) = self.consumer.next().await? else {
            return Ok(Step::Idle);
        };

        let task: TaskMessage = match serde_json::from_str(&inbound.delivery.payload) {
            Ok(t) => t,
            Err(e) => {
                warn!("⚠️ Dropping malformed task from {}: {}", inbound.queue, e);
                self.consumer.nack(&inbound, false).await?;
                return Ok(Step::Rejected);
            }
        };

        if inbound.delivery.redelivered {
            debug!("Task {} round {} is a redelivery", task.task_id, task.round);
        }
        info!(
            "📋 Task {} round {} ({}, {} cities)",
            task.task_id,
            task.round,
            task.algorithm(),
            task.matrix.size()
        );

        let agent = self.agent.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut agent = agent
                .lock()
                .map_err(|_| TourError::Computation("worker agent poisoned".into()))?;
            Ok::<_, TourError>(agent.handle(&task))
        })
        .await
        .map_err(|e| TourError::Computation(e.to_string()))??;

        // Unacked until the result is out: a crash here means redelivery.
        let payload = serde_json::to_string(&result)?;
        self.consumer.broker().publish(RESULT_QUEUE, payload).await?;
        self.consumer.ack(&inbound).await?;

        info!("📤 Result for {}: cost {}", result.task_id, result.cost);
        Ok(Step::Solved(result))
    }

    /// Runs until the process is stopped. Channel failures back off and
    /// retry.
    pub async fn run(mut self) {
        info!("🤖 Worker {} consuming tasks", self.id());
        loop {
            match self.step().await {
                Ok(Step::Idle) => debug!("zzz... no tasks"),
                Ok(_) => {}
                Err(e) => {
                    error!("❌ Worker loop error: {}. Retrying in 5s...", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }
}
