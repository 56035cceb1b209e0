use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tourforge_core::channel::{Broker, Delivery};
use tourforge_core::error::{TourError, TourResult};
use tourforge_core::protocol::{
    AckRequest, FetchRequest, FetchResponse, NackRequest, NodeListResponse, PublishRequest, PurgeResponse,
    RegisterNodeRequest, RegisterNodeResponse,
};

/// What a node reports about itself when registering.
#[derive(Debug, Clone)]
pub struct NodeProfile {
    pub cpu_model: String,
    pub cores: usize,
}

/// Broker client speaking to the hive's queue endpoints.
pub struct HttpBroker {
    client: Client,
    base: String,
    profile: NodeProfile,
}

fn net_err(e: reqwest::Error) -> TourError {
    TourError::Channel(e.to_string())
}

async fn check(res: Response) -> TourResult<Response> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    let msg = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["error"].as_str().map(str::to_string))
        .unwrap_or(body);
    Err(TourError::Channel(format!("hive answered {}: {}", status, msg)))
}

impl HttpBroker {
    pub fn new(base: impl Into<String>, profile: NodeProfile) -> Self {
        Self {
            client: Client::new(),
            base: base.into().trim_end_matches('/').to_string(),
            profile,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> TourResult<Response> {
        let res = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(body)
            .send()
            .await
            .map_err(net_err)?;
        check(res).await
    }

    async fn post_json<T: Serialize, R: DeserializeOwned>(&self, path: &str, body: &T) -> TourResult<R> {
        self.post(path, body).await?.json().await.map_err(net_err)
    }

    /// Announces this node and returns the hive's answer, which carries the
    /// recommended prefetch.
    pub async fn register(&self, node_id: &str) -> TourResult<RegisterNodeResponse> {
        let req = RegisterNodeRequest {
            node_id: node_id.to_string(),
            cpu_model: self.profile.cpu_model.clone(),
            cores: self.profile.cores,
        };
        self.post_json("/nodes/register", &req).await
    }
}

impl Broker for HttpBroker {
    async fn publish(&self, queue: &str, payload: String) -> TourResult<()> {
        self.post(&format!("/queues/{}/publish", queue), &PublishRequest { payload })
            .await?;
        Ok(())
    }

    async fn fetch(&self, queue: &str, consumer_id: &str, max: usize, wait: Duration) -> TourResult<Vec<Delivery>> {
        let req = FetchRequest {
            consumer_id: consumer_id.to_string(),
            max,
            wait_ms: wait.as_millis() as u64,
        };
        let res: FetchResponse = self.post_json(&format!("/queues/{}/fetch", queue), &req).await?;
        Ok(res
            .deliveries
            .into_iter()
            .map(|d| Delivery {
                tag: d.tag,
                redelivered: d.redelivered,
                payload: d.payload,
            })
            .collect())
    }

    async fn ack(&self, queue: &str, tag: u64) -> TourResult<()> {
        self.post(&format!("/queues/{}/ack", queue), &AckRequest { tag }).await?;
        Ok(())
    }

    async fn nack(&self, queue: &str, tag: u64, requeue: bool) -> TourResult<()> {
        self.post(&format!("/queues/{}/nack", queue), &NackRequest { tag, requeue })
            .await?;
        Ok(())
    }

    async fn purge(&self, queue: &str) -> TourResult<u64> {
        let res: PurgeResponse = self
            .post_json(&format!("/queues/{}/purge", queue), &serde_json::json!({}))
            .await?;
        Ok(res.purged)
    }

    async fn register_consumer(&self, consumer_id: &str) -> TourResult<()> {
        self.register(consumer_id).await?;
        Ok(())
    }

    async fn live_consumers(&self) -> TourResult<Vec<String>> {
        let res = self
            .client
            .get(format!("{}/nodes", self.base))
            .send()
            .await
            .map_err(net_err)?;
        let list: NodeListResponse = check(res).await?.json().await.map_err(net_err)?;
        Ok(list.nodes)
    }
}
