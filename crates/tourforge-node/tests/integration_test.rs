use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tourforge_core::channel::Broker;
use tourforge_core::config::Config;
use tourforge_core::protocol::{
    BruteforceRange, FetchRequest, ResultMessage, TaskMessage, TaskPayload, RESULT_QUEUE, TASK_QUEUE,
};
use tourforge_core::DistanceMatrix;
use tourforge_node::http_broker::{HttpBroker, NodeProfile};
use tourforge_node::worker::{Step, Worker};
use uuid::Uuid;

#[derive(Default)]
struct MockHive {
    pending: Mutex<Option<String>>,
    published: Mutex<Vec<(String, String)>>,
    acked: Mutex<Vec<(String, u64)>>,
    registered: Mutex<Vec<Value>>,
}

fn five_city_task() -> TaskMessage {
    TaskMessage {
        task_id: Uuid::new_v4(),
        run_id: Uuid::new_v4(),
        round: 0,
        matrix: DistanceMatrix::from_rows(vec![
            vec![0, 3, 4, 2, 7],
            vec![3, 0, 4, 6, 3],
            vec![4, 4, 0, 5, 8],
            vec![2, 6, 5, 0, 6],
            vec![7, 3, 8, 6, 0],
        ])
        .unwrap(),
        payload: TaskPayload::Bruteforce(BruteforceRange {
            first_permutation_index: 0,
            last_permutation_index_inclusive: 23,
        }),
    }
}

async fn spawn_mock(hive: Arc<MockHive>) -> String {
    let app = Router::new()
        .route(
            "/nodes/register",
            post(|State(h): State<Arc<MockHive>>, Json(body): Json<Value>| async move {
                h.registered.lock().unwrap().push(body);
                Json(json!({ "status": "registered", "prefetch": 3 }))
            }),
        )
        .route(
            "/nodes",
            get(|| async { Json(json!({ "nodes": ["node-it"] })) }),
        )
        .route(
            "/queues/{queue}/fetch",
            post(
                |State(h): State<Arc<MockHive>>, Path(queue): Path<String>, Json(req): Json<FetchRequest>| async move {
                    assert_eq!(req.consumer_id, "node-it");
                    let mut deliveries = Vec::new();
                    if queue == TASK_QUEUE {
                        if let Some(payload) = h.pending.lock().unwrap().take() {
                            deliveries.push(json!({ "tag": 41, "redelivered": false, "payload": payload }));
                        }
                    }
                    Json(json!({ "deliveries": deliveries }))
                },
            ),
        )
        .route(
            "/queues/{queue}/publish",
            post(
                |State(h): State<Arc<MockHive>>, Path(queue): Path<String>, Json(body): Json<Value>| async move {
                    let payload = body["payload"].as_str().unwrap().to_string();
                    h.published.lock().unwrap().push((queue, payload));
                },
            ),
        )
        .route(
            "/queues/{queue}/ack",
            post(
                |State(h): State<Arc<MockHive>>, Path(queue): Path<String>, Json(body): Json<Value>| async move {
                    h.acked.lock().unwrap().push((queue, body["tag"].as_u64().unwrap()));
                },
            ),
        )
        .route(
            "/queues/{queue}/nack",
            post(|| async {
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "unknown delivery tag 9 on q" })),
                )
            }),
        )
        .with_state(hive);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}", port)
}

fn profile() -> NodeProfile {
    NodeProfile {
        cpu_model: "Mock CPU".into(),
        cores: 2,
    }
}

#[tokio::test]
async fn test_node_worker_flow() {
    println!("\n=== TEST: Node worker against mock hive ===");
    let hive = Arc::new(MockHive::default());
    let task = five_city_task();
    *hive.pending.lock().unwrap() = Some(serde_json::to_string(&task).unwrap());
    let url = spawn_mock(hive.clone()).await;

    let broker = Arc::new(HttpBroker::new(format!("{}/", url), profile()));
    let reg = broker.register("node-it").await.unwrap();
    assert_eq!(reg.prefetch, 3);
    assert_eq!(hive.registered.lock().unwrap()[0]["cpu_model"], "Mock CPU");

    let mut config = Config::default();
    config.channel.fetch_wait_ms = 10;
    let mut worker = Worker::new(broker.clone(), "node-it", &config);

    let Step::Solved(result) = worker.step().await.unwrap() else {
        panic!("expected the mock task to be solved");
    };
    assert_eq!(result.cost, 19);

    let published = hive.published.lock().unwrap().clone();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, RESULT_QUEUE);
    let sent: ResultMessage = serde_json::from_str(&published[0].1).unwrap();
    assert_eq!(sent.task_id, task.task_id);
    assert_eq!(sent.best_path, vec![0, 2, 1, 4, 3, 0]);

    assert_eq!(*hive.acked.lock().unwrap(), vec![(TASK_QUEUE.to_string(), 41)]);
    println!("✅ Task fetched, solved, published and acked over HTTP");

    assert!(matches!(worker.step().await.unwrap(), Step::Idle));
}

#[tokio::test]
async fn test_http_errors_surface_hive_message() {
    let url = spawn_mock(Arc::new(MockHive::default())).await;
    let broker = HttpBroker::new(url, profile());

    let err = broker.nack("q", 9, true).await.unwrap_err().to_string();
    assert!(err.contains("500"));
    assert!(err.contains("unknown delivery tag 9"));

    assert_eq!(broker.live_consumers().await.unwrap(), vec!["node-it"]);
}

#[tokio::test]
async fn test_unreachable_hive_is_channel_error() {
    let broker = HttpBroker::new("http://127.0.0.1:1", profile());
    assert!(broker.register("node-x").await.is_err());
}
