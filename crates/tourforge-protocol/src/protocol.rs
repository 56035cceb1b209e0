use crate::matrix::DistanceMatrix;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Queue carrying bruteforce chunks; any worker may take them.
pub const TASK_QUEUE: &str = "TaskMessage";
/// Queue the coordinator consumes.
pub const RESULT_QUEUE: &str = "ResultMessage";

/// Cost reported when a worker could not compute a result.
pub const ERROR_COST: i64 = -1;

/// Direct queue of a single worker, used for genetic continuation chains.
pub fn task_queue_for(worker_id: &str) -> String {
    format!("{}.{}", TASK_QUEUE, worker_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Algorithm {
    Bruteforce,
    Genetic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Individual {
    pub tour: Vec<usize>,
    pub cost: i64,
}

impl Individual {
    pub fn evaluated(tour: Vec<usize>, matrix: &DistanceMatrix) -> Self {
        let cost = matrix.tour_cost(&tour);
        Self { tour, cost }
    }
}

/// Rank range over permutations of the non-start cities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BruteforceRange {
    pub first_permutation_index: u64,
    pub last_permutation_index_inclusive: u64,
}

impl BruteforceRange {
    pub fn len(&self) -> u64 {
        self.last_permutation_index_inclusive - self.first_permutation_index + 1
    }

    pub fn is_empty(&self) -> bool {
        self.last_permutation_index_inclusive < self.first_permutation_index
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneticSeed {
    /// Seed tour; empty means "start from a random tour".
    #[serde(default)]
    pub individual: Vec<usize>,
    pub population_size_multiplier: usize,
    #[serde(default)]
    pub migrants: Vec<Individual>,
    #[serde(default)]
    pub max_generations: Option<usize>,
}

/// Algorithm-specific part of a task. Exactly one is present per task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPayload {
    Bruteforce(BruteforceRange),
    Genetic(GeneticSeed),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task_id: Uuid,
    pub run_id: Uuid,
    /// Position in the continuation chain of `task_id`. Bruteforce tasks use 0.
    #[serde(default)]
    pub round: u64,
    pub matrix: DistanceMatrix,
    pub payload: TaskPayload,
}

impl TaskMessage {
    pub fn algorithm(&self) -> Algorithm {
        match self.payload {
            TaskPayload::Bruteforce(_) => Algorithm::Bruteforce,
            TaskPayload::Genetic(_) => Algorithm::Genetic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    pub task_id: Uuid,
    pub run_id: Uuid,
    #[serde(default)]
    pub round: u64,
    pub worker_id: String,
    pub best_path: Vec<usize>,
    pub cost: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_improve_runs: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrants: Option<Vec<Individual>>,
}

impl ResultMessage {
    pub fn error(task: &TaskMessage, worker_id: &str) -> Self {
        Self {
            task_id: task.task_id,
            run_id: task.run_id,
            round: task.round,
            worker_id: worker_id.to_string(),
            best_path: Vec::new(),
            cost: ERROR_COST,
            no_improve_runs: None,
            migrants: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.cost == ERROR_COST
    }
}

// --- Broker endpoints ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PublishRequest {
    pub payload: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FetchRequest {
    pub consumer_id: String,
    pub max: usize,
    #[serde(default)]
    pub wait_ms: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WireDelivery {
    pub tag: u64,
    pub redelivered: bool,
    pub payload: String,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct FetchResponse {
    pub deliveries: Vec<WireDelivery>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AckRequest {
    pub tag: u64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct NackRequest {
    pub tag: u64,
    pub requeue: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PurgeResponse {
    pub purged: u64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RegisterNodeRequest {
    pub node_id: String,
    pub cpu_model: String,
    pub cores: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RegisterNodeResponse {
    pub status: String,
    pub prefetch: usize,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct NodeListResponse {
    pub nodes: Vec<String>,
}

// --- Control surface ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InstanceEntry {
    pub name: String,
    pub sha256: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StartRunRequest {
    pub instance: String,
    pub algorithm: Algorithm,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StartRunResponse {
    pub run_id: Uuid,
    pub algorithm: Algorithm,
    pub tasks_issued: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub algorithm: Algorithm,
    pub best_cost: i64,
    pub best_path: Vec<usize>,
    pub elapsed_ms: u64,
    pub tasks_issued: u64,
    pub results_received: u64,
    pub started_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn matrix() -> DistanceMatrix {
        DistanceMatrix::from_rows(vec![vec![0, 1, 2], vec![1, 0, 3], vec![2, 3, 0]]).unwrap()
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!(Algorithm::from_str("Genetic").unwrap(), Algorithm::Genetic);
        assert_eq!(Algorithm::from_str("bruteforce").unwrap(), Algorithm::Bruteforce);
        assert_eq!(Algorithm::Genetic.to_string(), "genetic");
        assert!(Algorithm::from_str("annealing").is_err());
    }

    #[test]
    fn test_task_wire_shape() {
        let task = TaskMessage {
            task_id: Uuid::new_v4(),
            run_id: Uuid::new_v4(),
            round: 0,
            matrix: matrix(),
            payload: TaskPayload::Bruteforce(BruteforceRange {
                first_permutation_index: 0,
                last_permutation_index_inclusive: 1,
            }),
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(
            json["payload"]["bruteforce"]["last_permutation_index_inclusive"],
            1
        );
        assert_eq!(task.algorithm(), Algorithm::Bruteforce);

        let back: TaskMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn test_task_with_bad_matrix_fails_to_decode() {
        let raw = serde_json::json!({
            "task_id": Uuid::new_v4(),
            "run_id": Uuid::new_v4(),
            "matrix": [[0, 1], [1]],
            "payload": { "genetic": { "population_size_multiplier": 5 } }
        });
        assert!(serde_json::from_value::<TaskMessage>(raw).is_err());
    }

    #[test]
    fn test_error_result_uses_sentinel() {
        let task = TaskMessage {
            task_id: Uuid::new_v4(),
            run_id: Uuid::new_v4(),
            round: 3,
            matrix: matrix(),
            payload: TaskPayload::Genetic(GeneticSeed {
                individual: vec![],
                population_size_multiplier: 1,
                migrants: vec![],
                max_generations: None,
            }),
        };
        let res = ResultMessage::error(&task, "node-a");
        assert!(res.is_error());
        assert_eq!(res.round, 3);
        assert!(res.best_path.is_empty());
    }

    #[test]
    fn test_direct_queue_name() {
        assert_eq!(task_queue_for("node-1"), "TaskMessage.node-1");
    }
}
