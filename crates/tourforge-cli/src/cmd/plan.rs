use crate::reports;
use clap::Args;
use std::path::PathBuf;
use tourforge_core::config::DEFAULT_CHUNK_SIZE;
use tourforge_core::coordinator::partition_bruteforce;
use tourforge_core::error::TourResult;
use tourforge_core::instance::Instance;
use tourforge_core::protocol::BruteforceRange;

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// Instance file
    pub instance: PathBuf,

    /// Permutations per task
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u64,

    /// Ranges to list; the rest are summarised
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Debug)]
pub struct Plan {
    pub instance: String,
    pub space: u64,
    pub task_count: u64,
    pub shown: Vec<BruteforceRange>,
}

pub fn execute(args: &PlanArgs) -> TourResult<Plan> {
    let instance = Instance::load(&args.instance)?;
    let partition = partition_bruteforce(&instance.matrix, args.chunk_size)?;
    Ok(Plan {
        instance: instance.name,
        space: partition.space(),
        task_count: partition.task_count(),
        shown: partition.take(args.limit).collect(),
    })
}

pub fn run(args: PlanArgs) -> TourResult<()> {
    let plan = execute(&args)?;
    reports::print_plan(&plan);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_plan_six_cities() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        let mut text = String::from("ring6\n6\n");
        for i in 0..6 {
            let row: Vec<String> = (0..6).map(|j| ((i + j) % 6).to_string()).collect();
            text.push_str(&row.join(" "));
            text.push('\n');
        }
        text.push_str("6\n");
        f.write_all(text.as_bytes()).unwrap();

        let plan = execute(&PlanArgs {
            instance: f.path().to_path_buf(),
            chunk_size: 50,
            limit: 2,
        })
        .unwrap();
        assert_eq!(plan.space, 120);
        assert_eq!(plan.task_count, 3);
        assert_eq!(plan.shown.len(), 2);
        assert_eq!(plan.shown[1].first_permutation_index, 50);
        assert_eq!(plan.shown[1].last_permutation_index_inclusive, 99);
    }
}
