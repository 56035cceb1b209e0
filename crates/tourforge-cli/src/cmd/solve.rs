use crate::reports;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tourforge_core::bruteforce::{evaluate_range, search_space, solve_exhaustive};
use tourforge_core::config::GeneticParams;
use tourforge_core::error::TourResult;
use tourforge_core::genetic::{EngineParams, GeneticEngine};
use tourforge_core::instance::Instance;
use tourforge_core::util::gap_percent;
use tourforge_core::Algorithm;
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct SolveArgs {
    /// Instance file
    pub instance: PathBuf,

    #[arg(short, long, default_value_t = Algorithm::Bruteforce)]
    pub algorithm: Algorithm,

    /// Enumerate on the calling thread only
    #[arg(long, default_value_t = false)]
    pub sequential: bool,

    /// Print the report as JSON instead of a table
    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[command(flatten)]
    pub genetic: GeneticParams,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SolveReport {
    pub instance: String,
    pub algorithm: Algorithm,
    pub cities: usize,
    pub cost: i64,
    pub path: Vec<usize>,
    pub optimum: i64,
    pub gap_percent: Option<f64>,
    pub elapsed_ms: u64,
    /// Generations evolved (genetic only)
    pub generations: Option<usize>,
}

pub fn execute(args: &SolveArgs) -> TourResult<SolveReport> {
    let instance = Instance::load(&args.instance)?;
    info!(
        "📂 Loaded {} ({} cities, optimum {})",
        instance.name, instance.city_count, instance.optimal_value
    );

    let started = Instant::now();
    let (cost, path, generations) = match args.algorithm {
        Algorithm::Bruteforce => {
            let space = search_space(&instance.matrix)?;
            info!("🧮 Enumerating {} permutations", space);
            let best = if args.sequential {
                evaluate_range(&instance.matrix, 0, space)?
            } else {
                solve_exhaustive(&instance.matrix)?
            };
            (best.cost, best.path, None)
        }
        Algorithm::Genetic => {
            let mut engine = GeneticEngine::new(instance.matrix.clone(), EngineParams::from(&args.genetic));
            engine.populate(&[])?;
            info!("🧬 Evolving {} individuals until convergence", engine.target_size());
            let report = engine.run_to_convergence()?;
            (report.cost, report.best_path, Some(report.generations))
        }
    };

    Ok(SolveReport {
        gap_percent: gap_percent(cost, instance.optimal_value),
        instance: instance.name,
        algorithm: args.algorithm,
        cities: instance.city_count,
        cost,
        path,
        optimum: instance.optimal_value,
        elapsed_ms: started.elapsed().as_millis() as u64,
        generations,
    })
}

pub fn run(args: SolveArgs) -> TourResult<()> {
    let report = execute(&args)?;
    info!("🏆 Best cost {} in {} ms", report.cost, report.elapsed_ms);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        reports::print_solution(&report);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const GR5: &str = "gr5\n5\n0 3 4 2 7\n3 0 4 6 3\n4 4 0 5 8\n2 6 5 0 6\n7 3 8 6 0\n19\n";

    fn args(path: PathBuf, algorithm: Algorithm) -> SolveArgs {
        SolveArgs {
            instance: path,
            algorithm,
            sequential: false,
            json: false,
            genetic: GeneticParams {
                seed: Some(11),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_bruteforce_finds_optimum() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(GR5.as_bytes()).unwrap();

        let report = execute(&args(f.path().to_path_buf(), Algorithm::Bruteforce)).unwrap();
        assert_eq!(report.cost, 19);
        assert_eq!(report.path, vec![0, 2, 1, 4, 3, 0]);
        assert_eq!(report.gap_percent, Some(0.0));
        assert_eq!(report.generations, None);

        let mut seq = args(f.path().to_path_buf(), Algorithm::Bruteforce);
        seq.sequential = true;
        assert_eq!(execute(&seq).unwrap().path, report.path);
    }

    #[test]
    fn test_genetic_reports_consistent_tour() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(GR5.as_bytes()).unwrap();

        let report = execute(&args(f.path().to_path_buf(), Algorithm::Genetic)).unwrap();
        assert_eq!(report.path.len(), 6);
        assert_eq!(report.path[0], 0);
        assert_eq!(report.path[5], 0);
        assert!(report.cost >= 19);
        assert!(report.generations.unwrap() >= 1);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(execute(&args(PathBuf::from("/no/such/instance"), Algorithm::Bruteforce)).is_err());
    }
}
