use crate::error::{TourError, TourResult};
use crate::permutation::{factorial, parallel_enumerate, range_enumerate};
use tourforge_protocol::protocol::BruteforceRange;
use tourforge_protocol::DistanceMatrix;

/// Index of the fixed start city.
pub const START_CITY: usize = 0;

/// A closed tour: `path` starts and ends at [`START_CITY`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredTour {
    pub path: Vec<usize>,
    pub cost: i64,
}

/// Cities other than the start, in ascending order.
pub fn non_start_cities(matrix: &DistanceMatrix) -> Vec<usize> {
    (1..matrix.size()).collect()
}

/// Size of the search space, `(N-1)!`.
pub fn search_space(matrix: &DistanceMatrix) -> TourResult<u64> {
    factorial(matrix.size() - 1)
}

#[inline]
fn order_cost(matrix: &DistanceMatrix, order: &[usize]) -> i64 {
    let Some((&first, &last)) = order.first().zip(order.last()) else {
        return 0;
    };
    let inner: i64 = order.windows(2).map(|w| matrix.weight(w[0], w[1])).sum();
    matrix.weight(START_CITY, first) + inner + matrix.weight(last, START_CITY)
}

fn close_path(order: &[usize]) -> Vec<usize> {
    let mut path = Vec::with_capacity(order.len() + 2);
    path.push(START_CITY);
    path.extend_from_slice(order);
    path.push(START_CITY);
    path
}

/// Scores one ordering of the non-start cities.
pub fn score(matrix: &DistanceMatrix, order: &[usize]) -> ScoredTour {
    ScoredTour {
        path: close_path(order),
        cost: order_cost(matrix, order),
    }
}

fn check_bounds(matrix: &DistanceMatrix, first: u64, last_exclusive: u64) -> TourResult<()> {
    let space = search_space(matrix)?;
    if first >= last_exclusive || last_exclusive > space {
        return Err(TourError::Validation(format!(
            "range [{}, {}) is empty or outside the {} permutations of {} cities",
            first,
            last_exclusive,
            space,
            matrix.size()
        )));
    }
    Ok(())
}

/// Minimum-cost tour among ranks `[first, last_exclusive)`. The first tour
/// found wins ties.
pub fn evaluate_range(matrix: &DistanceMatrix, first: u64, last_exclusive: u64) -> TourResult<ScoredTour> {
    check_bounds(matrix, first, last_exclusive)?;

    let values = non_start_cities(matrix);
    let mut best_order: Vec<usize> = Vec::new();
    let mut best_cost = i64::MAX;

    range_enumerate(&values, first, last_exclusive, |order| {
        let cost = order_cost(matrix, order);
        if cost < best_cost {
            best_cost = cost;
            best_order.clear();
            best_order.extend_from_slice(order);
        }
    })?;

    Ok(ScoredTour {
        path: close_path(&best_order),
        cost: best_cost,
    })
}

/// Same result as [`evaluate_range`], computed across the rayon pool.
pub fn evaluate_range_parallel(
    matrix: &DistanceMatrix,
    first: u64,
    last_exclusive: u64,
) -> TourResult<ScoredTour> {
    check_bounds(matrix, first, last_exclusive)?;

    let values = non_start_cities(matrix);
    let (order, cost) = parallel_enumerate(&values, first, last_exclusive, |order| {
        order_cost(matrix, order)
    })?
    .ok_or_else(|| TourError::Computation("empty permutation range".into()))?;

    Ok(ScoredTour {
        path: close_path(&order),
        cost,
    })
}

/// Evaluates a task range (inclusive upper bound as it travels on the wire).
pub fn evaluate_task_range(
    matrix: &DistanceMatrix,
    range: &BruteforceRange,
    parallel: bool,
) -> TourResult<ScoredTour> {
    if range.is_empty() {
        return Err(TourError::Validation(format!(
            "inverted range {}..={}",
            range.first_permutation_index, range.last_permutation_index_inclusive
        )));
    }
    let last_exclusive = range
        .last_permutation_index_inclusive
        .checked_add(1)
        .ok_or_else(|| TourError::Validation("range end overflows".into()))?;

    if parallel {
        evaluate_range_parallel(matrix, range.first_permutation_index, last_exclusive)
    } else {
        evaluate_range(matrix, range.first_permutation_index, last_exclusive)
    }
}

/// Exhaustive search over the whole space.
pub fn solve_exhaustive(matrix: &DistanceMatrix) -> TourResult<ScoredTour> {
    let space = search_space(matrix)?;
    evaluate_range_parallel(matrix, 0, space)
}
