use crate::error::{TourError, TourResult};
use rayon::prelude::*;

/// Largest `n` whose factorial fits in a `u64`.
pub const MAX_FACTORIAL_ARG: usize = 20;

const fn build_factorials() -> [u64; MAX_FACTORIAL_ARG + 1] {
    let mut table = [1u64; MAX_FACTORIAL_ARG + 1];
    let mut i = 1;
    while i <= MAX_FACTORIAL_ARG {
        table[i] = table[i - 1] * i as u64;
        i += 1;
    }
    table
}

static FACTORIALS: [u64; MAX_FACTORIAL_ARG + 1] = build_factorials();

pub fn factorial(n: usize) -> TourResult<u64> {
    FACTORIALS.get(n).copied().ok_or(TourError::Overflow(n))
}

/// Returns the `rank`-th permutation (lexicographic, 0-based) of `sorted`.
///
/// `sorted` must be ascending and free of duplicates. Each position picks the
/// `digit`-th value not used yet, where
/// `digit = (rank mod (k-i)!) / (k-i-1)!`.
pub fn unrank(sorted: &[usize], rank: u64) -> TourResult<Vec<usize>> {
    let k = sorted.len();
    let total = factorial(k)?;
    if rank >= total {
        return Err(TourError::Validation(format!(
            "rank {} out of range for {} elements ({}! = {})",
            rank, k, k, total
        )));
    }

    let mut used = vec![false; k];
    let mut out = Vec::with_capacity(k);

    for i in 0..k {
        let block = FACTORIALS[k - i - 1];
        let digit = ((rank % FACTORIALS[k - i]) / block) as usize;

        let slot = used
            .iter()
            .enumerate()
            .filter(|&(_, &u)| !u)
            .nth(digit)
            .map(|(idx, _)| idx)
            .ok_or_else(|| TourError::Computation(format!("no free slot for digit {}", digit)))?;

        used[slot] = true;
        out.push(sorted[slot]);
    }

    Ok(out)
}

/// Lexicographic position of `values` among all orderings of its elements.
pub fn rank(values: &[usize]) -> TourResult<u64> {
    let k = values.len();
    factorial(k)?;

    let mut acc = 0u64;
    for i in 0..k {
        let smaller_remaining = values[i + 1..].iter().filter(|&&v| v < values[i]).count();
        acc += smaller_remaining as u64 * FACTORIALS[k - i - 1];
    }
    Ok(acc)
}

/// Advances `values` to its lexicographic successor in place.
///
/// Returns `false` (leaving `values` untouched) when it already is the last
/// permutation.
pub fn next_permutation<T: Ord>(values: &mut [T]) -> bool {
    if values.len() < 2 {
        return false;
    }

    let Some(i) = (0..values.len() - 1).rev().find(|&i| values[i] < values[i + 1]) else {
        return false;
    };

    // A j always exists because values[i + 1] > values[i].
    let mut j = values.len() - 1;
    while values[j] <= values[i] {
        j -= 1;
    }

    values.swap(i, j);
    values[i + 1..].reverse();
    true
}

/// Visits every permutation with rank in `[first, last_exclusive)` in order.
///
/// Only the first permutation is unranked; the rest are reached with
/// [`next_permutation`].
pub fn range_enumerate<F>(values: &[usize], first: u64, last_exclusive: u64, mut visit: F) -> TourResult<()>
where
    F: FnMut(&[usize]),
{
    let total = factorial(values.len())?;
    if last_exclusive > total {
        return Err(TourError::Validation(format!(
            "range end {} exceeds {} permutations",
            last_exclusive, total
        )));
    }
    if first >= last_exclusive {
        return Ok(());
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let mut current = unrank(&sorted, first)?;
    visit(&current);

    let mut position = first + 1;
    while position < last_exclusive {
        if !next_permutation(&mut current) {
            break;
        }
        visit(&current);
        position += 1;
    }

    Ok(())
}

/// Splits `[first, last_exclusive)` into `parts` contiguous slices of
/// `ceil(len / parts)` ranks each.
pub fn split_range(first: u64, last_exclusive: u64, parts: usize) -> Vec<(u64, u64)> {
    if first >= last_exclusive {
        return Vec::new();
    }
    let len = last_exclusive - first;
    let parts = (parts.max(1) as u64).min(len);
    let part_len = len.div_ceil(parts);

    (0..parts)
        .map(|p| {
            let start = first + p * part_len;
            (start, (start + part_len).min(last_exclusive))
        })
        .filter(|(s, e)| s < e)
        .collect()
}

/// Minimum of `score` over ranks `[first, last_exclusive)`, fanned out across
/// the rayon pool.
///
/// Every slice keeps its own local minimum; slices are joined in rank order
/// with a strict comparison, so ties resolve to the lowest rank exactly as a
/// sequential scan would.
pub fn parallel_enumerate<F>(
    values: &[usize],
    first: u64,
    last_exclusive: u64,
    score: F,
) -> TourResult<Option<(Vec<usize>, i64)>>
where
    F: Fn(&[usize]) -> i64 + Sync,
{
    let slices = split_range(first, last_exclusive, rayon::current_num_threads());

    let partials: Vec<TourResult<Option<(Vec<usize>, i64)>>> = slices
        .into_par_iter()
        .map(|(start, end)| {
            let mut best: Option<(Vec<usize>, i64)> = None;
            range_enumerate(values, start, end, |perm| {
                let cost = score(perm);
                if best.as_ref().map_or(true, |(_, c)| cost < *c) {
                    best = Some((perm.to_vec(), cost));
                }
            })?;
            Ok(best)
        })
        .collect();

    let mut overall: Option<(Vec<usize>, i64)> = None;
    for partial in partials {
        if let Some((perm, cost)) = partial? {
            if overall.as_ref().map_or(true, |(_, c)| cost < *c) {
                overall = Some((perm, cost));
            }
        }
    }
    Ok(overall)
}
