use super::crossover::cut_points;
use fastrand::Rng;

/// Reverses a random contiguous run `[start, end)` of the tour.
pub fn reverse_segment(tour: &mut [usize], rng: &mut Rng) {
    let (start, end) = cut_points(rng, tour.len());
    tour[start..end].reverse();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reversal_keeps_cities() {
        let mut rng = Rng::with_seed(11);
        let mut tour: Vec<usize> = (0..9).collect();
        for _ in 0..100 {
            reverse_segment(&mut tour, &mut rng);
            let mut sorted = tour.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, (0..9).collect::<Vec<_>>());
        }
    }
}
