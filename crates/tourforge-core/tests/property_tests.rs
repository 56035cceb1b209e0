use itertools::Itertools;
use proptest::prelude::*;
use tourforge_core::bruteforce::{evaluate_range, evaluate_range_parallel, search_space};
use tourforge_core::coordinator::partition_bruteforce;
use tourforge_core::genetic::crossover::{cut_points, order_crossover};
use tourforge_core::permutation::{factorial, next_permutation, rank, unrank};
use tourforge_core::DistanceMatrix;

// --- STRATEGIES ---

prop_compose! {
    fn arb_rank_case()(n in 0usize..=10)(
        n in Just(n),
        r in 0..factorial(n).unwrap()
    ) -> (usize, u64) {
        (n, r)
    }
}

prop_compose! {
    fn arb_matrix(max_cities: usize)(n in 2usize..=max_cities)(
        weights in proptest::collection::vec(0i64..100, n * n),
        n in Just(n)
    ) -> DistanceMatrix {
        let rows = weights.chunks(n).map(|r| r.to_vec()).collect();
        DistanceMatrix::from_rows(rows).unwrap()
    }
}

prop_compose! {
    fn arb_parents()(n in 2usize..30)(
        p1 in Just((0..n).collect::<Vec<usize>>()).prop_shuffle(),
        p2 in Just((0..n).collect::<Vec<usize>>()).prop_shuffle(),
        seed in any::<u64>()
    ) -> (Vec<usize>, Vec<usize>, u64) {
        (p1, p2, seed)
    }
}

proptest! {
    #[test]
    fn prop_rank_inverts_unrank((n, r) in arb_rank_case()) {
        let values: Vec<usize> = (0..n).collect();
        let perm = unrank(&values, r).unwrap();
        prop_assert_eq!(rank(&perm).unwrap(), r);
    }

    #[test]
    fn prop_partition_covers_space_once(m in arb_matrix(9), chunk in 1u64..5_000) {
        let space = search_space(&m).unwrap();
        let partition = partition_bruteforce(&m, chunk).unwrap();
        let expected_tasks = partition.task_count();
        let ranges: Vec<_> = partition.collect();

        prop_assert_eq!(ranges.len() as u64, expected_tasks);
        prop_assert_eq!(ranges[0].first_permutation_index, 0);
        prop_assert_eq!(ranges.last().unwrap().last_permutation_index_inclusive, space - 1);
        for w in ranges.windows(2) {
            prop_assert_eq!(w[0].last_permutation_index_inclusive + 1, w[1].first_permutation_index);
        }
        prop_assert!(ranges.iter().all(|r| r.len() <= chunk));
    }

    #[test]
    fn prop_range_evaluation_is_idempotent(m in arb_matrix(7), a in any::<u64>(), b in any::<u64>()) {
        let space = search_space(&m).unwrap();
        let (x, y) = (a % space, b % space);
        let (first, last) = (x.min(y), x.max(y) + 1);

        let once = evaluate_range(&m, first, last).unwrap();
        let twice = evaluate_range(&m, first, last).unwrap();
        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(&once, &evaluate_range_parallel(&m, first, last).unwrap());

        prop_assert_eq!(once.path.len(), m.size() + 1);
        prop_assert_eq!(once.path[0], once.path[m.size()]);
        prop_assert_eq!(m.path_cost(&once.path), once.cost);
    }

    #[test]
    fn prop_order_crossover_conserves_cities((p1, p2, seed) in arb_parents()) {
        let mut rng = fastrand::Rng::with_seed(seed);
        let (start, end) = cut_points(&mut rng, p1.len());
        let (c1, c2) = order_crossover(&p1, &p2, start, end);

        for child in [&c1, &c2] {
            let sorted: Vec<usize> = child.iter().copied().sorted().collect();
            prop_assert_eq!(sorted, (0..p1.len()).collect::<Vec<_>>());
        }
        prop_assert_eq!(&c1[start..end], &p1[start..end]);
        prop_assert_eq!(&c2[start..end], &p2[start..end]);
    }
}

#[test]
fn test_next_permutation_walks_lexicographic_order() {
    for n in 0..=7usize {
        let values: Vec<usize> = (0..n).collect();
        let mut current = unrank(&values, 0).unwrap();
        let mut visited = vec![current.clone()];

        let total = factorial(n).unwrap();
        for _ in 1..total {
            assert!(next_permutation(&mut current));
            visited.push(current.clone());
        }
        assert!(!next_permutation(&mut current), "n = {}: last permutation must stop", n);

        let expected: Vec<Vec<usize>> = values.iter().copied().permutations(n).collect();
        assert_eq!(visited, expected, "n = {}", n);
        assert!(visited.windows(2).all(|w| w[0] < w[1]));
    }
}
