use fastrand::Rng;

/// Two distinct cut points over a tour of `len` genes, returned as a
/// half-open `[start, end)` with `start < end`.
pub fn cut_points(rng: &mut Rng, len: usize) -> (usize, usize) {
    if len == 0 {
        return (0, 0);
    }
    loop {
        let a = rng.usize(0..=len);
        let b = rng.usize(0..=len);
        if a != b {
            return (a.min(b), a.max(b));
        }
    }
}

fn ox_child(keep: &[usize], donor: &[usize], start: usize, end: usize) -> Vec<usize> {
    let n = keep.len();
    let mut placed = vec![false; n];
    for &gene in &keep[start..end] {
        placed[gene] = true;
    }

    let mut fill = donor.iter().copied().filter(|&g| !placed[g]);
    let mut child = Vec::with_capacity(n);
    for (i, &gene) in keep.iter().enumerate() {
        if (start..end).contains(&i) {
            child.push(gene);
        } else if let Some(g) = fill.next() {
            child.push(g);
        }
    }

    debug_assert_eq!(child.len(), n, "parents must be permutations of the same cities");
    child
}

/// Order crossover (OX). Each child keeps its own parent's `[start, end)`
/// segment in place; the remaining slots are filled left to right with the
/// other parent's genes in their original order, skipping duplicates.
pub fn order_crossover(p1: &[usize], p2: &[usize], start: usize, end: usize) -> (Vec<usize>, Vec<usize>) {
    (ox_child(p1, p2, start, end), ox_child(p2, p1, start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ox_known_children() {
        let p1 = [0, 1, 2, 3, 4, 5];
        let p2 = [5, 3, 1, 0, 4, 2];
        let (c1, c2) = order_crossover(&p1, &p2, 2, 4);
        // c1 keeps [2, 3], rest from p2 skipping 2 and 3: 5 1 0 4
        assert_eq!(c1, vec![5, 1, 2, 3, 0, 4]);
        // c2 keeps [1, 0], rest from p1 skipping 1 and 0: 2 3 4 5
        assert_eq!(c2, vec![2, 3, 1, 0, 4, 5]);
    }

    #[test]
    fn test_cut_points_are_ordered_and_distinct() {
        let mut rng = Rng::with_seed(7);
        for _ in 0..500 {
            let (s, e) = cut_points(&mut rng, 5);
            assert!(s < e);
            assert!(e <= 5);
        }
    }
}
