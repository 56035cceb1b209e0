use fastrand::Rng;
use std::collections::HashSet;
use tourforge_protocol::{DistanceMatrix, Individual};

/// Rotates a tour so it begins at city 0. Cost is unchanged.
pub fn rotate_to_start(tour: &[usize]) -> Vec<usize> {
    let mut out = tour.to_vec();
    if let Some(pos) = out.iter().position(|&c| c == 0) {
        out.rotate_left(pos);
    }
    out
}

/// Size-bounded set of individuals. Between selections it may temporarily
/// hold more than `target` members (crossover children).
#[derive(Debug, Clone)]
pub struct Population {
    members: Vec<Individual>,
    target: usize,
}

impl Population {
    /// `seed` plus `target - 1` Fisher-Yates shuffles of it.
    pub fn seeded(seed: Vec<usize>, matrix: &DistanceMatrix, target: usize, rng: &mut Rng) -> Self {
        let target = target.max(1);
        let mut members = Vec::with_capacity(target * 2);

        for _ in 1..target {
            let mut tour = seed.clone();
            rng.shuffle(&mut tour);
            members.push(Individual::evaluated(tour, matrix));
        }
        members.insert(0, Individual::evaluated(seed, matrix));

        Self { members, target }
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[Individual] {
        &self.members
    }

    pub fn members_mut(&mut self) -> &mut [Individual] {
        &mut self.members
    }

    pub fn push(&mut self, individual: Individual) {
        self.members.push(individual);
    }

    /// Elitist truncation: sort ascending by cost and drop the overflow.
    pub fn select(&mut self) {
        self.members.sort_by_key(|i| i.cost);
        self.members.truncate(self.target);
    }

    pub fn fittest(&self) -> Option<&Individual> {
        self.members.iter().min_by_key(|i| i.cost)
    }

    /// The `count` cheapest distinct tours.
    pub fn elites(&self, count: usize) -> Vec<Individual> {
        let mut sorted: Vec<&Individual> = self.members.iter().collect();
        sorted.sort_by_key(|i| i.cost);

        let mut seen = HashSet::new();
        sorted
            .into_iter()
            .filter(|i| seen.insert(i.tour.clone()))
            .take(count)
            .cloned()
            .collect()
    }
}
