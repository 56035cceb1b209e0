use serde::{Deserialize, Serialize};

/// Value written on the diagonal. It is never read by any cost function.
pub const DIAGONAL_SENTINEL: i64 = -1;

/// Square, row-major table of non-negative edge weights.
///
/// Weights are capped at `i64::MAX / size`, so any closed tour (exactly
/// `size` edges) sums without overflow.
///
/// On the wire it travels as a list of rows (`Vec<Vec<i64>>`), and every
/// deserialisation goes through [`DistanceMatrix::from_rows`] so a malformed
/// payload never produces a matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<i64>>", into = "Vec<Vec<i64>>")]
pub struct DistanceMatrix {
    size: usize,
    weights: Vec<i64>,
}

impl DistanceMatrix {
    pub fn from_rows(rows: Vec<Vec<i64>>) -> Result<Self, String> {
        let size = rows.len();
        if size < 2 {
            return Err(format!("matrix needs at least 2 cities, got {}", size));
        }

        let max_weight = i64::MAX / size as i64;
        let mut weights = Vec::with_capacity(size * size);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != size {
                return Err(format!(
                    "matrix is not square: row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    size
                ));
            }
            for (j, w) in row.into_iter().enumerate() {
                if i == j {
                    weights.push(DIAGONAL_SENTINEL);
                } else if w < 0 {
                    return Err(format!("negative weight {} at ({}, {})", w, i, j));
                } else if w > max_weight {
                    return Err(format!(
                        "weight {} at ({}, {}) exceeds {}, the largest a {}-city tour can sum",
                        w, i, j, max_weight, size
                    ));
                } else {
                    weights.push(w);
                }
            }
        }

        Ok(Self { size, weights })
    }

    /// Number of cities.
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline(always)]
    pub fn weight(&self, from: usize, to: usize) -> i64 {
        self.weights[from * self.size + to]
    }

    /// Closed-loop cost of `tour`: consecutive edges plus the edge back to the
    /// first city.
    pub fn tour_cost(&self, tour: &[usize]) -> i64 {
        match (tour.first(), tour.last()) {
            (Some(&first), Some(&last)) => {
                let open: i64 = tour.windows(2).map(|w| self.weight(w[0], w[1])).sum();
                open + self.weight(last, first)
            }
            _ => 0,
        }
    }

    /// Cost of a reported path that already repeats its start city at the end.
    pub fn path_cost(&self, path: &[usize]) -> i64 {
        path.windows(2).map(|w| self.weight(w[0], w[1])).sum()
    }

    /// True when `tour` visits every city exactly once.
    pub fn is_full_tour(&self, tour: &[usize]) -> bool {
        if tour.len() != self.size {
            return false;
        }
        let mut seen = vec![false; self.size];
        for &city in tour {
            if city >= self.size || seen[city] {
                return false;
            }
            seen[city] = true;
        }
        true
    }

    pub fn rows(&self) -> Vec<Vec<i64>> {
        self.weights
            .chunks(self.size)
            .map(|row| row.to_vec())
            .collect()
    }
}

impl TryFrom<Vec<Vec<i64>>> for DistanceMatrix {
    type Error = String;

    fn try_from(rows: Vec<Vec<i64>>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

impl From<DistanceMatrix> for Vec<Vec<i64>> {
    fn from(matrix: DistanceMatrix) -> Self {
        matrix.rows()
    }
}
