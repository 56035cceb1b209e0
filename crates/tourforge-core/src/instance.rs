use crate::error::{TourError, TourResult};
use std::fs;
use std::path::Path;
use tourforge_protocol::DistanceMatrix;

/// A problem instance read from a text file:
///
/// ```text
/// gr5
/// 5
///  0 3 4 2 7
///  3 0 4 6 3
///  ...
/// 19
/// ```
///
/// Line one is the name, line two the city count, then one matrix row per
/// line, and the last line is the known optimal cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub name: String,
    pub city_count: usize,
    pub matrix: DistanceMatrix,
    pub optimal_value: i64,
}

fn number<T: std::str::FromStr>(token: &str, line: usize) -> TourResult<T> {
    token
        .parse()
        .map_err(|_| TourError::Validation(format!("line {}: '{}' is not a number", line, token)))
}

impl Instance {
    pub fn parse(text: &str) -> TourResult<Self> {
        let lines: Vec<(usize, &str)> = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty())
            .collect();

        let [(_, name), (count_line, count), body @ .., (opt_line, optimum)] = lines.as_slice() else {
            return Err(TourError::Validation(
                "instance needs a name, a city count, matrix rows and an optimum".into(),
            ));
        };

        let city_count: usize = number(count, *count_line)?;
        let optimal_value: i64 = number(optimum, *opt_line)?;

        let rows = body
            .iter()
            .map(|(n, line)| line.split_whitespace().map(|t| number(t, *n)).collect())
            .collect::<TourResult<Vec<Vec<i64>>>>()?;

        if rows.len() != city_count {
            return Err(TourError::Validation(format!(
                "declared {} cities but found {} matrix rows",
                city_count,
                rows.len()
            )));
        }

        let matrix = DistanceMatrix::from_rows(rows).map_err(TourError::Validation)?;

        Ok(Self {
            name: name.to_string(),
            city_count,
            matrix,
            optimal_value,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> TourResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const GR4: &str = "gr4\n4\n 0 10 15 20\n10 0 35 25\n15 35 0 30\n20 25 30 0\n80\n";

    #[test]
    fn test_parse_valid_instance() {
        let inst = Instance::parse(GR4).unwrap();
        assert_eq!(inst.name, "gr4");
        assert_eq!(inst.city_count, 4);
        assert_eq!(inst.optimal_value, 80);
        assert_eq!(inst.matrix.weight(1, 3), 25);
        assert_eq!(inst.matrix.weight(2, 2), -1);
    }

    #[test]
    fn test_row_count_mismatch() {
        let text = "bad\n3\n0 1 2\n1 0 2\n5\n";
        assert!(matches!(Instance::parse(text), Err(TourError::Validation(_))));
    }

    #[test]
    fn test_weight_too_large_for_tour_sum() {
        let text = format!("big\n2\n0 {}\n1 0\n5\n", i64::MAX);
        assert!(matches!(Instance::parse(&text), Err(TourError::Validation(_))));
    }

    #[test]
    fn test_ragged_rows() {
        let text = "bad\n3\n0 1 2\n1 0\n2 2 0\n5\n";
        assert!(Instance::parse(text).is_err());
    }

    #[test]
    fn test_garbage_token() {
        let text = "bad\n2\n0 x\n1 0\n5\n";
        let err = Instance::parse(text).unwrap_err().to_string();
        assert!(err.contains("line 3"));
    }

    #[test]
    fn test_load_from_disk() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(GR4.as_bytes()).unwrap();
        let inst = Instance::load(f.path()).unwrap();
        assert_eq!(inst.matrix.size(), 4);

        assert!(matches!(Instance::load("/no/such/instance.txt"), Err(TourError::Io(_))));
    }
}
