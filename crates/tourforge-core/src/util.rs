use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub fn calculate_file_hash<P: AsRef<Path>>(path: P) -> Result<String, std::io::Error> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0; 4096];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Relative gap to a known optimum, in percent.
pub fn gap_percent(cost: i64, optimum: i64) -> Option<f64> {
    if optimum <= 0 || cost < 0 {
        return None;
    }
    Some((cost - optimum) as f64 * 100.0 / optimum as f64)
}
