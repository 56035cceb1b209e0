pub mod config;
pub mod matrix;
pub mod protocol;

pub use matrix::DistanceMatrix;
pub use protocol::{Algorithm, Individual};
