// Re-export types from the protocol crate so they are accessible via tourforge_core::*
pub use tourforge_protocol::config;
pub use tourforge_protocol::matrix;
pub use tourforge_protocol::protocol;
pub use tourforge_protocol::{Algorithm, DistanceMatrix, Individual};

pub mod agent;
pub mod bruteforce;
pub mod channel;
pub mod coordinator;
pub mod error;
pub mod genetic;
pub mod instance;
pub mod permutation;
pub mod util;
