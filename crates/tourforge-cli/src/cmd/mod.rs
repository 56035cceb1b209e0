pub mod plan;
pub mod solve;
