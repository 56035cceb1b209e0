use thiserror::Error;

#[derive(Error, Debug)]
pub enum TourError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON Parsing Error: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("Data Validation Error: {0}")]
    Validation(String),

    /// The permutation space of this many elements does not fit in 64 bits.
    #[error("Permutation space of {0} elements exceeds 64-bit ranks (max 20)")]
    Overflow(usize),

    #[error("A run is already in progress")]
    ConcurrentRun,

    #[error("Computation Error: {0}")]
    Computation(String),

    #[error("Channel Error: {0}")]
    Channel(String),
}

pub type TourResult<T> = Result<T, TourError>;
