use thiserror::Error;

#[derive(Error, Debug)]
pub enum DroverError {
    // Configuration errors
    #[error("config error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("dataset of {total_points} points cannot be split across {nodes} nodes")]
    GroupTooLarge { total_points: usize, nodes: usize },

    // Transport errors
    #[error("transport error: {0}")]
    Transport(String),

    #[error("collective mismatch: expected {expected}, got {actual}")]
    CollectiveMismatch { expected: String, actual: String },

    #[error("run aborted by root: {0}")]
    AbortedByRoot(String),

    // Serialization errors
    #[error("encode error: {0}")]
    Encode(String),

    // IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<Box<bincode::ErrorKind>> for DroverError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        DroverError::Encode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DroverError>;

impl DroverError {
    /// True when the error was raised before the group entered any
    /// collective, so exiting cannot leave a peer blocked.
    pub fn is_pre_collective(&self) -> bool {
        matches!(
            self,
            DroverError::Config(_) | DroverError::Validation(_) | DroverError::GroupTooLarge { .. }
        )
    }
}
