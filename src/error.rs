use thiserror::Error;

#[derive(Debug, Error)]
pub enum IsweepError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Simulation error: {0}")]
    Simulation(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IsweepError>;
