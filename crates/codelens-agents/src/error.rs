use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Embedding service error: {0}")]
    Embedding(String),

    #[error("Similarity index error: {0}")]
    Similarity(String),

    #[error("Query analysis failed: {0}")]
    Analysis(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
