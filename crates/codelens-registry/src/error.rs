use codelens_core::CodeLensError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Entity source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Snapshot build failed: {0}")]
    Build(String),

    #[error(transparent)]
    Core(#[from] CodeLensError),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
