use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("a test named {0:?} already exists")]
    DuplicateName(String),

    #[error("store error: {0}")]
    Store(#[from] hts_store::Error),

    #[error("no requests completed")]
    NoRequestsCompleted,
}

pub type Result<T> = std::result::Result<T, Error>;
