use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("store error: {0}")]
    Store(#[from] mongodb::error::Error),

    #[error("bson serialization error: {0}")]
    Bson(#[from] mongodb::bson::ser::Error),

    #[error("bson deserialization error: {0}")]
    BsonDe(#[from] mongodb::bson::de::Error),

    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
