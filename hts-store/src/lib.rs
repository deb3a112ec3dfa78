//! Persistence gateway over the document store.
//!
//! A thin, uniform contract the scheduler and the load-test engine
//! share for inserting logs/summaries and reading back active definitions.
//! Neither consumer locks in-process; the document store serializes writes
//! on its own side.

mod config;
mod error;
mod gateway;
mod mongo;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use gateway::PersistenceGateway;
pub use mongo::MongoGateway;
