//! Uniform persistence contract shared by the scheduler and the load-test
//! engine. Kept in terms of raw BSON documents so the trait stays
//! object-safe — callers convert their typed records with
//! `mongodb::bson::to_document` / `from_document`.

use crate::Result;
use async_trait::async_trait;
use mongodb::bson::Document;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Appends a document to `collection`. No retry on failure.
    async fn insert_log(
        &self,
        collection: &str,
        doc: Document,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Commits a final load-test summary. Same contract as `insert_log`,
    /// named separately because it is the one write whose failure aborts
    /// the run's result path.
    async fn insert_metrics(
        &self,
        collection: &str,
        doc: Document,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Returns every document in `collection` with `status == "active"`.
    async fn find_active(
        &self,
        collection: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>>;

    async fn count_by_filter(
        &self,
        collection: &str,
        filter: Document,
        cancel: &CancellationToken,
    ) -> Result<u64>;

    /// True if any document in the shared metrics collection has
    /// `name == test_name`.
    async fn name_exists(&self, test_name: &str, cancel: &CancellationToken) -> Result<bool>;

    /// Idempotently creates the `{timestamp desc}`, `{success}`,
    /// `{statusCode}` indexes on `collection`.
    async fn create_indexes(&self, collection: &str, cancel: &CancellationToken) -> Result<()>;
}
