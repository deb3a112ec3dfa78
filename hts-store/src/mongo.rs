//! MongoDB-backed implementation of [`PersistenceGateway`].
//!
//! A thin wrapper over a driver handle plus config, constructed once at
//! startup; every method opens a collection handle and races the call
//! against the caller's cancellation token.

use crate::config::StoreConfig;
use crate::gateway::PersistenceGateway;
use crate::{Error, Result};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use hts_core::types::LOADTEST_METRICS_COLLECTION;
use mongodb::bson::{doc, Document};
use mongodb::{Client, Database, IndexModel};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct MongoGateway {
    db: Database,
}

impl MongoGateway {
    /// Connects to the document store described by `config`.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let client = Client::with_uri_str(&config.mongo_uri).await?;
        let db = client.database(&config.mongo_database);
        Ok(Self { db })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

/// Races `fut` against `cancel`, surfacing `Error::Cancelled` if the token
/// fires first. Every store operation accepts an external cancellation
/// token for this reason.
async fn with_cancel<F, T>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    tokio::select! {
        res = fut => res,
        _ = cancel.cancelled() => Err(Error::Cancelled),
    }
}

#[async_trait]
impl PersistenceGateway for MongoGateway {
    async fn insert_log(
        &self,
        collection: &str,
        doc: Document,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let coll = self.db.collection::<Document>(collection);
        with_cancel(cancel, async {
            coll.insert_one(doc).await?;
            Ok(())
        })
        .await
    }

    async fn insert_metrics(
        &self,
        collection: &str,
        doc: Document,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.insert_log(collection, doc, cancel).await
    }

    async fn find_active(
        &self,
        collection: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>> {
        let coll = self.db.collection::<Document>(collection);
        with_cancel(cancel, async {
            let mut cursor = coll.find(doc! { "status": "active" }).await?;
            let mut out = Vec::new();
            while let Some(d) = cursor.try_next().await? {
                out.push(d);
            }
            Ok(out)
        })
        .await
    }

    async fn count_by_filter(
        &self,
        collection: &str,
        filter: Document,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let coll = self.db.collection::<Document>(collection);
        with_cancel(cancel, async { Ok(coll.count_documents(filter).await?) }).await
    }

    async fn name_exists(&self, test_name: &str, cancel: &CancellationToken) -> Result<bool> {
        let count = self
            .count_by_filter(
                LOADTEST_METRICS_COLLECTION,
                doc! { "name": test_name },
                cancel,
            )
            .await?;
        Ok(count > 0)
    }

    async fn create_indexes(&self, collection: &str, cancel: &CancellationToken) -> Result<()> {
        let coll = self.db.collection::<Document>(collection);
        with_cancel(cancel, async {
            let models = vec![
                IndexModel::builder().keys(doc! { "timestamp": -1 }).build(),
                IndexModel::builder().keys(doc! { "success": 1 }).build(),
                IndexModel::builder().keys(doc! { "statusCode": 1 }).build(),
            ];
            coll.create_indexes(models).await?;
            Ok(())
        })
        .await
    }
}
