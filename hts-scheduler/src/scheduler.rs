//! Health-Check Scheduler.
//!
//! Keeps an in-memory mirror of active definitions, drives probes off the
//! tick source and reconciles the mirror with the store every 30 seconds.

use hts_core::types::{
    healthcheck_collection, HealthCheckDefinition, SchedulerEntry, HEALTHCHECK_DEFINITIONS_COLLECTION,
};
use hts_store::PersistenceGateway;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::probe;

const RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

pub struct Scheduler {
    entries: RwLock<HashMap<String, SchedulerEntry>>,
    gateway: Arc<dyn PersistenceGateway>,
    client: reqwest::Client,
    reconcile_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    tick_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, client: reqwest::Client) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            gateway,
            client,
            reconcile_handle: tokio::sync::Mutex::new(None),
            tick_handle: tokio::sync::Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    #[cfg(test)]
    pub async fn countdown_of(&self, id: &str) -> Option<u32> {
        self.entries.read().await.get(id).map(|e| e.countdown)
    }

    /// One synchronous load of the active definition set, performed before
    /// the scheduler subscribes to ticks.
    pub async fn load_initial(&self, cancel: &CancellationToken) {
        let defs = match self.load_active_definitions(cancel).await {
            Ok(defs) => defs,
            Err(err) => {
                tracing::error!(error = %err, "failed to load active health-check definitions at startup");
                Vec::new()
            }
        };
        for def in &defs {
            self.ensure_log_indexes(&def.name, cancel).await;
        }

        let mut entries = self.entries.write().await;
        for def in defs {
            entries.insert(def.id.clone(), SchedulerEntry::new(def));
        }
    }

    /// Idempotently creates the `{timestamp desc}`, `{success}`,
    /// `{statusCode}` indexes on a check's own `healthcheck_<name>` log
    /// collection the first time the scheduler starts tracking it.
    /// Failures are logged and swallowed — an unindexed log collection is
    /// degraded, not broken.
    async fn ensure_log_indexes(&self, name: &str, cancel: &CancellationToken) {
        let collection = healthcheck_collection(name);
        if let Err(err) = self.gateway.create_indexes(&collection, cancel).await {
            tracing::warn!(check = %name, error = %err, "failed to ensure indexes on probe-log collection");
        }
    }

    async fn load_active_definitions(
        &self,
        cancel: &CancellationToken,
    ) -> hts_store::Result<Vec<HealthCheckDefinition>> {
        let docs = self
            .gateway
            .find_active(HEALTHCHECK_DEFINITIONS_COLLECTION, cancel)
            .await?;
        Ok(docs
            .into_iter()
            .filter_map(|doc| match mongodb::bson::from_document(doc) {
                Ok(def) => Some(def),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping malformed health-check definition");
                    None
                }
            })
            .collect())
    }

    /// Spawns the tick-consumer and the 30s reconciler. Returns immediately;
    /// both run until `cancel` fires.
    pub async fn start(self: &Arc<Self>, mut ticks: mpsc::Receiver<()>, cancel: CancellationToken) {
        let scheduler = Arc::clone(self);
        let tick_cancel = cancel.clone();
        let tick_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tick_cancel.cancelled() => break,
                    tick = ticks.recv() => {
                        match tick {
                            Some(()) => scheduler.on_tick(&tick_cancel).await,
                            None => break,
                        }
                    }
                }
            }
        });
        *self.tick_handle.lock().await = Some(tick_handle);

        let scheduler = Arc::clone(self);
        let reconcile_cancel = cancel;
        let reconcile_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(RECONCILE_INTERVAL);
            interval.tick().await; // first tick fires immediately; skip it
            loop {
                tokio::select! {
                    _ = reconcile_cancel.cancelled() => break,
                    _ = interval.tick() => scheduler.reconcile(&reconcile_cancel).await,
                }
            }
        });
        *self.reconcile_handle.lock().await = Some(reconcile_handle);
    }

    pub async fn stop(&self) {
        if let Some(h) = self.tick_handle.lock().await.take() {
            h.abort();
        }
        if let Some(h) = self.reconcile_handle.lock().await.take() {
            h.abort();
        }
    }

    /// One tick: decrement every countdown under a single write lock (O(n)
    /// arithmetic only), spawning due probes off-lock.
    pub async fn on_tick(&self, cancel: &CancellationToken) {
        let due: Vec<HealthCheckDefinition> = {
            let mut entries = self.entries.write().await;
            let mut due = Vec::new();
            for entry in entries.values_mut() {
                if entry.tick() {
                    due.push(entry.definition.clone());
                    entry.reset();
                }
            }
            due
        };

        for definition in due {
            let client = self.client.clone();
            let gateway = Arc::clone(&self.gateway);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                probe::execute_probe(&definition, &client, gateway.as_ref(), &cancel).await;
            });
        }
    }

    /// Reloads active definitions and reconciles the in-memory mirror
    /// against them. Idempotent: a second call with
    /// no external change is a no-op. Store errors are logged and
    /// swallowed — the mirror is left untouched and the next reconcile
    /// retries.
    pub async fn reconcile(&self, cancel: &CancellationToken) {
        let loaded = match self.load_active_definitions(cancel).await {
            Ok(loaded) => loaded,
            Err(err) => {
                tracing::error!(error = %err, "reconcile: failed to load active definitions, retrying next cycle");
                return;
            }
        };

        let active_ids: std::collections::HashSet<String> =
            loaded.iter().map(|d| d.id.clone()).collect();

        let mut newly_added = Vec::new();
        let mut entries = self.entries.write().await;
        entries.retain(|id, _| active_ids.contains(id));

        for def in loaded {
            match entries.get_mut(&def.id) {
                None => {
                    newly_added.push(def.name.clone());
                    entries.insert(def.id.clone(), SchedulerEntry::new(def));
                }
                Some(existing) => {
                    if existing.definition.reschedules_on_change(&def) {
                        *existing = SchedulerEntry::new(def);
                    } else {
                        existing.definition = def;
                    }
                }
            }
        }
        drop(entries);

        for name in newly_added {
            self.ensure_log_indexes(&name, cancel).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hts_core::types::STATUS_ACTIVE;
    use tokio::sync::Mutex as AsyncMutex;

    struct FakeGateway {
        active: AsyncMutex<Vec<HealthCheckDefinition>>,
        fail_next_find: AsyncMutex<bool>,
        indexed_collections: AsyncMutex<Vec<String>>,
    }

    impl FakeGateway {
        fn new(active: Vec<HealthCheckDefinition>) -> Self {
            Self {
                active: AsyncMutex::new(active),
                fail_next_find: AsyncMutex::new(false),
                indexed_collections: AsyncMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl PersistenceGateway for FakeGateway {
        async fn insert_log(
            &self,
            _c: &str,
            _d: mongodb::bson::Document,
            _cancel: &CancellationToken,
        ) -> hts_store::Result<()> {
            Ok(())
        }
        async fn insert_metrics(
            &self,
            _c: &str,
            _d: mongodb::bson::Document,
            _cancel: &CancellationToken,
        ) -> hts_store::Result<()> {
            Ok(())
        }
        async fn find_active(
            &self,
            _c: &str,
            _cancel: &CancellationToken,
        ) -> hts_store::Result<Vec<mongodb::bson::Document>> {
            if std::mem::take(&mut *self.fail_next_find.lock().await) {
                return Err(hts_store::Error::Cancelled);
            }
            Ok(self
                .active
                .lock()
                .await
                .iter()
                .map(|d| mongodb::bson::to_document(d).unwrap())
                .collect())
        }
        async fn count_by_filter(
            &self,
            _c: &str,
            _f: mongodb::bson::Document,
            _cancel: &CancellationToken,
        ) -> hts_store::Result<u64> {
            Ok(self.active.lock().await.len() as u64)
        }
        async fn name_exists(&self, _n: &str, _cancel: &CancellationToken) -> hts_store::Result<bool> {
            Ok(false)
        }
        async fn create_indexes(&self, c: &str, _cancel: &CancellationToken) -> hts_store::Result<()> {
            self.indexed_collections.lock().await.push(c.to_string());
            Ok(())
        }
    }

    fn def(id: &str, interval: u32) -> HealthCheckDefinition {
        HealthCheckDefinition {
            id: id.into(),
            name: format!("check-{id}"),
            url: "http://example.com".into(),
            method: "GET".into(),
            interval_seconds: interval,
            expected_status_code: 200,
            headers: HashMap::new(),
            expected_body: None,
            status: STATUS_ACTIVE.into(),
        }
    }

    fn client() -> reqwest::Client {
        hts_core::httpclient::build_probe_client().unwrap()
    }

    #[tokio::test]
    async fn load_initial_populates_mirror() {
        let gateway = Arc::new(FakeGateway::new(vec![def("a", 5), def("b", 10)]));
        let scheduler = Scheduler::new(gateway, client());
        let cancel = CancellationToken::new();

        scheduler.load_initial(&cancel).await;

        assert_eq!(scheduler.entry_count().await, 2);
        assert_eq!(scheduler.countdown_of("a").await, Some(5));
        assert_eq!(scheduler.countdown_of("b").await, Some(10));
    }

    #[tokio::test]
    async fn load_initial_indexes_each_checks_own_log_collection() {
        let gateway = Arc::new(FakeGateway::new(vec![def("a", 5), def("b", 10)]));
        let scheduler = Scheduler::new(gateway.clone(), client());
        let cancel = CancellationToken::new();

        scheduler.load_initial(&cancel).await;

        let indexed = gateway.indexed_collections.lock().await;
        assert!(indexed.contains(&"healthcheck_check-a".to_string()));
        assert!(indexed.contains(&"healthcheck_check-b".to_string()));
    }

    #[tokio::test]
    async fn reconcile_indexes_log_collection_only_for_newly_added_checks() {
        let gateway = Arc::new(FakeGateway::new(vec![def("a", 5)]));
        let scheduler = Scheduler::new(gateway.clone(), client());
        let cancel = CancellationToken::new();
        scheduler.load_initial(&cancel).await;
        gateway.indexed_collections.lock().await.clear();

        gateway.active.lock().await.push(def("c", 20));
        scheduler.reconcile(&cancel).await;

        let indexed = gateway.indexed_collections.lock().await;
        assert_eq!(indexed.as_slice(), &["healthcheck_check-c".to_string()]);
    }

    #[tokio::test]
    async fn tick_keeps_countdown_within_bounds() {
        let gateway = Arc::new(FakeGateway::new(vec![def("a", 2)]));
        let scheduler = Scheduler::new(gateway, client());
        let cancel = CancellationToken::new();
        scheduler.load_initial(&cancel).await;

        scheduler.on_tick(&cancel).await;
        let after_first = scheduler.countdown_of("a").await.unwrap();
        assert!(after_first <= 2);

        scheduler.on_tick(&cancel).await; // fires and resets to interval
        let after_second = scheduler.countdown_of("a").await.unwrap();
        assert_eq!(after_second, 2);
    }

    #[tokio::test]
    async fn reconcile_removes_deactivated_entries() {
        let gateway = Arc::new(FakeGateway::new(vec![def("a", 5), def("b", 5)]));
        let scheduler = Scheduler::new(gateway.clone(), client());
        let cancel = CancellationToken::new();
        scheduler.load_initial(&cancel).await;
        assert_eq!(scheduler.entry_count().await, 2);

        gateway.active.lock().await.retain(|d| d.id != "b");
        scheduler.reconcile(&cancel).await;

        assert_eq!(scheduler.entry_count().await, 1);
        assert_eq!(scheduler.countdown_of("b").await, None);
    }

    #[tokio::test]
    async fn reconcile_adds_new_entries_with_full_countdown() {
        let gateway = Arc::new(FakeGateway::new(vec![def("a", 5)]));
        let scheduler = Scheduler::new(gateway.clone(), client());
        let cancel = CancellationToken::new();
        scheduler.load_initial(&cancel).await;

        gateway.active.lock().await.push(def("c", 20));
        scheduler.reconcile(&cancel).await;

        assert_eq!(scheduler.countdown_of("c").await, Some(20));
    }

    #[tokio::test]
    async fn reconcile_resets_countdown_when_interval_changes() {
        let gateway = Arc::new(FakeGateway::new(vec![def("a", 5)]));
        let scheduler = Scheduler::new(gateway.clone(), client());
        let cancel = CancellationToken::new();
        scheduler.load_initial(&cancel).await;
        scheduler.on_tick(&cancel).await; // countdown now 4

        gateway.active.lock().await[0].interval_seconds = 60;
        scheduler.reconcile(&cancel).await;

        assert_eq!(scheduler.countdown_of("a").await, Some(60));
    }

    #[tokio::test]
    async fn reconcile_preserves_countdown_for_unrelated_field_changes() {
        let gateway = Arc::new(FakeGateway::new(vec![def("a", 5)]));
        let scheduler = Scheduler::new(gateway.clone(), client());
        let cancel = CancellationToken::new();
        scheduler.load_initial(&cancel).await;
        scheduler.on_tick(&cancel).await; // countdown now 4

        gateway.active.lock().await[0].name = "renamed".into();
        scheduler.reconcile(&cancel).await;

        assert_eq!(scheduler.countdown_of("a").await, Some(4));
    }

    #[tokio::test]
    async fn reconcile_is_idempotent_with_no_external_change() {
        let gateway = Arc::new(FakeGateway::new(vec![def("a", 5), def("b", 8)]));
        let scheduler = Scheduler::new(gateway, client());
        let cancel = CancellationToken::new();
        scheduler.load_initial(&cancel).await;

        scheduler.reconcile(&cancel).await;
        let first = (
            scheduler.countdown_of("a").await,
            scheduler.countdown_of("b").await,
        );
        scheduler.reconcile(&cancel).await;
        let second = (
            scheduler.countdown_of("a").await,
            scheduler.countdown_of("b").await,
        );
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn reconcile_swallows_store_errors_and_leaves_mirror_untouched() {
        let gateway = Arc::new(FakeGateway::new(vec![def("a", 5)]));
        let scheduler = Scheduler::new(gateway.clone(), client());
        let cancel = CancellationToken::new();
        scheduler.load_initial(&cancel).await;

        *gateway.fail_next_find.lock().await = true;
        scheduler.reconcile(&cancel).await;

        assert_eq!(scheduler.entry_count().await, 1);
        assert_eq!(scheduler.countdown_of("a").await, Some(5));
    }
}
