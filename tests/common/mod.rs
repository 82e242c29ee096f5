//! Test utilities shared by the index sync integration tests

use futures::FutureExt;
use futures::future::BoxFuture;
use kodegen_tools_indexsync::client::VersionInfo;
use kodegen_tools_indexsync::registry::{IndexOptions, Mapping};
use kodegen_tools_indexsync::store::Record;
use kodegen_tools_indexsync::{
    BulkOperation, Document, EntityRegistry, EntityTypeDefinition, InMemoryStore, MemoryQueue,
    PrimaryStore, QueueBackend, ReindexWorker, RequestOptions, RetryConfig, SearchClient, SearchHits,
    SearchOptions, SearchQuery, SyncError, SyncResult, TantivyClient, VersionManager,
    WorkerSettings,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

pub const WRITER_MEMORY: usize = 15_000_000;

/// Route test logs through the test harness writer
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Retries without noticeable delays
#[allow(dead_code)]
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        backoff_multiplier: 2.0,
        max_delay: Duration::from_millis(5),
    }
}

#[allow(dead_code)]
pub fn article_registry(policy: &str) -> Arc<EntityRegistry> {
    Arc::new(
        EntityRegistry::from_definitions([EntityTypeDefinition::new("Article").updates(policy)])
            .unwrap(),
    )
}

#[allow(dead_code)]
pub fn article(id: &str, title: &str) -> Record {
    Record::new(id, json!({ "title": title }))
}

/// Embedded backend in a fresh temp directory
#[allow(dead_code)]
pub async fn open_backend() -> (TempDir, Arc<dyn SearchClient>) {
    let dir = TempDir::new().unwrap();
    let client = TantivyClient::open(dir.path(), WRITER_MEMORY).await.unwrap();
    (dir, Arc::new(client))
}

/// A worker and its collaborators over one embedded backend
#[allow(dead_code)]
pub struct Harness {
    pub dir: TempDir,
    pub client: Arc<dyn SearchClient>,
    pub registry: Arc<EntityRegistry>,
    pub versions: VersionManager,
    pub queue: Arc<MemoryQueue>,
    pub store: Arc<InMemoryStore>,
}

#[allow(dead_code)]
impl Harness {
    pub async fn new(policy: &str) -> Self {
        init_tracing();
        let (dir, client) = open_backend().await;
        let versions = VersionManager::new(Some(Arc::clone(&client)));
        Self {
            dir,
            client,
            registry: article_registry(policy),
            versions,
            queue: Arc::new(MemoryQueue::new(Duration::from_secs(30))),
            store: Arc::new(InMemoryStore::new()),
        }
    }

    pub fn worker(&self) -> ReindexWorker {
        self.worker_with(Arc::clone(&self.store) as Arc<dyn PrimaryStore>)
    }

    /// A worker reading from `store` instead of the harness store
    pub fn worker_with(&self, store: Arc<dyn PrimaryStore>) -> ReindexWorker {
        ReindexWorker::new(
            Arc::clone(&self.registry),
            self.versions.clone(),
            Arc::clone(&self.queue) as Arc<dyn QueueBackend>,
            store,
        )
        .with_retry(fast_retry())
        .with_settings(WorkerSettings {
            max_job_attempts: 3,
            dequeue_wait: Duration::from_millis(200),
            rebuild_page_size: 2,
            rebuild_lease_ttl: Duration::from_secs(60),
        })
    }

    /// Give `Article` a current version
    pub async fn ensure_article_index(&self) -> String {
        let article = self.registry.get("Article").unwrap();
        self.versions.ensure_current(&article).await.unwrap()
    }

    /// Ids visible through the `article` index name, sorted
    pub async fn indexed_ids(&self) -> Vec<String> {
        self.client.refresh("article").await.unwrap();
        let opts = SearchOptions::new("article").page(1_000, 0);
        let mut ids = self
            .client
            .search(&SearchQuery::MatchAll, &opts)
            .await
            .unwrap()
            .ids();
        ids.sort();
        ids
    }

    /// Ids stored in one physical version, sorted
    pub async fn ids_in(&self, version: &str) -> Vec<String> {
        self.client.refresh(version).await.unwrap();
        let opts = SearchOptions::new(version).page(1_000, 0);
        let mut ids = self
            .client
            .search(&SearchQuery::MatchAll, &opts)
            .await
            .unwrap()
            .ids();
        ids.sort();
        ids
    }
}

/// How a `ScriptedClient` answers every call
#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub enum Script {
    /// Never completes
    Hang,
    /// Fails with `ConnectionFailed`
    Down,
}

/// Search client stub that counts calls and answers per its script
#[allow(dead_code)]
pub struct ScriptedClient {
    script: Script,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedClient {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond<'a, T: Send + 'a>(&'a self) -> BoxFuture<'a, SyncResult<T>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script {
            Script::Hang => futures::future::pending().boxed(),
            Script::Down => {
                async { Err(SyncError::ConnectionFailed("connection refused".to_string())) }.boxed()
            }
        }
    }
}

impl SearchClient for ScriptedClient {
    fn index<'a>(&'a self, _: &'a Document, _: &'a RequestOptions) -> BoxFuture<'a, SyncResult<()>> {
        self.respond()
    }

    fn delete<'a>(&'a self, _: &'a str, _: &'a RequestOptions) -> BoxFuture<'a, SyncResult<()>> {
        self.respond()
    }

    fn search<'a>(
        &'a self,
        _: &'a SearchQuery,
        _: &'a SearchOptions,
    ) -> BoxFuture<'a, SyncResult<SearchHits>> {
        self.respond()
    }

    fn count<'a>(&'a self, _: &'a SearchQuery, _: &'a SearchOptions) -> BoxFuture<'a, SyncResult<u64>> {
        self.respond()
    }

    fn refresh<'a>(&'a self, _: &'a str) -> BoxFuture<'a, SyncResult<()>> {
        self.respond()
    }

    fn create_index_version<'a>(
        &'a self,
        _: &'a str,
        _: &'a IndexOptions,
    ) -> BoxFuture<'a, SyncResult<VersionInfo>> {
        self.respond()
    }

    fn list_index_versions<'a>(&'a self, _: &'a str) -> BoxFuture<'a, SyncResult<Vec<VersionInfo>>> {
        self.respond()
    }

    fn current_index_version<'a>(&'a self, _: &'a str) -> BoxFuture<'a, SyncResult<Option<String>>> {
        self.respond()
    }

    fn deploy_index_version<'a>(&'a self, _: &'a str, _: &'a str) -> BoxFuture<'a, SyncResult<()>> {
        self.respond()
    }

    fn delete_index_version<'a>(&'a self, _: &'a str) -> BoxFuture<'a, SyncResult<()>> {
        self.respond()
    }

    fn delete_index<'a>(&'a self, _: &'a str) -> BoxFuture<'a, SyncResult<()>> {
        self.respond()
    }

    fn update_mapping<'a>(&'a self, _: &'a Mapping, _: &'a RequestOptions) -> BoxFuture<'a, SyncResult<()>> {
        self.respond()
    }

    fn optimize<'a>(&'a self, _: &'a str) -> BoxFuture<'a, SyncResult<()>> {
        self.respond()
    }

    fn bulk<'a>(
        &'a self,
        _: Vec<BulkOperation>,
        _: &'a RequestOptions,
    ) -> BoxFuture<'a, SyncResult<Vec<SyncResult<()>>>> {
        self.respond()
    }
}
