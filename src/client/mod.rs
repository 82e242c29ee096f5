//! Search backend client interface
//!
//! `SearchClient` is the RPC surface the synchronization core talks to. Every
//! call may fail with `SyncError::ConnectionFailed` (backend unreachable) or
//! `SyncError::RemoteRejected` (backend reached but refused). Methods return
//! boxed futures so the client can be shared as `Arc<dyn SearchClient>`.
//!
//! The crate ships one implementation, [`TantivyClient`], which stores every
//! index version as its own Tantivy index on local disk and keeps the current
//! pointer of each index name in an atomically replaced file.

pub mod embedded;
pub mod types;

pub use embedded::TantivyClient;
pub use types::{
    BulkOperation, RequestOptions, SearchHit, SearchHits, SearchOptions, SearchQuery, VersionInfo,
};

use futures::future::BoxFuture;
use std::sync::Arc;

use crate::config::SyncConfig;
use crate::document::Document;
use crate::errors::SyncResult;
use crate::registry::{IndexOptions, Mapping};

/// A search client that may be absent
///
/// `None` means the backend could not be reached at startup; every consumer
/// degrades to "index unavailable" instead of failing.
pub type SearchBackend = Option<Arc<dyn SearchClient>>;

/// RPC interface to the search backend
pub trait SearchClient: Send + Sync {
    /// Create or replace a document by id
    fn index<'a>(&'a self, doc: &'a Document, opts: &'a RequestOptions)
    -> BoxFuture<'a, SyncResult<()>>;

    /// Delete a document by id; a missing document is a `DocumentMissing` rejection
    fn delete<'a>(&'a self, id: &'a str, opts: &'a RequestOptions) -> BoxFuture<'a, SyncResult<()>>;

    fn search<'a>(
        &'a self,
        query: &'a SearchQuery,
        opts: &'a SearchOptions,
    ) -> BoxFuture<'a, SyncResult<SearchHits>>;

    fn count<'a>(
        &'a self,
        query: &'a SearchQuery,
        opts: &'a SearchOptions,
    ) -> BoxFuture<'a, SyncResult<u64>>;

    /// Make all writes so far visible to searches of `index` (name or version)
    fn refresh<'a>(&'a self, index: &'a str) -> BoxFuture<'a, SyncResult<()>>;

    /// Create a new physical version for `name`
    fn create_index_version<'a>(
        &'a self,
        name: &'a str,
        options: &'a IndexOptions,
    ) -> BoxFuture<'a, SyncResult<VersionInfo>>;

    /// Versions of `name`, newest first
    fn list_index_versions<'a>(&'a self, name: &'a str)
    -> BoxFuture<'a, SyncResult<Vec<VersionInfo>>>;

    /// The version the current pointer of `name` designates, if any
    fn current_index_version<'a>(&'a self, name: &'a str)
    -> BoxFuture<'a, SyncResult<Option<String>>>;

    /// Atomically point `name` at `version`
    fn deploy_index_version<'a>(
        &'a self,
        name: &'a str,
        version: &'a str,
    ) -> BoxFuture<'a, SyncResult<()>>;

    /// Delete a physical version; the current version is refused with `VersionInUse`
    fn delete_index_version<'a>(&'a self, version: &'a str) -> BoxFuture<'a, SyncResult<()>>;

    /// Delete the index name (its current pointer) itself
    fn delete_index<'a>(&'a self, name: &'a str) -> BoxFuture<'a, SyncResult<()>>;

    fn update_mapping<'a>(
        &'a self,
        mapping: &'a Mapping,
        opts: &'a RequestOptions,
    ) -> BoxFuture<'a, SyncResult<()>>;

    /// Merge segments of `index` (name or version)
    fn optimize<'a>(&'a self, index: &'a str) -> BoxFuture<'a, SyncResult<()>>;

    /// Apply several writes, reporting one result per operation
    ///
    /// The outer error is reserved for failures that affect the whole batch.
    /// The default applies items one at a time.
    fn bulk<'a>(
        &'a self,
        ops: Vec<BulkOperation>,
        opts: &'a RequestOptions,
    ) -> BoxFuture<'a, SyncResult<Vec<SyncResult<()>>>> {
        Box::pin(async move {
            let mut results = Vec::with_capacity(ops.len());
            for op in ops {
                let result = match op {
                    BulkOperation::Index(doc) => self.index(&doc, opts).await,
                    BulkOperation::Delete { id, routing } => {
                        let item_opts = opts.clone().routing(routing);
                        self.delete(&id, &item_opts).await
                    }
                };
                results.push(result);
            }
            Ok(results)
        })
    }
}

/// Best-effort client construction
///
/// Connection failures are logged and turned into `None`; the host keeps
/// running with indexing side effects disabled.
pub async fn connect_backend(config: &SyncConfig) -> SearchBackend {
    match TantivyClient::connect(config).await {
        Ok(client) => Some(Arc::new(client) as Arc<dyn SearchClient>),
        Err(e) => {
            tracing::warn!(
                storage_dir = ?config.storage_dir(),
                error = %e,
                "Search backend unavailable; index writes will be skipped"
            );
            None
        }
    }
}
