//! Embedded Tantivy search backend
//!
//! Every index version is a standalone Tantivy index under
//! `{storage_dir}/indices/{index}/{version}/`. The current pointer of an index
//! name is a small file replaced atomically on deploy, so a promotion is a
//! single rename and readers never observe a half-switched index.
//!
//! Tantivy calls are blocking; each trait method moves its work onto the
//! blocking thread pool.

mod layout;
mod schema;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{
    AllQuery, BooleanQuery, FuzzyTermQuery, Occur, Query, QueryParser, TermQuery,
};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{
    Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, TantivyError, Term,
};

use self::layout::{Layout, VersionMeta, index_of_version, io_error, validate_index_name, version_name};
use self::schema::DocumentSchema;
use super::types::{
    BulkOperation, RequestOptions, SearchHit, SearchHits, SearchOptions, SearchQuery, VersionInfo,
};
use super::SearchClient;
use crate::config::SyncConfig;
use crate::document::Document;
use crate::errors::{RejectionKind, SyncError, SyncResult};
use crate::registry::{IndexOptions, Mapping};

/// Doc type recorded when a write does not name one
const DEFAULT_DOC_TYPE: &str = "doc";

/// Upper bound on terms extracted for more-like-this queries
const MAX_LIKE_TERMS: usize = 25;

/// Search client backed by local Tantivy indexes
#[derive(Clone)]
pub struct TantivyClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    layout: Layout,
    writer_memory_limit: usize,
    handles: DashMap<String, Arc<VersionHandle>>,
    // Serializes pointer changes against version deletion
    pointer_lock: Mutex<()>,
}

/// An opened index version
struct VersionHandle {
    name: String,
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: DocumentSchema,
    query_parser: QueryParser,
    meta: RwLock<VersionMeta>,
}

impl TantivyClient {
    /// Open the backend rooted at the configured storage directory
    pub async fn connect(config: &SyncConfig) -> SyncResult<Self> {
        Self::open(config.index_dir(), config.writer_memory_limit()).await
    }

    /// Open the backend rooted at `root`
    pub async fn open(root: impl Into<PathBuf>, writer_memory_limit: usize) -> SyncResult<Self> {
        let layout = Layout::new(root);
        let dir = layout.root().to_path_buf();
        tokio::task::spawn_blocking(move || std::fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e)))
            .await
            .map_err(|e| SyncError::Other(format!("Backend open task panicked: {e}")))??;

        tracing::info!(
            root = %layout.root().display(),
            writer_memory_mb = writer_memory_limit / 1_000_000,
            "Embedded search backend ready"
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                layout,
                writer_memory_limit,
                handles: DashMap::new(),
                pointer_lock: Mutex::new(()),
            }),
        })
    }

    /// Index names known to the backend
    pub async fn index_names(&self) -> SyncResult<Vec<String>> {
        self.blocking(|inner| {
            let mut names = inner.layout.index_names()?;
            names.sort();
            Ok(names)
        })
        .await
    }

    async fn blocking<T, F>(&self, op: F) -> SyncResult<T>
    where
        F: FnOnce(&ClientInner) -> SyncResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&inner))
            .await
            .map_err(|e| SyncError::Other(format!("Search backend task panicked: {e}")))?
    }
}

impl ClientInner {
    /// Resolve an index name or a concrete version to `(index, version)`
    fn resolve(&self, target: &str) -> SyncResult<(String, String)> {
        if validate_index_name(target).is_ok()
            && let Some(version) = self.layout.read_pointer(target)?
        {
            return Ok((target.to_string(), version));
        }

        if let Some(index) = index_of_version(target)
            && self.layout.version_dir(index, target).is_dir()
        {
            return Ok((index.to_string(), target.to_string()));
        }

        Err(SyncError::rejected(
            RejectionKind::IndexMissing,
            format!("no such index '{target}'"),
        ))
    }

    fn handle(&self, target: &str) -> SyncResult<Arc<VersionHandle>> {
        let (index, version) = self.resolve(target)?;
        self.open_handle(&index, &version)
    }

    fn open_handle(&self, index: &str, version: &str) -> SyncResult<Arc<VersionHandle>> {
        if let Some(handle) = self.handles.get(version) {
            return Ok(Arc::clone(handle.value()));
        }

        // Opening under the entry lock keeps a single writer per version
        let entry = self.handles.entry(version.to_string());
        match entry {
            dashmap::mapref::entry::Entry::Occupied(occupied) => Ok(Arc::clone(occupied.get())),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let handle = Arc::new(self.load_handle(index, version)?);
                vacant.insert(Arc::clone(&handle));
                Ok(handle)
            }
        }
    }

    fn load_handle(&self, index: &str, version: &str) -> SyncResult<VersionHandle> {
        let dir = self.layout.version_dir(index, version);
        let tantivy_index = Index::open_in_dir(&dir).map_err(tantivy_error)?;

        let meta = self.layout.read_meta(index, version)?.unwrap_or_else(|| VersionMeta {
            name: version.to_string(),
            index: index.to_string(),
            created_at: Utc::now(),
            options: IndexOptions::default(),
            mapping: None,
        });

        let fields = DocumentSchema::from_schema(tantivy_index.schema())?;
        let memory = meta
            .options
            .writer_memory_limit
            .unwrap_or(self.writer_memory_limit);
        let writer: IndexWriter = tantivy_index
            .writer_with_num_threads(1, memory)
            .map_err(tantivy_error)?;
        let reader: IndexReader = tantivy_index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(tantivy_error)?;
        let query_parser = QueryParser::for_index(&tantivy_index, vec![fields.all]);

        tracing::debug!(index, version, "Opened index version");

        Ok(VersionHandle {
            name: version.to_string(),
            index: tantivy_index,
            reader,
            writer: Mutex::new(writer),
            fields,
            query_parser,
            meta: RwLock::new(meta),
        })
    }

    fn create_version(&self, name: &str, options: &IndexOptions) -> SyncResult<VersionInfo> {
        validate_index_name(name)?;
        let index_dir = self.layout.index_dir(name);
        std::fs::create_dir_all(&index_dir).map_err(|e| io_error(&index_dir, e))?;

        let created_at = Utc::now();
        let base = version_name(name, created_at);
        let mut version = base.clone();
        let mut suffix = 0u32;
        loop {
            let dir = self.layout.version_dir(name, &version);
            match std::fs::create_dir(&dir) {
                Ok(()) => break,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    suffix += 1;
                    version = format!("{base}_{suffix}");
                }
                Err(e) => return Err(io_error(&dir, e)),
            }
        }

        let dir = self.layout.version_dir(name, &version);
        Index::create_in_dir(&dir, DocumentSchema::build()).map_err(tantivy_error)?;
        self.layout.write_meta(&VersionMeta {
            name: version.clone(),
            index: name.to_string(),
            created_at,
            options: options.clone(),
            mapping: None,
        })?;

        tracing::info!(index = name, version = %version, "Created index version");
        Ok(VersionInfo {
            name: version,
            created_at,
        })
    }

    fn list_versions(&self, name: &str) -> SyncResult<Vec<VersionInfo>> {
        validate_index_name(name)?;
        let mut versions: Vec<VersionInfo> = self
            .layout
            .version_metas(name)?
            .into_iter()
            .map(|meta| VersionInfo {
                name: meta.name,
                created_at: meta.created_at,
            })
            .collect();
        versions.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.name.cmp(&a.name))
        });
        Ok(versions)
    }

    fn current_version(&self, name: &str) -> SyncResult<Option<String>> {
        validate_index_name(name)?;
        self.layout.read_pointer(name)
    }

    fn deploy(&self, name: &str, version: &str) -> SyncResult<()> {
        validate_index_name(name)?;
        if index_of_version(version) != Some(name) {
            return Err(SyncError::rejected(
                RejectionKind::InvalidRequest,
                format!("'{version}' is not a version of '{name}'"),
            ));
        }

        let _guard = self.pointer_lock.lock();
        if !self.layout.version_dir(name, version).is_dir() {
            return Err(SyncError::rejected(
                RejectionKind::IndexMissing,
                format!("no such index version '{version}'"),
            ));
        }
        self.layout.write_pointer(name, version)?;
        tracing::info!(index = name, version, "Deployed index version");
        Ok(())
    }

    fn delete_version(&self, version: &str) -> SyncResult<()> {
        let Some(index) = index_of_version(version) else {
            return Err(SyncError::rejected(
                RejectionKind::IndexMissing,
                format!("no such index version '{version}'"),
            ));
        };

        let _guard = self.pointer_lock.lock();
        if self.layout.read_pointer(index)?.as_deref() == Some(version) {
            return Err(SyncError::rejected(
                RejectionKind::VersionInUse,
                format!("'{version}' is the current version of '{index}'"),
            ));
        }

        let dir = self.layout.version_dir(index, version);
        let meta_path = self.layout.meta_path(index, version);
        if !dir.exists() && !meta_path.exists() {
            return Err(SyncError::rejected(
                RejectionKind::IndexMissing,
                format!("no such index version '{version}'"),
            ));
        }

        // Dropping the handle releases the Tantivy writer lock
        if let Some((_, handle)) = self.handles.remove(version) {
            drop(handle);
        }

        match std::fs::remove_file(&meta_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(&meta_path, e)),
        }
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(&dir, e)),
        }

        tracing::info!(index, version, "Deleted index version");
        Ok(())
    }

    fn delete_index(&self, name: &str) -> SyncResult<()> {
        validate_index_name(name)?;
        let _guard = self.pointer_lock.lock();
        if self.layout.remove_pointer(name)? {
            tracing::info!(index = name, "Deleted index pointer");
            Ok(())
        } else {
            Err(SyncError::rejected(
                RejectionKind::IndexMissing,
                format!("no such index '{name}'"),
            ))
        }
    }

    fn update_mapping(&self, mapping: &Mapping, opts: &RequestOptions) -> SyncResult<()> {
        let handle = self.handle(&opts.index)?;
        let mut meta = handle.meta.write();
        let mut merged = meta.mapping.clone().unwrap_or_default();

        for (field, incoming) in &mapping.properties {
            match merged.properties.get(field) {
                Some(existing) if existing.kind != incoming.kind => {
                    return Err(SyncError::rejected(
                        RejectionKind::MappingConflict,
                        format!(
                            "field '{field}' is mapped as {:?}, cannot change to {:?}",
                            existing.kind, incoming.kind
                        ),
                    ));
                }
                Some(_) => {}
                None => {
                    merged.properties.insert(field.clone(), incoming.clone());
                }
            }
        }

        let mut updated = meta.clone();
        updated.mapping = Some(merged);
        self.layout.write_meta(&updated)?;
        *meta = updated;
        tracing::debug!(version = %handle.name, "Updated mapping");
        Ok(())
    }
}

impl VersionHandle {
    fn doc_type<'a>(opts: &'a RequestOptions) -> &'a str {
        opts.doc_type.as_deref().unwrap_or(DEFAULT_DOC_TYPE)
    }

    fn prepare(&self, doc: &Document, doc_type: &str) -> SyncResult<TantivyDocument> {
        if let Some(mapping) = &self.meta.read().mapping
            && let Err(reason) = mapping.check(&doc.body)
        {
            return Err(SyncError::rejected(
                RejectionKind::MappingConflict,
                format!("document {}: {reason}", doc.id),
            ));
        }
        self.fields.to_tantivy(doc, doc_type)
    }

    fn id_term(&self, id: &str) -> Term {
        Term::from_field_text(self.fields.id, id)
    }

    fn contains(&self, searcher: &Searcher, id: &str) -> SyncResult<bool> {
        let query = TermQuery::new(self.id_term(id), IndexRecordOption::Basic);
        Ok(searcher.search(&query, &Count).map_err(tantivy_error)? > 0)
    }

    fn commit(&self, writer: &mut IndexWriter, refresh: bool) -> SyncResult<()> {
        writer.commit().map_err(tantivy_error)?;
        if refresh {
            self.reader.reload().map_err(tantivy_error)?;
        }
        Ok(())
    }

    fn index(&self, doc: &Document, opts: &RequestOptions) -> SyncResult<()> {
        let prepared = self.prepare(doc, Self::doc_type(opts))?;
        let mut writer = self.writer.lock();
        writer.delete_term(self.id_term(&doc.id));
        writer.add_document(prepared).map_err(tantivy_error)?;
        self.commit(&mut writer, opts.refresh)
    }

    fn delete(&self, id: &str, opts: &RequestOptions) -> SyncResult<()> {
        let mut writer = self.writer.lock();
        self.reader.reload().map_err(tantivy_error)?;
        if !self.contains(&self.reader.searcher(), id)? {
            return Err(document_missing(id, &self.name));
        }
        writer.delete_term(self.id_term(id));
        self.commit(&mut writer, opts.refresh)
    }

    fn bulk(&self, ops: Vec<BulkOperation>, opts: &RequestOptions) -> SyncResult<Vec<SyncResult<()>>> {
        let doc_type = Self::doc_type(opts);
        let mut writer = self.writer.lock();
        self.reader.reload().map_err(tantivy_error)?;
        let searcher = self.reader.searcher();

        // Presence of ids touched earlier in this batch
        let mut present: HashMap<String, bool> = HashMap::new();
        let mut results = Vec::with_capacity(ops.len());
        let mut dirty = false;

        for op in ops {
            let result = match op {
                BulkOperation::Index(doc) => self.prepare(&doc, doc_type).and_then(|prepared| {
                    writer.delete_term(self.id_term(&doc.id));
                    writer.add_document(prepared).map_err(tantivy_error)?;
                    present.insert(doc.id, true);
                    Ok(())
                }),
                BulkOperation::Delete { id, .. } => {
                    let exists = match present.get(&id) {
                        Some(known) => Ok(*known),
                        None => self.contains(&searcher, &id),
                    };
                    match exists {
                        Ok(true) => {
                            writer.delete_term(self.id_term(&id));
                            present.insert(id, false);
                            Ok(())
                        }
                        Ok(false) => Err(document_missing(&id, &self.name)),
                        Err(e) => Err(e),
                    }
                }
            };
            dirty |= result.is_ok();
            results.push(result);
        }

        if dirty {
            self.commit(&mut writer, opts.refresh)?;
        }
        Ok(results)
    }

    fn refresh(&self) -> SyncResult<()> {
        self.reader.reload().map_err(tantivy_error)
    }

    fn optimize(&self) -> SyncResult<()> {
        let mut writer = self.writer.lock();
        let segments = self.index.searchable_segment_ids().map_err(tantivy_error)?;
        if segments.len() > 1 {
            writer.merge(&segments).wait().map_err(tantivy_error)?;
            tracing::info!(version = %self.name, merged = segments.len(), "Merged index segments");
        }
        self.reader.reload().map_err(tantivy_error)
    }

    fn build_query(&self, query: &SearchQuery, opts: &SearchOptions) -> SyncResult<Option<Box<dyn Query>>> {
        let base: Box<dyn Query> = match query {
            SearchQuery::MatchAll => Box::new(AllQuery),
            SearchQuery::QueryString(text) => self.parse(text)?,
            SearchQuery::Term { field, value } => {
                check_field_path(field)?;
                let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
                self.parse(&format!("body.{field}:\"{escaped}\""))?
            }
            SearchQuery::MoreLikeThis { fields, like_text } => {
                if fields.is_empty() {
                    return Err(SyncError::MissingRequiredInput(
                        "more-like-this requires at least one field".to_string(),
                    ));
                }
                for field in fields {
                    check_field_path(field)?;
                }
                let terms = like_terms(like_text);
                if terms.is_empty() {
                    return Ok(None);
                }
                let clauses: Vec<String> = fields
                    .iter()
                    .flat_map(|field| terms.iter().map(move |term| format!("body.{field}:{term}")))
                    .collect();
                self.parse(&clauses.join(" "))?
            }
            SearchQuery::FuzzyLikeThis { fields, like_text } => {
                if fields.is_empty() {
                    return Err(SyncError::MissingRequiredInput(
                        "fuzzy-like-this requires at least one field".to_string(),
                    ));
                }
                for field in fields {
                    check_field_path(field)?;
                }
                let terms = like_terms(like_text);
                if terms.is_empty() {
                    return Ok(None);
                }
                // The query parser has no fuzzy form for JSON paths
                let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
                for field in fields {
                    for word in &terms {
                        let mut term = Term::from_field_json_path(self.fields.body, field, false);
                        term.append_type_and_str(word);
                        let fuzzy = FuzzyTermQuery::new(term, edit_distance(word), true);
                        clauses.push((Occur::Should, Box::new(fuzzy) as Box<dyn Query>));
                    }
                }
                Box::new(BooleanQuery::new(clauses))
            }
        };

        let Some(doc_type) = &opts.doc_type else {
            return Ok(Some(base));
        };
        let type_filter: Box<dyn Query> = Box::new(TermQuery::new(
            Term::from_field_text(self.fields.doc_type, doc_type),
            IndexRecordOption::Basic,
        ));
        Ok(Some(Box::new(BooleanQuery::new(vec![
            (Occur::Must, base),
            (Occur::Must, type_filter),
        ]))))
    }

    fn parse(&self, text: &str) -> SyncResult<Box<dyn Query>> {
        self.query_parser.parse_query(text).map_err(|e| {
            SyncError::rejected(RejectionKind::InvalidRequest, format!("bad query '{text}': {e}"))
        })
    }

    fn search(&self, query: &SearchQuery, opts: &SearchOptions) -> SyncResult<SearchHits> {
        let Some(query) = self.build_query(query, opts)? else {
            return Ok(SearchHits {
                total: 0,
                offset: opts.offset,
                hits: Vec::new(),
            });
        };

        let searcher = self.reader.searcher();
        if opts.limit == 0 {
            let total = searcher.search(query.as_ref(), &Count).map_err(tantivy_error)?;
            return Ok(SearchHits {
                total: total as u64,
                offset: opts.offset,
                hits: Vec::new(),
            });
        }

        let collector = (TopDocs::with_limit(opts.limit).and_offset(opts.offset), Count);
        let (top_docs, total) = searcher.search(query.as_ref(), &collector).map_err(tantivy_error)?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address).map_err(tantivy_error)?;
            let text = |field| {
                doc.get_first(field)
                    .and_then(|value| value.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            let source = text(self.fields.source);
            hits.push(SearchHit {
                id: text(self.fields.id),
                doc_type: text(self.fields.doc_type),
                score,
                source: serde_json::from_str(&source)?,
            });
        }

        Ok(SearchHits {
            total: total as u64,
            offset: opts.offset,
            hits,
        })
    }

    fn count(&self, query: &SearchQuery, opts: &SearchOptions) -> SyncResult<u64> {
        let Some(query) = self.build_query(query, opts)? else {
            return Ok(0);
        };
        let total = self
            .reader
            .searcher()
            .search(query.as_ref(), &Count)
            .map_err(tantivy_error)?;
        Ok(total as u64)
    }
}

fn document_missing(id: &str, version: &str) -> SyncError {
    SyncError::rejected(
        RejectionKind::DocumentMissing,
        format!("document {id} not found in {version}"),
    )
}

fn check_field_path(field: &str) -> SyncResult<()> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(SyncError::rejected(
            RejectionKind::InvalidRequest,
            format!("invalid field name '{field}'"),
        ))
    }
}

/// Distinct lowercase words of `text`, capped at `MAX_LIKE_TERMS`
fn like_terms(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() > 1)
        .map(str::to_lowercase)
        .filter(|word| seen.insert(word.clone()))
        .take(MAX_LIKE_TERMS)
        .collect()
}

/// Allowed edits for a fuzzy term, growing with its length
fn edit_distance(word: &str) -> u8 {
    match word.chars().count() {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

/// Storage-level failures are connection-class; everything else is a rejection
fn tantivy_error(error: TantivyError) -> SyncError {
    match error {
        TantivyError::IoError(_)
        | TantivyError::LockFailure(..)
        | TantivyError::OpenDirectoryError(_)
        | TantivyError::OpenReadError(_)
        | TantivyError::OpenWriteError(_) => SyncError::ConnectionFailed(error.to_string()),
        other => SyncError::rejected(RejectionKind::Other, other.to_string()),
    }
}

impl SearchClient for TantivyClient {
    fn index<'a>(&'a self, doc: &'a Document, opts: &'a RequestOptions) -> BoxFuture<'a, SyncResult<()>> {
        let doc = doc.clone();
        let opts = opts.clone();
        Box::pin(self.blocking(move |inner| inner.handle(&opts.index)?.index(&doc, &opts)))
    }

    fn delete<'a>(&'a self, id: &'a str, opts: &'a RequestOptions) -> BoxFuture<'a, SyncResult<()>> {
        let id = id.to_string();
        let opts = opts.clone();
        Box::pin(self.blocking(move |inner| inner.handle(&opts.index)?.delete(&id, &opts)))
    }

    fn search<'a>(
        &'a self,
        query: &'a SearchQuery,
        opts: &'a SearchOptions,
    ) -> BoxFuture<'a, SyncResult<SearchHits>> {
        let query = query.clone();
        let opts = opts.clone();
        Box::pin(self.blocking(move |inner| inner.handle(&opts.index)?.search(&query, &opts)))
    }

    fn count<'a>(
        &'a self,
        query: &'a SearchQuery,
        opts: &'a SearchOptions,
    ) -> BoxFuture<'a, SyncResult<u64>> {
        let query = query.clone();
        let opts = opts.clone();
        Box::pin(self.blocking(move |inner| inner.handle(&opts.index)?.count(&query, &opts)))
    }

    fn refresh<'a>(&'a self, index: &'a str) -> BoxFuture<'a, SyncResult<()>> {
        let index = index.to_string();
        Box::pin(self.blocking(move |inner| inner.handle(&index)?.refresh()))
    }

    fn create_index_version<'a>(
        &'a self,
        name: &'a str,
        options: &'a IndexOptions,
    ) -> BoxFuture<'a, SyncResult<VersionInfo>> {
        let name = name.to_string();
        let options = options.clone();
        Box::pin(self.blocking(move |inner| inner.create_version(&name, &options)))
    }

    fn list_index_versions<'a>(&'a self, name: &'a str) -> BoxFuture<'a, SyncResult<Vec<VersionInfo>>> {
        let name = name.to_string();
        Box::pin(self.blocking(move |inner| inner.list_versions(&name)))
    }

    fn current_index_version<'a>(&'a self, name: &'a str) -> BoxFuture<'a, SyncResult<Option<String>>> {
        let name = name.to_string();
        Box::pin(self.blocking(move |inner| inner.current_version(&name)))
    }

    fn deploy_index_version<'a>(
        &'a self,
        name: &'a str,
        version: &'a str,
    ) -> BoxFuture<'a, SyncResult<()>> {
        let name = name.to_string();
        let version = version.to_string();
        Box::pin(self.blocking(move |inner| inner.deploy(&name, &version)))
    }

    fn delete_index_version<'a>(&'a self, version: &'a str) -> BoxFuture<'a, SyncResult<()>> {
        let version = version.to_string();
        Box::pin(self.blocking(move |inner| inner.delete_version(&version)))
    }

    fn delete_index<'a>(&'a self, name: &'a str) -> BoxFuture<'a, SyncResult<()>> {
        let name = name.to_string();
        Box::pin(self.blocking(move |inner| inner.delete_index(&name)))
    }

    fn update_mapping<'a>(
        &'a self,
        mapping: &'a Mapping,
        opts: &'a RequestOptions,
    ) -> BoxFuture<'a, SyncResult<()>> {
        let mapping = mapping.clone();
        let opts = opts.clone();
        Box::pin(self.blocking(move |inner| inner.update_mapping(&mapping, &opts)))
    }

    fn optimize<'a>(&'a self, index: &'a str) -> BoxFuture<'a, SyncResult<()>> {
        let index = index.to_string();
        Box::pin(self.blocking(move |inner| inner.handle(&index)?.optimize()))
    }

    fn bulk<'a>(
        &'a self,
        ops: Vec<BulkOperation>,
        opts: &'a RequestOptions,
    ) -> BoxFuture<'a, SyncResult<Vec<SyncResult<()>>>> {
        let opts = opts.clone();
        Box::pin(self.blocking(move |inner| inner.handle(&opts.index)?.bulk(ops, &opts)))
    }
}
