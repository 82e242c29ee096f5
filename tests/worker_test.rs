//! Reindex worker: id-list jobs, redelivery and full rebuilds

use futures::future::BoxFuture;
use kodegen_tools_indexsync::queue::rebuild_lease_key;
use kodegen_tools_indexsync::store::Record;
use kodegen_tools_indexsync::{
    DispatchOutcome, EntitySearch, InMemoryStore, MemoryQueue, PrimaryStore, QueueBackend,
    ReindexJob, ReindexService, ReindexWorker, SearchClient, SearchOptions, SearchQuery,
    SyncError, SyncResult, UpdateDispatcher, VersionManager, VersionStatus, WorkerSettings,
};
use proptest::prelude::*;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

mod common;
use common::{Harness, Script, ScriptedClient, article};

/// Store whose keyset scans fail past the first page
struct FailingStore {
    inner: Arc<InMemoryStore>,
}

impl PrimaryStore for FailingStore {
    fn find<'a>(&'a self, entity_type: &'a str, id: &'a str) -> BoxFuture<'a, SyncResult<Option<Record>>> {
        self.inner.find(entity_type, id)
    }

    fn scan<'a>(
        &'a self,
        entity_type: &'a str,
        after: Option<&'a str>,
        limit: usize,
    ) -> BoxFuture<'a, SyncResult<Vec<Record>>> {
        if after.is_some() {
            return Box::pin(async { Err(SyncError::Store("replica went away".to_string())) });
        }
        self.inner.scan(entity_type, after, limit)
    }
}

/// Store that parks the second page of a scan until released
struct GatedStore {
    inner: Arc<InMemoryStore>,
    passed: AtomicBool,
    reached: Notify,
    release: Notify,
}

impl GatedStore {
    fn new(inner: Arc<InMemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            passed: AtomicBool::new(false),
            reached: Notify::new(),
            release: Notify::new(),
        })
    }
}

impl PrimaryStore for GatedStore {
    fn find<'a>(&'a self, entity_type: &'a str, id: &'a str) -> BoxFuture<'a, SyncResult<Option<Record>>> {
        self.inner.find(entity_type, id)
    }

    fn scan<'a>(
        &'a self,
        entity_type: &'a str,
        after: Option<&'a str>,
        limit: usize,
    ) -> BoxFuture<'a, SyncResult<Vec<Record>>> {
        Box::pin(async move {
            if after.is_some() && !self.passed.swap(true, Ordering::SeqCst) {
                self.reached.notify_one();
                self.release.notified().await;
            }
            self.inner.scan(entity_type, after, limit).await
        })
    }
}

/// id -> title of everything searchable through the index name
async fn indexed_titles(h: &Harness) -> BTreeMap<String, Value> {
    h.client.refresh("article").await.unwrap();
    let hits = h
        .client
        .search(&SearchQuery::MatchAll, &SearchOptions::new("article").page(1_000, 0))
        .await
        .unwrap();
    hits.hits
        .into_iter()
        .map(|hit| (hit.id, hit.source["title"].clone()))
        .collect()
}

fn seed(h: &Harness, ids: &[&str], title: &str) {
    for id in ids {
        h.store.upsert("Article", article(id, title));
    }
}

#[tokio::test]
async fn record_deleted_before_processing_is_removed_from_index() {
    let h = Harness::new("enqueue").await;
    h.ensure_article_index().await;
    let worker = h.worker();

    seed(&h, &["42"], "Snail farming");
    worker.reindex_ids("Article", &["42".to_string()]).await.unwrap();
    assert_eq!(h.indexed_ids().await, vec!["42"]);

    h.queue
        .enqueue(ReindexJob::reindex("Article", vec!["42".to_string()]))
        .await
        .unwrap();
    h.store.remove("Article", "42");

    assert!(worker.run_once().await.unwrap());
    assert!(h.indexed_ids().await.is_empty());
    assert_eq!(h.queue.len().await.unwrap(), 0);

    let stats = worker.stats().snapshot();
    assert_eq!(stats.jobs_completed, 1);
    assert_eq!(stats.documents_deleted, 1);
}

#[tokio::test]
async fn id_job_upserts_present_and_deletes_missing_or_skipped() {
    let h = Harness::new("enqueue").await;
    h.ensure_article_index().await;
    let worker = h.worker();

    seed(&h, &["1", "2", "3"], "first draft");
    worker
        .reindex_ids("Article", &["1".into(), "2".into(), "3".into()])
        .await
        .unwrap();

    h.store.upsert("Article", article("1", "second draft"));
    h.store.upsert("Article", article("2", "hidden").skipped(true));
    h.store.remove("Article", "3");

    let report = worker
        .reindex_ids(
            "Article",
            &["1".into(), "1".into(), "2".into(), "3".into(), "99".into()],
        )
        .await
        .unwrap();
    assert_eq!(report.indexed, 1);
    assert_eq!(report.deleted, 2);

    let titles = indexed_titles(&h).await;
    assert_eq!(titles.len(), 1);
    assert_eq!(titles["1"], json!("second draft"));
}

#[tokio::test]
async fn deleting_ids_from_a_missing_index_succeeds() {
    let h = Harness::new("enqueue").await;
    let report = h
        .worker()
        .reindex_ids("Article", &["1".to_string()])
        .await
        .unwrap();
    assert_eq!(report, Default::default());
}

#[tokio::test]
async fn transient_failures_are_redelivered_then_dropped() {
    let h = Harness::new("enqueue").await;
    let down = ScriptedClient::new(Script::Down);
    let worker = ReindexWorker::new(
        Arc::clone(&h.registry),
        VersionManager::new(Some(down as Arc<dyn SearchClient>)),
        Arc::clone(&h.queue) as Arc<dyn QueueBackend>,
        Arc::clone(&h.store) as Arc<dyn PrimaryStore>,
    )
    .with_retry(common::fast_retry())
    .with_settings(kodegen_tools_indexsync::WorkerSettings {
        max_job_attempts: 3,
        dequeue_wait: Duration::from_millis(500),
        rebuild_page_size: 2,
        rebuild_lease_ttl: Duration::from_secs(60),
    });

    seed(&h, &["1"], "unreachable");
    h.queue
        .enqueue(ReindexJob::reindex("Article", vec!["1".to_string()]))
        .await
        .unwrap();

    for _ in 0..3 {
        assert!(worker.run_once().await.unwrap());
    }

    let stats = worker.stats().snapshot();
    assert_eq!(stats.jobs_retried, 2);
    assert_eq!(stats.jobs_dropped, 1);
    assert_eq!(h.queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn jobs_for_unknown_types_are_dropped_immediately() {
    let h = Harness::new("enqueue").await;
    let worker = h.worker();
    h.queue
        .enqueue(ReindexJob::reindex("Comment", vec!["1".to_string()]))
        .await
        .unwrap();

    assert!(worker.run_once().await.unwrap());
    assert_eq!(worker.stats().snapshot().jobs_dropped, 1);
    assert_eq!(h.queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn rebuild_promotes_new_version_and_prunes_old() {
    let h = Harness::new("enqueue").await;
    let old = h.ensure_article_index().await;
    let worker = h.worker();

    seed(&h, &["1", "2", "3", "4", "5"], "rebuilt");
    h.store.upsert("Article", article("6", "draft").skipped(true));

    let report = worker.rebuild("Article").await.unwrap();
    assert_eq!(report.documents, 5);
    assert_ne!(report.version, old);
    assert_eq!(report.pruned, vec![old]);

    let entity = h.registry.get("Article").unwrap();
    let versions = h.versions.list_versions(&entity).await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].name, report.version);
    assert_eq!(versions[0].status, VersionStatus::Current);
    assert_eq!(h.indexed_ids().await, vec!["1", "2", "3", "4", "5"]);
    assert_eq!(worker.stats().snapshot().rebuilds_completed, 1);
}

#[tokio::test]
async fn rebuild_is_rejected_while_lease_is_held() {
    let h = Harness::new("enqueue").await;
    let current = h.ensure_article_index().await;
    let worker = h.worker();

    let key = rebuild_lease_key("Article");
    assert!(
        h.queue
            .try_acquire_lease(&key, "other-worker", Duration::from_secs(60))
            .await
            .unwrap()
    );

    let err = worker.rebuild("Article").await.unwrap_err();
    assert!(matches!(err, SyncError::RebuildInProgress(_)));

    // A queued rebuild is dropped, not retried
    h.queue.enqueue(ReindexJob::rebuild("Article")).await.unwrap();
    assert!(worker.run_once().await.unwrap());
    assert_eq!(h.queue.len().await.unwrap(), 0);
    assert_eq!(worker.stats().snapshot().jobs_dropped, 1);

    let entity = h.registry.get("Article").unwrap();
    let versions = h.versions.list_versions(&entity).await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].name, current);
}

#[tokio::test]
async fn failed_rebuild_keeps_previous_current_version() {
    let h = Harness::new("enqueue").await;
    let old = h.ensure_article_index().await;

    seed(&h, &["1", "2"], "live");
    h.worker()
        .reindex_ids("Article", &["1".into(), "2".into()])
        .await
        .unwrap();
    seed(&h, &["3", "4", "5"], "never promoted");

    let failing = Arc::new(FailingStore {
        inner: Arc::clone(&h.store),
    });
    let worker = h.worker_with(failing);
    let err = worker.rebuild("Article").await.unwrap_err();
    assert!(matches!(err, SyncError::Store(_)));

    let entity = h.registry.get("Article").unwrap();
    assert_eq!(
        h.versions.current_version(&entity).await.unwrap(),
        Some(old.clone())
    );
    let versions = h.versions.list_versions(&entity).await.unwrap();
    assert_eq!(versions.len(), 1, "half-built version is abandoned");
    assert_eq!(h.versions.building_version(&entity), None);
    assert_eq!(h.indexed_ids().await, vec!["1", "2"]);
    assert_eq!(worker.stats().snapshot().rebuilds_failed, 1);

    // The lease was released on failure
    assert!(
        h.queue
            .try_acquire_lease(&rebuild_lease_key("Article"), "next", Duration::from_secs(1))
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn searches_during_rebuild_see_the_old_version() {
    let h = Harness::new("enqueue").await;
    let old = h.ensure_article_index().await;
    let search = EntitySearch::new(Arc::clone(&h.registry), h.versions.clone());

    seed(&h, &["1", "2"], "old edition");
    h.worker()
        .reindex_ids("Article", &["1".into(), "2".into()])
        .await
        .unwrap();
    seed(&h, &["1", "2", "3", "4"], "new edition");

    let gate = GatedStore::new(Arc::clone(&h.store));
    let worker = h.worker_with(Arc::clone(&gate) as Arc<dyn PrimaryStore>);
    let rebuild = tokio::spawn({
        let worker = worker.clone();
        async move { worker.rebuild("Article").await }
    });
    gate.reached.notified().await;

    // First page sits in the building version; readers still see the old one
    let entity = h.registry.get("Article").unwrap();
    assert_eq!(
        h.versions.current_version(&entity).await.unwrap(),
        Some(old.clone())
    );
    let building = h.versions.building_version(&entity).unwrap();
    assert_eq!(h.ids_in(&building).await, vec!["1", "2"]);

    search.refresh_index("Article").await.unwrap();
    let hits = search.search("Article", "old", None).await.unwrap();
    assert_eq!(hits.total, 2);
    assert_eq!(search.search("Article", "new", None).await.unwrap().total, 0);

    // A mutation behind the scan cursor reaches the building version too
    h.store.upsert("Article", article("0", "new edition"));
    worker.reindex_ids("Article", &["0".to_string()]).await.unwrap();

    gate.release.notify_one();
    let report = rebuild.await.unwrap().unwrap();
    assert_eq!(report.version, building);
    assert_eq!(report.pruned, vec![old]);

    assert_eq!(h.indexed_ids().await, vec!["0", "1", "2", "3", "4"]);
    search.refresh_index("Article").await.unwrap();
    let count = search
        .search_count("Article", &SearchQuery::QueryString("new".into()))
        .await
        .unwrap();
    assert_eq!(count, 5);
}

#[tokio::test]
async fn synchronous_writes_during_rebuild_survive_promotion() {
    let h = Harness::new("immediate").await;
    h.ensure_article_index().await;
    seed(&h, &["1", "2", "3", "4"], "old");
    h.worker()
        .reindex_ids("Article", &["1".into(), "2".into(), "3".into(), "4".into()])
        .await
        .unwrap();
    let dispatcher = UpdateDispatcher::new(
        Arc::clone(&h.registry),
        h.versions.clone(),
        Arc::clone(&h.queue) as Arc<dyn QueueBackend>,
    );

    let gate = GatedStore::new(Arc::clone(&h.store));
    let worker = h.worker_with(Arc::clone(&gate) as Arc<dyn PrimaryStore>);
    let rebuild = tokio::spawn({
        let worker = worker.clone();
        async move { worker.rebuild("Article").await }
    });
    gate.reached.notified().await;

    // Both records were already scanned into the building version
    let updated = article("1", "new");
    h.store.upsert("Article", updated.clone());
    assert_eq!(
        dispatcher.on_save("Article", &updated).await.unwrap(),
        DispatchOutcome::Written
    );
    let removed = h.store.remove("Article", "2").unwrap();
    assert_eq!(
        dispatcher.on_delete("Article", &removed).await.unwrap(),
        DispatchOutcome::Written
    );

    gate.release.notify_one();
    rebuild.await.unwrap().unwrap();

    let titles = indexed_titles(&h).await;
    assert_eq!(titles.keys().collect::<Vec<_>>(), vec!["1", "3", "4"]);
    assert_eq!(titles["1"], json!("new"));
    let hits = h
        .client
        .search(
            &SearchQuery::Term {
                field: "title".into(),
                value: "new".into(),
            },
            &SearchOptions::new("article"),
        )
        .await
        .unwrap();
    assert_eq!(hits.ids(), vec!["1"]);
}

#[tokio::test]
async fn running_rebuild_job_is_not_redelivered() {
    let mut h = Harness::new("enqueue").await;
    h.queue = Arc::new(MemoryQueue::new(Duration::from_millis(50)));
    h.ensure_article_index().await;
    seed(&h, &["1", "2", "3", "4"], "slow scan");

    let gate = GatedStore::new(Arc::clone(&h.store));
    let first = h.worker_with(Arc::clone(&gate) as Arc<dyn PrimaryStore>);
    h.queue.enqueue(ReindexJob::rebuild("Article")).await.unwrap();
    let running = tokio::spawn({
        let first = first.clone();
        async move { first.run_once().await }
    });
    gate.reached.notified().await;

    // Well past the visibility timeout, the job is still held by the first worker
    tokio::time::sleep(Duration::from_millis(150)).await;
    let second = h.worker();
    assert!(!second.run_once().await.unwrap());
    assert_eq!(h.queue.len().await.unwrap(), 1);
    assert_eq!(second.stats().snapshot().jobs_dropped, 0);

    gate.release.notify_one();
    assert!(running.await.unwrap().unwrap());
    assert_eq!(h.queue.len().await.unwrap(), 0);
    assert_eq!(first.stats().snapshot().jobs_completed, 1);
}

#[tokio::test]
async fn redelivered_rebuild_waits_for_the_running_holder() {
    let h = Harness::new("enqueue").await;
    h.ensure_article_index().await;
    let key = rebuild_lease_key("Article");
    assert!(
        h.queue
            .try_acquire_lease(&key, "other-worker", Duration::from_secs(60))
            .await
            .unwrap()
    );

    // First delivery went to a worker that never finished with it
    h.queue.enqueue(ReindexJob::rebuild("Article")).await.unwrap();
    let lost = h.queue.dequeue(Duration::ZERO).await.unwrap().unwrap();
    h.queue.nack(lost.id, Duration::ZERO).await.unwrap();

    let worker = h.worker();
    assert!(worker.run_once().await.unwrap());
    let stats = worker.stats().snapshot();
    assert_eq!(stats.jobs_dropped, 0);
    assert_eq!(stats.jobs_retried, 1);
    assert_eq!(h.queue.len().await.unwrap(), 1);
    assert!(h.queue.dequeue(Duration::from_millis(50)).await.unwrap().is_none());
}

#[tokio::test]
async fn rebuild_that_loses_its_lease_is_retried() {
    let h = Harness::new("enqueue").await;
    let old = h.ensure_article_index().await;
    seed(&h, &["1", "2", "3", "4"], "contended");

    let gate = GatedStore::new(Arc::clone(&h.store));
    let worker = h
        .worker_with(Arc::clone(&gate) as Arc<dyn PrimaryStore>)
        .with_settings(WorkerSettings {
            max_job_attempts: 3,
            dequeue_wait: Duration::from_millis(200),
            rebuild_page_size: 2,
            rebuild_lease_ttl: Duration::from_millis(50),
        });
    h.queue.enqueue(ReindexJob::rebuild("Article")).await.unwrap();
    let running = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run_once().await }
    });
    gate.reached.notified().await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        h.queue
            .try_acquire_lease(&rebuild_lease_key("Article"), "thief", Duration::from_secs(60))
            .await
            .unwrap()
    );
    gate.release.notify_one();
    assert!(running.await.unwrap().unwrap());

    let stats = worker.stats().snapshot();
    assert_eq!(stats.rebuilds_failed, 1);
    assert_eq!(stats.jobs_dropped, 0);
    assert_eq!(stats.jobs_retried, 1);
    assert_eq!(h.queue.len().await.unwrap(), 1);

    let entity = h.registry.get("Article").unwrap();
    assert_eq!(h.versions.current_version(&entity).await.unwrap(), Some(old));
}

#[tokio::test]
async fn service_drains_queue_and_reports_stats() {
    let h = Harness::new("enqueue").await;
    h.ensure_article_index().await;
    seed(&h, &["1", "2", "3"], "served");

    for id in ["1", "2", "3"] {
        h.queue
            .enqueue(ReindexJob::reindex("Article", vec![id.to_string()]))
            .await
            .unwrap();
    }

    let service = ReindexService::start(h.worker(), 2);
    assert!(service.is_running());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while h.queue.len().await.unwrap() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let stats = service.shutdown().await;
    assert_eq!(stats.jobs_completed, 3);
    assert_eq!(stats.documents_indexed, 3);
    assert_eq!(h.indexed_ids().await, vec!["1", "2", "3"]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// Handling a job once or several times converges to the same index
    #[test]
    fn redelivered_jobs_converge(
        job_ids in prop::collection::vec(0u8..6, 1..8),
        indexed_before in prop::collection::vec(any::<bool>(), 6),
        present in prop::collection::vec(any::<bool>(), 6),
        skipped in prop::collection::vec(any::<bool>(), 6),
        deliveries in 2usize..4,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (once, repeated, expected) = rt.block_on(async {
            let h = Harness::new("enqueue").await;
            h.ensure_article_index().await;
            let worker = h.worker();

            let all: Vec<String> = (0..6u8).map(|n| n.to_string()).collect();
            for (n, id) in all.iter().enumerate() {
                if indexed_before[n] {
                    h.store.upsert("Article", article(id, "stale"));
                }
            }
            worker.reindex_ids("Article", &all).await.unwrap();

            for (n, id) in all.iter().enumerate() {
                h.store.remove("Article", id);
                if present[n] {
                    h.store.upsert("Article", article(id, "fresh").skipped(skipped[n]));
                }
            }

            let ids: Vec<String> = job_ids.iter().map(|n| n.to_string()).collect();
            let mut expected = indexed_titles(&h).await;
            for id in &ids {
                let n: usize = id.parse().unwrap();
                if present[n] && !skipped[n] {
                    expected.insert(id.clone(), json!("fresh"));
                } else {
                    expected.remove(id);
                }
            }

            let job = ReindexJob::reindex("Article", ids);
            h.queue.enqueue(job.clone()).await.unwrap();
            assert!(worker.run_once().await.unwrap());
            let once = indexed_titles(&h).await;

            for _ in 1..deliveries {
                h.queue.enqueue(job.clone()).await.unwrap();
                assert!(worker.run_once().await.unwrap());
            }
            let repeated = indexed_titles(&h).await;
            (once, repeated, expected)
        });

        prop_assert_eq!(&once, &expected);
        prop_assert_eq!(&repeated, &expected);
    }
}
