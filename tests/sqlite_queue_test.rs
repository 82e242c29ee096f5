//! Durable SQLite queue behavior

use kodegen_tools_indexsync::{JobKind, QueueBackend, ReindexJob, SqliteQueue};
use std::time::Duration;
use tempfile::TempDir;

async fn open(dir: &TempDir, visibility: Duration) -> SqliteQueue {
    SqliteQueue::open(&dir.path().join("jobs").join("queue.sqlite3"), visibility)
        .await
        .unwrap()
}

#[tokio::test]
async fn jobs_come_out_in_order_and_ack_removes_them() {
    let dir = TempDir::new().unwrap();
    let queue = open(&dir, Duration::from_secs(30)).await;

    queue
        .enqueue(ReindexJob::reindex("Article", vec!["1".into(), "2".into()]))
        .await
        .unwrap();
    queue.enqueue(ReindexJob::rebuild("Article")).await.unwrap();
    assert_eq!(queue.len().await.unwrap(), 2);

    let first = queue.dequeue(Duration::ZERO).await.unwrap().unwrap();
    assert_eq!(first.attempt, 1);
    assert_eq!(first.job.kind(), JobKind::Reindex);
    assert_eq!(first.job.ids(), ["1".to_string(), "2".to_string()]);

    let second = queue.dequeue(Duration::ZERO).await.unwrap().unwrap();
    assert_eq!(second.job.kind(), JobKind::Rebuild);

    // Both are in flight
    assert!(queue.dequeue(Duration::from_millis(20)).await.unwrap().is_none());
    assert_eq!(queue.len().await.unwrap(), 2);

    queue.ack(first.id).await.unwrap();
    queue.ack(second.id).await.unwrap();
    assert_eq!(queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn unacknowledged_delivery_reappears_after_visibility_timeout() {
    let dir = TempDir::new().unwrap();
    let queue = open(&dir, Duration::from_millis(150)).await;
    queue
        .enqueue(ReindexJob::reindex("Article", vec!["42".into()]))
        .await
        .unwrap();

    let first = queue.dequeue(Duration::ZERO).await.unwrap().unwrap();
    let again = queue.dequeue(Duration::from_secs(2)).await.unwrap().unwrap();
    assert_eq!(again.id, first.id);
    assert_eq!(again.attempt, 2);
    assert_eq!(again.job, first.job);
}

#[tokio::test]
async fn nack_delays_redelivery() {
    let dir = TempDir::new().unwrap();
    let queue = open(&dir, Duration::from_secs(30)).await;
    queue
        .enqueue(ReindexJob::reindex("Article", vec!["7".into()]))
        .await
        .unwrap();

    let delivery = queue.dequeue(Duration::ZERO).await.unwrap().unwrap();
    queue.nack(delivery.id, Duration::from_millis(100)).await.unwrap();
    assert!(queue.dequeue(Duration::ZERO).await.unwrap().is_none());

    let retried = queue.dequeue(Duration::from_secs(2)).await.unwrap().unwrap();
    assert_eq!(retried.id, delivery.id);
    assert_eq!(retried.attempt, 2);

    queue.ack(retried.id).await.unwrap();
    assert!(queue.nack(retried.id, Duration::ZERO).await.is_err());
}

#[tokio::test]
async fn jobs_survive_reopening() {
    let dir = TempDir::new().unwrap();
    {
        let queue = open(&dir, Duration::from_secs(30)).await;
        queue
            .enqueue(ReindexJob::reindex("Article", vec!["1".into()]))
            .await
            .unwrap();
    }

    let queue = open(&dir, Duration::from_secs(30)).await;
    assert_eq!(queue.len().await.unwrap(), 1);
    let delivery = queue.dequeue(Duration::ZERO).await.unwrap().unwrap();
    assert_eq!(delivery.job.entity_type(), "Article");
}

#[tokio::test]
async fn leases_exclude_other_holders_until_released_or_expired() {
    let dir = TempDir::new().unwrap();
    let queue = open(&dir, Duration::from_secs(30)).await;
    let key = "rebuild:Article";

    assert!(queue.try_acquire_lease(key, "a", Duration::from_secs(60)).await.unwrap());
    assert!(!queue.try_acquire_lease(key, "b", Duration::from_secs(60)).await.unwrap());
    // Renewal by the holder
    assert!(queue.try_acquire_lease(key, "a", Duration::from_secs(60)).await.unwrap());

    // Only the holder can release
    queue.release_lease(key, "b").await.unwrap();
    assert!(!queue.try_acquire_lease(key, "b", Duration::from_secs(60)).await.unwrap());
    queue.release_lease(key, "a").await.unwrap();
    assert!(queue.try_acquire_lease(key, "b", Duration::from_millis(50)).await.unwrap());

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(queue.try_acquire_lease(key, "c", Duration::from_secs(60)).await.unwrap());
}
