//! Shared configuration constants for index synchronization
//!
//! Default values used by the config builder and getters, kept in one place
//! so the library, the operator binary and the tests agree on them.

/// Writer memory budget: 50MB
///
/// Tantivy splits the budget across writer threads and refuses less than
/// 15MB per thread; every version writer uses a single thread.
pub const DEFAULT_WRITER_MEMORY_LIMIT: usize = 50_000_000;

/// Smallest writer budget Tantivy accepts for one thread
pub const MIN_WRITER_MEMORY_LIMIT: usize = 15_000_000;

/// How long an idle worker blocks on an empty queue before polling again
pub const DEFAULT_DEQUEUE_WAIT_MS: u64 = 500;

/// Unacknowledged deliveries become visible again after 5 minutes
pub const DEFAULT_VISIBILITY_TIMEOUT_SECS: u64 = 300;

/// Deliveries of one job before it is dropped with an error log
pub const DEFAULT_MAX_JOB_ATTEMPTS: u32 = 5;

/// Records fetched per page during a full rebuild scan
pub const DEFAULT_REBUILD_PAGE_SIZE: usize = 500;

/// Rebuild lease lifetime; renewed after every page
pub const DEFAULT_REBUILD_LEASE_TTL_SECS: u64 = 3600;

/// Subdirectory of the storage dir holding index versions
pub const INDEX_DIR_NAME: &str = "indices";

/// File name of the SQLite queue inside the storage dir
pub const QUEUE_FILE_NAME: &str = "queue.sqlite3";
