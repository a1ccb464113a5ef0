//! Integration tests for batching, deduplication and priming.
//!
//! These tests drive `BatchedLoader` through a recording batch function so
//! every bulk fetch can be asserted on directly.

use std::sync::{Arc, Mutex};

use futures::future::join_all;
use pretty_assertions::assert_eq;
use trellis::query::loader::{BatchedLoader, batch_fn};
use trellis::query::{ErrorCode, QueryError, QueryResult};
use trellis::schema::LoaderConfig;

type Batches = Arc<Mutex<Vec<Vec<u32>>>>;

/// Loader over `0..100` that doubles its key and records every batch.
fn doubling(config: &LoaderConfig) -> (BatchedLoader<u32, u32>, Batches) {
    let batches: Batches = Arc::default();
    let seen = batches.clone();
    let loader = BatchedLoader::new(
        "doubling",
        batch_fn(move |keys: Vec<u32>| {
            seen.lock().unwrap().push(keys.clone());
            async move {
                QueryResult::Ok(
                    keys.iter()
                        .map(|k| (*k < 100).then_some(k * 2))
                        .collect(),
                )
            }
        }),
        config,
    );
    (loader, batches)
}

fn recorded(batches: &Batches) -> Vec<Vec<u32>> {
    batches.lock().unwrap().clone()
}

/// Test that N loads of one key reach the batch function once
#[tokio::test]
async fn test_same_key_fetched_once() {
    let (loader, batches) = doubling(&LoaderConfig::default());

    let results = join_all((0..8).map(|_| loader.load(7))).await;

    assert_eq!(recorded(&batches), vec![vec![7]]);
    for result in results {
        assert_eq!(result.unwrap(), Some(14));
    }
    let stats = loader.stats();
    assert_eq!(stats.loads, 8);
    assert_eq!(stats.cache_hits, 7);
    assert_eq!(stats.keys_fetched, 1);
}

/// Test that loads enqueued in one pass share a batch on a worker pool
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_batch_per_pass_on_worker_pool() {
    for _ in 0..25 {
        let (loader, batches) = doubling(&LoaderConfig::default());

        let single = join_all((0..8).map(|_| loader.load(7))).await;
        let (many, other) = tokio::join!(loader.load_many([3, 1, 3, 2]), loader.load(9));

        assert!(single.iter().all(|r| r.as_ref().unwrap() == &Some(14)));
        assert_eq!(many.unwrap(), vec![Some(6), Some(2), Some(6), Some(4)]);
        assert_eq!(other.unwrap(), Some(18));
        assert_eq!(recorded(&batches), vec![vec![7], vec![3, 1, 2, 9]]);
    }
}

/// Test that every caller observes the same rejection
#[tokio::test]
async fn test_same_key_shares_rejection() {
    let loader: BatchedLoader<u32, u32> = BatchedLoader::new(
        "broken",
        batch_fn(|_keys: Vec<u32>| async {
            QueryResult::<Vec<Option<u32>>>::Err(QueryError::database("connection reset"))
        }),
        &LoaderConfig::default(),
    );

    let results = join_all((0..3).map(|_| loader.load(1))).await;
    let errors: Vec<QueryError> = results.into_iter().map(Result::unwrap_err).collect();

    assert!(errors.iter().all(|e| e.code == ErrorCode::BatchFetchFailed));
    assert!(errors.iter().all(|e| e.message == errors[0].message));
    assert_eq!(loader.stats().failed_batches, 1);

    // The rejection stays memoized for the request.
    let again = loader.load(1).await.unwrap_err();
    assert_eq!(again.message, errors[0].message);
    assert_eq!(loader.stats().batches, 1);
}

/// Test that load_many keeps order and duplicates
#[tokio::test]
async fn test_load_many_ordered_with_duplicates() {
    let (loader, batches) = doubling(&LoaderConfig::default());

    let values = loader.load_many([1, 2, 1, 3]).await.unwrap();

    assert_eq!(values, vec![Some(2), Some(4), Some(2), Some(6)]);
    assert_eq!(values[0], values[2]);
    assert_eq!(recorded(&batches), vec![vec![1, 2, 3]]);
}

/// Test that loads across separate ticks still hit the cache
#[tokio::test]
async fn test_memoized_across_ticks() {
    let (loader, batches) = doubling(&LoaderConfig::default());

    assert_eq!(loader.load(5).await.unwrap(), Some(10));
    assert_eq!(loader.load(5).await.unwrap(), Some(10));
    assert_eq!(loader.load(6).await.unwrap(), Some(12));

    assert_eq!(recorded(&batches), vec![vec![5], vec![6]]);
}

/// Test that a primed key never reaches the batch function
#[tokio::test]
async fn test_prime_before_load() {
    let (loader, batches) = doubling(&LoaderConfig::default());

    assert!(loader.prime(4, 400));
    let values = loader.load_many([4, 5]).await.unwrap();

    assert_eq!(values, vec![Some(400), Some(10)]);
    assert_eq!(recorded(&batches), vec![vec![5]]);
    assert_eq!(loader.stats().primed, 1);
}

/// Test that priming a pending key does not override the scheduled fetch
#[tokio::test]
async fn test_prime_after_load() {
    let (loader, batches) = doubling(&LoaderConfig::default());

    let pending = loader.load(4);
    assert!(!loader.prime(4, 400));

    assert_eq!(pending.await.unwrap(), Some(8));
    assert_eq!(loader.load(4).await.unwrap(), Some(8));
    assert_eq!(recorded(&batches), vec![vec![4]]);
}

/// Test that missing keys resolve to None rather than an error
#[tokio::test]
async fn test_missing_keys_are_absent() {
    let (loader, _) = doubling(&LoaderConfig::default());

    let values = loader.load_many([150, 2]).await.unwrap();
    assert_eq!(values, vec![None, Some(4)]);
}

/// Test that large flushes are split by max_batch_size
#[tokio::test]
async fn test_flush_is_chunked() {
    let (loader, batches) = doubling(&LoaderConfig::default().with_max_batch_size(2));

    let values = loader.load_many([1, 2, 3, 4, 5]).await.unwrap();

    assert_eq!(values.len(), 5);
    assert_eq!(recorded(&batches), vec![vec![1, 2], vec![3, 4], vec![5]]);
    assert_eq!(loader.stats().batches, 3);
}

/// Test that disabling the cache keeps batching but drops memoization
#[tokio::test]
async fn test_uncached_loader() {
    let (loader, batches) = doubling(&LoaderConfig::default().with_cache(false));

    let (a, b) = tokio::join!(loader.load(3), loader.load(3));
    assert_eq!((a.unwrap(), b.unwrap()), (Some(6), Some(6)));
    assert_eq!(loader.load(3).await.unwrap(), Some(6));
    assert!(!loader.prime(9, 1));

    assert_eq!(recorded(&batches), vec![vec![3], vec![3]]);
}

/// Test that clear forces the next load to fetch again
#[tokio::test]
async fn test_clear_refetches() {
    let (loader, batches) = doubling(&LoaderConfig::default());

    loader.load(8).await.unwrap();
    assert!(loader.contains(&8));
    assert!(loader.clear(&8));
    assert!(!loader.contains(&8));
    loader.load(8).await.unwrap();

    assert_eq!(recorded(&batches), vec![vec![8], vec![8]]);
}

/// Test that a batch returning the wrong number of values fails every key
#[tokio::test]
async fn test_misaligned_batch() {
    let loader: BatchedLoader<u32, u32> = BatchedLoader::new(
        "short",
        batch_fn(|_keys: Vec<u32>| async { QueryResult::Ok(vec![Some(1u32)]) }),
        &LoaderConfig::default(),
    );

    let (a, b) = tokio::join!(loader.load(1), loader.load(2));

    assert_eq!(a.unwrap_err().code, ErrorCode::BatchMisaligned);
    assert_eq!(b.unwrap_err().code, ErrorCode::BatchMisaligned);
}
