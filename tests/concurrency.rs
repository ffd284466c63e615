//! Multi-threaded access to one store.

use filestore::{JsonPersister, RecordId, Store, StoreConfig};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

const THREADS: usize = 8;
const INSERTS_PER_THREAD: usize = 50;

fn shared_store(dir: &TempDir) -> Arc<Store<JsonPersister<Value>>> {
    let config = StoreConfig {
        sync_writes: false,
        ..StoreConfig::at(dir.path().join("store"))
    };
    Arc::new(Store::open(config, JsonPersister::new()).unwrap())
}

#[test]
fn test_concurrent_inserts_get_distinct_ids() {
    let dir = TempDir::new().unwrap();
    let store = shared_store(&dir);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut ids = Vec::with_capacity(INSERTS_PER_THREAD);
                for i in 0..INSERTS_PER_THREAD {
                    // One transaction per insert, so commits interleave too.
                    let mut txn = store.begin_transaction();
                    let id = store
                        .insert(&mut txn, "user", &json!({"thread": t, "seq": i}))
                        .unwrap();
                    assert!(store.commit_transaction(&mut txn).unwrap().is_clean());
                    ids.push(id);
                }
                ids
            })
        })
        .collect();

    let mut all_ids: HashSet<RecordId> = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(all_ids.insert(id.clone()), "duplicate id {}", id);
        }
    }

    let total = THREADS * INSERTS_PER_THREAD;
    assert_eq!(all_ids.len(), total);
    assert_eq!(store.get_all("user").unwrap().len(), total);

    let on_disk: HashSet<RecordId> = store.list_ids("user").unwrap().into_iter().collect();
    assert_eq!(on_disk, all_ids);
}

#[test]
fn test_concurrent_inserts_across_types() {
    let dir = TempDir::new().unwrap();
    let store = shared_store(&dir);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let record_type = if t % 2 == 0 { "even" } else { "odd" };
                let mut txn = store.begin_transaction();
                for i in 0..INSERTS_PER_THREAD {
                    store.insert(&mut txn, record_type, &json!(i)).unwrap();
                }
                store.commit_transaction(&mut txn).unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let per_type = THREADS / 2 * INSERTS_PER_THREAD;
    assert_eq!(store.list_ids("even").unwrap().len(), per_type);
    assert_eq!(store.list_ids("odd").unwrap().len(), per_type);
    assert_eq!(store.stats().unwrap().staging_files, 0);
}

#[test]
fn test_last_committer_wins() {
    let dir = TempDir::new().unwrap();
    let store = shared_store(&dir);

    let mut first = store.begin_transaction();
    let mut second = store.begin_transaction();
    store.update(&mut first, "doc", "shared", &json!("first")).unwrap();
    store.update(&mut second, "doc", "shared", &json!("second")).unwrap();

    store.commit_transaction(&mut second).unwrap();
    store.commit_transaction(&mut first).unwrap();

    assert_eq!(store.get("doc", "shared").unwrap(), Some(json!("first")));
}

#[test]
fn test_readers_never_see_partial_records() {
    let dir = TempDir::new().unwrap();
    let store = shared_store(&dir);

    let payload: Vec<u32> = (0..2_000).collect();
    let mut seed = store.begin_transaction();
    store.update(&mut seed, "blob", "big", &json!({"gen": 0, "data": payload})).unwrap();
    store.commit_transaction(&mut seed).unwrap();

    let writer = {
        let store = Arc::clone(&store);
        let payload = payload.clone();
        thread::spawn(move || {
            for generation in 1..=100 {
                let mut txn = store.begin_transaction();
                store
                    .update(&mut txn, "blob", "big", &json!({"gen": generation, "data": payload}))
                    .unwrap();
                store.commit_transaction(&mut txn).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..200 {
                    // Decoding fails if a reader ever observes a half-written file.
                    if let Some(record) = store.get("blob", "big").unwrap() {
                        assert_eq!(record["data"].as_array().unwrap().len(), 2_000);
                    }
                    assert!(store.get_all("blob").unwrap().len() <= 1);
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    let last = store.get("blob", "big").unwrap().unwrap();
    assert_eq!(last["gen"], 100);
}
