//! Concurrent access: the capacity bound and handle sharing hold under
//! interleaved mounts from several worker threads.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use tempfile::TempDir;

use ensfs_core::testing::MemoryBackend;
use ensfs_core::{CaseHandle, FsManager, ManagerConfig, MountPolicy};

fn shared_manager(tmp: &TempDir, capacity: usize) -> Arc<FsManager> {
    let config = ManagerConfig {
        capacity: NonZeroUsize::new(capacity).unwrap(),
        mount_policy: MountPolicy::CreateOnDemand,
        ..ManagerConfig::default()
    };
    Arc::new(
        FsManager::with_backend(tmp.path(), config, Box::new(MemoryBackend::new())).unwrap(),
    )
}

#[test]
fn test_capacity_bound_under_contention() {
    let tmp = TempDir::new().unwrap();
    let manager = shared_manager(&tmp, 3);

    let mut workers = Vec::new();
    for worker in 0..8 {
        let manager = Arc::clone(&manager);
        workers.push(thread::spawn(move || {
            for i in 0..100 {
                let name = format!("FS{}", (worker + i) % 8);
                let fs = manager.get_file_system(&name).unwrap();
                fs.write_block("STEP", format!("{worker}:{i}").as_bytes())
                    .unwrap();
                assert!(
                    manager.file_system_count() <= 3,
                    "capacity exceeded at worker {worker} iteration {i}"
                );
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(manager.file_system_count() <= 3);
    let stats = manager.stats();
    assert_eq!(stats.hits + stats.misses, 800);
}

#[test]
fn test_concurrent_gets_share_one_mount() {
    let tmp = TempDir::new().unwrap();
    let manager = shared_manager(&tmp, 2);

    let (tx, rx) = mpsc::channel();
    let mut workers = Vec::new();
    for _ in 0..8 {
        let manager = Arc::clone(&manager);
        let tx = tx.clone();
        workers.push(thread::spawn(move || {
            tx.send(manager.get_file_system("shared").unwrap()).unwrap();
        }));
    }
    drop(tx);

    let guards: Vec<_> = rx.into_iter().collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(guards.len(), 8);
    assert_eq!(guards[0].refcount(), 8);
    for guard in &guards[1..] {
        assert!(std::ptr::eq::<CaseHandle>(&*guards[0], &**guard));
    }
    assert_eq!(manager.stats().mounts, 1);
}

#[test]
fn test_release_from_other_thread() {
    let tmp = TempDir::new().unwrap();
    let manager = shared_manager(&tmp, 2);

    let guard = manager.get_file_system("case_a").unwrap();
    assert_eq!(guard.refcount(), 1);

    let second = manager.get_file_system("case_a").unwrap();
    thread::spawn(move || drop(second)).join().unwrap();
    assert_eq!(guard.refcount(), 1);
}
