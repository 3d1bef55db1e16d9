//! Manager behavior: capacity bounds, handle sharing, rotation order.

use std::num::NonZeroUsize;

use proptest::prelude::*;
use tempfile::TempDir;

use ensfs_core::testing::MemoryBackend;
use ensfs_core::{
    CaseHandle, DEFAULT_CAPACITY, FsManager, FsManagerError, ManagerConfig, MountPolicy,
};

fn manager_with_capacity(tmp: &TempDir, capacity: usize) -> (FsManager, MemoryBackend) {
    let backend = MemoryBackend::new();
    let config = ManagerConfig {
        capacity: NonZeroUsize::new(capacity).unwrap(),
        mount_policy: MountPolicy::CreateOnDemand,
        ..ManagerConfig::default()
    };
    let manager = FsManager::with_backend(tmp.path(), config, Box::new(backend.clone())).unwrap();
    (manager, backend)
}

#[test]
fn test_count_never_exceeds_capacity() {
    let tmp = TempDir::new().unwrap();
    let (manager, _) = manager_with_capacity(&tmp, 3);

    for i in 0..10 {
        manager.get_file_system(&format!("FS{i}")).unwrap();
        assert!(manager.file_system_count() <= 3, "after mount {i}");
    }
    assert_eq!(manager.file_system_count(), 3);
}

#[test]
fn test_default_capacity_rotation() {
    let tmp = TempDir::new().unwrap();
    let backend = MemoryBackend::new();
    let config = ManagerConfig {
        mount_policy: MountPolicy::CreateOnDemand,
        ..ManagerConfig::default()
    };
    let manager = FsManager::with_backend(tmp.path(), config, Box::new(backend)).unwrap();

    let capacity = DEFAULT_CAPACITY.get();
    for i in 0..10 {
        manager.get_file_system(&format!("FS{i}")).unwrap();
        assert_eq!(manager.file_system_count(), capacity.min(i + 1));
    }
    assert_eq!(manager.file_system_count(), capacity);
}

#[test]
fn test_repeated_get_shares_one_handle() {
    let tmp = TempDir::new().unwrap();
    let (manager, _) = manager_with_capacity(&tmp, 2);

    let first = manager.get_file_system("case_a").unwrap();
    let second = manager.get_file_system("case_a").unwrap();

    assert!(std::ptr::eq::<CaseHandle>(&*first, &*second));
    assert_eq!(first.refcount(), 2);
    assert_eq!(manager.file_system_count(), 1);

    drop(second);
    assert_eq!(first.refcount(), 1);
}

#[test]
fn test_capacity_plus_one_evicts_exactly_one() {
    let tmp = TempDir::new().unwrap();
    let (manager, backend) = manager_with_capacity(&tmp, 3);

    for name in ["c0", "c1", "c2"] {
        manager.get_file_system(name).unwrap();
    }
    assert_eq!(manager.file_system_count(), 3);
    assert_eq!(backend.close_count(), 0);

    manager.get_file_system("c3").unwrap();
    assert_eq!(manager.file_system_count(), 3);
    assert_eq!(backend.close_count(), 1);
    // All idle, so the least-recently-mounted case rotates out.
    assert_eq!(manager.mounted_cases(), vec!["c1", "c2", "c3"]);
}

#[test]
fn test_capacity_one_rotation() {
    let tmp = TempDir::new().unwrap();
    let (manager, _) = manager_with_capacity(&tmp, 1);

    manager.get_file_system("FSA").unwrap();
    assert_eq!(manager.file_system_count(), 1);

    let fsb = manager.get_file_system("FSB").unwrap();
    assert_eq!(manager.file_system_count(), 1);
    assert_eq!(manager.mounted_cases(), vec!["FSB"]);
    assert!(fsb.is_open());
}

#[test]
fn test_current_case_survives_rotation() {
    let tmp = TempDir::new().unwrap();
    let (manager, _) = manager_with_capacity(&tmp, 2);

    manager.get_file_system("keep").unwrap();
    manager.set_current_case("keep").unwrap();

    manager.get_file_system("b").unwrap();
    manager.get_file_system("c").unwrap();
    manager.get_file_system("d").unwrap();

    let mounted = manager.mounted_cases();
    assert!(mounted.contains(&"keep".to_string()), "mounted: {mounted:?}");
    assert_eq!(manager.file_system_count(), 2);
}

#[test]
fn test_no_evictable_entry_rejects_mount() {
    let tmp = TempDir::new().unwrap();
    let (manager, _) = manager_with_capacity(&tmp, 1);

    manager.get_file_system("only").unwrap();
    manager.set_current_case("only").unwrap();

    let err = manager.get_file_system("other").unwrap_err();
    assert!(matches!(err, FsManagerError::CapacityExceeded { capacity: 1 }));
    assert_eq!(manager.file_system_count(), 1);
    assert_eq!(manager.mounted_cases(), vec!["only"]);
    assert!(manager.last_error().unwrap().contains("capacity"));
}

#[test]
fn test_second_flush_without_writes_is_noop() {
    let tmp = TempDir::new().unwrap();
    let (manager, backend) = manager_with_capacity(&tmp, 2);

    let fs = manager.get_file_system("case_a").unwrap();
    fs.write_block("PERM", b"a=1").unwrap();
    fs.flush().unwrap();
    assert_eq!(backend.flush_count(), 1);

    fs.flush().unwrap();
    assert_eq!(backend.flush_count(), 1);
}

#[test]
fn test_stats_track_hits_and_misses() {
    let tmp = TempDir::new().unwrap();
    let (manager, _) = manager_with_capacity(&tmp, 2);

    manager.get_file_system("a").unwrap();
    manager.get_file_system("a").unwrap();
    manager.get_file_system("b").unwrap();
    manager.get_file_system("c").unwrap();

    let stats = manager.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 3);
    assert_eq!(stats.mounts, 3);
    assert_eq!(stats.evictions, 1);
    assert!((stats.hit_rate() - 0.25).abs() < f64::EPSILON);
}

#[test]
fn test_rotate_below_capacity() {
    let tmp = TempDir::new().unwrap();
    let (manager, backend) = manager_with_capacity(&tmp, 3);

    assert_eq!(manager.rotate().unwrap(), None);

    manager.get_file_system("a").unwrap();
    manager.get_file_system("b").unwrap();

    assert_eq!(manager.rotate().unwrap(), Some("a".to_string()));
    assert_eq!(manager.file_system_count(), 1);
    assert_eq!(backend.close_count(), 1);
}

#[test]
fn test_rotate_spares_a_lone_current_case() {
    let tmp = TempDir::new().unwrap();
    let (manager, _) = manager_with_capacity(&tmp, 3);

    manager.get_file_system("only").unwrap();
    manager.set_current_case("only").unwrap();

    assert_eq!(manager.rotate().unwrap(), None);
    assert_eq!(manager.file_system_count(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The capacity bound holds for arbitrary mount sequences.
    #[test]
    fn prop_count_bounded_by_capacity(
        capacity in 1usize..4,
        sequence in prop::collection::vec(0usize..8, 1..48),
    ) {
        let tmp = TempDir::new().unwrap();
        let (manager, _) = manager_with_capacity(&tmp, capacity);
        for case in sequence {
            manager.get_file_system(&format!("FS{case}")).unwrap();
            prop_assert!(manager.file_system_count() <= capacity);
        }
    }
}
