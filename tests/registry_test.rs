use bytes::{BufMut, BytesMut};
use netpool::{DiskStore, FileStore, HostRegistry, MemoryStore, ProtocolSupport};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

const REGISTRY_PATH: &str = "hosts.bin";

#[test]
fn save_load_roundtrip_preserves_hosts_and_protocol_support() {
    let store = Arc::new(MemoryStore::new());

    let mut registry = HostRegistry::new(REGISTRY_PATH, Arc::clone(&store) as Arc<dyn FileStore>);
    registry.get_or_create("plain.example");
    registry.get_or_create("fast.example").observe_protocol("h2");
    registry.save();

    let mut restored = HostRegistry::new(REGISTRY_PATH, Arc::clone(&store) as Arc<dyn FileStore>);
    restored.load();

    assert_eq!(restored.host_count(), 2);
    let hostnames: HashSet<&str> = restored.hostnames().collect();
    assert_eq!(hostnames, HashSet::from(["plain.example", "fast.example"]));
    assert_eq!(
        restored.host("plain.example").unwrap().protocol_support(),
        ProtocolSupport::Http1Only
    );
    assert_eq!(
        restored.host("fast.example").unwrap().protocol_support(),
        ProtocolSupport::Multiplexed
    );
}

#[test]
fn second_load_is_a_no_op() {
    let store = Arc::new(MemoryStore::new());

    let mut registry = HostRegistry::new(REGISTRY_PATH, Arc::clone(&store) as Arc<dyn FileStore>);
    registry.get_or_create("a.example");
    registry.save();

    let mut restored = HostRegistry::new(REGISTRY_PATH, Arc::clone(&store) as Arc<dyn FileStore>);
    restored.load();
    assert_eq!(restored.host_count(), 1);

    // Mutate the persisted file after the first load; a second load must
    // not pick it up or duplicate anything.
    registry.get_or_create("b.example");
    registry.save();
    restored.load();

    assert_eq!(restored.host_count(), 1);
    assert_eq!(restored.hostnames().count(), 1);
}

#[test]
fn missing_file_means_no_prior_history() {
    let store = Arc::new(MemoryStore::new());
    let mut registry = HostRegistry::new(REGISTRY_PATH, store as Arc<dyn FileStore>);
    registry.load();
    assert_eq!(registry.host_count(), 0);
}

#[test]
fn corrupt_file_is_discarded_and_removed() {
    let store = Arc::new(MemoryStore::new());
    store.save(Path::new(REGISTRY_PATH), b"not a snapshot").unwrap();

    let mut registry = HostRegistry::new(REGISTRY_PATH, Arc::clone(&store) as Arc<dyn FileStore>);
    registry.load();

    assert_eq!(registry.host_count(), 0);
    assert!(!store.exists(Path::new(REGISTRY_PATH)));
}

#[test]
fn future_version_is_discarded_and_removed() {
    let store = Arc::new(MemoryStore::new());
    let mut buf = BytesMut::new();
    buf.put_i32_le(99);
    buf.put_i32_le(0);
    store.save(Path::new(REGISTRY_PATH), &buf).unwrap();

    let mut registry = HostRegistry::new(REGISTRY_PATH, Arc::clone(&store) as Arc<dyn FileStore>);
    registry.load();

    assert_eq!(registry.host_count(), 0);
    assert!(!store.exists(Path::new(REGISTRY_PATH)));
}

#[test]
fn corrupt_record_blob_discards_the_whole_snapshot() {
    let store = Arc::new(MemoryStore::new());

    // Valid outer layout, garbage per-host metadata.
    let mut buf = BytesMut::new();
    buf.put_i32_le(1); // snapshot version
    buf.put_i32_le(1); // record count
    let hostname = b"bad.example";
    buf.put_u32_le(hostname.len() as u32);
    buf.put_slice(hostname);
    buf.put_u32_le(2);
    buf.put_slice(&[0xBA, 0xAD]);
    store.save(Path::new(REGISTRY_PATH), &buf).unwrap();

    let mut registry = HostRegistry::new(REGISTRY_PATH, Arc::clone(&store) as Arc<dyn FileStore>);
    registry.load();

    assert_eq!(registry.host_count(), 0);
    assert!(!store.exists(Path::new(REGISTRY_PATH)));
}

#[test]
fn clear_is_the_only_way_records_are_destroyed() {
    let store = Arc::new(MemoryStore::new());
    let mut registry = HostRegistry::new(REGISTRY_PATH, store as Arc<dyn FileStore>);
    registry.get_or_create("a.example");
    registry.get_or_create("b.example");
    assert_eq!(registry.host_count(), 2);

    registry.clear();
    assert_eq!(registry.host_count(), 0);
}

#[test]
fn disk_store_roundtrip_with_real_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hosts.bin");

    let mut registry = HostRegistry::new(&path, Arc::new(DiskStore));
    registry.get_or_create("disk.example").observe_protocol("h2");
    registry.save();
    assert!(path.exists());

    let mut restored = HostRegistry::new(&path, Arc::new(DiskStore));
    restored.load();
    assert_eq!(restored.host_count(), 1);
    assert_eq!(
        restored.host("disk.example").unwrap().protocol_support(),
        ProtocolSupport::Multiplexed
    );
}

#[test]
fn load_merges_with_lazily_created_records() {
    let store = Arc::new(MemoryStore::new());

    let mut registry = HostRegistry::new(REGISTRY_PATH, Arc::clone(&store) as Arc<dyn FileStore>);
    registry.get_or_create("persisted.example").observe_protocol("h2");
    registry.save();

    let mut restored = HostRegistry::new(REGISTRY_PATH, Arc::clone(&store) as Arc<dyn FileStore>);
    // A record created before load keeps its in-memory state.
    restored.get_or_create("persisted.example");
    restored.get_or_create("live.example");
    restored.load();

    assert_eq!(restored.host_count(), 2);
    assert_eq!(
        restored.host("persisted.example").unwrap().protocol_support(),
        ProtocolSupport::Http1Only
    );
}
