use crate::pool::address::HostAddress;
use crate::pool::connection::ConnectionId;
use crate::pool::host::HostRecord;
use crate::pool::store::FileStore;
use crate::pool::variant::{PoolLimits, VariantPool};
use crate::pool::{ConnectionFactory, Request};
use bytes::{Buf, BufMut, BytesMut};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Current snapshot layout version.
const SNAPSHOT_VERSION: i32 = 1;

/// Why a persisted snapshot was rejected. Never surfaces to callers:
/// any of these discards the file and leaves the registry empty.
#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum SnapshotError {
    #[error("snapshot truncated")]
    Truncated,
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(i32),
    #[error("invalid record count {0}")]
    InvalidCount(i32),
    #[error("hostname is not valid UTF-8")]
    InvalidHostname,
    #[error("invalid field value {0}")]
    InvalidValue(u8),
}

/// Hostname -> per-host record map; owns persistence and the global
/// sweep/shutdown fan-outs.
///
/// Only the dispatch context reads or writes this structure. Workers reach
/// it exclusively through the event channels.
pub struct HostRegistry {
    hosts: HashMap<String, HostRecord>,
    path: PathBuf,
    store: Arc<dyn FileStore>,
    loaded: bool,
}

impl std::fmt::Debug for HostRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostRegistry")
            .field("hosts", &self.hosts.len())
            .field("path", &self.path)
            .field("loaded", &self.loaded)
            .finish()
    }
}

impl HostRegistry {
    pub fn new(path: impl Into<PathBuf>, store: Arc<dyn FileStore>) -> Self {
        Self { hosts: HashMap::new(), path: path.into(), store, loaded: false }
    }

    /// Look up a host record, creating it lazily on first use.
    pub fn get_or_create(&mut self, hostname: &str) -> &mut HostRecord {
        self.hosts
            .entry(hostname.to_string())
            .or_insert_with(|| HostRecord::new(hostname.to_string()))
    }

    pub fn host(&self, hostname: &str) -> Option<&HostRecord> {
        self.hosts.get(hostname)
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn hostnames(&self) -> impl Iterator<Item = &str> {
        self.hosts.keys().map(String::as_str)
    }

    /// Drop every record. The only way a host record is ever destroyed.
    pub fn clear(&mut self) {
        self.hosts.clear();
    }

    pub(crate) fn submit(
        &mut self,
        request: Box<dyn Request>,
        address: HostAddress,
        limits: PoolLimits,
        factory: &mut ConnectionFactory,
    ) {
        let record = self.get_or_create(&address.host);
        record.pool_mut(&address, limits).submit(request, factory);
    }

    fn pool_with_connection_mut(&mut self, id: ConnectionId) -> Option<&mut VariantPool> {
        for record in self.hosts.values_mut() {
            for pool in record.pools_mut() {
                if pool.has_connection(id) {
                    return Some(pool);
                }
            }
        }
        None
    }

    pub(crate) fn on_connection_opened(
        &mut self,
        id: ConnectionId,
        protocol: &str,
        now: Instant,
    ) -> bool {
        for record in self.hosts.values_mut() {
            let mut found = false;
            for pool in record.pools_mut() {
                if pool.has_connection(id) {
                    pool.on_opened(id, protocol, now);
                    found = true;
                    break;
                }
            }
            if found {
                record.observe_protocol(protocol);
                return true;
            }
        }
        false
    }

    pub(crate) fn on_request_finished(
        &mut self,
        id: ConnectionId,
        reusable: bool,
        now: Instant,
        factory: &mut ConnectionFactory,
    ) -> bool {
        match self.pool_with_connection_mut(id) {
            Some(pool) => {
                pool.on_request_finished(id, reusable, now, factory);
                true
            }
            None => false,
        }
    }

    pub(crate) fn on_connection_open_failed(
        &mut self,
        id: ConnectionId,
        factory: &mut ConnectionFactory,
    ) -> bool {
        match self.pool_with_connection_mut(id) {
            Some(pool) => {
                pool.on_open_failed(id, factory);
                true
            }
            None => false,
        }
    }

    pub(crate) fn on_connection_closed(
        &mut self,
        id: ConnectionId,
        factory: &mut ConnectionFactory,
    ) -> bool {
        match self.pool_with_connection_mut(id) {
            Some(pool) => {
                pool.on_closed(id, factory);
                true
            }
            None => false,
        }
    }

    /// Close every idle connection of every variant pool.
    pub fn remove_all_idle_connections(&mut self) {
        for record in self.hosts.values_mut() {
            for pool in record.pools_mut() {
                pool.remove_all_idle();
            }
        }
    }

    /// Timeout sweep, then prune pools left with no connections or queue.
    pub(crate) fn close_idle_older_than(&mut self, max_idle: Duration, now: Instant) {
        for record in self.hosts.values_mut() {
            for pool in record.pools_mut() {
                pool.close_idle_older_than(max_idle, now);
            }
            record.prune_empty_pools();
        }
    }

    /// Graceful shutdown of every pool; queued requests fail with a
    /// shutting-down condition.
    pub fn shutdown(&mut self) {
        for record in self.hosts.values_mut() {
            for pool in record.pools_mut() {
                pool.shutdown();
            }
        }
    }

    pub(crate) fn flush_all(&mut self, factory: &mut ConnectionFactory) {
        for record in self.hosts.values_mut() {
            for pool in record.pools_mut() {
                pool.flush(factory);
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.hosts
            .values()
            .flat_map(|record| record.pools())
            .map(|pool| pool.connection_count())
            .sum()
    }

    pub fn idle_connection_count(&self) -> usize {
        self.hosts.values().flat_map(|record| record.pools()).map(|pool| pool.idle_count()).sum()
    }

    pub fn pending_request_count(&self) -> usize {
        self.hosts
            .values()
            .flat_map(|record| record.pools())
            .map(|pool| pool.pending_count())
            .sum()
    }

    /// Persist hostnames and per-host metadata. Fire-and-forget: failures
    /// are logged, never returned.
    pub fn save(&self) {
        let mut buf = BytesMut::new();
        buf.put_i32_le(SNAPSHOT_VERSION);
        buf.put_i32_le(self.hosts.len() as i32);
        for (hostname, record) in &self.hosts {
            put_bytes(&mut buf, hostname.as_bytes());
            put_bytes(&mut buf, &record.encode_metadata());
        }

        if let Err(error) = self.store.save(&self.path, &buf) {
            tracing::warn!(path = %self.path.display(), %error, "failed to persist host registry");
        } else {
            tracing::debug!(hosts = self.hosts.len(), "host registry saved");
        }
    }

    /// Load the persisted snapshot. Idempotent: only the first call does
    /// anything. A missing, unreadable, or unparseable file means "no
    /// prior history" — the corrupt file is removed best-effort and the
    /// registry stays empty. Never raises to the caller.
    pub fn load(&mut self) {
        if self.loaded {
            tracing::debug!("host registry already loaded");
            return;
        }
        self.loaded = true;

        if !self.store.exists(&self.path) {
            return;
        }

        let data = match self.store.load(&self.path) {
            Ok(data) => data,
            Err(error) => {
                tracing::warn!(path = %self.path.display(), %error, "unreadable host registry snapshot; discarding");
                self.discard_snapshot();
                return;
            }
        };

        let records = match decode_snapshot(&data) {
            Ok(records) => records,
            Err(error) => {
                tracing::warn!(%error, "corrupt host registry snapshot; discarding");
                self.discard_snapshot();
                return;
            }
        };

        let mut restored = Vec::with_capacity(records.len());
        for (hostname, blob) in records {
            let mut record = HostRecord::new(hostname.clone());
            if let Err(error) = record.decode_metadata(&blob) {
                tracing::warn!(%hostname, %error, "corrupt host metadata; discarding snapshot");
                self.discard_snapshot();
                return;
            }
            restored.push((hostname, record));
        }

        let count = restored.len();
        for (hostname, record) in restored {
            self.hosts.entry(hostname).or_insert(record);
        }
        tracing::debug!(hosts = count, "host registry loaded");
    }

    fn discard_snapshot(&self) {
        if let Err(error) = self.store.remove(&self.path) {
            tracing::debug!(%error, "could not remove host registry snapshot");
        }
    }
}

fn put_bytes(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32_le(data.len() as u32);
    buf.put_slice(data);
}

fn get_bytes(data: &mut &[u8]) -> Result<Vec<u8>, SnapshotError> {
    if data.remaining() < 4 {
        return Err(SnapshotError::Truncated);
    }
    let len = data.get_u32_le() as usize;
    if data.remaining() < len {
        return Err(SnapshotError::Truncated);
    }
    let mut out = vec![0u8; len];
    data.copy_to_slice(&mut out);
    Ok(out)
}

fn decode_snapshot(mut data: &[u8]) -> Result<Vec<(String, Vec<u8>)>, SnapshotError> {
    if data.remaining() < 8 {
        return Err(SnapshotError::Truncated);
    }
    let version = data.get_i32_le();
    if version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }
    let count = data.get_i32_le();
    if count < 0 {
        return Err(SnapshotError::InvalidCount(count));
    }

    let mut records = Vec::new();
    for _ in 0..count {
        let hostname =
            String::from_utf8(get_bytes(&mut data)?).map_err(|_| SnapshotError::InvalidHostname)?;
        let blob = get_bytes(&mut data)?;
        records.push((hostname, blob));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(version: i32, records: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_i32_le(version);
        buf.put_i32_le(records.len() as i32);
        for (hostname, blob) in records {
            put_bytes(&mut buf, hostname.as_bytes());
            put_bytes(&mut buf, blob);
        }
        buf.to_vec()
    }

    #[test]
    fn decode_valid_snapshot() {
        let data = snapshot(SNAPSHOT_VERSION, &[("a.example", &[1, 0]), ("b.example", &[1, 1])]);
        let records = decode_snapshot(&data).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, "a.example");
        assert_eq!(records[1].1, vec![1, 1]);
    }

    #[test]
    fn decode_rejects_future_version() {
        let data = snapshot(99, &[]);
        assert_eq!(decode_snapshot(&data), Err(SnapshotError::UnsupportedVersion(99)));
    }

    #[test]
    fn decode_rejects_truncated_data() {
        let data = snapshot(SNAPSHOT_VERSION, &[("a.example", &[1, 0])]);
        assert_eq!(decode_snapshot(&data[..data.len() - 1]), Err(SnapshotError::Truncated));
        assert_eq!(decode_snapshot(&data[..6]), Err(SnapshotError::Truncated));
        assert_eq!(decode_snapshot(&[]), Err(SnapshotError::Truncated));
    }

    #[test]
    fn decode_rejects_negative_count() {
        let mut buf = BytesMut::new();
        buf.put_i32_le(SNAPSHOT_VERSION);
        buf.put_i32_le(-3);
        assert_eq!(decode_snapshot(&buf), Err(SnapshotError::InvalidCount(-3)));
    }

    #[test]
    fn decode_rejects_invalid_utf8_hostname() {
        let data = snapshot(SNAPSHOT_VERSION, &[("placeholder", &[1, 0])]);
        // Corrupt the hostname bytes in place.
        let mut data = data;
        data[12] = 0xFF;
        data[13] = 0xFE;
        assert_eq!(decode_snapshot(&data), Err(SnapshotError::InvalidHostname));
    }

    #[test]
    fn decode_rejects_overlong_length_prefix() {
        let mut buf = BytesMut::new();
        buf.put_i32_le(SNAPSHOT_VERSION);
        buf.put_i32_le(1);
        buf.put_u32_le(u32::MAX);
        assert_eq!(decode_snapshot(&buf), Err(SnapshotError::Truncated));
    }
}
