use crate::pool::address::HostAddress;
use crate::pool::registry::SnapshotError;
use crate::pool::variant::{PoolLimits, VariantPool};
use bytes::{Buf, BufMut, BytesMut};
use std::collections::HashMap;

/// What we have learned about a host's application-protocol capabilities.
///
/// The upgrade is one-way: once multiplexing has been observed, the host
/// never downgrades back to `Http1Only` (a downgraded connection is a
/// transport problem, not new capability information).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolSupport {
    Http1Only,
    Multiplexed,
}

const METADATA_VERSION: u8 = 1;

/// Per-hostname state: known protocol support plus the variant pools.
///
/// Created lazily on first lookup, only destroyed by a full registry
/// clear. Protocol support survives process restarts via the registry
/// snapshot; connections never do.
pub struct HostRecord {
    hostname: String,
    protocol_support: ProtocolSupport,
    pools: HashMap<HostAddress, VariantPool>,
}

impl std::fmt::Debug for HostRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostRecord")
            .field("hostname", &self.hostname)
            .field("protocol_support", &self.protocol_support)
            .field("pools", &self.pools.len())
            .finish()
    }
}

impl HostRecord {
    pub(crate) fn new(hostname: String) -> Self {
        Self { hostname, protocol_support: ProtocolSupport::Http1Only, pools: HashMap::new() }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn protocol_support(&self) -> ProtocolSupport {
        self.protocol_support
    }

    /// Record a negotiated application protocol for this host. Observing a
    /// multiplexing protocol upgrades the record; variant pools created
    /// afterwards get the raised concurrency cap.
    pub fn observe_protocol(&mut self, protocol: &str) {
        if matches!(protocol, "h2" | "h3") && self.protocol_support == ProtocolSupport::Http1Only {
            tracing::debug!(host = %self.hostname, %protocol, "host supports multiplexing");
            self.protocol_support = ProtocolSupport::Multiplexed;
        }
    }

    pub(crate) fn pool_mut(
        &mut self,
        address: &HostAddress,
        limits: PoolLimits,
    ) -> &mut VariantPool {
        let cap = match self.protocol_support {
            ProtocolSupport::Multiplexed => limits.multiplexed,
            ProtocolSupport::Http1Only => limits.per_variant,
        };
        self.pools
            .entry(address.clone())
            .or_insert_with(|| VariantPool::new(address.clone(), cap))
    }

    pub fn pool(&self, address: &HostAddress) -> Option<&VariantPool> {
        self.pools.get(address)
    }

    pub fn pools(&self) -> impl Iterator<Item = &VariantPool> {
        self.pools.values()
    }

    pub(crate) fn pools_mut(&mut self) -> impl Iterator<Item = &mut VariantPool> {
        self.pools.values_mut()
    }

    pub(crate) fn prune_empty_pools(&mut self) {
        self.pools.retain(|_, pool| !pool.is_drained());
    }

    /// Encode the persisted per-host metadata blob. Only capability data —
    /// never connection state.
    pub(crate) fn encode_metadata(&self) -> Vec<u8> {
        let mut blob = BytesMut::with_capacity(2);
        blob.put_u8(METADATA_VERSION);
        blob.put_u8(match self.protocol_support {
            ProtocolSupport::Http1Only => 0,
            ProtocolSupport::Multiplexed => 1,
        });
        blob.to_vec()
    }

    pub(crate) fn decode_metadata(&mut self, mut blob: &[u8]) -> Result<(), SnapshotError> {
        if blob.remaining() < 2 {
            return Err(SnapshotError::Truncated);
        }
        let version = blob.get_u8();
        if version != METADATA_VERSION {
            return Err(SnapshotError::UnsupportedVersion(i32::from(version)));
        }
        self.protocol_support = match blob.get_u8() {
            0 => ProtocolSupport::Http1Only,
            1 => ProtocolSupport::Multiplexed,
            other => return Err(SnapshotError::InvalidValue(other)),
        };
        Ok(())
    }
}
