//! Region snapshots and the builder updaters fill them through.
//!
//! An updater run produces a fresh [`Snapshot`] which is published with an
//! atomic pointer swap. Requests hold a reference to whichever snapshot was
//! current when they arrived, so a request observes either the pre-refresh
//! or the post-refresh state, never a mix.

use std::net::Ipv4Addr;
use std::sync::{Arc, RwLock};

use bytes::Bytes;

use crate::error::{Error, OidErrorKind, Result};
use crate::oid::{MAX_OID_LEN, Oid};
use crate::trie::{OidTrie, Range};
use crate::value::Value;

/// An immutable view of a region's bindings.
///
/// Keys are absolute OIDs (region root plus suffix).
#[derive(Debug)]
pub struct Snapshot {
    root: Oid,
    entries: OidTrie<Value>,
}

impl Snapshot {
    /// An empty snapshot for a region, served until the first refresh
    /// completes.
    pub fn empty(root: Oid) -> Self {
        Self {
            root,
            entries: OidTrie::new(),
        }
    }

    /// The region root this snapshot serves.
    pub fn root(&self) -> &Oid {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact lookup by absolute OID.
    pub fn get(&self, oid: &Oid) -> Option<&Value> {
        self.entries.get(oid)
    }

    /// Smallest bound key greater than `after` (or equal when `inclusive`).
    pub fn successor(&self, after: &Oid, inclusive: bool) -> Option<(Oid, &Value)> {
        self.entries.successor(after, inclusive)
    }

    /// Bindings with start <= key < end in ascending order.
    pub fn range(&self, start: &Oid, end: &Oid, inclusive_start: bool) -> Range<'_, Value> {
        self.entries.range(start, end, inclusive_start)
    }

    /// All bindings in ascending order.
    pub fn iter(&self) -> Range<'_, Value> {
        self.entries.iter()
    }
}

/// Mutable snapshot under construction, handed to an updater's `update`.
///
/// Every setter takes a suffix OID relative to the region root. The typed
/// setters construct the matching [`Value`] variant directly, so no runtime
/// type dispatch is involved.
///
/// # Examples
///
/// ```
/// use async_agentx::{SnapshotBuilder, oid};
///
/// let mut builder = SnapshotBuilder::new(oid!(1, 3, 6, 1, 4, 1, 12345));
/// builder.set_integer(&oid!(1, 0), 42).unwrap();
/// builder.set_octet_string(&oid!(2, 0), "hello").unwrap();
/// ```
#[derive(Debug)]
pub struct SnapshotBuilder {
    root: Oid,
    entries: OidTrie<Value>,
}

impl SnapshotBuilder {
    pub fn new(root: Oid) -> Self {
        Self {
            root,
            entries: OidTrie::new(),
        }
    }

    /// The region root the suffixes attach to.
    pub fn root(&self) -> &Oid {
        &self.root
    }

    /// Bind a value at root.suffix.
    ///
    /// Fails when the combined OID exceeds 128 subidentifiers or the value
    /// itself is unencodable (oversized octet string). Validation happens
    /// here so bad bindings never reach the wire.
    pub fn set(&mut self, suffix: &Oid, value: Value) -> Result<()> {
        let key = self.root.join(suffix);
        if key.len() > MAX_OID_LEN {
            return Err(Error::invalid_oid(OidErrorKind::TooManyComponents {
                count: key.len(),
                max: MAX_OID_LEN,
            }));
        }
        value.validate()?;
        self.entries.insert(key, value);
        Ok(())
    }

    pub fn set_integer(&mut self, suffix: &Oid, value: i32) -> Result<()> {
        self.set(suffix, Value::Integer(value))
    }

    pub fn set_octet_string(&mut self, suffix: &Oid, value: impl Into<Bytes>) -> Result<()> {
        self.set(suffix, Value::OctetString(value.into()))
    }

    pub fn set_null(&mut self, suffix: &Oid) -> Result<()> {
        self.set(suffix, Value::Null)
    }

    pub fn set_oid(&mut self, suffix: &Oid, value: Oid) -> Result<()> {
        self.set(suffix, Value::ObjectIdentifier(value))
    }

    pub fn set_ip_address(&mut self, suffix: &Oid, value: Ipv4Addr) -> Result<()> {
        self.set(suffix, Value::IpAddress(value.octets()))
    }

    pub fn set_counter32(&mut self, suffix: &Oid, value: u32) -> Result<()> {
        self.set(suffix, Value::Counter32(value))
    }

    pub fn set_gauge32(&mut self, suffix: &Oid, value: u32) -> Result<()> {
        self.set(suffix, Value::Gauge32(value))
    }

    pub fn set_time_ticks(&mut self, suffix: &Oid, value: u32) -> Result<()> {
        self.set(suffix, Value::TimeTicks(value))
    }

    pub fn set_opaque(&mut self, suffix: &Oid, value: impl Into<Bytes>) -> Result<()> {
        self.set(suffix, Value::Opaque(value.into()))
    }

    pub fn set_counter64(&mut self, suffix: &Oid, value: u64) -> Result<()> {
        self.set(suffix, Value::Counter64(value))
    }

    /// Number of bindings so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn build(self) -> Snapshot {
        Snapshot {
            root: self.root,
            entries: self.entries,
        }
    }
}

/// Publish-replace cell holding a region's current snapshot.
///
/// `load` clones the Arc under a read lock; `store` swaps the pointer under
/// a write lock. Both critical sections are a pointer operation, so readers
/// never observe a partially built snapshot.
#[derive(Debug)]
pub(crate) struct SnapshotCell {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotCell {
    pub(crate) fn new(root: Oid) -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::empty(root))),
        }
    }

    pub(crate) fn load(&self) -> Arc<Snapshot> {
        self.current.read().expect("snapshot lock poisoned").clone()
    }

    pub(crate) fn store(&self, snapshot: Arc<Snapshot>) {
        *self.current.write().expect("snapshot lock poisoned") = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    #[test]
    fn test_builder_typed_setters() {
        let root = oid!(1, 3, 6, 1, 4, 1, 12345);
        let mut builder = SnapshotBuilder::new(root.clone());
        builder.set_integer(&oid!(1, 0), 42).unwrap();
        builder.set_octet_string(&oid!(2, 0), "hello").unwrap();
        builder.set_counter64(&oid!(3, 0), u64::MAX).unwrap();
        builder
            .set_ip_address(&oid!(4, 0), Ipv4Addr::new(10, 0, 0, 1))
            .unwrap();

        let snapshot = builder.build();
        assert_eq!(snapshot.len(), 4);
        assert_eq!(
            snapshot.get(&root.join(&oid!(1, 0))),
            Some(&Value::Integer(42))
        );
        assert_eq!(
            snapshot.get(&root.join(&oid!(4, 0))),
            Some(&Value::IpAddress([10, 0, 0, 1]))
        );
    }

    #[test]
    fn test_builder_rejects_oversized_value() {
        let mut builder = SnapshotBuilder::new(oid!(1, 3, 6, 1, 4, 1, 12345));
        let huge = vec![0u8; crate::value::MAX_OCTET_STRING_LEN + 1];
        assert!(builder.set_octet_string(&oid!(1, 0), huge).is_err());
        assert!(builder.is_empty());
    }

    #[test]
    fn test_builder_rejects_overlong_key() {
        let root = Oid::new((0..120).map(|_| 1u32));
        let suffix = Oid::new((0..20).map(|_| 2u32));
        let mut builder = SnapshotBuilder::new(root);
        assert!(matches!(
            builder.set_integer(&suffix, 1),
            Err(Error::InvalidOid {
                kind: OidErrorKind::TooManyComponents { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_snapshot_successor() {
        let root = oid!(1, 3, 6, 1, 4, 1, 12345);
        let mut builder = SnapshotBuilder::new(root.clone());
        builder.set_integer(&oid!(1, 0), 1).unwrap();
        builder.set_integer(&oid!(2, 0), 2).unwrap();
        let snapshot = builder.build();

        let (next, _) = snapshot.successor(&root.join(&oid!(1, 0)), false).unwrap();
        assert_eq!(next, root.join(&oid!(2, 0)));
    }

    #[test]
    fn test_cell_publish_replace() {
        let root = oid!(1, 3, 6, 1, 4, 1, 12345);
        let cell = SnapshotCell::new(root.clone());
        assert!(cell.load().is_empty());

        // A reader holding the old snapshot keeps seeing it after a publish
        let before = cell.load();

        let mut builder = SnapshotBuilder::new(root.clone());
        builder.set_integer(&oid!(1, 0), 42).unwrap();
        cell.store(Arc::new(builder.build()));

        assert!(before.is_empty());
        assert_eq!(cell.load().len(), 1);
    }
}
