//! # Identifier vault
//!
//! Module dedicated to the bidirectional mapping between the message
//! numbers of a source folder and the message numbers of the virtual
//! folder mirroring it. The core structure of the module is the
//! [`IdVault`].

use std::collections::HashMap;

use tracing::{trace, warn};

/// Alias for a message number of the source folder.
pub type SourceId = u32;

/// Alias for a message number of the virtual folder.
pub type VirtualId = u32;

/// The side of the vault an identifier belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VaultId {
    Source(SourceId),
    Virtual(VirtualId),
}

/// The identifier vault.
///
/// Both maps are kept exact inverses of each other: every source id
/// maps to exactly one virtual id and back. Any operation breaking
/// that relation is a programming error and panics.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IdVault {
    source_to_virtual: HashMap<SourceId, VirtualId>,
    virtual_to_source: HashMap<VirtualId, SourceId>,
}

impl IdVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a vault from `(virtual_id, source_id)` pairs.
    ///
    /// Pairs containing a zero id or an id already restored by a
    /// previous pair are skipped.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (VirtualId, SourceId)>) -> Self {
        let mut vault = Self::new();

        for (vid, sid) in pairs {
            if vid == 0 || sid == 0 {
                warn!(vid, sid, "skipping vault pair with invalid id");
                continue;
            }

            if vault.contains_virtual(vid) || vault.contains_source(sid) {
                warn!(vid, sid, "skipping vault pair colliding with a restored one");
                continue;
            }

            vault.insert(sid, vid);
        }

        vault
    }

    pub fn get_virtual(&self, sid: SourceId) -> Option<VirtualId> {
        self.source_to_virtual.get(&sid).copied()
    }

    pub fn get_source(&self, vid: VirtualId) -> Option<SourceId> {
        self.virtual_to_source.get(&vid).copied()
    }

    pub fn contains_source(&self, sid: SourceId) -> bool {
        self.source_to_virtual.contains_key(&sid)
    }

    pub fn contains_virtual(&self, vid: VirtualId) -> bool {
        self.virtual_to_source.contains_key(&vid)
    }

    /// Maps the given source id to the given virtual id.
    ///
    /// Stale pairs sharing one of the two ids are dropped first.
    /// Inserting an identical pair twice is a no-op.
    pub fn insert(&mut self, sid: SourceId, vid: VirtualId) {
        assert!(sid != 0, "source id must not be zero");
        assert!(vid != 0, "virtual id must not be zero");

        if self.get_virtual(sid) == Some(vid) {
            return;
        }

        if let Some(stale_vid) = self.source_to_virtual.remove(&sid) {
            trace!(sid, stale_vid, "dropping stale source mapping");
            self.virtual_to_source.remove(&stale_vid);
        }

        if let Some(stale_sid) = self.virtual_to_source.remove(&vid) {
            trace!(vid, stale_sid, "dropping stale virtual mapping");
            self.source_to_virtual.remove(&stale_sid);
        }

        self.source_to_virtual.insert(sid, vid);
        self.virtual_to_source.insert(vid, sid);
        self.assert_bijection();
    }

    /// Removes the pair matching the given id from both maps.
    ///
    /// Returns the removed pair as `(virtual_id, source_id)`.
    pub fn remove(&mut self, id: VaultId) -> Option<(VirtualId, SourceId)> {
        let pair = match id {
            VaultId::Source(sid) => {
                let vid = self.source_to_virtual.remove(&sid)?;
                let removed = self.virtual_to_source.remove(&vid);
                assert_eq!(removed, Some(sid), "vault maps out of sync");
                (vid, sid)
            }
            VaultId::Virtual(vid) => {
                let sid = self.virtual_to_source.remove(&vid)?;
                let removed = self.source_to_virtual.remove(&sid);
                assert_eq!(removed, Some(vid), "vault maps out of sync");
                (vid, sid)
            }
        };

        self.assert_bijection();
        Some(pair)
    }

    /// Returns all pairs as `(virtual_id, source_id)`, sorted by
    /// virtual id.
    pub fn pairs(&self) -> Vec<(VirtualId, SourceId)> {
        let mut pairs: Vec<_> = self
            .virtual_to_source
            .iter()
            .map(|(vid, sid)| (*vid, *sid))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    /// Returns the greatest virtual id of the vault, if any.
    pub fn max_virtual(&self) -> Option<VirtualId> {
        self.virtual_to_source.keys().max().copied()
    }

    pub fn len(&self) -> usize {
        self.source_to_virtual.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_to_virtual.is_empty()
    }

    pub fn clear(&mut self) {
        self.source_to_virtual.clear();
        self.virtual_to_source.clear();
    }

    fn assert_bijection(&self) {
        assert_eq!(
            self.source_to_virtual.len(),
            self.virtual_to_source.len(),
            "vault maps out of sync"
        );
    }
}
