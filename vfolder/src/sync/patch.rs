//! Module dedicated to virtual folder synchronization patch.
//!
//! The core structure of the module is the [`VFolderSyncPatch`],
//! which represents a list of changes (hunks).

use std::collections::BTreeSet;

use crate::vault::{IdVault, SourceId};

use super::VFolderSyncHunk;

/// A virtual folder synchronization patch is just a list of virtual
/// folder synchronization hunks (changes).
pub type VFolderSyncPatch = Vec<VFolderSyncHunk>;

/// Virtual folder synchronization patch builder.
///
/// Contains the core diff of the virtual folder synchronization. It
/// has been exported in a dedicated function so that it can be easily
/// tested.
///
/// Additions come first, in source listing order, then removals, in
/// virtual id order. Source messages already rejected by the filter
/// are not candidates.
pub fn build(
    listing: &BTreeSet<SourceId>,
    vault: &IdVault,
    rejected: &BTreeSet<SourceId>,
) -> VFolderSyncPatch {
    let adds = listing
        .iter()
        .filter(|sid| !vault.contains_source(**sid) && !rejected.contains(sid))
        .map(|sid| VFolderSyncHunk::Add(*sid));

    let removes = vault
        .pairs()
        .into_iter()
        .filter(|(_, sid)| !listing.contains(sid))
        .map(|(vid, sid)| VFolderSyncHunk::Remove(vid, sid));

    adds.chain(removes).collect()
}
