//! Module dedicated to virtual folder synchronization hunk.
//!
//! The core structure of the module is the [`VFolderSyncHunk`], which
//! represents a change in a patch.

use std::fmt;

use crate::vault::{SourceId, VirtualId};

/// The virtual folder synchronization hunk.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VFolderSyncHunk {
    /// The given source message needs to be filtered, then mirrored
    /// into the virtual folder if it matches.
    Add(SourceId),

    /// The given virtual message needs to be deleted, since its
    /// source message does not exist anymore.
    Remove(VirtualId, SourceId),
}

impl fmt::Display for VFolderSyncHunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add(sid) => write!(f, "Adding source message {sid}"),
            Self::Remove(vid, sid) => {
                write!(f, "Removing message {vid} mirroring source message {sid}")
            }
        }
    }
}

impl VFolderSyncHunk {
    pub fn source_id(&self) -> SourceId {
        match self {
            Self::Add(sid) => *sid,
            Self::Remove(_, sid) => *sid,
        }
    }

    pub fn is_add(&self) -> bool {
        matches!(self, Self::Add(_))
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, Self::Remove(..))
    }
}
