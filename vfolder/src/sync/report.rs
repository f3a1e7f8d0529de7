//! Module dedicated to virtual folder synchronization reporting.
//!
//! The core structure of this module is the [`VFolderSyncReport`].

use crate::Error;

use super::VFolderSyncHunk;

/// The way a synchronization pass ended.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum VFolderSyncOutcome {
    /// The pass ran. Message errors, if any, are listed in the patch.
    #[default]
    Synced,

    /// Another pass was already in progress for the virtual folder,
    /// nothing was done.
    AlreadyUpdating,

    /// The virtual folder has no source, nothing was done.
    NoSource,

    /// The source folder could not be resolved, nothing was done.
    SourceUnresolved,
}

/// The virtual folder synchronization report.
#[derive(Debug, Default)]
pub struct VFolderSyncReport {
    /// The name of the synchronized virtual folder.
    pub vfolder: String,

    /// The way the pass ended.
    pub outcome: VFolderSyncOutcome,

    /// The number of source messages found during the pass.
    pub scanned: usize,

    /// The number of candidates rejected by the filter.
    pub filtered_out: usize,

    /// The list of processed hunks associated with an optional
    /// error. Candidates rejected by the filter are not listed.
    pub patch: Vec<(VFolderSyncHunk, Option<Error>)>,
}

impl VFolderSyncReport {
    pub fn new(vfolder: impl ToString) -> Self {
        Self {
            vfolder: vfolder.to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn with_outcome(mut self, outcome: VFolderSyncOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Returns `true` if no hunk failed.
    pub fn is_ok(&self) -> bool {
        self.patch.iter().all(|(_, err)| err.is_none())
    }

    /// Returns the failed hunks with their error.
    pub fn errors(&self) -> impl Iterator<Item = (&VFolderSyncHunk, &Error)> {
        self.patch
            .iter()
            .filter_map(|(hunk, err)| Some((hunk, err.as_ref()?)))
    }

    /// Returns the number of successfully mirrored messages.
    pub fn added(&self) -> usize {
        self.patch
            .iter()
            .filter(|(hunk, err)| hunk.is_add() && err.is_none())
            .count()
    }

    /// Returns the number of successfully removed messages.
    pub fn removed(&self) -> usize {
        self.patch
            .iter()
            .filter(|(hunk, err)| hunk.is_remove() && err.is_none())
            .count()
    }
}
