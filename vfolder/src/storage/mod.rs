//! # Storage
//!
//! Module dedicated to the storage collaborator. Virtual folders
//! never touch messages directly: every folder and message operation
//! goes through the [`Storage`] trait, implemented by the host.
//!
//! Two implementations are shipped: the [`MhdirStorage`], backed by
//! MH folders on the file system, and the [`MemoryStorage`], mostly
//! useful for testing.

mod memory;
mod mhdir;

use std::{collections::BTreeSet, fmt};

use chrono::{DateTime, Utc};

use crate::AnyResult;

#[doc(inline)]
pub use self::{
    memory::{MemoryFolder, MemoryStorage, StorageCalls},
    mhdir::MhdirStorage,
};

/// The storage collaborator.
///
/// Folders are designated by a stable textual identifier. Messages
/// are designated by a positive number, unique inside their folder.
pub trait Storage {
    /// The resolved folder handle.
    type Folder: Clone + fmt::Debug;

    /// Resolves the folder matching the given identifier.
    fn resolve_folder(&self, id: &str) -> Option<Self::Folder>;

    /// Returns the stable identifier of the given folder.
    fn folder_identifier(&self, folder: &Self::Folder) -> String;

    /// Creates a new folder with the given identifier.
    fn create_folder(&self, id: &str) -> AnyResult<Self::Folder>;

    /// Deletes the given folder and all its messages.
    fn delete_folder(&self, folder: &Self::Folder) -> AnyResult<()>;

    /// Refreshes the storage view of the given folder.
    fn scan_folder(&self, _folder: &Self::Folder) -> AnyResult<()> {
        Ok(())
    }

    /// Lists the message numbers of the given folder.
    fn list_ids(&self, folder: &Self::Folder) -> AnyResult<BTreeSet<u32>>;

    /// Returns the header block of the given message, or `None` if
    /// the message does not exist.
    ///
    /// Defaults to the whole message.
    fn peek_headers(&self, folder: &Self::Folder, id: u32) -> AnyResult<Option<Vec<u8>>> {
        self.fetch_message(folder, id)
    }

    /// Returns the given raw message, or `None` if the message does
    /// not exist.
    fn fetch_message(&self, folder: &Self::Folder, id: u32) -> AnyResult<Option<Vec<u8>>>;

    /// Stores the given raw message as a new message of the folder,
    /// and returns its number.
    ///
    /// Numbers must be assigned in increasing order and never reused.
    fn store_message(&self, folder: &Self::Folder, raw: &[u8]) -> AnyResult<u32>;

    /// Deletes the given message. Returns `false` if the message did
    /// not exist.
    fn delete_message(&self, folder: &Self::Folder, id: u32) -> AnyResult<bool>;

    /// Returns the last time the folder content changed, if known.
    fn last_modified(&self, _folder: &Self::Folder) -> Option<DateTime<Utc>> {
        None
    }
}
