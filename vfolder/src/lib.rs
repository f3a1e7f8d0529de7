//! Rust library to maintain virtual folders.
//!
//! A virtual folder is a materialized, filtered copy of a source mail
//! folder. Messages of the source matching a glob pattern are copied
//! into the virtual folder, and removed from it once they disappear
//! from the source. The link between both sides is kept by an
//! [`IdVault`], persisted next to the virtual folder properties.
//!
//! The [`VFolders`] engine owns the virtual folders and reacts to the
//! events of the host (see [`HostEvent`]). Messages and folders are
//! accessed through the [`Storage`] trait. An MH based implementation
//! is shipped with the library:
//!
//! ```rust,no_run
//! use vfolder::{MhdirStorage, VFolderConfig, VFolders, VFoldersConfig};
//!
//! let storage = MhdirStorage::new("/home/me/Mail");
//! let config = VFoldersConfig::new("/home/me/.config/vfolder");
//!
//! let mut vfolders = VFolders::new(config, storage);
//! vfolders.init().unwrap();
//!
//! let report = vfolders
//!     .create("invoices", VFolderConfig::new("inbox", "*invoice*"))
//!     .unwrap();
//! println!("{} messages mirrored", report.added());
//!
//! vfolders.shutdown();
//! ```

pub mod config;
mod error;
pub mod filter;
pub mod registry;
pub mod storage;
pub mod sync;
pub mod vault;
mod vfolder;
mod vfolders;

#[doc(inline)]
pub use crate::{
    config::{PropsResponse, VFolderConfig, VFoldersConfig},
    error::{AnyBoxedError, AnyResult, Error, ErrorKind, Result},
    filter::{FilterBuilder, FilterStrategy, GlobFilter, SearchScope},
    registry::Registry,
    storage::{MemoryStorage, MhdirStorage, Storage},
    sync::{VFolderSyncHunk, VFolderSyncOutcome, VFolderSyncReport},
    vault::{IdVault, VaultId},
    vfolder::VFolder,
    vfolders::{HostEvent, VFolders},
};
