//! # Error
//!
//! Module dedicated to vfolder errors. It contains an [`Error`] enum
//! based on [`thiserror::Error`], a type alias [`Result`] and the
//! boxed error type used by the storage collaborator.

use std::{error, io, path::PathBuf, result};

use thiserror::Error;

/// The boxed error returned by storage collaborators.
///
/// The storage is provided by the host, its errors are not known at
/// compilation time and cannot be placed in a generic due to the
/// object-safe trait constraint.
pub type AnyBoxedError = Box<dyn error::Error + Send + Sync + 'static>;

/// The `Result` alias returned by storage collaborators.
pub type AnyResult<T> = result::Result<T, AnyBoxedError>;

/// The global `Result` alias of the library.
pub type Result<T> = result::Result<T, Error>;

/// The broad category an [`Error`] belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// A resolved target vanished: unresolved source folder, missing
    /// message, unknown vfolder.
    NotFound,
    /// A storage or file system operation failed.
    IoFailure,
    /// A document or a pattern could not be parsed.
    ParseFailure,
    /// A sync pass is already running for the vfolder.
    ReentrancyBlocked,
    /// The caller supplied an unusable value.
    InvalidInput,
}

/// The global `Error` enum of the library.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot find vfolder {0}")]
    VFolderNotFoundError(String),
    #[error("cannot resolve folder of vfolder {0}")]
    ResolveVFolderError(String),
    #[error("cannot find source folder {0}")]
    SourceNotFoundError(String),
    #[error("cannot find message {0} in folder {1}")]
    MessageNotFoundError(u32, String),

    #[error("cannot create vfolder {0}: name already used")]
    VFolderAlreadyExistsError(String),
    #[error("cannot create vfolder from vfolder {0}")]
    SourceIsVFolderError(String),
    #[error("cannot use invalid vfolder name {0:?}")]
    InvalidVFolderNameError(String),
    #[error("cannot create vfolder {0}: nested with vfolder {1}")]
    NestedVFolderError(String, String),
    #[error("cannot compile filter pattern {1:?}")]
    CompileFilterError(#[source] regex::Error, String),

    #[error("cannot edit vfolder {0}: a sync is in progress")]
    SyncInProgressError(String),

    #[error("cannot create folder of vfolder {1}")]
    CreateVFolderError(#[source] AnyBoxedError, String),
    #[error("cannot delete folder of vfolder {1}")]
    DeleteVFolderError(#[source] AnyBoxedError, String),
    #[error("cannot scan source folder {1}")]
    ScanSourceError(#[source] AnyBoxedError, String),
    #[error("cannot list messages of folder {1}")]
    ListIdsError(#[source] AnyBoxedError, String),
    #[error("cannot fetch message {1} from folder {2}")]
    FetchMessageError(#[source] AnyBoxedError, u32, String),
    #[error("cannot store message {1} into vfolder {2}")]
    StoreMessageError(#[source] AnyBoxedError, u32, String),
    #[error("cannot store message {0} into vfolder {1}: number {2} was already assigned")]
    ReusedMessageNumberError(u32, String, u32),
    #[error("cannot delete message {1} from vfolder {2}")]
    DeleteMessageError(#[source] AnyBoxedError, u32, String),

    #[error("cannot parse vfolder properties")]
    ParsePropsError(#[source] toml::de::Error),
    #[error("cannot serialize vfolder properties")]
    SerializePropsError(#[source] toml::ser::Error),
    #[error("cannot delete vfolder properties at {1}")]
    DeletePropsError(#[source] io::Error, PathBuf),
    #[error("cannot walk vfolder properties directory {1}")]
    WalkRcDirError(#[source] walkdir::Error, PathBuf),
}

impl Error {
    /// Returns the category of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::VFolderNotFoundError(_)
            | Self::ResolveVFolderError(_)
            | Self::SourceNotFoundError(_)
            | Self::MessageNotFoundError(..) => ErrorKind::NotFound,
            Self::VFolderAlreadyExistsError(_)
            | Self::SourceIsVFolderError(_)
            | Self::InvalidVFolderNameError(_)
            | Self::NestedVFolderError(..) => ErrorKind::InvalidInput,
            Self::CompileFilterError(..) | Self::ParsePropsError(_) => ErrorKind::ParseFailure,
            Self::SyncInProgressError(_) => ErrorKind::ReentrancyBlocked,
            Self::CreateVFolderError(..)
            | Self::DeleteVFolderError(..)
            | Self::ScanSourceError(..)
            | Self::ListIdsError(..)
            | Self::FetchMessageError(..)
            | Self::StoreMessageError(..)
            | Self::ReusedMessageNumberError(..)
            | Self::DeleteMessageError(..)
            | Self::SerializePropsError(_)
            | Self::DeletePropsError(..)
            | Self::WalkRcDirError(..) => ErrorKind::IoFailure,
        }
    }
}
