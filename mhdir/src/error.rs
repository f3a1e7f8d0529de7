use std::{io, path::PathBuf, result};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot find message {0}")]
    FindMessageError(u32),
    #[error("cannot read message {1} at {2}")]
    ReadMessageError(#[source] io::Error, u32, PathBuf),
    #[error("cannot store message into {1}")]
    StoreMessageError(#[source] io::Error, PathBuf),
    #[error("cannot delete message {1} at {2}")]
    DeleteMessageError(#[source] io::Error, u32, PathBuf),
    #[error("cannot parse last message number marker at {0}")]
    ParseLastNumError(PathBuf),
    #[error("cannot copy message to the same folder {0}")]
    CopyMessageSameFolderError(PathBuf),

    #[error(transparent)]
    IoError(#[from] io::Error),
}

pub type Result<T> = result::Result<T, Error>;
