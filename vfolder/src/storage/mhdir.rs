use std::{
    collections::BTreeSet,
    fs,
    path::{Component, Path, PathBuf},
};

use chrono::{DateTime, Utc};
use ::mhdir::Mhdir;
use tracing::{debug, trace};

use crate::AnyResult;

use super::Storage;

/// The MH storage.
///
/// Every folder is a MH folder living under the root directory.
/// Folder identifiers are paths relative to that root, using `/` as
/// separator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MhdirStorage {
    root_dir: PathBuf,
}

impl MhdirStorage {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn folder_path(&self, id: &str) -> Option<PathBuf> {
        let relative = Path::new(id);
        let valid = !id.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if valid {
            Some(self.root_dir.join(relative))
        } else {
            trace!(id, "invalid mh folder identifier");
            None
        }
    }
}

impl Storage for MhdirStorage {
    type Folder = Mhdir;

    fn resolve_folder(&self, id: &str) -> Option<Mhdir> {
        let mhdir = Mhdir::from(self.folder_path(id)?);
        mhdir.exists().then_some(mhdir)
    }

    fn folder_identifier(&self, folder: &Mhdir) -> String {
        let path = folder.path();
        let relative = path.strip_prefix(&self.root_dir).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn create_folder(&self, id: &str) -> AnyResult<Mhdir> {
        let path = self
            .folder_path(id)
            .ok_or_else(|| format!("cannot create mh folder with invalid identifier {id:?}"))?;
        let mhdir = Mhdir::from(path);
        mhdir.create_dirs()?;
        debug!(id, "created mh folder");
        Ok(mhdir)
    }

    fn delete_folder(&self, folder: &Mhdir) -> AnyResult<()> {
        fs::remove_dir_all(folder.path())?;
        debug!(path = ?folder.path(), "deleted mh folder");
        Ok(())
    }

    fn list_ids(&self, folder: &Mhdir) -> AnyResult<BTreeSet<u32>> {
        Ok(folder.list_ids()?)
    }

    fn peek_headers(&self, folder: &Mhdir, id: u32) -> AnyResult<Option<Vec<u8>>> {
        match folder.find(id) {
            Some(entry) => Ok(Some(entry.headers()?)),
            None => Ok(None),
        }
    }

    fn fetch_message(&self, folder: &Mhdir, id: u32) -> AnyResult<Option<Vec<u8>>> {
        match folder.find(id) {
            Some(entry) => Ok(Some(entry.body()?)),
            None => Ok(None),
        }
    }

    fn store_message(&self, folder: &Mhdir, raw: &[u8]) -> AnyResult<u32> {
        Ok(folder.store_new(raw)?)
    }

    fn delete_message(&self, folder: &Mhdir, id: u32) -> AnyResult<bool> {
        if !folder.contains(id) {
            return Ok(false);
        }

        folder.delete(id)?;
        Ok(true)
    }

    fn last_modified(&self, folder: &Mhdir) -> Option<DateTime<Utc>> {
        folder.modified().ok().map(DateTime::<Utc>::from)
    }
}
