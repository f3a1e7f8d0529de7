use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
};

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::AnyResult;

use super::Storage;

/// The in-memory folder handle, wrapping the folder identifier.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MemoryFolder(String);

impl MemoryFolder {
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// The number of calls received by a [`MemoryStorage`], per
/// operation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StorageCalls {
    pub scan: usize,
    pub list: usize,
    pub peek: usize,
    pub fetch: usize,
    pub store: usize,
    pub delete: usize,
}

impl StorageCalls {
    /// Returns the number of calls reading or writing messages.
    pub fn message_ops(&self) -> usize {
        self.peek + self.fetch + self.store + self.delete
    }
}

#[derive(Debug, Default)]
struct MemoryFolderState {
    messages: BTreeMap<u32, Vec<u8>>,
    last_num: u32,
    modified: Option<DateTime<Utc>>,
}

impl MemoryFolderState {
    fn push(&mut self, raw: Vec<u8>) -> u32 {
        self.last_num += 1;
        self.messages.insert(self.last_num, raw);
        self.touch();
        self.last_num
    }

    fn touch(&mut self) {
        self.modified = Some(Utc::now());
    }
}

#[derive(Debug, Default)]
struct Failures {
    stores: usize,
    deletes: HashSet<(String, u32)>,
    lists: HashSet<String>,
}

/// The in-memory storage.
///
/// Messages are kept in memory and numbered per folder, in increasing
/// order, without reuse. Calls are counted and failures can be
/// injected, which makes this storage handy for testing.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    folders: RefCell<HashMap<String, MemoryFolderState>>,
    calls: RefCell<StorageCalls>,
    failures: RefCell<Failures>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an empty folder, as the host would.
    pub fn add_folder(&self, id: impl ToString) -> MemoryFolder {
        let id = id.to_string();
        self.folders.borrow_mut().entry(id.clone()).or_default();
        MemoryFolder(id)
    }

    /// Removes a folder and its messages, as the host would.
    pub fn remove_folder(&self, id: &str) -> bool {
        self.folders.borrow_mut().remove(id).is_some()
    }

    /// Renames a folder, as the host would.
    pub fn rename_folder(&self, from: &str, to: impl ToString) -> bool {
        let mut folders = self.folders.borrow_mut();
        match folders.remove(from) {
            Some(state) => {
                folders.insert(to.to_string(), state);
                true
            }
            None => false,
        }
    }

    /// Adds a message to a folder, as the host would. Returns its
    /// number, or `None` if the folder does not exist.
    pub fn add_message(&self, folder: &str, raw: impl Into<Vec<u8>>) -> Option<u32> {
        let mut folders = self.folders.borrow_mut();
        Some(folders.get_mut(folder)?.push(raw.into()))
    }

    /// Removes a message from a folder, as the host would.
    pub fn remove_message(&self, folder: &str, id: u32) -> bool {
        let mut folders = self.folders.borrow_mut();
        let Some(state) = folders.get_mut(folder) else {
            return false;
        };
        let removed = state.messages.remove(&id).is_some();
        state.touch();
        removed
    }

    /// Gives a new number to an existing message, as the host would
    /// after a folder compaction. Returns the new number.
    pub fn renumber_message(&self, folder: &str, id: u32) -> Option<u32> {
        let mut folders = self.folders.borrow_mut();
        let state = folders.get_mut(folder)?;
        let raw = state.messages.remove(&id)?;
        Some(state.push(raw))
    }

    /// Returns a copy of the messages of the given folder.
    pub fn messages(&self, folder: &str) -> BTreeMap<u32, Vec<u8>> {
        self.folders
            .borrow()
            .get(folder)
            .map(|state| state.messages.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> StorageCalls {
        *self.calls.borrow()
    }

    pub fn reset_calls(&self) {
        *self.calls.borrow_mut() = StorageCalls::default();
    }

    /// Makes the next `n` message stores fail.
    pub fn fail_next_stores(&self, n: usize) {
        self.failures.borrow_mut().stores = n;
    }

    /// Makes every deletion of the given message fail.
    pub fn fail_deletes_of(&self, folder: impl ToString, id: u32) {
        self.failures
            .borrow_mut()
            .deletes
            .insert((folder.to_string(), id));
    }

    /// Makes every listing of the given folder fail.
    pub fn fail_lists_of(&self, folder: impl ToString) {
        self.failures.borrow_mut().lists.insert(folder.to_string());
    }

    pub fn clear_failures(&self) {
        *self.failures.borrow_mut() = Failures::default();
    }

    fn count(&self, f: impl FnOnce(&mut StorageCalls)) {
        f(&mut self.calls.borrow_mut())
    }

    fn with_folder<T>(
        &self,
        folder: &MemoryFolder,
        f: impl FnOnce(&mut MemoryFolderState) -> T,
    ) -> AnyResult<T> {
        let mut folders = self.folders.borrow_mut();
        let state = folders
            .get_mut(folder.id())
            .ok_or_else(|| format!("cannot find memory folder {}", folder.id()))?;
        Ok(f(state))
    }
}

impl Storage for MemoryStorage {
    type Folder = MemoryFolder;

    fn resolve_folder(&self, id: &str) -> Option<MemoryFolder> {
        self.folders
            .borrow()
            .contains_key(id)
            .then(|| MemoryFolder(id.to_owned()))
    }

    fn folder_identifier(&self, folder: &MemoryFolder) -> String {
        folder.0.clone()
    }

    fn create_folder(&self, id: &str) -> AnyResult<MemoryFolder> {
        if self.folders.borrow().contains_key(id) {
            return Err(format!("cannot create memory folder {id}: already exists").into());
        }

        Ok(self.add_folder(id))
    }

    fn delete_folder(&self, folder: &MemoryFolder) -> AnyResult<()> {
        if !self.remove_folder(folder.id()) {
            return Err(format!("cannot find memory folder {}", folder.id()).into());
        }

        Ok(())
    }

    fn scan_folder(&self, folder: &MemoryFolder) -> AnyResult<()> {
        self.count(|calls| calls.scan += 1);
        self.with_folder(folder, |_| ())
    }

    fn list_ids(&self, folder: &MemoryFolder) -> AnyResult<BTreeSet<u32>> {
        self.count(|calls| calls.list += 1);

        if self.failures.borrow().lists.contains(folder.id()) {
            return Err(format!("cannot list memory folder {}", folder.id()).into());
        }

        self.with_folder(folder, |state| state.messages.keys().copied().collect())
    }

    fn peek_headers(&self, folder: &MemoryFolder, id: u32) -> AnyResult<Option<Vec<u8>>> {
        self.count(|calls| calls.peek += 1);
        self.with_folder(folder, |state| {
            state.messages.get(&id).map(|raw| headers(raw).to_vec())
        })
    }

    fn fetch_message(&self, folder: &MemoryFolder, id: u32) -> AnyResult<Option<Vec<u8>>> {
        self.count(|calls| calls.fetch += 1);
        self.with_folder(folder, |state| state.messages.get(&id).cloned())
    }

    fn store_message(&self, folder: &MemoryFolder, raw: &[u8]) -> AnyResult<u32> {
        self.count(|calls| calls.store += 1);

        {
            let mut failures = self.failures.borrow_mut();
            if failures.stores > 0 {
                failures.stores -= 1;
                return Err(format!("cannot store message into memory folder {}", folder.id()).into());
            }
        }

        let id = self.with_folder(folder, |state| state.push(raw.to_vec()))?;
        trace!(folder = folder.id(), id, "stored memory message");
        Ok(id)
    }

    fn delete_message(&self, folder: &MemoryFolder, id: u32) -> AnyResult<bool> {
        self.count(|calls| calls.delete += 1);

        let key = (folder.id().to_owned(), id);
        if self.failures.borrow().deletes.contains(&key) {
            return Err(format!("cannot delete message {id} from memory folder {}", folder.id()).into());
        }

        self.with_folder(folder, |state| {
            let deleted = state.messages.remove(&id).is_some();
            if deleted {
                state.touch();
            }
            deleted
        })
    }

    fn last_modified(&self, folder: &MemoryFolder) -> Option<DateTime<Utc>> {
        self.folders.borrow().get(folder.id())?.modified
    }
}

/// Returns the header block of a raw message, blank line included.
fn headers(raw: &[u8]) -> &[u8] {
    let end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
        .or_else(|| raw.windows(2).position(|w| w == b"\n\n").map(|pos| pos + 2))
        .unwrap_or(raw.len());
    &raw[..end]
}

#[cfg(test)]
mod tests {
    use crate::Storage;

    use super::{headers, MemoryStorage};

    #[test]
    fn extract_headers() {
        assert_eq!(headers(b"Subject: a\r\n\r\nbody"), b"Subject: a\r\n\r\n");
        assert_eq!(headers(b"Subject: a\n\nbody"), b"Subject: a\n\n");
        assert_eq!(headers(b"Subject: a"), b"Subject: a");
    }

    #[test]
    fn never_reuse_numbers() {
        let storage = MemoryStorage::new();
        let inbox = storage.add_folder("inbox");

        assert_eq!(storage.store_message(&inbox, b"a").unwrap(), 1);
        assert_eq!(storage.store_message(&inbox, b"b").unwrap(), 2);
        assert!(storage.delete_message(&inbox, 2).unwrap());
        assert!(!storage.delete_message(&inbox, 2).unwrap());
        assert_eq!(storage.store_message(&inbox, b"c").unwrap(), 3);
        assert_eq!(storage.renumber_message("inbox", 1), Some(4));
        assert_eq!(storage.list_ids(&inbox).unwrap().into_iter().collect::<Vec<_>>(), [3, 4]);
        assert_eq!(storage.calls().store, 3);
    }

    #[test]
    fn inject_failures() {
        let storage = MemoryStorage::new();
        let inbox = storage.add_folder("inbox");
        storage.add_message("inbox", "a").unwrap();

        storage.fail_next_stores(1);
        assert!(storage.store_message(&inbox, b"b").is_err());
        assert!(storage.store_message(&inbox, b"b").is_ok());

        storage.fail_deletes_of("inbox", 1);
        assert!(storage.delete_message(&inbox, 1).is_err());
        storage.clear_failures();
        assert!(storage.delete_message(&inbox, 1).unwrap());
    }
}
