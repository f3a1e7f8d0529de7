//! Rust library to manipulate MH mail folders.
//!
//! An MH folder is a plain directory where every message is stored in
//! its own file, named after its decimal message number. Numbers are
//! assigned in increasing order: a new message always gets the number
//! following the last assigned one. The last assigned number is
//! recorded in a hidden marker file, so that numbers of deleted
//! messages are never handed out again.

mod error;

use std::{
    collections::BTreeSet,
    fs::{self, File, OpenOptions, ReadDir},
    io::{BufRead, BufReader, ErrorKind, Write},
    path::{Path, PathBuf},
    process,
    sync::atomic::{AtomicUsize, Ordering},
    time::SystemTime,
};

use tracing::{debug, trace, warn};

#[doc(inline)]
pub use crate::error::{Error, Result};

/// Name of the hidden file holding the last assigned message number.
pub const LAST_NUM_FILE: &str = ".mh_last";

static COUNTER: AtomicUsize = AtomicUsize::new(0);

/// This struct represents a single message inside the MH folder.
///
/// Creation of the struct does not load the content of the message
/// file into memory. Headers and body are read on demand.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MailEntry {
    num: u32,
    path: PathBuf,
}

impl MailEntry {
    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the header block of the message, including the empty
    /// line separating it from the body.
    pub fn headers(&self) -> Result<Vec<u8>> {
        read_headers(&self.path)
            .map_err(|err| Error::ReadMessageError(err, self.num, self.path.clone()))
    }

    /// Reads the whole message.
    pub fn body(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|err| Error::ReadMessageError(err, self.num, self.path.clone()))
    }
}

/// An iterator over the messages of a MH folder.
///
/// This iterator produces a `Result<MailEntry>`, which can be an
/// `Err` if an error was encountered while trying to read file system
/// properties on a particular entry. Files starting with a dot, non
/// numeric file names and directories are skipped. The order of the
/// entries is not specified.
pub struct MailEntries {
    path: PathBuf,
    readdir: Option<ReadDir>,
}

impl MailEntries {
    fn new(path: PathBuf) -> MailEntries {
        MailEntries {
            path,
            readdir: None,
        }
    }
}

impl Iterator for MailEntries {
    type Item = Result<MailEntry>;

    fn next(&mut self) -> Option<Result<MailEntry>> {
        if self.readdir.is_none() {
            self.readdir = match fs::read_dir(&self.path) {
                Err(_) => return None,
                Ok(v) => Some(v),
            };
        }

        let readdir = self.readdir.as_mut()?;

        loop {
            let entry = match readdir.next()? {
                Ok(entry) => entry,
                Err(err) => return Some(Err(err.into())),
            };

            let filename = entry.file_name();
            let Some(num) = filename.to_str().and_then(parse_message_num) else {
                continue;
            };

            match entry.file_type() {
                Ok(ft) if ft.is_file() => (),
                Ok(_) => continue,
                Err(err) => return Some(Err(err.into())),
            }

            return Some(Ok(MailEntry {
                num,
                path: entry.path(),
            }));
        }
    }
}

/// The main entry point for this library. This struct can be
/// instantiated from a path using the `from` implementations. The
/// path should point to the folder directory itself.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Mhdir {
    path: PathBuf,
}

impl Mhdir {
    /// Returns the path of the folder directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the folder directory exists.
    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    /// Creates the folder directory and its parents if they don't
    /// exist yet.
    pub fn create_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.path)?;
        Ok(())
    }

    /// Returns an iterator over the messages of the folder.
    pub fn list(&self) -> MailEntries {
        MailEntries::new(self.path.clone())
    }

    /// Returns the sorted set of message numbers of the folder.
    pub fn list_ids(&self) -> Result<BTreeSet<u32>> {
        self.list().map(|entry| Ok(entry?.num)).collect()
    }

    /// Returns the number of messages found inside the folder.
    pub fn count(&self) -> usize {
        self.list().filter(Result::is_ok).count()
    }

    fn message_path(&self, num: u32) -> PathBuf {
        self.path.join(num.to_string())
    }

    /// Tries to find the message with the given number.
    pub fn find(&self, num: u32) -> Option<MailEntry> {
        let path = self.message_path(num);
        if num > 0 && path.is_file() {
            Some(MailEntry { num, path })
        } else {
            None
        }
    }

    /// Returns true if a message with the given number exists.
    pub fn contains(&self, num: u32) -> bool {
        self.find(num).is_some()
    }

    /// Reads the whole message with the given number.
    pub fn read(&self, num: u32) -> Result<Vec<u8>> {
        self.find(num).ok_or(Error::FindMessageError(num))?.body()
    }

    /// Reads the header block of the message with the given number.
    pub fn read_headers(&self, num: u32) -> Result<Vec<u8>> {
        self.find(num).ok_or(Error::FindMessageError(num))?.headers()
    }

    fn read_last_num_marker(&self) -> Result<u32> {
        let path = self.path.join(LAST_NUM_FILE);
        match fs::read_to_string(&path) {
            Ok(content) => content
                .trim()
                .parse()
                .map_err(|_| Error::ParseLastNumError(path)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    fn write_last_num_marker(&self, num: u32) -> Result<()> {
        fs::write(self.path.join(LAST_NUM_FILE), num.to_string())?;
        Ok(())
    }

    /// Returns the last assigned message number.
    ///
    /// This is the greatest value between the recorded marker and the
    /// greatest message number currently present in the folder. It is
    /// 0 for a folder that never contained any message.
    pub fn last_num(&self) -> Result<u32> {
        let marker = self.read_last_num_marker()?;
        let listed = self.list_ids()?.last().copied().unwrap_or_default();
        Ok(marker.max(listed))
    }

    /// Returns the last modification time of the folder directory.
    ///
    /// The directory is modified whenever a message is added to or
    /// removed from the folder.
    pub fn modified(&self) -> Result<SystemTime> {
        Ok(fs::metadata(&self.path)?.modified()?)
    }

    /// Stores the given message data as a new message of the folder.
    /// Does not create the folder directory, so if in doubt call
    /// `create_dirs` before using `store_new`.
    ///
    /// Returns the number assigned to the new message.
    pub fn store_new(&self, data: &[u8]) -> Result<u32> {
        let pid = process::id();
        let mut tmppath = self.path.clone();

        let mut file;
        loop {
            let counter = COUNTER.fetch_add(1, Ordering::SeqCst);
            tmppath.push(format!(".tmp.{pid}.{counter}"));

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmppath)
            {
                Ok(f) => {
                    file = f;
                    break;
                }
                Err(err) => {
                    if err.kind() != ErrorKind::AlreadyExists {
                        return Err(Error::StoreMessageError(err, self.path.clone()));
                    }
                    tmppath.pop();
                }
            }
        }

        /// At this point, `file` is our new file at `tmppath`. If we
        /// leave the scope of this function prior to successfully
        /// moving the file to its final location, the temporary file
        /// needs to be removed.
        struct UnlinkOnError {
            path_to_unlink: Option<PathBuf>,
        }

        impl Drop for UnlinkOnError {
            fn drop(&mut self) {
                if let Some(path) = self.path_to_unlink.take() {
                    fs::remove_file(path).ok();
                }
            }
        }

        let mut unlink_guard = UnlinkOnError {
            path_to_unlink: Some(tmppath.clone()),
        };

        file.write_all(data)
            .and_then(|()| file.sync_all())
            .map_err(|err| Error::StoreMessageError(err, self.path.clone()))?;

        let mut num = self.last_num()? + 1;
        let mut newpath = self.message_path(num);
        while newpath.exists() {
            num += 1;
            newpath = self.message_path(num);
        }

        fs::rename(&tmppath, &newpath)
            .map_err(|err| Error::StoreMessageError(err, self.path.clone()))?;
        unlink_guard.path_to_unlink.take();

        if let Err(err) = self.write_last_num_marker(num) {
            warn!(folder = ?self.path, num, "cannot record last message number: {err}");
        }

        debug!(folder = ?self.path, num, "stored new message");
        Ok(num)
    }

    /// Copies a message from the current folder to the targeted
    /// folder. Returns the number assigned to the copy.
    pub fn copy_to(&self, num: u32, target: &Mhdir) -> Result<u32> {
        if self.path == target.path {
            return Err(Error::CopyMessageSameFolderError(target.path.clone()));
        }

        let data = self.read(num)?;
        target.store_new(&data)
    }

    /// Deletes the message with the given number. Returns an error if
    /// no message was found with the given number.
    pub fn delete(&self, num: u32) -> Result<()> {
        let entry = self.find(num).ok_or(Error::FindMessageError(num))?;
        fs::remove_file(entry.path())
            .map_err(|err| Error::DeleteMessageError(err, num, entry.path.clone()))?;
        trace!(folder = ?self.path, num, "deleted message");
        Ok(())
    }
}

impl From<PathBuf> for Mhdir {
    fn from(p: PathBuf) -> Mhdir {
        Mhdir { path: p }
    }
}

impl From<&Path> for Mhdir {
    fn from(p: &Path) -> Mhdir {
        Mhdir::from(p.to_path_buf())
    }
}

impl From<String> for Mhdir {
    fn from(s: String) -> Mhdir {
        Mhdir::from(PathBuf::from(s))
    }
}

impl<'a> From<&'a str> for Mhdir {
    fn from(s: &str) -> Mhdir {
        Mhdir::from(PathBuf::from(s))
    }
}

/// Parses a file name as a message number. Only plain, non-zero
/// decimal numbers are accepted.
fn parse_message_num(name: &str) -> Option<u32> {
    // a number is only ever written without leading zeros
    if name.starts_with('0') || name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    name.parse().ok()
}

fn read_headers(path: impl AsRef<Path>) -> std::io::Result<Vec<u8>> {
    let file = File::open(path.as_ref())?;
    let mut reader = BufReader::new(file);
    let mut buffer = Vec::<u8>::new();
    let mut headers = Vec::<u8>::new();

    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer)? {
            0 => {
                break;
            }
            1 if buffer[0] == b'\n' => {
                headers.push(b'\n');
                break;
            }
            2 if buffer[0] == b'\r' && buffer[1] == b'\n' => {
                headers.extend([b'\r', b'\n']);
                break;
            }
            _ => {
                headers.extend(&buffer);
            }
        }
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::parse_message_num;

    #[test]
    fn parse_message_numbers() {
        assert_eq!(parse_message_num("1"), Some(1));
        assert_eq!(parse_message_num("42"), Some(42));
        assert_eq!(parse_message_num("0042"), None);
        assert_eq!(parse_message_num("042"), None);
        assert_eq!(parse_message_num("0"), None);
        assert_eq!(parse_message_num(""), None);
        assert_eq!(parse_message_num(".mh_last"), None);
        assert_eq!(parse_message_num("12.bak"), None);
        assert_eq!(parse_message_num("-3"), None);
        assert_eq!(parse_message_num("99999999999"), None);
    }
}
