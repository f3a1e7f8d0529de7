//! # Config
//!
//! Module dedicated to the virtual folders configuration and to the
//! persistence of virtual folders properties.
//!
//! Every virtual folder persists its properties and its vault into
//! its own TOML document:
//!
//! ```toml
//! [vfolder]
//! filter = "*invoice*"
//! frozen = false
//! searchtype = 0
//! source_id = "inbox"
//! last_num = 3
//! 1 = 1
//! 3 = 3
//! ```
//!
//! Integer keys map virtual message numbers to source message
//! numbers. Before being overwritten, the previous document is kept
//! as a `.bak` sibling.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    filter::SearchScope,
    vault::{IdVault, VirtualId},
    Error, Result, VFolder,
};

/// The name of the document holding the properties of a virtual
/// folder.
pub const PROPS_FILE_NAME: &str = "vfolderrc";

/// The virtual folders configuration.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VFoldersConfig {
    /// The directory containing virtual folders properties.
    ///
    /// Each virtual folder gets its own sub-directory, named after
    /// the virtual folder, containing a `vfolderrc` document.
    pub rc_dir: PathBuf,
}

impl VFoldersConfig {
    pub fn new(rc_dir: impl Into<PathBuf>) -> Self {
        Self {
            rc_dir: rc_dir.into(),
        }
    }

    /// Builds a configuration using the default properties directory,
    /// see [`VFoldersConfig::find_default_rc_dir`].
    pub fn from_default_rc_dir() -> Option<Self> {
        Self::find_default_rc_dir().map(Self::new)
    }

    /// Returns `$XDG_CONFIG_HOME/vfolder`, or its equivalent on other
    /// platforms.
    pub fn find_default_rc_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vfolder"))
    }

    /// Returns the path of the properties document of the given
    /// virtual folder.
    pub fn props_path(&self, name: &str) -> PathBuf {
        self.rc_dir.join(name).join(PROPS_FILE_NAME)
    }
}

/// The editable properties of a virtual folder.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct VFolderConfig {
    /// The glob pattern messages need to match in order to be
    /// mirrored. An empty pattern means no filter: nothing is
    /// mirrored.
    pub filter: Option<String>,

    /// The message parts the pattern is tested against.
    pub search: SearchScope,

    /// Prevents automatic synchronization on source changes. Manual
    /// synchronization still works.
    pub frozen: bool,

    /// The identifier of the source folder.
    pub source: Option<String>,
}

impl VFolderConfig {
    pub fn new(source: impl ToString, filter: impl ToString) -> Self {
        Self {
            filter: Some(filter.to_string()),
            source: Some(source.to_string()),
            ..Default::default()
        }
    }

    pub fn with_search(mut self, search: SearchScope) -> Self {
        self.search = search;
        self
    }

    pub fn with_frozen(mut self, frozen: bool) -> Self {
        self.frozen = frozen;
        self
    }
}

/// The result of a properties read or write.
///
/// Persistence failures are reported through this code and never
/// abort the caller.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PropsResponse {
    Ok,
    /// No virtual folder or document location to operate on.
    NoTargetItem,
    /// The previous document could not be kept as a backup. The new
    /// document has been written anyway.
    BackupFailed,
    /// The document could not be serialized or written.
    SerializationFailed,
    /// The directory of the document could not be created.
    DirectoryCreationFailed,
    /// The document could not be parsed, default properties are used
    /// instead.
    UsedDefaults,
}

impl PropsResponse {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Self::BackupFailed | Self::UsedDefaults)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SerializationFailed | Self::DirectoryCreationFailed | Self::NoTargetItem
        )
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PropsDocument {
    vfolder: PropsSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PropsSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filter: Option<String>,
    #[serde(default)]
    frozen: bool,
    #[serde(default)]
    searchtype: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_id: Option<String>,
    #[serde(default)]
    last_num: VirtualId,
    #[serde(flatten)]
    ids: BTreeMap<String, i64>,
}

impl PropsSection {
    fn from_vfolder(vfolder: &VFolder) -> Self {
        Self {
            filter: vfolder.filter.clone(),
            frozen: vfolder.frozen,
            searchtype: vfolder.search.into(),
            source_id: vfolder.source.clone(),
            last_num: vfolder.last_num,
            ids: vfolder
                .vault
                .pairs()
                .into_iter()
                .map(|(vid, sid)| (vid.to_string(), i64::from(sid)))
                .collect(),
        }
    }

    fn vault(&self) -> IdVault {
        let pairs = self.ids.iter().filter_map(|(key, val)| {
            let vid = key.parse::<u32>().ok();
            let sid = u32::try_from(*val).ok();

            match (vid, sid) {
                (Some(vid), Some(sid)) => Some((vid, sid)),
                _ => {
                    warn!(key = key.as_str(), val = *val, "skipping invalid vault entry");
                    None
                }
            }
        });

        IdVault::from_pairs(pairs)
    }
}

/// Serializes the properties and the vault of the given virtual
/// folder into a TOML document.
pub fn to_toml_string(vfolder: &VFolder) -> Result<String> {
    let doc = PropsDocument {
        vfolder: PropsSection::from_vfolder(vfolder),
    };

    toml::to_string(&doc).map_err(Error::SerializePropsError)
}

/// Restores the properties and the vault of the given virtual folder
/// from a TOML document.
pub fn from_toml_str(vfolder: &mut VFolder, content: &str) -> Result<()> {
    let doc: PropsDocument = toml::from_str(content).map_err(Error::ParsePropsError)?;
    let section = doc.vfolder;

    vfolder.filter = section.filter.clone().filter(|f| !f.is_empty());
    vfolder.frozen = section.frozen;
    vfolder.search = SearchScope::from(section.searchtype);
    vfolder.source = section.source_id.clone();
    vfolder.reset_vault(section.vault(), section.last_num);

    Ok(())
}

fn reset_defaults(vfolder: &mut VFolder) {
    vfolder.filter = None;
    vfolder.frozen = false;
    vfolder.search = SearchScope::default();
    vfolder.source = None;
    vfolder.reset_vault(IdVault::default(), 0);
}

fn backup_path(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_string_lossy();
    Some(path.with_file_name(format!("{name}.bak")))
}

fn tmp_path(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_string_lossy();
    Some(path.with_file_name(format!(".{name}.tmp")))
}

#[cfg(unix)]
fn create_rc_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_rc_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

/// Writes the properties and the vault of the given virtual folder
/// to the given path.
///
/// Nothing is written if the virtual folder did not change since the
/// last read or write. The document is first written to a temporary
/// sibling, then the previous document is renamed with a `.bak`
/// extension, then the temporary document is moved in place.
pub fn write_props(vfolder: &mut VFolder, path: impl AsRef<Path>) -> PropsResponse {
    let path = path.as_ref();

    if !vfolder.is_changed() {
        return PropsResponse::Ok;
    }

    let (Some(dir), Some(tmp), Some(bak)) = (path.parent(), tmp_path(path), backup_path(path))
    else {
        warn!(?path, "invalid vfolder properties path");
        return PropsResponse::NoTargetItem;
    };

    let content = match to_toml_string(vfolder) {
        Ok(content) => content,
        Err(err) => {
            warn!(vfolder = vfolder.name(), "{err}");
            return PropsResponse::SerializationFailed;
        }
    };

    if !dir.as_os_str().is_empty() && !dir.is_dir() {
        if let Err(err) = create_rc_dir(dir) {
            warn!(?dir, "cannot create vfolder properties directory: {err}");
            return PropsResponse::DirectoryCreationFailed;
        }
    }

    if let Err(err) = fs::write(&tmp, content) {
        warn!(?tmp, "cannot write vfolder properties: {err}");
        fs::remove_file(&tmp).ok();
        return PropsResponse::SerializationFailed;
    }

    let mut response = PropsResponse::Ok;

    if path.exists() {
        if let Err(err) = fs::rename(path, &bak) {
            warn!(?bak, "cannot back up vfolder properties: {err}");
            response = PropsResponse::BackupFailed;
        }
    }

    if let Err(err) = fs::rename(&tmp, path) {
        warn!(?path, "cannot move vfolder properties in place: {err}");
        fs::remove_file(&tmp).ok();
        return PropsResponse::SerializationFailed;
    }

    vfolder.mark_saved();
    debug!(vfolder = vfolder.name(), ?path, "wrote vfolder properties");
    response
}

/// Reads the properties and the vault of the given virtual folder
/// from the given path.
///
/// Nothing is read if the virtual folder did not change since the
/// last read or write. A missing document leaves the virtual folder
/// untouched, an unparsable one resets it to its defaults.
pub fn read_props(vfolder: &mut VFolder, path: impl AsRef<Path>) -> PropsResponse {
    let path = path.as_ref();

    if !vfolder.is_changed() {
        return PropsResponse::Ok;
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(vfolder = vfolder.name(), ?path, "no vfolder properties found");
            return PropsResponse::Ok;
        }
        Err(err) => {
            warn!(?path, "cannot read vfolder properties, using defaults: {err}");
            reset_defaults(vfolder);
            return PropsResponse::UsedDefaults;
        }
    };

    if let Err(err) = from_toml_str(vfolder, &content) {
        warn!(?path, "{err}, using defaults");
        reset_defaults(vfolder);
        return PropsResponse::UsedDefaults;
    }

    vfolder.mark_saved();
    debug!(vfolder = vfolder.name(), ?path, "read vfolder properties");
    PropsResponse::Ok
}

#[cfg(test)]
mod tests {
    use crate::{filter::SearchScope, VFolder};

    use super::{from_toml_str, to_toml_string, PropsResponse};

    #[test]
    fn parse_document() {
        let mut vfolder = VFolder::new("invoices");
        let content = concat!(
            "[vfolder]\n",
            "filter = \"*invoice*\"\n",
            "frozen = true\n",
            "searchtype = 2\n",
            "source_id = \"inbox\"\n",
            "last_num = 7\n",
            "1 = 1\n",
            "3 = 3\n",
            "0 = 4\n",
            "5 = -1\n",
        );

        from_toml_str(&mut vfolder, content).unwrap();

        assert_eq!(vfolder.filter(), Some("*invoice*"));
        assert!(vfolder.is_frozen());
        assert_eq!(vfolder.search(), SearchScope::Both);
        assert_eq!(vfolder.source(), Some("inbox"));
        assert_eq!(vfolder.vault().pairs(), vec![(1, 1), (3, 3)]);
        assert_eq!(vfolder.last_num(), 7);
    }

    #[test]
    fn restore_last_num_from_pairs() {
        let mut vfolder = VFolder::new("invoices");
        from_toml_str(&mut vfolder, "[vfolder]\n9 = 2\n").unwrap();
        assert_eq!(vfolder.last_num(), 9);
        assert_eq!(vfolder.filter(), None);
        assert_eq!(vfolder.search(), SearchScope::Headers);
    }

    #[test]
    fn reject_invalid_documents() {
        let mut vfolder = VFolder::new("invoices");
        assert!(from_toml_str(&mut vfolder, "[vfolder]\ncolor = \"red\"\n").is_err());
        assert!(from_toml_str(&mut vfolder, "[vfolder]\nfrozen = 3\n").is_err());
        assert!(from_toml_str(&mut vfolder, "not toml at all").is_err());
    }

    #[test]
    fn serialize_document() {
        let mut vfolder = VFolder::new("invoices");
        vfolder.set_filter(Some("*invoice*"));
        vfolder.set_source(Some("inbox"));
        vfolder.record_mirror(1, 1);
        vfolder.record_mirror(3, 3);

        let content = to_toml_string(&vfolder).unwrap();
        assert!(content.contains("[vfolder]"));
        assert!(content.contains("filter = \"*invoice*\""));
        assert!(content.contains("searchtype = 0"));
        assert!(content.contains("source_id = \"inbox\""));
        assert!(content.contains("last_num = 3"));

        let mut restored = VFolder::new("invoices");
        from_toml_str(&mut restored, &content).unwrap();
        assert_eq!(restored.config(), vfolder.config());
        assert_eq!(restored.vault(), vfolder.vault());
    }

    #[test]
    fn classify_responses() {
        assert!(PropsResponse::Ok.is_ok());
        assert!(PropsResponse::BackupFailed.is_warning());
        assert!(PropsResponse::UsedDefaults.is_warning());
        assert!(!PropsResponse::UsedDefaults.is_fatal());
        assert!(PropsResponse::SerializationFailed.is_fatal());
        assert!(PropsResponse::DirectoryCreationFailed.is_fatal());
        assert!(PropsResponse::NoTargetItem.is_fatal());
    }
}
