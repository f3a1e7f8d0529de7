//! # Virtual folder
//!
//! Module dedicated to the virtual folder state. The core structure
//! of the module is the [`VFolder`].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::{
    config::VFolderConfig,
    filter::SearchScope,
    vault::{IdVault, SourceId, VaultId, VirtualId},
};

/// The virtual folder.
///
/// A virtual folder is a materialized, filtered copy of a source
/// folder. It owns the [`IdVault`] linking its messages to the source
/// ones.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VFolder {
    pub(crate) name: String,
    pub(crate) filter: Option<String>,
    pub(crate) search: SearchScope,
    pub(crate) frozen: bool,
    pub(crate) updating: bool,
    pub(crate) changed: bool,
    pub(crate) source: Option<String>,
    pub(crate) vault: IdVault,
    pub(crate) last_num: VirtualId,
    pub(crate) last_sync: Option<DateTime<Utc>>,
    pub(crate) rejected: BTreeSet<SourceId>,
}

impl VFolder {
    /// Creates a new, empty virtual folder.
    ///
    /// The virtual folder starts dirty: its state has never been
    /// persisted.
    pub fn new(name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            filter: None,
            search: SearchScope::default(),
            frozen: false,
            updating: false,
            changed: true,
            source: None,
            vault: IdVault::default(),
            last_num: 0,
            last_sync: None,
            rejected: BTreeSet::new(),
        }
    }

    /// Creates a new virtual folder from the given properties.
    pub fn from_config(name: impl ToString, config: VFolderConfig) -> Self {
        let mut vfolder = Self::new(name);
        vfolder.filter = config.filter.filter(|f| !f.is_empty());
        vfolder.search = config.search;
        vfolder.frozen = config.frozen;
        vfolder.source = config.source;
        vfolder
    }

    /// Returns the editable properties of the virtual folder.
    pub fn config(&self) -> VFolderConfig {
        VFolderConfig {
            filter: self.filter.clone(),
            search: self.search,
            frozen: self.frozen,
            source: self.source.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn search(&self) -> SearchScope {
        self.search
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn is_updating(&self) -> bool {
        self.updating
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn vault(&self) -> &IdVault {
        &self.vault
    }

    /// Returns the greatest virtual message number ever assigned.
    pub fn last_num(&self) -> VirtualId {
        self.last_num
    }

    /// Returns the completion time of the last error-free sync pass.
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync
    }

    /// Returns the source messages rejected by the current filter.
    ///
    /// They are not candidates anymore until the filter, the search
    /// scope or the source changes. This set is not persisted.
    pub fn rejected(&self) -> &BTreeSet<SourceId> {
        &self.rejected
    }

    /// Sets the filter pattern. An empty pattern clears the filter.
    pub fn set_filter(&mut self, filter: Option<impl ToString>) {
        let filter = filter.map(|f| f.to_string()).filter(|f| !f.is_empty());
        if self.filter != filter {
            self.filter = filter;
            self.rejected.clear();
            self.changed = true;
        }
    }

    pub fn set_search(&mut self, search: SearchScope) {
        if self.search != search {
            self.search = search;
            self.rejected.clear();
            self.changed = true;
        }
    }

    pub fn set_frozen(&mut self, frozen: bool) {
        if self.frozen != frozen {
            self.frozen = frozen;
            self.changed = true;
        }
    }

    pub fn set_source(&mut self, source: Option<impl ToString>) {
        let source = source.map(|s| s.to_string());
        if self.source != source {
            self.source = source;
            self.rejected.clear();
            self.changed = true;
        }
    }

    /// Flags the in-memory state as different from the persisted one.
    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    pub(crate) fn mark_saved(&mut self) {
        self.changed = false;
    }

    /// Raises the re-entrancy guard. Returns `false` if it was
    /// already raised.
    pub(crate) fn begin_update(&mut self) -> bool {
        if self.updating {
            false
        } else {
            self.updating = true;
            true
        }
    }

    pub(crate) fn end_update(&mut self) {
        self.updating = false;
    }

    /// Records a freshly mirrored message.
    pub(crate) fn record_mirror(&mut self, sid: SourceId, vid: VirtualId) {
        self.vault.insert(sid, vid);
        self.last_num = self.last_num.max(vid);
        self.changed = true;
    }

    pub(crate) fn record_rejected(&mut self, sid: SourceId) {
        self.rejected.insert(sid);
    }

    /// Forgets a mirrored message. Returns the forgotten pair as
    /// `(virtual_id, source_id)`.
    pub(crate) fn forget_mirror(&mut self, id: VaultId) -> Option<(VirtualId, SourceId)> {
        let pair = self.vault.remove(id)?;
        self.changed = true;
        Some(pair)
    }

    pub(crate) fn reset_vault(&mut self, vault: IdVault, last_num: VirtualId) {
        self.rejected.clear();
        self.last_num = last_num.max(vault.max_virtual().unwrap_or_default());
        self.vault = vault;
    }
}
