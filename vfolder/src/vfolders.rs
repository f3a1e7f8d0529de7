//! # Virtual folders engine
//!
//! Module dedicated to the virtual folders engine. The core structure
//! of the module is [`VFolders`], which owns the storage, the
//! [`Registry`] and every [`VFolder`]. It manages the virtual folders
//! lifecycle and reacts to the [`HostEvent`]s of the host.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs, io,
    path::{Component, Path},
};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{
    config::{read_props, write_props, PropsResponse, VFolderConfig, VFoldersConfig, PROPS_FILE_NAME},
    filter::{default_filter_builder, FilterBuilder},
    registry::Registry,
    sync::{self, VFolderSyncReport},
    vault::{SourceId, VirtualId},
    Error, Result, Storage, VFolder,
};

/// The events sent by the host whenever its folders change.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HostEvent {
    /// The content of the given folder changed.
    SourceChanged(String),
    /// The given folder has been renamed.
    SourceRenamed { from: String, to: String },
    /// The given folder has been removed.
    SourceRemoved(String),
    /// A message has been added to the given folder.
    SourceMessageAdded { folder: String, id: SourceId },
    /// A message has been deleted from the given folder.
    SourceMessageDeleted { folder: String, id: SourceId },
    /// The user deleted a message from the given virtual folder.
    VFolderMessageDeleted { vfolder: String, id: VirtualId },
}

/// The virtual folders engine.
pub struct VFolders<S: Storage> {
    config: VFoldersConfig,
    storage: S,
    registry: Registry,
    vfolders: BTreeMap<String, VFolder>,
    filter_builder: FilterBuilder,
}

impl<S: Storage> VFolders<S> {
    /// Creates an engine without any virtual folder. Call
    /// [`VFolders::init`] to restore the persisted ones.
    pub fn new(config: VFoldersConfig, storage: S) -> Self {
        Self {
            config,
            storage,
            registry: Registry::new(),
            vfolders: BTreeMap::new(),
            filter_builder: default_filter_builder(),
        }
    }

    /// Replaces the default glob filter builder.
    pub fn with_filter_builder(mut self, builder: FilterBuilder) -> Self {
        self.filter_builder = builder;
        self
    }

    pub fn config(&self) -> &VFoldersConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn get(&self, name: &str) -> Option<&VFolder> {
        self.vfolders.get(name)
    }

    /// Returns the virtual folders, in name order.
    pub fn vfolders(&self) -> impl Iterator<Item = &VFolder> {
        self.vfolders.values()
    }

    /// Returns `true` if the given folder is the folder of a virtual
    /// folder.
    pub fn is_vfolder(&self, id: &str) -> bool {
        self.vfolders.contains_key(id)
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut VFolder> {
        self.vfolders
            .get_mut(name)
            .ok_or_else(|| Error::VFolderNotFoundError(name.to_owned()))
    }

    /// Restores every virtual folder persisted in the properties
    /// directory.
    pub fn init(&mut self) -> Result<Vec<(String, PropsResponse)>> {
        let rc_dir = self.config.rc_dir.clone();
        let mut responses = Vec::new();

        if !rc_dir.is_dir() {
            debug!(?rc_dir, "no vfolder properties directory, nothing to restore");
            return Ok(responses);
        }

        let walker = WalkDir::new(&rc_dir)
            .min_depth(2)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()));

        for entry in walker {
            let entry = entry.map_err(|err| Error::WalkRcDirError(err, rc_dir.clone()))?;

            if !entry.file_type().is_file() || entry.file_name() != PROPS_FILE_NAME {
                continue;
            }

            let Some(name) = entry
                .path()
                .parent()
                .and_then(|dir| dir.strip_prefix(&rc_dir).ok())
                .map(path_to_name)
            else {
                continue;
            };

            let res = self.restore(&name);
            responses.push((name, res));
        }

        info!(vfolders = self.vfolders.len(), "restored vfolders");
        Ok(responses)
    }

    /// Restores the given virtual folder from its properties.
    ///
    /// Returns [`PropsResponse::NoTargetItem`] if the virtual folder
    /// has no properties document.
    pub fn restore(&mut self, name: &str) -> PropsResponse {
        if self.vfolders.contains_key(name) {
            debug!(vfolder = name, "vfolder already restored");
            return PropsResponse::Ok;
        }

        let path = self.config.props_path(name);
        if !path.is_file() {
            return PropsResponse::NoTargetItem;
        }

        let mut vfolder = VFolder::new(name);
        let res = read_props(&mut vfolder, &path);

        if let Some(source) = vfolder.source() {
            self.registry.register(source, name);
        }

        debug!(vfolder = name, ?res, "restored vfolder");
        self.vfolders.insert(name.to_owned(), vfolder);
        res
    }

    fn validate_name(&self, name: &str) -> Result<()> {
        let valid = !name.is_empty()
            && Path::new(name)
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if !valid {
            return Err(Error::InvalidVFolderNameError(name.to_owned()));
        }

        if self.vfolders.contains_key(name) || self.storage.resolve_folder(name).is_some() {
            return Err(Error::VFolderAlreadyExistsError(name.to_owned()));
        }

        // folders and properties of a vfolder are removed recursively
        let nested = self.vfolders.keys().find(|other| {
            is_nested(name, other) || is_nested(other, name)
        });

        if let Some(other) = nested {
            return Err(Error::NestedVFolderError(name.to_owned(), other.clone()));
        }

        Ok(())
    }

    fn validate_source(&self, name: &str, source: &str) -> Result<()> {
        if source == name || self.is_vfolder(source) {
            return Err(Error::SourceIsVFolderError(source.to_owned()));
        }

        if self.storage.resolve_folder(source).is_none() {
            return Err(Error::SourceNotFoundError(source.to_owned()));
        }

        Ok(())
    }

    /// Creates a new virtual folder, then runs its first pass and
    /// persists its properties.
    pub fn create(&mut self, name: &str, config: VFolderConfig) -> Result<VFolderSyncReport> {
        self.validate_name(name)?;

        if let Some(source) = config.source.as_deref() {
            self.validate_source(name, source)?;
        }

        self.storage
            .create_folder(name)
            .map_err(|err| Error::CreateVFolderError(err, name.to_owned()))?;

        let vfolder = VFolder::from_config(name, config);
        if let Some(source) = vfolder.source() {
            self.registry.register(source, name);
        }
        self.vfolders.insert(name.to_owned(), vfolder);
        info!(vfolder = name, "created vfolder");

        let report = self.sync(name);

        let res = self.save(name);
        if !res.is_ok() {
            warn!(vfolder = name, ?res, "cannot save new vfolder properties");
        }

        report
    }

    /// Applies the given properties to the given virtual folder.
    ///
    /// Editing the source, the filter or the search scope deletes the
    /// mirrored messages, then mirrors the source again. Returns
    /// `false` if nothing changed.
    pub fn edit(&mut self, name: &str, config: VFolderConfig) -> Result<bool> {
        let current = self.get_mut(name)?;
        if current.is_updating() {
            return Err(Error::SyncInProgressError(name.to_owned()));
        }

        let prev = current.config();
        let next = VFolder::from_config(name, config).config();

        if prev == next {
            return Ok(false);
        }

        if next.source != prev.source {
            if let Some(source) = next.source.as_deref() {
                self.validate_source(name, source)?;
            }
        }

        let vfolder = self.get_mut(name)?;
        vfolder.set_filter(next.filter.as_deref());
        vfolder.set_search(next.search);
        vfolder.set_frozen(next.frozen);
        vfolder.set_source(next.source.as_deref());

        if next.source != prev.source {
            if let Some(source) = prev.source.as_deref() {
                self.registry.unregister(source, name);
            }
            if let Some(source) = next.source.as_deref() {
                self.registry.register(source, name);
            }
        }

        let rebuild = next.source != prev.source
            || next.filter != prev.filter
            || next.search != prev.search;

        if rebuild {
            debug!(vfolder = name, "vfolder criteria changed, rebuilding");
            let vfolder = self
                .vfolders
                .get_mut(name)
                .ok_or_else(|| Error::VFolderNotFoundError(name.to_owned()))?;
            let report = sync::clear(&self.storage, vfolder)?;
            for (hunk, err) in report.errors() {
                warn!(vfolder = name, %hunk, "cannot clear vfolder: {err}");
            }
            self.sync(name)?;
        }

        let res = self.save(name);
        if !res.is_ok() {
            warn!(vfolder = name, ?res, "cannot save vfolder properties");
        }

        Ok(true)
    }

    /// Removes the given virtual folder, its folder and its
    /// properties.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let vfolder = self.get_mut(name)?;
        if vfolder.is_updating() {
            return Err(Error::SyncInProgressError(name.to_owned()));
        }

        if let Some(folder) = self.storage.resolve_folder(name) {
            self.storage
                .delete_folder(&folder)
                .map_err(|err| Error::DeleteVFolderError(err, name.to_owned()))?;
        }

        self.forget(name)?;
        info!(vfolder = name, "removed vfolder");
        Ok(())
    }

    /// Drops the given virtual folder from the engine, and deletes
    /// its properties. Its folder is left untouched.
    fn forget(&mut self, name: &str) -> Result<()> {
        if let Some(vfolder) = self.vfolders.remove(name) {
            if let Some(source) = vfolder.source() {
                self.registry.unregister(source, name);
            }
        }

        let path = self.config.props_path(name);
        let bak = path.with_file_name(format!("{PROPS_FILE_NAME}.bak"));

        for path in [path, bak] {
            match fs::remove_file(&path) {
                Ok(()) => (),
                Err(err) if err.kind() == io::ErrorKind::NotFound => (),
                Err(err) => return Err(Error::DeletePropsError(err, path)),
            }
        }

        // other files or nested properties keep the directory alive
        let dir = self.config.rc_dir.join(name);
        if let Err(err) = fs::remove_dir(&dir) {
            debug!(?dir, "cannot remove vfolder properties directory: {err}");
        }

        Ok(())
    }

    /// Runs a reconciliation pass on the given virtual folder, even
    /// if it is frozen.
    pub fn sync(&mut self, name: &str) -> Result<VFolderSyncReport> {
        let vfolder = self
            .vfolders
            .get_mut(name)
            .ok_or_else(|| Error::VFolderNotFoundError(name.to_owned()))?;
        sync::sync(&self.storage, &self.filter_builder, vfolder)
    }

    /// Runs a reconciliation pass on every virtual folder, frozen ones
    /// included, in name order.
    pub fn sync_all(&mut self) -> BTreeMap<String, Result<VFolderSyncReport>> {
        let names: Vec<String> = self.vfolders.keys().cloned().collect();
        names
            .into_iter()
            .map(|name| {
                let report = self.sync(&name);
                (name, report)
            })
            .collect()
    }

    /// Returns `true` if the given virtual folder needs a pass.
    pub fn needs_sync(&self, name: &str) -> bool {
        self.vfolders
            .get(name)
            .is_some_and(|vfolder| sync::needs_sync(&self.storage, vfolder))
    }

    /// Returns the names of the non-frozen virtual folders watching
    /// the given folder.
    fn active_watchers(&self, folder: &str) -> Vec<String> {
        if self.is_vfolder(folder) {
            debug!(folder, "ignoring event about a vfolder folder");
            return Vec::new();
        }

        self.registry
            .watchers(folder)
            .into_iter()
            .filter(|name| self.vfolders.get(name).is_some_and(|v| !v.is_frozen()))
            .collect()
    }

    /// Reconciles every non-frozen virtual folder watching the given
    /// folder.
    pub fn on_source_changed(&mut self, folder: &str) -> Vec<Result<VFolderSyncReport>> {
        self.active_watchers(folder)
            .into_iter()
            .map(|name| self.sync(&name))
            .collect()
    }

    /// Points the virtual folders watching the `from` folder, or one
    /// of its sub-folders, at the `to` folder.
    pub fn on_source_renamed(&mut self, from: &str, to: &str) {
        if self.is_vfolder(from) {
            debug!(folder = from, "ignoring rename of a vfolder folder");
            return;
        }

        // sub-folders move with their parent
        let sources: Vec<(String, String)> = self
            .registry
            .sources()
            .filter_map(|source| {
                let rest = source.strip_prefix(from)?;
                (rest.is_empty() || rest.starts_with('/'))
                    .then(|| (source.to_owned(), format!("{to}{rest}")))
            })
            .collect();

        for (source, renamed) in sources {
            for name in self.registry.rekey(&source, &renamed) {
                if let Some(vfolder) = self.vfolders.get_mut(&name) {
                    sync::on_source_renamed(vfolder, &renamed);
                }
            }
        }
    }

    /// Detaches the virtual folders watching the removed folder. They
    /// keep their mirrored messages.
    ///
    /// If the removed folder is the folder of a virtual folder, the
    /// virtual folder is dropped.
    pub fn on_source_removed(&mut self, folder: &str) -> Result<()> {
        if self.is_vfolder(folder) {
            debug!(vfolder = folder, "vfolder folder removed, dropping vfolder");
            return self.forget(folder);
        }

        let names: BTreeSet<String> = self.registry.remove_source(folder);
        for name in names {
            if let Some(vfolder) = self.vfolders.get_mut(&name) {
                info!(vfolder = name.as_str(), source = folder, "source removed, detaching vfolder");
                vfolder.set_source(None::<String>);
            }
        }

        Ok(())
    }

    /// Mirrors the new message into the non-frozen virtual folders
    /// watching the given folder, if it matches their filter.
    pub fn on_source_message_added(
        &mut self,
        folder: &str,
        id: SourceId,
    ) -> Vec<Result<VFolderSyncReport>> {
        let names = self.active_watchers(folder);
        let mut reports = Vec::with_capacity(names.len());

        for name in names {
            if let Some(vfolder) = self.vfolders.get_mut(&name) {
                reports.push(sync::on_source_message_added(
                    &self.storage,
                    &self.filter_builder,
                    vfolder,
                    id,
                ));
            }
        }

        reports
    }

    /// Deletes the mirrors of the deleted message from the non-frozen
    /// virtual folders watching the given folder.
    pub fn on_source_message_deleted(
        &mut self,
        folder: &str,
        id: SourceId,
    ) -> Vec<Result<VFolderSyncReport>> {
        let names = self.active_watchers(folder);
        let mut reports = Vec::with_capacity(names.len());

        for name in names {
            if let Some(vfolder) = self.vfolders.get_mut(&name) {
                reports.push(sync::on_source_message_deleted(&self.storage, vfolder, id));
            }
        }

        reports
    }

    /// Forgets the mapping of the message the user deleted from the
    /// given virtual folder.
    pub fn on_vfolder_message_deleted(
        &mut self,
        vfolder: &str,
        id: VirtualId,
    ) -> Option<(VirtualId, SourceId)> {
        let vfolder = self.vfolders.get_mut(vfolder)?;
        sync::on_mirrored_message_deleted_by_user(vfolder, id)
    }

    /// Dispatches the given host event. Returns the reports of the
    /// passes it triggered.
    pub fn handle(&mut self, event: HostEvent) -> Vec<Result<VFolderSyncReport>> {
        debug!(?event, "handle host event");

        match event {
            HostEvent::SourceChanged(folder) => self.on_source_changed(&folder),
            HostEvent::SourceRenamed { from, to } => {
                self.on_source_renamed(&from, &to);
                Vec::new()
            }
            HostEvent::SourceRemoved(folder) => match self.on_source_removed(&folder) {
                Ok(()) => Vec::new(),
                Err(err) => vec![Err(err)],
            },
            HostEvent::SourceMessageAdded { folder, id } => {
                self.on_source_message_added(&folder, id)
            }
            HostEvent::SourceMessageDeleted { folder, id } => {
                self.on_source_message_deleted(&folder, id)
            }
            HostEvent::VFolderMessageDeleted { vfolder, id } => {
                self.on_vfolder_message_deleted(&vfolder, id);
                Vec::new()
            }
        }
    }

    /// Persists the given virtual folder if it changed.
    pub fn save(&mut self, name: &str) -> PropsResponse {
        let path = self.config.props_path(name);
        match self.vfolders.get_mut(name) {
            Some(vfolder) => write_props(vfolder, path),
            None => PropsResponse::NoTargetItem,
        }
    }

    /// Persists every virtual folder that changed.
    pub fn save_all(&mut self) -> Vec<(String, PropsResponse)> {
        let names: Vec<String> = self.vfolders.keys().cloned().collect();
        names
            .into_iter()
            .map(|name| {
                let res = self.save(&name);
                if !res.is_ok() {
                    warn!(vfolder = name.as_str(), ?res, "cannot save vfolder properties");
                }
                (name, res)
            })
            .collect()
    }

    /// Persists every virtual folder that changed, then drops the
    /// engine.
    pub fn shutdown(mut self) -> Vec<(String, PropsResponse)> {
        let responses = self.save_all();
        self.registry.clear();
        info!(vfolders = self.vfolders.len(), "shut down vfolders engine");
        responses
    }
}

/// Returns `true` if the `child` name lives under the `parent` one.
fn is_nested(child: &str, parent: &str) -> bool {
    child
        .strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with('/'))
}

fn path_to_name(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
