//! # Virtual folder synchronization
//!
//! This module contains everything you need to keep a virtual folder
//! in sync with its source folder: the reconciliation pass [`sync`]
//! and the single message operations triggered by host events.
//!
//! A pass diffs the source listing against the [`IdVault`] into a
//! patch (see [`patch::build`]), mirrors the candidates matching the
//! filter, then deletes the mirrored messages whose source vanished.
//! Message errors do not abort the pass, they are collected in the
//! [`VFolderSyncReport`].
//!
//! [`IdVault`]: crate::vault::IdVault

pub mod hunk;
pub mod patch;
pub mod report;

use chrono::Utc;
use tracing::{debug, info, trace, warn};

use crate::{
    filter::{Envelope, FilterBuilder, FilterStrategy, Message},
    vault::{SourceId, VaultId, VirtualId},
    Error, Result, Storage, VFolder,
};

#[doc(inline)]
pub use self::{
    hunk::VFolderSyncHunk,
    patch::VFolderSyncPatch,
    report::{VFolderSyncOutcome, VFolderSyncReport},
};

/// The folders involved in a pass.
struct Folders<F> {
    source: F,
    target: F,
}

/// Resolves the source folder and the virtual folder own folder.
///
/// Returns the outcome to report instead when the pass cannot run.
fn resolve_folders<S: Storage>(
    storage: &S,
    vfolder: &VFolder,
) -> Result<std::result::Result<Folders<S::Folder>, VFolderSyncOutcome>> {
    let Some(source_id) = vfolder.source() else {
        debug!(vfolder = vfolder.name(), "no source, skipping");
        return Ok(Err(VFolderSyncOutcome::NoSource));
    };

    let Some(source) = storage.resolve_folder(source_id) else {
        warn!(vfolder = vfolder.name(), source = source_id, "cannot resolve source, skipping");
        return Ok(Err(VFolderSyncOutcome::SourceUnresolved));
    };

    let target = storage
        .resolve_folder(vfolder.name())
        .ok_or_else(|| Error::ResolveVFolderError(vfolder.name().to_owned()))?;

    Ok(Ok(Folders { source, target }))
}

/// Builds the filter strategy of the given virtual folder, or `None`
/// if the virtual folder has no filter.
fn build_strategy(
    builder: &FilterBuilder,
    vfolder: &VFolder,
) -> Result<Option<Box<dyn FilterStrategy>>> {
    match vfolder.filter() {
        Some(pattern) => Ok(Some(builder(pattern, vfolder.search())?)),
        None => Ok(None),
    }
}

/// The result of a single mirroring attempt.
enum Mirrored {
    Stored,
    FilteredOut,
}

/// Filters the given source message, then mirrors it into the virtual
/// folder if it matches.
fn mirror<S: Storage>(
    storage: &S,
    strategy: Option<&dyn FilterStrategy>,
    folders: &Folders<S::Folder>,
    vfolder: &mut VFolder,
    sid: SourceId,
) -> Result<Mirrored> {
    let source_id = storage.folder_identifier(&folders.source);

    let Some(strategy) = strategy else {
        return Ok(Mirrored::FilteredOut);
    };

    let headers = storage
        .peek_headers(&folders.source, sid)
        .map_err(|err| Error::FetchMessageError(err, sid, source_id.clone()))?
        .ok_or_else(|| Error::MessageNotFoundError(sid, source_id.clone()))?;

    let msg = Message::new(Envelope::from_bytes(&headers), || {
        storage.fetch_message(&folders.source, sid)
    });

    if !strategy.matches(&msg) {
        trace!(vfolder = vfolder.name(), sid, "message filtered out");
        vfolder.record_rejected(sid);
        return Ok(Mirrored::FilteredOut);
    }

    let raw = match msg.raw_if_loaded() {
        Some(raw) => raw.to_vec(),
        None => storage
            .fetch_message(&folders.source, sid)
            .map_err(|err| Error::FetchMessageError(err, sid, source_id.clone()))?
            .ok_or_else(|| Error::MessageNotFoundError(sid, source_id.clone()))?,
    };

    let vid = storage
        .store_message(&folders.target, &raw)
        .map_err(|err| Error::StoreMessageError(err, sid, vfolder.name().to_owned()))?;

    if vid <= vfolder.last_num() {
        warn!(
            vfolder = vfolder.name(),
            sid,
            vid,
            last_num = vfolder.last_num(),
            "storage reused a virtual message number, message not mirrored"
        );

        // the orphan copy cannot be mapped without reusing a number
        if let Err(err) = storage.delete_message(&folders.target, vid) {
            warn!(vfolder = vfolder.name(), vid, "cannot delete orphan message: {err}");
        }
        return Err(Error::ReusedMessageNumberError(sid, vfolder.name().to_owned(), vid));
    }

    vfolder.record_mirror(sid, vid);
    debug!(vfolder = vfolder.name(), sid, vid, "mirrored message");
    Ok(Mirrored::Stored)
}

/// Deletes the mirror of the given pair from the virtual folder, then
/// forgets the pair. A mirror already gone counts as deleted.
fn unmirror<S: Storage>(
    storage: &S,
    target: &S::Folder,
    vfolder: &mut VFolder,
    vid: VirtualId,
) -> Result<()> {
    let deleted = storage
        .delete_message(target, vid)
        .map_err(|err| Error::DeleteMessageError(err, vid, vfolder.name().to_owned()))?;

    if !deleted {
        trace!(vfolder = vfolder.name(), vid, "mirrored message already gone");
    }

    vfolder.forget_mirror(VaultId::Virtual(vid));
    debug!(vfolder = vfolder.name(), vid, "removed mirrored message");
    Ok(())
}

/// Runs a reconciliation pass on the given virtual folder.
///
/// The pass is skipped when another one is already in progress for
/// the same virtual folder, when the virtual folder has no source or
/// when the source cannot be resolved: the vault is left untouched and
/// the reason is given by the report outcome.
///
/// Listing failures abort the pass. Message failures are collected in
/// the report, next to their hunk.
pub fn sync<S: Storage>(
    storage: &S,
    filter_builder: &FilterBuilder,
    vfolder: &mut VFolder,
) -> Result<VFolderSyncReport> {
    if !vfolder.begin_update() {
        debug!(vfolder = vfolder.name(), "sync already in progress, skipping");
        return Ok(VFolderSyncReport::new(vfolder.name())
            .with_outcome(VFolderSyncOutcome::AlreadyUpdating));
    }

    let report = sync_pass(storage, filter_builder, vfolder);
    vfolder.end_update();
    report
}

fn sync_pass<S: Storage>(
    storage: &S,
    filter_builder: &FilterBuilder,
    vfolder: &mut VFolder,
) -> Result<VFolderSyncReport> {
    let mut report = VFolderSyncReport::new(vfolder.name());

    let folders = match resolve_folders(storage, vfolder)? {
        Ok(folders) => folders,
        Err(outcome) => return Ok(report.with_outcome(outcome)),
    };

    let source_id = storage.folder_identifier(&folders.source);

    storage
        .scan_folder(&folders.source)
        .map_err(|err| Error::ScanSourceError(err, source_id.clone()))?;

    let listing = storage
        .list_ids(&folders.source)
        .map_err(|err| Error::ListIdsError(err, source_id.clone()))?;

    report.scanned = listing.len();

    vfolder.rejected.retain(|sid| listing.contains(sid));
    let patch = patch::build(&listing, vfolder.vault(), vfolder.rejected());
    trace!(vfolder = vfolder.name(), ?patch, "built sync patch");

    let strategy = build_strategy(filter_builder, vfolder)?;

    // additions must be applied before removals are evaluated
    let (adds, removes): (Vec<_>, Vec<_>) = patch.into_iter().partition(VFolderSyncHunk::is_add);

    for hunk in adds {
        let VFolderSyncHunk::Add(sid) = hunk else {
            continue;
        };

        match mirror(storage, strategy.as_deref(), &folders, vfolder, sid) {
            Ok(Mirrored::Stored) => report.patch.push((hunk, None)),
            Ok(Mirrored::FilteredOut) => report.filtered_out += 1,
            Err(err) => {
                debug!("cannot process vfolder hunk: {err}");
                trace!("{err:?}");
                report.patch.push((hunk, Some(err)));
            }
        }
    }

    for hunk in removes {
        let VFolderSyncHunk::Remove(vid, _) = hunk else {
            continue;
        };

        match unmirror(storage, &folders.target, vfolder, vid) {
            Ok(()) => report.patch.push((hunk, None)),
            Err(err) => {
                debug!("cannot process vfolder hunk: {err}");
                trace!("{err:?}");
                report.patch.push((hunk, Some(err)));
            }
        }
    }

    if report.is_ok() {
        vfolder.last_sync = Some(Utc::now());
    }

    info!(
        vfolder = vfolder.name(),
        scanned = report.scanned,
        added = report.added(),
        removed = report.removed(),
        filtered_out = report.filtered_out,
        "synchronized vfolder"
    );

    Ok(report)
}

/// Filters and mirrors a single new source message, without running
/// a whole pass.
///
/// Does nothing if the message is already mirrored.
pub fn on_source_message_added<S: Storage>(
    storage: &S,
    filter_builder: &FilterBuilder,
    vfolder: &mut VFolder,
    sid: SourceId,
) -> Result<VFolderSyncReport> {
    if !vfolder.begin_update() {
        debug!(vfolder = vfolder.name(), sid, "sync in progress, skipping new message");
        return Ok(VFolderSyncReport::new(vfolder.name())
            .with_outcome(VFolderSyncOutcome::AlreadyUpdating));
    }

    let report = mirror_one(storage, filter_builder, vfolder, sid);
    vfolder.end_update();
    report
}

fn mirror_one<S: Storage>(
    storage: &S,
    filter_builder: &FilterBuilder,
    vfolder: &mut VFolder,
    sid: SourceId,
) -> Result<VFolderSyncReport> {
    let mut report = VFolderSyncReport::new(vfolder.name());

    let folders = match resolve_folders(storage, vfolder)? {
        Ok(folders) => folders,
        Err(outcome) => return Ok(report.with_outcome(outcome)),
    };

    report.scanned = 1;

    if vfolder.vault().contains_source(sid) {
        trace!(vfolder = vfolder.name(), sid, "message already mirrored");
        return Ok(report);
    }

    let strategy = build_strategy(filter_builder, vfolder)?;
    let hunk = VFolderSyncHunk::Add(sid);

    match mirror(storage, strategy.as_deref(), &folders, vfolder, sid) {
        Ok(Mirrored::Stored) => report.patch.push((hunk, None)),
        Ok(Mirrored::FilteredOut) => report.filtered_out += 1,
        Err(err) => {
            debug!("cannot process vfolder hunk: {err}");
            report.patch.push((hunk, Some(err)));
        }
    }

    Ok(report)
}

/// Deletes the mirror of the given source message, if any.
///
/// Messages are not unmirrored while a pass is in progress: the next
/// pass catches the removal.
pub fn on_source_message_deleted<S: Storage>(
    storage: &S,
    vfolder: &mut VFolder,
    sid: SourceId,
) -> Result<VFolderSyncReport> {
    let mut report = VFolderSyncReport::new(vfolder.name());

    if vfolder.is_updating() {
        debug!(vfolder = vfolder.name(), sid, "sync in progress, skipping deleted message");
        return Ok(report.with_outcome(VFolderSyncOutcome::AlreadyUpdating));
    }

    vfolder.rejected.remove(&sid);

    let Some(vid) = vfolder.vault().get_virtual(sid) else {
        trace!(vfolder = vfolder.name(), sid, "deleted message was not mirrored");
        return Ok(report);
    };

    let target = storage
        .resolve_folder(vfolder.name())
        .ok_or_else(|| Error::ResolveVFolderError(vfolder.name().to_owned()))?;

    let hunk = VFolderSyncHunk::Remove(vid, sid);
    match unmirror(storage, &target, vfolder, vid) {
        Ok(()) => report.patch.push((hunk, None)),
        Err(err) => report.patch.push((hunk, Some(err))),
    }

    Ok(report)
}

/// Forgets the mapping of a mirrored message the user deleted from
/// the virtual folder. The source message is left untouched.
///
/// Returns the forgotten pair as `(virtual_id, source_id)`.
pub fn on_mirrored_message_deleted_by_user(
    vfolder: &mut VFolder,
    vid: VirtualId,
) -> Option<(VirtualId, SourceId)> {
    let pair = vfolder.forget_mirror(VaultId::Virtual(vid));
    if pair.is_some() {
        debug!(vfolder = vfolder.name(), vid, "forgot message deleted by user");
    }
    pair
}

/// Points the virtual folder at the renamed source. The source folder
/// is resolved again at the next pass, the vault is left untouched.
pub fn on_source_renamed(vfolder: &mut VFolder, id: impl ToString) {
    let id = id.to_string();
    debug!(vfolder = vfolder.name(), source = id.as_str(), "source renamed");

    // same messages, same numbers
    let rejected = std::mem::take(&mut vfolder.rejected);
    vfolder.set_source(Some(id));
    vfolder.rejected = rejected;
}

/// Returns `true` if the virtual folder needs a pass: it never
/// completed one, or its source changed since the last one.
///
/// When the storage cannot tell when the source last changed, a pass
/// is always needed.
pub fn needs_sync<S: Storage>(storage: &S, vfolder: &VFolder) -> bool {
    let Some(last_sync) = vfolder.last_sync() else {
        return true;
    };

    let Some(source) = vfolder.source().and_then(|id| storage.resolve_folder(id)) else {
        return false;
    };

    match storage.last_modified(&source) {
        Some(modified) => modified > last_sync,
        None => true,
    }
}

/// Deletes every mirrored message and empties the vault.
///
/// The last assigned virtual message number is kept, so numbers are
/// never reused. Pairs whose mirror cannot be deleted are kept in the
/// vault.
pub fn clear<S: Storage>(storage: &S, vfolder: &mut VFolder) -> Result<VFolderSyncReport> {
    if vfolder.is_updating() {
        return Err(Error::SyncInProgressError(vfolder.name().to_owned()));
    }

    let mut report = VFolderSyncReport::new(vfolder.name());
    vfolder.rejected.clear();

    if vfolder.vault().is_empty() {
        return Ok(report);
    }

    let target = storage
        .resolve_folder(vfolder.name())
        .ok_or_else(|| Error::ResolveVFolderError(vfolder.name().to_owned()))?;

    for (vid, sid) in vfolder.vault().pairs() {
        let hunk = VFolderSyncHunk::Remove(vid, sid);
        match unmirror(storage, &target, vfolder, vid) {
            Ok(()) => report.patch.push((hunk, None)),
            Err(err) => report.patch.push((hunk, Some(err))),
        }
    }

    debug!(vfolder = vfolder.name(), removed = report.removed(), "cleared vfolder");
    Ok(report)
}
