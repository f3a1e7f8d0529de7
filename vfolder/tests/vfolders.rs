use std::fs;

use mail_builder::MessageBuilder;
use tempfile::tempdir;
use vfolder::{
    ErrorKind, HostEvent, MemoryStorage, PropsResponse, SearchScope, VFolderConfig,
    VFolderSyncOutcome, VFolderSyncReport, VFolders, VFoldersConfig,
};

fn email(subject: &str) -> Vec<u8> {
    MessageBuilder::new()
        .from("alice@localhost")
        .to("bob@localhost")
        .subject(subject)
        .text_body("Hello, world!")
        .write_to_vec()
        .unwrap()
}

fn kind(res: vfolder::Result<VFolderSyncReport>) -> ErrorKind {
    res.unwrap_err().kind()
}

fn storage() -> MemoryStorage {
    let storage = MemoryStorage::new();
    storage.add_folder("inbox");
    storage.add_message("inbox", email("March invoice")).unwrap();
    storage.add_message("inbox", email("Meeting notes")).unwrap();
    storage.add_message("inbox", email("April invoice")).unwrap();
    storage
}

#[test_log::test]
fn create_and_restore() {
    let dir = tempdir().unwrap();
    let config = VFoldersConfig::new(dir.path());

    let mut vfolders = VFolders::new(config.clone(), storage());
    let report = vfolders
        .create("invoices", VFolderConfig::new("inbox", "*invoice*"))
        .unwrap();

    assert_eq!(report.added(), 2);
    assert_eq!(report.filtered_out, 1);
    assert_eq!(vfolders.registry().watchers("inbox"), vec!["invoices"]);
    assert_eq!(vfolders.storage().messages("invoices").len(), 2);

    let vfolder = vfolders.get("invoices").unwrap();
    assert_eq!(vfolder.vault().pairs(), vec![(1, 1), (2, 3)]);
    assert!(!vfolder.is_changed());
    assert!(config.props_path("invoices").is_file());

    // restart the engine
    let storage = MemoryStorage::new();
    let mut vfolders = VFolders::new(config, storage);
    let responses = vfolders.init().unwrap();
    assert_eq!(
        responses,
        vec![("invoices".to_owned(), PropsResponse::Ok)]
    );

    let vfolder = vfolders.get("invoices").unwrap();
    assert_eq!(vfolder.filter(), Some("*invoice*"));
    assert_eq!(vfolder.source(), Some("inbox"));
    assert_eq!(vfolder.vault().pairs(), vec![(1, 1), (2, 3)]);
    assert_eq!(vfolder.last_num(), 2);
    assert_eq!(vfolders.registry().watchers("inbox"), vec!["invoices"]);
}

#[test_log::test]
fn init_without_rc_dir() {
    let dir = tempdir().unwrap();
    let config = VFoldersConfig::new(dir.path().join("missing"));
    let mut vfolders = VFolders::new(config, MemoryStorage::new());

    assert!(vfolders.init().unwrap().is_empty());
    assert_eq!(vfolders.restore("invoices"), PropsResponse::NoTargetItem);
    assert!(vfolders.get("invoices").is_none());
}

#[test_log::test]
fn reject_invalid_creations() {
    let dir = tempdir().unwrap();
    let mut vfolders = VFolders::new(VFoldersConfig::new(dir.path()), storage());

    assert_eq!(
        kind(vfolders.create("", VFolderConfig::new("inbox", "*"))),
        ErrorKind::InvalidInput
    );
    assert_eq!(
        kind(vfolders.create("../up", VFolderConfig::new("inbox", "*"))),
        ErrorKind::InvalidInput
    );
    assert_eq!(
        kind(vfolders.create("inbox", VFolderConfig::new("inbox", "*"))),
        ErrorKind::InvalidInput
    );
    assert_eq!(
        kind(vfolders.create("invoices", VFolderConfig::new("missing", "*"))),
        ErrorKind::NotFound
    );
    assert!(vfolders.storage().messages("invoices").is_empty());

    vfolders
        .create("invoices", VFolderConfig::new("inbox", "*invoice*"))
        .unwrap();

    assert!(matches!(
        vfolders.create("invoices", VFolderConfig::new("inbox", "*")),
        Err(vfolder::Error::VFolderAlreadyExistsError(_))
    ));
    assert!(matches!(
        vfolders.create("nested", VFolderConfig::new("invoices", "*")),
        Err(vfolder::Error::SourceIsVFolderError(_))
    ));
}

#[test_log::test]
fn frozen_vfolders_ignore_changes() {
    let dir = tempdir().unwrap();
    let mut vfolders = VFolders::new(VFoldersConfig::new(dir.path()), storage());

    let config = VFolderConfig::new("inbox", "*invoice*").with_frozen(true);
    vfolders.create("invoices", config).unwrap();
    assert_eq!(vfolders.get("invoices").unwrap().vault().len(), 2);

    vfolders
        .storage()
        .add_message("inbox", email("May invoice"))
        .unwrap();

    let reports = vfolders.handle(HostEvent::SourceChanged("inbox".into()));
    assert!(reports.is_empty());
    let reports = vfolders.handle(HostEvent::SourceMessageAdded {
        folder: "inbox".into(),
        id: 4,
    });
    assert!(reports.is_empty());
    assert_eq!(vfolders.get("invoices").unwrap().vault().len(), 2);

    // manual refresh still works
    let report = vfolders.sync("invoices").unwrap();
    assert_eq!(report.added(), 1);
    assert_eq!(vfolders.get("invoices").unwrap().vault().len(), 3);

    let reports = vfolders.sync_all();
    assert_eq!(reports.len(), 1);
    assert!(reports["invoices"].as_ref().unwrap().patch.is_empty());
}

#[test_log::test]
fn source_events() {
    let dir = tempdir().unwrap();
    let mut vfolders = VFolders::new(VFoldersConfig::new(dir.path()), storage());

    vfolders
        .create("invoices", VFolderConfig::new("inbox", "*invoice*"))
        .unwrap();
    vfolders
        .create("everything", VFolderConfig::new("inbox", "*"))
        .unwrap();
    assert_eq!(
        vfolders.registry().watchers("inbox"),
        vec!["everything", "invoices"]
    );

    // new message
    let id = vfolders
        .storage()
        .add_message("inbox", email("May invoice"))
        .unwrap();
    let reports = vfolders.handle(HostEvent::SourceMessageAdded {
        folder: "inbox".into(),
        id,
    });
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.as_ref().unwrap().added() == 1));

    // deleted message
    vfolders.storage().remove_message("inbox", 1);
    let reports = vfolders.handle(HostEvent::SourceMessageDeleted {
        folder: "inbox".into(),
        id: 1,
    });
    assert!(reports.iter().all(|r| r.as_ref().unwrap().removed() == 1));
    assert!(!vfolders.get("invoices").unwrap().vault().contains_source(1));

    // content changed
    vfolders.storage().remove_message("inbox", 2);
    let reports = vfolders.handle(HostEvent::SourceChanged("inbox".into()));
    assert_eq!(reports.len(), 2);
    assert_eq!(vfolders.get("everything").unwrap().vault().len(), 2);

    // events about vfolder folders are ignored
    let reports = vfolders.handle(HostEvent::SourceChanged("invoices".into()));
    assert!(reports.is_empty());
}

#[test_log::test]
fn source_renamed_then_removed() {
    let dir = tempdir().unwrap();
    let mut vfolders = VFolders::new(VFoldersConfig::new(dir.path()), storage());

    vfolders
        .create("invoices", VFolderConfig::new("inbox", "*invoice*"))
        .unwrap();
    let vault = vfolders.get("invoices").unwrap().vault().clone();

    vfolders.storage().rename_folder("inbox", "INBOX");
    vfolders.handle(HostEvent::SourceRenamed {
        from: "inbox".into(),
        to: "INBOX".into(),
    });

    let vfolder = vfolders.get("invoices").unwrap();
    assert_eq!(vfolder.source(), Some("INBOX"));
    assert!(vfolder.is_changed());
    assert_eq!(vfolder.vault(), &vault);
    assert!(vfolders.registry().watchers("inbox").is_empty());
    assert_eq!(vfolders.registry().watchers("INBOX"), vec!["invoices"]);

    // the renamed source is resolved lazily
    let report = vfolders.sync("invoices").unwrap();
    assert_eq!(report.outcome, VFolderSyncOutcome::Synced);
    assert!(report.patch.is_empty());

    // removing the source detaches the vfolder
    vfolders.storage().remove_folder("INBOX");
    vfolders.handle(HostEvent::SourceRemoved("INBOX".into()));

    let vfolder = vfolders.get("invoices").unwrap();
    assert_eq!(vfolder.source(), None);
    assert_eq!(vfolder.vault(), &vault);
    assert_eq!(vfolders.storage().messages("invoices").len(), 2);
    assert!(!vfolders.registry().is_watched("INBOX"));

    let report = vfolders.sync("invoices").unwrap();
    assert_eq!(report.outcome, VFolderSyncOutcome::NoSource);
}

#[test_log::test]
fn vfolder_folder_removed() {
    let dir = tempdir().unwrap();
    let config = VFoldersConfig::new(dir.path());
    let mut vfolders = VFolders::new(config.clone(), storage());

    vfolders
        .create("invoices", VFolderConfig::new("inbox", "*invoice*"))
        .unwrap();

    vfolders.storage().remove_folder("invoices");
    assert!(vfolders
        .handle(HostEvent::SourceRemoved("invoices".into()))
        .is_empty());

    assert!(vfolders.get("invoices").is_none());
    assert!(!vfolders.registry().is_watched("inbox"));
    assert!(!config.props_path("invoices").exists());
}

#[test_log::test]
fn user_deleted_mirror() {
    let dir = tempdir().unwrap();
    let mut vfolders = VFolders::new(VFoldersConfig::new(dir.path()), storage());

    vfolders
        .create("invoices", VFolderConfig::new("inbox", "*invoice*"))
        .unwrap();

    vfolders.storage().remove_message("invoices", 1);
    vfolders.handle(HostEvent::VFolderMessageDeleted {
        vfolder: "invoices".into(),
        id: 1,
    });

    let vfolder = vfolders.get("invoices").unwrap();
    assert_eq!(vfolder.vault().pairs(), vec![(2, 3)]);
    assert!(vfolder.is_changed());
    assert_eq!(vfolders.storage().messages("inbox").len(), 3);
}

#[test_log::test]
fn edit_properties() {
    let dir = tempdir().unwrap();
    let config = VFoldersConfig::new(dir.path());
    let mut vfolders = VFolders::new(config.clone(), storage());
    vfolders.storage().add_folder("archive");
    vfolders
        .storage()
        .add_message("archive", email("Old invoice"))
        .unwrap();

    let props = VFolderConfig::new("inbox", "*invoice*");
    vfolders.create("invoices", props.clone()).unwrap();

    // nothing changed
    assert!(!vfolders.edit("invoices", props.clone()).unwrap());

    // frozen toggle only
    assert!(vfolders
        .edit("invoices", props.clone().with_frozen(true))
        .unwrap());
    let vfolder = vfolders.get("invoices").unwrap();
    assert!(vfolder.is_frozen());
    assert_eq!(vfolder.vault().pairs(), vec![(1, 1), (2, 3)]);
    assert!(!vfolder.is_changed());

    // new filter rebuilds the vfolder
    assert!(vfolders
        .edit("invoices", VFolderConfig::new("inbox", "*notes*"))
        .unwrap());
    let vfolder = vfolders.get("invoices").unwrap();
    assert!(!vfolder.is_frozen());
    assert_eq!(vfolder.vault().pairs(), vec![(3, 2)]);
    assert_eq!(vfolders.storage().messages("invoices").len(), 1);

    // new source rebuilds and re-registers the vfolder
    assert!(vfolders
        .edit("invoices", VFolderConfig::new("archive", "*invoice*"))
        .unwrap());
    assert_eq!(vfolders.registry().watchers("archive"), vec!["invoices"]);
    assert!(!vfolders.registry().is_watched("inbox"));
    let vfolder = vfolders.get("invoices").unwrap();
    assert_eq!(vfolder.vault().pairs(), vec![(4, 1)]);
    assert_eq!(vfolder.last_num(), 4);

    // new search scope
    assert!(vfolders
        .edit(
            "invoices",
            VFolderConfig::new("archive", "*invoice*").with_search(SearchScope::Body)
        )
        .unwrap());
    assert!(vfolders.get("invoices").unwrap().vault().is_empty());

    // empty filter clears the filter
    assert!(vfolders
        .edit("invoices", VFolderConfig::new("archive", ""))
        .unwrap());
    assert_eq!(vfolders.get("invoices").unwrap().filter(), None);

    let content = fs::read_to_string(config.props_path("invoices")).unwrap();
    assert!(content.contains("source_id = \"archive\""));
    assert!(content.contains("searchtype = 1"));
    assert!(!content.contains("filter"));

    // invalid sources are rejected
    assert!(matches!(
        vfolders.edit("invoices", VFolderConfig::new("invoices", "*")),
        Err(vfolder::Error::SourceIsVFolderError(_))
    ));
    assert!(matches!(
        vfolders.edit("unknown", VFolderConfig::new("inbox", "*")),
        Err(vfolder::Error::VFolderNotFoundError(_))
    ));
}

#[test_log::test]
fn remove_vfolder() {
    let dir = tempdir().unwrap();
    let config = VFoldersConfig::new(dir.path());
    let mut vfolders = VFolders::new(config.clone(), storage());

    vfolders
        .create("invoices", VFolderConfig::new("inbox", "*invoice*"))
        .unwrap();
    vfolders.remove("invoices").unwrap();

    assert!(vfolders.get("invoices").is_none());
    assert!(!vfolders.registry().is_watched("inbox"));
    assert!(!dir.path().join("invoices").exists());
    assert_eq!(vfolders.storage().messages("inbox").len(), 3);
    assert!(vfolders.remove("invoices").is_err());
}

#[test_log::test]
fn shutdown_flushes_dirty_vfolders() {
    let dir = tempdir().unwrap();
    let config = VFoldersConfig::new(dir.path());
    let mut vfolders = VFolders::new(config.clone(), storage());

    vfolders
        .create("invoices", VFolderConfig::new("inbox", "*invoice*"))
        .unwrap();

    let id = vfolders
        .storage()
        .add_message("inbox", email("May invoice"))
        .unwrap();
    vfolders.handle(HostEvent::SourceMessageAdded {
        folder: "inbox".into(),
        id,
    });
    assert!(vfolders.get("invoices").unwrap().is_changed());

    let responses = vfolders.shutdown();
    assert_eq!(responses, vec![("invoices".to_owned(), PropsResponse::Ok)]);

    let content = fs::read_to_string(config.props_path("invoices")).unwrap();
    assert!(content.contains("3 = 4"));
}

#[test_log::test]
fn reject_nested_vfolders() {
    let dir = tempdir().unwrap();
    let config = VFoldersConfig::new(dir.path());
    let mut vfolders = VFolders::new(config.clone(), storage());

    vfolders.create("a", VFolderConfig::new("inbox", "*")).unwrap();

    assert!(matches!(
        vfolders.create("a/b", VFolderConfig::new("inbox", "*")),
        Err(vfolder::Error::NestedVFolderError(name, other)) if name == "a/b" && other == "a"
    ));
    assert_eq!(
        kind(vfolders.create("a/b/c", VFolderConfig::new("inbox", "*"))),
        ErrorKind::InvalidInput
    );

    vfolders.create("ab", VFolderConfig::new("inbox", "*")).unwrap();
    vfolders.create("c/d", VFolderConfig::new("inbox", "*")).unwrap();
    assert!(matches!(
        vfolders.create("c", VFolderConfig::new("inbox", "*")),
        Err(vfolder::Error::NestedVFolderError(name, other)) if name == "c" && other == "c/d"
    ));

    // removing a vfolder keeps the properties of its siblings
    vfolders.remove("a").unwrap();
    assert!(config.props_path("ab").is_file());
    assert!(config.props_path("c/d").is_file());
    assert!(!dir.path().join("a").exists());
}

#[test_log::test]
fn remove_keeps_foreign_files() {
    let dir = tempdir().unwrap();
    let config = VFoldersConfig::new(dir.path());
    let mut vfolders = VFolders::new(config.clone(), storage());

    vfolders
        .create("invoices", VFolderConfig::new("inbox", "*invoice*"))
        .unwrap();
    let notes = dir.path().join("invoices").join("notes.txt");
    fs::write(&notes, "keep me").unwrap();

    vfolders.remove("invoices").unwrap();
    assert!(!config.props_path("invoices").exists());
    assert!(notes.is_file());
}

#[test_log::test]
fn parent_source_renamed() {
    let dir = tempdir().unwrap();
    let storage = storage();
    for folder in ["lists", "lists/rust", "listsx"] {
        storage.add_folder(folder);
        storage.add_message(folder, email("March invoice")).unwrap();
    }

    let mut vfolders = VFolders::new(VFoldersConfig::new(dir.path()), storage);
    for (name, source) in [("all", "lists"), ("rust", "lists/rust"), ("other", "listsx")] {
        vfolders
            .create(name, VFolderConfig::new(source, "*"))
            .unwrap();
    }

    vfolders.storage().rename_folder("lists", "archive");
    vfolders.storage().rename_folder("lists/rust", "archive/rust");
    vfolders.handle(HostEvent::SourceRenamed {
        from: "lists".into(),
        to: "archive".into(),
    });

    assert_eq!(vfolders.get("all").unwrap().source(), Some("archive"));
    assert_eq!(vfolders.get("rust").unwrap().source(), Some("archive/rust"));
    assert_eq!(vfolders.get("other").unwrap().source(), Some("listsx"));
    assert_eq!(vfolders.registry().watchers("archive/rust"), vec!["rust"]);
    assert!(!vfolders.registry().is_watched("lists/rust"));

    let report = vfolders.sync("rust").unwrap();
    assert_eq!(report.outcome, VFolderSyncOutcome::Synced);
    assert_eq!(vfolders.get("rust").unwrap().vault().len(), 1);
}
