use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use docvault::core::tick::SERVER_ID_BITS;
use docvault::core::types::CollectionType;
use docvault::index::{IndexDefinition, IndexOperator};
use docvault::storage::parameter::CollectionInfo;
use docvault::vocbase::USERS_COLLECTION;
use docvault::{CollectionStatus, Config, CreateOptions, Database, ErrorKind};
use serde_json::json;
use tempfile::TempDir;

fn config(dir: &TempDir) -> Config {
    Config {
        start_maintenance: false,
        ..Config::new(dir.path())
    }
}

fn entries(dir: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_users_scenario() {
    let dir = TempDir::new().unwrap();

    let cid = {
        let db = Database::open(config(&dir)).unwrap();
        assert!(db.list_all().is_empty());

        let users = db.find_or_bear("users", CollectionType::Document).unwrap();
        assert_eq!(users.status(), CollectionStatus::NewBorn);
        assert!(users.path().is_none());

        let guard = db.use_collection(&users).unwrap();
        guard.insert(json!({"_key": "alice", "age": 30})).unwrap();
        assert_eq!(users.status(), CollectionStatus::Loaded);
        assert_eq!(guard.count(), 1);
        assert_eq!(guard.document("alice").unwrap().attribute("age"), Some(&json!(30)));

        db.unload(&users).unwrap();
        assert_eq!(users.status(), CollectionStatus::Unloading);

        // the guard still holds a usage
        db.run_cleanup_pass();
        assert_eq!(users.status(), CollectionStatus::Unloading);

        guard.release();
        db.run_cleanup_pass();
        assert_eq!(users.status(), CollectionStatus::Unloaded);
        users.id()
    };

    let db = Database::open(config(&dir)).unwrap();
    let users = db.find_by_name("users").unwrap();
    assert_eq!(users.id(), cid);
    assert_eq!(users.status(), CollectionStatus::Unloaded);

    let guard = db.use_by_name("users").unwrap();
    assert_eq!(guard.count(), 1);
    assert_eq!(db.open_count(), 1);
}

#[test]
fn test_create_then_find_returns_same_proxy() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(config(&dir)).unwrap();

    for name in ["a", "Users_2", "edges-x", "z_system"] {
        let proxy = db.create_new(name, CollectionType::Document, None).unwrap();
        assert_eq!(db.find_by_name(name).unwrap().id(), proxy.id());
        assert!(Arc::ptr_eq(&db.find_by_id(proxy.id()).unwrap(), &proxy));
    }

    let bear = db.find_or_bear("a", CollectionType::Document).unwrap();
    assert!(Arc::ptr_eq(&bear, &db.find_by_name("a").unwrap()));
    assert_eq!(db.list_all().len(), 4);
}

#[test]
fn test_duplicates_and_illegal_names() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(config(&dir)).unwrap();
    let users = db.create_new("users", CollectionType::Document, None).unwrap();

    let err = db.create_new("users", CollectionType::Document, None).unwrap_err();
    assert!(err.is(ErrorKind::DuplicateName));

    let err = db.create_new("other", CollectionType::Edge, Some(users.id())).unwrap_err();
    assert!(err.is(ErrorKind::DuplicateIdentifier));

    for name in ["", "1abc", "a b", "a/b"] {
        let err = db.create_new(name, CollectionType::Document, None).unwrap_err();
        assert!(err.is(ErrorKind::IllegalName), "{}", name);
    }
    assert!(db.find_or_bear(&"x".repeat(65), CollectionType::Document).is_err());
    assert_eq!(db.list_all().len(), 1);
}

#[test]
fn test_drop_new_born_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(config(&dir)).unwrap();
    let ghost = db.create_new("ghost", CollectionType::Document, None).unwrap();
    let before = entries(&dir);

    db.drop_collection(&ghost).unwrap();

    assert_eq!(ghost.status(), CollectionStatus::Deleted);
    assert!(db.find_by_name("ghost").is_none());
    assert!(db.find_by_id(ghost.id()).is_none());
    assert_eq!(entries(&dir), before);
    assert!(db.use_collection(&ghost).unwrap_err().is(ErrorKind::CollectionNotFound));

    // idempotent
    db.drop_collection(&ghost).unwrap();
}

#[test]
fn test_concurrent_use_opens_once() {
    let dir = TempDir::new().unwrap();
    {
        let db = Database::open(config(&dir)).unwrap();
        let items = db.create_collection("items", CreateOptions::default()).unwrap();
        db.use_collection(&items).unwrap().insert(json!({"n": 1})).unwrap();
    }

    let db = Arc::new(Database::open(config(&dir)).unwrap());
    assert_eq!(db.find_by_name("items").unwrap().status(), CollectionStatus::Unloaded);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let guard = db.use_by_name("items").unwrap();
                assert_eq!(guard.count(), 1);
                guard.proxy().status()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), CollectionStatus::Loaded);
    }
    assert_eq!(db.open_count(), 1);
}

#[test]
fn test_pending_drop_blocks_resurrection() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(config(&dir)).unwrap();
    let doomed = db.create_collection("doomed", CreateOptions::default()).unwrap();
    let path = doomed.path().unwrap();

    let guard = db.use_collection(&doomed).unwrap();
    db.unload(&doomed).unwrap();
    db.drop_collection(&doomed).unwrap();

    assert_eq!(doomed.status(), CollectionStatus::Deleted);
    assert!(db.use_collection(&doomed).unwrap_err().is(ErrorKind::CollectionNotFound));
    assert!(db.use_by_name("doomed").unwrap_err().is(ErrorKind::CollectionNotFound));

    db.run_cleanup_pass();
    assert!(path.exists());

    drop(guard);
    db.run_cleanup_pass();
    assert!(!path.exists());
    assert!(!dir.path().join(format!("deleted-{}", doomed.id())).exists());
    assert!(db.list_all().is_empty());
}

#[test]
fn test_unload_is_resurrected_by_use() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(config(&dir)).unwrap();
    let phoenix = db.create_collection("phoenix", CreateOptions::default()).unwrap();

    let first = db.use_collection(&phoenix).unwrap();
    first.insert(json!({"_key": "egg"})).unwrap();
    db.unload(&phoenix).unwrap();
    assert_eq!(phoenix.status(), CollectionStatus::Unloading);

    let second = db.use_collection(&phoenix).unwrap();
    assert_eq!(phoenix.status(), CollectionStatus::Loaded);
    drop(first);
    drop(second);

    // the stale unload callback must not fire
    db.run_cleanup_pass();
    assert_eq!(phoenix.status(), CollectionStatus::Loaded);
    assert_eq!(db.use_collection(&phoenix).unwrap().count(), 1);
    assert_eq!(db.open_count(), 1);
}

#[test]
fn test_unload_of_non_loaded_states() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(config(&dir)).unwrap();
    let born = db.create_new("born", CollectionType::Document, None).unwrap();

    db.unload(&born).unwrap();
    assert_eq!(born.status(), CollectionStatus::NewBorn);

    let loaded = db.create_collection("loaded", CreateOptions::default()).unwrap();
    db.unload(&loaded).unwrap();
    db.unload(&loaded).unwrap();
    db.run_cleanup_pass();
    assert_eq!(loaded.status(), CollectionStatus::Unloaded);
    db.unload(&loaded).unwrap();
    assert_eq!(loaded.status(), CollectionStatus::Unloaded);
}

#[test]
fn test_rename() {
    let dir = TempDir::new().unwrap();
    let cid = {
        let db = Database::open(config(&dir)).unwrap();
        let proxy = db.create_collection("old", CreateOptions::default()).unwrap();
        db.create_new("other", CollectionType::Document, None).unwrap();

        db.rename(&proxy, "new").unwrap();
        assert!(db.find_by_name("old").is_none());
        assert_eq!(db.find_by_name("new").unwrap().id(), proxy.id());
        assert_eq!(db.use_collection(&proxy).unwrap().name(), "new");

        db.rename(&proxy, "new").unwrap();
        assert!(db.rename(&proxy, "other").unwrap_err().is(ErrorKind::DuplicateName));
        assert!(db.rename(&proxy, "1bad").unwrap_err().is(ErrorKind::IllegalName));

        db.unload(&proxy).unwrap();
        db.run_cleanup_pass();
        assert_eq!(proxy.status(), CollectionStatus::Unloaded);

        db.rename(&proxy, "newer").unwrap();
        assert_eq!(proxy.name(), "newer");
        assert_eq!(proxy.status(), CollectionStatus::Unloaded);
        proxy.id()
    };

    let db = Database::open(config(&dir)).unwrap();
    assert!(db.find_by_name("new").is_none());
    assert_eq!(db.find_by_name("newer").unwrap().id(), cid);
}

#[test]
fn test_system_flag_is_given_not_derived() {
    let dir = TempDir::new().unwrap();
    let system = CreateOptions {
        is_system: true,
        ..CreateOptions::default()
    };
    let cid = {
        let db = Database::open(config(&dir)).unwrap();

        assert!(db.create_new("_x", CollectionType::Document, None).unwrap_err().is(ErrorKind::IllegalName));
        assert!(db.find_or_bear("_x", CollectionType::Document).unwrap_err().is(ErrorKind::IllegalName));
        let err = db.create_collection("_x", CreateOptions::default()).unwrap_err();
        assert!(err.is(ErrorKind::IllegalName));
        assert!(db.list_all().is_empty());

        let graphs = db.create_collection("_graphs", system.clone()).unwrap();
        assert!(graphs.is_system());
        assert!(CollectionInfo::load(&graphs.path().unwrap()).unwrap().is_system);

        // the flag is stored as given, whatever the name looks like
        let trusted = db.create_collection("trusted", system.clone()).unwrap();
        assert!(CollectionInfo::load(&trusted.path().unwrap()).unwrap().is_system);
        let plain = db.create_collection("plain", CreateOptions::default()).unwrap();
        assert!(!plain.is_system());
        assert!(!CollectionInfo::load(&plain.path().unwrap()).unwrap().is_system);

        // renames keep the flag of the collection
        db.rename(&graphs, "_graphs2").unwrap();
        assert!(db.rename(&plain, "_plain").unwrap_err().is(ErrorKind::IllegalName));
        assert_eq!(plain.name(), "plain");
        graphs.id()
    };

    let db = Database::open(config(&dir)).unwrap();
    let graphs = db.find_by_name("_graphs2").unwrap();
    assert_eq!(graphs.id(), cid);
    assert!(graphs.is_system());
    assert!(db.find_by_name("trusted").unwrap().is_system());
    assert!(!db.find_by_name("plain").unwrap().is_system());
}

#[test]
fn test_rename_of_dropped_collection_fails() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(config(&dir)).unwrap();
    let proxy = db.create_new("gone", CollectionType::Document, None).unwrap();
    db.drop_collection(&proxy).unwrap();

    assert!(db.rename(&proxy, "back").unwrap_err().is(ErrorKind::CollectionNotFound));
}

#[test]
fn test_drop_unloaded_is_synchronous() {
    let dir = TempDir::new().unwrap();
    let cid = {
        let db = Database::open(config(&dir)).unwrap();
        db.create_collection("stale", CreateOptions::default()).unwrap().id()
    };

    let db = Database::open(config(&dir)).unwrap();
    let stale = db.find_by_id(cid).unwrap();
    db.drop_collection(&stale).unwrap();

    assert_eq!(stale.status(), CollectionStatus::Deleted);
    assert_eq!(entries(&dir), vec!["lock".to_string()]);
}

#[test]
fn test_drop_keeps_tombstone_without_remove_on_drop() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        remove_on_drop: false,
        ..config(&dir)
    };

    let cid = {
        let db = Database::open(config.clone()).unwrap();
        let keep = db.create_collection("keep", CreateOptions::default()).unwrap();
        db.use_collection(&keep).unwrap().insert(json!({"a": 1})).unwrap();

        db.drop_collection(&keep).unwrap();
        db.run_cleanup_pass();
        keep.id()
    };

    assert!(dir.path().join(format!("deleted-{}", cid)).is_dir());
    assert!(!dir.path().join(format!("collection-{}", cid)).exists());

    let db = Database::open(config).unwrap();
    assert!(db.list_all().is_empty());
}

#[test]
fn test_deleted_flag_on_disk_is_never_registered() {
    let dir = TempDir::new().unwrap();
    let cid = {
        let db = Database::open(config(&dir)).unwrap();
        let proxy = db.create_collection("half", CreateOptions::default()).unwrap();
        proxy.id()
    };

    let path = dir.path().join(format!("collection-{}", cid));
    let info = CollectionInfo { deleted: true, ..CollectionInfo::load(&path).unwrap() };
    info.save(&path).unwrap();

    let db = Database::open(config(&dir)).unwrap();
    assert!(db.find_by_id(cid).is_none());
    assert!(!path.exists());
}

#[test]
fn test_duplicate_names_on_disk_corrupt_the_database() {
    let dir = TempDir::new().unwrap();
    for cid in [1u64 << SERVER_ID_BITS, 2 << SERVER_ID_BITS] {
        let path = dir.path().join(format!("collection-{}", cid));
        fs::create_dir(&path).unwrap();
        CollectionInfo::new(cid, "twin", CollectionType::Document, 1024).save(&path).unwrap();
    }

    let err = Database::open(config(&dir)).unwrap_err();
    assert!(err.is(ErrorKind::CorruptedDatabase));
    // the failed open released the lock
    assert!(!dir.path().join("lock").exists());
}

#[test]
fn test_database_lock_and_path() {
    let dir = TempDir::new().unwrap();
    let first = Database::open(config(&dir)).unwrap();

    let err = Database::open(config(&dir)).unwrap_err();
    assert!(err.is(ErrorKind::DatabaseLocked));

    drop(first);
    assert!(Database::open(config(&dir)).is_ok());

    let missing = Config::new(dir.path().join("missing"));
    assert!(Database::open(missing).unwrap_err().is(ErrorKind::WrongDatabasePath));
}

#[test]
fn test_ids_never_repeat_across_restarts() {
    let dir = TempDir::new().unwrap();
    let first = {
        let db = Database::open(config(&dir)).unwrap();
        db.create_collection("a", CreateOptions::default()).unwrap().id()
    };

    let db = Database::open(config(&dir)).unwrap();
    let second = db.create_new("b", CollectionType::Document, None).unwrap().id();
    assert!(second >> SERVER_ID_BITS > first >> SERVER_ID_BITS);
}

#[test]
fn test_indexes_survive_reload() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(config(&dir)).unwrap();
    let people = db.create_collection("people", CreateOptions::default()).unwrap();

    {
        let guard = db.use_collection(&people).unwrap();
        let (definition, created) = guard.ensure_index(IndexDefinition::hash(&["email"], true, false)).unwrap();
        assert!(created);
        guard.insert(json!({"email": "a@example.com"})).unwrap();
        guard.insert(json!({"email": "b@example.com"})).unwrap();
        let err = guard.insert(json!({"email": "a@example.com"})).unwrap_err();
        assert!(err.is(ErrorKind::UniqueConstraintViolated));
        assert!(dir.path().join(format!("collection-{}", people.id())).join(format!("index-{}.json", definition.id)).exists());
    }

    db.unload(&people).unwrap();
    db.run_cleanup_pass();
    assert_eq!(people.status(), CollectionStatus::Unloaded);

    let guard = db.use_collection(&people).unwrap();
    let hits = guard.lookup(&IndexOperator::eq("email", json!("b@example.com")), None).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(guard.count(), 2);
}

#[test]
fn test_edge_collections() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(config(&dir)).unwrap();
    let options = CreateOptions {
        kind: CollectionType::Edge,
        ..CreateOptions::default()
    };
    let knows = db.create_collection("knows", options).unwrap();
    assert_eq!(knows.kind(), CollectionType::Edge);

    let guard = db.use_collection(&knows).unwrap();
    guard.insert(json!({"_from": "people/a", "_to": "people/b"})).unwrap();
    assert!(guard.insert(json!({"_from": "people/a"})).is_err());
    assert_eq!(guard.count(), 1);
}

#[test]
fn test_maintenance_threads_complete_unload() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        start_maintenance: true,
        sync_interval: Duration::from_millis(5),
        compaction_interval: Duration::from_millis(5),
        cleanup_interval: Duration::from_millis(5),
        ..Config::new(dir.path())
    };
    let db = Database::open(config).unwrap();
    let items = db.create_collection("items", CreateOptions::default()).unwrap();
    db.use_collection(&items).unwrap().insert(json!({"n": 1})).unwrap();

    db.unload(&items).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while items.status() != CollectionStatus::Unloaded {
        assert!(Instant::now() < deadline, "unload never completed");
        thread::sleep(Duration::from_millis(5));
    }

    db.close();
    assert!(!dir.path().join("lock").exists());
}

#[test]
fn test_close_releases_held_collections() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(config(&dir)).unwrap();
    let items = db.create_collection("items", CreateOptions::default()).unwrap();
    let guard = db.use_collection(&items).unwrap();

    db.close();
    assert!(guard.is_closed());
    assert!(db.list_all().is_empty());
    drop(guard);

    // a second close is a no-op
    db.close();
}

#[test]
fn test_closed_handle_rejects_operations() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(config(&dir)).unwrap();
    let items = db.create_collection("items", CreateOptions::default()).unwrap();
    db.use_collection(&items).unwrap().insert(json!({"_key": "one"})).unwrap();

    db.close();
    assert!(db.is_closed());
    let opens = db.open_count();

    let closed = |result: docvault::Result<()>| result.unwrap_err().is(ErrorKind::DatabaseClosed);
    assert!(closed(db.use_collection(&items).map(drop)));
    assert!(closed(db.use_by_name("items").map(drop)));
    assert!(closed(db.use_by_id(items.id()).map(drop)));
    assert!(closed(db.create_new("late", CollectionType::Document, None).map(drop)));
    assert!(closed(db.find_or_bear("late", CollectionType::Document).map(drop)));
    assert!(closed(db.create_collection("late", CreateOptions::default()).map(drop)));
    assert!(closed(db.unload(&items)));
    assert!(closed(db.drop_collection(&items)));
    assert!(closed(db.rename(&items, "renamed")));
    assert!(closed(db.reload_auth().map(drop)));

    assert_eq!(db.open_count(), opens);
    assert_ne!(items.status(), CollectionStatus::Loaded);
    assert!(!dir.path().join("lock").exists());

    // the directory is free for a new handle and nothing changed on disk
    let reopened = Database::open(config(&dir)).unwrap();
    assert!(reopened.find_by_name("late").is_none());
    assert!(reopened.find_by_name("renamed").is_none());
    assert_eq!(reopened.use_by_name("items").unwrap().count(), 1);
}

#[test]
fn test_auth_reload() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(config(&dir)).unwrap();
    assert_eq!(db.reload_auth().unwrap(), 0);

    let options = CreateOptions {
        is_system: true,
        ..CreateOptions::default()
    };
    let users = db.create_collection(USERS_COLLECTION, options).unwrap();
    {
        let guard = db.use_collection(&users).unwrap();
        guard.insert(json!({"user": "root", "password": "secret"})).unwrap();
        guard.insert(json!({"user": "guest", "password": "", "active": false})).unwrap();
    }

    assert_eq!(db.reload_auth().unwrap(), 2);
    assert!(db.auth().is_active("root"));
    assert!(!db.auth().is_active("guest"));
}
