//! User store tests: on-disk persistence, idempotent upserts, friendship queries.

use chrono::{DateTime, Utc};
use liff_core::UserRecord;
use liff_server::db::Db;

fn user(id: &str, name: &str, is_friend: Option<bool>) -> UserRecord {
    UserRecord {
        user_id: id.into(),
        display_name: name.into(),
        picture_url: None,
        status_message: Some("hi".into()),
        is_friend,
    }
}

fn at(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap()
}

#[test]
fn users_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.db");

    {
        let db = Db::open(&path).unwrap();
        db.upsert_user(&user("U1", "Alice", Some(true)), at(1_000)).unwrap();
    }

    let db = Db::open(&path).unwrap();
    let alice = db.get_user("U1").unwrap().unwrap();
    assert_eq!(alice.display_name, "Alice");
    assert_eq!(alice.is_friend, Some(true));
    assert_eq!(alice.created_at, at(1_000));
}

#[test]
fn repeated_saves_keep_one_row() {
    let db = Db::open_memory().unwrap();
    for i in 0..5 {
        db.upsert_user(&user("U1", "Alice", None), at(1_000 + i)).unwrap();
    }
    assert_eq!(db.user_count().unwrap(), 1);
    let alice = db.get_user("U1").unwrap().unwrap();
    assert_eq!(alice.updated_at, at(1_000));
    assert_eq!(alice.is_friend, None);
}

#[test]
fn friendship_filter_skips_unknown() {
    let db = Db::open_memory().unwrap();
    db.upsert_user(&user("U2", "Bob", Some(true)), at(1)).unwrap();
    db.upsert_user(&user("U1", "Alice", Some(true)), at(1)).unwrap();
    db.upsert_user(&user("U3", "Carol", Some(false)), at(1)).unwrap();
    db.upsert_user(&user("U4", "Dave", None), at(1)).unwrap();

    let friends: Vec<_> = db
        .users_by_friendship(true)
        .unwrap()
        .into_iter()
        .map(|u| u.user_id)
        .collect();
    assert_eq!(friends, vec!["U1", "U2"]);

    let others = db.users_by_friendship(false).unwrap();
    assert_eq!(others.len(), 1);
    assert_eq!(others[0].user_id, "U3");
}

#[test]
fn delete_reports_whether_a_row_existed() {
    let db = Db::open_memory().unwrap();
    db.upsert_user(&user("U1", "Alice", None), at(1)).unwrap();
    assert!(db.delete_user("U1").unwrap());
    assert!(!db.delete_user("U1").unwrap());
    assert_eq!(db.get_user("U1").unwrap(), None);
    assert_eq!(db.user_count().unwrap(), 0);
}
