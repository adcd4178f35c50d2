//! Filesystem token storage.

use bulwark_core::OAuthToken;
use bulwark_oauth::{FileTokenStorage, TokenStorage};
use chrono::{Duration, Utc};

#[tokio::test]
async fn save_load_delete_cycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = FileTokenStorage::new(dir.path().join("tokens")).expect("storage");

    assert!(storage.load("trakt").await.expect("load").is_none());

    let token = OAuthToken::new("abc")
        .with_refresh_token("def")
        .with_expiry(Utc::now() + Duration::days(90));
    storage.save("trakt", &token).await.expect("save");
    assert!(storage.path_for("trakt").exists());
    assert_eq!(storage.load("trakt").await.expect("load"), Some(token));

    storage.delete("trakt").await.expect("delete");
    storage.delete("trakt").await.expect("delete missing");
    assert!(storage.load("trakt").await.expect("load").is_none());
}

#[tokio::test]
async fn corrupt_file_is_a_serialization_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = FileTokenStorage::new(dir.path()).expect("storage");
    std::fs::write(storage.path_for("spotify"), b"not json").expect("write");

    let err = storage.load("spotify").await.expect_err("corrupt");
    assert!(err.to_string().contains("Serialization failed"));
}

#[tokio::test]
async fn clients_do_not_collide() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = FileTokenStorage::new(dir.path()).expect("storage");
    storage.save("a", &OAuthToken::new("one")).await.expect("save");
    storage.save("b", &OAuthToken::new("two")).await.expect("save");

    let a = storage.load("a").await.expect("load").expect("present");
    let b = storage.load("b").await.expect("load").expect("present");
    assert_eq!(a.access_token, "one");
    assert_eq!(b.access_token, "two");
}
