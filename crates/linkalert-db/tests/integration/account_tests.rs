use chrono::NaiveDate;
use linkalert_core::error::AppError;
use linkalert_core::traits::AccountStore;

use crate::integration::common::{setup_test_db, urls};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn fresh_database_has_no_account() {
    let (db, _container) = setup_test_db().await;
    let account = db.account();

    assert!(account.snapshot().await.unwrap().is_none());
    assert_eq!(account.get_checkpoint().await.unwrap(), None);
    assert!(account.get_profiles().await.unwrap().is_empty());
    assert!(account.get_emails().await.unwrap().is_empty());
}

#[tokio::test]
async fn health_check_passes_on_live_database() {
    let (db, _container) = setup_test_db().await;
    db.health_check().await.unwrap();
}

#[tokio::test]
async fn initialize_creates_empty_account() {
    let (db, _container) = setup_test_db().await;
    let account = db.account();

    let snapshot = account.initialize("refresh-1").await.unwrap();

    assert!(snapshot.emails.is_empty());
    assert!(snapshot.profiles.is_empty());
    assert_eq!(snapshot.last_checked, None);
    assert_eq!(
        account.refresh_token().await.unwrap().as_deref(),
        Some("refresh-1")
    );
}

#[tokio::test]
async fn reinitialize_keeps_preferences() {
    let (db, _container) = setup_test_db().await;
    let account = db.account();
    account.initialize("refresh-1").await.unwrap();
    account
        .set_emails(&urls(&["ops@example.com"]))
        .await
        .unwrap();
    account.set_checkpoint(date(2024, 2, 1)).await.unwrap();

    let snapshot = account.initialize("refresh-2").await.unwrap();

    assert_eq!(snapshot.emails, urls(&["ops@example.com"]));
    assert_eq!(snapshot.last_checked, Some(date(2024, 2, 1)));
    assert_eq!(
        account.refresh_token().await.unwrap().as_deref(),
        Some("refresh-2")
    );
}

#[tokio::test]
async fn mutations_return_fresh_snapshots() {
    let (db, _container) = setup_test_db().await;
    let account = db.account();
    account.initialize("refresh-1").await.unwrap();

    let after_emails = account
        .set_emails(&urls(&["a@example.com", "b@example.com"]))
        .await
        .unwrap();
    assert_eq!(after_emails.emails.len(), 2);

    let after_profile = account
        .upsert_profile("56543886", "Main site")
        .await
        .unwrap();
    assert_eq!(after_profile.profiles["56543886"], "Main site");

    let renamed = account
        .upsert_profile("56543886", "Main site (www)")
        .await
        .unwrap();
    assert_eq!(renamed.profiles.len(), 1);
    assert_eq!(renamed.profiles["56543886"], "Main site (www)");

    let after_remove = account.remove_profile("56543886").await.unwrap();
    assert!(after_remove.profiles.is_empty());
}

#[tokio::test]
async fn checkpoint_roundtrip() {
    let (db, _container) = setup_test_db().await;
    let account = db.account();
    account.initialize("refresh-1").await.unwrap();

    account.set_checkpoint(date(2024, 3, 14)).await.unwrap();

    assert_eq!(
        account.get_checkpoint().await.unwrap(),
        Some(date(2024, 3, 14))
    );
}

#[tokio::test]
async fn writes_require_initialized_account() {
    let (db, _container) = setup_test_db().await;
    let account = db.account();

    let err = account.set_checkpoint(date(2024, 3, 14)).await.unwrap_err();
    assert!(matches!(err, AppError::ConfigError(_)));

    let err = account
        .set_emails(&urls(&["ops@example.com"]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ConfigError(_)));

    let err = account.upsert_profile("1", "Site").await.unwrap_err();
    assert!(matches!(err, AppError::ConfigError(_)));
    assert!(account.get_profiles().await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_keeps_seen_links() {
    let (db, _container) = setup_test_db().await;
    let account = db.account();
    account.initialize("refresh-1").await.unwrap();
    account.upsert_profile("1", "Site").await.unwrap();
    let store = db.seen_links();
    linkalert_core::traits::SeenLinkStore::record(&store, "1", &urls(&["a.com/x"]))
        .await
        .unwrap();

    account.delete().await.unwrap();

    assert!(account.snapshot().await.unwrap().is_none());
    assert!(account.get_profiles().await.unwrap().is_empty());
    assert_eq!(store.count_for_profile("1").await.unwrap(), 1);
}
