/// Signup code lifecycle: issue, redeem, expiry and sweeping
use chrono::{Duration, TimeZone, Utc};
use media_lounge::verification::{
    MemoryCodeCache, VerificationError, VerificationStore, DEFAULT_CODE_TTL_SECS,
};
use std::sync::Arc;

fn store() -> (VerificationStore, Arc<MemoryCodeCache>) {
    let cache = Arc::new(MemoryCodeCache::new());
    (
        VerificationStore::new(cache.clone(), DEFAULT_CODE_TTL_SECS),
        cache,
    )
}

#[tokio::test]
async fn test_code_redeems_exactly_once() {
    let (codes, _) = store();
    let code = codes
        .issue("ann@example.com", "Ann", "argon-hash")
        .await
        .unwrap();
    assert_eq!(code.len(), 6);

    let signup = codes.redeem("ann@example.com", &code).await.unwrap();
    assert_eq!(signup.email, "ann@example.com");
    assert_eq!(signup.name, "Ann");
    assert_eq!(signup.password_hash, "argon-hash");

    assert_eq!(
        codes.redeem("ann@example.com", &code).await,
        Err(VerificationError::NotFound)
    );
}

#[tokio::test]
async fn test_reissue_invalidates_previous_code() {
    let (codes, _) = store();
    let first = codes.issue("ann@example.com", "Ann", "h1").await.unwrap();

    let mut second = codes.issue("ann@example.com", "Ann", "h2").await.unwrap();
    while second == first {
        second = codes.issue("ann@example.com", "Ann", "h2").await.unwrap();
    }

    assert_eq!(
        codes.redeem("ann@example.com", &first).await,
        Err(VerificationError::Mismatch)
    );
    let signup = codes.redeem("ann@example.com", &second).await.unwrap();
    assert_eq!(signup.password_hash, "h2");
}

#[tokio::test]
async fn test_expiry_boundary() {
    let issued = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let expires = issued + Duration::minutes(10);

    let (codes, _) = store();
    let code = codes
        .issue_at("ann@example.com", "Ann", "h", issued)
        .await
        .unwrap();
    assert!(codes.redeem_at("ann@example.com", &code, expires).await.is_ok());

    let code = codes
        .issue_at("bob@example.com", "Bob", "h", issued)
        .await
        .unwrap();
    assert_eq!(
        codes
            .redeem_at("bob@example.com", &code, expires + Duration::milliseconds(1))
            .await,
        Err(VerificationError::Expired)
    );
    // The expired entry is gone after the failed attempt
    assert_eq!(
        codes.redeem_at("bob@example.com", &code, issued).await,
        Err(VerificationError::NotFound)
    );
}

#[tokio::test]
async fn test_unknown_email_is_not_found() {
    let (codes, _) = store();
    assert_eq!(
        codes.redeem("nobody@example.com", "123456").await,
        Err(VerificationError::NotFound)
    );
}

#[tokio::test]
async fn test_sweep_drops_expired_codes() {
    let issued = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let (codes, cache) = store();

    codes.issue_at("old@example.com", "Old", "h", issued).await.unwrap();
    let fresh = codes
        .issue_at("new@example.com", "New", "h", issued + Duration::minutes(9))
        .await
        .unwrap();

    let removed = codes
        .sweep_at(issued + Duration::minutes(11))
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(cache.len().await, 1);

    assert!(codes
        .redeem_at("new@example.com", &fresh, issued + Duration::minutes(12))
        .await
        .is_ok());
}
