// tests/dedup_retention.rs
//
// Retention and idempotence of the seen-entry store over longer insert runs.

use chrono::{Duration, TimeZone, Utc};

use watchlist_relay::dedup::{identity_for_link, DedupStore, IdentityScheme};

fn link(n: usize) -> String {
    format!("https://example.com/article/{n}")
}

#[tokio::test]
async fn never_exceeds_cap_and_keeps_the_newest() {
    const CAP: usize = 25;
    let store = DedupStore::in_memory(IdentityScheme::Link, CAP);
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    for n in 0..100 {
        let id = identity_for_link(&link(n));
        assert!(store.mark_seen(&id, t0 + Duration::minutes(n as i64)).await.unwrap());
        assert!(store.len() <= CAP);
        // re-marking is a no-op
        assert!(!store.mark_seen(&id, t0).await.unwrap());
    }

    assert_eq!(store.len(), CAP);
    for n in 0..75 {
        assert!(!store.is_seen(&identity_for_link(&link(n))), "{n} should be evicted");
    }
    for n in 75..100 {
        assert!(store.is_seen(&identity_for_link(&link(n))), "{n} should be kept");
    }
}

#[tokio::test]
async fn cap_is_applied_when_reopening_with_a_smaller_limit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seen.json");
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    {
        let store = DedupStore::open(&path, IdentityScheme::Link, 10).await;
        for n in 0..10 {
            store
                .mark_seen(&identity_for_link(&link(n)), t0 + Duration::seconds(n as i64))
                .await
                .unwrap();
        }
    }

    let smaller = DedupStore::open(&path, IdentityScheme::Link, 4).await;
    assert_eq!(smaller.len(), 4);
    assert!(smaller.is_seen(&identity_for_link(&link(9))));
    assert!(!smaller.is_seen(&identity_for_link(&link(5))));

    // a different identity scheme does not reuse link hashes
    let titles = DedupStore::open(&path, IdentityScheme::Title, 10).await;
    assert_eq!(titles.scheme(), IdentityScheme::Title);
    assert!(titles.is_empty());
}
