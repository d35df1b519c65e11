use chrono::{Duration, Utc};
use jobhound_core::models::{EmploymentType, Posting};
use jobhound_core::testutil::make_raw_posting;
use jobhound_core::traits::PostingStore;
use jobhound_db::PostingQuery;

use crate::integration::common::setup_test_db;

fn posting(source: &str, title: &str, company: &str, location: &str) -> Posting {
    Posting::from_raw(make_raw_posting(source, title, company, location), Utc::now())
}

#[tokio::test]
async fn save_batch_and_find_by_fingerprint() {
    let (db, _container) = setup_test_db().await;
    let repo = db.posting_repo();

    let rust = posting("indeed", "Rust Engineer", "Ferrous", "Berlin");
    let go = posting("linkedin", "Go Developer", "Gopher Inc", "Remote");

    let written = repo.save_batch(&[rust.clone(), go]).await.unwrap();
    assert_eq!(written, 2);
    assert_eq!(repo.count().await.unwrap(), 2);

    let stored = repo
        .find_by_fingerprint(rust.fingerprint())
        .await
        .unwrap()
        .expect("Should find the posting");
    assert!(!stored.id.is_nil());
    assert_eq!(stored.title, "Rust Engineer");
    assert_eq!(stored.company, "Ferrous");
    assert_eq!(stored.source, "indeed");
    assert_eq!(stored.employment_type, EmploymentType::FullTime);
    assert_eq!(stored.fingerprint, rust.fingerprint());

    assert!(repo.find_by_fingerprint("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_fingerprint_refreshes_timestamps_only() {
    let (db, _container) = setup_test_db().await;
    let repo = db.posting_repo();

    let first = posting("indeed", "SRE", "Acme", "Remote");
    repo.save_batch(std::slice::from_ref(&first)).await.unwrap();
    let before = repo
        .find_by_fingerprint(first.fingerprint())
        .await
        .unwrap()
        .unwrap();

    // Same identity from another board, scraped later.
    let mut raw = make_raw_posting("glassdoor", "  sre ", "ACME", "remote");
    raw.description = "Different text".into();
    let later = Posting::from_raw(raw, Utc::now() + Duration::seconds(5));
    assert_eq!(later.fingerprint(), first.fingerprint());

    repo.save_batch(&[later.clone()]).await.unwrap();

    assert_eq!(repo.count().await.unwrap(), 1);
    let after = repo
        .find_by_fingerprint(first.fingerprint())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.source, "indeed");
    assert_eq!(after.description, before.description);
    assert_eq!(after.created_at, before.created_at);
    assert!(after.scraped_at > before.scraped_at);
    assert!(after.updated_at >= before.updated_at);
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
    let (db, _container) = setup_test_db().await;
    let repo = db.posting_repo();

    assert_eq!(repo.save_batch(&[]).await.unwrap(), 0);
    assert_eq!(repo.count().await.unwrap(), 0);
}

#[tokio::test]
async fn search_applies_filters() {
    let (db, _container) = setup_test_db().await;
    let repo = db.posting_repo();

    let mut contract = make_raw_posting("linkedin", "Go Developer", "Gopher Inc", "Chicago, IL");
    contract.employment_type = EmploymentType::Contract;
    repo.save_batch(&[
        posting("indeed", "Rust Engineer", "Ferrous", "Berlin"),
        posting("indeed", "Data Engineer", "Rustacean Labs", "Remote"),
        Posting::from_raw(contract, Utc::now()),
    ])
    .await
    .unwrap();

    let by_keyword = repo
        .search(&PostingQuery {
            keywords: Some("rust".into()),
            ..PostingQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(by_keyword.len(), 2);

    let remote = repo
        .search(&PostingQuery {
            remote: Some(true),
            ..PostingQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].title, "Data Engineer");

    let by_location = repo
        .search(&PostingQuery {
            location: Some("chicago".into()),
            ..PostingQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(by_location.len(), 1);

    let by_type = repo
        .search(&PostingQuery {
            employment_type: Some(EmploymentType::Contract),
            ..PostingQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(by_type.len(), 1);
    assert_eq!(by_type[0].source, "linkedin");

    let paged = repo
        .search(&PostingQuery {
            source: Some("indeed".into()),
            limit: 1,
            offset: 1,
            ..PostingQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(paged.len(), 1);

    let counts = repo.count_by_source().await.unwrap();
    assert_eq!(
        counts,
        vec![("indeed".to_string(), 2), ("linkedin".to_string(), 1)]
    );
}

#[tokio::test]
async fn repository_works_through_the_store_trait() {
    let (db, _container) = setup_test_db().await;

    async fn save_all(store: &impl PostingStore, postings: &[Posting]) -> usize {
        store.save_batch(postings).await.unwrap()
    }

    let repo = db.posting_repo();
    let written = save_all(&repo, &[posting("indeed", "SRE", "Acme", "Remote")]).await;
    assert_eq!(written, 1);
    repo.health_check().await.unwrap();
}

#[tokio::test]
async fn stats_aggregate_stored_postings() {
    let (db, _container) = setup_test_db().await;
    let repo = db.posting_repo();

    let empty = repo.stats().await.unwrap();
    assert_eq!(empty.total, 0);
    assert!(empty.last_scraped_at.is_none());
    assert!(empty.top_companies.is_empty());

    let mut today = make_raw_posting("indeed", "Rust Engineer", "Ferrous", "Remote");
    today.posted_at = Some(Utc::now());
    let mut contract = make_raw_posting("linkedin", "Go Developer", "Ferrous", "Berlin");
    contract.employment_type = EmploymentType::Contract;
    contract.posted_at = Some(Utc::now() - Duration::days(3));
    let latest_scrape = Utc::now() + Duration::seconds(5);
    repo.save_batch(&[
        Posting::from_raw(today, Utc::now()),
        Posting::from_raw(contract, Utc::now()),
        Posting::from_raw(
            make_raw_posting("indeed", "SRE", "Acme", "Remote"),
            latest_scrape,
        ),
    ])
    .await
    .unwrap();

    let stats = repo.stats().await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.remote, 2);
    assert_eq!(stats.posted_today, 1);
    assert_eq!(stats.by_source.get("indeed"), Some(&2));
    assert_eq!(stats.by_source.get("linkedin"), Some(&1));
    assert_eq!(stats.by_employment_type.get("full_time"), Some(&2));
    assert_eq!(stats.by_employment_type.get("contract"), Some(&1));
    assert_eq!(stats.top_companies[0].name, "Ferrous");
    assert_eq!(stats.top_companies[0].count, 2);
    assert_eq!(stats.top_locations[0].name, "Remote");
    assert_eq!(stats.top_locations[0].count, 2);

    let last = stats.last_scraped_at.unwrap();
    assert!((last - latest_scrape).num_milliseconds().abs() < 1);
}

#[tokio::test]
async fn delete_older_than_uses_posted_then_scraped_date() {
    let (db, _container) = setup_test_db().await;
    let repo = db.posting_repo();

    let mut old_posted = make_raw_posting("indeed", "Old Posting", "Acme", "Remote");
    old_posted.posted_at = Some(Utc::now() - Duration::days(40));
    let mut fresh_posted = make_raw_posting("indeed", "Fresh Posting", "Acme", "Remote");
    fresh_posted.posted_at = Some(Utc::now() - Duration::days(2));
    // No posting date: falls back to when it was scraped.
    let old_scraped = make_raw_posting("glassdoor", "Old Scrape", "Initech", "Remote");
    let fresh_scraped = make_raw_posting("glassdoor", "Fresh Scrape", "Initech", "Remote");

    repo.save_batch(&[
        Posting::from_raw(old_posted, Utc::now()),
        Posting::from_raw(fresh_posted, Utc::now()),
        Posting::from_raw(old_scraped, Utc::now() - Duration::days(40)),
        Posting::from_raw(fresh_scraped, Utc::now()),
    ])
    .await
    .unwrap();

    assert_eq!(repo.delete_older_than(30).await.unwrap(), 2);
    assert_eq!(repo.count().await.unwrap(), 2);

    let titles: Vec<String> = repo
        .search(&PostingQuery::default())
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.title)
        .collect();
    assert!(titles.contains(&"Fresh Posting".to_string()));
    assert!(titles.contains(&"Fresh Scrape".to_string()));

    assert_eq!(repo.delete_older_than(30).await.unwrap(), 0);
}
