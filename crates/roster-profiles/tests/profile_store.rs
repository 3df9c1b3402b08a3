//! End-to-end profile store behavior over traced in-memory storage.
//!
//! Every test checks the observable contract: what ends up in the object,
//! how many writes reached storage, and that no temporary copy survives.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use roster_core::storage::WritePrecondition;
use roster_profiles::{
    AddOutcome, MemberType, NewProfile, Platform, ProfileField, ProfileRecord, ProfileStore,
    ProfileUpdate, RawMetadata, SessionCache, StoreOptions, UpdateOutcome, decode, encode,
};
use roster_test_utils::{StorageOp, TEST_PROFILE_PATH, TestContext, init_test_logging};

fn store(ctx: &TestContext) -> ProfileStore {
    ProfileStore::new(
        ctx.bucket.clone(),
        Arc::new(SessionCache::new()),
        StoreOptions::new(TEST_PROFILE_PATH, ctx.scratch_dir()),
    )
}

fn seed(ctx: &TestContext, records: &[ProfileRecord]) {
    ctx.storage
        .seed(TEST_PROFILE_PATH, encode(records).expect("encode"));
    ctx.storage.clear_operations();
}

fn stored(ctx: &TestContext) -> Vec<ProfileRecord> {
    decode(&ctx.storage.object(TEST_PROFILE_PATH).expect("object")).expect("decode")
}

fn alice() -> ProfileRecord {
    ProfileRecord {
        username: Some("alice".into()),
        github_url: Some("https://github.com/alice".into()),
        ..ProfileRecord::default()
    }
}

fn bob_request() -> NewProfile {
    NewProfile {
        github_url: Some("https://github.com/bob".into()),
        linkedin_url: None,
        facebook_url: None,
        member_type: MemberType::Community,
    }
}

#[tokio::test]
async fn add_profile_appends_second_record() {
    init_test_logging();
    let ctx = TestContext::new();
    seed(&ctx, &[alice()]);
    let store = store(&ctx);

    let outcome = store.add_profile(bob_request()).await.expect("add");

    let bob = ProfileRecord {
        profile_url: Some("https://github.com/bob".into()),
        username: Some("bob".into()),
        member_type: Some("community".into()),
        github_url: Some("https://github.com/bob".into()),
        ..ProfileRecord::default()
    };
    assert_eq!(outcome, AddOutcome::Added(bob.clone()));
    assert_eq!(stored(&ctx), vec![alice(), bob]);
    assert_eq!(ctx.storage.put_count(), 1);
    assert_eq!(
        ctx.storage.content_type(TEST_PROFILE_PATH).as_deref(),
        Some("application/parquet")
    );
    ctx.assert_scratch_empty();
}

#[tokio::test]
async fn reclassify_updates_matches_and_skips_write_without_matches() {
    let ctx = TestContext::new();
    seed(&ctx, &[alice()]);
    let store = store(&ctx);
    store.add_profile(bob_request()).await.expect("add bob");
    ctx.storage.clear_operations();

    let outcome = store
        .reclassify(&["alice".to_string()], MemberType::Dwarves)
        .await
        .expect("reclassify");
    assert_eq!(outcome.matched, 1);
    let profiles = stored(&ctx);
    assert_eq!(profiles[0].member_type.as_deref(), Some("dwarves"));
    assert_eq!(profiles[1].member_type.as_deref(), Some("community"));
    assert_eq!(ctx.storage.put_count(), 1);

    let before = ctx.storage.object(TEST_PROFILE_PATH).expect("object");
    let outcome = store
        .reclassify(&["charlie".to_string()], MemberType::Alumni)
        .await
        .expect("reclassify");
    assert_eq!(outcome.matched, 0);
    assert_eq!(ctx.storage.put_count(), 1);
    assert_eq!(ctx.storage.object(TEST_PROFILE_PATH), Some(before));
    ctx.assert_scratch_empty();
}

#[tokio::test]
async fn reclassify_twice_is_byte_identical() {
    let ctx = TestContext::new();
    seed(&ctx, &[alice()]);
    let store = store(&ctx);
    let targets = vec!["alice".to_string()];

    store
        .reclassify(&targets, MemberType::Alumni)
        .await
        .expect("first");
    let once = ctx.storage.object(TEST_PROFILE_PATH).expect("object");
    store
        .reclassify(&targets, MemberType::Alumni)
        .await
        .expect("second");
    let twice = ctx.storage.object(TEST_PROFILE_PATH).expect("object");

    assert_eq!(once, twice);
}

#[tokio::test]
async fn duplicate_identity_is_rejected_without_write() {
    let ctx = TestContext::new();
    seed(&ctx, &[alice()]);
    let store = store(&ctx);

    let outcome = store
        .add_profile(NewProfile {
            github_url: Some("https://github.com/alice".into()),
            linkedin_url: None,
            facebook_url: None,
            member_type: MemberType::Alumni,
        })
        .await
        .expect("add");

    assert_eq!(outcome, AddOutcome::Conflict { existing: alice() });
    assert_eq!(ctx.storage.put_count(), 0);
    assert_eq!(stored(&ctx), vec![alice()]);
    ctx.assert_scratch_empty();
}

#[tokio::test]
async fn update_with_unknown_username_does_not_write() {
    let ctx = TestContext::new();
    seed(&ctx, &[alice()]);
    let store = store(&ctx);

    let outcome = store
        .update_profile(
            "ghost",
            &ProfileUpdate::new().set(ProfileField::FacebookUrl, Some("https://fb.com/g".into())),
        )
        .await
        .expect("update");

    assert_eq!(outcome, UpdateOutcome::NotFound);
    assert_eq!(ctx.storage.put_count(), 0);
}

#[tokio::test]
async fn github_url_change_clears_github_crawl_state_in_same_write() {
    let ctx = TestContext::new();
    seed(
        &ctx,
        &[ProfileRecord {
            github_crawl_status: Some("done".into()),
            last_attempted_at: Some("2024-06-01T10:00:00Z".into()),
            github_extraction_error: Some("timeout".into()),
            github_crawled_at: Some("2024-06-01T10:00:00Z".into()),
            github_metadata: Some(RawMetadata::new(r#"{"followers":10}"#)),
            linkedin_crawl_status: Some("done".into()),
            ..alice()
        }],
    );
    let store = store(&ctx);

    store
        .update_profile(
            "alice",
            &ProfileUpdate::new().set(
                ProfileField::GithubUrl,
                Some("https://github.com/alice-renamed".into()),
            ),
        )
        .await
        .expect("update");

    let profiles = stored(&ctx);
    assert_eq!(ctx.storage.put_count(), 1);
    assert_eq!(
        profiles[0].github_url.as_deref(),
        Some("https://github.com/alice-renamed")
    );
    assert!(!profiles[0].has_crawl_state(Platform::GitHub));
    assert_eq!(profiles[0].linkedin_crawl_status.as_deref(), Some("done"));
}

#[tokio::test]
async fn clean_platform_metadata_clears_selected_platforms() {
    let ctx = TestContext::new();
    seed(
        &ctx,
        &[ProfileRecord {
            github_crawl_status: Some("done".into()),
            mochi: Some("alice".into()),
            mochi_profile_crawl_status: Some("done".into()),
            ..alice()
        }],
    );
    let store = store(&ctx);

    let outcome = store
        .clean_platform_metadata(&["alice".to_string()], &[Platform::Mochi])
        .await
        .expect("clean");

    assert_eq!(outcome.matched, 1);
    let profiles = stored(&ctx);
    assert_eq!(profiles[0].mochi_profile_crawl_status, None);
    assert_eq!(profiles[0].mochi.as_deref(), Some("alice"));
    assert_eq!(profiles[0].github_crawl_status.as_deref(), Some("done"));

    let outcome = store
        .clean_platform_metadata(&["ghost".to_string()], &[])
        .await
        .expect("clean");
    assert_eq!(outcome.matched, 0);
    assert_eq!(ctx.storage.put_count(), 1);
}

#[tokio::test]
async fn first_write_creates_missing_object() {
    let ctx = TestContext::new();
    let store = store(&ctx);

    store.add_profile(bob_request()).await.expect("add");

    let puts: Vec<_> = ctx
        .storage
        .operations()
        .into_iter()
        .filter_map(|op| match op {
            StorageOp::Put { precondition, .. } => Some(precondition),
            _ => None,
        })
        .collect();
    assert_eq!(puts, vec![WritePrecondition::DoesNotExist]);
    assert_eq!(stored(&ctx).len(), 1);
}

#[tokio::test]
async fn reads_of_missing_object_are_not_found() {
    let ctx = TestContext::new();
    let store = store(&ctx);

    let err = store.list_usernames().await.expect_err("missing");
    assert!(matches!(err, roster_profiles::ProfileError::ObjectNotFound { .. }));
    ctx.assert_scratch_empty();
}

#[tokio::test]
async fn queries_reuse_one_session_per_object() {
    let ctx = TestContext::new();
    seed(&ctx, &[alice()]);
    let store = store(&ctx);

    assert_eq!(store.list_usernames().await.expect("first"), vec!["alice"]);
    store.add_profile(bob_request()).await.expect("add");
    assert_eq!(
        store.list_usernames().await.expect("second"),
        vec!["alice", "bob"]
    );

    assert_eq!(store.sessions().len().await, 1);
    ctx.assert_scratch_empty();
}

#[tokio::test]
async fn bad_query_does_not_poison_session() {
    let ctx = TestContext::new();
    seed(&ctx, &[alice()]);
    let store = store(&ctx);

    let err = store
        .query("SELECT no_such_column FROM Profiles")
        .await
        .expect_err("bad column");
    assert!(matches!(err, roster_profiles::ProfileError::Query { .. }));

    let rows = store
        .query("SELECT username, member_type FROM Profiles")
        .await
        .expect("recovered");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["username"], "alice");
    assert_eq!(rows[0]["member_type"], serde_json::Value::Null);
    ctx.assert_scratch_empty();
}

#[tokio::test]
async fn non_select_statements_never_touch_storage() {
    let ctx = TestContext::new();
    seed(&ctx, &[alice()]);
    let store = store(&ctx);

    let err = store
        .query("DELETE FROM Profiles")
        .await
        .expect_err("rejected");
    assert!(matches!(err, roster_profiles::ProfileError::Query { .. }));
    assert!(ctx.storage.operations().is_empty());
}
