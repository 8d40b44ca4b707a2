//! Repository contract tests, run against both the SQLite and the in-memory
//! implementations.

use chrono::{Duration, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;

use core_registry::{
    InMemoryResourceRepository, KeyMaterial, OfflineResource, OwnerId, ResourceRepository,
    ResourceStatus, SqliteResourceRepository,
};

async fn sqlite_repo() -> Arc<dyn ResourceRepository> {
    // A single connection keeps the in-memory database alive and shared.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory sqlite");
    let repo = SqliteResourceRepository::new(pool);
    repo.initialize().await.expect("failed to initialize schema");
    Arc::new(repo)
}

async fn memory_repo() -> Arc<dyn ResourceRepository> {
    let repo = InMemoryResourceRepository::new();
    repo.initialize().await.expect("failed to initialize");
    Arc::new(repo)
}

fn resource(owner: &str, key: &str) -> OfflineResource {
    OfflineResource::new(
        OwnerId::new(owner),
        key.to_string(),
        format!("https://origin.test/{}.mp4", key),
        "video/mp4".to_string(),
        format!("Title {}", key),
        Some("course-9".to_string()),
        None,
    )
}

async fn run_roundtrip(repo: Arc<dyn ResourceRepository>) {
    let r = resource("owner-1", "k1");
    repo.insert(&r).await.unwrap();

    let found = repo.find_by_id(r.id).await.unwrap().expect("row missing");
    assert_eq!(found.owner_id, r.owner_id);
    assert_eq!(found.resource_key, "k1");
    assert_eq!(found.source_location, r.source_location);
    assert_eq!(found.status, ResourceStatus::Pending);
    assert_eq!(found.course_tag.as_deref(), Some("course-9"));
    assert!(found.key_material.is_none());
    assert!(found.expires_at.is_none());

    assert!(repo.find_by_id(core_registry::ResourceId::new()).await.unwrap().is_none());
}

async fn run_activate_cas(repo: Arc<dyn ResourceRepository>) {
    let r = resource("owner-1", "k1");
    repo.insert(&r).await.unwrap();

    let km = KeyMaterial::generate();
    let expires = r.created_at + Duration::days(7);

    assert!(repo.activate(r.id, &km, 2048, expires).await.unwrap());

    let found = repo.find_by_id(r.id).await.unwrap().unwrap();
    assert_eq!(found.status, ResourceStatus::Active);
    assert_eq!(found.ciphertext_size_bytes, 2048);
    assert_eq!(found.key_material, Some(km.clone()));
    assert_eq!(
        found.expires_at.map(|at| at.timestamp_millis()),
        Some(expires.timestamp_millis())
    );

    // Second commit attempt is rejected: the row is no longer pending.
    assert!(!repo.activate(r.id, &km, 4096, expires).await.unwrap());

    // A revoked row is rejected too.
    let r2 = resource("owner-1", "k2");
    repo.insert(&r2).await.unwrap();
    repo.set_status(r2.id, ResourceStatus::Revoked).await.unwrap();
    assert!(!repo.activate(r2.id, &km, 1, expires).await.unwrap());
}

async fn run_owner_key_lookup(repo: Arc<dyn ResourceRepository>) {
    let r = resource("owner-1", "k1");
    repo.insert(&r).await.unwrap();

    let found = repo
        .find_by_owner_and_key(&OwnerId::new("owner-1"), "k1")
        .await
        .unwrap();
    assert_eq!(found.map(|f| f.id), Some(r.id));

    // Different owner, same key: no match.
    assert!(repo
        .find_by_owner_and_key(&OwnerId::new("owner-2"), "k1")
        .await
        .unwrap()
        .is_none());

    // Revoked rows stop matching, so the pair can be registered again.
    repo.set_status(r.id, ResourceStatus::Revoked).await.unwrap();
    assert!(repo
        .find_by_owner_and_key(&OwnerId::new("owner-1"), "k1")
        .await
        .unwrap()
        .is_none());

    let replacement = resource("owner-1", "k1");
    repo.insert(&replacement).await.unwrap();
    let found = repo
        .find_by_owner_and_key(&OwnerId::new("owner-1"), "k1")
        .await
        .unwrap();
    assert_eq!(found.map(|f| f.id), Some(replacement.id));
}

async fn run_list_touch_delete(repo: Arc<dyn ResourceRepository>) {
    let a = resource("owner-1", "a");
    let b = resource("owner-1", "b");
    let other = resource("owner-2", "c");
    repo.insert(&a).await.unwrap();
    repo.insert(&b).await.unwrap();
    repo.insert(&other).await.unwrap();

    let listed = repo.list_by_owner(&OwnerId::new("owner-1")).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|r| r.owner_id == OwnerId::new("owner-1")));

    let accessed_at = Utc::now();
    repo.touch_accessed(a.id, accessed_at).await.unwrap();
    let found = repo.find_by_id(a.id).await.unwrap().unwrap();
    assert_eq!(
        found.last_accessed_at.map(|at| at.timestamp_millis()),
        Some(accessed_at.timestamp_millis())
    );

    repo.delete(a.id).await.unwrap();
    assert!(repo.find_by_id(a.id).await.unwrap().is_none());
    assert_eq!(repo.list_by_owner(&OwnerId::new("owner-1")).await.unwrap().len(), 1);

    // Deleting twice is harmless.
    repo.delete(a.id).await.unwrap();
}

async fn run_expire_due(repo: Arc<dyn ResourceRepository>) {
    let km = KeyMaterial::generate();
    let now = Utc::now();

    let stale = resource("owner-1", "stale");
    repo.insert(&stale).await.unwrap();
    repo.activate(stale.id, &km, 10, now - Duration::seconds(1))
        .await
        .unwrap();

    let fresh = resource("owner-1", "fresh");
    repo.insert(&fresh).await.unwrap();
    repo.activate(fresh.id, &km, 10, now + Duration::days(1))
        .await
        .unwrap();

    let pending = resource("owner-1", "pending");
    repo.insert(&pending).await.unwrap();

    assert_eq!(repo.expire_due(now).await.unwrap(), 1);

    let statuses = |id| {
        let repo = repo.clone();
        async move { repo.find_by_id(id).await.unwrap().unwrap().status }
    };
    assert_eq!(statuses(stale.id).await, ResourceStatus::Expired);
    assert_eq!(statuses(fresh.id).await, ResourceStatus::Active);
    assert_eq!(statuses(pending.id).await, ResourceStatus::Pending);

    // Already-expired rows are not counted again.
    assert_eq!(repo.expire_due(now).await.unwrap(), 0);
}

#[tokio::test]
async fn sqlite_roundtrip() {
    run_roundtrip(sqlite_repo().await).await;
}

#[tokio::test]
async fn memory_roundtrip() {
    run_roundtrip(memory_repo().await).await;
}

#[tokio::test]
async fn sqlite_activate_is_pending_guarded() {
    run_activate_cas(sqlite_repo().await).await;
}

#[tokio::test]
async fn memory_activate_is_pending_guarded() {
    run_activate_cas(memory_repo().await).await;
}

#[tokio::test]
async fn sqlite_owner_key_lookup_skips_revoked() {
    run_owner_key_lookup(sqlite_repo().await).await;
}

#[tokio::test]
async fn memory_owner_key_lookup_skips_revoked() {
    run_owner_key_lookup(memory_repo().await).await;
}

#[tokio::test]
async fn sqlite_list_touch_delete() {
    run_list_touch_delete(sqlite_repo().await).await;
}

#[tokio::test]
async fn memory_list_touch_delete() {
    run_list_touch_delete(memory_repo().await).await;
}

#[tokio::test]
async fn sqlite_expire_due_sweeps_only_stale_active_rows() {
    run_expire_due(sqlite_repo().await).await;
}

#[tokio::test]
async fn memory_expire_due_sweeps_only_stale_active_rows() {
    run_expire_due(memory_repo().await).await;
}
