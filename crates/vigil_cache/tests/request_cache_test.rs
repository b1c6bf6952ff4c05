//! Tests for the persistent request cache.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use vigil_cache::{CacheConfig, RequestCache, RequestParams};
use vigil_core::{EndpointId, add_duration};

fn start() -> DateTime<Utc> {
    "2024-05-13T10:00:00Z".parse().unwrap()
}

fn lookup(username: &str) -> RequestParams {
    let mut params = RequestParams::new();
    params.insert("username".to_string(), json!(username));
    params
}

#[test]
fn test_cache_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("cache").join("request_cache.json");
    let endpoint = EndpointId::from("user_lookup");

    {
        let mut cache = RequestCache::open(CacheConfig::default(), &path, start());
        cache.insert(
            &endpoint,
            &lookup("dabit3"),
            json!({"id": "1"}),
            Some(Duration::from_secs(600)),
            start(),
        );
    }

    let later = add_duration(start(), Duration::from_secs(60));
    let mut reopened = RequestCache::open(CacheConfig::default(), &path, later);
    let entry = reopened.get(&endpoint, &lookup("dabit3"), later).unwrap();

    assert_eq!(entry.value(), &json!({"id": "1"}));
    assert_eq!(entry.cached_at(), &start());
}

#[test]
fn test_expired_entries_are_dropped_on_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("request_cache.json");
    let endpoint = EndpointId::from("search");

    {
        let mut cache = RequestCache::open(CacheConfig::default(), &path, start());
        cache.insert(&endpoint, &lookup("short"), json!(1), Some(Duration::from_secs(30)), start());
        cache.insert(&endpoint, &lookup("long"), json!(2), Some(Duration::from_secs(3600)), start());
    }

    let later = add_duration(start(), Duration::from_secs(31));
    let reopened = RequestCache::open(CacheConfig::default(), &path, later);

    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened.document().entries[0].value(), &json!(2));
}

#[test]
fn test_unreadable_document_starts_empty() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("request_cache.json");
    std::fs::write(&path, "[[[").unwrap();

    let cache = RequestCache::open(CacheConfig::default(), &path, start());

    assert!(cache.is_empty());
}

#[test]
fn test_cleanup_expired_reports_removed_count() {
    let mut cache = RequestCache::new(CacheConfig::default());
    let endpoint = EndpointId::from("user_timeline");
    cache.insert(&endpoint, &lookup("a"), json!(1), Some(Duration::from_secs(10)), start());
    cache.insert(&endpoint, &lookup("b"), json!(2), Some(Duration::from_secs(100)), start());

    let removed = cache.cleanup_expired(add_duration(start(), Duration::from_secs(50)));

    assert_eq!(removed, 1);
    assert_eq!(cache.len(), 1);
}
