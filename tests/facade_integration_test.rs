//! Typed key-value and document clients over the manager

mod common;

use common::{Harness, TENANT_A, TENANT_B};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tessera::backend::{BackendType, DeleteResult, UpdateResult};
use tessera::{DocumentClient, Error, KeyValueClient, Tier};

#[tokio::test]
async fn test_key_value_strings_and_counters() {
    let harness = Harness::new();
    let kv = KeyValueClient::new(harness.manager.clone(), TENANT_A, Tier::Pro);

    assert!(kv.ping().await.unwrap());
    kv.set("greeting", "hello", None).await.unwrap();
    assert_eq!(kv.get("greeting").await.unwrap().as_deref(), Some("hello"));
    assert_eq!(kv.get("missing").await.unwrap(), None);
    assert!(kv.exists("greeting").await.unwrap());

    assert_eq!(kv.incr("hits").await.unwrap(), 1);
    assert_eq!(kv.incr_by("hits", 9).await.unwrap(), 10);
    assert_eq!(kv.decr("hits").await.unwrap(), 9);
    assert_eq!(kv.decr_by("hits", 4).await.unwrap(), 5);

    kv.mset(&[("a", "1"), ("b", "2")]).await.unwrap();
    assert_eq!(
        kv.mget(&["a", "nope", "b"]).await.unwrap(),
        vec![Some("1".to_string()), None, Some("2".to_string())]
    );

    assert_eq!(kv.delete(&["a", "b", "nope"]).await.unwrap(), 2);
    assert_eq!(kv.dbsize().await.unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_key_value_ttl() {
    let harness = Harness::new();
    let kv = KeyValueClient::new(harness.manager.clone(), TENANT_A, Tier::Free);

    kv.set("session", "abc", Some(Duration::from_secs(2)))
        .await
        .unwrap();
    assert!(kv.exists("session").await.unwrap());

    tokio::time::advance(Duration::from_secs(3)).await;
    assert!(!kv.exists("session").await.unwrap());
}

#[tokio::test]
async fn test_key_value_collections() {
    let harness = Harness::new();
    let kv = KeyValueClient::new(harness.manager.clone(), TENANT_A, Tier::Free);

    assert!(kv.hset("user:1", "name", "ada").await.unwrap());
    assert!(!kv.hset("user:1", "name", "ada l.").await.unwrap());
    kv.hset("user:1", "lang", "en").await.unwrap();
    assert_eq!(kv.hget("user:1", "name").await.unwrap().as_deref(), Some("ada l."));
    let all = kv.hgetall("user:1").await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(kv.hdel("user:1", &["lang", "nope"]).await.unwrap(), 1);

    assert_eq!(kv.rpush("jobs", &["a", "b"]).await.unwrap(), 2);
    assert_eq!(kv.lpush("jobs", &["z"]).await.unwrap(), 3);
    assert_eq!(kv.lrange("jobs", 0, -1).await.unwrap(), vec!["z", "a", "b"]);
    assert_eq!(kv.lpop("jobs").await.unwrap().as_deref(), Some("z"));
    assert_eq!(kv.rpop("jobs").await.unwrap().as_deref(), Some("b"));

    assert_eq!(kv.sadd("tags", &["x", "y", "x"]).await.unwrap(), 2);
    assert!(kv.sismember("tags", "x").await.unwrap());
    assert_eq!(kv.srem("tags", &["x"]).await.unwrap(), 1);
    assert_eq!(kv.smembers("tags").await.unwrap(), vec!["y"]);

    assert!(kv.zadd("board", 10.0, "carol").await.unwrap());
    kv.zadd("board", 5.0, "bob").await.unwrap();
    kv.zadd("board", 20.0, "dave").await.unwrap();
    assert_eq!(
        kv.zrange_by_score("board", 5.0, 10.0).await.unwrap(),
        vec!["bob", "carol"]
    );
    assert_eq!(
        kv.zrange_by_score("board", f64::NEG_INFINITY, f64::INFINITY)
            .await
            .unwrap()
            .len(),
        3
    );
}

#[tokio::test]
async fn test_key_value_scan_and_info() {
    let harness = Harness::new();
    let kv = KeyValueClient::new(harness.manager.clone(), TENANT_A, Tier::Free);

    for i in 0..25 {
        kv.set(&format!("order:{}", i), "x", None).await.unwrap();
    }
    kv.set("other", "y", None).await.unwrap();

    let (cursor, page) = kv.scan(0, None, Some(10)).await.unwrap();
    assert_ne!(cursor, 0);
    assert_eq!(page.len(), 10);

    let mut orders = kv.scan_all("order:*").await.unwrap();
    orders.sort();
    orders.dedup();
    assert_eq!(orders.len(), 25);

    let info = kv.info().await.unwrap();
    assert!(info.contains("connected_clients:"));
}

#[tokio::test]
async fn test_key_value_errors_pass_through() {
    let harness = Harness::new();
    let kv = KeyValueClient::new(harness.manager.clone(), TENANT_A, Tier::Free);

    kv.rpush("list", &["a"]).await.unwrap();
    let err = kv.get("list").await.unwrap_err();
    assert!(matches!(err, Error::Operation(_)));
    assert!(err.is_backend_origin());
}

#[tokio::test]
async fn test_key_value_client_pool_lifecycle() {
    let harness = Harness::new();
    let kv = KeyValueClient::new(harness.manager.clone(), TENANT_B, Tier::Free);

    assert!(kv.pool_stats().await.is_none());
    kv.ping().await.unwrap();
    let stats = kv.pool_stats().await.unwrap();
    assert_eq!((stats.size, stats.available), (1, 1));

    assert!(kv.close().await);
    assert!(kv.pool_stats().await.is_none());
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Order {
    sku: String,
    qty: u32,
}

#[tokio::test]
async fn test_document_crud() {
    let harness = Harness::new();
    let docs = DocumentClient::new(harness.manager.clone(), TENANT_A, Tier::Pro);

    assert!(docs.ping().await.unwrap());
    assert_eq!(docs.database_name().await.unwrap(), "tenant_a");

    let inserted = docs
        .insert_one("orders", &Order { sku: "a1".into(), qty: 2 })
        .await
        .unwrap();
    assert!(inserted.inserted_id.is_string());
    docs.insert_one("orders", &Order { sku: "b2".into(), qty: 7 })
        .await
        .unwrap();
    assert_eq!(harness.docs.document_count("tenant_a", "orders"), 2);

    let big = docs
        .find("orders", json!({ "qty": { "$gt": 3 } }), None)
        .await
        .unwrap();
    assert_eq!(big.len(), 1);
    assert_eq!(big[0]["sku"], json!("b2"));

    let limited = docs.find("orders", json!({}), Some(1)).await.unwrap();
    assert_eq!(limited.len(), 1);

    let updated = docs
        .update_one("orders", json!({ "sku": "a1" }), json!({ "$inc": { "qty": 1 } }))
        .await
        .unwrap();
    assert_eq!(
        updated,
        UpdateResult {
            matched_count: 1,
            modified_count: 1
        }
    );
    let one = docs
        .find_one("orders", json!({ "sku": "a1" }))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(one["qty"], json!(3));

    let deleted = docs
        .delete_one("orders", json!({ "sku": "zzz" }))
        .await
        .unwrap();
    assert_eq!(deleted, DeleteResult { deleted_count: 0 });
    assert!(docs
        .find_one("orders", json!({ "sku": "zzz" }))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_document_rejects_non_object() {
    let harness = Harness::new();
    let docs = DocumentClient::new(harness.manager.clone(), TENANT_A, Tier::Free);

    let err = docs.insert_one("orders", &vec![1, 2, 3]).await.unwrap_err();
    assert!(matches!(err, Error::Operation(_)));

    // Rejected before reaching the manager
    assert!(harness
        .manager
        .connection_metadata(TENANT_A, BackendType::Document)
        .await
        .is_none());
}

#[tokio::test]
async fn test_tenants_see_separate_databases() {
    let harness = Harness::new();
    let a = DocumentClient::new(harness.manager.clone(), TENANT_A, Tier::Free);
    let b = DocumentClient::new(harness.manager.clone(), TENANT_B, Tier::Free);

    a.insert_one("notes", &json!({ "text": "mine" })).await.unwrap();
    assert!(b.find("notes", json!({}), None).await.unwrap().is_empty());
    assert_eq!(a.find("notes", json!({}), None).await.unwrap().len(), 1);

    assert!(a.close().await);
    assert!(b.pool_stats().await.is_some());
}
