//! Typed key-value client
//!
//! Every method is one call through
//! [`ConnectionManager::execute_with_circuit_breaker`], so the tenant's pool,
//! breaker and metrics apply to each of them.

use super::{BackendType, Command, DriverError, Reply};
use crate::error::Result;
use crate::manager::ConnectionManager;
use crate::tier::Tier;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tessera_core_resilience::PoolStats;

/// Key-value operations for one tenant
#[derive(Debug, Clone)]
pub struct KeyValueClient {
    manager: ConnectionManager,
    tenant_id: String,
    tier: Tier,
}

impl KeyValueClient {
    pub fn new(manager: ConnectionManager, tenant_id: impl Into<String>, tier: Tier) -> Self {
        Self {
            manager,
            tenant_id: tenant_id.into(),
            tier,
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.query("get", Command::new("GET").arg(key)).await
    }

    /// Store a string, optionally expiring after `ttl` (millisecond precision)
    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut command = Command::new("SET").arg(key).arg(value);
        if let Some(ttl) = ttl {
            let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            command = command.arg("PX").arg(millis);
        }
        self.call("set", command).await.map(drop)
    }

    /// Delete keys, returning how many existed
    pub async fn delete(&self, keys: &[&str]) -> Result<u64> {
        self.query("delete", Command::new("DEL").args(keys.iter().copied()))
            .await
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let found: u64 = self.query("exists", Command::new("EXISTS").arg(key)).await?;
        Ok(found > 0)
    }

    pub async fn incr(&self, key: &str) -> Result<i64> {
        self.query("incr", Command::new("INCR").arg(key)).await
    }

    pub async fn decr(&self, key: &str) -> Result<i64> {
        self.query("decr", Command::new("DECR").arg(key)).await
    }

    pub async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.query("incr_by", Command::new("INCRBY").arg(key).arg(delta))
            .await
    }

    pub async fn decr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.query("decr_by", Command::new("DECRBY").arg(key).arg(delta))
            .await
    }

    /// Values in the same order as `keys`; `None` for missing keys
    pub async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<String>>> {
        self.query("mget", Command::new("MGET").args(keys.iter().copied()))
            .await
    }

    pub async fn mset(&self, pairs: &[(&str, &str)]) -> Result<()> {
        let command = Command::new("MSET").args(pairs.iter().flat_map(|(k, v)| [*k, *v]));
        self.call("mset", command).await.map(drop)
    }

    /// Set one hash field, returning true if the field is new
    pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool> {
        let added: u64 = self
            .query("hset", Command::new("HSET").arg(key).arg(field).arg(value))
            .await?;
        Ok(added > 0)
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.query("hget", Command::new("HGET").arg(key).arg(field))
            .await
    }

    pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        self.query("hgetall", Command::new("HGETALL").arg(key)).await
    }

    pub async fn hdel(&self, key: &str, fields: &[&str]) -> Result<u64> {
        self.query(
            "hdel",
            Command::new("HDEL").arg(key).args(fields.iter().copied()),
        )
        .await
    }

    /// Push to the head of a list, returning its new length
    pub async fn lpush(&self, key: &str, values: &[&str]) -> Result<u64> {
        self.query(
            "lpush",
            Command::new("LPUSH").arg(key).args(values.iter().copied()),
        )
        .await
    }

    /// Push to the tail of a list, returning its new length
    pub async fn rpush(&self, key: &str, values: &[&str]) -> Result<u64> {
        self.query(
            "rpush",
            Command::new("RPUSH").arg(key).args(values.iter().copied()),
        )
        .await
    }

    pub async fn lpop(&self, key: &str) -> Result<Option<String>> {
        self.query("lpop", Command::new("LPOP").arg(key)).await
    }

    pub async fn rpop(&self, key: &str) -> Result<Option<String>> {
        self.query("rpop", Command::new("RPOP").arg(key)).await
    }

    /// Inclusive range; negative indexes count from the tail
    pub async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.query(
            "lrange",
            Command::new("LRANGE").arg(key).arg(start).arg(stop),
        )
        .await
    }

    pub async fn sadd(&self, key: &str, members: &[&str]) -> Result<u64> {
        self.query(
            "sadd",
            Command::new("SADD").arg(key).args(members.iter().copied()),
        )
        .await
    }

    pub async fn srem(&self, key: &str, members: &[&str]) -> Result<u64> {
        self.query(
            "srem",
            Command::new("SREM").arg(key).args(members.iter().copied()),
        )
        .await
    }

    pub async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        let found: u64 = self
            .query("sismember", Command::new("SISMEMBER").arg(key).arg(member))
            .await?;
        Ok(found > 0)
    }

    pub async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.query("smembers", Command::new("SMEMBERS").arg(key)).await
    }

    /// Add or re-score one member, returning true if it is new
    pub async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<bool> {
        let added: u64 = self
            .query("zadd", Command::new("ZADD").arg(key).arg(score).arg(member))
            .await?;
        Ok(added > 0)
    }

    /// Members with `min <= score <= max`, lowest score first
    pub async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        self.query(
            "zrange_by_score",
            Command::new("ZRANGEBYSCORE")
                .arg(key)
                .arg(score_arg(min))
                .arg(score_arg(max)),
        )
        .await
    }

    /// One page of a key scan
    ///
    /// Start with cursor 0 and continue until the returned cursor is 0 again.
    pub async fn scan(
        &self,
        cursor: u64,
        pattern: Option<&str>,
        count: Option<usize>,
    ) -> Result<(u64, Vec<String>)> {
        let mut command = Command::new("SCAN").arg(cursor);
        if let Some(pattern) = pattern {
            command = command.arg("MATCH").arg(pattern);
        }
        if let Some(count) = count {
            command = command.arg("COUNT").arg(count);
        }

        let (next, keys): (String, Vec<String>) = self.query("scan", command).await?;
        let next = next
            .parse()
            .map_err(|_| DriverError::UnexpectedReply(format!("SCAN cursor '{}'", next)))?;
        Ok((next, keys))
    }

    /// Every key matching `pattern`, following the cursor to the end
    pub async fn scan_all(&self, pattern: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor = 0;
        loop {
            let (next, page) = self.scan(cursor, Some(pattern), None).await?;
            keys.extend(page);
            if next == 0 {
                return Ok(keys);
            }
            cursor = next;
        }
    }

    /// Server info text
    pub async fn info(&self) -> Result<String> {
        self.query("info", Command::new("INFO")).await
    }

    pub async fn dbsize(&self) -> Result<u64> {
        self.query("dbsize", Command::new("DBSIZE")).await
    }

    pub async fn ping(&self) -> Result<bool> {
        let reply: String = self.query("ping", Command::new("PING")).await?;
        Ok(reply == "PONG")
    }

    pub async fn pool_stats(&self) -> Option<PoolStats> {
        self.manager
            .pool_stats(&self.tenant_id, BackendType::KeyValue)
            .await
    }

    /// Close this tenant's key-value pool
    pub async fn close(&self) -> bool {
        self.manager
            .close_connection(&self.tenant_id, BackendType::KeyValue)
            .await
    }

    async fn query<T: DeserializeOwned>(&self, operation: &str, command: Command) -> Result<T> {
        let name = command.name().to_string();
        let reply = self.call(operation, command).await?;
        decode(&name, reply)
    }

    async fn call(&self, operation: &str, command: Command) -> Result<Reply> {
        self.manager
            .execute_with_circuit_breaker(
                &self.tenant_id,
                BackendType::KeyValue,
                self.tier,
                operation,
                move |conn| Box::pin(async move { Ok(conn.execute(command).await?) }),
            )
            .await
    }
}

/// JSON has no infinities; send them the way the wire protocol spells them
fn score_arg(score: f64) -> serde_json::Value {
    if score == f64::INFINITY {
        "+inf".into()
    } else if score == f64::NEG_INFINITY {
        "-inf".into()
    } else {
        score.into()
    }
}

/// Interpret a reply as `T`
pub(crate) fn decode<T: DeserializeOwned>(command: &str, reply: Reply) -> Result<T> {
    serde_json::from_value(reply)
        .map_err(|e| DriverError::UnexpectedReply(format!("{}: {}", command, e)).into())
}
