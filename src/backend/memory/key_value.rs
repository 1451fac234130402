//! In-memory key-value store speaking a Redis-like command set

use super::{
    arity, check_scheme, fault_controls, float, integer, min_arity, text, ConnState, Faults,
    MemoryStats,
};
use crate::backend::{BackendType, Command, Connection, Driver, DriverError, DriverResult, Reply};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

const SCHEMES: &[&str] = &["redis", "rediss", "memory"];
const DEFAULT_SCAN_COUNT: usize = 10;

#[derive(Debug)]
enum KvValue {
    Str(String),
    Hash(BTreeMap<String, String>),
    List(VecDeque<String>),
    Set(BTreeSet<String>),
    Sorted(Vec<(f64, String)>),
}

impl KvValue {
    fn is_empty(&self) -> bool {
        match self {
            KvValue::Str(_) => false,
            KvValue::Hash(h) => h.is_empty(),
            KvValue::List(l) => l.is_empty(),
            KvValue::Set(s) => s.is_empty(),
            KvValue::Sorted(z) => z.is_empty(),
        }
    }
}

#[derive(Debug)]
struct Entry {
    value: KvValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: KvValue) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Generates a typed read accessor and a create-on-write accessor
macro_rules! typed_access {
    ($read:ident, $write:ident, $variant:ident, $ty:ty) => {
        fn $read(&mut self, key: &str) -> DriverResult<Option<&$ty>> {
            match self.live(key) {
                None => Ok(None),
                Some(Entry {
                    value: KvValue::$variant(inner),
                    ..
                }) => Ok(Some(&*inner)),
                Some(_) => Err(DriverError::WrongType),
            }
        }

        fn $write(&mut self, key: &str) -> DriverResult<&mut $ty> {
            self.purge(key);
            let entry = self
                .entries
                .entry(key.to_string())
                .or_insert_with(|| Entry::new(KvValue::$variant(Default::default())));
            match &mut entry.value {
                KvValue::$variant(inner) => Ok(inner),
                _ => Err(DriverError::WrongType),
            }
        }
    };
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
}

impl Keyspace {
    fn purge(&mut self, key: &str) {
        if self
            .entries
            .get(key)
            .is_some_and(|e| e.is_expired(Instant::now()))
        {
            self.entries.remove(key);
        }
    }

    fn purge_all(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, e| !e.is_expired(now));
    }

    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        self.purge(key);
        self.entries.get_mut(key)
    }

    /// Remove a container key once its last element is gone
    fn drop_if_empty(&mut self, key: &str) {
        if self.entries.get(key).is_some_and(|e| e.value.is_empty()) {
            self.entries.remove(key);
        }
    }

    typed_access!(string, string_mut, Str, String);
    typed_access!(hash, hash_mut, Hash, BTreeMap<String, String>);
    typed_access!(list, list_mut, List, VecDeque<String>);
    typed_access!(set, set_mut, Set, BTreeSet<String>);
    typed_access!(sorted, sorted_mut, Sorted, Vec<(f64, String)>);

    fn apply(&mut self, name: &str, args: &[Value]) -> DriverResult<Reply> {
        match name {
            "PING" => Ok(json!("PONG")),
            "GET" => {
                arity(name, args, 1)?;
                let key = text(&args[0])?;
                Ok(self.string(&key)?.map_or(Value::Null, |s| json!(s)))
            }
            "SET" => self.set_command(args),
            "DEL" => {
                min_arity(name, args, 1)?;
                let mut removed = 0;
                for arg in args {
                    let key = text(arg)?;
                    if self.live(&key).is_some() {
                        self.entries.remove(&key);
                        removed += 1;
                    }
                }
                Ok(json!(removed))
            }
            "EXISTS" => {
                min_arity(name, args, 1)?;
                let mut found = 0;
                for arg in args {
                    if self.live(&text(arg)?).is_some() {
                        found += 1;
                    }
                }
                Ok(json!(found))
            }
            "INCR" | "DECR" => {
                arity(name, args, 1)?;
                let delta = if name == "INCR" { 1 } else { -1 };
                self.incr(&text(&args[0])?, delta)
            }
            "INCRBY" | "DECRBY" => {
                arity(name, args, 2)?;
                let by = integer(&args[1])?;
                let delta = if name == "INCRBY" { by } else { -by };
                self.incr(&text(&args[0])?, delta)
            }
            "MGET" => {
                min_arity(name, args, 1)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    let key = text(arg)?;
                    // MGET reports wrong-typed keys as missing
                    let value = self.string(&key).ok().flatten().cloned();
                    values.push(value.map_or(Value::Null, Value::String));
                }
                Ok(Value::Array(values))
            }
            "MSET" => {
                min_arity(name, args, 2)?;
                if args.len() % 2 != 0 {
                    return Err(DriverError::InvalidArgument(
                        "MSET needs key/value pairs".to_string(),
                    ));
                }
                for pair in args.chunks(2) {
                    let key = text(&pair[0])?;
                    self.entries
                        .insert(key, Entry::new(KvValue::Str(text(&pair[1])?)));
                }
                Ok(json!("OK"))
            }
            "EXPIRE" => {
                arity(name, args, 2)?;
                let key = text(&args[0])?;
                let secs = integer(&args[1])?;
                if secs <= 0 {
                    let existed = self.live(&key).is_some();
                    self.entries.remove(&key);
                    return Ok(json!(i64::from(existed)));
                }
                match self.live(&key) {
                    Some(entry) => {
                        entry.expires_at = Some(Instant::now() + Duration::from_secs(secs as u64));
                        Ok(json!(1))
                    }
                    None => Ok(json!(0)),
                }
            }
            "TTL" => {
                arity(name, args, 1)?;
                let key = text(&args[0])?;
                let ttl = match self.live(&key) {
                    None => -2,
                    Some(Entry {
                        expires_at: None, ..
                    }) => -1,
                    Some(Entry {
                        expires_at: Some(at),
                        ..
                    }) => {
                        let remaining = at.saturating_duration_since(Instant::now());
                        remaining.as_millis().div_ceil(1000) as i64
                    }
                };
                Ok(json!(ttl))
            }
            "HSET" => {
                min_arity(name, args, 3)?;
                if (args.len() - 1) % 2 != 0 {
                    return Err(DriverError::InvalidArgument(
                        "HSET needs field/value pairs".to_string(),
                    ));
                }
                let key = text(&args[0])?;
                let pairs = args[1..]
                    .chunks(2)
                    .map(|pair| Ok((text(&pair[0])?, text(&pair[1])?)))
                    .collect::<DriverResult<Vec<_>>>()?;

                let hash = self.hash_mut(&key)?;
                let mut added = 0;
                for (field, value) in pairs {
                    if hash.insert(field, value).is_none() {
                        added += 1;
                    }
                }
                Ok(json!(added))
            }
            "HGET" => {
                arity(name, args, 2)?;
                let field = text(&args[1])?;
                let value = self
                    .hash(&text(&args[0])?)?
                    .and_then(|h| h.get(&field).cloned());
                Ok(value.map_or(Value::Null, Value::String))
            }
            "HGETALL" => {
                arity(name, args, 1)?;
                let fields: Map<String, Value> = self
                    .hash(&text(&args[0])?)?
                    .map(|h| {
                        h.iter()
                            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(Value::Object(fields))
            }
            "HDEL" => {
                min_arity(name, args, 2)?;
                let key = text(&args[0])?;
                let mut removed = 0;
                if self.hash(&key)?.is_some() {
                    let hash = self.hash_mut(&key)?;
                    for field in &args[1..] {
                        if hash.remove(&text(field)?).is_some() {
                            removed += 1;
                        }
                    }
                    self.drop_if_empty(&key);
                }
                Ok(json!(removed))
            }
            "LPUSH" | "RPUSH" => {
                min_arity(name, args, 2)?;
                let key = text(&args[0])?;
                let values = texts(&args[1..])?;
                let list = self.list_mut(&key)?;
                for value in values {
                    if name == "LPUSH" {
                        list.push_front(value);
                    } else {
                        list.push_back(value);
                    }
                }
                Ok(json!(list.len()))
            }
            "LPOP" | "RPOP" => {
                arity(name, args, 1)?;
                let key = text(&args[0])?;
                if self.list(&key)?.is_none() {
                    return Ok(Value::Null);
                }
                let list = self.list_mut(&key)?;
                let popped = if name == "LPOP" {
                    list.pop_front()
                } else {
                    list.pop_back()
                };
                self.drop_if_empty(&key);
                Ok(popped.map_or(Value::Null, Value::String))
            }
            "LRANGE" => {
                arity(name, args, 3)?;
                let start = integer(&args[1])?;
                let stop = integer(&args[2])?;
                let items = match self.list(&text(&args[0])?)? {
                    Some(list) => range(list.len(), start, stop)
                        .map(|r| list.range(r).cloned().map(Value::String).collect::<Vec<_>>())
                        .unwrap_or_default(),
                    None => Vec::new(),
                };
                Ok(Value::Array(items))
            }
            "SADD" => {
                min_arity(name, args, 2)?;
                let members = texts(&args[1..])?;
                let set = self.set_mut(&text(&args[0])?)?;
                let mut added = 0;
                for member in members {
                    if set.insert(member) {
                        added += 1;
                    }
                }
                Ok(json!(added))
            }
            "SREM" => {
                min_arity(name, args, 2)?;
                let key = text(&args[0])?;
                let mut removed = 0;
                if self.set(&key)?.is_some() {
                    let set = self.set_mut(&key)?;
                    for member in &args[1..] {
                        if set.remove(&text(member)?) {
                            removed += 1;
                        }
                    }
                    self.drop_if_empty(&key);
                }
                Ok(json!(removed))
            }
            "SISMEMBER" => {
                arity(name, args, 2)?;
                let member = text(&args[1])?;
                let found = self
                    .set(&text(&args[0])?)?
                    .is_some_and(|s| s.contains(&member));
                Ok(json!(i64::from(found)))
            }
            "SMEMBERS" => {
                arity(name, args, 1)?;
                let members = self
                    .set(&text(&args[0])?)?
                    .map(|s| s.iter().cloned().map(Value::String).collect::<Vec<_>>())
                    .unwrap_or_default();
                Ok(Value::Array(members))
            }
            "ZADD" => {
                min_arity(name, args, 3)?;
                if (args.len() - 1) % 2 != 0 {
                    return Err(DriverError::InvalidArgument(
                        "ZADD needs score/member pairs".to_string(),
                    ));
                }
                let mut pairs = Vec::with_capacity(args.len() / 2);
                for pair in args[1..].chunks(2) {
                    pairs.push((float(&pair[0])?, text(&pair[1])?));
                }

                let sorted = self.sorted_mut(&text(&args[0])?)?;
                let mut added = 0;
                for (score, member) in pairs {
                    match sorted.iter_mut().find(|(_, m)| *m == member) {
                        Some(existing) => existing.0 = score,
                        None => {
                            sorted.push((score, member));
                            added += 1;
                        }
                    }
                }
                sorted.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
                Ok(json!(added))
            }
            "ZRANGEBYSCORE" => {
                arity(name, args, 3)?;
                let min = float(&args[1])?;
                let max = float(&args[2])?;
                let members = self
                    .sorted(&text(&args[0])?)?
                    .map(|z| {
                        z.iter()
                            .filter(|(score, _)| *score >= min && *score <= max)
                            .map(|(_, m)| Value::String(m.clone()))
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();
                Ok(Value::Array(members))
            }
            "SCAN" => self.scan(args),
            "DBSIZE" => {
                arity(name, args, 0)?;
                self.purge_all();
                Ok(json!(self.entries.len()))
            }
            "FLUSHDB" => {
                self.entries.clear();
                Ok(json!("OK"))
            }
            other => Err(DriverError::UnknownCommand(other.to_string())),
        }
    }

    /// SET key value [EX seconds | PX milliseconds]
    fn set_command(&mut self, args: &[Value]) -> DriverResult<Reply> {
        if args.len() != 2 && args.len() != 4 {
            return Err(DriverError::Arity {
                command: "SET".to_string(),
                expected: 2,
                actual: args.len(),
            });
        }
        let key = text(&args[0])?;
        let value = text(&args[1])?;

        let expires_at = if args.len() == 4 {
            let amount = integer(&args[3])?;
            if amount <= 0 {
                return Err(DriverError::InvalidArgument(
                    "invalid expire time in 'SET'".to_string(),
                ));
            }
            let ttl = match text(&args[2])?.to_ascii_uppercase().as_str() {
                "EX" => Duration::from_secs(amount as u64),
                "PX" => Duration::from_millis(amount as u64),
                option => {
                    return Err(DriverError::InvalidArgument(format!(
                        "unknown SET option '{}'",
                        option
                    )))
                }
            };
            let deadline = Instant::now().checked_add(ttl).ok_or_else(|| {
                DriverError::InvalidArgument("invalid expire time in 'SET'".to_string())
            })?;
            Some(deadline)
        } else {
            None
        };

        self.entries.insert(
            key,
            Entry {
                value: KvValue::Str(value),
                expires_at,
            },
        );
        Ok(json!("OK"))
    }

    fn incr(&mut self, key: &str, delta: i64) -> DriverResult<Reply> {
        let current = match self.string(key)? {
            Some(s) => s.parse::<i64>().map_err(|_| {
                DriverError::Backend("ERR value is not an integer or out of range".to_string())
            })?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or_else(|| {
            DriverError::Backend("ERR increment or decrement would overflow".to_string())
        })?;

        *self.string_mut(key)? = next.to_string();
        Ok(json!(next))
    }

    /// SCAN cursor [MATCH pattern] [COUNT count]
    fn scan(&mut self, args: &[Value]) -> DriverResult<Reply> {
        min_arity("SCAN", args, 1)?;
        let cursor = integer(&args[0])?.max(0) as usize;

        let mut pattern = None;
        let mut count = DEFAULT_SCAN_COUNT;
        for option in args[1..].chunks(2) {
            let [flag, value] = option else {
                return Err(DriverError::InvalidArgument("SCAN option without value".to_string()));
            };
            match text(flag)?.to_ascii_uppercase().as_str() {
                "MATCH" => pattern = Some(text(value)?),
                "COUNT" => count = integer(value)?.max(1) as usize,
                other => {
                    return Err(DriverError::InvalidArgument(format!(
                        "unknown SCAN option '{}'",
                        other
                    )))
                }
            }
        }

        self.purge_all();
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();

        let end = (cursor + count).min(keys.len());
        let page: Vec<Value> = keys
            .get(cursor..end)
            .unwrap_or_default()
            .iter()
            .filter(|k| pattern.as_deref().map_or(true, |p| glob_match(p, k)))
            .map(|k| Value::String(k.to_string()))
            .collect();
        let next = if end >= keys.len() { 0 } else { end };

        Ok(json!([next.to_string(), page]))
    }
}

fn texts(values: &[Value]) -> DriverResult<Vec<String>> {
    values.iter().map(text).collect()
}

/// Resolve Redis-style inclusive, possibly negative, indexes
fn range(len: usize, start: i64, stop: i64) -> Option<std::ops::RangeInclusive<usize>> {
    let len = len as i64;
    let start = if start < 0 { (start + len).max(0) } else { start };
    let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some(start as usize..=stop as usize)
}

/// Glob match supporting `*` and `?`
fn glob_match(pattern: &str, text: &str) -> bool {
    let (p, t): (Vec<char>, Vec<char>) = (pattern.chars().collect(), text.chars().collect());
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|c| *c == '*')
}

#[derive(Debug)]
struct Shared {
    backend: BackendType,
    keyspace: Mutex<Keyspace>,
    stats: MemoryStats,
    faults: Faults,
}

/// In-memory key-value driver
///
/// Accepts `redis://`, `rediss://` and `memory://` connection strings.
#[derive(Debug, Clone)]
pub struct MemoryKeyValueDriver {
    shared: Arc<Shared>,
}

impl Default for MemoryKeyValueDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKeyValueDriver {
    pub fn new() -> Self {
        Self::with_backend_type(BackendType::KeyValue)
    }

    /// Serve a different backend type, e.g. a [`BackendType::Custom`] store
    pub fn with_backend_type(backend: BackendType) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                keyspace: Mutex::new(Keyspace::default()),
                stats: MemoryStats::default(),
                faults: Faults::default(),
            }),
        }
    }

    /// Number of live keys
    pub fn key_count(&self) -> usize {
        let mut keyspace = self.shared.keyspace.lock().unwrap_or_else(|e| e.into_inner());
        keyspace.purge_all();
        keyspace.entries.len()
    }
}

fault_controls!(MemoryKeyValueDriver);

#[async_trait]
impl Driver for MemoryKeyValueDriver {
    fn backend_type(&self) -> BackendType {
        self.shared.backend.clone()
    }

    async fn connect(&self, uri: &str) -> DriverResult<Box<dyn Connection>> {
        check_scheme(uri, SCHEMES)?;
        self.shared.faults.check_connect(self.shared.backend.as_str())?;
        self.shared.faults.delay().await;

        self.shared.stats.on_connect();
        Ok(Box::new(MemoryKeyValueConnection {
            state: ConnState::new(&self.shared.faults),
            shared: self.shared.clone(),
        }))
    }
}

struct MemoryKeyValueConnection {
    shared: Arc<Shared>,
    state: ConnState,
}

impl MemoryKeyValueConnection {
    fn info(&self) -> Reply {
        let keys = {
            let mut keyspace = self.shared.keyspace.lock().unwrap_or_else(|e| e.into_inner());
            keyspace.purge_all();
            keyspace.entries.len()
        };
        json!(format!(
            "# Server\r\nredis_version:7.2.0\r\nredis_mode:standalone\r\ntessera_driver:memory\r\n\
             # Clients\r\nconnected_clients:{}\r\n\
             # Keyspace\r\ndb0:keys={},expires=0\r\n",
            self.shared.stats.open(),
            keys
        ))
    }
}

#[async_trait]
impl Connection for MemoryKeyValueConnection {
    async fn execute(&mut self, command: Command) -> DriverResult<Reply> {
        self.state
            .before_command(&self.shared.faults, &self.shared.stats)
            .await?;

        let (name, args) = command.into_parts();
        if name == "INFO" {
            return Ok(self.info());
        }

        let mut keyspace = self.shared.keyspace.lock().unwrap_or_else(|e| e.into_inner());
        keyspace.apply(&name, &args)
    }

    async fn ping(&mut self) -> DriverResult<()> {
        self.state.ping(&self.shared.faults, &self.shared.stats)
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.state.close(&self.shared.stats);
        Ok(())
    }
}

impl Drop for MemoryKeyValueConnection {
    fn drop(&mut self) {
        self.state.close(&self.shared.stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn conn(driver: &MemoryKeyValueDriver) -> Box<dyn Connection> {
        driver.connect("redis://localhost:6379/0").await.unwrap()
    }

    async fn run(conn: &mut Box<dyn Connection>, cmd: Command) -> Reply {
        conn.execute(cmd).await.unwrap()
    }

    #[tokio::test]
    async fn test_strings_and_counters() {
        let driver = MemoryKeyValueDriver::new();
        let mut c = conn(&driver).await;

        assert_eq!(run(&mut c, Command::new("SET").arg("a").arg("1")).await, json!("OK"));
        assert_eq!(run(&mut c, Command::new("GET").arg("a")).await, json!("1"));
        assert_eq!(run(&mut c, Command::new("INCRBY").arg("a").arg(4)).await, json!(5));
        assert_eq!(run(&mut c, Command::new("DECR").arg("a")).await, json!(4));
        assert_eq!(run(&mut c, Command::new("INCR").arg("fresh")).await, json!(1));
        assert_eq!(
            run(&mut c, Command::new("MGET").args(["a", "missing"])).await,
            json!(["4", null])
        );
        assert_eq!(run(&mut c, Command::new("EXISTS").args(["a", "missing"])).await, json!(1));
        assert_eq!(run(&mut c, Command::new("DEL").args(["a", "missing"])).await, json!(1));
    }

    #[tokio::test]
    async fn test_set_rejects_unrepresentable_expiry() {
        let driver = MemoryKeyValueDriver::new();
        let mut c = conn(&driver).await;

        let err = c
            .execute(Command::new("SET").args(["k", "v", "EX"]).arg(i64::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::InvalidArgument(_)));
        assert_eq!(run(&mut c, Command::new("EXISTS").arg("k")).await, json!(0));
    }

    #[tokio::test]
    async fn test_incr_on_text_fails() {
        let driver = MemoryKeyValueDriver::new();
        let mut c = conn(&driver).await;
        run(&mut c, Command::new("SET").arg("name").arg("ada")).await;

        let err = c.execute(Command::new("INCR").arg("name")).await.unwrap_err();
        assert!(matches!(err, DriverError::Backend(_)));
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let driver = MemoryKeyValueDriver::new();
        let mut c = conn(&driver).await;
        run(&mut c, Command::new("LPUSH").arg("l").arg("x")).await;

        let err = c.execute(Command::new("GET").arg("l")).await.unwrap_err();
        assert!(matches!(err, DriverError::WrongType));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry() {
        let driver = MemoryKeyValueDriver::new();
        let mut c = conn(&driver).await;

        run(&mut c, Command::new("SET").args(["session", "abc", "EX"]).arg(10)).await;
        assert_eq!(run(&mut c, Command::new("TTL").arg("session")).await, json!(10));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(run(&mut c, Command::new("GET").arg("session")).await, Value::Null);
        assert_eq!(run(&mut c, Command::new("TTL").arg("session")).await, json!(-2));
    }

    #[tokio::test]
    async fn test_lists_and_ranges() {
        let driver = MemoryKeyValueDriver::new();
        let mut c = conn(&driver).await;

        run(&mut c, Command::new("RPUSH").args(["q", "a", "b", "c"])).await;
        run(&mut c, Command::new("LPUSH").args(["q", "z"])).await;
        assert_eq!(
            run(&mut c, Command::new("LRANGE").arg("q").arg(0).arg(-1)).await,
            json!(["z", "a", "b", "c"])
        );
        assert_eq!(
            run(&mut c, Command::new("LRANGE").arg("q").arg(-2).arg(100)).await,
            json!(["b", "c"])
        );
        assert_eq!(run(&mut c, Command::new("RPOP").arg("q")).await, json!("c"));
        assert_eq!(run(&mut c, Command::new("LPOP").arg("q")).await, json!("z"));
    }

    #[tokio::test]
    async fn test_empty_containers_are_removed() {
        let driver = MemoryKeyValueDriver::new();
        let mut c = conn(&driver).await;

        run(&mut c, Command::new("SADD").args(["s", "m"])).await;
        run(&mut c, Command::new("SREM").args(["s", "m"])).await;
        assert_eq!(run(&mut c, Command::new("EXISTS").arg("s")).await, json!(0));
    }

    #[tokio::test]
    async fn test_sorted_sets() {
        let driver = MemoryKeyValueDriver::new();
        let mut c = conn(&driver).await;

        let added = run(
            &mut c,
            Command::new("ZADD").arg("board").arg(30).arg("c").arg(10).arg("a").arg(20).arg("b"),
        )
        .await;
        assert_eq!(added, json!(3));
        run(&mut c, Command::new("ZADD").arg("board").arg(5).arg("c")).await;

        assert_eq!(
            run(&mut c, Command::new("ZRANGEBYSCORE").arg("board").arg("-inf").arg(20)).await,
            json!(["c", "a", "b"])
        );
    }

    #[tokio::test]
    async fn test_scan_pages_through_keys() {
        let driver = MemoryKeyValueDriver::new();
        let mut c = conn(&driver).await;
        for i in 0..5 {
            run(&mut c, Command::new("SET").arg(format!("user:{i}")).arg(i)).await;
        }
        run(&mut c, Command::new("SET").arg("other").arg(1)).await;

        let mut cursor = "0".to_string();
        let mut seen = Vec::new();
        loop {
            let reply = run(
                &mut c,
                Command::new("SCAN").arg(cursor.clone()).args(["MATCH", "user:*", "COUNT", "2"]),
            )
            .await;
            cursor = reply[0].as_str().unwrap().to_string();
            seen.extend(reply[1].as_array().unwrap().iter().cloned());
            if cursor == "0" {
                break;
            }
        }
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("user:*", "user:42"));
        assert!(glob_match("h?llo", "hello"));
        assert!(glob_match("*", ""));
        assert!(!glob_match("user:*", "account:1"));
        assert!(glob_match("a*b*c", "aXXbYYc"));
    }

    #[tokio::test]
    async fn test_unknown_command_and_arity() {
        let driver = MemoryKeyValueDriver::new();
        let mut c = conn(&driver).await;

        assert!(matches!(
            c.execute(Command::new("FLY")).await,
            Err(DriverError::UnknownCommand(_))
        ));
        assert!(matches!(
            c.execute(Command::new("GET")).await,
            Err(DriverError::Arity { .. })
        ));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let driver = MemoryKeyValueDriver::new();

        driver.set_fail_connect(true);
        assert!(matches!(
            driver.connect("redis://h").await,
            Err(DriverError::ConnectionRefused { .. })
        ));
        driver.set_fail_connect(false);

        let mut c = conn(&driver).await;
        c.ping().await.unwrap();

        driver.kill_connections();
        assert!(matches!(c.ping().await, Err(DriverError::Disconnected)));
        assert!(matches!(
            c.execute(Command::new("PING")).await,
            Err(DriverError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_close_and_drop_are_counted_once() {
        let driver = MemoryKeyValueDriver::new();
        let mut a = conn(&driver).await;
        let b = conn(&driver).await;
        assert_eq!(driver.stats().open(), 2);

        a.close().await.unwrap();
        drop(a);
        drop(b);
        assert_eq!(driver.stats().closes(), 2);
        assert_eq!(driver.stats().open(), 0);
        assert_eq!(driver.stats().peak_open(), 2);
    }

    #[tokio::test]
    async fn test_rejects_foreign_scheme() {
        let driver = MemoryKeyValueDriver::new();
        assert!(matches!(
            driver.connect("mongodb://db/app").await,
            Err(DriverError::InvalidUri(_))
        ));
    }
}
