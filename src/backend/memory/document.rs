//! In-memory document store with a small query language
//!
//! Filters are JSON objects matched field by field. A field may hold a plain
//! value (equality) or an operator object using `$eq`, `$ne`, `$gt`, `$gte`,
//! `$lt`, `$lte`, `$in` or `$exists`. Dotted field names reach into nested
//! documents. Updates support `$set`, `$unset` and `$inc`.

use super::{arity, check_scheme, fault_controls, integer, min_arity, ConnState, Faults, MemoryStats};
use crate::backend::{BackendType, Command, Connection, Driver, DriverError, DriverResult, Reply};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

const SCHEMES: &[&str] = &["mongodb", "mongodb+srv", "memory"];
const DEFAULT_DATABASE: &str = "test";

type Collection = Vec<Map<String, Value>>;

#[derive(Debug, Default)]
struct Database {
    collections: HashMap<String, Collection>,
}

#[derive(Debug)]
struct Shared {
    databases: Mutex<HashMap<String, Database>>,
    next_id: AtomicU64,
    stats: MemoryStats,
    faults: Faults,
}

/// In-memory document driver
///
/// Accepts `mongodb://`, `mongodb+srv://` and `memory://` connection strings;
/// the URI path selects the database (default `test`).
#[derive(Debug, Clone)]
pub struct MemoryDocumentDriver {
    shared: Arc<Shared>,
}

impl Default for MemoryDocumentDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentDriver {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                databases: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                stats: MemoryStats::default(),
                faults: Faults::default(),
            }),
        }
    }

    /// Number of documents in a collection
    pub fn document_count(&self, database: &str, collection: &str) -> usize {
        let databases = self.shared.databases.lock().unwrap_or_else(|e| e.into_inner());
        databases
            .get(database)
            .and_then(|db| db.collections.get(collection))
            .map_or(0, Vec::len)
    }
}

fault_controls!(MemoryDocumentDriver);

#[async_trait]
impl Driver for MemoryDocumentDriver {
    fn backend_type(&self) -> BackendType {
        BackendType::Document
    }

    async fn connect(&self, uri: &str) -> DriverResult<Box<dyn Connection>> {
        let url = check_scheme(uri, SCHEMES)?;
        self.shared.faults.check_connect("document")?;
        self.shared.faults.delay().await;

        let database = url.path().trim_start_matches('/');
        let database = if database.is_empty() {
            DEFAULT_DATABASE.to_string()
        } else {
            database.to_string()
        };

        self.shared.stats.on_connect();
        Ok(Box::new(MemoryDocumentConnection {
            state: ConnState::new(&self.shared.faults),
            shared: self.shared.clone(),
            database,
        }))
    }
}

struct MemoryDocumentConnection {
    shared: Arc<Shared>,
    state: ConnState,
    database: String,
}

impl MemoryDocumentConnection {
    fn apply(&self, name: &str, args: &[Value]) -> DriverResult<Reply> {
        match name {
            "PING" => Ok(json!({ "ok": 1 })),
            "DATABASE_NAME" => Ok(json!(self.database)),
            "FIND" => {
                min_arity(name, args, 2)?;
                if args.len() > 3 {
                    return Err(DriverError::Arity {
                        command: name.to_string(),
                        expected: 3,
                        actual: args.len(),
                    });
                }
                let filter = object(&args[1])?;
                let limit = match args.get(2) {
                    Some(Value::Null) | None => usize::MAX,
                    Some(limit) => integer(limit)?.max(0) as usize,
                };
                self.with_collection(&args[0], |docs| {
                    Ok(Value::Array(
                        docs.iter()
                            .filter(|doc| matches(doc, filter))
                            .take(limit)
                            .cloned()
                            .map(Value::Object)
                            .collect(),
                    ))
                })
            }
            "FIND_ONE" => {
                arity(name, args, 2)?;
                let filter = object(&args[1])?;
                self.with_collection(&args[0], |docs| {
                    Ok(docs
                        .iter()
                        .find(|doc| matches(doc, filter))
                        .cloned()
                        .map_or(Value::Null, Value::Object))
                })
            }
            "INSERT_ONE" => {
                arity(name, args, 2)?;
                let mut doc = object(&args[1])?.clone();
                let id = match doc.get("_id") {
                    Some(id) => id.clone(),
                    None => {
                        let id = json!(format!(
                            "{:024x}",
                            self.shared.next_id.fetch_add(1, Ordering::SeqCst)
                        ));
                        doc.insert("_id".to_string(), id.clone());
                        id
                    }
                };
                self.with_collection(&args[0], |docs| {
                    if docs.iter().any(|existing| existing.get("_id") == Some(&id)) {
                        return Err(DriverError::Backend(format!(
                            "E11000 duplicate key error: _id {}",
                            id
                        )));
                    }
                    docs.push(doc);
                    Ok(json!({ "inserted_id": id }))
                })
            }
            "UPDATE_ONE" => {
                arity(name, args, 3)?;
                let filter = object(&args[1])?;
                let update = object(&args[2])?;
                self.with_collection(&args[0], |docs| {
                    match docs.iter_mut().find(|doc| matches(doc, filter)) {
                        Some(doc) => {
                            let modified = apply_update(doc, update)?;
                            Ok(json!({ "matched_count": 1, "modified_count": i64::from(modified) }))
                        }
                        None => Ok(json!({ "matched_count": 0, "modified_count": 0 })),
                    }
                })
            }
            "DELETE_ONE" => {
                arity(name, args, 2)?;
                let filter = object(&args[1])?;
                self.with_collection(&args[0], |docs| {
                    let deleted = match docs.iter().position(|doc| matches(doc, filter)) {
                        Some(index) => {
                            docs.remove(index);
                            1
                        }
                        None => 0,
                    };
                    Ok(json!({ "deleted_count": deleted }))
                })
            }
            other => Err(DriverError::UnknownCommand(other.to_string())),
        }
    }

    fn with_collection<F>(&self, name: &Value, f: F) -> DriverResult<Reply>
    where
        F: FnOnce(&mut Collection) -> DriverResult<Reply>,
    {
        let name = match name {
            Value::String(name) if !name.is_empty() => name,
            other => {
                return Err(DriverError::InvalidArgument(format!(
                    "invalid collection name {}",
                    other
                )))
            }
        };

        let mut databases = self.shared.databases.lock().unwrap_or_else(|e| e.into_inner());
        let collection = databases
            .entry(self.database.clone())
            .or_default()
            .collections
            .entry(name.clone())
            .or_default();
        f(collection)
    }
}

#[async_trait]
impl Connection for MemoryDocumentConnection {
    async fn execute(&mut self, command: Command) -> DriverResult<Reply> {
        self.state
            .before_command(&self.shared.faults, &self.shared.stats)
            .await?;
        let (name, args) = command.into_parts();
        self.apply(&name, &args)
    }

    async fn ping(&mut self) -> DriverResult<()> {
        self.state.ping(&self.shared.faults, &self.shared.stats)
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.state.close(&self.shared.stats);
        Ok(())
    }
}

impl Drop for MemoryDocumentConnection {
    fn drop(&mut self) {
        self.state.close(&self.shared.stats);
    }
}

fn object(value: &Value) -> DriverResult<&Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| DriverError::InvalidArgument(format!("expected a document, got {}", value)))
}

/// Resolve a dotted path inside a document
fn lookup<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn matches(doc: &Map<String, Value>, filter: &Map<String, Value>) -> bool {
    filter.iter().all(|(path, condition)| {
        let actual = lookup(doc, path);
        match condition {
            Value::Object(ops) if ops.keys().all(|k| k.starts_with('$')) && !ops.is_empty() => {
                ops.iter().all(|(op, expected)| test_operator(actual, op, expected))
            }
            expected => actual == Some(expected),
        }
    })
}

fn test_operator(actual: Option<&Value>, op: &str, expected: &Value) -> bool {
    match op {
        "$eq" => actual == Some(expected),
        "$ne" => actual != Some(expected),
        "$gt" => compare(actual, expected) == Some(CmpOrdering::Greater),
        "$gte" => matches!(
            compare(actual, expected),
            Some(CmpOrdering::Greater | CmpOrdering::Equal)
        ),
        "$lt" => compare(actual, expected) == Some(CmpOrdering::Less),
        "$lte" => matches!(
            compare(actual, expected),
            Some(CmpOrdering::Less | CmpOrdering::Equal)
        ),
        "$in" => expected
            .as_array()
            .is_some_and(|options| actual.is_some_and(|a| options.contains(a))),
        "$exists" => actual.is_some() == expected.as_bool().unwrap_or(true),
        _ => false,
    }
}

fn compare(actual: Option<&Value>, expected: &Value) -> Option<CmpOrdering> {
    match (actual?, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Apply `$set` / `$unset` / `$inc`; returns whether the document changed
fn apply_update(doc: &mut Map<String, Value>, update: &Map<String, Value>) -> DriverResult<bool> {
    if update.is_empty() || !update.keys().all(|k| k.starts_with('$')) {
        return Err(DriverError::InvalidArgument(
            "update must use $set, $unset or $inc".to_string(),
        ));
    }

    let before = doc.clone();
    for (op, fields) in update {
        let fields = object(fields)?;
        match op.as_str() {
            "$set" => {
                for (field, value) in fields {
                    doc.insert(field.clone(), value.clone());
                }
            }
            "$unset" => {
                for field in fields.keys() {
                    doc.remove(field);
                }
            }
            "$inc" => {
                for (field, by) in fields {
                    let by = by.as_f64().ok_or_else(|| {
                        DriverError::InvalidArgument(format!("$inc value for '{}' is not a number", field))
                    })?;
                    let current = match doc.get(field) {
                        None => 0.0,
                        Some(value) => value.as_f64().ok_or_else(|| {
                            DriverError::Backend(format!(
                                "Cannot apply $inc to non-numeric field '{}'",
                                field
                            ))
                        })?,
                    };
                    let next = current + by;
                    let next = if next.fract() == 0.0 && next.abs() < i64::MAX as f64 {
                        json!(next as i64)
                    } else {
                        json!(next)
                    };
                    doc.insert(field.clone(), next);
                }
            }
            other => {
                return Err(DriverError::InvalidArgument(format!(
                    "unsupported update operator '{}'",
                    other
                )))
            }
        }
    }

    Ok(*doc != before)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn conn(driver: &MemoryDocumentDriver) -> Box<dyn Connection> {
        driver.connect("mongodb://localhost:27017/shop").await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_find_update_delete() {
        let driver = MemoryDocumentDriver::new();
        let mut c = conn(&driver).await;

        let inserted = c
            .execute(Command::new("INSERT_ONE").arg("orders").arg(json!({ "sku": "a1", "qty": 2 })))
            .await
            .unwrap();
        assert!(inserted["inserted_id"].is_string());

        c.execute(Command::new("INSERT_ONE").arg("orders").arg(json!({ "sku": "b2", "qty": 7 })))
            .await
            .unwrap();
        assert_eq!(driver.document_count("shop", "orders"), 2);

        let big = c
            .execute(Command::new("FIND").arg("orders").arg(json!({ "qty": { "$gte": 5 } })))
            .await
            .unwrap();
        assert_eq!(big.as_array().unwrap().len(), 1);
        assert_eq!(big[0]["sku"], json!("b2"));

        let updated = c
            .execute(
                Command::new("UPDATE_ONE")
                    .arg("orders")
                    .arg(json!({ "sku": "a1" }))
                    .arg(json!({ "$inc": { "qty": 3 }, "$set": { "status": "paid" } })),
            )
            .await
            .unwrap();
        assert_eq!(updated, json!({ "matched_count": 1, "modified_count": 1 }));

        let one = c
            .execute(Command::new("FIND_ONE").arg("orders").arg(json!({ "sku": "a1" })))
            .await
            .unwrap();
        assert_eq!(one["qty"], json!(5));
        assert_eq!(one["status"], json!("paid"));

        let deleted = c
            .execute(Command::new("DELETE_ONE").arg("orders").arg(json!({ "status": "paid" })))
            .await
            .unwrap();
        assert_eq!(deleted["deleted_count"], json!(1));
        assert_eq!(driver.document_count("shop", "orders"), 1);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let driver = MemoryDocumentDriver::new();
        let mut c = conn(&driver).await;

        let doc = json!({ "_id": "x", "n": 1 });
        c.execute(Command::new("INSERT_ONE").arg("c").arg(doc.clone()))
            .await
            .unwrap();
        let err = c
            .execute(Command::new("INSERT_ONE").arg("c").arg(doc))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Backend(_)));
    }

    #[tokio::test]
    async fn test_database_from_uri() {
        let driver = MemoryDocumentDriver::new();
        let mut named = conn(&driver).await;
        let mut default = driver.connect("mongodb://localhost:27017").await.unwrap();

        assert_eq!(
            named.execute(Command::new("DATABASE_NAME")).await.unwrap(),
            json!("shop")
        );
        assert_eq!(
            default.execute(Command::new("DATABASE_NAME")).await.unwrap(),
            json!("test")
        );
    }

    #[test]
    fn test_filters() {
        let doc = json!({ "name": "ada", "age": 36, "address": { "city": "London" } });
        let doc = doc.as_object().unwrap();

        let check = |filter: Value| matches(doc, filter.as_object().unwrap());
        assert!(check(json!({})));
        assert!(check(json!({ "name": "ada" })));
        assert!(check(json!({ "address.city": "London" })));
        assert!(check(json!({ "age": { "$gt": 30, "$lt": 40 } })));
        assert!(check(json!({ "name": { "$in": ["ada", "grace"] } })));
        assert!(check(json!({ "email": { "$exists": false } })));
        assert!(!check(json!({ "name": { "$ne": "ada" } })));
        assert!(!check(json!({ "age": { "$lte": 35 } })));
    }

    #[test]
    fn test_update_requires_operators() {
        let mut doc = Map::new();
        let replacement = json!({ "name": "x" });
        assert!(apply_update(&mut doc, replacement.as_object().unwrap()).is_err());

        let noop = json!({ "$unset": { "missing": "" } });
        assert!(!apply_update(&mut doc, noop.as_object().unwrap()).unwrap());
    }
}
