//! Durable store client trait and related types.
//!
//! This module defines the core abstraction over the remote hierarchical
//! key-value store that holds all durable state: user profiles, conversation
//! state, vendors, and orders. There is no local disk and no message queue;
//! the store is the only persistence the system has.
//!
//! # Design
//!
//! The [`DurableStore`] trait is deliberately minimal:
//!
//! - Per-path `get`/`set`/`update`/`delete`
//! - An optimistic read-modify-write [`transaction`](DurableStore::transaction)
//!   primitive for the few fields with genuine multi-writer contention
//! - A best-effort ordered query with a full-scan default
//!
//! Values are [`serde_json::Value`] trees, matching the JSON document model
//! of the backing store. A missing record is `Ok(None)`, never an error.
//!
//! # Optimistic Concurrency
//!
//! `transaction` is the compare-and-swap seam: the store supplies the
//! current value at a path to a pure closure, and commits the closure's
//! result only if no concurrent writer changed the value since the read.
//! On conflict the store retries the whole read-modify-write. The retry
//! loop lives in the store implementation so callers stay pure.
//!
//! # Implementations
//!
//! - `InMemoryStore` (in `mealflow-testing`): fast, deterministic testing
//!   with injectable conflicts
//! - Production adapters over the real store RPC live outside this workspace
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` instead of `async fn` so the trait
//! can be used as `Arc<dyn DurableStore>` and captured inside effect
//! closures and the scheduler's job handler.

use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// A boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// The pure computation run inside an optimistic transaction.
///
/// Receives the current value at the path (`None` when the record is
/// absent) and returns the value to commit (`None` deletes the record).
/// Must be pure: the store may invoke it several times before a commit
/// succeeds.
pub type TransactionFn = Box<dyn Fn(Option<Value>) -> Option<Value> + Send + Sync>;

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A transaction could not commit within the retry budget.
    ///
    /// Another writer kept changing the value between the read and the
    /// attempted commit. The read-modify-write was retried `attempts`
    /// times before giving up.
    #[error("transaction conflict at {path} after {attempts} attempts")]
    Conflict {
        /// The path the transaction ran against.
        path: KeyPath,
        /// Number of read-modify-write attempts made.
        attempts: u32,
    },

    /// Backend connection or protocol error.
    #[error("store backend error: {0}")]
    Backend(String),

    /// Value could not be serialized or deserialized.
    #[error("store serialization error: {0}")]
    Serialization(String),
}

/// Outcome of a committed transaction.
#[derive(Debug, Clone)]
pub struct TransactionOutcome {
    /// The value that was committed (`None` when the record was deleted).
    pub committed: Option<Value>,
    /// How many read-modify-write attempts were needed (1 = no conflict).
    pub attempts: u32,
}

/// A `/`-joined hierarchical key path.
///
/// # Example
///
/// ```
/// use mealflow_core::store::KeyPath;
///
/// let users = KeyPath::new("foodbot/users");
/// let alice = users.child("42");
/// assert_eq!(alice.as_str(), "foodbot/users/42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath(String);

impl KeyPath {
    /// Creates a path from a raw string.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Returns a child path with `segment` appended.
    #[must_use]
    pub fn child(&self, segment: impl AsRef<str>) -> Self {
        Self(format!("{}/{}", self.0, segment.as_ref()))
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for KeyPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// The sentinel key the store recognizes as "server-assigned timestamp".
pub const SERVER_TIMESTAMP_KEY: &str = ".sv";

/// Returns the sentinel value the store replaces with the commit time
/// (epoch milliseconds) when a write lands.
///
/// Used for `created_at` fields so creation times are assigned by the
/// store, not by whichever process happened to do the write.
#[must_use]
pub fn server_timestamp() -> Value {
    let mut map = Map::new();
    map.insert(
        SERVER_TIMESTAMP_KEY.to_string(),
        Value::String("timestamp".to_string()),
    );
    Value::Object(map)
}

/// Durable store abstraction over a remote hierarchical key-value store.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the store is shared as
/// `Arc<dyn DurableStore>` between the per-actor event tasks and the
/// scheduler's timer worker.
pub trait DurableStore: Send + Sync {
    /// Reads the value at `path`.
    ///
    /// Returns `Ok(None)` when no record exists at the path.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Backend`]: connection or query failed
    fn get(&self, path: KeyPath) -> StoreFuture<'_, Option<Value>>;

    /// Replaces the value at `path`, creating parents as needed.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Backend`]: connection or write failed
    fn set(&self, path: KeyPath, value: Value) -> StoreFuture<'_, ()>;

    /// Shallow-merges `fields` into the record at `path`.
    ///
    /// Each entry overwrites the same-named child of the record; other
    /// children are untouched. When no record exists the merge degrades to
    /// a plain write of `fields`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Backend`]: connection or write failed
    fn update(&self, path: KeyPath, fields: Map<String, Value>) -> StoreFuture<'_, ()>;

    /// Deletes the record at `path`. Deleting an absent record is not an
    /// error.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Backend`]: connection or write failed
    fn delete(&self, path: KeyPath) -> StoreFuture<'_, ()>;

    /// Runs an optimistic read-modify-write transaction at `path`.
    ///
    /// Reads the current value, applies `f`, and commits the result only
    /// if the stored value is still the one that was read. On conflict the
    /// whole read-modify-write is retried. Returning `None` from `f`
    /// deletes the record.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Conflict`]: retry budget exhausted under contention
    /// - [`StoreError::Backend`]: connection or write failed
    fn transaction(&self, path: KeyPath, f: TransactionFn)
    -> StoreFuture<'_, TransactionOutcome>;

    /// Reads all children of `path` ordered by the named child field.
    ///
    /// Best-effort: backends without an index on `field` may serve this
    /// with a full scan and client-side sort, which is exactly what the
    /// default implementation does. Children that are not objects or lack
    /// `field` sort last, keyed by their record key.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Backend`]: connection or query failed
    fn query_by_field(&self, path: KeyPath, field: String) -> StoreFuture<'_, Vec<(String, Value)>> {
        Box::pin(async move {
            let snapshot = self.get(path).await?;
            let Some(Value::Object(children)) = snapshot else {
                return Ok(Vec::new());
            };
            let mut entries: Vec<(String, Value)> = children.into_iter().collect();
            entries.sort_by(|(a_key, a), (b_key, b)| {
                let a_field = a.get(&field);
                let b_field = b.get(&field);
                compare_json(a_field, b_field).then_with(|| a_key.cmp(b_key))
            });
            Ok(entries)
        })
    }
}

/// Total order over optional JSON scalars for the fallback sort: numbers
/// before strings before everything else, absent last.
fn compare_json(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::MAX);
            let y = y.as_f64().unwrap_or(f64::MAX);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(_)), Some(_)) => Ordering::Less,
        (Some(_), Some(Value::Number(_))) => Ordering::Greater,
        (Some(Value::String(_)), Some(_)) => Ordering::Less,
        (Some(_), Some(Value::String(_))) => Ordering::Greater,
        (Some(_), Some(_)) => Ordering::Equal,
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
