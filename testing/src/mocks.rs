//! Mock implementations of the core environment traits.

use chrono::{DateTime, TimeDelta, Utc};
use mealflow_core::chat::{
    ChatTransport, MessageRef, OutboundMessage, TransportError, TransportFuture,
};
use mealflow_core::environment::{Clock, MediaError, MediaStore};
use mealflow_core::store::{
    DurableStore, KeyPath, StoreError, StoreFuture, TransactionFn, TransactionOutcome,
    SERVER_TIMESTAMP_KEY,
};
use mealflow_core::ActorId;
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

// ============================================================================
// Clocks
// ============================================================================

/// Fixed clock for deterministic tests: always returns the same time.
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Creates a fixed clock.
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC).
///
/// # Panics
///
/// Panics if the hardcoded timestamp fails to parse, which cannot happen.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_clock() -> FixedClock {
    FixedClock::new(
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc),
    )
}

/// A clock tests can move forward by hand.
#[derive(Debug)]
pub struct ManualClock {
    time: StdMutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a manual clock starting at `time`.
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self { time: StdMutex::new(time) }
    }

    /// Moves the clock forward by `delta`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (a prior test panic).
    #[allow(clippy::unwrap_used)]
    pub fn advance(&self, delta: TimeDelta) {
        let mut time = self.time.lock().unwrap();
        *time += delta;
    }
}

impl Clock for ManualClock {
    #[allow(clippy::unwrap_used)] // lock poisoning only follows a test panic
    fn now(&self) -> DateTime<Utc> {
        *self.time.lock().unwrap()
    }
}

// ============================================================================
// In-memory durable store
// ============================================================================

/// In-memory hierarchical JSON store with optimistic transactions.
///
/// Faithful to the real store's observable behavior:
///
/// - `/`-separated key paths over one JSON tree
/// - missing records read as `None`
/// - `update` is a shallow merge that creates the record when absent
/// - `transaction` re-reads, applies the pure closure, and commits only if
///   the value is unchanged since the read, retrying on conflict
/// - server-timestamp sentinels resolve to the clock's epoch-millis at
///   commit
///
/// [`force_conflicts`](Self::force_conflicts) makes the next N transaction
/// attempts lose their race, for exercising retry paths deterministically.
pub struct InMemoryStore {
    root: Mutex<Value>,
    clock: Arc<dyn Clock>,
    max_txn_attempts: u32,
    forced_conflicts: AtomicU32,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty store with the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(mealflow_core::environment::SystemClock))
    }

    /// Creates an empty store stamping server timestamps from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            root: Mutex::new(Value::Object(Map::new())),
            clock,
            max_txn_attempts: 10,
            forced_conflicts: AtomicU32::new(0),
        }
    }

    /// Makes the next `n` transaction attempts fail as if a concurrent
    /// writer had won the race.
    pub fn force_conflicts(&self, n: u32) {
        self.forced_conflicts.store(n, Ordering::SeqCst);
    }

    /// Convenience: read and decode a record in one step.
    ///
    /// # Errors
    ///
    /// [`StoreError::Serialization`] when the stored value does not decode
    /// as `T`.
    pub async fn get_as<T: serde::de::DeserializeOwned>(
        &self,
        path: KeyPath,
    ) -> Result<Option<T>, StoreError> {
        match self.get(path).await? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
        }
    }

    fn segments(path: &KeyPath) -> Vec<String> {
        path.as_str()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    fn read_at(root: &Value, path: &KeyPath) -> Option<Value> {
        let mut node = root;
        for segment in Self::segments(path) {
            node = node.get(&segment)?;
        }
        Some(node.clone())
    }

    fn write_at(root: &mut Value, path: &KeyPath, value: Value) {
        let segments = Self::segments(path);
        let mut node = root;
        for (i, segment) in segments.iter().enumerate() {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            let map = node
                .as_object_mut()
                .unwrap_or_else(|| unreachable!("node was just made an object"));
            if i == segments.len() - 1 {
                map.insert(segment.clone(), value);
                return;
            }
            node = map
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        // Empty path replaces the whole tree.
        *node = value;
    }

    fn delete_at(root: &mut Value, path: &KeyPath) {
        let segments = Self::segments(path);
        let mut node = root;
        for (i, segment) in segments.iter().enumerate() {
            let Some(map) = node.as_object_mut() else {
                return;
            };
            if i == segments.len() - 1 {
                map.remove(segment);
                return;
            }
            match map.get_mut(segment) {
                Some(child) => node = child,
                None => return,
            }
        }
    }

    /// Replaces server-timestamp sentinels with `now` in epoch millis.
    fn resolve_timestamps(value: &mut Value, now_ms: i64) {
        match value {
            Value::Object(map) => {
                if map.len() == 1 && map.contains_key(SERVER_TIMESTAMP_KEY) {
                    *value = Value::from(now_ms);
                    return;
                }
                for child in map.values_mut() {
                    Self::resolve_timestamps(child, now_ms);
                }
            },
            Value::Array(items) => {
                for item in items {
                    Self::resolve_timestamps(item, now_ms);
                }
            },
            _ => {},
        }
    }

    fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}

impl DurableStore for InMemoryStore {
    fn get(&self, path: KeyPath) -> StoreFuture<'_, Option<Value>> {
        Box::pin(async move {
            let root = self.root.lock().await;
            Ok(Self::read_at(&root, &path))
        })
    }

    fn set(&self, path: KeyPath, mut value: Value) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            Self::resolve_timestamps(&mut value, self.now_ms());
            let mut root = self.root.lock().await;
            Self::write_at(&mut root, &path, value);
            Ok(())
        })
    }

    fn update(&self, path: KeyPath, fields: Map<String, Value>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let now_ms = self.now_ms();
            let mut root = self.root.lock().await;
            let mut record = match Self::read_at(&root, &path) {
                Some(Value::Object(map)) => map,
                _ => Map::new(),
            };
            for (key, mut value) in fields {
                Self::resolve_timestamps(&mut value, now_ms);
                record.insert(key, value);
            }
            Self::write_at(&mut root, &path, Value::Object(record));
            Ok(())
        })
    }

    fn delete(&self, path: KeyPath) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut root = self.root.lock().await;
            Self::delete_at(&mut root, &path);
            Ok(())
        })
    }

    fn transaction(
        &self,
        path: KeyPath,
        f: TransactionFn,
    ) -> StoreFuture<'_, TransactionOutcome> {
        Box::pin(async move {
            let mut attempts = 0;
            loop {
                attempts += 1;

                let snapshot = {
                    let root = self.root.lock().await;
                    Self::read_at(&root, &path)
                };
                let proposed = f(snapshot.clone());

                // A test asked us to lose this race.
                let forced = self
                    .forced_conflicts
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                let committed = if forced {
                    false
                } else {
                    let mut root = self.root.lock().await;
                    if Self::read_at(&root, &path) == snapshot {
                        match proposed.clone() {
                            Some(mut value) => {
                                Self::resolve_timestamps(&mut value, self.now_ms());
                                Self::write_at(&mut root, &path, value);
                            },
                            None => Self::delete_at(&mut root, &path),
                        }
                        true
                    } else {
                        false
                    }
                };

                if committed {
                    return Ok(TransactionOutcome { committed: proposed, attempts });
                }
                if attempts >= self.max_txn_attempts {
                    return Err(StoreError::Conflict { path, attempts });
                }
                // Back off to the scheduler so the competing writer can
                // finish before the retry re-reads.
                tokio::task::yield_now().await;
            }
        })
    }
}

// ============================================================================
// Recording chat transport
// ============================================================================

/// Captures outbound messages instead of sending them anywhere.
#[derive(Default)]
pub struct RecordingTransport {
    sent: StdMutex<Vec<(ActorId, OutboundMessage)>>,
    edits: StdMutex<Vec<(MessageRef, OutboundMessage)>>,
    next_id: AtomicI64,
    failing: AtomicU32,
}

impl RecordingTransport {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` sends fail with a transport error.
    pub fn fail_next(&self, n: u32) {
        self.failing.store(n, Ordering::SeqCst);
    }

    /// Every message sent so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (a prior test panic).
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn sent(&self) -> Vec<(ActorId, OutboundMessage)> {
        self.sent.lock().unwrap().clone()
    }

    /// Messages sent to one actor, in order.
    #[must_use]
    pub fn sent_to(&self, actor: ActorId) -> Vec<OutboundMessage> {
        self.sent()
            .into_iter()
            .filter_map(|(to, msg)| (to == actor).then_some(msg))
            .collect()
    }

    /// The most recent message sent to `actor`.
    #[must_use]
    pub fn last_to(&self, actor: ActorId) -> Option<OutboundMessage> {
        self.sent_to(actor).pop()
    }

    /// Every edit recorded so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (a prior test panic).
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn edits(&self) -> Vec<(MessageRef, OutboundMessage)> {
        self.edits.lock().unwrap().clone()
    }
}

impl ChatTransport for RecordingTransport {
    fn send(&self, actor: ActorId, message: OutboundMessage) -> TransportFuture<'_, MessageRef> {
        Box::pin(async move {
            let failing = self
                .failing
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(TransportError("injected send failure".to_string()));
            }
            #[allow(clippy::unwrap_used)] // lock poisoning only follows a test panic
            self.sent.lock().unwrap().push((actor, message));
            let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(MessageRef { actor, message_id })
        })
    }

    fn edit(&self, message: MessageRef, content: OutboundMessage) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            #[allow(clippy::unwrap_used)] // lock poisoning only follows a test panic
            self.edits.lock().unwrap().push((message, content));
            Ok(())
        })
    }
}

// ============================================================================
// Recording media store
// ============================================================================

/// Pretends to copy photos to blob storage, handing back `blob://N`
/// locators.
#[derive(Default)]
pub struct RecordingMediaStore {
    uploads: StdMutex<Vec<String>>,
    failing: AtomicU32,
}

impl RecordingMediaStore {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` uploads fail.
    pub fn fail_next(&self, n: u32) {
        self.failing.store(n, Ordering::SeqCst);
    }

    /// The transport file reference of each upload, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (a prior test panic).
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

impl MediaStore for RecordingMediaStore {
    fn store_photo(
        &self,
        file_ref: String,
    ) -> Pin<Box<dyn Future<Output = Result<String, MediaError>> + Send + '_>> {
        Box::pin(async move {
            let failing = self
                .failing
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(MediaError("injected upload failure".to_string()));
            }
            #[allow(clippy::unwrap_used)] // lock poisoning only follows a test panic
            let mut uploads = self.uploads.lock().unwrap();
            uploads.push(file_ref);
            Ok(format!("blob://{}", uploads.len()))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn update_merges_shallowly_and_creates_missing_records() {
        let store = InMemoryStore::new();
        let path = KeyPath::new("users/9");

        let mut first = Map::new();
        first.insert("name".to_string(), json!("Ada"));
        store.update(path.clone(), first).await.unwrap();

        let mut second = Map::new();
        second.insert("phone".to_string(), json!("+100"));
        store.update(path.clone(), second).await.unwrap();

        let record = store.get(path).await.unwrap().unwrap();
        assert_eq!(record, json!({"name": "Ada", "phone": "+100"}));
    }

    #[tokio::test]
    async fn server_timestamps_resolve_at_commit() {
        let clock = test_clock();
        let expected_ms = clock.now().timestamp_millis();
        let store = InMemoryStore::with_clock(Arc::new(clock));
        let path = KeyPath::new("orders/X");

        store
            .set(path.clone(), json!({"created_at": mealflow_core::store::server_timestamp()}))
            .await
            .unwrap();

        let record = store.get(path).await.unwrap().unwrap();
        assert_eq!(record["created_at"], json!(expected_ms));
    }

    #[tokio::test]
    async fn transaction_retries_through_forced_conflicts() {
        let store = InMemoryStore::new();
        let path = KeyPath::new("counters/c");
        store.set(path.clone(), json!(0)).await.unwrap();
        store.force_conflicts(2);

        let outcome = store
            .transaction(
                path.clone(),
                Box::new(|current| {
                    let n = current.and_then(|v| v.as_i64()).unwrap_or(0);
                    Some(json!(n + 1))
                }),
            )
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 3);
        assert_eq!(store.get(path).await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn exhausted_transaction_reports_conflict() {
        let store = InMemoryStore::new();
        store.force_conflicts(u32::MAX);
        let err = store
            .transaction(KeyPath::new("counters/c"), Box::new(|_| Some(json!(1))))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { attempts: 10, .. }));
    }

    #[tokio::test]
    async fn recording_transport_injects_failures() {
        let transport = RecordingTransport::new();
        transport.fail_next(1);
        let first = transport
            .send(ActorId(1), OutboundMessage::text("hello"))
            .await;
        assert!(first.is_err());
        let second = transport
            .send(ActorId(1), OutboundMessage::text("hello again"))
            .await;
        assert!(second.is_ok());
        assert_eq!(transport.sent_to(ActorId(1)).len(), 1);
    }
}
