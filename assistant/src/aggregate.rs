//! Transactional updates to contended vendor aggregate fields.
//!
//! Several conversations can place orders with the same vendor at once,
//! so the order-id list and the order counter are only ever touched
//! through the store's optimistic transaction primitive. Each helper is a
//! pure closure over the current value; the store retries it on conflict.
//!
//! The store rewrites list fields into index-keyed maps at its own
//! discretion, so every list helper normalizes map-or-array input before
//! operating and always writes a plain array back.

use crate::types::Food;
use mealflow_core::store::{DurableStore, KeyPath, StoreError};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Reads a stored list that may be an array, an index-keyed map, or
/// absent.
fn normalize_list(current: Option<Value>) -> Vec<Value> {
    match current {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(Value::Object(map)) => {
            let mut pairs: Vec<(String, Value)> = map.into_iter().collect();
            pairs.sort_by(|(a, _), (b, _)| match (a.parse::<u64>(), b.parse::<u64>()) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => a.cmp(b),
            });
            pairs.into_iter().map(|(_, v)| v).collect()
        },
        // A scalar where a list belongs is corrupt; start over rather
        // than wedge every future append.
        Some(other) => {
            debug!(?other, "replacing non-list value during list update");
            Vec::new()
        },
    }
}

/// Transactional read-modify-write helpers for aggregate fields.
#[derive(Clone)]
pub struct AggregateUpdater {
    store: Arc<dyn DurableStore>,
}

impl AggregateUpdater {
    /// Creates an updater over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    /// Appends `value` to the list at `path` unless it is already there.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when contention outlasts the store's retry
    /// budget; [`StoreError::Backend`] on I/O failure.
    pub async fn append_if_absent(&self, path: KeyPath, value: Value) -> Result<(), StoreError> {
        self.store
            .transaction(
                path,
                Box::new(move |current| {
                    let mut items = normalize_list(current);
                    if !items.contains(&value) {
                        items.push(value.clone());
                    }
                    Some(Value::Array(items))
                }),
            )
            .await?;
        Ok(())
    }

    /// Removes every occurrence of `value` from the list at `path`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when contention outlasts the store's retry
    /// budget; [`StoreError::Backend`] on I/O failure.
    pub async fn remove_value(&self, path: KeyPath, value: Value) -> Result<(), StoreError> {
        self.store
            .transaction(
                path,
                Box::new(move |current| {
                    let mut items = normalize_list(current);
                    items.retain(|item| *item != value);
                    Some(Value::Array(items))
                }),
            )
            .await?;
        Ok(())
    }

    /// Adds `delta` to the counter at `path`, clamping at zero. Missing
    /// and non-numeric values count as zero.
    ///
    /// Returns the committed counter value.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when contention outlasts the store's retry
    /// budget; [`StoreError::Backend`] on I/O failure.
    pub async fn increment(&self, path: KeyPath, delta: i64) -> Result<i64, StoreError> {
        let outcome = self
            .store
            .transaction(
                path,
                Box::new(move |current| {
                    let n = current.as_ref().and_then(Value::as_i64).unwrap_or(0);
                    Some(json!((n + delta).max(0)))
                }),
            )
            .await?;
        Ok(outcome.committed.as_ref().and_then(Value::as_i64).unwrap_or(0))
    }

    /// Appends `food` to a vendor's menu unless a food with the same name
    /// (case-insensitive) is already on it.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when contention outlasts the store's retry
    /// budget; [`StoreError::Backend`] on I/O failure;
    /// [`StoreError::Serialization`] if the food does not serialize.
    pub async fn append_food_if_new(&self, path: KeyPath, food: &Food) -> Result<(), StoreError> {
        let name = food.name.to_lowercase();
        let value = serde_json::to_value(food).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.store
            .transaction(
                path,
                Box::new(move |current| {
                    let mut items = normalize_list(current);
                    let exists = items.iter().any(|item| {
                        item.get("name")
                            .and_then(Value::as_str)
                            .is_some_and(|n| n.to_lowercase() == name)
                    });
                    if !exists {
                        items.push(value.clone());
                    }
                    Some(Value::Array(items))
                }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use mealflow_testing::InMemoryStore;
    use rust_decimal::Decimal;

    fn updater() -> (Arc<InMemoryStore>, AggregateUpdater) {
        let store = Arc::new(InMemoryStore::new());
        (store.clone(), AggregateUpdater::new(store))
    }

    #[tokio::test]
    async fn append_is_idempotent_and_normalizes_map_shaped_lists() {
        let (store, agg) = updater();
        let path = KeyPath::new("r/1/orders");

        // The store turned an earlier array into an index-keyed map.
        store
            .set(path.clone(), json!({"0": "A", "1": "B"}))
            .await
            .unwrap();

        agg.append_if_absent(path.clone(), json!("B")).await.unwrap();
        agg.append_if_absent(path.clone(), json!("C")).await.unwrap();

        assert_eq!(store.get(path).await.unwrap().unwrap(), json!(["A", "B", "C"]));
    }

    #[tokio::test]
    async fn remove_deletes_all_occurrences() {
        let (store, agg) = updater();
        let path = KeyPath::new("r/1/orders");
        store.set(path.clone(), json!(["A", "B", "A"])).await.unwrap();

        agg.remove_value(path.clone(), json!("A")).await.unwrap();

        assert_eq!(store.get(path).await.unwrap().unwrap(), json!(["B"]));
    }

    #[tokio::test]
    async fn counter_starts_at_zero_and_never_goes_negative() {
        let (store, agg) = updater();
        let path = KeyPath::new("r/1/orders_count");

        assert_eq!(agg.increment(path.clone(), 1).await.unwrap(), 1);
        assert_eq!(agg.increment(path.clone(), -5).await.unwrap(), 0);
        assert_eq!(store.get(path).await.unwrap().unwrap(), json!(0));
    }

    #[tokio::test]
    async fn counter_survives_forced_conflicts() {
        let (store, agg) = updater();
        let path = KeyPath::new("r/1/orders_count");
        store.force_conflicts(3);

        assert_eq!(agg.increment(path, 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn menu_append_dedupes_by_name_case_insensitively() {
        let (store, agg) = updater();
        let path = KeyPath::new("r/1/foods");
        let burger = Food {
            name: "Burger".to_string(),
            ingredients: String::new(),
            price: Decimal::new(500, 2),
            serves: None,
        };
        let shouty = Food { name: "BURGER".to_string(), ..burger.clone() };

        agg.append_food_if_new(path.clone(), &burger).await.unwrap();
        agg.append_food_if_new(path.clone(), &shouty).await.unwrap();

        let foods = store.get(path).await.unwrap().unwrap();
        assert_eq!(foods.as_array().unwrap().len(), 1);
    }
}
