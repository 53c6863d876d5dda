//! Read-side lookups shared by the conversation flows.
//!
//! All reads are forgiving about individual records: a child that no
//! longer decodes is logged and skipped, never allowed to break a whole
//! listing.

use crate::paths;
use crate::types::{Order, UserProfile, Vendor};
use mealflow_core::store::{DurableStore, KeyPath, StoreError};
use mealflow_core::ActorId;
use serde_json::Value;
use tracing::warn;

fn decode<T: serde::de::DeserializeOwned>(key: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(key, error = %e, "skipping undecodable record");
            None
        },
    }
}

async fn load_children<T: serde::de::DeserializeOwned>(
    store: &dyn DurableStore,
    path: KeyPath,
) -> Result<Vec<(String, T)>, StoreError> {
    let Some(Value::Object(children)) = store.get(path).await? else {
        return Ok(Vec::new());
    };
    Ok(children
        .into_iter()
        .filter_map(|(key, value)| decode(&key, value).map(|record| (key.clone(), record)))
        .collect())
}

/// Loads a user profile; `Ok(None)` when the user never registered.
///
/// # Errors
///
/// [`StoreError`] when the read fails.
pub async fn load_profile(
    store: &dyn DurableStore,
    actor: ActorId,
) -> Result<Option<UserProfile>, StoreError> {
    let Some(value) = store.get(paths::user(actor)).await? else {
        return Ok(None);
    };
    Ok(decode(&actor.to_string(), value))
}

/// Loads every registered user.
///
/// # Errors
///
/// [`StoreError`] when the read fails.
pub async fn load_users(
    store: &dyn DurableStore,
) -> Result<Vec<(ActorId, UserProfile)>, StoreError> {
    let users = load_children::<UserProfile>(store, paths::users()).await?;
    Ok(users
        .into_iter()
        .filter_map(|(key, profile)| key.parse::<i64>().ok().map(|id| (ActorId(id), profile)))
        .collect())
}

/// Loads one vendor aggregate.
///
/// # Errors
///
/// [`StoreError`] when the read fails.
pub async fn load_vendor(
    store: &dyn DurableStore,
    vendor_id: &str,
) -> Result<Option<Vendor>, StoreError> {
    let Some(value) = store.get(paths::vendor(vendor_id)).await? else {
        return Ok(None);
    };
    Ok(decode(vendor_id, value))
}

/// Loads every vendor, keyed by record id.
///
/// # Errors
///
/// [`StoreError`] when the read fails.
pub async fn load_vendors(store: &dyn DurableStore) -> Result<Vec<(String, Vendor)>, StoreError> {
    load_children(store, paths::vendors()).await
}

/// Whether a vendor named `name` already exists (case-insensitive),
/// ignoring the vendor with id `exclude` if given.
///
/// # Errors
///
/// [`StoreError`] when the read fails.
pub async fn vendor_name_taken(
    store: &dyn DurableStore,
    name: &str,
    exclude: Option<&str>,
) -> Result<bool, StoreError> {
    let wanted = name.trim().to_lowercase();
    let vendors = load_vendors(store).await?;
    Ok(vendors
        .iter()
        .filter(|(id, _)| exclude != Some(id.as_str()))
        .any(|(_, vendor)| vendor.name.to_lowercase() == wanted))
}

/// Loads one order record.
///
/// # Errors
///
/// [`StoreError`] when the read fails.
pub async fn load_order(
    store: &dyn DurableStore,
    order_id: &str,
) -> Result<Option<Order>, StoreError> {
    let Some(value) = store.get(paths::order(order_id)).await? else {
        return Ok(None);
    };
    Ok(decode(order_id, value))
}

/// Loads the orders a user has placed, newest placement first.
///
/// # Errors
///
/// [`StoreError`] when the read fails.
pub async fn orders_for_user(
    store: &dyn DurableStore,
    actor: ActorId,
) -> Result<Vec<(String, Order)>, StoreError> {
    let mut orders: Vec<(String, Order)> = load_children::<Order>(store, paths::orders())
        .await?
        .into_iter()
        .filter(|(_, order)| order.user_id == actor)
        .collect();
    orders.sort_by_key(|(_, order)| std::cmp::Reverse(order.created_at.unwrap_or(0)));
    Ok(orders)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use mealflow_testing::InMemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn undecodable_children_are_skipped_not_fatal() {
        let store = InMemoryStore::new();
        store
            .set(paths::vendor("good"), json!({"name": "Pizza Place"}))
            .await
            .unwrap();
        store.set(paths::vendor("bad"), json!(["not", "a", "vendor"])).await.unwrap();

        let vendors = load_vendors(&store).await.unwrap();
        assert_eq!(vendors.len(), 1);
        assert_eq!(vendors[0].0, "good");
    }

    #[tokio::test]
    async fn name_collision_check_is_case_insensitive_with_exclusion() {
        let store = InMemoryStore::new();
        store
            .set(paths::vendor("r1"), json!({"name": "Pizza Place"}))
            .await
            .unwrap();

        assert!(vendor_name_taken(&store, "pizza place", None).await.unwrap());
        assert!(vendor_name_taken(&store, "  PIZZA PLACE ", None).await.unwrap());
        assert!(!vendor_name_taken(&store, "pizza place", Some("r1")).await.unwrap());
        assert!(!vendor_name_taken(&store, "Burger Barn", None).await.unwrap());
    }
}
