//! Domain records stored in the durable store.
//!
//! Everything here is plain serde data. Two store quirks shape the
//! deserialization code:
//!
//! - list fields can come back as maps (the store rewrites sparse arrays
//!   into index-keyed objects), so every list field decodes through
//!   [`seq_or_map`]
//! - `created_at` fields are written as a server-timestamp sentinel and
//!   read back as epoch milliseconds, so they are read-only on the typed
//!   records and injected as raw JSON at write time

use chrono::{DateTime, Utc};
use mealflow_core::{ActorId, GeoPoint};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Decodes a list field that the store may hand back as either a JSON
/// array or an index-keyed object. Absent and `null` both decode as empty.
///
/// Object keys are ordered numerically when they all parse as integers,
/// so `{"0": a, "2": c, "10": k}` keeps array order.
///
/// # Errors
///
/// Fails when an element does not decode as `T`.
pub fn seq_or_map<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    let items: Vec<Value> = match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        Value::Object(map) => {
            let mut pairs: Vec<(String, Value)> = map.into_iter().collect();
            pairs.sort_by(|(a, _), (b, _)| match (a.parse::<u64>(), b.parse::<u64>()) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => a.cmp(b),
            });
            pairs.into_iter().map(|(_, v)| v).collect()
        },
        other => {
            return Err(serde::de::Error::custom(format!(
                "expected a list or map, got {other}"
            )));
        },
    };
    items
        .into_iter()
        .map(|v| serde_json::from_value(v).map_err(serde::de::Error::custom))
        .collect()
}

/// Formats a money amount with two decimal places.
#[must_use]
pub fn money(amount: Decimal) -> String {
    format!("{amount:.2}")
}

/// How a vendor image is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageRef {
    /// Durable blob-store locator.
    Blob {
        /// Public URL of the uploaded image.
        url: String,
    },
    /// The chat transport's native file reference, kept when no blob
    /// store is configured or the upload failed.
    TransportFile {
        /// Opaque transport file reference.
        file_ref: String,
    },
}

/// A registered end user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Display name from the shared contact card.
    pub name: String,
    /// Phone number; registration is complete once this is set.
    #[serde(default)]
    pub phone: String,
    /// Whether this user manages at least one vendor.
    #[serde(default)]
    pub is_manager: bool,
    /// Last location the user shared, for proximity search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_location: Option<GeoPoint>,
    /// Epoch milliseconds assigned by the store at registration.
    #[serde(default, skip_serializing)]
    pub registered_at: Option<i64>,
}

/// One item on a vendor's menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Food {
    /// Food name, unique per vendor.
    pub name: String,
    /// Free-text ingredient list; empty for preset foods.
    #[serde(default)]
    pub ingredients: String,
    /// Unit price.
    pub price: Decimal,
    /// How many people one portion serves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serves: Option<u32>,
}

/// The fixed menu offered during vendor registration.
#[must_use]
pub fn preset_foods() -> Vec<Food> {
    let preset = |name: &str, cents: i64| Food {
        name: name.to_string(),
        ingredients: String::new(),
        price: Decimal::new(cents, 2),
        serves: None,
    };
    vec![
        preset("Burger", 500),
        preset("Pizza", 750),
        preset("Sandwich", 400),
        preset("Pasta", 650),
        preset("Salad", 350),
    ]
}

/// A vendor aggregate: identity, menu, and the contended counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vendor {
    /// Vendor name, unique case-insensitively across all vendors.
    pub name: String,
    /// One-line description.
    #[serde(default)]
    pub description: String,
    /// Contact phone, when captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Physical location, for proximity search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    /// Storefront image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
    /// The user who receives order notifications for this vendor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_id: Option<ActorId>,
    /// Menu.
    #[serde(default, deserialize_with = "seq_or_map")]
    pub foods: Vec<Food>,
    /// Average rating; starts at zero.
    #[serde(default)]
    pub rating: f64,
    /// Lifetime order counter, incremented transactionally.
    #[serde(default)]
    pub orders_count: u64,
    /// Ids of orders placed with this vendor.
    #[serde(default, deserialize_with = "seq_or_map")]
    pub orders: Vec<String>,
    /// Epoch milliseconds assigned by the store at creation.
    #[serde(default, skip_serializing)]
    pub created_at: Option<i64>,
}

/// A vendor registration draft awaiting admin review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingVendor {
    /// Proposed vendor name.
    pub name: String,
    /// One-line description.
    #[serde(default)]
    pub description: String,
    /// Location shared during registration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    /// Draft menu.
    #[serde(default, deserialize_with = "seq_or_map")]
    pub foods: Vec<Food>,
    /// The user who submitted the draft and will manage the vendor.
    pub manager_id: ActorId,
    /// Submitter's display name, for the admin summary.
    #[serde(default)]
    pub manager_name: String,
    /// Epoch milliseconds assigned by the store at submission.
    #[serde(default, skip_serializing)]
    pub submitted_at: Option<i64>,
}

/// Order lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed; the vendor notification has not been handled yet.
    Scheduled,
    /// The vendor marked the order as handed over.
    Served,
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Food name as it appeared on the menu.
    pub name: String,
    /// Quantity ordered.
    pub quantity: u32,
    /// Line subtotal: unit price times quantity.
    pub subtotal: Decimal,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// The ordering user.
    pub user_id: ActorId,
    /// Snapshot of the user's name at order time.
    #[serde(default)]
    pub user_name: String,
    /// Snapshot of the user's phone at order time.
    #[serde(default)]
    pub phone: String,
    /// The vendor the order was placed with.
    pub vendor_id: String,
    /// Snapshot of the vendor's name at order time.
    #[serde(default)]
    pub vendor_name: String,
    /// Order lines.
    #[serde(default, deserialize_with = "seq_or_map")]
    pub items: Vec<LineItem>,
    /// Order total.
    pub total: Decimal,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// When the vendor should have the order ready.
    pub scheduled_for: DateTime<Utc>,
    /// Epoch milliseconds assigned by the store at placement.
    #[serde(default, skip_serializing)]
    pub created_at: Option<i64>,
}

/// Parses a user-entered price: positive, up to two natural decimal
/// digits, thousands commas allowed.
#[must_use]
pub fn parse_price(text: &str) -> Option<Decimal> {
    let cleaned = text.trim().replace(',', "");
    let price: Decimal = cleaned.parse().ok()?;
    (price > Decimal::ZERO).then_some(price)
}

/// Parses the `Name | Ingredients | Price | Serves` custom-food line.
#[must_use]
pub fn parse_custom_food(text: &str) -> Option<Food> {
    let parts: Vec<&str> = text.split('|').map(str::trim).collect();
    let [name, ingredients, price, serves] = parts.as_slice() else {
        return None;
    };
    if name.is_empty() {
        return None;
    }
    Some(Food {
        name: (*name).to_string(),
        ingredients: (*ingredients).to_string(),
        price: parse_price(price)?,
        serves: Some(serves.parse().ok()?),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_fields_decode_from_arrays_and_maps() {
        let from_array: Vendor = serde_json::from_value(json!({
            "name": "Pizza Place",
            "orders": ["A", "B"],
        }))
        .unwrap();
        assert_eq!(from_array.orders, vec!["A", "B"]);

        // The store rewrites sparse arrays into index-keyed maps.
        let from_map: Vendor = serde_json::from_value(json!({
            "name": "Pizza Place",
            "orders": {"0": "A", "2": "C", "10": "K"},
        }))
        .unwrap();
        assert_eq!(from_map.orders, vec!["A", "C", "K"]);
    }

    #[test]
    fn vendor_defaults_cover_missing_fields() {
        let vendor: Vendor = serde_json::from_value(json!({"name": "Solo"})).unwrap();
        assert_eq!(vendor.orders_count, 0);
        assert!(vendor.foods.is_empty());
        assert!(vendor.manager_id.is_none());
        assert!((vendor.rating - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn preset_prices_render_with_two_decimals() {
        let presets = preset_foods();
        assert_eq!(presets.len(), 5);
        assert_eq!(money(presets[0].price), "5.00");
        assert_eq!(money(presets[1].price), "7.50");
    }

    #[test]
    fn price_parsing_accepts_commas_and_rejects_garbage() {
        assert_eq!(parse_price("5.50").unwrap(), Decimal::new(550, 2));
        assert_eq!(parse_price("1,000").unwrap(), Decimal::new(1000, 0));
        assert!(parse_price("0").is_none());
        assert!(parse_price("-3").is_none());
        assert!(parse_price("five").is_none());
    }

    #[test]
    fn custom_food_line_parses_all_four_fields() {
        let food = parse_custom_food("Taco | Beef, salsa | 3.25 | 1").unwrap();
        assert_eq!(food.name, "Taco");
        assert_eq!(food.ingredients, "Beef, salsa");
        assert_eq!(food.price, Decimal::new(325, 2));
        assert_eq!(food.serves, Some(1));

        assert!(parse_custom_food("Taco | 3.25").is_none());
        assert!(parse_custom_food("Taco | x | free | 1").is_none());
    }

    #[test]
    fn order_status_uses_snake_case_on_the_wire() {
        assert_eq!(serde_json::to_value(OrderStatus::Scheduled).unwrap(), json!("scheduled"));
        assert_eq!(serde_json::to_value(OrderStatus::Served).unwrap(), json!("served"));
    }
}
