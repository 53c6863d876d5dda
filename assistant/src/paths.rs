//! Key paths into the durable store.
//!
//! All assistant data hangs off one root key with three main subtrees:
//! `users` (profiles and per-user conversation state), `restaurants`
//! (vendor aggregates), and `orders` (flat order records keyed by order
//! id). Vendor registration drafts awaiting admin approval live under
//! `pending_restaurants`.

use mealflow_core::store::KeyPath;
use mealflow_core::ActorId;

/// Root key all assistant data lives under.
pub const ROOT: &str = "foodbot";

/// The `users` subtree.
#[must_use]
pub fn users() -> KeyPath {
    KeyPath::new(ROOT).child("users")
}

/// One user's profile record.
#[must_use]
pub fn user(actor: ActorId) -> KeyPath {
    users().child(actor.0.to_string())
}

/// One user's persisted conversation state.
#[must_use]
pub fn conversation(actor: ActorId) -> KeyPath {
    user(actor).child("conversation")
}

/// The `restaurants` subtree.
#[must_use]
pub fn vendors() -> KeyPath {
    KeyPath::new(ROOT).child("restaurants")
}

/// One vendor's aggregate record.
#[must_use]
pub fn vendor(id: &str) -> KeyPath {
    vendors().child(id)
}

/// A vendor's menu list.
#[must_use]
pub fn vendor_foods(id: &str) -> KeyPath {
    vendor(id).child("foods")
}

/// A vendor's list of order ids.
#[must_use]
pub fn vendor_orders(id: &str) -> KeyPath {
    vendor(id).child("orders")
}

/// A vendor's lifetime order counter.
#[must_use]
pub fn vendor_orders_count(id: &str) -> KeyPath {
    vendor(id).child("orders_count")
}

/// The flat `orders` subtree.
#[must_use]
pub fn orders() -> KeyPath {
    KeyPath::new(ROOT).child("orders")
}

/// One order record.
#[must_use]
pub fn order(id: &str) -> KeyPath {
    orders().child(id)
}

/// Vendor registration drafts awaiting admin review.
#[must_use]
pub fn pending_vendors() -> KeyPath {
    KeyPath::new(ROOT).child("pending_restaurants")
}

/// One pending registration draft.
#[must_use]
pub fn pending_vendor(draft_id: &str) -> KeyPath {
    pending_vendors().child(draft_id)
}
