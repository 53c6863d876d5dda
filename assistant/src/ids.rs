//! Identifier generation.
//!
//! Order ids are short uppercase tokens meant to be read aloud over a
//! counter; vendor and draft ids are internal and stay lowercase.

use uuid::Uuid;

fn hex(len: usize) -> String {
    let full = Uuid::new_v4().simple().to_string();
    full[..len].to_string()
}

/// A 12-character uppercase order token.
#[must_use]
pub fn order_id() -> String {
    hex(12).to_uppercase()
}

/// A 12-character vendor record id.
#[must_use]
pub fn vendor_id() -> String {
    hex(12)
}

/// An 8-character pending-registration draft id.
#[must_use]
pub fn draft_id() -> String {
    hex(8)
}

/// The scheduler job id for an order's notification.
#[must_use]
pub fn order_job_id(order_id: &str) -> String {
    format!("order_{order_id}")
}
