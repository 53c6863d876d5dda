//! Persisted conversation state.
//!
//! One tagged enum per user, stored under `users/{id}/conversation`. Each
//! variant is a flow; variant payloads carry everything the flow has
//! gathered so far, so a process restart resumes mid-flow from the store
//! alone.

use crate::types::{Food, ImageRef, LineItem};
use mealflow_core::{ActorId, GeoPoint};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Where a user's conversation currently stands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum ConversationState {
    /// No flow in progress; free text is interpreted as a command.
    #[default]
    Idle,
    /// Waiting for the user to share their contact card.
    AwaitingContact,
    /// A user is registering their own vendor (needs admin approval).
    VendorSetup {
        /// Current step.
        step: VendorSetupStep,
        /// Data gathered so far.
        draft: VendorDraft,
    },
    /// An admin is creating a vendor directly.
    AdminVendor {
        /// Current step.
        step: AdminVendorStep,
        /// Data gathered so far.
        draft: VendorDraft,
    },
    /// A manager or admin is editing an existing vendor.
    EditVendor {
        /// The vendor being edited.
        vendor_id: String,
        /// The field being changed; `None` while picking one.
        field: Option<EditField>,
    },
    /// A manager or admin is adding a food to an existing vendor.
    AddFood {
        /// The vendor gaining the food.
        vendor_id: String,
        /// Current step.
        step: AddFoodStep,
    },
    /// Waiting for a search query.
    AwaitingSearchQuery {
        /// What the query matches against.
        target: SearchTarget,
    },
    /// Waiting for a location share for proximity search.
    AwaitingSearchLocation {
        /// Radius to search within, in kilometres.
        radius_km: f64,
    },
    /// An order is assembled; waiting for the ready-by time.
    AwaitingSchedule {
        /// The assembled order.
        draft: OrderDraft,
    },
}

/// Steps of the self-service vendor registration flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorSetupStep {
    /// Waiting for the vendor name.
    Name,
    /// Building the menu from presets and custom entries.
    Foods,
    /// Waiting for a `Name | Ingredients | Price | Serves` line.
    CustomFood,
    /// Waiting for a location share.
    Location,
    /// Waiting for the description, after which the draft is submitted.
    Description,
}

/// Steps of the admin vendor creation flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminVendorStep {
    /// Waiting for the vendor name.
    Name,
    /// Waiting for the contact phone.
    Phone,
    /// Waiting for a location share.
    Location,
    /// Waiting for a manager search query or a pick from its results.
    Manager,
    /// Waiting for a storefront photo, or `skip`.
    Photo,
}

/// Which vendor field an edit session is changing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditField {
    /// Rename the vendor.
    Name,
    /// Move the vendor.
    Location,
    /// Replace the storefront image.
    Image,
}

/// Steps of the add-food flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum AddFoodStep {
    /// Waiting for the food name.
    Name,
    /// Waiting for the price of the named food.
    Price {
        /// Name captured at the previous step.
        name: String,
    },
}

/// What a pending search query matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchTarget {
    /// Vendor names.
    Vendor,
    /// Food names across all menus.
    Food,
}

/// Vendor data gathered by the registration and creation flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VendorDraft {
    /// Vendor name.
    #[serde(default)]
    pub name: String,
    /// Contact phone (admin flow only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    /// Description (self-registration flow only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Menu built so far.
    #[serde(default)]
    pub foods: Vec<Food>,
    /// Storefront image (admin flow only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
    /// Chosen manager (admin flow only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_id: Option<ActorId>,
}

/// An order assembled through the pick-vendor/food/quantity buttons,
/// waiting for its schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    /// The vendor the order is for.
    pub vendor_id: String,
    /// Vendor name snapshot, for rendering.
    pub vendor_name: String,
    /// Order lines.
    pub items: Vec<LineItem>,
    /// Order total.
    pub total: Decimal,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;

    #[test]
    fn states_round_trip_with_a_flow_tag() {
        let state = ConversationState::VendorSetup {
            step: VendorSetupStep::Foods,
            draft: VendorDraft { name: "Pizza Place".to_string(), ..VendorDraft::default() },
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["flow"], "vendor_setup");
        assert_eq!(json["step"], "foods");
        let back: ConversationState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn add_food_step_keeps_the_captured_name() {
        let state = ConversationState::AddFood {
            vendor_id: "r1".to_string(),
            step: AddFoodStep::Price { name: "Taco".to_string() },
        };
        let json = serde_json::to_value(&state).unwrap();
        let back: ConversationState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
