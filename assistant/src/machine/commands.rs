//! Top-level command palette and global button dispatch.
//!
//! These are the entries available from idle, and the fall-through for
//! anything an active flow does not consume: a user can always start over
//! by typing a command, which simply overwrites the old flow's state.

use super::{admin_vendor, ordering, search, vendor_edit, vendor_setup};
use super::{AssistantEnv, FlowError, Transition};
use crate::machine::state::SearchTarget;
use crate::paths;
use crate::types::UserProfile;
use mealflow_core::chat::{ButtonAction, EventKind};
use mealflow_core::ActorId;
use serde_json::{json, Map};

/// Tries to interpret `kind` as a top-level command or a global button.
///
/// Returns `Ok(None)` when the event is not a command, so callers can
/// re-prompt their current step instead.
///
/// # Errors
///
/// [`FlowError`] on infrastructure failure.
pub async fn try_command(
    env: &AssistantEnv,
    actor: ActorId,
    profile: &UserProfile,
    kind: &EventKind,
) -> Result<Option<Transition>, FlowError> {
    match kind {
        EventKind::Text(text) => text_command(env, actor, profile, text).await,
        EventKind::Button(action) => button_command(env, actor, profile, action).await,
        EventKind::Location(point) => {
            // A bare location share is remembered for proximity search.
            let mut fields = Map::new();
            fields.insert("last_location".to_string(), json!(point));
            env.store.update(paths::user(actor), fields).await?;
            Ok(Some(Transition::idle().say(
                actor,
                "Location saved. Send 'nearby' to find restaurants around you.",
            )))
        },
        EventKind::Contact { .. } | EventKind::Photo { .. } => Ok(None),
    }
}

async fn text_command(
    env: &AssistantEnv,
    actor: ActorId,
    profile: &UserProfile,
    text: &str,
) -> Result<Option<Transition>, FlowError> {
    let command = text.trim().trim_start_matches('/').to_lowercase();
    let transition = match command.as_str() {
        "start" | "menu" | "help" => menu(env, actor),
        "order" => ordering::vendor_list(env, actor).await?,
        "search restaurant" => search::start_query(actor, SearchTarget::Vendor),
        "search food" => search::start_query(actor, SearchTarget::Food),
        "nearby" => search::start_nearby(actor, env.config.search_radius_km),
        "closest" => search::closest(env, actor, profile).await?,
        "top rated" => search::top_rated(env, actor).await?,
        "fastest" => search::fastest(env, actor).await?,
        "my orders" => ordering::my_orders(env, actor).await?,
        "register restaurant" => vendor_setup::start(actor),
        "add restaurant" => admin_vendor::start(env, actor),
        "delete restaurant" => admin_vendor::delete_list(env, actor).await?,
        "edit" | "edit restaurants" => vendor_edit::vendor_list(env, actor, profile).await?,
        _ => return Ok(None),
    };
    Ok(Some(transition))
}

async fn button_command(
    env: &AssistantEnv,
    actor: ActorId,
    profile: &UserProfile,
    action: &ButtonAction,
) -> Result<Option<Transition>, FlowError> {
    let transition = match action {
        ButtonAction::PickVendor { vendor_id } => {
            ordering::show_menu(env, actor, vendor_id).await?
        },
        ButtonAction::PickFood { vendor_id, food_index } => {
            ordering::quantity_prompt(env, actor, vendor_id, *food_index).await?
        },
        ButtonAction::PickQuantity { vendor_id, food_index, quantity } => {
            ordering::begin_schedule(env, actor, profile, vendor_id, *food_index, *quantity)
                .await?
        },
        ButtonAction::ApproveVendor { draft_id } => {
            vendor_setup::approve(env, actor, draft_id).await?
        },
        ButtonAction::RejectVendor { draft_id } => {
            vendor_setup::reject(env, actor, draft_id).await?
        },
        ButtonAction::EditVendor { vendor_id } => {
            vendor_edit::begin(env, actor, profile, vendor_id).await?
        },
        ButtonAction::DeleteVendor { vendor_id } => {
            admin_vendor::confirm_delete(env, actor, vendor_id).await?
        },
        ButtonAction::ConfirmDeleteVendor { vendor_id } => {
            admin_vendor::delete(env, actor, vendor_id).await?
        },
        ButtonAction::MarkServed { order_id } => ordering::mark_served(env, actor, order_id).await?,
        ButtonAction::Cancel => Transition::idle().say(actor, "Cancelled."),
        // Flow-local buttons pressed outside their flow are stale.
        ButtonAction::PickManager { .. }
        | ButtonAction::AddPresetFood { .. }
        | ButtonAction::AddCustomFood
        | ButtonAction::FinishFoods => {
            Transition::stay().say(actor, "That button belongs to a step that's no longer active.")
        },
    };
    Ok(Some(transition))
}

fn menu(env: &AssistantEnv, actor: ActorId) -> Transition {
    let mut lines = vec![
        "Here's what I can do:".to_string(),
        "- order: browse restaurants and place an order".to_string(),
        "- search restaurant / search food: find by name".to_string(),
        "- nearby: restaurants around a shared location".to_string(),
        "- closest / top rated / fastest: quick rankings".to_string(),
        "- my orders: your order history".to_string(),
        "- register restaurant: put your own restaurant on the menu".to_string(),
        "- cancel: abandon whatever we're in the middle of".to_string(),
    ];
    if env.config.is_admin(actor) {
        lines.push("- add restaurant / edit / delete restaurant: admin tools".to_string());
    }
    Transition::idle().say(actor, lines.join("\n"))
}
