//! Order placement.
//!
//! Vendor, food, and quantity are picked through buttons whose payloads
//! carry the full selection, so nothing is persisted until the quantity
//! pick. From there the draft lives in [`ConversationState::AwaitingSchedule`]
//! until the user names a ready-by time, at which point the order record
//! is written, the vendor aggregate is updated, and the notification is
//! scheduled.
//!
//! Aggregate updates after the order write are best-effort: the order
//! record is the source of truth, and a conflicted counter bump is logged
//! rather than shown to the user as a failed order.

use super::{AssistantEnv, FlowError, Transition};
use crate::aggregate::AggregateUpdater;
use crate::machine::state::{ConversationState, OrderDraft};
use crate::types::{money, LineItem, Order, OrderStatus, UserProfile, Vendor};
use crate::{ids, paths, queries};
use chrono::{DateTime, NaiveDateTime, Utc};
use mealflow_core::chat::{ButtonAction, EventKind, Keyboard, OutboundMessage};
use mealflow_core::store::{server_timestamp, StoreError};
use mealflow_core::ActorId;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};

const MAX_QUANTITY: u32 = 5;

/// Lists all vendors as pick buttons. The entry point of the flow.
pub(super) async fn vendor_list(env: &AssistantEnv, actor: ActorId) -> Result<Transition, FlowError> {
    let vendors = queries::load_vendors(env.store.as_ref()).await?;
    if vendors.is_empty() {
        return Ok(Transition::idle().say(actor, "No restaurants yet. Check back soon!"));
    }
    let buttons = vendors
        .into_iter()
        .map(|(vendor_id, vendor)| (vendor.name, ButtonAction::PickVendor { vendor_id }))
        .collect();
    Ok(Transition::idle().send(
        actor,
        OutboundMessage::with_keyboard("Where do you want to order from?", Keyboard::column(buttons)),
    ))
}

/// Shows a vendor's menu as pick buttons.
pub(super) async fn show_menu(
    env: &AssistantEnv,
    actor: ActorId,
    vendor_id: &str,
) -> Result<Transition, FlowError> {
    let Some(vendor) = queries::load_vendor(env.store.as_ref(), vendor_id).await? else {
        return Ok(Transition::stay().say(actor, "That restaurant no longer exists."));
    };
    if vendor.foods.is_empty() {
        return Ok(Transition::stay().say(actor, format!("{} has no menu yet.", vendor.name)));
    }
    let buttons = vendor
        .foods
        .iter()
        .enumerate()
        .map(|(food_index, food)| {
            (
                format!("{} ({})", food.name, money(food.price)),
                ButtonAction::PickFood { vendor_id: vendor_id.to_string(), food_index },
            )
        })
        .collect();
    Ok(Transition::stay().send(
        actor,
        OutboundMessage::with_keyboard(format!("Menu for {}:", vendor.name), Keyboard::column(buttons)),
    ))
}

/// Offers quantity buttons for the chosen food.
pub(super) async fn quantity_prompt(
    env: &AssistantEnv,
    actor: ActorId,
    vendor_id: &str,
    food_index: usize,
) -> Result<Transition, FlowError> {
    let Some((_, food)) = vendor_food(env, vendor_id, food_index).await? else {
        return Ok(stale_menu(actor));
    };
    let row = (1..=MAX_QUANTITY)
        .map(|quantity| {
            (
                quantity.to_string(),
                ButtonAction::PickQuantity {
                    vendor_id: vendor_id.to_string(),
                    food_index,
                    quantity,
                },
            )
        })
        .collect();
    Ok(Transition::stay().send(
        actor,
        OutboundMessage::with_keyboard(
            format!("How many of {} ({} each)?", food.name, money(food.price)),
            Keyboard::Buttons(vec![row]),
        ),
    ))
}

/// Assembles the order draft and asks for the ready-by time.
pub(super) async fn begin_schedule(
    env: &AssistantEnv,
    actor: ActorId,
    _profile: &UserProfile,
    vendor_id: &str,
    food_index: usize,
    quantity: u32,
) -> Result<Transition, FlowError> {
    if !(1..=MAX_QUANTITY).contains(&quantity) {
        return Ok(Transition::stay().say(actor, "Pick a quantity between 1 and 5."));
    }
    let Some((vendor, food)) = vendor_food(env, vendor_id, food_index).await? else {
        return Ok(stale_menu(actor));
    };

    let subtotal = food.price * Decimal::from(quantity);
    let draft = OrderDraft {
        vendor_id: vendor_id.to_string(),
        vendor_name: vendor.name,
        items: vec![LineItem { name: food.name.clone(), quantity, subtotal }],
        total: subtotal,
    };
    let prompt = format!(
        "{quantity} x {} ({}). {}",
        food.name,
        money(subtotal),
        SCHEDULE_PROMPT,
    );
    Ok(Transition::to(ConversationState::AwaitingSchedule { draft }).say(actor, prompt))
}

const SCHEDULE_PROMPT: &str =
    "When should it be ready? Send 'ASAP' or a UTC time like 2025-06-01 18:30.";

/// Handles the ready-by time and commits the order.
pub(super) async fn handle_schedule(
    env: &AssistantEnv,
    actor: ActorId,
    profile: &UserProfile,
    draft: OrderDraft,
    kind: &EventKind,
) -> Result<Transition, FlowError> {
    let EventKind::Text(text) = kind else {
        return super::fall_through(env, actor, profile, kind, OutboundMessage::text(SCHEDULE_PROMPT))
            .await;
    };
    let Some(ready_at) = parse_schedule(text, env.clock.now()) else {
        return Ok(Transition::stay().say(
            actor,
            "I couldn't read that time. Send 'ASAP' or a UTC time like 2025-06-01 18:30.",
        ));
    };
    place_order(env, actor, profile, draft, ready_at).await
}

async fn place_order(
    env: &AssistantEnv,
    actor: ActorId,
    profile: &UserProfile,
    draft: OrderDraft,
    ready_at: DateTime<Utc>,
) -> Result<Transition, FlowError> {
    let order_id = ids::order_id();
    let order = Order {
        user_id: actor,
        user_name: profile.name.clone(),
        phone: profile.phone.clone(),
        vendor_id: draft.vendor_id.clone(),
        vendor_name: draft.vendor_name.clone(),
        items: draft.items.clone(),
        total: draft.total,
        status: OrderStatus::Scheduled,
        scheduled_for: ready_at,
        created_at: None,
    };
    let mut record =
        serde_json::to_value(&order).map_err(|e| StoreError::Serialization(e.to_string()))?;
    if let Some(fields) = record.as_object_mut() {
        fields.insert("created_at".to_string(), server_timestamp());
    }
    env.store.set(paths::order(&order_id), record).await?;

    // The order record is durable; the vendor aggregate is derived data.
    let aggregates = AggregateUpdater::new(env.store.clone());
    if let Err(e) = aggregates
        .append_if_absent(paths::vendor_orders(&draft.vendor_id), json!(order_id.clone()))
        .await
    {
        warn!(%order_id, error = %e, "failed to append order to vendor order list");
    }
    if let Err(e) = aggregates
        .increment(paths::vendor_orders_count(&draft.vendor_id), 1)
        .await
    {
        warn!(%order_id, error = %e, "failed to bump vendor order counter");
    }

    env.scheduler
        .schedule(ids::order_job_id(&order_id), ready_at, order_id.clone());
    info!(%order_id, vendor_id = %draft.vendor_id, %ready_at, "order placed");

    Ok(Transition::idle().say(
        actor,
        format!(
            "Order {order_id} placed with {} for {}. Scheduled for {}.",
            draft.vendor_name,
            money(draft.total),
            ready_at.format("%Y-%m-%d %H:%M UTC"),
        ),
    ))
}

/// Marks an order as served, from the button on the vendor notification.
///
/// Only the order's vendor's manager (or an admin) may do this; the order
/// id appears in the customer's confirmation message, so the button
/// payload alone is not proof of authority.
pub(super) async fn mark_served(
    env: &AssistantEnv,
    actor: ActorId,
    order_id: &str,
) -> Result<Transition, FlowError> {
    let Some(order) = queries::load_order(env.store.as_ref(), order_id).await? else {
        return Ok(Transition::stay().say(actor, format!("Order {order_id} no longer exists.")));
    };
    if !env.config.is_admin(actor) {
        let manager = queries::load_vendor(env.store.as_ref(), &order.vendor_id)
            .await?
            .and_then(|vendor| vendor.manager_id);
        if manager != Some(actor) {
            return Ok(Transition::stay().say(
                actor,
                format!(
                    "Only the manager of {} can mark this order as served.",
                    order.vendor_name
                ),
            ));
        }
    }
    if order.status == OrderStatus::Served {
        return Ok(Transition::stay().say(actor, format!("Order {order_id} was already served.")));
    }
    // Served is terminal; concurrent taps settle on the same value.
    env.store
        .transaction(
            paths::order(order_id).child("status"),
            Box::new(|_| Some(json!(OrderStatus::Served))),
        )
        .await?;
    info!(%order_id, "order marked as served");
    Ok(Transition::stay().say(actor, format!("Order {order_id} marked as served.")))
}

/// Lists the acting user's order history.
pub(super) async fn my_orders(env: &AssistantEnv, actor: ActorId) -> Result<Transition, FlowError> {
    let orders = queries::orders_for_user(env.store.as_ref(), actor).await?;
    if orders.is_empty() {
        return Ok(Transition::idle().say(actor, "You haven't placed any orders yet."));
    }
    let mut lines = vec!["Your orders:".to_string()];
    for (order_id, order) in orders {
        let status = match order.status {
            OrderStatus::Scheduled => "scheduled",
            OrderStatus::Served => "served",
        };
        lines.push(format!(
            "- {order_id}: {} from {}, {} ({status})",
            money(order.total),
            order.vendor_name,
            order.scheduled_for.format("%Y-%m-%d %H:%M UTC"),
        ));
    }
    Ok(Transition::idle().say(actor, lines.join("\n")))
}

async fn vendor_food(
    env: &AssistantEnv,
    vendor_id: &str,
    food_index: usize,
) -> Result<Option<(Vendor, crate::types::Food)>, FlowError> {
    let Some(vendor) = queries::load_vendor(env.store.as_ref(), vendor_id).await? else {
        return Ok(None);
    };
    let Some(food) = vendor.foods.get(food_index).cloned() else {
        return Ok(None);
    };
    Ok(Some((vendor, food)))
}

fn stale_menu(actor: ActorId) -> Transition {
    Transition::stay().say(actor, "That menu is out of date. Send 'order' to start again.")
}

/// Parses the ready-by time: `ASAP`/`now`, RFC 3339, or a naive
/// `YYYY-MM-DD HH:MM` read as UTC.
fn parse_schedule(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("asap") || text.eq_ignore_ascii_case("now") {
        return Some(now);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M") {
        return Some(naive.and_utc());
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;

    fn base_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn asap_and_now_mean_right_now() {
        let now = base_time();
        assert_eq!(parse_schedule("ASAP", now), Some(now));
        assert_eq!(parse_schedule("  now ", now), Some(now));
    }

    #[test]
    fn both_time_formats_parse_as_utc() {
        let now = base_time();
        let expected = DateTime::parse_from_rfc3339("2025-06-01T18:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parse_schedule("2025-06-01 18:30", now), Some(expected));
        assert_eq!(parse_schedule("2025-06-01T18:30:00Z", now), Some(expected));
        assert_eq!(parse_schedule("tomorrow-ish", now), None);
    }
}
