//! End-to-end order placement: pick buttons, scheduling, the persisted
//! order record, vendor aggregate updates, and mark-as-served.

#![allow(clippy::unwrap_used)] // Test code can unwrap

mod support;

use mealflow_assistant::machine::state::ConversationState;
use mealflow_assistant::notify::NotificationDispatcher;
use mealflow_assistant::paths;
use mealflow_assistant::types::{Order, OrderStatus};
use mealflow_core::chat::{ButtonAction, Keyboard};
use mealflow_core::store::DurableStore;
use mealflow_core::ActorId;
use rust_decimal::Decimal;
use serde_json::json;
use support::World;

const USER: ActorId = ActorId(7);
const MANAGER: ActorId = ActorId(900);

async fn seeded_world() -> World {
    let world = World::new(vec![]);
    world
        .seed_vendor("r1", "Pizza Place", MANAGER.0, None, &[("Burger", "5.00"), ("Pizza", "7.50")])
        .await;
    world.register(USER, "Ada", "+100").await;
    world
}

#[tokio::test]
async fn unregistered_users_are_gated_to_the_contact_prompt() {
    let world = World::new(vec![]);

    let state = world.say(USER, "order").await;

    assert_eq!(state, ConversationState::AwaitingContact);
    let message = world.last_message(USER);
    assert!(matches!(message.keyboard, Some(Keyboard::RequestContact)));

    // Registering unblocks the palette.
    world.register(USER, "Ada", "+100").await;
    assert!(world.last_text(USER).contains("Ada"));
}

#[tokio::test]
async fn two_burgers_asap_cost_ten() {
    let world = seeded_world().await;

    world.say(USER, "order").await;
    world.press(USER, ButtonAction::PickVendor { vendor_id: "r1".to_string() }).await;
    let menu = world.last_message(USER);
    assert!(menu.text.contains("Menu for Pizza Place"));
    assert!(matches!(
        &menu.keyboard,
        Some(Keyboard::Buttons(rows)) if rows[0][0].0 == "Burger (5.00)"
    ));

    world
        .press(USER, ButtonAction::PickFood { vendor_id: "r1".to_string(), food_index: 0 })
        .await;
    let state = world
        .press(
            USER,
            ButtonAction::PickQuantity { vendor_id: "r1".to_string(), food_index: 0, quantity: 2 },
        )
        .await;
    assert!(matches!(state, ConversationState::AwaitingSchedule { .. }));
    assert!(world.last_text(USER).contains("2 x Burger (10.00)"));

    let state = world.say(USER, "ASAP").await;
    assert_eq!(state, ConversationState::Idle);

    let order_ids = world.order_ids().await;
    assert_eq!(order_ids.len(), 1);
    let order_id = &order_ids[0];
    assert_eq!(order_id.len(), 12);
    assert!(world.last_text(USER).contains(order_id.as_str()));

    let order: Order = world
        .store
        .get_as(paths::order(order_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.user_id, USER);
    assert_eq!(order.user_name, "Ada");
    assert_eq!(order.phone, "+100");
    assert_eq!(order.total, Decimal::new(1000, 2));
    assert_eq!(order.status, OrderStatus::Scheduled);
    assert_eq!(order.scheduled_for, world.clock.now());
    assert_eq!(order.created_at, Some(world.clock.now().timestamp_millis()));

    // Vendor aggregate caught both updates.
    let listed = world.store.get(paths::vendor_orders("r1")).await.unwrap().unwrap();
    assert_eq!(listed, json!([order_id]));
    let count = world.store.get(paths::vendor_orders_count("r1")).await.unwrap().unwrap();
    assert_eq!(count, json!(1));
}

#[tokio::test]
async fn unreadable_times_reprompt_without_losing_the_draft() {
    let world = seeded_world().await;
    world
        .press(
            USER,
            ButtonAction::PickQuantity { vendor_id: "r1".to_string(), food_index: 1, quantity: 1 },
        )
        .await;

    let state = world.say(USER, "whenever").await;
    assert!(matches!(state, ConversationState::AwaitingSchedule { .. }));
    assert!(world.last_text(USER).contains("couldn't read that time"));

    // An explicit UTC time commits the order for that instant.
    world.say(USER, "2025-06-01 18:30").await;
    let order_ids = world.order_ids().await;
    let order: Order = world
        .store
        .get_as(paths::order(&order_ids[0]))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.scheduled_for.to_rfc3339(), "2025-06-01T18:30:00+00:00");
}

#[tokio::test]
async fn stale_menu_buttons_are_rejected_politely() {
    let world = seeded_world().await;

    world
        .press(USER, ButtonAction::PickFood { vendor_id: "gone".to_string(), food_index: 0 })
        .await;
    assert!(world.last_text(USER).contains("out of date"));

    world
        .press(USER, ButtonAction::PickFood { vendor_id: "r1".to_string(), food_index: 99 })
        .await;
    assert!(world.last_text(USER).contains("out of date"));

    world
        .press(
            USER,
            ButtonAction::PickQuantity { vendor_id: "r1".to_string(), food_index: 0, quantity: 9 },
        )
        .await;
    assert!(world.last_text(USER).contains("between 1 and 5"));
}

#[tokio::test]
async fn mark_served_flips_status_once() {
    let world = seeded_world().await;
    world
        .press(
            USER,
            ButtonAction::PickQuantity { vendor_id: "r1".to_string(), food_index: 0, quantity: 1 },
        )
        .await;
    world.say(USER, "now").await;
    let order_id = world.order_ids().await.remove(0);

    world.register(MANAGER, "Mel", "+900").await;
    world
        .press(MANAGER, ButtonAction::MarkServed { order_id: order_id.clone() })
        .await;
    assert!(world.last_text(MANAGER).contains("marked as served"));

    let order: Order = world
        .store
        .get_as(paths::order(&order_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Served);

    world
        .press(MANAGER, ButtonAction::MarkServed { order_id: order_id.clone() })
        .await;
    assert!(world.last_text(MANAGER).contains("already served"));
}

#[tokio::test]
async fn customers_cannot_serve_their_own_orders() {
    let world = seeded_world().await;
    world
        .press(
            USER,
            ButtonAction::PickQuantity { vendor_id: "r1".to_string(), food_index: 0, quantity: 1 },
        )
        .await;
    world.say(USER, "asap").await;
    let order_id = world.order_ids().await.remove(0);

    // The customer knows their own order id from the confirmation, but the
    // button is refused and the order stays scheduled.
    world
        .press(USER, ButtonAction::MarkServed { order_id: order_id.clone() })
        .await;
    assert!(world.last_text(USER).contains("Only the manager of Pizza Place"));

    let order: Order = world
        .store
        .get_as(paths::order(&order_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Scheduled);

    // So the due-time notification still reaches the manager.
    NotificationDispatcher::new(world.store.clone(), world.transport.clone())
        .dispatch(&order_id)
        .await;
    assert_eq!(world.transport.sent_to(MANAGER).len(), 1);
}

#[tokio::test]
async fn admins_can_mark_any_order_served() {
    const ADMIN: ActorId = ActorId(1);
    let world = World::new(vec![ADMIN.0]);
    world
        .seed_vendor("r1", "Pizza Place", MANAGER.0, None, &[("Burger", "5.00")])
        .await;
    world.register(USER, "Ada", "+100").await;
    world.register(ADMIN, "Root", "+1").await;

    world
        .press(
            USER,
            ButtonAction::PickQuantity { vendor_id: "r1".to_string(), food_index: 0, quantity: 1 },
        )
        .await;
    world.say(USER, "asap").await;
    let order_id = world.order_ids().await.remove(0);

    world
        .press(ADMIN, ButtonAction::MarkServed { order_id: order_id.clone() })
        .await;
    assert!(world.last_text(ADMIN).contains("marked as served"));

    let order: Order = world
        .store
        .get_as(paths::order(&order_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Served);
}

#[tokio::test]
async fn order_history_lists_placed_orders() {
    let world = seeded_world().await;
    world
        .press(
            USER,
            ButtonAction::PickQuantity { vendor_id: "r1".to_string(), food_index: 1, quantity: 2 },
        )
        .await;
    world.say(USER, "asap").await;

    world.say(USER, "my orders").await;
    let text = world.last_text(USER);
    assert!(text.contains("Pizza Place"));
    assert!(text.contains("15.00"));
    assert!(text.contains("scheduled"));
}
