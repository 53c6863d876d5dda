//! Self-service vendor registration: the draft survives a process
//! restart mid-flow, round-trips through the pending record, and admin
//! approval promotes the submitter to manager.

#![allow(clippy::unwrap_used)] // Test code can unwrap

mod support;

use mealflow_assistant::machine::state::{ConversationState, VendorSetupStep};
use mealflow_assistant::paths;
use mealflow_assistant::types::{PendingVendor, UserProfile, Vendor};
use mealflow_core::chat::ButtonAction;
use mealflow_core::store::DurableStore;
use mealflow_core::ActorId;
use rust_decimal::Decimal;
use serde_json::Value;
use support::World;

const ADMIN: ActorId = ActorId(1);
const OWNER: ActorId = ActorId(55);

async fn pending_drafts(world: &World) -> Vec<(String, PendingVendor)> {
    match world.store.get(paths::pending_vendors()).await.unwrap() {
        Some(Value::Object(children)) => children
            .into_iter()
            .map(|(id, value)| (id, serde_json::from_value(value).unwrap()))
            .collect(),
        _ => Vec::new(),
    }
}

async fn vendors(world: &World) -> Vec<(String, Vendor)> {
    match world.store.get(paths::vendors()).await.unwrap() {
        Some(Value::Object(children)) => children
            .into_iter()
            .map(|(id, value)| (id, serde_json::from_value(value).unwrap()))
            .collect(),
        _ => Vec::new(),
    }
}

#[tokio::test]
async fn registration_survives_a_restart_and_goes_live_on_approval() {
    let world = World::new(vec![ADMIN.0]);
    world.register(ADMIN, "Root", "+1").await;
    world.register(OWNER, "Olga", "+55").await;

    world.say(OWNER, "register restaurant").await;
    world.say(OWNER, "Pizza Place").await;
    let state = world.press(OWNER, ButtonAction::AddPresetFood { preset_index: 1 }).await;
    assert!(matches!(
        state,
        ConversationState::VendorSetup { step: VendorSetupStep::Foods, .. }
    ));
    assert!(world.last_text(OWNER).contains("Added Pizza (7.50)"));

    // The process dies and comes back; the draft picks up where it was.
    let world = world.restart();
    world.press(OWNER, ButtonAction::AddCustomFood).await;
    world.say(OWNER, "Taco | Beef, salsa | 3.25 | 1").await;
    world.press(OWNER, ButtonAction::FinishFoods).await;
    world.share_location(OWNER, 48.85, 2.35).await;
    let state = world.say(OWNER, "Best pizza in town").await;
    assert_eq!(state, ConversationState::Idle);
    assert!(world.last_text(OWNER).contains("sent for approval"));

    // The pending record carries everything the draft collected.
    let drafts = pending_drafts(&world).await;
    assert_eq!(drafts.len(), 1);
    let (draft_id, pending) = &drafts[0];
    assert_eq!(draft_id.len(), 8);
    assert_eq!(pending.name, "Pizza Place");
    assert_eq!(pending.manager_id, OWNER);
    assert_eq!(pending.manager_name, "Olga");
    assert_eq!(pending.foods.len(), 2);
    assert_eq!(pending.foods[1].name, "Taco");
    assert_eq!(pending.foods[1].price, Decimal::new(325, 2));
    assert!(pending.location.is_some());
    assert!(pending.submitted_at.is_some());

    let approval = world.last_text(ADMIN);
    assert!(approval.contains("Pizza Place"));
    assert!(approval.contains("Olga"));

    world.press(ADMIN, ButtonAction::ApproveVendor { draft_id: draft_id.clone() }).await;

    let vendors = vendors(&world).await;
    assert_eq!(vendors.len(), 1);
    let (vendor_id, vendor) = &vendors[0];
    assert_eq!(vendor_id.len(), 12);
    assert_eq!(vendor.name, "Pizza Place");
    assert_eq!(vendor.manager_id, Some(OWNER));
    assert_eq!(vendor.foods.len(), 2);
    assert!(vendor.created_at.is_some());
    assert!(pending_drafts(&world).await.is_empty());

    let owner: UserProfile =
        world.store.get_as(paths::user(OWNER)).await.unwrap().unwrap();
    assert!(owner.is_manager);
    assert!(world.last_text(OWNER).contains("approved"));

    // Double tap: the draft is gone, so nothing happens twice.
    world.press(ADMIN, ButtonAction::ApproveVendor { draft_id: draft_id.clone() }).await;
    assert!(world.last_text(ADMIN).contains("already handled"));
    assert_eq!(vendors.len(), 1);
}

#[tokio::test]
async fn taken_names_reprompt_without_clearing_the_draft() {
    let world = World::new(vec![ADMIN.0]);
    world.seed_vendor("r1", "Pizza Place", 900, None, &[]).await;
    world.register(OWNER, "Olga", "+55").await;

    world.say(OWNER, "register restaurant").await;
    let state = world.say(OWNER, "Pizza Place").await;
    assert!(matches!(
        state,
        ConversationState::VendorSetup { step: VendorSetupStep::Name, .. }
    ));
    assert!(world.last_text(OWNER).contains("already exists"));

    let state = world.say(OWNER, "Pizza Palace").await;
    assert!(matches!(
        state,
        ConversationState::VendorSetup { step: VendorSetupStep::Foods, .. }
    ));
}

#[tokio::test]
async fn finishing_with_an_empty_menu_is_refused() {
    let world = World::new(vec![ADMIN.0]);
    world.register(OWNER, "Olga", "+55").await;
    world.say(OWNER, "register restaurant").await;
    world.say(OWNER, "Soup Stop").await;

    let state = world.press(OWNER, ButtonAction::FinishFoods).await;
    assert!(matches!(
        state,
        ConversationState::VendorSetup { step: VendorSetupStep::Foods, .. }
    ));
    assert!(world.last_text(OWNER).contains("at least one food"));
}

#[tokio::test]
async fn rejection_deletes_the_draft_and_tells_the_submitter() {
    let world = World::new(vec![ADMIN.0]);
    world.register(ADMIN, "Root", "+1").await;
    world.register(OWNER, "Olga", "+55").await;
    world.say(OWNER, "register restaurant").await;
    world.say(OWNER, "Soup Stop").await;
    world.press(OWNER, ButtonAction::AddPresetFood { preset_index: 0 }).await;
    world.press(OWNER, ButtonAction::FinishFoods).await;
    world.share_location(OWNER, 48.85, 2.35).await;
    world.say(OWNER, "Soup.").await;

    let (draft_id, _) = pending_drafts(&world).await.remove(0);
    world.press(ADMIN, ButtonAction::RejectVendor { draft_id }).await;

    assert!(pending_drafts(&world).await.is_empty());
    assert!(vendors(&world).await.is_empty());
    assert!(world.last_text(OWNER).contains("not approved"));
}

#[tokio::test]
async fn only_admins_can_approve() {
    let world = World::new(vec![ADMIN.0]);
    world.register(OWNER, "Olga", "+55").await;

    world
        .press(OWNER, ButtonAction::ApproveVendor { draft_id: "whatever".to_string() })
        .await;
    assert!(world.last_text(OWNER).contains("Only admins"));
}

#[tokio::test]
async fn cancel_abandons_the_flow() {
    let world = World::new(vec![ADMIN.0]);
    world.register(OWNER, "Olga", "+55").await;
    world.say(OWNER, "register restaurant").await;
    world.say(OWNER, "Soup Stop").await;

    let state = world.say(OWNER, "cancel").await;
    assert_eq!(state, ConversationState::Idle);
    assert!(pending_drafts(&world).await.is_empty());

    // A restart after cancel stays idle.
    let world = world.restart();
    let state = world.say(OWNER, "hello?").await;
    assert_eq!(state, ConversationState::Idle);
}
