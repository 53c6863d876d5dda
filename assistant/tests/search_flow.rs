//! Discovery: proximity search with a radius cutoff, name and food
//! search, and the rating and speed rankings.

#![allow(clippy::unwrap_used)] // Test code can unwrap

mod support;

use mealflow_assistant::machine::state::ConversationState;
use mealflow_assistant::paths;
use mealflow_assistant::types::UserProfile;
use mealflow_core::chat::Keyboard;
use mealflow_core::store::DurableStore;
use mealflow_core::ActorId;
use serde_json::json;
use support::World;

const USER: ActorId = ActorId(7);

// Origin is central Paris; Near Bistro is under a kilometre away, Mid
// Cafe about six, and Far Diner sits in London.
const ORIGIN: (f64, f64) = (48.8566, 2.3522);

async fn seeded_world() -> World {
    let world = World::new(vec![]);
    world
        .seed_vendor("near", "Near Bistro", 900, Some((48.86, 2.36)), &[("Pizza", "7.50")])
        .await;
    world
        .seed_vendor("mid", "Mid Cafe", 901, Some((48.90, 2.40)), &[("Burger", "5.00")])
        .await;
    world
        .seed_vendor("far", "Far Diner", 902, Some((51.5074, -0.1278)), &[("Pizza", "9.00")])
        .await;
    world.register(USER, "Ada", "+100").await;
    world
}

fn button_labels(keyboard: &Option<Keyboard>) -> Vec<String> {
    match keyboard {
        Some(Keyboard::Buttons(rows)) => {
            rows.iter().flatten().map(|(label, _)| label.clone()).collect()
        },
        _ => Vec::new(),
    }
}

#[tokio::test]
async fn nearby_filters_by_radius_and_sorts_ascending() {
    let world = seeded_world().await;

    let state = world.say(USER, "nearby").await;
    assert!(matches!(state, ConversationState::AwaitingSearchLocation { .. }));
    assert!(matches!(world.last_message(USER).keyboard, Some(Keyboard::RequestLocation)));

    let state = world.share_location(USER, ORIGIN.0, ORIGIN.1).await;
    assert_eq!(state, ConversationState::Idle);

    let labels = button_labels(&world.last_message(USER).keyboard);
    assert_eq!(labels.len(), 2);
    assert!(labels[0].starts_with("Near Bistro"));
    assert!(labels[1].starts_with("Mid Cafe"));

    // The share doubles as the remembered location.
    let profile: UserProfile =
        world.store.get_as(paths::user(USER)).await.unwrap().unwrap();
    let at = profile.last_location.unwrap();
    assert!((at.lat - ORIGIN.0).abs() < 1e-9);
}

#[tokio::test]
async fn nearby_with_nothing_in_range_says_so() {
    let world = World::new(vec![]);
    world
        .seed_vendor("far", "Far Diner", 902, Some((51.5074, -0.1278)), &[])
        .await;
    world.register(USER, "Ada", "+100").await;

    world.say(USER, "nearby").await;
    world.share_location(USER, ORIGIN.0, ORIGIN.1).await;
    assert!(world.last_text(USER).contains("No restaurants found within 10 km"));
}

#[tokio::test]
async fn closest_uses_the_remembered_location_without_a_cutoff() {
    let world = seeded_world().await;

    // No location known yet.
    world.say(USER, "closest").await;
    assert!(world.last_text(USER).contains("don't know where you are"));

    world.say(USER, "nearby").await;
    world.share_location(USER, ORIGIN.0, ORIGIN.1).await;

    world.say(USER, "closest").await;
    let labels = button_labels(&world.last_message(USER).keyboard);
    assert_eq!(labels.len(), 3);
    assert!(labels[2].starts_with("Far Diner"));
}

#[tokio::test]
async fn name_and_food_search_match_case_insensitively() {
    let world = seeded_world().await;

    world.say(USER, "search restaurant").await;
    let state = world.say(USER, "DINER").await;
    assert_eq!(state, ConversationState::Idle);
    let labels = button_labels(&world.last_message(USER).keyboard);
    assert_eq!(labels, vec!["Far Diner".to_string()]);

    world.say(USER, "search food").await;
    world.say(USER, "pizza").await;
    let labels = button_labels(&world.last_message(USER).keyboard);
    assert_eq!(labels.len(), 2);
    assert!(labels.iter().any(|l| l == "Near Bistro: Pizza (7.50)"));
    assert!(labels.iter().any(|l| l == "Far Diner: Pizza (9.00)"));

    world.say(USER, "search food").await;
    world.say(USER, "sushi").await;
    assert!(world.last_text(USER).contains("Nobody serves 'sushi'"));
}

#[tokio::test]
async fn rankings_order_by_rating_and_order_volume() {
    let world = seeded_world().await;
    for (vendor_id, rating, orders_count) in
        [("near", 4.5, 20), ("mid", 3.0, 2), ("far", 5.0, 7)]
    {
        let mut fields = serde_json::Map::new();
        fields.insert("rating".to_string(), json!(rating));
        fields.insert("orders_count".to_string(), json!(orders_count));
        world.store.update(paths::vendor(vendor_id), fields).await.unwrap();
    }

    world.say(USER, "top rated").await;
    let labels = button_labels(&world.last_message(USER).keyboard);
    assert_eq!(labels[0], "Far Diner (rating 5.0)");
    assert_eq!(labels[1], "Near Bistro (rating 4.5)");
    assert_eq!(labels[2], "Mid Cafe (rating 3.0)");

    world.say(USER, "fastest").await;
    let labels = button_labels(&world.last_message(USER).keyboard);
    assert_eq!(labels[0], "Mid Cafe (2 orders)");
    assert_eq!(labels[1], "Far Diner (7 orders)");
    assert_eq!(labels[2], "Near Bistro (20 orders)");
}
