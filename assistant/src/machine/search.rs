//! Vendor discovery: name and food search, rankings, and proximity.

use super::{AssistantEnv, FlowError, Transition};
use crate::geo;
use crate::machine::state::{ConversationState, SearchTarget};
use crate::types::{money, UserProfile, Vendor};
use crate::{paths, queries};
use mealflow_core::chat::{ButtonAction, EventKind, Keyboard, OutboundMessage};
use mealflow_core::{ActorId, GeoPoint};
use serde_json::{json, Map};

const RANKING_LIMIT: usize = 10;
const NEARBY_LIMIT: usize = 15;

/// Starts a name or food search.
#[must_use]
pub(super) fn start_query(actor: ActorId, target: SearchTarget) -> Transition {
    let prompt = match target {
        SearchTarget::Vendor => "Send part of the restaurant name.",
        SearchTarget::Food => "What food are you craving?",
    };
    Transition::to(ConversationState::AwaitingSearchQuery { target }).say(actor, prompt)
}

/// Handles the search query text.
pub(super) async fn handle_query(
    env: &AssistantEnv,
    actor: ActorId,
    profile: &UserProfile,
    target: SearchTarget,
    kind: &EventKind,
) -> Result<Transition, FlowError> {
    let EventKind::Text(query) = kind else {
        let prompt = match target {
            SearchTarget::Vendor => "Send part of the restaurant name.",
            SearchTarget::Food => "What food are you craving?",
        };
        return super::fall_through(env, actor, profile, kind, OutboundMessage::text(prompt)).await;
    };

    let needle = query.trim().to_lowercase();
    let vendors = queries::load_vendors(env.store.as_ref()).await?;
    let transition = match target {
        SearchTarget::Vendor => {
            let matches: Vec<(String, ButtonAction)> = vendors
                .into_iter()
                .filter(|(_, vendor)| vendor.name.to_lowercase().contains(&needle))
                .map(|(vendor_id, vendor)| (vendor.name, ButtonAction::PickVendor { vendor_id }))
                .collect();
            if matches.is_empty() {
                Transition::idle().say(actor, format!("No restaurants matched '{}'.", query.trim()))
            } else {
                Transition::idle().send(
                    actor,
                    OutboundMessage::with_keyboard("Here's what I found:", Keyboard::column(matches)),
                )
            }
        },
        SearchTarget::Food => {
            let mut matches = Vec::new();
            for (vendor_id, vendor) in vendors {
                for food in &vendor.foods {
                    if food.name.to_lowercase().contains(&needle) {
                        matches.push((
                            format!("{}: {} ({})", vendor.name, food.name, money(food.price)),
                            ButtonAction::PickVendor { vendor_id: vendor_id.clone() },
                        ));
                    }
                }
            }
            matches.truncate(NEARBY_LIMIT);
            if matches.is_empty() {
                Transition::idle().say(actor, format!("Nobody serves '{}' right now.", query.trim()))
            } else {
                Transition::idle().send(
                    actor,
                    OutboundMessage::with_keyboard("Here's what I found:", Keyboard::column(matches)),
                )
            }
        },
    };
    Ok(transition)
}

/// Starts a proximity search by asking for a location share.
#[must_use]
pub(super) fn start_nearby(actor: ActorId, radius_km: f64) -> Transition {
    Transition::to(ConversationState::AwaitingSearchLocation { radius_km }).send(
        actor,
        OutboundMessage::with_keyboard(
            format!("Share your location and I'll look within {radius_km:.0} km."),
            Keyboard::RequestLocation,
        ),
    )
}

/// Handles the shared location for a proximity search.
pub(super) async fn handle_location(
    env: &AssistantEnv,
    actor: ActorId,
    profile: &UserProfile,
    radius_km: f64,
    kind: &EventKind,
) -> Result<Transition, FlowError> {
    let EventKind::Location(origin) = kind else {
        return super::fall_through(
            env,
            actor,
            profile,
            kind,
            OutboundMessage::with_keyboard("Share your location to search nearby.", Keyboard::RequestLocation),
        )
        .await;
    };

    // Remember the share so 'closest' works without re-asking.
    let mut fields = Map::new();
    fields.insert("last_location".to_string(), json!(origin));
    env.store.update(paths::user(actor), fields).await?;

    let ranked = ranked_vendors(env, *origin, radius_km, NEARBY_LIMIT).await?;
    if ranked.is_empty() {
        return Ok(Transition::idle().say(
            actor,
            format!("No restaurants found within {radius_km:.0} km."),
        ));
    }
    Ok(Transition::idle().send(actor, distance_listing(ranked)))
}

/// Ranks all located vendors by distance from the user's last shared
/// location, without a radius cutoff.
pub(super) async fn closest(
    env: &AssistantEnv,
    actor: ActorId,
    profile: &UserProfile,
) -> Result<Transition, FlowError> {
    let Some(origin) = profile.last_location else {
        return Ok(Transition::idle().say(
            actor,
            "I don't know where you are yet. Send 'nearby' and share your location.",
        ));
    };
    let ranked = ranked_vendors(env, origin, f64::INFINITY, RANKING_LIMIT).await?;
    if ranked.is_empty() {
        return Ok(Transition::idle().say(actor, "No restaurants have a location yet."));
    }
    Ok(Transition::idle().send(actor, distance_listing(ranked)))
}

/// The highest-rated vendors.
pub(super) async fn top_rated(env: &AssistantEnv, actor: ActorId) -> Result<Transition, FlowError> {
    let ordered = env
        .store
        .query_by_field(paths::vendors(), "rating".to_string())
        .await?;
    let buttons: Vec<(String, ButtonAction)> = decode_ordered(ordered)
        .into_iter()
        .rev() // ascending to descending
        .take(RANKING_LIMIT)
        .map(|(vendor_id, vendor)| {
            (
                format!("{} (rating {:.1})", vendor.name, vendor.rating),
                ButtonAction::PickVendor { vendor_id },
            )
        })
        .collect();
    Ok(listing(actor, "Top rated restaurants:", buttons))
}

/// The vendors with the fewest orders on the books, as a proxy for the
/// shortest wait.
pub(super) async fn fastest(env: &AssistantEnv, actor: ActorId) -> Result<Transition, FlowError> {
    let ordered = env
        .store
        .query_by_field(paths::vendors(), "orders_count".to_string())
        .await?;
    let buttons: Vec<(String, ButtonAction)> = decode_ordered(ordered)
        .into_iter()
        .take(RANKING_LIMIT)
        .map(|(vendor_id, vendor)| {
            (
                format!("{} ({} orders)", vendor.name, vendor.orders_count),
                ButtonAction::PickVendor { vendor_id },
            )
        })
        .collect();
    Ok(listing(actor, "Probably the fastest right now:", buttons))
}

fn listing(actor: ActorId, title: &str, buttons: Vec<(String, ButtonAction)>) -> Transition {
    if buttons.is_empty() {
        Transition::idle().say(actor, "No restaurants yet. Check back soon!")
    } else {
        Transition::idle().send(actor, OutboundMessage::with_keyboard(title, Keyboard::column(buttons)))
    }
}

fn decode_ordered(ordered: Vec<(String, serde_json::Value)>) -> Vec<(String, Vendor)> {
    ordered
        .into_iter()
        .filter_map(|(vendor_id, value)| {
            serde_json::from_value(value).ok().map(|vendor| (vendor_id, vendor))
        })
        .collect()
}

async fn ranked_vendors(
    env: &AssistantEnv,
    origin: GeoPoint,
    radius_km: f64,
    limit: usize,
) -> Result<Vec<((String, Vendor), f64)>, FlowError> {
    let located: Vec<((String, Vendor), GeoPoint)> = queries::load_vendors(env.store.as_ref())
        .await?
        .into_iter()
        .filter_map(|(vendor_id, vendor)| {
            vendor.location.map(|at| ((vendor_id, vendor), at))
        })
        .collect();
    Ok(geo::rank_by_distance(located, origin, radius_km, limit))
}

fn distance_listing(ranked: Vec<((String, Vendor), f64)>) -> OutboundMessage {
    let buttons = ranked
        .into_iter()
        .map(|((vendor_id, vendor), distance)| {
            (
                format!("{} ({distance:.1} km)", vendor.name),
                ButtonAction::PickVendor { vendor_id },
            )
        })
        .collect();
    OutboundMessage::with_keyboard("Closest first:", Keyboard::column(buttons))
}
