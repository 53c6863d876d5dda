//! Editing an existing vendor: rename, move, re-image, add foods.
//!
//! Available to admins for every vendor and to a manager for their own.
//! Menu appends go through the transactional aggregate helper so two
//! sessions editing the same vendor cannot lose each other's foods.

use super::{AssistantEnv, FlowError, Transition};
use crate::aggregate::AggregateUpdater;
use crate::machine::state::{AddFoodStep, ConversationState, EditField};
use crate::types::{money, parse_price, Food, UserProfile, Vendor};
use crate::{paths, queries};
use mealflow_core::chat::{ButtonAction, EventKind, Keyboard, OutboundMessage};
use mealflow_core::ActorId;
use serde_json::{json, Map};
use tracing::info;

const FIELD_PROMPT: &str = "What do you want to change? Send one of: name, location, image, add food.";

fn may_edit(env: &AssistantEnv, actor: ActorId, vendor: &Vendor) -> bool {
    env.config.is_admin(actor) || vendor.manager_id == Some(actor)
}

/// Lists the vendors the actor may edit.
pub(super) async fn vendor_list(
    env: &AssistantEnv,
    actor: ActorId,
    _profile: &UserProfile,
) -> Result<Transition, FlowError> {
    let editable: Vec<(String, ButtonAction)> = queries::load_vendors(env.store.as_ref())
        .await?
        .into_iter()
        .filter(|(_, vendor)| may_edit(env, actor, vendor))
        .map(|(vendor_id, vendor)| (vendor.name, ButtonAction::EditVendor { vendor_id }))
        .collect();
    if editable.is_empty() {
        return Ok(Transition::idle().say(actor, "You don't manage any restaurants."));
    }
    Ok(Transition::idle().send(
        actor,
        OutboundMessage::with_keyboard("Which restaurant?", Keyboard::column(editable)),
    ))
}

/// Opens an edit session on one vendor.
pub(super) async fn begin(
    env: &AssistantEnv,
    actor: ActorId,
    _profile: &UserProfile,
    vendor_id: &str,
) -> Result<Transition, FlowError> {
    let Some(vendor) = queries::load_vendor(env.store.as_ref(), vendor_id).await? else {
        return Ok(Transition::stay().say(actor, "That restaurant no longer exists."));
    };
    if !may_edit(env, actor, &vendor) {
        return Ok(Transition::stay().say(actor, "You don't manage that restaurant."));
    }
    Ok(Transition::to(ConversationState::EditVendor {
        vendor_id: vendor_id.to_string(),
        field: None,
    })
    .say(actor, format!("Editing {}. {FIELD_PROMPT}", vendor.name)))
}

pub(super) async fn handle(
    env: &AssistantEnv,
    actor: ActorId,
    profile: &UserProfile,
    vendor_id: &str,
    field: Option<EditField>,
    kind: &EventKind,
) -> Result<Transition, FlowError> {
    // The vendor can disappear mid-session (another admin deleted or
    // renamed things); re-check on every step.
    let Some(vendor) = queries::load_vendor(env.store.as_ref(), vendor_id).await? else {
        return Ok(Transition::idle().say(actor, "That restaurant no longer exists."));
    };
    if !may_edit(env, actor, &vendor) {
        return Ok(Transition::idle().say(actor, "You don't manage that restaurant."));
    }

    let Some(field) = field else {
        return pick_field(env, actor, profile, vendor_id, kind).await;
    };

    match field {
        EditField::Name => {
            let EventKind::Text(name) = kind else {
                return super::fall_through(env, actor, profile, kind, OutboundMessage::text("Send the new name."))
                    .await;
            };
            let name = name.trim();
            if name.is_empty() {
                return Ok(Transition::stay().say(actor, "Send the new name."));
            }
            if queries::vendor_name_taken(env.store.as_ref(), name, Some(vendor_id)).await? {
                return Ok(Transition::stay()
                    .say(actor, "A restaurant with that name already exists. Send a different one."));
            }
            let mut fields = Map::new();
            fields.insert("name".to_string(), json!(name));
            env.store.update(paths::vendor(vendor_id), fields).await?;
            info!(vendor_id, name, "vendor renamed");
            Ok(Transition::idle().say(actor, format!("Renamed to {name}.")))
        },

        EditField::Location => {
            let EventKind::Location(point) = kind else {
                return super::fall_through(
                    env,
                    actor,
                    profile,
                    kind,
                    OutboundMessage::with_keyboard("Share the new location.", Keyboard::RequestLocation),
                )
                .await;
            };
            let mut fields = Map::new();
            fields.insert("location".to_string(), json!(point));
            env.store.update(paths::vendor(vendor_id), fields).await?;
            Ok(Transition::idle().say(actor, "Location updated."))
        },

        EditField::Image => {
            let EventKind::Photo { file_ref } = kind else {
                return super::fall_through(env, actor, profile, kind, OutboundMessage::text("Send the new photo."))
                    .await;
            };
            let image = super::resolve_image(env, file_ref).await;
            let mut fields = Map::new();
            fields.insert("image".to_string(), json!(image));
            env.store.update(paths::vendor(vendor_id), fields).await?;
            Ok(Transition::idle().say(actor, "Image updated."))
        },
    }
}

async fn pick_field(
    env: &AssistantEnv,
    actor: ActorId,
    profile: &UserProfile,
    vendor_id: &str,
    kind: &EventKind,
) -> Result<Transition, FlowError> {
    let EventKind::Text(choice) = kind else {
        return super::fall_through(env, actor, profile, kind, OutboundMessage::text(FIELD_PROMPT)).await;
    };
    let vendor_id = vendor_id.to_string();
    let transition = match choice.trim().to_lowercase().as_str() {
        "name" => Transition::to(ConversationState::EditVendor {
            vendor_id,
            field: Some(EditField::Name),
        })
        .say(actor, "Send the new name."),
        "location" => Transition::to(ConversationState::EditVendor {
            vendor_id,
            field: Some(EditField::Location),
        })
        .send(
            actor,
            OutboundMessage::with_keyboard("Share the new location.", Keyboard::RequestLocation),
        ),
        "image" => Transition::to(ConversationState::EditVendor {
            vendor_id,
            field: Some(EditField::Image),
        })
        .say(actor, "Send the new photo."),
        "add food" | "food" => Transition::to(ConversationState::AddFood {
            vendor_id,
            step: AddFoodStep::Name,
        })
        .say(actor, "What's the food called?"),
        _ => {
            return super::fall_through(
                env,
                actor,
                profile,
                &EventKind::Text(choice.clone()),
                OutboundMessage::text(FIELD_PROMPT),
            )
            .await;
        },
    };
    Ok(transition)
}

pub(super) async fn handle_add_food(
    env: &AssistantEnv,
    actor: ActorId,
    profile: &UserProfile,
    vendor_id: &str,
    step: AddFoodStep,
    kind: &EventKind,
) -> Result<Transition, FlowError> {
    match step {
        AddFoodStep::Name => {
            let EventKind::Text(name) = kind else {
                return super::fall_through(env, actor, profile, kind, OutboundMessage::text("What's the food called?"))
                    .await;
            };
            let name = name.trim();
            if name.is_empty() {
                return Ok(Transition::stay().say(actor, "What's the food called?"));
            }
            Ok(Transition::to(ConversationState::AddFood {
                vendor_id: vendor_id.to_string(),
                step: AddFoodStep::Price { name: name.to_string() },
            })
            .say(actor, format!("Price for {name}?")))
        },

        AddFoodStep::Price { name } => {
            let EventKind::Text(price_text) = kind else {
                return super::fall_through(
                    env,
                    actor,
                    profile,
                    kind,
                    OutboundMessage::text(format!("Price for {name}?")),
                )
                .await;
            };
            let Some(price) = parse_price(price_text) else {
                return Ok(Transition::stay().say(actor, "Invalid price. Send a number like 5 or 5.50."));
            };

            let Some(vendor) = queries::load_vendor(env.store.as_ref(), vendor_id).await? else {
                return Ok(Transition::idle().say(actor, "That restaurant no longer exists."));
            };
            if vendor.foods.iter().any(|f| f.name.eq_ignore_ascii_case(&name)) {
                return Ok(Transition::idle().say(actor, format!("{name} is already on the menu.")));
            }

            let food = Food {
                name: name.clone(),
                ingredients: String::new(),
                price,
                serves: None,
            };
            AggregateUpdater::new(env.store.clone())
                .append_food_if_new(paths::vendor_foods(vendor_id), &food)
                .await?;
            info!(vendor_id, food = %name, "food added to menu");
            Ok(Transition::idle().say(actor, format!("Added {name} ({}).", money(price))))
        },
    }
}
