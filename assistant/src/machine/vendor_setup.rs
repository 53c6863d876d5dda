//! Self-service vendor registration and its admin approval.
//!
//! A user assembles a draft (name, menu, location, description); the
//! draft is persisted under `pending_restaurants/{draft_id}` and every
//! configured admin gets an approve/reject button pair carrying only the
//! draft id. Approval re-reads the draft, re-checks the name for
//! uniqueness at commit time, creates the vendor, and promotes the
//! submitter to manager.

use super::{AssistantEnv, FlowError, Transition};
use crate::machine::state::{ConversationState, VendorDraft, VendorSetupStep};
use crate::types::{money, parse_custom_food, preset_foods, Food, PendingVendor, UserProfile, Vendor};
use crate::{ids, paths, queries};
use mealflow_core::chat::{ButtonAction, EventKind, Keyboard, OutboundMessage};
use mealflow_core::store::{server_timestamp, StoreError};
use mealflow_core::ActorId;
use serde_json::{json, Map};
use tracing::{info, warn};

/// Starts the registration flow.
#[must_use]
pub(super) fn start(actor: ActorId) -> Transition {
    Transition::to(ConversationState::VendorSetup {
        step: VendorSetupStep::Name,
        draft: VendorDraft::default(),
    })
    .say(actor, "Let's register your restaurant. What's it called?")
}

const CUSTOM_FOOD_PROMPT: &str =
    "Send the food as: Name | Ingredients | Price | Serves\nFor example: Taco | Beef, salsa | 3.25 | 1";

pub(super) async fn handle(
    env: &AssistantEnv,
    actor: ActorId,
    profile: &UserProfile,
    step: VendorSetupStep,
    mut draft: VendorDraft,
    kind: &EventKind,
) -> Result<Transition, FlowError> {
    match step {
        VendorSetupStep::Name => {
            let EventKind::Text(name) = kind else {
                return super::fall_through(
                    env,
                    actor,
                    profile,
                    kind,
                    OutboundMessage::text("What's the restaurant called?"),
                )
                .await;
            };
            let name = name.trim();
            if name.is_empty() {
                return Ok(Transition::stay().say(actor, "What's the restaurant called?"));
            }
            if queries::vendor_name_taken(env.store.as_ref(), name, None).await? {
                return Ok(Transition::stay().say(
                    actor,
                    "A restaurant with that name already exists. Send a different name.",
                ));
            }
            draft.name = name.to_string();
            Ok(Transition::to(ConversationState::VendorSetup {
                step: VendorSetupStep::Foods,
                draft,
            })
            .send(actor, foods_prompt()))
        },

        VendorSetupStep::Foods => match kind {
            EventKind::Button(ButtonAction::AddPresetFood { preset_index }) => {
                let Some(food) = preset_foods().into_iter().nth(*preset_index) else {
                    return Ok(Transition::stay().say(actor, "That preset no longer exists."));
                };
                Ok(add_food_to_draft(actor, draft, food))
            },
            EventKind::Button(ButtonAction::AddCustomFood) => {
                Ok(Transition::to(ConversationState::VendorSetup {
                    step: VendorSetupStep::CustomFood,
                    draft,
                })
                .say(actor, CUSTOM_FOOD_PROMPT))
            },
            EventKind::Button(ButtonAction::FinishFoods) => {
                if draft.foods.is_empty() {
                    return Ok(Transition::stay().say(actor, "Add at least one food first."));
                }
                Ok(Transition::to(ConversationState::VendorSetup {
                    step: VendorSetupStep::Location,
                    draft,
                })
                .send(
                    actor,
                    OutboundMessage::with_keyboard(
                        "Where is the restaurant? Share its location.",
                        Keyboard::RequestLocation,
                    ),
                ))
            },
            _ => super::fall_through(env, actor, profile, kind, foods_prompt()).await,
        },

        VendorSetupStep::CustomFood => {
            let EventKind::Text(line) = kind else {
                return super::fall_through(env, actor, profile, kind, OutboundMessage::text(CUSTOM_FOOD_PROMPT))
                    .await;
            };
            let Some(food) = parse_custom_food(line) else {
                return Ok(Transition::stay()
                    .say(actor, format!("I couldn't read that.\n{CUSTOM_FOOD_PROMPT}")));
            };
            Ok(add_food_to_draft(actor, draft, food))
        },

        VendorSetupStep::Location => {
            let EventKind::Location(point) = kind else {
                return super::fall_through(
                    env,
                    actor,
                    profile,
                    kind,
                    OutboundMessage::with_keyboard(
                        "Share the restaurant's location to continue.",
                        Keyboard::RequestLocation,
                    ),
                )
                .await;
            };
            draft.location = Some(*point);
            Ok(Transition::to(ConversationState::VendorSetup {
                step: VendorSetupStep::Description,
                draft,
            })
            .say(actor, "Almost done. Describe the restaurant in a sentence."))
        },

        VendorSetupStep::Description => {
            let EventKind::Text(description) = kind else {
                return super::fall_through(
                    env,
                    actor,
                    profile,
                    kind,
                    OutboundMessage::text("Describe the restaurant in a sentence."),
                )
                .await;
            };
            draft.description = Some(description.trim().to_string());
            submit(env, actor, profile, draft).await
        },
    }
}

/// Dedupes by name, appends, and returns to the foods step.
fn add_food_to_draft(actor: ActorId, mut draft: VendorDraft, food: Food) -> Transition {
    let duplicate = draft
        .foods
        .iter()
        .any(|f| f.name.eq_ignore_ascii_case(&food.name));
    if duplicate {
        return Transition::stay().say(actor, format!("{} is already on the menu.", food.name));
    }
    let confirmation = format!("Added {} ({}).", food.name, money(food.price));
    draft.foods.push(food);
    Transition::to(ConversationState::VendorSetup { step: VendorSetupStep::Foods, draft })
        .say(actor, confirmation)
}

fn foods_prompt() -> OutboundMessage {
    let mut buttons: Vec<(String, ButtonAction)> = preset_foods()
        .into_iter()
        .enumerate()
        .map(|(preset_index, food)| {
            (
                format!("{} ({})", food.name, money(food.price)),
                ButtonAction::AddPresetFood { preset_index },
            )
        })
        .collect();
    buttons.push(("Custom food".to_string(), ButtonAction::AddCustomFood));
    buttons.push(("Done".to_string(), ButtonAction::FinishFoods));
    OutboundMessage::with_keyboard("Now build the menu:", Keyboard::column(buttons))
}

/// Persists the draft and fans the approval request out to the admins.
async fn submit(
    env: &AssistantEnv,
    actor: ActorId,
    profile: &UserProfile,
    draft: VendorDraft,
) -> Result<Transition, FlowError> {
    let draft_id = ids::draft_id();
    let pending = PendingVendor {
        name: draft.name,
        description: draft.description.unwrap_or_default(),
        location: draft.location,
        foods: draft.foods,
        manager_id: actor,
        manager_name: profile.name.clone(),
        submitted_at: None,
    };
    let mut record =
        serde_json::to_value(&pending).map_err(|e| StoreError::Serialization(e.to_string()))?;
    if let Some(fields) = record.as_object_mut() {
        fields.insert("submitted_at".to_string(), server_timestamp());
    }
    env.store.set(paths::pending_vendor(&draft_id), record).await?;
    info!(draft_id, name = %pending.name, "vendor registration submitted");

    if env.config.admins.is_empty() {
        warn!(draft_id, "no admins configured; registration cannot be approved");
    }

    let mut transition = Transition::idle().say(
        actor,
        "Thanks! Your restaurant was sent for approval. I'll let you know the outcome.",
    );
    for admin in &env.config.admins {
        transition = transition.send(*admin, approval_request(&draft_id, &pending));
    }
    Ok(transition)
}

fn approval_request(draft_id: &str, pending: &PendingVendor) -> OutboundMessage {
    let foods = pending
        .foods
        .iter()
        .map(|f| format!("{} ({})", f.name, money(f.price)))
        .collect::<Vec<_>>()
        .join(", ");
    let text = format!(
        "New restaurant registration: {}\nBy: {} (id {})\nMenu: {foods}\nAbout: {}",
        pending.name, pending.manager_name, pending.manager_id, pending.description,
    );
    OutboundMessage::with_keyboard(
        text,
        Keyboard::column(vec![
            ("Approve".to_string(), ButtonAction::ApproveVendor { draft_id: draft_id.to_string() }),
            ("Reject".to_string(), ButtonAction::RejectVendor { draft_id: draft_id.to_string() }),
        ]),
    )
}

/// Approves a pending registration: creates the vendor and promotes the
/// submitter to manager. Idempotent against double taps: the first
/// approval deletes the draft, so the second finds nothing.
pub(super) async fn approve(
    env: &AssistantEnv,
    actor: ActorId,
    draft_id: &str,
) -> Result<Transition, FlowError> {
    if !env.config.is_admin(actor) {
        return Ok(Transition::stay().say(actor, "Only admins can approve registrations."));
    }
    let Some(pending) = load_pending(env, draft_id).await? else {
        return Ok(Transition::stay().say(actor, "That registration was already handled."));
    };

    // Uniqueness is enforced at commit, not just at draft time: another
    // vendor may have claimed the name while the draft sat in review.
    if queries::vendor_name_taken(env.store.as_ref(), &pending.name, None).await? {
        env.store.delete(paths::pending_vendor(draft_id)).await?;
        return Ok(Transition::stay()
            .say(
                actor,
                format!("The name '{}' was taken while this sat in review; registration dropped.", pending.name),
            )
            .say(
                pending.manager_id,
                format!("Sorry, the name '{}' is no longer available. Please register again.", pending.name),
            ));
    }

    let vendor_id = ids::vendor_id();
    let vendor = Vendor {
        name: pending.name.clone(),
        description: pending.description.clone(),
        phone: None,
        location: pending.location,
        image: None,
        manager_id: Some(pending.manager_id),
        foods: pending.foods.clone(),
        rating: 0.0,
        orders_count: 0,
        orders: Vec::new(),
        created_at: None,
    };
    let mut record =
        serde_json::to_value(&vendor).map_err(|e| StoreError::Serialization(e.to_string()))?;
    if let Some(fields) = record.as_object_mut() {
        fields.insert("created_at".to_string(), server_timestamp());
    }
    env.store.set(paths::vendor(&vendor_id), record).await?;
    env.store.delete(paths::pending_vendor(draft_id)).await?;

    let mut fields = Map::new();
    fields.insert("is_manager".to_string(), json!(true));
    env.store.update(paths::user(pending.manager_id), fields).await?;
    info!(vendor_id, name = %vendor.name, "vendor registration approved");

    Ok(Transition::stay()
        .say(actor, format!("Approved {}.", vendor.name))
        .say(
            pending.manager_id,
            format!("Your restaurant {} was approved and is now live!", vendor.name),
        ))
}

/// Rejects a pending registration.
pub(super) async fn reject(
    env: &AssistantEnv,
    actor: ActorId,
    draft_id: &str,
) -> Result<Transition, FlowError> {
    if !env.config.is_admin(actor) {
        return Ok(Transition::stay().say(actor, "Only admins can reject registrations."));
    }
    let Some(pending) = load_pending(env, draft_id).await? else {
        return Ok(Transition::stay().say(actor, "That registration was already handled."));
    };
    env.store.delete(paths::pending_vendor(draft_id)).await?;
    info!(draft_id, name = %pending.name, "vendor registration rejected");

    Ok(Transition::stay()
        .say(actor, format!("Rejected {}.", pending.name))
        .say(
            pending.manager_id,
            format!("Sorry, your restaurant {} was not approved.", pending.name),
        ))
}

async fn load_pending(
    env: &AssistantEnv,
    draft_id: &str,
) -> Result<Option<PendingVendor>, FlowError> {
    let Some(value) = env.store.get(paths::pending_vendor(draft_id)).await? else {
        return Ok(None);
    };
    match serde_json::from_value(value) {
        Ok(pending) => Ok(Some(pending)),
        Err(e) => {
            warn!(draft_id, error = %e, "dropping undecodable pending registration");
            env.store.delete(paths::pending_vendor(draft_id)).await?;
            Ok(None)
        },
    }
}
