//! Direct vendor creation by an admin.
//!
//! No approval round-trip: the admin walks through name, phone, location,
//! manager lookup, and an optional photo, and the vendor goes live at the
//! end of the flow.

use super::{AssistantEnv, FlowError, Transition};
use crate::machine::state::{AdminVendorStep, ConversationState, VendorDraft};
use crate::types::{UserProfile, Vendor};
use crate::{ids, paths, queries};
use mealflow_core::chat::{ButtonAction, EventKind, Keyboard, OutboundMessage};
use mealflow_core::store::{server_timestamp, StoreError};
use mealflow_core::ActorId;
use serde_json::{json, Map};
use tracing::info;

const MANAGER_MATCH_LIMIT: usize = 5;

/// Starts the flow, admins only.
#[must_use]
pub(super) fn start(env: &AssistantEnv, actor: ActorId) -> Transition {
    if !env.config.is_admin(actor) {
        return Transition::stay().say(actor, "Only admins can add restaurants directly.");
    }
    Transition::to(ConversationState::AdminVendor {
        step: AdminVendorStep::Name,
        draft: VendorDraft::default(),
    })
    .say(actor, "What's the restaurant called?")
}

pub(super) async fn handle(
    env: &AssistantEnv,
    actor: ActorId,
    profile: &UserProfile,
    step: AdminVendorStep,
    mut draft: VendorDraft,
    kind: &EventKind,
) -> Result<Transition, FlowError> {
    match step {
        AdminVendorStep::Name => {
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
            Ok(Transition::to(ConversationState::AdminVendor {
                step: AdminVendorStep::Phone,
                draft,
            })
            .say(actor, "Contact phone number?"))
        },

        AdminVendorStep::Phone => {
            let EventKind::Text(phone) = kind else {
                return super::fall_through(
                    env,
                    actor,
                    profile,
                    kind,
                    OutboundMessage::text("Contact phone number?"),
                )
                .await;
            };
            draft.phone = Some(phone.trim().to_string());
            Ok(Transition::to(ConversationState::AdminVendor {
                step: AdminVendorStep::Location,
                draft,
            })
            .send(
                actor,
                OutboundMessage::with_keyboard(
                    "Where is it? Share the restaurant's location.",
                    Keyboard::RequestLocation,
                ),
            ))
        },

        AdminVendorStep::Location => {
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
            Ok(Transition::to(ConversationState::AdminVendor {
                step: AdminVendorStep::Manager,
                draft,
            })
            .say(actor, "Who manages it? Send a name or phone number to search for the user."))
        },

        AdminVendorStep::Manager => match kind {
            EventKind::Text(query) => {
                let needle = query.trim().to_lowercase();
                let matches: Vec<(String, ButtonAction)> = queries::load_users(env.store.as_ref())
                    .await?
                    .into_iter()
                    .filter(|(_, user)| {
                        user.name.to_lowercase().contains(&needle) || user.phone.contains(needle.as_str())
                    })
                    .take(MANAGER_MATCH_LIMIT)
                    .map(|(user_id, user)| {
                        (
                            format!("{} ({})", user.name, user.phone),
                            ButtonAction::PickManager { user_id },
                        )
                    })
                    .collect();
                if matches.is_empty() {
                    return Ok(Transition::stay()
                        .say(actor, format!("No users matched '{}'. Try another search.", query.trim())));
                }
                Ok(Transition::stay().send(
                    actor,
                    OutboundMessage::with_keyboard("Pick the manager:", Keyboard::column(matches)),
                ))
            },
            EventKind::Button(ButtonAction::PickManager { user_id }) => {
                if queries::load_profile(env.store.as_ref(), *user_id).await?.is_none() {
                    return Ok(Transition::stay().say(actor, "That user no longer exists."));
                }
                draft.manager_id = Some(*user_id);
                Ok(Transition::to(ConversationState::AdminVendor {
                    step: AdminVendorStep::Photo,
                    draft,
                })
                .say(actor, "Send a storefront photo, or type 'skip'."))
            },
            _ => {
                super::fall_through(
                    env,
                    actor,
                    profile,
                    kind,
                    OutboundMessage::text("Send a name or phone number to search for the manager."),
                )
                .await
            },
        },

        AdminVendorStep::Photo => match kind {
            EventKind::Photo { file_ref } => {
                draft.image = Some(super::resolve_image(env, file_ref).await);
                commit(env, actor, draft).await
            },
            EventKind::Text(text) if text.trim().eq_ignore_ascii_case("skip") => {
                commit(env, actor, draft).await
            },
            _ => {
                super::fall_through(
                    env,
                    actor,
                    profile,
                    kind,
                    OutboundMessage::text("Send a storefront photo, or type 'skip'."),
                )
                .await
            },
        },
    }
}

/// Lists vendors as delete buttons, admins only.
pub(super) async fn delete_list(env: &AssistantEnv, actor: ActorId) -> Result<Transition, FlowError> {
    if !env.config.is_admin(actor) {
        return Ok(Transition::stay().say(actor, "Only admins can delete restaurants."));
    }
    let vendors = queries::load_vendors(env.store.as_ref()).await?;
    if vendors.is_empty() {
        return Ok(Transition::stay().say(actor, "There are no restaurants to delete."));
    }
    let buttons = vendors
        .into_iter()
        .map(|(vendor_id, vendor)| (vendor.name, ButtonAction::DeleteVendor { vendor_id }))
        .collect();
    Ok(Transition::stay().send(
        actor,
        OutboundMessage::with_keyboard(
            "Which restaurant should be deleted?",
            Keyboard::column(buttons),
        ),
    ))
}

/// Asks for confirmation before a deletion goes through.
pub(super) async fn confirm_delete(
    env: &AssistantEnv,
    actor: ActorId,
    vendor_id: &str,
) -> Result<Transition, FlowError> {
    if !env.config.is_admin(actor) {
        return Ok(Transition::stay().say(actor, "Only admins can delete restaurants."));
    }
    let Some(vendor) = queries::load_vendor(env.store.as_ref(), vendor_id).await? else {
        return Ok(Transition::stay().say(actor, "That restaurant is already gone."));
    };
    Ok(Transition::stay().send(
        actor,
        OutboundMessage::with_keyboard(
            format!("Delete {}? This cannot be undone.", vendor.name),
            Keyboard::column(vec![(
                format!("Yes, delete {}", vendor.name),
                ButtonAction::ConfirmDeleteVendor { vendor_id: vendor_id.to_string() },
            )]),
        ),
    ))
}

/// Deletes the vendor record. Order history records are never deleted,
/// so past orders keep their vendor name inline.
pub(super) async fn delete(
    env: &AssistantEnv,
    actor: ActorId,
    vendor_id: &str,
) -> Result<Transition, FlowError> {
    if !env.config.is_admin(actor) {
        return Ok(Transition::stay().say(actor, "Only admins can delete restaurants."));
    }
    let Some(vendor) = queries::load_vendor(env.store.as_ref(), vendor_id).await? else {
        return Ok(Transition::stay().say(actor, "That restaurant is already gone."));
    };
    env.store.delete(paths::vendor(vendor_id)).await?;
    info!(vendor_id, name = %vendor.name, "vendor deleted by admin");
    Ok(Transition::stay().say(actor, format!("{} removed.", vendor.name)))
}

async fn commit(
    env: &AssistantEnv,
    actor: ActorId,
    draft: VendorDraft,
) -> Result<Transition, FlowError> {
    let vendor_id = ids::vendor_id();
    let vendor = Vendor {
        name: draft.name,
        description: draft.description.unwrap_or_default(),
        phone: draft.phone,
        location: draft.location,
        image: draft.image,
        manager_id: draft.manager_id,
        foods: draft.foods,
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

    let mut transition = Transition::idle().say(
        actor,
        format!("Created {} (id {vendor_id}). Use 'edit' to add foods.", vendor.name),
    );
    if let Some(manager) = vendor.manager_id {
        let mut fields = Map::new();
        fields.insert("is_manager".to_string(), json!(true));
        env.store.update(paths::user(manager), fields).await?;
        if manager != actor {
            transition = transition.say(
                manager,
                format!("You're now the manager of {}. Order notifications will arrive here.", vendor.name),
            );
        }
    }
    info!(vendor_id, name = %vendor.name, "vendor created by admin");
    Ok(transition)
}
