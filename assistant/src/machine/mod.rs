//! The conversation state machine.
//!
//! Every inbound event goes through [`handle_event`]: a pure-ish async
//! dispatch from `(persisted state, event)` to a [`Transition`] carrying
//! the next state and the replies to send. The caller (the service layer)
//! persists the next state *before* sending any reply, which is what makes
//! conversations resumable across crashes.
//!
//! Dispatch precedence, most specific first:
//!
//! 1. a shared contact card always (re-)registers the user
//! 2. unregistered users are gated to the contact prompt
//! 3. `cancel` (text or button) abandons any flow
//! 4. the active flow consumes the inputs it expects
//! 5. anything the flow does not consume falls through to the top-level
//!    command palette, so starting a new command simply overwrites the
//!    old flow's state
//! 6. otherwise the flow re-prompts its current step

pub mod admin_vendor;
pub mod commands;
pub mod ordering;
pub mod registration;
pub mod search;
pub mod state;
pub mod vendor_edit;
pub mod vendor_setup;

use crate::config::Config;
use mealflow_core::chat::{ButtonAction, EventKind, InboundEvent, OutboundMessage};
use mealflow_core::environment::{Clock, MediaStore};
use mealflow_core::store::{DurableStore, StoreError};
use mealflow_core::ActorId;
use mealflow_runtime::Scheduler;
use state::ConversationState;
use std::sync::Arc;
use thiserror::Error;

/// Everything the flows need to talk to the outside world.
pub struct AssistantEnv {
    /// The durable store.
    pub store: Arc<dyn DurableStore>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Optional blob storage for vendor images.
    pub media: Option<Arc<dyn MediaStore>>,
    /// Handle for registering order notifications.
    pub scheduler: Scheduler<String>,
    /// Static configuration.
    pub config: Config,
}

/// Errors a flow can fail with.
///
/// User mistakes are never errors; they become re-prompt replies. This is
/// only for infrastructure failures the service layer should log.
#[derive(Error, Debug)]
pub enum FlowError {
    /// The durable store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The outcome of handling one event: the state to persist (if it
/// changed) and the replies to send afterwards.
#[derive(Debug)]
pub struct Transition {
    /// Next conversation state; `None` leaves the persisted state alone.
    pub next: Option<ConversationState>,
    /// Replies to send once the state is persisted. Not all replies go to
    /// the acting user: approvals and notifications address other actors.
    pub replies: Vec<(ActorId, OutboundMessage)>,
}

impl Transition {
    /// Keeps the current state.
    #[must_use]
    pub const fn stay() -> Self {
        Self { next: None, replies: Vec::new() }
    }

    /// Moves to `state`.
    #[must_use]
    pub const fn to(state: ConversationState) -> Self {
        Self { next: Some(state), replies: Vec::new() }
    }

    /// Clears the flow back to idle.
    #[must_use]
    pub const fn idle() -> Self {
        Self::to(ConversationState::Idle)
    }

    /// Adds a plain-text reply to `actor`.
    #[must_use]
    pub fn say(self, actor: ActorId, text: impl Into<String>) -> Self {
        self.send(actor, OutboundMessage::text(text))
    }

    /// Adds a reply to `actor`.
    #[must_use]
    pub fn send(mut self, actor: ActorId, message: OutboundMessage) -> Self {
        self.replies.push((actor, message));
        self
    }
}

const UNKNOWN_COMMAND: &str = "I didn't understand that. Send 'menu' to see what I can do.";

fn is_cancel(kind: &EventKind) -> bool {
    match kind {
        EventKind::Text(text) => {
            let text = text.trim().trim_start_matches('/').to_lowercase();
            text == "cancel"
        },
        EventKind::Button(action) => *action == ButtonAction::Cancel,
        _ => false,
    }
}

/// Handles one inbound event against the persisted conversation state.
///
/// # Errors
///
/// [`FlowError`] only on infrastructure failure; user mistakes come back
/// as re-prompt replies inside an `Ok` transition.
pub async fn handle_event(
    env: &AssistantEnv,
    state: ConversationState,
    event: &InboundEvent,
) -> Result<Transition, FlowError> {
    let actor = event.actor;

    // A contact card registers (or refreshes) the user from any state.
    if let EventKind::Contact { phone, display_name } = &event.kind {
        return registration::register(env, actor, phone, display_name).await;
    }

    let profile = crate::queries::load_profile(env.store.as_ref(), actor).await?;
    let Some(profile) = profile.filter(|p| !p.phone.trim().is_empty()) else {
        return Ok(registration::request_contact(actor));
    };

    if is_cancel(&event.kind) {
        return Ok(if state == ConversationState::Idle {
            Transition::stay().say(actor, "Nothing to cancel.")
        } else {
            Transition::idle().say(actor, "Cancelled.")
        });
    }

    match state {
        // A registered user stuck in the contact gate just resumes idle.
        ConversationState::Idle | ConversationState::AwaitingContact => {
            match commands::try_command(env, actor, &profile, &event.kind).await? {
                Some(transition) => Ok(transition),
                None => Ok(Transition::idle().say(actor, UNKNOWN_COMMAND)),
            }
        },
        ConversationState::VendorSetup { step, draft } => {
            vendor_setup::handle(env, actor, &profile, step, draft, &event.kind).await
        },
        ConversationState::AdminVendor { step, draft } => {
            admin_vendor::handle(env, actor, &profile, step, draft, &event.kind).await
        },
        ConversationState::EditVendor { vendor_id, field } => {
            vendor_edit::handle(env, actor, &profile, &vendor_id, field, &event.kind).await
        },
        ConversationState::AddFood { vendor_id, step } => {
            vendor_edit::handle_add_food(env, actor, &profile, &vendor_id, step, &event.kind).await
        },
        ConversationState::AwaitingSearchQuery { target } => {
            search::handle_query(env, actor, &profile, target, &event.kind).await
        },
        ConversationState::AwaitingSearchLocation { radius_km } => {
            search::handle_location(env, actor, &profile, radius_km, &event.kind).await
        },
        ConversationState::AwaitingSchedule { draft } => {
            ordering::handle_schedule(env, actor, &profile, draft, &event.kind).await
        },
    }
}

/// Resolves a received photo into the reference to store: uploaded to the
/// blob store when one is configured and the upload succeeds, otherwise
/// the transport's native file reference.
pub(crate) async fn resolve_image(env: &AssistantEnv, file_ref: &str) -> crate::types::ImageRef {
    if let Some(media) = &env.media {
        match media.store_photo(file_ref.to_string()).await {
            Ok(url) => return crate::types::ImageRef::Blob { url },
            Err(e) => {
                tracing::warn!(error = %e, "image upload failed, keeping transport file reference");
            },
        }
    }
    crate::types::ImageRef::TransportFile { file_ref: file_ref.to_string() }
}

/// Shared fall-through for flows: an input the flow does not expect is
/// offered to the command palette (starting a new command overwrites the
/// flow); if it is not a command either, the flow re-prompts.
pub(crate) async fn fall_through(
    env: &AssistantEnv,
    actor: ActorId,
    profile: &crate::types::UserProfile,
    kind: &EventKind,
    reprompt: OutboundMessage,
) -> Result<Transition, FlowError> {
    match commands::try_command(env, actor, profile, kind).await? {
        Some(transition) => Ok(transition),
        None => Ok(Transition::stay().send(actor, reprompt)),
    }
}
