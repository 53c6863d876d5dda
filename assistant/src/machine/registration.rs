//! Registration gate.
//!
//! Nothing works until the user has shared a contact card: the phone
//! number is what ends up on orders, so vendors can reach the customer.

use super::{AssistantEnv, FlowError, Transition};
use crate::machine::state::ConversationState;
use crate::paths;
use mealflow_core::chat::{Keyboard, OutboundMessage};
use mealflow_core::store::server_timestamp;
use mealflow_core::ActorId;
use serde_json::{json, Map};
use tracing::info;

/// The transition that gates an unregistered user to the contact prompt.
#[must_use]
pub fn request_contact(actor: ActorId) -> Transition {
    Transition::to(ConversationState::AwaitingContact).send(
        actor,
        OutboundMessage::with_keyboard(
            "Welcome! Share your contact card so restaurants can reach you.",
            Keyboard::RequestContact,
        ),
    )
}

/// Registers (or refreshes) a user from a shared contact card and resets
/// the conversation to idle.
pub(super) async fn register(
    env: &AssistantEnv,
    actor: ActorId,
    phone: &str,
    display_name: &str,
) -> Result<Transition, FlowError> {
    let mut fields = Map::new();
    fields.insert("name".to_string(), json!(display_name));
    fields.insert("phone".to_string(), json!(phone));
    fields.insert("registered_at".to_string(), server_timestamp());
    env.store.update(paths::user(actor), fields).await?;
    info!(%actor, "user registered");

    Ok(Transition::idle().say(
        actor,
        format!("Thanks {display_name}, you're all set! Send 'menu' to see what I can do."),
    ))
}
