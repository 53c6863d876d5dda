//! Chat transport seam: inbound events, outbound messages, and the button
//! action protocol.
//!
//! The transport itself (webhooks, long polling, media download) lives
//! outside this workspace. The assistant only consumes two things from it:
//! a stream of [`InboundEvent`] values, and a [`ChatTransport`] it can send
//! replies through.
//!
//! # Button Protocol
//!
//! Inline buttons carry a [`ButtonAction`] payload, serialized as a tagged
//! JSON object (`{"action": "pick_vendor", ...}`). The tag set is closed:
//! decoding an unknown tag is an error, surfaced to the user as an
//! unrecognized action rather than silently falling through to another
//! handler. Action names are part of this system's protocol, not the
//! transport's.

use crate::{ActorId, GeoPoint};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// A boxed future returned by transport operations.
pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Errors surfaced by the chat transport.
///
/// Always treated as transient: logged, never shown to the end user, and
/// never allowed to escape into the scheduler's timer worker.
#[derive(Error, Debug)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// Reference to a previously sent message, for edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    /// The actor whose chat holds the message.
    pub actor: ActorId,
    /// Transport-assigned message identifier.
    pub message_id: i64,
}

/// One inbound chat event, addressed to a single actor's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// The actor this event came from.
    pub actor: ActorId,
    /// What arrived.
    pub kind: EventKind,
}

impl InboundEvent {
    /// Convenience constructor for a plain text event.
    #[must_use]
    pub fn text(actor: ActorId, text: impl Into<String>) -> Self {
        Self { actor, kind: EventKind::Text(text.into()) }
    }

    /// Convenience constructor for a button press.
    #[must_use]
    pub const fn button(actor: ActorId, action: ButtonAction) -> Self {
        Self { actor, kind: EventKind::Button(action) }
    }
}

/// The kinds of inbound events the conversation machine understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    /// Free text typed by the user.
    Text(String),
    /// A shared contact card.
    Contact {
        /// Phone number from the card.
        phone: String,
        /// Display name from the card.
        display_name: String,
    },
    /// A shared location pin.
    Location(GeoPoint),
    /// A photo; the transport's native file reference.
    Photo {
        /// Opaque transport file reference, usable for re-sends.
        file_ref: String,
    },
    /// An inline button press with a decoded payload.
    Button(ButtonAction),
}

/// Closed tagged union of button payloads.
///
/// The tag set is closed: a payload with an unknown `action` tag fails to
/// decode instead of being misread as some other action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ButtonAction {
    /// User picked a vendor to order from.
    PickVendor {
        /// Vendor record id.
        vendor_id: String,
    },
    /// User picked a food off a vendor's menu.
    PickFood {
        /// Vendor record id.
        vendor_id: String,
        /// Index into the vendor's food list.
        food_index: usize,
    },
    /// User picked a quantity for the chosen food.
    PickQuantity {
        /// Vendor record id.
        vendor_id: String,
        /// Index into the vendor's food list.
        food_index: usize,
        /// Quantity; the UI only offers 1 through 5.
        quantity: u32,
    },
    /// Admin picked the managing user for a vendor being created.
    PickManager {
        /// The chosen user's id.
        user_id: ActorId,
    },
    /// Admin approved a pending vendor registration draft.
    ApproveVendor {
        /// Pending draft id.
        draft_id: String,
    },
    /// Admin rejected a pending vendor registration draft.
    RejectVendor {
        /// Pending draft id.
        draft_id: String,
    },
    /// Vendor-setup: copy a preset food into the draft menu.
    AddPresetFood {
        /// Index into the preset table.
        preset_index: usize,
    },
    /// Vendor-setup: switch to entering a custom food.
    AddCustomFood,
    /// Vendor-setup: done adding foods.
    FinishFoods,
    /// Manager/admin picked a vendor to edit.
    EditVendor {
        /// Vendor record id.
        vendor_id: String,
    },
    /// Admin picked a vendor to delete; asks for confirmation.
    DeleteVendor {
        /// Vendor record id.
        vendor_id: String,
    },
    /// Admin confirmed a vendor deletion.
    ConfirmDeleteVendor {
        /// Vendor record id.
        vendor_id: String,
    },
    /// Vendor marked an order as served.
    MarkServed {
        /// Order id from the notification.
        order_id: String,
    },
    /// Abandon the current flow.
    Cancel,
}

impl ButtonAction {
    /// Encodes the action for a button payload.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if serialization fails, which would mean
    /// a malformed variant and is not expected in practice.
    pub fn encode(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError(e.to_string()))
    }

    /// Decodes a button payload.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on malformed JSON or an unknown tag; the
    /// caller treats this as a user-input error (re-prompt).
    pub fn decode(payload: &str) -> Result<Self, TransportError> {
        serde_json::from_str(payload).map_err(|e| TransportError(e.to_string()))
    }
}

/// An inline keyboard: rows of labelled buttons, or a request for a
/// contact/location share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Keyboard {
    /// Inline buttons; each is a label plus its action payload.
    Buttons(Vec<Vec<(String, ButtonAction)>>),
    /// Ask the transport to offer a "share contact" affordance.
    RequestContact,
    /// Ask the transport to offer a "share location" affordance.
    RequestLocation,
}

impl Keyboard {
    /// Single-column keyboard from a list of (label, action) pairs.
    #[must_use]
    pub fn column(buttons: Vec<(String, ButtonAction)>) -> Self {
        Self::Buttons(buttons.into_iter().map(|b| vec![b]).collect())
    }
}

/// An outbound message: text plus an optional keyboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Message text.
    pub text: String,
    /// Optional keyboard attached to the message.
    pub keyboard: Option<Keyboard>,
}

impl OutboundMessage {
    /// Plain text message without a keyboard.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), keyboard: None }
    }

    /// Text message with a keyboard.
    #[must_use]
    pub fn with_keyboard(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self { text: text.into(), keyboard: Some(keyboard) }
    }
}

/// Outbound side of the chat transport.
///
/// Implementations must be `Send + Sync`; the transport is shared between
/// per-actor tasks and the notification dispatcher.
pub trait ChatTransport: Send + Sync {
    /// Sends a message to an actor's chat.
    ///
    /// # Errors
    ///
    /// [`TransportError`] on delivery failure; callers treat it as
    /// transient and log it.
    fn send(&self, actor: ActorId, message: OutboundMessage) -> TransportFuture<'_, MessageRef>;

    /// Edits a previously sent message in place.
    ///
    /// # Errors
    ///
    /// [`TransportError`] on delivery failure.
    fn edit(&self, message: MessageRef, content: OutboundMessage) -> TransportFuture<'_, ()>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;

    #[test]
    fn button_action_round_trips_through_tagged_json() {
        let action = ButtonAction::PickQuantity {
            vendor_id: "r1".to_string(),
            food_index: 2,
            quantity: 3,
        };
        let encoded = action.encode().unwrap();
        assert!(encoded.contains("\"action\":\"pick_quantity\""));
        assert_eq!(ButtonAction::decode(&encoded).unwrap(), action);
    }

    #[test]
    fn unknown_action_tag_is_rejected() {
        let err = ButtonAction::decode(r#"{"action":"rm_rf_slash"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let err = ButtonAction::decode(r#"{"action":"pick_vendor"}"#);
        assert!(err.is_err());
    }
}
