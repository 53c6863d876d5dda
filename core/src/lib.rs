//! # Mealflow Core
//!
//! Core traits and protocol types for the Mealflow conversational ordering
//! assistant.
//!
//! This crate defines the seams between the assistant's logic and its
//! external collaborators. Everything that talks to the outside world is a
//! trait here, injected into the application as a trait object:
//!
//! - [`store::DurableStore`] — the remote hierarchical key-value store,
//!   including the optimistic read-modify-write transaction primitive
//! - [`chat::ChatTransport`] — outbound messaging (the inbound side arrives
//!   as [`chat::InboundEvent`] values fed to the runtime)
//! - [`environment::Clock`] — time, abstracted for deterministic tests
//! - [`environment::MediaStore`] — optional blob upload for vendor images
//!
//! The wire protocols behind these traits (webhook plumbing, store RPC,
//! blob upload) live outside this workspace.
//!
//! ## Design Principles
//!
//! - Explicit seams: no hidden I/O anywhere in the conversation logic
//! - Dyn compatibility: store and transport methods return boxed futures so
//!   they can be carried as `Arc<dyn _>` inside effect closures
//! - Closed protocols: button payloads are a tagged union that rejects
//!   unknown tags on decode instead of falling through

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod chat;
pub mod environment;
pub mod store;

/// Stable numeric identifier for an end user or vendor manager.
///
/// Assigned by the chat transport; opaque to this system beyond equality
/// and ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub i64);

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ActorId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl GeoPoint {
    /// Creates a new point.
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}
