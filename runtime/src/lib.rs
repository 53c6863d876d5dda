//! # Mealflow Runtime
//!
//! Runtime pieces that sit between the chat transport and the conversation
//! logic:
//!
//! - [`scheduler`] — a one-shot, replaceable, crash-recoverable deferred job
//!   scheduler used for vendor notifications
//! - [`router`] — per-actor mailboxes guaranteeing in-order processing of
//!   one actor's events while distinct actors run concurrently
//! - [`retry`] — a small bounded retry policy for transient backend errors
//!
//! Nothing in this crate knows about vendors or orders; it is generic over
//! a job payload and an event sink, so each piece is independently testable
//! with fake clocks and recording sinks.

pub mod retry;
pub mod router;
pub mod scheduler;

pub use router::{ActorRouter, EventSink};
pub use scheduler::{JobHandler, Scheduler, SchedulerWorker};
