//! # Mealflow Assistant
//!
//! A conversational food-ordering assistant over a chat transport and a
//! remote hierarchical key-value store.
//!
//! Users register with a contact card, browse and search vendors, and
//! place scheduled orders; vendor managers register their restaurants
//! (gated on admin approval) and get notified when an order's ready-by
//! time arrives. All state lives in the store: conversations resume
//! across restarts, and notification timers are re-armed from persisted
//! orders at startup.
//!
//! ## Architecture
//!
//! - [`machine`] — the conversation state machine: `(state, event)` in,
//!   transition out, no I/O besides the injected [`machine::AssistantEnv`]
//! - [`state_store`] — persisted per-user conversation state
//! - [`aggregate`] — optimistic-transaction updates to contended vendor
//!   fields
//! - [`notify`] — deferred vendor notifications and startup recovery
//! - [`service`] — wiring: per-actor routing, persist-before-send
//!
//! ## Quick Start
//!
//! ```no_run
//! use mealflow_assistant::{config::Config, service::Assistant};
//! use mealflow_core::environment::SystemClock;
//! use std::sync::Arc;
//!
//! # async fn demo(
//! #     store: Arc<dyn mealflow_core::store::DurableStore>,
//! #     transport: Arc<dyn mealflow_core::chat::ChatTransport>,
//! # ) -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! mealflow_assistant::service::init_tracing(&config.log_filter);
//! let (assistant, worker) =
//!     Assistant::start(store, transport, None, Arc::new(SystemClock), config).await?;
//! tokio::spawn(worker.run());
//! // feed assistant.deliver(event) from the transport's inbound stream
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod config;
pub mod geo;
pub mod ids;
pub mod machine;
pub mod notify;
pub mod paths;
pub mod queries;
pub mod service;
pub mod state_store;
pub mod types;

pub use config::Config;
pub use machine::{AssistantEnv, FlowError, Transition};
pub use service::Assistant;
