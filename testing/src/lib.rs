//! # Mealflow Testing
//!
//! Deterministic fakes for every seam in `mealflow-core`:
//!
//! - [`mocks::InMemoryStore`] — hierarchical JSON store with real
//!   optimistic transactions and an injectable conflict knob
//! - [`mocks::FixedClock`] / [`mocks::ManualClock`] — deterministic time
//! - [`mocks::RecordingTransport`] — captures outbound messages for
//!   assertions
//!
//! ## Example
//!
//! ```
//! use mealflow_testing::{mocks::InMemoryStore, test_clock};
//! use mealflow_core::store::{DurableStore, KeyPath};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = InMemoryStore::new();
//! store.set(KeyPath::new("users/1"), json!({"name": "Ada"})).await.unwrap();
//! let user = store.get(KeyPath::new("users/1")).await.unwrap();
//! assert_eq!(user.unwrap()["name"], "Ada");
//! # }
//! ```

pub mod mocks;

pub use mocks::{
    test_clock, FixedClock, InMemoryStore, ManualClock, RecordingMediaStore, RecordingTransport,
};
