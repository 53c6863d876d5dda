//! Dependency injection traits shared by every component.
//!
//! All external dependencies are abstracted behind traits and carried in
//! the application environment as trait objects, so every piece of logic
//! is testable with deterministic fakes.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Clock trait - abstracts time operations for testability.
///
/// Production uses [`SystemClock`]; tests use the fixed and manual clocks
/// from `mealflow-testing`.
pub trait Clock: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Errors from the optional blob store.
#[derive(Error, Debug)]
#[error("media store error: {0}")]
pub struct MediaError(pub String);

/// Optional blob storage for vendor images.
///
/// Absence of this collaborator is a valid configuration; the assistant
/// then stores the transport's native file reference instead of uploading.
pub trait MediaStore: Send + Sync {
    /// Copies a transport photo into durable storage, returning a durable
    /// locator (e.g. a public URL).
    ///
    /// `file_ref` is the transport's native file reference for the photo.
    ///
    /// # Errors
    ///
    /// [`MediaError`] on download or upload failure; the caller falls back
    /// to storing the native file reference.
    fn store_photo(
        &self,
        file_ref: String,
    ) -> Pin<Box<dyn Future<Output = Result<String, MediaError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_advances() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
