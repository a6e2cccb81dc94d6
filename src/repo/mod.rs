//! CRUD façades over the shared store, one per persisted collection
//!
//! Every repository owns one storage key and one shape, stamps ids and
//! timestamps on `add`, writes the full collection back (read-modify-write),
//! and publishes its topic after every successful mutation.

mod classifications;
mod messages;
mod recordings;
mod tasks;
mod users;

pub use classifications::ClassificationRepo;
pub use messages::MessageRepo;
pub use recordings::RecordingRepo;
pub use tasks::{TaskAssignment, TaskRepo};
pub use users::UserRepo;

use crate::error::{Error, Result};

/// Trim `value`, rejecting the operation if nothing is left
pub(crate) fn required(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}
