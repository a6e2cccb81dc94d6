//! Choircheck - shared data layer for a choir voice-check tracker
//!
//! Coaches assign voice-test tasks, members record or upload audio, and
//! classification results are attached per (task, member). Everything
//! persists in one shared local key-value store; views stay in sync through
//! a topic-keyed event bus, with a watcher republishing changes made by
//! other processes. A thin remote API client exists, but every call falls
//! back to the local repositories.

pub mod api;
pub mod auth;
pub mod bus;
pub mod capture;
pub mod error;
pub mod flags;
pub mod repo;
pub mod store;
pub mod sync;
pub mod types;
pub mod watch;

pub use error::{Error, Result};
pub use types::*;

/// Re-export the main components for convenience
pub use api::RemoteApi;
pub use auth::AuthService;
pub use bus::{EventBus, Topic};
pub use capture::{RecordingSession, SessionState};
pub use repo::{
    ClassificationRepo, MessageRepo, RecordingRepo, TaskAssignment, TaskRepo, UserRepo,
};
pub use store::Store;
pub use sync::Synchronizer;
pub use watch::StoreWatcher;
