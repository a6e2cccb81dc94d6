//! Core types used throughout choircheck

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

/// Sender sentinel used when the coach writes a message.
pub const COACH_SENDER: &str = "coach";

/// Generate a collection-unique id: `<prefix>_<unix-millis>_<6 alphanumerics>`.
///
/// Collisions are treated as negligible, not excluded.
pub fn generate_id(prefix: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();
    format!("{prefix}_{millis}_{suffix}")
}

/// Account role, normalized once at the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Coach,
}

impl Role {
    /// Case-insensitive parse; anything else is not a valid role.
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_lowercase().as_str() {
            "member" => Some(Role::Member),
            "coach" => Some(Role::Coach),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Coach => "coach",
        }
    }
}

/// A registered account. `npm` is the natural key; users are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub npm: String,
    pub nama: String,
    /// Stored locally; remote API responses may omit it
    #[serde(default)]
    pub password: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Per-member completion state inside a task's status map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Done,
}

/// A voice-test assignment created by a coach.
///
/// `status` holds entries for assigned members only; a missing entry means
/// "not assigned", not "not started". Tasks are never edited or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub instruction: String,
    pub created_at: DateTime<Utc>,
    pub status: BTreeMap<String, TaskState>,
}

impl Task {
    pub fn new(title: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            id: generate_id("task"),
            title: title.into(),
            instruction: instruction.into(),
            created_at: Utc::now(),
            status: BTreeMap::new(),
        }
    }
}

/// Fields supplied by the caller when persisting a new recording
#[derive(Debug, Clone)]
pub struct NewRecording {
    pub username: String,
    pub file_name: String,
    pub mime: String,
    pub data_url: String,
    pub task_id: Option<String>,
}

/// A persisted audio submission. Append-only; never mutated after creation.
///
/// `task_id` may dangle (the referenced task is not required to exist);
/// reads must resolve a dangling reference to "no task".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub id: String,
    pub username: String,
    pub file_name: String,
    pub mime: String,
    pub data_url: String,
    pub task_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Recording {
    pub fn from_parts(parts: NewRecording) -> Self {
        Self {
            id: generate_id("rec"),
            username: parts.username,
            file_name: parts.file_name,
            mime: parts.mime,
            data_url: parts.data_url,
            task_id: parts.task_id,
            created_at: Utc::now(),
        }
    }
}

/// One classification result, keyed externally by `"<taskId>:<username>"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationEntry {
    pub label: String,
    pub at: DateTime<Utc>,
}

/// The full classification map as stored
pub type Classifications = BTreeMap<String, ClassificationEntry>;

/// Composite key for one (task, member) classification slot
pub fn classification_key(task_id: &str, username: &str) -> String {
    format!("{task_id}:{username}")
}

/// A message between the coach and a member.
///
/// `from` is [`COACH_SENDER`] or a member npm; `to` is a member npm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub to: String,
    pub from: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Outgoing message; `id` present means "edit the message with this id"
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub id: Option<String>,
    pub to: String,
    pub from: String,
    pub text: String,
}
