//! Audio submissions: append-only, never edited or deleted

use std::sync::Arc;

use tracing::info;

use crate::bus::{EventBus, Topic};
use crate::error::Result;
use crate::store::{KEY_RECORDINGS, KEY_TASKS, Store};
use crate::types::{NewRecording, Recording, Task};

pub struct RecordingRepo {
    store: Arc<Store>,
    bus: Arc<EventBus>,
}

impl RecordingRepo {
    pub fn new(store: Arc<Store>, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    /// All recordings in submission order
    pub fn list(&self) -> Vec<Recording> {
        self.store.read(KEY_RECORDINGS)
    }

    /// Persist a new recording, stamping id and timestamp
    pub fn add(&self, parts: NewRecording) -> Result<Recording> {
        let recording = Recording::from_parts(parts);

        let mut all = self.list();
        all.push(recording.clone());
        self.store.write(KEY_RECORDINGS, &all)?;
        self.bus.publish(&Topic::Recordings);
        info!(
            "Added recording {} ({}) for {}",
            recording.id, recording.file_name, recording.username
        );
        Ok(recording)
    }

    /// Recordings submitted by one member, in submission order
    pub fn by_username(&self, npm: &str) -> Vec<Recording> {
        self.list()
            .into_iter()
            .filter(|r| r.username == npm)
            .collect()
    }

    /// Resolve a recording's task reference. A dangling or absent `task_id`
    /// resolves to no task.
    pub fn task_for(&self, recording: &Recording) -> Option<Task> {
        let task_id = recording.task_id.as_deref()?;
        let tasks: Vec<Task> = self.store.read(KEY_TASKS);
        tasks.into_iter().find(|t| t.id == task_id)
    }
}
