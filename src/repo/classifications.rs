//! Classification results, keyed by `"<taskId>:<username>"`
//!
//! Written by the external classification collaborator; at most one entry
//! per (task, member) pair. A second write to the same key overwrites.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::bus::{EventBus, Topic};
use crate::error::Result;
use crate::store::{KEY_CLASSIFICATIONS, Store};
use crate::types::{ClassificationEntry, Classifications, classification_key};

pub struct ClassificationRepo {
    store: Arc<Store>,
    bus: Arc<EventBus>,
}

impl ClassificationRepo {
    pub fn new(store: Arc<Store>, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    /// The full classification map
    pub fn all(&self) -> Classifications {
        self.store.read(KEY_CLASSIFICATIONS)
    }

    /// Set the label for one (task, member) pair, overwriting any prior
    /// entry. Silent no-op when either id is empty.
    pub fn set(&self, task_id: &str, username: &str, label: &str) -> Result<()> {
        if task_id.is_empty() || username.is_empty() {
            debug!("Ignoring classification with empty task or member id");
            return Ok(());
        }

        let key = classification_key(task_id, username);
        let mut all = self.all();
        all.insert(
            key.clone(),
            ClassificationEntry {
                label: label.to_string(),
                at: Utc::now(),
            },
        );
        self.store.write(KEY_CLASSIFICATIONS, &all)?;
        self.bus.publish(&Topic::Classifications);
        info!("Classified {} as {}", key, label);
        Ok(())
    }

    /// The entry for one (task, member) pair, if classified
    pub fn for_task_member(&self, task_id: &str, username: &str) -> Option<ClassificationEntry> {
        self.all().remove(&classification_key(task_id, username))
    }

    /// Tally of entries per label (dashboard counts)
    pub fn label_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.all().into_values() {
            *counts.entry(entry.label).or_insert(0) += 1;
        }
        counts
    }
}
