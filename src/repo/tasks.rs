//! Voice-test tasks: appended by the coach, never edited or deleted

use std::sync::Arc;

use tracing::info;

use crate::bus::{EventBus, Topic};
use crate::error::{Error, Result};
use crate::store::{KEY_TASKS, KEY_USERS, Store};
use crate::types::{Role, Task, TaskState, User};

use super::required;

/// Who a new task is assigned to
#[derive(Debug, Clone)]
pub enum TaskAssignment {
    /// Every member registered at creation time; later registrations are
    /// not picked up retroactively
    AllMembers,
    /// An explicit, non-empty set of member npms
    Members(Vec<String>),
}

pub struct TaskRepo {
    store: Arc<Store>,
    bus: Arc<EventBus>,
}

impl TaskRepo {
    pub fn new(store: Arc<Store>, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    /// All tasks in creation order
    pub fn list(&self) -> Vec<Task> {
        self.store.read(KEY_TASKS)
    }

    /// Create a task with `status` pre-seeded to pending for exactly the
    /// assigned set
    pub fn add(
        &self,
        title: &str,
        instruction: &str,
        assignment: TaskAssignment,
    ) -> Result<Task> {
        let title = required(title, "title")?;
        let instruction = required(instruction, "instruction")?;

        let assigned = match assignment {
            TaskAssignment::AllMembers => {
                let users: Vec<User> = self.store.read(KEY_USERS);
                users
                    .into_iter()
                    .filter(|u| u.role == Role::Member)
                    .map(|u| u.npm)
                    .collect()
            }
            TaskAssignment::Members(npms) => {
                if npms.is_empty() {
                    return Err(Error::Validation(
                        "at least one member must be assigned".to_string(),
                    ));
                }
                npms
            }
        };

        let mut task = Task::new(title, instruction);
        for npm in assigned {
            task.status.insert(npm, TaskState::Pending);
        }

        let mut all = self.list();
        all.push(task.clone());
        self.store.write(KEY_TASKS, &all)?;
        self.bus.publish(&Topic::Tasks);
        info!(
            "Added task {} for {} member(s)",
            task.id,
            task.status.len()
        );
        Ok(task)
    }

    /// The most recently created task, globally
    pub fn latest(&self) -> Option<Task> {
        self.list().into_iter().max_by_key(|t| t.created_at)
    }

    /// Tasks whose status map contains `npm`, in creation order
    pub fn assigned_to(&self, npm: &str) -> Vec<Task> {
        self.list()
            .into_iter()
            .filter(|t| t.status.contains_key(npm))
            .collect()
    }

    /// How many of `npm`'s assignments are in `state`
    pub fn count_for(&self, npm: &str, state: TaskState) -> usize {
        self.list()
            .iter()
            .filter(|t| t.status.get(npm) == Some(&state))
            .count()
    }
}
