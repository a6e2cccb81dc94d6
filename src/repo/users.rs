//! User accounts: registered once, never deleted

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::bus::{EventBus, Topic};
use crate::error::{Error, Result};
use crate::store::{KEY_USERS, Store};
use crate::types::{Role, User};

use super::required;

pub struct UserRepo {
    store: Arc<Store>,
    bus: Arc<EventBus>,
}

impl UserRepo {
    pub fn new(store: Arc<Store>, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    /// All users in registration order
    pub fn list(&self) -> Vec<User> {
        self.store.read(KEY_USERS)
    }

    /// Register a new account. Duplicate npm is rejected before any write.
    pub fn register(&self, npm: &str, nama: &str, password: &str, role: Role) -> Result<User> {
        let npm = required(npm, "npm")?;
        let nama = required(nama, "nama")?;
        let password = required(password, "password")?;

        let mut all = self.list();
        if all.iter().any(|u| u.npm == npm) {
            return Err(Error::Auth(format!("user {npm} already exists")));
        }

        let user = User {
            npm,
            nama,
            password,
            role,
            created_at: Utc::now(),
        };
        all.push(user.clone());
        self.store.write(KEY_USERS, &all)?;
        self.bus.publish(&Topic::Users);
        info!("Registered user {}", user.npm);
        Ok(user)
    }

    pub fn find(&self, npm: &str) -> Option<User> {
        self.list().into_iter().find(|u| u.npm == npm)
    }

    /// Local credential check used by the login fallback
    pub fn find_by_credentials(&self, npm: &str, password: &str) -> Option<User> {
        let user = self
            .list()
            .into_iter()
            .find(|u| u.npm == npm && u.password == password);
        if user.is_none() {
            debug!("No local credential match for {}", npm);
        }
        user
    }

    /// Everyone with the member role, in registration order
    pub fn members(&self) -> Vec<User> {
        self.list()
            .into_iter()
            .filter(|u| u.role == Role::Member)
            .collect()
    }
}
