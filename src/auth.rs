//! Session auth over the scalar store keys: remote-first, local fallback
//!
//! Every remote failure degrades to the local user collection; only a
//! failed fallback surfaces an error.

use std::sync::Arc;

use tracing::{info, warn};

use crate::api::RemoteApi;
use crate::bus::{EventBus, Topic};
use crate::error::{Error, Result};
use crate::repo::{UserRepo, required};
use crate::store::{KEY_IS_LOGGED_IN, KEY_NPM, KEY_ROLE, KEY_TOKEN, KEY_USERNAME, Store};
use crate::types::{Role, User};

/// Token recorded when the remote API is unreachable or returns none
pub const FALLBACK_TOKEN: &str = "dummy-token";

/// Raw registration input; `role` is normalized here, once
#[derive(Debug, Clone)]
pub struct Registration {
    pub npm: String,
    pub nama: String,
    pub password: String,
    pub role: String,
}

/// The logged-in identity as read back from the session keys
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub npm: String,
    pub nama: String,
    pub role: Role,
    pub token: String,
}

pub struct AuthService {
    store: Arc<Store>,
    users: UserRepo,
    bus: Arc<EventBus>,
    api: Option<RemoteApi>,
}

impl AuthService {
    pub fn new(store: Arc<Store>, bus: Arc<EventBus>, api: Option<RemoteApi>) -> Self {
        let users = UserRepo::new(Arc::clone(&store), Arc::clone(&bus));
        Self {
            store,
            users,
            bus,
            api,
        }
    }

    /// Log in, remote first. Any remote failure falls back to the local
    /// credential check; success either way writes the session keys.
    pub async fn login(&self, npm: &str, password: &str) -> Result<User> {
        if let Some(api) = &self.api {
            match api.login(npm, password).await {
                Ok(resp) => {
                    let token = if resp.token.is_empty() {
                        FALLBACK_TOKEN.to_string()
                    } else {
                        resp.token
                    };
                    self.persist_session(&resp.user, &token)?;
                    return Ok(resp.user);
                }
                Err(err) => warn!("Remote login failed, falling back to local store: {}", err),
            }
        }

        let user = self
            .users
            .find_by_credentials(npm, password)
            .ok_or_else(|| Error::Auth("invalid credentials".to_string()))?;
        self.persist_session(&user, FALLBACK_TOKEN)?;
        Ok(user)
    }

    /// Register a new account, remote first. Does not open a session.
    pub async fn register(&self, registration: Registration) -> Result<User> {
        let role = Role::parse(&registration.role).ok_or_else(|| {
            Error::Validation(format!("unknown role '{}'", registration.role))
        })?;
        let npm = required(&registration.npm, "npm")?;
        let nama = required(&registration.nama, "nama")?;
        let password = required(&registration.password, "password")?;

        if let Some(api) = &self.api {
            match api.register(&npm, &nama, &password, role).await {
                Ok(resp) => {
                    info!("Registered {} remotely", resp.user.npm);
                    return Ok(resp.user);
                }
                Err(err) => warn!(
                    "Remote registration failed, falling back to local store: {}",
                    err
                ),
            }
        }

        self.users.register(&npm, &nama, &password, role)
    }

    /// Clear the session keys
    pub fn logout(&self) -> Result<()> {
        for key in [KEY_TOKEN, KEY_USERNAME, KEY_NPM, KEY_ROLE, KEY_IS_LOGGED_IN] {
            self.store.remove(key)?;
        }
        self.bus.publish(&Topic::Auth);
        info!("Session closed");
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.get_raw(KEY_IS_LOGGED_IN).as_deref() == Some("true")
    }

    pub fn current_user(&self) -> Option<SessionUser> {
        if !self.is_authenticated() {
            return None;
        }
        Some(SessionUser {
            npm: self.store.get_raw(KEY_NPM).unwrap_or_default(),
            nama: self.store.get_raw(KEY_USERNAME).unwrap_or_default(),
            role: self
                .store
                .get_raw(KEY_ROLE)
                .as_deref()
                .and_then(Role::parse)
                .unwrap_or(Role::Member),
            token: self.store.get_raw(KEY_TOKEN).unwrap_or_default(),
        })
    }

    fn persist_session(&self, user: &User, token: &str) -> Result<()> {
        self.store.set_raw(KEY_TOKEN, token)?;
        self.store.set_raw(KEY_USERNAME, &user.nama)?;
        self.store.set_raw(KEY_NPM, &user.npm)?;
        self.store.set_raw(KEY_ROLE, user.role.as_str())?;
        self.store.set_raw(KEY_IS_LOGGED_IN, "true")?;
        self.bus.publish(&Topic::Auth);
        info!("Session opened for {}", user.npm);
        Ok(())
    }
}
