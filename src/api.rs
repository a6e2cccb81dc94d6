//! Thin remote API client
//!
//! Consumed only as the first attempt in [`crate::auth::AuthService`]; every
//! caller falls back to the local repositories when a request fails.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{Role, User};

/// Environment variable holding the API base URL
pub const ENV_API_URL: &str = "CHOIRCHECK_API_URL";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RemoteApi {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    npm: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    npm: &'a str,
    nama: &'a str,
    password: &'a str,
    role: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct RegisterResponse {
    pub user: User,
}

impl RemoteApi {
    /// Create a client against `base_url` (no trailing slash)
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Client configured from `CHOIRCHECK_API_URL`, if set
    pub fn from_env() -> Option<Self> {
        let base = std::env::var(ENV_API_URL).ok()?;
        Self::new(base).ok()
    }

    pub async fn login(&self, npm: &str, password: &str) -> Result<LoginResponse> {
        debug!("POST {}/auth/login", self.base_url);
        let response = self
            .client
            .post(format!("{}/auth/login", self.base_url))
            .json(&LoginRequest { npm, password })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api { status, body });
        }

        Ok(response.json().await?)
    }

    pub async fn register(
        &self,
        npm: &str,
        nama: &str,
        password: &str,
        role: Role,
    ) -> Result<RegisterResponse> {
        debug!("POST {}/auth/register", self.base_url);
        let response = self
            .client
            .post(format!("{}/auth/register", self.base_url))
            .json(&RegisterRequest {
                npm,
                nama,
                password,
                role: role.as_str(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api { status, body });
        }

        Ok(response.json().await?)
    }
}
