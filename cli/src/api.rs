//! TMS REST lookups needed to bind a notification subscription.
//!
//! Only two endpoints matter here: the current user and their current
//! organization. A 401/403 from either means the token is no longer
//! valid, which [`ApiClient::resolve_auth`] reports as an
//! unauthenticated [`AuthState`] rather than an error.

// Rust guideline compliant 2026-02

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::constants::HTTP_REQUEST_TIMEOUT;
use crate::realtime::Subscription;

/// `GET /api/v1/users/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    /// User id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Organization the user is currently working in.
    #[serde(default)]
    pub current_organization_id: Option<String>,
    /// User's business unit.
    #[serde(default)]
    pub business_unit_id: Option<String>,
}

/// `GET /api/v1/organizations/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    /// Organization id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Business unit the organization belongs to.
    #[serde(default)]
    pub business_unit_id: Option<String>,
}

/// Resolved authentication context.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthState {
    /// Whether the token was accepted.
    pub authenticated: bool,
    /// Current user, once resolved.
    pub user: Option<CurrentUser>,
    /// Current organization, once resolved.
    pub organization: Option<Organization>,
}

impl AuthState {
    /// Logged-out state.
    #[must_use]
    pub fn unauthenticated() -> Self {
        Self::default()
    }

    /// Fully resolved state.
    #[must_use]
    pub fn resolved(user: CurrentUser, organization: Organization) -> Self {
        Self {
            authenticated: true,
            user: Some(user),
            organization: Some(organization),
        }
    }

    /// Subscription for this context.
    ///
    /// `None` unless authenticated with a user, an organization and a
    /// non-empty business unit (the organization's, else the user's).
    #[must_use]
    pub fn subscription(&self) -> Option<Subscription> {
        if !self.authenticated {
            return None;
        }
        let user = self.user.as_ref()?;
        let organization = self.organization.as_ref()?;

        let business_unit = organization
            .business_unit_id
            .as_deref()
            .or(user.business_unit_id.as_deref())
            .filter(|bu| !bu.is_empty())?;

        Some(Subscription::new(
            user.id.as_str(),
            organization.id.as_str(),
            business_unit,
        ))
    }
}

/// The server rejected the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unauthorized {
    /// HTTP status (401 or 403).
    pub status: u16,
}

impl std::fmt::Display for Unauthorized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "token rejected (HTTP {})", self.status)
    }
}

impl std::error::Error for Unauthorized {}

/// Async client for the TMS REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a client for `base_url` (e.g. `https://tms.example.com`).
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_REQUEST_TIMEOUT)
            .user_agent(format!("tms-realtime/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Whether a token is configured.
    #[must_use]
    pub fn has_token(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Fetch the current user. Fails with [`Unauthorized`] on 401/403.
    pub async fn current_user(&self) -> Result<CurrentUser> {
        self.get_json("/api/v1/users/me").await
    }

    /// Fetch an organization. Fails with [`Unauthorized`] on 401/403.
    pub async fn organization(&self, id: &str) -> Result<Organization> {
        self.get_json(&format!("/api/v1/organizations/{id}")).await
    }

    /// Resolve user and organization into an [`AuthState`].
    ///
    /// A missing token or a rejected token yields an unauthenticated state.
    /// A user without a current organization is authenticated but
    /// unresolved. Network and decoding failures are errors.
    pub async fn resolve_auth(&self) -> Result<AuthState> {
        if !self.has_token() {
            return Ok(AuthState::unauthenticated());
        }

        let user = match self.current_user().await {
            Ok(user) => user,
            Err(e) if is_unauthorized(&e) => {
                log::info!("[Session] {}", e);
                return Ok(AuthState::unauthenticated());
            }
            Err(e) => return Err(e),
        };

        let Some(org_id) = user.current_organization_id.clone() else {
            log::info!("[Session] User {} has no current organization", user.id);
            return Ok(AuthState {
                authenticated: true,
                user: Some(user),
                organization: None,
            });
        };

        match self.organization(&org_id).await {
            Ok(organization) => Ok(AuthState::resolved(user, organization)),
            Err(e) if is_unauthorized(&e) => {
                log::info!("[Session] {}", e);
                Ok(AuthState::unauthenticated())
            }
            Err(e) => Err(e),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.http.get(&url).header("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Unauthorized {
                status: status.as_u16(),
            }
            .into());
        }
        if !status.is_success() {
            anyhow::bail!("GET {url} returned HTTP {status}");
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to decode response from {url}"))
    }
}

/// Whether `error` is (or wraps) an [`Unauthorized`].
#[must_use]
pub fn is_unauthorized(error: &anyhow::Error) -> bool {
    error.downcast_ref::<Unauthorized>().is_some()
}
