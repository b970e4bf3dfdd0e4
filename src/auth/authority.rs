use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::users::model::Role;

/// Who is calling, as vouched for by the authority. Lives for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationIdentity {
    pub id: i64,
    pub role: Role,
}

impl AuthorizationIdentity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Error)]
pub enum AuthorityError {
    /// Transport failure, authority 500 or an unreadable body.
    #[error("authority unavailable: {0}")]
    Unavailable(String),

    /// Any other non-2xx answer.
    #[error("token rejected with status {0}")]
    Rejected(StatusCode),
}

/// Validates bearer tokens issued by the external authority.
#[async_trait]
pub trait SessionAuthority: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AuthorizationIdentity, AuthorityError>;
}

/// Body of `GET /oauth/access_token/{token}`; `access_token` is ignored.
/// Roles this service does not know are treated as `user`.
#[derive(Debug, Deserialize)]
pub struct AccessToken {
    pub user_id: i64,
    #[serde(default)]
    pub user_role: String,
    #[serde(default)]
    pub expires: i64,
}

#[derive(Clone)]
pub struct HttpAuthority {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpAuthority {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("authority url '{base_url}' cannot be a base");
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn token_url(&self, token: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["oauth", "access_token", token]);
        }
        url
    }
}

#[async_trait]
impl SessionAuthority for HttpAuthority {
    async fn verify(&self, token: &str) -> Result<AuthorizationIdentity, AuthorityError> {
        let resp = self
            .client
            .get(self.token_url(token))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "authority request failed");
                AuthorityError::Unavailable(e.to_string())
            })?;

        let status = resp.status();
        if status.as_u16() > 299 {
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                error!(%status, "authority failed to check token");
                return Err(AuthorityError::Unavailable(status.to_string()));
            }
            debug!(%status, "authority rejected token");
            return Err(AuthorityError::Rejected(status));
        }

        let body = resp.json::<AccessToken>().await.map_err(|e| {
            warn!(error = %e, "authority returned an unreadable token body");
            AuthorityError::Unavailable(e.to_string())
        })?;

        let role = body
            .user_role
            .trim()
            .to_lowercase()
            .parse::<Role>()
            .unwrap_or_else(|_| {
                warn!(user_id = body.user_id, role = %body.user_role, "unknown role from authority");
                Role::User
            });

        debug!(
            user_id = body.user_id,
            expires = body.expires,
            role = role.as_str(),
            "session verified"
        );
        Ok(AuthorizationIdentity {
            id: body.user_id,
            role,
        })
    }
}
