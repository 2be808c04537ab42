//! REST calls to the editor backend: state snapshot and action catalog.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::error::Resource;
use crate::state::ActionCatalog;
use crate::state::EntityStates;

/// Request/response side of the backend.
///
/// This trait allows for mocking the backend for testing purposes
#[async_trait]
pub trait StatesApi: Send + Sync {
    /// `GET /api/states`
    async fn fetch_states(&self) -> Result<EntityStates, BridgeError>;

    /// `GET /api/actions`
    async fn fetch_actions(&self) -> Result<ActionCatalog, BridgeError>;
}

/// Upper bound on a single REST request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Real backend client using reqwest
pub struct HttpApi {
    client: reqwest::Client,
    states_url: Url,
    actions_url: Url,
    access_token: Option<String>,
}

impl HttpApi {
    pub fn new(config: &BridgeConfig) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BridgeError::Client(e.to_string()))?;

        Ok(Self {
            client,
            states_url: config.states_url()?,
            actions_url: config.actions_url()?,
            access_token: config.access_token.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        resource: Resource,
    ) -> Result<T, BridgeError> {
        let http_error = |e: reqwest::Error| BridgeError::Http {
            resource,
            message: e.to_string(),
        };

        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        debug!("GET {}", url);
        let response = request.send().await.map_err(http_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = match resource {
                Resource::States => String::new(),
                Resource::Actions => response.text().await.unwrap_or_default(),
            };
            return Err(BridgeError::FetchFailed {
                resource,
                status: status.as_u16(),
                body,
            });
        }

        response.json::<T>().await.map_err(http_error)
    }
}

#[async_trait]
impl StatesApi for HttpApi {
    async fn fetch_states(&self) -> Result<EntityStates, BridgeError> {
        self.get_json(&self.states_url, Resource::States).await
    }

    async fn fetch_actions(&self) -> Result<ActionCatalog, BridgeError> {
        self.get_json(&self.actions_url, Resource::Actions).await
    }
}
