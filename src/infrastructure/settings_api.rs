use crate::domain::models::DurationConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::kv_store::{KeyValueStore, DURATION_CONFIG_KEY};
use crate::infrastructure::session_api::{endpoint, http_client, http_error, parse_base_url};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use url::Url;

#[async_trait]
pub trait SettingsApi: Send + Sync {
    async fn get(&self) -> Result<DurationConfig, InfraError>;

    async fn set(&self, config: DurationConfig) -> Result<DurationConfig, InfraError>;
}

pub struct KeyValueSettingsApi {
    store: Arc<dyn KeyValueStore>,
}

impl KeyValueSettingsApi {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SettingsApi for KeyValueSettingsApi {
    async fn get(&self) -> Result<DurationConfig, InfraError> {
        match self.store.load(DURATION_CONFIG_KEY)? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(DurationConfig::default()),
        }
    }

    async fn set(&self, config: DurationConfig) -> Result<DurationConfig, InfraError> {
        self.store
            .save(DURATION_CONFIG_KEY, &serde_json::to_value(&config)?)?;
        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct ReqwestSettingsApi {
    client: Client,
    base_url: Url,
}

impl ReqwestSettingsApi {
    pub fn new(base_url: &str) -> Result<Self, InfraError> {
        Ok(Self {
            client: http_client(),
            base_url: parse_base_url(base_url)?,
        })
    }

    fn timer_endpoint(&self) -> Result<Url, InfraError> {
        endpoint(&self.base_url, "settings", &["timer"])
    }
}

fn decode_config(body: &str) -> Result<DurationConfig, InfraError> {
    serde_json::from_str(body).map_err(|error| {
        InfraError::Sync(format!("invalid settings payload: {error}; body={body}"))
    })
}

#[async_trait]
impl SettingsApi for ReqwestSettingsApi {
    async fn get(&self) -> Result<DurationConfig, InfraError> {
        let endpoint = self.timer_endpoint()?;
        let response = self.client.get(endpoint).send().await.map_err(|error| {
            InfraError::Sync(format!("network error while fetching settings: {error}"))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Sync(format!("failed reading settings response: {error}"))
        })?;
        if !status.is_success() {
            return Err(http_error(status, &body));
        }
        decode_config(&body)
    }

    async fn set(&self, config: DurationConfig) -> Result<DurationConfig, InfraError> {
        let endpoint = self.timer_endpoint()?;
        let response = self
            .client
            .put(endpoint)
            .json(&config)
            .send()
            .await
            .map_err(|error| InfraError::Sync(format!("network error while saving settings: {error}")))?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Sync(format!("failed reading settings update response: {error}"))
        })?;
        if !status.is_success() {
            return Err(http_error(status, &body));
        }
        if body.trim().is_empty() {
            return Ok(config);
        }
        decode_config(&body)
    }
}
