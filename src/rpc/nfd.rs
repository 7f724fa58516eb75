use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use super::endpoint_url;
use crate::config::NameServiceConfig;
use crate::name_service::{NameRecord, NameService, NameServiceError, NameServiceResult, NameView};
use crate::types::Address;

/// REST client for the name-service API.
#[derive(Clone)]
pub struct NfdClient {
    inner: Client,
    base: String,
}

impl NfdClient {
    pub fn new(base: impl Into<String>, timeout: Duration) -> NameServiceResult<Self> {
        let inner = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(NameServiceError::transport)?;
        let base = base.into();
        endpoint_url(&base, "", &[]).map_err(|err| NameServiceError::transport(anyhow::anyhow!(err)))?;
        Ok(Self { inner, base })
    }

    pub fn from_config(config: &NameServiceConfig) -> NameServiceResult<Self> {
        Self::new(config.api_url.clone(), config.timeout())
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> NameServiceResult<Url> {
        endpoint_url(&self.base, path, query)
            .map_err(|err| NameServiceError::transport(anyhow::anyhow!(err)))
    }

    /// Returns `None` on 404 so callers can branch without matching errors.
    async fn get_optional<R: serde::de::DeserializeOwned>(
        &self,
        url: Url,
    ) -> NameServiceResult<Option<R>> {
        debug!(%url, "name service request");
        let response = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(NameServiceError::transport)?;
        match response.status() {
            status if status.is_success() => response
                .json::<R>()
                .await
                .map(Some)
                .map_err(NameServiceError::transport),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(NameServiceError::HttpStatus(status.as_u16())),
        }
    }
}

#[async_trait]
impl NameService for NfdClient {
    async fn lookup(&self, name_or_id: &str, view: NameView) -> NameServiceResult<NameRecord> {
        let url = self.url(&format!("nfd/{name_or_id}"), &[("view", view.as_str())])?;
        self.get_optional(url)
            .await?
            .ok_or_else(|| NameServiceError::not_found(name_or_id))
    }

    async fn reverse_lookup(
        &self,
        address: &Address,
        view: NameView,
    ) -> NameServiceResult<Option<NameRecord>> {
        let url = self.url(
            "nfd/lookup",
            &[("address", address.as_str()), ("view", view.as_str())],
        )?;
        let records: Option<HashMap<String, NameRecord>> = self.get_optional(url).await?;
        Ok(records.and_then(|mut records| records.remove(address.as_str())))
    }
}
