use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::endpoint_url;
use crate::config::NodeConfig;
use crate::node_client::{LedgerReader, NodeClientError, NodeClientResult};
use crate::types::{AccountInfo, Address, Asset, AssetHolding, AssetId, Exclude, SuggestedParams};

const TOKEN_HEADER: &str = "X-Algo-API-Token";

/// REST client for a ledger node's `v2` API.
#[derive(Clone)]
pub struct AlgodClient {
    inner: Client,
    base: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct AccountAssetResponse {
    #[serde(rename = "asset-holding")]
    asset_holding: AssetHolding,
}

impl AlgodClient {
    pub fn new(
        base: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> NodeClientResult<Self> {
        let inner = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(NodeClientError::transport)?;
        let base = base.into();
        endpoint_url(&base, "", &[]).map_err(NodeClientError::Decode)?;
        Ok(Self { inner, base, token })
    }

    pub fn from_config(config: &NodeConfig) -> NodeClientResult<Self> {
        Self::new(
            config.algod_url.clone(),
            config.algod_token.clone(),
            config.timeout(),
        )
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> NodeClientResult<Url> {
        endpoint_url(&self.base, path, query).map_err(NodeClientError::Decode)
    }

    async fn get_json<R: DeserializeOwned>(&self, url: Url, resource: String) -> NodeClientResult<R> {
        debug!(%url, "algod request");
        let mut request = self.inner.get(url);
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }
        let response = request.send().await.map_err(NodeClientError::transport)?;
        match response.status() {
            status if status.is_success() => response
                .json::<R>()
                .await
                .map_err(|err| NodeClientError::Decode(err.to_string())),
            StatusCode::NOT_FOUND => Err(NodeClientError::NotFound { resource }),
            status => Err(NodeClientError::HttpStatus(status.as_u16())),
        }
    }
}

#[async_trait]
impl LedgerReader for AlgodClient {
    async fn account_information(
        &self,
        address: &Address,
        exclude: Exclude,
    ) -> NodeClientResult<AccountInfo> {
        let url = self.url(
            &format!("v2/accounts/{address}"),
            &[("exclude", exclude.as_str())],
        )?;
        self.get_json(url, format!("account {address}")).await
    }

    async fn asset(&self, asset_id: AssetId) -> NodeClientResult<Asset> {
        let url = self.url(&format!("v2/assets/{asset_id}"), &[])?;
        self.get_json(url, format!("asset {asset_id}")).await
    }

    async fn account_asset(
        &self,
        address: &Address,
        asset_id: AssetId,
    ) -> NodeClientResult<AssetHolding> {
        let url = self.url(&format!("v2/accounts/{address}/assets/{asset_id}"), &[])?;
        let response: AccountAssetResponse = self
            .get_json(url, format!("holding {address}/{asset_id}"))
            .await?;
        Ok(response.asset_holding)
    }

    async fn suggested_params(&self) -> NodeClientResult<SuggestedParams> {
        let url = self.url("v2/transactions/params", &[])?;
        self.get_json(url, "transaction params".to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_base_is_rejected_up_front() {
        let result = AlgodClient::new("not a url", None, Duration::from_secs(1));
        assert!(matches!(result, Err(NodeClientError::Decode(_))));
    }

    #[test]
    fn account_url_carries_exclude_parameter() {
        let client = AlgodClient::new("http://node.local:4001/", None, Duration::from_secs(1))
            .expect("client");
        let url = client
            .url("v2/accounts/ADDR", &[("exclude", Exclude::All.as_str())])
            .expect("url");
        assert_eq!(url.as_str(), "http://node.local:4001/v2/accounts/ADDR?exclude=all");
    }

    #[test]
    fn holding_response_unwraps_nested_record() {
        let json = r#"{"round": 10, "asset-holding": {"asset-id": 5, "amount": 9, "is-frozen": true}}"#;
        let response: AccountAssetResponse = serde_json::from_str(json).expect("decode");
        assert_eq!(response.asset_holding.asset_id, 5);
        assert!(response.asset_holding.is_frozen);
    }

    #[test]
    fn suggested_params_decode_node_payload() {
        let json = r#"{
            "consensus-version": "future",
            "fee": 0,
            "genesis-hash": "SGO1GKSzyE7IEPItTxCByw9x8FmnrCDexi9/cOUJOiI=",
            "genesis-id": "testnet-v1.0",
            "last-round": 41000000,
            "min-fee": 1000
        }"#;
        let params: SuggestedParams = serde_json::from_str(json).expect("decode");
        assert_eq!(params.last_round, 41_000_000);
        assert_eq!(params.fee_floor(), 1_000);
    }
}
