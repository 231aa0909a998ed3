//! Kong Admin API seam
//!
//! [`GatewayAdmin`] is the entity-level surface the identity manager needs.
//! [`KongClient`] implements it over HTTP.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

#[cfg(test)]
use mockall::automock;

use gantry_common::{Dependency, Error, Result};

use crate::types::{
    ConsumerRequest, EntityKind, KongConsumer, KongKey, KongList, KongObject, PluginRequest,
    RouteRequest, ServiceRequest,
};

/// Trait abstracting Kong admin operations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GatewayAdmin: Send + Sync {
    /// Check the admin API is reachable
    async fn ping(&self) -> Result<()>;

    /// Create a consumer
    async fn create_consumer(&self, request: &ConsumerRequest) -> Result<KongConsumer>;

    /// Issue a key-auth credential with a generated key for a consumer
    async fn create_key(&self, consumer_id: &str) -> Result<KongKey>;

    /// Create a service
    async fn create_service(&self, request: &ServiceRequest) -> Result<KongObject>;

    /// Create a route
    async fn create_route(&self, request: &RouteRequest) -> Result<KongObject>;

    /// Create a plugin
    async fn create_plugin(&self, request: &PluginRequest) -> Result<KongObject>;

    /// Delete an entity by id. A missing entity is not an error.
    async fn delete(&self, kind: EntityKind, id: &str) -> Result<()>;

    /// Every entity of `kind` carrying `tag`, across all pages
    async fn list_by_tag(&self, kind: EntityKind, tag: &str) -> Result<Vec<KongObject>>;

    /// Consumer owning an access key, if the key exists
    async fn consumer_of_key(&self, key: &str) -> Result<Option<KongConsumer>>;
}

/// Kong Admin API client
pub struct KongClient {
    client: reqwest::Client,
    base_url: String,
}

impl KongClient {
    /// Create a client for the admin API at `base_url`, optionally
    /// authenticating with an admin token
    pub fn new(base_url: &str, admin_token: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = admin_token {
            headers.insert(
                "Kong-Admin-Token",
                HeaderValue::from_str(token).map_err(|e| {
                    Error::dependency_permanent(
                        Dependency::Gateway,
                        format!("invalid admin token: {e}"),
                    )
                })?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::gateway(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    // =========================================================================
    // HTTP Helpers
    // =========================================================================

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| Error::gateway(format!("invalid response from {url}: {e}")))
    }

    async fn post<B: Serialize + Sync, R: DeserializeOwned>(&self, url: &str, body: &B) -> Result<R> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| Error::gateway(format!("invalid response from {url}: {e}")))
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    Error::gateway(format!("request failed: {e}"))
}

/// Map non-success statuses to dependency errors. Client errors other than
/// conflicts and throttling will not succeed on retry.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = format!("{status}: {text}");
    if status.is_client_error()
        && status != StatusCode::CONFLICT
        && status != StatusCode::TOO_MANY_REQUESTS
    {
        Err(Error::dependency_permanent(Dependency::Gateway, message))
    } else {
        Err(Error::gateway(message))
    }
}

#[async_trait]
impl GatewayAdmin for KongClient {
    async fn ping(&self) -> Result<()> {
        let _: serde_json::Value = self.get(&self.url("status")).await?;
        Ok(())
    }

    async fn create_consumer(&self, request: &ConsumerRequest) -> Result<KongConsumer> {
        let consumer: KongConsumer = self.post(&self.url("consumers"), request).await?;
        debug!(consumer = %consumer.id, username = %request.username, "created consumer");
        Ok(consumer)
    }

    async fn create_key(&self, consumer_id: &str) -> Result<KongKey> {
        let url = self.url(&format!("consumers/{consumer_id}/key-auth"));
        self.post(&url, &serde_json::json!({})).await
    }

    async fn create_service(&self, request: &ServiceRequest) -> Result<KongObject> {
        self.post(&self.url("services"), request).await
    }

    async fn create_route(&self, request: &RouteRequest) -> Result<KongObject> {
        self.post(&self.url("routes"), request).await
    }

    async fn create_plugin(&self, request: &PluginRequest) -> Result<KongObject> {
        self.post(&self.url("plugins"), request).await
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        let url = self.url(&format!("{}/{}", kind.path(), id));
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            trace!(kind = %kind, id = %id, "already absent");
            return Ok(());
        }
        check_status(response).await?;
        debug!(kind = %kind, id = %id, "deleted");
        Ok(())
    }

    async fn list_by_tag(&self, kind: EntityKind, tag: &str) -> Result<Vec<KongObject>> {
        let mut objects = Vec::new();
        let mut next = Some(self.url(&format!("{}?tags={}", kind.path(), tag)));
        while let Some(url) = next {
            let page: KongList<KongObject> = self.get(&url).await?;
            objects.extend(page.data);
            next = page.next.map(|n| {
                if n.starts_with("http://") || n.starts_with("https://") {
                    n
                } else {
                    self.url(&n)
                }
            });
        }
        Ok(objects)
    }

    async fn consumer_of_key(&self, key: &str) -> Result<Option<KongConsumer>> {
        let url = self.url(&format!("key-auths/{key}/consumer"));
        let response = self.client.get(&url).send().await.map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;
        let consumer = response
            .json()
            .await
            .map_err(|e| Error::gateway(format!("invalid response from {url}: {e}")))?;
        Ok(Some(consumer))
    }
}
