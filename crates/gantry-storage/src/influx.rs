//! InfluxDB v2 buckets API
//!
//! [`BucketApi`] is the seam the namespace manager talks to; [`InfluxClient`]
//! implements it over HTTP against one organization.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use gantry_common::retry::{retry_transient, RetryConfig};
use gantry_common::{Dependency, Error, Result};

/// Trait abstracting bucket management
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BucketApi: Send + Sync {
    /// Create a bucket whose data expires after `retention`
    async fn create_bucket(&self, name: &str, retention: Duration) -> Result<()>;

    /// Delete a bucket by name. Returns whether it existed.
    async fn delete_bucket_by_name(&self, name: &str) -> Result<bool>;
}

#[derive(Debug, Deserialize)]
struct Organization {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Organizations {
    #[serde(default)]
    orgs: Vec<Organization>,
}

#[derive(Debug, Deserialize)]
struct Bucket {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Buckets {
    #[serde(default)]
    buckets: Vec<Bucket>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RetentionRule {
    #[serde(rename = "type")]
    kind: &'static str,
    every_seconds: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBucket<'a> {
    #[serde(rename = "orgID")]
    org_id: &'a str,
    name: &'a str,
    retention_rules: Vec<RetentionRule>,
}

/// InfluxDB v2 client scoped to one organization
pub struct InfluxClient {
    client: reqwest::Client,
    base_url: String,
    org: String,
    org_id: OnceCell<String>,
}

impl InfluxClient {
    /// Create a client for `org` at `base_url`, authenticating with `token`
    pub fn new(base_url: &str, token: &str, org: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Token {token}")).map_err(|e| {
                Error::dependency_permanent(Dependency::Storage, format!("invalid token: {e}"))
            })?,
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::storage(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            org: org.to_string(),
            org_id: OnceCell::new(),
        })
    }

    /// Organization id, looked up once and cached
    async fn org_id(&self) -> Result<&str> {
        let id = self
            .org_id
            .get_or_try_init(|| async {
                let retry = RetryConfig::with_max_attempts(3);
                retry_transient(&retry, "influx_org_lookup", || self.lookup_org_id()).await
            })
            .await?;
        Ok(id.as_str())
    }

    async fn lookup_org_id(&self) -> Result<String> {
        let url = format!("{}/api/v2/orgs", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("org", self.org.as_str())])
            .send()
            .await
            .map_err(transport_error)?;
        let orgs: Organizations = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::storage(format!("invalid organization list: {e}")))?;
        orgs.orgs
            .into_iter()
            .next()
            .map(|o| o.id)
            .ok_or_else(|| {
                Error::dependency_permanent(
                    Dependency::Storage,
                    format!("organization {} not found", self.org),
                )
            })
    }

    async fn find_bucket(&self, name: &str) -> Result<Option<Bucket>> {
        let org_id = self.org_id().await?;
        let url = format!("{}/api/v2/buckets", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("name", name), ("orgID", org_id)])
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let buckets: Buckets = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::storage(format!("invalid bucket list: {e}")))?;
        Ok(buckets.buckets.into_iter().find(|b| b.name == name))
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    Error::storage(format!("request failed: {e}"))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = format!("{status}: {text}");
    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        Err(Error::dependency_permanent(Dependency::Storage, message))
    } else {
        Err(Error::storage(message))
    }
}

#[async_trait]
impl BucketApi for InfluxClient {
    async fn create_bucket(&self, name: &str, retention: Duration) -> Result<()> {
        let org_id = self.org_id().await?;
        let body = CreateBucket {
            org_id,
            name,
            retention_rules: vec![RetentionRule {
                kind: "expire",
                every_seconds: retention.as_secs(),
            }],
        };
        let url = format!("{}/api/v2/buckets", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        debug!(bucket = %name, retention_secs = retention.as_secs(), "bucket created");
        Ok(())
    }

    async fn delete_bucket_by_name(&self, name: &str) -> Result<bool> {
        let Some(bucket) = self.find_bucket(name).await? else {
            return Ok(false);
        };
        let url = format!("{}/api/v2/buckets/{}", self.base_url, bucket.id);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(response).await?;
        debug!(bucket = %name, id = %bucket.id, "bucket deleted");
        Ok(true)
    }
}
