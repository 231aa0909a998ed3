//! Tenant directory
//!
//! Owns tenant credentials. Registration writes the secret digest, the issued
//! token and the declared register info in one set-if-absent; that write is
//! the only guard against registering a name twice.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use gantry_common::model::RegisterInfo;
use gantry_common::{Error, Result};

use crate::credentials::{hash_secret, verify_secret};
use crate::store::KeyValueStore;

/// Key holding the salted secret digest
pub const PASSWORD_KEY: &str = "password";
/// Key holding the issued access token
pub const TOKEN_KEY: &str = "token";
/// Key holding the register info as JSON
pub const REGISTER_INFO_KEY: &str = "register_info";
/// Key holding the tenant's client code archive, hex encoded
pub const CLIENT_CODE_KEY: &str = "client_code";

/// File name the client code archive is served under
pub const CLIENT_ARTIFACT_NAME: &str = "client_code.zip";

/// Downloadable file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    /// File bytes
    pub content: Vec<u8>,
    /// Suggested file name
    pub file_name: String,
}

/// Credential directory over a key-value store
#[derive(Clone)]
pub struct TenantDirectory {
    store: Arc<dyn KeyValueStore>,
}

impl TenantDirectory {
    /// Create a directory over the given store
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Record a new tenant. Fails with `DuplicateTenant` if any of its
    /// records already exists.
    pub async fn register(
        &self,
        name: &str,
        secret: &str,
        token: &str,
        register_info: &RegisterInfo,
    ) -> Result<()> {
        let info = serde_json::to_string(register_info)
            .map_err(|e| Error::directory(format!("failed to encode register info: {e}")))?;
        let entries = BTreeMap::from([
            (PASSWORD_KEY.to_string(), hash_secret(secret)),
            (TOKEN_KEY.to_string(), token.to_string()),
            (REGISTER_INFO_KEY.to_string(), info),
        ]);

        if !self.store.insert_if_absent(name, entries).await? {
            return Err(Error::duplicate_tenant(name));
        }
        info!(tenant = %name, "tenant recorded in directory");
        Ok(())
    }

    /// Return the tenant's token if `secret` matches.
    ///
    /// Unknown tenants and wrong secrets fail the same way.
    pub async fn login(&self, name: &str, secret: &str) -> Result<String> {
        let stored = self
            .store
            .get(name, PASSWORD_KEY)
            .await?
            .ok_or(Error::InvalidCredentials)?;
        if !verify_secret(secret, &stored) {
            debug!(tenant = %name, "secret mismatch");
            return Err(Error::InvalidCredentials);
        }
        self.store
            .get(name, TOKEN_KEY)
            .await?
            .ok_or(Error::InvalidCredentials)
    }

    /// Remove every record of the tenant. Absent tenants succeed.
    pub async fn unregister(&self, name: &str) -> Result<()> {
        self.store.delete_scope(name).await?;
        info!(tenant = %name, "tenant removed from directory");
        Ok(())
    }

    /// The tenant's client code archive
    pub async fn client_artifact(&self, name: &str) -> Result<Artifact> {
        let encoded = self
            .store
            .get(name, CLIENT_CODE_KEY)
            .await?
            .ok_or_else(|| Error::not_found(format!("client code of {name}")))?;
        let content = hex::decode(encoded.trim())
            .map_err(|e| Error::directory(format!("client code of {name} is corrupt: {e}")))?;
        Ok(Artifact {
            content,
            file_name: CLIENT_ARTIFACT_NAME.to_string(),
        })
    }

    /// What the tenant declared at registration
    pub async fn register_info(&self, name: &str) -> Result<RegisterInfo> {
        let raw = self
            .store
            .get(name, REGISTER_INFO_KEY)
            .await?
            .ok_or_else(|| Error::not_found(format!("register info of {name}")))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::directory(format!("register info of {name} is corrupt: {e}")))
    }
}
