//! Kong admin entities
//!
//! Only the fields Gantry reads or writes are modelled.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kong entity collections Gantry creates objects in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// `/plugins`
    Plugin,
    /// `/consumers`
    Consumer,
    /// `/routes`
    Route,
    /// `/services`
    Service,
}

impl EntityKind {
    /// Deletion order for a tenant's objects: dependents before what they
    /// reference
    pub const TEARDOWN_ORDER: [EntityKind; 4] = [
        EntityKind::Plugin,
        EntityKind::Consumer,
        EntityKind::Route,
        EntityKind::Service,
    ];

    /// Admin API collection path
    pub fn path(&self) -> &'static str {
        match self {
            EntityKind::Plugin => "plugins",
            EntityKind::Consumer => "consumers",
            EntityKind::Route => "routes",
            EntityKind::Service => "services",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Any Kong object, as returned by create and list calls
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct KongObject {
    /// Kong-assigned id
    pub id: String,
    /// Object name, when the entity has one
    #[serde(default)]
    pub name: Option<String>,
    /// Tags
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Kong consumer
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct KongConsumer {
    /// Kong-assigned id
    pub id: String,
    /// Consumer username
    #[serde(default)]
    pub username: Option<String>,
    /// Tags
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// key-auth credential
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct KongKey {
    /// Kong-assigned id
    pub id: String,
    /// The access key itself
    pub key: String,
}

/// Paginated list response
#[derive(Debug, Deserialize)]
pub(crate) struct KongList<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
}

/// Reference to another entity by name
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NameRef {
    /// Referenced entity's name
    pub name: String,
}

/// Consumer creation request
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConsumerRequest {
    /// Unique username
    pub username: String,
    /// Tags
    pub tags: Vec<String>,
}

/// Service creation request
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServiceRequest {
    /// Unique service name
    pub name: String,
    /// Upstream protocol (`grpc`, `http`)
    pub protocol: String,
    /// Upstream host
    pub host: String,
    /// Upstream port
    pub port: u16,
    /// Upstream path prefix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Whether the service accepts traffic
    pub enabled: bool,
    /// Connect timeout in milliseconds
    pub connect_timeout: u64,
    /// Read timeout in milliseconds
    pub read_timeout: u64,
    /// Write timeout in milliseconds
    pub write_timeout: u64,
    /// Tags
    pub tags: Vec<String>,
}

/// Route creation request
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RouteRequest {
    /// Unique route name
    pub name: String,
    /// Accepted protocols
    pub protocols: Vec<String>,
    /// Accepted methods; all when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,
    /// Matched hosts
    pub hosts: Vec<String>,
    /// Matched path prefixes
    pub paths: Vec<String>,
    /// Matched request headers
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, Vec<String>>,
    /// Whether the matched path prefix is stripped upstream
    pub strip_path: bool,
    /// Target service
    pub service: NameRef,
    /// Tags
    pub tags: Vec<String>,
}

/// key-auth plugin settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KeyAuthConfig {
    /// Header or query parameter names carrying the key
    pub key_names: Vec<String>,
    /// Accept the key as a query parameter
    pub key_in_query: bool,
    /// Accept the key as a header
    pub key_in_header: bool,
    /// Accept the key in the request body
    pub key_in_body: bool,
}

/// Plugin creation request
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PluginRequest {
    /// Plugin name
    pub name: String,
    /// Service the plugin applies to
    pub service: NameRef,
    /// Whether the plugin is active
    pub enabled: bool,
    /// Plugin configuration
    pub config: KeyAuthConfig,
    /// Tags
    pub tags: Vec<String>,
}
