//! Tenant registration data model
//!
//! Field names follow the public registration API.

use serde::{Deserialize, Serialize};

/// Field types the tenant workloads accept for alert rules
pub const NUMERIC_FIELD_TYPES: [&str; 6] = ["int32", "int64", "uint32", "uint64", "float", "double"];

/// Tenant credentials
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Tenant name
    #[serde(default)]
    pub id: String,
    /// Tenant secret
    #[serde(default)]
    pub password: String,
}

/// One field of a device schema
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Field name
    pub name: String,
    /// Field type, e.g. `string`, `timestamp`, `double`
    #[serde(rename = "type")]
    pub field_type: String,
    /// Alert rule evaluated by the processing workload. Opaque here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_rule: Option<serde_json::Value>,
}

impl FieldSchema {
    /// Create a field without an alert rule
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            warning_rule: None,
        }
    }

    /// Whether the field holds a number
    pub fn is_numeric(&self) -> bool {
        NUMERIC_FIELD_TYPES.contains(&self.field_type.to_ascii_lowercase().as_str())
    }
}

/// Schema of the state a device reports
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStateRegisterInfo {
    /// Reported fields
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

/// Schema of the configuration a device accepts
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfigRegisterInfo {
    /// Configurable fields
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

/// Registration payload
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Tenant credentials
    #[serde(default)]
    pub user: Option<User>,
    /// Device configuration schemas
    #[serde(default)]
    pub device_config_register_infos: Vec<DeviceConfigRegisterInfo>,
    /// Device state schemas with alert rules
    #[serde(default)]
    pub device_state_register_infos: Vec<DeviceStateRegisterInfo>,
}

/// What a tenant declared at registration, minus its secret
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterInfo {
    /// Tenant name
    pub tenant: String,
    /// Device configuration schemas
    #[serde(default)]
    pub device_config_register_infos: Vec<DeviceConfigRegisterInfo>,
    /// Device state schemas with alert rules
    #[serde(default)]
    pub device_state_register_infos: Vec<DeviceStateRegisterInfo>,
}

impl RegisterInfo {
    /// Build from a registration payload, dropping the secret
    pub fn from_request(tenant: &str, request: &RegisterRequest) -> Self {
        Self {
            tenant: tenant.to_string(),
            device_config_register_infos: request.device_config_register_infos.clone(),
            device_state_register_infos: request.device_state_register_infos.clone(),
        }
    }
}
