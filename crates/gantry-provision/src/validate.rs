//! Registration request validation
//!
//! Runs before the saga starts, so a rejected request never touches a
//! collaborator. The first violated rule is reported with the path of the
//! offending field.

use std::collections::HashSet;

use gantry_common::model::{FieldSchema, RegisterRequest, User};
use gantry_common::{Error, Result};
use gantry_storage::RESERVED_SUFFIXES;

/// Longest accepted tenant name
pub const MAX_TENANT_NAME_LEN: usize = 40;

const STATE_INFOS: &str = "device_state_register_infos";
const CONFIG_INFOS: &str = "device_config_register_infos";

/// Validate a registration request and return its credentials
pub fn validate_request(request: &RegisterRequest) -> Result<&User> {
    let user = request
        .user
        .as_ref()
        .ok_or_else(|| Error::validation_for_field("missing_user", "user", "user is required"))?;

    validate_tenant_name(&user.id)?;
    if user.password.is_empty() {
        return Err(Error::validation_for_field(
            "missing_password",
            "user.password",
            "password is required",
        ));
    }

    if request.device_state_register_infos.is_empty() {
        return Err(Error::validation_for_field(
            "no_state_schemas",
            STATE_INFOS,
            "at least one device state schema is required",
        ));
    }
    for (i, info) in request.device_state_register_infos.iter().enumerate() {
        let path = format!("{STATE_INFOS}[{i}]");
        check_unique_names(&path, &info.fields)?;
        require_field(&path, &info.fields, "id", "string", "missing_id_field")?;
        require_field(&path, &info.fields, "time", "timestamp", "missing_time_field")?;
        for (j, field) in info.fields.iter().enumerate() {
            if field.warning_rule.is_some() && !field.is_numeric() {
                return Err(Error::validation_for_field(
                    "alert_rule_on_non_numeric",
                    format!("{path}.fields[{j}]"),
                    format!(
                        "field {} of type {} cannot carry an alert rule",
                        field.name, field.field_type
                    ),
                ));
            }
        }
    }

    for (i, info) in request.device_config_register_infos.iter().enumerate() {
        let path = format!("{CONFIG_INFOS}[{i}]");
        check_unique_names(&path, &info.fields)?;
        require_field(&path, &info.fields, "id", "string", "missing_id_field")?;
    }

    Ok(user)
}

/// Tenant names are used verbatim in cluster object names, labels, gateway
/// tags and bucket names, so they are held to a DNS label alphabet and may
/// not end in a bucket suffix.
fn validate_tenant_name(name: &str) -> Result<()> {
    let invalid = |msg: String| Err(Error::validation_for_field("invalid_tenant_name", "user.id", msg));

    if name.is_empty() || name.len() > MAX_TENANT_NAME_LEN {
        return invalid(format!(
            "tenant name must be 1 to {MAX_TENANT_NAME_LEN} characters"
        ));
    }
    if !name.starts_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit()) {
        return invalid(format!("tenant name {name:?} must start with a letter or digit"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
    {
        return invalid(format!("tenant name {name:?} contains {c:?}"));
    }
    if let Some(suffix) = RESERVED_SUFFIXES.iter().find(|s| name.ends_with(*s)) {
        return invalid(format!("tenant name {name:?} ends in reserved suffix {suffix:?}"));
    }
    Ok(())
}

fn check_unique_names(path: &str, fields: &[FieldSchema]) -> Result<()> {
    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert(field.name.as_str()) {
            return Err(Error::validation_for_field(
                "duplicate_field_name",
                format!("{path}.fields"),
                format!("field {} is declared more than once", field.name),
            ));
        }
    }
    Ok(())
}

fn require_field(
    path: &str,
    fields: &[FieldSchema],
    name: &str,
    field_type: &str,
    rule: &str,
) -> Result<()> {
    let present = fields
        .iter()
        .any(|f| f.name == name && f.field_type.eq_ignore_ascii_case(field_type));
    if present {
        Ok(())
    } else {
        Err(Error::validation_for_field(
            rule,
            format!("{path}.fields"),
            format!("a field {name} of type {field_type} is required"),
        ))
    }
}
