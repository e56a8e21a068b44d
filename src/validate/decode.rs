//! Decoding raw attribute patches onto a request.
//!
//! A patch is the JSON object a caller sends. Every attribute is checked
//! for its wire type independently so one bad value does not hide another;
//! well-typed values are applied, bad ones are reported and skipped.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crq_protocol::{
    ContainerRequest, FieldErrors, Mount, RequestField, RuntimeConstraints, SchedulingParameters,
};

/// JSON type name used in messages.
pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Apply `patch` to `record`, returning the attributes the caller supplied.
///
/// Unknown attribute names and wrongly typed values are recorded in
/// `errors`.
pub fn apply_patch(
    record: &mut ContainerRequest,
    patch: &Map<String, Value>,
    errors: &mut FieldErrors,
) -> BTreeSet<RequestField> {
    let mut supplied = BTreeSet::new();

    for (name, value) in patch {
        let field = match name.parse::<RequestField>() {
            Ok(field) => field,
            Err(message) => {
                errors.validation(name.as_str(), message);
                continue;
            }
        };
        supplied.insert(field);
        if let Err(message) = apply_field(record, field, value) {
            errors.validation(field.as_str(), message);
        }
    }

    supplied
}

fn apply_field(record: &mut ContainerRequest, field: RequestField, value: &Value) -> Result<(), String> {
    use RequestField as F;

    match field {
        F::Uuid => record.uuid = required_string(value)?,
        F::OwnerUuid => record.owner_uuid = required_string(value)?,
        F::CreatedAt => record.created_at = required_time(value)?,
        F::ModifiedAt => record.modified_at = required_time(value)?,
        F::ModifiedBy => record.modified_by = optional_string(value)?,
        F::Name => record.name = optional_string(value)?,
        F::Description => record.description = optional_string(value)?,
        F::Properties => record.properties = object(value)?.into_iter().collect(),
        F::State => {
            record.state = required_string(value)?
                .parse()
                .map_err(|e: crq_protocol::ParseStateError| e.to_string())?
        }
        F::RequestingContainerUuid => record.requesting_container_uuid = optional_string(value)?,
        F::ContainerUuid => record.container_uuid = optional_string(value)?,
        F::ContainerCount => record.container_count = integer(value)?,
        F::ContainerCountMax => record.container_count_max = integer(value)?,
        F::Priority => record.priority = integer(value)?,
        F::Command => record.command = command(value)?,
        F::ContainerImage => record.container_image = required_string(value)?,
        F::Cwd => record.cwd = required_string(value)?,
        F::OutputPath => record.output_path = required_string(value)?,
        F::Environment => record.environment = environment(value)?,
        F::Mounts => record.mounts = mounts(value)?,
        F::SecretMounts => record.secret_mounts = mounts(value)?,
        F::RuntimeConstraints => {
            record.runtime_constraints =
                RuntimeConstraints::from_map(object(value)?.into_iter().collect())
        }
        F::SchedulingParameters => {
            record.scheduling_parameters =
                SchedulingParameters::from_map(object(value)?.into_iter().collect())
        }
        F::RuntimeToken => record.runtime_token = optional_string(value)?,
        F::UseExisting => {
            record.use_existing = value
                .as_bool()
                .ok_or_else(|| format!("must be a boolean but is {}", type_name(value)))?
        }
        F::OutputName => record.output_name = optional_string(value)?,
        F::OutputTtl => record.output_ttl = integer(value)?,
        F::OutputUuid => record.output_uuid = optional_string(value)?,
        F::LogUuid => record.log_uuid = optional_string(value)?,
        F::ExpiresAt => {
            record.expires_at = match value {
                Value::Null => None,
                other => Some(required_time(other)?),
            }
        }
        F::Filters => record.filters = optional_string(value)?,
    }
    Ok(())
}

fn required_string(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Err("cannot be null".to_string()),
        other => Err(format!("must be a string but is {}", type_name(other))),
    }
}

fn optional_string(value: &Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        other => required_string(other).map(Some),
    }
}

fn integer(value: &Value) -> Result<i64, String> {
    match value {
        Value::Null => Err("cannot be null".to_string()),
        other => other
            .as_i64()
            .ok_or_else(|| format!("must be an integer but is {}", type_name(other))),
    }
}

fn required_time(value: &Value) -> Result<DateTime<Utc>, String> {
    let text = required_string(value)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("must be an RFC 3339 timestamp: {}", e))
}

/// Map-valued attributes treat null as empty.
fn object(value: &Value) -> Result<Map<String, Value>, String> {
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map.clone()),
        other => Err(format!("must be an object but is {}", type_name(other))),
    }
}

fn command(value: &Value) -> Result<Vec<String>, String> {
    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        other => return Err(format!("must be an array of strings but is {}", type_name(other))),
    };
    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                format!("must be an array of strings but has entry {}", type_name(item))
            })
        })
        .collect()
}

fn environment(value: &Value) -> Result<BTreeMap<String, String>, String> {
    object(value)?
        .into_iter()
        .map(|(k, v)| match v {
            Value::String(s) => Ok((k, s)),
            other => Err(format!(
                "must be a map of string to string but has entry {} to {}",
                k,
                type_name(&other)
            )),
        })
        .collect()
}

fn mounts(value: &Value) -> Result<BTreeMap<String, Mount>, String> {
    let mut problems = Vec::new();
    let mut decoded = BTreeMap::new();

    for (key, spec) in object(value)? {
        let Value::Object(members) = &spec else {
            problems.push(format!(
                "must be a map of string to object but has entry {} to {}",
                key,
                type_name(&spec)
            ));
            continue;
        };
        let before = problems.len();
        check_mount_members(&key, members, &mut problems);
        if problems.len() > before {
            continue;
        }
        match serde_json::from_value::<Mount>(spec.clone()) {
            Ok(mount) => {
                decoded.insert(key, mount);
            }
            Err(e) => problems.push(format!("{}: {}", key, e)),
        }
    }

    if problems.is_empty() {
        Ok(decoded)
    } else {
        Err(problems.join("; "))
    }
}

fn check_mount_members(key: &str, members: &Map<String, Value>, problems: &mut Vec<String>) {
    if members.get("kind").map_or(true, Value::is_null) {
        problems.push(format!("{}: each item must have a 'kind' field", key));
    }
    let present = |name: &&str| members.get(*name).filter(|v| !v.is_null());

    for name in Mount::STRING_MEMBERS {
        if let Some(v) = present(name).filter(|v| !v.is_string()) {
            problems.push(format!("{}: {} must be a string but is {}", key, name, type_name(v)));
        }
    }
    for name in Mount::INTEGER_MEMBERS {
        if let Some(v) = present(name).filter(|v| v.as_u64().is_none()) {
            problems.push(format!(
                "{}: {} must be a non-negative integer but is {}",
                key,
                name,
                type_name(v)
            ));
        }
    }
    for name in Mount::BOOLEAN_MEMBERS {
        if let Some(v) = present(name).filter(|v| !v.is_boolean()) {
            problems.push(format!("{}: {} must be a boolean but is {}", key, name, type_name(v)));
        }
    }
}
