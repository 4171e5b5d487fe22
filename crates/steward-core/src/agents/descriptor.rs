//! Agent descriptors and the registry document formats.
//!
//! Two document shapes load into the same descriptor: the current nested
//! `status`+`metadata` shape and the flat legacy shape. Malformed entries
//! are skipped and reported, never fatal.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// One routable agent. Replaced wholesale on registry reload; never mutated
/// field-by-field at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Name of the compile-time handler this descriptor dispatches to.
    pub entrypoint: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

fn default_true() -> bool {
    true
}

/// Typed partial-load result: the best-effort descriptor set plus what was
/// skipped and why.
#[derive(Debug, Clone, Default)]
pub struct DescriptorLoad {
    pub descriptors: Vec<AgentDescriptor>,
    pub skipped: Vec<SkippedDescriptor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedDescriptor {
    pub id: String,
    pub reason: String,
}

/// Parse a registry document mapping agent id to either document shape.
pub fn load_descriptors(document: &Value) -> DescriptorLoad {
    let mut load = DescriptorLoad::default();

    let Some(object) = document.as_object() else {
        debug!("registry document is not an object");
        return load;
    };

    for (id, entry) in object {
        match parse_entry(id, entry) {
            Ok(descriptor) => load.descriptors.push(descriptor),
            Err(reason) => {
                debug!(agent = id.as_str(), reason = reason.as_str(), "skipping registry entry");
                load.skipped.push(SkippedDescriptor {
                    id: id.clone(),
                    reason,
                });
            }
        }
    }

    load
}

fn parse_entry(id: &str, entry: &Value) -> Result<AgentDescriptor, String> {
    let Some(obj) = entry.as_object() else {
        return Err("entry is not an object".to_string());
    };

    // The nested shape carries a `metadata` object (and optionally `status`);
    // anything else is treated as the flat legacy shape.
    if obj.get("metadata").is_some_and(Value::is_object) {
        parse_nested(id, obj)
    } else {
        parse_flat(id, obj)
    }
}

fn parse_nested(
    id: &str,
    obj: &serde_json::Map<String, Value>,
) -> Result<AgentDescriptor, String> {
    let metadata = obj
        .get("metadata")
        .and_then(Value::as_object)
        .ok_or_else(|| "missing metadata object".to_string())?;

    let entrypoint = metadata
        .get("entrypoint")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "missing entrypoint".to_string())?
        .to_string();

    let enabled = match obj.get("status").and_then(Value::as_str) {
        Some("disabled") => false,
        Some(_) | None => true,
    };

    // Keep the unrecognized metadata keys so callers can round-trip them.
    let extra: BTreeMap<String, Value> = metadata
        .iter()
        .filter(|(k, _)| k.as_str() != "entrypoint" && k.as_str() != "keywords")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(AgentDescriptor {
        id: id.to_string(),
        name: string_or(obj.get("name"), id),
        capabilities: string_list(obj.get("capabilities")),
        priority: int_or_zero(obj.get("priority")),
        keywords: string_list(metadata.get("keywords")),
        entrypoint,
        enabled,
        metadata: extra,
    })
}

fn parse_flat(id: &str, obj: &serde_json::Map<String, Value>) -> Result<AgentDescriptor, String> {
    let entrypoint = obj
        .get("entrypoint")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "missing entrypoint".to_string())?
        .to_string();

    Ok(AgentDescriptor {
        id: id.to_string(),
        name: string_or(obj.get("name"), id),
        capabilities: string_list(obj.get("capabilities")),
        priority: int_or_zero(obj.get("priority")),
        keywords: string_list(obj.get("keywords")),
        entrypoint,
        enabled: obj.get("enabled").and_then(Value::as_bool).unwrap_or(true),
        metadata: BTreeMap::new(),
    })
}

fn string_or(value: Option<&Value>, fallback: &str) -> String {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn int_or_zero(value: Option<&Value>) -> i32 {
    value.and_then(Value::as_i64).unwrap_or(0) as i32
}
