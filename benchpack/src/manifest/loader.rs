//! Manifest loading and schema validation.

use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::info;

use super::error::{ManifestError, ManifestResult};
use super::model::{ItemType, ManifestDocument, PathBase, SourceKind};

/// Keys every manifest must carry at the top level.
const REQUIRED_KEYS: [&str; 2] = ["package", "items"];

/// Fields every item must carry.
const REQUIRED_ITEM_FIELDS: [&str; 3] = ["name", "type", "source"];

/// Parse a manifest file into an untyped document.
///
/// YAML is chosen for `.yaml`/`.yml` extensions, JSON otherwise.
pub fn parse_file(path: &Path) -> ManifestResult<Value> {
    if !path.exists() {
        return Err(ManifestError::parse(path, "manifest not found"));
    }

    let text = fs::read_to_string(path).map_err(|e| ManifestError::parse(path, e))?;

    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    let value: Value = if is_yaml {
        serde_yaml::from_str(&text).map_err(|e| ManifestError::parse(path, e))?
    } else {
        serde_json::from_str(&text).map_err(|e| ManifestError::parse(path, e))?
    };

    if !value.is_object() {
        return Err(ManifestError::parse(path, "top level is not a mapping"));
    }

    Ok(value)
}

/// Validate an untyped manifest document against the item schema.
///
/// Pure: inspects the document only.
pub fn validate(doc: &Value) -> ManifestResult<()> {
    for key in REQUIRED_KEYS {
        if doc.get(key).is_none() {
            return Err(ManifestError::validation(format!(
                "Manifest missing required key: {}",
                key
            )));
        }
    }

    if !doc["package"].is_object() {
        return Err(ManifestError::validation("'package' must be a mapping"));
    }

    let items = doc["items"]
        .as_array()
        .ok_or_else(|| ManifestError::validation("'items' must be a list"))?;

    for (index, item) in items.iter().enumerate() {
        validate_item(index, item)?;
    }

    Ok(())
}

fn validate_item(index: usize, item: &Value) -> ManifestResult<()> {
    if !item.is_object() {
        return Err(ManifestError::validation(format!(
            "Item #{} is not a mapping",
            index
        )));
    }

    for field in REQUIRED_ITEM_FIELDS {
        if item.get(field).and_then(Value::as_str).is_none() {
            return Err(ManifestError::validation(format!(
                "Item #{} missing required field '{}': {}",
                index, field, item
            )));
        }
    }

    let name = item["name"].as_str().unwrap_or_default();
    let item_type = item["type"].as_str().unwrap_or_default();
    let source = item["source"].as_str().unwrap_or_default();

    if item_type.parse::<ItemType>().is_err() {
        return Err(ManifestError::validation(format!(
            "Unsupported item type: {}",
            item_type
        )));
    }

    let source: SourceKind = source
        .parse()
        .map_err(|s| ManifestError::validation(format!("Unsupported source: {}", s)))?;

    if let Some(base) = item.get("path_base") {
        let base = base.as_str().unwrap_or_default();
        if base.parse::<PathBase>().is_err() {
            return Err(ManifestError::validation(format!(
                "Unsupported path_base: {}",
                base
            )));
        }
    }

    let has = |field: &str| {
        item.get(field)
            .and_then(Value::as_str)
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    };

    if !source.is_ambient() && source != SourceKind::Bundled && !has("path") {
        return Err(ManifestError::validation(format!(
            "Item '{}' ({}) requires a path",
            name, source
        )));
    }

    let missing = match source {
        SourceKind::Huggingface => ["repo", "file"].into_iter().find(|f| !has(*f)),
        SourceKind::Git | SourceKind::Url => (!has("url")).then_some("url"),
        SourceKind::Local | SourceKind::InstallTemp => {
            (!has("source_path")).then_some("source_path")
        }
        SourceKind::Pip => (!has("package") && !has("source_path")).then_some("package"),
        SourceKind::Winget => (!has("package_id")).then_some("package_id"),
        SourceKind::Bundled => None,
    };

    if let Some(field) = missing {
        return Err(ManifestError::validation(format!(
            "Item '{}' ({}) missing required field '{}'",
            name, source, field
        )));
    }

    Ok(())
}

impl ManifestDocument {
    /// Load, validate and type a manifest file.
    pub fn load(path: &Path) -> ManifestResult<Self> {
        let value = parse_file(path)?;
        validate(&value)?;

        let doc: ManifestDocument = serde_json::from_value(value)
            .map_err(|e| ManifestError::validation(e.to_string()))?;

        info!(package = doc.package_name(), items = doc.items.len(), "Loaded manifest");
        Ok(doc)
    }
}
