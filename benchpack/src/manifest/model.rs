//! Typed manifest model.
//!
//! The manifest is a declarative list of [`Item`]s plus descriptive package
//! metadata. Every enum here is closed: an unknown `type`, `source` or
//! `path_base` is rejected by validation before deserialization happens.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Kind of resource an item installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Model,
    CustomNode,
    File,
    Directory,
    PipPackage,
    Config,
    Application,
}

impl ItemType {
    /// Every supported item type.
    pub const ALL: [ItemType; 7] = [
        ItemType::Model,
        ItemType::CustomNode,
        ItemType::File,
        ItemType::Directory,
        ItemType::PipPackage,
        ItemType::Config,
        ItemType::Application,
    ];

    /// Manifest spelling of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::CustomNode => "custom_node",
            Self::File => "file",
            Self::Directory => "directory",
            Self::PipPackage => "pip_package",
            Self::Config => "config",
            Self::Application => "application",
        }
    }
}

/// Transfer mechanism for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Placed by the external archive extraction step; nothing to do here.
    Bundled,
    Huggingface,
    Git,
    Url,
    Local,
    Pip,
    InstallTemp,
    Winget,
}

impl SourceKind {
    /// Every supported source.
    pub const ALL: [SourceKind; 8] = [
        SourceKind::Bundled,
        SourceKind::Huggingface,
        SourceKind::Git,
        SourceKind::Url,
        SourceKind::Local,
        SourceKind::Pip,
        SourceKind::InstallTemp,
        SourceKind::Winget,
    ];

    /// Manifest spelling of the source.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bundled => "bundled",
            Self::Huggingface => "huggingface",
            Self::Git => "git",
            Self::Url => "url",
            Self::Local => "local",
            Self::Pip => "pip",
            Self::InstallTemp => "install_temp",
            Self::Winget => "winget",
        }
    }

    /// Sources that install into an ambient environment instead of a path.
    pub fn is_ambient(&self) -> bool {
        matches!(self, Self::Pip | Self::Winget)
    }
}

/// Root a declared item path is joined against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathBase {
    /// The install root (the ComfyUI directory).
    #[default]
    Comfyui,
    Home,
    Temp,
    Appdata,
    Absolute,
    /// The bundled extraction root supplied by the caller.
    InstallTemp,
}

impl PathBase {
    /// Every supported path base.
    pub const ALL: [PathBase; 6] = [
        PathBase::Comfyui,
        PathBase::Home,
        PathBase::Temp,
        PathBase::Appdata,
        PathBase::Absolute,
        PathBase::InstallTemp,
    ];

    /// Manifest spelling of the path base.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Comfyui => "comfyui",
            Self::Home => "home",
            Self::Temp => "temp",
            Self::Appdata => "appdata",
            Self::Absolute => "absolute",
            Self::InstallTemp => "install_temp",
        }
    }
}

macro_rules! impl_manifest_enum {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| s.to_string())
            }
        }
    };
}

impl_manifest_enum!(ItemType);
impl_manifest_enum!(SourceKind);
impl_manifest_enum!(PathBase);

/// Descriptive package header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Summary aids shown before downloading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    #[serde(default)]
    pub total_size_mb: Option<f64>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub estimated_time: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub details: Option<String>,
}

/// One acquirable unit of a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub source: SourceKind,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub path_base: PathBase,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub gated: bool,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub size_mb: Option<f64>,

    // huggingface
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub remote_path: Option<String>,

    // git / url
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "ref", deserialize_with = "scalar_string")]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub install_requirements: bool,
    #[serde(default)]
    pub executable: bool,

    // local / install_temp / pip wheel
    #[serde(default)]
    pub source_path: Option<String>,

    // pip
    #[serde(default)]
    pub package: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub version: Option<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub pip_args: Vec<String>,
    #[serde(default)]
    pub index_url: Option<String>,
    #[serde(default)]
    pub extra_index_url: Option<String>,
    #[serde(default)]
    pub find_links: Option<String>,
    #[serde(default)]
    pub uninstall_current: bool,
    #[serde(default)]
    pub uninstall_only: bool,

    // winget
    #[serde(default)]
    pub package_id: Option<String>,
    #[serde(default)]
    pub winget_source: Option<String>,
    #[serde(default = "default_true")]
    pub silent: bool,
    #[serde(default = "default_true")]
    pub accept_agreements: bool,
}

fn default_true() -> bool {
    true
}

impl Item {
    /// Expected SHA-256 digest, accepting either `sha256` or `sha`.
    pub fn checksum(&self) -> Option<&str> {
        self.sha256
            .as_deref()
            .or(self.sha.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Declared git ref, `main` when absent.
    pub fn git_ref(&self) -> &str {
        self.git_ref.as_deref().unwrap_or("main")
    }

    /// Whether a successful transfer must be checksum-verified.
    ///
    /// Only model weights carry mandatory verification.
    pub fn verifies_checksum(&self) -> bool {
        self.item_type == ItemType::Model
    }

    /// Human-readable origin of the item, used in dry-run output and logs.
    pub fn source_description(&self) -> String {
        let or_unknown = |v: &Option<String>| v.clone().unwrap_or_else(|| "unknown".to_string());
        match self.source {
            SourceKind::Huggingface => format!(
                "HuggingFace: {}/{}",
                or_unknown(&self.repo),
                or_unknown(&self.file)
            ),
            SourceKind::Git => format!("Git: {} (ref: {})", or_unknown(&self.url), self.git_ref()),
            SourceKind::Url => format!("URL: {}", or_unknown(&self.url)),
            SourceKind::Local => format!("Local: {}", or_unknown(&self.source_path)),
            SourceKind::InstallTemp => format!(
                "Bundled copy: {}",
                self.source_path
                    .clone()
                    .or_else(|| self.path.clone())
                    .unwrap_or_else(|| "unknown".to_string())
            ),
            SourceKind::Pip => format!("pip: {}", self.pip_spec_label()),
            SourceKind::Winget => format!("winget: {}", or_unknown(&self.package_id)),
            SourceKind::Bundled => "bundled".to_string(),
        }
    }

    fn pip_spec_label(&self) -> String {
        match (&self.package, &self.version, &self.source_path) {
            (Some(name), Some(version), _) if version != "latest" => {
                format!("{}=={}", name, version)
            }
            (Some(name), _, _) => name.clone(),
            (None, _, Some(path)) => path.clone(),
            _ => self.name.clone(),
        }
    }
}

/// Root manifest document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestDocument {
    pub package: PackageInfo,
    #[serde(default)]
    pub metadata: PackageMetadata,
    /// Opaque key/value map consumed by other tools (run-count hints and the like).
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
    pub items: Vec<Item>,
}

impl ManifestDocument {
    /// Package name, `unknown` when undeclared.
    pub fn package_name(&self) -> &str {
        self.package.name.as_deref().unwrap_or("unknown")
    }

    /// Look an item up by name.
    pub fn item(&self, name: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.name == name)
    }
}

/// Accept strings and numbers (YAML happily turns `1.0` into a float).
fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Accept either a single whitespace-separated string or a list of strings.
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Args {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<Args>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Args::One(s)) => s.split_whitespace().map(str::to_string).collect(),
        Some(Args::Many(v)) => v,
    })
}
