//! Engine configuration.
//!
//! [`EngineConfig`] is built in code (builder style) and handed to the
//! engine at construction. [`ConfigFile`] is the optional on-disk INI layer
//! the CLI merges underneath environment variables and flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::credential::HfToken;

/// Default hub endpoint.
pub const DEFAULT_HUB_ENDPOINT: &str = "https://huggingface.co";

/// Default worker pool size.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Default HTTP request timeout (5 minutes).
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Per-command subprocess timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTimeouts {
    /// Local repository queries (`git rev-parse`).
    pub local_query: Duration,
    /// Remote metadata queries (`git ls-remote`).
    pub remote_query: Duration,
    /// `git fetch`.
    pub fetch: Duration,
    /// `git checkout` / `git reset`.
    pub checkout: Duration,
    /// `git clone`.
    pub clone: Duration,
    /// Runtime-package installs and uninstalls.
    pub install: Duration,
    /// OS package manager installs.
    pub os_package: Duration,
}

impl Default for CommandTimeouts {
    fn default() -> Self {
        Self {
            local_query: Duration::from_secs(10),
            remote_query: Duration::from_secs(30),
            fetch: Duration::from_secs(60),
            checkout: Duration::from_secs(30),
            clone: Duration::from_secs(600),
            install: Duration::from_secs(1800),
            os_package: Duration::from_secs(600),
        }
    }
}

/// Bounded retry with doubling delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (0-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Configuration for the acquisition engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of the target installation.
    pub install_root: PathBuf,

    /// Externally unpacked bundle feeding `install_temp` items.
    pub bundle_root: Option<PathBuf>,

    /// Directory of the manifest file, for manifest-relative wheel paths.
    pub manifest_dir: Option<PathBuf>,

    /// Worker pool size for parallel dispatch.
    pub max_workers: usize,

    /// Resume interrupted URL downloads with byte ranges.
    pub resume_downloads: bool,

    /// Credential for gated hub items.
    pub hf_token: Option<HfToken>,

    /// Hub base URL.
    pub hub_endpoint: String,

    /// Interpreter whose environment pip installs into.
    pub python_executable: PathBuf,

    /// HTTP request timeout.
    pub http_timeout: Duration,

    /// Subprocess timeouts.
    pub timeouts: CommandTimeouts,

    /// Retry policy for transient file-lock failures.
    pub lock_retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            install_root: PathBuf::from("."),
            bundle_root: None,
            manifest_dir: None,
            max_workers: DEFAULT_MAX_WORKERS,
            resume_downloads: true,
            hf_token: None,
            hub_endpoint: DEFAULT_HUB_ENDPOINT.to_string(),
            python_executable: default_python(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            timeouts: CommandTimeouts::default(),
            lock_retry: RetryPolicy::default(),
        }
    }
}

fn default_python() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("python")
    } else {
        PathBuf::from("python3")
    }
}

impl EngineConfig {
    /// Create a configuration for the given install root.
    pub fn new(install_root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
            ..Default::default()
        }
    }

    /// [`EngineConfig::new`] with the hub token taken from the environment.
    pub fn from_env(install_root: impl Into<PathBuf>) -> Self {
        let mut config = Self::new(install_root);
        config.hf_token = HfToken::from_env();
        config
    }

    /// Set the bundled extraction root.
    pub fn with_bundle_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.bundle_root = Some(path.into());
        self
    }

    /// Set the manifest directory.
    pub fn with_manifest_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_dir = Some(path.into());
        self
    }

    /// Set the worker count (at least 1).
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self
    }

    /// Enable or disable download resumption.
    pub fn with_resume_downloads(mut self, resume: bool) -> Self {
        self.resume_downloads = resume;
        self
    }

    /// Set the hub token.
    pub fn with_hf_token(mut self, token: HfToken) -> Self {
        self.hf_token = Some(token);
        self
    }

    /// Set the hub endpoint.
    pub fn with_hub_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.hub_endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the Python interpreter.
    pub fn with_python(mut self, python: impl Into<PathBuf>) -> Self {
        self.python_executable = python.into();
        self
    }

    /// Set the HTTP timeout.
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Set subprocess timeouts.
    pub fn with_timeouts(mut self, timeouts: CommandTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the file-lock retry policy.
    pub fn with_lock_retry(mut self, policy: RetryPolicy) -> Self {
        self.lock_retry = policy;
        self
    }
}

/// Errors reading the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("invalid value '{value}' for [{section}] {key}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
    },
}

/// Values from the optional INI config file. Unset keys are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub install_root: Option<PathBuf>,
    pub bundle_root: Option<PathBuf>,
    pub workers: Option<usize>,
    pub resume: Option<bool>,
    pub hf_token: Option<String>,
    pub hub_endpoint: Option<String>,
    pub python: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl ConfigFile {
    /// `<platform config dir>/benchpack/config.ini`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("benchpack").join("config.ini"))
    }

    /// Load the default config file; a missing file yields defaults.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load a specific config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let get = |section: &str, key: &str| {
            ini.get_from(Some(section), key)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let workers = match get("install", "workers") {
            Some(v) => Some(v.parse::<usize>().map_err(|_| ConfigError::InvalidValue {
                section: "install",
                key: "workers",
                value: v.clone(),
            })?),
            None => None,
        };

        let resume = match get("install", "resume") {
            Some(v) => Some(parse_bool(&v).ok_or(ConfigError::InvalidValue {
                section: "install",
                key: "resume",
                value: v.clone(),
            })?),
            None => None,
        };

        Ok(Self {
            install_root: get("install", "root").map(PathBuf::from),
            bundle_root: get("install", "bundle_root").map(PathBuf::from),
            workers,
            resume,
            hf_token: get("huggingface", "token"),
            hub_endpoint: get("huggingface", "endpoint"),
            python: get("python", "executable").map(PathBuf::from),
            log_file: get("logging", "file").map(PathBuf::from),
            log_level: get("logging", "level"),
        })
    }

    /// Fill `config` from file values.
    ///
    /// The file is the lowest layer above built-in defaults, so a token
    /// already present (from the environment) is kept.
    pub fn apply_to(&self, mut config: EngineConfig) -> EngineConfig {
        if let Some(root) = &self.bundle_root {
            config.bundle_root = Some(root.clone());
        }
        if let Some(workers) = self.workers {
            config = config.with_max_workers(workers);
        }
        if let Some(resume) = self.resume {
            config.resume_downloads = resume;
        }
        if config.hf_token.is_none() {
            config.hf_token = self.hf_token.as_deref().map(HfToken::new_unchecked);
        }
        if let Some(endpoint) = &self.hub_endpoint {
            config = config.with_hub_endpoint(endpoint.as_str());
        }
        if let Some(python) = &self.python {
            config.python_executable = python.clone();
        }
        config
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
