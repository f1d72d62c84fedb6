//! Benchpack - manifest-driven resource acquisition for ComfyUI packages.
//!
//! A package ships a manifest listing the models, custom nodes, files,
//! runtime packages and applications it needs. This library brings an
//! install root into the state the manifest declares: it checks what is
//! already present, then fetches the rest from the Hugging Face hub, git,
//! plain URLs, local paths, the unpacked bundle, pip or winget.
//!
//! The entry point is [`Engine`]; see the [`engine`] module for the flow.

pub mod acquire;
pub mod checksum;
pub mod config;
pub mod credential;
pub mod engine;
pub mod logging;
pub mod manifest;
pub mod paths;
pub mod progress;
pub mod system;

pub use config::{ConfigFile, EngineConfig};
pub use credential::HfToken;
pub use engine::{
    DownloadOptions, DownloadReport, DownloadSummary, Engine, EngineError, EngineResult,
    FileStatus, InstalledItem, StatusReason,
};
pub use manifest::{Item, ManifestDocument, ManifestError};
