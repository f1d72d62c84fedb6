//! Human-readable pre-download summary.

use std::fmt;

use super::status::StatusMap;
use crate::manifest::{ManifestDocument, SourceKind};

const RULE: &str = "============================================================";

/// What a run is about to do, built from the cached status map.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadSummary {
    pub package_name: String,
    pub package_version: Option<String>,
    pub description: Option<String>,
    pub details: Option<String>,
    pub estimated_time: Option<String>,
    pub tags: Vec<String>,
    pub total_items: usize,
    pub bundled: usize,
    pub already_exist: usize,
    pub to_download: usize,
    pub partial_downloads: usize,
    pub total_download_size_mb: f64,
    /// Gated items that still need downloading.
    pub gated_items: Vec<String>,
    pub token_present: bool,
}

impl DownloadSummary {
    pub(crate) fn build(manifest: &ManifestDocument, status: &StatusMap, token_present: bool) -> Self {
        let needs = |name: &str| status.get(name).is_some_and(|s| s.needs_download);

        let total_download_size_mb = manifest.metadata.total_size_mb.unwrap_or_else(|| {
            manifest
                .items
                .iter()
                .filter(|i| i.source != SourceKind::Bundled && needs(&i.name))
                .filter_map(|i| i.size_mb)
                .sum()
        });

        Self {
            package_name: manifest.package_name().to_string(),
            package_version: manifest.package.version.clone(),
            description: manifest.package.description.clone(),
            details: manifest.metadata.details.clone(),
            estimated_time: manifest.metadata.estimated_time.clone(),
            tags: manifest.metadata.tags.clone(),
            total_items: manifest.items.len(),
            bundled: manifest
                .items
                .iter()
                .filter(|i| i.source == SourceKind::Bundled)
                .count(),
            already_exist: status.values().filter(|s| !s.needs_download).count(),
            to_download: status.values().filter(|s| s.needs_download).count(),
            partial_downloads: status.values().filter(|s| s.partial_exists).count(),
            total_download_size_mb,
            gated_items: manifest
                .items
                .iter()
                .filter(|i| i.gated && needs(&i.name))
                .map(|i| i.name.clone())
                .collect(),
            token_present,
        }
    }
}

impl fmt::Display for DownloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", RULE)?;
        writeln!(f, "MANIFEST DOWNLOAD SUMMARY")?;
        writeln!(f, "{}", RULE)?;
        writeln!(
            f,
            "Package: {} v{}",
            self.package_name,
            self.package_version.as_deref().unwrap_or("?")
        )?;
        writeln!(f, "Description: {}", self.description.as_deref().unwrap_or("N/A"))?;
        if let Some(details) = &self.details {
            writeln!(f, "Details: {}", details)?;
        }

        writeln!(f)?;
        writeln!(f, "Total items: {}", self.total_items)?;
        writeln!(f, "  Bundled in archive: {}", self.bundled)?;
        writeln!(f, "  Already exist: {}", self.already_exist)?;
        writeln!(f, "  To download: {}", self.to_download)?;
        if self.partial_downloads > 0 {
            writeln!(f, "  Partial downloads: {} (can be resumed)", self.partial_downloads)?;
        }
        writeln!(f, "Total download size: {:.1} MB", self.total_download_size_mb)?;
        if let Some(eta) = &self.estimated_time {
            writeln!(f, "Estimated time: {}", eta)?;
        }

        if !self.gated_items.is_empty() {
            writeln!(f)?;
            writeln!(f, "Gated models (require license acceptance):")?;
            for name in &self.gated_items {
                writeln!(f, "  - {}", name)?;
            }
            if !self.token_present {
                writeln!(f)?;
                writeln!(f, "  Set HF_TOKEN environment variable to download gated models")?;
            }
        }

        if !self.tags.is_empty() {
            writeln!(f)?;
            writeln!(f, "Tags: {}", self.tags.join(", "))?;
        }

        write!(f, "{}", RULE)
    }
}
