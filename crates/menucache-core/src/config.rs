//! Agent configuration.
//!
//! Partition names, the data-resource marker, and the precache list are
//! fixed when the agent is constructed. Changing a partition name is how a
//! new cache version is rolled out: the next activation sweeps the old one.
//!
//! Configuration can be kept as JSON alongside the app; every field is
//! optional and falls back to the defaults below.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result as AnyResult};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Application name used for the default storage directory
const APP_NAME: &str = "menucache";

pub const DEFAULT_STATIC_CACHE_NAME: &str = "menu-elegante-cache-v1";
pub const DEFAULT_DATA_CACHE_NAME: &str = "menu-data-cache-v1";
pub const DEFAULT_DATA_PATH_MARKER: &str = "/menu-data.json";
pub const DEFAULT_ORIGIN: &str = "http://localhost/";

/// App shell plus the cross-origin font and placeholder images the menu
/// renders while offline.
pub const DEFAULT_PRECACHE_URLS: &[&str] = &[
    "/",
    "/index.html",
    "https://fonts.googleapis.com/css2?family=Inter:wght@400;500;600;700&display=swap",
    "https://placehold.co/192x192/2C3E50/EAEAEA?text=M",
    "https://placehold.co/512x512/2C3E50/EAEAEA?text=M",
    "https://placehold.co/80x80/FF6347/fff?text=H",
    "https://placehold.co/80x80/FFA07A/fff?text=P",
    "https://placehold.co/80x80/DAA520/fff?text=T",
    "https://placehold.co/80x80/9ACD32/fff?text=E",
    "https://placehold.co/80x80/20B2AA/fff?text=J",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub static_cache_name: String,
    pub data_cache_name: String,
    /// Requests whose URL contains this string are served network-first.
    pub data_path_marker: String,
    /// Base against which relative precache URLs are resolved.
    pub origin: String,
    pub precache_urls: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            static_cache_name: DEFAULT_STATIC_CACHE_NAME.to_string(),
            data_cache_name: DEFAULT_DATA_CACHE_NAME.to_string(),
            data_path_marker: DEFAULT_DATA_PATH_MARKER.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            precache_urls: DEFAULT_PRECACHE_URLS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AgentConfig {
    pub fn load(path: &Path) -> AnyResult<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Self = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> AnyResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn with_precache_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.precache_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cache_names(mut self, static_name: &str, data_name: &str) -> Self {
        self.static_cache_name = static_name.to_string();
        self.data_cache_name = data_name.to_string();
        self
    }

    /// Partition names that survive the activation sweep.
    pub fn whitelist(&self) -> [&str; 2] {
        [self.static_cache_name.as_str(), self.data_cache_name.as_str()]
    }

    pub fn is_whitelisted(&self, name: &str) -> bool {
        self.whitelist().contains(&name)
    }

    /// Resolve a possibly-relative URL against the configured origin.
    pub fn resolve(&self, url: &str) -> Result<Url> {
        let base = Url::parse(&self.origin).map_err(|e| CacheError::InvalidUrl {
            url: self.origin.clone(),
            reason: e.to_string(),
        })?;
        base.join(url).map_err(|e| CacheError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.static_cache_name.is_empty() || self.data_cache_name.is_empty() {
            return Err(CacheError::Config("cache names must not be empty".to_string()));
        }
        if self.static_cache_name == self.data_cache_name {
            return Err(CacheError::Config(format!(
                "static and data caches share the name {:?}",
                self.static_cache_name
            )));
        }
        if self.data_path_marker.is_empty() {
            return Err(CacheError::Config("data path marker must not be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for url in &self.precache_urls {
            let resolved = self.resolve(url)?;
            if !seen.insert(resolved.to_string()) {
                return Err(CacheError::Config(format!(
                    "precache list contains {} more than once",
                    resolved
                )));
            }
        }
        Ok(())
    }

    /// Default location for [`crate::storage::FileStorage`].
    pub fn default_storage_dir() -> AnyResult<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.precache_urls.len(), 10);
        assert_eq!(
            config.whitelist(),
            ["menu-elegante-cache-v1", "menu-data-cache-v1"]
        );
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let config = AgentConfig::default().with_origin("https://menu.example/");
        assert_eq!(
            config.resolve("/index.html").unwrap().as_str(),
            "https://menu.example/index.html"
        );
        assert_eq!(
            config.resolve("https://placehold.co/80x80?text=H").unwrap().as_str(),
            "https://placehold.co/80x80?text=H"
        );
    }

    #[test]
    fn test_validate_rejects_duplicate_precache_entries() {
        let config = AgentConfig::default()
            .with_origin("https://menu.example/")
            .with_precache_urls(["/index.html", "https://menu.example/index.html"]);
        assert!(matches!(config.validate(), Err(CacheError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_shared_names() {
        let config = AgentConfig::default().with_cache_names("menu-v1", "menu-v1");
        assert!(matches!(config.validate(), Err(CacheError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_origin() {
        let config = AgentConfig::default().with_origin("not a url");
        assert!(matches!(config.validate(), Err(CacheError::InvalidUrl { .. })));
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("menucache.json");
        std::fs::write(&path, r#"{ "static_cache_name": "menu-elegante-cache-v2" }"#).unwrap();

        let config = AgentConfig::load(&path).unwrap();
        assert_eq!(config.static_cache_name, "menu-elegante-cache-v2");
        assert_eq!(config.data_cache_name, DEFAULT_DATA_CACHE_NAME);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AgentConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, AgentConfig::default());
    }

    #[test]
    fn test_default_storage_dir_is_app_scoped() {
        // Some CI environments have no cache directory at all.
        if let Ok(dir) = AgentConfig::default_storage_dir() {
            assert!(dir.ends_with(APP_NAME));
        }
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("menucache.json");
        let config = AgentConfig::default().with_precache_urls(["/"]);
        config.save(&path).unwrap();
        assert_eq!(AgentConfig::load(&path).unwrap(), config);
    }
}
