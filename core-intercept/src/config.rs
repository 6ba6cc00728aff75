//! Interception layer configuration

use url::Url;

use crate::error::{InterceptError, Result};

/// Default key-value prefix for cached responses
pub const DEFAULT_CACHE_PREFIX: &str = "intercept.cache";

/// Critical paths fetched into every new generation before it serves traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecacheManifest {
    pub entry_document: String,
    pub entry_script: String,
    /// Image served when an image request fails with nothing cached
    pub fallback_image: Option<String>,
    pub additional_paths: Vec<String>,
}

impl Default for PrecacheManifest {
    fn default() -> Self {
        Self {
            entry_document: "/".to_string(),
            entry_script: "/assets/index.js".to_string(),
            fallback_image: Some("/placeholder.svg".to_string()),
            additional_paths: Vec::new(),
        }
    }
}

impl PrecacheManifest {
    pub fn paths(&self) -> Vec<&str> {
        let mut paths = vec![self.entry_document.as_str(), self.entry_script.as_str()];
        if let Some(image) = &self.fallback_image {
            paths.push(image.as_str());
        }
        paths.extend(self.additional_paths.iter().map(String::as_str));
        paths
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptConfig {
    /// Cache generation; bumping it discards every older entry on activation
    pub generation: String,

    /// Origin the manifest paths are resolved against
    pub app_origin: String,

    /// Data backend origins, served network-first
    pub api_origins: Vec<String>,

    /// Media/CDN origins, served cache-first with background refresh
    pub media_origins: Vec<String>,

    /// Path extensions treated as images (lowercase, no dot)
    pub image_extensions: Vec<String>,

    /// Path fragments marking image endpoints without an extension
    pub image_path_markers: Vec<String>,

    pub manifest: PrecacheManifest,

    /// Refresh cache hits of image/media requests in the background
    pub background_refresh: bool,

    pub cache_prefix: String,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            generation: "v1".to_string(),
            app_origin: "http://localhost".to_string(),
            api_origins: Vec::new(),
            media_origins: Vec::new(),
            image_extensions: ["png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "ico"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            image_path_markers: vec!["/posters/".to_string(), "/render/image/".to_string()],
            manifest: PrecacheManifest::default(),
            background_refresh: true,
            cache_prefix: DEFAULT_CACHE_PREFIX.to_string(),
        }
    }
}

impl InterceptConfig {
    pub fn new(generation: impl Into<String>, app_origin: impl Into<String>) -> Self {
        Self {
            generation: generation.into(),
            app_origin: app_origin.into(),
            ..Self::default()
        }
    }

    pub fn with_generation(mut self, generation: impl Into<String>) -> Self {
        self.generation = generation.into();
        self
    }

    pub fn with_api_origin(mut self, origin: impl Into<String>) -> Self {
        self.api_origins.push(origin.into());
        self
    }

    pub fn with_media_origin(mut self, origin: impl Into<String>) -> Self {
        self.media_origins.push(origin.into());
        self
    }

    pub fn with_image_extensions(mut self, extensions: Vec<String>) -> Self {
        self.image_extensions = extensions;
        self
    }

    pub fn with_manifest(mut self, manifest: PrecacheManifest) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn with_background_refresh(mut self, enabled: bool) -> Self {
        self.background_refresh = enabled;
        self
    }

    pub fn with_cache_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cache_prefix = prefix.into();
        self
    }

    /// Absolute URL of a manifest path.
    pub fn resolve_path(&self, path: &str) -> Result<String> {
        let base = parse_url(&self.app_origin)?;
        base.join(path)
            .map(|url| url.to_string())
            .map_err(|e| InterceptError::InvalidUrl {
                url: path.to_string(),
                message: e.to_string(),
            })
    }

    pub fn validate(&self) -> Result<()> {
        if self.generation.is_empty() || self.generation.contains(':') {
            return Err(InterceptError::Config(
                "generation must be non-empty and must not contain ':'".to_string(),
            ));
        }

        if self.cache_prefix.is_empty() || self.cache_prefix.contains(':') {
            return Err(InterceptError::Config(
                "cache_prefix must be non-empty and must not contain ':'".to_string(),
            ));
        }

        parse_url(&self.app_origin)?;
        for origin in self.api_origins.iter().chain(self.media_origins.iter()) {
            parse_url(origin)?;
        }

        for path in self.manifest.paths() {
            self.resolve_path(path)?;
        }

        Ok(())
    }
}

pub(crate) fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| InterceptError::InvalidUrl {
        url: raw.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = InterceptConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.background_refresh);
        assert_eq!(config.manifest.paths(), vec!["/", "/assets/index.js", "/placeholder.svg"]);
    }

    #[test]
    fn test_resolve_manifest_paths() {
        let config = InterceptConfig::new("v2", "https://app.example.com");
        assert_eq!(
            config.resolve_path("/assets/index.js").unwrap(),
            "https://app.example.com/assets/index.js"
        );
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(InterceptConfig::default().with_generation("").validate().is_err());
        assert!(InterceptConfig::default().with_generation("a:b").validate().is_err());
        assert!(InterceptConfig::default()
            .with_api_origin("not a url")
            .validate()
            .is_err());
        assert!(InterceptConfig::default().with_cache_prefix("").validate().is_err());
    }
}
