//! Strategy selection
//!
//! A [`PolicyTable`] is an ordered list of [`CacheRule`]s; the first rule
//! whose matcher accepts the URL decides the [`Strategy`]. URLs no rule
//! accepts (or that do not parse) get the table's default.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{parse_url, InterceptConfig};
use crate::error::Result;

/// How a request class is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Cached copy first, refreshed in the background; placeholder when
    /// neither cache nor network can answer
    CacheFirstWithRefresh,
    /// Network first, falling back to the last cached response
    NetworkFirst,
    /// Cached copy first, network on miss
    CacheFirst,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::CacheFirstWithRefresh => "cache_first_with_refresh",
            Strategy::NetworkFirst => "network_first",
            Strategy::CacheFirst => "cache_first",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlMatcher {
    /// Same scheme, host and port
    Origin(String),
    /// Last path segment ends with one of these extensions (case-insensitive)
    PathExtension(Vec<String>),
    PathContains(String),
    AnyOf(Vec<UrlMatcher>),
}

impl UrlMatcher {
    /// Origin matcher normalized from any URL on that origin.
    pub fn origin(raw: &str) -> Result<Self> {
        Ok(UrlMatcher::Origin(parse_url(raw)?.origin().ascii_serialization()))
    }

    pub fn matches(&self, url: &Url) -> bool {
        match self {
            UrlMatcher::Origin(origin) => url.origin().ascii_serialization() == *origin,
            UrlMatcher::PathExtension(extensions) => {
                let last = url.path().rsplit('/').next().unwrap_or_default();
                match last.rsplit_once('.') {
                    Some((_, ext)) => extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)),
                    None => false,
                }
            }
            UrlMatcher::PathContains(fragment) => url.path().contains(fragment.as_str()),
            UrlMatcher::AnyOf(matchers) => matchers.iter().any(|m| m.matches(url)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRule {
    pub matcher: UrlMatcher,
    pub strategy: Strategy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    rules: Vec<CacheRule>,
    default: Strategy,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::new(Strategy::CacheFirst)
    }
}

impl PolicyTable {
    pub fn new(default: Strategy) -> Self {
        Self {
            rules: Vec::new(),
            default,
        }
    }

    pub fn with_rule(mut self, matcher: UrlMatcher, strategy: Strategy) -> Self {
        self.rules.push(CacheRule { matcher, strategy });
        self
    }

    /// Standard table: images and media origins, then the data API, then
    /// cache-first for everything else.
    pub fn from_config(config: &InterceptConfig) -> Result<Self> {
        let mut table = Self::default().with_rule(
            UrlMatcher::PathExtension(config.image_extensions.clone()),
            Strategy::CacheFirstWithRefresh,
        );

        for marker in &config.image_path_markers {
            table = table.with_rule(
                UrlMatcher::PathContains(marker.clone()),
                Strategy::CacheFirstWithRefresh,
            );
        }

        if !config.media_origins.is_empty() {
            let origins = config
                .media_origins
                .iter()
                .map(|o| UrlMatcher::origin(o))
                .collect::<Result<Vec<_>>>()?;
            table = table.with_rule(UrlMatcher::AnyOf(origins), Strategy::CacheFirstWithRefresh);
        }

        for origin in &config.api_origins {
            table = table.with_rule(UrlMatcher::origin(origin)?, Strategy::NetworkFirst);
        }

        Ok(table)
    }

    pub fn rules(&self) -> &[CacheRule] {
        &self.rules
    }

    pub fn classify(&self, raw_url: &str) -> Strategy {
        let Ok(url) = Url::parse(raw_url) else {
            return self.default;
        };

        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(&url))
            .map(|rule| rule.strategy)
            .unwrap_or(self.default)
    }
}
