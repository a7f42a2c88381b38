//! Router configuration: version string, classification tables, and the
//! precache manifests. All of this is data owned by the surrounding
//! application, not computed here.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long an API fetch may run before the cached fallback wins
pub const API_TIMEOUT: Duration = Duration::from_secs(3);

/// Ordered lists of paths fetched and cached at install time.
///
/// Critical entries gate install completion (individual failures are
/// tolerated); secondary entries are warmed in the background.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecacheManifest {
    pub critical: Vec<String>,
    pub secondary: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Version string stamped into every cache generation name
    pub version: String,
    /// Origin used to resolve relative manifest paths
    pub origin: String,
    /// Hosts whose requests always take the API strategy
    pub api_hosts: Vec<String>,
    pub api_path_prefixes: Vec<String>,
    /// CDN hosts whose assets are treated as static
    pub cdn_hosts: Vec<String>,
    pub static_path_prefixes: Vec<String>,
    /// The app shell document, served as the last-resort navigation fallback
    pub shell_path: String,
    pub api_timeout: Duration,
    pub manifest: PrecacheManifest,
}

impl RouterConfig {
    #[must_use]
    pub fn new(version: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            origin: origin.into(),
            api_hosts: Vec::new(),
            api_path_prefixes: vec!["/api/".to_string()],
            cdn_hosts: Vec::new(),
            static_path_prefixes: vec![
                "/assets/".to_string(),
                "/css/".to_string(),
                "/js/".to_string(),
            ],
            shell_path: "/index.html".to_string(),
            api_timeout: API_TIMEOUT,
            manifest: PrecacheManifest::default(),
        }
    }
}
