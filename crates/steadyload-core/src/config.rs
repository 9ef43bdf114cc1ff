use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::extract::JsonPaths;

/// Errors that reject a run before any attempt is issued.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one target URL is required")]
    NoTargets,

    #[error("rate limit must be greater than zero")]
    ZeroRate,

    #[error("total requests must be greater than zero")]
    ZeroRequests,

    #[error("POST method requires a JSON body template")]
    PostWithoutBody,

    #[error("invalid JSON path '{path}': {reason}")]
    InvalidJsonPath { path: String, reason: String },

    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// HTTP method of a run. Anything other than GET/POST is carried through
/// so the invoker can reject it per attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Other(String),
}

impl HttpMethod {
    pub fn as_str(&self) -> &str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Other(name) => name,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for HttpMethod {
    fn from(s: String) -> Self {
        if s.eq_ignore_ascii_case("GET") {
            HttpMethod::Get
        } else if s.eq_ignore_ascii_case("POST") {
            HttpMethod::Post
        } else {
            HttpMethod::Other(s)
        }
    }
}

impl From<HttpMethod> for String {
    fn from(m: HttpMethod) -> Self {
        m.as_str().to_string()
    }
}

impl FromStr for HttpMethod {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(HttpMethod::from(s.to_string()))
    }
}

/// Body template: top-level field name to literal or placeholder token.
pub type BodyTemplate = Map<String, Value>;

/// Immutable description of one load run.
///
/// `rate_limit` is used both as the issuance rate (requests per second) and as
/// the ceiling on attempts in flight at once. The two are intentionally
/// coupled.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub targets: Vec<String>,
    pub method: HttpMethod,
    pub body_template: Option<BodyTemplate>,
    pub json_paths: Vec<String>,
    pub rate_limit: u32,
    pub total_requests: u64,
    /// Per-request timeout. `None` leaves the transport default in place.
    pub timeout: Option<Duration>,
    /// Seed for reproducible body generation.
    pub seed: Option<u64>,
}

impl RunConfig {
    pub fn new(targets: Vec<String>, rate_limit: u32, total_requests: u64) -> Self {
        Self {
            targets,
            method: HttpMethod::Get,
            body_template: None,
            json_paths: Vec::new(),
            rate_limit,
            total_requests,
            timeout: None,
            seed: None,
        }
    }

    /// Check every run invariant and compile the JSON paths.
    pub fn validate(&self) -> Result<JsonPaths, ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        if self.rate_limit == 0 {
            return Err(ConfigError::ZeroRate);
        }
        if self.total_requests == 0 {
            return Err(ConfigError::ZeroRequests);
        }
        // An empty template materializes to no body at all.
        if self.method == HttpMethod::Post
            && self.body_template.as_ref().map_or(true, |t| t.is_empty())
        {
            return Err(ConfigError::PostWithoutBody);
        }
        JsonPaths::compile(&self.json_paths)
    }

    /// Target for the attempt with the given index.
    pub fn target_for(&self, index: u64) -> &str {
        &self.targets[(index % self.targets.len() as u64) as usize]
    }
}

/// On-disk run file. Every field is optional; callers merge it with CLI input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunFile {
    #[serde(default)]
    pub run: RunSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSection {
    #[serde(default)]
    pub targets: Vec<String>,
    pub method: Option<HttpMethod>,
    pub body_template: Option<BodyTemplate>,
    #[serde(default)]
    pub json_paths: Vec<String>,
    pub rate_limit: Option<u32>,
    pub total_requests: Option<u64>,
    /// Request timeout in milliseconds
    pub timeout_ms: Option<u64>,
    pub seed: Option<u64>,
}

impl RunFile {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }
}
