//! Metadata resolver
//!
//! Ordered fallback chain over external normalization services. Each service
//! receives the original filename plus any embedded artist/title and answers
//! either "use as is" or a cleaned artist/title.
//!
//! Service faults (timeout, network, malformed body) count as "no answer":
//! the chain moves on and never fails outward.

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tunesort_common::config::ServiceConfig;
use tunesort_common::normalize::{primary_artist, split_artists};

const USER_AGENT: &str = concat!("tunesort/", env!("CARGO_PKG_VERSION"));

/// Normalization service errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Service error {0}: {1}")]
    Status(u16, String),

    /// Body was not one of the accepted response shapes
    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Request body sent to a normalization service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizeRequest {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl NormalizeRequest {
    pub fn new(filename: impl Into<String>, artist: Option<String>, title: Option<String>) -> Self {
        Self {
            filename: filename.into(),
            artist,
            title,
        }
    }

    fn has_artist_and_title(&self) -> bool {
        self.artist.as_deref().is_some_and(|a| !a.trim().is_empty())
            && self.title.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

/// Collaborator list, sent either as a JSON list or a `;`-separated string
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ArtistList {
    Many(Vec<String>),
    One(String),
}

impl ArtistList {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            ArtistList::Many(list) => list
                .iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
            ArtistList::One(joined) => split_artists(joined),
        }
    }
}

/// Response body of a normalization service
///
/// `{"use_as_is": true}` or
/// `{"use_as_is": false, "artist": "...", "artists": [...] | "...", "title": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NormalizeResponse {
    pub use_as_is: bool,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub artists: Option<ArtistList>,
    #[serde(default)]
    pub title: Option<String>,
}

impl NormalizeResponse {
    pub fn use_as_is() -> Self {
        Self {
            use_as_is: true,
            artist: None,
            artists: None,
            title: None,
        }
    }

    pub fn resolved(artist: &str, artists: &str, title: &str) -> Self {
        Self {
            use_as_is: false,
            artist: Some(artist.to_string()),
            artists: Some(ArtistList::One(artists.to_string())),
            title: Some(title.to_string()),
        }
    }
}

/// Outcome of the resolver chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionResult {
    /// Embedded artist/title are already canonical
    UseAsIs,
    /// Cleaned values from a service
    Resolved {
        /// Artist field as returned; its first `;` token is the primary artist
        artist: String,
        /// Full collaborator list, primary artist first
        artists: Vec<String>,
        title: String,
    },
    Unresolved,
}

/// One external normalization service
#[async_trait]
pub trait NormalizationService: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn normalize(&self, request: &NormalizeRequest) -> Result<NormalizeResponse, ServiceError>;
}

/// HTTP/JSON normalization service
///
/// The HTTP client is only built on the first call.
pub struct HttpNormalizationService {
    name: String,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
    http_client: OnceCell<reqwest::Client>,
}

impl HttpNormalizationService {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            name: config.name.clone(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            timeout: Duration::from_secs(config.timeout_secs),
            http_client: OnceCell::new(),
        }
    }

    fn client(&self) -> Result<&reqwest::Client, ServiceError> {
        self.http_client.get_or_try_init(|| {
            tracing::debug!(service = %self.name, "Building HTTP client");
            reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(self.timeout)
                .build()
                .map_err(|e| ServiceError::Network(e.to_string()))
        })
    }

    /// Whether the HTTP client has been constructed yet
    pub fn is_connected(&self) -> bool {
        self.http_client.get().is_some()
    }
}

#[async_trait]
impl NormalizationService for HttpNormalizationService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn normalize(&self, request: &NormalizeRequest) -> Result<NormalizeResponse, ServiceError> {
        let mut builder = self.client()?.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        tracing::debug!(service = %self.name, endpoint = %self.endpoint, filename = %request.filename, "Querying normalization service");

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ServiceError::Timeout(self.timeout)
            } else {
                ServiceError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status(status.as_u16(), error_text));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        serde_json::from_str(&body).map_err(|e| ServiceError::Malformed(e.to_string()))
    }
}

struct ChainEntry {
    service: Arc<dyn NormalizationService>,
    timeout: Duration,
}

/// Resolver chain over the enabled services, in configured order
pub struct MetadataResolver {
    chain: Vec<ChainEntry>,
    calls: AtomicUsize,
}

impl MetadataResolver {
    /// Build the chain from configuration; disabled services are never constructed
    pub fn from_config(services: &[ServiceConfig]) -> Self {
        let chain = services
            .iter()
            .filter(|s| s.enabled)
            .map(|s| ChainEntry {
                service: Arc::new(HttpNormalizationService::new(s)) as Arc<dyn NormalizationService>,
                timeout: Duration::from_secs(s.timeout_secs),
            })
            .collect();

        Self::from_chain(chain)
    }

    /// Build the chain from ready services and their per-call timeouts
    pub fn with_services(services: Vec<(Arc<dyn NormalizationService>, Duration)>) -> Self {
        let chain = services
            .into_iter()
            .map(|(service, timeout)| ChainEntry { service, timeout })
            .collect();

        Self::from_chain(chain)
    }

    fn from_chain(chain: Vec<ChainEntry>) -> Self {
        Self {
            chain,
            calls: AtomicUsize::new(0),
        }
    }

    /// Chain with no services
    pub fn empty() -> Self {
        Self::from_chain(Vec::new())
    }

    pub fn service_count(&self) -> usize {
        self.chain.len()
    }

    /// Service calls attempted so far, successful or not
    pub fn calls_made(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Run the fallback chain
    ///
    /// With no services, complete embedded tags are kept as is; otherwise
    /// services are asked in order until one gives a usable answer.
    pub async fn resolve(&self, request: &NormalizeRequest) -> ResolutionResult {
        let has_embedded = request.has_artist_and_title();

        if self.chain.is_empty() {
            return if has_embedded {
                ResolutionResult::UseAsIs
            } else {
                ResolutionResult::Unresolved
            };
        }

        for entry in &self.chain {
            let name = entry.service.name();
            self.calls.fetch_add(1, Ordering::Relaxed);

            let response =
                match tokio::time::timeout(entry.timeout, entry.service.normalize(request)).await {
                    Ok(Ok(response)) => response,
                    Ok(Err(e)) => {
                        tracing::warn!(service = %name, filename = %request.filename, error = %e, "Normalization service failed");
                        continue;
                    }
                    Err(_) => {
                        tracing::warn!(service = %name, filename = %request.filename, timeout = ?entry.timeout, "Normalization service timed out");
                        continue;
                    }
                };

            match interpret(response, has_embedded) {
                Some(result) => {
                    tracing::debug!(service = %name, result = ?result, "Resolved");
                    return result;
                }
                None => {
                    tracing::debug!(service = %name, filename = %request.filename, "No decision, trying next service");
                }
            }
        }

        ResolutionResult::Unresolved
    }
}

/// Turn a well-formed response into a decision, if it carries one
fn interpret(response: NormalizeResponse, has_embedded: bool) -> Option<ResolutionResult> {
    if response.use_as_is {
        // Nothing to keep when the file has no embedded pair
        return has_embedded.then_some(ResolutionResult::UseAsIs);
    }

    let artist = response.artist.map(|a| a.trim().to_string()).filter(|a| !a.is_empty())?;
    let title = response.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;
    let primary = primary_artist(&artist)?.to_string();

    let mut artists = match response.artists {
        Some(list) => list.to_vec(),
        None => split_artists(&artist),
    };
    if artists.first() != Some(&primary) {
        artists.retain(|a| a != &primary);
        artists.insert(0, primary);
    }

    Some(ResolutionResult::Resolved {
        artist,
        artists,
        title,
    })
}
