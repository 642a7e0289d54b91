/// Directory search client
use crate::{
    config::DirectoryConfig,
    directory::SearchOutcome,
    error::{LinkError, LinkResult},
    hash::HashKind,
};
use async_trait::async_trait;
use serde_json::Value;

/// Search seam between the resolver and the remote directory.
///
/// A trait so tests can script outcomes without a live backend.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Issue one search scoped to a single identifier hash.
    async fn search_by_identifier(&self, kind: HashKind, hash: &str) -> LinkResult<SearchOutcome>;
}

/// HTTP client for the remote patient directory.
pub struct HttpDirectoryClient {
    http_client: reqwest::Client,
    config: DirectoryConfig,
}

impl HttpDirectoryClient {
    pub fn new(config: DirectoryConfig) -> LinkResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LinkError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client, config })
    }

    /// Build the search URL, passing the identifier as a single URL-encoded
    /// `system|hash` token.
    fn search_url(&self, kind: HashKind, hash: &str) -> String {
        let system = match kind {
            HashKind::Primary => &self.config.primary_system,
            HashKind::Fallback => &self.config.fallback_system,
        };
        let token = format!("{}|{}", system, hash);
        format!(
            "{}/Patient/?identifier={}&_format=json",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(&token)
        )
    }

    /// Classify a well-formed directory response.
    ///
    /// Order matters: duplication is checked before the single-match case so
    /// an over-full result can never be mistaken for a match, and anything
    /// else is a legitimate empty result.
    fn classify(&self, body: &Value) -> SearchOutcome {
        let total = body
            .get(&self.config.total_field)
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let entries = body.get(&self.config.entry_field).and_then(Value::as_array);
        let entry_count = entries.map(Vec::len).unwrap_or(0);

        if total > 1 {
            return SearchOutcome::Ambiguous {
                detail: "duplicate records in declared result total".to_string(),
            };
        }
        if entry_count > 1 {
            return SearchOutcome::Ambiguous {
                detail: "duplicate records in result entries".to_string(),
            };
        }

        if total == 1 && entry_count == 1 {
            let record_id = entries
                .and_then(|e| e.first())
                .and_then(|entry| entry.get(&self.config.resource_field))
                .and_then(|resource| resource.get(&self.config.id_field))
                .and_then(Value::as_str)
                .unwrap_or("");
            if !record_id.is_empty() {
                return SearchOutcome::SingleMatch {
                    record_id: record_id.to_string(),
                };
            }
        }

        SearchOutcome::NoMatch
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    async fn search_by_identifier(&self, kind: HashKind, hash: &str) -> LinkResult<SearchOutcome> {
        let url = self.search_url(kind, hash);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| LinkError::Transport(format!("directory request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(LinkError::Transport(format!(
                "directory returned {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| LinkError::Transport(format!("malformed directory response: {}", e)))?;

        Ok(self.classify(&body))
    }
}
