use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

/// Plex item type codes used by `/library/sections/{id}/all?type=`
pub const PLEX_TYPE_MOVIE: u8 = 1;
pub const PLEX_TYPE_EPISODE: u8 = 4;

/// Thin HTTP client for a single Plex Media Server.
///
/// Returns raw `MediaContainer` JSON; parsing into discovery rows lives in
/// `client.rs` so it can be tested without a server.
pub struct PlexHttpClient {
    client: Client,
    server_url: String,
}

impl PlexHttpClient {
    pub fn new(token: &str, server_url: &str) -> Result<Self> {
        let client = Client::builder()
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::ACCEPT,
                    reqwest::header::HeaderValue::from_static("application/json"),
                );
                headers.insert(
                    reqwest::header::HeaderName::from_static("x-plex-token"),
                    reqwest::header::HeaderValue::from_str(token)
                        .context("Invalid token format")?,
                );
                headers.insert(
                    reqwest::header::HeaderName::from_static("x-plex-client-identifier"),
                    reqwest::header::HeaderValue::from_static("watchmap"),
                );
                headers
            })
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn get_sections(&self) -> Result<Value> {
        let url = format!("{}/library/sections", self.server_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to get libraries")?
            .error_for_status()
            .context("Plex rejected library listing")?;

        response
            .json()
            .await
            .context("Failed to parse libraries response")
    }

    pub async fn get_section_page(
        &self,
        library_key: &str,
        item_type: u8,
        start: usize,
        size: usize,
    ) -> Result<Value> {
        let url = format!(
            "{}/library/sections/{}/all?type={}&includeGuids=1",
            self.server_url, library_key, item_type
        );
        debug!("Plex: fetching section {} page start={} size={}", library_key, start, size);
        let response = self
            .client
            .get(&url)
            .header("X-Plex-Container-Start", start.to_string())
            .header("X-Plex-Container-Size", size.to_string())
            .send()
            .await
            .context("Failed to get library page")?
            .error_for_status()
            .context("Plex rejected library page request")?;

        response
            .json()
            .await
            .context("Failed to parse library page response")
    }

    /// Returns `None` when the server answers 404 for the key
    pub async fn get_metadata_item(&self, rating_key: &str) -> Result<Option<Value>> {
        // Accept both "123" and "/library/metadata/123"
        let id = rating_key
            .trim_start_matches("/library/metadata/")
            .trim();

        let url = format!("{}/library/metadata/{}?includeGuids=1", self.server_url, id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to get metadata item")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let json = response
            .error_for_status()
            .context("Plex rejected metadata request")?
            .json()
            .await
            .context("Failed to parse metadata item response")?;
        Ok(Some(json))
    }
}
