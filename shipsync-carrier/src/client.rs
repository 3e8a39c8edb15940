//! HTTP client for the carrier's tracking endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderName, ACCEPT};
use reqwest::Url;
use serde_json::Value;
use shipsync_core::{CarrierClient, TrackingError, TrackingStatus};
use tracing::{debug, warn};

use crate::extract::ExtractionChain;

/// Raw bodies are logged and carried in errors up to this many bytes.
const MAX_LOGGED_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpCarrierConfig {
    pub base_url: String,
    /// Path below `base_url`; `{tracking}` is replaced by the tracking number.
    pub tracking_path: String,
    pub api_token: String,
    pub token_header: String,
    pub timeout: Duration,
}

pub struct HttpCarrierClient {
    http: reqwest::Client,
    base_url: Url,
    tracking_path: String,
    token_header: HeaderName,
    api_token: String,
    extractors: ExtractionChain,
}

impl HttpCarrierClient {
    pub fn new(config: HttpCarrierConfig) -> Result<Self, TrackingError> {
        let http = reqwest::Client::builder()
            .user_agent(format!("shipsync/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| TrackingError::Transport(format!("failed to build HTTP client: {}", e)))?;

        let base_url = Url::parse(&config.base_url).map_err(|e| {
            TrackingError::Transport(format!("invalid carrier base url {}: {}", config.base_url, e))
        })?;

        let token_header =
            HeaderName::from_bytes(config.token_header.as_bytes()).map_err(|e| {
                TrackingError::Transport(format!(
                    "invalid token header {}: {}",
                    config.token_header, e
                ))
            })?;

        Ok(Self {
            http,
            base_url,
            tracking_path: config.tracking_path,
            token_header,
            api_token: config.api_token,
            extractors: ExtractionChain::default(),
        })
    }

    pub fn with_extractors(mut self, extractors: ExtractionChain) -> Self {
        self.extractors = extractors;
        self
    }

    fn url_for(&self, tracking_number: &str) -> Result<Url, TrackingError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                TrackingError::Transport(format!(
                    "carrier base url cannot be a base: {}",
                    self.base_url
                ))
            })?;
            segments.pop_if_empty();
            for part in self.tracking_path.split('/').filter(|p| !p.is_empty()) {
                if part == "{tracking}" {
                    segments.push(tracking_number);
                } else {
                    segments.push(part);
                }
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl CarrierClient for HttpCarrierClient {
    async fn fetch_status(&self, tracking_number: &str) -> Result<TrackingStatus, TrackingError> {
        let tracking_number = tracking_number.trim();
        if tracking_number.is_empty() {
            return Err(TrackingError::InvalidTrackingNumber);
        }

        let url = self.url_for(tracking_number)?;
        debug!(tracking_number, %url, "Fetching carrier status");

        let response = self
            .http
            .get(url)
            .header(&self.token_header, &self.api_token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                let err = transport_error(e);
                warn!(tracking_number, error = %err, "Carrier request failed");
                err
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            let err = transport_error(e);
            warn!(
                tracking_number,
                http_status = status.as_u16(),
                error = %err,
                "Failed to read carrier response"
            );
            err
        })?;

        if !status.is_success() {
            let body = truncate(&body);
            warn!(
                tracking_number,
                http_status = status.as_u16(),
                body = %body,
                "Carrier returned an error response"
            );
            return Err(TrackingError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = serde_json::from_str(&body).map_err(|e| {
            warn!(
                tracking_number,
                error = %e,
                body = %truncate(&body),
                "Carrier response is not valid JSON"
            );
            TrackingError::Parse(e.to_string())
        })?;

        match self.extractors.extract(&value) {
            Some(latest) => {
                debug!(tracking_number, status = %latest, "Carrier status received");
                Ok(TrackingStatus::Latest(latest))
            }
            None => {
                debug!(
                    tracking_number,
                    body = %truncate(&body),
                    "Carrier response carried no status"
                );
                Ok(TrackingStatus::NoData)
            }
        }
    }
}

fn transport_error(e: reqwest::Error) -> TrackingError {
    if e.is_timeout() {
        TrackingError::Timeout(e.to_string())
    } else {
        TrackingError::Transport(e.to_string())
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_LOGGED_BODY {
        return body.to_string();
    }
    let mut end = MAX_LOGGED_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
