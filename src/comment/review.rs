use crate::config::ReviewConfig;
use crate::error::ReviewError;
use serde::Deserialize;
use std::io::Read;
use std::time::Duration;

/// Looks up the long description attached to a review request
pub trait ReviewTracker {
    fn fetch_description(&self, review_id: u64) -> Result<String, ReviewError>;
}

#[derive(Debug, Deserialize)]
struct ReviewResponse {
    review_request: ReviewRequest,
}

#[derive(Debug, Deserialize)]
struct ReviewRequest {
    #[serde(default)]
    description: String,
}

/// Blocking client for the review board REST API
pub struct ReviewBoardClient {
    agent: ureq::Agent,
    api_url: String,
}

impl ReviewBoardClient {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            api_url: api_url.into(),
        }
    }

    pub fn from_config(config: &ReviewConfig) -> Self {
        Self::new(
            config.api_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn request_url(&self, review_id: u64) -> String {
        format!("{}{}", self.api_url, review_id)
    }
}

impl ReviewTracker for ReviewBoardClient {
    fn fetch_description(&self, review_id: u64) -> Result<String, ReviewError> {
        let url = self.request_url(review_id);
        let request_failed = |reason: String| ReviewError::RequestFailed {
            url: url.clone(),
            reason,
        };

        let resp = self
            .agent
            .get(&url)
            .set("User-Agent", "history-replay")
            .set("Accept", "application/json")
            .call()
            .map_err(|e| request_failed(e.to_string()))?;

        let mut body = String::new();
        resp.into_reader()
            .read_to_string(&mut body)
            .map_err(|e| request_failed(format!("failed to read body: {e}")))?;

        parse_description(&body)
    }
}

/// Extract `review_request.description` from a review board response body
pub fn parse_description(body: &str) -> Result<String, ReviewError> {
    serde_json::from_str::<ReviewResponse>(body)
        .map(|r| r.review_request.description)
        .map_err(|e| ReviewError::InvalidResponse(e.to_string()))
}
