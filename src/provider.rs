use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{RagError, Result};

/// Blocking client for an OpenAI-compatible model provider.
#[derive(Clone)]
pub struct ProviderClient {
    client: HttpClient,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl ProviderClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// POSTs `body` as JSON to `{base_url}/{endpoint}` and decodes the reply.
    pub fn post_json<B, R>(&self, endpoint: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| RagError::Config(format!("invalid API key header: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);

        let response = self.client.post(url).headers(headers).json(body).send()?;
        if !response.status().is_success() {
            let status = response.status();
            let body: ErrorResponse = response.json().unwrap_or_else(|_| ErrorResponse {
                error: ErrorBody {
                    message: "unknown error".to_string(),
                },
            });
            return Err(RagError::Upstream(format!(
                "{} failed ({}): {}",
                endpoint, status, body.error.message
            )));
        }
        Ok(response.json()?)
    }
}
