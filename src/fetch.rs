use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use url::Url;

use crate::error::ManifestError;

#[derive(Debug, Clone, Serialize)]
pub struct ProbeInfo {
    pub url: String,
    pub status: u16,
    pub ok: bool,
    pub content_length: Option<u64>,
}

pub trait ManifestClient: Send + Sync {
    /// Downloads a manifest document to `destination` and returns its bytes.
    fn fetch_manifest(&self, url: &Url, destination: &Path) -> Result<Vec<u8>, ManifestError>;

    /// HEAD-probes a source URL without downloading its payload.
    fn probe(&self, url: &Url) -> Result<ProbeInfo, ManifestError>;
}

#[derive(Clone)]
pub struct ManifestHttpClient {
    client: Client,
}

impl ManifestHttpClient {
    pub fn new() -> Result<Self, ManifestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("biokb/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ManifestError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| ManifestError::Http(err.to_string()))?;
        Ok(Self { client })
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, ManifestError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "manifest request failed".to_string());
        Err(ManifestError::HttpStatus { status, message })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, ManifestError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(ManifestError::Http(err.to_string()));
                }
            }
        }
    }
}

impl ManifestClient for ManifestHttpClient {
    fn fetch_manifest(&self, url: &Url, destination: &Path) -> Result<Vec<u8>, ManifestError> {
        let response = self.send_with_retries(|| self.client.get(url.as_str()))?;
        let response = Self::handle_status(response)?;
        let bytes = response
            .bytes()
            .map_err(|err| ManifestError::Http(err.to_string()))?;

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| ManifestError::Filesystem(err.to_string()))?;
        }
        let mut file = File::create(destination)
            .map_err(|err| ManifestError::Filesystem(err.to_string()))?;
        file.write_all(&bytes)
            .map_err(|err| ManifestError::Filesystem(err.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn probe(&self, url: &Url) -> Result<ProbeInfo, ManifestError> {
        let response = self.send_with_retries(|| self.client.head(url.as_str()))?;
        let status = response.status().as_u16();
        Ok(ProbeInfo {
            url: url.to_string(),
            status,
            ok: response.status().is_success(),
            content_length: response.content_length(),
        })
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
