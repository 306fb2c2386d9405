use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::Lang;
use crate::error::PreloadError;

/// Remote speech synthesis: one phrase in, one binary audio payload out.
pub trait SpeechClient: Send + Sync {
    fn synthesize(&self, text: &str, lang: Lang) -> Result<Vec<u8>, PreloadError>;
}

#[derive(Clone)]
pub struct SpeechHttpClient {
    client: Client,
    endpoint: String,
}

impl SpeechHttpClient {
    pub fn new(endpoint: &str) -> Result<Self, PreloadError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("viltrum-offline/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PreloadError::SpeechHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| PreloadError::SpeechHttp(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, PreloadError>
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
                    return Err(PreloadError::SpeechHttp(err.to_string()));
                }
            }
        }
    }
}

impl SpeechClient for SpeechHttpClient {
    fn synthesize(&self, text: &str, lang: Lang) -> Result<Vec<u8>, PreloadError> {
        let body = serde_json::json!({ "text": text, "lang": lang.code() });
        let response = self.send_with_retries(|| self.client.post(&self.endpoint).json(&body))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "speech synthesis failed".to_string());
            return Err(PreloadError::SpeechStatus { status, message });
        }
        let bytes = response
            .bytes()
            .map_err(|err| PreloadError::SpeechHttp(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
