use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

use super::{FetchError, Fetched, RemoteFetcher};

/// Blocking HTTP fetcher.
///
/// Must be created and used off the async runtime (the bundler worker thread).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .user_agent(crate::version::user_agent())
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { http })
    }
}

fn request_error(url: &str, e: &reqwest::Error) -> FetchError {
    let message = if e.is_timeout() {
        format!("request timed out: {e}")
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    };
    FetchError::Request {
        url: url.to_string(),
        message,
    }
}

impl RemoteFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Fetched, FetchError> {
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|e| request_error(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().map_err(|e| request_error(url, &e))?;

        Ok(Fetched {
            url: final_url,
            body,
            content_type,
        })
    }
}
