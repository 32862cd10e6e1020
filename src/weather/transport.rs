/*
 *  weather/transport.rs
 *
 *  MetarLights - sectional map lights
 *	(c) 2020-26 Stuart Hunter
 *
 *	HTTP transport for the weather provider
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */
use async_trait::async_trait;
use flate2::read::GzDecoder;
use log::{debug, warn};
use reqwest::{Client, header};
use std::io::Read;
use std::time::Duration;

use super::WeatherError;

/// Anything that can GET a provider path and hand back the body text.
///
/// The fetcher only depends on this seam, tests substitute an in-memory
/// implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, path: &str) -> Result<String, WeatherError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    client: Client,
    max_retries: u8,
}

impl HttpTransport {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, WeatherError> {
        const VERSION: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

        if api_key.trim().is_empty() {
            return Err(WeatherError::ApiKey("no key specified".to_string()));
        }

        let mut headers = header::HeaderMap::new();
        headers.insert("User-Agent", header::HeaderValue::from_static(VERSION));
        headers.insert("Accept", header::HeaderValue::from_static("application/json"));
        headers.insert("Accept-Encoding", header::HeaderValue::from_static("deflate, gzip"));
        headers.insert("Connection", header::HeaderValue::from_static("close"));
        let mut key = header::HeaderValue::from_str(api_key.trim())
            .map_err(|_| WeatherError::ApiKey("key is not a valid header value".to_string()))?;
        key.set_sensitive(true);
        headers.insert("X-API-Key", key);

        let client = Client::builder()
            .connect_timeout(Duration::from_millis(1500).min(timeout))
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            max_retries: 2,
        })
    }

    pub fn with_max_retries(mut self, max_retries: u8) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    fn decode_body(raw: &[u8]) -> String {
        // gzip when the server honoured Accept-Encoding, plain text otherwise
        let mut decoder = GzDecoder::new(raw);
        let mut decoded = String::new();
        match decoder.read_to_string(&mut decoded) {
            Ok(_) => decoded,
            Err(_) => String::from_utf8_lossy(raw).to_string(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str) -> Result<String, WeatherError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut retries = 0;
        loop {
            debug!("GET {}", url);
            match self.client.get(&url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        return Err(WeatherError::Status { status: status.as_u16(), path: path.to_string() });
                    }
                    let raw = response.bytes().await?;
                    return Ok(Self::decode_body(&raw));
                }
                Err(e) => {
                    retries += 1;
                    if retries >= self.max_retries {
                        return Err(WeatherError::Http(e));
                    }
                    warn!("GET {} failed ({}), retry {}/{}", path, e, retries, self.max_retries);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}
