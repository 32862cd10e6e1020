/*
 *  weather/mod.rs
 *
 *  MetarLights - sectional map lights
 *	(c) 2020-26 Stuart Hunter
 *
 *	METAR and station suntimes from checkwxapi.com
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
use serde_json::Error as JsonError;
use thiserror::Error;

pub mod cache;
pub mod fetcher;
pub mod provider;
pub mod report;
pub mod service;
pub mod transport;

pub use cache::{CacheEntry, CachedReport, WeatherCache};
pub use fetcher::{BATCH_LIMIT, FetchResults, WeatherFetcher};
pub use provider::{MetarAdapter, ProviderAdapter, SunTimesAdapter};
pub use report::{Condition, FlightCategory, Precipitation, WeatherReport};
pub use service::{WeatherPoller, WeatherService};
pub use transport::{HttpTransport, Transport};

/// Errors raised while talking to the weather provider.
///
/// None of these are fatal; callers fall back to the cache or mark the
/// affected stations INVALID.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned HTTP {status} for {path}")]
    Status { status: u16, path: String },
    #[error("JSON deserialization error: {0}")]
    Json(#[from] JsonError),
    #[error("missing or malformed field {field} for {station}")]
    Parse { station: String, field: &'static str },
    #[error("provider API key required: {0}")]
    ApiKey(String),
    #[error("weather initialization failed: {0}")]
    Initialization(String),
}

impl WeatherError {
    pub(crate) fn parse(station: &str, field: &'static str) -> Self {
        WeatherError::Parse { station: station.to_string(), field }
    }
}
