/*
 *  weather/fetcher.rs
 *
 *  MetarLights - sectional map lights
 *	(c) 2020-26 Stuart Hunter
 *
 *	Batched station fetches
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
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::WeatherError;
use super::provider::ProviderAdapter;
use super::transport::Transport;

/// checkwx allows up to 20 stations on a single call
pub const BATCH_LIMIT: usize = 20;

/// Per-station outcome of a fetch, `None` marks the station INVALID.
pub type FetchResults<R> = HashMap<String, Option<R>>;

pub struct WeatherFetcher<A: ProviderAdapter> {
    adapter: A,
    transport: Arc<dyn Transport>,
}

impl<A: ProviderAdapter> WeatherFetcher<A> {
    pub fn new(adapter: A, transport: Arc<dyn Transport>) -> Self {
        Self { adapter, transport }
    }

    /// Fetches every requested station, one request per chunk of
    /// `BATCH_LIMIT`. Every requested station has a key in the result;
    /// a failed chunk never stops the remaining chunks.
    pub async fn fetch(&self, stations: &[String]) -> FetchResults<A::Record> {
        let mut results: FetchResults<A::Record> = HashMap::with_capacity(stations.len());
        let mut wanted: Vec<String> = Vec::with_capacity(stations.len());
        for s in stations {
            let s = s.trim().to_uppercase();
            if !s.is_empty() && !wanted.contains(&s) {
                wanted.push(s);
            }
        }

        for chunk in wanted.chunks(BATCH_LIMIT) {
            debug!("fetch {}: batch of {}: {}", self.adapter.name(), chunk.len(), chunk.join(","));
            match self.fetch_chunk(chunk).await {
                Ok(records) => {
                    for (station, record) in records {
                        if chunk.contains(&station) {
                            results.insert(station, Some(record));
                        } else {
                            debug!("fetch {}: ignoring unrequested station {}", self.adapter.name(), station);
                        }
                    }
                }
                Err(e) => warn!("fetch {}: batch {} failed: {}", self.adapter.name(), chunk.join(","), e),
            }
            for station in chunk {
                results.entry(station.clone()).or_insert_with(|| {
                    info!("Invalid {} for {}", self.adapter.name(), station);
                    None
                });
            }
        }
        results
    }

    async fn fetch_chunk(&self, chunk: &[String]) -> Result<Vec<(String, A::Record)>, WeatherError> {
        let body = self.transport.get(&self.adapter.path(chunk)).await?;
        let json: Value = serde_json::from_str(&body)?;
        let data = json
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| WeatherError::parse(&chunk.join(","), "data"))?;

        let mut records = Vec::with_capacity(data.len());
        for entry in data {
            // checkwx returns bare strings for stations it could not decode
            if entry.is_string() {
                continue;
            }
            match self.adapter.parse_entry(entry) {
                Ok(record) => records.push(record),
                Err(e) => warn!("fetch {}: {}", self.adapter.name(), e),
            }
        }
        Ok(records)
    }
}
