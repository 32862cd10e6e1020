/*
 *  weather/cache.rs
 *
 *  MetarLights - sectional map lights
 *	(c) 2020-26 Stuart Hunter
 *
 *	Per-station report cache and call rate limiting
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
//! Report cache shared by the poller and the render loop.
//!
//! Every entry and the last-called registry sit behind a single mutex. That
//! caps throughput with many stations but a map has at most a few hundred
//! pixels. The lock is never held across a network call.

use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::report::WeatherReport;

pub const DEFAULT_CACHE_TTL_MINUTES: i64 = 8;
pub const DEFAULT_RATE_LIMIT_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub enum CachedReport {
    Valid(Arc<WeatherReport>),
    Invalid,
}

impl CachedReport {
    pub fn report(&self) -> Option<&Arc<WeatherReport>> {
        match self {
            CachedReport::Valid(r) => Some(r),
            CachedReport::Invalid => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, CachedReport::Valid(_))
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub written: DateTime<Utc>,
    pub report: CachedReport,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    last_called: HashMap<String, DateTime<Utc>>,
}

#[derive(Debug)]
pub struct WeatherCache {
    state: Mutex<CacheState>,
    ttl: Duration,
    rate_limit: Duration,
}

impl Default for WeatherCache {
    fn default() -> Self {
        Self::new(
            Duration::minutes(DEFAULT_CACHE_TTL_MINUTES),
            Duration::seconds(DEFAULT_RATE_LIMIT_SECS),
        )
    }
}

impl WeatherCache {
    pub fn new(ttl: Duration, rate_limit: Duration) -> Self {
        Self { state: Mutex::new(CacheState::default()), ttl, rate_limit }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        // a panic elsewhere must not take the map down with it
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// `(is_fresh, entry)`; a stale entry is still handed back.
    pub fn get(&self, station: &str) -> (bool, Option<CachedReport>) {
        self.get_at(station, Utc::now())
    }

    pub fn get_at(&self, station: &str, now: DateTime<Utc>) -> (bool, Option<CachedReport>) {
        let state = self.state();
        match state.entries.get(station) {
            Some(entry) => (now - entry.written < self.ttl, Some(entry.report.clone())),
            None => (false, None),
        }
    }

    pub fn entry(&self, station: &str) -> Option<CacheEntry> {
        self.state().entries.get(station).cloned()
    }

    /// Valid report for a station regardless of age.
    pub fn report(&self, station: &str) -> Option<Arc<WeatherReport>> {
        self.state()
            .entries
            .get(station)
            .and_then(|e| e.report.report().cloned())
    }

    pub fn put(&self, station: &str, report: Option<WeatherReport>) {
        self.put_at(station, report, Utc::now())
    }

    /// Stores a fetch outcome. `None` (INVALID) never replaces a valid
    /// report; it is only recorded when nothing better is cached.
    pub fn put_at(&self, station: &str, report: Option<WeatherReport>, now: DateTime<Utc>) {
        let mut state = self.state();
        match report {
            Some(report) => {
                state.entries.insert(
                    station.to_string(),
                    CacheEntry { written: now, report: CachedReport::Valid(Arc::new(report)) },
                );
            }
            None => match state.entries.get(station) {
                Some(existing) if existing.report.is_valid() => {
                    debug!("Keeping previous report for {} after failed fetch", station);
                }
                _ => {
                    state.entries.insert(
                        station.to_string(),
                        CacheEntry { written: now, report: CachedReport::Invalid },
                    );
                }
            },
        }
    }

    pub fn is_rate_limited(&self, station: &str) -> bool {
        self.is_rate_limited_at(station, Utc::now())
    }

    /// True when a call for the station went out within the rate limit
    /// window. Independent of the entry TTL.
    pub fn is_rate_limited_at(&self, station: &str, now: DateTime<Utc>) -> bool {
        self.state()
            .last_called
            .get(station)
            .is_some_and(|called| now - *called < self.rate_limit)
    }

    pub fn mark_called_at(&self, stations: &[String], now: DateTime<Utc>) {
        let mut state = self.state();
        for station in stations {
            state.last_called.insert(station.clone(), now);
        }
    }

    /// Picks the stations that should be fetched and marks them called in
    /// the same critical section, so two concurrent refreshes never both
    /// claim a station. A station is skipped while rate limited, or when its
    /// entry is fresh, valid and `still_current` accepts the report.
    pub fn claim_for_fetch<F>(&self, stations: &[String], now: DateTime<Utc>, still_current: F) -> Vec<String>
    where
        F: Fn(&WeatherReport) -> bool,
    {
        let mut state = self.state();
        let mut claimed = Vec::new();
        for station in stations {
            let rate_limited = state
                .last_called
                .get(station)
                .is_some_and(|called| now - *called < self.rate_limit);
            if rate_limited {
                continue;
            }
            let usable = state.entries.get(station).is_some_and(|entry| {
                now - entry.written < self.ttl
                    && entry.report.report().is_some_and(|r| still_current(r))
            });
            if usable {
                continue;
            }
            state.last_called.insert(station.clone(), now);
            claimed.push(station.clone());
        }
        claimed
    }

    pub fn last_called(&self, station: &str) -> Option<DateTime<Utc>> {
        self.state().last_called.get(station).copied()
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }
}
