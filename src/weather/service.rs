/*
 *  weather/service.rs
 *
 *  MetarLights - sectional map lights
 *	(c) 2020-26 Stuart Hunter
 *
 *	Cached METAR access and background polling
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
use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::cache::{CachedReport, WeatherCache};
use super::fetcher::WeatherFetcher;
use super::provider::MetarAdapter;
use super::report::{FlightCategory, Precipitation, WeatherReport};

/// METARs are normally issued hourly.
pub const DEFAULT_METAR_LIFESPAN_MINUTES: i64 = 60;

/// Owns the report cache and the METAR fetcher. Shared as `Arc` between
/// the poller and the render loop.
pub struct WeatherService {
    cache: WeatherCache,
    fetcher: WeatherFetcher<MetarAdapter>,
    lifespan: Duration,
}

impl WeatherService {
    pub fn new(fetcher: WeatherFetcher<MetarAdapter>, cache: WeatherCache) -> Self {
        Self {
            cache,
            fetcher,
            lifespan: Duration::minutes(DEFAULT_METAR_LIFESPAN_MINUTES),
        }
    }

    pub fn with_lifespan(mut self, lifespan: Duration) -> Self {
        self.lifespan = lifespan;
        self
    }

    pub fn cache(&self) -> &WeatherCache {
        &self.cache
    }

    fn within_lifespan(&self, report: &WeatherReport, now: DateTime<Utc>) -> bool {
        report.age(now).is_some_and(|age| age < self.lifespan)
    }

    /// Cached report when it is fresh, valid and its observation is still
    /// inside the lifespan.
    fn usable(&self, station: &str, now: DateTime<Utc>) -> Option<Arc<WeatherReport>> {
        match self.cache.get_at(station, now) {
            (true, Some(CachedReport::Valid(report))) if self.within_lifespan(&report, now) => Some(report),
            _ => None,
        }
    }

    pub async fn refresh(&self, stations: &[String]) -> HashMap<String, CachedReport> {
        self.refresh_at(stations, Utc::now()).await
    }

    /// Brings the requested stations up to date. Rate limited stations keep
    /// whatever is cached, even past the TTL. The cache lock is released
    /// before any request goes out.
    pub async fn refresh_at(&self, stations: &[String], now: DateTime<Utc>) -> HashMap<String, CachedReport> {
        let mut wanted: Vec<String> = Vec::with_capacity(stations.len());
        for s in stations {
            let s = s.trim().to_uppercase();
            if !s.is_empty() && !wanted.contains(&s) {
                wanted.push(s);
            }
        }

        // claimed stations are marked called up front, so a failing
        // station is not hammered and a concurrent refresh skips them
        let to_fetch = self
            .cache
            .claim_for_fetch(&wanted, now, |report| self.within_lifespan(report, now));

        if !to_fetch.is_empty() {
            let fetched = self.fetcher.fetch(&to_fetch).await;
            for (station, report) in fetched {
                match &report {
                    Some(r) => debug!("New WX for {}={}", station, r.raw_text),
                    None => debug!("Invalid WX for {}", station),
                }
                self.cache.put_at(&station, report, now);
            }
        }

        wanted
            .into_iter()
            .map(|station| {
                let (_, cached) = self.cache.get_at(&station, now);
                (station, cached.unwrap_or(CachedReport::Invalid))
            })
            .collect()
    }

    pub async fn report(&self, station: &str) -> CachedReport {
        self.report_at(station, Utc::now()).await
    }

    /// Single station lookup, refreshing it when the cached copy is not usable.
    pub async fn report_at(&self, station: &str, now: DateTime<Utc>) -> CachedReport {
        let station = station.trim().to_uppercase();
        if station.is_empty() {
            info!("Invalid or empty station code");
            return CachedReport::Invalid;
        }
        if let Some(report) = self.usable(&station, now) {
            return CachedReport::Valid(report);
        }
        self.refresh_at(std::slice::from_ref(&station), now)
            .await
            .remove(&station)
            .unwrap_or(CachedReport::Invalid)
    }

    // Accessors below read the cache only, they never go to the network.

    pub fn category(&self, station: &str) -> FlightCategory {
        self.cache
            .report(station)
            .map(|r| r.flight_category)
            .unwrap_or(FlightCategory::Invalid)
    }

    pub fn temperature(&self, station: &str) -> Option<f64> {
        self.cache.report(station).and_then(|r| r.temperature_c)
    }

    pub fn pressure(&self, station: &str) -> Option<f64> {
        self.cache.report(station).and_then(|r| r.pressure_hg)
    }

    pub fn visibility(&self, station: &str) -> Option<f64> {
        self.cache.report(station).and_then(|r| r.visibility_miles)
    }

    pub fn precipitation(&self, station: &str) -> Option<Precipitation> {
        self.cache.report(station).and_then(|r| r.precipitation())
    }

    pub fn has_lightning(&self, station: &str) -> bool {
        self.cache.report(station).is_some_and(|r| r.has_lightning())
    }

    pub fn observation_age(&self, station: &str, now: DateTime<Utc>) -> Option<Duration> {
        self.cache.report(station).and_then(|r| r.age(now))
    }

    /// A station with no report, an INVALID report or an observation of
    /// unknown age is inoperative, as is one older than `inactive_minutes`.
    pub fn is_station_inoperative(&self, station: &str, inactive_minutes: u32, now: DateTime<Utc>) -> bool {
        match self.observation_age(station, now) {
            None => true,
            Some(age) => age > Duration::minutes(i64::from(inactive_minutes)),
        }
    }
}

/// Background refresh of every configured station.
pub struct WeatherPoller {
    stop_sender: Option<mpsc::Sender<()>>,
    poll_handle: Option<JoinHandle<()>>,
}

impl WeatherPoller {
    /// The stop signal is only seen between refreshes, a fetch already in
    /// flight runs to completion or its timeout.
    pub fn start(service: Arc<WeatherService>, stations: Vec<String>, interval: std::time::Duration) -> Self {
        let (stop_tx, mut stop_rx) = mpsc::channel(1);

        let poll_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let results = service.refresh(&stations).await;
                        let valid = results.values().filter(|r| r.is_valid()).count();
                        info!("Weather polling: {}/{} stations valid", valid, results.len());
                    }
                    _ = stop_rx.recv() => {
                        info!("Weather polling received stop signal. Exiting.");
                        break;
                    }
                }
            }
        });

        Self { stop_sender: Some(stop_tx), poll_handle: Some(poll_handle) }
    }

    pub fn is_running(&self) -> bool {
        self.poll_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub async fn stop(&mut self) {
        if let Some(sender) = self.stop_sender.take() {
            if let Err(e) = sender.send(()).await {
                error!("Failed to send stop signal to weather polling: {}", e);
            }
        }
        if let Some(handle) = self.poll_handle.take() {
            handle.await.unwrap_or_else(|e| error!("Weather polling task failed to join: {}", e));
        }
        info!("Weather polling stopped.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weather::fetcher::tests::RecordingTransport;
    use chrono::TimeZone;

    fn service() -> (Arc<RecordingTransport>, WeatherService) {
        let transport = Arc::new(RecordingTransport::default());
        let fetcher = WeatherFetcher::new(MetarAdapter, transport.clone());
        (transport, WeatherService::new(fetcher, WeatherCache::default()))
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    // canned reports are observed at 12:00Z
    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
    }

    #[tokio::test]
    async fn test_fresh_cache_makes_no_second_call() {
        let (transport, service) = service();

        let first = service.refresh_at(&ids(&["KDWH"]), at(12, 5, 0)).await;
        let second = service.refresh_at(&ids(&["KDWH"]), at(12, 9, 0)).await;

        assert_eq!(transport.calls(), 1);
        let a = first["KDWH"].report().unwrap();
        let b = second["KDWH"].report().unwrap();
        assert!(Arc::ptr_eq(a, b));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refreshes_share_one_call() {
        for _ in 0..200 {
            let (transport, service) = service();
            let service = Arc::new(service);
            let barrier = Arc::new(tokio::sync::Barrier::new(2));

            let tasks: Vec<_> = (0..2)
                .map(|_| {
                    let service = Arc::clone(&service);
                    let barrier = Arc::clone(&barrier);
                    tokio::spawn(async move {
                        barrier.wait().await;
                        service.refresh_at(&ids(&["KDWH"]), at(12, 5, 0)).await
                    })
                })
                .collect();
            for task in tasks {
                task.await.unwrap();
            }

            assert_eq!(transport.calls(), 1);
        }
    }

    #[tokio::test]
    async fn test_rate_limit_allows_one_call_per_minute() {
        let (transport, service) = service();

        // INVALID is never fresh enough to skip, only the rate limit holds it back
        service.refresh_at(&ids(&["BADX"]), at(12, 5, 0)).await;
        service.refresh_at(&ids(&["BADX"]), at(12, 5, 30)).await;
        assert_eq!(transport.calls(), 1);

        service.refresh_at(&ids(&["BADX"]), at(12, 6, 1)).await;
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_stale_entry() {
        let (transport, service) = service();
        service.refresh_at(&ids(&["KDWH"]), at(12, 5, 0)).await;
        *transport.fail_paths_containing.lock().unwrap() = Some("KDWH".to_string());

        // stale and past the lifespan but a failed refresh keeps the report
        let results = service.refresh_at(&ids(&["KDWH"]), at(13, 30, 0)).await;
        assert_eq!(transport.calls(), 2);
        assert!(results["KDWH"].is_valid());
        assert_eq!(service.category("KDWH"), FlightCategory::Vfr);
    }

    #[tokio::test]
    async fn test_observation_past_lifespan_is_refetched() {
        let (transport, service) = service();
        service.refresh_at(&ids(&["KDWH"]), at(12, 58, 0)).await;
        // cache entry is 3 minutes old, observation 61 minutes
        service.report_at("KDWH", at(13, 1, 0)).await;
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_report_uses_cache_when_usable() {
        let (transport, service) = service();
        service.refresh_at(&ids(&["KDWH"]), at(12, 5, 0)).await;
        let report = service.report_at("kdwh", at(12, 6, 0)).await;
        assert_eq!(transport.calls(), 1);
        assert_eq!(report.report().unwrap().station, "KDWH");
    }

    #[tokio::test]
    async fn test_kdwh_recent_vfr_is_operative() {
        let (_, service) = service();
        service.refresh_at(&ids(&["KDWH"]), at(12, 10, 0)).await;

        assert!(!service.is_station_inoperative("KDWH", 60, at(12, 10, 0)));
        assert!(service.is_station_inoperative("KDWH", 60, at(13, 1, 0)));
        assert_eq!(service.category("KDWH"), FlightCategory::Vfr);
        assert!(!service.has_lightning("KDWH"));
    }

    #[test]
    fn test_undated_report_is_inoperative() {
        let (_, service) = service();
        let undated = WeatherReport {
            station: "KDWH".to_string(),
            flight_category: FlightCategory::Vfr,
            temperature_c: None,
            pressure_hg: None,
            visibility_miles: None,
            conditions: vec![],
            observed: None,
            raw_text: "KDWH AUTO".to_string(),
        };
        service.cache().put_at("KDWH", Some(undated), at(12, 5, 0));

        assert_eq!(service.category("KDWH"), FlightCategory::Vfr);
        assert!(service.is_station_inoperative("KDWH", 90, at(12, 5, 0)));
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_stations_are_inoperative() {
        let (_, service) = service();
        service.refresh_at(&ids(&["BADX"]), at(12, 5, 0)).await;
        assert!(service.is_station_inoperative("BADX", 60, at(12, 5, 0)));
        assert!(service.is_station_inoperative("KNONE", 60, at(12, 5, 0)));
        assert_eq!(service.category("BADX"), FlightCategory::Invalid);
    }

    #[tokio::test]
    async fn test_poller_stops() {
        let (_, service) = service();
        let mut poller = WeatherPoller::start(Arc::new(service), ids(&["KDWH"]), std::time::Duration::from_secs(3600));
        assert!(poller.is_running());
        poller.stop().await;
        assert!(!poller.is_running());
    }
}
