/*
 *  twilight.rs
 *
 *  MetarLights - sectional map lights
 *	(c) 2020-26 Stuart Hunter
 *
 *	Per station day, night and twilight transitions
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
//! Turns a station's dawn/sunrise/sunset/dusk into a continuous lighting
//! state. Times are cached per station and reloaded lazily once the cached
//! sunrise no longer brackets the query time.

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::task::JoinHandle;

use crate::sun::{self, Location};
use crate::weather::provider::SunTimesRecord;
use crate::weather::{SunTimesAdapter, WeatherError, WeatherFetcher};

/// Suntimes older than this are considered stale.
const SUNTIMES_LIFESPAN_HOURS: i64 = 24;
/// Minimum gap between two reload attempts for the same station.
const RELOAD_BACKOFF_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwilightTimes {
    pub dawn: DateTime<Utc>,
    pub sunrise: DateTime<Utc>,
    pub full_light_start: DateTime<Utc>,
    pub full_light_end: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
    pub dusk: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwilightPhase {
    /// dawn to sunrise, off fading up to night
    Dawn,
    /// sunrise to full light, night fading up to color
    Sunrise,
    /// end of full light to sunset, color fading down to night
    Sunset,
    /// sunset to dusk, night fading down to off
    Dusk,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TwilightState {
    Daylight,
    Night,
    Transitioning {
        phase: TwilightPhase,
        off_to_night: f64,
        night_to_color: f64,
    },
}

impl TwilightState {
    /// `(off_to_night, night_to_color)`
    pub fn proportions(&self) -> (f64, f64) {
        match *self {
            TwilightState::Daylight => (0.0, 1.0),
            TwilightState::Night => (0.0, 0.0),
            TwilightState::Transitioning { off_to_night, night_to_color, .. } => (off_to_night, night_to_color),
        }
    }

    /// Single scalar for the rendered light: 0 off, 1 night, 2 full color.
    pub fn light_level(&self) -> f64 {
        match self.proportions() {
            (off_to_night, _) if off_to_night > 0.0 => off_to_night,
            (_, night_to_color) => 1.0 + night_to_color,
        }
    }
}

/// How far `current` is between `start` and `end`, 0.0 at or before the
/// start and 1.0 at or after the end.
pub fn proportion_between(start: DateTime<Utc>, current: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    if current < start {
        return 0.0;
    }
    if current > end {
        return 1.0;
    }
    let total = (end - start).num_milliseconds();
    if total == 0 {
        return 1.0;
    }
    (current - start).num_milliseconds() as f64 / total as f64
}

impl TwilightTimes {
    /// Full light starts and ends one average twilight length inside
    /// sunrise and sunset.
    pub fn from_sun_events(
        dawn: DateTime<Utc>,
        sunrise: DateTime<Utc>,
        sunset: DateTime<Utc>,
        dusk: DateTime<Utc>,
    ) -> Self {
        let avg_transition = ((sunrise - dawn) + (dusk - sunset)) / 2;
        Self {
            dawn,
            sunrise,
            full_light_start: sunrise + avg_transition,
            full_light_end: sunset - avg_transition,
            sunset,
            dusk,
        }
    }

    pub fn is_well_ordered(&self) -> bool {
        self.dawn <= self.sunrise
            && self.sunrise <= self.full_light_start
            && self.full_light_start <= self.full_light_end
            && self.full_light_end <= self.sunset
            && self.sunset <= self.dusk
    }

    pub fn is_daylight(&self, at: DateTime<Utc>) -> bool {
        self.full_light_start < at && at < self.full_light_end
    }

    /// Night runs from dusk to sunrise, not to dawn.
    pub fn is_night(&self, at: DateTime<Utc>) -> bool {
        at < self.sunrise || at > self.dusk
    }

    /// Proportions for whichever of the four twilight regions `at` falls in,
    /// without classifying daylight or night first.
    pub fn transition_at(&self, at: DateTime<Utc>) -> TwilightState {
        let (phase, off_to_night, night_to_color) = if at >= self.sunset {
            (TwilightPhase::Dusk, 1.0 - proportion_between(self.sunset, at, self.dusk), 0.0)
        } else if at >= self.full_light_end {
            (TwilightPhase::Sunset, 0.0, 1.0 - proportion_between(self.full_light_end, at, self.sunset))
        } else if at >= self.sunrise {
            (TwilightPhase::Sunrise, 0.0, proportion_between(self.sunrise, at, self.full_light_start))
        } else {
            (TwilightPhase::Dawn, proportion_between(self.dawn, at, self.sunrise), 0.0)
        };

        TwilightState::Transitioning {
            phase,
            off_to_night: off_to_night.clamp(-1.0, 1.0),
            night_to_color: night_to_color.clamp(-1.0, 1.0),
        }
    }

    pub fn state_at(&self, at: DateTime<Utc>) -> TwilightState {
        if self.is_daylight(at) {
            TwilightState::Daylight
        } else if self.is_night(at) {
            TwilightState::Night
        } else {
            self.transition_at(at)
        }
    }

    fn is_stale(&self, at: DateTime<Utc>) -> bool {
        let since_sunrise = at - self.sunrise;
        since_sunrise < Duration::zero() || since_sunrise > Duration::hours(SUNTIMES_LIFESPAN_HOURS)
    }
}

/// Offline times for the day whose sunrise is the latest one at or before `at`.
fn offline_times(location: Location, at: DateTime<Utc>) -> Option<TwilightTimes> {
    let date = at.date_naive();
    let mut events = sun::sun_events_for_date(location, date);
    if events.sunrise.is_some_and(|sunrise| sunrise > at) {
        events = sun::sun_events_for_date(location, date.pred_opt()?);
    }
    let (dawn, sunrise, sunset, dusk) = events.all()?;
    Some(TwilightTimes::from_sun_events(dawn, sunrise, sunset, dusk))
}

/// Cached suntimes for every station plus the fetcher used to reload them.
pub struct TwilightCalculator {
    fetcher: WeatherFetcher<SunTimesAdapter>,
    stations: RwLock<HashMap<String, SunTimesRecord>>,
    reload_attempts: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl TwilightCalculator {
    pub fn new(fetcher: WeatherFetcher<SunTimesAdapter>) -> Self {
        Self {
            fetcher,
            stations: RwLock::new(HashMap::new()),
            reload_attempts: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, SunTimesRecord>> {
        self.stations.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, SunTimesRecord>> {
        self.stations.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Loads suntimes for every station. Fails only when none could be loaded.
    pub async fn initialize(&self, stations: &[String]) -> Result<usize, WeatherError> {
        let fetched = self.fetcher.fetch(stations).await;
        let mut loaded = 0;
        {
            let mut map = self.write();
            for (station, record) in fetched {
                match record {
                    Some(record) => {
                        debug!(
                            "{} sunrise {} sunset {}",
                            station, record.times.sunrise, record.times.sunset
                        );
                        map.insert(station, record);
                        loaded += 1;
                    }
                    None => warn!("No suntimes for {}, treated as daylight", station),
                }
            }
        }

        if loaded == 0 && !stations.is_empty() {
            return Err(WeatherError::Initialization(format!(
                "no suntimes loaded for {} station(s)",
                stations.len()
            )));
        }
        info!("Loaded suntimes for {}/{} stations", loaded, stations.len());
        Ok(loaded)
    }

    pub fn insert(&self, station: &str, record: SunTimesRecord) {
        self.write().insert(station.to_uppercase(), record);
    }

    pub fn times(&self, station: &str) -> Option<TwilightTimes> {
        self.read().get(station).map(|r| r.times)
    }

    pub fn location(&self, station: &str) -> Option<Location> {
        self.read().get(station).and_then(|r| r.location)
    }

    fn may_reload(&self, station: &str, at: DateTime<Utc>) -> bool {
        let mut attempts = self.reload_attempts.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        match attempts.get(station) {
            Some(last) if (at - *last).abs() < Duration::minutes(RELOAD_BACKOFF_MINUTES) => false,
            _ => {
                attempts.insert(station.to_string(), at);
                true
            }
        }
    }

    /// Refetches one station, computing the times locally when the service
    /// has nothing and the station position is known.
    async fn reload(&self, station: &str, at: DateTime<Utc>) -> Option<TwilightTimes> {
        let fetched = self.fetcher.fetch(&[station.to_string()]).await;
        if let Some(Some(record)) = fetched.get(station) {
            let times = record.times;
            self.write().insert(station.to_string(), record.clone());
            return Some(times);
        }

        let location = self.location(station)?;
        let times = offline_times(location, at)?;
        info!("Suntimes for {} computed offline at {}", station, location);
        if let Some(record) = self.write().get_mut(station) {
            record.times = times;
        }
        Some(times)
    }

    /// Lighting state for a station. Unknown stations and suntimes that are
    /// still stale after a reload count as daylight.
    pub async fn twilight_state(&self, station: &str, at: DateTime<Utc>) -> TwilightState {
        let Some(mut times) = self.times(station) else {
            return TwilightState::Daylight;
        };

        if times.is_stale(at) && self.may_reload(station, at) {
            debug!("Suntimes for {} stale at {}, reloading", station, at);
            if let Some(reloaded) = self.reload(station, at).await {
                times = reloaded;
            }
        }

        if at - times.sunrise > Duration::hours(SUNTIMES_LIFESPAN_HOURS) {
            return TwilightState::Daylight;
        }
        times.state_at(at)
    }

    pub async fn is_daylight(&self, station: &str, at: DateTime<Utc>) -> bool {
        self.twilight_state(station, at).await == TwilightState::Daylight
    }

    pub async fn is_night(&self, station: &str, at: DateTime<Utc>) -> bool {
        self.twilight_state(station, at).await == TwilightState::Night
    }
}

/// Keeps calling `initialize` every `interval` until something loads.
/// Until then every station reads as daylight.
pub fn spawn_initialize_retry(
    calculator: Arc<TwilightCalculator>,
    stations: Vec<String>,
    interval: std::time::Duration,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match calculator.initialize(&stations).await {
                Ok(loaded) => return loaded,
                Err(e) => error!("Suntimes retry failed: {}", e),
            }
        }
    })
}
