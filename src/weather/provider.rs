/*
 *  weather/provider.rs
 *
 *  MetarLights - sectional map lights
 *	(c) 2020-26 Stuart Hunter
 *
 *	checkwxapi.com request/response adapters
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
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use super::WeatherError;
use super::report::{Condition, FlightCategory, WeatherReport};
use crate::sun::Location;
use crate::twilight::TwilightTimes;

/// Provider specific half of a fetch: how to ask for a batch of stations
/// and how to read one `data[]` entry back.
pub trait ProviderAdapter: Send + Sync {
    type Record: Send + Sync;

    fn name(&self) -> &'static str;

    fn path(&self, stations: &[String]) -> String;

    /// Returns the station id alongside the decoded record.
    fn parse_entry(&self, entry: &Value) -> Result<(String, Self::Record), WeatherError>;
}

fn icao_of(entry: &Value) -> Result<String, WeatherError> {
    entry["icao"]
        .as_str()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| WeatherError::parse("?", "icao"))
}

/// `/metar/{ids}/decoded`
#[derive(Debug, Clone, Copy, Default)]
pub struct MetarAdapter;

impl MetarAdapter {
    const OBSERVED_FORMAT: &'static str = "%Y-%m-%dT%H:%MZ"; // 2022-09-12T21:53Z

    fn observed(station: &str, entry: &Value) -> Result<Option<DateTime<Utc>>, WeatherError> {
        match entry["observed"].as_str() {
            None => Ok(None),
            Some(s) => NaiveDateTime::parse_from_str(s, Self::OBSERVED_FORMAT)
                .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.naive_utc()))
                .map(|naive| Some(naive.and_utc()))
                .map_err(|_| WeatherError::parse(station, "observed")),
        }
    }
}

impl ProviderAdapter for MetarAdapter {
    type Record = WeatherReport;

    fn name(&self) -> &'static str {
        "metar"
    }

    fn path(&self, stations: &[String]) -> String {
        format!("metar/{}/decoded", stations.join(","))
    }

    fn parse_entry(&self, entry: &Value) -> Result<(String, WeatherReport), WeatherError> {
        let station = icao_of(entry)?;
        let raw_text = entry["raw_text"]
            .as_str()
            .ok_or_else(|| WeatherError::parse(&station, "raw_text"))?
            .to_string();
        let flight_category = entry["flight_category"]
            .as_str()
            .map(FlightCategory::from_code)
            .unwrap_or(FlightCategory::Invalid);

        let conditions = match entry.get("conditions") {
            None | Some(Value::Null) => Vec::new(),
            Some(v) => serde_json::from_value::<Vec<Condition>>(v.clone())
                .map_err(|_| WeatherError::parse(&station, "conditions"))?,
        };

        let report = WeatherReport {
            flight_category,
            temperature_c: entry["temperature"]["celsius"].as_f64(),
            pressure_hg: entry["barometer"]["hg"].as_f64(),
            visibility_miles: entry["visibility"]["miles"]
                .as_f64()
                .or_else(|| entry["visibility"]["miles_float"].as_f64()),
            conditions,
            observed: Self::observed(&station, entry)?,
            raw_text,
            station: station.clone(),
        };
        Ok((station, report))
    }
}

/// Station suntimes plus the location they were computed for.
#[derive(Debug, Clone, PartialEq)]
pub struct SunTimesRecord {
    pub times: TwilightTimes,
    pub location: Option<Location>,
}

/// `/station/{ids}/suntimes?iso=1`
#[derive(Debug, Clone, Copy, Default)]
pub struct SunTimesAdapter;

impl SunTimesAdapter {
    const TIME_FORMAT: &'static str = "%Y-%m-%dT%H:%M:%S";

    fn utc(station: &str, utc: &Value, field: &'static str) -> Result<DateTime<Utc>, WeatherError> {
        let s = utc[field].as_str().ok_or_else(|| WeatherError::parse(station, field))?;
        NaiveDateTime::parse_from_str(s, Self::TIME_FORMAT)
            .map(|naive| naive.and_utc())
            .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)))
            .map_err(|_| WeatherError::parse(station, field))
    }
}

impl ProviderAdapter for SunTimesAdapter {
    type Record = SunTimesRecord;

    fn name(&self) -> &'static str {
        "suntimes"
    }

    fn path(&self, stations: &[String]) -> String {
        format!("station/{}/suntimes?iso=1", stations.join(","))
    }

    fn parse_entry(&self, entry: &Value) -> Result<(String, SunTimesRecord), WeatherError> {
        let station = icao_of(entry)?;
        let utc = &entry["sunrise_sunset"]["utc"];
        let times = TwilightTimes::from_sun_events(
            Self::utc(&station, utc, "dawn")?,
            Self::utc(&station, utc, "sunrise")?,
            Self::utc(&station, utc, "sunset")?,
            Self::utc(&station, utc, "dusk")?,
        );
        let coordinates = &entry["geometry"]["coordinates"];
        let location = match (coordinates[0].as_f64(), coordinates[1].as_f64()) {
            (Some(lon), Some(lat)) => Some(Location { lat, lon }),
            _ => None,
        };
        Ok((station, SunTimesRecord { times, location }))
    }
}
