/*
 *  weather/report.rs
 *
 *  MetarLights - sectional map lights
 *	(c) 2020-26 Stuart Hunter
 *
 *	Decoded METAR report
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
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Coarse visibility/ceiling classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlightCategory {
    Vfr,
    Mvfr,
    Ifr,
    Lifr,
    Invalid,
}

impl FlightCategory {
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_uppercase().as_str() {
            "VFR" => FlightCategory::Vfr,
            "MVFR" => FlightCategory::Mvfr,
            "IFR" => FlightCategory::Ifr,
            "LIFR" => FlightCategory::Lifr,
            _ => FlightCategory::Invalid,
        }
    }
}

impl Display for FlightCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlightCategory::Vfr => "VFR",
            FlightCategory::Mvfr => "MVFR",
            FlightCategory::Ifr => "IFR",
            FlightCategory::Lifr => "LIFR",
            FlightCategory::Invalid => "INVALID",
        };
        write!(f, "{}", s)
    }
}

/// Precipitation derived from the ordered condition codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precipitation {
    Unknown,
    Rain,
    HeavyRain,
    Ice,
    Snow,
    Drizzle,
}

impl Display for Precipitation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Precipitation::Unknown => "UNKNOWN",
            Precipitation::Rain => "RAIN",
            Precipitation::HeavyRain => "HEAVY RAIN",
            Precipitation::Ice => "ICE",
            Precipitation::Snow => "SNOW",
            Precipitation::Drizzle => "DRIZZLE",
        };
        write!(f, "{}", s)
    }
}

/// One `conditions[]` entry, e.g. `{code: "RA", prefix: "-"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub code: String,
    #[serde(default)]
    pub prefix: Option<String>,
}

impl Condition {
    pub fn new(code: &str, prefix: Option<&str>) -> Self {
        Self { code: code.to_string(), prefix: prefix.map(str::to_string) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub station: String,
    pub flight_category: FlightCategory,
    pub temperature_c: Option<f64>,
    pub pressure_hg: Option<f64>,
    pub visibility_miles: Option<f64>,
    pub conditions: Vec<Condition>,
    pub observed: Option<DateTime<Utc>>,
    pub raw_text: String,
}

impl WeatherReport {
    /// First condition code with a known precipitation meaning wins.
    /// `None` means no precipitation reported, which is not `Unknown`.
    pub fn precipitation(&self) -> Option<Precipitation> {
        self.conditions.iter().find_map(|cond| match cond.code.as_str() {
            "UP" => Some(Precipitation::Unknown),
            "RA" => {
                if cond.prefix.as_deref() == Some("+") {
                    Some(Precipitation::HeavyRain)
                } else {
                    Some(Precipitation::Rain)
                }
            }
            "GR" | "GS" | "IC" | "PL" => Some(Precipitation::Ice),
            "SN" | "SG" => Some(Precipitation::Snow),
            "DZ" => Some(Precipitation::Drizzle),
            _ => None,
        })
    }

    /// Lightning is reported as an `LTG...` group after the station id.
    pub fn has_lightning(&self) -> bool {
        self.raw_text
            .split_whitespace()
            .skip(1)
            .any(|group| group.starts_with("LTG"))
    }

    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.observed.map(|observed| now - observed)
    }
}
