/*
 *  sun.rs
 *
 *  MetarLights - sectional map lights
 *	(c) 2020-26 Stuart Hunter
 *
 *	Offline sun events when the suntimes service is unreachable
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
//! Dawn, sunrise, sunset and dusk for a lat/lon and UTC date (NOAA algorithm).
//! Sunrise/sunset use zenith 90.833°, civil dawn/dusk 96°.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use std::fmt;

pub const OFFICIAL_ZENITH: f64 = 90.833;
pub const CIVIL_ZENITH: f64 = 96.0;

const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;
const RAD_TO_DEG: f64 = 180.0 / std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.lat, self.lon)
    }
}

/// `None` where the sun never crosses the zenith on that date (polar day/night).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunEvents {
    pub dawn: Option<DateTime<Utc>>,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
    pub dusk: Option<DateTime<Utc>>,
}

impl SunEvents {
    pub fn all(&self) -> Option<(DateTime<Utc>, DateTime<Utc>, DateTime<Utc>, DateTime<Utc>)> {
        Some((self.dawn?, self.sunrise?, self.sunset?, self.dusk?))
    }
}

#[inline]
fn sin_deg(x: f64) -> f64 { (x * DEG_TO_RAD).sin() }
#[inline]
fn cos_deg(x: f64) -> f64 { (x * DEG_TO_RAD).cos() }
#[inline]
fn tan_deg(x: f64) -> f64 { (x * DEG_TO_RAD).tan() }
#[inline]
fn acos_deg(x: f64) -> f64 { x.acos() * RAD_TO_DEG }
#[inline]
fn atan_deg(x: f64) -> f64 { x.atan() * RAD_TO_DEG }

fn norm360(x: f64) -> f64 {
    x.rem_euclid(360.0)
}

/// UT hours in [0, 24) of the rising or setting crossing of `zenith`.
fn crossing_ut(location: Location, day_of_year: f64, zenith: f64, rising: bool) -> Option<f64> {
    let lng_hour = location.lon / 15.0;
    let t = if rising {
        day_of_year + (6.0 - lng_hour) / 24.0
    } else {
        day_of_year + (18.0 - lng_hour) / 24.0
    };

    let m = 0.9856 * t - 3.289;
    let l = norm360(m + 1.916 * sin_deg(m) + 0.020 * sin_deg(2.0 * m) + 282.634);

    // right ascension, same quadrant as L
    let mut ra = norm360(atan_deg(0.91764 * tan_deg(l)));
    ra += (l / 90.0).floor() * 90.0 - (ra / 90.0).floor() * 90.0;
    ra /= 15.0;

    let sin_dec = 0.39782 * sin_deg(l);
    let cos_dec = (1.0 - sin_dec * sin_dec).sqrt();
    let cos_h = (cos_deg(zenith) - sin_dec * sin_deg(location.lat)) / (cos_dec * cos_deg(location.lat));
    if !(-1.0..=1.0).contains(&cos_h) {
        return None;
    }

    let h_deg = if rising { 360.0 - acos_deg(cos_h) } else { acos_deg(cos_h) };
    let h = h_deg / 15.0;
    let local_mean = h + ra - 0.06571 * t - 6.622;
    Some((local_mean - lng_hour).rem_euclid(24.0))
}

fn ut_to_utc(date: NaiveDate, ut_hours: f64) -> DateTime<Utc> {
    let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    midnight + Duration::seconds((ut_hours * 3600.0).round() as i64)
}

/// Sun events around the sunrise falling on `date` (UTC). West of Greenwich
/// sunset and dusk usually land on the following UTC day, they are moved
/// there so the four events are in order.
pub fn sun_events_for_date(location: Location, date: NaiveDate) -> SunEvents {
    let doy = date.ordinal() as f64;
    let at = |zenith, rising| crossing_ut(location, doy, zenith, rising).map(|h| ut_to_utc(date, h));

    let sunrise = at(OFFICIAL_ZENITH, true);
    let mut dawn = at(CIVIL_ZENITH, true);
    let mut sunset = at(OFFICIAL_ZENITH, false);
    let mut dusk = at(CIVIL_ZENITH, false);

    if let Some(rise) = sunrise {
        if let Some(d) = dawn.filter(|d| *d > rise) {
            dawn = Some(d - Duration::days(1));
        }
        if let Some(s) = sunset.filter(|s| *s < rise) {
            sunset = Some(s + Duration::days(1));
        }
    }
    if let (Some(set), Some(d)) = (sunset, dusk) {
        if d < set {
            dusk = Some(d + Duration::days(1));
        }
    }

    SunEvents { dawn, sunrise, sunset, dusk }
}
