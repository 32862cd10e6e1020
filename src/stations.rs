/*
 *  stations.rs
 *
 *  MetarLights - sectional map lights
 *	(c) 2020-26 Stuart Hunter
 *
 *	Station to pixel registry
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
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Identifier reported for pixels that are not wired to a station.
pub const UNKNOWN_STATION: &str = "UNK";

#[derive(Debug, Error, PartialEq)]
pub enum StationError {
    #[error("pixel {pixel} is assigned to both {first} and {second}")]
    DuplicatePixel { pixel: usize, first: String, second: String },
    #[error("station {station} uses pixel {pixel} but only {pixel_count} pixels are configured")]
    PixelOutOfRange { station: String, pixel: usize, pixel_count: usize },
    #[error("invalid station identifier: {0:?}")]
    InvalidIdentifier(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    pub icao: String,
    pub pixel: usize,
}

/// Read-only mapping of ICAO code to pixel index.
///
/// Identifiers are normalised to upper case. Pixel indices are unique.
#[derive(Debug, Clone, Default)]
pub struct StationRegistry {
    stations: Vec<Station>,
    by_pixel: HashMap<usize, usize>,
    by_icao: HashMap<String, usize>,
}

impl StationRegistry {
    pub fn new(airports: &BTreeMap<String, usize>) -> Result<Self, StationError> {
        let mut registry = StationRegistry::default();
        for (icao, pixel) in airports {
            let icao = icao.trim().to_uppercase();
            if icao.is_empty() || !icao.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(StationError::InvalidIdentifier(icao));
            }
            if let Some(existing) = registry.by_pixel.get(pixel) {
                return Err(StationError::DuplicatePixel {
                    pixel: *pixel,
                    first: registry.stations[*existing].icao.clone(),
                    second: icao,
                });
            }
            let slot = registry.stations.len();
            registry.by_pixel.insert(*pixel, slot);
            registry.by_icao.insert(icao.clone(), slot);
            registry.stations.push(Station { icao, pixel: *pixel });
        }
        Ok(registry)
    }

    /// Same as `new` but also checks every pixel fits on the strip.
    pub fn with_pixel_count(
        airports: &BTreeMap<String, usize>,
        pixel_count: usize,
    ) -> Result<Self, StationError> {
        let registry = Self::new(airports)?;
        if let Some(bad) = registry.stations.iter().find(|s| s.pixel >= pixel_count) {
            return Err(StationError::PixelOutOfRange {
                station: bad.icao.clone(),
                pixel: bad.pixel,
                pixel_count,
            });
        }
        Ok(registry)
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn identifiers(&self) -> Vec<String> {
        self.stations.iter().map(|s| s.icao.clone()).collect()
    }

    pub fn pixel_for(&self, icao: &str) -> Option<usize> {
        self.by_icao
            .get(&icao.to_uppercase())
            .map(|slot| self.stations[*slot].pixel)
    }

    /// Station wired to a pixel, `UNK` when the pixel is unused.
    pub fn station_for_pixel(&self, pixel: usize) -> &str {
        self.by_pixel
            .get(&pixel)
            .map(|slot| self.stations[*slot].icao.as_str())
            .unwrap_or(UNKNOWN_STATION)
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}
