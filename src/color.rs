/*
 *  color.rs
 *
 *  MetarLights - sectional map lights
 *	(c) 2020-26 Stuart Hunter
 *
 *	Weather and lighting state to pixel color
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
use serde::{Deserialize, Serialize};
use smart_leds::RGB8;

use crate::twilight::TwilightState;
use crate::weather::{FlightCategory, Precipitation};

pub type Rgb = RGB8;

pub const fn rgb(triple: [u8; 3]) -> Rgb {
    Rgb { r: triple[0], g: triple[1], b: triple[2] }
}

/// Configurable colors, stored as `[r, g, b]` in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Palette {
    pub vfr: [u8; 3],
    pub mvfr: [u8; 3],
    pub ifr: [u8; 3],
    pub lifr: [u8; 3],
    pub invalid: [u8; 3],
    pub inop: [u8; 3],
    pub night: [u8; 3],
    pub lightning: [u8; 3],
    pub off: [u8; 3],
    pub drizzle: [u8; 3],
    pub rain: [u8; 3],
    pub heavy_rain: [u8; 3],
    pub snow: [u8; 3],
    pub ice: [u8; 3],
    pub unknown_precipitation: [u8; 3],
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            vfr: [0, 255, 0],
            mvfr: [0, 0, 255],
            ifr: [255, 0, 0],
            lifr: [255, 0, 255],
            invalid: [255, 255, 255],
            inop: [128, 128, 128],
            night: [128, 128, 0],
            lightning: [255, 255, 0],
            off: [0, 0, 0],
            drizzle: [0, 192, 192],
            rain: [0, 128, 255],
            heavy_rain: [0, 0, 160],
            snow: [255, 255, 255],
            ice: [128, 0, 255],
            unknown_precipitation: [128, 128, 128],
        }
    }
}

impl Palette {
    pub fn category(&self, category: FlightCategory) -> Rgb {
        rgb(match category {
            FlightCategory::Vfr => self.vfr,
            FlightCategory::Mvfr => self.mvfr,
            FlightCategory::Ifr => self.ifr,
            FlightCategory::Lifr => self.lifr,
            FlightCategory::Invalid => self.invalid,
        })
    }

    pub fn precipitation(&self, precipitation: Precipitation) -> Rgb {
        rgb(match precipitation {
            Precipitation::Drizzle => self.drizzle,
            Precipitation::Rain => self.rain,
            Precipitation::HeavyRain => self.heavy_rain,
            Precipitation::Snow => self.snow,
            Precipitation::Ice => self.ice,
            Precipitation::Unknown => self.unknown_precipitation,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecipitationPolicy {
    #[default]
    Ignore,
    Override,
    Blend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorPolicy {
    pub lightning: bool,
    pub precipitation: PrecipitationPolicy,
}

impl Default for ColorPolicy {
    fn default() -> Self {
        Self { lightning: true, precipitation: PrecipitationPolicy::Ignore }
    }
}

/// Everything about a station's weather that feeds its color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationConditions {
    pub category: FlightCategory,
    pub precipitation: Option<Precipitation>,
    pub lightning: bool,
    pub inoperative: bool,
}

/// Linear mix from `from` (p = 0) to `to` (p = 1); `p` is clamped.
pub fn mix(from: Rgb, to: Rgb, p: f64) -> Rgb {
    let p = p.clamp(0.0, 1.0);
    let channel = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * p).round() as u8;
    Rgb { r: channel(from.r, to.r), g: channel(from.g, to.g), b: channel(from.b, to.b) }
}

/// Scales every channel by `brightness` (clamped to [0, 1]), truncating.
pub fn dim(color: Rgb, brightness: f64) -> Rgb {
    let brightness = brightness.clamp(0.0, 1.0);
    let channel = |c: u8| (f64::from(c) * brightness) as u8;
    Rgb { r: channel(color.r), g: channel(color.g), b: channel(color.b) }
}

/// 0..=255 around the wheel: green at 0, red at 85, blue at 170, back to green.
pub fn wheel(pos: u8) -> Rgb {
    match pos {
        0..=84 => Rgb { r: pos * 3, g: 255 - pos * 3, b: 0 },
        85..=169 => {
            let pos = pos - 85;
            Rgb { r: 255 - pos * 3, g: 0, b: pos * 3 }
        }
        _ => {
            let pos = pos - 170;
            Rgb { r: 0, g: pos * 3, b: 255 - pos * 3 }
        }
    }
}

/// Weather color before twilight and dimming.
fn weather_color(conditions: &StationConditions, palette: &Palette, policy: &ColorPolicy) -> Rgb {
    let mut color = palette.category(conditions.category);

    if let Some(precipitation) = conditions.precipitation {
        let precip = palette.precipitation(precipitation);
        color = match policy.precipitation {
            PrecipitationPolicy::Ignore => color,
            PrecipitationPolicy::Override => precip,
            PrecipitationPolicy::Blend => mix(color, precip, 0.5),
        };
    }

    if conditions.lightning && policy.lightning {
        color = rgb(palette.lightning);
    }
    color
}

/// Final pixel color for a station. Pure: the same inputs always give the
/// same color. Inoperative and INVALID stations ignore twilight so faults
/// stay visible at night. Dimming is applied last.
pub fn map_color(
    conditions: &StationConditions,
    twilight: TwilightState,
    brightness: f64,
    palette: &Palette,
    policy: &ColorPolicy,
) -> Rgb {
    if conditions.inoperative {
        return dim(rgb(palette.inop), brightness);
    }

    let color = weather_color(conditions, palette, policy);
    if conditions.category == FlightCategory::Invalid {
        return dim(color, brightness);
    }

    let night = rgb(palette.night);
    let lit = match twilight {
        TwilightState::Daylight => color,
        TwilightState::Night => night,
        TwilightState::Transitioning { off_to_night, night_to_color, .. } => {
            if off_to_night > 0.0 {
                mix(rgb(palette.off), night, off_to_night)
            } else {
                mix(night, color, night_to_color)
            }
        }
    };
    dim(lit, brightness)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::twilight::TwilightPhase;

    fn vfr() -> StationConditions {
        StationConditions {
            category: FlightCategory::Vfr,
            precipitation: None,
            lightning: false,
            inoperative: false,
        }
    }

    #[test]
    fn test_kdwh_vfr_daylight_is_undimmed_green() {
        let palette = Palette::default();
        let color = map_color(&vfr(), TwilightState::Daylight, 1.0, &palette, &ColorPolicy::default());
        assert_eq!(color, rgb(palette.vfr));
    }

    #[test]
    fn test_dim_idempotent_at_full_brightness() {
        for c in [Rgb { r: 1, g: 2, b: 3 }, Rgb { r: 255, g: 128, b: 0 }] {
            assert_eq!(dim(c, 1.0), c);
            assert_eq!(dim(dim(c, 1.0), 1.0), c);
        }
    }

    #[test]
    fn test_dim_scales_each_channel_truncating() {
        assert_eq!(dim(Rgb { r: 255, g: 101, b: 3 }, 0.5), Rgb { r: 127, g: 50, b: 1 });
        assert_eq!(dim(Rgb { r: 255, g: 255, b: 255 }, 0.0), Rgb { r: 0, g: 0, b: 0 });
        // out of range brightness is clamped
        assert_eq!(dim(Rgb { r: 200, g: 0, b: 0 }, 2.0), Rgb { r: 200, g: 0, b: 0 });
    }

    #[test]
    fn test_dimming_applied_last() {
        let palette = Palette::default();
        let policy = ColorPolicy::default();
        for twilight in [TwilightState::Daylight, TwilightState::Night] {
            let full = map_color(&vfr(), twilight, 1.0, &palette, &policy);
            assert_eq!(map_color(&vfr(), twilight, 0.3, &palette, &policy), dim(full, 0.3));
        }
    }

    #[test]
    fn test_inoperative_overrides_category() {
        let palette = Palette::default();
        let mut conditions = vfr();
        conditions.inoperative = true;
        conditions.lightning = true;
        let color = map_color(&conditions, TwilightState::Night, 1.0, &palette, &ColorPolicy::default());
        assert_eq!(color, rgb(palette.inop));
    }

    #[test]
    fn test_lightning_policy() {
        let palette = Palette::default();
        let mut conditions = vfr();
        conditions.lightning = true;

        let on = map_color(&conditions, TwilightState::Daylight, 1.0, &palette, &ColorPolicy::default());
        assert_eq!(on, rgb(palette.lightning));

        let policy = ColorPolicy { lightning: false, ..ColorPolicy::default() };
        let off = map_color(&conditions, TwilightState::Daylight, 1.0, &palette, &policy);
        assert_eq!(off, rgb(palette.vfr));
    }

    #[test]
    fn test_precipitation_policies() {
        let palette = Palette::default();
        let mut conditions = vfr();
        conditions.precipitation = Some(Precipitation::Snow);

        let mut policy = ColorPolicy::default();
        assert_eq!(map_color(&conditions, TwilightState::Daylight, 1.0, &palette, &policy), rgb(palette.vfr));

        policy.precipitation = PrecipitationPolicy::Override;
        assert_eq!(map_color(&conditions, TwilightState::Daylight, 1.0, &palette, &policy), rgb(palette.snow));

        policy.precipitation = PrecipitationPolicy::Blend;
        let blended = map_color(&conditions, TwilightState::Daylight, 1.0, &palette, &policy);
        assert_eq!(blended, Rgb { r: 128, g: 255, b: 128 });
    }

    #[test]
    fn test_twilight_mixes() {
        let palette = Palette::default();
        let policy = ColorPolicy::default();
        let night = map_color(&vfr(), TwilightState::Night, 1.0, &palette, &policy);
        assert_eq!(night, rgb(palette.night));

        let halfway = TwilightState::Transitioning {
            phase: TwilightPhase::Sunrise,
            off_to_night: 0.0,
            night_to_color: 0.5,
        };
        assert_eq!(map_color(&vfr(), halfway, 1.0, &palette, &policy), Rgb { r: 64, g: 192, b: 0 });

        let dusk = TwilightState::Transitioning {
            phase: TwilightPhase::Dusk,
            off_to_night: 0.25,
            night_to_color: 0.0,
        };
        assert_eq!(map_color(&vfr(), dusk, 1.0, &palette, &policy), Rgb { r: 32, g: 32, b: 0 });
    }

    #[test]
    fn test_invalid_ignores_twilight() {
        let palette = Palette::default();
        let conditions = StationConditions { category: FlightCategory::Invalid, ..vfr() };
        let color = map_color(&conditions, TwilightState::Night, 1.0, &palette, &ColorPolicy::default());
        assert_eq!(color, rgb(palette.invalid));
    }

    #[test]
    fn test_wheel_segments() {
        assert_eq!(wheel(0), Rgb { r: 0, g: 255, b: 0 });
        assert_eq!(wheel(85), Rgb { r: 255, g: 0, b: 0 });
        assert_eq!(wheel(170), Rgb { r: 0, g: 0, b: 255 });
        assert_eq!(wheel(255), Rgb { r: 0, g: 255, b: 0 });
    }
}
