/*
 *  lib.rs
 *
 *  MetarLights - sectional map lights
 *	(c) 2020-26 Stuart Hunter
 *
 *	Weather, twilight and pixel pipeline
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
pub mod color;
pub mod config;
pub mod pacer;
pub mod renderer;
pub mod scheduler;
pub mod stations;
pub mod sun;
pub mod twilight;
pub mod visualizers;
pub mod weather;

pub use color::{ColorPolicy, Palette, Rgb, StationConditions, map_color};
pub use config::{Config, RuntimeSettings, SettingsHandle};
pub use renderer::{MemoryRenderer, PixelRenderer};
pub use scheduler::RenderScheduler;
pub use stations::StationRegistry;
pub use twilight::{TwilightCalculator, TwilightState};
pub use weather::{WeatherError, WeatherService};
