/*
 *  visualizers/flight_rules.rs
 *
 *  MetarLights - sectional map lights
 *	(c) 2020-26 Stuart Hunter
 *
 *	Flight rules colors per station
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
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::trace;
use std::sync::Arc;

use super::{Visualization, VisualizationError};
use crate::color::{ColorPolicy, Palette, StationConditions, map_color};
use crate::config::RuntimeSettings;
use crate::pacer::FramePacer;
use crate::renderer::PixelRenderer;
use crate::stations::StationRegistry;
use crate::twilight::TwilightCalculator;
use crate::weather::WeatherService;

// weather only changes when the poller lands a new report
const FLIGHT_RULES_FPS: u32 = 4;

/// Colors each station's pixel from its cached report and its twilight.
/// METARs come from the cache only. Stale suntimes are reloaded inline by
/// `TwilightCalculator::twilight_state`, at most once per station every ten
/// minutes.
pub struct FlightRulesVisualizer {
    registry: Arc<StationRegistry>,
    weather: Arc<WeatherService>,
    twilight: Arc<TwilightCalculator>,
    palette: Palette,
    policy: ColorPolicy,
    clock: fn() -> DateTime<Utc>,
    pacer: FramePacer,
}

impl FlightRulesVisualizer {
    pub fn new(
        registry: Arc<StationRegistry>,
        weather: Arc<WeatherService>,
        twilight: Arc<TwilightCalculator>,
        palette: Palette,
        policy: ColorPolicy,
    ) -> Self {
        Self {
            registry,
            weather,
            twilight,
            palette,
            policy,
            clock: Utc::now,
            pacer: FramePacer::new(FLIGHT_RULES_FPS),
        }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_pacer(mut self, pacer: FramePacer) -> Self {
        self.pacer = pacer;
        self
    }

    fn conditions(&self, icao: &str, inactive_minutes: u32, now: DateTime<Utc>) -> StationConditions {
        StationConditions {
            category: self.weather.category(icao),
            precipitation: self.weather.precipitation(icao),
            lightning: self.weather.has_lightning(icao),
            inoperative: self.weather.is_station_inoperative(icao, inactive_minutes, now),
        }
    }
}

#[async_trait]
impl Visualization for FlightRulesVisualizer {
    fn name(&self) -> &'static str {
        "flight_rules"
    }

    async fn update(
        &mut self,
        renderer: &mut dyn PixelRenderer,
        _delta_seconds: f64,
        settings: &RuntimeSettings,
    ) -> Result<(), VisualizationError> {
        let now = (self.clock)();
        for station in self.registry.stations() {
            let conditions = self.conditions(&station.icao, settings.inactive_minutes, now);
            let twilight = self.twilight.twilight_state(&station.icao, now).await;
            let color = map_color(&conditions, twilight, settings.brightness, &self.palette, &self.policy);
            trace!("{} {} {:?} -> {:?}", station.icao, conditions.category, twilight, color);
            renderer.set_led(station.pixel, color)?;
        }
        renderer.show()?;
        self.pacer.wait().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{Rgb, dim, rgb};
    use crate::renderer::MemoryRenderer;
    use crate::twilight::TwilightTimes;
    use crate::weather::fetcher::tests::RecordingTransport;
    use crate::weather::provider::SunTimesRecord;
    use crate::weather::{MetarAdapter, SunTimesAdapter, WeatherCache, WeatherFetcher};
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;

    fn noon_ten() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 10, 0).unwrap()
    }

    fn evening() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 50, 0).unwrap()
    }

    async fn visualizer(airports: &[(&str, usize)]) -> (FlightRulesVisualizer, Arc<TwilightCalculator>) {
        let map: BTreeMap<String, usize> = airports.iter().map(|(s, p)| (s.to_string(), *p)).collect();
        let registry = Arc::new(StationRegistry::with_pixel_count(&map, 4).unwrap());

        let transport = Arc::new(RecordingTransport::default());
        let service = Arc::new(WeatherService::new(
            WeatherFetcher::new(MetarAdapter, transport.clone()),
            WeatherCache::default(),
        ));
        service.refresh_at(&registry.identifiers(), noon_ten()).await;

        let twilight = Arc::new(TwilightCalculator::new(WeatherFetcher::new(SunTimesAdapter, transport)));
        let viz = FlightRulesVisualizer::new(
            registry,
            service,
            twilight.clone(),
            Palette::default(),
            ColorPolicy::default(),
        )
        .with_clock(noon_ten)
        .with_pacer(FramePacer::unpaced());
        (viz, twilight)
    }

    #[tokio::test]
    async fn test_vfr_station_is_green_in_daylight() {
        let (mut viz, _) = visualizer(&[("KDWH", 1)]).await;
        let mut renderer = MemoryRenderer::new(4);
        let settings = RuntimeSettings { brightness: 1.0, ..RuntimeSettings::default() };

        viz.update(&mut renderer, 0.25, &settings).await.unwrap();

        assert_eq!(renderer.pixels()[1], rgb(Palette::default().vfr));
        assert_eq!(renderer.pixels()[0], Rgb::default());
        assert_eq!(renderer.state().lock().unwrap().show_count, 1);
    }

    #[tokio::test]
    async fn test_missing_report_shows_inoperative() {
        let (mut viz, _) = visualizer(&[("KDWH", 0), ("BADX", 2)]).await;
        let mut renderer = MemoryRenderer::new(4);
        let settings = RuntimeSettings { brightness: 0.5, ..RuntimeSettings::default() };

        viz.update(&mut renderer, 0.25, &settings).await.unwrap();

        let palette = Palette::default();
        assert_eq!(renderer.pixels()[0], dim(rgb(palette.vfr), 0.5));
        assert_eq!(renderer.pixels()[2], dim(rgb(palette.inop), 0.5));
    }

    #[tokio::test]
    async fn test_old_observation_goes_inoperative() {
        let (viz, _) = visualizer(&[("KDWH", 0)]).await;
        let mut viz = viz.with_clock(evening);
        let mut renderer = MemoryRenderer::new(4);
        let settings = RuntimeSettings { brightness: 1.0, inactive_minutes: 30, ..RuntimeSettings::default() };

        viz.update(&mut renderer, 0.25, &settings).await.unwrap();

        assert_eq!(renderer.pixels()[0], rgb(Palette::default().inop));
    }

    #[tokio::test]
    async fn test_station_at_night_uses_night_color() {
        let (mut viz, twilight) = visualizer(&[("KDWH", 3)]).await;
        let now = noon_ten();
        // sun set a few hours ago
        let sunrise = now - Duration::hours(14);
        let sunset = now - Duration::hours(3);
        twilight.insert(
            "KDWH",
            SunTimesRecord {
                times: TwilightTimes::from_sun_events(
                    sunrise - Duration::minutes(30),
                    sunrise,
                    sunset,
                    sunset + Duration::minutes(30),
                ),
                location: None,
            },
        );
        let mut renderer = MemoryRenderer::new(4);
        let settings = RuntimeSettings { brightness: 1.0, ..RuntimeSettings::default() };

        viz.update(&mut renderer, 0.25, &settings).await.unwrap();

        assert_eq!(renderer.pixels()[3], rgb(Palette::default().night));
    }
}
