/*
 *  tests/weather_pipeline.rs
 *
 *  Weather and twilight through to pixel colors
 *
 *  MetarLights - sectional map lights
 *  (c) 2020-26 Stuart Hunter
 */

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use metarlights::color::{Palette, Rgb, dim, rgb};
use metarlights::config::{RuntimeSettings, SettingsHandle};
use metarlights::pacer::FramePacer;
use metarlights::renderer::{MemoryRenderer, PixelRenderer};
use metarlights::scheduler::RenderScheduler;
use metarlights::stations::StationRegistry;
use metarlights::twilight::{TwilightCalculator, TwilightState};
use metarlights::visualizers::{FlightRulesVisualizer, RainbowVisualizer, Visualization};
use metarlights::weather::{
    FlightCategory, MetarAdapter, SunTimesAdapter, Transport, WeatherCache, WeatherError,
    WeatherFetcher, WeatherService,
};
use metarlights::ColorPolicy;

/// Answers from canned per-station entries and counts requests.
#[derive(Default)]
struct CannedTransport {
    metars: HashMap<String, Value>,
    suntimes: HashMap<String, Value>,
    requests: Mutex<Vec<String>>,
}

impl CannedTransport {
    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for CannedTransport {
    async fn get(&self, path: &str) -> Result<String, WeatherError> {
        self.requests.lock().unwrap().push(path.to_string());
        let (source, ids) = if let Some(rest) = path.strip_prefix("metar/") {
            (&self.metars, rest.trim_end_matches("/decoded"))
        } else if let Some(rest) = path.strip_prefix("station/") {
            (&self.suntimes, rest.trim_end_matches("/suntimes?iso=1"))
        } else {
            return Err(WeatherError::Status { status: 404, path: path.to_string() });
        };
        let data: Vec<Value> = ids.split(',').filter_map(|id| source.get(id).cloned()).collect();
        Ok(json!({ "results": data.len(), "data": data }).to_string())
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2022, 9, 12, 18, 0, 0).unwrap()
}

fn metar(station: &str, category: &str, raw: &str) -> Value {
    json!({
        "icao": station,
        "flight_category": category,
        "observed": "2022-09-12T17:53Z",
        "temperature": {"celsius": 31},
        "barometer": {"hg": 29.92},
        "visibility": {"miles": 10.0},
        "raw_text": format!("{} {}", station, raw),
    })
}

fn suntimes(station: &str) -> Value {
    json!({
        "icao": station,
        "geometry": {"coordinates": [-95.5528, 30.0618]},
        "sunrise_sunset": {"utc": {
            "dawn": "2022-09-12T11:00:00",
            "sunrise": "2022-09-12T11:25:00",
            "sunset": "2022-09-12T23:40:00",
            "dusk": "2022-09-13T00:05:00",
        }},
    })
}

fn transport() -> Arc<CannedTransport> {
    let mut t = CannedTransport::default();
    t.metars.insert("KDWH".into(), metar("KDWH", "VFR", "121753Z 18010KT 10SM CLR 31/22 A2992"));
    t.metars.insert("KIAH".into(), metar("KIAH", "VFR", "121753Z 18010KT 10SM TS LTG DSNT W 30/22 A2992"));
    t.metars.insert("KHOU".into(), metar("KHOU", "IFR", "121753Z 18010KT 2SM BR OVC004 25/24 A2990"));
    for id in ["KDWH", "KIAH", "KHOU"] {
        t.suntimes.insert(id.into(), suntimes(id));
    }
    Arc::new(t)
}

fn registry() -> Arc<StationRegistry> {
    let airports: BTreeMap<String, usize> = [("KDWH", 0), ("KIAH", 1), ("KHOU", 2), ("KSGR", 4)]
        .into_iter()
        .map(|(s, p)| (s.to_string(), p))
        .collect();
    Arc::new(StationRegistry::with_pixel_count(&airports, 6).unwrap())
}

async fn services(transport: Arc<CannedTransport>) -> (Arc<WeatherService>, Arc<TwilightCalculator>) {
    let service = Arc::new(WeatherService::new(
        WeatherFetcher::new(MetarAdapter, transport.clone()),
        WeatherCache::default(),
    ));
    let twilight = Arc::new(TwilightCalculator::new(WeatherFetcher::new(SunTimesAdapter, transport)));
    (service, twilight)
}

#[tokio::test]
async fn test_startup_refresh_then_cached() {
    let transport = transport();
    let (service, twilight) = services(transport.clone()).await;
    let stations = registry().identifiers();

    assert_eq!(twilight.initialize(&stations).await.unwrap(), 3);
    let first = service.refresh_at(&stations, now()).await;
    assert_eq!(transport.request_count(), 2);
    assert_eq!(first.values().filter(|r| r.is_valid()).count(), 3);
    assert!(!first["KSGR"].is_valid());

    // a second pass inside the TTL goes nowhere near the network
    service.refresh_at(&stations, now()).await;
    assert_eq!(transport.request_count(), 2);

    assert_eq!(service.category("KHOU"), FlightCategory::Ifr);
    assert!(service.has_lightning("KIAH"));
    assert!(!service.has_lightning("KDWH"));
    assert!(service.is_station_inoperative("KSGR", 90, now()));
    assert!(!service.is_station_inoperative("KDWH", 90, now()));
    assert_eq!(twilight.twilight_state("KDWH", now()).await, TwilightState::Daylight);
}

#[tokio::test]
async fn test_scheduler_paints_flight_rules() {
    let (service, twilight) = services(transport()).await;
    let registry = registry();
    twilight.initialize(&registry.identifiers()).await.unwrap();
    service.refresh_at(&registry.identifiers(), now()).await;

    let visualizations: Vec<Box<dyn Visualization>> = vec![
        Box::new(
            FlightRulesVisualizer::new(
                registry.clone(),
                service,
                twilight,
                Palette::default(),
                ColorPolicy::default(),
            )
            .with_clock(now)
            .with_pacer(FramePacer::unpaced()),
        ),
        Box::new(RainbowVisualizer::new().with_pacer(FramePacer::unpaced())),
    ];
    let renderer = MemoryRenderer::new(6);
    let state = renderer.state();
    let settings = SettingsHandle::new(RuntimeSettings {
        visualizer_index: 0,
        brightness: 1.0,
        inactive_minutes: 90,
    });
    let mut scheduler =
        RenderScheduler::new(Box::new(renderer), visualizations, settings.subscribe(), registry);

    scheduler.tick().await;

    let palette = Palette::default();
    let pixels = scheduler.renderer().pixels().to_vec();
    assert_eq!(pixels[0], rgb(palette.vfr));
    assert_eq!(pixels[1], rgb(palette.lightning));
    assert_eq!(pixels[2], rgb(palette.ifr));
    assert_eq!(pixels[3], Rgb::default());
    assert_eq!(pixels[4], rgb(palette.inop));
    assert_eq!(state.lock().unwrap().shown, pixels);

    settings.set_brightness(0.5).unwrap();
    scheduler.tick().await;
    assert_eq!(scheduler.renderer().pixels()[2], dim(rgb(palette.ifr), 0.5));

    settings.set_visualizer(1);
    scheduler.tick().await;
    assert_eq!(scheduler.active_index(), Some(1));
    assert_eq!(state.lock().unwrap().clear_count, 1);
}
