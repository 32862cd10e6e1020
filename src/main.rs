/*
 *  main.rs
 *
 *  MetarLights - sectional map lights
 *	(c) 2020-26 Stuart Hunter
 *
 *	Startup, background services and shutdown
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
use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;

use metarlights::config::{self, Cli, ConfigWatcher, SettingsHandle};
use metarlights::renderer::{MemoryRenderer, PixelRenderer};
use metarlights::scheduler::RenderScheduler;
use metarlights::twilight::{TwilightCalculator, spawn_initialize_retry};
use metarlights::visualizers::{
    FlightRulesVisualizer, LightCycleVisualizer, RainbowVisualizer, Visualization,
};
use metarlights::weather::{
    HttpTransport, MetarAdapter, SunTimesAdapter, Transport, WeatherCache, WeatherFetcher,
    WeatherPoller, WeatherService,
};

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Waits for SIGINT, SIGTERM or SIGHUP.
async fn signal_handler() -> Result<(), Box<dyn std::error::Error>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let loaded = config::load(&cli);

    let default_level = match &loaded {
        Ok(cfg) => cfg.log_level.clone().unwrap_or_else(|| "info".to_string()),
        Err(_) if cli.debug => "debug".to_string(),
        Err(_) => "info".to_string(),
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    info!("{} lights the sectional", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    let cfg = loaded.inspect_err(|e| error!("Configuration failed: {}", e))?;
    if cli.dump_config {
        print!("{}", cfg.to_yaml()?);
        return Ok(());
    }

    let registry = Arc::new(cfg.station_registry()?);
    let stations = registry.identifiers();
    info!("{} stations across {} pixels", registry.len(), cfg.pixel_count());

    let weather_cfg = cfg.weather();
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(
        weather_cfg.api_service_base(),
        weather_cfg.api_key(),
        weather_cfg.request_timeout(),
    )?);

    let twilight = Arc::new(TwilightCalculator::new(WeatherFetcher::new(
        SunTimesAdapter,
        Arc::clone(&transport),
    )));
    let mut twilight_retry = None;
    if !stations.is_empty() {
        if let Err(e) = twilight.initialize(&stations).await {
            error!("Suntimes unavailable, stations show daylight until they load: {}", e);
            twilight_retry = Some(spawn_initialize_retry(
                Arc::clone(&twilight),
                stations.clone(),
                weather_cfg.poll_interval(),
            ));
        }
    }

    let service = Arc::new(
        WeatherService::new(
            WeatherFetcher::new(MetarAdapter, Arc::clone(&transport)),
            WeatherCache::new(weather_cfg.cache_ttl(), weather_cfg.rate_limit()),
        )
        .with_lifespan(weather_cfg.metar_lifespan()),
    );
    let initial = service.refresh(&stations).await;
    let valid = initial.values().filter(|r| r.is_valid()).count();
    if valid < stations.len() {
        warn!("Initial weather: {}/{} stations valid", valid, stations.len());
    } else {
        info!("Initial weather: {}/{} stations valid", valid, stations.len());
    }

    let mut renderer = MemoryRenderer::new(cfg.pixel_count());
    renderer.clear()?;

    let visualizations: Vec<Box<dyn Visualization>> = vec![
        Box::new(FlightRulesVisualizer::new(
            Arc::clone(&registry),
            Arc::clone(&service),
            Arc::clone(&twilight),
            cfg.palette(),
            cfg.policy(),
        )),
        Box::new(RainbowVisualizer::new()),
        Box::new(LightCycleVisualizer::new()),
    ];

    let settings = SettingsHandle::new(cfg.runtime_settings());
    let mut poller = WeatherPoller::start(Arc::clone(&service), stations, weather_cfg.poll_interval());
    let mut watcher = config::resolve_path(&cli)?
        .map(|path| ConfigWatcher::start(path, settings.clone(), CONFIG_POLL_INTERVAL));

    let mut scheduler = RenderScheduler::new(
        Box::new(renderer),
        visualizations,
        settings.subscribe(),
        Arc::clone(&registry),
    );
    let (stop_tx, stop_rx) = mpsc::channel(1);

    let render = scheduler.run(stop_rx);
    tokio::pin!(render);
    let signalled = tokio::select! {
        result = signal_handler() => {
            if let Err(e) = result {
                error!("Signal handler failed: {}", e);
            }
            true
        }
        result = &mut render => {
            if let Err(e) = result {
                error!("Render loop ended: {}", e);
            }
            false
        }
    };
    if signalled && stop_tx.send(()).await.is_ok() {
        if let Err(e) = render.await {
            error!("Failed to turn pixels off: {}", e);
        }
    }

    if let Some(retry) = twilight_retry {
        retry.abort();
    }
    poller.stop().await;
    if let Some(watcher) = watcher.as_mut() {
        watcher.stop().await;
    }
    info!("Shutdown complete");
    Ok(())
}
