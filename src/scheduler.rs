/*
 *  scheduler.rs
 *
 *  MetarLights - sectional map lights
 *	(c) 2020-26 Stuart Hunter
 *
 *	Render loop, picks the active visualization each tick
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
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::config::RuntimeSettings;
use crate::renderer::{PixelRenderer, RendererError};
use crate::stations::StationRegistry;
use crate::visualizers::Visualization;

const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(60);

/// Drives one visualization per tick. A failing visualization is logged and
/// the loop carries on with the next tick.
pub struct RenderScheduler {
    renderer: Box<dyn PixelRenderer>,
    visualizations: Vec<Box<dyn Visualization>>,
    settings: watch::Receiver<RuntimeSettings>,
    registry: Arc<StationRegistry>,
    active: Option<usize>,
    last_tick: Option<Instant>,
    last_snapshot: Option<Instant>,
}

impl RenderScheduler {
    pub fn new(
        renderer: Box<dyn PixelRenderer>,
        visualizations: Vec<Box<dyn Visualization>>,
        settings: watch::Receiver<RuntimeSettings>,
        registry: Arc<StationRegistry>,
    ) -> Self {
        Self {
            renderer,
            visualizations,
            settings,
            registry,
            active: None,
            last_tick: None,
            last_snapshot: None,
        }
    }

    /// Index of the visualization that ran on the last tick.
    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn renderer(&self) -> &dyn PixelRenderer {
        self.renderer.as_ref()
    }

    fn resolve_index(&self, requested: usize) -> usize {
        if requested < self.visualizations.len() {
            requested
        } else {
            0
        }
    }

    /// Runs a single frame of the selected visualization.
    pub async fn tick(&mut self) {
        if self.visualizations.is_empty() {
            return;
        }
        // one snapshot per tick, a publish mid-frame lands on the next one
        let settings = *self.settings.borrow_and_update();
        let index = self.resolve_index(settings.visualizer_index);
        if index != settings.visualizer_index && self.active != Some(index) {
            warn!(
                "Visualizer index {} out of range ({} available), using 0",
                settings.visualizer_index,
                self.visualizations.len()
            );
        }

        if self.active != Some(index) {
            if self.active.is_some() {
                if let Err(e) = self.renderer.clear() {
                    error!("Failed to clear pixels on visualizer switch: {}", e);
                }
            }
            info!("Visualizer {} ({}) active", index, self.visualizations[index].name());
            self.active = Some(index);
        }

        let now = Instant::now();
        let delta_seconds = self
            .last_tick
            .map(|last| now.duration_since(last).as_secs_f64())
            .unwrap_or(0.0);
        self.last_tick = Some(now);

        let visualization = &mut self.visualizations[index];
        if let Err(e) = visualization
            .update(self.renderer.as_mut(), delta_seconds, &settings)
            .await
        {
            error!("Visualizer {} failed: {}", visualization.name(), e);
        }

        if self.last_snapshot.is_none_or(|last| now.duration_since(last) >= SNAPSHOT_INTERVAL) {
            self.last_snapshot = Some(now);
            info!("Pixels: {}", self.snapshot());
        }
    }

    /// `[station/index]=color` for every pixel on the strip.
    pub fn snapshot(&self) -> String {
        self.renderer
            .pixels()
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[{}/{}]=({},{},{})", self.registry.station_for_pixel(i), i, c.r, c.g, c.b))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Ticks until `stop` fires or its sender is dropped, then turns the
    /// strip off.
    pub async fn run(&mut self, mut stop: mpsc::Receiver<()>) -> Result<(), RendererError> {
        info!("Render loop started with {} visualizers", self.visualizations.len());
        loop {
            tokio::select! {
                biased;
                _ = stop.recv() => break,
                _ = self.tick() => {}
            }
            tokio::task::yield_now().await;
        }
        info!("Render loop stopping, clearing pixels");
        self.renderer.clear()?;
        self.renderer.show()
    }
}
