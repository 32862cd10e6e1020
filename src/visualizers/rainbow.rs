/*
 *  visualizers/rainbow.rs
 *
 *  MetarLights - sectional map lights
 *	(c) 2020-26 Stuart Hunter
 *
 *	Color wheel animations
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

use super::{Visualization, VisualizationError};
use crate::color::{dim, wheel};
use crate::config::RuntimeSettings;
use crate::pacer::FramePacer;
use crate::renderer::PixelRenderer;

/// wheel positions advanced per second
const DEFAULT_SPEED: f64 = 64.0;
const DEFAULT_FPS: u32 = 30;

/// Position on the 256 step wheel, advanced by elapsed time.
#[derive(Debug, Clone)]
struct WheelClock {
    position: f64,
    speed: f64,
}

impl WheelClock {
    fn advance(&mut self, delta_seconds: f64) -> u8 {
        if delta_seconds.is_finite() && delta_seconds > 0.0 {
            self.position = (self.position + delta_seconds * self.speed).rem_euclid(256.0);
        }
        self.position as u8
    }
}

/// Spreads the whole wheel across the strip and rotates it.
pub struct RainbowVisualizer {
    clock: WheelClock,
    pacer: FramePacer,
}

impl RainbowVisualizer {
    pub fn new() -> Self {
        Self {
            clock: WheelClock { position: 0.0, speed: DEFAULT_SPEED },
            pacer: FramePacer::new(DEFAULT_FPS),
        }
    }

    pub fn with_speed(mut self, positions_per_second: f64) -> Self {
        self.clock.speed = positions_per_second;
        self
    }

    pub fn with_pacer(mut self, pacer: FramePacer) -> Self {
        self.pacer = pacer;
        self
    }
}

impl Default for RainbowVisualizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Visualization for RainbowVisualizer {
    fn name(&self) -> &'static str {
        "rainbow"
    }

    async fn update(
        &mut self,
        renderer: &mut dyn PixelRenderer,
        delta_seconds: f64,
        settings: &RuntimeSettings,
    ) -> Result<(), VisualizationError> {
        let offset = usize::from(self.clock.advance(delta_seconds));
        let pixel_count = renderer.pixel_count();
        for i in 0..pixel_count {
            let pos = ((i * 256 / pixel_count) + offset) & 255;
            renderer.set_led(i, dim(wheel(pos as u8), settings.brightness))?;
        }
        renderer.show()?;
        self.pacer.wait().await;
        Ok(())
    }
}

/// Whole strip one color, cycling the wheel.
pub struct LightCycleVisualizer {
    clock: WheelClock,
    pacer: FramePacer,
}

impl LightCycleVisualizer {
    pub fn new() -> Self {
        Self {
            clock: WheelClock { position: 0.0, speed: DEFAULT_SPEED },
            pacer: FramePacer::new(DEFAULT_FPS),
        }
    }

    pub fn with_speed(mut self, positions_per_second: f64) -> Self {
        self.clock.speed = positions_per_second;
        self
    }

    pub fn with_pacer(mut self, pacer: FramePacer) -> Self {
        self.pacer = pacer;
        self
    }
}

impl Default for LightCycleVisualizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Visualization for LightCycleVisualizer {
    fn name(&self) -> &'static str {
        "light_cycle"
    }

    async fn update(
        &mut self,
        renderer: &mut dyn PixelRenderer,
        delta_seconds: f64,
        settings: &RuntimeSettings,
    ) -> Result<(), VisualizationError> {
        let pos = self.clock.advance(delta_seconds);
        renderer.set_all(dim(wheel(pos), settings.brightness))?;
        renderer.show()?;
        self.pacer.wait().await;
        Ok(())
    }
}
