/*
 *  visualizers/mod.rs
 *
 *  MetarLights - sectional map lights
 *	(c) 2020-26 Stuart Hunter
 *
 *	Pixel animations driven by the render scheduler
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
//! Visualizations the scheduler can switch between.
//!
//! An implementation is called once per scheduler tick with the seconds
//! elapsed since the previous tick. The scheduler never sleeps between
//! ticks, so every visualization must pace itself (see `FramePacer`) or it
//! will spin a core.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::RuntimeSettings;
use crate::renderer::{PixelRenderer, RendererError};

pub mod flight_rules;
pub mod rainbow;

pub use flight_rules::FlightRulesVisualizer;
pub use rainbow::{LightCycleVisualizer, RainbowVisualizer};

#[derive(Debug, Error)]
pub enum VisualizationError {
    #[error("renderer error: {0}")]
    Renderer(#[from] RendererError),
    #[error("visualization render error: {0}")]
    Render(String),
}

#[async_trait]
pub trait Visualization: Send {
    fn name(&self) -> &'static str;

    /// Draws one frame. Must be safe to call on every tick.
    async fn update(
        &mut self,
        renderer: &mut dyn PixelRenderer,
        delta_seconds: f64,
        settings: &RuntimeSettings,
    ) -> Result<(), VisualizationError>;
}
