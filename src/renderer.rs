/*
 *  renderer.rs
 *
 *  MetarLights - sectional map lights
 *	(c) 2020-26 Stuart Hunter
 *
 *	Pixel strip abstraction and in-memory strip
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
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::color::Rgb;

#[derive(Debug, Error)]
pub enum RendererError {
    #[error("pixel {index} out of range, strip has {pixel_count}")]
    IndexOutOfRange { index: usize, pixel_count: usize },
    #[error("failed to push pixels to the strip: {0}")]
    Show(String),
}

/// A strip of individually addressed RGB pixels.
///
/// `set_led` and `set_all` only touch the buffer; nothing reaches the strip
/// until `show`.
pub trait PixelRenderer: Send {
    fn pixel_count(&self) -> usize;

    fn set_led(&mut self, index: usize, color: Rgb) -> Result<(), RendererError>;

    fn set_all(&mut self, color: Rgb) -> Result<(), RendererError>;

    fn show(&mut self) -> Result<(), RendererError>;

    /// Turns every pixel off and shows the result.
    fn clear(&mut self) -> Result<(), RendererError>;

    /// Current buffer contents.
    fn pixels(&self) -> &[Rgb];
}

/// Counters shared with whoever holds `state()`, so tests can inspect a
/// renderer that has been moved into a scheduler.
#[derive(Debug, Default)]
pub struct MemoryRendererState {
    pub show_count: usize,
    pub clear_count: usize,
    /// Last frame pushed by `show` or `clear`.
    pub shown: Vec<Rgb>,
    pub simulate_show_failure: bool,
}

/// Renderer with no hardware behind it, used by the emulated mode and tests.
#[derive(Debug, Clone)]
pub struct MemoryRenderer {
    pixels: Vec<Rgb>,
    state: Arc<Mutex<MemoryRendererState>>,
}

impl MemoryRenderer {
    pub fn new(pixel_count: usize) -> Self {
        Self {
            pixels: vec![Rgb::default(); pixel_count],
            state: Arc::new(Mutex::new(MemoryRendererState {
                shown: vec![Rgb::default(); pixel_count],
                ..Default::default()
            })),
        }
    }

    pub fn state(&self) -> Arc<Mutex<MemoryRendererState>> {
        Arc::clone(&self.state)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryRendererState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PixelRenderer for MemoryRenderer {
    fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    fn set_led(&mut self, index: usize, color: Rgb) -> Result<(), RendererError> {
        let pixel_count = self.pixels.len();
        let pixel = self
            .pixels
            .get_mut(index)
            .ok_or(RendererError::IndexOutOfRange { index, pixel_count })?;
        *pixel = color;
        Ok(())
    }

    fn set_all(&mut self, color: Rgb) -> Result<(), RendererError> {
        self.pixels.fill(color);
        Ok(())
    }

    fn show(&mut self) -> Result<(), RendererError> {
        let frame = self.pixels.clone();
        let mut state = self.lock();
        if state.simulate_show_failure {
            return Err(RendererError::Show("simulated failure".to_string()));
        }
        state.show_count += 1;
        state.shown = frame;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), RendererError> {
        self.pixels.fill(Rgb::default());
        let mut state = self.lock();
        state.clear_count += 1;
        state.shown = self.pixels.clone();
        Ok(())
    }

    fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }
}
