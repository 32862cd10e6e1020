/*
 *  pacer.rs
 *
 *  MetarLights - sectional map lights
 *	(c) 2020-26 Stuart Hunter
 *
 *	Frame pacing for visualizations
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
use std::time::Duration;
use tokio::time::{Instant, sleep_until};

/// The render loop never sleeps on its own, each visualization paces itself
/// by awaiting one of these once per update.
#[derive(Debug, Clone)]
pub struct FramePacer {
    next_deadline: Option<Instant>,
    frame: Duration,
}

// a WS2801 strip of ~100 pixels manages well over 100fps,
// weather colors change slowly so they need far less
impl FramePacer {
    /// `target_fps` of 0 disables pacing.
    pub fn new(target_fps: u32) -> Self {
        let frame = if target_fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(1_000_000 / u64::from(target_fps))
        };
        Self { next_deadline: None, frame }
    }

    pub fn unpaced() -> Self {
        Self::new(0)
    }

    #[inline]
    pub fn set_fps(&mut self, fps: u32) {
        *self = Self { next_deadline: self.next_deadline, ..Self::new(fps) };
    }

    pub fn frame(&self) -> Duration {
        self.frame
    }

    /// Sleeps until the next frame is due. The first call returns at once;
    /// a caller that fell behind is not made to catch up.
    pub async fn wait(&mut self) {
        if self.frame.is_zero() {
            return;
        }
        let now = Instant::now();
        let deadline = self.next_deadline.unwrap_or(now);
        if deadline > now {
            sleep_until(deadline).await;
        }
        self.next_deadline = Some(deadline.max(now) + self.frame);
    }
}
