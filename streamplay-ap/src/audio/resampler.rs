//! Sample rate conversion using rubato
//!
//! Used by the hardware output when the device cannot run at the track's own
//! sample rate. Units are converted one at a time as they are started, but
//! always as slices of one continuous conversion of the track (see
//! `UnitResampler`), so consecutive units join without a gap or a click.

use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use std::ops::Range;
use tracing::debug;

/// Input frames converted ahead of and after each unit
const CONTEXT_FRAMES: usize = 64;

/// Stateless planar resampler.
pub struct Resampler;

impl Resampler {
    /// Resample planar audio from `input_rate` to `output_rate`.
    ///
    /// # Arguments
    /// - `planes`: one slice per channel, all the same length
    /// - `input_rate`: sample rate of `planes`
    /// - `output_rate`: device sample rate
    ///
    /// # Returns
    /// Planar audio at `output_rate`; a copy when the rates already match
    pub fn resample(planes: &[&[f32]], input_rate: u32, output_rate: u32) -> Result<Vec<Vec<f32>>> {
        let frames = planes.first().map_or(0, |p| p.len());
        if input_rate == output_rate || frames == 0 {
            return Ok(planes.iter().map(|p| p.to_vec()).collect());
        }

        debug!(
            "Resampling {} frames from {}Hz to {}Hz ({} channels)",
            frames,
            input_rate,
            output_rate,
            planes.len()
        );

        let mut resampler = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            frames,
            planes.len(),
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to create resampler: {}", e)))?;

        resampler
            .process(planes, None)
            .map_err(|e| Error::AudioOutput(format!("Resampling failed: {}", e)))
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Converts frame ranges of one track to the device rate.
///
/// Track frame `n` maps to device frame `round(n · output_rate / input_rate)`,
/// and a unit over `[a, b)` yields exactly the device frames between the
/// mapped ends. Each conversion window starts on a frame where both rate
/// grids coincide and carries `CONTEXT_FRAMES` of real audio before the unit,
/// so the interpolator has settled and every window agrees with every other
/// on the frames they share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitResampler {
    input_rate: u32,
    output_rate: u32,
    /// Input frames between two aligned grid points
    input_step: usize,
    /// Output frames between the same two grid points
    output_step: usize,
}

impl UnitResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        let divisor = gcd(input_rate as u64, output_rate as u64).max(1);
        Self {
            input_rate,
            output_rate,
            input_step: (input_rate as u64 / divisor).max(1) as usize,
            output_step: (output_rate as u64 / divisor).max(1) as usize,
        }
    }

    /// Device frame at which track frame `input_frame` plays
    pub fn output_frame(&self, input_frame: usize) -> usize {
        let input_rate = self.input_rate.max(1) as u128;
        ((input_frame as u128 * self.output_rate as u128 + input_rate / 2) / input_rate) as usize
    }

    /// Device frames a unit over `frames` occupies
    pub fn output_len(&self, frames: &Range<usize>) -> usize {
        self.output_frame(frames.end) - self.output_frame(frames.start)
    }

    /// Convert `frames` of the planar track `channels` to the device rate.
    pub fn resample_unit(&self, channels: &[Vec<f32>], frames: Range<usize>) -> Result<Vec<Vec<f32>>> {
        if self.input_rate == self.output_rate {
            return Ok(channels.iter().map(|c| c[frames.clone()].to_vec()).collect());
        }

        let len = self.output_len(&frames);
        if len == 0 || frames.is_empty() {
            return Ok(vec![Vec::new(); channels.len()]);
        }

        let window_start =
            frames.start.saturating_sub(CONTEXT_FRAMES) / self.input_step * self.input_step;
        let window_output_start = window_start / self.input_step * self.output_step;
        let window_end = frames.end + CONTEXT_FRAMES;

        // Past the decoded audio the last frame is held, so the interpolator
        // never reads silence inside the unit
        let windows: Vec<Vec<f32>> = channels
            .iter()
            .map(|channel| {
                let available = &channel[window_start..frames.end.min(channel.len())];
                let last = available.last().copied().unwrap_or(0.0);
                let mut window = Vec::with_capacity(window_end - window_start);
                window.extend_from_slice(available);
                window.extend(
                    std::iter::repeat(last).take(window_end - window_start - available.len()),
                );
                window
            })
            .collect();
        let planes: Vec<&[f32]> = windows.iter().map(|w| w.as_slice()).collect();
        let converted = Resampler::resample(&planes, self.input_rate, self.output_rate)?;

        let skip = self.output_frame(frames.start) - window_output_start;
        Ok(converted
            .into_iter()
            .map(|plane| {
                let mut unit: Vec<f32> = plane.iter().skip(skip).take(len).copied().collect();
                let last = unit.last().copied().unwrap_or(0.0);
                unit.resize(len, last);
                unit
            })
            .collect())
    }
}
