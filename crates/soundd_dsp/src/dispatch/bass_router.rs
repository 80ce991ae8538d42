//! Bass router dispatcher: FFT-splits a mono canonical window into a bass
//! band and a residual band, each written to its own output channel.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

use crate::codec::{from_canonical, Sample, WireFormat, SILENCE};
use crate::error::DspError;

/// Inclusive frequency range, in Hz, routed to the bass channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BassRange {
    pub lower: f64,
    pub higher: f64,
}

impl Default for BassRange {
    fn default() -> Self {
        // Glossary default: 20-250 Hz.
        Self {
            lower: 20.0,
            higher: 250.0,
        }
    }
}

/// Which output channel carries the bass band and which carries the residual.
#[derive(Debug, Clone, Copy)]
pub struct ChannelAssignment {
    pub bass: usize,
    pub residual: usize,
}

/// Splits a mono canonical window into bass/residual bands via a full
/// complex forward/inverse DFT. Owns its own [`FftPlanner`]: the planner
/// caches plans per transform length internally but is not `Sync`, so each
/// dispatcher instance (one per stream/engine bus) gets its own, mirroring
/// how the spectrum analyzer elsewhere in this workspace owns its planner.
pub struct BassRouterDispatcher {
    planner: FftPlanner<f64>,
    range: BassRange,
    sample_rate: f64,
}

impl BassRouterDispatcher {
    pub fn new(range: BassRange, sample_rate: f64) -> Self {
        Self {
            planner: FftPlanner::new(),
            range,
            sample_rate,
        }
    }

    fn plan(&mut self, n: usize, forward: bool) -> Arc<dyn Fft<f64>> {
        if forward {
            self.planner.plan_fft_forward(n)
        } else {
            self.planner.plan_fft_inverse(n)
        }
    }

    /// Route `input` (one canonical mono channel, `n` frames) into `out`,
    /// an interleaved two-channel wire-format buffer of `n` frames, writing
    /// the bass band onto `assignment.bass` and the residual onto
    /// `assignment.residual`; channels not assigned are filled with Silence.
    pub fn dispatch(
        &mut self,
        input: &[Sample],
        out: &mut [u8],
        out_format: WireFormat,
        out_channels: usize,
        assignment: ChannelAssignment,
    ) -> Result<(), DspError> {
        let n = input.len();
        if n == 0 {
            return Err(DspError::WindowTooShort(n));
        }
        if assignment.bass >= out_channels {
            return Err(DspError::ChannelOutOfRange {
                index: assignment.bass,
                channels: out_channels,
            });
        }
        if assignment.residual >= out_channels {
            return Err(DspError::ChannelOutOfRange {
                index: assignment.residual,
                channels: out_channels,
            });
        }
        let sample_bytes = out_format.sample_bytes();
        let needed = out_channels * n * sample_bytes;
        if out.len() < needed {
            return Err(DspError::MisalignedBuffer {
                got: out.len(),
                frame_size: needed,
            });
        }

        let mut spectrum: Vec<Complex<f64>> =
            input.iter().map(|&s| Complex::new(s as f64, 0.0)).collect();
        let forward = self.plan(n, true);
        forward.process(&mut spectrum);

        let mut bass_spectrum = vec![Complex::new(0.0, 0.0); n];
        let mut residual_spectrum = vec![Complex::new(0.0, 0.0); n];

        // Only the DC-to-Nyquist half carries independent information for a
        // real-valued input; mirror each routed bin to its conjugate partner
        // so the inverse transform of each spectrum stays real-valued.
        let half = n / 2;
        for k in 0..half.max(1) {
            let f = k as f64 * self.sample_rate / n as f64;
            let bin = spectrum[k];
            let mirror = if k == 0 { k } else { (n - k) % n };

            if f >= self.range.lower && f <= self.range.higher {
                bass_spectrum[k] = bin;
                bass_spectrum[mirror] = spectrum[mirror];
            } else {
                residual_spectrum[k] = bin;
                residual_spectrum[mirror] = spectrum[mirror];
            }
        }

        let inverse = self.plan(n, false);
        inverse.process(&mut bass_spectrum);
        inverse.process(&mut residual_spectrum);

        let scale = 1.0 / n as f64;
        let to_time_domain = |spectrum: &[Complex<f64>]| -> Vec<Sample> {
            spectrum
                .iter()
                .map(|c| (c.re * scale).round().clamp(i32::MIN as f64, i32::MAX as f64) as Sample)
                .collect()
        };
        let bass_time = to_time_domain(&bass_spectrum);
        let residual_time = to_time_domain(&residual_spectrum);

        // A band with no routed bins transforms to (numerically) all-zero;
        // its whole window is reported as Silence rather than near-zero noise.
        let bass_has_energy = bass_time.iter().any(|&s| s != 0);
        let residual_has_energy = residual_time.iter().any(|&s| s != 0);

        for frame in 0..n {
            for channel in 0..out_channels {
                let value = if channel == assignment.bass {
                    if bass_has_energy {
                        bass_time[frame]
                    } else {
                        SILENCE
                    }
                } else if channel == assignment.residual {
                    if residual_has_energy {
                        residual_time[frame]
                    } else {
                        SILENCE
                    }
                } else {
                    SILENCE
                };
                let wire = from_canonical(out_format, value);
                let byte_start = (frame * out_channels + channel) * sample_bytes;
                out[byte_start..byte_start + sample_bytes].copy_from_slice(&wire);
            }
        }

        Ok(())
    }
}
