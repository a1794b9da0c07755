//! Spectral features averaged over Hann-windowed STFT frames.
//!
//! One STFT pass feeds all four spectral features. Frames without energy are
//! skipped; a signal with no energetic frame at all has no spectral shape.

use crate::error::{FeatureError, Result};
use crate::feature::Feature;
use core_runtime::AnalysisConfig;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Frames whose summed magnitude is below this are treated as silent.
const SILENT_FRAME_MAGNITUDE: f64 = 1e-10;

/// Floor applied to power bins before taking logarithms.
const POWER_FLOOR: f64 = 1e-10;

/// STFT processor with pre-allocated buffers.
struct StftProcessor {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    hop_size: usize,
    window: Vec<f32>,
    fft_input: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f64>,
}

impl StftProcessor {
    fn new(fft_size: usize, hop_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch_len = fft.get_inplace_scratch_len();

        // Periodic Hann window
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / fft_size as f32).cos())
            })
            .collect();

        Self {
            fft,
            fft_size,
            hop_size,
            window,
            fft_input: vec![Complex::new(0.0, 0.0); fft_size],
            fft_scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            magnitudes: vec![0.0; fft_size / 2 + 1],
        }
    }

    /// Call `visit` with the magnitude spectrum (`fft_size / 2 + 1` bins) of
    /// every full frame.
    ///
    /// Returns `false` if `cancel` fired before the last frame.
    fn for_each_frame(
        &mut self,
        signal: &[f32],
        cancel: &CancellationToken,
        mut visit: impl FnMut(&[f64]),
    ) -> bool {
        if signal.len() < self.fft_size {
            return true;
        }

        let num_frames = (signal.len() - self.fft_size) / self.hop_size + 1;
        let num_bins = self.magnitudes.len();

        for frame_idx in 0..num_frames {
            if cancel.is_cancelled() {
                return false;
            }

            let start = frame_idx * self.hop_size;
            let frame = &signal[start..start + self.fft_size];

            for ((slot, &sample), &weight) in self.fft_input.iter_mut().zip(frame).zip(&self.window) {
                *slot = Complex::new(sample * weight, 0.0);
            }

            self.fft
                .process_with_scratch(&mut self.fft_input, &mut self.fft_scratch);

            for (magnitude, bin) in self.magnitudes.iter_mut().zip(&self.fft_input[..num_bins]) {
                *magnitude = (bin.re as f64).hypot(bin.im as f64);
            }

            visit(&self.magnitudes);
        }
        true
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Why a signal has no spectral features at all.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Unavailable {
    TooShort { required: usize, available: usize },
    NonFinite { index: usize },
    Silent,
    Cancelled,
}

impl Unavailable {
    pub(crate) fn into_error(self, feature: Feature) -> FeatureError {
        match self {
            Unavailable::TooShort { required, available } => FeatureError::InsufficientSamples {
                feature: feature.name(),
                required,
                available,
            },
            Unavailable::NonFinite { index } => FeatureError::Computation {
                feature: feature.name(),
                reason: format!("non-finite sample at index {}", index),
            },
            Unavailable::Silent => FeatureError::Computation {
                feature: feature.name(),
                reason: "signal is silent".to_string(),
            },
            Unavailable::Cancelled => FeatureError::Cancelled,
        }
    }
}

/// Frame averages of every spectral feature.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SpectralSummary {
    centroid: f64,
    rolloff: f64,
    flatness: f64,
    bandwidth: f64,
    frames: usize,
}

impl SpectralSummary {
    /// Run one STFT over `signal` and average each feature over the frames
    /// with energy.
    pub(crate) fn compute(
        signal: &[f32],
        sample_rate: u32,
        config: &AnalysisConfig,
        cancel: &CancellationToken,
    ) -> std::result::Result<Self, Unavailable> {
        if signal.len() < config.fft_size {
            return Err(Unavailable::TooShort {
                required: config.fft_size,
                available: signal.len(),
            });
        }
        if let Some(index) = signal.iter().position(|s| !s.is_finite()) {
            return Err(Unavailable::NonFinite { index });
        }

        let bin_hz = sample_rate as f64 / config.fft_size as f64;
        let fraction = config.rolloff_percent as f64 / 100.0;
        let mut stft = StftProcessor::new(config.fft_size, config.hop_size);
        let mut sums = [0.0f64; 4];
        let mut counted = 0usize;

        let finished = stft.for_each_frame(signal, cancel, |magnitudes| {
            let total: f64 = magnitudes.iter().sum();
            if total <= SILENT_FRAME_MAGNITUDE {
                return;
            }
            let center = centroid(magnitudes, total, bin_hz);
            sums[0] += center;
            sums[1] += rolloff(magnitudes, total, bin_hz, fraction);
            sums[2] += flatness(magnitudes);
            sums[3] += bandwidth(magnitudes, total, bin_hz, center);
            counted += 1;
        });

        if !finished {
            return Err(Unavailable::Cancelled);
        }
        if counted == 0 {
            return Err(Unavailable::Silent);
        }

        let n = counted as f64;
        Ok(Self {
            centroid: sums[0] / n,
            rolloff: sums[1] / n,
            flatness: sums[2] / n,
            bandwidth: sums[3] / n,
            frames: counted,
        })
    }

    /// The averaged value of a spectral `feature`.
    pub(crate) fn value(&self, feature: Feature) -> Result<f64> {
        let value = match feature {
            Feature::SpectralCentroid => self.centroid,
            Feature::SpectralRolloff => self.rolloff,
            Feature::SpectralFlatness => self.flatness,
            Feature::SpectralBandwidth => self.bandwidth,
            other => {
                return Err(FeatureError::Computation {
                    feature: other.name(),
                    reason: "not a spectral feature".to_string(),
                })
            }
        };
        if !value.is_finite() {
            return Err(FeatureError::Computation {
                feature: feature.name(),
                reason: format!("non-finite result {}", value),
            });
        }
        Ok(value)
    }

    /// Number of energetic frames that contributed.
    pub(crate) fn frames(&self) -> usize {
        self.frames
    }
}

// ============================================================================
// Per-frame measures
// ============================================================================

/// Magnitude-weighted mean frequency, in Hz.
fn centroid(magnitudes: &[f64], total: f64, bin_hz: f64) -> f64 {
    magnitudes
        .iter()
        .enumerate()
        .map(|(k, m)| k as f64 * bin_hz * m)
        .sum::<f64>()
        / total
}

/// Frequency below which `fraction` of the magnitude lies, in Hz.
fn rolloff(magnitudes: &[f64], total: f64, bin_hz: f64, fraction: f64) -> f64 {
    let threshold = fraction * total;
    let mut cumulative = 0.0;
    for (k, m) in magnitudes.iter().enumerate() {
        cumulative += m;
        if cumulative >= threshold {
            return k as f64 * bin_hz;
        }
    }
    (magnitudes.len() - 1) as f64 * bin_hz
}

/// Geometric over arithmetic mean of the power spectrum, in `[0, 1]`.
fn flatness(magnitudes: &[f64]) -> f64 {
    let n = magnitudes.len() as f64;
    let (log_sum, sum) = magnitudes.iter().fold((0.0, 0.0), |(log_sum, sum), m| {
        let power = (m * m).max(POWER_FLOOR);
        (log_sum + power.ln(), sum + power)
    });
    (log_sum / n).exp() / (sum / n)
}

/// Magnitude-weighted standard deviation around `center`, in Hz.
fn bandwidth(magnitudes: &[f64], total: f64, bin_hz: f64, center: f64) -> f64 {
    let spread = magnitudes
        .iter()
        .enumerate()
        .map(|(k, m)| {
            let distance = k as f64 * bin_hz - center;
            m * distance * distance
        })
        .sum::<f64>()
        / total;
    spread.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const RATE: u32 = 16_000;

    fn sine(freq: f32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|n| (2.0 * PI * freq * n as f32 / RATE as f32).sin() * 0.5)
            .collect()
    }

    /// Deterministic white-ish noise from a linear congruential generator.
    fn noise(frames: usize) -> Vec<f32> {
        let mut state: u32 = 0x1234_5678;
        (0..frames)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 24) as f32 - 0.5
            })
            .collect()
    }

    fn summarize(signal: &[f32]) -> std::result::Result<SpectralSummary, Unavailable> {
        SpectralSummary::compute(signal, RATE, &AnalysisConfig::default(), &CancellationToken::new())
    }

    #[test]
    fn test_pure_tone() {
        let summary = summarize(&sine(1_000.0, RATE as usize)).unwrap();

        let centroid = summary.value(Feature::SpectralCentroid).unwrap();
        assert!((centroid - 1_000.0).abs() < 30.0, "centroid = {}", centroid);
        let rolloff = summary.value(Feature::SpectralRolloff).unwrap();
        assert!((rolloff - 1_000.0).abs() < 50.0, "rolloff = {}", rolloff);

        // (16000 - 2048) / 1024 + 1
        assert_eq!(summary.frames(), 14);
    }

    #[test]
    fn test_tone_vs_noise() {
        let tone = summarize(&sine(1_000.0, RATE as usize)).unwrap();
        let noise = summarize(&noise(RATE as usize)).unwrap();

        let tone_flatness = tone.value(Feature::SpectralFlatness).unwrap();
        let noise_flatness = noise.value(Feature::SpectralFlatness).unwrap();
        assert!(tone_flatness < 0.05, "tone flatness = {}", tone_flatness);
        assert!(noise_flatness > 0.3, "noise flatness = {}", noise_flatness);
        assert!(noise_flatness <= 1.0);

        assert!(
            tone.value(Feature::SpectralBandwidth).unwrap()
                < noise.value(Feature::SpectralBandwidth).unwrap()
        );
    }

    #[test]
    fn test_silence_has_no_spectral_shape() {
        let unavailable = summarize(&[0.0; 4_096]).unwrap_err();
        assert_eq!(unavailable, Unavailable::Silent);
        assert!(matches!(
            unavailable.into_error(Feature::SpectralFlatness),
            FeatureError::Computation { feature: "spectral_flatness", .. }
        ));
    }

    #[test]
    fn test_shorter_than_fft_window() {
        let unavailable = summarize(&sine(440.0, 2_047)).unwrap_err();
        assert_eq!(
            unavailable.into_error(Feature::SpectralBandwidth),
            FeatureError::InsufficientSamples {
                feature: "spectral_bandwidth",
                required: 2_048,
                available: 2_047,
            }
        );
    }

    #[test]
    fn test_non_finite_samples() {
        let mut signal = sine(440.0, 4_096);
        signal[3_000] = f32::NAN;
        assert_eq!(summarize(&signal), Err(Unavailable::NonFinite { index: 3_000 }));
    }

    #[test]
    fn test_cancellation_stops_the_stft() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = SpectralSummary::compute(
            &sine(440.0, RATE as usize),
            RATE,
            &AnalysisConfig::default(),
            &cancel,
        );
        assert_eq!(result, Err(Unavailable::Cancelled));
        assert_eq!(Unavailable::Cancelled.into_error(Feature::SpectralCentroid), FeatureError::Cancelled);
    }

    #[test]
    fn test_temporal_feature_is_not_spectral() {
        let summary = summarize(&sine(440.0, 4_096)).unwrap();
        assert!(summary.value(Feature::Rms).is_err());
    }
}
