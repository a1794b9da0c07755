//! Time-domain features over a mono signal.

use crate::error::{FeatureError, Result};
use crate::feature::Feature;

pub(crate) fn require(feature: Feature, signal: &[f32], fft_size: usize) -> Result<()> {
    let required = feature.min_frames(fft_size);
    if signal.len() < required {
        return Err(FeatureError::InsufficientSamples {
            feature: feature.name(),
            required,
            available: signal.len(),
        });
    }
    Ok(())
}

/// Like [`require`], and additionally rejects signals carrying NaN or
/// infinite samples, which would otherwise surface as non-finite values.
pub(crate) fn require_finite(feature: Feature, signal: &[f32], fft_size: usize) -> Result<()> {
    require(feature, signal, fft_size)?;
    if let Some(index) = signal.iter().position(|s| !s.is_finite()) {
        return Err(FeatureError::Computation {
            feature: feature.name(),
            reason: format!("non-finite sample at index {}", index),
        });
    }
    Ok(())
}

/// Rejects a computed value that is NaN or infinite.
pub(crate) fn finite(feature: Feature, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FeatureError::Computation {
            feature: feature.name(),
            reason: "non-finite result".to_string(),
        })
    }
}

fn silent(feature: Feature) -> FeatureError {
    FeatureError::Computation {
        feature: feature.name(),
        reason: "signal is silent".to_string(),
    }
}

fn mean_square(signal: &[f32]) -> f64 {
    signal.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>() / signal.len() as f64
}

fn max_abs(signal: &[f32]) -> f64 {
    signal.iter().fold(0.0f64, |peak, &s| peak.max((s as f64).abs()))
}

pub(crate) fn duration_seconds(signal: &[f32], sample_rate: u32) -> Result<f64> {
    require(Feature::DurationSeconds, signal, 0)?;
    Ok(signal.len() as f64 / sample_rate as f64)
}

pub(crate) fn rms(signal: &[f32]) -> Result<f64> {
    require_finite(Feature::Rms, signal, 0)?;
    finite(Feature::Rms, mean_square(signal).sqrt())
}

pub(crate) fn peak(signal: &[f32]) -> Result<f64> {
    require_finite(Feature::Peak, signal, 0)?;
    finite(Feature::Peak, max_abs(signal))
}

pub(crate) fn rms_dbfs(signal: &[f32]) -> Result<f64> {
    require_finite(Feature::RmsDbfs, signal, 0)?;
    let rms = mean_square(signal).sqrt();
    if rms == 0.0 {
        return Err(silent(Feature::RmsDbfs));
    }
    finite(Feature::RmsDbfs, 20.0 * rms.log10())
}

pub(crate) fn peak_dbfs(signal: &[f32]) -> Result<f64> {
    require_finite(Feature::PeakDbfs, signal, 0)?;
    let peak = max_abs(signal);
    if peak == 0.0 {
        return Err(silent(Feature::PeakDbfs));
    }
    finite(Feature::PeakDbfs, 20.0 * peak.log10())
}

/// Peak over RMS, linear.
pub(crate) fn crest_factor(signal: &[f32]) -> Result<f64> {
    require_finite(Feature::CrestFactor, signal, 0)?;
    let rms = mean_square(signal).sqrt();
    if rms == 0.0 {
        return Err(silent(Feature::CrestFactor));
    }
    finite(Feature::CrestFactor, max_abs(signal) / rms)
}

pub(crate) fn dc_offset(signal: &[f32]) -> Result<f64> {
    require_finite(Feature::DcOffset, signal, 0)?;
    finite(
        Feature::DcOffset,
        signal.iter().map(|&s| s as f64).sum::<f64>() / signal.len() as f64,
    )
}

/// Fraction of adjacent sample pairs whose sign differs.
pub(crate) fn zero_crossing_rate(signal: &[f32]) -> Result<f64> {
    require_finite(Feature::ZeroCrossingRate, signal, 0)?;
    let crossings = signal
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    Ok(crossings as f64 / (signal.len() - 1) as f64)
}
