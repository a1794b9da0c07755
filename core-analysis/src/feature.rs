//! # Feature Catalogue

use serde::{Deserialize, Serialize};
use std::fmt;

/// Every feature the analyzer computes, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    DurationSeconds,
    Rms,
    Peak,
    RmsDbfs,
    PeakDbfs,
    CrestFactor,
    DcOffset,
    ZeroCrossingRate,
    SpectralCentroid,
    SpectralRolloff,
    SpectralFlatness,
    SpectralBandwidth,
}

impl Feature {
    pub const ALL: [Feature; 12] = [
        Feature::DurationSeconds,
        Feature::Rms,
        Feature::Peak,
        Feature::RmsDbfs,
        Feature::PeakDbfs,
        Feature::CrestFactor,
        Feature::DcOffset,
        Feature::ZeroCrossingRate,
        Feature::SpectralCentroid,
        Feature::SpectralRolloff,
        Feature::SpectralFlatness,
        Feature::SpectralBandwidth,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Feature::DurationSeconds => "duration_seconds",
            Feature::Rms => "rms",
            Feature::Peak => "peak",
            Feature::RmsDbfs => "rms_dbfs",
            Feature::PeakDbfs => "peak_dbfs",
            Feature::CrestFactor => "crest_factor",
            Feature::DcOffset => "dc_offset",
            Feature::ZeroCrossingRate => "zero_crossing_rate",
            Feature::SpectralCentroid => "spectral_centroid",
            Feature::SpectralRolloff => "spectral_rolloff",
            Feature::SpectralFlatness => "spectral_flatness",
            Feature::SpectralBandwidth => "spectral_bandwidth",
        }
    }

    pub fn is_spectral(&self) -> bool {
        matches!(
            self,
            Feature::SpectralCentroid
                | Feature::SpectralRolloff
                | Feature::SpectralFlatness
                | Feature::SpectralBandwidth
        )
    }

    /// Minimum number of frames the feature is defined for.
    pub fn min_frames(&self, fft_size: usize) -> usize {
        match self {
            Feature::ZeroCrossingRate => 2,
            feature if feature.is_spectral() => fft_size,
            _ => 1,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
