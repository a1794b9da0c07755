//! # Analyzer
//!
//! Runs every feature extractor over the mono mixdown of a buffer and
//! collects the outcome into a [`FeatureReport`].

use crate::error::{FeatureError, Result};
use crate::feature::Feature;
use crate::report::FeatureReport;
use crate::spectral::{SpectralSummary, Unavailable};
use crate::temporal;
use core_decoder::AudioBuffer;
use core_runtime::AnalysisConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    config: AnalysisConfig,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Compute every feature. Individual failures are recorded in the report.
    pub fn analyze(&self, buffer: &AudioBuffer) -> FeatureReport {
        // Nothing else holds this token, so the run cannot be cancelled
        self.analyze_cancellable(buffer, &CancellationToken::new())
            .unwrap_or_default()
    }

    /// Same as [`analyze`](Self::analyze), checking `cancel` between features
    /// and between STFT frames.
    ///
    /// # Errors
    ///
    /// [`FeatureError::Cancelled`] once the token is cancelled.
    #[instrument(skip_all, fields(frames = buffer.frames(), channels = buffer.channels()))]
    pub fn analyze_cancellable(
        &self,
        buffer: &AudioBuffer,
        cancel: &CancellationToken,
    ) -> Result<FeatureReport> {
        let mut report = FeatureReport::new();
        let mono = buffer.mono_mixdown();
        let sample_rate = buffer.sample_rate();
        let mut spectrum = None;

        for feature in Feature::ALL {
            if cancel.is_cancelled() {
                debug!(%feature, "Analysis cancelled");
                return Err(FeatureError::Cancelled);
            }

            let result = if feature.is_spectral() {
                let summary = spectrum.get_or_insert_with(|| {
                    SpectralSummary::compute(&mono, sample_rate, &self.config, cancel)
                });
                spectral_value(summary, feature)
            } else {
                temporal_value(feature, &mono, sample_rate)
            };

            match result {
                Ok(value) => report.insert(feature.name(), value),
                Err(FeatureError::Cancelled) => {
                    debug!(%feature, "Analysis cancelled");
                    return Err(FeatureError::Cancelled);
                }
                Err(error) => {
                    debug!(%feature, %error, "Feature unavailable");
                    report.record_failure(&error);
                }
            }
        }

        if let Some(Ok(summary)) = &spectrum {
            debug!(frames = summary.frames(), "Spectral frames averaged");
        }
        info!(
            computed = report.values.len(),
            failed = report.failures.len(),
            "Analysis complete"
        );
        Ok(report)
    }

    /// Compute a single feature of a mono signal.
    pub fn compute(&self, feature: Feature, mono: &[f32], sample_rate: u32) -> Result<f64> {
        if feature.is_spectral() {
            let summary =
                SpectralSummary::compute(mono, sample_rate, &self.config, &CancellationToken::new());
            spectral_value(&summary, feature)
        } else {
            temporal_value(feature, mono, sample_rate)
        }
    }
}

fn spectral_value(
    summary: &std::result::Result<SpectralSummary, Unavailable>,
    feature: Feature,
) -> Result<f64> {
    match summary {
        Ok(summary) => summary.value(feature),
        Err(unavailable) => Err(unavailable.into_error(feature)),
    }
}

fn temporal_value(feature: Feature, mono: &[f32], sample_rate: u32) -> Result<f64> {
    match feature {
        Feature::DurationSeconds => temporal::duration_seconds(mono, sample_rate),
        Feature::Rms => temporal::rms(mono),
        Feature::Peak => temporal::peak(mono),
        Feature::RmsDbfs => temporal::rms_dbfs(mono),
        Feature::PeakDbfs => temporal::peak_dbfs(mono),
        Feature::CrestFactor => temporal::crest_factor(mono),
        Feature::DcOffset => temporal::dc_offset(mono),
        Feature::ZeroCrossingRate => temporal::zero_crossing_rate(mono),
        spectral => Err(FeatureError::Computation {
            feature: spectral.name(),
            reason: "not a temporal feature".to_string(),
        }),
    }
}
