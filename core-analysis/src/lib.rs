//! # Analysis Engine
//!
//! Computes scalar audio features from a canonical buffer.
//!
//! ## Overview
//!
//! All features run on the mono mixdown of the buffer. Each extractor is an
//! independent pure function of that signal:
//!
//! - Temporal: duration, RMS, peak, their dBFS forms, crest factor, DC offset,
//!   zero-crossing rate
//! - Spectral: centroid, rolloff, flatness and bandwidth, averaged over
//!   the Hann-windowed frames of a single STFT pass
//!
//! A feature that cannot be computed is reported as a failure next to the
//! values that could be. It never appears as zero or NaN.

pub mod analyzer;
pub mod error;
pub mod feature;
pub mod report;
mod spectral;
mod temporal;

pub use analyzer::Analyzer;
pub use error::{FeatureError, Result};
pub use feature::Feature;
pub use report::{FeatureFailure, FeatureFailureKind, FeatureReport};
