//! # Format Decoder
//!
//! Turns an uploaded byte payload into the pipeline's canonical in-memory
//! representation.
//!
//! ## Overview
//!
//! This crate handles:
//! - Payload size enforcement before any parsing
//! - Container detection by content signature (never by file name)
//! - Decoding through symphonia into interleaved `f32` samples
//! - Duration and channel limits, enforced while decoding
//!
//! ```text
//! Bytes → FormatDetector → SymphoniaDecoder → SampleConverter → AudioBuffer
//! ```

pub mod buffer;
pub mod decoder;
pub mod error;

pub use buffer::{AudioBuffer, SamplePrecision};
pub use decoder::{decode, decode_cancellable, AudioCodec, ContainerFormat, FormatDetector};
pub use error::{DecoderError, Result};
