//! # Audio Conversion Module
//!
//! Stateless building blocks the media bridge applies to every frame.
//!
//! ## Key Components:
//! - **Codec**: G.711 μ-law <-> 16-bit linear PCM
//! - **Resampler**: nearest-neighbor sample-rate conversion for PCM16
//!
//! ## Buffer Format:
//! All PCM buffers are mono, 16-bit signed, little-endian. μ-law buffers are
//! one byte per sample. Neither carries its own rate; callers track that.

pub mod codec;      // G.711 μ-law encode/decode
pub mod resample;   // Nearest-neighbor resampling
