//! # Nearest-Neighbor Resampler
//!
//! Changes the sample rate of a 16-bit little-endian PCM buffer by picking, for
//! every output position, the input sample at `floor(i * source / target)`.
//!
//! ## Quality Notes:
//! - No interpolation and no anti-alias filter.
//! - Integer downsampling (24 kHz -> 8 kHz) is exact decimation.
//! - Upsampling only duplicates samples; it adds no information.
//!
//! Good enough for narrowband speech. Anything that needs fidelity should
//! replace this module rather than patch it.
//!
//! ## Failure Policy:
//! [`resample`] never fails. A bad rate or a misaligned buffer degrades to
//! returning the input untouched so the call keeps flowing.

use std::borrow::Cow;
use thiserror::Error;
use tracing::warn;

/// Why a buffer could not be resampled.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResampleError {
    #[error("sample rate must be non-zero (source {source_rate}, target {target_rate})")]
    ZeroRate { source_rate: u32, target_rate: u32 },

    #[error("PCM16 buffer length {0} is not a whole number of samples")]
    Misaligned(usize),
}

/// Resample `pcm` from `source_rate` to `target_rate`.
///
/// Equal rates borrow the input. Any internal error is logged and the
/// original buffer is returned as-is.
pub fn resample(pcm: &[u8], source_rate: u32, target_rate: u32) -> Cow<'_, [u8]> {
    if source_rate == target_rate {
        return Cow::Borrowed(pcm);
    }

    match try_resample(pcm, source_rate, target_rate) {
        Ok(resampled) => Cow::Owned(resampled),
        Err(err) => {
            warn!("Resampling {} -> {} Hz skipped: {}", source_rate, target_rate, err);
            Cow::Borrowed(pcm)
        }
    }
}

/// Fallible core of [`resample`].
///
/// Indices are computed in integer arithmetic so the output length is exactly
/// `floor(n * target / source)` with no floating point rounding at the edges.
pub fn try_resample(pcm: &[u8], source_rate: u32, target_rate: u32) -> Result<Vec<u8>, ResampleError> {
    if source_rate == 0 || target_rate == 0 {
        return Err(ResampleError::ZeroRate { source_rate, target_rate });
    }
    if pcm.len() % 2 != 0 {
        return Err(ResampleError::Misaligned(pcm.len()));
    }

    let input_samples = (pcm.len() / 2) as u64;
    let source = source_rate as u64;
    let target = target_rate as u64;
    let output_samples = input_samples * target / source;

    let mut output = Vec::with_capacity(output_samples as usize * 2);
    for i in 0..output_samples {
        let index = (i * source / target) as usize * 2;
        output.extend_from_slice(&pcm[index..index + 2]);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(samples: usize) -> Vec<u8> {
        (0..samples as i16).flat_map(|s| s.to_le_bytes()).collect()
    }

    fn to_samples(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    #[test]
    fn test_identity_borrows_input() {
        let pcm = ramp(160);
        for rate in [8000, 16000, 24000, 44100] {
            let out = resample(&pcm, rate, rate);
            assert!(matches!(out, Cow::Borrowed(_)));
            assert_eq!(out.as_ref(), pcm.as_slice());
        }
    }

    #[test]
    fn test_length_law() {
        let rates = [8000u32, 11025, 16000, 22050, 24000, 44100, 48000];
        for &n in &[0usize, 1, 7, 160, 320, 481, 960] {
            let pcm = ramp(n);
            for &source in &rates {
                for &target in &rates {
                    let out = resample(&pcm, source, target);
                    let expected = (n as u64 * target as u64 / source as u64) as usize;
                    assert_eq!(out.len() / 2, expected, "{} samples {} -> {}", n, source, target);
                }
            }
        }
    }

    #[test]
    fn test_downsample_is_decimation() {
        let input = ramp(12);
        let out = resample(&input, 24000, 8000);
        assert_eq!(to_samples(&out), vec![0, 3, 6, 9]);
    }

    #[test]
    fn test_upsample_duplicates() {
        let input = ramp(3);
        let out = resample(&input, 8000, 24000);
        assert_eq!(to_samples(&out), vec![0, 0, 0, 1, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn test_errors_fall_back_to_input() {
        let pcm = ramp(10);
        let out = resample(&pcm, 0, 8000);
        assert_eq!(out.as_ref(), pcm.as_slice());

        let out = resample(&pcm, 8000, 0);
        assert_eq!(out.as_ref(), pcm.as_slice());

        let odd = vec![1u8, 2, 3];
        let out = resample(&odd, 8000, 24000);
        assert_eq!(out.as_ref(), odd.as_slice());
    }

    #[test]
    fn test_try_resample_reports_errors() {
        assert_eq!(
            try_resample(&[0, 0], 0, 8000),
            Err(ResampleError::ZeroRate { source_rate: 0, target_rate: 8000 })
        );
        assert_eq!(try_resample(&[0, 0, 0], 8000, 16000), Err(ResampleError::Misaligned(3)));
    }
}
