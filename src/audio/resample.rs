//! Rate conversion and channel fan-out for the output device.
//!
//! Narration arrives as **24 kHz mono**, but most output devices run at
//! 44.1 / 48 kHz with two or more channels.  Before a buffer is handed to the
//! cpal callback it goes through two steps:
//!
//! 1. [`resample_linear`] — convert to the device sample rate.
//! 2. [`interleave_mono`] — duplicate the mono track into every device
//!    channel.
//!
//! Linear interpolation is plenty for speech.

// ---------------------------------------------------------------------------
// resample_linear
// ---------------------------------------------------------------------------

/// Resample `samples` from `source_rate` Hz to `target_rate` Hz using linear
/// interpolation.
///
/// * Equal rates return a plain copy.
/// * Empty input, or a zero rate on either side, returns an empty vector.
///
/// The output length is `ceil(samples.len() * target_rate / source_rate)`.
///
/// ```rust
/// use citylens::audio::resample_linear;
///
/// let narration = vec![0.5_f32; 240]; // 10 ms @ 24 kHz
/// let out = resample_linear(&narration, 24_000, 48_000);
/// assert_eq!(out.len(), 480);
/// ```
pub fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate {
        return samples.to_vec();
    }

    if samples.is_empty() || source_rate == 0 || target_rate == 0 {
        return Vec::new();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let sample = match (samples.get(idx), samples.get(idx + 1)) {
            (Some(a), Some(b)) => a * (1.0 - frac) + b * frac,
            (Some(a), None) => *a,
            _ => 0.0,
        };
        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// interleave_mono
// ---------------------------------------------------------------------------

/// Copy a mono track into `channels` interleaved channels.
///
/// `channels == 0` yields an empty vector.
///
/// ```rust
/// use citylens::audio::interleave_mono;
///
/// assert_eq!(interleave_mono(&[0.1, 0.2], 2), vec![0.1, 0.1, 0.2, 0.2]);
/// ```
pub fn interleave_mono(mono: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => mono.to_vec(),
        n => mono
            .iter()
            .flat_map(|&s| std::iter::repeat(s).take(n as usize))
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- resample_linear ---------------------------------------------------

    #[test]
    fn same_rate_is_noop() {
        let input: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        assert_eq!(resample_linear(&input, 24_000, 24_000), input);
    }

    #[test]
    fn empty_input() {
        assert!(resample_linear(&[], 24_000, 48_000).is_empty());
    }

    #[test]
    fn zero_rate_yields_empty() {
        assert!(resample_linear(&[0.1, 0.2], 0, 48_000).is_empty());
        assert!(resample_linear(&[0.1, 0.2], 24_000, 0).is_empty());
    }

    #[test]
    fn upsample_24k_to_48k_doubles_length() {
        let out = resample_linear(&vec![0.0_f32; 2_400], 24_000, 48_000);
        assert_eq!(out.len(), 4_800);
    }

    #[test]
    fn upsample_24k_to_44100_length() {
        // 1 s @ 24 kHz → ~44 100 samples
        let out = resample_linear(&vec![0.0_f32; 24_000], 24_000, 44_100);
        assert!(out.len().abs_diff(44_100) <= 1, "got {}", out.len());
    }

    #[test]
    fn constant_signal_preserves_amplitude() {
        let out = resample_linear(&vec![-0.25_f32; 240], 24_000, 48_000);
        for &s in &out {
            assert!((s + 0.25).abs() < 1e-6, "amplitude drift: {s}");
        }
    }

    #[test]
    fn interpolates_between_neighbours() {
        // 2× upsampling of [0, 1] → [0, 0.5, 1, 1]
        let out = resample_linear(&[0.0, 1.0], 1, 2);
        assert_eq!(out.len(), 4);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    // ---- interleave_mono ---------------------------------------------------

    #[test]
    fn interleave_zero_channels() {
        assert!(interleave_mono(&[1.0], 0).is_empty());
    }

    #[test]
    fn interleave_mono_passthrough() {
        assert_eq!(interleave_mono(&[0.3, 0.4], 1), vec![0.3, 0.4]);
    }

    #[test]
    fn interleave_three_channels() {
        assert_eq!(
            interleave_mono(&[0.1, -0.1], 3),
            vec![0.1, 0.1, 0.1, -0.1, -0.1, -0.1]
        );
    }
}
