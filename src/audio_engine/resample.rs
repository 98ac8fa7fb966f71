//! Sample-rate conversion for decoded clips.
//!
//! Clips are converted once, on the loader thread, so the mixer can read them
//! frame for frame at the output rate.

use rubato::{
    calculate_cutoff, Resampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};

use crate::audio_engine::errors::SampleLoadError;

const SINC_LEN: usize = 256;
const OVERSAMPLING_FACTOR: usize = 128;
const CHUNK_SIZE: usize = 1024;

/// Builds a sinc resampler from `src_rate` to `dst_rate`, or `None` when the
/// rates already match.
pub fn build_resampler(
    src_rate: u32,
    dst_rate: u32,
    channels: usize,
) -> Result<Option<SincFixedIn<f32>>, SampleLoadError> {
    if src_rate == dst_rate {
        return Ok(None);
    }
    let ratio = f64::from(dst_rate) / f64::from(src_rate);
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: calculate_cutoff(SINC_LEN, window),
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: OVERSAMPLING_FACTOR,
        window,
    };
    let resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, CHUNK_SIZE, channels)?;
    Ok(Some(resampler))
}

/// Converts interleaved `samples` from `src_rate` to `dst_rate`.
///
/// The result holds `round(frames * dst_rate / src_rate)` frames, aligned with
/// the input: the resampler's delay is trimmed from the front.
pub fn resample_interleaved(
    samples: Vec<f32>,
    channels: usize,
    src_rate: u32,
    dst_rate: u32,
) -> Result<Vec<f32>, SampleLoadError> {
    if channels == 0 || src_rate == 0 || dst_rate == 0 {
        return Ok(samples);
    }
    let Some(mut resampler) = build_resampler(src_rate, dst_rate, channels)? else {
        return Ok(samples);
    };

    let frames = samples.len() / channels;
    let expected =
        (frames as f64 * f64::from(dst_rate) / f64::from(src_rate)).round() as usize;
    let delay = resampler.output_delay();

    let planar: Vec<Vec<f32>> = (0..channels)
        .map(|channel| {
            samples
                .chunks_exact(channels)
                .map(|frame| frame[channel])
                .collect()
        })
        .collect();
    drop(samples);

    let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channels];

    let mut read = 0;
    loop {
        let need = resampler.input_frames_next();
        if frames - read < need {
            break;
        }
        let block: Vec<&[f32]> = planar.iter().map(|ch| &ch[read..read + need]).collect();
        append(&mut out, resampler.process(&block, None)?);
        read += need;
    }

    if read < frames {
        let block: Vec<&[f32]> = planar.iter().map(|ch| &ch[read..]).collect();
        append(&mut out, resampler.process_partial(Some(block.as_slice()), None)?);
    }

    // Flush the filter tail until the delayed output covers every input frame.
    while out[0].len() < delay + expected {
        let tail = resampler.process_partial::<Vec<f32>>(None, None)?;
        if tail.first().is_none_or(Vec::is_empty) {
            break;
        }
        append(&mut out, tail);
    }

    let end = (delay + expected).min(out[0].len());
    let start = delay.min(end);
    let mut interleaved = Vec::with_capacity((end - start) * channels);
    for frame in start..end {
        for channel in &out {
            interleaved.push(channel[frame]);
        }
    }
    Ok(interleaved)
}

fn append(out: &mut [Vec<f32>], block: Vec<Vec<f32>>) {
    for (dst, src) in out.iter_mut().zip(block) {
        dst.extend_from_slice(&src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_rates_skip_resampler() {
        assert!(build_resampler(48_000, 48_000, 2).unwrap().is_none());
        assert!(build_resampler(44_100, 48_000, 2).unwrap().is_some());

        let samples = vec![0.1, 0.2, 0.3, 0.4];
        let out = resample_interleaved(samples.clone(), 2, 48_000, 48_000).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    fn test_upsampling_doubles_frames() {
        let samples = vec![0.5; 2 * 4_000];
        let out = resample_interleaved(samples, 2, 22_050, 44_100).unwrap();

        assert_eq!(out.len(), 2 * 8_000);
        // Away from the edges a constant signal passes at unity gain.
        for frame in out[2 * 2_000..2 * 6_000].chunks_exact(2) {
            assert!((frame[0] - 0.5).abs() < 0.01);
            assert!((frame[1] - 0.5).abs() < 0.01);
        }
    }

    #[test]
    fn test_downsampling_keeps_alignment() {
        // A step at the midpoint stays at the midpoint after conversion.
        let mut samples = vec![0.0; 6_000];
        samples[3_000..].fill(1.0);
        let out = resample_interleaved(samples, 1, 48_000, 16_000).unwrap();

        assert_eq!(out.len(), 2_000);
        assert!(out[900].abs() < 0.01);
        assert!((out[1_100] - 1.0).abs() < 0.01);
        assert!((out[1_000] - 0.5).abs() < 0.2);
    }

    #[test]
    fn test_short_clip_is_flushed() {
        let out = resample_interleaved(vec![0.25; 10], 1, 1_000, 3_000).unwrap();
        assert_eq!(out.len(), 30);
    }
}
