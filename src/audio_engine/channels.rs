use crate::audio_engine::errors::SampleLoadError;

/// Maps interleaved samples from the file's channel layout to the output's.
///
/// - mono output: every frame is averaged
/// - mono input: the single channel is copied to every output channel
/// - otherwise output channel `c` takes input channel `c`, silence past the
///   input's last channel (a 5.1 file keeps its front pair on stereo)
///
/// A layout with zero channels is rejected.
pub fn map_channels(
    samples: Vec<f32>,
    file_channels: usize,
    output_channels: usize,
) -> Result<Vec<f32>, SampleLoadError> {
    if file_channels == 0 || output_channels == 0 {
        return Err(SampleLoadError::UnsupportedChannels {
            file_channels,
            output_channels,
        });
    }

    if file_channels == output_channels {
        return Ok(samples);
    }

    let frames = samples.chunks_exact(file_channels);
    let mut out = Vec::with_capacity(frames.len() * output_channels);
    for frame in frames {
        match (file_channels, output_channels) {
            (_, 1) => out.push(frame.iter().sum::<f32>() / file_channels as f32),
            (1, _) => out.extend(std::iter::repeat_n(frame[0], output_channels)),
            _ => out.extend((0..output_channels).map(|c| frame.get(c).copied().unwrap_or(0.0))),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_fans_out() {
        let output = map_channels(vec![0.5, -0.3, 0.8], 1, 2).unwrap();
        assert_eq!(output, vec![0.5, 0.5, -0.3, -0.3, 0.8, 0.8]);

        let output = map_channels(vec![0.25], 1, 4).unwrap();
        assert_eq!(output, vec![0.25; 4]);
    }

    #[test]
    fn test_downmix_to_mono_averages() {
        let output = map_channels(vec![0.5, 0.3, -0.2, 0.4, 0.8, 0.6], 2, 1).unwrap();
        assert_eq!(output.len(), 3);
        assert!((output[0] - 0.4).abs() < 1e-6);
        assert!((output[1] - 0.1).abs() < 1e-6);
        assert!((output[2] - 0.7).abs() < 1e-6);

        let output = map_channels(vec![0.1, 0.2, 0.3, 0.6], 4, 1).unwrap();
        assert!((output[0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_surround_keeps_front_pair() {
        let frame = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let output = map_channels(frame, 6, 2).unwrap();
        assert_eq!(output, vec![0.1, 0.2]);
    }

    #[test]
    fn test_stereo_to_quad_pads_silence() {
        let output = map_channels(vec![0.1, 0.2], 2, 4).unwrap();
        assert_eq!(output, vec![0.1, 0.2, 0.0, 0.0]);
    }

    #[test]
    fn test_same_layout_is_untouched() {
        let input = vec![0.5, -0.3, 0.8, 0.2];
        assert_eq!(map_channels(input.clone(), 2, 2).unwrap(), input);
    }

    #[test]
    fn test_zero_channels_rejected() {
        assert!(matches!(
            map_channels(vec![0.5], 0, 2),
            Err(SampleLoadError::UnsupportedChannels { .. })
        ));
        assert!(matches!(
            map_channels(vec![0.5], 1, 0),
            Err(SampleLoadError::UnsupportedChannels { .. })
        ));
    }
}
