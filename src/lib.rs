use pyo3::pymodule;

pub mod audio_engine;
pub mod colors;
pub mod messages;
pub mod persist;
pub mod state;
pub mod time;
pub mod upload;

/// The Python module implemented in Rust.
#[pymodule]
mod audiodeck_audio {
    use pyo3::prelude::*;

    #[pymodule_export]
    use super::audio_engine::Soundboard;

    /// Format seconds as `mm:ss`.
    #[pyfunction]
    fn format_time(seconds: f64) -> String {
        crate::time::format_time(seconds)
    }

    /// Whether an uploaded file is an MP3 or WAV clip.
    #[pyfunction]
    fn is_valid_upload(name: &str, media_type: &str) -> bool {
        crate::upload::is_valid_upload(name, media_type)
    }

    /// `n` pastel colours evenly spaced around the hue circle.
    #[pyfunction]
    #[pyo3(signature = (n, seed_hue=None))]
    fn generate_harmonic_palette(n: usize, seed_hue: Option<u32>) -> Vec<String> {
        crate::colors::generate_harmonic_palette(n, seed_hue)
    }

    /// `#FFFFFF` or `#000000`, whichever reads better on `background`.
    #[pyfunction]
    fn pick_accessible_text_color(background: &str) -> &'static str {
        crate::colors::pick_accessible_text_color(background)
    }
}
