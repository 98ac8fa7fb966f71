//! Pad colours: evenly spaced pastel hues and a readable text colour for each.

use rand::Rng;

const PALETTE_SATURATION: f64 = 60.0;
const PALETTE_LIGHTNESS: f64 = 72.0;
const MIN_TEXT_CONTRAST: f64 = 4.5;

pub const WHITE: &str = "#FFFFFF";
pub const BLACK: &str = "#000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// HSL (degrees, percent, percent) to RGB.
pub fn hsl_to_rgb(h: f64, s: f64, l: f64) -> Rgb {
    let s = s / 100.0;
    let l = l / 100.0;
    let a = s * l.min(1.0 - l);
    let channel = |n: f64| {
        let k = (n + h / 30.0) % 12.0;
        let value = l - a * (k - 3.0).min(9.0 - k).min(1.0).max(-1.0);
        (255.0 * value).round().clamp(0.0, 255.0) as u8
    };

    Rgb {
        r: channel(0.0),
        g: channel(8.0),
        b: channel(4.0),
    }
}

pub fn hsl_to_hex(h: f64, s: f64, l: f64) -> String {
    hsl_to_rgb(h, s, l).to_hex()
}

/// Parses `#rrggbb` (the `#` is optional). Malformed input reads as black.
pub fn hex_to_rgb(hex: &str) -> Rgb {
    let clean = hex.trim().trim_start_matches('#');
    let value = u32::from_str_radix(clean, 16).unwrap_or(0);
    Rgb {
        r: ((value >> 16) & 0xff) as u8,
        g: ((value >> 8) & 0xff) as u8,
        b: (value & 0xff) as u8,
    }
}

/// WCAG relative luminance.
pub fn relative_luminance(rgb: Rgb) -> f64 {
    let linear = |channel: u8| {
        let v = f64::from(channel) / 255.0;
        if v <= 0.03928 {
            v / 12.92
        } else {
            ((v + 0.055) / 1.055).powf(2.4)
        }
    };
    0.2126 * linear(rgb.r) + 0.7152 * linear(rgb.g) + 0.0722 * linear(rgb.b)
}

pub fn contrast_ratio(a: &str, b: &str) -> f64 {
    let la = relative_luminance(hex_to_rgb(a));
    let lb = relative_luminance(hex_to_rgb(b));
    let (light, dark) = if la >= lb { (la, lb) } else { (lb, la) };
    (light + 0.05) / (dark + 0.05)
}

/// White when it reaches AA contrast or beats black, black otherwise.
pub fn pick_accessible_text_color(background: &str) -> &'static str {
    let white = contrast_ratio(background, WHITE);
    let black = contrast_ratio(background, BLACK);
    if white >= MIN_TEXT_CONTRAST || white >= black {
        WHITE
    } else {
        BLACK
    }
}

/// `n` pastel colours with hues spaced `floor(360 / n)` degrees apart,
/// starting at `seed_hue` or at a random hue.
pub fn generate_harmonic_palette(n: usize, seed_hue: Option<u32>) -> Vec<String> {
    if n == 0 {
        return Vec::new();
    }

    let base = seed_hue.unwrap_or_else(|| rand::rng().random_range(0..360));
    let step = 360 / n as u64;
    (0..n as u64)
        .map(|i| {
            let hue = (u64::from(base) + i * step) % 360;
            hsl_to_hex(hue as f64, PALETTE_SATURATION, PALETTE_LIGHTNESS)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hsl_primaries() {
        assert_eq!(hsl_to_hex(0.0, 100.0, 50.0), "#ff0000");
        assert_eq!(hsl_to_hex(120.0, 100.0, 50.0), "#00ff00");
        assert_eq!(hsl_to_hex(240.0, 100.0, 50.0), "#0000ff");
        assert_eq!(hsl_to_hex(0.0, 0.0, 100.0), "#ffffff");
    }

    #[test]
    fn test_palette_spacing() {
        let palette = generate_harmonic_palette(6, Some(0));
        assert_eq!(palette.len(), 6);
        assert_eq!(palette[0], hsl_to_hex(0.0, 60.0, 72.0));
        assert_eq!(palette[1], hsl_to_hex(60.0, 60.0, 72.0));
        assert_eq!(palette[5], hsl_to_hex(300.0, 60.0, 72.0));
    }

    #[test]
    fn test_palette_wraps_hue() {
        let palette = generate_harmonic_palette(4, Some(300));
        assert_eq!(palette[1], hsl_to_hex(30.0, 60.0, 72.0));
    }

    #[test]
    fn test_random_palette_is_well_formed() {
        let palette = generate_harmonic_palette(5, None);
        assert_eq!(palette.len(), 5);
        assert!(palette.iter().all(|c| c.len() == 7 && c.starts_with('#')));
        assert!(generate_harmonic_palette(0, None).is_empty());
    }

    #[test]
    fn test_hex_round_trip_and_malformed() {
        assert_eq!(hex_to_rgb("#1e1e1e"), Rgb { r: 30, g: 30, b: 30 });
        assert_eq!(hex_to_rgb("FF8000"), Rgb { r: 255, g: 128, b: 0 });
        assert_eq!(hex_to_rgb("nonsense"), Rgb { r: 0, g: 0, b: 0 });
    }

    #[test]
    fn test_contrast_extremes() {
        assert!((contrast_ratio(WHITE, BLACK) - 21.0).abs() < 1e-9);
        assert!((contrast_ratio("#777777", "#777777") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_text_color_choice() {
        assert_eq!(pick_accessible_text_color("#000000"), WHITE);
        assert_eq!(pick_accessible_text_color("#1E1E1E"), WHITE);
        assert_eq!(pick_accessible_text_color("#FFFFFF"), BLACK);
        assert_eq!(pick_accessible_text_color("#f2d479"), BLACK);
    }
}
