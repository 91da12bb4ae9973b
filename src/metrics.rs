use crate::config::PlacementConfig;
use once_cell::sync::Lazy;

/// Text measurement consumed by the placement core. Font handling lives
/// outside this crate; callers supply whatever measurer their renderer uses.
pub trait TextMetrics {
    fn text_width(&self, text: &str, font_size: f64) -> f64;
    fn line_height(&self, font_size: f64) -> f64;
}

/// Per-character width factors calibrated for a common sans-serif stack.
#[derive(Debug, Clone, Copy)]
pub struct FallbackMetrics {
    pub line_height_ratio: f64,
}

impl Default for FallbackMetrics {
    fn default() -> Self {
        Self {
            line_height_ratio: 1.2,
        }
    }
}

impl FallbackMetrics {
    pub fn from_config(config: &PlacementConfig) -> Self {
        Self {
            line_height_ratio: config.line_height,
        }
    }
}

static ASCII_WIDTHS: Lazy<[f64; 128]> = Lazy::new(|| {
    let mut table = [DEFAULT_FACTOR; 128];
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = char_width_factor(i as u8 as char);
    }
    table
});

const DEFAULT_FACTOR: f64 = 0.568;

fn char_width_factor(ch: char) -> f64 {
    match ch {
        ' ' => 0.306,
        '.' | ',' | ':' | ';' | '|' | '!' | '(' | ')' | '[' | ']' | '{' | '}' | '\'' => 0.321,
        'I' | 'i' | 'j' | 'l' => 0.24,
        'f' | 't' | 'r' => 0.34,
        'M' | 'W' | 'm' | 'w' => 0.88,
        'A'..='Z' => 0.67,
        'a'..='z' => 0.56,
        '1' => 0.396,
        '0'..='9' => 0.6,
        '@' | '#' | '%' | '&' => 0.946,
        _ => DEFAULT_FACTOR,
    }
}

impl TextMetrics for FallbackMetrics {
    fn text_width(&self, text: &str, font_size: f64) -> f64 {
        let factors: f64 = text
            .chars()
            .map(|ch| {
                if ch.is_ascii() {
                    ASCII_WIDTHS[ch as usize]
                } else {
                    1.0
                }
            })
            .sum();
        factors * font_size
    }

    fn line_height(&self, font_size: f64) -> f64 {
        font_size * self.line_height_ratio
    }
}

/// Fixed advance per character. Predictable widths make it the measurer of
/// choice for fixtures.
#[derive(Debug, Clone, Copy)]
pub struct MonospaceMetrics {
    pub advance_ratio: f64,
    pub line_height_ratio: f64,
}

impl Default for MonospaceMetrics {
    fn default() -> Self {
        Self {
            advance_ratio: 0.6,
            line_height_ratio: 1.2,
        }
    }
}

impl TextMetrics for MonospaceMetrics {
    fn text_width(&self, text: &str, font_size: f64) -> f64 {
        text.chars().count() as f64 * font_size * self.advance_ratio
    }

    fn line_height(&self, font_size: f64) -> f64 {
        font_size * self.line_height_ratio
    }
}
