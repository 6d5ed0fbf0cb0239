//! Input collection: titles and generation options.

use crate::models::{GenerationRequest, ImageSize, Quality};
use tracing::warn;

pub const MIN_VARIATIONS: u8 = 1;
pub const MAX_VARIATIONS: u8 = 5;

/// Split multi-line input into titles, one per non-blank line.
pub fn parse_titles(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Clamp a requested variation count into the supported range.
pub fn clamp_variations(requested: i64) -> u8 {
    let clamped = requested.clamp(MIN_VARIATIONS as i64, MAX_VARIATIONS as i64) as u8;
    if clamped as i64 != requested {
        warn!(
            "Variation count {} out of range [{}, {}], using {}",
            requested, MIN_VARIATIONS, MAX_VARIATIONS, clamped
        );
    }
    clamped
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub variations: u8,
    pub quality: Quality,
    pub size: ImageSize,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            variations: MIN_VARIATIONS,
            quality: Quality::default(),
            size: ImageSize::default(),
        }
    }
}

impl GenerationOptions {
    pub fn new(variations: i64, quality: Quality, size: ImageSize) -> Self {
        Self {
            variations: clamp_variations(variations),
            quality,
            size,
        }
    }
}

pub fn build_requests(titles: &[String], options: &GenerationOptions) -> Vec<GenerationRequest> {
    titles
        .iter()
        .map(|title| GenerationRequest {
            title: title.clone(),
            variation_count: options.variations,
            quality: options.quality,
            size: options.size,
        })
        .collect()
}
