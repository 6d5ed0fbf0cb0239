//! Shareable links carrying a session's generation settings.
//!
//! The prompt and the title list are base64-encoded so they survive as single
//! query values; titles are joined with `|` before encoding.

use crate::models::{ImageSize, Quality};
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::Url;
use tracing::warn;

const FALLBACK_VARIATIONS: i64 = 1;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShareConfig {
    pub system_prompt: Option<String>,
    pub variations: Option<i64>,
    pub quality: Option<Quality>,
    pub size: Option<ImageSize>,
    pub titles: Vec<String>,
}

impl ShareConfig {
    pub fn encode(&self, base_url: &str) -> Result<String> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(prompt) = &self.system_prompt {
            params.push(("prompt", STANDARD.encode(prompt.as_bytes())));
        }
        if let Some(variations) = self.variations {
            params.push(("variations", variations.to_string()));
        }
        if let Some(quality) = self.quality {
            params.push(("quality", quality.to_string()));
        }
        if let Some(size) = self.size {
            params.push(("size", size.to_string()));
        }
        if !self.titles.is_empty() {
            params.push(("books", STANDARD.encode(self.titles.join("|").as_bytes())));
        }

        let url = Url::parse_with_params(base_url, &params)
            .map_err(|e| Error::InvalidInput(format!("Invalid share base URL '{}': {}", base_url, e)))?;
        Ok(url.to_string())
    }

    /// Decode a full link or a bare query string. Malformed values are
    /// dropped rather than rejected.
    pub fn decode(link: &str) -> Self {
        let link = link.trim();
        let url = Url::parse(link).or_else(|_| {
            Url::parse(&format!(
                "http://share.invalid/?{}",
                link.trim_start_matches('?')
            ))
        });
        let url = match url {
            Ok(url) => url,
            Err(e) => {
                warn!("Ignoring unreadable share link: {}", e);
                return Self::default();
            }
        };

        let mut config = Self::default();
        for (key, value) in url.query_pairs() {
            match &*key {
                "prompt" => config.system_prompt = decode_text(&value),
                "variations" => {
                    config.variations = Some(value.trim().parse().unwrap_or_else(|_| {
                        warn!("Share link variations '{}' is not a number", value);
                        FALLBACK_VARIATIONS
                    }))
                }
                "quality" => config.quality = value.parse().ok(),
                "size" => config.size = value.parse().ok(),
                "books" => {
                    config.titles = decode_text(&value)
                        .map(|joined| {
                            joined
                                .split('|')
                                .map(str::trim)
                                .filter(|title| !title.is_empty())
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default()
                }
                _ => {}
            }
        }
        config
    }
}

fn decode_text(value: &str) -> Option<String> {
    let bytes = STANDARD.decode(value.trim()).ok()?;
    String::from_utf8(bytes).ok()
}
