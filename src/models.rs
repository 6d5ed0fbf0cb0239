//! Data models and structures
//!
//! Defines generation requests, the description/cover entities that flow
//! through the pipeline, per-title reports, and session configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Standard,
    Hd,
}

impl Quality {
    /// Provider value for the given image model.
    pub fn api_value(&self, model: &str) -> &'static str {
        let dalle = is_dalle_model(model);
        match (self, dalle) {
            (Quality::Standard, true) => "standard",
            (Quality::Hd, true) => "hd",
            (Quality::Standard, false) => "medium",
            (Quality::Hd, false) => "high",
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" | "medium" => Ok(Quality::Standard),
            "hd" | "high" => Ok(Quality::Hd),
            other => Err(format!(
                "Unknown quality '{}'. Expected one of: standard, hd",
                other
            )),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Standard => write!(f, "standard"),
            Quality::Hd => write!(f, "hd"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageSize {
    #[default]
    Square,
    Landscape,
    Portrait,
}

impl ImageSize {
    /// Provider `WIDTHxHEIGHT` value for the given image model.
    pub fn api_value(&self, model: &str) -> &'static str {
        let dalle = is_dalle_model(model);
        match (self, dalle) {
            (ImageSize::Square, _) => "1024x1024",
            (ImageSize::Landscape, true) => "1792x1024",
            (ImageSize::Portrait, true) => "1024x1792",
            (ImageSize::Landscape, false) => "1536x1024",
            (ImageSize::Portrait, false) => "1024x1536",
        }
    }
}

impl FromStr for ImageSize {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "square" | "1024x1024" => Ok(ImageSize::Square),
            "landscape" | "1536x1024" => Ok(ImageSize::Landscape),
            "portrait" | "1024x1536" => Ok(ImageSize::Portrait),
            other => Err(format!(
                "Unknown size '{}'. Expected one of: square, landscape, portrait",
                other
            )),
        }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSize::Square => write!(f, "square"),
            ImageSize::Landscape => write!(f, "landscape"),
            ImageSize::Portrait => write!(f, "portrait"),
        }
    }
}

fn is_dalle_model(model: &str) -> bool {
    model.starts_with("dall-e")
}

/// One title's worth of work, fixed for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    pub title: String,
    pub variation_count: u8,
    pub quality: Quality,
    pub size: ImageSize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Description {
    pub title: String,
    /// 1-based position within the title's variants.
    pub variant_index: u8,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct CoverImage {
    pub title: String,
    pub variant_index: u8,
    pub bytes: Vec<u8>,
    pub description: Description,
}

impl CoverImage {
    pub fn new(description: Description, bytes: Vec<u8>) -> Self {
        Self {
            title: description.title.clone(),
            variant_index: description.variant_index,
            bytes,
            description,
        }
    }
}

/// Where a cover and its description landed on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedCover {
    pub variant_index: u8,
    pub image_path: PathBuf,
    pub description_path: PathBuf,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum VariantOutcome {
    Saved(SavedCover),
    ImageFailed(String),
    SaveFailed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariantReport {
    pub variant_index: u8,
    pub description: String,
    pub outcome: VariantOutcome,
}

impl VariantReport {
    pub fn saved(&self) -> Option<&SavedCover> {
        match &self.outcome {
            VariantOutcome::Saved(cover) => Some(cover),
            _ => None,
        }
    }
}

/// Ordered results for one title, as handed to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TitleReport {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_error: Option<String>,
    pub variants: Vec<VariantReport>,
}

impl TitleReport {
    pub fn new(title: String, variants: Vec<VariantReport>) -> Self {
        Self {
            title,
            description_error: None,
            variants,
        }
    }

    pub fn description_failed(title: String, error: String) -> Self {
        Self {
            title,
            description_error: Some(error),
            variants: Vec::new(),
        }
    }

    pub fn saved_covers(&self) -> impl Iterator<Item = &SavedCover> {
        self.variants.iter().filter_map(VariantReport::saved)
    }

    pub fn saved_count(&self) -> usize {
        self.saved_covers().count()
    }

    pub fn failed_count(&self) -> usize {
        self.variants.len() - self.saved_count()
    }
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub chat_model: String,
    pub image_model: String,
    pub output_dir: PathBuf,
    pub description_delay: Duration,
    pub image_delay: Duration,
    pub rate_limit_retries: usize,
    pub rate_limit_backoff: Duration,
    pub share_base_url: String,
}

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_SHARE_BASE_URL: &str = "http://localhost:8501";

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            chat_model: "gpt-4o".to_string(),
            image_model: "gpt-image-1".to_string(),
            output_dir: PathBuf::from("generated_covers"),
            description_delay: Duration::from_millis(500),
            image_delay: Duration::from_millis(1000),
            rate_limit_retries: 0,
            rate_limit_backoff: Duration::from_millis(5000),
            share_base_url: DEFAULT_SHARE_BASE_URL.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> crate::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Ok(Self {
            openai_api_key: var("OPENAI_API_KEY"),
            openai_base_url: var("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            chat_model: var("CHAT_MODEL").unwrap_or(defaults.chat_model),
            image_model: var("IMAGE_MODEL").unwrap_or(defaults.image_model),
            output_dir: var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            description_delay: parse_millis(
                "DESCRIPTION_DELAY_MS",
                var("DESCRIPTION_DELAY_MS"),
                defaults.description_delay,
            )?,
            image_delay: parse_millis("IMAGE_DELAY_MS", var("IMAGE_DELAY_MS"), defaults.image_delay)?,
            rate_limit_retries: match var("RATE_LIMIT_RETRIES") {
                Some(raw) => raw.trim().parse().map_err(|_| {
                    crate::Error::Config(format!("RATE_LIMIT_RETRIES must be a count, got '{}'", raw))
                })?,
                None => defaults.rate_limit_retries,
            },
            rate_limit_backoff: parse_millis(
                "RATE_LIMIT_BACKOFF_MS",
                var("RATE_LIMIT_BACKOFF_MS"),
                defaults.rate_limit_backoff,
            )?,
            share_base_url: var("SHARE_BASE_URL").unwrap_or(defaults.share_base_url),
        })
    }
}

fn parse_millis(key: &str, raw: Option<String>, default: Duration) -> crate::Result<Duration> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| crate::Error::Config(format!("{} must be milliseconds, got '{}'", key, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_quality_parsing_and_api_values() {
        assert_eq!("HD".parse::<Quality>().unwrap(), Quality::Hd);
        assert_eq!("medium".parse::<Quality>().unwrap(), Quality::Standard);
        assert!("ultra".parse::<Quality>().is_err());

        assert_eq!(Quality::Standard.api_value("gpt-image-1"), "medium");
        assert_eq!(Quality::Hd.api_value("gpt-image-1"), "high");
        assert_eq!(Quality::Hd.api_value("dall-e-3"), "hd");
    }

    #[test]
    fn test_size_parsing_and_api_values() {
        assert_eq!("Landscape".parse::<ImageSize>().unwrap(), ImageSize::Landscape);
        assert_eq!("1024x1536".parse::<ImageSize>().unwrap(), ImageSize::Portrait);
        assert!("wide".parse::<ImageSize>().is_err());

        assert_eq!(ImageSize::Landscape.api_value("gpt-image-1"), "1536x1024");
        assert_eq!(ImageSize::Portrait.api_value("dall-e-3"), "1024x1792");
        assert_eq!(ImageSize::Square.api_value("dall-e-3"), "1024x1024");
    }

    #[test]
    fn test_cover_image_inherits_description_identity() {
        let description = Description {
            title: "Dune".to_string(),
            variant_index: 2,
            text: "Sand and a single moon".to_string(),
        };
        let cover = CoverImage::new(description.clone(), vec![1, 2, 3]);
        assert_eq!(cover.title, "Dune");
        assert_eq!(cover.variant_index, 2);
        assert_eq!(cover.description, description);
    }

    #[test]
    fn test_title_report_counts() {
        let saved = SavedCover {
            variant_index: 1,
            image_path: PathBuf::from("a.png"),
            description_path: PathBuf::from("a.txt"),
            description: "one".to_string(),
        };
        let report = TitleReport::new(
            "Dune".to_string(),
            vec![
                VariantReport {
                    variant_index: 1,
                    description: "one".to_string(),
                    outcome: VariantOutcome::Saved(saved),
                },
                VariantReport {
                    variant_index: 2,
                    description: "two".to_string(),
                    outcome: VariantOutcome::ImageFailed("boom".to_string()),
                },
            ],
        );
        assert_eq!(report.saved_count(), 1);
        assert_eq!(report.failed_count(), 1);

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"status\":\"image_failed\""));
        assert!(!json.contains("description_error"));
    }

    #[test]
    fn test_config_defaults_and_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", "sk-test"),
            ("IMAGE_MODEL", "dall-e-3"),
            ("IMAGE_DELAY_MS", "0"),
            ("RATE_LIMIT_RETRIES", "2"),
            ("CHAT_MODEL", "  "),
        ]);
        let config = Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.image_model, "dall-e-3");
        assert_eq!(config.chat_model, "gpt-4o");
        assert_eq!(config.image_delay, Duration::ZERO);
        assert_eq!(config.description_delay, Duration::from_millis(500));
        assert_eq!(config.rate_limit_retries, 2);
        assert_eq!(config.output_dir, PathBuf::from("generated_covers"));
    }

    #[test]
    fn test_config_rejects_malformed_numbers() {
        let err = Config::from_lookup(|key| {
            (key == "IMAGE_DELAY_MS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }
}
