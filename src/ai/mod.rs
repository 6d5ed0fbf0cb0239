//! AI service integration for description and cover generation
//!
//! Provides interfaces to OpenAI's Chat Completions and Image APIs for
//! writing cover descriptions and rendering them into images.

pub mod mime;
pub mod mock;
pub mod openai;

pub use mock::{MockCoverImageClient, MockDescriptionClient, MockFailure};
pub use openai::{OpenAiCoverImageClient, OpenAiDescriptionClient};

use crate::models::{ImageSize, Quality};
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait DescriptionService: Send + Sync {
    /// Ask for `count` distinct cover descriptions for `title`, in order.
    async fn generate_descriptions(
        &self,
        title: &str,
        count: u8,
        system_prompt: &str,
    ) -> Result<Vec<String>>;
}

#[async_trait]
pub trait CoverImageService: Send + Sync {
    async fn generate_image(
        &self,
        title: &str,
        description: &str,
        quality: Quality,
        size: ImageSize,
    ) -> Result<Vec<u8>>;
}
