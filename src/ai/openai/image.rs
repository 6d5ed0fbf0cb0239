use super::client::OpenAiHttpClient;
use super::types::{ImageGenerationRequest, ImageGenerationResponse};
use crate::ai::CoverImageService;
use crate::models::{ImageSize, Quality};
use crate::{prompts, Error, Result};
use async_trait::async_trait;
use std::time::Duration;

pub struct OpenAiCoverImageClient {
    http: OpenAiHttpClient,
    model: String,
}

impl OpenAiCoverImageClient {
    #[cfg(test)]
    pub fn new(api_key: String, model: String) -> Self {
        Self::new_with_client(api_key, model, reqwest::Client::new())
    }

    pub fn new_with_client(api_key: String, model: String, client: reqwest::Client) -> Self {
        Self {
            http: OpenAiHttpClient::new_with_client(api_key, Duration::from_secs(120), client),
            model,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }
}

#[async_trait]
impl CoverImageService for OpenAiCoverImageClient {
    async fn generate_image(
        &self,
        title: &str,
        description: &str,
        quality: Quality,
        size: ImageSize,
    ) -> Result<Vec<u8>> {
        let enhanced_prompt = prompts::render(
            prompts::COVER_IMAGE,
            &[("title", title), ("description", description)],
        );

        let request = ImageGenerationRequest {
            model: self.model.clone(),
            prompt: enhanced_prompt,
            n: 1,
            size: size.api_value(&self.model).to_string(),
            quality: quality.api_value(&self.model).to_string(),
        };

        let response: ImageGenerationResponse =
            self.http.post("/v1/images/generations", &request).await?;

        let image_data = response
            .data
            .first()
            .ok_or_else(|| Error::AiProvider("No image data in OpenAI response".to_string()))?;

        let image_bytes = if let Some(b64_json) = &image_data.b64_json {
            use base64::Engine as _;
            base64::engine::general_purpose::STANDARD
                .decode(b64_json)
                .map_err(|e| Error::AiProvider(format!("Failed to decode base64 image: {}", e)))?
        } else if let Some(url) = &image_data.url {
            self.http.download(url).await?
        } else {
            return Err(Error::AiProvider(
                "No image data (neither base64 nor URL) in response".to_string(),
            ));
        };

        Ok(image_bytes)
    }
}
