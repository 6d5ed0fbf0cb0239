use super::client::OpenAiHttpClient;
use super::types::{ChatCompletionRequest, ChatMessage, DescriptionBatch, JsonSchema, ResponseFormat};
use crate::ai::DescriptionService;
use crate::{prompts, Error, Result};
use async_trait::async_trait;
use std::time::Duration;

const DESCRIPTION_TEMPERATURE: f32 = 0.9;

pub struct OpenAiDescriptionClient {
    http: OpenAiHttpClient,
    model: String,
}

impl OpenAiDescriptionClient {
    #[cfg(test)]
    pub fn new(api_key: String, model: String) -> Self {
        Self::new_with_client(api_key, model, reqwest::Client::new())
    }

    pub fn new_with_client(api_key: String, model: String, client: reqwest::Client) -> Self {
        Self {
            http: OpenAiHttpClient::new_with_client(api_key, Duration::from_secs(60), client),
            model,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    fn response_format() -> ResponseFormat {
        ResponseFormat {
            format_type: "json_schema".to_string(),
            json_schema: JsonSchema {
                name: "cover_descriptions".to_string(),
                schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "descriptions": {
                            "type": "array",
                            "items": { "type": "string" }
                        }
                    },
                    "required": ["descriptions"],
                    "additionalProperties": false
                }),
                strict: true,
            },
        }
    }
}

#[async_trait]
impl DescriptionService for OpenAiDescriptionClient {
    async fn generate_descriptions(
        &self,
        title: &str,
        count: u8,
        system_prompt: &str,
    ) -> Result<Vec<String>> {
        let count_str = count.to_string();
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(prompts::render(
                    prompts::DESCRIPTION_USER,
                    &[("title", title), ("count", &count_str)],
                )),
            ],
            max_completion_tokens: 3000,
            temperature: Some(DESCRIPTION_TEMPERATURE),
            response_format: Some(Self::response_format()),
        };

        let response = self.http.chat_completion(&request).await?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| Error::AiProvider("No response from OpenAI chat API".to_string()))?;

        let batch: DescriptionBatch = serde_json::from_str(&content).map_err(|e| {
            tracing::error!("Description payload was not valid JSON: {}\n{}", e, content);
            Error::AiProvider(format!("Malformed description payload: {}", e))
        })?;

        let mut descriptions: Vec<String> = batch
            .descriptions
            .into_iter()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .collect();

        let wanted = count as usize;
        if descriptions.len() < wanted {
            return Err(Error::AiProvider(format!(
                "Expected {} descriptions for '{}', got {}",
                wanted,
                title,
                descriptions.len()
            )));
        }
        if descriptions.len() > wanted {
            tracing::warn!(
                "Received {} descriptions for '{}', keeping the first {}",
                descriptions.len(),
                title,
                wanted
            );
            descriptions.truncate(wanted);
        }

        Ok(descriptions)
    }
}
