use super::{CoverImageService, DescriptionService};
use crate::models::{ImageSize, Quality};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Failure flavours the mocks can inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Provider,
    RateLimited,
    Credential,
}

impl MockFailure {
    fn into_error(self, context: &str) -> Error {
        match self {
            MockFailure::Provider => Error::AiProvider(format!("Mock failure: {}", context)),
            MockFailure::RateLimited => Error::RateLimited(format!("Mock throttle: {}", context)),
            MockFailure::Credential => {
                Error::InvalidCredential(format!("Mock credential rejection: {}", context))
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct MockDescriptionClient {
    responses: Arc<Mutex<HashMap<String, Vec<String>>>>,
    failures: Arc<Mutex<HashMap<String, VecDeque<MockFailure>>>>,
    calls: Arc<Mutex<Vec<(String, u8)>>>,
    system_prompts: Arc<Mutex<Vec<String>>>,
}

impl MockDescriptionClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed answer for a title; the client still returns whatever is given.
    pub fn with_descriptions(self, title: &str, descriptions: Vec<String>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(title.to_string(), descriptions);
        self
    }

    /// Queue one failing call for `title`; later calls succeed again.
    pub fn with_failure(self, title: &str, failure: MockFailure) -> Self {
        self.failures
            .lock()
            .unwrap()
            .entry(title.to_string())
            .or_default()
            .push_back(failure);
        self
    }

    pub fn get_call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn get_calls(&self) -> Vec<(String, u8)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn get_system_prompts(&self) -> Vec<String> {
        self.system_prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl DescriptionService for MockDescriptionClient {
    async fn generate_descriptions(
        &self,
        title: &str,
        count: u8,
        system_prompt: &str,
    ) -> Result<Vec<String>> {
        self.calls.lock().unwrap().push((title.to_string(), count));
        self.system_prompts
            .lock()
            .unwrap()
            .push(system_prompt.to_string());

        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(title)
            .and_then(VecDeque::pop_front);
        if let Some(failure) = failure {
            return Err(failure.into_error(title));
        }

        if let Some(fixed) = self.responses.lock().unwrap().get(title) {
            return Ok(fixed.clone());
        }

        Ok((1..=count)
            .map(|i| format!("Cover concept {} for '{}'", i, title))
            .collect())
    }
}

/// A tiny PNG used when no explicit image response is configured.
pub const MOCK_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // PNG signature
    0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR chunk
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, // 1x1 pixel
    0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, 0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49, 0x44,
    0x41, // IDAT chunk
    0x54, 0x08, 0x99, 0x63, 0xF8, 0xCF, 0xC0, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0xE2, 0x25,
    0x00, 0xBC, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, // IEND chunk
    0x44, 0xAE, 0x42, 0x60, 0x82,
];

#[derive(Clone, Default)]
pub struct MockCoverImageClient {
    image_responses: Arc<Mutex<Vec<Vec<u8>>>>,
    failures: Arc<Mutex<HashMap<usize, MockFailure>>>,
    descriptions: Arc<Mutex<Vec<String>>>,
    call_count: Arc<Mutex<usize>>,
}

impl MockCoverImageClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image_response(self, response: Vec<u8>) -> Self {
        self.image_responses.lock().unwrap().push(response);
        self
    }

    /// Fail the `call`-th request (1-based, counted across all titles).
    pub fn with_failure_on_call(self, call: usize, failure: MockFailure) -> Self {
        self.failures.lock().unwrap().insert(call, failure);
        self
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    /// Descriptions received, in call order.
    pub fn get_descriptions(&self) -> Vec<String> {
        self.descriptions.lock().unwrap().clone()
    }
}

#[async_trait]
impl CoverImageService for MockCoverImageClient {
    async fn generate_image(
        &self,
        title: &str,
        description: &str,
        _quality: Quality,
        _size: ImageSize,
    ) -> Result<Vec<u8>> {
        let call = {
            let mut count = self.call_count.lock().unwrap();
            *count += 1;
            *count
        };
        self.descriptions
            .lock()
            .unwrap()
            .push(description.to_string());

        if let Some(failure) = self.failures.lock().unwrap().get(&call) {
            return Err(failure.into_error(&format!("image call {} for '{}'", call, title)));
        }

        let responses = self.image_responses.lock().unwrap();
        if responses.is_empty() {
            Ok(MOCK_PNG.to_vec())
        } else {
            let index = (call - 1) % responses.len();
            Ok(responses[index].clone())
        }
    }
}
