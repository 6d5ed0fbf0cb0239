//! Batch pipeline: descriptions, then one cover per description, per title.

use crate::ai::{
    CoverImageService, DescriptionService, OpenAiCoverImageClient, OpenAiDescriptionClient,
};
use crate::models::{
    Config, CoverImage, Description, GenerationRequest, TitleReport, VariantOutcome,
    VariantReport,
};
use crate::prompts;
use crate::storage::{CoverStore, FsCoverStore};
use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_retry::{strategy::FixedInterval, RetryIf};
use tracing::{error, info, warn};

/// Session-wide knobs, fixed when the pipeline is built.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub system_prompt: String,
    pub description_delay: Duration,
    pub image_delay: Duration,
    pub rate_limit_retries: usize,
    pub rate_limit_backoff: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            system_prompt: prompts::DESCRIPTION_SYSTEM.to_string(),
            description_delay: Duration::from_millis(500),
            image_delay: Duration::from_millis(1000),
            rate_limit_retries: 0,
            rate_limit_backoff: Duration::from_millis(5000),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config, system_prompt: Option<String>) -> Self {
        Self {
            system_prompt: system_prompt
                .filter(|prompt| !prompt.trim().is_empty())
                .unwrap_or_else(|| prompts::DESCRIPTION_SYSTEM.to_string()),
            description_delay: config.description_delay,
            image_delay: config.image_delay,
            rate_limit_retries: config.rate_limit_retries,
            rate_limit_backoff: config.rate_limit_backoff,
        }
    }

    /// No delays; used by tests and harnesses.
    pub fn immediate() -> Self {
        Self {
            description_delay: Duration::ZERO,
            image_delay: Duration::ZERO,
            rate_limit_backoff: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Injectable service bundle used to construct [`Pipeline`] in tests/harnesses.
pub struct PipelineServices {
    pub descriptions: Box<dyn DescriptionService>,
    pub images: Box<dyn CoverImageService>,
    pub store: Box<dyn CoverStore>,
}

/// Sleeps before every call except the first, spacing consecutive calls.
struct Pacer {
    delay: Duration,
    primed: bool,
}

impl Pacer {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            primed: false,
        }
    }

    async fn wait(&mut self) {
        if self.primed && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.primed = true;
    }
}

/// Reports gathered during a run, plus the error that stopped it early.
#[derive(Debug)]
pub struct RunOutcome {
    pub reports: Vec<TitleReport>,
    pub aborted: Option<Error>,
}

impl RunOutcome {
    /// Drop the partial reports if the run was aborted.
    pub fn into_result(self) -> Result<Vec<TitleReport>> {
        match self.aborted {
            Some(e) => Err(e),
            None => Ok(self.reports),
        }
    }
}

pub struct Pipeline {
    descriptions: Box<dyn DescriptionService>,
    images: Box<dyn CoverImageService>,
    store: Box<dyn CoverStore>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn with_services(services: PipelineServices, settings: PipelineSettings) -> Self {
        Self {
            descriptions: services.descriptions,
            images: services.images,
            store: services.store,
            settings,
        }
    }

    /// Wire the OpenAI clients and an on-disk store from session configuration.
    pub fn from_config(
        config: &Config,
        api_key: String,
        store: FsCoverStore,
        settings: PipelineSettings,
    ) -> Self {
        // Reuse one HTTP connection pool across provider clients.
        let http_client = reqwest::Client::new();

        info!("Description model: {}", config.chat_model);
        info!("Image model: {}", config.image_model);
        info!(
            "Saving covers under {} (run {})",
            store.root().display(),
            store.run_id()
        );

        let descriptions = OpenAiDescriptionClient::new_with_client(
            api_key.clone(),
            config.chat_model.clone(),
            http_client.clone(),
        )
        .with_base_url(config.openai_base_url.clone());
        let images = OpenAiCoverImageClient::new_with_client(
            api_key,
            config.image_model.clone(),
            http_client,
        )
        .with_base_url(config.openai_base_url.clone());

        Self::with_services(
            PipelineServices {
                descriptions: Box::new(descriptions),
                images: Box::new(images),
                store: Box::new(store),
            },
            settings,
        )
    }

    pub fn store(&self) -> &dyn CoverStore {
        self.store.as_ref()
    }

    /// Like [`Pipeline::execute`], but an aborted run yields only its error.
    pub async fn run(&self, requests: &[GenerationRequest]) -> Result<Vec<TitleReport>> {
        self.execute(requests).await.into_result()
    }

    /// Process every request in order.
    ///
    /// Per-title and per-variant failures are recorded in the returned
    /// reports. Only a credential rejection stops the batch early; the
    /// reports for covers already written are still returned.
    pub async fn execute(&self, requests: &[GenerationRequest]) -> RunOutcome {
        let mut description_pacer = Pacer::new(self.settings.description_delay);
        let mut image_pacer = Pacer::new(self.settings.image_delay);
        let mut reports = Vec::with_capacity(requests.len());

        for (position, request) in requests.iter().enumerate() {
            info!(
                "[{}/{}] Generating {} description(s) for '{}'",
                position + 1,
                requests.len(),
                request.variation_count,
                request.title
            );

            description_pacer.wait().await;
            let descriptions = match self.describe(request).await {
                Ok(descriptions) => descriptions,
                Err(e) if e.is_credential() => {
                    error!("Credential rejected while describing '{}': {}", request.title, e);
                    return RunOutcome {
                        reports,
                        aborted: Some(e),
                    };
                }
                Err(e) => {
                    error!("Error generating descriptions for '{}': {}", request.title, e);
                    reports.push(TitleReport::description_failed(
                        request.title.clone(),
                        e.to_string(),
                    ));
                    continue;
                }
            };

            let mut variants = Vec::with_capacity(descriptions.len());
            for description in descriptions {
                image_pacer.wait().await;
                match self.render_variant(request, description).await {
                    Ok(variant) => variants.push(variant),
                    Err(e) => {
                        if !variants.is_empty() {
                            reports.push(TitleReport::new(request.title.clone(), variants));
                        }
                        return RunOutcome {
                            reports,
                            aborted: Some(e),
                        };
                    }
                }
            }

            let report = TitleReport::new(request.title.clone(), variants);
            info!(
                "'{}': {} cover(s) saved, {} failed",
                report.title,
                report.saved_count(),
                report.failed_count()
            );
            reports.push(report);
        }

        RunOutcome {
            reports,
            aborted: None,
        }
    }

    async fn describe(&self, request: &GenerationRequest) -> Result<Vec<Description>> {
        let texts = self
            .with_rate_limit_retry(&request.title, || {
                self.descriptions.generate_descriptions(
                    &request.title,
                    request.variation_count,
                    &self.settings.system_prompt,
                )
            })
            .await?;

        if texts.len() != request.variation_count as usize {
            return Err(Error::AiProvider(format!(
                "Expected {} descriptions for '{}', got {}",
                request.variation_count,
                request.title,
                texts.len()
            )));
        }

        Ok(texts
            .into_iter()
            .zip(1u8..)
            .map(|(text, variant_index)| Description {
                title: request.title.clone(),
                variant_index,
                text,
            })
            .collect())
    }

    /// Image then save for one variant. Only credential errors escape.
    async fn render_variant(
        &self,
        request: &GenerationRequest,
        description: Description,
    ) -> Result<VariantReport> {
        let variant_index = description.variant_index;
        let label = format!("{} #{}", request.title, variant_index);
        info!("[{}] Generating image", label);

        let image = self
            .with_rate_limit_retry(&label, || {
                self.images.generate_image(
                    &request.title,
                    &description.text,
                    request.quality,
                    request.size,
                )
            })
            .await;

        let bytes = match image {
            Ok(bytes) => bytes,
            Err(e) if e.is_credential() => {
                error!("[{}] Credential rejected: {}", label, e);
                return Err(e);
            }
            Err(e) => {
                error!("[{}] Error generating image: {}", label, e);
                return Ok(VariantReport {
                    variant_index,
                    description: description.text,
                    outcome: VariantOutcome::ImageFailed(e.to_string()),
                });
            }
        };
        info!("[{}] Generated image ({} bytes)", label, bytes.len());

        let text = description.text.clone();
        let cover = CoverImage::new(description, bytes);
        let outcome = match self.store.save(&cover).await {
            Ok(saved) => {
                info!("[{}] Saved to {}", label, saved.image_path.display());
                VariantOutcome::Saved(saved)
            }
            Err(e) => {
                error!("[{}] Failed to save cover: {}", label, e);
                VariantOutcome::SaveFailed(e.to_string())
            }
        };

        Ok(VariantReport {
            variant_index,
            description: text,
            outcome,
        })
    }

    async fn with_rate_limit_retry<T, F, Fut>(&self, label: &str, action: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let strategy = FixedInterval::new(self.settings.rate_limit_backoff)
            .take(self.settings.rate_limit_retries);

        RetryIf::spawn(strategy, action, |e: &Error| {
            let retry = e.is_rate_limited() && self.settings.rate_limit_retries > 0;
            if retry {
                warn!("[{}] Rate limited: {}. Will retry...", label, e);
            }
            retry
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::{Pipeline, PipelineServices, PipelineSettings};
    use crate::ai::{MockCoverImageClient, MockDescriptionClient, MockFailure};
    use crate::input::{build_requests, GenerationOptions};
    use crate::models::{ImageSize, Quality, VariantOutcome};
    use crate::storage::{CoverStore, FsCoverStore, MockCoverStore};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn requests(titles: &[&str], variations: i64) -> Vec<crate::models::GenerationRequest> {
        let titles: Vec<String> = titles.iter().map(|t| t.to_string()).collect();
        build_requests(
            &titles,
            &GenerationOptions::new(variations, Quality::Standard, ImageSize::Square),
        )
    }

    fn build_pipeline(
        descriptions: MockDescriptionClient,
        images: MockCoverImageClient,
        store: Box<dyn CoverStore>,
        settings: PipelineSettings,
    ) -> Pipeline {
        Pipeline::with_services(
            PipelineServices {
                descriptions: Box::new(descriptions),
                images: Box::new(images),
                store,
            },
            settings,
        )
    }

    #[tokio::test]
    async fn test_midnight_library_two_variations() {
        let dir = tempdir().unwrap();
        let descriptions = MockDescriptionClient::new();
        let images = MockCoverImageClient::new();
        let pipeline = build_pipeline(
            descriptions.clone(),
            images.clone(),
            Box::new(FsCoverStore::new(dir.path(), "run".to_string())),
            PipelineSettings::immediate(),
        );

        let reports = pipeline
            .run(&requests(&["The Midnight Library"], 2))
            .await
            .unwrap();

        assert_eq!(descriptions.get_call_count(), 1);
        assert_eq!(images.get_call_count(), 2);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].saved_count(), 2);

        let title_dir = dir.path().join("The_Midnight_Library");
        for (i, variant) in reports[0].variants.iter().enumerate() {
            let saved = variant.saved().unwrap();
            assert_eq!(saved.variant_index as usize, i + 1);
            assert!(saved.image_path.starts_with(&title_dir));
            assert!(saved.image_path.exists());
            assert_eq!(
                std::fs::read_to_string(&saved.description_path).unwrap(),
                variant.description
            );
        }
    }

    #[tokio::test]
    async fn test_image_failure_on_variant_two_of_three_continues() {
        let images = MockCoverImageClient::new().with_failure_on_call(2, MockFailure::Provider);
        let store = MockCoverStore::new();
        let pipeline = build_pipeline(
            MockDescriptionClient::new(),
            images.clone(),
            Box::new(store.clone()),
            PipelineSettings::immediate(),
        );

        let reports = pipeline.run(&requests(&["Dune"], 3)).await.unwrap();
        let variants = &reports[0].variants;

        assert_eq!(images.get_call_count(), 3);
        assert_eq!(variants.len(), 3);
        assert!(variants[0].saved().is_some());
        assert!(matches!(variants[1].outcome, VariantOutcome::ImageFailed(_)));
        assert!(variants[2].saved().is_some());
        assert_eq!(reports[0].saved_count(), 2);
        assert_eq!(reports[0].failed_count(), 1);
        assert_eq!(store.get_save_count(), 2);
    }

    #[tokio::test]
    async fn test_variant_order_matches_description_order() {
        let descriptions = MockDescriptionClient::new().with_descriptions(
            "Dune",
            vec!["first".to_string(), "second".to_string(), "third".to_string()],
        );
        let images = MockCoverImageClient::new();
        let pipeline = build_pipeline(
            descriptions,
            images.clone(),
            Box::new(MockCoverStore::new()),
            PipelineSettings::immediate(),
        );

        let reports = pipeline.run(&requests(&["Dune"], 3)).await.unwrap();

        assert_eq!(images.get_descriptions(), vec!["first", "second", "third"]);
        let saved: Vec<(u8, String)> = reports[0]
            .saved_covers()
            .map(|c| (c.variant_index, c.description.clone()))
            .collect();
        assert_eq!(
            saved,
            vec![
                (1, "first".to_string()),
                (2, "second".to_string()),
                (3, "third".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_description_failure_skips_only_that_title() {
        let descriptions = MockDescriptionClient::new().with_failure("Dune", MockFailure::Provider);
        let images = MockCoverImageClient::new();
        let pipeline = build_pipeline(
            descriptions.clone(),
            images.clone(),
            Box::new(MockCoverStore::new()),
            PipelineSettings::immediate(),
        );

        let reports = pipeline
            .run(&requests(&["Dune", "Emma"], 2))
            .await
            .unwrap();

        assert_eq!(
            descriptions.get_calls(),
            vec![("Dune".to_string(), 2), ("Emma".to_string(), 2)]
        );
        assert_eq!(reports.len(), 2);
        assert!(reports[0].description_error.is_some());
        assert!(reports[0].variants.is_empty());
        assert_eq!(reports[1].title, "Emma");
        assert_eq!(reports[1].saved_count(), 2);
        assert_eq!(images.get_call_count(), 2);
    }

    #[tokio::test]
    async fn test_short_description_list_is_title_failure() {
        let descriptions =
            MockDescriptionClient::new().with_descriptions("Dune", vec!["only".to_string()]);
        let images = MockCoverImageClient::new();
        let pipeline = build_pipeline(
            descriptions,
            images.clone(),
            Box::new(MockCoverStore::new()),
            PipelineSettings::immediate(),
        );

        let reports = pipeline.run(&requests(&["Dune"], 2)).await.unwrap();
        assert!(reports[0].description_error.is_some());
        assert_eq!(images.get_call_count(), 0);
    }

    #[tokio::test]
    async fn test_save_failure_is_reported_per_variant() {
        let store = MockCoverStore::new().with_failure_on_save(1);
        let pipeline = build_pipeline(
            MockDescriptionClient::new(),
            MockCoverImageClient::new(),
            Box::new(store),
            PipelineSettings::immediate(),
        );

        let reports = pipeline.run(&requests(&["Dune"], 2)).await.unwrap();
        assert!(matches!(
            reports[0].variants[0].outcome,
            VariantOutcome::SaveFailed(_)
        ));
        assert!(reports[0].variants[1].saved().is_some());
    }

    #[tokio::test]
    async fn test_credential_rejection_aborts_batch() {
        let images = MockCoverImageClient::new().with_failure_on_call(1, MockFailure::Credential);
        let descriptions = MockDescriptionClient::new();
        let pipeline = build_pipeline(
            descriptions.clone(),
            images.clone(),
            Box::new(MockCoverStore::new()),
            PipelineSettings::immediate(),
        );

        let err = pipeline
            .run(&requests(&["Dune", "Emma"], 2))
            .await
            .unwrap_err();

        assert!(err.is_credential());
        assert_eq!(images.get_call_count(), 1);
        assert_eq!(descriptions.get_call_count(), 1);
    }

    #[tokio::test]
    async fn test_credential_rejection_keeps_reports_for_saved_covers() {
        let images = MockCoverImageClient::new().with_failure_on_call(3, MockFailure::Credential);
        let store = MockCoverStore::new();
        let pipeline = build_pipeline(
            MockDescriptionClient::new(),
            images.clone(),
            Box::new(store.clone()),
            PipelineSettings::immediate(),
        );

        let outcome = pipeline.execute(&requests(&["Dune", "Emma", "Persuasion"], 2)).await;

        assert!(outcome.aborted.as_ref().is_some_and(|e| e.is_credential()));
        assert_eq!(images.get_call_count(), 3);
        assert_eq!(store.get_save_count(), 2);

        let titles: Vec<&str> = outcome.reports.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Dune"]);
        assert_eq!(outcome.reports[0].saved_count(), 2);
    }

    #[tokio::test]
    async fn test_credential_rejection_mid_title_reports_finished_variants() {
        let images = MockCoverImageClient::new().with_failure_on_call(2, MockFailure::Credential);
        let pipeline = build_pipeline(
            MockDescriptionClient::new(),
            images,
            Box::new(MockCoverStore::new()),
            PipelineSettings::immediate(),
        );

        let outcome = pipeline.execute(&requests(&["Dune", "Emma"], 3)).await;

        assert!(outcome.aborted.is_some());
        assert_eq!(outcome.reports.len(), 1);
        assert_eq!(outcome.reports[0].title, "Dune");
        assert_eq!(outcome.reports[0].variants.len(), 1);
        assert!(outcome.reports[0].variants[0].saved().is_some());
    }

    #[tokio::test]
    async fn test_rate_limited_calls_are_not_retried_by_default() {
        let images = MockCoverImageClient::new().with_failure_on_call(1, MockFailure::RateLimited);
        let pipeline = build_pipeline(
            MockDescriptionClient::new(),
            images.clone(),
            Box::new(MockCoverStore::new()),
            PipelineSettings::immediate(),
        );

        let reports = pipeline.run(&requests(&["Dune"], 1)).await.unwrap();
        assert_eq!(images.get_call_count(), 1);
        assert!(matches!(
            reports[0].variants[0].outcome,
            VariantOutcome::ImageFailed(_)
        ));
    }

    #[tokio::test]
    async fn test_rate_limited_calls_retry_when_enabled() {
        let descriptions = MockDescriptionClient::new().with_failure("Dune", MockFailure::RateLimited);
        let images = MockCoverImageClient::new().with_failure_on_call(1, MockFailure::RateLimited);
        let settings = PipelineSettings {
            rate_limit_retries: 2,
            ..PipelineSettings::immediate()
        };
        let pipeline = build_pipeline(
            descriptions.clone(),
            images.clone(),
            Box::new(MockCoverStore::new()),
            settings,
        );

        let reports = pipeline.run(&requests(&["Dune"], 1)).await.unwrap();

        assert_eq!(descriptions.get_call_count(), 2);
        assert_eq!(images.get_call_count(), 2);
        assert_eq!(reports[0].saved_count(), 1);
    }

    #[tokio::test]
    async fn test_provider_errors_are_not_retried() {
        let images = MockCoverImageClient::new().with_failure_on_call(1, MockFailure::Provider);
        let settings = PipelineSettings {
            rate_limit_retries: 3,
            ..PipelineSettings::immediate()
        };
        let pipeline = build_pipeline(
            MockDescriptionClient::new(),
            images.clone(),
            Box::new(MockCoverStore::new()),
            settings,
        );

        pipeline.run(&requests(&["Dune"], 1)).await.unwrap();
        assert_eq!(images.get_call_count(), 1);
    }

    #[tokio::test]
    async fn test_custom_system_prompt_reaches_description_service() {
        let descriptions = MockDescriptionClient::new();
        let settings = PipelineSettings {
            system_prompt: "Watercolor only".to_string(),
            ..PipelineSettings::immediate()
        };
        let pipeline = build_pipeline(
            descriptions.clone(),
            MockCoverImageClient::new(),
            Box::new(MockCoverStore::new()),
            settings,
        );

        pipeline.run(&requests(&["Dune"], 1)).await.unwrap();
        assert_eq!(descriptions.get_system_prompts(), vec!["Watercolor only"]);
    }

    #[tokio::test]
    async fn test_empty_request_list_does_nothing() {
        let descriptions = MockDescriptionClient::new();
        let pipeline = build_pipeline(
            descriptions.clone(),
            MockCoverImageClient::new(),
            Box::new(MockCoverStore::new()),
            PipelineSettings::immediate(),
        );

        let reports = pipeline.run(&[]).await.unwrap();
        assert!(reports.is_empty());
        assert_eq!(descriptions.get_call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_calls_are_spaced_by_fixed_delay() {
        let settings = PipelineSettings {
            image_delay: std::time::Duration::from_secs(1),
            ..PipelineSettings::immediate()
        };
        let pipeline = build_pipeline(
            MockDescriptionClient::new(),
            MockCoverImageClient::new(),
            Box::new(MockCoverStore::new()),
            settings,
        );

        let started = tokio::time::Instant::now();
        pipeline.run(&requests(&["Dune"], 3)).await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= std::time::Duration::from_secs(2));
        assert!(elapsed < std::time::Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_description_calls_are_spaced_by_fixed_delay() {
        let settings = PipelineSettings {
            description_delay: std::time::Duration::from_millis(500),
            ..PipelineSettings::immediate()
        };
        let descriptions = MockDescriptionClient::new();
        let pipeline = build_pipeline(
            descriptions.clone(),
            MockCoverImageClient::new(),
            Box::new(MockCoverStore::new()),
            settings,
        );

        let started = tokio::time::Instant::now();
        pipeline
            .run(&requests(&["Dune", "Emma", "Persuasion"], 2))
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(descriptions.get_call_count(), 3);
        assert!(elapsed >= std::time::Duration::from_millis(1000));
        assert!(elapsed < std::time::Duration::from_millis(1500));
    }

    #[test]
    fn test_settings_fall_back_to_default_prompt() {
        let config = crate::models::Config::default();
        let settings = PipelineSettings::from_config(&config, Some("   ".to_string()));
        assert_eq!(settings.system_prompt, crate::prompts::DESCRIPTION_SYSTEM);
        assert_eq!(settings.image_delay, config.image_delay);

        let custom = PipelineSettings::from_config(&config, Some("Noir".to_string()));
        assert_eq!(custom.system_prompt, "Noir");
    }
}
