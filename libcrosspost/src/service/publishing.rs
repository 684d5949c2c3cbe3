//! End-to-end publishing of a post-creation request
//!
//! validate → build post → attach (idempotent) → compose → dispatch all
//! requests concurrently with retry → record outcomes on the post's
//! variants → persist the changed variants.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::events::{Event, EventBus, PlatformResult};
use crate::collection::{attach, PostCollection};
use crate::compose::{PublishRequest, PublishRequestComposer};
use crate::dispatch::{send_with_retry, DispatchOutcome, Dispatcher, RetryPolicy};
use crate::error::{DispatchError, Result};
use crate::request::{CreatePostRequest, PostRequest};
use crate::types::{Platform, Post};
use crate::variants::build_post;

/// Result of one publish call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReport {
    pub post_id: String,
    /// Number of gateway requests sent
    pub requests: usize,
    /// One entry per target platform, following the composed requests:
    /// dedicated platforms first, then the grouped ones
    pub results: Vec<PlatformResult>,
    /// True when at least one platform succeeded
    pub overall_success: bool,
}

impl PublishReport {
    pub fn failed_platforms(&self) -> Vec<Platform> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.platform)
            .collect()
    }
}

#[derive(Clone)]
pub struct PublishService {
    composer: PublishRequestComposer,
    dispatcher: Arc<dyn Dispatcher>,
    retry: RetryPolicy,
    event_bus: EventBus,
}

impl PublishService {
    pub fn new(
        composer: PublishRequestComposer,
        dispatcher: Arc<dyn Dispatcher>,
        retry: RetryPolicy,
        event_bus: EventBus,
    ) -> Self {
        Self {
            composer,
            dispatcher,
            retry,
            event_bus,
        }
    }

    pub fn composer(&self) -> &PublishRequestComposer {
        &self.composer
    }

    /// Validate `request`, build its post and attach it to `collection`.
    ///
    /// Returns the validated request and the post now stored under its id,
    /// which is the earlier entry when the request is a retry.
    pub async fn prepare(
        &self,
        collection: &dyn PostCollection,
        request: CreatePostRequest,
    ) -> Result<(PostRequest, Post)> {
        let request = request.validate()?;
        let post = attach(collection, build_post(&request)).await?;
        Ok((request, post))
    }

    /// Full publish flow for a raw request
    ///
    /// # Errors
    ///
    /// Returns an error for invalid requests and storage failures. Gateway
    /// failures are reported per platform in the returned report.
    pub async fn publish(
        &self,
        collection: &dyn PostCollection,
        request: CreatePostRequest,
    ) -> Result<PublishReport> {
        let (request, post) = self.prepare(collection, request).await?;
        self.publish_post(collection, &request, post).await
    }

    /// Publish an already attached post
    pub async fn publish_post(
        &self,
        collection: &dyn PostCollection,
        request: &PostRequest,
        mut post: Post,
    ) -> Result<PublishReport> {
        let requests = self.composer.compose(request, &post);
        let platforms: Vec<Platform> = requests
            .iter()
            .flat_map(|r| r.platforms.iter().copied())
            .collect();

        self.event_bus.emit(Event::PublishStarted {
            post_id: post.id.clone(),
            platforms,
            requests: requests.len(),
        });

        let outcomes = self.send_all(&post.id, &requests).await;

        let now = Utc::now();
        let mut results = Vec::new();
        let mut changed = post.adopt_overrides(request, now);

        for (request, outcome) in requests.iter().zip(outcomes) {
            match outcome {
                Ok(outcome) => {
                    results.extend(request.platforms.iter().map(|platform| {
                        let external = outcome.post_for(*platform);
                        PlatformResult {
                            platform: *platform,
                            success: true,
                            post_id: Some(external.id),
                            url: external.url,
                            error: None,
                        }
                    }));
                    if let Some(key) = post.record_outcome(request, &outcome, now) {
                        if !changed.contains(&key) {
                            changed.push(key);
                        }
                    }
                }
                Err(e) => {
                    results.extend(request.platforms.iter().map(|platform| PlatformResult {
                        platform: *platform,
                        success: false,
                        post_id: None,
                        url: None,
                        error: Some(e.to_string()),
                    }));
                }
            }
        }

        for key in changed {
            if let Some(variant) = post.variant(key) {
                if let Err(e) = collection.update_variant(&post.id, key, variant).await {
                    warn!("Failed to store publish result for {} on {}: {}", key, post.id, e);
                }
            }
        }

        let overall_success = results.iter().any(|r| r.success);
        if overall_success {
            self.event_bus.emit(Event::PublishCompleted {
                post_id: post.id.clone(),
                results: results.clone(),
            });
        } else {
            self.event_bus.emit(Event::PublishFailed {
                post_id: post.id.clone(),
                error: "All publish requests failed".to_string(),
            });
        }

        info!(
            "Published post {}: {}/{} platform(s) succeeded",
            post.id,
            results.iter().filter(|r| r.success).count(),
            results.len()
        );

        Ok(PublishReport {
            post_id: post.id,
            requests: requests.len(),
            results,
            overall_success,
        })
    }

    /// Send every request concurrently; outcomes keep request order
    async fn send_all(
        &self,
        post_id: &str,
        requests: &[PublishRequest],
    ) -> Vec<std::result::Result<DispatchOutcome, DispatchError>> {
        let futures = requests.iter().map(|request| {
            let event_bus = self.event_bus.clone();
            let dispatcher = Arc::clone(&self.dispatcher);
            let retry = self.retry;

            async move {
                event_bus.emit(Event::PublishProgress {
                    post_id: post_id.to_string(),
                    platforms: request.platforms.clone(),
                    status: "sending".to_string(),
                });

                let outcome = send_with_retry(dispatcher.as_ref(), request, retry).await;
                let status = match &outcome {
                    Ok(o) => {
                        info!("Gateway accepted request {} for {:?}", o.id, request.platforms);
                        "sent"
                    }
                    Err(e) => {
                        warn!("Request for {:?} failed: {}", request.platforms, e);
                        "failed"
                    }
                };

                event_bus.emit(Event::PublishProgress {
                    post_id: post_id.to_string(),
                    platforms: request.platforms.clone(),
                    status: status.to_string(),
                });
                outcome
            }
        });

        join_all(futures).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::InMemoryCollection;
    use crate::dispatch::MockDispatcher;
    use crate::request::Override;
    use crate::types::{VariantKey, VariantStatus};
    use std::collections::BTreeMap;

    fn service(dispatcher: Arc<MockDispatcher>) -> PublishService {
        PublishService::new(
            PublishRequestComposer::default(),
            dispatcher,
            RetryPolicy::immediate(3),
            EventBus::new(32),
        )
    }

    fn raw(platforms: &[&str]) -> CreatePostRequest {
        CreatePostRequest {
            account_group_id: "acme".to_string(),
            content: "Launching today".to_string(),
            platforms: platforms.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_publish_success_records_variants() {
        let dispatcher = Arc::new(MockDispatcher::success());
        let service = service(Arc::clone(&dispatcher));
        let collection = InMemoryCollection::new("acme");

        let mut request = raw(&["x", "bluesky", "linkedin"]);
        let mut variants = BTreeMap::new();
        variants.insert(
            "x".to_string(),
            Override {
                content: Some("Short for X".to_string()),
                ..Default::default()
            },
        );
        request.variants = variants;

        let report = service.publish(&collection, request).await.unwrap();

        assert!(report.overall_success);
        assert_eq!(report.requests, 2);
        assert_eq!(report.results.len(), 3);
        assert_eq!(dispatcher.sent().len(), 2);

        let stored = collection.find_by_id(&report.post_id).await.unwrap().unwrap();
        let x = stored.variant(VariantKey::Platform(crate::types::Platform::X)).unwrap();
        assert_eq!(x.status, VariantStatus::Published);
        assert!(x.external_id.is_some());
        assert_eq!(stored.base.status, VariantStatus::Published);
        assert_eq!(stored.variants.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_fans_out_to_group() {
        let dispatcher = Arc::new(MockDispatcher::failing(
            Platform::Linkedin,
            DispatchError::Rejected("bad token".to_string()),
        ));
        let service = service(Arc::clone(&dispatcher));
        let collection = InMemoryCollection::new("acme");

        let report = service
            .publish(&collection, raw(&["bluesky", "linkedin"]))
            .await
            .unwrap();

        assert!(!report.overall_success);
        assert_eq!(
            report.failed_platforms(),
            vec![Platform::Bluesky, Platform::Linkedin]
        );
        assert!(report.results[0].error.as_deref().unwrap().contains("bad token"));

        let stored = collection.find_by_id(&report.post_id).await.unwrap().unwrap();
        assert_eq!(stored.base.status, VariantStatus::Draft);
    }

    #[tokio::test]
    async fn test_retry_same_post_id_reuses_entry() {
        let dispatcher = Arc::new(MockDispatcher::success());
        let service = service(dispatcher);
        let collection = InMemoryCollection::new("acme");

        let mut request = raw(&["x"]);
        request.post_id = Some("client-1".to_string());

        service.publish(&collection, request.clone()).await.unwrap();
        service.publish(&collection, request).await.unwrap();

        assert_eq!(collection.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_override_for_new_platform_is_stored() {
        let dispatcher = Arc::new(MockDispatcher::success());
        let service = service(dispatcher);
        let collection = InMemoryCollection::new("acme");

        let mut first = raw(&["bluesky", "linkedin"]);
        first.post_id = Some("client-2".to_string());
        service.publish(&collection, first.clone()).await.unwrap();

        let mut retry = first;
        retry.variants.insert(
            "linkedin".to_string(),
            Override {
                content: Some("LinkedIn copy".to_string()),
                ..Default::default()
            },
        );
        let report = service.publish(&collection, retry).await.unwrap();
        assert_eq!(report.requests, 2);
        let order: Vec<Platform> = report.results.iter().map(|r| r.platform).collect();
        assert_eq!(order, vec![Platform::Linkedin, Platform::Bluesky]);

        let stored = collection.find_by_id("client-2").await.unwrap().unwrap();
        let linkedin = stored.variant(VariantKey::Platform(Platform::Linkedin)).unwrap();
        assert_eq!(linkedin.text, "LinkedIn copy");
        assert_eq!(linkedin.status, VariantStatus::Published);
        let reported = report
            .results
            .iter()
            .find(|r| r.platform == Platform::Linkedin)
            .unwrap();
        assert_eq!(linkedin.external_id, reported.post_id);
    }

    #[tokio::test]
    async fn test_events_emitted_in_order() {
        let dispatcher = Arc::new(MockDispatcher::success());
        let service = service(dispatcher);
        let mut events = service.event_bus.subscribe();
        let collection = InMemoryCollection::new("acme");

        service.publish(&collection, raw(&["x"])).await.unwrap();

        assert!(matches!(events.recv().await.unwrap(), Event::PublishStarted { requests: 1, .. }));
        assert!(matches!(events.recv().await.unwrap(), Event::PublishProgress { .. }));
        assert!(matches!(events.recv().await.unwrap(), Event::PublishProgress { .. }));
        assert!(matches!(events.recv().await.unwrap(), Event::PublishCompleted { .. }));
    }

    #[tokio::test]
    async fn test_invalid_request_rejected_before_storage() {
        let service = service(Arc::new(MockDispatcher::success()));
        let collection = InMemoryCollection::new("acme");

        let result = service.publish(&collection, raw(&[])).await;
        assert!(result.is_err());
        assert!(collection.list().await.unwrap().is_empty());
    }
}
