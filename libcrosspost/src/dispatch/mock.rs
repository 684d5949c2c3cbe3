//! In-process dispatcher for tests and dry runs
//!
//! Records every request it receives and can be told to fail requests that
//! touch given platforms, or to fail the first few calls with a network
//! error.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::sleep;

use super::{DispatchOutcome, Dispatcher, ExternalPost};
use crate::compose::PublishRequest;
use crate::error::DispatchError;
use crate::types::Platform;

#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Requests touching one of these platforms fail with the given error
    pub failures: BTreeMap<Platform, DispatchError>,

    /// The first N calls fail with a network error
    pub transient_failures: usize,

    /// Simulated gateway latency
    pub delay: Duration,
}

pub struct MockDispatcher {
    config: MockConfig,
    calls: Arc<Mutex<usize>>,
    sent: Arc<Mutex<Vec<PublishRequest>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockDispatcher {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            calls: Arc::new(Mutex::new(0)),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Accepts every request
    pub fn success() -> Self {
        Self::new(MockConfig::default())
    }

    /// Fails every request that targets `platform`
    pub fn failing(platform: Platform, error: DispatchError) -> Self {
        let mut config = MockConfig::default();
        config.failures.insert(platform, error);
        Self::new(config)
    }

    /// Fails the first `failures` calls with a network error
    pub fn flaky(failures: usize) -> Self {
        Self::new(MockConfig {
            transient_failures: failures,
            ..Default::default()
        })
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self::new(MockConfig {
            delay,
            ..Default::default()
        })
    }

    /// Number of `send` calls, including failed ones
    pub fn call_count(&self) -> usize {
        *lock(&self.calls)
    }

    /// Requests that were accepted, in completion order
    pub fn sent(&self) -> Vec<PublishRequest> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl Dispatcher for MockDispatcher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, request: &PublishRequest) -> Result<DispatchOutcome, DispatchError> {
        let call = {
            let mut calls = lock(&self.calls);
            *calls += 1;
            *calls
        };

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if call <= self.config.transient_failures {
            return Err(DispatchError::Network(format!(
                "simulated network failure on call {}",
                call
            )));
        }

        if let Some(error) = request
            .platforms
            .iter()
            .find_map(|p| self.config.failures.get(p))
        {
            return Err(error.clone());
        }

        let id = format!("mock-{}", call);
        let posts = request
            .platforms
            .iter()
            .map(|platform| {
                let post = ExternalPost {
                    id: format!("{}-{}", id, platform.as_str()),
                    url: Some(format!("https://mock.invalid/{}/{}", platform.as_str(), call)),
                };
                (*platform, post)
            })
            .collect();

        lock(&self.sent).push(request.clone());
        Ok(DispatchOutcome { id, posts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionsSet;
    use crate::types::VariantKey;

    fn request(platforms: &[Platform]) -> PublishRequest {
        PublishRequest {
            content: "hello".to_string(),
            platforms: platforms.to_vec(),
            media_urls: vec![],
            options: OptionsSet::default(),
            schedule_date: None,
            profile_key: None,
            target: VariantKey::Base,
        }
    }

    #[tokio::test]
    async fn test_success_reports_every_platform() {
        let dispatcher = MockDispatcher::success();
        let outcome = dispatcher
            .send(&request(&[Platform::Bluesky, Platform::Linkedin]))
            .await
            .unwrap();

        assert_eq!(outcome.id, "mock-1");
        assert_eq!(outcome.posts.len(), 2);
        assert_eq!(outcome.posts[&Platform::Bluesky].id, "mock-1-bluesky");
        assert_eq!(dispatcher.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_platform_fails_whole_request() {
        let dispatcher = MockDispatcher::failing(
            Platform::Pinterest,
            DispatchError::Rejected("board not found".to_string()),
        );

        let result = dispatcher
            .send(&request(&[Platform::Pinterest, Platform::Linkedin]))
            .await;
        assert!(matches!(result, Err(DispatchError::Rejected(_))));
        assert!(dispatcher.sent().is_empty());

        assert!(dispatcher.send(&request(&[Platform::Linkedin])).await.is_ok());
        assert_eq!(dispatcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_flaky_recovers() {
        let dispatcher = MockDispatcher::flaky(1);
        assert!(dispatcher.send(&request(&[Platform::X])).await.is_err());
        assert!(dispatcher.send(&request(&[Platform::X])).await.is_ok());
    }
}
