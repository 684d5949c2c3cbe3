//! Sending composed requests to the publishing gateway
//!
//! The gateway itself sits behind the [`Dispatcher`] trait. This module
//! owns the retry policy: transient failures (network, rate limit) are
//! retried with exponential backoff, anything else fails the request at
//! once.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::compose::PublishRequest;
use crate::config::{DispatchConfig, DEFAULT_MAX_ATTEMPTS};
use crate::error::DispatchError;
use crate::types::Platform;

pub mod mock;

pub use mock::{MockConfig, MockDispatcher};

/// A post created on one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalPost {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// What the gateway returned for an accepted request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DispatchOutcome {
    /// Gateway-level id covering the whole request
    pub id: String,
    /// Per-platform posts, when the gateway reports them
    #[serde(default)]
    pub posts: BTreeMap<Platform, ExternalPost>,
}

impl DispatchOutcome {
    /// External post for `platform`, falling back to the gateway-level id
    pub fn post_for(&self, platform: Platform) -> ExternalPost {
        self.posts.get(&platform).cloned().unwrap_or_else(|| ExternalPost {
            id: self.id.clone(),
            url: None,
        })
    }
}

/// Publishing gateway port
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Send one request. A request either succeeds or fails as a whole.
    async fn send(&self, request: &PublishRequest) -> Result<DispatchOutcome, DispatchError>;
}

/// Attempts and backoff for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each further one
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            ..Self::default()
        }
    }

    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before attempt `attempt + 1`, for `attempt` starting at 1
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2_u32.saturating_pow(attempt.saturating_sub(1))
    }
}

fn describe(request: &PublishRequest) -> String {
    request
        .platforms
        .iter()
        .map(Platform::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Send `request`, retrying transient failures per `policy`
///
/// # Errors
///
/// Returns the last error once attempts are exhausted, or the first
/// permanent error.
pub async fn send_with_retry(
    dispatcher: &dyn Dispatcher,
    request: &PublishRequest,
    policy: RetryPolicy,
) -> Result<DispatchOutcome, DispatchError> {
    let targets = describe(request);
    let mut attempt = 1;

    loop {
        match dispatcher.send(request).await {
            Ok(outcome) => {
                if attempt > 1 {
                    info!(
                        "Sent request for [{}] via {} on attempt {}",
                        targets,
                        dispatcher.name(),
                        attempt
                    );
                }
                return Ok(outcome);
            }
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "Transient error sending [{}] (attempt {}/{}): {}. Retrying in {:?}...",
                    targets, attempt, policy.max_attempts, e, delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    warn!(
                        "Failed to send [{}] after {} attempts: {}",
                        targets, policy.max_attempts, e
                    );
                }
                return Err(e);
            }
        }
    }
}
