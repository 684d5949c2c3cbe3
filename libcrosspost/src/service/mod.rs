//! Service layer for Crosspost
//!
//! `CrosspostService` wires the configured pieces together (database,
//! composer, dispatcher, event bus) and hands out the sub-services:
//!
//! - `PublishService`: attach, compose and dispatch a request
//! - `EventBus`: progress events for whoever is listening
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use libcrosspost::dispatch::MockDispatcher;
//! use libcrosspost::request::CreatePostRequest;
//! use libcrosspost::service::CrosspostService;
//!
//! # async fn example() -> libcrosspost::Result<()> {
//! let service = CrosspostService::new(Arc::new(MockDispatcher::success())).await?;
//!
//! let request = CreatePostRequest {
//!     account_group_id: "acme".to_string(),
//!     content: "Hello everyone".to_string(),
//!     platforms: vec!["x".to_string(), "linkedin".to_string()],
//!     ..Default::default()
//! };
//!
//! let report = service.publish(request).await?;
//! println!("{} platform result(s)", report.results.len());
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod publishing;

pub use events::PlatformResult;
pub use publishing::{PublishReport, PublishService};

use std::sync::Arc;

use self::events::EventBus;
use crate::collection::attach;
use crate::compose::PublishRequestComposer;
use crate::db::{Database, SqliteCollection};
use crate::dispatch::{Dispatcher, RetryPolicy};
use crate::error::{ConfigError, Result};
use crate::request::CreatePostRequest;
use crate::types::Post;
use crate::variants::build_post;
use crate::Config;

pub struct CrosspostService {
    db: Arc<Database>,
    config: Arc<Config>,
    publishing: PublishService,
    event_bus: EventBus,
}

impl CrosspostService {
    /// Load configuration from the default location and open the database
    pub async fn new(dispatcher: Arc<dyn Dispatcher>) -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config, dispatcher).await
    }

    /// # Errors
    ///
    /// Returns an error if the media proxy configuration is invalid, or the
    /// database cannot be opened or migrated.
    pub async fn from_config(config: Config, dispatcher: Arc<dyn Dispatcher>) -> Result<Self> {
        let db_path = config.resolve_db_path();
        let db_path_str = db_path
            .to_str()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "database.path".to_string(),
                reason: "not valid UTF-8".to_string(),
            })?
            .to_string();
        let db = Arc::new(Database::new(&db_path_str).await?);

        let event_bus = EventBus::new(100);
        let composer = PublishRequestComposer::from_config(&config)?;
        let publishing = PublishService::new(
            composer,
            dispatcher,
            RetryPolicy::from_config(&config.dispatch),
            event_bus.clone(),
        );

        Ok(Self {
            db,
            config: Arc::new(config),
            publishing,
            event_bus,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn publishing(&self) -> &PublishService {
        &self.publishing
    }

    pub fn collection(&self, account_group_id: &str) -> SqliteCollection {
        self.db.collection(account_group_id)
    }

    /// Validate and store a request's post without publishing it.
    ///
    /// Attaching the same post id again returns the stored post.
    pub async fn attach(&self, request: CreatePostRequest) -> Result<Post> {
        let request = request.validate()?;
        let collection = self.collection(&request.account_group_id);
        attach(&collection, build_post(&request)).await
    }

    /// Publish a request into its account group's collection
    pub async fn publish(&self, request: CreatePostRequest) -> Result<PublishReport> {
        let collection = self.collection(&request.account_group_id);
        self.publishing.publish(&collection, request).await
    }

    pub fn subscribe(&self) -> events::EventReceiver {
        self.event_bus.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::PostCollection;
    use crate::config::DatabaseConfig;
    use crate::dispatch::MockDispatcher;
    use tempfile::TempDir;

    fn config(temp_dir: &TempDir) -> Config {
        Config {
            database: DatabaseConfig {
                path: temp_dir.path().join("posts.db").to_string_lossy().into_owned(),
            },
            ..Config::default_config()
        }
    }

    fn request() -> CreatePostRequest {
        CreatePostRequest {
            account_group_id: "acme".to_string(),
            post_id: Some("p-1".to_string()),
            content: "Hello".to_string(),
            platforms: vec!["x".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_attach_then_show() {
        let temp_dir = TempDir::new().unwrap();
        let service = CrosspostService::from_config(config(&temp_dir), Arc::new(MockDispatcher::success()))
            .await
            .unwrap();

        let post = service.attach(request()).await.unwrap();
        assert_eq!(post.id, "p-1");

        let again = service.attach(request()).await.unwrap();
        assert_eq!(again, post);
        assert_eq!(service.collection("acme").list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_persists_outcome() {
        let temp_dir = TempDir::new().unwrap();
        let service = CrosspostService::from_config(config(&temp_dir), Arc::new(MockDispatcher::success()))
            .await
            .unwrap();
        let mut events = service.subscribe();

        let report = service.publish(request()).await.unwrap();
        assert!(report.overall_success);
        assert!(events.try_recv().is_ok());

        let stored = service.collection("acme").find_by_id("p-1").await.unwrap().unwrap();
        assert_eq!(stored.base.external_id.as_deref(), Some("mock-1"));
    }

    #[tokio::test]
    async fn test_bad_proxy_config_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config(&temp_dir);
        config.media_proxy = Some(crate::config::MediaProxyConfig {
            base_url: "not a url".to_string(),
            hosts: vec!["cdn.test".to_string()],
        });

        let result = CrosspostService::from_config(config, Arc::new(MockDispatcher::success())).await;
        assert!(result.is_err());
    }
}
