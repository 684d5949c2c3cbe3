//! Integration tests for CrosspostService
//!
//! Runs the publish flow against a file-backed SQLite database.

use std::collections::BTreeMap;
use std::sync::Arc;

use libcrosspost::config::{DatabaseConfig, DispatchConfig, MediaProxyConfig, PinterestConfig};
use libcrosspost::dispatch::MockDispatcher;
use libcrosspost::error::DispatchError;
use libcrosspost::request::{CreatePostRequest, Override};
use libcrosspost::service::events::Event;
use libcrosspost::service::CrosspostService;
use libcrosspost::{Config, Platform, PostCollection, VariantKey, VariantStatus};
use tempfile::TempDir;

fn test_config(temp_dir: &TempDir) -> Config {
    Config {
        database: DatabaseConfig {
            path: temp_dir.path().join("test.db").to_str().unwrap().to_string(),
        },
        media_proxy: None,
        pinterest: None,
        dispatch: DispatchConfig { max_attempts: 3 },
    }
}

/// Setup test service with temporary database
async fn setup_test_service(dispatcher: Arc<MockDispatcher>) -> (CrosspostService, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let service = CrosspostService::from_config(test_config(&temp_dir), dispatcher)
        .await
        .unwrap();
    (service, temp_dir)
}

fn request(platforms: &[&str]) -> CreatePostRequest {
    CreatePostRequest {
        account_group_id: "acme".to_string(),
        content: "Spring release is out".to_string(),
        platforms: platforms.iter().map(|p| p.to_string()).collect(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_publish_mixed_dedicated_and_grouped() {
    let dispatcher = Arc::new(MockDispatcher::success());
    let (service, _temp_dir) = setup_test_service(Arc::clone(&dispatcher)).await;

    let mut req = request(&["x", "bluesky", "reddit", "threads"]);
    req.title = Some("Spring release".to_string());
    req.variants.insert(
        "x".to_string(),
        Override {
            content: Some("Spring release, short version".to_string()),
            ..Default::default()
        },
    );

    let report = service.publish(req).await.unwrap();

    assert!(report.overall_success);
    assert_eq!(report.requests, 2);
    assert_eq!(report.results.len(), 4);

    let sent = dispatcher.sent();
    assert_eq!(sent[0].platforms, vec![Platform::X]);
    assert_eq!(sent[0].content, "Spring release, short version");
    assert_eq!(
        sent[1].platforms,
        vec![Platform::Bluesky, Platform::Reddit, Platform::Threads]
    );
    // Reddit rides in the group and still gets its title
    let title = sent[1].options.reddit_options.as_ref().unwrap();
    assert_eq!(title.title.as_deref(), Some("Spring release"));

    let stored = service
        .collection("acme")
        .find_by_id(&report.post_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.title.as_deref(), Some("Spring release"));
    assert_eq!(stored.base.status, VariantStatus::Published);
    let x = stored.variant(VariantKey::Platform(Platform::X)).unwrap();
    assert_eq!(x.status, VariantStatus::Published);
    assert_eq!(x.text, "Spring release, short version");
}

#[tokio::test]
async fn test_concurrent_publish_same_post_id_stores_one_post() {
    let dispatcher = Arc::new(MockDispatcher::success());
    let (service, _temp_dir) = setup_test_service(dispatcher).await;
    let service = Arc::new(service);

    let mut handles = Vec::new();
    for _ in 0..6 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            let mut req = request(&["linkedin", "facebook"]);
            req.post_id = Some("client-42".to_string());
            service.publish(req).await
        }));
    }

    for handle in handles {
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.post_id, "client-42");
    }

    let posts = service.collection("acme").list().await.unwrap();
    assert_eq!(posts.len(), 1);
}

#[tokio::test]
async fn test_retry_with_same_post_id_keeps_first_content() {
    let dispatcher = Arc::new(MockDispatcher::success());
    let (service, _temp_dir) = setup_test_service(dispatcher).await;

    let mut first = request(&["x"]);
    first.post_id = Some("retry-1".to_string());
    service.attach(first.clone()).await.unwrap();

    let mut second = first;
    second.content = "Edited before retry".to_string();
    let stored = service.attach(second).await.unwrap();

    assert_eq!(stored.base.text, "Spring release is out");
}

#[tokio::test]
async fn test_retry_adding_override_stores_new_variant() {
    let dispatcher = Arc::new(MockDispatcher::success());
    let (service, _temp_dir) = setup_test_service(Arc::clone(&dispatcher)).await;

    let mut first = request(&["bluesky", "linkedin"]);
    first.post_id = Some("retry-2".to_string());
    service.publish(first.clone()).await.unwrap();

    let mut retry = first;
    retry.variants.insert(
        "linkedin".to_string(),
        Override {
            content: Some("LinkedIn copy".to_string()),
            ..Default::default()
        },
    );
    service.publish(retry).await.unwrap();

    let sent = dispatcher.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().any(|r| r.platforms == vec![Platform::Linkedin]));

    let stored = service
        .collection("acme")
        .find_by_id("retry-2")
        .await
        .unwrap()
        .unwrap();
    let linkedin = stored.variant(VariantKey::Platform(Platform::Linkedin)).unwrap();
    assert_eq!(linkedin.text, "LinkedIn copy");
    assert_eq!(linkedin.status, VariantStatus::Published);
    assert!(linkedin.external_id.is_some());
}

#[tokio::test]
async fn test_transient_failure_retried() {
    let dispatcher = Arc::new(MockDispatcher::flaky(1));
    let (service, _temp_dir) = setup_test_service(Arc::clone(&dispatcher)).await;

    let report = service.publish(request(&["bluesky"])).await.unwrap();

    assert!(report.overall_success);
    assert_eq!(dispatcher.call_count(), 2);
}

#[tokio::test]
async fn test_permanent_failure_leaves_variant_unpublished() {
    let dispatcher = Arc::new(MockDispatcher::failing(
        Platform::Pinterest,
        DispatchError::Rejected("board not found".to_string()),
    ));
    let (service, _temp_dir) = setup_test_service(Arc::clone(&dispatcher)).await;

    let mut req = request(&["pinterest", "linkedin"]);
    req.variants
        .insert("pinterest".to_string(), Override::default());

    let report = service.publish(req).await.unwrap();

    assert!(report.overall_success);
    assert_eq!(report.failed_platforms(), vec![Platform::Pinterest]);
    // Rejections are not retried
    assert_eq!(dispatcher.call_count(), 2);

    let stored = service
        .collection("acme")
        .find_by_id(&report.post_id)
        .await
        .unwrap()
        .unwrap();
    let pin = stored.variant(VariantKey::Platform(Platform::Pinterest)).unwrap();
    assert_eq!(pin.status, VariantStatus::Draft);
    assert_eq!(stored.base.status, VariantStatus::Published);
}

#[tokio::test]
async fn test_scheduled_publish_keeps_scheduled_status() {
    let dispatcher = Arc::new(MockDispatcher::success());
    let (service, _temp_dir) = setup_test_service(Arc::clone(&dispatcher)).await;

    let mut req = request(&["linkedin"]);
    req.scheduled_date = Some("2099-01-01T08:00:00Z".to_string());

    let report = service.publish(req).await.unwrap();
    assert!(dispatcher.sent()[0].schedule_date.is_some());

    let stored = service
        .collection("acme")
        .find_by_id(&report.post_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.base.status, VariantStatus::Scheduled);
    assert!(stored.base.external_id.is_some());
}

#[tokio::test]
async fn test_configured_proxy_and_default_board() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir);
    config.media_proxy = Some(MediaProxyConfig {
        base_url: "https://media.crosspost.test/proxy".to_string(),
        hosts: vec!["private-cdn.test".to_string()],
    });
    config.pinterest = Some(PinterestConfig {
        default_board_id: None,
        default_board_name: Some("acme/launches".to_string()),
    });

    let dispatcher = Arc::new(MockDispatcher::success());
    let service = CrosspostService::from_config(config, dispatcher.clone())
        .await
        .unwrap();

    let mut req = request(&["pinterest"]);
    req.image_urls = Some(vec!["https://img.private-cdn.test/a.png".to_string()]);
    service.publish(req).await.unwrap();

    let sent = &dispatcher.sent()[0];
    assert!(sent.media_urls[0].starts_with("https://media.crosspost.test/proxy?url="));
    let board = sent.options.pinterest_options.as_ref().unwrap();
    assert_eq!(board.board_name.as_deref(), Some("acme/launches"));
}

#[tokio::test]
async fn test_account_groups_are_isolated() {
    let (service, _temp_dir) = setup_test_service(Arc::new(MockDispatcher::success())).await;

    let mut a = request(&["x"]);
    a.post_id = Some("shared-id".to_string());
    let mut b = a.clone();
    b.account_group_id = "globex".to_string();
    b.content = "Globex copy".to_string();

    service.attach(a).await.unwrap();
    service.attach(b).await.unwrap();

    let acme = service.collection("acme").find_by_id("shared-id").await.unwrap().unwrap();
    let globex = service.collection("globex").find_by_id("shared-id").await.unwrap().unwrap();
    assert_eq!(acme.base.text, "Spring release is out");
    assert_eq!(globex.base.text, "Globex copy");
    assert_eq!(
        service.database().account_groups().await.unwrap(),
        vec!["acme".to_string(), "globex".to_string()]
    );
}

#[tokio::test]
async fn test_event_stream_for_publish() {
    let (service, _temp_dir) = setup_test_service(Arc::new(MockDispatcher::success())).await;
    let mut receiver = service.subscribe();

    let mut variants = BTreeMap::new();
    variants.insert("reddit".to_string(), Override::default());
    let req = CreatePostRequest {
        variants,
        ..request(&["reddit", "x", "linkedin"])
    };
    service.publish(req).await.unwrap();

    let mut progress = 0;
    let mut completed = false;
    while let Ok(event) = receiver.try_recv() {
        match event {
            Event::PublishStarted { requests, .. } => assert_eq!(requests, 2),
            Event::PublishProgress { .. } => progress += 1,
            Event::PublishCompleted { results, .. } => {
                assert_eq!(results.len(), 3);
                completed = true;
            }
            Event::PublishFailed { error, .. } => panic!("unexpected failure: {}", error),
        }
    }
    assert_eq!(progress, 4);
    assert!(completed);
}
