use animal_etl::core::batch::HOME_PATH;
use animal_etl::core::fetcher::ANIMALS_PATH;
use animal_etl::{
    EtlEngine, EtlError, MemoryErrorSink, MemoryRecordStore, RetryConfig, RunCoordinator,
    RunStatus, RunSummary, TomlConfig,
};
use httpmock::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn test_config(base_url: &str) -> TomlConfig {
    let mut config = TomlConfig::default();
    config.source.base_url = base_url.to_string();
    config.retry = RetryConfig {
        time_unit_ms: 0,
        ..RetryConfig::default()
    };
    config
}

fn coordinator(
    config: &TomlConfig,
) -> (RunCoordinator, Arc<MemoryRecordStore>, Arc<MemoryErrorSink>) {
    let store = Arc::new(MemoryRecordStore::new());
    let sink = Arc::new(MemoryErrorSink::new());
    let coordinator = RunCoordinator::new(config, store.clone(), sink.clone()).unwrap();
    (coordinator, store, sink)
}

async fn mock_listing(server: &MockServer, page: u64, ids: &[u64], total_pages: Option<u64>) {
    let items: Vec<_> = ids.iter().map(|id| json!({"id": id, "name": format!("Animal {}", id)})).collect();
    let body = match total_pages {
        Some(total) => json!({"items": items, "total_pages": total}),
        None => json!({"items": items}),
    };
    server
        .mock_async(move |when, then| {
            when.method(GET)
                .path(ANIMALS_PATH)
                .query_param("page", page.to_string());
            then.status(200).json_body(body);
        })
        .await;
}

async fn mock_detail(server: &MockServer, id: u64, born_at: serde_json::Value) {
    server
        .mock_async(move |when, then| {
            when.method(GET).path(format!("{}/{}", ANIMALS_PATH, id));
            then.status(200).json_body(json!({
                "id": id,
                "name": format!("Animal {}", id),
                "species": "Dog",
                "friends": "Max, Luna,,",
                "born_at": born_at
            }));
        })
        .await;
}

#[tokio::test]
async fn test_end_to_end_single_batch() {
    let server = MockServer::start_async().await;
    mock_listing(&server, 1, &[1, 2], Some(1)).await;
    mock_detail(&server, 1, json!(1609459200)).await;
    mock_detail(&server, 2, json!(1609459200000u64)).await;

    let home = server
        .mock_async(|when, then| {
            when.method(POST).path(HOME_PATH).json_body(json!([
                {"id": 1, "name": "Animal 1", "species": "Dog", "friends": ["Max", "Luna"], "born_at": "2021-01-01T00:00:00+00:00"},
                {"id": 2, "name": "Animal 2", "species": "Dog", "friends": ["Max", "Luna"], "born_at": "2021-01-01T00:00:00+00:00"}
            ]));
            then.status(200);
        })
        .await;

    let (coordinator, store, sink) = coordinator(&test_config(&server.base_url()));
    let stats = coordinator.run().await;

    home.assert_hits_async(1).await;
    assert_eq!(stats.records_found, 2);
    assert_eq!(stats.records_processed, 2);
    assert_eq!(stats.records_posted, 2);
    assert_eq!(stats.batches_posted, 1);
    assert_eq!(stats.error_count(), 0);
    assert_eq!(stats.status(), RunStatus::Completed);
    assert_eq!(stats.current_step.to_string(), "Completed");
    assert!(stats.finished_at.is_some());

    assert_eq!(store.len(), 2);
    assert_eq!(
        store.get(2).unwrap().transformed.born_at(),
        Some("2021-01-01T00:00:00+00:00")
    );
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_partial_failure_continues_run() {
    let server = MockServer::start_async().await;
    mock_listing(&server, 1, &[1, 2, 3], None).await;
    mock_listing(&server, 2, &[], None).await;
    mock_detail(&server, 1, json!("2021-01-01T00:00:00Z")).await;
    mock_detail(&server, 3, json!("2021-01-01T09:00:00+09:00")).await;
    let missing = server
        .mock_async(|when, then| {
            when.method(GET).path(format!("{}/2", ANIMALS_PATH));
            then.status(404);
        })
        .await;
    let home = server
        .mock_async(|when, then| {
            when.method(POST).path(HOME_PATH);
            then.status(201);
        })
        .await;

    let (coordinator, store, sink) = coordinator(&test_config(&server.base_url()));
    let stats = coordinator.run().await;

    missing.assert_hits_async(1).await;
    home.assert_hits_async(1).await;

    assert_eq!(stats.records_found, 3);
    assert_eq!(stats.records_attempted, 3);
    assert_eq!(stats.records_processed, 2);
    assert_eq!(stats.records_posted, 2);
    assert_eq!(stats.error_count(), 1);
    assert!(stats.errors[0].contains("Record 2: "));
    assert_eq!(stats.status(), RunStatus::PartiallyCompleted);

    assert!(!store.contains(2));
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].endpoint, "/animals/v1/animals/2");
}

#[tokio::test]
async fn test_fatal_batch_failure_keeps_counters() {
    let server = MockServer::start_async().await;
    mock_listing(&server, 1, &[1, 2], Some(1)).await;
    mock_detail(&server, 1, json!(0)).await;
    mock_detail(&server, 2, json!(null)).await;
    let home = server
        .mock_async(|when, then| {
            when.method(POST).path(HOME_PATH);
            then.status(503);
        })
        .await;

    let (coordinator, store, _sink) = coordinator(&test_config(&server.base_url()));
    let stats = coordinator.run().await;

    home.assert_hits_async(5).await;
    assert_eq!(stats.status(), RunStatus::Failed);
    assert_eq!(stats.current_step.to_string(), "Failed");
    assert_eq!(stats.records_processed, 2);
    assert_eq!(stats.records_posted, 0);
    assert_eq!(stats.batches_posted, 0);
    assert!(stats.fatal_error.is_some());
    assert!(stats.errors.last().unwrap().contains("Process failed: "));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_empty_listing_completes_without_data() {
    let server = MockServer::start_async().await;
    mock_listing(&server, 1, &[], None).await;
    let home = server
        .mock_async(|when, then| {
            when.method(POST).path(HOME_PATH);
            then.status(200);
        })
        .await;

    let (coordinator, _store, _sink) = coordinator(&test_config(&server.base_url()));
    let stats = coordinator.run().await;

    home.assert_hits_async(0).await;
    assert_eq!(stats.records_found, 0);
    assert_eq!(stats.current_step.to_string(), "No data found");
    assert_eq!(stats.status(), RunStatus::Completed);
    assert_eq!(RunSummary::from_stats(&stats).success_rate, 0.0);
}

#[tokio::test]
async fn test_listing_failure_fails_run() {
    let server = MockServer::start_async().await;
    let listing = server
        .mock_async(|when, then| {
            when.method(GET).path(ANIMALS_PATH);
            then.status(500);
        })
        .await;

    let (coordinator, _store, _sink) = coordinator(&test_config(&server.base_url()));
    let stats = coordinator.run().await;

    listing.assert_hits_async(5).await;
    assert_eq!(stats.status(), RunStatus::Failed);
    assert_eq!(stats.records_found, 0);
    assert_eq!(stats.error_count(), 2);
    assert!(stats.errors[0].contains("Page 1 failed permanently: HTTP 500"));
    assert!(stats.errors[1].contains("Process failed: "));
}

#[tokio::test]
async fn test_detail_timeouts_are_retried_then_recorded() {
    let server = MockServer::start_async().await;
    mock_listing(&server, 1, &[1, 2], Some(1)).await;
    mock_detail(&server, 1, json!(1609459200)).await;
    let slow = server
        .mock_async(|when, then| {
            when.method(GET).path(format!("{}/2", ANIMALS_PATH));
            then.status(200)
                .delay(std::time::Duration::from_millis(1500))
                .json_body(json!({"id": 2}));
        })
        .await;
    let home = server
        .mock_async(|when, then| {
            when.method(POST).path(HOME_PATH);
            then.status(200);
        })
        .await;

    let mut config = test_config(&server.base_url());
    config.source.timeout_seconds = 1;
    let (coordinator, store, sink) = coordinator(&config);
    let stats = coordinator.run().await;

    slow.assert_hits_async(5).await;
    home.assert_hits_async(1).await;
    assert_eq!(stats.records_attempted, 2);
    assert_eq!(stats.records_processed, 1);
    assert_eq!(stats.records_posted, 1);
    assert_eq!(stats.error_count(), 1);
    assert!(stats.errors[0].contains("Record 2: "));
    assert_eq!(stats.status(), RunStatus::PartiallyCompleted);
    assert!(!store.contains(2));

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].endpoint, "/animals/v1/animals/2");
    assert_eq!(events[0].error_kind, "Timeout");
    assert_eq!(events[0].retry_attempt, 5);
    assert_eq!(events[0].http_status, None);
}

#[tokio::test]
async fn test_oversized_batch_setting_is_rejected_up_front() {
    let mut config = test_config("http://localhost:3123");
    config.batch.size = 150;

    let result = RunCoordinator::new(
        &config,
        Arc::new(MemoryRecordStore::new()),
        Arc::new(MemoryErrorSink::new()),
    );

    assert!(matches!(
        result,
        Err(EtlError::InvalidConfigValueError { ref field, .. }) if field == "batch.size"
    ));
}

#[tokio::test]
async fn test_batches_split_at_threshold() {
    let server = MockServer::start_async().await;
    mock_listing(&server, 1, &[1, 2, 3], Some(2)).await;
    mock_listing(&server, 2, &[4, 5], Some(2)).await;
    for id in 1..=5 {
        mock_detail(&server, id, json!(1609459200)).await;
    }
    let home = server
        .mock_async(|when, then| {
            when.method(POST).path(HOME_PATH);
            then.status(200);
        })
        .await;

    let mut config = test_config(&server.base_url());
    config.batch.size = 2;
    let (coordinator, store, _sink) = coordinator(&config);
    let stats = coordinator.run().await;

    home.assert_hits_async(3).await;
    assert_eq!(stats.batches_posted, 3);
    assert_eq!(stats.records_posted, 5);
    assert_eq!(stats.status(), RunStatus::Completed);
    assert_eq!(store.len(), 5);
}

#[tokio::test]
async fn test_repeated_runs_store_each_record_once() {
    let server = MockServer::start_async().await;
    mock_listing(&server, 1, &[1, 2], Some(1)).await;
    mock_detail(&server, 1, json!(1609459200)).await;
    mock_detail(&server, 2, json!(1609459200)).await;
    let home = server
        .mock_async(|when, then| {
            when.method(POST).path(HOME_PATH);
            then.status(200);
        })
        .await;

    let (coordinator, store, _sink) = coordinator(&test_config(&server.base_url()));
    coordinator.run().await;
    let second = coordinator.run().await;

    // 每次 run 都會重新送出，只有儲存會略過已知記錄
    home.assert_hits_async(2).await;
    assert_eq!(second.records_posted, 2);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_engine_spawn_and_single_flight() {
    let server = MockServer::start_async().await;
    mock_listing(&server, 1, &[1], Some(1)).await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("{}/1", ANIMALS_PATH));
            then.status(200)
                .delay(std::time::Duration::from_millis(300))
                .json_body(json!({"id": 1, "friends": "", "born_at": 1609459200}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(HOME_PATH);
            then.status(200);
        })
        .await;

    let (coordinator, _store, _sink) = coordinator(&test_config(&server.base_url()));
    let engine = EtlEngine::new(coordinator);

    let handle = engine.spawn().unwrap();
    assert!(matches!(engine.spawn(), Err(EtlError::RunInProgress)));

    let stats = handle.wait().await.unwrap();

    assert_eq!(stats.status(), RunStatus::Completed);
    assert_eq!(stats.records_posted, 1);
    assert!(!engine.is_running());

    let status = engine.status().unwrap();
    assert_eq!(status.run_id, stats.run_id);
    assert_eq!(status.step, "Completed");
    assert_eq!(status.posted, 1);
}

#[tokio::test]
async fn test_toml_file_drives_run() {
    let server = MockServer::start_async().await;
    mock_listing(&server, 1, &[7], Some(1)).await;
    mock_detail(&server, 7, json!("2021-01-01 00:00:00")).await;
    let home = server
        .mock_async(|when, then| {
            when.method(POST).path(HOME_PATH);
            then.status(200);
        })
        .await;

    std::env::set_var("ANIMAL_ETL_TEST_SOURCE_URL", server.base_url());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("etl.toml");
    std::fs::write(
        &path,
        r#"
[source]
base_url = "${ANIMAL_ETL_TEST_SOURCE_URL}"

[batch]
size = 10

[retry]
time_unit_ms = 0
"#,
    )
    .unwrap();

    let config = TomlConfig::from_file(&path).unwrap();
    assert_eq!(config.source.base_url, server.base_url());

    let (coordinator, store, _sink) = coordinator(&config);
    let stats = coordinator.run().await;

    home.assert_hits_async(1).await;
    assert_eq!(stats.status(), RunStatus::Completed);
    assert_eq!(
        store.get(7).unwrap().transformed.born_at(),
        Some("2021-01-01T00:00:00+00:00")
    );
}
