//! Integration tests for the reanalysis pipeline
//!
//! Runs the assembled runtime against a temporary SQLite database with an
//! in-memory scoring client:
//! - health-check sweep order and fallback across failure classes
//! - refusal to queue when every model fails
//! - full ensemble run, partial and total model failure, idempotent updates
//! - per-call timeouts under concurrent sweeps and ensemble runs
//! - progress monotonicity and late subscribers

use std::sync::Arc;
use std::time::Duration;

use bnews_common::config::TomlConfig;
use bnews_scoring::db::{CompositeStore, ScoreStore};
use bnews_scoring::models::{CompositeScoreConfig, ProgressState, ProgressStep, ScoreSource};
use bnews_scoring::services::{
    FailureKind, MockScoringClient, ModelScore, ScoringClient, ScoringFailure,
};
use bnews_scoring::{ScoreError, ScoringRuntime};
use futures::StreamExt;
use tempfile::TempDir;

fn composite_config() -> CompositeScoreConfig {
    serde_json::from_value(serde_json::json!({
        "models": [
            {"modelName": "model-a", "perspective": "left"},
            {"modelName": "model-b", "perspective": "center"},
            {"modelName": "model-c", "perspective": "right"}
        ],
        "formula": "weighted",
        "weights": {"left": 0.33, "center": 0.34, "right": 0.33},
        "handle_invalid": "ignore",
        "confidence_method": "spread_based",
        "confidence_params": {"min_count": 2}
    }))
    .unwrap()
}

async fn runtime_with(client: Arc<MockScoringClient>) -> (TempDir, ScoringRuntime) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = TomlConfig::default();
    config.database_path = temp_dir.path().join("scores.db");
    config.scoring.main_timeout_ms = 30_000;
    config.scoring.health_check_timeout_ms = 2_000;

    let runtime = ScoringRuntime::build_with(&config, composite_config(), client)
        .await
        .unwrap();
    (temp_dir, runtime)
}

#[tokio::test]
async fn test_health_sweep_falls_through_failure_classes() {
    let client = Arc::new(MockScoringClient::new());
    client.fail("model-a", ScoringFailure::transient("connection reset"));
    client.fail("model-b", ScoringFailure::rate_limited("429 Too Many Requests"));
    client.succeed("model-c", 0.1, 0.8);
    let (_dir, runtime) = runtime_with(client.clone()).await;

    let model = runtime.reanalyzer.health_check().await.unwrap();

    assert_eq!(model, "model-c");
    assert_eq!(client.called_models(), vec!["model-a", "model-b", "model-c"]);
    assert!(client
        .calls()
        .iter()
        .all(|c| c.timeout == Duration::from_millis(2_000)));
    assert_eq!(client.timeout(), Duration::from_millis(30_000));

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_fatal_failure_does_not_stop_sweep() {
    let client = Arc::new(MockScoringClient::new());
    client.fail("model-a", ScoringFailure::fatal("401 Unauthorized"));
    client.fail("model-b", ScoringFailure::transient("timeout"));
    client.succeed("model-c", 0.0, 0.5);
    let (_dir, runtime) = runtime_with(client.clone()).await;

    assert_eq!(runtime.reanalyzer.health_check().await.unwrap(), "model-c");

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_all_models_failing_never_queues_job() {
    let client = Arc::new(MockScoringClient::new());
    client.fail("model-a", ScoringFailure::transient("timeout"));
    client.fail("model-b", ScoringFailure::rate_limited("429"));
    client.fail("model-c", ScoringFailure::fatal("400 bad request"));
    let (_dir, runtime) = runtime_with(client.clone()).await;

    let err = runtime
        .reanalyzer
        .reanalyze(7, "article text".to_string())
        .await
        .unwrap_err();

    match &err {
        ScoreError::AllModelsUnavailable { source } => match source.as_ref() {
            ScoreError::ModelUnavailable { model, kind, .. } => {
                assert_eq!(model, "model-c");
                assert_eq!(*kind, FailureKind::Fatal);
            }
            other => panic!("unexpected inner error: {:?}", other),
        },
        other => panic!("expected AllModelsUnavailable, got {:?}", other),
    }
    assert!(err.is_server_error());

    // Only the sweep ran; nothing was queued or written
    assert_eq!(client.calls().len(), 3);
    assert!(runtime.progress.get(7).is_none());
    assert!(runtime.store.fetch_composite(7).await.unwrap().is_none());
    assert_eq!(client.timeout(), Duration::from_millis(30_000));

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_reanalysis_persists_composite() {
    let client = Arc::new(MockScoringClient::new());
    client.succeed("model-a", -0.5, 0.9);
    client.succeed("model-b", 0.0, 0.8);
    client.succeed("model-c", 0.5, 0.7);
    let (_dir, runtime) = runtime_with(client.clone()).await;

    let (ticket, handle) = runtime
        .reanalyzer
        .reanalyze(1, "article text".to_string())
        .await
        .unwrap();
    assert_eq!(ticket.working_model, "model-a");
    let outcome = handle.await.unwrap().unwrap();

    let state = runtime.progress.wait_for_terminal(1).await.unwrap();
    assert_eq!(state.step, ProgressStep::Complete);
    assert_eq!(state.job_id, ticket.job_id);

    let record = runtime.manager.get_composite(1).await.unwrap().unwrap();
    assert!(record.score.abs() < 1e-9);
    assert_eq!(record.score, outcome.composite_score);
    assert_eq!(record.source, ScoreSource::Llm);
    // Spread of {-0.5, 0, 0.5} over a range of 2
    let expected = 1.0 - (1.0f64 / 6.0).sqrt();
    assert!((record.confidence - expected).abs() < 1e-9);

    let raw = runtime.store.fetch_scores(1).await.unwrap();
    assert_eq!(raw.len(), 3);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_partial_model_failure_still_scores() {
    let client = Arc::new(MockScoringClient::new());
    client.succeed("model-a", -0.4, 0.9);
    client.fail("model-b", ScoringFailure::rate_limited("429"));
    client.succeed("model-c", 0.2, 0.7);
    let (_dir, runtime) = runtime_with(client.clone()).await;

    let (_ticket, handle) = runtime
        .reanalyzer
        .reanalyze(2, "article text".to_string())
        .await
        .unwrap();
    handle.await.unwrap().unwrap();

    let state = runtime.progress.get(2).unwrap();
    assert_eq!(state.step, ProgressStep::Complete);

    let raw = runtime.store.fetch_scores(2).await.unwrap();
    let models: Vec<_> = raw.iter().map(|s| s.model.as_str()).collect();
    assert_eq!(models, vec!["model-a", "model-c"]);

    // Equal left/right weights: (-0.4 + 0.2) / 2
    let record = runtime.store.fetch_composite(2).await.unwrap().unwrap();
    assert!((record.score + 0.1).abs() < 1e-9);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_reanalysis_replaces_previous_raw_scores() {
    let client = Arc::new(MockScoringClient::new());
    client.succeed("model-a", 0.3, 0.9);
    client.succeed("model-b", 0.3, 0.9);
    client.succeed("model-c", 0.3, 0.9);
    let (_dir, runtime) = runtime_with(client.clone()).await;

    let (_, handle) = runtime.reanalyzer.reanalyze(3, "v1".to_string()).await.unwrap();
    handle.await.unwrap().unwrap();

    client.fail("model-b", ScoringFailure::transient("timeout"));
    let (_, handle) = runtime.reanalyzer.reanalyze(3, "v2".to_string()).await.unwrap();
    handle.await.unwrap().unwrap();

    let raw = runtime.store.fetch_scores(3).await.unwrap();
    assert_eq!(raw.len(), 2);
    assert!(raw.iter().all(|s| s.model != "model-b"));

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_update_score_is_idempotent() {
    let client = Arc::new(MockScoringClient::new());
    client.succeed("model-a", -0.2, 0.6);
    client.succeed("model-b", 0.1, 0.9);
    client.succeed("model-c", 0.4, 0.3);
    let (_dir, runtime) = runtime_with(client.clone()).await;

    let (_, handle) = runtime.reanalyzer.reanalyze(4, "text".to_string()).await.unwrap();
    handle.await.unwrap().unwrap();

    let first = runtime.manager.update_score(4).await.unwrap();
    let second = runtime.manager.update_score(4).await.unwrap();
    assert_eq!(first, second);

    let record = runtime.store.fetch_composite(4).await.unwrap().unwrap();
    assert_eq!(record.score, second.composite_score);
    assert_eq!(record.confidence, second.confidence);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_progress_is_monotonic() {
    let client = Arc::new(MockScoringClient::new().with_delay(Duration::from_millis(20)));
    client.succeed("model-a", -0.1, 0.9);
    client.succeed("model-b", 0.0, 0.9);
    client.succeed("model-c", 0.1, 0.9);
    let (_dir, runtime) = runtime_with(client.clone()).await;

    let (_ticket, handle) = runtime
        .reanalyzer
        .reanalyze(5, "text".to_string())
        .await
        .unwrap();

    let states: Vec<ProgressState> = runtime.progress.stream(5).collect().await;
    handle.await.unwrap().unwrap();

    assert!(states.len() >= 2, "expected intermediate states, got {:?}", states);
    for pair in states.windows(2) {
        assert!(
            pair[0].step.rank() <= pair[1].step.rank(),
            "step went backwards: {:?} -> {:?}",
            pair[0].step,
            pair[1].step
        );
    }
    assert_eq!(states.last().unwrap().step, ProgressStep::Complete);
    assert_eq!(states.iter().filter(|s| s.is_terminal()).count(), 1);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_late_subscriber_sees_terminal_state() {
    let client = Arc::new(MockScoringClient::new());
    client.succeed("model-a", 0.2, 0.9);
    client.succeed("model-b", 0.2, 0.9);
    client.succeed("model-c", 0.2, 0.9);
    let (_dir, runtime) = runtime_with(client.clone()).await;

    let (_, handle) = runtime.reanalyzer.reanalyze(6, "text".to_string()).await.unwrap();
    handle.await.unwrap().unwrap();

    let rx = runtime.progress.subscribe(6).unwrap();
    assert_eq!(rx.borrow().step, ProgressStep::Complete);

    let states: Vec<ProgressState> = runtime.progress.stream(6).collect().await;
    assert_eq!(states.len(), 1);
    assert!((states[0].final_score.unwrap() - 0.2).abs() < 1e-9);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_newer_job_supersedes_running_job() {
    let client = Arc::new(MockScoringClient::new().with_delay(Duration::from_millis(30)));
    client.succeed("model-a", 0.1, 0.9);
    client.succeed("model-b", 0.1, 0.9);
    client.succeed("model-c", 0.1, 0.9);
    let (_dir, runtime) = runtime_with(client.clone()).await;

    let (first, first_handle) = runtime.reanalyzer.reanalyze(8, "v1".to_string()).await.unwrap();
    let (second, second_handle) = runtime.reanalyzer.reanalyze(8, "v2".to_string()).await.unwrap();
    assert!(second.generation > first.generation);

    first_handle.await.unwrap().unwrap();
    second_handle.await.unwrap().unwrap();

    let state = runtime.progress.get(8).unwrap();
    assert_eq!(state.job_id, second.job_id);
    assert_eq!(state.step, ProgressStep::Complete);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_ensemble_failing_after_sweep_ends_in_error() {
    let client = Arc::new(MockScoringClient::new());
    client.succeed("model-a", 0.3, 0.9);
    client.succeed("model-b", 0.3, 0.9);
    client.succeed("model-c", 0.3, 0.9);
    let (_dir, runtime) = runtime_with(client.clone()).await;

    let (_, handle) = runtime.reanalyzer.reanalyze(9, "v1".to_string()).await.unwrap();
    handle.await.unwrap().unwrap();
    let before = runtime.store.fetch_scores(9).await.unwrap();

    // model-a passes the sweep once, then every model fails
    client.fail("model-a", ScoringFailure::transient("timeout"));
    client.fail("model-b", ScoringFailure::rate_limited("429"));
    client.fail("model-c", ScoringFailure::fatal("500 then 400"));
    client.push_result("model-a", Ok(ModelScore { score: 0.0, confidence: 0.5 }));

    let (ticket, handle) = runtime.reanalyzer.reanalyze(9, "v2".to_string()).await.unwrap();
    assert_eq!(ticket.working_model, "model-a");

    let outcome = handle.await.unwrap();
    match outcome {
        Err(ScoreError::AllModelsUnavailable { source }) => {
            assert!(matches!(*source, ScoreError::ModelUnavailable { ref model, .. } if model == "model-c"));
        }
        other => panic!("expected AllModelsUnavailable, got {:?}", other),
    }

    let state = runtime.progress.get(9).unwrap();
    assert_eq!(state.step, ProgressStep::Error);
    assert_eq!(state.job_id, ticket.job_id);
    assert!(state.error.unwrap().contains("All models unavailable"));

    // Previous raw scores and composite are left as they were
    assert_eq!(runtime.store.fetch_scores(9).await.unwrap(), before);
    let record = runtime.store.fetch_composite(9).await.unwrap().unwrap();
    assert!((record.score - 0.3).abs() < 1e-9);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_overlapping_sweeps_keep_main_timeout() {
    let client = Arc::new(MockScoringClient::new().with_delay(Duration::from_millis(50)));
    client.fail("model-a", ScoringFailure::transient("timeout"));
    client.succeed("model-b", 0.1, 0.9);
    client.succeed("model-c", 0.1, 0.9);
    let (_dir, runtime) = runtime_with(client.clone()).await;

    let (first, second) = tokio::join!(runtime.reanalyzer.health_check(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        runtime.reanalyzer.health_check().await
    });

    assert_eq!(first.unwrap(), "model-b");
    assert_eq!(second.unwrap(), "model-b");
    assert_eq!(client.timeout(), Duration::from_millis(30_000));
    assert!(client
        .calls()
        .iter()
        .all(|c| c.timeout == Duration::from_millis(2_000)));

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_ensemble_calls_keep_main_timeout_during_sweep() {
    let client = Arc::new(MockScoringClient::new().with_delay(Duration::from_millis(30)));
    client.succeed("model-a", -0.2, 0.9);
    client.succeed("model-b", 0.0, 0.9);
    client.succeed("model-c", 0.2, 0.9);
    let (_dir, runtime) = runtime_with(client.clone()).await;

    let (_, handle) = runtime.reanalyzer.reanalyze(10, "text".to_string()).await.unwrap();

    // Another request's sweep runs while the ensemble is scoring
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(runtime.reanalyzer.health_check().await.unwrap(), "model-a");
    handle.await.unwrap().unwrap();

    let calls = client.calls();
    let trial = calls
        .iter()
        .filter(|c| c.timeout == Duration::from_millis(2_000))
        .count();
    let main = calls
        .iter()
        .filter(|c| c.timeout == Duration::from_millis(30_000))
        .count();
    // One trial call per sweep, one full call per model
    assert_eq!(trial, 2);
    assert_eq!(main, 3);

    runtime.shutdown().await;
}
