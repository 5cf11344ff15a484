//! Integration tests for the batch orchestrator against a scripted service.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use storyboard_client::{
  HttpResponse, ManualClock, MockTransport, PollConfig, Session, TransportError,
};
use storyboard_orchestrator::{
  BatchError, BatchOrchestrator, BatchRequest, OrchestratorConfig, PatchTarget, Stage,
  ValidationFailure,
};
use storyboard_workflow::{Workflow, WorkflowError};
use tokio_util::sync::CancellationToken;

fn base_workflow() -> serde_json::Value {
  json!({
    "32": {"class_type": "CLIPTextEncode", "inputs": {"text": "old", "clip": ["11", 0]}},
    "9": {"class_type": "SaveImage", "inputs": {"filename_prefix": "story", "images": ["8", 0]}}
  })
}

fn view_route(filename: &str) -> String {
  format!("GET /view?filename={}&subfolder=&type=output", filename)
}

fn history(prompt_id: &str, files: &[&str]) -> serde_json::Value {
  let images: Vec<serde_json::Value> = files
    .iter()
    .map(|f| json!({"filename": f, "subfolder": "", "type": "output"}))
    .collect();
  json!({
    prompt_id: {
      "outputs": {"9": {"images": images}},
      "status": {"status_str": "success", "completed": true, "messages": []}
    }
  })
}

/// A service that accepts `count` submissions as `p1..pN`; each job is
/// finished on the first poll and produced one image named `<id>.png`.
/// Images of the jobs listed in `broken` answer HTTP 500.
fn service(count: usize, broken: &[usize]) -> MockTransport {
  let mock = MockTransport::new().with_json(
    "GET /queue",
    200,
    json!({"queue_running": [], "queue_pending": []}),
  );
  for n in 1..=count {
    let id = format!("p{}", n);
    let file = format!("{}.png", id);
    mock.push("POST /prompt", Ok(HttpResponse::json(200, &json!({"prompt_id": id}))));
    mock.push(
      &format!("GET /history/{}", id),
      Ok(HttpResponse::json(200, &history(&id, &[&file]))),
    );
    let reply = if broken.contains(&n) {
      HttpResponse::new(500, "disk error")
    } else {
      HttpResponse::new(200, format!("bytes of {}", id))
    };
    mock.push(&view_route(&file), Ok(reply));
  }
  mock
}

fn healthy_service(count: usize) -> MockTransport {
  service(count, &[])
}

fn config() -> OrchestratorConfig {
  OrchestratorConfig {
    poll: PollConfig {
      interval: Duration::from_millis(100),
      timeout: Some(Duration::from_secs(10)),
      max_errors: 2,
      ..PollConfig::default()
    },
    inter_prompt_delay: Duration::from_secs(2),
    ..OrchestratorConfig::default()
  }
}

fn orchestrator(mock: &Arc<MockTransport>, clock: &Arc<ManualClock>) -> BatchOrchestrator {
  BatchOrchestrator::with_clock(Session::new(mock.clone()), config(), clock.clone())
}

fn prompts(n: usize) -> Vec<String> {
  (1..=n).map(|i| format!("prompt {}", i)).collect()
}

fn workflow() -> Workflow {
  serde_json::from_value(base_workflow()).unwrap()
}

fn write_fixture(dir: &Path, stories: &[serde_json::Value]) -> BatchRequest {
  let workflow_path = dir.join("workflow.json");
  std::fs::write(&workflow_path, base_workflow().to_string()).unwrap();

  let stories_dir = dir.join("stories");
  std::fs::create_dir_all(&stories_dir).unwrap();
  for (i, story) in stories.iter().enumerate() {
    std::fs::write(stories_dir.join(format!("story_{:02}.json", i)), story.to_string()).unwrap();
  }

  BatchRequest {
    workflow_path,
    stories_dir,
    target: PatchTarget::new("32", "text"),
    output_root: dir.join("output"),
  }
}

#[tokio::test]
async fn test_full_run_from_story_files() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let request = write_fixture(
    dir.path(),
    &[
      json!({"title": "A", "pages": [
        {"text": "a1", "image": "a castle at dawn"},
        {"text": "a2", "image": "a dragon asleep"}
      ]}),
      json!({"title": "B", "pages": [{"text": "b1", "image": "a quiet harbor"}]}),
    ],
  );
  let mock = Arc::new(healthy_service(3));
  let clock = Arc::new(ManualClock::new());

  let result = orchestrator(&mock, &clock).run(&request).await.unwrap();

  assert!(result.is_success());
  assert_eq!(result.entries.len(), 3);
  assert!(result.entries[0].validation_run);
  assert!(!result.entries[1].validation_run);

  let out = dir.path().join("output");
  assert_eq!(result.entries[0].downloaded_files, vec![out.join("test/01_p1.png")]);
  assert_eq!(result.entries[1].downloaded_files, vec![out.join("story_2/01_p2.png")]);
  assert_eq!(result.entries[2].downloaded_files, vec![out.join("story_3/01_p3.png")]);
  assert_eq!(std::fs::read(out.join("story_3/01_p3.png")).unwrap(), b"bytes of p3");

  let sent: Vec<String> = mock
    .posted()
    .iter()
    .map(|body| body["prompt"]["32"]["inputs"]["text"].as_str().unwrap().to_string())
    .collect();
  assert_eq!(sent, vec!["a castle at dawn", "a dragon asleep", "a quiet harbor"]);

  // Untargeted inputs travel unchanged.
  for body in mock.posted() {
    assert_eq!(body["prompt"]["32"]["inputs"]["clip"], json!(["11", 0]));
    assert_eq!(body["prompt"]["9"], base_workflow()["9"]);
  }

  // One pause between the two bulk prompts, none after the validation run.
  assert_eq!(clock.sleeps(), vec![Duration::from_secs(2)]);
}

#[tokio::test]
async fn test_artifacts_are_written_before_next_submission() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let mock = Arc::new(healthy_service(3));
  let clock = Arc::new(ManualClock::new());

  orchestrator(&mock, &clock)
    .run_prompts(
      &workflow(),
      &prompts(3),
      &PatchTarget::new("32", "text"),
      dir.path(),
      &CancellationToken::new(),
    )
    .await
    .unwrap();

  let calls = mock.calls();
  let position = |key: &str| calls.iter().position(|c| c == key).unwrap();
  let posts: Vec<usize> = calls
    .iter()
    .enumerate()
    .filter(|(_, c)| *c == "POST /prompt")
    .map(|(i, _)| i)
    .collect();
  assert_eq!(posts.len(), 3);
  assert!(position(&view_route("p1.png")) < posts[1]);
  assert!(position(&view_route("p2.png")) < posts[2]);
}

#[tokio::test]
async fn test_rejected_validation_run_makes_no_further_submissions() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let mock = Arc::new(MockTransport::new().with_json(
    "POST /prompt",
    400,
    json!({"error": {"message": "Prompt outputs failed validation"}, "node_errors": {}}),
  ));
  let clock = Arc::new(ManualClock::new());

  let err = orchestrator(&mock, &clock)
    .run_prompts(
      &workflow(),
      &prompts(5),
      &PatchTarget::new("32", "text"),
      dir.path(),
      &CancellationToken::new(),
    )
    .await
    .unwrap_err();

  match err {
    BatchError::ValidationRun {
      prompt,
      output_dir,
      reason: ValidationFailure::Job(job),
    } => {
      assert_eq!(prompt, "prompt 1");
      assert_eq!(output_dir, dir.path().join("test"));
      assert_eq!(job.stage(), Stage::Submit);
    }
    other => panic!("unexpected error: {other}"),
  }
  assert_eq!(mock.count("POST /prompt"), 1);
}

#[tokio::test]
async fn test_unreachable_service_fails_validation_run() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let mock = Arc::new(MockTransport::new().with_error(
    "POST /prompt",
    TransportError::Connect("connection refused".to_string()),
  ));
  let clock = Arc::new(ManualClock::new());

  let err = orchestrator(&mock, &clock)
    .run_prompts(
      &workflow(),
      &prompts(3),
      &PatchTarget::new("32", "text"),
      dir.path(),
      &CancellationToken::new(),
    )
    .await
    .unwrap_err();

  assert!(matches!(err, BatchError::ValidationRun { .. }));
  assert_eq!(mock.count("POST /prompt"), 1);
}

#[tokio::test]
async fn test_validation_run_without_artifacts_aborts() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let mock = Arc::new(
    MockTransport::new()
      .with_json("POST /prompt", 200, json!({"prompt_id": "p1"}))
      .with_json("GET /history/p1", 200, history("p1", &[])),
  );
  let clock = Arc::new(ManualClock::new());

  let err = orchestrator(&mock, &clock)
    .run_prompts(
      &workflow(),
      &prompts(2),
      &PatchTarget::new("32", "text"),
      dir.path(),
      &CancellationToken::new(),
    )
    .await
    .unwrap_err();

  assert!(matches!(
    err,
    BatchError::ValidationRun {
      reason: ValidationFailure::NoArtifacts,
      ..
    }
  ));
  assert_eq!(mock.count("POST /prompt"), 1);
}

#[tokio::test]
async fn test_validation_run_with_missing_artifact_aborts() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let mock = Arc::new(
    MockTransport::new()
      .with_json("POST /prompt", 200, json!({"prompt_id": "p1"}))
      .with_json("GET /history/p1", 200, history("p1", &["a.png", "b.png"]))
      .with_bytes(&view_route("a.png"), "a"),
  );
  let clock = Arc::new(ManualClock::new());

  let err = orchestrator(&mock, &clock)
    .run_prompts(
      &workflow(),
      &prompts(2),
      &PatchTarget::new("32", "text"),
      dir.path(),
      &CancellationToken::new(),
    )
    .await
    .unwrap_err();

  assert!(matches!(
    err,
    BatchError::ValidationRun {
      reason: ValidationFailure::IncompleteDownload { failed: 1, total: 2 },
      ..
    }
  ));
}

#[tokio::test]
async fn test_download_failure_on_third_prompt_does_not_stop_batch() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let mock = Arc::new(service(5, &[3]));
  let clock = Arc::new(ManualClock::new());

  let result = orchestrator(&mock, &clock)
    .run_prompts(
      &workflow(),
      &prompts(5),
      &PatchTarget::new("32", "text"),
      dir.path(),
      &CancellationToken::new(),
    )
    .await
    .unwrap();

  assert_eq!(result.entries.len(), 5);
  let success: Vec<bool> = result.entries.iter().map(|e| e.success).collect();
  assert_eq!(success, vec![true, true, false, true, true]);

  let third = &result.entries[2];
  assert_eq!(third.stage, Some(Stage::Download));
  assert_eq!(third.failed_artifacts.len(), 1);
  assert!(third.downloaded_files.is_empty());
  assert_eq!(result.entries[4].downloaded_files, vec![dir.path().join("story_5/01_p5.png")]);
  assert_eq!(mock.count("POST /prompt"), 5);
  assert!(!result.is_success());
  assert_eq!(result.failed(), 1);
}

#[tokio::test]
async fn test_bulk_prompt_without_images_still_gets_its_directory() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let mock = healthy_service(1);
  mock.push("POST /prompt", Ok(HttpResponse::json(200, &json!({"prompt_id": "p2"}))));
  mock.push("GET /history/p2", Ok(HttpResponse::json(200, &history("p2", &[]))));
  let mock = Arc::new(mock);
  let clock = Arc::new(ManualClock::new());

  let result = orchestrator(&mock, &clock)
    .run_prompts(
      &workflow(),
      &prompts(2),
      &PatchTarget::new("32", "text"),
      dir.path(),
      &CancellationToken::new(),
    )
    .await
    .unwrap();

  let second = &result.entries[1];
  assert!(second.success);
  assert!(second.downloaded_files.is_empty());
  assert_eq!(second.output_dir, dir.path().join("story_2"));
  assert!(second.output_dir.is_dir());
}

#[tokio::test]
async fn test_execution_failure_is_recorded_per_prompt() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let mock = MockTransport::new()
    .with_json("GET /queue", 200, json!({"queue_running": [], "queue_pending": []}))
    .with_json("POST /prompt", 200, json!({"prompt_id": "p1"}))
    .with_json("POST /prompt", 200, json!({"prompt_id": "p2"}))
    .with_json("POST /prompt", 200, json!({"prompt_id": "p3"}))
    .with_json("GET /history/p1", 200, history("p1", &["p1.png"]))
    .with_json(
      "GET /history/p2",
      200,
      json!({"p2": {"outputs": {}, "status": {"status_str": "error", "messages": [
        ["execution_error", {"node_id": "3", "node_type": "KSampler", "exception_message": "out of memory"}]
      ]}}}),
    )
    .with_json("GET /history/p3", 200, history("p3", &["p3.png"]))
    .with_bytes(&view_route("p1.png"), "one")
    .with_bytes(&view_route("p3.png"), "three");
  let mock = Arc::new(mock);
  let clock = Arc::new(ManualClock::new());

  let result = orchestrator(&mock, &clock)
    .run_prompts(
      &workflow(),
      &prompts(3),
      &PatchTarget::new("32", "text"),
      dir.path(),
      &CancellationToken::new(),
    )
    .await
    .unwrap();

  let second = &result.entries[1];
  assert!(!second.success);
  assert_eq!(second.stage, Some(Stage::Wait));
  assert_eq!(second.prompt_id.as_deref(), Some("p2"));
  assert!(second.error.as_deref().unwrap().contains("out of memory"));
  assert!(result.entries[2].success);
}

#[tokio::test]
async fn test_unknown_patch_target_is_fatal_before_submission() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let mock = Arc::new(healthy_service(2));
  let clock = Arc::new(ManualClock::new());

  let err = orchestrator(&mock, &clock)
    .run_prompts(
      &workflow(),
      &prompts(2),
      &PatchTarget::new("99", "text"),
      dir.path(),
      &CancellationToken::new(),
    )
    .await
    .unwrap_err();

  assert!(matches!(err, BatchError::Workflow(WorkflowError::UnknownNode(ref id)) if id == "99"));
  assert_eq!(mock.count("POST /prompt"), 0);
}

#[tokio::test]
async fn test_validate_only_stops_after_first_prompt() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let mock = Arc::new(healthy_service(3));
  let clock = Arc::new(ManualClock::new());
  let orchestrator = BatchOrchestrator::with_clock(
    Session::new(mock.clone()),
    OrchestratorConfig {
      validate_only: true,
      ..config()
    },
    clock.clone(),
  );

  let result = orchestrator
    .run_prompts(
      &workflow(),
      &prompts(3),
      &PatchTarget::new("32", "text"),
      dir.path(),
      &CancellationToken::new(),
    )
    .await
    .unwrap();

  assert_eq!(result.entries.len(), 1);
  assert_eq!(mock.count("POST /prompt"), 1);
}

#[tokio::test]
async fn test_cancelled_batch_stops_between_prompts() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let mock = Arc::new(healthy_service(3));
  let clock = Arc::new(ManualClock::new());
  let cancel = CancellationToken::new();
  cancel.cancel();

  let result = orchestrator(&mock, &clock)
    .run_prompts(
      &workflow(),
      &prompts(3),
      &PatchTarget::new("32", "text"),
      dir.path(),
      &cancel,
    )
    .await
    .unwrap();

  assert!(result.cancelled);
  assert_eq!(result.entries.len(), 1);
  assert_eq!(mock.count("POST /prompt"), 1);
}

#[tokio::test]
async fn test_missing_workflow_file() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let mut request = write_fixture(
    dir.path(),
    &[json!({"title": "T", "pages": [{"text": "p1", "image": "a castle at dawn"}]})],
  );
  request.workflow_path = dir.path().join("missing.json");
  let mock = Arc::new(healthy_service(1));
  let clock = Arc::new(ManualClock::new());

  let err = orchestrator(&mock, &clock).run(&request).await.unwrap_err();
  assert!(matches!(err, BatchError::Workflow(WorkflowError::NotFound { .. })));
  assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_no_prompts_is_fatal() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let request = write_fixture(dir.path(), &[json!({"title": "Empty", "pages": [{"text": "only words"}]})]);
  let mock = Arc::new(healthy_service(1));
  let clock = Arc::new(ManualClock::new());

  let err = orchestrator(&mock, &clock).run(&request).await.unwrap_err();
  assert!(matches!(err, BatchError::NoPrompts { .. }));
  assert!(mock.calls().is_empty());
}
