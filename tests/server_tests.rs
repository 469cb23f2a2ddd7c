use std::sync::Arc;

use actix_web::{App, test, web};
use serde_json::json;

use codebox::queue::JobQueue;
use codebox::routes::{
    health_handler, json_error_handler, languages_handler, query_error_handler,
    queue_stats_handler, result_handler, status_handler, submit_handler, terminal_ws_handler,
};
use codebox::submission::SubmissionRegistry;
use codebox::terminal::TerminalHub;

struct TestState {
    registry: Arc<SubmissionRegistry>,
    queue: Arc<JobQueue>,
}

fn test_state() -> TestState {
    TestState {
        registry: Arc::new(SubmissionRegistry::new()),
        queue: Arc::new(JobQueue::new(2, 100)),
    }
}

macro_rules! test_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::from($state.registry.clone()))
                .app_data(web::Data::from(Arc::new(TerminalHub::new())))
                .app_data(web::Data::from($state.queue.clone()))
                .app_data(web::JsonConfig::default().error_handler(json_error_handler))
                .app_data(web::QueryConfig::default().error_handler(query_error_handler))
                .service(submit_handler)
                .service(status_handler)
                .service(result_handler)
                .service(queue_stats_handler)
                .service(languages_handler)
                .service(health_handler)
                .service(terminal_ws_handler),
        )
        .await
    };
}

#[actix_web::test]
async fn test_submit_accepts_and_registers() {
    let state = test_state();
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/submit")
        .set_json(json!({
            "language": "python",
            "code": "print('Hello, World!')",
            "input": ""
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 202);

    let body: serde_json::Value = test::read_body_json(resp).await;
    let id = body["id"].as_str().unwrap();
    assert_eq!(id.len(), 32);
    assert_eq!(body["status"], "queued");
    assert_eq!(state.registry.len(), 1);
    assert_eq!(state.queue.stats().queue_length, 1);

    // No workers are running, so the submission sits in the queued state
    let req = test::TestRequest::get()
        .uri(&format!("/status?id={id}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "queued");
    assert!(body["queuedAt"].is_string());
    assert!(body.get("startedAt").is_none());
}

#[actix_web::test]
async fn test_duplicate_submissions_get_distinct_ids() {
    let state = test_state();
    let app = test_app!(state);

    let payload = json!({"language": "python", "code": "print(1)"});
    let mut ids = Vec::new();
    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/submit")
            .set_json(payload.clone())
            .to_request();
        let body: serde_json::Value =
            test::read_body_json(test::call_service(&app, req).await).await;
        ids.push(body["id"].as_str().unwrap().to_string());
    }
    assert_ne!(ids[0], ids[1]);
    assert_eq!(state.registry.len(), 2);
}

#[actix_web::test]
async fn test_submit_rejects_empty_code() {
    let state = test_state();
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/submit")
        .set_json(json!({"language": "python", "code": ""}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(state.registry.len(), 0);
}

#[actix_web::test]
async fn test_submit_rejects_unknown_language() {
    let state = test_state();
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/submit")
        .set_json(json!({"language": "brainfuck", "code": "+"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "ERR_INVALID_ARGUMENT");
    assert_eq!(state.registry.len(), 0);
}

#[actix_web::test]
async fn test_submit_accepts_language_aliases() {
    let state = test_state();
    let app = test_app!(state);

    for tag in ["js", "GO", "C++"] {
        let req = test::TestRequest::post()
            .uri("/submit")
            .set_json(json!({"language": tag, "code": "x"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 202, "alias {tag} should be accepted");
    }
}

#[actix_web::test]
async fn test_submit_rejects_malformed_json() {
    let state = test_state();
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/submit")
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "ERR_INVALID_ARGUMENT");
}

#[actix_web::test]
async fn test_submit_after_shutdown_is_rejected() {
    let state = test_state();
    let app = test_app!(state);
    state.queue.shutdown();

    let req = test::TestRequest::post()
        .uri("/submit")
        .set_json(json!({"language": "python", "code": "print(1)"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 503);
}

#[actix_web::test]
async fn test_status_requires_and_checks_id() {
    let state = test_state();
    let app = test_app!(state);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/status").to_request()).await;
    assert_eq!(resp.status(), 400);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/status?id=unknown").to_request(),
    )
    .await;
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "ERR_NOT_FOUND");
}

#[actix_web::test]
async fn test_result_agrees_with_status() {
    let state = test_state();
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/submit")
        .set_json(json!({"language": "cpp", "code": "int main(){}"}))
        .to_request();
    let body: serde_json::Value = test::read_body_json(test::call_service(&app, req).await).await;
    let id = body["id"].as_str().unwrap();

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/result?id={id}"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["id"], id);
    assert_eq!(body["status"], "queued");
    assert_eq!(body["language"], "cpp");
    assert_eq!(body["output"], "");

    // A second read returns the same stable record
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/result?id={id}"))
            .to_request(),
    )
    .await;
    let again: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(again, body);
}

#[actix_web::test]
async fn test_result_unknown_id_is_404() {
    let state = test_state();
    let app = test_app!(state);
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/result?id=missing").to_request(),
    )
    .await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn test_queue_stats_shape() {
    let state = test_state();
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/submit")
        .set_json(json!({"language": "java", "code": "class A {}"}))
        .to_request();
    test::call_service(&app, req).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/queue-stats").to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["submissions"], 1);
    assert_eq!(body["queue_stats"]["queue_length"], 1);
    assert_eq!(body["queue_stats"]["running_jobs"], 0);
    assert_eq!(body["queue_stats"]["total_processed"], 0);
    assert_eq!(body["queue_stats"]["max_workers"], 2);
}

#[actix_web::test]
async fn test_languages_listing() {
    let state = test_state();
    let app = test_app!(state);
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/languages").to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    let listed = body.as_array().unwrap();
    assert_eq!(listed.len(), 6);
    assert!(listed.iter().any(|l| l["id"] == "python"));
    assert!(listed.iter().any(|l| l["id"] == "golang"));
}

#[actix_web::test]
async fn test_health_endpoint() {
    let state = test_state();
    let app = test_app!(state);
    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[actix_web::test]
async fn test_terminal_unknown_submission_is_404() {
    let state = test_state();
    let app = test_app!(state);
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/ws/terminal/unknown").to_request(),
    )
    .await;
    assert_eq!(resp.status(), 404);
}
