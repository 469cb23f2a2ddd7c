use actix_web::{HttpResponse, Responder, get, web};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;

use super::ErrorResponseWithMessage;
use crate::language::Language;
use crate::queue::JobQueue;
use crate::submission::{Status, Submission, SubmissionRegistry};

#[derive(Deserialize)]
pub struct IdQuery {
    pub id: Option<String>,
}

fn missing_id() -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponseWithMessage {
        reason: "ERR_INVALID_ARGUMENT",
        code: 1,
        message: "id is required".to_string(),
    })
}

fn not_found(id: &str) -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponseWithMessage {
        reason: "ERR_NOT_FOUND",
        code: 3,
        message: format!("submission {id} not found"),
    })
}

fn rfc3339(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[get("/status")]
pub async fn status_handler(
    registry: web::Data<SubmissionRegistry>,
    query: web::Query<IdQuery>,
) -> impl Responder {
    let Some(id) = &query.id else {
        return missing_id();
    };
    let Some(submission) = registry.get(id) else {
        return not_found(id);
    };

    let mut response = json!({
        "id": submission.id,
        "status": submission.status,
    });
    if let Some(queued_at) = submission.queued_at {
        response["queuedAt"] = json!(rfc3339(queued_at));
    }
    if let Some(started_at) = submission.started_at {
        response["startedAt"] = json!(rfc3339(started_at));
        if submission.status == Status::Running {
            response["runningFor"] = json!((Utc::now() - started_at).num_milliseconds());
        }
    }
    if let Some(completed_at) = submission.completed_at {
        response["completedAt"] = json!(rfc3339(completed_at));
        if let Some(ms) = submission.execution_time_ms() {
            response["executionTime"] = json!(ms);
        }
    }

    HttpResponse::Ok().json(response)
}

#[get("/result")]
pub async fn result_handler(
    registry: web::Data<SubmissionRegistry>,
    query: web::Query<IdQuery>,
) -> impl Responder {
    let Some(id) = &query.id else {
        return missing_id();
    };
    let Some(submission) = registry.get(id) else {
        return not_found(id);
    };
    HttpResponse::Ok().json(result_body(&submission))
}

/// Full record plus the derived execution time, once it is known.
fn result_body(submission: &Submission) -> serde_json::Value {
    let mut body = serde_json::to_value(submission).expect("submission serializes");
    if let Some(ms) = submission.execution_time_ms() {
        body["executionTime"] = json!(ms);
    }
    body
}

#[get("/queue-stats")]
pub async fn queue_stats_handler(
    registry: web::Data<SubmissionRegistry>,
    queue: web::Data<JobQueue>,
) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "queue_stats": queue.stats(),
        "submissions": registry.len(),
    }))
}

#[get("/languages")]
pub async fn languages_handler() -> impl Responder {
    let languages: Vec<_> = Language::all()
        .iter()
        .map(|language| {
            json!({
                "id": language.as_str(),
                "name": language.display_name(),
                "image": crate::language::driver_for(*language).image(),
            })
        })
        .collect();
    HttpResponse::Ok().json(languages)
}

#[get("/health")]
pub async fn health_handler() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "timestamp": crate::create_timestamp(),
    }))
}
