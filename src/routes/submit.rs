use actix_web::{HttpResponse, Responder, post, web};
use serde::{Deserialize, Serialize};

use super::{ErrorResponse, ErrorResponseWithMessage};
use crate::language::Language;
use crate::queue::JobQueue;
use crate::submission::{Submission, SubmissionRegistry};

#[derive(Deserialize, Debug)]
pub struct SubmitRequest {
    pub language: String,
    pub code: String,
    pub input: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SubmitResponse {
    pub id: String,
    pub status: String,
    pub message: String,
}

#[post("/submit")]
pub async fn submit_handler(
    registry: web::Data<SubmissionRegistry>,
    queue: web::Data<JobQueue>,
    body: web::Json<SubmitRequest>,
) -> impl Responder {
    let body = body.into_inner();

    if body.code.is_empty() {
        return HttpResponse::BadRequest().json(ErrorResponseWithMessage {
            reason: "ERR_INVALID_ARGUMENT",
            code: 1,
            message: "code must not be empty".to_string(),
        });
    }
    let Some(language) = Language::from_tag(&body.language) else {
        return HttpResponse::BadRequest().json(ErrorResponseWithMessage {
            reason: "ERR_INVALID_ARGUMENT",
            code: 1,
            message: format!("unsupported language: {}", body.language),
        });
    };

    let mut submission = Submission::new(
        language,
        body.code,
        body.input.filter(|input| !input.is_empty()),
    );
    submission.mark_queued();
    let id = submission.id.clone();

    if let Err(e) = registry.create(submission) {
        log::error!("failed to register submission: {e}");
        return HttpResponse::InternalServerError().json(ErrorResponse {
            reason: "ERR_INTERNAL",
            code: 6,
        });
    }

    // Waits here while the pending buffer is full, pushing the back-pressure
    // onto the caller.
    match queue.push(id.clone()).await {
        Ok(()) => {
            log::info!("submission {id} queued, language: {language}");
            HttpResponse::Accepted().json(SubmitResponse {
                id,
                status: "queued".to_string(),
                message: "code submission accepted and queued for execution".to_string(),
            })
        }
        Err(e) => {
            log::warn!("submission {id} rejected: {e}");
            registry.mutate(&id, |s| s.mark_failed("server shutting down"));
            HttpResponse::ServiceUnavailable().json(ErrorResponse {
                reason: "ERR_SHUTTING_DOWN",
                code: 7,
            })
        }
    }
}
