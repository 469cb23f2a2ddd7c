use std::sync::Arc;
use std::time::Duration;

use actix_web::{HttpRequest, HttpResponse, get, rt, web};
use actix_ws::{Message, MessageStream, Session};
use futures_util::StreamExt;

use super::ErrorResponseWithMessage;
use crate::submission::SubmissionRegistry;
use crate::terminal::{TerminalHub, TerminalMessage};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Bidirectional terminal attached to one submission: output frames stream
/// out as JSON messages, inbound text frames are stdin chunks.
#[get("/ws/terminal/{id}")]
pub async fn terminal_ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<String>,
    registry: web::Data<SubmissionRegistry>,
    hub: web::Data<TerminalHub>,
) -> actix_web::Result<HttpResponse> {
    let submission_id = path.into_inner();
    if registry.get(&submission_id).is_none() {
        return Ok(HttpResponse::NotFound().json(ErrorResponseWithMessage {
            reason: "ERR_NOT_FOUND",
            code: 3,
            message: format!("submission {submission_id} not found"),
        }));
    }

    let (response, session, msg_stream) = actix_ws::handle(&req, stream)?;
    rt::spawn(terminal_session(
        session,
        msg_stream,
        submission_id,
        registry.into_inner(),
        hub.into_inner(),
    ));
    Ok(response)
}

async fn terminal_session(
    mut session: Session,
    mut msg_stream: MessageStream,
    submission_id: String,
    registry: Arc<SubmissionRegistry>,
    hub: Arc<TerminalHub>,
) {
    // Subscribe before reading the status so no frame can slip between the
    // terminal-state check and the attachment.
    let (subscriber_id, mut frames) = hub.subscribe(&submission_id);

    let Some(submission) = registry.get(&submission_id) else {
        hub.unsubscribe(&submission_id, subscriber_id);
        let _ = session.close(None).await;
        return;
    };

    // Late attachment: the run is over, so deliver the stored output in one
    // frame and close.
    if submission.status.is_terminal() {
        hub.unsubscribe(&submission_id, subscriber_id);
        let catch_up = TerminalMessage::output(submission.output, false);
        let _ = session.text(frame_json(&catch_up)).await;
        let _ = session.close(None).await;
        return;
    }

    let greeting = TerminalMessage::system(format!(
        "[System] Connected to process (ID: {}, Status: {})",
        submission.id,
        submission.status.as_str()
    ));
    if session.text(frame_json(&greeting)).await.is_err() {
        hub.unsubscribe(&submission_id, subscriber_id);
        return;
    }

    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
    keepalive.tick().await; // the first tick fires immediately

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(message) => {
                    if session.text(frame_json(&message)).await.is_err() {
                        break;
                    }
                }
                // The run reached a terminal state; the final notice has
                // already been delivered through the channel.
                None => break,
            },

            inbound = msg_stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    hub.send_input(&submission_id, text.to_string());
                }
                Some(Ok(Message::Binary(bytes))) => {
                    hub.send_input(
                        &submission_id,
                        String::from_utf8_lossy(&bytes).into_owned(),
                    );
                }
                Some(Ok(Message::Ping(bytes))) => {
                    if session.pong(&bytes).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },

            _ = keepalive.tick() => {
                if session.ping(b"").await.is_err() {
                    break;
                }
            }
        }
    }

    hub.unsubscribe(&submission_id, subscriber_id);
    let _ = session.close(None).await;
    log::debug!("terminal session for submission {submission_id} closed");
}

fn frame_json(message: &TerminalMessage) -> String {
    serde_json::to_string(message).unwrap_or_default()
}
