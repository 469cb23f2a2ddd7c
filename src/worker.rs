use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ExecutorConfig;
use crate::queue::JobQueue;
use crate::sandbox::SandboxLauncher;
use crate::submission::{Status, SubmissionRegistry};
use crate::supervisor;
use crate::terminal::{TerminalHub, TerminalMessage};

pub async fn worker(
    id: usize,
    executor: ExecutorConfig,
    registry: Arc<SubmissionRegistry>,
    hub: Arc<TerminalHub>,
    queue: Arc<JobQueue>,
    launcher: Arc<dyn SandboxLauncher>,
    token: CancellationToken,
) {
    log::info!("worker {id} initialized");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                log::info!("worker {id} received shutdown signal, stopping");
                break;
            }

            maybe_id = queue.pop() => {
                let Some(submission_id) = maybe_id else {
                    log::info!("worker {id} drained the closed queue, stopping");
                    break;
                };
                log::info!("worker {id} got submission {submission_id} from queue");

                queue.job_started();
                registry.mutate(&submission_id, |s| s.mark_running());
                hub.broadcast(&submission_id, TerminalMessage::Status { status: Status::Running });

                // The run lives in its own task; a panic inside a driver or
                // the supervisor must not take the worker down.
                let job = tokio::spawn(supervisor::run_submission(
                    submission_id.clone(),
                    registry.clone(),
                    hub.clone(),
                    launcher.clone(),
                    executor.clone(),
                    token.child_token(),
                ));

                if let Err(e) = job.await {
                    if e.is_panic() {
                        log::error!("execution of submission {submission_id} panicked on worker {id}: {e}");
                    } else {
                        log::error!("execution task for submission {submission_id} failed on worker {id}: {e}");
                    }
                    registry.mutate(&submission_id, |s| s.mark_failed("internal execution error"));
                    hub.finish(&submission_id);
                }

                let succeeded = matches!(
                    registry.get(&submission_id).map(|s| s.status),
                    Some(Status::Completed)
                );
                queue.job_finished(succeeded);
                log::info!("submission {submission_id} finished on worker {id}");
            }
        };
    }

    log::info!("worker {id} has shut down gracefully");
}
