use std::process::ExitStatus;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ExecutorConfig;
use crate::language::{DriverError, Prepared, driver_for};
use crate::sandbox::SandboxLauncher;
use crate::submission::SubmissionRegistry;
use crate::terminal::{TerminalHub, TerminalMessage, is_input_prompt};

const READ_BUFFER_SIZE: usize = 1024;

/// Take one submission through preparation and supervised execution, leaving
/// it in a terminal state. Only this path writes terminal statuses.
pub async fn run_submission(
    submission_id: String,
    registry: Arc<SubmissionRegistry>,
    hub: Arc<TerminalHub>,
    launcher: Arc<dyn SandboxLauncher>,
    executor: ExecutorConfig,
    token: CancellationToken,
) {
    let Some(submission) = registry.get(&submission_id) else {
        log::error!("submission {submission_id} vanished from the registry, discarded");
        return;
    };
    let output_cap = executor.max_output_bytes;

    let driver = driver_for(submission.language);
    let prepared = match driver
        .prepare(&submission, launcher.as_ref(), executor.default_timeout)
        .await
    {
        Ok(prepared) => prepared,
        Err(DriverError::Compile { output }) => {
            registry.mutate(&submission_id, |s| {
                s.append_output(&output, output_cap);
                s.mark_failed("compilation error");
            });
            hub.broadcast(&submission_id, TerminalMessage::output(output, true));
            close_terminals(&submission_id, &registry, &hub);
            return;
        }
        Err(e) => {
            log::error!("driver preparation failed for submission {submission_id}: {e}");
            registry.mutate(&submission_id, |s| {
                s.mark_failed("failed to prepare execution environment");
            });
            close_terminals(&submission_id, &registry, &hub);
            return;
        }
    };

    supervise(
        prepared,
        &submission_id,
        &registry,
        &hub,
        launcher.as_ref(),
        output_cap,
        &token,
    )
    .await;
}

/// Own one sandbox process end to end: launch, fan its output out to the
/// registry and the live terminals, forward subscriber stdin, enforce the
/// wall-clock deadline, and finalise the record.
pub async fn supervise(
    prepared: Prepared,
    submission_id: &str,
    registry: &Arc<SubmissionRegistry>,
    hub: &Arc<TerminalHub>,
    launcher: &dyn SandboxLauncher,
    output_cap: usize,
    token: &CancellationToken,
) {
    // Keeps the working directory alive until the run is over
    let Prepared {
        workdir: _workdir,
        run,
        timeout,
    } = prepared;

    let mut process = match launcher.launch(&run).await {
        Ok(process) => process,
        Err(e) => {
            log::error!("sandbox launch failed for submission {submission_id}: {e:#}");
            registry.mutate(submission_id, |s| s.mark_failed(e.to_string()));
            close_terminals(submission_id, registry, hub);
            return;
        }
    };

    let mut stdin = process.take_stdin();

    // Pre-supplied test input goes in once, right after launch
    if let Some(pipe) = stdin.as_mut() {
        let initial = registry
            .get(submission_id)
            .and_then(|s| s.input)
            .unwrap_or_default();
        if !initial.is_empty() {
            let _ = pipe.write_all(initial.as_bytes()).await;
            if !initial.ends_with('\n') {
                let _ = pipe.write_all(b"\n").await;
            }
            let _ = pipe.flush().await;
        }
    }

    // Subscriber input drains through the bounded channel into stdin. The
    // pipe stays open for the process lifetime so late input still works.
    let mut input_rx = hub.register_input(submission_id);
    let stdin_task: JoinHandle<()> = tokio::spawn(async move {
        let Some(mut pipe) = stdin else { return };
        while let Some(chunk) = input_rx.recv().await {
            if pipe.write_all(chunk.as_bytes()).await.is_err()
                || pipe.write_all(b"\n").await.is_err()
            {
                log::debug!("stdin pipe closed, dropping remaining input");
                break;
            }
            let _ = pipe.flush().await;
        }
    });

    let stdout_task = spawn_reader(
        process.take_stdout(),
        false,
        submission_id.to_string(),
        registry.clone(),
        hub.clone(),
        output_cap,
    );
    let stderr_task = spawn_reader(
        process.take_stderr(),
        true,
        submission_id.to_string(),
        registry.clone(),
        hub.clone(),
        output_cap,
    );

    enum Outcome {
        Exited(std::io::Result<ExitStatus>),
        TimedOut,
        Cancelled,
    }

    let outcome = tokio::select! {
        status = process.wait() => Outcome::Exited(status),
        _ = tokio::time::sleep(timeout) => Outcome::TimedOut,
        _ = token.cancelled() => Outcome::Cancelled,
    };

    match outcome {
        Outcome::Exited(wait_result) => {
            // Let the readers drain whatever is still buffered in the pipes
            // before the record freezes.
            let _ = stdout_task.await;
            let _ = stderr_task.await;

            match wait_result {
                Ok(status) if status.success() => {
                    registry.mutate(submission_id, |s| s.mark_completed());
                }
                Ok(status) => {
                    registry.mutate(submission_id, |s| s.mark_failed(describe_exit(status)));
                }
                Err(e) => {
                    log::error!("failed to await sandbox process for {submission_id}: {e}");
                    registry.mutate(submission_id, |s| s.mark_failed("sandbox process lost"));
                }
            }
        }
        Outcome::TimedOut => {
            log::info!(
                "submission {submission_id} timed out after {}s, killing process",
                timeout.as_secs()
            );
            process.kill().await;
            let _ = stdout_task.await;
            let _ = stderr_task.await;

            registry.mutate(submission_id, |s| {
                s.append_output(" [System] Process killed after timeout ", output_cap);
                s.mark_failed("execution timed out");
            });
            hub.broadcast(
                submission_id,
                TerminalMessage::error("timeout", "execution timed out"),
            );
        }
        Outcome::Cancelled => {
            log::info!("submission {submission_id} cancelled by shutdown, killing process");
            process.kill().await;
            let _ = stdout_task.await;
            let _ = stderr_task.await;

            registry.mutate(submission_id, |s| s.mark_failed("execution cancelled"));
        }
    }

    stdin_task.abort();
    close_terminals(submission_id, registry, hub);
}

/// Pull chunks off one process stream, append them to the record, and fan
/// them out to subscribers. Per-stream byte order is preserved on both paths.
fn spawn_reader<R>(
    stream: Option<R>,
    is_error: bool,
    submission_id: String,
    registry: Arc<SubmissionRegistry>,
    hub: Arc<TerminalHub>,
    output_cap: usize,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut stream) = stream else { return };
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        loop {
            match stream.read(&mut buffer).await {
                Ok(0) => break,
                Ok(n) => {
                    let text = String::from_utf8_lossy(&buffer[..n]).into_owned();
                    registry.mutate(&submission_id, |s| s.append_output(&text, output_cap));
                    hub.broadcast(&submission_id, TerminalMessage::output(text.clone(), is_error));
                    if !is_error && is_input_prompt(&text) {
                        hub.broadcast(
                            &submission_id,
                            TerminalMessage::InputPrompt(text.trim().to_string()),
                        );
                    }
                }
                Err(e) => {
                    log::debug!("read error on submission {submission_id} stream: {e}");
                    break;
                }
            }
        }
    })
}

fn describe_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("process exited with code {code}"),
        None => "process terminated by signal".to_string(),
    }
}

/// Tell subscribers how the run ended and close them out.
fn close_terminals(submission_id: &str, registry: &Arc<SubmissionRegistry>, hub: &Arc<TerminalHub>) {
    if let Some(submission) = registry.get(submission_id) {
        hub.broadcast(
            submission_id,
            TerminalMessage::Status {
                status: submission.status,
            },
        );
    }
    hub.broadcast(
        submission_id,
        TerminalMessage::system("Execution finished, closing terminal"),
    );
    hub.finish(submission_id);
}
