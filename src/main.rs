use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use codebox::config::{CliArgs, Config};
use codebox::language::{Language, driver_for};
use codebox::queue::JobQueue;
use codebox::sandbox::{self, SandboxLauncher};
use codebox::submission::SubmissionRegistry;
use codebox::terminal::TerminalHub;
use codebox::web_server::build_server;
use codebox::worker::worker;

/// How long workers get to finish in-flight runs on shutdown before the
/// cancellation cascade kills them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Check if the current user is root and warn if so
fn check_running_user() {
    if std::env::var("USER").unwrap_or_default() == "root"
        || std::env::var("LOGNAME").unwrap_or_default() == "root"
        || unsafe { libc::getuid() } == 0
    {
        log::warn!("WARNING: Running as root user is not recommended for security reasons!");
        log::warn!("Please consider running this application with a non-privileged user account.");
    }
}

/// Warm the per-language images so the first submission does not pay for a
/// pull. Failures are logged and retried implicitly on first use.
fn warm_images(launcher: Arc<dyn SandboxLauncher>) {
    tokio::spawn(async move {
        for language in Language::all() {
            let image = driver_for(language).image();
            if let Err(e) = launcher.pull_image_if_absent(image).await {
                log::warn!("failed to warm image {image}: {e:#}");
            }
        }
    });
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = CliArgs::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(log_level));

    let mut config = Config::from_env();
    config.apply_cli(&cli);
    if config.executor.workers == 0 {
        log::error!("The number of execution workers must not be 0");
        std::process::exit(1);
    }

    check_running_user();

    let launcher = sandbox::create_launcher();
    warm_images(launcher.clone());

    let registry = Arc::new(SubmissionRegistry::new());
    let hub = Arc::new(TerminalHub::new());
    let job_queue = Arc::new(JobQueue::new(
        config.executor.workers,
        config.executor.queue_capacity,
    ));
    let shutdown_token = CancellationToken::new();

    // ======= PREPARATION END, EXECUTION START =======

    let mut workers = JoinSet::new();
    for i in 1..=config.executor.workers {
        workers.spawn(worker(
            i,
            config.executor.clone(),
            registry.clone(),
            hub.clone(),
            job_queue.clone(),
            launcher.clone(),
            shutdown_token.clone(),
        ));
    }

    let server = build_server(
        config.server.clone(),
        registry,
        hub,
        job_queue.clone(),
    )
    .unwrap_or_else(|e| {
        log::error!("Failed to start web server: {e}");
        std::process::exit(1);
    });

    log::info!("Listening on port {}", config.server.port);
    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    // ===== EXECUTION END, WAITING FOR SHUTDOWN ======

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {res_server:?}");
        }
        Some(res_worker) = workers.join_next() => {
            log::error!("A worker terminated unexpectedly: {res_worker:?}");
        }
    }

    // 1. Shutdown actix-web server gracefully
    server_handle.stop(true).await;

    // 2. Close the queue ingress; workers drain what is already buffered
    job_queue.shutdown();
    log::info!("Queue closed, waiting for workers to finish in-flight runs...");

    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while let Some(res) = workers.join_next().await {
            log_worker_exit(res);
        }
    })
    .await;

    // 3. Grace expired: cascade cancellation into the in-flight supervisors
    if drained.is_err() {
        log::warn!("Shutdown grace expired, cancelling in-flight executions");
        shutdown_token.cancel();
        while let Some(res) = workers.join_next().await {
            log_worker_exit(res);
        }
    }

    log::info!("Shutdown complete");
    Ok(())
}

fn log_worker_exit(res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        if e.is_panic() {
            log::error!("Worker handle panicked: {e:?}");
        } else {
            log::error!("Worker handle finished with error: {e:?}");
        }
    }
}
