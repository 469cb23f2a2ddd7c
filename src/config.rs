use std::time::Duration;

use clap::Parser;

#[derive(Parser)]
#[command(name = "codebox", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Enable debug logging
    #[arg(long = "verbose", short = 'v', default_value_t = false)]
    pub verbose: bool,

    /// Port to listen on (overrides PORT)
    #[arg(long = "port", short = 'p')]
    pub port: Option<u16>,

    /// Number of execution workers (overrides CONCURRENT_EXECUTIONS)
    #[arg(long = "workers", short = 'w')]
    pub workers: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub executor: ExecutorConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Size of the worker pool draining the job queue
    pub workers: usize,
    /// Capacity of the pending-job buffer; `enqueue` waits while it is full
    pub queue_capacity: usize,
    /// Wall-clock deadline applied to compile phases; run phases use the
    /// per-language timeout
    pub default_timeout: Duration,
    /// Stored-output cap in bytes; 0 disables the cap. Truncation is always
    /// marked in the output, never silent.
    pub max_output_bytes: usize,
}

impl Config {
    /// Load the configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                port: env_parse("PORT", 8080),
            },
            executor: ExecutorConfig {
                workers: env_parse("CONCURRENT_EXECUTIONS", 5),
                queue_capacity: env_parse("QUEUE_CAPACITY", 100),
                default_timeout: Duration::from_secs(env_parse("DEFAULT_TIMEOUT", 30)),
                max_output_bytes: env_parse("MAX_OUTPUT_BYTES", 0),
            },
        }
    }

    /// Apply command-line overrides on top of the environment.
    pub fn apply_cli(&mut self, cli: &CliArgs) {
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(workers) = cli.workers {
            self.executor.workers = workers;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(value) => value.parse().unwrap_or(default),
        Err(_) => default,
    }
}
