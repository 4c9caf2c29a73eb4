//! # Structured Logging Module
//!
//! Environment-aware structured logging to the console and, when `CALCFLOW_LOG_DIR` is set,
//! to a JSON log file.

use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;

use chrono::Utc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// `RUST_LOG` takes precedence over the environment-derived level. Calling this more than
/// once, or after another subscriber was installed, is harmless.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| get_log_level(&environment));
        let pid = process::id();

        let console = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_filter(EnvFilter::new(log_level.clone()));

        let log_dir = std::env::var_os("CALCFLOW_LOG_DIR").map(PathBuf::from);
        let file = log_dir.as_ref().and_then(|dir| {
            if let Err(e) = std::fs::create_dir_all(dir) {
                eprintln!("cannot create log directory {}: {e}", dir.display());
                return None;
            }
            let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
            let appender = tracing_appender::rolling::never(
                dir,
                format!("{environment}.{pid}.{timestamp}.log"),
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            // the guard flushes on drop; logging lives as long as the process
            std::mem::forget(guard);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(EnvFilter::new(log_level.clone())),
            )
        });

        if tracing_subscriber::registry()
            .with(console)
            .with(file)
            .try_init()
            .is_err()
        {
            tracing::debug!("global tracing subscriber already initialized");
        }

        tracing::info!(
            pid,
            environment = %environment,
            log_dir = ?log_dir,
            "🔧 STRUCTURED LOGGING: initialized"
        );
    });
}

fn get_environment() -> String {
    std::env::var("CALCFLOW_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for task operations
pub fn log_task_operation(
    operation: &str,
    task_id: Option<i64>,
    user_id: Option<i64>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        task_id = task_id,
        user_id = user_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 TASK_OPERATION"
    );
}

/// Log structured data for worker pool operations
pub fn log_worker_operation(
    operation: &str,
    worker_id: usize,
    task_id: Option<i64>,
    status: &str,
    expression: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        worker_id = worker_id,
        task_id = task_id,
        status = %status,
        expression = expression,
        timestamp = %Utc::now().to_rfc3339(),
        "👷 WORKER_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
