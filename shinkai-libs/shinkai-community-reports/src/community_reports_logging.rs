use std::fmt;

use tracing_subscriber::EnvFilter;

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum ReportLogOption {
    Extraction,
    Invocation,
    Validation,
    Scheduler,
    Tests,
}

impl fmt::Display for ReportLogOption {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ReportLogOption::Extraction => "extraction",
            ReportLogOption::Invocation => "invocation",
            ReportLogOption::Validation => "validation",
            ReportLogOption::Scheduler => "scheduler",
            ReportLogOption::Tests => "tests",
        };
        write!(f, "{}", name)
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum ReportLogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

pub fn report_log(option: ReportLogOption, level: ReportLogLevel, message: &str) {
    match level {
        ReportLogLevel::Error => tracing::error!(option = %option, "{}", message),
        ReportLogLevel::Warn => tracing::warn!(option = %option, "{}", message),
        ReportLogLevel::Info => tracing::info!(option = %option, "{}", message),
        ReportLogLevel::Debug => tracing::debug!(option = %option, "{}", message),
    }
}

/// Installs a stdout subscriber filtered by `RUST_LOG` (default `info`).
/// Safe to call more than once; later calls are no-ops.
pub fn init_default_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Cuts `text` to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}...", &text[..byte_index]),
        None => text.to_string(),
    }
}
