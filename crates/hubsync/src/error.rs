//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use hubsync_config::ConfigError;
use hubsync_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to hub at {url}")]
    #[diagnostic(
        code(hubsync::connection_failed),
        help(
            "Check that the hub is running and reachable.\n\
             Reason: {reason}\n\
             Try: hubsync config show"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Connection to hub lost: {reason}")]
    #[diagnostic(code(hubsync::connection_lost))]
    ConnectionLost { reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(hubsync::auth_failed),
        help(
            "Create a long-lived access token in the hub's user profile, then\n\
             pass it with --token, set HUBSYNC_TOKEN, or store it with:\n\
             hubsync config init --hub-url <URL> --hub-token <TOKEN>"
        )
    )]
    AuthFailed { message: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("Entity '{entity_id}' not found")]
    #[diagnostic(
        code(hubsync::not_found),
        help("Run: hubsync states --filter {entity_id}")
    )]
    NotFound { entity_id: String },

    // ── Hub ──────────────────────────────────────────────────────────
    #[error("Hub error ({code}): {message}")]
    #[diagnostic(code(hubsync::hub_error))]
    HubError { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(hubsync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(hubsync::config),
        help("Check the config file (hubsync config path) and HUBSYNC_* variables.")
    )]
    Config(#[from] ConfigError),

    #[error("Config file already exists at {path}")]
    #[diagnostic(code(hubsync::config_exists), help("Pass --force to overwrite it."))]
    ConfigExists { path: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {millis}ms")]
    #[diagnostic(
        code(hubsync::timeout),
        help("Increase the timeout with --timeout or check hub responsiveness.")
    )]
    Timeout { millis: u64 },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(hubsync::json), help("Pass a single JSON object, quoted for your shell."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::ConnectionLost { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::Json(_) | Self::ConfigExists { .. } => exit_code::USAGE,
            Self::HubError { code, .. } if code == "not_found" => exit_code::NOT_FOUND,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            CoreError::NotConnected | CoreError::NotAuthenticated | CoreError::ConnectionClosed => {
                CliError::ConnectionLost {
                    reason: err.to_string(),
                }
            }

            CoreError::Timeout { timeout_ms, .. } => CliError::Timeout { millis: timeout_ms },

            CoreError::RequestFailed { message, code } => CliError::HubError {
                code: code.unwrap_or_else(|| "unknown".into()),
                message,
            },

            CoreError::InvalidMessage { message } => CliError::Validation {
                field: "message".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::HubError {
                code: "internal".into(),
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let cases = [
            (CoreError::ConnectionClosed, exit_code::CONNECTION),
            (
                CoreError::AuthenticationFailed {
                    message: "Invalid access token".into(),
                },
                exit_code::AUTH,
            ),
            (
                CoreError::Timeout {
                    id: 4,
                    timeout_ms: 10_000,
                },
                exit_code::TIMEOUT,
            ),
            (
                CoreError::RequestFailed {
                    message: "Service not found.".into(),
                    code: Some("not_found".into()),
                },
                exit_code::NOT_FOUND,
            ),
            (
                CoreError::RequestFailed {
                    message: "boom".into(),
                    code: None,
                },
                exit_code::GENERAL,
            ),
        ];
        for (core, expected) in cases {
            let label = core.to_string();
            assert_eq!(CliError::from(core).exit_code(), expected, "{label}");
        }
    }
}
