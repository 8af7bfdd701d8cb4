//! Error taxonomy for the onboarding workflow.

use onboard_xapi::XapiError;

use crate::config::DeviceId;

/// Onboarding errors.
///
/// Only `NoActiveNode` is an expected, operator-facing outcome; the rest
/// abort the run and are reported with the controller's own wording.
#[derive(Debug, thiserror::Error)]
pub enum OnboardError {
    #[error("connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    #[error("unexpected response from {host}: {detail}")]
    Parse { host: String, detail: String },

    #[error("couldn't find the active controller ({summary})")]
    NoActiveNode { summary: String },

    #[error("{host}: {message}")]
    Api { host: String, message: String },

    #[error("commit on {host} finished with status {status}: {}", .messages.join("; "))]
    Commit {
        host: String,
        status: String,
        messages: Vec<String>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file is not valid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// The run failed after devices were written to the candidate
    /// configuration; `pending` still await a commit.
    #[error("{cause} (added but not committed: {})", id_list(.pending))]
    Uncommitted {
        pending: Vec<DeviceId>,
        cause: Box<OnboardError>,
    },
}

impl OnboardError {
    /// `true` when the run stopped because no candidate reported an active state.
    pub fn is_no_active_node(&self) -> bool {
        matches!(self, OnboardError::NoActiveNode { .. })
    }

    /// Devices registered by the failed run but not yet committed.
    pub fn pending(&self) -> &[DeviceId] {
        match self {
            OnboardError::Uncommitted { pending, .. } => pending,
            _ => &[],
        }
    }
}

fn id_list(ids: &[DeviceId]) -> String {
    ids.iter()
        .map(DeviceId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<XapiError> for OnboardError {
    fn from(err: XapiError) -> Self {
        match err {
            XapiError::Connection { host, reason } => OnboardError::Connection { host, reason },
            XapiError::Auth { host, reason } => OnboardError::Connection {
                host,
                reason: format!("authentication failed: {reason}"),
            },
            XapiError::Parse { host, detail } => OnboardError::Parse { host, detail },
            XapiError::Api { host, message, .. } => OnboardError::Api { host, message },
            XapiError::Timeout {
                host,
                job_id,
                waited_secs,
            } => OnboardError::Commit {
                host,
                status: "TIMEOUT".to_string(),
                messages: vec![format!("job {job_id} still running after {waited_secs}s")],
            },
        }
    }
}

/// Result type for onboarding operations.
pub type OnboardResult<T> = std::result::Result<T, OnboardError>;
