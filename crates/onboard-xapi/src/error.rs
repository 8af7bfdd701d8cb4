//! Error types for onboard-xapi

use thiserror::Error;

/// Errors that can occur while talking to a controller node
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XapiError {
    /// Endpoint unreachable, TLS failure, or transport-level HTTP error
    #[error("connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    /// Credentials rejected or key generation failed
    #[error("authentication with {host} failed: {reason}")]
    Auth { host: String, reason: String },

    /// Controller answered with `status="error"`; the message is verbatim
    #[error("{host} rejected the request: {message}")]
    Api {
        host: String,
        code: Option<String>,
        message: String,
    },

    /// Response was not XML or lacked a required element
    #[error("unexpected response from {host}: {detail}")]
    Parse { host: String, detail: String },

    /// Commit job did not finish within the configured window
    #[error("commit job {job_id} on {host} did not finish within {waited_secs}s")]
    Timeout {
        host: String,
        job_id: String,
        waited_secs: u64,
    },
}

impl XapiError {
    /// Host the failing request was addressed to.
    pub fn host(&self) -> &str {
        match self {
            XapiError::Connection { host, .. }
            | XapiError::Auth { host, .. }
            | XapiError::Api { host, .. }
            | XapiError::Parse { host, .. }
            | XapiError::Timeout { host, .. } => host,
        }
    }

    /// `true` for failures that mean the node could not be reached at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, XapiError::Connection { .. } | XapiError::Auth { .. })
    }

    pub(crate) fn parse(host: &str, detail: impl Into<String>) -> Self {
        XapiError::Parse {
            host: host.to_string(),
            detail: detail.into(),
        }
    }
}

/// Result type for controller RPCs
pub type XapiResult<T> = std::result::Result<T, XapiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_displays_controller_message_verbatim() {
        let err = XapiError::Api {
            host: "10.0.0.1".to_string(),
            code: Some("12".to_string()),
            message: "Object already exists".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("10.0.0.1"));
        assert!(msg.ends_with("Object already exists"));
    }

    #[test]
    fn test_transport_classification() {
        let conn = XapiError::Connection {
            host: "h".to_string(),
            reason: "refused".to_string(),
        };
        let auth = XapiError::Auth {
            host: "h".to_string(),
            reason: "Invalid credentials".to_string(),
        };
        let parse = XapiError::parse("h", "missing result");
        assert!(conn.is_transport());
        assert!(auth.is_transport());
        assert!(!parse.is_transport());
        assert_eq!(parse.host(), "h");
    }
}
