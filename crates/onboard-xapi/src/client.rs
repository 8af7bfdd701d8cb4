//! Controller RPC seams.
//!
//! These traits define the transport boundary the onboarding workflow is
//! written against:
//! - `ControllerClient`: operational queries, config get/set, synchronous commit
//! - `ControllerConnector`: opens an authenticated client for an endpoint
//!
//! [`crate::http::XapiConnector`] talks to a real controller over HTTPS;
//! [`crate::fakes`] provides in-memory stand-ins for tests.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::XapiResult;
use crate::xml::XmlResponse;

// ---------------------------------------------------------------------------
// Endpoint & credentials
// ---------------------------------------------------------------------------

/// Address of one controller node (IP, hostname, or full base URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControllerEndpoint {
    address: String,
}

impl ControllerEndpoint {
    pub fn new(address: impl Into<String>) -> Self {
        ControllerEndpoint {
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl std::fmt::Display for ControllerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// Credentials used to authenticate against every controller node.
///
/// An API key skips key generation; otherwise the password is exchanged for
/// a key on connect.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Credentials {
    pub fn with_password(username: &str, password: &str) -> Self {
        Credentials {
            username: username.to_string(),
            password: Some(password.to_string()),
            api_key: None,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Transport tuning for the HTTP client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XapiSettings {
    /// Verify the controller's TLS certificate
    pub verify_tls: bool,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Delay between commit job status polls
    pub commit_poll_interval_secs: u64,
    /// Give up waiting for a commit job after this long
    pub commit_timeout_secs: u64,
}

impl Default for XapiSettings {
    fn default() -> Self {
        XapiSettings {
            verify_tls: true,
            timeout_secs: 30,
            commit_poll_interval_secs: 2,
            commit_timeout_secs: 600,
        }
    }
}

// ---------------------------------------------------------------------------
// Commit response
// ---------------------------------------------------------------------------

/// Final state of a synchronous commit.
///
/// Controllers report either a single `<msg>` or a job with several
/// `<details><line>` entries; both are normalised into `messages`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResponse {
    pub job_id: Option<String>,
    pub status: String,
    pub messages: Vec<String>,
}

impl CommitResponse {
    /// Build from a finished `show jobs id` response.
    pub fn from_job(job_id: &str, resp: &XmlResponse) -> XapiResult<Self> {
        let status = resp.require_text("result/job/result")?;
        let mut messages = resp.texts("result/job/details/line");
        if messages.is_empty() {
            messages.extend(
                resp.text("result/job/details")
                    .filter(|details| !details.is_empty()),
            );
        }
        Ok(CommitResponse {
            job_id: Some(job_id.to_string()),
            status,
            messages,
        })
    }

    /// Build from a commit request the controller answered without a job,
    /// e.g. "There are no changes to commit."
    pub fn without_job(resp: &XmlResponse) -> Self {
        CommitResponse {
            job_id: None,
            status: "OK".to_string(),
            messages: resp.message().into_iter().collect(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status.eq_ignore_ascii_case("OK")
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// An authenticated connection to one controller node.
///
/// Every call suspends until the node answers or the transport fails.
/// Error-status responses surface as [`crate::XapiError::Api`].
#[async_trait]
pub trait ControllerClient: Send + Sync {
    /// Address this client is connected to.
    fn host(&self) -> &str;

    /// Run an operational command (XML or CLI-style text).
    async fn op(&self, cmd: &str) -> XapiResult<XmlResponse>;

    /// Read candidate configuration at `xpath`.
    async fn config_get(&self, xpath: &str) -> XapiResult<XmlResponse>;

    /// Merge `element` into candidate configuration at `xpath`.
    async fn config_set(&self, xpath: &str, element: &str) -> XapiResult<XmlResponse>;

    /// Submit a commit command and wait for the job to finish.
    async fn commit(&self, cmd: &str) -> XapiResult<CommitResponse>;
}

/// Opens authenticated [`ControllerClient`]s.
#[async_trait]
pub trait ControllerConnector: Send + Sync {
    async fn connect(&self, endpoint: &ControllerEndpoint)
        -> XapiResult<Arc<dyn ControllerClient>>;
}
