//! HTTPS client for the controller XML API (`/api/`).
//!
//! Requests are form-encoded POSTs; the API key travels in the `X-PAN-KEY`
//! header. Commits are made synchronous by polling the job until it reports
//! `FIN`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::client::{
    CommitResponse, ControllerClient, ControllerConnector, ControllerEndpoint, Credentials,
    XapiSettings,
};
use crate::error::{XapiError, XapiResult};
use crate::xml::{escape_xml, op_command_xml, XmlResponse};

/// Builds the `/api/` URL for an endpoint address.
///
/// Bare hosts get `https://`; explicit `http(s)://` URLs are kept.
pub fn api_url(address: &str) -> String {
    let base = if address.starts_with("http://") || address.starts_with("https://") {
        address.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", address.trim_end_matches('/'))
    };
    if base.ends_with("/api") {
        format!("{base}/")
    } else {
        format!("{base}/api/")
    }
}

/// Connector that authenticates against real controller nodes.
pub struct XapiConnector {
    credentials: Credentials,
    settings: XapiSettings,
    http: reqwest::Client,
}

impl XapiConnector {
    /// Create a connector sharing one HTTP connection pool for all nodes.
    pub fn new(credentials: Credentials, settings: XapiSettings) -> XapiResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("pano-onboard/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .danger_accept_invalid_certs(!settings.verify_tls)
            .build()
            .map_err(|e| XapiError::Connection {
                host: "<local>".to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(XapiConnector {
            credentials,
            settings,
            http,
        })
    }

    async fn keygen(&self, host: &str, url: &str) -> XapiResult<String> {
        let password = self
            .credentials
            .password
            .as_deref()
            .ok_or_else(|| XapiError::Auth {
                host: host.to_string(),
                reason: "no password or API key configured".to_string(),
            })?;

        let params = [
            ("type", "keygen"),
            ("user", self.credentials.username.as_str()),
            ("password", password),
        ];
        let resp = send(&self.http, host, url, None, &params)
            .await
            .map_err(|e| match e {
                XapiError::Api { host, message, .. } => XapiError::Auth {
                    host,
                    reason: message,
                },
                other => other,
            })?;
        resp.require_text("result/key")
    }
}

#[async_trait]
impl ControllerConnector for XapiConnector {
    async fn connect(
        &self,
        endpoint: &ControllerEndpoint,
    ) -> XapiResult<Arc<dyn ControllerClient>> {
        let host = endpoint.address().to_string();
        let url = api_url(&host);

        let key = match &self.credentials.api_key {
            Some(key) => key.clone(),
            None => self.keygen(&host, &url).await?,
        };
        debug!(host = %host, "authenticated with controller");

        Ok(Arc::new(XapiClient {
            host,
            url,
            key,
            http: self.http.clone(),
            poll_interval: Duration::from_secs(self.settings.commit_poll_interval_secs),
            commit_timeout: Duration::from_secs(self.settings.commit_timeout_secs),
        }))
    }
}

/// Authenticated connection to one controller node.
pub struct XapiClient {
    host: String,
    url: String,
    key: String,
    http: reqwest::Client,
    poll_interval: Duration,
    commit_timeout: Duration,
}

impl XapiClient {
    async fn request(&self, params: &[(&str, &str)]) -> XapiResult<XmlResponse> {
        send(&self.http, &self.host, &self.url, Some(&self.key), params).await
    }

    async fn wait_for_job(&self, job_id: &str) -> XapiResult<CommitResponse> {
        let started = Instant::now();
        let cmd = format!("<show><jobs><id>{}</id></jobs></show>", escape_xml(job_id));
        loop {
            let resp = self.op(&cmd).await?;
            let status = resp.text("result/job/status").unwrap_or_default();
            debug!(host = %self.host, job_id = %job_id, status = %status, "polled commit job");
            if status == "FIN" {
                return CommitResponse::from_job(job_id, &resp);
            }
            if started.elapsed() >= self.commit_timeout {
                return Err(XapiError::Timeout {
                    host: self.host.clone(),
                    job_id: job_id.to_string(),
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl ControllerClient for XapiClient {
    fn host(&self) -> &str {
        &self.host
    }

    async fn op(&self, cmd: &str) -> XapiResult<XmlResponse> {
        let cmd = op_command_xml(cmd);
        self.request(&[("type", "op"), ("cmd", cmd.as_str())]).await
    }

    async fn config_get(&self, xpath: &str) -> XapiResult<XmlResponse> {
        self.request(&[("type", "config"), ("action", "get"), ("xpath", xpath)])
            .await
    }

    async fn config_set(&self, xpath: &str, element: &str) -> XapiResult<XmlResponse> {
        self.request(&[
            ("type", "config"),
            ("action", "set"),
            ("xpath", xpath),
            ("element", element),
        ])
        .await
    }

    async fn commit(&self, cmd: &str) -> XapiResult<CommitResponse> {
        let resp = self.request(&[("type", "commit"), ("cmd", cmd)]).await?;
        match resp.text("result/job") {
            Some(job_id) if !job_id.is_empty() => {
                info!(host = %self.host, job_id = %job_id, "commit job enqueued");
                self.wait_for_job(&job_id).await
            }
            _ => Ok(CommitResponse::without_job(&resp)),
        }
    }
}

async fn send(
    http: &reqwest::Client,
    host: &str,
    url: &str,
    key: Option<&str>,
    params: &[(&str, &str)],
) -> XapiResult<XmlResponse> {
    let mut request = http.post(url).form(params);
    if let Some(key) = key {
        request = request.header("X-PAN-KEY", key);
    }

    let response = request.send().await.map_err(|e| XapiError::Connection {
        host: host.to_string(),
        reason: e.to_string(),
    })?;
    let status = response.status();
    let body = response.text().await.map_err(|e| XapiError::Connection {
        host: host.to_string(),
        reason: e.to_string(),
    })?;

    if status == StatusCode::FORBIDDEN || status == StatusCode::UNAUTHORIZED {
        let reason = XmlResponse::parse(host, body.as_str())
            .ok()
            .and_then(|r| r.message())
            .unwrap_or_else(|| status.to_string());
        return Err(XapiError::Auth {
            host: host.to_string(),
            reason,
        });
    }

    match XmlResponse::parse(host, body) {
        Ok(parsed) => parsed.into_checked(),
        Err(_) if !status.is_success() => Err(XapiError::Connection {
            host: host.to_string(),
            reason: format!("HTTP {status}"),
        }),
        Err(e) => Err(e),
    }
}
