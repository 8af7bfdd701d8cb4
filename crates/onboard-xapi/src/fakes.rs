//! In-memory fakes for the controller seams (testing only)
//!
//! `FakeController` answers with the same XML shapes a real controller
//! produces, so the parsing paths are exercised end to end. Every call is
//! recorded for assertions.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::client::{CommitResponse, ControllerClient, ControllerConnector, ControllerEndpoint};
use crate::error::{XapiError, XapiResult};
use crate::xml::{escape_xml, XmlResponse};

/// One RPC observed by a [`FakeController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Op(String),
    ConfigGet(String),
    ConfigSet { xpath: String, element: String },
    Commit(String),
}

#[derive(Debug, Clone)]
enum CommitReply {
    Job { result: String, lines: Vec<String> },
    Message(String),
}

#[derive(Debug)]
struct FakeState {
    ha_state: Option<String>,
    hostname: Option<String>,
    devices: BTreeSet<String>,
    calls: Vec<RecordedCall>,
    commit_reply: CommitReply,
    config_get_error: Option<XapiError>,
    set_error: Option<String>,
    rejected_devices: HashMap<String, String>,
    silent_set: bool,
}

// ---------------------------------------------------------------------------
// FakeController
// ---------------------------------------------------------------------------

/// In-memory controller node holding an HA state and a device table.
#[derive(Debug)]
pub struct FakeController {
    host: String,
    state: Mutex<FakeState>,
}

impl FakeController {
    /// A node with no HA configured, hostname `pano-<host>`, and no devices.
    pub fn new(host: &str) -> Self {
        FakeController {
            host: host.to_string(),
            state: Mutex::new(FakeState {
                ha_state: None,
                hostname: Some(format!("pano-{host}")),
                devices: BTreeSet::new(),
                calls: Vec::new(),
                commit_reply: CommitReply::Job {
                    result: "OK".to_string(),
                    lines: vec!["Configuration committed successfully".to_string()],
                },
                config_get_error: None,
                set_error: None,
                rejected_devices: HashMap::new(),
                silent_set: false,
            }),
        }
    }

    pub fn with_ha_state(self, state: &str) -> Self {
        self.state.lock().unwrap().ha_state = Some(state.to_string());
        self
    }

    pub fn with_hostname(self, hostname: &str) -> Self {
        self.state.lock().unwrap().hostname = Some(hostname.to_string());
        self
    }

    /// `show system info` answers without a hostname element.
    pub fn without_hostname(self) -> Self {
        self.state.lock().unwrap().hostname = None;
        self
    }

    pub fn with_devices<I, S>(self, devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .lock()
            .unwrap()
            .devices
            .extend(devices.into_iter().map(Into::into));
        self
    }

    /// Commit jobs finish with `result` and one detail line per message.
    pub fn with_commit_job(self, result: &str, lines: &[&str]) -> Self {
        self.state.lock().unwrap().commit_reply = CommitReply::Job {
            result: result.to_string(),
            lines: lines.iter().map(|l| l.to_string()).collect(),
        };
        self
    }

    /// Commits are answered with a single `<msg>` and no job.
    pub fn with_commit_message(self, message: &str) -> Self {
        self.state.lock().unwrap().commit_reply = CommitReply::Message(message.to_string());
        self
    }

    /// Every config read fails with `err`.
    pub fn failing_config_get(self, err: XapiError) -> Self {
        self.state.lock().unwrap().config_get_error = Some(err);
        self
    }

    /// Every config write is rejected with `message`.
    pub fn rejecting_set(self, message: &str) -> Self {
        self.state.lock().unwrap().set_error = Some(message.to_string());
        self
    }

    /// Writes creating `device` are rejected with `message`; others succeed.
    pub fn rejecting_device(self, device: &str, message: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .rejected_devices
            .insert(device.to_string(), message.to_string());
        self
    }

    /// Successful writes are answered without a `<msg>` element.
    pub fn answering_set_without_message(self) -> Self {
        self.state.lock().unwrap().silent_set = true;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn devices(&self) -> Vec<String> {
        self.state.lock().unwrap().devices.iter().cloned().collect()
    }

    pub fn config_set_count(&self) -> usize {
        self.count(|c| matches!(c, RecordedCall::ConfigSet { .. }))
    }

    pub fn config_get_count(&self) -> usize {
        self.count(|c| matches!(c, RecordedCall::ConfigGet(_)))
    }

    pub fn commit_count(&self) -> usize {
        self.count(|c| matches!(c, RecordedCall::Commit(_)))
    }

    /// Number of calls that touch the device table or commit.
    pub fn device_call_count(&self) -> usize {
        self.config_get_count() + self.config_set_count() + self.commit_count()
    }

    /// Commit commands received, in order.
    pub fn commit_commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RecordedCall::Commit(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&RecordedCall) -> bool) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|c| pred(*c)).count()
    }

    fn record(&self, call: RecordedCall) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn respond(&self, body: String) -> XapiResult<XmlResponse> {
        XmlResponse::parse(&self.host, body)?.into_checked()
    }
}

/// Pull the value of `marker...'` out of an xpath or element string.
fn quoted_after(haystack: &str, marker: &str) -> Option<String> {
    let start = haystack.find(marker)? + marker.len();
    let rest = &haystack[start..];
    let end = rest.find('\'')?;
    Some(rest[..end].to_string())
}

#[async_trait]
impl ControllerClient for FakeController {
    fn host(&self) -> &str {
        &self.host
    }

    async fn op(&self, cmd: &str) -> XapiResult<XmlResponse> {
        self.record(RecordedCall::Op(cmd.to_string()));
        let (ha_state, hostname) = {
            let state = self.state.lock().unwrap();
            (state.ha_state.clone(), state.hostname.clone())
        };

        let body = if cmd.contains("<high-availability>") {
            match ha_state {
                Some(s) => format!(
                    r#"<response status="success"><result><enabled>yes</enabled><local-info><state>{}</state></local-info></result></response>"#,
                    escape_xml(&s)
                ),
                None => r#"<response status="success"><result><enabled>no</enabled></result></response>"#
                    .to_string(),
            }
        } else if cmd == "show system info" || cmd.contains("<system><info>") {
            match hostname {
                Some(h) => format!(
                    r#"<response status="success"><result><system><hostname>{}</hostname><ip-address>{}</ip-address></system></result></response>"#,
                    escape_xml(&h),
                    escape_xml(&self.host)
                ),
                None => r#"<response status="success"><result><system></system></result></response>"#
                    .to_string(),
            }
        } else {
            r#"<response status="error" code="17"><msg><line>Invalid syntax.</line></msg></response>"#
                .to_string()
        };
        self.respond(body)
    }

    async fn config_get(&self, xpath: &str) -> XapiResult<XmlResponse> {
        self.record(RecordedCall::ConfigGet(xpath.to_string()));
        let present = {
            let state = self.state.lock().unwrap();
            if let Some(err) = &state.config_get_error {
                return Err(err.clone());
            }
            quoted_after(xpath, "entry[@name='")
                .and_then(|id| state.devices.contains(&id).then_some(id))
        };

        let body = match present {
            Some(id) => format!(
                r#"<response status="success" code="19"><result total-count="1" count="1"><entry name="{}" admin="admin" time="2024/01/01 00:00:00"/></result></response>"#,
                escape_xml(&id)
            ),
            None => r#"<response status="success" code="7"><result/></response>"#.to_string(),
        };
        self.respond(body)
    }

    async fn config_set(&self, xpath: &str, element: &str) -> XapiResult<XmlResponse> {
        self.record(RecordedCall::ConfigSet {
            xpath: xpath.to_string(),
            element: element.to_string(),
        });
        let body = {
            let mut state = self.state.lock().unwrap();
            let id = quoted_after(element, "name='");
            let rejection = state.set_error.clone().or_else(|| {
                id.as_ref()
                    .and_then(|id| state.rejected_devices.get(id).cloned())
            });
            match (rejection, id) {
                (Some(message), _) => format!(
                    r#"<response status="error" code="12"><msg><line>{}</line></msg></response>"#,
                    escape_xml(&message)
                ),
                (None, Some(id)) => {
                    state.devices.insert(id);
                    if state.silent_set {
                        r#"<response status="success" code="20"/>"#.to_string()
                    } else {
                        r#"<response status="success" code="20"><msg>command succeeded</msg></response>"#
                            .to_string()
                    }
                }
                (None, None) => {
                    r#"<response status="error" code="18"><msg>Malformed Request</msg></response>"#
                        .to_string()
                }
            }
        };
        self.respond(body)
    }

    async fn commit(&self, cmd: &str) -> XapiResult<CommitResponse> {
        self.record(RecordedCall::Commit(cmd.to_string()));
        let reply = self.state.lock().unwrap().commit_reply.clone();
        match reply {
            CommitReply::Job { result, lines } => {
                let details: String = lines
                    .iter()
                    .map(|l| format!("<line>{}</line>", escape_xml(l)))
                    .collect();
                let resp = self.respond(format!(
                    r#"<response status="success"><result><job><id>1</id><status>FIN</status><result>{}</result><details>{}</details></job></result></response>"#,
                    escape_xml(&result),
                    details
                ))?;
                CommitResponse::from_job("1", &resp)
            }
            CommitReply::Message(message) => {
                let resp = self.respond(format!(
                    r#"<response status="success" code="19"><msg>{}</msg></response>"#,
                    escape_xml(&message)
                ))?;
                Ok(CommitResponse::without_job(&resp))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FakeConnector
// ---------------------------------------------------------------------------

/// Hands out registered [`FakeController`]s by address; unknown addresses
/// are unreachable.
#[derive(Debug, Default)]
pub struct FakeConnector {
    nodes: HashMap<String, Arc<FakeController>>,
    rejected_logins: HashSet<String>,
    connects: Mutex<Vec<String>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, node: FakeController) -> Self {
        self.nodes.insert(node.host.clone(), Arc::new(node));
        self
    }

    /// Connections to `host` fail authentication.
    pub fn with_rejected_login(mut self, host: &str) -> Self {
        self.rejected_logins.insert(host.to_string());
        self
    }

    pub fn node(&self, host: &str) -> Option<Arc<FakeController>> {
        self.nodes.get(host).cloned()
    }

    /// Addresses passed to `connect`, in call order.
    pub fn connects(&self) -> Vec<String> {
        self.connects.lock().unwrap().clone()
    }
}

#[async_trait]
impl ControllerConnector for FakeConnector {
    async fn connect(
        &self,
        endpoint: &ControllerEndpoint,
    ) -> XapiResult<Arc<dyn ControllerClient>> {
        let host = endpoint.address();
        self.connects.lock().unwrap().push(host.to_string());

        if self.rejected_logins.contains(host) {
            return Err(XapiError::Auth {
                host: host.to_string(),
                reason: "Invalid credentials.".to_string(),
            });
        }
        match self.nodes.get(host) {
            Some(node) => Ok(node.clone() as Arc<dyn ControllerClient>),
            None => Err(XapiError::Connection {
                host: host.to_string(),
                reason: "no route to host".to_string(),
            }),
        }
    }
}
