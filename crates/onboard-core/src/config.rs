//! Run configuration.
//!
//! Loaded once (TOML file plus command-line overrides), validated, and then
//! shared read-only as `Arc<OnboardConfig>` for the whole run.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use onboard_xapi::{ControllerEndpoint, Credentials, XapiSettings};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::commit::DEFAULT_COMMIT_DESCRIPTION;
use crate::error::{OnboardError, OnboardResult};

/// Serial number (or other unique identifier) of a device to onboard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        DeviceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifiers are embedded verbatim in config xpaths, so quoting and
    /// markup characters are refused.
    fn check(&self) -> Result<(), String> {
        if self.0.is_empty() {
            return Err("device identifier must not be empty".to_string());
        }
        if is_placeholder(&self.0) {
            return Err(format!("device identifier {} is a placeholder", self.0));
        }
        if let Some(bad) = self
            .0
            .chars()
            .find(|c| c.is_whitespace() || matches!(c, '\'' | '"' | '<' | '>' | '&' | '[' | ']'))
        {
            return Err(format!(
                "device identifier {:?} contains forbidden character {:?}",
                self.0, bad
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commit scoping options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitSettings {
    /// Description attached to the partial commit
    pub description: String,
    /// Administrator whose changes are committed (defaults to the login user)
    pub admin: Option<String>,
}

impl Default for CommitSettings {
    fn default() -> Self {
        CommitSettings {
            description: DEFAULT_COMMIT_DESCRIPTION.to_string(),
            admin: None,
        }
    }
}

/// Everything a run needs: where the controllers are, how to log in, and
/// which devices to register.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OnboardConfig {
    /// Candidate controller nodes in preference order
    #[serde(default)]
    pub controllers: Vec<ControllerEndpoint>,
    /// Devices to register, in reporting order
    #[serde(default)]
    pub devices: Vec<DeviceId>,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub client: XapiSettings,
    #[serde(default)]
    pub commit: CommitSettings,
}

/// Values supplied on the command line or through the environment.
///
/// Non-empty lists replace the file's lists; set options replace the
/// file's values.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub controllers: Vec<String>,
    pub devices: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_key: Option<String>,
}

impl OnboardConfig {
    /// Parse a TOML document. The result is not yet validated.
    pub fn from_toml_str(raw: &str) -> OnboardResult<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Read and parse a TOML file. The result is not yet validated.
    pub fn load(path: &Path) -> OnboardResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if !overrides.controllers.is_empty() {
            self.controllers = overrides
                .controllers
                .into_iter()
                .map(ControllerEndpoint::new)
                .collect();
        }
        if !overrides.devices.is_empty() {
            self.devices = overrides.devices.into_iter().map(DeviceId::new).collect();
        }
        if let Some(username) = overrides.username {
            self.credentials.username = username;
        }
        if let Some(password) = overrides.password {
            self.credentials.password = Some(password);
        }
        if let Some(api_key) = overrides.api_key {
            self.credentials.api_key = Some(api_key);
        }
    }

    /// Administrator the partial commit is scoped to.
    pub fn acting_admin(&self) -> &str {
        self.commit
            .admin
            .as_deref()
            .unwrap_or(&self.credentials.username)
    }

    /// Check every value before any network call is made.
    pub fn validate(&self) -> OnboardResult<()> {
        self.validate_access()?;

        if self.devices.is_empty() {
            return Err(config_err("at least one device identifier is required"));
        }
        let mut seen = HashSet::new();
        for device in &self.devices {
            device.check().map_err(OnboardError::Config)?;
            if !seen.insert(device) {
                return Err(config_err(format!("device {device} is listed twice")));
            }
        }

        if self.commit.description.trim().is_empty() {
            return Err(config_err("commit.description must not be empty"));
        }
        if self.acting_admin().trim().is_empty() || is_placeholder(self.acting_admin()) {
            return Err(config_err("commit.admin must not be empty"));
        }
        Ok(())
    }

    /// Controllers, credentials and client settings only; enough to
    /// inspect nodes without registering anything.
    pub fn validate_access(&self) -> OnboardResult<()> {
        if self.controllers.is_empty() {
            return Err(config_err("at least one controller address is required"));
        }
        let mut seen = HashSet::new();
        for endpoint in &self.controllers {
            let address = endpoint.address();
            if address.trim().is_empty() {
                return Err(config_err("controller address must not be empty"));
            }
            if is_placeholder(address) {
                return Err(config_err(format!(
                    "controller address {address} is a placeholder"
                )));
            }
            if !seen.insert(address) {
                return Err(config_err(format!(
                    "controller address {address} is listed twice"
                )));
            }
        }
        if self.controllers.len() == 1 {
            warn!(
                controller = %self.controllers[0],
                "only one controller configured; it must still report an active HA state"
            );
        }

        let creds = &self.credentials;
        if creds.username.trim().is_empty() || is_placeholder(&creds.username) {
            return Err(config_err("credentials.username must be set"));
        }
        let usable = |v: &Option<String>| {
            v.as_deref()
                .map(|s| !s.is_empty() && !is_placeholder(s))
                .unwrap_or(false)
        };
        if !usable(&creds.password) && !usable(&creds.api_key) {
            return Err(config_err(
                "either credentials.password or credentials.api_key must be set",
            ));
        }

        let client = &self.client;
        if client.timeout_secs == 0
            || client.commit_poll_interval_secs == 0
            || client.commit_timeout_secs == 0
        {
            return Err(config_err(
                "client.timeout_secs, client.commit_poll_interval_secs and \
                 client.commit_timeout_secs must be positive",
            ));
        }
        Ok(())
    }

    /// Validate and freeze the configuration for the run.
    pub fn into_shared(self) -> OnboardResult<Arc<Self>> {
        self.validate()?;
        Ok(Arc::new(self))
    }
}

/// `<SOMETHING>` values left over from a config template.
fn is_placeholder(value: &str) -> bool {
    let v = value.trim();
    v.len() > 2 && v.starts_with('<') && v.ends_with('>')
}

fn config_err(msg: impl Into<String>) -> OnboardError {
    OnboardError::Config(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
controllers = ["10.0.0.1", "10.0.0.2"]
devices = ["SN001", "SN002"]

[credentials]
username = "admin"
password = "secret"

[client]
verify_tls = false
"#;

    fn sample() -> OnboardConfig {
        OnboardConfig::from_toml_str(SAMPLE).unwrap()
    }

    #[test]
    fn test_parse_sample_with_defaults() {
        let config = sample();
        assert_eq!(config.controllers[1].address(), "10.0.0.2");
        assert_eq!(config.devices[0].as_str(), "SN001");
        assert!(!config.client.verify_tls);
        assert_eq!(config.client.commit_timeout_secs, 600);
        assert_eq!(config.commit.description, "Add Firewall Serial Numbers");
        assert_eq!(config.acting_admin(), "admin");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = OnboardConfig::load(file.path()).unwrap();
        assert_eq!(config.devices.len(), 2);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnboardConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, OnboardError::Io(_)));
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let err = OnboardConfig::from_toml_str("controllers = [").unwrap_err();
        assert!(matches!(err, OnboardError::Toml(_)));
    }

    #[test]
    fn test_placeholder_values_rejected() {
        let raw = r#"
controllers = ["<IP_ADDRESS1>", "<IP_ADDRESS2>"]
devices = ["<SERIAL_NUMBER>"]
[credentials]
username = "<USERNAME>"
password = "<PASSWORD>"
"#;
        let err = OnboardConfig::from_toml_str(raw)
            .unwrap()
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("placeholder"));
    }

    #[test]
    fn test_placeholder_password_counts_as_missing() {
        let mut config = sample();
        config.credentials.password = Some("<PASSWORD>".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("password"));

        config.credentials.api_key = Some("LUFRPT1abc".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_lists_rejected() {
        let mut config = sample();
        config.devices.clear();
        assert!(config.validate().is_err());

        let mut config = sample();
        config.controllers.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unsafe_identifier_rejected() {
        let mut config = sample();
        config.devices.push(DeviceId::new("SN0' or '1"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("forbidden character"));
    }

    #[test]
    fn test_duplicate_device_rejected() {
        let mut config = sample();
        config.devices.push(DeviceId::new("SN001"));
        assert!(config.validate().unwrap_err().to_string().contains("twice"));
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let mut config = sample();
        config.apply_overrides(ConfigOverrides {
            controllers: vec!["192.168.1.10".to_string()],
            devices: vec!["SN999".to_string()],
            username: Some("ops".to_string()),
            password: None,
            api_key: Some("KEY".to_string()),
        });
        assert_eq!(config.controllers, vec![ControllerEndpoint::new("192.168.1.10")]);
        assert_eq!(config.devices, vec![DeviceId::new("SN999")]);
        assert_eq!(config.acting_admin(), "ops");
        assert_eq!(config.credentials.password.as_deref(), Some("secret"));
        assert_eq!(config.credentials.api_key.as_deref(), Some("KEY"));
    }

    #[test]
    fn test_explicit_commit_admin() {
        let mut config = sample();
        config.commit.admin = Some("automation".to_string());
        assert_eq!(config.acting_admin(), "automation");
    }

    #[test]
    fn test_example_file_parses_but_needs_editing() {
        let config =
            OnboardConfig::from_toml_str(include_str!("../../../onboard.example.toml")).unwrap();
        assert_eq!(config.controllers.len(), 2);
        assert_eq!(config.client, XapiSettings::default());
        assert_eq!(config.commit, CommitSettings::default());
        assert!(config.validate().unwrap_err().to_string().contains("placeholder"));
    }

    #[test]
    fn test_zero_client_durations_rejected() {
        let mut config = sample();
        config.client.commit_timeout_secs = 0;
        let err = config.validate_access().unwrap_err();
        assert!(err.to_string().contains("client.commit_timeout_secs"));

        let mut config = sample();
        config.client.commit_poll_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_access_check_ignores_devices() {
        let mut config = sample();
        config.devices.clear();
        assert!(config.validate_access().is_ok());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_into_shared_validates() {
        let mut config = sample();
        config.credentials.username.clear();
        assert!(config.into_shared().is_err());
        assert!(sample().into_shared().is_ok());
    }
}
