//! High-availability state of a controller node.

use std::sync::Arc;

use onboard_xapi::{ControllerClient, ControllerConnector, ControllerEndpoint};
use serde::{Serialize, Serializer};

use crate::error::{OnboardError, OnboardResult};

/// Operational query for the local HA state.
pub const HA_STATE_CMD: &str =
    "<show><high-availability><state></state></high-availability></show>";

/// Where the state token lives in the HA response.
pub const HA_STATE_PATH: &str = "result/local-info/state";

/// HA state tokens that make a node the source of truth.
pub const ACTIVE_STATES: [&str; 3] = ["active", "active-primary", "primary-active"];

/// State token reported by a controller node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HaState {
    Active,
    ActivePrimary,
    PrimaryActive,
    Passive,
    PassiveSecondary,
    SecondaryPassive,
    Initial,
    Tentative,
    Suspended,
    NonFunctional,
    /// Any token not listed above, kept verbatim
    Unknown(String),
}

impl HaState {
    /// Parse a state token (case-insensitive, surrounding whitespace ignored).
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        match token.to_ascii_lowercase().as_str() {
            "active" => HaState::Active,
            "active-primary" => HaState::ActivePrimary,
            "primary-active" => HaState::PrimaryActive,
            "passive" => HaState::Passive,
            "passive-secondary" => HaState::PassiveSecondary,
            "secondary-passive" => HaState::SecondaryPassive,
            "initial" => HaState::Initial,
            "tentative" => HaState::Tentative,
            "suspended" => HaState::Suspended,
            "non-functional" => HaState::NonFunctional,
            _ => HaState::Unknown(token.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            HaState::Active => "active",
            HaState::ActivePrimary => "active-primary",
            HaState::PrimaryActive => "primary-active",
            HaState::Passive => "passive",
            HaState::PassiveSecondary => "passive-secondary",
            HaState::SecondaryPassive => "secondary-passive",
            HaState::Initial => "initial",
            HaState::Tentative => "tentative",
            HaState::Suspended => "suspended",
            HaState::NonFunctional => "non-functional",
            HaState::Unknown(token) => token,
        }
    }

    /// Membership in [`ACTIVE_STATES`].
    pub fn is_active(&self) -> bool {
        ACTIVE_STATES.contains(&self.as_str())
    }
}

impl std::fmt::Display for HaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for HaState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Reads the HA state of a node through its own connection.
pub struct HaStateInspector {
    connector: Arc<dyn ControllerConnector>,
}

impl HaStateInspector {
    pub fn new(connector: Arc<dyn ControllerConnector>) -> Self {
        Self { connector }
    }

    /// Connect to `endpoint` and read its HA state. Single attempt.
    pub async fn inspect(&self, endpoint: &ControllerEndpoint) -> OnboardResult<HaState> {
        let client = self.connector.connect(endpoint).await?;
        Self::query(client.as_ref()).await
    }

    /// Read the HA state over an existing connection.
    pub async fn query(client: &dyn ControllerClient) -> OnboardResult<HaState> {
        let resp = client.op(HA_STATE_CMD).await?;
        let token = resp.require_text(HA_STATE_PATH)?;
        if token.is_empty() {
            return Err(OnboardError::Parse {
                host: client.host().to_string(),
                detail: format!("empty {HA_STATE_PATH}"),
            });
        }
        Ok(HaState::parse(&token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onboard_xapi::fakes::{FakeConnector, FakeController};

    #[test]
    fn test_active_set_membership() {
        for token in ACTIVE_STATES {
            assert!(HaState::parse(token).is_active(), "{token} should be active");
        }
        for token in [
            "passive",
            "passive-secondary",
            "secondary-passive",
            "suspended",
            "non-functional",
            "initial",
            "unknown",
            "",
        ] {
            assert!(!HaState::parse(token).is_active(), "{token} should not be active");
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(HaState::parse(" Active-Primary "), HaState::ActivePrimary);
        assert!(HaState::parse("ACTIVE").is_active());
    }

    #[test]
    fn test_unknown_token_round_trips() {
        let state = HaState::parse("split-brain");
        assert_eq!(state, HaState::Unknown("split-brain".to_string()));
        assert_eq!(state.to_string(), "split-brain");
        assert!(!state.is_active());
    }

    #[test]
    fn test_serializes_as_token() {
        let json = serde_json::to_string(&HaState::SecondaryPassive).unwrap();
        assert_eq!(json, "\"secondary-passive\"");
    }

    #[tokio::test]
    async fn test_inspect_reads_local_state() {
        let node = FakeController::new("10.0.0.1").with_ha_state("passive");
        let connector = Arc::new(FakeConnector::new().with_node(node));
        let inspector = HaStateInspector::new(connector.clone());

        let state = inspector
            .inspect(&ControllerEndpoint::new("10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(state, HaState::Passive);
        assert_eq!(connector.connects(), vec!["10.0.0.1".to_string()]);
    }

    #[tokio::test]
    async fn test_inspect_without_ha_is_parse_error() {
        let connector = Arc::new(FakeConnector::new().with_node(FakeController::new("10.0.0.1")));
        let inspector = HaStateInspector::new(connector);

        let err = inspector
            .inspect(&ControllerEndpoint::new("10.0.0.1"))
            .await
            .unwrap_err();
        assert!(matches!(err, OnboardError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_inspect_unreachable_is_connection_error() {
        let inspector = HaStateInspector::new(Arc::new(FakeConnector::new()));

        let err = inspector
            .inspect(&ControllerEndpoint::new("10.0.0.9"))
            .await
            .unwrap_err();
        assert!(matches!(err, OnboardError::Connection { .. }));
    }
}
