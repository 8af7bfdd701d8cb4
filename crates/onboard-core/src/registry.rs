//! Device table on the active controller.
//!
//! Presence is structural: a device is known when the config read returns an
//! `entry` element. A failed read is an error, never "absent"; otherwise an
//! unreachable controller would look like an empty device table.

use onboard_xapi::escape_xml;
use serde::Serialize;

use crate::config::DeviceId;
use crate::error::{OnboardError, OnboardResult};
use crate::obs;
use crate::resolver::ActiveController;

/// Config path of the managed-device table.
pub const DEVICES_XPATH: &str = "/config/mgt-config/devices";

/// Config path of one device entry.
pub fn device_xpath(id: &DeviceId) -> String {
    format!("{DEVICES_XPATH}/entry[@name='{}']", id.as_str())
}

/// Element that creates a device entry.
pub fn device_element(id: &DeviceId) -> String {
    format!("<entry name='{}'/>", escape_xml(id.as_str()))
}

/// Result of a presence lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Found,
    NotFound,
}

/// What the run did for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceAction {
    /// Already registered; nothing written
    Skipped,
    /// Entry created on the controller
    Registered,
    /// Absent, but the run was check-only
    Planned,
}

/// Per-device outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationOutcome {
    pub identifier: DeviceId,
    pub already_present: bool,
    /// Controller response to the registration, if one was made
    pub message: Option<String>,
    pub action: DeviceAction,
}

impl RegistrationOutcome {
    pub fn present(identifier: DeviceId) -> Self {
        RegistrationOutcome {
            identifier,
            already_present: true,
            message: None,
            action: DeviceAction::Skipped,
        }
    }

    pub fn registered(identifier: DeviceId, message: String) -> Self {
        RegistrationOutcome {
            identifier,
            already_present: false,
            message: Some(message),
            action: DeviceAction::Registered,
        }
    }

    pub fn planned(identifier: DeviceId) -> Self {
        RegistrationOutcome {
            identifier,
            already_present: false,
            message: None,
            action: DeviceAction::Planned,
        }
    }

    /// `true` when this outcome wrote to the candidate configuration.
    pub fn needs_commit(&self) -> bool {
        self.action == DeviceAction::Registered
    }
}

/// Device lookups and registrations against the active controller.
pub struct DeviceRegistry<'a> {
    controller: &'a ActiveController,
}

impl<'a> DeviceRegistry<'a> {
    pub fn new(controller: &'a ActiveController) -> Self {
        Self { controller }
    }

    /// Is `id` already in the device table?
    pub async fn lookup(&self, id: &DeviceId) -> OnboardResult<Presence> {
        let resp = self
            .controller
            .client()
            .config_get(&device_xpath(id))
            .await?;
        let presence = if resp.exists("result/entry") {
            Presence::Found
        } else {
            Presence::NotFound
        };
        obs::emit_device_checked(id.as_str(), presence == Presence::Found);
        Ok(presence)
    }

    /// Create the entry for `id` and return the controller's message.
    ///
    /// Not idempotent on the controller side; callers look up first. A reply
    /// without a `<msg>` is a parse error.
    pub async fn register(&self, id: &DeviceId) -> OnboardResult<String> {
        let resp = self
            .controller
            .client()
            .config_set(DEVICES_XPATH, &device_element(id))
            .await?;
        let message = resp.message().ok_or_else(|| OnboardError::Parse {
            host: resp.host().to_string(),
            detail: format!("registration of {id} returned no message"),
        })?;
        obs::emit_device_registered(id.as_str(), &message);
        Ok(message)
    }

    /// Lookup only: what a run would do for `id`.
    pub async fn check(&self, id: &DeviceId) -> OnboardResult<RegistrationOutcome> {
        Ok(match self.lookup(id).await? {
            Presence::Found => RegistrationOutcome::present(id.clone()),
            Presence::NotFound => RegistrationOutcome::planned(id.clone()),
        })
    }
}
