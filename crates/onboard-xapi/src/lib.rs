//! onboard-xapi: transport layer for Panorama-style management controllers
//!
//! This crate is the RPC boundary of the onboarding workflow. It defines the
//! `ControllerClient` / `ControllerConnector` seams, an HTTPS implementation
//! of the controller XML API, and in-memory fakes for tests.
//!
//! ## Layers
//!
//! - [`xml`]: `<response>` documents and path queries
//! - [`client`]: traits, endpoint/credential types, commit normalisation
//! - [`http`]: reqwest-backed client with key generation and job polling
//! - [`fakes`]: `FakeController` / `FakeConnector`

pub mod client;
pub mod error;
pub mod fakes;
pub mod http;
pub mod xml;

pub use client::{
    CommitResponse, ControllerClient, ControllerConnector, ControllerEndpoint, Credentials,
    XapiSettings,
};
pub use error::{XapiError, XapiResult};
pub use http::{api_url, XapiClient, XapiConnector};
pub use xml::{escape_xml, op_command_xml, XmlResponse};
