//! Event envelope and payload building.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::compression::{encode_payload, CompressionError};
use crate::interfaces::{ErrorReport, Interfaces, RESERVED_KEYS};

/// Name this client reports itself under in `modules`.
pub const CLIENT_NAME: &str = "raven";

/// Payload building errors.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Failed to encode event: {0}")]
    Encode(#[from] CompressionError),
}

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Fatal,
    #[default]
    Error,
    Warning,
    Info,
    Debug,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fatal" => Ok(Self::Fatal),
            "error" => Ok(Self::Error),
            "warning" | "warn" => Ok(Self::Warning),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            other => Err(format!("unknown level: {}", other)),
        }
    }
}

/// What is being captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Message(String),
    Error(ErrorReport),
}

impl Report {
    pub fn message(&self) -> String {
        match self {
            Self::Message(text) => text.clone(),
            Self::Error(error) => error.message(),
        }
    }
}

/// The event envelope as sent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// 32 lowercase hex characters, unique per capture.
    pub event_id: String,
    pub project: u64,
    pub message: String,
    pub level: Level,
    /// UTC, ISO-8601 without fractional seconds.
    pub timestamp: String,
    pub server_name: String,
    /// Hex SHA-256 of `message`.
    pub checksum: String,
    /// Library name to version.
    pub modules: BTreeMap<String, String>,
    /// Interface fragments keyed by wire key.
    #[serde(flatten)]
    pub interfaces: Map<String, Value>,
}

/// Per-client values stamped into every event.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub project: u64,
    pub server_name: String,
}

/// Event plus its encoded body.
#[derive(Debug, Clone)]
pub struct Payload {
    pub event: Event,
    /// Base64 of the deflated JSON event.
    pub body: Vec<u8>,
}

impl Event {
    /// Assembles an event from a report. Interfaces only run for errors.
    ///
    /// A failing interface is skipped; the rest of the event is unaffected.
    pub fn build(
        report: &Report,
        level: Level,
        context: &EventContext,
        interfaces: &Interfaces,
    ) -> Self {
        Self::build_at(report, level, context, interfaces, Utc::now())
    }

    fn build_at(
        report: &Report,
        level: Level,
        context: &EventContext,
        interfaces: &Interfaces,
        now: DateTime<Utc>,
    ) -> Self {
        let message = report.message();

        let mut fragments = Map::new();
        if let Report::Error(error) = report {
            for interface in interfaces.iter() {
                let key = interface.key();
                if RESERVED_KEYS.contains(&key) {
                    tracing::warn!(key, "Skipping interface with reserved key");
                    continue;
                }
                match interface.produce(error) {
                    Ok(value) => {
                        fragments.insert(key.to_string(), value);
                    }
                    Err(e) => {
                        tracing::warn!(key, error = %e, "Interface failed, fragment skipped");
                    }
                }
            }
        }

        Self {
            event_id: new_event_id(),
            project: context.project,
            checksum: checksum(&message),
            message,
            level,
            timestamp: now.format("%Y-%m-%dT%H:%M:%S").to_string(),
            server_name: context.server_name.clone(),
            modules: BTreeMap::from([(CLIENT_NAME.to_string(), crate::VERSION.to_string())]),
            interfaces: fragments,
        }
    }

    /// Serializes, deflates and base64-encodes the event.
    pub fn encode(&self) -> Result<Vec<u8>, PayloadError> {
        Ok(encode_payload(self)?)
    }
}

/// Builds an event and encodes it for transit.
pub fn build_payload(
    report: &Report,
    level: Level,
    context: &EventContext,
    interfaces: &Interfaces,
) -> Result<Payload, PayloadError> {
    let event = Event::build(report, level, context, interfaces);
    let body = event.encode()?;
    Ok(Payload { event, body })
}

fn new_event_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn checksum(message: &str) -> String {
    hex::encode(Sha256::digest(message.as_bytes()))
}
