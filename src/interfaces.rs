//! Event interfaces.
//!
//! An interface turns a captured error into one named fragment of the event,
//! e.g. `sentry.interfaces.Exception`. Interfaces are registered on the
//! client and invoked in registration order for every captured error.

use std::fmt;

use serde_json::{json, Value};
use thiserror::Error;

/// Top-level event fields an interface may not write.
pub const RESERVED_KEYS: &[&str] = &[
    "event_id",
    "project",
    "message",
    "level",
    "timestamp",
    "server_name",
    "checksum",
    "modules",
];

/// Errors raised by an interface while producing its fragment.
#[derive(Debug, Error)]
pub enum FragmentError {
    #[error("Interface {key} cannot handle this error: {reason}")]
    Unsupported { key: String, reason: String },

    #[error("Interface failed: {0}")]
    Failed(String),
}

/// Registration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Interface key {0:?} collides with a reserved event field")]
    ReservedKey(String),
}

/// A captured error, reduced to what interfaces can see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// Short type name, e.g. `ParseIntError`.
    pub type_name: String,
    /// `Display` output of the error.
    pub value: String,
    /// `Display` output of each error in the `source()` chain.
    pub sources: Vec<String>,
}

impl ErrorReport {
    pub fn new(type_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            value: value.into(),
            sources: Vec::new(),
        }
    }

    /// Captures an error's type name, message and source chain.
    pub fn from_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        let mut sources = Vec::new();
        let mut next = err.source();
        while let Some(source) = next {
            sources.push(source.to_string());
            next = source.source();
        }
        Self {
            type_name: short_type_name(std::any::type_name::<E>()).to_string(),
            value: err.to_string(),
            sources,
        }
    }

    /// Event message for this error: `"<Type>: <message>"`.
    pub fn message(&self) -> String {
        format!("{}: {}", self.type_name, self.value)
    }
}

/// Strips module paths, keeping generic arguments readable:
/// `std::num::ParseIntError` → `ParseIntError`.
///
/// Trait objects have no concrete name; `dyn Error + Send + Sync` and
/// friends report as `Error`.
fn short_type_name(full: &str) -> &str {
    if let Some(object) = full.strip_prefix("dyn ") {
        let principal = object.split(" + ").next().unwrap_or(object);
        let name = short_type_name(principal);
        return if name.is_empty() { "Error" } else { name };
    }
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

/// Produces a single event fragment from a captured error.
pub trait Interface: Send + Sync {
    /// Wire key the fragment is stored under.
    fn key(&self) -> &str;

    fn produce(&self, error: &ErrorReport) -> Result<Value, FragmentError>;
}

impl fmt::Debug for dyn Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Interface({})", self.key())
    }
}

/// `sentry.interfaces.Exception`: `{type, value}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionInterface;

impl ExceptionInterface {
    pub const KEY: &'static str = "sentry.interfaces.Exception";
}

impl Interface for ExceptionInterface {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn produce(&self, error: &ErrorReport) -> Result<Value, FragmentError> {
        Ok(json!({
            "type": error.type_name,
            "value": error.value,
        }))
    }
}

/// Ordered set of interfaces with unique keys.
#[derive(Debug, Default)]
pub struct Interfaces {
    entries: Vec<Box<dyn Interface>>,
}

impl Interfaces {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in exception interface.
    pub fn with_defaults() -> Self {
        let mut interfaces = Self::new();
        interfaces.entries.push(Box::new(ExceptionInterface));
        interfaces
    }

    /// Adds an interface. An existing interface with the same key is
    /// replaced in place, keeping its position.
    pub fn register(&mut self, interface: Box<dyn Interface>) -> Result<(), RegistryError> {
        let key = interface.key();
        if RESERVED_KEYS.contains(&key) {
            return Err(RegistryError::ReservedKey(key.to_string()));
        }
        match self.entries.iter().position(|e| e.key() == key) {
            Some(idx) => self.entries[idx] = interface,
            None => self.entries.push(interface),
        }
        Ok(())
    }

    /// Removes the interface registered under `key`, returning whether one existed.
    pub fn unregister(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.key() != key);
        self.entries.len() != before
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Interface> {
        self.entries.iter().map(|e| e.as_ref())
    }
}
