//! The reporting client.
//!
//! [`Client`] owns the parsed DSN, the transport and the interface registry.
//! Every capture builds an event synchronously, then delivers it on a tokio
//! task and reports the outcome to registered listeners as either a
//! `logged` or an `error` notification.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::auth;
use crate::dsn::{Dsn, DsnError};
use crate::event::{build_payload, EventContext, Level, PayloadError, Report};
use crate::interfaces::{ErrorReport, Interface, Interfaces, RegistryError};
use crate::transport::{TransportError, TransportKind, TransportOptions};

/// Environment variable holding the default DSN.
pub const DSN_ENV: &str = "SENTRY_DSN";
/// Environment variable holding the default client name.
pub const NAME_ENV: &str = "SENTRY_NAME";

/// Client construction errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Dsn(#[from] DsnError),

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failures reported through the `error` notification.
#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("No tokio runtime available to deliver the event")]
    NoRuntime,

    #[error("Delivery task aborted: {0}")]
    Aborted(String),
}

/// Client configuration.
///
/// Values left unset are filled from the environment once, when the client
/// is built with [`Client::new`].
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub dsn: Option<String>,
    pub name: Option<String>,
    /// Log a warning when no DSN is configured.
    pub warn_when_disabled: bool,
    /// HTTP request timeout.
    pub timeout: Option<Duration>,
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dsn(mut self, dsn: impl Into<String>) -> Self {
        self.dsn = Some(dsn.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn warn_when_disabled(mut self, warn: bool) -> Self {
        self.warn_when_disabled = warn;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fills unset `dsn` and `name` from `SENTRY_DSN` and `SENTRY_NAME`.
    pub fn resolve_from_env(self) -> Self {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Fills unset `dsn` and `name` using `lookup` for variable access.
    pub fn resolve_with<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.dsn.is_none() {
            self.dsn = lookup(DSN_ENV);
        }
        if self.name.is_none() {
            self.name = lookup(NAME_ENV);
        }
        self
    }
}

/// Notification names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Logged,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logged => "logged",
            Self::Error => "error",
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "logged" => Ok(Self::Logged),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown event: {}", other)),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a delivered (or attempted) event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    pub id: String,
    pub checksum: String,
}

/// Notification delivered to listeners.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Logged(Captured),
    Error(Arc<SendError>),
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Logged(_) => EventKind::Logged,
            Self::Error(_) => EventKind::Error,
        }
    }
}

/// Handle returned by [`Client::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    entries: RwLock<Vec<(ListenerId, EventKind, Listener)>>,
}

impl Listeners {
    fn add(&self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, kind, listener));
        id
    }

    fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(entry_id, _, _)| *entry_id != id);
        entries.len() != before
    }

    fn emit(&self, event: &ClientEvent) {
        let kind = event.kind();
        // Snapshot so listeners may (un)subscribe while being called.
        let matching: Vec<Listener> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, listener)| listener.clone())
            .collect();
        for listener in matching {
            listener(event);
        }
    }
}

/// Pending delivery of one captured event.
#[derive(Debug)]
pub struct Capture {
    captured: Captured,
    task: JoinHandle<Result<Captured, Arc<SendError>>>,
}

impl Capture {
    /// Event id, available before delivery completes.
    pub fn id(&self) -> &str {
        &self.captured.id
    }

    pub fn captured(&self) -> &Captured {
        &self.captured
    }

    /// Waits for the delivery outcome. Dropping the handle instead leaves
    /// delivery running in the background.
    pub async fn join(self) -> Result<Captured, Arc<SendError>> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(Arc::new(SendError::Aborted(e.to_string()))),
        }
    }
}

#[derive(Debug, Clone)]
struct Target {
    dsn: Arc<Dsn>,
    transport: TransportKind,
}

/// Error and message reporting client.
pub struct Client {
    name: String,
    target: Option<Target>,
    interfaces: Interfaces,
    listeners: Arc<Listeners>,
}

impl Client {
    /// Builds a client, filling unset options from the environment.
    ///
    /// A missing or empty DSN yields a disabled client; an invalid one is
    /// an error.
    pub fn new(options: ClientOptions) -> Result<Self, ClientError> {
        Self::from_options(options.resolve_from_env())
    }

    /// Builds a client from options exactly as given.
    pub fn from_options(options: ClientOptions) -> Result<Self, ClientError> {
        let name = options.name.clone().unwrap_or_else(default_name);

        let dsn = options
            .dsn
            .as_deref()
            .map(str::trim)
            .filter(|dsn| !dsn.is_empty());

        let target = match dsn {
            Some(dsn) => {
                let dsn = Dsn::parse(dsn)?;
                let transport = TransportKind::for_dsn(
                    &dsn,
                    &TransportOptions {
                        timeout: options.timeout,
                    },
                )?;
                Some(Target {
                    dsn: Arc::new(dsn),
                    transport,
                })
            }
            None => {
                if options.warn_when_disabled {
                    tracing::warn!("No DSN configured, event reporting is disabled");
                } else {
                    tracing::debug!("No DSN configured, event reporting is disabled");
                }
                None
            }
        };

        Ok(Self {
            name,
            target,
            interfaces: Interfaces::with_defaults(),
            listeners: Arc::new(Listeners::default()),
        })
    }

    /// Client with no DSN. Captures are no-ops.
    pub fn disabled() -> Self {
        Self {
            name: default_name(),
            target: None,
            interfaces: Interfaces::with_defaults(),
            listeners: Arc::new(Listeners::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    pub fn dsn(&self) -> Option<&Dsn> {
        self.target.as_ref().map(|t| t.dsn.as_ref())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interfaces(&self) -> &Interfaces {
        &self.interfaces
    }

    pub fn register_interface(&mut self, interface: Box<dyn Interface>) -> Result<(), RegistryError> {
        self.interfaces.register(interface)
    }

    pub fn unregister_interface(&mut self, key: &str) -> bool {
        self.interfaces.unregister(key)
    }

    /// Subscribes to a notification.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.listeners.add(kind, Arc::new(listener))
    }

    /// Unsubscribes a listener, returning whether it was registered.
    pub fn off(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Reports a plain text message at `error` level.
    ///
    /// Returns `None` when the client is disabled or no tokio runtime is
    /// running; otherwise delivery proceeds in the background.
    pub fn capture_message(&self, message: impl Into<String>) -> Option<Capture> {
        self.capture_message_at(message, Level::Error)
    }

    pub fn capture_message_at(&self, message: impl Into<String>, level: Level) -> Option<Capture> {
        self.capture(Report::Message(message.into()), level)
    }

    /// Reports an error at `error` level.
    pub fn capture_error<E>(&self, error: &E) -> Option<Capture>
    where
        E: std::error::Error + ?Sized,
    {
        self.capture_error_at(error, Level::Error)
    }

    pub fn capture_error_at<E>(&self, error: &E, level: Level) -> Option<Capture>
    where
        E: std::error::Error + ?Sized,
    {
        self.capture(Report::Error(ErrorReport::from_error(error)), level)
    }

    /// Captures an already reduced error report.
    pub fn capture_report(&self, report: ErrorReport, level: Level) -> Option<Capture> {
        self.capture(Report::Error(report), level)
    }

    /// Correlation token for a captured event.
    pub fn get_ident(result: &Captured) -> &str {
        &result.id
    }

    fn capture(&self, report: Report, level: Level) -> Option<Capture> {
        let target = self.target.as_ref()?;

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("Event dropped: no tokio runtime");
                self.listeners
                    .emit(&ClientEvent::Error(Arc::new(SendError::NoRuntime)));
                return None;
            }
        };

        let context = EventContext {
            project: target.dsn.project_id,
            server_name: self.name.clone(),
        };
        let payload = build_payload(&report, level, &context, &self.interfaces);
        let captured = match &payload {
            Ok(payload) => Captured {
                id: payload.event.event_id.clone(),
                checksum: payload.event.checksum.clone(),
            },
            Err(_) => Captured {
                id: String::new(),
                checksum: String::new(),
            },
        };

        let target = target.clone();
        let listeners = Arc::clone(&self.listeners);
        let result = captured.clone();

        let task = runtime.spawn(async move {
            let outcome = match payload {
                Ok(payload) => {
                    let auth = auth::sign(&target.dsn, Utc::now().timestamp());
                    target
                        .transport
                        .send(&target.dsn, &auth, &payload.body)
                        .await
                        .map_err(SendError::from)
                }
                Err(e) => Err(SendError::from(e)),
            };

            match outcome {
                Ok(()) => {
                    tracing::info!(event_id = %result.id, "Event delivered");
                    listeners.emit(&ClientEvent::Logged(result.clone()));
                    Ok(result)
                }
                Err(e) => {
                    tracing::warn!(event_id = %result.id, error = %e, "Event delivery failed");
                    let e = Arc::new(e);
                    listeners.emit(&ClientEvent::Error(Arc::clone(&e)));
                    Err(e)
                }
            }
        });

        Some(Capture { captured, task })
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.name)
            .field("dsn", &self.dsn())
            .field("interfaces", &self.interfaces)
            .finish()
    }
}

fn default_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}
