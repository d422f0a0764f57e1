//! Raven - error and event reporting client for Sentry-compatible servers
//!
//! Captures errors and free-text messages, frames them as compressed event
//! envelopes and delivers them to the endpoint named by a DSN over HTTP(S)
//! or UDP.
//!
//! # Features
//!
//! - DSN parsing with `SENTRY_DSN` / `SENTRY_NAME` environment fallback
//! - `X-Sentry-Auth` header signing
//! - zlib + base64 payload framing
//! - Pluggable event interfaces (`sentry.interfaces.Exception` built in)
//! - Asynchronous delivery with `logged` / `error` notifications
//!
//! # Example
//!
//! ```rust,no_run
//! use raven::{Client, ClientOptions, EventKind};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::new(ClientOptions::new()).unwrap();
//!     client.on(EventKind::Error, |event| eprintln!("failed to report: {:?}", event));
//!
//!     if let Some(capture) = client.capture_message("Hey!") {
//!         let _ = capture.join().await;
//!     }
//! }
//! ```

pub mod auth;
pub mod client;
pub mod compression;
pub mod dsn;
pub mod event;
pub mod interfaces;
pub mod transport;

pub use client::{
    Capture, Captured, Client, ClientError, ClientEvent, ClientOptions, EventKind, ListenerId,
    SendError, DSN_ENV, NAME_ENV,
};
pub use compression::{decode_payload, encode_payload, CompressionError};
pub use dsn::{Dsn, DsnError, Protocol};
pub use event::{build_payload, Event, EventContext, Level, Payload, PayloadError, Report};
pub use interfaces::{ErrorReport, ExceptionInterface, FragmentError, Interface, Interfaces};
pub use transport::{TransportError, TransportKind, TransportOptions};

/// Version of this client, reported in `modules` and `sentry_client`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
