//! Event delivery.
//!
//! Two transports exist, selected once from the DSN protocol:
//!
//! | Protocol | Transport | Success means |
//! |----------|-----------|---------------|
//! | `http`, `https` | single `POST {path}api/store/` | response status 200 |
//! | `udp` | single datagram `<auth>\n\n<payload>` | datagram accepted by the local stack |
//!
//! Neither transport retries. Each send is one network operation.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use thiserror::Error;
use tokio::net::UdpSocket;

use crate::dsn::{Dsn, Protocol};

/// Header carrying the auth signature.
pub const AUTH_HEADER: &str = "X-Sentry-Auth";

/// Delivery errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Reading response from {url} failed: {source}")]
    Response {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP response not OK: {status}")]
    NonOkResponse { status: u16, body: String },

    #[error("Datagram send failed: {0}")]
    SendFailed(#[from] std::io::Error),

    #[error("No address found for {0}")]
    Unresolved(String),

    #[error("UDP DSN requires an explicit port")]
    MissingPort,
}

impl TransportError {
    /// HTTP status of a non-OK response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NonOkResponse { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Transport settings.
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    /// Whole-request timeout for HTTP. `None` leaves the client defaults.
    pub timeout: Option<Duration>,
}

/// Delivery mechanism for one DSN.
#[derive(Debug, Clone)]
pub enum TransportKind {
    Http(HttpTransport),
    Udp(UdpTransport),
}

impl TransportKind {
    /// Selects the transport for the DSN's protocol.
    pub fn for_dsn(dsn: &Dsn, options: &TransportOptions) -> Result<Self, reqwest::Error> {
        match dsn.protocol {
            Protocol::Http | Protocol::Https => Ok(Self::Http(HttpTransport::new(options)?)),
            Protocol::Udp => Ok(Self::Udp(UdpTransport)),
        }
    }

    /// Delivers one encoded payload.
    pub async fn send(&self, dsn: &Dsn, auth: &str, payload: &[u8]) -> Result<(), TransportError> {
        match self {
            Self::Http(http) => http.send(dsn, auth, payload).await,
            Self::Udp(udp) => udp.send(dsn, auth, payload).await,
        }
    }
}

/// HTTP(S) transport. Cloning shares the connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(options: &TransportOptions) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder().user_agent(crate::auth::client_tag());
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Store endpoint URL for a DSN.
    pub fn store_url(dsn: &Dsn) -> String {
        let port = dsn.effective_port().unwrap_or(0);
        format!(
            "{}://{}:{}{}",
            dsn.protocol,
            dsn.host,
            port,
            dsn.store_path()
        )
    }

    pub async fn send(&self, dsn: &Dsn, auth: &str, payload: &[u8]) -> Result<(), TransportError> {
        let url = Self::store_url(dsn);
        tracing::debug!(url = %url, bytes = payload.len(), "Sending event over HTTP");

        let connect_error = |source: reqwest::Error| TransportError::Connect {
            url: url.clone(),
            source,
        };

        let response = self
            .client
            .post(&url)
            .header(AUTH_HEADER, auth)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, payload.len())
            .body(payload.to_vec())
            .send()
            .await
            .map_err(connect_error)?;

        let status = response.status().as_u16();
        tracing::trace!(status, "Awaiting response body");
        let body = match response.text().await {
            Ok(body) => body,
            // the status alone already decides a rejected event
            Err(e) if status != 200 => {
                tracing::debug!(status, error = %e, "Discarding unreadable error body");
                String::new()
            }
            Err(source) => return Err(TransportError::Response { url, source }),
        };

        if status != 200 {
            return Err(TransportError::NonOkResponse { status, body });
        }
        Ok(())
    }
}

/// Connectionless UDP transport. Delivery is never confirmed.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpTransport;

impl UdpTransport {
    /// Datagram layout: auth header, blank line, payload.
    pub fn datagram(auth: &str, payload: &[u8]) -> Vec<u8> {
        let mut datagram = Vec::with_capacity(auth.len() + 2 + payload.len());
        datagram.extend_from_slice(auth.as_bytes());
        datagram.extend_from_slice(b"\n\n");
        datagram.extend_from_slice(payload);
        datagram
    }

    pub async fn send(&self, dsn: &Dsn, auth: &str, payload: &[u8]) -> Result<(), TransportError> {
        let port = dsn.effective_port().ok_or(TransportError::MissingPort)?;
        let target = resolve(&dsn.host, port).await?;

        let bind_addr = if target.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind_addr).await?;

        let datagram = Self::datagram(auth, payload);
        tracing::debug!(addr = %target, bytes = datagram.len(), "Sending event over UDP");

        let sent = socket.send_to(&datagram, target).await?;
        if sent != datagram.len() {
            return Err(TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("sent {} of {} bytes", sent, datagram.len()),
            )));
        }
        Ok(())
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransportError> {
    // url keeps brackets around IPv6 literals
    let host = host.trim_start_matches('[').trim_end_matches(']');
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| TransportError::Unresolved(format!("{}:{}", host, port)))
}
