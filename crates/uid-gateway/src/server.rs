//! RADIUS accounting listener
//!
//! Each datagram is checked, authenticated against the sender's shared
//! secret, queued for batching and acknowledged. Anything that fails a check
//! is dropped without a response.

use crate::event::AccountingEvent;
use crate::observability::{Counter, ObservabilitySink};
use crate::queue::RequestQueue;
use crate::secrets::SecretResolver;
use radius_proto::accounting::build_accounting_response;
use radius_proto::auth::verify_accounting_request;
use radius_proto::{decode_attributes, AcctStatusType, AttributeType, Code, Packet, PacketHeader};
use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause after a transient receive error before listening again
const TRANSIENT_ERROR_PAUSE: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Why a datagram was dropped without a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    TooShort(usize),
    NotAccountingRequest(u8),
    BadLength { declared: usize, received: usize },
    UnknownClient(IpAddr),
    BadAuthenticator,
}

impl fmt::Display for Discard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discard::TooShort(len) => write!(f, "datagram of {} bytes is too short", len),
            Discard::NotAccountingRequest(code) => {
                write!(f, "code {} is not an Accounting-Request", code)
            }
            Discard::BadLength { declared, received } => write!(
                f,
                "declared length {} does not fit datagram of {} bytes",
                declared, received
            ),
            Discard::UnknownClient(ip) => write!(f, "unknown source {}", ip),
            Discard::BadAuthenticator => f.write_str("request authenticator mismatch"),
        }
    }
}

/// Socket errnos the receive loop retries after
#[cfg(unix)]
const TRANSIENT_ERRNOS: &[i32] = &[
    libc::EINTR,
    libc::EACCES,
    libc::EFAULT,
    libc::EAGAIN,
    libc::ENETDOWN,
    libc::ENETUNREACH,
    libc::ENETRESET,
    libc::ECONNABORTED,
    libc::ECONNRESET,
    libc::ECONNREFUSED,
    libc::ENOTCONN,
    libc::ESHUTDOWN,
    libc::ETIMEDOUT,
    libc::EHOSTDOWN,
    libc::EHOSTUNREACH,
    libc::ECANCELED,
    #[cfg(any(target_os = "linux", target_os = "android", target_vendor = "apple"))]
    libc::ENODATA,
];

#[cfg(unix)]
fn is_transient_errno(code: i32) -> bool {
    TRANSIENT_ERRNOS.contains(&code)
}

#[cfg(not(unix))]
fn is_transient_errno(_code: i32) -> bool {
    false
}

/// Whether a receive error should be retried rather than end the listener
pub fn is_transient(err: &io::Error) -> bool {
    use io::ErrorKind::*;

    match err.kind() {
        Interrupted | PermissionDenied | NetworkDown | NetworkUnreachable | ConnectionAborted
        | ConnectionReset | TimedOut | ConnectionRefused | HostUnreachable | NotConnected
        | WouldBlock => true,
        _ => err.raw_os_error().is_some_and(is_transient_errno),
    }
}

/// UDP listener for Accounting-Request packets
pub struct AccountingServer {
    socket: UdpSocket,
    secrets: Arc<dyn SecretResolver>,
    queue: RequestQueue,
    sink: Arc<dyn ObservabilitySink>,
}

impl AccountingServer {
    pub async fn bind(
        addr: SocketAddr,
        secrets: Arc<dyn SecretResolver>,
        queue: RequestQueue,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(addr).await?;
        info!("RADIUS accounting listening on {}", socket.local_addr()?);

        Ok(AccountingServer {
            socket,
            secrets,
            queue,
            sink,
        })
    }

    /// Get the local address the server is listening on
    ///
    /// This is useful for testing when binding to port 0 (OS-assigned port)
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.socket.local_addr().map_err(ServerError::from)
    }

    /// Receive until cancelled or a non-transient socket error occurs
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ServerError> {
        let mut buf = vec![0u8; Packet::MAX_PACKET_SIZE];

        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => received,
            };

            match received {
                Ok((len, source)) => {
                    let Some(response) = self.handle_datagram(&buf[..len], source) else {
                        continue;
                    };
                    match self.socket.send_to(&response, source).await {
                        Ok(_) => debug!(client_addr = %source, "Sent accounting response"),
                        Err(e) => warn!(
                            client_addr = %source,
                            error = %e,
                            "Failed to send accounting response"
                        ),
                    }
                }
                Err(e) if is_transient(&e) => {
                    warn!(error = %e, "Transient socket error, resuming");
                    tokio::time::sleep(TRANSIENT_ERROR_PAUSE).await;
                }
                Err(e) => {
                    error!(error = %e, "Socket error, stopping accounting listener");
                    return Err(e.into());
                }
            }
        }

        info!("RADIUS accounting listener stopped");
        Ok(())
    }

    /// Process one datagram, returning the signed response to send back
    pub fn handle_datagram(&self, data: &[u8], source: SocketAddr) -> Option<Vec<u8>> {
        self.sink.increment(Counter::Received);

        match self.accept(data, source.ip()) {
            Ok(response) => Some(response),
            Err(reason) => {
                self.sink.increment(Counter::Discarded);
                debug!(
                    client_addr = %source,
                    reason = %reason,
                    "Accounting request discarded"
                );
                None
            }
        }
    }

    fn accept(&self, data: &[u8], source: IpAddr) -> Result<Vec<u8>, Discard> {
        let header = PacketHeader::parse(data).map_err(|_| Discard::TooShort(data.len()))?;

        if header.known_code() != Some(Code::AccountingRequest) {
            return Err(Discard::NotAccountingRequest(header.code));
        }

        if header.length < Packet::MIN_PACKET_SIZE || header.length > data.len() {
            return Err(Discard::BadLength {
                declared: header.length,
                received: data.len(),
            });
        }
        let data = &data[..header.length];

        let secret = self
            .secrets
            .secret_for(source)
            .ok_or(Discard::UnknownClient(source))?;

        if !verify_accounting_request(data, &secret) {
            return Err(Discard::BadAuthenticator);
        }

        let attributes = decode_attributes(data, Packet::MIN_PACKET_SIZE);
        debug!(
            client_ip = %source,
            request_id = header.identifier,
            attributes = attributes.len(),
            "Received Accounting-Request"
        );

        let status = attributes
            .iter()
            .find(|a| a.is(AttributeType::AcctStatusType))
            .map(|a| a.as_integer().and_then(AcctStatusType::from_u32));
        match status {
            Some(Some(AcctStatusType::Start)) => self.sink.increment(Counter::AccountingStart),
            Some(Some(AcctStatusType::Stop)) => self.sink.increment(Counter::AccountingStop),
            Some(_) => self.sink.increment(Counter::AccountingOther),
            None => {}
        }

        let response = build_accounting_response(
            header.identifier,
            &header.authenticator,
            &attributes,
            &secret,
        );
        self.queue.enqueue(AccountingEvent::new(source, attributes));

        Ok(response)
    }
}
