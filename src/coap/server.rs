//! CoAP listener.
//!
//! Datagrams are decoded with coap-lite and routed through the same
//! [`Dispatcher`] as HTTP. Each datagram is handled on its own task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use coap_lite::{CoapRequest, ContentFormat, MessageClass, Packet, RequestType};
use tokio::net::UdpSocket;

use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::routing::{Dispatch, Dispatcher};

const MAX_DATAGRAM: usize = 64 * 1024;

/// 4.04 Not Found.
pub const CODE_NOT_FOUND: u8 = 132;
/// 4.05 Method Not Allowed.
pub const CODE_METHOD_NOT_ALLOWED: u8 = 133;

/// Map a configured status to a CoAP code byte.
///
/// Values already in the CoAP range (2.00..=5.31) pass through; HTTP
/// statuses map to their CoAP counterpart, falling back by class.
pub fn coap_code(status: u16) -> u8 {
    match status {
        64..=191 => status as u8,
        200 => 69,
        201 => 65,
        204 => 68,
        400 => 128,
        401 => 129,
        403 => 131,
        404 => 132,
        405 => 133,
        500 => 160,
        503 => 163,
        200..=299 => 69,
        400..=499 => 128,
        _ => 160,
    }
}

fn method_name(method: &RequestType) -> Option<&'static str> {
    match method {
        RequestType::Get => Some("GET"),
        RequestType::Post => Some("POST"),
        RequestType::Put => Some("PUT"),
        RequestType::Delete => Some("DELETE"),
        _ => None,
    }
}

fn is_json(headers: &std::collections::BTreeMap<String, String>) -> bool {
    headers
        .iter()
        .any(|(name, value)| name.eq_ignore_ascii_case("content-type") && value.starts_with("application/json"))
}

/// Handle one datagram. Returns the encoded response, if any is due.
pub fn handle_datagram(dispatcher: &Dispatcher, datagram: &[u8], peer: SocketAddr) -> Option<Vec<u8>> {
    let start = Instant::now();

    let packet = match Packet::from_bytes(datagram) {
        Ok(packet) => packet,
        Err(e) => {
            tracing::debug!(peer = %peer, error = ?e, "Dropping malformed CoAP datagram");
            return None;
        }
    };

    let mut request: CoapRequest<SocketAddr> = CoapRequest::from_packet(packet, peer);
    let path = format!("/{}", request.get_path());
    let method = method_name(request.get_method());
    let body = Bytes::from(request.message.payload.clone());

    let response = request.response.as_mut()?;

    let (code, method_label) = match method {
        None => (CODE_METHOD_NOT_ALLOWED, "OTHER"),
        Some(method) => match dispatcher.dispatch(method, &path, &body) {
            Dispatch::Reply(reply) => {
                let format = if is_json(&reply.headers) {
                    ContentFormat::ApplicationJSON
                } else {
                    ContentFormat::TextPlain
                };
                response.message.set_content_format(format);
                response.message.payload = reply.body.into_bytes();
                (coap_code(reply.status), method)
            }
            Dispatch::MethodNotAllowed => (CODE_METHOD_NOT_ALLOWED, method),
            Dispatch::NotFound => (CODE_NOT_FOUND, method),
        },
    };

    response.message.header.code = MessageClass::from(code);
    metrics::record_request("coap", method_label, code as u16, start);
    tracing::debug!(peer = %peer, path = %path, method = method_label, code, "CoAP request handled");

    match response.message.to_bytes() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::warn!(peer = %peer, error = ?e, "Failed to encode CoAP response");
            None
        }
    }
}

/// CoAP listener for declarative endpoints.
pub struct CoapServer {
    dispatcher: Arc<Dispatcher>,
}

impl CoapServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Serve datagrams from `socket` until `shutdown` fires.
    pub async fn run(self, socket: UdpSocket, mut shutdown: ShutdownSignal) -> Result<(), std::io::Error> {
        let addr = socket.local_addr()?;
        let socket = Arc::new(socket);
        let mut buf = vec![0u8; MAX_DATAGRAM];

        tracing::info!(address = %addr, "CoAP server starting");

        loop {
            tokio::select! {
                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, peer)) => {
                        let datagram = buf[..len].to_vec();
                        let dispatcher = self.dispatcher.clone();
                        let socket = socket.clone();
                        tokio::spawn(async move {
                            if let Some(reply) = handle_datagram(&dispatcher, &datagram, peer) {
                                if let Err(e) = socket.send_to(&reply, peer).await {
                                    tracing::warn!(peer = %peer, error = %e, "Failed to send CoAP response");
                                }
                            }
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "CoAP receive error"),
                },
                _ = shutdown.recv() => break,
            }
        }

        tracing::info!("CoAP server stopped");
        Ok(())
    }
}
