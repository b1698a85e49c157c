//! Connection-upgrade handshake.
//!
//! Validates an upgrade request's headers, derives the cryptographic
//! acceptance key proving the server understood the request, negotiates a
//! subprotocol, and writes exactly one `101 Switching Protocols` response
//! through the pipeline's outbound path.
//!
//! ```http
//! GET /chat HTTP/1.1
//! Host: server.example.com
//! Upgrade: websocket
//! Connection: Upgrade
//! Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==
//! ```
//!
//! ```http
//! HTTP/1.1 101 Switching Protocols
//! Upgrade: websocket
//! Connection: Upgrade
//! Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=
//! ```

use base64::Engine;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::pipeline::{Pipeline, PipelineError};

mod http;

pub use http::{UpgradeRequest, UpgradeResponse};

/// Fixed magic GUID appended to the client nonce before hashing.
///
/// The GUID, the SHA-1 digest, and the base64 encoding are all fixed by
/// the protocol; substituting any of them breaks interoperability.
const ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Derives the acceptance key from the client's base64-encoded nonce.
///
/// SHA-1 over `nonce ++ GUID`, base64-encoded. Deterministic and
/// stateless; the value must match byte-for-byte what a conforming peer
/// computes.
///
/// # Example
///
/// ```
/// let key = wireline::derive_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(key, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn derive_accept_key(nonce: &str) -> String {
    let mut digest = Sha1::new();
    digest.update(nonce.as_bytes());
    digest.update(ACCEPT_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(digest.finalize())
}

/// Errors raised while negotiating an upgrade.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The request head could not be read at all.
    #[error("malformed upgrade request: {0}")]
    MalformedRequest(&'static str),

    /// The upgrade verb was wrong.
    #[error("upgrade request must use GET, got `{0}`")]
    InvalidMethod(String),

    /// A required header was absent.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    /// A required header carried the wrong value.
    #[error("invalid `{name}` header: expected `{expected}`, got `{actual}`")]
    HeaderMismatch {
        /// Header name.
        name: &'static str,
        /// The value the protocol requires.
        expected: &'static str,
        /// What the request carried.
        actual: String,
    },

    /// The negotiator already reached a terminal state.
    #[error("handshake already {0}")]
    InvalidState(HandshakeState),

    /// The response could not be written through the pipeline.
    #[error("failed to write handshake response: {0}")]
    Write(#[from] PipelineError),
}

/// Negotiator lifecycle. Both outcomes are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// No request has been processed yet.
    AwaitingRequest,
    /// The upgrade was accepted and the response written.
    Completed,
    /// Validation failed; no response was written.
    Failed,
}

impl std::fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::AwaitingRequest => "awaiting request",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// Server-side upgrade negotiator for one connection.
///
/// Performs a single `AwaitingRequest → Completed | Failed` transition.
/// After completion the negotiated subprotocol becomes connection-scoped
/// state that later frame decoding consults.
#[derive(Debug)]
pub struct ServerNegotiator {
    url: String,
    required_subprotocol: Option<String>,
    allow_extensions: bool,
    max_message_size: usize,
    state: HandshakeState,
    selected_subprotocol: Option<String>,
}

impl ServerNegotiator {
    /// Creates a negotiator for the given endpoint URL.
    ///
    /// `required_subprotocol` is selected iff the client advertises it;
    /// a mismatch is not a failure, the response header is just omitted.
    /// `max_message_size` bounds decoded messages after the upgrade.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        required_subprotocol: Option<&str>,
        allow_extensions: bool,
        max_message_size: usize,
    ) -> Self {
        Self {
            url: url.into(),
            required_subprotocol: required_subprotocol.map(str::to_owned),
            allow_extensions,
            max_message_size,
            state: HandshakeState::AwaitingRequest,
            selected_subprotocol: None,
        }
    }

    /// The endpoint URL this negotiator serves.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether protocol extensions may be negotiated.
    #[must_use]
    pub fn allow_extensions(&self) -> bool {
        self.allow_extensions
    }

    /// Upper bound on decoded message size after the upgrade.
    #[must_use]
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// The subprotocol selected during negotiation, if any.
    #[must_use]
    pub fn subprotocol(&self) -> Option<&str> {
        self.selected_subprotocol.as_deref()
    }

    /// Validates `request` and produces the upgrade response.
    ///
    /// On success the negotiator is `Completed`; on a validation error it
    /// is `Failed` and the caller must reject or close the connection.
    /// Either way the transition is final.
    pub fn negotiate(
        &mut self,
        request: &UpgradeRequest,
    ) -> Result<UpgradeResponse, HandshakeError> {
        if self.state != HandshakeState::AwaitingRequest {
            return Err(HandshakeError::InvalidState(self.state));
        }
        match self.validate_and_build(request) {
            Ok(response) => {
                self.state = HandshakeState::Completed;
                tracing::debug!(
                    url = %self.url,
                    subprotocol = self.selected_subprotocol.as_deref(),
                    "upgrade handshake completed"
                );
                Ok(response)
            }
            Err(e) => {
                self.state = HandshakeState::Failed;
                tracing::debug!(url = %self.url, error = %e, "upgrade handshake failed");
                Err(e)
            }
        }
    }

    /// Negotiates and writes the response toward the transport.
    ///
    /// Exactly one outbound write per handshake attempt, performed
    /// synchronously after validation. A failed validation writes
    /// nothing.
    pub fn handshake(
        &mut self,
        request: &UpgradeRequest,
        pipeline: &mut Pipeline<Bytes>,
    ) -> Result<(), HandshakeError> {
        let response = self.negotiate(request)?;
        pipeline.write(response.to_bytes())?;
        pipeline.flush()?;
        Ok(())
    }

    fn validate_and_build(
        &mut self,
        request: &UpgradeRequest,
    ) -> Result<UpgradeResponse, HandshakeError> {
        if request.method() != "GET" {
            return Err(HandshakeError::InvalidMethod(request.method().to_owned()));
        }
        if request.header("host").is_none() {
            return Err(HandshakeError::MissingHeader("Host"));
        }

        let upgrade = request
            .header("upgrade")
            .ok_or(HandshakeError::MissingHeader("Upgrade"))?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(HandshakeError::HeaderMismatch {
                name: "Upgrade",
                expected: "websocket",
                actual: upgrade.to_owned(),
            });
        }

        let connection = request
            .header("connection")
            .ok_or(HandshakeError::MissingHeader("Connection"))?;
        let has_upgrade_token = connection
            .split(',')
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
        if !has_upgrade_token {
            return Err(HandshakeError::HeaderMismatch {
                name: "Connection",
                expected: "Upgrade",
                actual: connection.to_owned(),
            });
        }

        let nonce = request
            .header("sec-websocket-key")
            .ok_or(HandshakeError::MissingHeader("Sec-WebSocket-Key"))?;
        let accept_key = derive_accept_key(nonce);

        self.selected_subprotocol = self.select_subprotocol(request);

        let mut response = UpgradeResponse::switching_protocols();
        response.set_header("Upgrade", "websocket");
        response.set_header("Connection", "Upgrade");
        response.set_header("Sec-WebSocket-Accept", accept_key);
        if let Some(protocol) = &self.selected_subprotocol {
            response.set_header("Sec-WebSocket-Protocol", protocol.clone());
        }
        Ok(response)
    }

    /// Picks the configured subprotocol when the client advertises it in
    /// its comma-separated candidate list. No match means no header, not
    /// a failure.
    fn select_subprotocol(&self, request: &UpgradeRequest) -> Option<String> {
        let required = self.required_subprotocol.as_deref()?;
        let advertised = request.header("sec-websocket-protocol")?;
        advertised
            .split(',')
            .map(str::trim)
            .find(|candidate| *candidate == required)
            .map(str::to_owned)
    }
}
