//! Wireline: the protocol-processing core of a network transport.
//!
//! # Overview
//!
//! Wireline moves bytes and decoded messages between a network connection
//! and application logic through a bidirectional chain of stages, and ships
//! two protocol artifacts built on that chain: a settings control-frame
//! model with persistence semantics, and a connection-upgrade handshake
//! with cryptographic acceptance-key derivation.
//!
//! # Core Guarantees
//!
//! - **Move-semantics hand-off**: a unit of data lives in exactly one
//!   stage's buffer slot at a time; forwarding transfers ownership
//! - **FIFO per direction**: units traverse the chain in strict arrival
//!   order; there is no reordering or priority
//! - **Backpressure by declining**: a stage that needs more input forwards
//!   nothing and waits for the next event; there is no side channel
//! - **No silent drops**: tearing down a pipeline reports every
//!   buffered-but-undelivered unit to the owner
//!
//! # Module Structure
//!
//! - [`pipeline`]: stage trait, the per-connection chain, buffer hand-off
//! - [`settings`]: settings frame model and its wire codec
//! - [`handshake`]: upgrade negotiation and acceptance-key derivation
//!
//! The I/O reactor, socket transport, TLS, and the full HTTP object model
//! are external collaborators; the pipeline's edge exchanges plain byte
//! buffers, and the negotiator consumes a minimal header carrier.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod handshake;
pub mod pipeline;
pub mod settings;

pub use handshake::{
    derive_accept_key, HandshakeError, HandshakeState, ServerNegotiator, UpgradeRequest,
    UpgradeResponse,
};
pub use pipeline::{DiscardReport, LogStage, Pipeline, PipelineError, Stage, StageContext};
pub use settings::{InvalidSettingId, SettingsFrame, SETTINGS_MAX_ID};
