//! # Ledger Event Bridge Library
//!
//! This library bridges a ledger peer's block feed to a downstream contract
//! invocation: it walks each delivered block's nested transaction structure,
//! extracts contract-emitted application events, filters them by name,
//! decodes matching payloads, and forwards them as new transactions through
//! a gateway. Delivery is at-least-once and best-effort; one malformed
//! block, action, or failed invocation never stops the stream.
//!
//! ## Modules
//! - [`block`]: the typed data model for delivered blocks and events.
//! - [`block_processing`]: walking, extraction, filtering, and decoding.
//! - [`event_bridge`]: the per-block pipeline driver and the dispatcher.
//! - [`chain_listener`]: the run loop and the block sources feeding it.
//! - [`gateway`]: the HTTP transaction invoker.

/// Typed records for blocks, transaction groups, actions, and the events
/// nested inside them.
pub mod block;

/// The synchronous pipeline steps: flattening a block into actions,
/// extracting and filtering events, and decoding payloads.
pub mod block_processing;

/// The `chain_listener` module subscribes to a peer's block feed and drives
/// a block processor from it.
pub mod chain_listener;

/// The `event_bridge` module is the failure boundary of the pipeline: it
/// processes each block end to end and dispatches matched events without
/// blocking the stream.
pub mod event_bridge;

/// The HTTP gateway implementation of the transaction invoker.
pub mod gateway;
