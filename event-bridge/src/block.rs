//! # Block Data Model
//!
//! Typed records for the block notifications delivered by the ledger peer.
//!
//! A block carries zero or more transaction groups, each group carries its
//! actions, and each action may carry an application event deep inside its
//! response envelope. Peers in the wild deliver partially populated records,
//! so every nested field below the block header is an `Option` with a serde
//! default: an absent field deserializes as `None` and the pipeline decides
//! whether that absence is normal or a structural fault.

use serde::{Deserialize, Serialize};

/// A confirmed ledger block as delivered by the peer's event feed.
///
/// Blocks are immutable once delivered and are consumed exactly once by the
/// pipeline. `number` is strictly increasing within one subscription session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Monotonic sequence number assigned by the ledger.
    pub number: u64,
    /// The transaction groups recorded in this block. Missing on malformed
    /// deliveries; the walker treats that as a block-level fault.
    #[serde(default)]
    pub transaction_groups: Option<Vec<TransactionGroup>>,
}

/// One group of transactions within a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionGroup {
    /// The actions recorded in this group, in execution order.
    #[serde(default)]
    pub actions: Option<Vec<Action>>,
}

/// A single transaction-level unit within a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// The action's response envelope. Required for event extraction.
    #[serde(default)]
    pub payload: Option<ActionPayload>,
}

/// The response envelope of an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPayload {
    /// The extension record holding contract-emitted data.
    #[serde(default)]
    pub extension: Option<ResponseExtension>,
}

/// The extension record of an action's response, where contract events live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseExtension {
    /// The application event emitted during execution, if any. Most actions
    /// emit none.
    #[serde(default)]
    pub events: Option<ApplicationEvent>,
}

/// A named, opaque-payload notification emitted by a contract during
/// transaction execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationEvent {
    /// The event name, e.g. `Payment.debit`. Absent or empty names mark the
    /// event as not of interest.
    #[serde(default)]
    pub name: Option<String>,
    /// The opaque event payload. Interpretation is up to the consumer; the
    /// bridge expects UTF-8 encoded JSON.
    #[serde(default)]
    pub payload: Vec<u8>,
}

/// The decoded payload of a `Payment.debit` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebitPayload {
    /// The debited quantity.
    pub quantity: u64,
    /// The account the quantity moves to.
    pub to: String,
}
