//! # Block Processing Module
//!
//! The synchronous half of the pipeline: walking a block's nested
//! transaction structure, extracting application events from actions,
//! filtering them by name, and decoding matched payloads.
//!
//! Every step is a pure function over borrowed data so a caller can apply
//! its own failure scoping:
//!
//! - [`walk`] - flattens a block's transaction groups into one pass of
//!   actions. Fails as a whole when the group structure is malformed; this
//!   is the only block-level fatal condition.
//! - [`extract`] - navigates one action's response envelope to its event.
//!   An absent event (or an unnamed one) is normal and yields `None`; a
//!   missing envelope level is a [`StructuralError`] scoped to that action.
//! - [`matches`] - exact, case-sensitive event-name comparison.
//! - [`decode`] - interprets payload bytes as UTF-8 JSON.
//!
//! ## Error Handling
//!
//! Two `snafu` enums separate the failure kinds: [`StructuralError`] for
//! records that do not have the expected nested shape, and [`DecodeError`]
//! for payload bytes that are not valid UTF-8 JSON. Neither is ever fatal
//! to the subscription; the driver in [`crate::event_bridge`] reports and
//! continues.

use snafu::{ensure, OptionExt, ResultExt, Snafu};

use crate::block::{Action, ApplicationEvent, Block, DebitPayload};

/// Flattens a block's transaction groups into a single sequence of actions.
///
/// Actions are yielded in group-then-action declaration order. The walk is
/// restartable: calling this again on the same block yields the same
/// sequence.
///
/// # Errors
/// - [`StructuralError::TransactionGroupsMissing`] if the block carries no
///   group structure at all.
/// - [`StructuralError::ActionsMissing`] if any group lacks its actions
///   sequence. Either condition fails the whole block.
pub fn walk(block: &Block) -> Result<impl Iterator<Item = &Action>, StructuralError> {
    let groups = block
        .transaction_groups
        .as_ref()
        .context(TransactionGroupsMissingSnafu {
            block_number: block.number,
        })?;

    for (group, entry) in groups.iter().enumerate() {
        ensure!(
            entry.actions.is_some(),
            ActionsMissingSnafu {
                block_number: block.number,
                group,
            }
        );
    }

    Ok(groups
        .iter()
        .flat_map(|group| group.actions.as_deref().unwrap_or_default().iter()))
}

/// Extracts the application event carried by an action, if any.
///
/// Returns `Ok(None)` when the envelope navigates cleanly but there is no
/// event, or the event has an absent or empty name; neither case is an
/// error. Returns a [`StructuralError`] only when a required envelope level
/// is missing entirely, and that failure is scoped to this one action.
pub fn extract(action: &Action) -> Result<Option<&ApplicationEvent>, StructuralError> {
    let payload = action.payload.as_ref().context(ActionPayloadMissingSnafu)?;
    let extension = payload
        .extension
        .as_ref()
        .context(ResponseExtensionMissingSnafu)?;

    let Some(event) = extension.events.as_ref() else {
        return Ok(None);
    };

    match event.name.as_deref() {
        None | Some("") => Ok(None),
        Some(_) => Ok(Some(event)),
    }
}

/// Whether an event's name exactly equals the configured target name.
///
/// Case-sensitive, no pattern matching. Total: every event either passes or
/// is dropped, never an error.
pub fn matches(event: &ApplicationEvent, target_name: &str) -> bool {
    event.name.as_deref() == Some(target_name)
}

/// Decodes event payload bytes into a [`DebitPayload`].
///
/// The bytes are interpreted as UTF-8 encoded JSON. A failure here is scoped
/// to the single event that carried the payload.
pub fn decode(payload: &[u8]) -> Result<DebitPayload, DecodeError> {
    let text = std::str::from_utf8(payload).context(PayloadUtf8Snafu)?;
    serde_json::from_str(text).context(PayloadJsonSnafu)
}

/// A block or action does not have the expected nested shape.
#[derive(Debug, Snafu)]
pub enum StructuralError {
    /// The block carries no transaction-group sequence.
    #[snafu(display("block {block_number} has no transaction groups"))]
    TransactionGroupsMissing {
        /// The sequence number of the malformed block.
        block_number: u64,
    },

    /// A transaction group carries no actions sequence.
    #[snafu(display("block {block_number} group {group} has no actions"))]
    ActionsMissing {
        /// The sequence number of the malformed block.
        block_number: u64,
        /// The index of the group missing its actions.
        group: usize,
    },

    /// The action has no response envelope to navigate into.
    #[snafu(display("action has no response payload"))]
    ActionPayloadMissing,

    /// The action's response envelope has no extension record.
    #[snafu(display("action response has no extension"))]
    ResponseExtensionMissing,
}

/// Event payload bytes could not be decoded.
#[derive(Debug, Snafu)]
pub enum DecodeError {
    /// The payload bytes are not valid UTF-8.
    #[snafu(display("event payload is not valid UTF-8: {source}"))]
    PayloadUtf8 {
        /// The underlying UTF-8 validation error.
        source: std::str::Utf8Error,
    },

    /// The payload text is not a well-formed JSON document of the expected
    /// shape.
    #[snafu(display("event payload is not well-formed JSON: {source}"))]
    PayloadJson {
        /// The underlying JSON parsing error.
        source: serde_json::Error,
    },
}
