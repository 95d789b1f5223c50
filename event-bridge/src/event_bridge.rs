//! # Event Bridge Module
//!
//! This module implements the [`BridgeProcessor`], the per-block failure
//! boundary of the pipeline, and the [`EventDispatcher`] that turns decoded
//! events into outbound contract invocations.
//!
//! ## Failure isolation
//!
//! One bad record must never stop the stream. `process_block` applies the
//! scopes defined by the pipeline steps:
//!
//! - a walk failure fails that one block; the subscription keeps going,
//! - an extraction failure skips that one action; siblings still run,
//! - a decode failure skips that one event,
//! - a dispatch outcome is only ever logged.
//!
//! ## Dispatch
//!
//! Submitting the downstream transaction is the only step allowed to take
//! wall-clock time, so [`EventDispatcher::dispatch`] spawns it onto the
//! runtime and returns immediately. The driver never awaits the spawned
//! task; concurrent dispatches from different blocks share no state.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info, trace};
use snafu::Snafu;
use tokio::task::JoinHandle;

use crate::block::{Block, DebitPayload};
use crate::block_processing;
use crate::chain_listener::BlockProcessor;

/// Identifier of a submitted transaction, as returned by the gateway.
pub type TransactionId = String;

/// Asynchronous submit-and-await of a transaction proposal against a target
/// contract.
///
/// Implementations own endpoint selection, transport security, credentials,
/// timeouts, and any retry policy. The dispatcher performs no retries of its
/// own.
#[async_trait]
pub trait TransactionInvoker: Send + Sync {
    /// Submits the request and awaits a transaction identifier.
    async fn invoke(&self, request: &OutboundRequest) -> Result<TransactionId, InvocationError>;
}

/// A fully-built transaction submission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    /// Gateway endpoints to submit through, in preference order.
    pub endpoints: Vec<String>,
    /// The ledger network (channel) the target contract lives on.
    pub network: String,
    /// The target contract name.
    pub contract: String,
    /// The contract function to invoke.
    pub function: String,
    /// Serialized argument values, in declaration order.
    pub args: Vec<String>,
    /// The identity submitting the transaction.
    pub identity: String,
    /// The organization the identity belongs to.
    pub organization: String,
}

/// The fixed portion of every outbound request: where the downstream `move`
/// invocation goes and who submits it. The per-event portion (the args)
/// comes from the decoded payload.
#[derive(Debug, Clone)]
pub struct InvocationTarget {
    /// Gateway endpoints to submit through, in preference order.
    pub endpoints: Vec<String>,
    /// The ledger network (channel) the target contract lives on.
    pub network: String,
    /// The target contract name.
    pub contract: String,
    /// The contract function to invoke.
    pub function: String,
    /// The identity submitting the transaction.
    pub identity: String,
    /// The organization the identity belongs to.
    pub organization: String,
}

/// Maps decoded payloads to outbound requests and submits them without
/// blocking the block stream.
pub struct EventDispatcher<I> {
    invoker: Arc<I>,
    target: InvocationTarget,
}

impl<I> EventDispatcher<I>
where
    I: TransactionInvoker + 'static,
{
    /// Creates a dispatcher that submits through `invoker` against the fixed
    /// `target`.
    pub fn new(invoker: Arc<I>, target: InvocationTarget) -> Self {
        Self { invoker, target }
    }

    /// Builds the outbound request for one decoded payload.
    fn build_request(&self, payload: &DebitPayload) -> OutboundRequest {
        OutboundRequest {
            endpoints: self.target.endpoints.clone(),
            network: self.target.network.clone(),
            contract: self.target.contract.clone(),
            function: self.target.function.clone(),
            args: vec![payload.quantity.to_string(), payload.to.clone()],
            identity: self.target.identity.clone(),
            organization: self.target.organization.clone(),
        }
    }

    /// Submits the invocation for one decoded payload, fire-and-forget.
    ///
    /// The submission runs as an independent task; its outcome is logged and
    /// never surfaces back into block processing. The handle is returned so
    /// tests can await completion, the driver ignores it.
    pub fn dispatch(&self, payload: DebitPayload) -> JoinHandle<()> {
        debug!("invoking move {} to {}", payload.quantity, payload.to);

        let request = self.build_request(&payload);
        let invoker = Arc::clone(&self.invoker);
        tokio::spawn(async move {
            match invoker.invoke(&request).await {
                Ok(transaction_id) => info!("move success: {transaction_id}"),
                Err(e) => error!("move error: {e}"),
            }
        })
    }
}

/// The block processor driving walk → extract → filter → decode → dispatch
/// for every delivered block, with per-action and per-block failure scopes.
pub struct BridgeProcessor<I> {
    target_event: String,
    dispatcher: EventDispatcher<I>,
}

impl<I> BridgeProcessor<I>
where
    I: TransactionInvoker + 'static,
{
    /// Creates a processor that forwards events named `target_event` through
    /// `dispatcher`.
    pub fn new(target_event: impl Into<String>, dispatcher: EventDispatcher<I>) -> Self {
        Self {
            target_event: target_event.into(),
            dispatcher,
        }
    }
}

#[async_trait]
impl<I> BlockProcessor for BridgeProcessor<I>
where
    I: TransactionInvoker + 'static,
{
    async fn process_block(&mut self, block: Block) {
        let actions = match block_processing::walk(&block) {
            Ok(actions) => actions,
            Err(e) => {
                error!("skipping block {}: {e}", block.number);
                return;
            }
        };

        for action in actions {
            let event = match block_processing::extract(action) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    error!("skipping action in block {}: {e}", block.number);
                    continue;
                }
            };

            trace!("event {}", event.name.as_deref().unwrap_or_default());

            if !block_processing::matches(event, &self.target_event) {
                continue;
            }

            match block_processing::decode(&event.payload) {
                Ok(payload) => {
                    let _detached = self.dispatcher.dispatch(payload);
                }
                Err(e) => error!(
                    "skipping {} event in block {}: {e}",
                    self.target_event, block.number
                ),
            }
        }
    }
}

/// Downstream transaction submission failed.
#[derive(Debug, Snafu)]
pub enum InvocationError {
    /// No gateway endpoint is configured to submit through.
    #[snafu(display("no gateway endpoints configured"))]
    NoEndpoints,

    /// The request could not be delivered to a gateway endpoint.
    #[snafu(display("failed to reach gateway {endpoint}: {source}"))]
    Transport {
        /// The endpoint that could not be reached.
        endpoint: String,
        /// The underlying transport error.
        source: reqwest::Error,
    },

    /// The gateway answered with a non-success status.
    #[snafu(display("gateway {endpoint} rejected the invocation with status {status}"))]
    Rejected {
        /// The endpoint that rejected the request.
        endpoint: String,
        /// The HTTP status code of the rejection.
        status: u16,
    },

    /// The gateway's response body could not be read as an invocation
    /// result.
    #[snafu(display("gateway {endpoint} returned an unreadable response: {source}"))]
    InvalidResponse {
        /// The endpoint whose response could not be parsed.
        endpoint: String,
        /// The underlying response decoding error.
        source: reqwest::Error,
    },
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use super::*;
    use crate::block::{Action, ActionPayload, ApplicationEvent, ResponseExtension, TransactionGroup};

    /// Records every request it receives; fails the invocation when asked.
    struct RecordingInvoker {
        sender: mpsc::UnboundedSender<OutboundRequest>,
        fail: bool,
    }

    #[async_trait]
    impl TransactionInvoker for RecordingInvoker {
        async fn invoke(
            &self,
            request: &OutboundRequest,
        ) -> Result<TransactionId, InvocationError> {
            self.sender.send(request.clone()).expect("test receiver alive");
            if self.fail {
                return Err(InvocationError::Rejected {
                    endpoint: request.endpoints[0].clone(),
                    status: 500,
                });
            }
            Ok("tx-0001".into())
        }
    }

    fn test_target() -> InvocationTarget {
        InvocationTarget {
            endpoints: vec!["grpcs://peer0.consumer.hypermusic.com:7051".into()],
            network: "payment".into(),
            contract: "payment".into(),
            function: "move".into(),
            identity: "orchestrator".into(),
            organization: "gateway".into(),
        }
    }

    fn harness(fail: bool) -> (BridgeProcessor<RecordingInvoker>, mpsc::UnboundedReceiver<OutboundRequest>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let invoker = Arc::new(RecordingInvoker { sender, fail });
        let dispatcher = EventDispatcher::new(invoker, test_target());
        (BridgeProcessor::new("Payment.debit", dispatcher), receiver)
    }

    fn action_with_event(name: &str, payload: &[u8]) -> Action {
        Action {
            payload: Some(ActionPayload {
                extension: Some(ResponseExtension {
                    events: Some(ApplicationEvent {
                        name: Some(name.into()),
                        payload: payload.to_vec(),
                    }),
                }),
            }),
        }
    }

    fn single_group_block(number: u64, actions: Vec<Action>) -> Block {
        Block {
            number,
            transaction_groups: Some(vec![TransactionGroup {
                actions: Some(actions),
            }]),
        }
    }

    async fn expect_request(
        receiver: &mut mpsc::UnboundedReceiver<OutboundRequest>,
    ) -> OutboundRequest {
        timeout(Duration::from_secs(1), receiver.recv())
            .await
            .expect("dispatch should happen")
            .expect("channel open")
    }

    async fn expect_no_request(receiver: &mut mpsc::UnboundedReceiver<OutboundRequest>) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn matching_event_dispatches_exactly_once() {
        let (mut processor, mut receiver) = harness(false);
        let block = single_group_block(
            42,
            vec![
                action_with_event("Payment.debit", br#"{"quantity":100,"to":"a"}"#),
                action_with_event("Other.event", b"..."),
            ],
        );

        processor.process_block(block).await;

        let request = expect_request(&mut receiver).await;
        assert_eq!(request.args, ["100", "a"]);
        assert_eq!(request.network, "payment");
        assert_eq!(request.contract, "payment");
        assert_eq!(request.function, "move");
        assert_eq!(request.identity, "orchestrator");
        expect_no_request(&mut receiver).await;
    }

    #[tokio::test]
    async fn name_mismatch_never_dispatches() {
        let (mut processor, mut receiver) = harness(false);
        let block = single_group_block(
            10,
            vec![action_with_event("payment.debit", br#"{"quantity":1,"to":"a"}"#)],
        );

        processor.process_block(block).await;

        expect_no_request(&mut receiver).await;
    }

    #[tokio::test]
    async fn decode_failure_does_not_skip_siblings() {
        let (mut processor, mut receiver) = harness(false);
        let block = single_group_block(
            11,
            vec![
                action_with_event("Payment.debit", b"not json"),
                action_with_event("Payment.debit", br#"{"quantity":7,"to":"b"}"#),
            ],
        );

        processor.process_block(block).await;

        let request = expect_request(&mut receiver).await;
        assert_eq!(request.args, ["7", "b"]);
        expect_no_request(&mut receiver).await;
    }

    #[tokio::test]
    async fn malformed_action_does_not_skip_siblings() {
        let (mut processor, mut receiver) = harness(false);
        let block = single_group_block(
            12,
            vec![
                Action { payload: None },
                action_with_event("Payment.debit", br#"{"quantity":3,"to":"c"}"#),
            ],
        );

        processor.process_block(block).await;

        let request = expect_request(&mut receiver).await;
        assert_eq!(request.args, ["3", "c"]);
    }

    #[tokio::test]
    async fn invoker_failure_stays_inside_the_dispatch_task() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let invoker = Arc::new(RecordingInvoker { sender, fail: true });
        let dispatcher = EventDispatcher::new(invoker, test_target());

        let handle = dispatcher.dispatch(DebitPayload {
            quantity: 100,
            to: "a".into(),
        });

        // The spawned task finishes cleanly even though the invocation fails.
        handle.await.unwrap();
        assert!(receiver.try_recv().is_ok());
    }
}
