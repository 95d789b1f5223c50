//! # Peer Block Listener
//!
//! The `chain_listener` module connects the pipeline to the peer's block
//! feed. It abstracts where blocks come from behind the [`BlockSource`]
//! trait so the same [`BridgeListener`] run loop drives a live WebSocket
//! subscription, an in-process channel, or a test fixture.
//!
//! ## Overview
//!
//! - [`BlockProcessor`]: trait implemented by the pipeline driver; called
//!   once per delivered block, sequentially.
//! - [`BlockSource`]: trait producing a stream of [`PeerNotification`]s.
//! - [`BridgeListener`]: subscribes to a source and feeds its processor.
//!
//! ## Sources
//!
//! - [`RpcBlockSource`]: subscribes to the peer's JSON-RPC block feed over
//!   WebSocket.
//! - [`ChannelBlockSource`]: delivers notifications pushed through a tokio
//!   channel, for embedding the bridge in a larger process and for tests.
//!
//! Blocks arrive one at a time on a single delivery channel; a processing
//! failure never tears the subscription down. Reconnecting a dropped feed
//! is the peer collaborator's responsibility, not the listener's.

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use jsonrpsee::core::client::{Subscription, SubscriptionClientT};
use jsonrpsee::rpc_params;
use jsonrpsee::ws_client::WsClientBuilder;
use log::{error, info};
use snafu::{ResultExt, Snafu};
use tokio::sync::mpsc;

use crate::block::Block;

/// JSON-RPC method that opens the peer's block subscription.
const BLOCK_SUBSCRIBE_METHOD: &str = "ledger_subscribeBlocks";
/// JSON-RPC method that closes the peer's block subscription.
const BLOCK_UNSUBSCRIBE_METHOD: &str = "ledger_unsubscribeBlocks";

/// A notification delivered by the peer's event feed.
#[derive(Debug, Clone)]
pub enum PeerNotification {
    /// The feed transitioned to connected. Carries no payload; the only
    /// required reaction is observability.
    Connected,
    /// A confirmed block was delivered.
    Block(Block),
}

/// The stream of notifications a [`BlockSource`] produces.
pub type NotificationStream = BoxStream<'static, PeerNotification>;

/// Defines behavior for processing delivered blocks.
///
/// Implementations must contain their own failures: `process_block` has no
/// return channel to the peer, so nothing it does may escape to the caller.
#[async_trait]
pub trait BlockProcessor {
    /// Called once for each delivered block, in delivery order.
    async fn process_block(&mut self, block: Block);
}

/// Defines a provider of peer notifications.
#[async_trait]
pub trait BlockSource {
    /// Opens the feed and returns its notification stream.
    async fn subscribe(self) -> Result<NotificationStream, SubscribeError>;
}

/// Listens to a block source and feeds each delivered block to a processor.
pub struct BridgeListener<P, S>
where
    P: BlockProcessor + Send + Sync,
    S: BlockSource + Send + Sync,
{
    processor: P,
    source: S,
}

impl<P, S> BridgeListener<P, S>
where
    P: BlockProcessor + Send + Sync,
    S: BlockSource + Send + Sync,
{
    /// Creates a listener that drives `processor` from `source`.
    pub fn new(processor: P, source: S) -> Self {
        Self { processor, source }
    }

    /// Subscribes to the source and processes notifications until the feed
    /// ends.
    ///
    /// A subscribe failure is logged and ends the run; a block processing
    /// failure is contained by the processor and never reaches this loop.
    pub async fn run(mut self) {
        info!("registering for block events");

        let mut notifications = match self.source.subscribe().await {
            Ok(stream) => stream,
            Err(e) => {
                error!("failed to subscribe to peer notifications: {e}");
                return;
            }
        };

        while let Some(notification) = notifications.next().await {
            match notification {
                PeerNotification::Connected => info!("connected"),
                PeerNotification::Block(block) => {
                    info!("got block no. {}", block.number);
                    self.processor.process_block(block).await;
                }
            }
        }

        info!("peer notification stream ended");
    }
}

/// A block source fed through an in-process channel.
///
/// The sender half goes to whatever component receives blocks from the peer;
/// dropping it ends the stream.
pub struct ChannelBlockSource {
    receiver: mpsc::Receiver<PeerNotification>,
}

impl ChannelBlockSource {
    /// Creates a channel-backed source with the given buffer capacity,
    /// returning the sender half alongside it.
    pub fn new(capacity: usize) -> (mpsc::Sender<PeerNotification>, Self) {
        let (sender, receiver) = mpsc::channel(capacity);
        (sender, Self { receiver })
    }
}

#[async_trait]
impl BlockSource for ChannelBlockSource {
    async fn subscribe(self) -> Result<NotificationStream, SubscribeError> {
        let mut receiver = self.receiver;
        let stream = stream! {
            while let Some(notification) = receiver.recv().await {
                yield notification;
            }
        };
        Ok(Box::pin(stream))
    }
}

/// A block source backed by the peer's JSON-RPC WebSocket feed.
///
/// Emits [`PeerNotification::Connected`] once the subscription is open, then
/// one [`PeerNotification::Block`] per delivered block. A notification that
/// fails to deserialize is logged and dropped; the subscription stays up.
pub struct RpcBlockSource {
    url: String,
}

impl RpcBlockSource {
    /// Creates a source that connects to the peer at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl BlockSource for RpcBlockSource {
    async fn subscribe(self) -> Result<NotificationStream, SubscribeError> {
        let client = WsClientBuilder::default()
            .build(&self.url)
            .await
            .context(ConnectSnafu {
                url: self.url.clone(),
            })?;

        let mut subscription: Subscription<Block> = client
            .subscribe(
                BLOCK_SUBSCRIBE_METHOD,
                rpc_params![],
                BLOCK_UNSUBSCRIBE_METHOD,
            )
            .await
            .context(SubscribeSnafu)?;

        let stream = stream! {
            // The client must outlive the subscription or the feed closes.
            let _client = client;

            yield PeerNotification::Connected;

            while let Some(notification) = subscription.next().await {
                match notification {
                    Ok(block) => yield PeerNotification::Block(block),
                    Err(e) => error!("dropping undecodable block notification: {e}"),
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

/// Opening a block source failed.
#[derive(Debug, Snafu)]
pub enum SubscribeError {
    /// The WebSocket connection to the peer could not be established.
    #[snafu(display("failed to connect to peer at {url}: {source}"))]
    Connect {
        /// The peer URL that could not be reached.
        url: String,
        /// The underlying client error.
        source: jsonrpsee::core::client::Error,
    },

    /// The block subscription could not be opened on the connected peer.
    #[snafu(display("failed to open block subscription: {source}"))]
    Subscribe {
        /// The underlying client error.
        source: jsonrpsee::core::client::Error,
    },
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::block::{
        Action, ActionPayload, ApplicationEvent, ResponseExtension, TransactionGroup,
    };
    use crate::event_bridge::{
        BridgeProcessor, EventDispatcher, InvocationError, InvocationTarget, OutboundRequest,
        TransactionId, TransactionInvoker,
    };

    struct RecordingInvoker {
        sender: mpsc::UnboundedSender<OutboundRequest>,
    }

    #[async_trait]
    impl TransactionInvoker for RecordingInvoker {
        async fn invoke(
            &self,
            request: &OutboundRequest,
        ) -> Result<TransactionId, InvocationError> {
            self.sender.send(request.clone()).expect("test receiver alive");
            Ok("tx-0001".into())
        }
    }

    fn debit_block(number: u64) -> Block {
        Block {
            number,
            transaction_groups: Some(vec![TransactionGroup {
                actions: Some(vec![Action {
                    payload: Some(ActionPayload {
                        extension: Some(ResponseExtension {
                            events: Some(ApplicationEvent {
                                name: Some("Payment.debit".into()),
                                payload: br#"{"quantity":100,"to":"a"}"#.to_vec(),
                            }),
                        }),
                    }),
                }]),
            }]),
        }
    }

    fn bridge(
    ) -> (BridgeProcessor<RecordingInvoker>, mpsc::UnboundedReceiver<OutboundRequest>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let invoker = Arc::new(RecordingInvoker { sender });
        let target = InvocationTarget {
            endpoints: vec!["grpcs://peer0.consumer.hypermusic.com:7051".into()],
            network: "payment".into(),
            contract: "payment".into(),
            function: "move".into(),
            identity: "orchestrator".into(),
            organization: "gateway".into(),
        };
        let processor = BridgeProcessor::new("Payment.debit", EventDispatcher::new(invoker, target));
        (processor, receiver)
    }

    #[tokio::test]
    async fn malformed_block_does_not_stop_the_stream() {
        let (sender, source) = ChannelBlockSource::new(8);
        let (processor, mut requests) = bridge();
        let listener = tokio::spawn(BridgeListener::new(processor, source).run());

        sender.send(PeerNotification::Connected).await.unwrap();
        sender
            .send(PeerNotification::Block(Block {
                number: 43,
                transaction_groups: None,
            }))
            .await
            .unwrap();
        sender
            .send(PeerNotification::Block(debit_block(44)))
            .await
            .unwrap();

        // Block 43 fails; block 44 still produces exactly one dispatch.
        let request = timeout(Duration::from_secs(1), requests.recv())
            .await
            .expect("dispatch should happen")
            .expect("channel open");
        assert_eq!(request.args, ["100", "a"]);

        drop(sender);
        timeout(Duration::from_secs(1), listener)
            .await
            .expect("listener should stop when the feed ends")
            .unwrap();

        assert!(requests.try_recv().is_err());
    }

    #[tokio::test]
    async fn blocks_are_processed_in_delivery_order() {
        let (sender, source) = ChannelBlockSource::new(8);
        let (processor, mut requests) = bridge();
        let listener = tokio::spawn(BridgeListener::new(processor, source).run());

        for number in [1, 2, 3] {
            sender
                .send(PeerNotification::Block(debit_block(number)))
                .await
                .unwrap();
        }
        drop(sender);
        listener.await.unwrap();

        for _ in 0..3 {
            let request = timeout(Duration::from_secs(1), requests.recv())
                .await
                .expect("dispatch should happen")
                .expect("channel open");
            assert_eq!(request.args, ["100", "a"]);
        }
        assert!(requests.try_recv().is_err());
    }
}
