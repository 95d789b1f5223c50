//! This binary runs the ledger event bridge: it subscribes to a peer's
//! block feed, watches for a configured contract event, and forwards each
//! match as a new transaction submitted through an HTTP gateway.
//!
//! The bridge is role-gated: it only registers for block events when this
//! process runs as the gateway organization. Any other role logs and exits.
//!
//! ## Usage
//! ```sh
//! ORG=gateway cargo run -- --peer-url ws://peer0.consumer.hypermusic.com:7053 \
//!     --gateway-endpoints http://gateway.hypermusic.com:7054
//! ```

use std::sync::Arc;

use clap::Parser;
use log::info;
use snafu::{ResultExt, Snafu};
use url::Url;

use event_bridge::chain_listener::{BridgeListener, RpcBlockSource};
use event_bridge::event_bridge::{BridgeProcessor, EventDispatcher, InvocationTarget};
use event_bridge::gateway::HttpGatewayInvoker;

/// The deployment role the bridge is enabled for.
const BRIDGE_ROLE: &str = "gateway";

/// Errors raised while wiring the bridge together.
#[derive(Debug, Snafu)]
enum BridgeError {
    /// The peer feed URL did not parse.
    #[snafu(display("invalid peer URL '{url}': {source}"))]
    PeerUrl {
        /// The offending URL value.
        url: String,
        /// The underlying parse error.
        source: url::ParseError,
    },

    /// A gateway endpoint did not parse.
    #[snafu(display("invalid gateway endpoint '{url}': {source}"))]
    GatewayEndpoint {
        /// The offending URL value.
        url: String,
        /// The underlying parse error.
        source: url::ParseError,
    },
}

/// Result alias for bridge wiring errors.
type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// CLI arguments parser using `clap` derive syntax
#[derive(Parser, Debug)]
#[command(
    name = "Ledger Event Bridge",
    version,
    about = "Watches a peer's block feed for contract events and forwards them as downstream invocations"
)]
struct Cli {
    /// Deployment role of this process; anything but "gateway" disables the bridge
    #[arg(long, env = "ORG", default_value = "")]
    org: String,

    /// WebSocket URL of the peer's block feed
    #[arg(long, default_value = "ws://127.0.0.1:7053")]
    peer_url: String,

    /// Gateway endpoints to submit invocations through, in preference order
    #[arg(long, value_delimiter = ',', default_value = "http://127.0.0.1:7054")]
    gateway_endpoints: Vec<String>,

    /// Name of the contract event to forward
    #[arg(long, default_value = "Payment.debit")]
    target_event: String,

    /// Ledger network (channel) the target contract lives on
    #[arg(long, default_value = "payment")]
    network: String,

    /// Target contract name
    #[arg(long, default_value = "payment")]
    contract: String,

    /// Contract function invoked for each forwarded event
    #[arg(long, default_value = "move")]
    function: String,

    /// Identity submitting the invocations
    #[arg(long, default_value = "orchestrator")]
    identity: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Cli::parse();

    if args.org != BRIDGE_ROLE {
        info!("enabled for {BRIDGE_ROLE} only");
        return Ok(());
    }

    let peer_url = Url::parse(&args.peer_url).context(PeerUrlSnafu {
        url: args.peer_url.clone(),
    })?;
    for endpoint in &args.gateway_endpoints {
        Url::parse(endpoint).context(GatewayEndpointSnafu {
            url: endpoint.clone(),
        })?;
    }

    let target = InvocationTarget {
        endpoints: args.gateway_endpoints,
        network: args.network,
        contract: args.contract,
        function: args.function,
        identity: args.identity,
        organization: args.org,
    };

    let dispatcher = EventDispatcher::new(Arc::new(HttpGatewayInvoker::new()), target);
    let processor = BridgeProcessor::new(args.target_event, dispatcher);
    let source = RpcBlockSource::new(peer_url.as_str());

    BridgeListener::new(processor, source).run().await;
    Ok(())
}
