//! # HTTP Gateway Invoker
//!
//! A [`TransactionInvoker`] that submits invocation requests to an HTTP
//! gateway fronting the ledger. Endpoints are tried in the order given by
//! the request; the first successful submission wins and no retries happen
//! beyond the endpoint list. Credential handling, transport security, and
//! timeout policy live behind the gateway, not here.

use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::event_bridge::{InvocationError, OutboundRequest, TransactionId, TransactionInvoker};

/// Submits invocations over HTTP to the configured gateway endpoints.
pub struct HttpGatewayInvoker {
    client: reqwest::Client,
}

impl HttpGatewayInvoker {
    /// Creates an invoker with a fresh HTTP client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpGatewayInvoker {
    fn default() -> Self {
        Self::new()
    }
}

/// The invocation body posted to a gateway endpoint.
#[derive(Debug, Serialize)]
struct InvokeBody<'a> {
    /// The ledger network (channel) of the target contract.
    network: &'a str,
    /// The target contract name.
    contract: &'a str,
    /// The contract function to invoke.
    function: &'a str,
    /// The argument values, serialized as one JSON array string.
    args: String,
    /// The identity submitting the transaction.
    identity: &'a str,
    /// The organization the identity belongs to.
    organization: &'a str,
}

impl<'a> InvokeBody<'a> {
    fn from_request(request: &'a OutboundRequest) -> Self {
        // Serializing a string array cannot fail.
        let args = serde_json::to_string(&request.args).expect("string arrays always serialize");
        Self {
            network: &request.network,
            contract: &request.contract,
            function: &request.function,
            args,
            identity: &request.identity,
            organization: &request.organization,
        }
    }
}

/// The gateway's answer to a successful invocation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvokeResponse {
    /// The identifier of the submitted transaction.
    transaction_id: String,
}

#[async_trait]
impl TransactionInvoker for HttpGatewayInvoker {
    async fn invoke(&self, request: &OutboundRequest) -> Result<TransactionId, InvocationError> {
        let body = InvokeBody::from_request(request);
        let mut last_error = InvocationError::NoEndpoints;

        for endpoint in &request.endpoints {
            let url = format!("{}/invoke", endpoint.trim_end_matches('/'));

            let response = match self.client.post(&url).json(&body).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!("gateway {endpoint} unreachable: {e}");
                    last_error = InvocationError::Transport {
                        endpoint: endpoint.clone(),
                        source: e,
                    };
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                warn!("gateway {endpoint} rejected the invocation: {status}");
                last_error = InvocationError::Rejected {
                    endpoint: endpoint.clone(),
                    status: status.as_u16(),
                };
                continue;
            }

            match response.json::<InvokeResponse>().await {
                Ok(result) => return Ok(result.transaction_id),
                Err(e) => {
                    warn!("gateway {endpoint} returned an unreadable response: {e}");
                    last_error = InvocationError::InvalidResponse {
                        endpoint: endpoint.clone(),
                        source: e,
                    };
                }
            }
        }

        Err(last_error)
    }
}
