//! WebSocket RPC Provider - alloy-rs 0.9 Connection Management
//!
//! Opens the WebSocket connection to the chain node and validates it
//! with a liveness call (current block height) before anything else
//! runs. There is no reconnect: if the socket drops later, the live
//! feed reports it and the operator restarts the process.

use alloy::providers::{Provider, ProviderBuilder, RootProvider, WsConnect};
use alloy::pubsub::PubSubFrontend;
use alloy::transports::{RpcError, TransportErrorKind};
use tracing::{info, instrument};

use crate::config::NetworkConfig;
use crate::domain::RpcFailure;
use crate::error::{ListenerError, ListenerResult};

/// The concrete pubsub-capable provider shared by all chain adapters.
pub type WsProvider = RootProvider<PubSubFrontend>;

/// Shared WebSocket provider for one network.
///
/// Cloning the inner provider is cheap: it shares the same socket.
pub struct ChainProvider {
    /// The alloy provider over the WebSocket frontend.
    provider: WsProvider,
    /// Chain id reported by the node at connect time.
    chain_id: u64,
}

impl ChainProvider {
    /// Connect and run the liveness check.
    ///
    /// # Errors
    /// `ListenerError::Connection` if the socket cannot be opened or the
    /// node does not answer `eth_blockNumber` / `eth_chainId`.
    #[instrument(skip_all, fields(network = %config.name))]
    pub async fn connect(config: &NetworkConfig) -> ListenerResult<Self> {
        let ws = WsConnect::new(config.rpc_ws_url.clone());

        let provider = ProviderBuilder::new()
            .on_ws(ws)
            .await
            .map_err(|e| ListenerError::Connection(format!("failed to open WebSocket: {e}")))?
            .root()
            .clone();

        let head_at_connect = provider
            .get_block_number()
            .await
            .map_err(|e| ListenerError::Connection(format!("liveness check failed: {e}")))?;

        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| ListenerError::Connection(format!("failed to query chain id: {e}")))?;

        info!(chain_id, head = head_at_connect, "Connected to chain RPC");

        Ok(Self { provider, chain_id })
    }

    /// Get a handle to the alloy provider.
    pub fn inner(&self) -> WsProvider {
        self.provider.clone()
    }

    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

/// Strip an alloy transport error down to code + message.
pub fn rpc_failure(err: &RpcError<TransportErrorKind>) -> RpcFailure {
    match err.as_error_resp() {
        Some(payload) => RpcFailure::new(Some(payload.code), payload.message.to_string()),
        None => RpcFailure::transport(err.to_string()),
    }
}
