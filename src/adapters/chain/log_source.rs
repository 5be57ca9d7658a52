//! Chain Log Source - `LogSource` over the WebSocket Provider
//!
//! Ranged `eth_getLogs` per event kind, decoded through `ContractSet`.
//! Provider errors are reduced to `RpcFailure` so the chunked query
//! helper can tell range-limit rejections apart from real failures.

use alloy::providers::Provider;
use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use super::contracts::ContractSet;
use super::provider::{WsProvider, rpc_failure};
use crate::domain::{ContractEvent, EventKind, RpcFailure};
use crate::ports::LogSource;

/// Historical log access for one network's deployment.
pub struct ChainLogSource {
    provider: WsProvider,
    contracts: ContractSet,
}

impl ChainLogSource {
    pub fn new(provider: WsProvider, contracts: ContractSet) -> Self {
        Self {
            provider,
            contracts,
        }
    }
}

#[async_trait]
impl LogSource for ChainLogSource {
    async fn block_number(&self) -> Result<u64, RpcFailure> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| rpc_failure(&e))
    }

    #[instrument(skip(self), level = "debug")]
    async fn query_logs(
        &self,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<ContractEvent>, RpcFailure> {
        let Some(filter) = self.contracts.range_filter(kind, from_block, to_block) else {
            return Ok(Vec::new());
        };

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| rpc_failure(&e))?;

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            if log.removed {
                continue;
            }
            match self.contracts.decode(kind, log) {
                Ok(event) => events.push(event),
                Err(reason) => warn!(
                    event = %kind,
                    tx = ?log.transaction_hash,
                    %reason,
                    "Skipping undecodable log"
                ),
            }
        }

        debug!(
            event = %kind,
            from_block,
            to_block,
            count = events.len(),
            "Queried logs"
        );
        Ok(events)
    }

    fn event_kinds(&self) -> Vec<EventKind> {
        self.contracts.kinds()
    }
}
