//! Su Squares Contract Bindings - Deployment Records and Event Decoding
//!
//! Loads the deployment record for the selected network, builds log
//! filters for each event kind, and decodes raw logs into domain events.
//! Addresses come only from the deployment records written by the
//! deployment tooling; nothing is hardcoded.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use alloy::primitives::{Address, Log as PrimitiveLog, U256};
use alloy::rpc::types::{Filter, Log};
use alloy::sol;
use alloy::sol_types::SolEvent;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::domain::{ContractEvent, EventKind, SquareEvent};
use crate::error::{ListenerError, ListenerResult};

sol! {
    #[derive(Debug)]
    contract SuMain {
        event Personalized(uint256 squareNumber);
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
    }

    #[derive(Debug)]
    contract SuSquaresUnderlay {
        event PersonalizedUnderlay(uint256 indexed squareNumber, bytes rgbData, string title, string href);
    }
}

/// One contract's deployment, as written by the deployment scripts.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub address: Address,
    pub chain_id: u64,
    #[serde(default)]
    pub deployer: Option<Address>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    pub block_number: u64,
    #[serde(default)]
    pub deployed_at: Option<String>,
}

/// All deployment records for one network, keyed by contract name.
#[derive(Debug, Clone)]
pub struct DeploymentBook {
    network: String,
    contracts: BTreeMap<String, DeploymentRecord>,
}

impl DeploymentBook {
    /// Read `<dir>/<network>.json`.
    ///
    /// # Errors
    /// `ListenerError::Config` if the file is missing or malformed, or if
    /// it has no `SuMain` record.
    #[instrument(skip(dir), fields(dir = %dir.display()))]
    pub fn load(dir: &Path, network: &str) -> ListenerResult<Self> {
        let path = dir.join(format!("{network}.json"));
        let content = std::fs::read_to_string(&path).map_err(|e| {
            ListenerError::config(format!(
                "failed to read deployment records {}: {e}",
                path.display()
            ))
        })?;
        let book = Self::from_json(network, &content).map_err(|e| {
            ListenerError::config(format!("{}: {e}", path.display()))
        })?;

        for (name, record) in &book.contracts {
            info!(
                contract = %name,
                address = %record.address,
                block = record.block_number,
                "Loaded deployment record"
            );
        }
        Ok(book)
    }

    /// Parse a deployment record document.
    pub fn from_json(network: &str, json: &str) -> Result<Self, String> {
        let contracts: BTreeMap<String, DeploymentRecord> =
            serde_json::from_str(json).map_err(|e| format!("invalid deployment JSON: {e}"))?;

        if !contracts.contains_key(EventKind::Personalized.contract()) {
            return Err(format!(
                "no {} deployment for network {network}",
                EventKind::Personalized.contract()
            ));
        }

        let mut chain_ids = contracts.values().map(|r| r.chain_id);
        if let Some(first) = chain_ids.next() {
            if chain_ids.any(|id| id != first) {
                return Err("deployment records disagree on chainId".to_string());
            }
        }

        Ok(Self {
            network: network.to_string(),
            contracts,
        })
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn get(&self, contract: &str) -> Option<&DeploymentRecord> {
        self.contracts.get(contract)
    }

    /// Chain id shared by every record.
    pub fn chain_id(&self) -> Option<u64> {
        self.contracts.values().next().map(|r| r.chain_id)
    }

    /// Earliest deployment block, the natural first catch-up block.
    pub fn earliest_block(&self) -> Option<u64> {
        self.contracts.values().map(|r| r.block_number).min()
    }
}

/// Contract addresses resolved per event kind.
#[derive(Debug, Clone)]
pub struct ContractSet {
    addresses: HashMap<EventKind, Address>,
}

impl ContractSet {
    /// Resolve addresses for every event kind whose contract is deployed.
    pub fn from_book(book: &DeploymentBook) -> Self {
        let mut addresses = HashMap::new();
        for kind in EventKind::ALL {
            match book.get(kind.contract()) {
                Some(record) => {
                    addresses.insert(kind, record.address);
                }
                None => warn!(
                    event = %kind,
                    contract = kind.contract(),
                    "Contract not deployed on this network, skipping its events"
                ),
            }
        }
        Self { addresses }
    }

    /// Event kinds with a known contract address.
    pub fn kinds(&self) -> Vec<EventKind> {
        EventKind::ALL
            .into_iter()
            .filter(|kind| self.addresses.contains_key(kind))
            .collect()
    }

    pub fn address(&self, kind: EventKind) -> Option<Address> {
        self.addresses.get(&kind).copied()
    }

    /// Open-ended filter (for subscriptions).
    pub fn filter(&self, kind: EventKind) -> Option<Filter> {
        let address = self.address(kind)?;
        Some(
            Filter::new()
                .address(address)
                .event_signature(signature(kind)),
        )
    }

    /// Filter over an inclusive block range.
    pub fn range_filter(&self, kind: EventKind, from_block: u64, to_block: u64) -> Option<Filter> {
        Some(self.filter(kind)?.from_block(from_block).to_block(to_block))
    }

    /// Decode an RPC log of a known kind.
    ///
    /// # Errors
    /// Fails for pending logs (no block/tx/index) or ABI mismatches.
    pub fn decode(&self, kind: EventKind, log: &Log) -> Result<ContractEvent, String> {
        let block_number = log.block_number.ok_or("log has no block number")?;
        let log_index = log.log_index.ok_or("log has no log index")?;
        let tx_hash = log.transaction_hash.ok_or("log has no transaction hash")?;

        let payload = decode_payload(kind, &log.inner).map_err(|e| format!("{kind}: {e}"))?;
        Ok(ContractEvent::new(
            block_number,
            log_index,
            &tx_hash.to_string(),
            payload,
        ))
    }
}

/// topic0 for each event kind.
pub const fn signature(kind: EventKind) -> alloy::primitives::B256 {
    match kind {
        EventKind::Personalized => SuMain::Personalized::SIGNATURE_HASH,
        EventKind::Transfer => SuMain::Transfer::SIGNATURE_HASH,
        EventKind::UnderlayPersonalized => SuSquaresUnderlay::PersonalizedUnderlay::SIGNATURE_HASH,
    }
}

fn decode_payload(kind: EventKind, log: &PrimitiveLog) -> Result<SquareEvent, String> {
    let payload = match kind {
        EventKind::Personalized => {
            let decoded = SuMain::Personalized::decode_log(log, true).map_err(|e| e.to_string())?;
            SquareEvent::Personalized {
                square: square_number(decoded.data.squareNumber)?,
            }
        }
        EventKind::Transfer => {
            let decoded = SuMain::Transfer::decode_log(log, true).map_err(|e| e.to_string())?;
            SquareEvent::Transfer {
                from: decoded.data.from.to_string(),
                to: decoded.data.to.to_string(),
                square: square_number(decoded.data.tokenId)?,
            }
        }
        EventKind::UnderlayPersonalized => {
            let decoded = SuSquaresUnderlay::PersonalizedUnderlay::decode_log(log, true)
                .map_err(|e| e.to_string())?;
            SquareEvent::UnderlayPersonalized {
                square: square_number(decoded.data.squareNumber)?,
                rgb_data: alloy::hex::encode_prefixed(&decoded.data.rgbData),
                title: decoded.data.title.clone(),
                href: decoded.data.href.clone(),
            }
        }
    };
    Ok(payload)
}

fn square_number(value: U256) -> Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("square number {value} out of range"))
}
