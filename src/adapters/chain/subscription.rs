//! Live Log Subscription - `eth_subscribe("logs")` Forwarding
//!
//! One forwarding task per event kind. Each task decodes incoming logs
//! and pushes them into a single unbounded channel that the pipeline
//! drains. The channel is opened before catch-up starts, so events that
//! arrive while history is being fetched sit in the channel until the
//! pipeline goes live.

use alloy::providers::Provider;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::contracts::ContractSet;
use super::provider::WsProvider;
use crate::domain::EventKind;
use crate::error::{ListenerError, ListenerResult};
use crate::ports::FeedMessage;

/// Handles to the running forwarders plus the receiving end.
pub struct LiveFeed {
    pub receiver: mpsc::UnboundedReceiver<FeedMessage>,
    pub tasks: Vec<JoinHandle<()>>,
}

/// Stop forwarding tasks at shutdown.
pub fn abort_all(tasks: &[JoinHandle<()>]) {
    for task in tasks {
        task.abort();
    }
}

/// Subscribe to every event kind the deployment supports.
///
/// # Errors
/// `ListenerError::Connection` if any subscription request is refused.
#[instrument(skip_all)]
pub async fn open_live_feed(provider: &WsProvider, contracts: &ContractSet) -> ListenerResult<LiveFeed> {
    let (tx, receiver) = mpsc::unbounded_channel();
    let mut tasks = Vec::new();

    for kind in contracts.kinds() {
        let Some(filter) = contracts.filter(kind) else {
            continue;
        };
        let subscription = provider.subscribe_logs(&filter).await.map_err(|e| {
            ListenerError::Connection(format!("failed to subscribe to {kind} logs: {e}"))
        })?;

        info!(event = %kind, "Subscribed to live logs");
        let stream = subscription.into_stream();
        tasks.push(tokio::spawn(forward(kind, stream, contracts.clone(), tx.clone())));
    }

    Ok(LiveFeed { receiver, tasks })
}

async fn forward<S>(
    kind: EventKind,
    stream: S,
    contracts: ContractSet,
    tx: mpsc::UnboundedSender<FeedMessage>,
) where
    S: futures_util::Stream<Item = alloy::rpc::types::Log> + Send + 'static,
{
    let mut stream = std::pin::pin!(stream);
    while let Some(log) = stream.next().await {
        let message = match contracts.decode(kind, &log) {
            Ok(event) if log.removed => {
                debug!(event = %kind, event_id = %event.id, "Live log removed by reorg");
                FeedMessage::Removed {
                    id: event.id,
                    block: event.block_number,
                }
            }
            Ok(event) => FeedMessage::Event(event),
            Err(reason) => {
                warn!(event = %kind, %reason, removed = log.removed, "Skipping undecodable live log");
                continue;
            }
        };
        if tx.send(message).is_err() {
            return;
        }
    }

    let _ = tx.send(FeedMessage::Closed {
        kind,
        reason: "subscription stream ended".to_string(),
    });
}
