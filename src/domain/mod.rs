//! Domain layer - Event, queue and classification logic.
//!
//! Pure state for the listener pipeline: decoded contract events, the
//! confirmation queue, adaptive window sizing and provider error
//! classification. No I/O and no alloy types here (hexagonal inner ring).

pub mod event;
pub mod progress;
pub mod queue;
pub mod range_limit;
pub mod step;

pub use event::{ContractEvent, EventId, EventKind, SquareEvent, TrackedEvent};
pub use progress::{ChunkProgress, EventSource, Phase, TickReport};
pub use queue::{ConfirmationQueue, QueueSettings, QueueStatus, RecordOutcome};
pub use range_limit::{QueryErrorClass, RpcFailure, classify};
pub use step::{StepBounds, StepController};
