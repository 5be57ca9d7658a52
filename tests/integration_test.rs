//! Integration Tests - Listener Pipeline Component Testing
//!
//! Drives the accumulator, catch-up and pipeline phases against mocked
//! ports. Uses mockall for trait mocking and tokio::test for async tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mockall::predicate::*;
use mockall::{Sequence, mock};
use tokio::sync::{broadcast, mpsc};

use su_squares_listener::domain::{
    ContractEvent, EventKind, EventSource, Phase, QueueSettings, RecordOutcome, RpcFailure,
    SquareEvent, StepBounds, TickReport,
};
use su_squares_listener::error::{ListenerError, ListenerResult};
use su_squares_listener::ports::{
    DeadLetter, DeadLetterReason, FeedMessage, NoTelemetry, Telemetry,
};
use su_squares_listener::usecases::{
    ChunkOptions, EventAccumulator, ListenerPipeline, PipelineOptions, query_filter_chunked,
};

// ---- Mock Definitions ----

mock! {
    pub Updater {}

    #[async_trait::async_trait]
    impl su_squares_listener::ports::AssetUpdater for Updater {
        async fn regenerate(&self, events: &[ContractEvent]) -> anyhow::Result<()>;
        fn name(&self) -> &'static str;
    }
}

mock! {
    pub Repo {}

    #[async_trait::async_trait]
    impl su_squares_listener::ports::Repository for Repo {
        async fn load_checkpoint(&self, network: &str) -> ListenerResult<Option<u64>>;
        async fn save_checkpoint(&self, network: &str, block: u64) -> ListenerResult<()>;
        async fn append_dead_letter(&self, network: &str, letter: &DeadLetter) -> ListenerResult<()>;
        async fn load_dead_letters(&self, network: &str) -> ListenerResult<Vec<DeadLetter>>;
        async fn is_healthy(&self) -> bool;
    }
}

mock! {
    pub Source {}

    #[async_trait::async_trait]
    impl su_squares_listener::ports::LogSource for Source {
        async fn block_number(&self) -> Result<u64, RpcFailure>;
        async fn query_logs(
            &self,
            kind: EventKind,
            from_block: u64,
            to_block: u64,
        ) -> Result<Vec<ContractEvent>, RpcFailure>;
        fn event_kinds(&self) -> Vec<EventKind>;
    }
}

/// Telemetry double that remembers what it was told.
#[derive(Clone, Default)]
struct Recorder {
    phases: Arc<Mutex<Vec<Phase>>>,
    recorded: Arc<Mutex<Vec<(EventSource, usize)>>>,
    ticks: Arc<Mutex<Vec<TickReport>>>,
    head_failures: Arc<Mutex<usize>>,
    feed_losses: Arc<Mutex<Vec<Option<u64>>>>,
}

impl Telemetry for Recorder {
    fn phase_changed(&self, phase: Phase) {
        self.phases.lock().unwrap().push(phase);
    }

    fn events_recorded(&self, source: EventSource, tracked: usize) {
        self.recorded.lock().unwrap().push((source, tracked));
    }

    fn tick_completed(&self, report: &TickReport) {
        self.ticks.lock().unwrap().push(report.clone());
    }

    fn head_poll_failed(&self, _failure: &RpcFailure) {
        *self.head_failures.lock().unwrap() += 1;
    }

    fn live_feed_lost(&self, frozen_at: Option<u64>) {
        self.feed_losses.lock().unwrap().push(frozen_at);
    }
}

// ---- Helpers ----

fn personalized(block: u64, log_index: u64) -> ContractEvent {
    ContractEvent::new(
        block,
        log_index,
        &format!("0x{block:064x}"),
        SquareEvent::Personalized {
            square: u32::try_from(block % 10_000).unwrap() + 1,
        },
    )
}

fn settings(required: u64, retries: u32) -> QueueSettings {
    QueueSettings {
        required_confirmations: required,
        max_dispatch_retries: retries,
        ..QueueSettings::default()
    }
}

fn permissive_repo() -> MockRepo {
    let mut repo = MockRepo::new();
    repo.expect_load_checkpoint().returning(|_| Ok(None));
    repo.expect_load_dead_letters().returning(|_| Ok(Vec::new()));
    repo.expect_save_checkpoint().returning(|_, _| Ok(()));
    repo.expect_append_dead_letter().returning(|_, _| Ok(()));
    repo
}

fn named(mut updater: MockUpdater) -> MockUpdater {
    updater.expect_name().return_const("mock");
    updater
}

fn fast_options(fallback_start: u64) -> PipelineOptions {
    PipelineOptions {
        poll_interval: Duration::from_millis(10),
        chunk: ChunkOptions {
            bounds: StepBounds::default(),
            backoff: Duration::ZERO,
        },
        fallback_start,
    }
}

// ---- Accumulator ----

#[tokio::test]
async fn test_record_twice_dispatches_once() {
    let mut updater = MockUpdater::new();
    updater
        .expect_regenerate()
        .withf(|events: &[ContractEvent]| events.len() == 1)
        .times(1)
        .returning(|_| Ok(()));

    let mut acc = EventAccumulator::new("sunet", settings(5, 5), None, named(updater), permissive_repo());

    assert_eq!(acc.record(personalized(10, 0)), RecordOutcome::Tracked);
    assert_eq!(acc.record(personalized(10, 0)), RecordOutcome::Duplicate);
    assert_eq!(acc.pending(), 1);

    let report = acc.tick(15).await;
    assert_eq!(report.dispatched, 1);
    assert_eq!(acc.record(personalized(10, 0)), RecordOutcome::AlreadyResolved);
    acc.tick(16).await;
}

#[tokio::test]
async fn test_dispatch_order_follows_block_number() {
    let mut seq = Sequence::new();
    let mut updater = MockUpdater::new();
    for block in [5_u64, 6, 7] {
        updater
            .expect_regenerate()
            .withf(move |events: &[ContractEvent]| events[0].block_number == block)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
    }

    let mut acc = EventAccumulator::new("sunet", settings(3, 5), None, named(updater), permissive_repo());
    for block in [5, 7, 6] {
        acc.record(personalized(block, 0));
    }

    assert_eq!(acc.tick(9).await.dispatched, 0);
    assert_eq!(acc.tick(10).await.dispatched, 3);
}

#[tokio::test]
async fn test_confirmation_scenario_94_98_99() {
    let mut updater = MockUpdater::new();
    updater.expect_regenerate().times(1).returning(|_| Ok(()));

    let mut seq = Sequence::new();
    let mut repo = MockRepo::new();
    repo.expect_save_checkpoint()
        .with(eq("sunet"), eq(93))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    repo.expect_save_checkpoint()
        .with(eq("sunet"), eq(94))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));

    let mut acc = EventAccumulator::new("sunet", settings(5, 5), None, named(updater), repo);
    acc.record(personalized(94, 0));

    let at_98 = acc.tick(98).await;
    assert_eq!(at_98.dispatched, 0);
    assert_eq!(at_98.status.pending, 1);
    assert_eq!(at_98.status.blocks_until_next, Some(1));

    let at_99 = acc.tick(99).await;
    assert_eq!(at_99.dispatched, 1);
    assert_eq!(at_99.checkpoint_saved, Some(94));
    assert_eq!(acc.persisted_checkpoint(), Some(94));
}

#[tokio::test]
async fn test_gap_holds_checkpoint_below_slow_event() {
    let mut updater = MockUpdater::new();
    updater
        .expect_regenerate()
        .withf(|events: &[ContractEvent]| events[0].block_number == 10)
        .returning(|_| Err(anyhow::anyhow!("renderer offline")));

    let mut acc = EventAccumulator::new("sunet", settings(2, 100), None, named(updater), permissive_repo());
    acc.record(personalized(10, 0));
    acc.record(personalized(20, 0));

    for head in 30..40 {
        let report = acc.tick(head).await;
        assert_eq!(report.dispatched, 0);
        assert!(acc.checkpoint().unwrap() <= 9);
    }
}

#[tokio::test]
async fn test_exhausted_dispatch_is_dead_lettered_and_pipeline_continues() {
    let mut updater = MockUpdater::new();
    updater
        .expect_regenerate()
        .withf(|events: &[ContractEvent]| events[0].block_number == 10)
        .times(2)
        .returning(|_| Err(anyhow::anyhow!("exit status 1")));
    updater
        .expect_regenerate()
        .withf(|events: &[ContractEvent]| events[0].block_number == 11)
        .times(1)
        .returning(|_| Ok(()));

    let mut repo = MockRepo::new();
    repo.expect_save_checkpoint().returning(|_, _| Ok(()));
    repo.expect_append_dead_letter()
        .withf(|network: &str, letter: &DeadLetter| {
            network == "sunet"
                && letter.event.block_number == 10
                && matches!(letter.reason, DeadLetterReason::Failed { attempts: 2, .. })
        })
        .times(1)
        .returning(|_, _| Ok(()));

    let mut acc = EventAccumulator::new("sunet", settings(1, 2), None, named(updater), repo);
    acc.record(personalized(10, 0));
    acc.record(personalized(11, 0));

    let first = acc.tick(20).await;
    assert_eq!((first.dispatched, first.failed_dispatches), (0, 1));

    let second = acc.tick(20).await;
    assert_eq!((second.dispatched, second.exhausted), (1, 1));
    assert_eq!(acc.pending(), 0);
    assert_eq!(acc.checkpoint(), Some(19));
}

#[tokio::test]
async fn test_checkpoint_save_failure_is_retried() {
    let mut updater = MockUpdater::new();
    updater.expect_regenerate().never();

    let mut seq = Sequence::new();
    let mut repo = MockRepo::new();
    repo.expect_save_checkpoint()
        .with(eq("sunet"), eq(45))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Err(ListenerError::Io(std::io::Error::other("disk full"))));
    repo.expect_save_checkpoint()
        .with(eq("sunet"), eq(45))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));

    let mut acc = EventAccumulator::new("sunet", settings(5, 5), None, named(updater), repo);
    assert_eq!(acc.tick(50).await.checkpoint_saved, None);
    assert_eq!(acc.tick(50).await.checkpoint_saved, Some(45));
    assert_eq!(acc.tick(50).await.checkpoint_saved, None);
}

// ---- Chunked query ----

#[tokio::test]
async fn test_chunked_query_converges_under_500_block_cap() {
    let blocks: Vec<u64> = (1..=10_000).step_by(97).collect();
    let stored: Vec<ContractEvent> = blocks.iter().map(|b| personalized(*b, 0)).collect();

    let mut source = MockSource::new();
    source
        .expect_query_logs()
        .returning(move |_, from, to| {
            if to - from + 1 > 500 {
                return Err(RpcFailure::new(
                    Some(-32614),
                    "eth_getLogs is limited to a 500 block range",
                ));
            }
            Ok(stored
                .iter()
                .filter(|e| (from..=to).contains(&e.block_number))
                .cloned()
                .collect())
        });

    let options = ChunkOptions {
        bounds: StepBounds {
            initial: 2000,
            min: 25,
            max: 10_000,
        },
        backoff: Duration::ZERO,
    };
    let mut first_ok = None;
    let events = query_filter_chunked(&source, EventKind::Personalized, 1, 10_000, &options, |p| {
        first_ok.get_or_insert(*p);
    })
    .await
    .unwrap();

    let got: Vec<u64> = events.iter().map(|e| e.block_number).collect();
    assert_eq!(got, blocks);
    let first_ok = first_ok.unwrap();
    assert!(first_ok.to - first_ok.from < 500);
    assert!(first_ok.rejected <= 3);
}

// ---- Pipeline ----

#[tokio::test]
async fn test_corrupt_checkpoint_falls_back_to_start_block() {
    let mut repo = MockRepo::new();
    repo.expect_load_checkpoint().returning(|_| {
        Err(ListenerError::CheckpointCorruption {
            path: "data/sunet/loadedTo.json".into(),
            reason: "expected value at line 1".into(),
        })
    });
    repo.expect_load_dead_letters().returning(|_| Ok(Vec::new()));

    let pipeline = ListenerPipeline::start(
        "sunet",
        MockSource::new(),
        named(MockUpdater::new()),
        repo,
        NoTelemetry,
        settings(5, 5),
        fast_options(1_234),
    )
    .await
    .unwrap();

    assert_eq!(pipeline.catch_up_start(), 1_234);
    assert_eq!(pipeline.phase(), Phase::Startup);
}

#[tokio::test]
async fn test_checkpoint_resumes_after_last_processed_block() {
    let mut repo = MockRepo::new();
    repo.expect_load_checkpoint()
        .with(eq("sunet"))
        .returning(|_| Ok(Some(500)));
    repo.expect_load_dead_letters().returning(|_| Ok(Vec::new()));

    let pipeline = ListenerPipeline::start(
        "sunet",
        MockSource::new(),
        named(MockUpdater::new()),
        repo,
        Recorder::default(),
        settings(5, 5),
        fast_options(1),
    )
    .await
    .unwrap();

    assert_eq!(pipeline.catch_up_start(), 501);
}

#[tokio::test]
async fn test_catch_up_and_live_duplicate_recorded_once() {
    let shared = personalized(90, 2);
    let catch_up_copy = shared.clone();

    let mut source = MockSource::new();
    source.expect_block_number().returning(|| Ok(100));
    source
        .expect_event_kinds()
        .returning(|| vec![EventKind::Personalized]);
    source
        .expect_query_logs()
        .with(eq(EventKind::Personalized), eq(1), eq(100))
        .returning(move |_, _, _| Ok(vec![catch_up_copy.clone()]));

    let mut updater = MockUpdater::new();
    updater
        .expect_regenerate()
        .withf(|events: &[ContractEvent]| events.len() == 1 && events[0].block_number == 90)
        .times(1)
        .returning(|_| Ok(()));

    let telemetry = Recorder::default();
    let mut pipeline = ListenerPipeline::start(
        "sunet",
        source,
        named(updater),
        permissive_repo(),
        telemetry.clone(),
        settings(5, 5),
        fast_options(1),
    )
    .await
    .unwrap();

    // The live subscription saw the same log while catch-up was running.
    let (feed_tx, feed_rx) = mpsc::unbounded_channel();
    feed_tx.send(FeedMessage::Event(shared)).unwrap();

    let report = pipeline.catch_up().await.unwrap();
    assert_eq!((report.from, report.to), (1, 100));
    assert_eq!((report.fetched, report.tracked), (1, 1));
    assert_eq!(report.tick.dispatched, 1);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    shutdown_tx.send(()).unwrap();
    pipeline.run(feed_rx, shutdown_rx).await.unwrap();

    let recorded = telemetry.recorded.lock().unwrap().clone();
    assert_eq!(recorded, vec![(EventSource::CatchUp, 1)]);
    assert_eq!(
        *telemetry.phases.lock().unwrap(),
        vec![Phase::Startup, Phase::CatchUp, Phase::Live]
    );
}

#[tokio::test]
async fn test_live_events_are_ticked_on_poll() {
    let heads = Arc::new(Mutex::new(vec![100_u64, 106]));
    let mut source = MockSource::new();
    let next_head = Arc::clone(&heads);
    source
        .expect_block_number()
        .returning(move || Ok(next_head.lock().unwrap().remove(0)));
    source.expect_event_kinds().returning(Vec::new);

    let mut updater = MockUpdater::new();
    updater
        .expect_regenerate()
        .withf(|events: &[ContractEvent]| events[0].block_number == 101)
        .times(1)
        .returning(|_| Ok(()));

    let telemetry = Recorder::default();
    let mut pipeline = ListenerPipeline::start(
        "sunet",
        source,
        named(updater),
        permissive_repo(),
        telemetry.clone(),
        settings(5, 5),
        fast_options(1),
    )
    .await
    .unwrap();
    pipeline.catch_up().await.unwrap();

    pipeline.handle_feed_message(FeedMessage::Event(personalized(101, 0)));

    let report = pipeline.poll().await.unwrap();
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.status.checkpoint, Some(101));
    assert!(!pipeline.feed_lost());
    assert!(telemetry
        .recorded
        .lock()
        .unwrap()
        .contains(&(EventSource::Live, 1)));
}

#[tokio::test]
async fn test_closed_feed_freezes_checkpoint_for_next_catch_up() {
    let heads = Arc::new(Mutex::new(vec![105_u64, 5_000, 5_100]));
    let mut source = MockSource::new();
    let next_head = Arc::clone(&heads);
    source
        .expect_block_number()
        .returning(move || Ok(next_head.lock().unwrap().remove(0)));
    source
        .expect_event_kinds()
        .returning(|| vec![EventKind::Personalized]);
    source
        .expect_query_logs()
        .with(eq(EventKind::Personalized), eq(101), eq(105))
        .times(1)
        .returning(|_, _, _| Ok(Vec::new()));

    let saved = Arc::new(Mutex::new(Vec::new()));
    let saved_by_repo = Arc::clone(&saved);
    let mut repo = MockRepo::new();
    repo.expect_load_checkpoint().returning(|_| Ok(Some(100)));
    repo.expect_load_dead_letters().returning(|_| Ok(Vec::new()));
    repo.expect_save_checkpoint().returning(move |_, block| {
        saved_by_repo.lock().unwrap().push(block);
        Ok(())
    });

    let telemetry = Recorder::default();
    let mut pipeline = ListenerPipeline::start(
        "sunet",
        source,
        named(MockUpdater::new()),
        repo,
        telemetry.clone(),
        settings(5, 5),
        fast_options(1),
    )
    .await
    .unwrap();
    pipeline.catch_up().await.unwrap();

    pipeline.handle_feed_message(FeedMessage::Closed {
        kind: EventKind::Personalized,
        reason: "subscription stream ended".into(),
    });
    assert!(pipeline.feed_lost());

    let report = pipeline.poll().await.unwrap();
    assert_eq!(report.status.checkpoint, Some(105));
    let report = pipeline.poll().await.unwrap();
    assert_eq!(report.checkpoint_saved, None);

    // Blocks 106..=5000 were never covered by the feed; the next start
    // must query them.
    assert_eq!(*saved.lock().unwrap(), vec![105]);
    assert_eq!(pipeline.catch_up_start(), 106);
    assert_eq!(*telemetry.feed_losses.lock().unwrap(), vec![Some(105)]);
}

#[tokio::test]
async fn test_disconnected_feed_is_noticed_when_going_live() {
    let mut source = MockSource::new();
    source.expect_block_number().returning(|| Ok(100));
    source.expect_event_kinds().returning(Vec::new);

    let telemetry = Recorder::default();
    let mut pipeline = ListenerPipeline::start(
        "sunet",
        source,
        named(MockUpdater::new()),
        permissive_repo(),
        telemetry.clone(),
        settings(5, 5),
        fast_options(1),
    )
    .await
    .unwrap();
    pipeline.catch_up().await.unwrap();

    // Every forwarding task ended while catch-up was running.
    let (feed_tx, feed_rx) = mpsc::unbounded_channel::<FeedMessage>();
    drop(feed_tx);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    shutdown_tx.send(()).unwrap();
    pipeline.run(feed_rx, shutdown_rx).await.unwrap();

    assert_eq!(*telemetry.feed_losses.lock().unwrap(), vec![Some(100)]);
}

#[tokio::test]
async fn test_removed_log_is_never_dispatched() {
    let mut source = MockSource::new();
    let heads = Arc::new(Mutex::new(vec![100_u64, 200]));
    let next_head = Arc::clone(&heads);
    source
        .expect_block_number()
        .returning(move || Ok(next_head.lock().unwrap().remove(0)));
    source.expect_event_kinds().returning(Vec::new);

    let mut updater = MockUpdater::new();
    updater.expect_regenerate().never();

    let mut pipeline = ListenerPipeline::start(
        "sunet",
        source,
        named(updater),
        permissive_repo(),
        NoTelemetry,
        settings(5, 5),
        fast_options(1),
    )
    .await
    .unwrap();
    pipeline.catch_up().await.unwrap();

    let reorged = personalized(101, 4);
    pipeline.handle_feed_message(FeedMessage::Event(reorged.clone()));
    pipeline.handle_feed_message(FeedMessage::Removed {
        id: reorged.id.clone(),
        block: reorged.block_number,
    });

    let report = pipeline.poll().await.unwrap();
    assert_eq!(report.dispatched, 0);
    assert_eq!(report.status.pending, 0);
    assert_eq!(report.status.checkpoint, Some(195));
}

#[tokio::test]
async fn test_head_poll_failure_is_not_fatal() {
    let mut source = MockSource::new();
    source
        .expect_block_number()
        .returning(|| Err(RpcFailure::transport("connection reset")));

    let telemetry = Recorder::default();
    let mut pipeline = ListenerPipeline::start(
        "sunet",
        source,
        named(MockUpdater::new()),
        permissive_repo(),
        telemetry.clone(),
        settings(5, 5),
        fast_options(1),
    )
    .await
    .unwrap();

    assert!(pipeline.poll().await.is_none());
    assert_eq!(*telemetry.head_failures.lock().unwrap(), 1);
    assert!(telemetry.ticks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_fatal_query_error_aborts_catch_up() {
    let mut source = MockSource::new();
    source.expect_block_number().returning(|| Ok(50));
    source
        .expect_event_kinds()
        .returning(|| vec![EventKind::Transfer]);
    source
        .expect_query_logs()
        .returning(|_, _, _| Err(RpcFailure::new(Some(-32601), "the method eth_getLogs does not exist")));

    let mut pipeline = ListenerPipeline::start(
        "sunet",
        source,
        named(MockUpdater::new()),
        permissive_repo(),
        Recorder::default(),
        settings(5, 5),
        fast_options(1),
    )
    .await
    .unwrap();

    let err = pipeline.catch_up().await.unwrap_err();
    assert!(matches!(err, ListenerError::Rpc { from: 1, to: 50, .. }));
}
