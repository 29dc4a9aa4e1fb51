//! End-to-end scenarios over the mock chain client: backfill, polling,
//! live delivery, failure retry, and crash-resume equivalence.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use registry_chain::test_utils::{logs, MockChainClient};
use registry_chain::ChainError;
use registry_ingest::{
    BackfillOptions, Backfiller, IngestError, LiveIngestor, LiveOptions, PollOptions, Poller,
    RetryStrategy,
};
use registry_store::{
    IssuerStatus, ProgressTracker, Projector, RegistryStore, SqliteRegistryStore,
};
use tokio::sync::watch;

struct Harness {
    client: Arc<MockChainClient>,
    store: Arc<SqliteRegistryStore>,
    projector: Arc<Projector>,
    progress: Arc<ProgressTracker>,
}

impl Harness {
    fn new(height: u64, start_block: u64) -> Self {
        Self::with_client(Arc::new(MockChainClient::new(height)), start_block)
    }

    fn with_client(client: Arc<MockChainClient>, start_block: u64) -> Self {
        let store = Arc::new(SqliteRegistryStore::in_memory().unwrap());
        let projector = Arc::new(Projector::new(store.clone()));
        let progress = Arc::new(ProgressTracker::new(store.clone(), start_block));
        Self {
            client,
            store,
            projector,
            progress,
        }
    }

    fn backfiller(&self, options: BackfillOptions, shutdown: watch::Receiver<bool>) -> Backfiller {
        Backfiller::new(
            self.client.clone(),
            self.projector.clone(),
            self.progress.clone(),
            options,
            shutdown,
        )
    }

    fn poller(&self, options: PollOptions, shutdown: watch::Receiver<bool>) -> Poller {
        Poller::new(
            self.client.clone(),
            self.projector.clone(),
            self.progress.clone(),
            options,
            shutdown,
        )
    }

    fn live(&self, shutdown: watch::Receiver<bool>) -> LiveIngestor {
        LiveIngestor::new(
            self.client.clone(),
            self.projector.clone(),
            LiveOptions::default(),
            shutdown,
        )
    }
}

fn fast_retry() -> RetryStrategy {
    RetryStrategy::None
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn backfill_projects_a_full_lifecycle() {
    let harness = Harness::new(30, 1);
    let issuer = Address::repeat_byte(0xA1);
    let uid = B256::repeat_byte(0x07);
    harness.client.add_log(
        logs::submitted(issuer, 5, 0)
            .name("Acme Attestations")
            .stake(U256::from(1_000u64))
            .build(),
    );
    harness
        .client
        .add_log(logs::approved(issuer, 12, 0, uid, true).build());

    let (_tx, rx) = watch::channel(false);
    let mut backfiller = harness.backfiller(BackfillOptions::default(), rx);
    assert!(backfiller.run(30).await.unwrap());

    let record = harness.store.get_issuer(issuer).unwrap().unwrap();
    assert_eq!(record.status, IssuerStatus::Approved);
    assert_eq!(record.name, "Acme Attestations");
    assert_eq!(record.attestation_uid, Some(uid));
    assert_eq!(record.submitted_block, 5);
    assert_eq!(record.decided_block, Some(12));
    assert_eq!(harness.store.cursor().unwrap(), Some(30));
}

#[tokio::test]
async fn orphan_rejection_does_not_stall_the_cursor() {
    let harness = Harness::new(30, 1);
    harness
        .client
        .add_log(logs::rejected(Address::repeat_byte(0xB2), 8, 0).build());

    let (_tx, rx) = watch::channel(false);
    let mut backfiller = harness.backfiller(BackfillOptions::default(), rx);
    assert!(backfiller.run(30).await.unwrap());

    assert_eq!(harness.store.status_counts().unwrap().total(), 0);
    assert_eq!(harness.store.cursor().unwrap(), Some(30));
}

#[tokio::test]
async fn failed_batch_is_retried_not_skipped() {
    let harness = Harness::new(30, 1);
    let issuer = Address::repeat_byte(0xC3);
    harness.client.add_log(logs::submitted(issuer, 3, 0).build());
    harness.client.fail_next_get_logs(2);

    let (_tx, rx) = watch::channel(false);
    let mut backfiller = harness.backfiller(
        BackfillOptions {
            batch_size: 10,
            retry: fast_retry(),
            ..BackfillOptions::default()
        },
        rx,
    );
    assert!(backfiller.run(30).await.unwrap());

    // Three batches for blocks 1..=30, plus two retries of the first.
    assert_eq!(harness.client.get_logs_calls(), 5);
    assert!(harness.store.get_issuer(issuer).unwrap().is_some());
    assert_eq!(harness.store.cursor().unwrap(), Some(30));
}

#[tokio::test]
async fn resume_after_interruption_matches_a_clean_run() {
    let issuer = Address::repeat_byte(0xD4);
    let uid = B256::repeat_byte(0x0D);
    let seed = |client: &MockChainClient| {
        client.add_log(logs::submitted(issuer, 3, 0).name("Resumable").build());
        client.add_log(logs::approved(issuer, 15, 0, uid, false).build());
    };
    let options = || BackfillOptions {
        batch_size: 10,
        retry: fast_retry(),
        ..BackfillOptions::default()
    };

    // Interrupted run: first batch only, then a fresh backfiller finishes.
    let interrupted = Harness::new(30, 1);
    seed(&interrupted.client);
    let (_tx, rx) = watch::channel(false);
    let mut first = interrupted.backfiller(options(), rx.clone());
    assert!(first.run(9).await.unwrap());
    assert_eq!(interrupted.store.cursor().unwrap(), Some(9));
    let mut second = interrupted.backfiller(options(), rx);
    assert!(second.run(30).await.unwrap());

    // Clean run over the same history.
    let clean = Harness::new(30, 1);
    seed(&clean.client);
    let (_tx2, rx2) = watch::channel(false);
    let mut whole = clean.backfiller(options(), rx2);
    assert!(whole.run(30).await.unwrap());

    let resumed = interrupted.store.get_issuer(issuer).unwrap().unwrap();
    let reference = clean.store.get_issuer(issuer).unwrap().unwrap();
    assert_eq!(resumed, reference);
    assert_eq!(
        interrupted.store.cursor().unwrap(),
        clean.store.cursor().unwrap()
    );
}

#[tokio::test]
async fn shutdown_stops_backfill_before_work() {
    let harness = Harness::new(30, 1);
    harness
        .client
        .add_log(logs::submitted(Address::repeat_byte(0xE5), 3, 0).build());

    let (_tx, rx) = watch::channel(true);
    let mut backfiller = harness.backfiller(BackfillOptions::default(), rx);
    assert!(!backfiller.run(30).await.unwrap());
    assert_eq!(harness.store.cursor().unwrap(), None);
}

#[tokio::test]
async fn poller_follows_the_head() {
    let harness = Harness::new(10, 1);
    let issuer = Address::repeat_byte(0xF6);
    harness.client.add_log(logs::submitted(issuer, 4, 0).build());

    let (tx, rx) = watch::channel(false);
    let mut poller = harness.poller(
        PollOptions {
            batch_size: 100,
            poll_interval: Duration::from_millis(10),
            retry_interval: Duration::from_millis(10),
        },
        rx,
    );
    let store = harness.store.clone();
    let client = harness.client.clone();
    let handle = tokio::spawn(async move { poller.run().await });

    wait_for(|| store.cursor().unwrap() == Some(10)).await;
    assert!(store.get_issuer(issuer).unwrap().is_some());

    // The chain moves on; the poller picks up the new range.
    client.add_log(logs::rejected(issuer, 14, 0).build());
    client.set_height(20);
    wait_for(|| store.cursor().unwrap() == Some(20)).await;
    let record = store.get_issuer(issuer).unwrap().unwrap();
    assert_eq!(record.status, IssuerStatus::Rejected);

    tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn live_mode_applies_pushed_events_without_moving_the_cursor() {
    let client = Arc::new(MockChainClient::with_subscriptions(100));
    let harness = Harness::with_client(client.clone(), 1);
    let issuer = Address::repeat_byte(0x17);

    let (tx, rx) = watch::channel(false);
    let mut live = harness.live(rx);
    let store = harness.store.clone();
    let handle = tokio::spawn(async move { live.run().await });
    wait_for(|| client.subscriber_count() > 0).await;

    client.publish(logs::submitted(issuer, 42, 0).build());
    wait_for(|| store.get_issuer(issuer).unwrap().is_some()).await;

    client.publish(logs::approved(issuer, 43, 0, B256::repeat_byte(0x2A), true).build());
    wait_for(|| {
        store.get_issuer(issuer).unwrap().unwrap().status == IssuerStatus::Approved
    })
    .await;

    // Push delivery never commits progress; restart re-reads via backfill.
    assert_eq!(store.cursor().unwrap(), None);

    tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn live_mode_reports_unsupported_transport() {
    let harness = Harness::new(100, 1);
    let (_tx, rx) = watch::channel(false);
    let mut live = harness.live(rx);

    match live.run().await {
        Err(IngestError::Chain(ChainError::SubscriptionsUnsupported)) => {}
        other => panic!("expected unsupported subscription, got {other:?}"),
    }
}

#[tokio::test]
async fn live_mode_retries_transient_subscribe_failures() {
    let client = Arc::new(MockChainClient::with_subscriptions(100));
    client.fail_next_subscribes(2);
    let harness = Harness::with_client(client.clone(), 1);
    let issuer = Address::repeat_byte(0x39);

    let (tx, rx) = watch::channel(false);
    let mut live = LiveIngestor::new(
        harness.client.clone(),
        harness.projector.clone(),
        LiveOptions {
            resubscribe_delay: Duration::from_millis(10),
        },
        rx,
    );
    let store = harness.store.clone();
    let handle = tokio::spawn(async move { live.run().await });

    // The first attempts fail with a transport error; the loop keeps
    // retrying instead of giving up follow mode.
    wait_for(|| client.subscriber_count() > 0).await;
    client.publish(logs::submitted(issuer, 9, 0).build());
    wait_for(|| store.get_issuer(issuer).unwrap().is_some()).await;

    tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn backfill_after_live_delivery_is_idempotent() {
    let client = Arc::new(MockChainClient::with_subscriptions(30));
    let harness = Harness::with_client(client.clone(), 1);
    let issuer = Address::repeat_byte(0x28);

    // Live push applies the events without committing progress.
    let (tx, rx) = watch::channel(false);
    let mut live = harness.live(rx);
    let store = harness.store.clone();
    let handle = tokio::spawn(async move { live.run().await });
    wait_for(|| client.subscriber_count() > 0).await;

    client.publish(logs::submitted(issuer, 3, 0).build());
    client.publish(logs::approved(issuer, 7, 0, B256::repeat_byte(0x11), true).build());
    wait_for(|| {
        store.get_issuer(issuer).unwrap().map(|r| r.status) == Some(IssuerStatus::Approved)
    })
    .await;
    tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(harness.store.cursor().unwrap(), None);
    let after_live = harness.store.get_issuer(issuer).unwrap().unwrap();

    // Restart path: backfill re-reads the same history, so every event is
    // a replay; nothing may change except the cursor.
    let (_tx2, rx2) = watch::channel(false);
    let mut backfiller = harness.backfiller(BackfillOptions::default(), rx2);
    assert!(backfiller.run(30).await.unwrap());

    let after_backfill = harness.store.get_issuer(issuer).unwrap().unwrap();
    assert_eq!(after_live, after_backfill);
    assert_eq!(harness.store.cursor().unwrap(), Some(30));
    assert_eq!(harness.store.status_counts().unwrap().approved, 1);
}
