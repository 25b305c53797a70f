//! Supervision tests against a scripted driver.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rstest::rstest;
use tokio::sync::{mpsc, oneshot};

use super::*;
use crate::domain::ports::StoreLink;

/// Driver whose handles are connection serial numbers. Each established
/// link hands the test a trigger that simulates a disconnect.
struct ScriptedDriver {
    attempts: Arc<AtomicUsize>,
    refusals: Mutex<VecDeque<bool>>,
    triggers: mpsc::UnboundedSender<oneshot::Sender<()>>,
}

struct Script {
    attempts: Arc<AtomicUsize>,
    triggers: mpsc::UnboundedReceiver<oneshot::Sender<()>>,
}

impl Script {
    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    async fn disconnect(&mut self) {
        let trigger = self.triggers.recv().await.expect("an established link");
        let _ = trigger.send(());
    }
}

/// `refusals[i]` decides whether attempt `i` fails; later attempts succeed.
fn scripted(refusals: &[bool]) -> (ScriptedDriver, Script) {
    let attempts = Arc::new(AtomicUsize::new(0));
    let (triggers, trigger_rx) = mpsc::unbounded_channel();
    let driver = ScriptedDriver {
        attempts: Arc::clone(&attempts),
        refusals: Mutex::new(refusals.iter().copied().collect()),
        triggers,
    };
    let script = Script {
        attempts,
        triggers: trigger_rx,
    };
    (driver, script)
}

#[async_trait]
impl StoreDriver for ScriptedDriver {
    type Handle = usize;

    async fn connect(&self, _url: &str) -> Result<StoreLink<usize>, StoreError> {
        let serial = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let refused = self
            .refusals
            .lock()
            .expect("refusals lock")
            .pop_front()
            .unwrap_or(false);
        if refused {
            return Err(StoreError::connect("connection refused"));
        }
        let (trigger, disconnected) = oneshot::channel();
        let _ = self.triggers.send(trigger);
        Ok(StoreLink::new(serial, async move {
            let _ = disconnected.await;
        }))
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[rstest]
#[tokio::test]
async fn first_connection_failure_is_returned_and_not_retried() {
    let (driver, script) = scripted(&[true]);
    let result = StoreConnector::new(driver, "store://primary", ReconnectBackoff::Immediate)
        .connect()
        .await;

    assert_eq!(
        result.err(),
        Some(StoreError::connect("connection refused"))
    );
    settle().await;
    assert_eq!(script.attempts(), 1);
}

#[rstest]
#[case(1)]
#[case(3)]
#[case(5)]
#[tokio::test]
async fn each_disconnect_triggers_exactly_one_reconnect(#[case] disconnects: usize) {
    let (driver, mut script) = scripted(&[]);
    let mut handle = StoreConnector::new(driver, "store://primary", ReconnectBackoff::Immediate)
        .connect()
        .await
        .expect("first connection");
    assert_eq!(*handle.current(), 1);

    for expected in 2..=disconnects + 1 {
        script.disconnect().await;
        assert!(handle.changed().await, "supervisor alive");
        assert_eq!(*handle.current(), expected);
    }

    settle().await;
    assert_eq!(script.attempts(), disconnects + 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn failed_reconnects_are_retried_with_backoff() {
    let (driver, mut script) = scripted(&[false, true, true]);
    let backoff = ReconnectBackoff::from_millis(100, 1_000);
    let mut handle = StoreConnector::new(driver, "store://primary", backoff)
        .connect()
        .await
        .expect("first connection");

    let lost_at = tokio::time::Instant::now();
    script.disconnect().await;
    assert!(handle.changed().await);

    // Delays of 100ms and 200ms precede the two refused attempts, 400ms the
    // successful one.
    assert!(lost_at.elapsed() >= Duration::from_millis(700));
    assert_eq!(script.attempts(), 4);
    assert_eq!(*handle.current(), 4);
}

#[rstest]
#[tokio::test]
async fn supervision_stops_once_every_handle_is_dropped() {
    let (driver, mut script) = scripted(&[]);
    let handle = StoreConnector::new(driver, "store://primary", ReconnectBackoff::Immediate)
        .connect()
        .await
        .expect("first connection");
    drop(handle);

    script.disconnect().await;
    settle().await;
    assert_eq!(script.attempts(), 1);
}
