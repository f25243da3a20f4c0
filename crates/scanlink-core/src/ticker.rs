//! Liveness ticker.
//!
//! Emits a periodic "still running" signal to the host, independent of any
//! network activity. Ticks are published into a `watch` channel and handed
//! to the host's [`LivenessSink`] by a separate delivery task, so a slow sink
//! only ever sees the most recent tick and never holds the ticker back.

use crate::metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Host callback for liveness signals.
#[async_trait]
pub trait LivenessSink: Send + Sync {
    /// Called with the latest tick number (starting at 1).
    async fn still_running(&self, tick: u64);
}

/// Ticker cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickerConfig {
    /// Delay before the first tick.
    pub initial_delay: Duration,
    /// Time between ticks.
    pub interval: Duration,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(10),
            interval: Duration::from_secs(10),
        }
    }
}

/// A running liveness ticker.
///
/// Dropping the ticker cancels it; [`LivenessTicker::stop`] also waits for
/// both tasks to finish.
#[derive(Debug)]
pub struct LivenessTicker {
    cancel: CancellationToken,
    ticks: watch::Receiver<u64>,
    tick_task: Option<JoinHandle<()>>,
    deliver_task: Option<JoinHandle<()>>,
}

impl LivenessTicker {
    /// Start ticking. The ticker is cancelled along with `parent`.
    #[must_use]
    pub fn spawn(
        config: TickerConfig,
        sink: Arc<dyn LivenessSink>,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let (tx, rx) = watch::channel(0u64);

        info!(
            initial_delay = ?config.initial_delay,
            interval = ?config.interval,
            "Starting liveness ticker"
        );

        let tick_task = tokio::spawn(run_ticks(config, tx, cancel.clone()));
        let deliver_task = tokio::spawn(deliver_ticks(rx.clone(), sink, cancel.clone()));

        Self {
            cancel,
            ticks: rx,
            tick_task: Some(tick_task),
            deliver_task: Some(deliver_task),
        }
    }

    /// Token that stops this ticker when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Observe the latest emitted tick.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.ticks.clone()
    }

    /// Whether the ticker has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel the ticker and wait for its tasks to exit.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        for task in [self.tick_task.take(), self.deliver_task.take()]
            .into_iter()
            .flatten()
        {
            if let Err(e) = task.await {
                debug!(error = %e, "Liveness task ended abnormally");
            }
        }
    }
}

impl Drop for LivenessTicker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_ticks(config: TickerConfig, tx: watch::Sender<u64>, cancel: CancellationToken) {
    // tokio panics on a zero period.
    let period = config.interval.max(Duration::from_millis(1));
    let mut interval = tokio::time::interval_at(Instant::now() + config.initial_delay, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut tick = 0u64;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                tick += 1;
                trace!(tick, "Liveness tick");
                metrics::record_liveness_tick();
                tx.send_replace(tick);
            }
        }
    }

    debug!(ticks = tick, "Liveness ticker stopped");
}

async fn deliver_ticks(
    mut rx: watch::Receiver<u64>,
    sink: Arc<dyn LivenessSink>,
    cancel: CancellationToken,
) {
    loop {
        let tick = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = rx.changed() => match changed {
                Ok(()) => *rx.borrow_and_update(),
                Err(_) => break,
            },
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = sink.still_running(tick) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio::time::sleep;

    struct ChannelSink(mpsc::UnboundedSender<(u64, Instant)>);

    #[async_trait]
    impl LivenessSink for ChannelSink {
        async fn still_running(&self, tick: u64) {
            let _ = self.0.send((tick, Instant::now()));
        }
    }

    struct SlowSink {
        seen: std::sync::Mutex<Vec<u64>>,
        delay: Duration,
    }

    #[async_trait]
    impl LivenessSink for SlowSink {
        async fn still_running(&self, tick: u64) {
            self.seen.lock().unwrap().push(tick);
            sleep(self.delay).await;
        }
    }

    fn within(actual: Duration, expected: Duration) -> bool {
        actual >= expected && actual <= expected + Duration::from_millis(5)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_cadence() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let started = Instant::now();
        let parent = CancellationToken::new();
        let mut ticker =
            LivenessTicker::spawn(TickerConfig::default(), Arc::new(ChannelSink(tx)), &parent);

        sleep(Duration::from_millis(9_900)).await;
        assert!(rx.try_recv().is_err(), "ticked before the initial delay");

        let (first, first_at) = rx.recv().await.unwrap();
        assert_eq!(first, 1);
        assert!(within(first_at - started, Duration::from_secs(10)));

        let (second, second_at) = rx.recv().await.unwrap();
        assert_eq!(second, 2);
        assert!(within(second_at - first_at, Duration::from_secs(10)));

        ticker.stop().await;
        sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err(), "ticked after stop");
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_stops_ticker() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let parent = CancellationToken::new();
        let ticker = LivenessTicker::spawn(
            TickerConfig {
                initial_delay: Duration::from_secs(1),
                interval: Duration::from_secs(1),
            },
            Arc::new(ChannelSink(tx)),
            &parent,
        );

        let (tick, _) = rx.recv().await.unwrap();
        assert_eq!(tick, 1);

        parent.cancel();
        assert!(ticker.is_cancelled());
        sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(*ticker.subscribe().borrow(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_sink_sees_latest_tick_only() {
        let sink = Arc::new(SlowSink {
            seen: std::sync::Mutex::new(Vec::new()),
            delay: Duration::from_secs(25),
        });
        let parent = CancellationToken::new();
        let ticker = LivenessTicker::spawn(TickerConfig::default(), sink.clone(), &parent);

        sleep(Duration::from_secs(105)).await;

        // The ticker kept its cadence regardless of the sink.
        assert_eq!(*ticker.subscribe().borrow(), 10);

        let seen = sink.seen.lock().unwrap().clone();
        assert_eq!(seen.first(), Some(&1));
        assert!(seen.len() < 10);
        assert!(seen.windows(2).all(|w| w[1] > w[0]));
        assert!(seen.windows(2).any(|w| w[1] - w[0] > 1));
    }

    #[tokio::test]
    async fn test_drop_cancels() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let parent = CancellationToken::new();
        let ticker = LivenessTicker::spawn(TickerConfig::default(), Arc::new(ChannelSink(tx)), &parent);
        let token = ticker.cancellation_token();

        drop(ticker);
        assert!(token.is_cancelled());
        assert!(!parent.is_cancelled());
    }
}
