//! Detection of silently dead connections: the server does not reliably notice (or report) a
//!  connection that stopped transporting data, so the engine periodically sends a message to
//!  itself and reconnects if the echo does not arrive.

use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use tokio::select;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, trace, warn};

use crate::watchdog::liveness::{LivenessState, Verdict};

pub mod liveness;


/// The engine as seen by the watchdog
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LivenessTarget: Send + Sync + 'static {
    fn is_online(&self) -> bool;
    async fn send_probe(&self, token: &str) -> anyhow::Result<()>;
    /// drop the current connection and connect again
    async fn reconnect(&self) -> anyhow::Result<()>;
}


/// Owns the watchdog task. Starting it again replaces the running task.
#[derive(Debug, Default)]
pub struct Watchdog {
    task: Mutex<Option<JoinHandle<()>>>,
}
impl Watchdog {
    pub fn new() -> Watchdog {
        Default::default()
    }

    pub fn start(&self, interval: Duration, verify_delay: Duration, liveness: Arc<LivenessState>, target: Weak<dyn LivenessTarget>) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = task.take() {
            previous.abort();
        }
        *task = Some(tokio::spawn(run_watchdog(interval, verify_delay, liveness, target)));
    }

    /// Cancels prober and verifier together
    pub fn stop(&self) -> bool {
        match self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }
}
impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}


/// Runs until the target is dropped. Both timers have the same period, the verifier trailing the
///  prober by `verify_delay`.
pub async fn run_watchdog(interval: Duration, verify_delay: Duration, liveness: Arc<LivenessState>, target: Weak<dyn LivenessTarget>) {
    let start = Instant::now();
    let mut probe_ticks = time::interval_at(start + interval, interval);
    probe_ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut verify_ticks = time::interval_at(start + interval + verify_delay, interval);
    verify_ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            _ = probe_ticks.tick() => {
                let Some(target) = target.upgrade() else { break };
                guarded("probe", probe(liveness.clone(), target)).await;
            }
            _ = verify_ticks.tick() => {
                let Some(target) = target.upgrade() else { break };
                guarded("verify", verify(liveness.clone(), target)).await;
            }
        }
    }
    debug!("watchdog target is gone - stopping");
}

/// Runs a tick as a separate task, so neither an error nor a panic can end the timer loop
async fn guarded(name: &'static str, tick: impl Future<Output = anyhow::Result<()>> + Send + 'static) {
    match tokio::spawn(tick).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("watchdog {} failed: {}", name, e),
        Err(e) => error!("watchdog {} panicked: {}", name, e),
    }
}

async fn probe(liveness: Arc<LivenessState>, target: Arc<dyn LivenessTarget>) -> anyhow::Result<()> {
    if !target.is_online() {
        trace!("not online - skipping liveness probe");
        return Ok(());
    }

    let token = liveness.begin_probe();
    debug!("sending liveness probe");
    target.send_probe(&token).await
}

async fn verify(liveness: Arc<LivenessState>, target: Arc<dyn LivenessTarget>) -> anyhow::Result<()> {
    match liveness.verify() {
        Verdict::Dead => {
            warn!("liveness probe was not echoed - reconnecting");
            target.reconnect().await
        }
        Verdict::Alive => {
            trace!("connection is alive");
            Ok(())
        }
        Verdict::NoProbe => Ok(()),
    }
}


#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;
    use tokio::time::sleep;

    use super::*;

    const INTERVAL: Duration = Duration::from_secs(300);
    const VERIFY_DELAY: Duration = Duration::from_secs(5);

    fn start(watchdog: &Watchdog, liveness: &Arc<LivenessState>, target: MockLivenessTarget) -> Arc<dyn LivenessTarget> {
        let target: Arc<dyn LivenessTarget> = Arc::new(target);
        watchdog.start(INTERVAL, VERIFY_DELAY, liveness.clone(), Arc::downgrade(&target));
        target
    }

    #[tokio::test(start_paused = true)]
    async fn test_echoed_probe_keeps_connection() {
        let liveness = Arc::new(LivenessState::new());

        let mut target = MockLivenessTarget::new();
        target.expect_is_online().return_const(true);
        let echo = liveness.clone();
        target.expect_send_probe()
            .times(2)
            .returning(move |token| {
                assert!(echo.confirm(token));
                Ok(())
            });
        target.expect_reconnect().never();

        let watchdog = Watchdog::new();
        let _target = start(&watchdog, &liveness, target);

        sleep(INTERVAL * 2 + VERIFY_DELAY + Duration::from_millis(1)).await;
        assert!(watchdog.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_echo_forces_reconnect() {
        let liveness = Arc::new(LivenessState::new());

        let mut target = MockLivenessTarget::new();
        target.expect_is_online().return_const(true);
        target.expect_send_probe().times(1).returning(|_| Ok(()));
        target.expect_reconnect().times(1).returning(|| Ok(()));

        let watchdog = Watchdog::new();
        let _target = start(&watchdog, &liveness, target);

        // nothing happens before the first period is over
        sleep(INTERVAL - Duration::from_millis(1)).await;
        assert!(!liveness.is_probe_in_flight());

        sleep(VERIFY_DELAY + Duration::from_millis(2)).await;
        assert!(!liveness.is_probe_in_flight());
        watchdog.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_probe_while_offline() {
        let liveness = Arc::new(LivenessState::new());

        let mut target = MockLivenessTarget::new();
        target.expect_is_online().return_const(false);
        target.expect_send_probe().never();
        target.expect_reconnect().never();

        let watchdog = Watchdog::new();
        let _target = start(&watchdog, &liveness, target);

        sleep(INTERVAL * 3 + VERIFY_DELAY).await;
        watchdog.stop();
    }

    /// fails in a different way on each of the first probes
    struct UnreliableTarget {
        liveness: Arc<LivenessState>,
        probes: AtomicUsize,
        reconnects: AtomicUsize,
    }
    #[async_trait]
    impl LivenessTarget for UnreliableTarget {
        fn is_online(&self) -> bool {
            true
        }

        async fn send_probe(&self, token: &str) -> anyhow::Result<()> {
            match self.probes.fetch_add(1, Ordering::SeqCst) {
                0 => panic!("probe failure"),
                1 => Err(anyhow!("probe error")),
                _ => {
                    self.liveness.confirm(token);
                    Ok(())
                }
            }
        }

        async fn reconnect(&self) -> anyhow::Result<()> {
            self.reconnects.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("reconnect failure"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_ticks_do_not_stop_the_timers() {
        let liveness = Arc::new(LivenessState::new());
        let target = Arc::new(UnreliableTarget {
            liveness: liveness.clone(),
            probes: AtomicUsize::new(0),
            reconnects: AtomicUsize::new(0),
        });
        let weak_target: Weak<dyn LivenessTarget> = Arc::downgrade(&target) as Weak<dyn LivenessTarget>;

        let watchdog = Watchdog::new();
        watchdog.start(INTERVAL, VERIFY_DELAY, liveness.clone(), weak_target);

        sleep(INTERVAL * 3 + VERIFY_DELAY + Duration::from_millis(1)).await;
        assert!(watchdog.is_running());
        assert_eq!(target.probes.load(Ordering::SeqCst), 3);
        // the first two probes were never echoed
        assert_eq!(target.reconnects.load(Ordering::SeqCst), 2);
        watchdog.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_both_timers() {
        let liveness = Arc::new(LivenessState::new());

        let mut target = MockLivenessTarget::new();
        target.expect_is_online().return_const(true);
        target.expect_send_probe().times(1).returning(|_| Ok(()));
        target.expect_reconnect().never();

        let watchdog = Watchdog::new();
        let _target = start(&watchdog, &liveness, target);

        sleep(INTERVAL + Duration::from_millis(1)).await;
        assert!(watchdog.stop());
        assert!(!watchdog.stop());

        sleep(INTERVAL * 2).await;
        assert!(!watchdog.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_ends_with_its_target() {
        let liveness = Arc::new(LivenessState::new());

        let mut target = MockLivenessTarget::new();
        target.expect_is_online().never();

        let watchdog = Watchdog::new();
        let target = start(&watchdog, &liveness, target);
        drop(target);

        sleep(INTERVAL + Duration::from_millis(1)).await;
        assert!(!watchdog.is_running());
    }
}
